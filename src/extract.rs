use axum::{
    Form, Json,
    extract::{FromRequest, Request},
    http::header,
};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JsonOrForm
///
/// Body extractor accepting either `application/json` or
/// `application/x-www-form-urlencoded`, the two encodings the browser forms
/// use. Any rejection becomes a 400 with a plain-text reason.
#[derive(Debug, Clone)]
pub struct JsonOrForm<T>(pub T);

impl<S, T> FromRequest<S> for JsonOrForm<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(value) = Form::<T>::from_request(req, state).await.map_err(|e| {
                ApiError::Validation(format!("Formulario no válido: {}", e.body_text()))
            })?;
            Ok(JsonOrForm(value))
        } else {
            let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
                ApiError::Validation(format!("Cuerpo JSON no válido: {}", e.body_text()))
            })?;
            Ok(JsonOrForm(value))
        }
    }
}
