use regex::Regex;
use std::sync::LazyLock;

/// SanitizeError
///
/// The reason a field was refused. The `Display` text is what the client
/// receives in the body of the 400 response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SanitizeError {
    #[error("Entrada no válida. Se detectó un patrón SQL no permitido ({0}).")]
    SqlPattern(&'static str),
    #[error("Se han detectado etiquetas HTML no permitidas.")]
    HtmlTag,
    #[error("Entrada no válida. Se detectó el carácter HTML reservado '{0}'.")]
    HtmlReserved(char),
}

// Deny-list of SQL metacharacter patterns, checked in this order.
static SQL_DENY_LIST: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r";", "punto y coma"),
        (r"'", "comilla simple"),
        (r"--", "comentario de línea"),
        (r"/\*|\*/", "comentario de bloque"),
        (r"(?i)xp_", "procedimiento extendido xp_"),
    ]
    .into_iter()
    .map(|(pattern, label)| (Regex::new(pattern).expect("valid regex"), label))
    .collect()
});

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<\s*/?\s*[A-Za-z!?][^>]*>").expect("valid regex"));

/// Characters an HTML serializer rewrites as entities. A sanitization pass
/// over a string containing any of them never returns it unchanged.
const HTML_RESERVED: [char; 4] = ['<', '>', '&', '\u{a0}'];

/// sanitize
///
/// Accepts `value` only if it is free of SQL deny-list patterns and if an HTML
/// sanitization pass would leave it untouched. Markup is never stripped: a
/// value that would be altered is refused as a whole.
///
/// Pure and deterministic. On success the input is handed back unchanged.
pub fn sanitize(value: &str) -> Result<&str, SanitizeError> {
    if let Some((_, label)) = SQL_DENY_LIST.iter().find(|(re, _)| re.is_match(value)) {
        return Err(SanitizeError::SqlPattern(label));
    }

    if HTML_TAG.is_match(value) {
        return Err(SanitizeError::HtmlTag);
    }

    if let Some(c) = value.chars().find(|c| HTML_RESERVED.contains(c)) {
        return Err(SanitizeError::HtmlReserved(c));
    }

    Ok(value)
}
