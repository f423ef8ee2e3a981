/// Router Module Index
///
/// Routes are split by access level so the authentication layer is applied
/// once per group in `create_router`, never per handler registration.

/// Routes open to anonymous clients: health, docs and the login flow.
pub mod public;

/// Routes behind the session layer. Any logged-in user may call them.
pub mod authenticated;

/// Account management. Behind the session layer, and each handler also
/// requires the `admin` role.
pub mod admin;
