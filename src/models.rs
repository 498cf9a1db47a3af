use serde::Deserialize;

/// Signup payload. Every field is optional at the wire level so that a
/// syntactically valid but incomplete body still reaches the email check
/// (missing email is "Invalid email address", not "Invalid request body").
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WaitlistRequest {
    pub email: Option<String>,
    /// Honeypot. Invisible in the rendered form; humans never fill it.
    pub website: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}
