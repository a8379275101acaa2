//! Client-side error kinds, decoded from the API's error body.

use screener_core::models::wire::ErrorResponse;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The server demands a challenge answer with the next login attempt.
    #[error("Challenge required")]
    ChallengeRequired,

    #[error("Login key already taken")]
    AlreadyExists,

    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Token rotation failed or the session was ended; the user must log in again.
    #[error("Re-authentication required")]
    ReauthenticationRequired,

    #[error("API error {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl ClientError {
    /// Map an error body onto a client error. Branches on the machine code
    /// and the `requiresCaptcha` flag, never on the message.
    pub fn from_response(status: u16, body: ErrorResponse) -> Self {
        if body.requires_captcha == Some(true) {
            return Self::ChallengeRequired;
        }
        match body.error.as_str() {
            "invalid_credentials" => Self::InvalidCredentials,
            "challenge_required" => Self::ChallengeRequired,
            "already_exists" => Self::AlreadyExists,
            "invalid_or_expired_token" => Self::InvalidOrExpiredToken,
            "forbidden" => Self::Forbidden(body.message),
            _ => Self::Api {
                status,
                code: body.error,
                message: body.message,
            },
        }
    }

    /// An expired or rejected access grant, the one condition a rotation
    /// can recover from.
    pub fn is_expired_grant(&self) -> bool {
        matches!(self, Self::InvalidOrExpiredToken)
    }
}
