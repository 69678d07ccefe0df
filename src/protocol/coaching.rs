//! Coaching endpoint bodies (client → inference service → client).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// POST body: `{"speed": 38.2, "degrees": 14.0}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoachingRequest {
    /// Club-head speed (m/s)
    pub speed: f64,
    /// Launch angle (deg)
    pub degrees: f64,
}

/// The response body did not have the expected `{"description": {"text": ...}}` shape.
#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response has no description text")]
    MissingText,
}

#[derive(Deserialize)]
struct WireResponse {
    description: Option<WireDescription>,
}

#[derive(Deserialize)]
struct WireDescription {
    text: Option<String>,
}

/// Pull the description text out of a response body.
///
/// The text is returned verbatim; it is display text, never markup.
pub fn extract_text(body: &str) -> Result<String, ShapeError> {
    let wire: WireResponse = serde_json::from_str(body)?;
    wire.description
        .and_then(|d| d.text)
        .ok_or(ShapeError::MissingText)
}

/// Remove every `"` character from coaching text.
pub fn strip_quotes(text: &str) -> String {
    text.replace('"', "")
}
