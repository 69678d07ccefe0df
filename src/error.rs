use thiserror::Error;

/// Errors arising from decoding a single inbound telemetry message.
///
/// Always scoped to one message: the session discards the message and keeps
/// its previous snapshot.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("message is not valid JSON: {source}{}", format_raw_suffix(raw))]
    Json {
        source: serde_json::Error,
        /// Leading characters of the offending message for debug context.
        raw: String,
    },

    #[error("message is missing the `{field}` image")]
    MissingImage { field: &'static str },

    #[error("`{field}` is not valid base64: {source}")]
    InvalidImage {
        field: &'static str,
        source: base64::DecodeError,
    },

    #[error("`{field}` is not a number")]
    NotANumber { field: &'static str },

    #[error("speed must be non-negative, got {value}")]
    NegativeSpeed { value: f64 },

    #[error("binary message is not UTF-8 text")]
    NotText,
}

impl DecodeError {
    /// Create a `Json` error (raw text filled in later via `with_raw`).
    pub(crate) fn json(source: serde_json::Error) -> Self {
        Self::Json { source, raw: String::new() }
    }

    /// Attach the head of the offending message text to parse-phase errors
    /// for diagnostics. Only enough to display is kept.
    pub fn with_raw(self, text: &str) -> Self {
        match self {
            Self::Json { source, .. } => {
                // One past the limit so the display still knows to elide.
                let raw = text.chars().take(RAW_LIMIT + 1).collect();
                Self::Json { source, raw }
            }
            other => other,
        }
    }
}

/// Characters of raw message text shown in errors.
const RAW_LIMIT: usize = 32;

/// Format message text as a suffix like ` | {"image":"/9j/4AAQ...` (empty if no text).
fn format_raw_suffix(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let head: String = raw.chars().take(RAW_LIMIT).collect();
    let ellipsis = if raw.chars().count() > RAW_LIMIT { "..." } else { "" };
    format!(" | {head}{ellipsis}")
}

pub type Result<T> = std::result::Result<T, DecodeError>;
