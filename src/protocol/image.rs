//! Camera frames carried in every telemetry message.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{DecodeError, Result};

/// Prefix the presentation layer expects in front of base64 JPEG data.
pub const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// One JPEG-encoded camera frame (colour or depth).
///
/// The bytes are opaque to the client core; they are validated as base64 on
/// arrival and handed to the presentation layer unchanged.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Frame {
    jpeg: Vec<u8>,
}

impl Frame {
    /// Decode the base64 text of the `field` image.
    ///
    /// A leading `data:image/jpeg;base64,` is tolerated so backends that
    /// already emit data URLs work unchanged.
    pub fn decode(field: &'static str, text: &str) -> Result<Self> {
        let body = text.strip_prefix(DATA_URL_PREFIX).unwrap_or(text);
        let jpeg = STANDARD
            .decode(body.trim())
            .map_err(|source| DecodeError::InvalidImage { field, source })?;
        Ok(Self { jpeg })
    }

    pub fn from_bytes(jpeg: Vec<u8>) -> Self {
        Self { jpeg }
    }

    /// Raw JPEG bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn len(&self) -> usize {
        self.jpeg.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jpeg.is_empty()
    }

    /// Base64 text without prefix, as it travels on the wire.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.jpeg)
    }

    /// `data:image/jpeg;base64,...` form for direct display.
    pub fn data_url(&self) -> String {
        format!("{DATA_URL_PREFIX}{}", self.to_base64())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // "Frame(5120B | FFD8FFE000104A46...)"
        write!(f, "Frame({}B", self.jpeg.len())?;
        if !self.jpeg.is_empty() {
            write!(f, " | ")?;
            let limit = 8;
            for b in self.jpeg.iter().take(limit) {
                write!(f, "{b:02X}")?;
            }
            if self.jpeg.len() > limit {
                write!(f, "...")?;
            }
        }
        write!(f, ")")
    }
}
