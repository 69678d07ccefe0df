//! Message formats exchanged with the sensor backend and the coaching service.
//!
//! - [`Update`]: one inbound telemetry message (backend → client), decoded
//!   completely before anything is applied, so a rejected message never
//!   leaves a half-applied snapshot behind.
//! - [`coaching`]: request and response bodies of the coaching endpoint.
//!
//! Inbound telemetry shape:
//!
//! ```json
//! { "image": "<base64 jpeg>", "depth_image": "<base64 jpeg>",
//!   "stats": { "speed": 38.2, "launch_angle": 14.0 } }
//! ```
//!
//! Both images are required. `stats` and each of its fields are optional.

pub mod coaching;
pub mod image;
pub mod stats;

use serde::Deserialize;

use crate::error::{DecodeError, Result};

pub use image::Frame;
pub use stats::Stats;

pub const FIELD_IMAGE: &str = "image";
pub const FIELD_DEPTH_IMAGE: &str = "depth_image";

#[derive(Debug, Deserialize)]
struct WireUpdate {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    depth_image: Option<String>,
    #[serde(default, rename = "depthImage")]
    depth_image_camel: Option<String>,
    #[serde(default)]
    stats: Option<stats::WireStats>,
}

/// A fully decoded telemetry message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub image: Frame,
    pub depth_image: Frame,
    pub stats: Stats,
}

impl Update {
    /// Decode one text message from the push connection.
    pub fn decode(text: &str) -> Result<Self> {
        let wire: WireUpdate = serde_json::from_str(text)
            .map_err(|e| DecodeError::json(e).with_raw(text))?;

        let image = wire
            .image
            .ok_or(DecodeError::MissingImage { field: FIELD_IMAGE })?;
        let depth_image = wire
            .depth_image
            .or(wire.depth_image_camel)
            .ok_or(DecodeError::MissingImage { field: FIELD_DEPTH_IMAGE })?;

        Ok(Self {
            image: Frame::decode(FIELD_IMAGE, &image)?,
            depth_image: Frame::decode(FIELD_DEPTH_IMAGE, &depth_image)?,
            stats: Stats::from_wire(wire.stats.unwrap_or_default())?,
        })
    }

    /// Decode a binary message; the backend may send JSON as a binary frame.
    pub fn decode_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| DecodeError::NotText)?;
        Self::decode(text)
    }
}
