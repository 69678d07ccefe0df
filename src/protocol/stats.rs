//! Swing statistics block of a telemetry message.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DecodeError, Result};

/// Stats as they appear on the wire. Every field is optional and may carry
/// any JSON value; type checking happens in [`Stats::from_wire`].
///
/// Each launch angle spelling is its own field so a backend that sends more
/// than one of them still decodes.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireStats {
    #[serde(default)]
    speed: Option<Value>,
    #[serde(default)]
    launch_angle: Option<Value>,
    #[serde(default, rename = "launchAngle")]
    launch_angle_camel: Option<Value>,
    #[serde(default)]
    angle: Option<Value>,
}

impl WireStats {
    /// First non-null spelling in order `launch_angle`, `launchAngle`, `angle`.
    fn launch_angle(&mut self) -> Option<Value> {
        [&mut self.launch_angle, &mut self.launch_angle_camel, &mut self.angle]
            .into_iter()
            .find_map(|v| v.take().filter(|v| !v.is_null()))
    }
}

/// Partial swing statistics carried by one message.
///
/// `None` means "not present in this message", never "reset". JSON `null`
/// is read as absent.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    /// Club-head speed (m/s), never negative.
    pub speed: Option<f64>,
    /// Launch angle (deg).
    pub launch_angle: Option<f64>,
}

impl Stats {
    pub(crate) fn from_wire(mut wire: WireStats) -> Result<Self> {
        let speed = number("speed", wire.speed.take())?;
        if let Some(value) = speed
            && value < 0.0
        {
            return Err(DecodeError::NegativeSpeed { value });
        }
        Ok(Self {
            speed,
            launch_angle: number("launch_angle", wire.launch_angle())?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_none() && self.launch_angle.is_none()
    }
}

fn number(field: &'static str, value: Option<Value>) -> Result<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(DecodeError::NotANumber { field }),
    }
}
