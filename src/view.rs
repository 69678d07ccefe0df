//! What the presentation layer reads each tick.
//!
//! [`Dashboard`] is a plain value collected from the session snapshot, the
//! streak ledger and the coaching desk. Values that are not available yet
//! render as placeholders, never as zero.

use std::fmt;

use crate::coach::CoachingState;
use crate::session::Snapshot;
use crate::store::Store;
use crate::streak::{Clock, DayEntry, DayStatus, StreakLedger};

/// Shown for a telemetry value that has not been received yet.
pub const CALCULATING: &str = "calculating...";

/// Shown while a coaching request is in flight.
pub const LOADING: &str = "loading...";

/// A number with a unit, or [`CALCULATING`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Readout {
    pub value: Option<f64>,
    pub unit: &'static str,
}

impl Readout {
    pub fn new(value: Option<f64>, unit: &'static str) -> Self {
        Self { value, unit }
    }
}

impl fmt::Display for Readout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "{v:.2} {}", self.unit),
            None => f.write_str(CALCULATING),
        }
    }
}

/// The coaching area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoachingLine {
    Idle,
    Loading,
    Error(String),
    Text(String),
}

impl From<&CoachingState> for CoachingLine {
    fn from(state: &CoachingState) -> Self {
        match state {
            CoachingState::Idle => CoachingLine::Idle,
            CoachingState::Loading { .. } => CoachingLine::Loading,
            CoachingState::Ready { text, .. } => CoachingLine::Text(text.clone()),
            CoachingState::Failed { error, .. } => CoachingLine::Error(error.to_string()),
        }
    }
}

impl fmt::Display for CoachingLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoachingLine::Idle => f.write_str("-"),
            CoachingLine::Loading => f.write_str(LOADING),
            CoachingLine::Error(e) => write!(f, "error: {e}"),
            CoachingLine::Text(t) => f.write_str(t),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub speed: Readout,
    pub launch_angle: Readout,
    pub ball_speed: Readout,
    pub carry_distance: Readout,
    /// JPEG sizes of the latest video and depth frames.
    pub frame_bytes: Option<(usize, usize)>,
    pub week: Vec<DayEntry>,
    pub streak: u32,
    pub coaching: CoachingLine,
}

impl Dashboard {
    pub fn collect<S: Store, C: Clock>(
        snapshot: Option<&Snapshot>,
        ledger: &StreakLedger<S, C>,
        coaching: &CoachingState,
    ) -> Self {
        Self {
            speed: Readout::new(snapshot.and_then(|s| s.speed), "m/s"),
            launch_angle: Readout::new(snapshot.and_then(|s| s.launch_angle), "deg"),
            ball_speed: Readout::new(snapshot.and_then(Snapshot::ball_speed), "m/s"),
            carry_distance: Readout::new(snapshot.and_then(Snapshot::carry_distance), "yd"),
            frame_bytes: snapshot.map(|s| (s.image.len(), s.depth_image.len())),
            week: ledger.week(),
            streak: ledger.current_streak(),
            coaching: coaching.into(),
        }
    }
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "club speed:  {}", self.speed)?;
        writeln!(f, "launch:      {}", self.launch_angle)?;
        writeln!(f, "ball speed:  {}", self.ball_speed)?;
        writeln!(f, "carry:       {}", self.carry_distance)?;
        match self.frame_bytes {
            Some((video, depth)) => writeln!(f, "frames:      video {video}B, depth {depth}B")?,
            None => writeln!(f, "frames:      {CALCULATING}")?,
        }
        f.write_str("week:       ")?;
        for day in &self.week {
            let mark = match day.status {
                DayStatus::Completed => 'x',
                DayStatus::Active => '*',
                DayStatus::Inactive => ' ',
            };
            write!(f, " {}[{mark}]", day.label)?;
        }
        writeln!(f)?;
        writeln!(f, "streak:      {}", self.streak)?;
        write!(f, "coach:       {}", self.coaching)
    }
}
