//! Display metrics derived from club-head speed and launch angle.
//!
//! Simplified projectile model with no drag and no spin. Inputs are the raw
//! stats as received; `None` means the stat has not been received yet and
//! yields `None` (unknown) rather than a numeric artifact.

/// Standard gravity (m/s²).
pub const GRAVITY: f64 = 9.81;

/// Club-head speed divided by this gives projected ball speed.
pub const BALL_SPEED_DIVISOR: f64 = 1.5;

/// meters → yards
pub fn m_to_yd(m: f64) -> f64 {
    m * 1.09361
}

/// Round half away from zero to 2 decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Projected ball speed, in the unit of `club_head_speed`.
pub fn projected_ball_speed(club_head_speed: Option<f64>) -> Option<f64> {
    club_head_speed.map(|s| round2(s / BALL_SPEED_DIVISOR))
}

/// Projected carry distance (yd) for a club-head speed (m/s) and launch
/// angle (deg).
///
/// `carry_m = s² / g · sin(2θ)`. Angles outside 0..=90° are not clamped: a
/// negative angle gives a negative carry and angles past 45° shorten it.
pub fn projected_carry_distance(
    club_head_speed: Option<f64>,
    launch_angle_deg: Option<f64>,
) -> Option<f64> {
    let (s, a) = (club_head_speed?, launch_angle_deg?);
    let carry_m = s * s / GRAVITY * (2.0 * a * std::f64::consts::PI / 180.0).sin();
    Some(round2(m_to_yd(carry_m)))
}
