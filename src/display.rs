//! Render-facing view of a result.
//!
//! Turns a [`LaunchResult`] into the unit-converted strings the dashboard
//! shows and picks the diagnostic images that go with it. No markup is
//! produced here.

use std::fmt;

use serde::Serialize;

use crate::protocol::{ClubType, LaunchResult, ResultKind};

/// Placeholder for values that are not available.
pub const NOT_AVAILABLE: &str = "--";

/// Back-spin at or above this magnitude is treated as a measurement error.
pub const MAX_PLAUSIBLE_SPIN_RPM: i32 = 100_000;

/// m/s → mph
pub fn mps_to_mph(mps: f64) -> f64 {
    mps * 2.23694
}

/// Display strings for one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultView {
    pub carry: String,
    pub speed: String,
    pub launch_angle: String,
    pub side_angle: String,
    pub back_spin: String,
    pub side_spin: String,
    pub confidence: String,
    pub club: String,
    pub result_type: String,
    pub message: String,
    pub log_lines: Vec<String>,
    /// Ball is teed and the monitor is armed.
    pub ball_ready: bool,
    /// Putter mode is active (drives button highlighting).
    pub putter_selected: bool,
}

impl ResultView {
    pub fn from_result(r: &LaunchResult) -> Self {
        let speed_mph = mps_to_mph(r.speed_mps);
        let putter = r.club_type == ClubType::Putter;
        let na = || NOT_AVAILABLE.to_owned();

        let club = match r.club_type {
            ClubType::NotSelected => String::new(),
            other => other.label().to_owned(),
        };

        // Carry is not computed by the pipeline yet.
        let carry = if club.is_empty() {
            na()
        } else {
            format!("{NOT_AVAILABLE}  ({club})")
        };

        let (speed, launch_angle, side_angle, back_spin, side_spin, confidence) =
            if speed_mph.abs() > 0.001 {
                let (speed, launch) = if putter {
                    (format!("{speed_mph:.2} mph"), na())
                } else {
                    (
                        format!("{speed_mph:.1} mph"),
                        format!("{:.1}°", r.launch_angle_deg),
                    )
                };
                let (back, side) = spin_strings(r, putter);
                (
                    speed,
                    launch,
                    format!("{:.1}°", r.side_angle_deg),
                    back,
                    side,
                    r.confidence.to_string(),
                )
            } else {
                (na(), na(), na(), na(), na(), na())
            };

        let message = match r.message.as_deref() {
            Some(m) if !m.is_empty() => m.to_owned(),
            _ => na(),
        };

        Self {
            carry,
            speed,
            launch_angle,
            side_angle,
            back_spin,
            side_spin,
            confidence,
            club,
            result_type: r.kind.description().to_owned(),
            message,
            log_lines: r.log_lines.clone(),
            ball_ready: r.kind == ResultKind::BallPlacedReadyForHit,
            putter_selected: putter,
        }
    }
}

/// Spin does not mean much for a putt, and zero back-spin means spin analysis
/// did not run.
fn spin_strings(r: &LaunchResult, putter: bool) -> (String, String) {
    if putter || r.back_spin_rpm == 0 {
        return (NOT_AVAILABLE.to_owned(), NOT_AVAILABLE.to_owned());
    }
    if r.back_spin_rpm.abs() >= MAX_PLAUSIBLE_SPIN_RPM {
        let err = "err-out of range".to_owned();
        return (err.clone(), err);
    }
    // Negative side spin is reported as R.
    let direction = if r.side_spin_rpm < 0 { "R" } else { "L" };
    (
        format!("{} rpm", r.back_spin_rpm),
        format!("{direction} {} rpm", r.side_spin_rpm.unsigned_abs()),
    )
}

impl fmt::Display for ResultView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] carry {} | speed {} | launch {} | side {} | back spin {} | side spin {} | confidence {}",
            self.result_type,
            self.carry,
            self.speed,
            self.launch_angle,
            self.side_angle,
            self.back_spin,
            self.side_spin,
            self.confidence,
        )?;
        if self.message != NOT_AVAILABLE {
            write!(f, " | {}", self.message)?;
        }
        Ok(())
    }
}

/// Where the pipeline drops its diagnostic images.
///
/// File names include their extension; empty names are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayAssets {
    pub share_directory: String,
    pub exposure_candidates: String,
    pub spin_ball_1: String,
    pub spin_ball_2: String,
    pub ball_rotated: String,
    pub error_exposures: String,
    pub ball_search_area: String,
}

impl DisplayAssets {
    /// Image paths relevant to `r`, in display order.
    pub fn images_for(&self, r: &LaunchResult) -> Vec<String> {
        let names: Vec<&str> = match r.kind {
            ResultKind::Hit if r.club_type == ClubType::Driver => vec![
                self.spin_ball_1.as_str(),
                self.spin_ball_2.as_str(),
                self.ball_rotated.as_str(),
                self.exposure_candidates.as_str(),
            ],
            ResultKind::Hit => vec![self.exposure_candidates.as_str()],
            ResultKind::Error => vec![
                self.exposure_candidates.as_str(),
                self.error_exposures.as_str(),
            ],
            ResultKind::WaitingForBallToAppear => vec![self.ball_search_area.as_str()],
            _ => Vec::new(),
        };
        names
            .into_iter()
            .filter(|n| !n.is_empty())
            .map(|n| self.path(n))
            .collect()
    }

    fn path(&self, name: &str) -> String {
        if self.share_directory.is_empty() {
            name.to_owned()
        } else {
            format!("{}/{}", self.share_directory.trim_end_matches('/'), name)
        }
    }
}
