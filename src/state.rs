//! Displayed-result state machine.
//!
//! [`DisplayState`] is the pure merge/staleness logic. [`Monitor`] wraps it in
//! a single mutex and is the handle shared between the receive loop and the
//! render path.
//!
//! There is no separate state enum: the state is the current
//! [`LaunchResult`] plus the seconds since the last result message. The
//! initial state and the post-staleness state are both the default record.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::protocol::{ClubType, ControlCommand, LaunchResult};
use crate::publisher::ControlSink;

/// Seconds without a result message before the display is cleared.
pub const DEFAULT_STALE_AFTER_SECS: u32 = 60;
/// Seconds added per render tick.
pub const DEFAULT_TICK_SECS: u32 = 2;

/// Outcome of applying a result to the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    /// The incoming result became the displayed one.
    Replaced,
    /// The displayed result was kept; only its club type was updated.
    Kept,
}

#[derive(Debug, Clone)]
pub struct DisplayState {
    current: LaunchResult,
    secs_since_update: u32,
    stale_after_secs: u32,
}

impl DisplayState {
    pub fn new(stale_after_secs: u32) -> Self {
        Self {
            current: LaunchResult::default(),
            secs_since_update: 0,
            stale_after_secs,
        }
    }

    pub fn current(&self) -> &LaunchResult {
        &self.current
    }

    pub fn secs_since_update(&self) -> u32 {
        self.secs_since_update
    }

    /// Overwrite only the club type of the displayed result.
    pub fn set_club(&mut self, club: ClubType) {
        self.current.club_type = club;
    }

    /// Apply an incoming result.
    ///
    /// The staleness counter resets and the club type is taken from `incoming`
    /// whatever the outcome. An idle display always takes the new result. A
    /// display showing a hit or an error only gives way to an informative one.
    pub fn apply(&mut self, incoming: LaunchResult) -> Merge {
        self.secs_since_update = 0;
        self.current.club_type = incoming.club_type;

        if self.current.is_idle() || incoming.is_informative() {
            self.current = incoming;
            Merge::Replaced
        } else {
            Merge::Kept
        }
    }

    /// Advance the staleness counter by `delta_secs`. Returns true when the
    /// display was cleared.
    pub fn advance(&mut self, delta_secs: u32) -> bool {
        self.secs_since_update = self.secs_since_update.saturating_add(delta_secs);
        if self.secs_since_update > self.stale_after_secs {
            self.current = LaunchResult::default();
            self.secs_since_update = 0;
            true
        } else {
            false
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_SECS)
    }
}

/// Shared handle over the display state.
///
/// Construct once at startup, wrap in an `Arc`, and hand clones to the
/// consumer and the render path.
pub struct Monitor {
    state: Mutex<DisplayState>,
    tick_secs: u32,
    control: Option<Box<dyn ControlSink>>,
}

impl Monitor {
    pub fn new(stale_after_secs: u32, tick_secs: u32) -> Self {
        Self {
            state: Mutex::new(DisplayState::new(stale_after_secs)),
            tick_secs,
            control: None,
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(config.stale_after_secs, config.refresh_secs)
    }

    /// Attach the outbound control path used by [`on_club_changed`](Self::on_club_changed).
    pub fn with_control(mut self, sink: Box<dyn ControlSink>) -> Self {
        self.control = Some(sink);
        self
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        // Every mutation replaces whole values, so a poisoned guard still
        // holds a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Operator picked a club: reflect it immediately and tell the pipeline.
    ///
    /// The command is queued outside the state lock and sent in the
    /// background; a failure is logged only.
    pub fn on_club_changed(&self, club: ClubType) {
        self.lock().set_club(club);
        info!(club = club.label(), "club changed");

        if let Some(sink) = &self.control {
            if let Err(e) = sink.send_control(&ControlCommand::ClubChange(club)) {
                warn!(error = %e, "failed to publish club change");
            }
        }
    }

    pub fn on_result_received(&self, result: LaunchResult) -> Merge {
        let kind = result.kind;
        let merge = self.lock().apply(result);
        debug!(?kind, ?merge, "result received");
        merge
    }

    /// Advance the staleness counter. Returns true when the display was cleared.
    pub fn on_tick(&self, delta_secs: u32) -> bool {
        let cleared = self.lock().advance(delta_secs);
        if cleared {
            info!("no results within staleness window; display cleared");
        }
        cleared
    }

    /// Advance by the configured tick size.
    pub fn tick(&self) -> bool {
        self.on_tick(self.tick_secs)
    }

    pub fn tick_secs(&self) -> u32 {
        self.tick_secs
    }

    /// Copy of the displayed result.
    pub fn snapshot(&self) -> LaunchResult {
        self.lock().current().clone()
    }

    pub fn secs_since_update(&self) -> u32 {
        self.lock().secs_since_update()
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_AFTER_SECS, DEFAULT_TICK_SECS)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::protocol::ResultKind;
    use crate::transport::TransportError;

    fn result(speed: f64, kind: ResultKind, club: ClubType) -> LaunchResult {
        LaunchResult {
            carry_meters: if speed > 0.0 { 150 } else { 0 },
            speed_mps: speed,
            launch_angle_deg: 12.0,
            back_spin_rpm: 3000,
            club_type: club,
            kind,
            message: Some(format!("{kind:?}")),
            ..Default::default()
        }
    }

    fn state_showing(r: LaunchResult) -> DisplayState {
        let mut s = DisplayState::default();
        assert_eq!(s.apply(r), Merge::Replaced);
        s
    }

    #[test]
    fn idle_display_takes_hit() {
        let mut s = DisplayState::default();
        let hit = result(45.2, ResultKind::Hit, ClubType::Driver);
        assert_eq!(s.apply(hit.clone()), Merge::Replaced);
        assert_eq!(s.current(), &hit);
    }

    #[test]
    fn hit_survives_waiting_chatter() {
        let hit = result(45.2, ResultKind::Hit, ClubType::Driver);
        let mut s = state_showing(hit.clone());

        let waiting = result(0.0, ResultKind::WaitingForBallToAppear, ClubType::Putter);
        assert_eq!(s.apply(waiting), Merge::Kept);

        let expected = LaunchResult {
            club_type: ClubType::Putter,
            ..hit
        };
        assert_eq!(s.current(), &expected);
    }

    #[test]
    fn hit_replaced_by_ball_placed() {
        let mut s = state_showing(result(45.2, ResultKind::Hit, ClubType::Driver));
        let placed = result(0.0, ResultKind::BallPlacedReadyForHit, ClubType::Driver);
        assert_eq!(s.apply(placed.clone()), Merge::Replaced);
        assert_eq!(s.current(), &placed);
    }

    #[test]
    fn error_replaced_by_hit() {
        let mut s = state_showing(result(0.0, ResultKind::Error, ClubType::Iron));
        let hit = result(30.0, ResultKind::Hit, ClubType::Iron);
        assert_eq!(s.apply(hit.clone()), Merge::Replaced);
        assert_eq!(s.current(), &hit);
    }

    #[test]
    fn error_survives_uninteresting_kinds() {
        let err = result(0.0, ResultKind::Error, ClubType::Driver);
        for kind in [
            ResultKind::Unknown,
            ResultKind::WaitingForBallToAppear,
            ResultKind::PausingForStabilization,
            ResultKind::MultipleBallsPresent,
            ResultKind::Hit,
            ResultKind::CalibrationResults,
        ] {
            let mut s = state_showing(err.clone());
            assert_eq!(s.apply(result(0.0, kind, ClubType::Driver)), Merge::Kept, "{kind:?}");
            assert_eq!(s.current(), &err);
        }
    }

    #[test]
    fn informative_kinds_displace_hit() {
        for kind in [
            ResultKind::BallPlacedReadyForHit,
            ResultKind::Initializing,
            ResultKind::Error,
        ] {
            let mut s = state_showing(result(50.0, ResultKind::Hit, ClubType::Driver));
            assert_eq!(s.apply(result(0.0, kind, ClubType::Driver)), Merge::Replaced);
            assert_eq!(s.current().kind, kind);
        }
    }

    #[test]
    fn idle_display_takes_anything() {
        let mut s = DisplayState::default();
        let waiting = result(0.0, ResultKind::WaitingForBallToAppear, ClubType::NotSelected);
        assert_eq!(s.apply(waiting.clone()), Merge::Replaced);
        assert_eq!(s.current(), &waiting);
    }

    #[test]
    fn apply_resets_counter_even_when_kept() {
        let mut s = state_showing(result(45.2, ResultKind::Hit, ClubType::Driver));
        s.advance(40);
        assert_eq!(s.secs_since_update(), 40);
        s.apply(result(0.0, ResultKind::WaitingForBallToAppear, ClubType::Driver));
        assert_eq!(s.secs_since_update(), 0);
    }

    #[test]
    fn staleness_clears_display() {
        let mut s = state_showing(result(45.2, ResultKind::Hit, ClubType::Driver));
        for _ in 0..30 {
            assert!(!s.advance(2));
        }
        assert_eq!(s.secs_since_update(), 60);
        assert_eq!(s.current().kind, ResultKind::Hit);

        assert!(s.advance(2));
        assert_eq!(s.current(), &LaunchResult::default());
        assert_eq!(s.secs_since_update(), 0);
    }

    #[test]
    fn advance_saturates() {
        let mut s = DisplayState::new(u32::MAX);
        s.advance(u32::MAX);
        assert!(!s.advance(5));
        assert_eq!(s.secs_since_update(), u32::MAX);
    }

    struct RecordingSink {
        sent: Mutex<Vec<ControlCommand>>,
        fail: bool,
    }

    impl ControlSink for Arc<RecordingSink> {
        fn send_control(&self, cmd: &ControlCommand) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(*cmd);
            if self.fail {
                Err(TransportError::Disconnected)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn club_change_touches_only_club() {
        let sink = Arc::new(RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail: false,
        });
        let monitor = Monitor::default().with_control(Box::new(Arc::clone(&sink)));
        let hit = result(45.2, ResultKind::Hit, ClubType::Driver);
        monitor.on_result_received(hit.clone());

        monitor.on_club_changed(ClubType::Putter);

        let expected = LaunchResult {
            club_type: ClubType::Putter,
            ..hit
        };
        assert_eq!(monitor.snapshot(), expected);
        assert_eq!(
            *sink.sent.lock().unwrap(),
            vec![ControlCommand::ClubChange(ClubType::Putter)]
        );
    }

    #[test]
    fn club_change_on_idle_display() {
        let monitor = Monitor::default();
        monitor.on_club_changed(ClubType::Putter);
        let expected = LaunchResult {
            club_type: ClubType::Putter,
            ..Default::default()
        };
        assert_eq!(monitor.snapshot(), expected);
    }

    #[test]
    fn publish_failure_is_not_propagated() {
        let sink = Arc::new(RecordingSink {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let monitor = Monitor::default().with_control(Box::new(Arc::clone(&sink)));
        monitor.on_club_changed(ClubType::Driver);
        assert_eq!(monitor.snapshot().club_type, ClubType::Driver);
        assert_eq!(sink.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn monitor_tick_uses_configured_step() {
        let monitor = Monitor::new(10, 4);
        monitor.on_result_received(result(20.0, ResultKind::Hit, ClubType::Iron));
        assert!(!monitor.tick());
        assert!(!monitor.tick());
        assert_eq!(monitor.secs_since_update(), 8);
        assert!(monitor.tick());
        assert_eq!(monitor.snapshot(), LaunchResult::default());
        assert_eq!(monitor.secs_since_update(), 0);
    }

    #[test]
    fn snapshot_is_consistent_under_concurrent_writes() {
        let monitor = Arc::new(Monitor::default());
        let writer = {
            let monitor = Arc::clone(&monitor);
            std::thread::spawn(move || {
                for i in 0..500 {
                    let speed = f64::from(i % 50 + 1);
                    monitor.on_result_received(LaunchResult {
                        speed_mps: speed,
                        carry_meters: (speed * 3.0) as i32,
                        kind: ResultKind::Hit,
                        ..Default::default()
                    });
                }
            })
        };
        for _ in 0..500 {
            let snap = monitor.snapshot();
            if snap.kind == ResultKind::Hit {
                assert_eq!(snap.carry_meters, (snap.speed_mps * 3.0) as i32);
            }
            monitor.on_tick(0);
        }
        writer.join().unwrap();
    }
}
