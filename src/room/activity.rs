//! Activity Tracker: detect laggy or dead players.
//!
//! All thresholds are real-time `Duration`s, already converted from tick
//! counts to milliseconds by `RoomConfig` using the configured `tickRate`.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

use crate::player::PlayerId;

/// What an activity check discovered for one player this pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityEvent {
    /// Crossed the disconnect threshold; caller must mark the player
    /// disconnected and emit `player-timeout`.
    TimedOut,
    /// Crossed the lag threshold for the first time since last active;
    /// caller must emit `player-lagging`.
    StartedLagging,
}

/// Per-player last-seen clock plus the "currently lagging" set, so a lag
/// notification fires only once per lag episode.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    last_activity: BTreeMap<PlayerId, Instant>,
    lagging: BTreeSet<PlayerId>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any inbound message from a player, including transport keep-alives,
    /// refreshes its clock and silently clears a lagging flag.
    pub fn record_activity(&mut self, player: &PlayerId, now: Instant) {
        self.last_activity.insert(player.clone(), now);
        self.lagging.remove(player);
    }

    pub fn register(&mut self, player: &PlayerId, now: Instant) {
        self.last_activity.insert(player.clone(), now);
    }

    pub fn forget(&mut self, player: &PlayerId) {
        self.last_activity.remove(player);
        self.lagging.remove(player);
    }

    pub fn ms_since_last_activity(&self, player: &PlayerId, now: Instant) -> Option<Duration> {
        self.last_activity.get(player).map(|&t| now.saturating_duration_since(t))
    }

    /// Evaluate every currently-tracked player against the lag and
    /// disconnect thresholds. Returns events for players whose state
    /// changed this pass; a timed-out player is removed from the lagging
    /// set as part of the transition.
    pub fn check(
        &mut self,
        now: Instant,
        lag_threshold: Duration,
        disconnect_threshold: Duration,
    ) -> Vec<(PlayerId, ActivityEvent)> {
        let mut events = Vec::new();
        for (player, &last) in self.last_activity.iter() {
            let elapsed = now.saturating_duration_since(last);
            if elapsed >= disconnect_threshold {
                self.lagging.remove(player);
                events.push((player.clone(), ActivityEvent::TimedOut));
            } else if elapsed >= lag_threshold && !self.lagging.contains(player) {
                self.lagging.insert(player.clone());
                events.push((player.clone(), ActivityEvent::StartedLagging));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_fires_once_per_episode() {
        let mut tracker = ActivityTracker::new();
        let p = PlayerId::new("a");
        let t0 = Instant::now();
        tracker.register(&p, t0);

        let lag = Duration::from_millis(100);
        let disconnect = Duration::from_millis(1000);

        let events = tracker.check(t0 + Duration::from_millis(150), lag, disconnect);
        assert_eq!(events, vec![(p.clone(), ActivityEvent::StartedLagging)]);

        // Still lagging, below disconnect: no repeat notification.
        let events = tracker.check(t0 + Duration::from_millis(200), lag, disconnect);
        assert!(events.is_empty());
    }

    #[test]
    fn activity_clears_lag_silently() {
        let mut tracker = ActivityTracker::new();
        let p = PlayerId::new("a");
        let t0 = Instant::now();
        tracker.register(&p, t0);
        let lag = Duration::from_millis(100);
        let disconnect = Duration::from_millis(1000);
        tracker.check(t0 + Duration::from_millis(150), lag, disconnect);

        tracker.record_activity(&p, t0 + Duration::from_millis(160));
        let events = tracker.check(t0 + Duration::from_millis(170), lag, disconnect);
        assert!(events.is_empty());
    }

    #[test]
    fn disconnect_threshold_overrides_lag_and_fires_timeout() {
        let mut tracker = ActivityTracker::new();
        let p = PlayerId::new("a");
        let t0 = Instant::now();
        tracker.register(&p, t0);
        let lag = Duration::from_millis(100);
        let disconnect = Duration::from_millis(500);

        let events = tracker.check(t0 + Duration::from_millis(600), lag, disconnect);
        assert_eq!(events, vec![(p, ActivityEvent::TimedOut)]);
    }
}
