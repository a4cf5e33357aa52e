//! Command Buffer: in-flight, not-yet-finalized command submissions.
//!
//! A `Map<tick -> Map<playerId -> Command[]>>` plus a parallel
//! submission-tracking set. A single Match Room owns one buffer and mutates
//! it only from its own task; the Gateway never reaches in directly.

use std::collections::{BTreeMap, BTreeSet};

use crate::command::Command;
use crate::player::PlayerId;

/// Holds submissions for ticks that have not yet been finalized.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    pending: BTreeMap<u64, BTreeMap<PlayerId, Vec<Command>>>,
    submitted: BTreeMap<u64, BTreeSet<PlayerId>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a submission, overwriting any prior submission for (player, tick).
    /// Last-writer-wins: a later submission overwrites the prior one for this
    /// (player, tick).
    pub fn submit(&mut self, tick: u64, player: PlayerId, commands: Vec<Command>) {
        self.submitted.entry(tick).or_default().insert(player.clone());
        self.pending.entry(tick).or_default().insert(player, commands);
    }

    /// True if this (player, tick) has already submitted once this window.
    pub fn has_submitted(&self, tick: u64, player: &PlayerId) -> bool {
        self.submitted
            .get(&tick)
            .map(|set| set.contains(player))
            .unwrap_or(false)
    }

    /// Take every command submitted for `tick`, flattened into one list, in
    /// whatever per-player order they arrived. Ordering is applied by the
    /// caller (the Room) using `order_commands`.
    pub fn take_tick(&mut self, tick: u64) -> Vec<Command> {
        self.submitted.remove(&tick);
        self.pending
            .remove(&tick)
            .map(|by_player| by_player.into_values().flatten().collect())
            .unwrap_or_default()
    }

    /// Drop every tick strictly less than `floor` (called right after a
    /// tick's own entry is taken and broadcast).
    pub fn prune_before(&mut self, floor: u64) {
        self.pending = self.pending.split_off(&floor);
        self.submitted = self.submitted.split_off(&floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(kind: &str) -> Command {
        Command {
            kind: kind.to_string(),
            data: serde_json::json!({}),
            player_id: PlayerId::new("a"),
            tick: 0,
            sequence: None,
        }
    }

    #[test]
    fn later_submission_overwrites_earlier_for_same_player_and_tick() {
        let mut buf = CommandBuffer::new();
        let p = PlayerId::new("a");
        buf.submit(10, p.clone(), vec![cmd("move")]);
        buf.submit(10, p.clone(), vec![cmd("attack")]);
        let commands = buf.take_tick(10);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].kind, "attack");
    }

    #[test]
    fn take_tick_removes_submission_tracking() {
        let mut buf = CommandBuffer::new();
        let p = PlayerId::new("a");
        buf.submit(5, p.clone(), vec![]);
        assert!(buf.has_submitted(5, &p));
        buf.take_tick(5);
        assert!(!buf.has_submitted(5, &p));
    }

    #[test]
    fn prune_before_drops_only_older_ticks() {
        let mut buf = CommandBuffer::new();
        buf.submit(1, PlayerId::new("a"), vec![]);
        buf.submit(2, PlayerId::new("a"), vec![]);
        buf.submit(3, PlayerId::new("a"), vec![]);
        buf.prune_before(2);
        assert!(!buf.has_submitted(1, &PlayerId::new("a")));
        assert!(buf.has_submitted(2, &PlayerId::new("a")));
        assert!(buf.has_submitted(3, &PlayerId::new("a")));
    }
}
