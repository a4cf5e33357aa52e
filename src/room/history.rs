//! Command History: bounded ring of finalized per-tick command batches,
//! used to catch up reconnecting players.

use std::collections::BTreeMap;

use crate::command::Command;

/// Finalized, ordered command batches keyed by tick.
#[derive(Debug, Default)]
pub struct CommandHistory {
    batches: BTreeMap<u64, Vec<Command>>,
    retention_ticks: u64,
}

impl CommandHistory {
    pub fn new(retention_ticks: u64) -> Self {
        Self {
            batches: BTreeMap::new(),
            retention_ticks,
        }
    }

    /// Append a just-finalized, already-ordered batch and evict anything
    /// older than `tick - retention_ticks`.
    pub fn record(&mut self, tick: u64, ordered: Vec<Command>) {
        self.batches.insert(tick, ordered);
        let floor = tick.saturating_sub(self.retention_ticks);
        self.batches = self.batches.split_off(&floor);
    }

    /// Entries with `tick in [from_tick, current_tick)`, ascending.
    pub fn recent_from(&self, from_tick: u64, current_tick: u64) -> Vec<(u64, Vec<Command>)> {
        self.batches
            .range(from_tick..current_tick)
            .map(|(tick, commands)| (*tick, commands.clone()))
            .collect()
    }

    /// Oldest tick still retained, if any.
    pub fn oldest_tick(&self) -> Option<u64> {
        self.batches.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerId;

    fn cmd(tick: u64) -> Command {
        Command {
            kind: "move".to_string(),
            data: serde_json::json!({}),
            player_id: PlayerId::new("a"),
            tick,
            sequence: None,
        }
    }

    #[test]
    fn retains_at_most_retention_ticks() {
        let mut history = CommandHistory::new(5);
        for t in 0..20 {
            history.record(t, vec![cmd(t)]);
        }
        assert_eq!(history.oldest_tick(), Some(15));
        assert!(history.len() <= 6);
    }

    #[test]
    fn recent_from_is_half_open_and_ascending() {
        let mut history = CommandHistory::new(200);
        for t in 0..10 {
            history.record(t, vec![cmd(t)]);
        }
        let recent = history.recent_from(5, 10);
        let ticks: Vec<u64> = recent.iter().map(|(t, _)| *t).collect();
        assert_eq!(ticks, vec![5, 6, 7, 8, 9]);
    }
}
