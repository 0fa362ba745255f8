use std::collections::HashSet;

use tracing::debug;

use crate::models::{PlaybackState, PlayerId};

/// Which players are playing, and in what order the rest stopped.
///
/// A player lives in at most one of the two containers. `not_playing` never holds
/// duplicates and its last element is the player that most recently stopped.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    playing: HashSet<PlayerId>,
    not_playing: Vec<PlayerId>,
}

/// Read-only view of the registry, borrowed for the length of one dispatch.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub playing: &'a HashSet<PlayerId>,
    pub not_playing: &'a [PlayerId],
}

impl<'a> Snapshot<'a> {
    /// The player that most recently stopped playing.
    pub fn most_recent_idle(&self) -> Option<&'a PlayerId> {
        self.not_playing.last()
    }
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_playing(&mut self, id: &PlayerId) {
        self.not_playing.retain(|p| p != id);
        if self.playing.insert(id.clone()) {
            debug!("{id} marked as playing");
        }
    }

    /// Re-marking a player that is already idle keeps its recency position.
    pub fn mark_not_playing(&mut self, id: &PlayerId) {
        self.playing.remove(id);
        if !self.not_playing.contains(id) {
            self.not_playing.push(id.clone());
            debug!("{id} marked as not playing");
        }
    }

    pub fn record(&mut self, id: &PlayerId, state: PlaybackState) {
        match state {
            PlaybackState::Playing => self.mark_playing(id),
            PlaybackState::NotPlaying => self.mark_not_playing(id),
        }
    }

    pub fn remove(&mut self, id: &PlayerId) {
        let was_playing = self.playing.remove(id);
        let len = self.not_playing.len();
        self.not_playing.retain(|p| p != id);
        if was_playing || self.not_playing.len() != len {
            debug!("{id} removed");
        }
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            playing: &self.playing,
            not_playing: &self.not_playing,
        }
    }

    pub fn len(&self) -> usize {
        self.playing.len() + self.not_playing.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> PlayerId {
        PlayerId::from(name)
    }

    fn assert_invariants(registry: &PlayerRegistry) {
        let snap = registry.snapshot();
        for p in snap.not_playing {
            assert!(!snap.playing.contains(p), "{p} is in both containers");
        }
        let unique: HashSet<_> = snap.not_playing.iter().collect();
        assert_eq!(unique.len(), snap.not_playing.len(), "duplicate in not_playing");
    }

    #[test]
    fn test_mark_playing_moves_out_of_idle() {
        let mut registry = PlayerRegistry::new();
        registry.mark_not_playing(&id(":1.1"));
        registry.mark_playing(&id(":1.1"));

        let snap = registry.snapshot();
        assert!(snap.playing.contains(&id(":1.1")));
        assert!(snap.not_playing.is_empty());
        assert_invariants(&registry);
    }

    #[test]
    fn test_mark_playing_is_idempotent() {
        let mut registry = PlayerRegistry::new();
        registry.mark_playing(&id(":1.1"));
        registry.mark_playing(&id(":1.1"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_not_playing_keeps_recency_order() {
        let mut registry = PlayerRegistry::new();
        registry.mark_playing(&id(":1.1"));
        registry.mark_playing(&id(":1.2"));
        registry.mark_not_playing(&id(":1.2"));
        registry.mark_not_playing(&id(":1.1"));

        let snap = registry.snapshot();
        assert_eq!(snap.not_playing, &[id(":1.2"), id(":1.1")]);
        assert_eq!(snap.most_recent_idle(), Some(&id(":1.1")));
    }

    #[test]
    fn test_remark_not_playing_keeps_position() {
        let mut registry = PlayerRegistry::new();
        registry.mark_not_playing(&id("X"));
        registry.mark_not_playing(&id("Y"));
        registry.mark_not_playing(&id("X"));

        assert_eq!(registry.snapshot().not_playing, &[id("X"), id("Y")]);
        assert_invariants(&registry);
    }

    #[test]
    fn test_playing_then_stopping_moves_to_tail() {
        let mut registry = PlayerRegistry::new();
        registry.mark_not_playing(&id("X"));
        registry.mark_not_playing(&id("Y"));
        registry.mark_playing(&id("X"));
        registry.mark_not_playing(&id("X"));

        assert_eq!(registry.snapshot().not_playing, &[id("Y"), id("X")]);
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = PlayerRegistry::new();
        registry.mark_playing(&id("A"));
        registry.remove(&id("B"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_resets_history() {
        let mut registry = PlayerRegistry::new();
        registry.mark_not_playing(&id("X"));
        registry.mark_not_playing(&id("Y"));
        registry.remove(&id("X"));
        registry.mark_not_playing(&id("X"));

        assert_eq!(registry.snapshot().not_playing, &[id("Y"), id("X")]);

        registry.mark_playing(&id("Y"));
        registry.remove(&id("Y"));
        assert!(registry.snapshot().playing.is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_invariants_hold_over_mixed_sequence() {
        let mut registry = PlayerRegistry::new();
        let names = ["A", "B", "C", "D"];

        // Deterministic walk through every operation on every player.
        for step in 0..200usize {
            let target = id(names[(step * 7 + step / 3) % names.len()]);
            match (step * 13) % 5 {
                0 | 1 => registry.mark_playing(&target),
                2 | 3 => registry.mark_not_playing(&target),
                _ => registry.remove(&target),
            }
            assert_invariants(&registry);
        }
    }

    #[test]
    fn test_record_maps_state() {
        let mut registry = PlayerRegistry::new();
        registry.record(&id("A"), PlaybackState::Playing);
        registry.record(&id("B"), PlaybackState::NotPlaying);

        let snap = registry.snapshot();
        assert!(snap.playing.contains(&id("A")));
        assert_eq!(snap.not_playing, &[id("B")]);
    }
}
