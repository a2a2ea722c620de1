//! Experience replay buffer.

use std::collections::VecDeque;

use rand::seq::index;
use rand::Rng;

/// A single stored transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Flattened state before the action.
    pub state: Vec<f32>,
    /// Joint action index.
    pub action: usize,
    /// Step reward.
    pub reward: f32,
    /// Flattened state after the action.
    pub next_state: Vec<f32>,
    /// Whether the episode ended on this step.
    pub done: bool,
}

impl Transition {
    /// True if every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.reward.is_finite()
            && self.state.iter().all(|v| v.is_finite())
            && self.next_state.iter().all(|v| v.is_finite())
    }
}

/// Bounded FIFO store of transitions.
///
/// Once full, each push evicts the oldest transition.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    transitions: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    /// Creates an empty buffer holding at most `capacity` transitions.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Replay capacity must be positive");
        Self {
            transitions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a transition, evicting the oldest one when full.
    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() == self.capacity {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition);
    }

    /// Samples `batch_size` distinct transitions uniformly.
    ///
    /// Returns `None` when fewer than `batch_size` transitions are stored.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Option<Vec<&Transition>> {
        if batch_size == 0 || self.transitions.len() < batch_size {
            return None;
        }
        let picked = index::sample(rng, self.transitions.len(), batch_size);
        Some(picked.iter().map(|i| &self.transitions[i]).collect())
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.transitions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(action: usize) -> Transition {
        Transition {
            state: vec![0.0; 2],
            action,
            reward: -1.0,
            next_state: vec![0.0; 2],
            done: false,
        }
    }

    #[test]
    fn buffer_evicts_oldest_when_full() {
        let mut buf = ReplayBuffer::new(3);
        for a in 0..5 {
            buf.push(t(a));
        }
        assert_eq!(buf.len(), 3);
        let actions: Vec<usize> = buf.iter().map(|t| t.action).collect();
        assert_eq!(actions, vec![2, 3, 4]);
    }

    #[test]
    fn sample_requires_enough_transitions() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut buf = ReplayBuffer::new(10);
        buf.push(t(0));
        assert!(buf.sample(2, &mut rng).is_none());
        buf.push(t(1));
        assert_eq!(buf.sample(2, &mut rng).map(|b| b.len()), Some(2));
    }

    #[test]
    fn sample_has_no_duplicates() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut buf = ReplayBuffer::new(100);
        for a in 0..50 {
            buf.push(t(a));
        }
        let batch = buf.sample(50, &mut rng).unwrap();
        let mut actions: Vec<usize> = batch.iter().map(|t| t.action).collect();
        actions.sort_unstable();
        assert_eq!(actions, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn non_finite_transition_detected() {
        let mut bad = t(0);
        assert!(bad.is_finite());
        bad.reward = f32::NAN;
        assert!(!bad.is_finite());
        let mut bad = t(0);
        bad.next_state[1] = f32::INFINITY;
        assert!(!bad.is_finite());
    }

    #[test]
    fn clear_empties_buffer() {
        let mut buf = ReplayBuffer::new(4);
        buf.push(t(0));
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 4);
    }
}
