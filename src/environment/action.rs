//! Joint discrete action encoding.
//!
//! A joint action is a mixed-radix number with one base-`range^2` digit per
//! agent, agent 0 in the least significant position. Each digit `d` maps to
//! the offset `(d % range - range/2, d / range - range/2)`, so digit
//! `range^2 / 2` is "no movement".
//!
//! The space grows as `(range^2)^n_agents`. That exponential growth is the
//! practical limit on agent count; construction refuses spaces larger than
//! [`ActionSpace::MAX_ACTIONS`].

use crate::error::ConfigError;
use crate::types::Displacement;

/// Bijection between joint action indices and per-agent displacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSpace {
    range: usize,
    n_agents: usize,
    size: usize,
}

impl ActionSpace {
    /// Largest joint action space the learner will enumerate.
    pub const MAX_ACTIONS: usize = 1 << 20;

    /// Creates the action space for `n_agents` agents with a `range` x `range`
    /// move neighborhood each.
    pub fn new(range: usize, n_agents: usize) -> Result<Self, ConfigError> {
        if n_agents == 0 {
            return Err(ConfigError::NoAgents);
        }
        if range == 0 || range % 2 == 0 {
            return Err(ConfigError::InvalidActionRange(range));
        }
        let size = Self::size_for(range, n_agents).ok_or(ConfigError::ActionSpaceTooLarge {
            range,
            agents: n_agents,
            max: Self::MAX_ACTIONS,
        })?;
        Ok(Self {
            range,
            n_agents,
            size,
        })
    }

    /// `(range^2)^n_agents`, or `None` if it overflows or exceeds [`Self::MAX_ACTIONS`].
    pub fn size_for(range: usize, n_agents: usize) -> Option<usize> {
        let per_agent = range.checked_mul(range)?;
        let size = per_agent.checked_pow(u32::try_from(n_agents).ok()?)?;
        (size <= Self::MAX_ACTIONS).then_some(size)
    }

    /// Number of joint actions.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Moves available to a single agent.
    pub fn moves_per_agent(&self) -> usize {
        self.range * self.range
    }

    pub fn range(&self) -> usize {
        self.range
    }

    pub fn n_agents(&self) -> usize {
        self.n_agents
    }

    /// Joint action in which no agent moves.
    pub fn stay(&self) -> usize {
        self.encode(&vec![Displacement::zero(); self.n_agents])
    }

    /// Decodes a joint action into one displacement per agent.
    ///
    /// # Panics
    ///
    /// Panics if `action >= self.size()`.
    pub fn decode(&self, action: usize) -> Vec<Displacement> {
        assert!(
            action < self.size,
            "Action index {} out of range for action space of size {}",
            action,
            self.size
        );
        let base = self.moves_per_agent();
        let half = (self.range / 2) as i64;
        let mut rest = action;
        (0..self.n_agents)
            .map(|_| {
                let digit = rest % base;
                rest /= base;
                Displacement::new(
                    (digit % self.range) as i64 - half,
                    (digit / self.range) as i64 - half,
                )
            })
            .collect()
    }

    /// Checked variant of [`ActionSpace::decode`].
    pub fn try_decode(&self, action: usize) -> Option<Vec<Displacement>> {
        (action < self.size).then(|| self.decode(action))
    }

    /// Encodes one displacement per agent into a joint action index.
    ///
    /// # Panics
    ///
    /// Panics if the number of displacements differs from the agent count or
    /// any offset lies outside `[-range/2, range/2]`.
    pub fn encode(&self, moves: &[Displacement]) -> usize {
        assert_eq!(
            moves.len(),
            self.n_agents,
            "Number of moves must match number of agents"
        );
        let base = self.moves_per_agent();
        let half = (self.range / 2) as i64;
        moves.iter().rev().fold(0usize, |acc, m| {
            assert!(
                m.dx.abs() <= half && m.dy.abs() <= half,
                "Move {} exceeds action range {}",
                m,
                self.range
            );
            let col = (m.dx + half) as usize;
            let row = (m.dy + half) as usize;
            acc * base + row * self.range + col
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn single_agent_has_range_squared_actions() {
        let space = ActionSpace::new(5, 1).unwrap();
        assert_eq!(space.size(), 25);
        assert_eq!(space.decode(0), vec![Displacement::new(-2, -2)]);
        assert_eq!(space.decode(24), vec![Displacement::new(2, 2)]);
    }

    #[test]
    fn center_digit_is_stay() {
        let space = ActionSpace::new(5, 1).unwrap();
        assert_eq!(space.stay(), 12);
        assert_eq!(space.decode(12), vec![Displacement::zero()]);
    }

    #[test]
    fn agent_zero_is_least_significant() {
        let space = ActionSpace::new(3, 2).unwrap();
        // digit for agent 0 = 1 -> (0, -1); agent 1 = 0 -> (-1, -1)
        assert_eq!(
            space.decode(1),
            vec![Displacement::new(0, -1), Displacement::new(-1, -1)]
        );
        assert_eq!(
            space.decode(9),
            vec![Displacement::new(-1, -1), Displacement::new(0, -1)]
        );
    }

    #[test]
    fn range_one_only_stays() {
        let space = ActionSpace::new(1, 3).unwrap();
        assert_eq!(space.size(), 1);
        assert!(space.decode(0).iter().all(Displacement::is_zero));
    }

    #[test]
    fn zero_agents_rejected() {
        assert_eq!(ActionSpace::new(5, 0), Err(ConfigError::NoAgents));
    }

    #[test]
    fn even_range_rejected() {
        assert_eq!(
            ActionSpace::new(4, 1),
            Err(ConfigError::InvalidActionRange(4))
        );
    }

    #[test]
    fn oversized_space_rejected() {
        assert!(ActionSpace::size_for(5, 5).is_none());
        assert!(ActionSpace::new(101, 2).is_err());
        assert_eq!(ActionSpace::size_for(5, 4), Some(390_625));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn decode_out_of_range_panics() {
        ActionSpace::new(3, 1).unwrap().decode(9);
    }

    #[test]
    fn try_decode_out_of_range_is_none() {
        assert!(ActionSpace::new(3, 1).unwrap().try_decode(9).is_none());
    }

    proptest! {
        #[test]
        fn encode_inverts_decode(range in prop::sample::select(vec![1usize, 3, 5, 7]), agents in 1usize..4, seed in any::<u64>()) {
            let space = ActionSpace::new(range, agents).unwrap();
            let a = (seed as usize) % space.size();
            let moves = space.decode(a);
            prop_assert_eq!(moves.len(), agents);
            let half = (range / 2) as i64;
            for m in &moves {
                prop_assert!(m.dx.abs() <= half && m.dy.abs() <= half);
            }
            prop_assert_eq!(space.encode(&moves), a);
        }
    }

    #[test]
    fn exhaustive_bijection_small_space() {
        let space = ActionSpace::new(3, 3).unwrap();
        let mut seen = std::collections::HashSet::new();
        for a in 0..space.size() {
            let moves = space.decode(a);
            assert!(seen.insert(moves.clone()));
            assert_eq!(space.encode(&moves), a);
        }
        assert_eq!(seen.len(), 729);
    }
}
