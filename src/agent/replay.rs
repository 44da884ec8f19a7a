use std::collections::VecDeque;

use rand::Rng;

use crate::gym::trading::{action::Action, state::State};

/// One `(s, a, r, s', done)` experience, owned by value.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: State,
    pub action: Action,
    pub reward: f64,
    pub next_state: State,
    pub done: bool,
}

impl Transition {
    pub fn new(state: State, action: Action, reward: f64, next_state: State, done: bool) -> Self {
        Self {
            state,
            action,
            reward,
            next_state,
            done,
        }
    }
}

/// A sampled mini-batch laid out as parallel columns.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub states: Vec<State>,
    pub actions: Vec<Action>,
    pub rewards: Vec<f64>,
    pub next_states: Vec<State>,
    pub dones: Vec<bool>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl FromIterator<Transition> for Batch {
    fn from_iter<I: IntoIterator<Item = Transition>>(iter: I) -> Self {
        let mut batch = Batch::default();
        for t in iter {
            batch.states.push(t.state);
            batch.actions.push(t.action);
            batch.rewards.push(t.reward);
            batch.next_states.push(t.next_state);
            batch.dones.push(t.done);
        }
        batch
    }
}

/// Bounded FIFO store of transitions with uniform sampling.
///
/// Not thread-safe; owned by a single agent.
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `transition`, evicting the oldest entry when full.
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
    }

    /// Draws `min(batch_size, len)` distinct transitions uniformly at random.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Batch {
        let amount = batch_size.min(self.buffer.len());
        rand::seq::index::sample(rng, self.buffer.len(), amount)
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn can_sample(&self, batch_size: usize) -> bool {
        self.buffer.len() >= batch_size
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ndarray::Array2;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::gym::trading::state::{AccountState, MarketWindow};

    /// Tags each transition through its reward so insertion order is visible.
    fn transition(tag: usize) -> Transition {
        let s = State::new(MarketWindow::new(Array2::zeros((2, 1))), AccountState::flat());
        Transition::new(s.clone(), Action::Hold, tag as f64, s, false)
    }

    #[test]
    fn never_exceeds_capacity_and_evicts_oldest() {
        let mut buf = ReplayBuffer::new(3);
        for i in 0..5 {
            buf.push(transition(i));
            assert!(buf.len() <= 3);
        }
        let tags: Vec<f64> = buf.iter().map(|t| t.reward).collect();
        assert_eq!(tags, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn sample_is_without_replacement_and_bounded() {
        let mut buf = ReplayBuffer::new(100);
        for i in 0..10 {
            buf.push(transition(i));
        }
        let mut rng = StdRng::seed_from_u64(3);

        let batch = buf.sample(6, &mut rng);
        assert_eq!(batch.len(), 6);
        let unique: HashSet<u64> = batch.rewards.iter().map(|r| r.to_bits()).collect();
        assert_eq!(unique.len(), 6);

        let all = buf.sample(50, &mut rng);
        assert_eq!(all.len(), 10);
        assert_eq!(all.states.len(), all.next_states.len());
        assert_eq!(all.dones.len(), 10);
    }

    #[test]
    fn empty_buffer_samples_nothing() {
        let buf = ReplayBuffer::new(4);
        let mut rng = StdRng::seed_from_u64(0);
        assert!(buf.sample(8, &mut rng).is_empty());
        assert!(!buf.can_sample(1));
    }

    #[test]
    fn stored_states_are_snapshots() {
        let mut buf = ReplayBuffer::new(2);
        let mut t = transition(0);
        buf.push(t.clone());
        t.state.account.position = 1.0;
        assert_eq!(buf.iter().next().unwrap().state.account.position, 0.0);
    }
}
