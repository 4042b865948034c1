use burn::{
    prelude::Backend,
    tensor::{Int, Tensor},
};
use rand::Rng;

use crate::burn_utils::rand::shuffled_indices;
use crate::burn_utils::tensor::{rows2tensor2, vec2int_tensor1, vec2tensor1};
use crate::errors::ConfigurationError;
use crate::rl_env::env::Action;

/// One environment interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Vec<f64>,
    pub action: Action,
    pub reward: f64,
    pub terminal: bool,
    pub log_prob: f64,
    pub value_estimate: f64,
    /// Set when the episode was cut after this step without terminating:
    /// `V` of the state it was cut at. Advantages stop here and bootstrap
    /// from this value instead of the following transition.
    pub cut_value: Option<f64>,
}

/// Fixed-capacity store that overwrites its oldest entry once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    cursor: usize, // next slot to write once full
}

impl<T: Clone> RingBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        if capacity == 0 {
            return Err(ConfigurationError::NonPositive {
                field: "memory_spec.capacity",
                value: 0.0,
            });
        }
        Ok(Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        })
    }

    pub fn push(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.cursor] = item;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.cursor = 0;
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.is_full() { self.cursor } else { 0 };
        self.slots[split..].iter().chain(self.slots[..split].iter())
    }

    /// The `n` most recent entries (fewer if not yet filled), oldest first.
    pub fn snapshot(&self, n: usize) -> Vec<T> {
        let skip = self.len().saturating_sub(n);
        self.iter().skip(skip).cloned().collect()
    }
}

/// A training batch laid out as tensors, with its advantages and returns.
pub struct Memory<B: Backend> {
    obs: Tensor<B, 2>,       // (batch_size, obs_dim)
    action: Tensor<B, 1, Int>, // (batch_size)
    old_logprobs: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    returns: Tensor<B, 1>,
    batch_size: usize,
}

impl<B: Backend> Memory<B> {
    pub fn new(
        transitions: &[Transition],
        advantages: Vec<f64>,
        returns: Vec<f64>,
        obs_dim: usize,
        device: &B::Device,
    ) -> Self {
        let rows: Vec<&[f64]> = transitions.iter().map(|t| t.observation.as_slice()).collect();
        let obs = rows2tensor2(&rows, obs_dim, device);
        let action = vec2int_tensor1(transitions.iter().map(|t| t.action as i64).collect(), device);
        let old_logprobs = vec2tensor1(
            transitions.iter().map(|t| t.log_prob as f32).collect::<Vec<f32>>(),
            device,
        );
        let advantages = vec2tensor1(
            advantages.iter().map(|x| *x as f32).collect::<Vec<f32>>(),
            device,
        );
        let returns = vec2tensor1(
            returns.iter().map(|x| *x as f32).collect::<Vec<f32>>(),
            device,
        );
        Self {
            obs,
            action,
            old_logprobs,
            advantages,
            returns,
            batch_size: transitions.len(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.batch_size
    }

    pub fn mini_batch_iter<'a, R: Rng + ?Sized>(
        &'a self,
        num_epoch: usize,
        num_mini_batches: usize,
        rng: &'a mut R,
    ) -> MiniBatchIter<'a, B, R> {
        let mini_batch_size = self.len() / num_mini_batches.max(1);
        let order = shuffled_indices(num_mini_batches * mini_batch_size, rng);
        MiniBatchIter {
            memory: self,
            rng,
            current_step: 0,
            num_epoch,
            num_mini_batches,
            mini_batch_size,
            order,
        }
    }
}

pub struct MiniBatch<B: Backend> {
    pub epoch: usize,
    pub index: usize,
    pub indices: Vec<i64>,
    pub obs: Tensor<B, 2>,
    pub action: Tensor<B, 1, Int>,
    pub old_logprobs: Tensor<B, 1>,
    pub advantages: Tensor<B, 1>,
    pub returns: Tensor<B, 1>,
}

/// Walks `num_epoch` passes over the batch; every pass draws a fresh
/// permutation that differs from the previous pass.
pub struct MiniBatchIter<'a, B: Backend, R: Rng + ?Sized> {
    memory: &'a Memory<B>,
    rng: &'a mut R,
    current_step: usize,
    num_epoch: usize,
    num_mini_batches: usize,
    mini_batch_size: usize,
    order: Vec<i64>,
}

impl<'a, B: Backend, R: Rng + ?Sized> MiniBatchIter<'a, B, R> {
    fn reshuffle(&mut self) {
        let previous = std::mem::take(&mut self.order);
        loop {
            let order = shuffled_indices(previous.len(), self.rng);
            if previous.len() < 2 || order != previous {
                self.order = order;
                return;
            }
        }
    }
}

impl<'a, B: Backend, R: Rng + ?Sized> Iterator for MiniBatchIter<'a, B, R> {
    type Item = MiniBatch<B>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.mini_batch_size == 0 || self.current_step >= self.num_epoch * self.num_mini_batches
        {
            return None;
        }

        let i = self.current_step % self.num_mini_batches;
        if i == 0 && self.current_step > 0 {
            self.reshuffle();
        }
        let indices =
            self.order[i * self.mini_batch_size..(i + 1) * self.mini_batch_size].to_vec();
        let device = self.memory.obs.device();
        let indices_tensor = vec2int_tensor1::<B>(indices.clone(), &device);

        let memory = self.memory;
        let batch = MiniBatch {
            epoch: self.current_step / self.num_mini_batches,
            index: i,
            obs: memory.obs.clone().select(0, indices_tensor.clone()),
            action: memory.action.clone().select(0, indices_tensor.clone()),
            old_logprobs: memory.old_logprobs.clone().select(0, indices_tensor.clone()),
            advantages: memory.advantages.clone().select(0, indices_tensor.clone()),
            returns: memory.returns.clone().select(0, indices_tensor),
            indices,
        };
        self.current_step += 1;
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len();
        (remaining, Some(remaining))
    }
}

impl<'a, B: Backend, R: Rng + ?Sized> ExactSizeIterator for MiniBatchIter<'a, B, R> {
    fn len(&self) -> usize {
        if self.mini_batch_size == 0 {
            return 0;
        }
        self.num_epoch * self.num_mini_batches - self.current_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::{NdArray, NdArrayDevice};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn transition(reward: f64) -> Transition {
        Transition {
            observation: vec![reward, -reward],
            action: 0,
            reward,
            terminal: false,
            log_prob: -0.5,
            value_estimate: 0.0,
            cut_value: None,
        }
    }

    fn rewards(items: &[Transition]) -> Vec<f64> {
        items.iter().map(|t| t.reward).collect()
    }

    #[test]
    fn test_overflow_drops_oldest_and_keeps_order() {
        let capacity = 5;
        let k = 3;
        let mut buffer = RingBuffer::new(capacity).unwrap();
        for i in 0..capacity + k {
            buffer.push(transition(i as f64));
        }
        assert_eq!(buffer.len(), capacity);
        assert!(buffer.is_full());
        let kept: Vec<Transition> = buffer.iter().cloned().collect();
        assert_eq!(rewards(&kept), vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_snapshot_is_most_recent_and_non_mutating() {
        let mut buffer = RingBuffer::new(4).unwrap();
        for i in 0..3 {
            buffer.push(transition(i as f64));
        }
        assert_eq!(rewards(&buffer.snapshot(10)), vec![0.0, 1.0, 2.0]);
        for i in 3..7 {
            buffer.push(transition(i as f64));
        }
        assert_eq!(rewards(&buffer.snapshot(2)), vec![5.0, 6.0]);
        assert_eq!(rewards(&buffer.snapshot(2)), vec![5.0, 6.0]);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        assert!(RingBuffer::<Transition>::new(0).is_err());
    }

    #[test]
    fn test_clear() {
        let mut buffer = RingBuffer::new(2).unwrap();
        buffer.push(transition(1.0));
        buffer.push(transition(2.0));
        buffer.push(transition(3.0));
        buffer.clear();
        assert!(buffer.is_empty());
        buffer.push(transition(4.0));
        assert_eq!(rewards(&buffer.snapshot(2)), vec![4.0]);
    }

    #[test]
    fn test_mini_batches_reshuffle_every_epoch() {
        let device = NdArrayDevice::Cpu;
        let transitions: Vec<Transition> = (0..16).map(|i| transition(i as f64)).collect();
        let memory = Memory::<NdArray>::new(&transitions, vec![0.0; 16], vec![0.0; 16], 2, &device);
        let mut rng = StdRng::seed_from_u64(5);
        let batches: Vec<MiniBatch<NdArray>> = memory.mini_batch_iter(3, 4, &mut rng).collect();
        assert_eq!(batches.len(), 12);

        let mut epochs: Vec<Vec<i64>> = vec![vec![]; 3];
        for batch in &batches {
            assert_eq!(batch.indices.len(), 4);
            assert_eq!(batch.obs.shape().dims, [4, 2]);
            epochs[batch.epoch].extend(batch.indices.iter().copied());
        }
        for pair in epochs.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        for epoch in epochs {
            let mut sorted = epoch.clone();
            sorted.sort();
            assert_eq!(sorted, (0..16).collect::<Vec<i64>>());
        }
    }

    #[test]
    fn test_mini_batch_rows_follow_indices() {
        let device = NdArrayDevice::Cpu;
        let transitions: Vec<Transition> = (0..8).map(|i| transition(i as f64)).collect();
        let memory = Memory::<NdArray>::new(&transitions, vec![0.0; 8], vec![0.0; 8], 2, &device);
        let mut rng = StdRng::seed_from_u64(1);
        for batch in memory.mini_batch_iter(1, 2, &mut rng) {
            let obs: Vec<f32> = batch.obs.into_data().iter::<f32>().collect();
            for (row, index) in batch.indices.iter().enumerate() {
                assert_eq!(obs[row * 2], *index as f32);
            }
        }
    }
}
