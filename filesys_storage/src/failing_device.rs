//! # Failing Block Device
//!
//! A BlockDevice wrapper that can simulate write failures for testing.
//!
//! Once a device is handed to a `Volume` it is owned by the buffer cache, so
//! the failure policy lives behind a shared `FailureControl` handle that the
//! test keeps and can change at any point.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use hal::{BlockDevice, BlockError};

use crate::volume::lock;

/// Policy for when failures should occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Never fail (passthrough)
    Never,
    /// Fail after N writes
    AfterWrites(usize),
    /// Fail on specific block indices
    OnBlocks(Vec<u64>),
    /// Fail after N writes to specific blocks
    AfterWritesToBlocks { count: usize, blocks: Vec<u64> },
}

#[derive(Debug)]
struct FailureState {
    policy: FailurePolicy,
    write_count: usize,
    block_write_counts: BTreeMap<u64, usize>,
}

impl FailureState {
    fn should_fail(&mut self, block_idx: u64) -> bool {
        match &self.policy {
            FailurePolicy::Never => false,
            FailurePolicy::AfterWrites(n) => self.write_count >= *n,
            FailurePolicy::OnBlocks(blocks) => blocks.contains(&block_idx),
            FailurePolicy::AfterWritesToBlocks { count, blocks } => {
                blocks.contains(&block_idx)
                    && *self.block_write_counts.entry(block_idx).or_insert(0) >= *count
            }
        }
    }

    fn record_write(&mut self, block_idx: u64) {
        self.write_count += 1;
        if let FailurePolicy::AfterWritesToBlocks { blocks, .. } = &self.policy {
            if blocks.contains(&block_idx) {
                *self.block_write_counts.entry(block_idx).or_insert(0) += 1;
            }
        }
    }
}

/// Shared handle for steering a `FailingBlockDevice` from outside
#[derive(Debug, Clone)]
pub struct FailureControl {
    state: Arc<Mutex<FailureState>>,
}

impl FailureControl {
    /// Replaces the failure policy and resets the write counters
    pub fn set_policy(&self, policy: FailurePolicy) {
        let mut state = lock(&self.state);
        state.policy = policy;
        state.write_count = 0;
        state.block_write_counts.clear();
    }

    /// Number of successful writes since the policy was last set
    pub fn write_count(&self) -> usize {
        lock(&self.state).write_count
    }
}

/// Wrapper around a BlockDevice that can simulate failures
pub struct FailingBlockDevice<D: BlockDevice> {
    inner: D,
    control: FailureControl,
}

impl<D: BlockDevice> FailingBlockDevice<D> {
    /// Create a new failing block device with the given policy
    pub fn new(inner: D, policy: FailurePolicy) -> Self {
        Self {
            inner,
            control: FailureControl {
                state: Arc::new(Mutex::new(FailureState {
                    policy,
                    write_count: 0,
                    block_write_counts: BTreeMap::new(),
                })),
            },
        }
    }

    /// Handle that keeps working after the device has been moved away
    pub fn control(&self) -> FailureControl {
        self.control.clone()
    }

    /// Get the underlying device (for inspection)
    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.control.set_policy(policy);
    }

    pub fn write_count(&self) -> usize {
        self.control.write_count()
    }
}

impl<D: BlockDevice> BlockDevice for FailingBlockDevice<D> {
    fn block_count(&self) -> u64 {
        self.inner.block_count()
    }

    fn read_block(&mut self, block_idx: u64, buffer: &mut [u8]) -> Result<(), BlockError> {
        self.inner.read_block(block_idx, buffer)
    }

    fn write_block(&mut self, block_idx: u64, buffer: &[u8]) -> Result<(), BlockError> {
        let mut state = lock(&self.control.state);
        if state.should_fail(block_idx) {
            return Err(BlockError::IoError);
        }
        state.record_write(block_idx);
        drop(state);

        self.inner.write_block(block_idx, buffer)
    }

    fn flush(&mut self) -> Result<(), BlockError> {
        let state = lock(&self.control.state);
        if matches!(state.policy, FailurePolicy::AfterWrites(n) if state.write_count >= n) {
            return Err(BlockError::IoError);
        }
        drop(state);
        self.inner.flush()
    }
}
