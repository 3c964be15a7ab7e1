//! # Partitioner
//!
//! Routes keyed elements to one of N window operator instances so that every
//! element of a key is processed by the same instance, in arrival order.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use ahash::AHasher;

/// Decides which partition (0..num_partitions) an element belongs to.
pub trait Partitioner<T>: Send + Sync {
    fn partition(&self, value: &T, num_partitions: usize) -> usize;
}

/// Hash-based partitioner over a key selector.
///
/// A key maps to the same partition for the lifetime of the process. ahash may
/// seed its keys at startup, so the mapping is not stable across runs.
pub struct HashPartitioner<T, K> {
    key_selector: Arc<dyn Fn(&T) -> K + Send + Sync>,
}

impl<T, K> Clone for HashPartitioner<T, K> {
    fn clone(&self) -> Self {
        Self {
            key_selector: Arc::clone(&self.key_selector),
        }
    }
}

impl<T, K: Hash> HashPartitioner<T, K> {
    pub fn new(key_selector: Arc<dyn Fn(&T) -> K + Send + Sync>) -> Self {
        Self { key_selector }
    }

    /// Partition of an already extracted key.
    pub fn partition_key(key: &K, num_partitions: usize) -> usize {
        let mut hasher = AHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % num_partitions.max(1)
    }
}

impl<T, K: Hash> Partitioner<T> for HashPartitioner<T, K> {
    fn partition(&self, value: &T, num_partitions: usize) -> usize {
        let key = (self.key_selector)(value);
        Self::partition_key(&key, num_partitions)
    }
}
