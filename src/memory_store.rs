//! In-process store used by the test suite and for offline runs: keyed
//! values, condvar-signalled lists, and a recorded publish log.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::store::{EngineStore, QueueConsumer, StoreError};

type Queues = Arc<(Mutex<FxHashMap<String, VecDeque<String>>>, Condvar)>;

#[derive(Default)]
pub struct MemoryStore {
    kv: Mutex<FxHashMap<String, String>>,
    queues: Queues,
    published: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far as (channel, message) pairs.
    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_on(&self, channel: &str) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == channel)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.kv.lock().unwrap().keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }

    /// Drain a list without blocking, e.g. to inspect the audit queue.
    pub fn drain_queue(&self, queue: &str) -> Vec<String> {
        let (lock, _) = &*self.queues;
        let mut queues = lock.lock().unwrap();
        queues.remove(queue).map(|q| q.into_iter().collect()).unwrap_or_default()
    }
}

impl EngineStore for MemoryStore {
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.kv.lock().unwrap().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.kv.lock().unwrap().get(key).cloned())
    }

    fn rpush(&self, queue: &str, value: &str) -> Result<(), StoreError> {
        let (lock, cvar) = &*self.queues;
        lock.lock().unwrap().entry(queue.to_string()).or_default().push_back(value.to_string());
        cvar.notify_all();
        Ok(())
    }

    fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError> {
        self.published.lock().unwrap().push((channel.to_string(), message.to_string()));
        Ok(())
    }

    fn queue_consumer(&self) -> Result<Box<dyn QueueConsumer>, StoreError> {
        Ok(Box::new(MemoryQueueConsumer { queues: self.queues.clone() }))
    }
}

struct MemoryQueueConsumer {
    queues: Queues,
}

impl QueueConsumer for MemoryQueueConsumer {
    fn pop(&mut self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.queues;
        let mut queues = lock.lock().unwrap();
        loop {
            if let Some(value) = queues.get_mut(queue).and_then(|q| q.pop_front()) {
                return Ok(Some(value));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let (guard, wait) = cvar.wait_timeout(queues, remaining).unwrap();
            queues = guard;
            if wait.timed_out() {
                // One last check before reporting an empty pop.
                if let Some(value) = queues.get_mut(queue).and_then(|q| q.pop_front()) {
                    return Ok(Some(value));
                }
                return Ok(None);
            }
        }
    }
}
