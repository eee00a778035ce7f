//! Per-identifier concurrency slots.
//!
//! A slot is held for the lifetime of one in-flight upload. Slots are
//! plain counters; a counter that reaches zero is removed from the map,
//! so absence and zero are the same state and the map stays proportional
//! to in-flight work. The admission check and the slot claim happen under
//! a single lock, and the returned permit releases its slot on drop:
//! early returns, panics and cancelled request futures all release.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::GateError;

/// Slot policy resolved from the per-mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLimit {
    /// Public mode with concurrent uploads disabled: one slot per identifier.
    Exclusive,
    /// Private mode: up to N slots per identifier.
    AtMost(u32),
    /// No policy configured: track the slot but never reject.
    Unlimited,
}

pub struct ConcurrencyLimiter {
    slots: Mutex<HashMap<String, u32>>,
}

impl ConcurrencyLimiter {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Check the limit and claim a slot in one locked step.
    pub fn try_acquire(
        self: &Arc<Self>,
        key: &str,
        limit: SlotLimit,
    ) -> Result<SlotPermit, GateError> {
        let mut slots = self.slots.lock().expect("slot map mutex poisoned");
        let current = slots.get(key).copied().unwrap_or(0);
        match limit {
            SlotLimit::Exclusive if current > 0 => {
                return Err(GateError::Busy(
                    "previous upload still in progress".to_string(),
                ));
            }
            SlotLimit::AtMost(max) if current >= max => {
                return Err(GateError::Busy(format!(
                    "concurrent upload limit reached ({})",
                    max
                )));
            }
            _ => {}
        }
        *slots.entry(key.to_string()).or_insert(0) += 1;
        drop(slots);

        Ok(SlotPermit {
            limiter: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Active slot count for an identifier. Absent means zero.
    pub fn active(&self, key: &str) -> u32 {
        self.slots
            .lock()
            .expect("slot map mutex poisoned")
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn release(&self, key: &str) {
        let mut slots = self.slots.lock().expect("slot map mutex poisoned");
        match slots.get_mut(key) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                slots.remove(key);
            }
            None => {}
        }
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII hold on one concurrency slot.
pub struct SlotPermit {
    limiter: Arc<ConcurrencyLimiter>,
    key: String,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.limiter.release(&self.key);
    }
}
