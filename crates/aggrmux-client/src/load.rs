use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::MIN_SLOTS;
use crate::error::{ClientError, Result};
use crate::slots::SlotPool;

const REBALANCE_WAIT: Duration = Duration::from_millis(50);

/// Adjustable ceiling on concurrently usable slots.
///
/// Lowering the ceiling does not touch calls already in flight: slots are
/// withheld lazily, one free index at a time, the next time a caller
/// allocates. Raising it returns withheld indices to the free queue.
pub(crate) struct LoadController {
    capacity: usize,
    floor: usize,
    ceiling: AtomicUsize,
    /// Serializes rebalancing; held across the waits for free slots.
    withheld: Mutex<Vec<u16>>,
    /// Length of `withheld`, readable without the lock.
    parked: AtomicUsize,
}

impl LoadController {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            floor: MIN_SLOTS.min(capacity),
            ceiling: AtomicUsize::new(capacity),
            withheld: Mutex::new(Vec::new()),
            parked: AtomicUsize::new(0),
        }
    }

    pub(crate) fn ceiling(&self) -> usize {
        self.ceiling.load(Ordering::Acquire)
    }

    /// Indices currently held back from the free queue.
    pub(crate) fn withheld(&self) -> usize {
        self.parked.load(Ordering::Acquire)
    }

    /// Raise the ceiling by `percent` of its current value. Returns the new ceiling.
    pub(crate) fn increase(&self, percent: u32) -> Result<usize> {
        check_percent(percent)?;
        Ok(self.update(|current| {
            current
                .saturating_add(current * percent as usize / 100)
                .min(self.capacity)
        }))
    }

    /// Lower the ceiling by `percent` of its current value. Returns the new ceiling.
    pub(crate) fn decrease(&self, percent: u32) -> Result<usize> {
        check_percent(percent)?;
        Ok(self.update(|current| {
            current
                .saturating_sub(current * percent as usize / 100)
                .max(self.floor)
        }))
    }

    pub(crate) fn set_max(&self) -> usize {
        self.update(|_| self.capacity)
    }

    pub(crate) fn set_min(&self) -> usize {
        self.update(|_| self.floor)
    }

    fn update(&self, f: impl Fn(usize) -> usize) -> usize {
        let mut current = self.ceiling();
        loop {
            let next = f(current);
            match self.ceiling.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if next != current {
                        tracing::debug!(from = current, to = next, "load ceiling changed");
                    }
                    return next;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Bring the withheld count to `capacity - ceiling`.
    ///
    /// Withholding blocks until enough slots have been released; `check_open`
    /// runs between waits so shutdown or connection loss aborts the wait.
    pub(crate) fn rebalance(
        &self,
        pool: &SlotPool,
        check_open: impl Fn() -> Result<()>,
    ) -> Result<()> {
        let mut withheld = self.withheld.lock();
        loop {
            let target = self.capacity - self.ceiling();
            match withheld.len().cmp(&target) {
                CmpOrdering::Equal => return Ok(()),
                CmpOrdering::Greater => {
                    if let Some(index) = withheld.pop() {
                        self.parked.fetch_sub(1, Ordering::AcqRel);
                        pool.push_free(index);
                    }
                }
                CmpOrdering::Less => match pool.pop_free(REBALANCE_WAIT) {
                    Some(index) => {
                        withheld.push(index);
                        self.parked.fetch_add(1, Ordering::AcqRel);
                    }
                    None => check_open()?,
                },
            }
        }
    }
}

fn check_percent(percent: u32) -> Result<()> {
    if (10..=90).contains(&percent) && percent % 10 == 0 {
        Ok(())
    } else {
        Err(ClientError::InvalidLoadPercent(percent))
    }
}
