//! Per-ride candidate queue, nearest driver first.
//!
//! The whole queue expires `ttl` after it was pushed. Pops do not refresh
//! the deadline, so a dispatch that keeps cycling through silent drivers
//! still ends once the queue lapses.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{lock_state, StoreError};
use crate::types::{DriverId, RideId};

pub trait DispatchQueue: Send + Sync {
    /// Replace the ride's queue with `drivers` and restart its lifetime.
    fn push(&self, ride_id: &RideId, drivers: Vec<DriverId>, ttl: Duration)
        -> Result<(), StoreError>;

    /// Front candidate, or `None` once the queue is empty or expired.
    fn pop_next(&self, ride_id: &RideId) -> Result<Option<DriverId>, StoreError>;

    /// Candidates left in a live queue.
    fn remaining(&self, ride_id: &RideId) -> Result<usize, StoreError>;

    fn clear(&self, ride_id: &RideId) -> Result<(), StoreError>;
}

#[derive(Debug)]
struct CandidateQueue {
    drivers: VecDeque<DriverId>,
    expires_at_ms: u64,
}

pub struct InMemoryDispatchQueue {
    clock: Arc<dyn Clock>,
    queues: Mutex<HashMap<RideId, CandidateQueue>>,
}

impl InMemoryDispatchQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            queues: Mutex::new(HashMap::new()),
        }
    }
}

impl DispatchQueue for InMemoryDispatchQueue {
    fn push(
        &self,
        ride_id: &RideId,
        drivers: Vec<DriverId>,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut queues = lock_state(&self.queues, "dispatch queue")?;
        if drivers.is_empty() {
            queues.remove(ride_id);
            return Ok(());
        }
        queues.insert(
            ride_id.clone(),
            CandidateQueue {
                drivers: drivers.into(),
                expires_at_ms: self.clock.deadline_after(ttl),
            },
        );
        Ok(())
    }

    fn pop_next(&self, ride_id: &RideId) -> Result<Option<DriverId>, StoreError> {
        let now_ms = self.clock.now_ms();
        let mut queues = lock_state(&self.queues, "dispatch queue")?;
        let Some(queue) = queues.get_mut(ride_id) else {
            return Ok(None);
        };
        if now_ms >= queue.expires_at_ms {
            queues.remove(ride_id);
            return Ok(None);
        }
        let next = queue.drivers.pop_front();
        if queue.drivers.is_empty() {
            queues.remove(ride_id);
        }
        Ok(next)
    }

    fn remaining(&self, ride_id: &RideId) -> Result<usize, StoreError> {
        let now_ms = self.clock.now_ms();
        let queues = lock_state(&self.queues, "dispatch queue")?;
        Ok(queues
            .get(ride_id)
            .filter(|queue| now_ms < queue.expires_at_ms)
            .map_or(0, |queue| queue.drivers.len()))
    }

    fn clear(&self, ride_id: &RideId) -> Result<(), StoreError> {
        let mut queues = lock_state(&self.queues, "dispatch queue")?;
        queues.remove(ride_id);
        Ok(())
    }
}
