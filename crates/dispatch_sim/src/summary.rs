use std::fmt;

use dispatch_core::events::ExhaustionReason;
use serde::Serialize;

/// Aggregate counters for one simulated run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub seed: u64,
    pub drivers: usize,
    pub rides_requested: usize,
    pub assigned: usize,
    pub exhausted_no_drivers_nearby: usize,
    pub exhausted_no_driver_accepted: usize,
    pub exhausted_queue_expired: usize,
    pub exhausted_stalled: usize,
    pub aborted: usize,
    pub offers_extended: usize,
    pub offers_expired: usize,
    pub late_responses: usize,
    pub sweeps: usize,
    pub simulated_secs: u64,
    /// Mean seconds from request to assignment, over assigned rides.
    pub mean_time_to_assign_secs: Option<f64>,
    #[serde(skip)]
    assign_wait_total_secs: u64,
}

impl RunSummary {
    pub fn new(seed: u64, drivers: usize, rides_requested: usize) -> Self {
        Self {
            seed,
            drivers,
            rides_requested,
            ..Self::default()
        }
    }

    pub fn record_assignment(&mut self, waited_secs: u64) {
        self.assigned += 1;
        self.assign_wait_total_secs += waited_secs;
        self.mean_time_to_assign_secs =
            Some(self.assign_wait_total_secs as f64 / self.assigned as f64);
    }

    pub fn record_exhaustion(&mut self, reason: ExhaustionReason) {
        match reason {
            ExhaustionReason::NoDriversNearby => self.exhausted_no_drivers_nearby += 1,
            ExhaustionReason::NoDriverAccepted => self.exhausted_no_driver_accepted += 1,
            ExhaustionReason::QueueExpired => self.exhausted_queue_expired += 1,
            ExhaustionReason::Stalled => self.exhausted_stalled += 1,
        }
    }

    pub fn exhausted(&self) -> usize {
        self.exhausted_no_drivers_nearby
            + self.exhausted_no_driver_accepted
            + self.exhausted_queue_expired
            + self.exhausted_stalled
    }

    /// Rides that reached a terminal state.
    pub fn resolved(&self) -> usize {
        self.assigned + self.exhausted() + self.aborted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "--- Dispatch run (seed {}, {} drivers, {} rides) ---",
            self.seed, self.drivers, self.rides_requested
        )?;
        writeln!(f, "Simulated time: {}s ({} sweeps)", self.simulated_secs, self.sweeps)?;
        writeln!(f, "Assigned rides: {}", self.assigned)?;
        writeln!(
            f,
            "Exhausted rides: {} (no drivers nearby {}, none accepted {}, queue expired {}, stalled {})",
            self.exhausted(),
            self.exhausted_no_drivers_nearby,
            self.exhausted_no_driver_accepted,
            self.exhausted_queue_expired,
            self.exhausted_stalled
        )?;
        writeln!(f, "Aborted rides: {}", self.aborted)?;
        writeln!(f, "Offers extended: {}", self.offers_extended)?;
        writeln!(f, "Offers expired: {}", self.offers_expired)?;
        writeln!(f, "Late responses: {}", self.late_responses)?;
        match self.mean_time_to_assign_secs {
            Some(mean) => write!(f, "Mean time to assign: {mean:.1}s"),
            None => write!(f, "Mean time to assign: n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_reasons_are_counted_separately() {
        let mut summary = RunSummary::new(1, 2, 3);
        summary.record_exhaustion(ExhaustionReason::NoDriversNearby);
        summary.record_exhaustion(ExhaustionReason::QueueExpired);
        summary.record_assignment(4);
        assert_eq!(summary.exhausted(), 2);
        assert_eq!(summary.resolved(), 3);
        assert_eq!(summary.mean_time_to_assign_secs, Some(4.0));
    }

    #[test]
    fn json_omits_internal_totals() {
        let mut summary = RunSummary::new(7, 1, 1);
        summary.record_assignment(10);
        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["assigned"], 1);
        assert!(json.get("assign_wait_total_secs").is_none());
    }
}
