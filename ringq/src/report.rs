use std::time::Duration;

use anyhow::ensure;
use log::info;

use crate::config::StressConfig;
use crate::worker::{ConsumerStats, ProducerStats};

/// Outcome of a stress run, including the conservation check: every value in
/// `0..expected` must be popped exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub capacity: usize,
    pub expected: u64,
    pub pushed: u64,
    pub popped: u64,
    pub full_rejections: u64,
    pub empty_rejections: u64,
    pub left_in_queue: usize,
    pub missing: Vec<u64>,
    pub duplicated: Vec<u64>,
    pub unexpected: Vec<u64>,
    pub elapsed: Duration,
}

impl Report {
    pub fn new(
        cfg: &StressConfig,
        left_in_queue: usize,
        producers: &[ProducerStats],
        consumers: &[ConsumerStats],
        elapsed: Duration,
    ) -> Self {
        let expected = cfg.total_items();
        let mut seen = vec![0u32; expected as usize];
        let mut unexpected = vec![];

        for value in consumers.iter().flat_map(|c| c.popped.iter().copied()) {
            match seen.get_mut(value as usize) {
                Some(count) => *count += 1,
                None => unexpected.push(value),
            }
        }

        let missing = (0..expected).filter(|&v| seen[v as usize] == 0).collect();
        let duplicated = (0..expected).filter(|&v| seen[v as usize] > 1).collect();

        Report {
            capacity: cfg.capacity,
            expected,
            pushed: producers.iter().map(|p| p.pushed).sum(),
            popped: consumers.iter().map(|c| c.popped.len() as u64).sum(),
            full_rejections: producers.iter().map(|p| p.rejected).sum(),
            empty_rejections: consumers.iter().map(|c| c.rejected).sum(),
            left_in_queue,
            missing,
            duplicated,
            unexpected,
            elapsed,
        }
    }

    pub fn is_conserved(&self) -> bool {
        self.pushed == self.expected
            && self.popped == self.expected
            && self.left_in_queue == 0
            && self.missing.is_empty()
            && self.duplicated.is_empty()
            && self.unexpected.is_empty()
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.popped as f64 / secs
    }

    pub fn verify(&self) -> Result<(), anyhow::Error> {
        if self.is_conserved() {
            return Ok(());
        }
        ensure!(
            self.pushed == self.expected,
            "pushed {} items, expected {}",
            self.pushed,
            self.expected
        );
        ensure!(
            self.missing.is_empty(),
            "{} items never popped, first: {:?}",
            self.missing.len(),
            &self.missing[..self.missing.len().min(8)]
        );
        ensure!(
            self.duplicated.is_empty(),
            "{} items popped more than once, first: {:?}",
            self.duplicated.len(),
            &self.duplicated[..self.duplicated.len().min(8)]
        );
        ensure!(
            self.unexpected.is_empty(),
            "{} popped items were never pushed, first: {:?}",
            self.unexpected.len(),
            &self.unexpected[..self.unexpected.len().min(8)]
        );
        ensure!(
            self.left_in_queue == 0,
            "{} items left in the queue",
            self.left_in_queue
        );
        Ok(())
    }

    pub fn log(&self) {
        info!(
            "capacity {}: pushed {}, popped {} in {:?} ({:.0} items/s)",
            self.capacity,
            self.pushed,
            self.popped,
            self.elapsed,
            self.throughput()
        );
        info!(
            "rejections: {} full, {} empty",
            self.full_rejections, self.empty_rejections
        );
    }
}
