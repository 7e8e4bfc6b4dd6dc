use std::fmt::Debug;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use log::{debug, warn};
use ringq_common::BoundedQueue;
use tokio::task::{self, AbortHandle, JoinHandle};
use tokio::time::Instant;

use crate::config::StressConfig;
use crate::report::Report;

pub type SharedQueue = Arc<BoundedQueue<u64>>;

/// One side of a stress run, driven as its own tokio task against the shared queue.
pub trait QueueWorker: Send + 'static {
    type Output: Send + Debug + 'static;

    fn work(self, queue: SharedQueue) -> impl std::future::Future<Output = Self::Output> + Send;
}

pub fn spawn_worker<W>(worker: W, queue: SharedQueue) -> JoinHandle<W::Output>
where
    W: QueueWorker,
{
    tokio::spawn(worker.work(queue))
}

/// Pushes every value of `values`, retrying on `Full`.
pub struct Producer {
    pub id: usize,
    pub values: Range<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStats {
    pub id: usize,
    pub pushed: u64,
    pub rejected: u64,
}

impl QueueWorker for Producer {
    type Output = ProducerStats;

    async fn work(self, queue: SharedQueue) -> ProducerStats {
        let mut stats = ProducerStats {
            id: self.id,
            ..Default::default()
        };

        for value in self.values {
            let mut item = value;
            while let Err(back) = queue.try_push(item) {
                item = back;
                stats.rejected += 1;
                task::yield_now().await;
            }
            stats.pushed += 1;
        }

        debug!(
            "producer {} done, pushed: {}, full rejections: {}",
            stats.id, stats.pushed, stats.rejected
        );
        stats
    }
}

/// Pops until `remaining` reaches zero, across all consumers.
pub struct Consumer {
    pub id: usize,
    pub remaining: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub id: usize,
    pub popped: Vec<u64>,
    pub rejected: u64,
}

impl QueueWorker for Consumer {
    type Output = ConsumerStats;

    async fn work(self, queue: SharedQueue) -> ConsumerStats {
        let mut stats = ConsumerStats {
            id: self.id,
            ..Default::default()
        };

        while self.remaining.load(Ordering::Acquire) > 0 {
            match queue.pop() {
                Ok(value) => {
                    stats.popped.push(value);
                    self.remaining.fetch_sub(1, Ordering::AcqRel);
                }
                Err(_) => {
                    stats.rejected += 1;
                    task::yield_now().await;
                }
            }
        }

        debug!(
            "consumer {} done, popped: {}, empty rejections: {}",
            stats.id,
            stats.popped.len(),
            stats.rejected
        );
        stats
    }
}

/// Runs one full stress pass: producer `p` pushes `p * n .. (p + 1) * n`,
/// consumers drain until every pushed value has been popped once.
pub async fn run(cfg: &StressConfig) -> Result<Report, anyhow::Error> {
    cfg.validate()?;
    let queue: SharedQueue = Arc::new(
        BoundedQueue::new(cfg.capacity)
            .with_context(|| format!("cannot build queue with capacity {}", cfg.capacity))?,
    );
    let remaining = Arc::new(AtomicU64::new(cfg.total_items()));
    let start = Instant::now();

    let producers: Vec<_> = (0..cfg.producers)
        .map(|id| {
            let first = id as u64 * cfg.items_per_producer;
            let producer = Producer {
                id,
                values: first..first + cfg.items_per_producer,
            };
            spawn_worker(producer, queue.clone())
        })
        .collect();

    let consumers: Vec<_> = (0..cfg.consumers)
        .map(|id| {
            let consumer = Consumer {
                id,
                remaining: remaining.clone(),
            };
            spawn_worker(consumer, queue.clone())
        })
        .collect();

    // consumers only stop once every item is popped, so a lost producer
    // must take them down with it
    let consumer_aborts: Vec<AbortHandle> = consumers.iter().map(|h| h.abort_handle()).collect();
    let producer_stats = join_workers(producers, "producer", &consumer_aborts).await?;
    let consumer_stats = join_workers(consumers, "consumer", &[]).await?;

    Ok(Report::new(
        cfg,
        queue.len(),
        &producer_stats,
        &consumer_stats,
        start.elapsed(),
    ))
}

/// Awaits every handle in order. On the first failed task, aborts the
/// handles not yet awaited and everything in `abort_on_error`.
async fn join_workers<O>(
    handles: Vec<JoinHandle<O>>,
    role: &str,
    abort_on_error: &[AbortHandle],
) -> Result<Vec<O>, anyhow::Error> {
    let mut outputs = Vec::with_capacity(handles.len());
    let mut handles = handles.into_iter();
    while let Some(handle) = handles.next() {
        match handle.await {
            Ok(output) => outputs.push(output),
            Err(e) => {
                warn!("{} task failed, aborting remaining workers", role);
                handles.for_each(|h| h.abort());
                abort_on_error.iter().for_each(AbortHandle::abort);
                return Err(e).with_context(|| format!("{} task failed", role));
            }
        }
    }
    Ok(outputs)
}
