use std::path::PathBuf;

use anyhow::Ok;
use clap::Parser;
use log::{info, warn};
use tokio::signal;

use crate::config::StressConfig;

mod config;
mod report;
mod worker;

/// Hammer a bounded queue with concurrent producers and consumers and check
/// that every pushed item is popped exactly once.
#[derive(Debug, Parser)]
struct Opt {
    /// YAML file with `capacity`, `producers`, `consumers`, `items_per_producer`
    #[clap(short, long)]
    config: Option<PathBuf>,
    #[clap(long)]
    capacity: Option<usize>,
    #[clap(short, long)]
    producers: Option<usize>,
    #[clap(short = 'n', long)]
    consumers: Option<usize>,
    /// items pushed by each producer
    #[clap(short, long)]
    items: Option<u64>,
}

impl Opt {
    fn stress_config(&self) -> Result<StressConfig, anyhow::Error> {
        let mut cfg = match &self.config {
            Some(path) => StressConfig::load(path)?,
            None => StressConfig::default(),
        };

        if let Some(capacity) = self.capacity {
            cfg.capacity = capacity;
        }
        if let Some(producers) = self.producers {
            cfg.producers = producers;
        }
        if let Some(consumers) = self.consumers {
            cfg.consumers = consumers;
        }
        if let Some(items) = self.items {
            cfg.items_per_producer = items;
        }

        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();

    let opt = Opt::parse();
    let cfg = opt.stress_config()?;
    info!(
        "stress run: capacity {}, {} producers x {} items, {} consumers",
        cfg.capacity, cfg.producers, cfg.items_per_producer, cfg.consumers
    );

    tokio::select! {
        report = worker::run(&cfg) => {
            let report = report?;
            report.log();
            report.verify()?;
            info!("all {} items conserved", report.expected);
        }
        _ = signal::ctrl_c() => {
            warn!("interrupted, abandoning stress run");
        }
    }

    Ok(())
}
