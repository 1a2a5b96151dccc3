use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::*;

use crate::{
    metrics::ResultsSink,
    session::{PageDefinition, PowerMonitor, Tab},
};

pub const METRIC_NAME: &str = "cpu_utilization_avg";
pub const METRIC_UNIT: &str = "%";

/// Cumulative jiffies of the aggregate `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait
    pub idle: u64,
    pub total: u64,
}

impl CpuTimes {
    pub fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|line| line.starts_with("cpu "))?;
        let values: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|value| value.parse().ok())
            .collect();
        if values.len() < 4 {
            return None;
        }

        Some(Self {
            idle: values[3] + values.get(4).copied().unwrap_or_default(),
            total: values.iter().sum(),
        })
    }

    /// Busy percentage between two readings, `None` when no time elapsed.
    pub fn usage_since(&self, previous: &CpuTimes) -> Option<f64> {
        let total = self.total.saturating_sub(previous.total);
        if total == 0 {
            return None;
        }
        let idle = self.idle.saturating_sub(previous.idle).min(total);
        Some((total - idle) as f64 / total as f64 * 100.0)
    }
}

struct Sampler {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Samples whole-system CPU utilisation while a capture runs.
///
/// A stand-in for power where no energy counter is exposed: the reported value is the
/// mean busy percentage over the sampling window.
pub struct CpuUsageMonitor {
    stat_path: PathBuf,
    interval: Duration,
    samples: Arc<Mutex<Vec<f64>>>,
    sampler: Option<Sampler>,
}

impl Default for CpuUsageMonitor {
    fn default() -> Self {
        Self::new("/proc/stat", Duration::from_millis(250))
    }
}

impl CpuUsageMonitor {
    pub fn new(stat_path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            stat_path: stat_path.into(),
            interval,
            samples: Default::default(),
            sampler: None,
        }
    }

    fn read(path: &PathBuf) -> Result<CpuTimes> {
        let stat = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {path:?}"))?;
        CpuTimes::parse(&stat).ok_or_else(|| anyhow!("No aggregate cpu line in {path:?}"))
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples
            .lock()
            .map(|samples| samples.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PowerMonitor for CpuUsageMonitor {
    #[instrument(level = "debug", skip_all, fields(page = %page.name))]
    async fn start(&mut self, page: &PageDefinition, _tab: &mut dyn Tab) -> Result<()> {
        if self.sampler.is_some() {
            return Err(anyhow!("CPU sampling already running"));
        }

        let mut previous = Self::read(&self.stat_path)?;
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }

        let (stop, mut stopped) = oneshot::channel();
        let samples = self.samples.clone();
        let path = self.stat_path.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }

                let current = match Self::read(&path) {
                    Ok(current) => current,
                    Err(error) => {
                        warn!("Stopping CPU sampling: {error:#}");
                        break;
                    }
                };
                if let Some(usage) = current.usage_since(&previous) {
                    trace!("CPU usage: {usage:.1}%");
                    if let Ok(mut samples) = samples.lock() {
                        samples.push(usage);
                    }
                }
                previous = current;
            }
        });

        self.sampler = Some(Sampler { stop, handle });
        Ok(())
    }

    async fn stop(&mut self, _tab: &mut dyn Tab) -> Result<()> {
        let Some(sampler) = self.sampler.take() else {
            return Ok(());
        };

        // The task may already be gone after a read error.
        let _ = sampler.stop.send(());
        sampler
            .handle
            .await
            .context("CPU sampling task panicked")?;

        debug!("Collected {} CPU samples", self.samples().len());
        Ok(())
    }

    fn report_into(&mut self, sink: &mut dyn ResultsSink) {
        let samples = self.samples();
        if samples.is_empty() {
            debug!("No CPU samples to report");
            return;
        }

        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        sink.add(METRIC_NAME, METRIC_UNIT, mean);
    }
}
