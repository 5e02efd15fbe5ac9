//! Host load monitor.
//!
//! [`LoadMonitor`] periodically samples CPU and memory usage and raises the
//! [`OverloadFlag`] when either crosses its threshold. A failed or
//! panicking sample lowers the flag: the monitor never sheds load on
//! readings it does not have.

use crate::stages::OverloadFlag;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::System;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Thresholds and cadence of the load monitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverloadConfig {
    /// CPU usage, in percent, above which the host is overloaded.
    pub max_cpu_percent: f64,
    /// Memory usage, in percent, above which the host is overloaded.
    pub max_memory_percent: f64,
    /// Time between samples.
    pub interval: Duration,
    /// Window CPU usage is averaged over.
    pub cpu_window: Duration,
}

impl OverloadConfig {
    /// Creates a config with the given thresholds, sampling every minute
    /// over a five second CPU window.
    #[must_use]
    pub const fn new(max_cpu_percent: f64, max_memory_percent: f64) -> Self {
        Self {
            max_cpu_percent,
            max_memory_percent,
            interval: Duration::from_secs(60),
            cpu_window: Duration::from_secs(5),
        }
    }

    /// Returns `true` when `sample` exceeds either threshold.
    #[must_use]
    pub fn is_exceeded_by(&self, sample: &LoadSample) -> bool {
        sample.cpu_percent > self.max_cpu_percent || sample.memory_percent > self.max_memory_percent
    }
}

/// One reading of host load.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadSample {
    /// Average CPU usage across cores, in percent.
    pub cpu_percent: f64,
    /// Used memory, in percent of total.
    pub memory_percent: f64,
}

/// A load reading could not be taken.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The platform does not report the metric.
    #[error("{0} usage is not available on this host")]
    Unavailable(&'static str),
}

/// Source of load readings.
///
/// `sample` blocks for about `cpu_window`; the monitor calls it on the
/// blocking thread pool.
pub trait LoadSampler: Send + Sync + 'static {
    /// Takes one reading.
    ///
    /// # Errors
    ///
    /// Returns [`SampleError`] when a metric cannot be read.
    fn sample(&self, cpu_window: Duration) -> Result<LoadSample, SampleError>;
}

/// Samples the local host through `sysinfo`.
#[derive(Debug)]
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    /// Creates a sampler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(used: u64, total: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let ratio = used as f64 / total as f64;
    (ratio * 100.0).clamp(0.0, 100.0)
}

impl LoadSampler for SysinfoSampler {
    fn sample(&self, cpu_window: Duration) -> Result<LoadSample, SampleError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(SampleError::Unavailable("cpu"));
        }

        let mut system = self.system.lock();
        system.refresh_cpu_usage();
        std::thread::sleep(cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL));
        system.refresh_cpu_usage();
        if system.cpus().is_empty() {
            return Err(SampleError::Unavailable("cpu"));
        }
        let cpu_percent = f64::from(system.global_cpu_usage());

        system.refresh_memory();
        let total = system.total_memory();
        if total == 0 {
            return Err(SampleError::Unavailable("memory"));
        }
        let memory_percent = percent(system.used_memory(), total);
        drop(system);

        Ok(LoadSample {
            cpu_percent,
            memory_percent,
        })
    }
}

/// Periodically samples host load into an [`OverloadFlag`].
pub struct LoadMonitor {
    config: OverloadConfig,
    flag: OverloadFlag,
    sampler: Arc<dyn LoadSampler>,
}

impl LoadMonitor {
    /// Creates a monitor sampling the local host.
    #[must_use]
    pub fn new(config: OverloadConfig, flag: OverloadFlag) -> Self {
        Self::with_sampler(config, flag, Arc::new(SysinfoSampler::new()))
    }

    /// Creates a monitor with a custom sampler.
    #[must_use]
    pub fn with_sampler(config: OverloadConfig, flag: OverloadFlag, sampler: Arc<dyn LoadSampler>) -> Self {
        Self {
            config,
            flag,
            sampler,
        }
    }

    /// Returns the flag this monitor writes.
    #[must_use]
    pub const fn flag(&self) -> &OverloadFlag {
        &self.flag
    }

    /// Takes one sample and updates the flag. Returns the stored value.
    pub async fn check(&self) -> bool {
        let sampler = Arc::clone(&self.sampler);
        let window = self.config.cpu_window;

        let overloaded = match tokio::task::spawn_blocking(move || sampler.sample(window)).await {
            Ok(Ok(sample)) => {
                let overloaded = self.config.is_exceeded_by(&sample);
                tracing::debug!(
                    cpu_percent = sample.cpu_percent,
                    memory_percent = sample.memory_percent,
                    overloaded,
                    "sampled host load"
                );
                overloaded
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "load sampling failed");
                false
            }
            Err(err) => {
                tracing::error!(error = %err, "load sampler panicked");
                false
            }
        };

        if overloaded && !self.flag.is_overloaded() {
            tracing::warn!("host overloaded; rejecting requests");
        }
        self.flag.set(overloaded);
        overloaded
    }

    /// Runs the monitor until `shutdown` completes.
    ///
    /// The first sample is taken one interval after start.
    pub fn spawn<F>(self, shutdown: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(async move {
            let period = self.config.interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tokio::pin!(shutdown);

            tracing::info!(interval = ?period, "load monitor started");
            loop {
                tokio::select! {
                    () = &mut shutdown => break,
                    _ = ticker.tick() => {
                        self.check().await;
                    }
                }
            }
            tracing::info!("load monitor stopped");
        })
    }
}

impl std::fmt::Debug for LoadMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadMonitor")
            .field("config", &self.config)
            .field("flag", &self.flag)
            .finish_non_exhaustive()
    }
}
