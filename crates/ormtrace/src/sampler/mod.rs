//! Periodic connection-pool sampler.
//!
//! A sampler is a background task that reads a pool's statistics on a fixed interval
//! and records them as the `orm/client/connections/*` measures.
//!
//! ```rust,ignore
//! let pool = Arc::new(TrackedPool::new(create_pool(&database_url)?));
//! let sampler = start_sampling(
//!     &pool,
//!     recorder,
//!     SamplerConfig::new().with_database("primary"),
//!     CancellationToken::new(),
//! )?;
//!
//! // ... on shutdown
//! sampler.stop();
//! let exit = sampler.join().await?;
//! ```

#[cfg(feature = "pool")]
mod deadpool;


#[cfg(feature = "pool")]
pub use deadpool::{TrackedPool, create_pool, create_pool_with_config};

use crate::error::{Error, Result};
use crate::stats::{Measurement, StatsRecorder, measure};
use crate::tags::{self, TagMap};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Default sampling interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// A point-in-time snapshot of pool health.
///
/// Gauges describe the pool right now; the remaining fields are totals since the pool
/// was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub open_connections: u64,
    pub idle_connections: u64,
    pub in_use: u64,
    pub wait_count: u64,
    pub wait_duration: Duration,
    pub max_idle_closed: u64,
    pub max_lifetime_closed: u64,
}

impl PoolStats {
    /// The seven pool measurements for this snapshot.
    pub fn measurements(&self) -> [Measurement; 7] {
        [
            measure::OPEN_CONNECTIONS.int_value(saturating_i64(self.open_connections)),
            measure::IDLE_CONNECTIONS.int_value(saturating_i64(self.idle_connections)),
            measure::ACTIVE_CONNECTIONS.int_value(saturating_i64(self.in_use)),
            measure::WAIT_COUNT.int_value(saturating_i64(self.wait_count)),
            measure::WAIT_DURATION.float_value(self.wait_duration.as_secs_f64() * 1_000.0),
            measure::IDLE_CLOSED.int_value(saturating_i64(self.max_idle_closed)),
            measure::LIFETIME_CLOSED.int_value(saturating_i64(self.max_lifetime_closed)),
        ]
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Liveness check failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PingError {
    /// The pool has been closed and will never hand out connections again.
    #[error("pool is closed")]
    Closed,

    /// The database could not be reached right now.
    #[error("database unavailable: {0}")]
    Unavailable(String),
}

/// A connection pool the sampler can observe.
pub trait ConnectionPool: Send + Sync + 'static {
    /// Current statistics.
    fn stats(&self) -> PoolStats;

    /// Check that the database is reachable.
    fn ping(&self) -> impl Future<Output = Result<(), PingError>> + Send;
}

/// Sampler settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Time between samples. Must be non-zero.
    pub interval: Duration,
    /// Value of the `database` tag on every sample.
    pub database: Option<String>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            database: None,
        }
    }
}

impl SamplerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Tag samples with a database name.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    fn tags(&self) -> Result<TagMap> {
        if self.interval.is_zero() {
            return Err(Error::config("sampling interval must be greater than zero"));
        }
        match &self.database {
            Some(name) => TagMap::try_from([(tags::DATABASE, name.as_str())])
                .map_err(|e| Error::config(format!("invalid database tag: {e}"))),
            None => Ok(TagMap::new()),
        }
    }
}

/// Why a sampler task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerExit {
    /// [`PoolSampler::stop`] was called or the token was cancelled.
    Stopped,
    /// Every strong reference to the pool was dropped.
    PoolDropped,
    /// The pool reported itself closed.
    PoolClosed,
}

impl SamplerExit {
    pub fn as_str(self) -> &'static str {
        match self {
            SamplerExit::Stopped => "stopped",
            SamplerExit::PoolDropped => "pool dropped",
            SamplerExit::PoolClosed => "pool closed",
        }
    }
}

impl fmt::Display for SamplerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a running sampler task.
///
/// Dropping the handle stops the sampler at its next scheduling point.
#[must_use = "dropping the handle stops the sampler"]
pub struct PoolSampler {
    token: CancellationToken,
    worker: Option<JoinHandle<SamplerExit>>,
}

impl PoolSampler {
    /// Request the sampler to stop. Never blocks; calling it more than once is harmless.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.worker.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the task to exit and return why it did.
    ///
    /// Does not stop the sampler; call [`stop`](Self::stop) first to end it.
    pub async fn join(mut self) -> Result<SamplerExit> {
        match self.worker.take() {
            Some(worker) => worker.await.map_err(|e| Error::Join(e.to_string())),
            None => Err(Error::Join("sampler already joined".to_string())),
        }
    }
}

impl fmt::Debug for PoolSampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolSampler")
            .field("stopped", &self.is_stopped())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for PoolSampler {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.token.cancel();
        }
    }
}

/// Start recording the statistics of `pool` every `config.interval`.
///
/// The task keeps only a weak reference to the pool and ends on its own once the pool
/// is dropped or reports itself closed. Must be called within a tokio runtime.
pub fn start_sampling<P: ConnectionPool>(
    pool: &Arc<P>,
    recorder: Arc<dyn StatsRecorder>,
    config: SamplerConfig,
    token: CancellationToken,
) -> Result<PoolSampler> {
    let tags = config.tags()?;

    tracing::info!(
        target: "ormtrace",
        interval_ms = config.interval.as_millis() as u64,
        database = config.database.as_deref().unwrap_or(""),
        "pool sampler started"
    );

    let worker = tokio::spawn(run_sampler_loop(
        Arc::downgrade(pool),
        recorder,
        tags,
        config.interval,
        token.clone(),
    ));

    Ok(PoolSampler {
        token,
        worker: Some(worker),
    })
}

async fn run_sampler_loop<P: ConnectionPool>(
    pool: Weak<P>,
    recorder: Arc<dyn StatsRecorder>,
    tags: TagMap,
    period: Duration,
    token: CancellationToken,
) -> SamplerExit {
    let exit = sample_until_exit(&pool, recorder.as_ref(), &tags, period, &token).await;
    tracing::info!(target: "ormtrace", reason = %exit, "pool sampler exited");
    exit
}

async fn sample_until_exit<P: ConnectionPool>(
    pool: &Weak<P>,
    recorder: &dyn StatsRecorder,
    tags: &TagMap,
    period: Duration,
    token: &CancellationToken,
) -> SamplerExit {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => return SamplerExit::Stopped,
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            return SamplerExit::PoolDropped;
        };
        let stats = pool.stats();

        if stats.open_connections == 0 {
            let ping = tokio::select! {
                biased;
                _ = token.cancelled() => return SamplerExit::Stopped,
                result = pool.ping() => result,
            };
            match ping {
                Ok(()) => {}
                Err(PingError::Closed) => return SamplerExit::PoolClosed,
                Err(err) => {
                    tracing::debug!(target: "ormtrace", error = %err, "pool ping failed");
                }
            }
        }
        drop(pool);

        if token.is_cancelled() {
            return SamplerExit::Stopped;
        }
        recorder.record(tags, &stats.measurements());
    }
}
