use crate::prelude::*;
use crate::stats::ReadStats;
use derivative::Derivative;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(10);
const DEFAULT_MULTIPLIER: f64 = 1.5;
const DEFAULT_RANDOMIZATION_FACTOR: f64 = 0.5;
const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(120);

const DEFAULT_INPLACE_SEEK_LIMIT: u64 = 8 * 1024 * 1024;
const DEFAULT_MIN_RANGE_REQUEST_SIZE: u64 = 2 * 1024 * 1024;

/// Advisory hint about the expected access pattern. `Auto` starts out
/// streaming like `Sequential` and hardens into `Random` the first time the
/// caller seeks backwards or jumps far ahead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fadvise {
    #[default]
    Sequential,
    Random,
    Auto,
}

/// Parameters of the truncated exponential backoff used around every
/// network operation.
#[derive(Clone, Debug)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> BackoffPolicy {
        BackoffPolicy {
            initial_delay: DEFAULT_INITIAL_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: DEFAULT_RANDOMIZATION_FACTOR,
            max_elapsed: DEFAULT_MAX_ELAPSED,
        }
    }
}

impl BackoffPolicy {
    pub(crate) fn validate(&self) -> Result<()> {
        let bad = |msg: &str| BlobseekError::InvalidArgument(msg.to_string());
        if self.initial_delay.is_zero() {
            return Err(bad("backoff initial delay must be positive"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(bad("backoff multiplier must be at least 1"));
        }
        if !self.randomization_factor.is_finite()
            || !(0.0..=1.0).contains(&self.randomization_factor)
        {
            return Err(bad("backoff randomization factor must be within [0, 1]"));
        }
        Ok(())
    }
}

/// Immutable configuration of a read channel. Built with `with_*` methods;
/// every field has the default listed on its method.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ReadOptions {
    pub(crate) backoff: BackoffPolicy,
    pub(crate) fail_on_not_found: bool,
    pub(crate) fail_on_gzip: bool,
    pub(crate) inplace_seek_limit: u64,
    pub(crate) fadvise: Fadvise,
    pub(crate) min_range_request_size: u64,
    pub(crate) footer_prefetch_size: u64,
    #[derivative(Debug = "ignore")]
    pub(crate) stats: Option<Arc<dyn ReadStats>>,
}

impl Default for ReadOptions {
    fn default() -> ReadOptions {
        ReadOptions {
            backoff: BackoffPolicy::default(),
            fail_on_not_found: true,
            fail_on_gzip: true,
            inplace_seek_limit: DEFAULT_INPLACE_SEEK_LIMIT,
            fadvise: Fadvise::default(),
            min_range_request_size: DEFAULT_MIN_RANGE_REQUEST_SIZE,
            footer_prefetch_size: 0,
            stats: None,
        }
    }
}

impl ReadOptions {
    /// Retry schedule for transient failures. Default: 200 ms initial delay,
    /// 1.5x growth, 50% jitter, 10 s cap, 120 s total budget.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> ReadOptions {
        self.backoff = backoff;
        self
    }

    /// When true (the default), metadata is resolved eagerly and a missing
    /// object fails the open. When false, resolution is deferred to the
    /// first size-dependent operation.
    pub fn with_fail_on_not_found(mut self, fail_on_not_found: bool) -> ReadOptions {
        self.fail_on_not_found = fail_on_not_found;
        self
    }

    /// When true (the default), a gzip-encoded object fails at open time.
    /// When false the object is readable, but only sequentially and with an
    /// unknown size until fully drained.
    pub fn with_fail_on_gzip(mut self, fail_on_gzip: bool) -> ReadOptions {
        self.fail_on_gzip = fail_on_gzip;
        self
    }

    /// Forward seeks up to this many bytes are served by draining the live
    /// stream instead of opening a new one. Default 8 MiB.
    pub fn with_inplace_seek_limit(mut self, limit: u64) -> ReadOptions {
        self.inplace_seek_limit = limit;
        self
    }

    /// Initial access-pattern hint. Default [`Fadvise::Sequential`].
    pub fn with_fadvise(mut self, fadvise: Fadvise) -> ReadOptions {
        self.fadvise = fadvise;
        self
    }

    /// Lower bound on the span of ranged GETs in random-access mode, and on
    /// the footer prefetch. Default 2 MiB.
    pub fn with_min_range_request_size(mut self, size: u64) -> ReadOptions {
        self.min_range_request_size = size;
        self
    }

    /// Widens the prefetched tail beyond `min_range_request_size` for
    /// formats with larger footers. Default 0 (the minimum range size wins).
    pub fn with_footer_prefetch_size(mut self, size: u64) -> ReadOptions {
        self.footer_prefetch_size = size;
        self
    }

    /// Optional sink for byte/seek/retry counters. Default none.
    pub fn with_stats(mut self, stats: Arc<dyn ReadStats>) -> ReadOptions {
        self.stats = Some(stats);
        self
    }

    pub(crate) fn stats(&self) -> Option<&dyn ReadStats> {
        self.stats.as_deref()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.backoff.validate()
    }
}
