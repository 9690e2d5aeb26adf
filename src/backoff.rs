use crate::prelude::*;
use crate::options::BackoffPolicy;
use crate::stats::ReadStats;
use crate::transport::TransportError;
use std::time::Duration;

/// Yields successive sleep intervals for one retry loop: truncated
/// exponential growth with uniform jitter, until the cumulative delay would
/// pass the policy's elapsed ceiling. One sequencer per operation; they are
/// never reused.
pub struct BackoffSequencer {
    policy: BackoffPolicy,
    rng: fastrand::Rng,
    next_interval: Duration,
    elapsed: Duration,
}

impl BackoffSequencer {
    pub fn new(policy: &BackoffPolicy) -> BackoffSequencer {
        BackoffSequencer {
            policy: policy.clone(),
            rng: fastrand::Rng::new(),
            next_interval: policy.initial_delay,
            elapsed: Duration::ZERO,
        }
    }

    /// The next interval to sleep, or `None` when the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let interval = self.next_interval.min(self.policy.max_delay);
        let f = self.policy.randomization_factor;
        // uniform in [interval * (1 - f), interval * (1 + f)]
        let spread = 1.0 - f + self.rng.f64() * 2.0 * f;
        let delay = interval.mul_f64(spread);
        if self.elapsed + delay > self.policy.max_elapsed {
            return None;
        }
        self.elapsed += delay;
        self.next_interval = interval
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_delay);
        Some(delay)
    }
}

/// Runs `op` until it succeeds, fails non-transiently, or the backoff budget
/// runs out. The last transient error is returned when we give up.
pub(crate) fn retry_transient<T>(
    policy: &BackoffPolicy,
    stats: Option<&dyn ReadStats>,
    what: &str,
    mut op: impl FnMut() -> Result<T, TransportError>,
) -> Result<T, TransportError> {
    let mut backoff = BackoffSequencer::new(policy);
    loop {
        let err = match op() {
            Ok(value) => return Ok(value),
            Err(err @ TransportError::Transient(_)) => err,
            Err(err) => return Err(err),
        };
        match backoff.next_delay() {
            Some(delay) => {
                warn!("transient failure during {what}, retrying in {delay:?}: {err}");
                if let Some(stats) = stats {
                    stats.record_retry();
                }
                std::thread::sleep(delay);
            }
            None => return Err(err),
        }
    }
}
