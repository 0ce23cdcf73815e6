use rand::{rng, Rng};
use std::time::Duration;

pub trait ExponentialBackoff: Sized {
    fn add_spread(&self, spread: Duration) -> Self;
    fn exponential_backoff(&self, max: Duration) -> Self;
}

impl ExponentialBackoff for Duration {
    fn add_spread(&self, spread: Duration) -> Self {
        let nanos = u64::try_from(spread.as_nanos()).unwrap_or(u64::MAX);
        if nanos == 0 {
            return *self;
        }
        let spread = rng().random_range(0..nanos);
        self.saturating_add(Duration::from_nanos(spread))
    }

    fn exponential_backoff(&self, max: Duration) -> Self {
        self.saturating_mul(2).min(max)
    }
}
