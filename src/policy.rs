//! Configuration options which can alter how routes are resolved.

use std::time::Duration;

/// The hostname suffix reserved for routes internal to the mesh.
pub const DEFAULT_INTERNAL_DOMAIN_SUFFIX: &str = ".apps.internal";

/// The container port used for operator shell access.
pub const DEFAULT_RESERVED_PORT: u32 = 2222;

/// Policy which is applicable to route resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Policy {
    /// Hostnames ending in this suffix are resolved as internal routes.
    pub internal_domain_suffix: String,

    /// A container port which never carries application traffic.
    pub reserved_port: u32,
}

impl Policy {
    pub fn is_internal_hostname(&self, hostname: &str) -> bool {
        hostname.ends_with(&self.internal_domain_suffix)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            internal_domain_suffix: DEFAULT_INTERNAL_DOMAIN_SUFFIX.to_string(),
            reserved_port: DEFAULT_RESERVED_PORT,
        }
    }
}

// How often do we want to refresh backend sets from the scheduler?
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

// How long do we wait before retrying a failed placement query?
pub const DEFAULT_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

// Retries never wait longer than this, not counting spread.
pub const DEFAULT_MAX_FAILURE_BACKOFF: Duration = Duration::from_secs(30);

/// Configuration options for the [crate::reconciler::BackendSetReconciler].
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// How long should we wait between successful placement queries?
    ///
    /// Default: 60 seconds
    pub interval: Duration,

    /// How long should we wait before retrying after the first failed query?
    ///
    /// Doubles with each consecutive failure.
    ///
    /// Default: 1 second
    pub failure_backoff: Duration,

    /// Upper bound on the retry delay.
    ///
    /// Default: 30 seconds
    pub max_failure_backoff: Duration,

    /// Random spread added to each retry delay.
    ///
    /// Default: 250 milliseconds
    pub backoff_spread: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONCILE_INTERVAL,
            failure_backoff: DEFAULT_FAILURE_BACKOFF,
            max_failure_backoff: DEFAULT_MAX_FAILURE_BACKOFF,
            backoff_spread: Duration::from_millis(250),
        }
    }
}
