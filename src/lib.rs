//! meshroute reconciles declared routing intent with live workload placement.
//!
//! It uses the following terminology:
//! * Routes are declared hostnames (plus an optional path) that traffic can
//!   target.
//! * Route mappings associate a route with a logical process, carrying a
//!   declared traffic-split weight.
//! * Logical processes are implemented by one or more instance groups. During
//!   a rolling deploy a single process may be served by several groups at
//!   once.
//! * Backends are concrete `(address, port)` endpoints of running instances.
//!
//! # Usage
//!
//! * The externally-routable view is produced by [routes::Collector], which
//!   joins routes, mappings, process associations and backend sets into an
//!   ordered, weight-corrected list of [routes::RouteWithBackends].
//! * The internal mesh view is produced by
//!   [internal_routes::InternalRouteResolver], which joins the same stores
//!   against a live [placement::PlacementQuery] and returns an unweighted
//!   union of backends per internal hostname.
//! * Both are pulled on demand. Neither retains state between calls; the
//!   stores in [route], [mapping], [process] and [backend] are long-lived and
//!   mutated by separate ingestion paths, such as the
//!   [reconciler::BackendSetReconciler].
//!
//! # DTrace probes
//!
//! meshroute contains a handful of DTrace USDT probes:
//!
//! - `collect-start`: Fires before collecting the external route view.
//! - `collect-done`: Fires after collecting, with the number of records.
//! - `internal-routes-start`: Fires before resolving the internal route view.
//! - `internal-routes-done`: Fires after resolving, with the number of
//!   internal routes.
//! - `internal-routes-failed`: Fires when the placement query fails.
//! - `reconcile-start`: Fires before the reconciler queries placement.
//! - `reconcile-done`: Fires after the reconciler replaces the backend sets,
//!   with the number of instance groups seen.
//! - `reconcile-failed`: Fires when the reconciler's placement query fails.
//!
//! The probes are behind the `"probes"` feature, which is enabled by default,
//! and must be registered with [register_probes] before they can be traced.

// Public API
pub mod backend;
pub mod internal_routes;
pub mod mapping;
pub mod placement;
pub mod policy;
pub mod process;
pub mod reconciler;
pub mod route;
pub mod routes;
pub mod vip;

// Necessary for implementation
mod backoff;
mod join;
#[cfg(test)]
mod test_utils;
mod weights;

/// Registers the USDT probes exposed by this crate.
///
/// Registration is technically fallible, though extremely unlikely to fail
/// in practice. Applications may choose to ignore the error and continue
/// without instrumentation.
#[cfg(feature = "probes")]
pub fn register_probes() -> Result<(), usdt::Error> {
    usdt::register_probes()
}

/// USDT probes for tracing how meshroute builds its routing views.
#[cfg(feature = "probes")]
#[usdt::provider(provider = "meshroute")]
mod probes {
    /// Fires right before collecting the external route view.
    fn collect__start() {}

    /// Fires once the external route view is built, with its record count.
    fn collect__done(routes: u64) {}

    /// Fires right before resolving the internal route view.
    fn internal__routes__start() {}

    /// Fires once the internal route view is built, with its route count.
    fn internal__routes__done(routes: u64) {}

    /// Fires when the placement query fails, with a string identifying the
    /// reason.
    fn internal__routes__failed(reason: &str) {}

    /// Fires right before the reconciler queries live placement.
    fn reconcile__start() {}

    /// Fires after the reconciler has replaced the backend sets, with the
    /// number of instance groups observed.
    fn reconcile__done(groups: u64) {}

    /// Fires when the reconciler fails to query live placement.
    fn reconcile__failed(reason: &str) {}
}
