//! Weighted associations between routes and logical processes.

use crate::route::RouteId;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Identifies a logical process.
///
/// Logical processes are platform-level identifiers, decoupled from the
/// instance groups which actually run them.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct ProcessId(pub Arc<str>);

impl ProcessId {
    pub fn new(id: impl ToString) -> Self {
        Self(Arc::from(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&'_ str> for ProcessId {
    fn from(s: &'_ str) -> Self {
        Self(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for ProcessId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for ProcessId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// Maps a route onto a logical process.
///
/// Several mappings may share a route (a traffic split across processes)
/// or a process (one process serving several routes).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMapping {
    pub route_id: RouteId,
    pub process_id: ProcessId,
    /// The declared weight. Not validated against other mappings.
    pub weight: i32,
}

impl RouteMapping {
    pub fn new(route_id: impl Into<RouteId>, process_id: impl Into<ProcessId>, weight: i32) -> Self {
        Self {
            route_id: route_id.into(),
            process_id: process_id.into(),
            weight,
        }
    }

    /// The identifier of this mapping within the store.
    pub fn key(&self) -> String {
        format!("{}-{}", self.route_id, self.process_id)
    }
}

/// Source of route mappings and their effective weights.
pub trait MappingSource: Send + Sync {
    /// Lists all mappings, keyed by [RouteMapping::key]. Unordered.
    fn list(&self) -> HashMap<String, RouteMapping>;

    /// Returns the weight to publish for a mapping.
    fn calculated_weight(&self, mapping: &RouteMapping) -> i32;
}

pub type SharedMappingSource = Arc<dyn MappingSource>;

// Declared weight on one route, summed over its mappings.
#[derive(Clone, Copy, Default)]
struct RouteTotal {
    weight: i64,
    mappings: usize,
}

#[derive(Default)]
struct MappingsInner {
    mappings: HashMap<String, RouteMapping>,
    // Kept in step with `mappings`.
    totals: HashMap<RouteId, RouteTotal>,
}

impl MappingsInner {
    fn insert(&mut self, mapping: RouteMapping) {
        let total = self.totals.entry(mapping.route_id.clone()).or_default();
        total.weight += i64::from(mapping.weight);
        total.mappings += 1;
        if let Some(old) = self.mappings.insert(mapping.key(), mapping) {
            self.subtract(&old);
        }
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.mappings.remove(key) {
            self.subtract(&old);
        }
    }

    fn subtract(&mut self, mapping: &RouteMapping) {
        let Some(total) = self.totals.get_mut(&mapping.route_id) else {
            return;
        };
        total.weight -= i64::from(mapping.weight);
        total.mappings -= 1;
        if total.mappings == 0 {
            self.totals.remove(&mapping.route_id);
        }
    }

    fn total_weight(&self, route_id: &RouteId) -> i64 {
        self.totals.get(route_id).map_or(0, |total| total.weight)
    }
}

/// Concurrent store of route mappings.
#[derive(Default)]
pub struct RouteMappingsRepo {
    inner: RwLock<MappingsInner>,
}

impl RouteMappingsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&self, mapping: RouteMapping) {
        self.inner.write().unwrap().insert(mapping);
    }

    pub fn unmap(&self, mapping: &RouteMapping) {
        self.inner.write().unwrap().remove(&mapping.key());
    }

    /// Replaces the full contents of the store.
    pub fn sync(&self, mappings: Vec<RouteMapping>) {
        let mut replacement = MappingsInner::default();
        for mapping in mappings {
            replacement.insert(mapping);
        }
        *self.inner.write().unwrap() = replacement;
    }

    pub fn list(&self) -> HashMap<String, RouteMapping> {
        self.inner.read().unwrap().mappings.clone()
    }

    /// Expresses the declared weight of `mapping` as a percentage of the
    /// total declared weight on its route, rounded to the nearest integer.
    ///
    /// Rounding means the percentages of a route's mappings need not sum to
    /// exactly 100.
    pub fn calculated_weight(&self, mapping: &RouteMapping) -> i32 {
        let total = self.inner.read().unwrap().total_weight(&mapping.route_id);
        if total <= 0 {
            return 0;
        }
        (f64::from(mapping.weight) * 100.0 / total as f64).round() as i32
    }
}

impl MappingSource for RouteMappingsRepo {
    fn list(&self) -> HashMap<String, RouteMapping> {
        RouteMappingsRepo::list(self)
    }

    fn calculated_weight(&self, mapping: &RouteMapping) -> i32 {
        RouteMappingsRepo::calculated_weight(self, mapping)
    }
}
