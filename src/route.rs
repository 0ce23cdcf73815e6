//! Declared routes, and the store which holds them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Identifies a declared route.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash)]
pub struct RouteId(pub Arc<str>);

impl RouteId {
    pub fn new(id: impl ToString) -> Self {
        Self(Arc::from(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RouteId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&'_ str> for RouteId {
    fn from(s: &'_ str) -> Self {
        Self(Arc::from(s))
    }
}

impl std::borrow::Borrow<str> for RouteId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RouteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for RouteId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

/// A hostname (and optional path) which traffic can target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub id: RouteId,
    pub host: String,
    /// An empty path means "no path restriction".
    pub path: String,
    /// True if the host belongs to the reserved internal domain.
    pub internal: bool,
    /// The VIP recorded for this route by the ingestion path, if any.
    pub vip: Option<String>,
}

impl Route {
    pub fn new(id: impl Into<RouteId>, host: impl ToString) -> Self {
        Self {
            id: id.into(),
            host: host.to_string(),
            path: String::new(),
            internal: false,
            vip: None,
        }
    }

    pub fn with_path(mut self, path: impl ToString) -> Self {
        self.path = path.to_string();
        self
    }

    pub fn internal(mut self, vip: Option<String>) -> Self {
        self.internal = true;
        self.vip = vip;
        self
    }

    /// The route's host, normalized to lowercase.
    pub fn hostname(&self) -> String {
        self.host.to_lowercase()
    }
}

/// Looks up a single route by identifier.
pub trait RouteLookup: Send + Sync {
    fn get(&self, id: &RouteId) -> Option<Route>;
}

pub type SharedRouteLookup = Arc<dyn RouteLookup>;

#[derive(Default)]
struct RoutesInner {
    routes: HashMap<RouteId, Route>,
    by_hostname: HashMap<String, RouteId>,
}

/// Concurrent store of declared routes, keyed by [RouteId].
#[derive(Default)]
pub struct RoutesRepo {
    inner: RwLock<RoutesInner>,
}

impl RoutesRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, route: Route) {
        let mut inner = self.inner.write().unwrap();
        inner.by_hostname.insert(route.hostname(), route.id.clone());
        inner.routes.insert(route.id.clone(), route);
    }

    pub fn delete(&self, id: &RouteId) {
        let mut inner = self.inner.write().unwrap();
        let Some(route) = inner.routes.remove(id) else {
            return;
        };
        let hostname = route.hostname();
        if inner.by_hostname.get(&hostname) == Some(id) {
            inner.by_hostname.remove(&hostname);
        }
    }

    /// Replaces the full contents of the store.
    pub fn sync(&self, routes: Vec<Route>) {
        let mut replacement = RoutesInner::default();
        for route in routes {
            replacement
                .by_hostname
                .insert(route.hostname(), route.id.clone());
            replacement.routes.insert(route.id.clone(), route);
        }
        *self.inner.write().unwrap() = replacement;
    }

    pub fn get(&self, id: &RouteId) -> Option<Route> {
        self.inner.read().unwrap().routes.get(id).cloned()
    }

    /// Returns the VIP stored for the route registered under `hostname`.
    ///
    /// Hostnames match case-insensitively. A known route without a stored
    /// VIP yields an empty string.
    pub fn get_vip_by_name(&self, hostname: &str) -> Option<String> {
        let inner = self.inner.read().unwrap();
        let id = inner.by_hostname.get(&hostname.to_lowercase())?;
        let route = inner.routes.get(id)?;
        Some(route.vip.clone().unwrap_or_default())
    }

    /// Lists every route as a map of identifier to lowercased hostname.
    pub fn list(&self) -> HashMap<RouteId, String> {
        self.inner
            .read()
            .unwrap()
            .routes
            .iter()
            .map(|(id, route)| (id.clone(), route.hostname()))
            .collect()
    }
}

impl RouteLookup for RoutesRepo {
    fn get(&self, id: &RouteId) -> Option<Route> {
        RoutesRepo::get(self, id)
    }
}
