//! Backends, and the sets of them reachable for each instance group.

use crate::placement::InstancePlacement;
use crate::process::InstanceGroupId;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{event, Level};

/// A single network endpoint of a running instance.
///
/// Equality is structural; there is no identity beyond `(address, port)`.
#[derive(Clone, PartialEq, Eq, Debug, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Backend {
    pub address: String,
    pub port: u32,
}

impl Backend {
    pub fn new(address: impl ToString, port: u32) -> Self {
        Self {
            address: address.to_string(),
            port,
        }
    }
}

/// Provides the backends of an instance group.
///
/// The same workload may expose different addresses to clients outside the
/// mesh and to peers inside it, so there are two lookups.
pub trait BackendSetProvider: Send + Sync {
    /// Backends reachable from outside the mesh.
    fn get(&self, group: &InstanceGroupId) -> Vec<Backend>;

    /// Backends reachable from within the mesh.
    fn get_internal(&self, group: &InstanceGroupId) -> Vec<Backend>;
}

pub type SharedBackendSetProvider = Arc<dyn BackendSetProvider>;

#[derive(Default)]
struct Store {
    external: HashMap<InstanceGroupId, Vec<Backend>>,
    internal: HashMap<InstanceGroupId, Vec<Backend>>,
}

fn insert_unique(set: &mut Vec<Backend>, backend: Backend) {
    if !set.contains(&backend) {
        set.push(backend);
    }
}

/// Concurrent store of backend sets, keyed by instance group.
#[derive(Default)]
pub struct BackendSetRepo {
    store: RwLock<Store>,
}

impl BackendSetRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an externally-reachable backend, unless it is already known.
    pub fn insert(&self, group: InstanceGroupId, backend: Backend) {
        let mut store = self.store.write().unwrap();
        insert_unique(store.external.entry(group).or_default(), backend);
    }

    /// Adds an internally-reachable backend, unless it is already known.
    pub fn insert_internal(&self, group: InstanceGroupId, backend: Backend) {
        let mut store = self.store.write().unwrap();
        insert_unique(store.internal.entry(group).or_default(), backend);
    }

    /// Rebuilds every backend set from a full placement listing.
    ///
    /// Only running instances with an application port (any container port
    /// other than `reserved_port`) contribute. Externally, an instance is
    /// reached through its host address and host port; internally, through
    /// its overlay address and container port.
    ///
    /// Returns the number of instance groups with at least one backend.
    pub fn replace_from_placements(
        &self,
        placements: &[Option<InstancePlacement>],
        reserved_port: u32,
    ) -> usize {
        let mut replacement = Store::default();
        for placement in placements {
            let Some(placement) = placement else {
                event!(Level::DEBUG, "Skipping instance without placement record");
                continue;
            };
            if !placement.is_running() {
                event!(
                    Level::DEBUG,
                    group = %placement.instance_group,
                    state = ?placement.state,
                    "Skipping non-running instance"
                );
                continue;
            }
            let Some(port) = placement.app_port(reserved_port) else {
                event!(
                    Level::DEBUG,
                    group = %placement.instance_group,
                    "Skipping instance without application port"
                );
                continue;
            };

            let group = &placement.instance_group;
            insert_unique(
                replacement.external.entry(group.clone()).or_default(),
                Backend::new(&placement.net_info.address, port.host_port),
            );
            insert_unique(
                replacement.internal.entry(group.clone()).or_default(),
                Backend::new(&placement.net_info.instance_address, port.container_port),
            );
        }

        let groups = replacement.external.len();
        *self.store.write().unwrap() = replacement;
        groups
    }
}

impl BackendSetProvider for BackendSetRepo {
    fn get(&self, group: &InstanceGroupId) -> Vec<Backend> {
        self.store
            .read()
            .unwrap()
            .external
            .get(group)
            .cloned()
            .unwrap_or_default()
    }

    fn get_internal(&self, group: &InstanceGroupId) -> Vec<Backend> {
        self.store
            .read()
            .unwrap()
            .internal
            .get(group)
            .cloned()
            .unwrap_or_default()
    }
}
