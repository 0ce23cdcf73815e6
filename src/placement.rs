//! The interface for querying live workload placement from the scheduler.

use crate::process::InstanceGroupId;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Scheduler unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    #[cfg(feature = "probes")]
    // Convert to a static string for USDT probes.
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Error::Unavailable(_) => "Unavailable",
            Error::Other(_) => "Other",
        }
    }
}

/// Lifecycle of a workload instance, as reported by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

/// Maps a port inside the container onto a port of the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PortMapping {
    pub container_port: u32,
    pub host_port: u32,
}

impl PortMapping {
    pub fn new(container_port: u32, host_port: u32) -> Self {
        Self {
            container_port,
            host_port,
        }
    }
}

/// Network information for a single placed instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetInfo {
    /// Address of the host cell, reachable from outside the mesh.
    pub address: String,
    /// Address of the instance on the container overlay network.
    pub instance_address: String,
    pub ports: Vec<PortMapping>,
}

impl NetInfo {
    /// Returns the first port mapping whose container port is not `reserved_port`.
    pub fn app_port(&self, reserved_port: u32) -> Option<PortMapping> {
        self.ports
            .iter()
            .find(|port| port.container_port != reserved_port)
            .copied()
    }
}

/// The placement of one instance within an instance group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstancePlacement {
    pub instance_group: InstanceGroupId,
    pub state: LifecycleState,
    pub net_info: NetInfo,
}

impl InstancePlacement {
    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn app_port(&self, reserved_port: u32) -> Option<PortMapping> {
        self.net_info.app_port(reserved_port)
    }
}

/// Queries the scheduler for the placement of all known workload instances.
///
/// An entry of `None` represents an instance record the scheduler knows of
/// but could not describe.
#[async_trait]
pub trait PlacementQuery: Send + Sync {
    async fn instances(&self) -> Result<Vec<Option<InstancePlacement>>, Error>;
}

pub type SharedPlacementQuery = Arc<dyn PlacementQuery>;
