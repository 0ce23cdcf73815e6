//! Utilities to help with testing meshroute

use crate::placement::{
    self, InstancePlacement, LifecycleState, NetInfo, PlacementQuery, PortMapping,
};
use crate::process::InstanceGroupId;
use crate::vip::VipResolver;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// A [VipResolver] backed by a fixed map. Unknown hostnames have no VIP.
pub struct MapVipResolver {
    vips: HashMap<String, String>,
}

impl MapVipResolver {
    pub fn new<'a>(vips: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            vips: vips
                .into_iter()
                .map(|(host, vip)| (host.to_string(), vip.to_string()))
                .collect(),
        }
    }
}

impl VipResolver for MapVipResolver {
    fn resolve(&self, hostname: &str) -> String {
        self.vips.get(hostname).cloned().unwrap_or_default()
    }
}

/// A test-only placement query which returns whatever it was last told to.
pub struct FakePlacement {
    placements: Mutex<Vec<Option<InstancePlacement>>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakePlacement {
    pub fn new(placements: Vec<Option<InstancePlacement>>) -> Self {
        Self {
            placements: Mutex::new(placements),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn replace(&self, placements: Vec<Option<InstancePlacement>>) {
        *self.placements.lock().unwrap() = placements;
    }

    /// Makes every subsequent query fail until cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// How many queries have been made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlacementQuery for FakePlacement {
    async fn instances(&self) -> Result<Vec<Option<InstancePlacement>>, placement::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(placement::Error::Unavailable(
                "connection refused".to_string(),
            ));
        }
        Ok(self.placements.lock().unwrap().clone())
    }
}

/// Builds a placement record for a running instance.
pub fn running(
    group: &str,
    address: &str,
    instance_address: &str,
    ports: &[(u32, u32)],
) -> Option<InstancePlacement> {
    with_state(group, LifecycleState::Running, address, instance_address, ports)
}

/// Builds a placement record in an arbitrary lifecycle state.
pub fn with_state(
    group: &str,
    state: LifecycleState,
    address: &str,
    instance_address: &str,
    ports: &[(u32, u32)],
) -> Option<InstancePlacement> {
    Some(InstancePlacement {
        instance_group: InstanceGroupId::new(group),
        state,
        net_info: NetInfo {
            address: address.to_string(),
            instance_address: instance_address.to_string(),
            ports: ports
                .iter()
                .map(|&(container_port, host_port)| PortMapping::new(container_port, host_port))
                .collect(),
        },
    })
}

/// Installs a subscriber which logs through the test harness.
///
/// Safe to call from every test; only the first call installs anything.
pub fn setup_tracing_subscriber() {
    use tracing_subscriber::fmt::format::FmtSpan;
    let _ = tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_span_events(FmtSpan::ENTER)
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
