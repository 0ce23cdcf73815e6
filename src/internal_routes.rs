//! The internal mesh view: every backend of every process mapped to an
//! internal hostname, with no weighting.

use crate::backend::Backend;
use crate::mapping::SharedMappingSource;
use crate::placement::{self, NetInfo, SharedPlacementQuery};
use crate::policy::Policy;
#[cfg(feature = "probes")]
use crate::probes;
use crate::process::{InstanceGroupId, SharedAssociationLookup};
use crate::route::SharedRouteLookup;
use crate::vip::SharedVipResolver;

use debug_ignore::DebugIgnore;
use std::collections::HashMap;
use tracing::{event, instrument, Level};

/// Identifies an internal route.
///
/// Both fields are part of the identity: a hostname without a VIP is a
/// valid key, distinct from the same hostname with one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct InternalRoute {
    pub hostname: String,
    pub vip: String,
}

pub type InternalRoutes = HashMap<InternalRoute, Vec<Backend>>;

/// Joins routes, mappings and process associations against live placement
/// to build the internal mesh view.
#[derive(Debug)]
pub struct InternalRouteResolver {
    routes: DebugIgnore<SharedRouteLookup>,
    mappings: DebugIgnore<SharedMappingSource>,
    associations: DebugIgnore<SharedAssociationLookup>,
    placement: DebugIgnore<SharedPlacementQuery>,
    vips: DebugIgnore<SharedVipResolver>,
    policy: Policy,
}

impl InternalRouteResolver {
    pub fn new(
        routes: SharedRouteLookup,
        mappings: SharedMappingSource,
        associations: SharedAssociationLookup,
        placement: SharedPlacementQuery,
        vips: SharedVipResolver,
        policy: Policy,
    ) -> Self {
        Self {
            routes: DebugIgnore(routes),
            mappings: DebugIgnore(mappings),
            associations: DebugIgnore(associations),
            placement: DebugIgnore(placement),
            vips: DebugIgnore(vips),
            policy,
        }
    }

    // Groups the net info of running instances by instance group.
    async fn running_instances(
        &self,
    ) -> Result<HashMap<InstanceGroupId, Vec<NetInfo>>, placement::Error> {
        let instances = self.placement.instances().await?;

        let mut by_group: HashMap<InstanceGroupId, Vec<NetInfo>> = HashMap::new();
        for instance in instances {
            let Some(instance) = instance else {
                event!(Level::DEBUG, "Skipping instance without placement record");
                continue;
            };
            if !instance.is_running() {
                event!(
                    Level::DEBUG,
                    group = %instance.instance_group,
                    state = ?instance.state,
                    "Skipping non-running instance"
                );
                continue;
            }
            by_group
                .entry(instance.instance_group)
                .or_default()
                .push(instance.net_info);
        }
        Ok(by_group)
    }

    /// Builds the internal route view.
    ///
    /// Fails only if live placement cannot be queried, in which case the
    /// underlying error is returned and no partial view is produced.
    #[instrument(level = "debug", skip(self), err, name = "InternalRouteResolver::get")]
    pub async fn get(&self) -> Result<InternalRoutes, placement::Error> {
        #[cfg(feature = "probes")]
        probes::internal__routes__start!(|| ());

        let instances = match self.running_instances().await {
            Ok(instances) => instances,
            Err(err) => {
                #[cfg(feature = "probes")]
                probes::internal__routes__failed!(|| err.as_str());
                return Err(err);
            }
        };

        let mut hostnames: HashMap<String, Vec<Backend>> = HashMap::new();
        for mapping in self.mappings.list().into_values() {
            let Some(route) = self.routes.get(&mapping.route_id) else {
                event!(Level::DEBUG, route = %mapping.route_id, "Skipping mapping: route not found");
                continue;
            };
            let hostname = route.hostname();
            if !self.policy.is_internal_hostname(&hostname) {
                continue;
            }
            let Some(association) = self.associations.get(&mapping.process_id) else {
                event!(
                    Level::DEBUG,
                    process = %mapping.process_id,
                    "Skipping mapping: no instance groups for process"
                );
                continue;
            };

            let backends = hostnames.entry(hostname).or_default();
            for group in &association.instance_groups {
                let Some(net_infos) = instances.get(group) else {
                    continue;
                };
                for net_info in net_infos {
                    let Some(port) = net_info.app_port(self.policy.reserved_port) else {
                        event!(
                            Level::DEBUG,
                            group = %group,
                            address = %net_info.instance_address,
                            "Skipping instance without application port"
                        );
                        continue;
                    };
                    backends.push(Backend::new(&net_info.instance_address, port.container_port));
                }
            }
        }

        let routes: InternalRoutes = hostnames
            .into_iter()
            .map(|(hostname, backends)| {
                let vip = self.vips.resolve(&hostname);
                (InternalRoute { hostname, vip }, backends)
            })
            .collect();

        event!(Level::DEBUG, count = routes.len(), "Resolved internal routes");
        #[cfg(feature = "probes")]
        probes::internal__routes__done!(|| routes.len() as u64);
        Ok(routes)
    }
}
