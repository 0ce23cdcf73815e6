//! The externally-routable view: weighted backends per route and process.

use crate::backend::{Backend, SharedBackendSetProvider};
use crate::mapping::{ProcessId, SharedMappingSource};
#[cfg(feature = "probes")]
use crate::probes;
use crate::process::SharedAssociationLookup;
use crate::route::SharedRouteLookup;
use crate::vip::SharedVipResolver;
use crate::weights;

use debug_ignore::DebugIgnore;
use tracing::{event, instrument, Level};

/// One weighted destination of a route.
///
/// Several records share a `(hostname, path)` when traffic is split across
/// processes; their weights sum to 100 after collection, as long as the
/// declared weights did not already exceed it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RouteWithBackends {
    pub hostname: String,
    pub path: String,
    /// Sorted by address.
    pub backends: Vec<Backend>,
    pub process_id: ProcessId,
    pub weight: i32,
    pub internal: bool,
    /// Only populated for internal routes.
    pub vip: String,
}

/// Joins routes, mappings, process associations and backend sets into the
/// externally-routable view.
#[derive(Debug)]
pub struct Collector {
    routes: DebugIgnore<SharedRouteLookup>,
    mappings: DebugIgnore<SharedMappingSource>,
    associations: DebugIgnore<SharedAssociationLookup>,
    backend_sets: DebugIgnore<SharedBackendSetProvider>,
    vips: DebugIgnore<SharedVipResolver>,
}

impl Collector {
    pub fn new(
        routes: SharedRouteLookup,
        mappings: SharedMappingSource,
        associations: SharedAssociationLookup,
        backend_sets: SharedBackendSetProvider,
        vips: SharedVipResolver,
    ) -> Self {
        Self {
            routes: DebugIgnore(routes),
            mappings: DebugIgnore(mappings),
            associations: DebugIgnore(associations),
            backend_sets: DebugIgnore(backend_sets),
            vips: DebugIgnore(vips),
        }
    }

    /// Builds the ordered, weight-corrected list of routes with backends.
    ///
    /// Mappings whose route or process association is missing, or whose
    /// instance groups have no backends, are left out. This never fails.
    #[instrument(skip(self), name = "Collector::collect")]
    pub fn collect(&self) -> Vec<RouteWithBackends> {
        #[cfg(feature = "probes")]
        probes::collect__start!(|| ());

        let mut collected = vec![];
        for mapping in self.mappings.list().into_values() {
            let Some(route) = self.routes.get(&mapping.route_id) else {
                event!(Level::DEBUG, route = %mapping.route_id, "Skipping mapping: route not found");
                continue;
            };
            let Some(association) = self.associations.get(&mapping.process_id) else {
                event!(
                    Level::DEBUG,
                    process = %mapping.process_id,
                    "Skipping mapping: no instance groups for process"
                );
                continue;
            };

            let mut backends = vec![];
            for group in &association.instance_groups {
                let set = if route.internal {
                    self.backend_sets.get_internal(group)
                } else {
                    self.backend_sets.get(group)
                };
                backends.extend(set);
            }
            if backends.is_empty() {
                event!(
                    Level::DEBUG,
                    route = %mapping.route_id,
                    process = %mapping.process_id,
                    "Skipping mapping: no backends"
                );
                continue;
            }
            backends.sort_by(|a, b| a.address.cmp(&b.address));

            let vip = if route.internal {
                self.vips.resolve(&route.hostname())
            } else {
                String::new()
            };

            collected.push(RouteWithBackends {
                hostname: route.hostname(),
                path: route.path.clone(),
                backends,
                weight: self.mappings.calculated_weight(&mapping),
                process_id: mapping.process_id,
                internal: route.internal,
                vip,
            });
        }

        let mut routes = weights::order_routes(collected);
        weights::correct_weights(&mut routes);

        event!(Level::DEBUG, count = routes.len(), "Collected routes");
        #[cfg(feature = "probes")]
        probes::collect__done!(|| routes.len() as u64);
        routes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::BackendSetRepo;
    use crate::mapping::{RouteMapping, RouteMappingsRepo};
    use crate::process::{InstanceGroupId, ProcessAssociation, ProcessAssociationsRepo};
    use crate::route::{Route, RoutesRepo};
    use crate::test_utils::MapVipResolver;

    use std::collections::HashMap;
    use std::sync::Arc;

    struct Fixture {
        routes: Arc<RoutesRepo>,
        mappings: Arc<RouteMappingsRepo>,
        associations: Arc<ProcessAssociationsRepo>,
        backend_sets: Arc<BackendSetRepo>,
        collector: Collector,
    }

    impl Fixture {
        fn new() -> Self {
            let routes = Arc::new(RoutesRepo::new());
            let mappings = Arc::new(RouteMappingsRepo::new());
            let associations = Arc::new(ProcessAssociationsRepo::new());
            let backend_sets = Arc::new(BackendSetRepo::new());
            let vips = Arc::new(MapVipResolver::new([(
                "db.apps.internal",
                "127.0.0.7",
            )]));
            let collector = Collector::new(
                routes.clone(),
                mappings.clone(),
                associations.clone(),
                backend_sets.clone(),
                vips,
            );
            Self {
                routes,
                mappings,
                associations,
                backend_sets,
                collector,
            }
        }

        // Maps `process` onto `route`, served by a single instance group of
        // the same name with the given external backends.
        fn serve(&self, route: &str, process: &str, weight: i32, backends: &[(&str, u32)]) {
            self.mappings.map(RouteMapping::new(route, process, weight));
            self.associations
                .upsert(ProcessAssociation::new(process, [process]));
            for (address, port) in backends {
                self.backend_sets
                    .insert(InstanceGroupId::new(process), Backend::new(address, *port));
            }
        }
    }

    fn summary(routes: &[RouteWithBackends]) -> Vec<(&str, &str, &str, i32)> {
        routes
            .iter()
            .map(|r| {
                (
                    r.hostname.as_str(),
                    r.path.as_str(),
                    r.process_id.as_str(),
                    r.weight,
                )
            })
            .collect()
    }

    #[test]
    fn traffic_split_across_two_processes() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("r1", "a.example.com"));
        f.serve("r1", "p2", 1, &[("10.0.2.1", 61002)]);
        f.serve("r1", "p1", 2, &[("10.0.1.1", 61001)]);

        let routes = f.collector.collect();
        assert_eq!(
            summary(&routes),
            vec![("a.example.com", "", "p1", 67), ("a.example.com", "", "p2", 33)]
        );
        assert_eq!(routes[0].backends, vec![Backend::new("10.0.1.1", 61001)]);
        assert!(!routes[0].internal);
        assert_eq!(routes[0].vip, "");
    }

    #[test]
    fn uneven_split_is_corrected_to_one_hundred() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("route-a", "route-a.example.com"));
        f.routes.upsert(Route::new("route-b", "route-b.example.com"));
        f.serve("route-a", "process-a", 1, &[("1.1.1.1", 1111)]);
        f.serve("route-a", "process-b", 1, &[("2.2.2.2", 2222)]);
        f.serve("route-a", "process-c", 1, &[("3.3.3.3", 3333)]);
        f.serve("route-b", "process-d", 1, &[("4.4.4.4", 4444)]);

        let routes = f.collector.collect();
        assert_eq!(
            summary(&routes),
            vec![
                ("route-a.example.com", "", "process-a", 34),
                ("route-a.example.com", "", "process-b", 33),
                ("route-a.example.com", "", "process-c", 33),
                ("route-b.example.com", "", "process-d", 100),
            ]
        );
    }

    #[test]
    fn weights_sum_to_one_hundred_per_hostname_and_path() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("root", "shop.example.com"));
        f.routes
            .upsert(Route::new("api", "shop.example.com").with_path("/api"));
        // Seven equal shares round to 14 each, three round to 33 each
        for i in 0..7 {
            let process = format!("root-{i}");
            f.serve("root", &process, 1, &[("10.0.0.1", 8000 + i)]);
        }
        for i in 0..3 {
            let process = format!("api-{i}");
            f.serve("api", &process, 1, &[("10.0.1.1", 9000 + i)]);
        }

        let routes = f.collector.collect();
        let mut sums: HashMap<(&str, &str), i32> = HashMap::new();
        for route in &routes {
            *sums
                .entry((route.hostname.as_str(), route.path.as_str()))
                .or_default() += route.weight;
        }
        assert_eq!(sums.len(), 2);
        assert!(sums.values().all(|&sum| sum == 100), "sums: {sums:?}");
    }

    #[test]
    fn overshooting_weights_are_left_as_declared() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("r1", "a.example.com"));
        f.serve("r1", "p1", 1, &[("10.0.0.1", 1)]);
        f.serve("r1", "p2", 1, &[("10.0.0.2", 2)]);
        f.serve("r1", "p3", 4, &[("10.0.0.3", 3)]);

        let routes = f.collector.collect();
        let weights: Vec<_> = routes.iter().map(|r| r.weight).collect();
        assert_eq!(weights, vec![17, 17, 67]);
    }

    #[test]
    fn mappings_without_backends_are_excluded() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("r1", "a.example.com"));
        f.routes.upsert(Route::new("r2", "b.example.com"));

        // Association exists, but its instance group has no backends
        f.serve("r1", "empty", 100, &[]);
        // No association at all
        f.mappings.map(RouteMapping::new("r1", "unassociated", 100));
        // Route does not exist
        f.serve("missing", "orphan", 100, &[("10.0.0.9", 9)]);
        // The one mapping which should survive
        f.serve("r2", "p1", 100, &[("10.0.0.1", 1)]);

        let routes = f.collector.collect();
        assert_eq!(summary(&routes), vec![("b.example.com", "", "p1", 100)]);
    }

    #[test]
    fn backends_are_aggregated_across_groups_and_sorted_by_address() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("r1", "a.example.com"));
        f.mappings.map(RouteMapping::new("r1", "p1", 1));
        f.associations
            .upsert(ProcessAssociation::new("p1", ["old", "new"]));
        f.backend_sets
            .insert(InstanceGroupId::new("old"), Backend::new("10.0.9.9", 1));
        f.backend_sets
            .insert(InstanceGroupId::new("old"), Backend::new("10.0.1.1", 2));
        f.backend_sets
            .insert(InstanceGroupId::new("new"), Backend::new("10.0.5.5", 3));
        f.backend_sets
            .insert(InstanceGroupId::new("new"), Backend::new("10.0.1.1", 4));

        let routes = f.collector.collect();
        assert_eq!(routes.len(), 1);
        assert_eq!(
            routes[0].backends,
            vec![
                // Equal addresses keep their collection order
                Backend::new("10.0.1.1", 2),
                Backend::new("10.0.1.1", 4),
                Backend::new("10.0.5.5", 3),
                Backend::new("10.0.9.9", 1),
            ]
        );
    }

    #[test]
    fn internal_routes_use_internal_backends_and_vip() {
        let f = Fixture::new();
        f.routes
            .upsert(Route::new("r1", "DB.apps.internal").internal(None));
        f.mappings.map(RouteMapping::new("r1", "p1", 1));
        f.associations.upsert(ProcessAssociation::new("p1", ["g1"]));
        f.backend_sets
            .insert(InstanceGroupId::new("g1"), Backend::new("10.0.0.1", 61001));
        f.backend_sets
            .insert_internal(InstanceGroupId::new("g1"), Backend::new("10.255.0.1", 8080));

        let routes = f.collector.collect();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].hostname, "db.apps.internal");
        assert!(routes[0].internal);
        assert_eq!(routes[0].vip, "127.0.0.7");
        assert_eq!(routes[0].backends, vec![Backend::new("10.255.0.1", 8080)]);
    }

    #[test]
    fn path_routes_precede_others() {
        let f = Fixture::new();
        f.routes.upsert(Route::new("root", "a.example.com"));
        f.routes
            .upsert(Route::new("deep", "a.example.com").with_path("/api/v1"));
        f.routes
            .upsert(Route::new("shallow", "a.example.com").with_path("/api"));
        f.serve("root", "p0", 1, &[("10.0.0.1", 1)]);
        f.serve("deep", "p1", 1, &[("10.0.0.2", 2)]);
        f.serve("shallow", "p2", 1, &[("10.0.0.3", 3)]);

        let routes = f.collector.collect();
        assert_eq!(
            summary(&routes),
            vec![
                ("a.example.com", "/api", "p2", 100),
                ("a.example.com", "/api/v1", "p1", 100),
                ("a.example.com", "", "p0", 100),
            ]
        );
    }

    #[test]
    fn collection_is_deterministic_across_store_orderings() {
        let build = |reverse: bool| {
            let f = Fixture::new();
            let mut ids: Vec<usize> = (0..20).collect();
            if reverse {
                ids.reverse();
            }
            for i in ids {
                let route = format!("r{}", i % 4);
                f.routes
                    .upsert(Route::new(route.as_str(), format!("host-{}.example.com", i % 4)));
                f.serve(
                    &route,
                    &format!("p{i:02}"),
                    1,
                    &[("10.0.0.2", i as u32), ("10.0.0.1", i as u32)],
                );
            }
            f.collector.collect()
        };

        let first = build(false);
        let second = build(true);
        assert_eq!(first.len(), 20);
        assert_eq!(first, second);
    }

    #[test]
    fn collection_is_deterministic_when_one_process_serves_many_routes() {
        let build = || {
            let f = Fixture::new();
            for i in 0..8 {
                let route = format!("r{i}");
                f.routes
                    .upsert(Route::new(route.as_str(), format!("h{i}.example.com")));
                f.serve(&route, "p", 1, &[("10.0.0.1", 8080)]);

                let api = format!("api{i}");
                f.routes.upsert(
                    Route::new(api.as_str(), format!("h{i}.example.com")).with_path("/api"),
                );
                f.serve(&api, "p", 1, &[("10.0.0.1", 8080)]);
            }
            f.collector.collect()
        };

        let first = build();
        let hostnames: Vec<&str> = first.iter().map(|r| r.hostname.as_str()).collect();
        let expected: Vec<String> = (0..8)
            .chain(0..8)
            .map(|i| format!("h{i}.example.com"))
            .collect();
        assert_eq!(hostnames, expected);
        assert!(first[..8].iter().all(|r| r.path == "/api"));
        assert!(first.iter().all(|r| r.weight == 100));

        // Every store instance iterates its maps in a different order
        for _ in 0..20 {
            assert_eq!(build(), first);
        }
    }
}
