//! Deterministic ordering and weight correction for the external route view.

use crate::routes::RouteWithBackends;

use std::cmp::Ordering;
use std::collections::HashMap;

/// Weights within one `(hostname, path)` group are meant to sum to this.
pub const TOTAL_WEIGHT: i64 = 100;

// Orders records which tie on the bucket's primary key.
//
// Fan-out lets several records share a process, so every remaining field
// takes part. Records still equal here are interchangeable.
fn tiebreak(a: &RouteWithBackends, b: &RouteWithBackends) -> Ordering {
    a.process_id
        .cmp(&b.process_id)
        .then_with(|| a.hostname.cmp(&b.hostname))
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| a.weight.cmp(&b.weight))
        .then_with(|| a.internal.cmp(&b.internal))
        .then_with(|| a.vip.cmp(&b.vip))
        .then_with(|| a.backends.cmp(&b.backends))
}

/// Orders records independently of the order they were collected in.
///
/// Records with a path come first, shortest path first. Records without a
/// path follow, ordered by process identifier. Ties within either bucket are
/// broken by process, hostname, path and then the remaining fields.
pub fn order_routes(routes: Vec<RouteWithBackends>) -> Vec<RouteWithBackends> {
    let (mut with_path, mut without_path): (Vec<_>, Vec<_>) =
        routes.into_iter().partition(|route| !route.path.is_empty());

    with_path.sort_by(|a, b| {
        a.path
            .len()
            .cmp(&b.path.len())
            .then_with(|| tiebreak(a, b))
    });
    without_path.sort_by(tiebreak);

    with_path.append(&mut without_path);
    with_path
}

/// Raises weights so that each `(hostname, path)` group sums to
/// [TOTAL_WEIGHT].
///
/// The leftover is split evenly across each group's members. Whatever does
/// not divide evenly goes one unit each to the first members in list order.
/// Groups which already sum to more than [TOTAL_WEIGHT] are left untouched.
/// Weights saturate at `i32::MAX`.
pub fn correct_weights(routes: &mut [RouteWithBackends]) {
    let mut groups: HashMap<(&str, &str), Vec<usize>> = HashMap::new();
    for (index, route) in routes.iter().enumerate() {
        groups
            .entry((route.hostname.as_str(), route.path.as_str()))
            .or_default()
            .push(index);
    }

    // Groups are disjoint, so visiting them in map order is harmless; only
    // the order of members within a group is significant.
    let adjustments: Vec<(Vec<usize>, i64)> = groups
        .into_values()
        .filter_map(|members| {
            let sum: i64 = members.iter().map(|&i| i64::from(routes[i].weight)).sum();
            let leftover = TOTAL_WEIGHT - sum;
            (leftover > 0).then_some((members, leftover))
        })
        .collect();

    for (members, leftover) in adjustments {
        let count = members.len() as i64;
        let share = leftover / count;
        let remainder = leftover % count;
        for (position, &index) in members.iter().enumerate() {
            let extra = i64::from((position as i64) < remainder);
            let weight = i64::from(routes[index].weight)
                .saturating_add(share)
                .saturating_add(extra);
            routes[index].weight = i32::try_from(weight).unwrap_or(i32::MAX);
        }
    }
}
