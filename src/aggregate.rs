// Aggregation cache: fold probe results into the last-known view.
// A cycle that omits an id means "no fresh data", not "offline".

use std::collections::HashSet;

use crate::models::{AggregateView, ServerDescriptor, StatsMap};

/// Union-merge `incoming` into `current`. Ids missing from `incoming` keep their
/// snapshot; ids present are replaced whole (no field-level merge).
pub fn merge(mut current: AggregateView, incoming: StatsMap) -> AggregateView {
    current.merge_from(incoming);
    current
}

/// Removes entries for ids no longer in the active descriptor set.
/// Separate from `merge`; a probe cycle never prunes.
pub fn prune_inactive(view: &mut AggregateView, descriptors: &[ServerDescriptor]) -> usize {
    let keep: HashSet<String> = descriptors
        .iter()
        .filter(|d| d.active)
        .map(|d| d.id.clone())
        .collect();
    view.prune_to(&keep)
}
