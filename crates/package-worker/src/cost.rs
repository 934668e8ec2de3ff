//! Relative cost of doing an expectation on this worker
//!
//! Advisory only: the scheduler compares these numbers across workers to
//! pick one. `None` means this worker cannot do the job at all, which is
//! different from "very expensive".

use crate::accessor::AccessType;
use crate::expectation::Expectation;
use crate::selector::{find_best_package_container_with_access_to_package, AccessMode};
use crate::worker::WorkerContext;

/// Cost for an accessor type the static table does not know.
pub const UNKNOWN_ACCESSOR_COST: u32 = 999;

/// Multiplier applied to the summed source and target accessor costs.
pub const STANDARD_COST_FACTOR: u32 = 30;

/// Static relative cost of an accessor type.
pub fn get_accessor_cost(access_type: Option<AccessType>) -> u32 {
    access_type.map_or(UNKNOWN_ACCESSOR_COST, AccessType::relative_cost)
}

/// `30 × (source cost + target cost)` using the cheapest reachable accessor
/// on each side. An expectation without sources pays nothing for the source
/// side; an unreachable side makes the whole job unreachable.
pub fn get_standard_cost(expectation: &Expectation, worker: &WorkerContext) -> Option<u32> {
    let source_cost = if expectation.sources().is_empty() {
        0
    } else {
        let best = find_best_package_container_with_access_to_package(
            worker,
            expectation.sources(),
            AccessMode::Read,
        )?;
        get_accessor_cost(Some(best.access_type))
    };
    let best_target = find_best_package_container_with_access_to_package(
        worker,
        expectation.targets(),
        AccessMode::Write,
    )?;
    let target_cost = get_accessor_cost(Some(best_target.access_type));
    Some(STANDARD_COST_FACTOR * (source_cost + target_cost))
}
