// Domain models

mod descriptor;
mod snapshot;
pub mod wire;

pub use descriptor::{DEFAULT_MAX_PLAYERS, DEFAULT_PORT, ServerDescriptor, active_only};
pub use snapshot::{
    AggregateView, HistoryPoint, HistoryRange, StatsMap, StatsUpdate, StatusSnapshot,
};
