//! Filter state ownership and feature-slot lifecycle.

pub mod filter_state;
pub mod occupancy;
pub mod shared;
pub mod snapshot;

pub use filter_state::FilterState;
pub use occupancy::SlotOccupancy;
pub use shared::SharedFilterState;
pub use snapshot::FilterSnapshot;
