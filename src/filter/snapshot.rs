//! Serializable checkpoint of a filter: mean state, covariance, active slots.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::filter_state::FilterState;
use super::occupancy::SlotOccupancy;
use crate::error::{Result, StateError};
use crate::state::EstimatorState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub state: EstimatorState,
    pub covariance: DMatrix<f64>,
    /// Absent in checkpoints written without occupancy; then it is inferred
    /// from the covariance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_slots: Option<Vec<usize>>,
    pub image_time: f64,
    pub image_counter: u64,
    pub use_prediction_merge: bool,
}

impl FilterSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl FilterState {
    pub fn snapshot(&self) -> FilterSnapshot {
        FilterSnapshot {
            state: self.state.clone(),
            covariance: self.covariance().clone(),
            active_slots: Some(self.active_slots().collect()),
            image_time: self.image_time,
            image_counter: self.image_counter,
            use_prediction_merge: self.use_prediction_merge,
        }
    }

    /// Rebuild a filter from a snapshot. Image buffers start empty.
    pub fn restore(snapshot: FilterSnapshot) -> Result<Self> {
        snapshot.state.validate()?;
        let dim = snapshot.state.dimension();
        let cov = &snapshot.covariance;
        if cov.nrows() != dim || cov.ncols() != dim {
            return Err(StateError::DimensionMismatch {
                expected: dim,
                actual: cov.nrows().max(cov.ncols()),
            });
        }

        let mut filter = FilterState::new(snapshot.state.n_cam(), snapshot.state.n_max());
        filter.state = snapshot.state;
        *filter.covariance_mut() = snapshot.covariance;
        filter.image_time = snapshot.image_time;
        filter.image_counter = snapshot.image_counter;
        filter.use_prediction_merge = snapshot.use_prediction_merge;

        let occupancy = match snapshot.active_slots {
            Some(slots) => {
                let capacity = filter.state.n_max();
                let mut occupancy = SlotOccupancy::new(capacity);
                for slot in slots {
                    if slot >= capacity {
                        return Err(StateError::SlotOutOfRange { slot, capacity });
                    }
                    // Repeated entries are harmless.
                    occupancy.insert(slot);
                }
                occupancy
            }
            None => {
                warn!("Snapshot has no active slot list, inferring it from the covariance");
                filter.infer_occupancy()
            }
        };
        filter.set_occupancy(occupancy)?;
        filter.check_covariance()?;

        info!(
            "Restored filter state: dimension {}, {} active features",
            filter.dimension(),
            filter.active_count()
        );
        Ok(filter)
    }
}
