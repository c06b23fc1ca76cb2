//! Single-writer access to a filter shared between threads.

use std::sync::Arc;

use parking_lot::Mutex;

use super::filter_state::FilterState;

/// One lock per filter instance. A prediction or update step holds it for
/// its whole duration so feature lifecycle calls never interleave with it.
#[derive(Debug, Clone)]
pub struct SharedFilterState {
    inner: Arc<Mutex<FilterState>>,
}

impl SharedFilterState {
    pub fn new(filter: FilterState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(filter)),
        }
    }

    /// Run `f` with exclusive access to the filter.
    pub fn with_lock<R>(&self, f: impl FnOnce(&mut FilterState) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    /// Take the filter back once every other handle is gone.
    pub fn into_inner(self) -> Result<FilterState, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Matrix3, Vector3};
    use std::thread;

    #[test]
    fn test_concurrent_lifecycle_calls_serialize() {
        let shared = SharedFilterState::new(FilterState::new(1, 8));
        let handles: Vec<_> = (0..8)
            .map(|slot| {
                let shared = shared.clone();
                thread::spawn(move || {
                    shared.with_lock(|filter| {
                        filter
                            .initialize_feature(slot, &Vector3::z(), 1.0, &Matrix3::identity())
                            .unwrap();
                    })
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let filter = shared.into_inner().unwrap();
        assert_eq!(filter.active_count(), 8);
        filter.check_covariance().unwrap();
    }
}
