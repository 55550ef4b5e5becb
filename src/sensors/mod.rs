//! Sensors: drivers composed into a single normalized reading per poll

pub mod board;
pub mod probe;

pub use board::BoardSensor;
pub use probe::{ConnectionState, PortDetector, ProbeResponse, ProbeSensor};

use crate::core::Reading;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Anything the manager can poll on a schedule.
///
/// `read` never fails: faults are reported through the reading's status so
/// the scheduling loop only ever sees data.
pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self) -> Reading;

    /// Release every driver handle. Safe to call repeatedly.
    fn close(&self);
}

/// Lock a driver, recovering it if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
