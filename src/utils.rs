// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! contains useful type definitions and helper functions.
use nalgebra::{DMatrix, DVector, SVector};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A Vector with 6 entries, used for twists and Cartesian displacements.
pub type Vector6 = SVector<f64, 6>;

/// Removes one task dimension from a Jacobian and the matching entry of a Cartesian delta.
///
/// # Arguments
/// * `jacobian` - Jacobian with one row per task dimension.
/// * `delta_x` - Cartesian delta with one entry per task dimension.
/// * `row_to_remove` - index of the dimension to remove.
/// # Return
/// The reduced Jacobian and delta. If `row_to_remove` is out of range both are returned
/// unchanged.
pub fn remove_dimension(
    jacobian: DMatrix<f64>,
    delta_x: DVector<f64>,
    row_to_remove: usize,
) -> (DMatrix<f64>, DVector<f64>) {
    if row_to_remove >= jacobian.nrows() || row_to_remove >= delta_x.len() {
        return (jacobian, delta_x);
    }
    (
        jacobian.remove_row(row_to_remove),
        delta_x.remove_row(row_to_remove),
    )
}

/// Current wall clock time as duration since the UNIX epoch.
///
/// Command timestamps use the same representation, a zero duration means "no timestamp".
pub fn now_since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Rate limiter for log messages which would otherwise be emitted every cycle.
#[derive(Debug)]
pub struct LogThrottle {
    period: Duration,
    last: Option<Instant>,
}

impl LogThrottle {
    /// Creates a LogThrottle which lets one message pass per `period`.
    pub fn new(period: Duration) -> Self {
        LogThrottle { period, last: None }
    }
    /// Creates a LogThrottle from a period in seconds.
    pub fn from_secs(seconds: u64) -> Self {
        LogThrottle::new(Duration::from_secs(seconds))
    }
    /// returns true if a message may be logged now and restarts the period in that case.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.period => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::utils::{remove_dimension, LogThrottle};
    use nalgebra::{DMatrix, DVector};
    use std::time::Duration;

    #[test]
    fn remove_dimension_test() {
        let jacobian = DMatrix::from_fn(6, 7, |r, c| (r * 10 + c) as f64);
        let delta_x = DVector::from_fn(6, |r, _| r as f64);
        let (jacobian, delta_x) = remove_dimension(jacobian, delta_x, 2);
        assert_eq!(jacobian.nrows(), 5);
        assert_eq!(jacobian.ncols(), 7);
        assert_eq!(delta_x.len(), 5);
        assert!(f64::abs(jacobian[(2, 0)] - 30.) < 1e-12);
        assert!(f64::abs(delta_x[2] - 3.) < 1e-12);
        let (jacobian, delta_x) = remove_dimension(jacobian, delta_x, 9);
        assert_eq!(jacobian.nrows(), 5);
        assert_eq!(delta_x.len(), 5);
    }

    #[test]
    fn log_throttle_test() {
        let mut throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.ready());
        assert!(!throttle.ready());
        let mut always = LogThrottle::new(Duration::ZERO);
        assert!(always.ready());
        assert!(always.ready());
    }
}
