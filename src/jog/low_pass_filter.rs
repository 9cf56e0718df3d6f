// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the low-pass filters which smooth the commanded joint positions.

/// Default filter coefficient
pub static DEFAULT_FILTER_COEFFICIENT: f64 = 2.0;

/// A single pole low-pass filter, discretized with the bilinear transform.
///
/// The filter remembers the previous two measurements and the previous output:
/// ```text
/// y[n] = 1 / (1 + c) * (x[n-1] + x[n]) - (1 - c) / (1 + c) * y[n-1]
/// ```
/// with the filter coefficient `c`. Larger coefficients give smoother but slower output.
/// A coefficient of 1 simply averages the last two measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct LowPassFilter {
    previous_measurements: [f64; 2],
    previous_filtered_measurement: f64,
    scale_term: f64,
    feedback_term: f64,
}

impl LowPassFilter {
    /// Creates a new LowPassFilter with all internal state set to zero.
    ///
    /// # Arguments
    /// * `low_pass_filter_coeff` - Filter coefficient, must be greater than zero.
    pub fn new(low_pass_filter_coeff: f64) -> Self {
        LowPassFilter {
            previous_measurements: [0.; 2],
            previous_filtered_measurement: 0.,
            scale_term: 1. / (1. + low_pass_filter_coeff),
            feedback_term: 1. - low_pass_filter_coeff,
        }
    }

    /// Sets the whole filter history to `data`, so the next output equals `data` as long as
    /// the input stays at `data`.
    pub fn reset(&mut self, data: f64) {
        self.previous_measurements = [data; 2];
        self.previous_filtered_measurement = data;
    }

    /// Filters one new measurement and returns the filtered value.
    pub fn filter(&mut self, new_measurement: f64) -> f64 {
        self.previous_measurements[1] = self.previous_measurements[0];
        self.previous_measurements[0] = new_measurement;

        let new_filtered_measurement = self.scale_term
            * (self.previous_measurements[1] + self.previous_measurements[0])
            - self.feedback_term * self.scale_term * self.previous_filtered_measurement;
        self.previous_filtered_measurement = new_filtered_measurement;
        new_filtered_measurement
    }
}

impl Default for LowPassFilter {
    fn default() -> Self {
        LowPassFilter::new(DEFAULT_FILTER_COEFFICIENT)
    }
}

/// One [`LowPassFilter`] per joint.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFilterBank {
    filters: Vec<LowPassFilter>,
}

impl PositionFilterBank {
    /// Creates `num_joints` filters with the same coefficient.
    pub fn new(num_joints: usize, low_pass_filter_coeff: f64) -> Self {
        PositionFilterBank {
            filters: vec![LowPassFilter::new(low_pass_filter_coeff); num_joints],
        }
    }

    /// number of filters
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// true if the bank contains no filters
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Resets every filter to the matching entry of `positions`.
    pub fn reset(&mut self, positions: &[f64]) {
        self.filters
            .iter_mut()
            .zip(positions.iter())
            .for_each(|(filter, &position)| filter.reset(position));
    }

    /// Filters all positions in place.
    pub fn filter(&mut self, positions: &mut [f64]) {
        self.filters
            .iter_mut()
            .zip(positions.iter_mut())
            .for_each(|(filter, position)| *position = filter.filter(*position));
    }
}
