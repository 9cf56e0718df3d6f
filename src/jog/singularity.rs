// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the pseudo-inverse of the Jacobian and the velocity scaling close to singularities.
use nalgebra::{DMatrix, DVector};

use crate::exception::{create_kinematics_exception, JogException, JogResult};
use crate::jog::status::StatusCode;

/// Singular values below this are treated as zero when inverting.
pub static SINGULAR_VALUE_EPS: f64 = 1e-9;

/// Divisor for the trial step along the singular vector.
pub static SINGULARITY_TRIAL_STEP_DIVISOR: f64 = 100.;

/// Singular value decomposition of a Jacobian together with its pseudo-inverse.
#[derive(Debug, Clone)]
pub struct JacobianDecomposition {
    /// left singular vectors, one column per singular value
    pub u: DMatrix<f64>,
    /// singular values in no particular order
    pub singular_values: DVector<f64>,
    /// `V * S^-1 * U^T`
    pub pseudo_inverse: DMatrix<f64>,
}

impl JacobianDecomposition {
    /// Decomposes a Jacobian.
    /// # Errors
    /// * KinematicsException if the Jacobian is empty or the decomposition fails.
    pub fn new(jacobian: &DMatrix<f64>) -> JogResult<Self> {
        if jacobian.nrows() == 0 || jacobian.ncols() == 0 {
            return Err(create_kinematics_exception("cannot decompose an empty Jacobian"));
        }
        if jacobian.iter().any(|x| !x.is_finite()) {
            return Err(create_kinematics_exception("Jacobian contains non-finite values"));
        }
        let svd = jacobian.clone().svd(true, true);
        let u = svd
            .u
            .ok_or_else(|| create_kinematics_exception("SVD did not compute U"))?;
        let v_t = svd
            .v_t
            .ok_or_else(|| create_kinematics_exception("SVD did not compute V^T"))?;
        let singular_values = svd.singular_values;
        let inverted = singular_values.map(|sigma| {
            if sigma > SINGULAR_VALUE_EPS {
                1. / sigma
            } else {
                0.
            }
        });
        let pseudo_inverse = v_t.transpose() * DMatrix::from_diagonal(&inverted) * u.transpose();
        Ok(JacobianDecomposition {
            u,
            singular_values,
            pseudo_inverse,
        })
    }

    /// Ratio of the largest and the smallest singular value. Infinite for rank deficient
    /// Jacobians.
    pub fn condition_number(&self) -> f64 {
        condition_number(&self.singular_values)
    }

    /// Left singular vector of the smallest singular value. Its sign is arbitrary.
    pub fn smallest_singular_vector(&self) -> DVector<f64> {
        self.u.column(self.singular_values.imin()).into_owned()
    }
}

/// Ratio of the largest and the smallest singular value.
pub fn condition_number(singular_values: &DVector<f64>) -> f64 {
    if singular_values.is_empty() {
        return f64::INFINITY;
    }
    let smallest = singular_values.min();
    if smallest <= SINGULAR_VALUE_EPS {
        return f64::INFINITY;
    }
    singular_values.max() / smallest
}

/// Determines the direction in which the Jacobian becomes singular.
///
/// The singular vector of the smallest singular value points either towards or away from the
/// singularity. A small trial step of the joints along it shows which one it is: if the
/// condition number at the trial configuration does not increase the vector is flipped.
/// The trial configuration is a copy, nothing is written back.
///
/// # Arguments
/// * `decomposition` - decomposition of the Jacobian at `positions`
/// * `positions` - current joint configuration
/// * `jacobian_at` - evaluates the Jacobian, reduced the same way as the decomposed one
/// # Return
/// The direction towards the singularity and the condition number at the trial configuration.
pub fn singularity_direction<F>(
    decomposition: &JacobianDecomposition,
    positions: &DVector<f64>,
    jacobian_at: F,
) -> JogResult<(DVector<f64>, f64)>
where
    F: Fn(&DVector<f64>) -> JogResult<DMatrix<f64>>,
{
    let mut vector_toward_singularity = decomposition.smallest_singular_vector();
    let initial_condition = decomposition.condition_number();

    let trial_delta_x = &vector_toward_singularity / SINGULARITY_TRIAL_STEP_DIVISOR;
    let trial_positions = positions + &decomposition.pseudo_inverse * trial_delta_x;
    let trial_jacobian = jacobian_at(&trial_positions)?;
    let trial_condition =
        if trial_jacobian.is_empty() || trial_jacobian.iter().any(|x| !x.is_finite()) {
            f64::INFINITY
        } else {
            condition_number(&trial_jacobian.singular_values())
        };

    if initial_condition >= trial_condition {
        vector_toward_singularity *= -1.;
    }
    Ok((vector_toward_singularity, trial_condition))
}

/// Result of the singularity check.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SingularityScaling {
    /// factor in \[0, 1\] for the joint increments
    pub scale: f64,
    /// NoWarning, DecelerateForSingularity or HaltForSingularity
    pub status: StatusCode,
}

/// Computes a velocity scaling factor which slows down motions towards a singularity.
///
/// Motions away from the singularity are never slowed down. Motions towards it are slowed
/// linearly while the condition number of the Jacobian is between `lower_threshold` and
/// `hard_stop_threshold` and stopped beyond.
pub fn velocity_scaling_for_singularity<F>(
    commanded_delta_x: &DVector<f64>,
    decomposition: &JacobianDecomposition,
    positions: &DVector<f64>,
    jacobian_at: F,
    lower_threshold: f64,
    hard_stop_threshold: f64,
) -> JogResult<SingularityScaling>
where
    F: Fn(&DVector<f64>) -> JogResult<DMatrix<f64>>,
{
    let (vector_toward_singularity, _) =
        singularity_direction(decomposition, positions, jacobian_at)?;
    if vector_toward_singularity.len() != commanded_delta_x.len() {
        return Err(JogException::DimensionMismatch {
            expected: vector_toward_singularity.len(),
            actual: commanded_delta_x.len(),
        });
    }
    let moving_toward_singularity = vector_toward_singularity.dot(commanded_delta_x) > 0.;
    let initial_condition = decomposition.condition_number();
    let scaling = if !moving_toward_singularity || initial_condition <= lower_threshold {
        SingularityScaling {
            scale: 1.,
            status: StatusCode::NoWarning,
        }
    } else if initial_condition < hard_stop_threshold {
        let scale = 1.
            - (initial_condition - lower_threshold) / (hard_stop_threshold - lower_threshold);
        SingularityScaling {
            scale: scale.clamp(0., 1.),
            status: StatusCode::DecelerateForSingularity,
        }
    } else {
        SingularityScaling {
            scale: 0.,
            status: StatusCode::HaltForSingularity,
        }
    };
    Ok(scaling)
}
