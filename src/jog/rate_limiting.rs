// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains functions for limiting joint increments to the acceleration and velocity bounds
//! and for checking the position bounds of the joints.

use nalgebra::DVector;

use crate::exception::{JogException, JogResult};
use crate::model::{JointModel, KinematicsProvider, Limits};

/// Increments smaller than this are not rescaled.
pub static DELTA_EPS: f64 = 1e-12;

/// Returns the violated limit if `value` lies outside of `limits`.
fn violated_limit(value: f64, limits: &Limits) -> Option<f64> {
    if value < limits.min {
        Some(limits.min)
    } else if value > limits.max {
        Some(limits.max)
    } else {
        None
    }
}

/// Scales a single joint increment by `relative_change` if that shrinks it.
///
/// Returns false and leaves the increment untouched if the increment is already ~0 or the
/// ratio would not shrink it, which happens for ill-conditioned inputs.
fn rescale(delta: &mut f64, relative_change: f64) -> bool {
    if f64::abs(*delta) < DELTA_EPS || !relative_change.is_finite() {
        return false;
    }
    if f64::abs(relative_change) < 1. {
        *delta *= relative_change;
        true
    } else {
        false
    }
}

fn check_dimensions(expected: usize, actual: usize) -> JogResult<()> {
    if expected != actual {
        return Err(JogException::DimensionMismatch { expected, actual });
    }
    Ok(())
}

/// Limits joint increments such that the implied joint accelerations and velocities respect
/// the bounds of the joints.
///
/// First the acceleration `((delta / period) - previous_velocity) / period` is checked for every
/// joint with acceleration bounds. If it is out of bounds the increment is rescaled such that the
/// acceleration lies exactly on the bound. Afterwards the velocity `delta / period` is checked
/// against the velocity bounds the same way. Joints without bounds are not constrained.
///
/// # Arguments
/// * `delta_theta` - joint increments of this cycle, modified in place
/// * `previous_joint_velocity` - joint velocities of the previous cycle
/// * `joints` - active joints in the same order as the increments
/// * `publish_period` - cycle time in \[s\]
/// # Errors
/// * DimensionMismatch if the vectors do not have one entry per joint.
pub fn enforce_accel_vel_limits(
    delta_theta: &mut DVector<f64>,
    previous_joint_velocity: &DVector<f64>,
    joints: &[JointModel],
    publish_period: f64,
) -> JogResult<()> {
    check_dimensions(joints.len(), delta_theta.len())?;
    check_dimensions(joints.len(), previous_joint_velocity.len())?;

    for (i, joint) in joints.iter().enumerate() {
        let previous_velocity = previous_joint_velocity[i];
        if let Some(acceleration_bounds) = joint.bounds.acceleration {
            let velocity = delta_theta[i] / publish_period;
            let acceleration = (velocity - previous_velocity) / publish_period;
            if let Some(acceleration_limit) = violated_limit(acceleration, &acceleration_bounds) {
                // delta = (a * dt + v_prev) * dt
                let relative_change = ((acceleration_limit * publish_period + previous_velocity)
                    * publish_period)
                    / delta_theta[i];
                rescale(&mut delta_theta[i], relative_change);
            }
        }
        if let Some(velocity_bounds) = joint.bounds.velocity {
            let velocity = delta_theta[i] / publish_period;
            if let Some(velocity_limit) = violated_limit(velocity, &velocity_bounds) {
                let relative_change = (velocity_limit * publish_period) / delta_theta[i];
                rescale(&mut delta_theta[i], relative_change);
            }
        }
    }
    Ok(())
}

/// Finds the joints which are within `margin` of a position bound and whose velocity moves
/// them further towards that bound.
///
/// # Arguments
/// * `kinematics` - answers the position bound queries
/// * `joints` - active joints
/// * `positions` - current joint positions, one per joint
/// * `velocities` - commanded joint velocities, one per joint
/// * `margin` - distance to the bounds from which a joint is considered close
/// # Return
/// Indices of the offending joints. Empty if the motion may continue.
/// # Errors
/// * DimensionMismatch if the vectors do not have one entry per joint.
pub fn enforce_position_limits<K: KinematicsProvider + ?Sized>(
    kinematics: &K,
    joints: &[JointModel],
    positions: &[f64],
    velocities: &[f64],
    margin: f64,
) -> JogResult<Vec<usize>> {
    check_dimensions(joints.len(), positions.len())?;
    check_dimensions(joints.len(), velocities.len())?;
    let mut halting_joints = Vec::new();
    for (i, joint) in joints.iter().enumerate() {
        let position = positions[i];
        if kinematics.satisfies_position_bounds(joint, position, margin) {
            continue;
        }
        let limits = match joint.bounds.position {
            Some(limits) => limits,
            None => continue,
        };
        let velocity = velocities[i];
        if (velocity < 0. && position < limits.min + margin)
            || (velocity > 0. && position > limits.max - margin)
        {
            halting_joints.push(i);
        }
    }
    Ok(halting_joints)
}
