// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Converts Cartesian velocity commands into joint increments.
use nalgebra::{DMatrix, DVector};

use crate::exception::{create_command_exception, JogException, JogResult};
use crate::jog::parameters::{CommandInType, JogParameters};
use crate::jog::rate_limiting::enforce_accel_vel_limits;
use crate::jog::singularity::{
    velocity_scaling_for_singularity, JacobianDecomposition, SingularityScaling,
};
use crate::jog::status::StatusCode;
use crate::jog::types::{CartesianCommand, ConversionInput, JointIncrement, Twist};
use crate::model::KinematicsProvider;
use crate::utils::{remove_dimension, Vector6};

/// Number of Cartesian task dimensions.
pub const TASK_DIMENSIONS: usize = 6;

/// Rejects twists with NaN components and unitless twists with components outside \[-1, 1\].
pub fn validate_twist(twist: &Twist, command_in_type: CommandInType) -> JogResult<()> {
    if twist.has_nan() {
        return Err(create_command_exception(
            "nan in incoming command. Skipping this datapoint.",
        ));
    }
    if command_in_type == CommandInType::Unitless
        && twist.to_vector6().iter().any(|x| f64::abs(*x) > 1.)
    {
        return Err(create_command_exception(
            "Component of incoming command is >1. Skipping this datapoint.",
        ));
    }
    Ok(())
}

/// Sets all components of dimensions which are not controlled to zero.
pub fn apply_control_dimensions(twist: &Twist, control_dimensions: &[bool; 6]) -> Twist {
    let mut vector = twist.to_vector6();
    for (value, &controlled) in vector.iter_mut().zip(control_dimensions.iter()) {
        if !controlled {
            *value = 0.;
        }
    }
    Twist::from_vector6(&vector)
}

/// Scales a twist to the Cartesian displacement of one cycle.
pub fn scale_cartesian_command(twist: &Twist, parameters: &JogParameters) -> DVector<f64> {
    let (linear_scale, rotational_scale) = match parameters.command_in_type {
        CommandInType::Unitless => (parameters.linear_scale, parameters.rotational_scale),
        CommandInType::SpeedUnits => (1., 1.),
    };
    let mut delta_x: Vector6 = twist.to_vector6() * parameters.publish_period;
    delta_x.fixed_rows_mut::<3>(0).scale_mut(linear_scale);
    delta_x.fixed_rows_mut::<3>(3).scale_mut(rotational_scale);
    DVector::from_column_slice(delta_x.as_slice())
}

/// Removes the rows of all drift dimensions from the Jacobian and the Cartesian displacement.
///
/// Rows are removed from the highest index downwards so earlier removals do not shift the
/// indices of later ones. At least one row is always kept.
pub fn remove_drift_dimensions(
    mut jacobian: DMatrix<f64>,
    mut delta_x: DVector<f64>,
    drift_dimensions: &[bool; 6],
) -> (DMatrix<f64>, DVector<f64>) {
    for dimension in (0..TASK_DIMENSIONS).rev() {
        if drift_dimensions[dimension] && jacobian.nrows() > 1 {
            let (reduced_jacobian, reduced_delta_x) = remove_dimension(jacobian, delta_x, dimension);
            jacobian = reduced_jacobian;
            delta_x = reduced_delta_x;
        }
    }
    (jacobian, delta_x)
}

/// Scales the joint increments for collision proximity and singularities.
///
/// # Return
/// The resulting status. Collision warnings override singularity warnings.
pub fn apply_velocity_scaling(
    delta_theta: &mut DVector<f64>,
    collision_velocity_scale: f64,
    singularity: SingularityScaling,
) -> StatusCode {
    let mut status = singularity.status;
    if collision_velocity_scale > 0. && collision_velocity_scale < 1. {
        status = StatusCode::DecelerateForCollision;
    } else if collision_velocity_scale <= 0. {
        status = StatusCode::HaltForCollision;
    }
    *delta_theta *= collision_velocity_scale * singularity.scale;
    if status == StatusCode::HaltForCollision {
        delta_theta.fill(0.);
    }
    status
}

fn checked_jacobian<K: KinematicsProvider + ?Sized>(
    kinematics: &K,
    positions: &DVector<f64>,
    num_joints: usize,
) -> JogResult<DMatrix<f64>> {
    let jacobian = kinematics.jacobian(positions)?;
    if jacobian.nrows() != TASK_DIMENSIONS {
        return Err(JogException::DimensionMismatch {
            expected: TASK_DIMENSIONS,
            actual: jacobian.nrows(),
        });
    }
    if jacobian.ncols() != num_joints {
        return Err(JogException::DimensionMismatch {
            expected: num_joints,
            actual: jacobian.ncols(),
        });
    }
    Ok(jacobian)
}

/// Converts a Cartesian command into joint increments for one cycle.
///
/// The command is validated, masked with the control dimensions, rotated into the planning
/// frame and scaled to a Cartesian displacement. The displacement is mapped to joint space with
/// the pseudo-inverse of the Jacobian, from which the drift dimensions were removed. Finally
/// the increments are limited to the acceleration and velocity bounds and scaled for collision
/// proximity and singularities.
///
/// # Errors
/// * CommandException if the command contains NaN or is out of range.
/// * KinematicsException if a kinematic query fails.
/// * DimensionMismatch if the Jacobian does not fit the move group.
pub fn cartesian_jog_calcs<K: KinematicsProvider + ?Sized>(
    command: &CartesianCommand,
    parameters: &JogParameters,
    kinematics: &K,
    input: &ConversionInput,
) -> JogResult<JointIncrement> {
    validate_twist(&command.twist, parameters.command_in_type)?;
    let mut twist = apply_control_dimensions(&command.twist, &input.control_dimensions);

    if command.frame_id != parameters.planning_frame {
        let planning_to_command_frame = kinematics
            .global_link_transform(input.positions, &parameters.planning_frame)?
            .inverse()
            * kinematics.global_link_transform(input.positions, &command.frame_id)?;
        twist = Twist {
            linear: planning_to_command_frame.rotation * twist.linear,
            angular: planning_to_command_frame.rotation * twist.angular,
        };
    }

    let delta_x = scale_cartesian_command(&twist, parameters);
    let num_joints = input.joints.len();
    let jacobian = checked_jacobian(kinematics, input.positions, num_joints)?;
    let (jacobian, delta_x) = remove_drift_dimensions(jacobian, delta_x, &input.drift_dimensions);

    let decomposition = JacobianDecomposition::new(&jacobian)?;
    let mut delta_theta = &decomposition.pseudo_inverse * &delta_x;

    enforce_accel_vel_limits(
        &mut delta_theta,
        input.previous_joint_velocity,
        input.joints,
        parameters.publish_period,
    )?;

    let drift_dimensions = input.drift_dimensions;
    let singularity = velocity_scaling_for_singularity(
        &delta_x,
        &decomposition,
        input.positions,
        |positions: &DVector<f64>| {
            let trial_jacobian = checked_jacobian(kinematics, positions, num_joints)?;
            let trial_delta_x = DVector::zeros(TASK_DIMENSIONS);
            Ok(remove_drift_dimensions(trial_jacobian, trial_delta_x, &drift_dimensions).0)
        },
        parameters.lower_singularity_threshold,
        parameters.hard_stop_singularity_threshold,
    )?;
    let status = apply_velocity_scaling(
        &mut delta_theta,
        input.collision_velocity_scale,
        singularity,
    );

    Ok(JointIncrement {
        delta_theta,
        status,
        ignored_joints: Vec::new(),
    })
}
