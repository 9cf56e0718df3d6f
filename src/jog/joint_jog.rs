// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Converts joint velocity commands into joint increments.
use nalgebra::DVector;

use crate::exception::{create_command_exception, JogException, JogResult};
use crate::jog::parameters::{CommandInType, JogParameters};
use crate::jog::rate_limiting::enforce_accel_vel_limits;
use crate::jog::types::{ConversionInput, JointIncrement, JointJogCommand};
use crate::model::{find_joint_index, JointModel};

/// Maps a joint command onto the active joints and scales it to the increments of one cycle.
///
/// Joints which are not commanded get a zero increment. Names which do not belong to an
/// active joint are skipped and returned.
pub fn scale_joint_command(
    command: &JointJogCommand,
    parameters: &JogParameters,
    joints: &[JointModel],
) -> (DVector<f64>, Vec<String>) {
    let scale = match parameters.command_in_type {
        CommandInType::Unitless => parameters.joint_scale * parameters.publish_period,
        CommandInType::SpeedUnits => parameters.publish_period,
    };
    let mut delta_theta = DVector::zeros(joints.len());
    let mut ignored_joints = Vec::new();
    for (name, velocity) in command.joint_names.iter().zip(command.velocities.iter()) {
        match find_joint_index(joints, name) {
            Some(index) => delta_theta[index] = velocity * scale,
            None => ignored_joints.push(name.clone()),
        }
    }
    (delta_theta, ignored_joints)
}

/// Converts a joint command into joint increments for one cycle.
///
/// # Errors
/// * CommandException if a velocity is NaN.
/// * DimensionMismatch if the command has a different number of names and velocities.
pub fn joint_jog_calcs(
    command: &JointJogCommand,
    parameters: &JogParameters,
    input: &ConversionInput,
) -> JogResult<JointIncrement> {
    if command.velocities.iter().any(|velocity| velocity.is_nan()) {
        return Err(create_command_exception(
            "nan in incoming command. Skipping this datapoint.",
        ));
    }
    if command.joint_names.len() != command.velocities.len() {
        return Err(JogException::DimensionMismatch {
            expected: command.joint_names.len(),
            actual: command.velocities.len(),
        });
    }
    let (mut delta_theta, ignored_joints) =
        scale_joint_command(command, parameters, input.joints);
    enforce_accel_vel_limits(
        &mut delta_theta,
        input.previous_joint_velocity,
        input.joints,
        parameters.publish_period,
    )?;
    let mut increment = JointIncrement::new(delta_theta);
    increment.ignored_joints = ignored_joints;
    Ok(increment)
}

#[cfg(test)]
mod tests {
    use nalgebra::DVector;
    use std::time::Duration;

    use crate::exception::JogResult;
    use crate::jog::joint_jog::joint_jog_calcs;
    use crate::jog::parameters::{CommandInType, JogParameters};
    use crate::jog::status::StatusCode;
    use crate::jog::types::{ConversionInput, JointIncrement, JointJogCommand};
    use crate::model::{JointBounds, JointModel, Limits};

    fn joints() -> Vec<JointModel> {
        vec![
            JointModel::new("shoulder", JointBounds::default()),
            JointModel::new(
                "elbow",
                JointBounds {
                    velocity: Some(Limits::symmetric(0.2)),
                    ..Default::default()
                },
            ),
        ]
    }

    fn convert(command: &JointJogCommand, parameters: &JogParameters) -> JogResult<JointIncrement> {
        let joints = joints();
        let positions = DVector::zeros(2);
        let previous = DVector::zeros(2);
        let input = ConversionInput {
            joints: &joints,
            positions: &positions,
            previous_joint_velocity: &previous,
            collision_velocity_scale: 1.,
            control_dimensions: [true; 6],
            drift_dimensions: [false; 6],
        };
        joint_jog_calcs(command, parameters, &input)
    }

    #[test]
    fn unitless_joint_command() {
        let parameters = JogParameters {
            publish_period: 0.01,
            joint_scale: 0.5,
            ..Default::default()
        };
        let command = JointJogCommand::new(
            vec!["elbow".to_string(), "shoulder".to_string()],
            vec![0.2, -1.],
            Duration::from_secs(1),
        );
        let increment = convert(&command, &parameters).unwrap();
        assert!(f64::abs(increment.delta_theta[0] + 0.005) < 1e-12);
        assert!(f64::abs(increment.delta_theta[1] - 0.001) < 1e-12);
        assert_eq!(increment.status, StatusCode::NoWarning);
        assert!(increment.ignored_joints.is_empty());
    }

    #[test]
    fn speed_units_are_velocity_limited() {
        let parameters = JogParameters {
            publish_period: 0.01,
            command_in_type: CommandInType::SpeedUnits,
            ..Default::default()
        };
        let command = JointJogCommand::new(
            vec!["elbow".to_string()],
            vec![1.],
            Duration::from_secs(1),
        );
        let increment = convert(&command, &parameters).unwrap();
        assert!(f64::abs(increment.delta_theta[1] / 0.01 - 0.2) < 1e-9);
        assert!(f64::abs(increment.delta_theta[0]) < 1e-15);
    }

    #[test]
    fn unknown_joints_are_ignored() {
        let command = JointJogCommand::new(
            vec!["finger".to_string(), "shoulder".to_string()],
            vec![0.3, 0.3],
            Duration::from_secs(1),
        );
        let increment = convert(&command, &JogParameters::default()).unwrap();
        assert_eq!(increment.ignored_joints, vec!["finger".to_string()]);
        assert!(increment.delta_theta[0] > 0.);
    }

    #[test]
    fn nan_is_rejected() {
        let command = JointJogCommand::new(
            vec!["shoulder".to_string()],
            vec![f64::NAN],
            Duration::from_secs(1),
        );
        assert!(convert(&command, &JogParameters::default()).is_err());
    }
}
