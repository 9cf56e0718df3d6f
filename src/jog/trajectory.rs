// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the outgoing joint trajectory and the functions composing it.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::jog::parameters::{CommandOutType, JogParameters};

/// A single waypoint of a [`JointTrajectory`].
///
/// Fields which are disabled in the [`JogParameters`] are `None`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointTrajectoryPoint {
    /// time of the waypoint relative to the start of the trajectory
    pub time_from_start: Duration,
    /// joint positions
    pub positions: Option<Vec<f64>>,
    /// joint velocities
    pub velocities: Option<Vec<f64>>,
    /// joint accelerations, always zero
    pub accelerations: Option<Vec<f64>>,
}

/// Joint trajectory sent to the robot controller.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct JointTrajectory {
    /// frame the trajectory was planned in
    pub frame_id: String,
    /// names of the joints, in the order of the waypoint vectors
    pub joint_names: Vec<String>,
    /// waypoints
    pub points: Vec<JointTrajectoryPoint>,
}

/// The command which is handed to the publisher.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum OutgoingCommand {
    /// full trajectory
    Trajectory(JointTrajectory),
    /// positions or velocities of the first waypoint
    MultiArray(Vec<f64>),
}

impl OutgoingCommand {
    /// Converts a trajectory into the configured output format.
    ///
    /// The flat array contains the positions of the first waypoint if positions are
    /// published and its velocities otherwise.
    pub fn new(trajectory: JointTrajectory, parameters: &JogParameters) -> Self {
        match parameters.command_out_type {
            CommandOutType::JointTrajectory => OutgoingCommand::Trajectory(trajectory),
            CommandOutType::Float64MultiArray => {
                let point = trajectory.points.into_iter().next().unwrap_or_default();
                let data = if parameters.publish_joint_positions {
                    point.positions
                } else {
                    point.velocities
                };
                OutgoingCommand::MultiArray(data.unwrap_or_default())
            }
        }
    }
}

fn waypoint(positions: &[f64], velocities: &[f64], parameters: &JogParameters) -> JointTrajectoryPoint {
    JointTrajectoryPoint {
        time_from_start: Duration::from_secs_f64(parameters.publish_period),
        positions: if parameters.publish_joint_positions {
            Some(positions.to_vec())
        } else {
            None
        },
        velocities: if parameters.publish_joint_velocities {
            Some(velocities.to_vec())
        } else {
            None
        },
        accelerations: if parameters.publish_joint_accelerations {
            // some controllers reject empty accelerations
            Some(vec![0.; positions.len()])
        } else {
            None
        },
    }
}

/// Composes a trajectory with a single waypoint one period ahead.
pub fn compose_joint_trajectory(
    joint_names: &[String],
    positions: &[f64],
    velocities: &[f64],
    parameters: &JogParameters,
) -> JointTrajectory {
    JointTrajectory {
        frame_id: parameters.planning_frame.clone(),
        joint_names: joint_names.to_vec(),
        points: vec![waypoint(positions, velocities, parameters)],
    }
}

/// Composes a trajectory which holds the joints at `original_positions` with zero velocity.
pub fn halt_trajectory(
    joint_names: &[String],
    original_positions: &[f64],
    parameters: &JogParameters,
) -> JointTrajectory {
    compose_joint_trajectory(
        joint_names,
        original_positions,
        &vec![0.; original_positions.len()],
        parameters,
    )
}

/// Appends copies of the first waypoint at `2 * period`, `3 * period`, ... until the trajectory
/// has `count` waypoints.
pub fn insert_redundant_points_into_trajectory(
    trajectory: &mut JointTrajectory,
    count: usize,
    publish_period: f64,
) {
    let point = match trajectory.points.first() {
        Some(point) => point.clone(),
        None => return,
    };
    for i in 2..=count {
        let mut redundant_point = point.clone();
        redundant_point.time_from_start = Duration::from_secs_f64(i as f64 * publish_period);
        trajectory.points.push(redundant_point);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::jog::parameters::{CommandOutType, JogParameters};
    use crate::jog::trajectory::{
        compose_joint_trajectory, halt_trajectory, insert_redundant_points_into_trajectory,
        OutgoingCommand,
    };

    fn names() -> Vec<String> {
        vec!["joint1".to_string(), "joint2".to_string()]
    }

    #[test]
    fn compose_respects_enabled_fields() {
        let parameters = JogParameters {
            publish_period: 0.01,
            publish_joint_positions: true,
            publish_joint_velocities: false,
            publish_joint_accelerations: true,
            ..Default::default()
        };
        let trajectory = compose_joint_trajectory(&names(), &[0.1, 0.2], &[1., 2.], &parameters);
        assert_eq!(trajectory.points.len(), 1);
        let point = &trajectory.points[0];
        assert_eq!(point.time_from_start, Duration::from_millis(10));
        assert_eq!(point.positions, Some(vec![0.1, 0.2]));
        assert_eq!(point.velocities, None);
        assert_eq!(point.accelerations, Some(vec![0., 0.]));
        assert_eq!(trajectory.frame_id, parameters.planning_frame);
    }

    #[test]
    fn halt_holds_original_positions() {
        let parameters = JogParameters {
            publish_joint_velocities: true,
            ..Default::default()
        };
        let trajectory = halt_trajectory(&names(), &[0.3, -0.4], &parameters);
        assert_eq!(trajectory.points.len(), 1);
        assert_eq!(trajectory.points[0].positions, Some(vec![0.3, -0.4]));
        assert_eq!(trajectory.points[0].velocities, Some(vec![0., 0.]));
    }

    #[test]
    fn redundant_points() {
        let parameters = JogParameters {
            publish_period: 0.01,
            ..Default::default()
        };
        let mut trajectory = compose_joint_trajectory(&names(), &[0.1, 0.2], &[0., 0.], &parameters);
        insert_redundant_points_into_trajectory(&mut trajectory, 5, 0.01);
        assert_eq!(trajectory.points.len(), 5);
        assert_eq!(trajectory.points[1].time_from_start, Duration::from_millis(20));
        assert_eq!(trajectory.points[4].time_from_start, Duration::from_millis(50));
        assert_eq!(trajectory.points[4].positions, trajectory.points[0].positions);
    }

    #[test]
    fn flat_array_output() {
        let parameters = JogParameters {
            command_out_type: CommandOutType::Float64MultiArray,
            publish_joint_positions: false,
            publish_joint_velocities: true,
            ..Default::default()
        };
        let trajectory = compose_joint_trajectory(&names(), &[0.1, 0.2], &[1., 2.], &parameters);
        assert_eq!(
            OutgoingCommand::new(trajectory, &parameters),
            OutgoingCommand::MultiArray(vec![1., 2.])
        );
    }
}
