// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the message types which flow into and out of the jogger.
use nalgebra::{DVector, Vector3};
use std::time::Duration;

use crate::jog::status::StatusCode;
use crate::model::JointModel;
use crate::utils::Vector6;

/// Joint telemetry or the jogger's internal joint vector.
///
/// Incoming telemetry may contain joints which do not belong to the jogged move group,
/// those are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointState {
    /// joint names
    pub name: Vec<String>,
    /// joint positions, one per name
    pub position: Vec<f64>,
    /// joint velocities, one per name. May be empty for telemetry without velocities.
    pub velocity: Vec<f64>,
}

impl JointState {
    /// Creates a JointState with the given names and all positions and velocities set to zero.
    pub fn with_names(names: Vec<String>) -> Self {
        let num_joints = names.len();
        JointState {
            name: names,
            position: vec![0.; num_joints],
            velocity: vec![0.; num_joints],
        }
    }
    /// Creates a JointState from names, positions and velocities.
    pub fn new(name: Vec<String>, position: Vec<f64>, velocity: Vec<f64>) -> Self {
        JointState {
            name,
            position,
            velocity,
        }
    }
}

/// Linear and angular velocity.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Twist {
    /// linear velocity x, y, z
    pub linear: Vector3<f64>,
    /// angular velocity x, y, z
    pub angular: Vector3<f64>,
}

impl Default for Twist {
    fn default() -> Self {
        Twist {
            linear: Vector3::zeros(),
            angular: Vector3::zeros(),
        }
    }
}

impl Twist {
    /// Creates a new Twist
    pub fn new(linear: [f64; 3], angular: [f64; 3]) -> Self {
        Twist {
            linear: Vector3::from(linear),
            angular: Vector3::from(angular),
        }
    }
    /// Stacks linear and angular part into one 6-vector.
    pub fn to_vector6(&self) -> Vector6 {
        Vector6::new(
            self.linear.x,
            self.linear.y,
            self.linear.z,
            self.angular.x,
            self.angular.y,
            self.angular.z,
        )
    }
    /// Splits a 6-vector into linear and angular part.
    pub fn from_vector6(vector: &Vector6) -> Self {
        Twist {
            linear: Vector3::new(vector[0], vector[1], vector[2]),
            angular: Vector3::new(vector[3], vector[4], vector[5]),
        }
    }
    /// true if any of the six components is not zero.
    #[allow(clippy::float_cmp)]
    pub fn is_non_zero(&self) -> bool {
        self.to_vector6().iter().any(|&x| x != 0.)
    }
    /// true if any of the six components is NaN.
    pub fn has_nan(&self) -> bool {
        self.to_vector6().iter().any(|x| x.is_nan())
    }
}

/// A stamped Cartesian velocity command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartesianCommand {
    /// Frame the twist is expressed in. Empty means the configured command frame.
    pub frame_id: String,
    /// Time since the UNIX epoch. Zero means the command carries no freshness information.
    pub stamp: Duration,
    /// commanded velocity
    pub twist: Twist,
}

impl CartesianCommand {
    /// Creates a new CartesianCommand
    pub fn new<S: Into<String>>(frame_id: S, stamp: Duration, twist: Twist) -> Self {
        CartesianCommand {
            frame_id: frame_id.into(),
            stamp,
            twist,
        }
    }
    /// true if any component of the twist is not zero.
    pub fn is_non_zero(&self) -> bool {
        self.twist.is_non_zero()
    }
}

/// A stamped joint velocity command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointJogCommand {
    /// names of the commanded joints
    pub joint_names: Vec<String>,
    /// velocities, one per name
    pub velocities: Vec<f64>,
    /// Time since the UNIX epoch. Zero means the command carries no freshness information.
    pub stamp: Duration,
}

impl JointJogCommand {
    /// Creates a new JointJogCommand
    pub fn new(joint_names: Vec<String>, velocities: Vec<f64>, stamp: Duration) -> Self {
        JointJogCommand {
            joint_names,
            velocities,
            stamp,
        }
    }
    /// true if any velocity is not zero.
    #[allow(clippy::float_cmp)]
    pub fn is_non_zero(&self) -> bool {
        self.velocities.iter().any(|&x| x != 0.)
    }
}

/// Everything a converter needs to know about the current cycle.
#[derive(Debug, Clone, Copy)]
pub struct ConversionInput<'a> {
    /// active joints of the move group
    pub joints: &'a [JointModel],
    /// joint positions at the start of the cycle
    pub positions: &'a DVector<f64>,
    /// joint velocities commanded in the previous cycle
    pub previous_joint_velocity: &'a DVector<f64>,
    /// scale in \[0, 1\] from the collision proximity feed
    pub collision_velocity_scale: f64,
    /// Cartesian dimensions which may be commanded, linear x, y, z followed by angular x, y, z
    pub control_dimensions: [bool; 6],
    /// Cartesian dimensions which are left unconstrained in the solve
    pub drift_dimensions: [bool; 6],
}

/// Joint increments of one cycle as computed by a converter.
#[derive(Debug, Clone, PartialEq)]
pub struct JointIncrement {
    /// one increment per active joint
    pub delta_theta: DVector<f64>,
    /// status caused by the conversion
    pub status: StatusCode,
    /// names of commanded joints which are not part of the move group
    pub ignored_joints: Vec<String>,
}

impl JointIncrement {
    /// Creates a JointIncrement without warnings.
    pub fn new(delta_theta: DVector<f64>) -> Self {
        JointIncrement {
            delta_theta,
            status: StatusCode::NoWarning,
            ignored_joints: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::jog::types::{JointJogCommand, Twist};
    use std::time::Duration;

    #[test]
    fn twist_non_zero_test() {
        assert!(!Twist::default().is_non_zero());
        assert!(Twist::new([0., 0., 0.], [0., 0., -0.1]).is_non_zero());
        assert!(Twist::new([f64::NAN, 0., 0.], [0.; 3]).has_nan());
    }

    #[test]
    fn twist_vector6_test() {
        let twist = Twist::new([1., 2., 3.], [4., 5., 6.]);
        let vector = twist.to_vector6();
        assert!(f64::abs(vector[3] - 4.) < 1e-12);
        assert_eq!(Twist::from_vector6(&vector), twist);
    }

    #[test]
    fn joint_jog_non_zero_test() {
        let command = JointJogCommand::new(
            vec!["a".to_string(), "b".to_string()],
            vec![0., 0.],
            Duration::ZERO,
        );
        assert!(!command.is_non_zero());
        let command = JointJogCommand::new(vec!["a".to_string()], vec![0.2], Duration::ZERO);
        assert!(command.is_non_zero());
    }
}
