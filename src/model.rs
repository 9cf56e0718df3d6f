// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the kinematic model interface and the joint bound types.
//!
//! The jogging calculations never compute forward kinematics themselves. Everything they need
//! to know about the robot is queried through a [`KinematicsProvider`]. All queries take the
//! joint configuration explicitly, so evaluating a trial configuration never mutates any shared
//! kinematic state.
use nalgebra::{DMatrix, DVector, Isometry3};

use crate::exception::JogResult;

#[cfg(test)]
use mockall::automock;

/// Lower and upper limit of a single joint variable.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Limits {
    /// lower limit
    pub min: f64,
    /// upper limit
    pub max: f64,
}

impl Limits {
    /// Creates new Limits
    /// # Arguments
    /// * `min` - lower limit
    /// * `max` - upper limit
    pub fn new(min: f64, max: f64) -> Self {
        Limits { min, max }
    }
    /// Creates symmetric limits in the range [-limit, limit]
    pub fn symmetric(limit: f64) -> Self {
        Limits::new(-f64::abs(limit), f64::abs(limit))
    }
    /// The smaller magnitude of both limits.
    ///
    /// Used whenever a single conservative value is needed, e.g. for the worst case stop time.
    pub fn conservative_magnitude(&self) -> f64 {
        f64::min(f64::abs(self.min), f64::abs(self.max))
    }
}

/// Position, velocity and acceleration bounds of a joint.
///
/// Not every robot description defines every bound. A missing bound means the joint is
/// unconstrained on that axis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JointBounds {
    /// position bounds in \[rad\] or \[m\]
    pub position: Option<Limits>,
    /// velocity bounds in \[rad/s\] or \[m/s\]
    pub velocity: Option<Limits>,
    /// acceleration bounds in \[rad/s^2\] or \[m/s^2\]
    pub acceleration: Option<Limits>,
}

impl JointBounds {
    /// Determines whether a position lies inside the position bounds shrunk by `margin` on both
    /// sides. Joints without position bounds always satisfy them.
    pub fn satisfies_position_bounds(&self, position: f64, margin: f64) -> bool {
        match self.position {
            Some(limits) => position >= limits.min + margin && position <= limits.max - margin,
            None => true,
        }
    }
}

/// An active (controllable) joint of the jogged move group.
#[derive(Debug, Clone, PartialEq)]
pub struct JointModel {
    /// unique name of the joint
    pub name: String,
    /// semantic bounds of the joint
    pub bounds: JointBounds,
}

impl JointModel {
    /// Creates a new JointModel
    pub fn new<S: Into<String>>(name: S, bounds: JointBounds) -> Self {
        JointModel {
            name: name.into(),
            bounds,
        }
    }
}

/// Looks up the index of a joint by name.
pub fn find_joint_index(joints: &[JointModel], name: &str) -> Option<usize> {
    joints.iter().position(|joint| joint.name == name)
}

/// Answers all kinematic queries of the jogging calculations.
///
/// Implementations wrap a robot model, e.g. a URDF based solver or an analytic model.
/// The order of [`active_joints`](`Self::active_joints`) defines the order of all joint
/// vectors and of the Jacobian columns.
#[cfg_attr(test, automock)]
pub trait KinematicsProvider: Send {
    /// Gets the active joints of the move group together with their bounds.
    fn active_joints(&self) -> Vec<JointModel>;

    /// Gets the 6xN Jacobian of the move group tip in the planning frame.
    ///
    /// Rows are ordered linear x, y, z followed by angular x, y, z.
    /// # Arguments
    /// * `positions` - Joint configuration at which the Jacobian is evaluated.
    fn jacobian(&self, positions: &DVector<f64>) -> JogResult<DMatrix<f64>>;

    /// Gets the pose of a link frame in the model root frame.
    /// # Arguments
    /// * `positions` - Joint configuration at which the transform is evaluated.
    /// * `frame` - Name of the link frame.
    /// # Errors
    /// * KinematicsException if the frame is unknown.
    fn global_link_transform(
        &self,
        positions: &DVector<f64>,
        frame: &str,
    ) -> JogResult<Isometry3<f64>>;

    /// Determines whether a joint position satisfies the position bounds shrunk by `margin`.
    fn satisfies_position_bounds(&self, joint: &JointModel, position: f64, margin: f64) -> bool {
        joint.bounds.satisfies_position_bounds(position, margin)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{find_joint_index, JointBounds, JointModel, Limits};

    #[test]
    fn conservative_magnitude_test() {
        assert!(f64::abs(Limits::new(-2., 3.).conservative_magnitude() - 2.) < 1e-12);
        assert!(f64::abs(Limits::symmetric(-4.).conservative_magnitude() - 4.) < 1e-12);
    }

    #[test]
    fn position_bounds_with_margin_test() {
        let bounds = JointBounds {
            position: Some(Limits::new(-1., 1.)),
            ..Default::default()
        };
        assert!(bounds.satisfies_position_bounds(0.0, 0.1));
        assert!(bounds.satisfies_position_bounds(0.9, 0.1));
        assert!(!bounds.satisfies_position_bounds(0.95, 0.1));
        assert!(!bounds.satisfies_position_bounds(-0.95, 0.1));
        assert!(JointBounds::default().satisfies_position_bounds(100., 0.1));
    }

    #[test]
    fn find_joint_index_test() {
        let joints = vec![
            JointModel::new("shoulder", JointBounds::default()),
            JointModel::new("elbow", JointBounds::default()),
        ];
        assert_eq!(find_joint_index(&joints, "elbow"), Some(1));
        assert_eq!(find_joint_index(&joints, "gripper_finger"), None);
    }
}
