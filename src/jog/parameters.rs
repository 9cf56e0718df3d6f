// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the jogging parameters and their validation.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::exception::{create_config_exception, JogResult};

/// Units of the incoming commands.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandInType {
    /// Commands are in the range \[-1, 1\] and get scaled by the configured scales.
    Unitless,
    /// Commands are in \[m/s\] and \[rad/s\].
    SpeedUnits,
}

/// Format of the outgoing command.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutType {
    /// A full joint trajectory with names and time stamped waypoints.
    JointTrajectory,
    /// Only the positions (or velocities) of the first waypoint as flat array.
    Float64MultiArray,
}

/// Parameters of the jogger. They are set once and never change while jogging.
///
/// All fields have defaults, so a configuration file only has to contain what differs:
/// ```
/// # use jog_arm::JogParameters;
/// let parameters = JogParameters::from_toml_str(
///     r#"
///     publish_period = 0.01
///     planning_frame = "base_link"
///     robot_link_command_frame = "tool0"
///     "#,
/// ).unwrap();
/// assert_eq!(parameters.planning_frame, "base_link");
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct JogParameters {
    /// Period of the jogging loop and time between two waypoints in \[s\].
    pub publish_period: f64,
    /// Coefficient of the position low-pass filters. Larger is smoother but slower.
    pub low_pass_filter_coeff: f64,
    /// Units of the incoming commands.
    pub command_in_type: CommandInType,
    /// Format of the outgoing command.
    pub command_out_type: CommandOutType,
    /// Max linear velocity in \[m/s\] for unitless commands.
    pub linear_scale: f64,
    /// Max angular velocity in \[rad/s\] for unitless commands.
    pub rotational_scale: f64,
    /// Max joint velocity in \[rad/s\] for unitless joint commands.
    pub joint_scale: f64,
    /// Frame in which the Jacobian is expressed.
    pub planning_frame: String,
    /// Default frame of incoming Cartesian commands.
    pub robot_link_command_frame: String,
    /// Commands older than this in \[s\] are stale and are not executed.
    pub incoming_command_timeout: f64,
    /// Condition number of the Jacobian from which motions towards a singularity slow down.
    pub lower_singularity_threshold: f64,
    /// Condition number of the Jacobian from which motions towards a singularity halt.
    pub hard_stop_singularity_threshold: f64,
    /// Distance to a position limit in \[rad\] or \[m\] from which motions towards it halt.
    pub joint_limit_margin: f64,
    /// Publish the waypoint positions.
    pub publish_joint_positions: bool,
    /// Publish the waypoint velocities.
    pub publish_joint_velocities: bool,
    /// Publish all-zero waypoint accelerations, for controllers which need that field.
    pub publish_joint_accelerations: bool,
    /// Number of halt commands to publish after the command became zero. 0 means forever.
    pub num_outgoing_halt_msgs_to_publish: u32,
    /// Append copies of the waypoint at later time offsets, e.g. for simulators which drop
    /// waypoints with a time stamp in the past.
    pub use_redundant_waypoints: bool,
    /// Total number of waypoints when [`use_redundant_waypoints`](`Self::use_redundant_waypoints`) is set.
    pub num_redundant_waypoints: usize,
    /// Name of the jogged move group.
    pub move_group_name: String,
}

impl Default for JogParameters {
    fn default() -> Self {
        JogParameters {
            publish_period: 0.008,
            low_pass_filter_coeff: 2.,
            command_in_type: CommandInType::Unitless,
            command_out_type: CommandOutType::JointTrajectory,
            linear_scale: 0.4,
            rotational_scale: 0.8,
            joint_scale: 0.5,
            planning_frame: "base_link".to_string(),
            robot_link_command_frame: "base_link".to_string(),
            incoming_command_timeout: 0.1,
            lower_singularity_threshold: 17.,
            hard_stop_singularity_threshold: 30.,
            joint_limit_margin: 0.1,
            publish_joint_positions: true,
            publish_joint_velocities: false,
            publish_joint_accelerations: false,
            num_outgoing_halt_msgs_to_publish: 4,
            use_redundant_waypoints: false,
            num_redundant_waypoints: 30,
            move_group_name: "manipulator".to_string(),
        }
    }
}

impl JogParameters {
    /// Parses and validates parameters from a TOML string.
    /// # Errors
    /// * ConfigException if the string is no valid TOML, contains unknown keys or
    /// the values are inconsistent.
    pub fn from_toml_str(content: &str) -> JogResult<Self> {
        let parameters: JogParameters = toml::from_str(content)
            .map_err(|e| create_config_exception(format!("invalid jogging parameters: {}", e)))?;
        parameters.validate()?;
        Ok(parameters)
    }

    /// Loads and validates parameters from a TOML file.
    /// # Errors
    /// * ConfigException if the file cannot be read or its content is invalid.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> JogResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            create_config_exception(format!(
                "cannot read jogging parameters from {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        JogParameters::from_toml_str(&content)
    }

    /// Serializes the parameters to a TOML string.
    pub fn to_toml_string(&self) -> JogResult<String> {
        toml::to_string(self)
            .map_err(|e| create_config_exception(format!("cannot serialize parameters: {}", e)))
    }

    /// Gets the incoming command timeout as a Duration.
    ///
    /// Saturates for timeouts which do not pass [`validate`](`Self::validate`).
    pub fn command_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.incoming_command_timeout).unwrap_or(Duration::MAX)
    }

    /// Checks the parameters for consistency.
    /// # Errors
    /// * ConfigException naming the first offending parameter.
    pub fn validate(&self) -> JogResult<()> {
        if !(self.publish_period > 0. && Duration::try_from_secs_f64(self.publish_period).is_ok()) {
            return Err(create_config_exception(
                "Parameter 'publish_period' should be a finite number of seconds greater than zero.",
            ));
        }
        if self.hard_stop_singularity_threshold < self.lower_singularity_threshold {
            return Err(create_config_exception(
                "Parameter 'hard_stop_singularity_threshold' should be greater than 'lower_singularity_threshold'.",
            ));
        }
        if self.hard_stop_singularity_threshold < 0. || self.lower_singularity_threshold < 0. {
            return Err(create_config_exception(
                "Parameters 'hard_stop_singularity_threshold' and 'lower_singularity_threshold' should be greater than zero.",
            ));
        }
        if !(self.low_pass_filter_coeff.is_finite() && self.low_pass_filter_coeff > 0.) {
            return Err(create_config_exception(
                "Parameter 'low_pass_filter_coeff' should be greater than zero.",
            ));
        }
        if !(self.joint_limit_margin >= 0.) {
            return Err(create_config_exception(
                "Parameter 'joint_limit_margin' should be greater than or equal to zero.",
            ));
        }
        if Duration::try_from_secs_f64(self.incoming_command_timeout).is_err() {
            return Err(create_config_exception(
                "Parameter 'incoming_command_timeout' should be a finite number of seconds greater than or equal to zero.",
            ));
        }
        if !(self.linear_scale.is_finite()
            && self.rotational_scale.is_finite()
            && self.joint_scale.is_finite())
        {
            return Err(create_config_exception(
                "Parameters 'linear_scale', 'rotational_scale' and 'joint_scale' must be finite.",
            ));
        }
        if !self.publish_joint_positions
            && !self.publish_joint_velocities
            && !self.publish_joint_accelerations
        {
            return Err(create_config_exception(
                "At least one of publish_joint_positions / publish_joint_velocities / publish_joint_accelerations must be true.",
            ));
        }
        if self.command_out_type == CommandOutType::Float64MultiArray
            && self.publish_joint_positions == self.publish_joint_velocities
        {
            return Err(create_config_exception(
                "When publishing a flat array, you must select positions OR velocities.",
            ));
        }
        Ok(())
    }
}
