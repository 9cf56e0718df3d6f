// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # jog-arm-rs
//! jog-arm-rs is a library for jogging robot arms with real-time velocity commands.
//! Cartesian twists or joint velocities from a joystick, a teleoperation device or a visual
//! servoing loop are turned into a smooth stream of joint trajectory commands.
//!
//! **ALWAYS HAVE THE USER STOP BUTTON AT
//! HAND WHILE JOGGING THE ROBOT!**
//!
//!
//! ## Design
//! The library is divided into these modules:
//! * [jog](`crate::jog`) - contains the jogging calculations and the server running them.
//! * [model](`crate::model`) - contains the interface to the kinematic model of the robot.
//! * [exception](`crate::exception`) - contains the error type of the library.
//! * [utils](`crate::utils`) - contains helper functions.
//!
//! The library does not know anything about a specific robot. The kinematics are provided by
//! an implementation of [`KinematicsProvider`] and the resulting commands are handed to an
//! implementation of [`CommandPublisher`] which forwards them to the robot controller.
//!
//! # Example:
//!```no_run
//! use std::thread;
//! use std::time::Duration;
//! use jog_arm::{
//!     CartesianCommand, CommandPublisher, JogParameters, JogResult, JogServer,
//!     KinematicsProvider, OutgoingCommand, RealtimeConfig, StatusCode, Twist,
//! };
//! # use jog_arm::{JointModel, JointState};
//! # use nalgebra::{DMatrix, DVector, Isometry3};
//! # struct MyRobotModel;
//! # impl KinematicsProvider for MyRobotModel {
//! #     fn active_joints(&self) -> Vec<JointModel> { vec![] }
//! #     fn jacobian(&self, _: &DVector<f64>) -> JogResult<DMatrix<f64>> { unimplemented!() }
//! #     fn global_link_transform(&self, _: &DVector<f64>, _: &str) -> JogResult<Isometry3<f64>> {
//! #         unimplemented!()
//! #     }
//! # }
//! # fn read_joint_state() -> JointState { JointState::default() }
//! # fn now() -> Duration { Duration::from_secs(1) }
//! struct Printer;
//! impl CommandPublisher for Printer {
//!     fn publish_command(&mut self, command: &OutgoingCommand) {
//!         println!("{:?}", command);
//!     }
//!     fn publish_status(&mut self, status: StatusCode) {
//!         println!("{}", status);
//!     }
//! }
//!
//! fn main() -> JogResult<()> {
//!     let parameters = JogParameters::load_from_file("jog_settings.toml")?;
//!     let mut server = JogServer::new(parameters, MyRobotModel, Printer, RealtimeConfig::Ignore)?;
//!     server.start()?;
//!     for _ in 0..1000 {
//!         server.provide_joint_state(read_joint_state());
//!         server.provide_twist_command(CartesianCommand::new(
//!             "",
//!             now(),
//!             Twist::new([0.2, 0., 0.], [0.; 3]),
//!         ));
//!         thread::sleep(Duration::from_millis(8));
//!     }
//!     server.stop()
//! }
//! ```
//!
//! The main function returns a JogResult<()> which means that it returns either Ok(())
//! or an Error of type JogException.
//!
//! ```ignore
//! let parameters = JogParameters::load_from_file("jog_settings.toml")?;
//! ```
//! loads the parameters from a TOML file. Every parameter which is missing in the file keeps its
//! default value, unknown keys and inconsistent values are rejected with a ConfigException.
//!
//! ```ignore
//! let mut server = JogServer::new(parameters, MyRobotModel, Printer, RealtimeConfig::Ignore)?;
//! server.start()?;
//! ```
//! creates the server and spawns the jogging thread. With [`RealtimeConfig::Enforce`] the thread
//! refuses to run without a realtime kernel. The thread does nothing until it received joint
//! telemetry for all joints of the move group.
//!
//! Commands are only executed while they are fresh. If no new command arrives within
//! `incoming_command_timeout` the robot keeps its last command, and a zero command halts it.
//! A few halt commands are still published before the server falls silent.
pub mod exception;
pub mod jog;
pub mod model;
pub mod utils;

pub use exception::{JogException, JogResult};
pub use jog::control_loop::{ControlLoop, CycleOutput, JogState};
pub use jog::control_tools::RealtimeConfig;
pub use jog::jog_server::{CommandPublisher, JogServer};
pub use jog::low_pass_filter::DEFAULT_FILTER_COEFFICIENT;
pub use jog::parameters::{CommandInType, CommandOutType, JogParameters};
pub use jog::shared_state::SharedControlState;
pub use jog::status::StatusCode;
pub use jog::trajectory::{JointTrajectory, JointTrajectoryPoint, OutgoingCommand};
pub use jog::types::{CartesianCommand, JointJogCommand, JointState, Twist};
pub use model::{JointBounds, JointModel, KinematicsProvider, Limits};
pub use utils::*;
