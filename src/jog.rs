// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains everything needed for jogging a robot arm with velocity commands.
//!
//! The [`JogServer`](`jog_server::JogServer`) runs a [`ControlLoop`](`control_loop::ControlLoop`)
//! on its own thread. Each cycle the loop converts the latest Cartesian or joint velocity
//! command into joint increments, enforces the joint limits, smooths the result with a
//! low-pass filter and composes a short joint trajectory for the robot controller.

pub mod cartesian_jog;
pub mod control_loop;
pub mod control_tools;
pub mod joint_jog;
pub mod jog_server;
pub mod low_pass_filter;
pub mod parameters;
pub mod rate_limiting;
pub mod shared_state;
pub mod singularity;
pub mod status;
pub mod trajectory;
pub mod types;
