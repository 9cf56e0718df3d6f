// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the [`JogServer`] which runs the [`ControlLoop`] periodically on its own thread.
#[cfg(test)]
use mockall::automock;
use nalgebra::Isometry3;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::exception::{JogException, JogResult};
use crate::jog::control_loop::ControlLoop;
use crate::jog::control_tools::{apply_realtime_config, RealtimeConfig};
use crate::jog::parameters::JogParameters;
use crate::jog::shared_state::SharedControlState;
use crate::jog::status::StatusCode;
use crate::jog::trajectory::OutgoingCommand;
use crate::jog::types::{CartesianCommand, JointJogCommand, JointState};
use crate::model::KinematicsProvider;
use crate::utils::{now_since_epoch, LogThrottle};

/// Number of periods the server waits after the first telemetry before jogging starts.
pub const FILTER_SETTLING_CYCLES: u32 = 10;

/// Receives the output of the jogging loop, e.g. to forward it to a robot controller.
#[cfg_attr(test, automock)]
pub trait CommandPublisher: Send {
    /// Called every cycle in which a command should be sent to the robot.
    fn publish_command(&mut self, command: &OutgoingCommand);
    /// Called every cycle in which a command was converted.
    fn publish_status(&mut self, status: StatusCode);
}

type Worker<K, P> = (ControlLoop<K>, P);

/// Owns the shared state and the thread of the jogging loop.
///
/// Commands and telemetry can be provided from any thread, either through the server or
/// through the [`SharedControlState`] returned by [`shared_state`](`Self::shared_state`).
pub struct JogServer<K: KinematicsProvider + 'static, P: CommandPublisher + 'static> {
    shared: Arc<SharedControlState>,
    realtime_config: RealtimeConfig,
    idle_worker: Option<Worker<K, P>>,
    thread: Option<JoinHandle<(Worker<K, P>, JogResult<()>)>>,
}

impl<K: KinematicsProvider + 'static, P: CommandPublisher + 'static> JogServer<K, P> {
    /// Creates a new JogServer. The loop does not run until [`start`](`Self::start`) is called.
    /// # Arguments
    /// * `parameters` - jogging parameters, they are validated here
    /// * `kinematics` - kinematics of the jogged move group
    /// * `publisher` - receives commands and status codes
    /// * `realtime_config` - whether the loop thread needs real-time priority
    /// # Errors
    /// * ConfigException if the parameters are invalid.
    /// * KinematicsException if the move group has no active joints.
    pub fn new(
        parameters: JogParameters,
        kinematics: K,
        publisher: P,
        realtime_config: RealtimeConfig,
    ) -> JogResult<Self> {
        let control_loop = ControlLoop::new(parameters, kinematics)?;
        Ok(JogServer {
            shared: Arc::new(SharedControlState::new()),
            realtime_config,
            idle_worker: Some((control_loop, publisher)),
            thread: None,
        })
    }

    /// Spawns the loop thread.
    ///
    /// The thread waits for complete joint telemetry, lets the filters settle for
    /// [`FILTER_SETTLING_CYCLES`] periods and then runs one cycle per publish period.
    /// # Errors
    /// * ThreadException if the loop is already running or the thread cannot be spawned.
    pub fn start(&mut self) -> JogResult<()> {
        if self.thread.is_some() {
            return Err(JogException::ThreadException {
                message: "the jogging loop is already running".to_string(),
            });
        }
        let (mut control_loop, mut publisher) =
            self.idle_worker
                .take()
                .ok_or_else(|| JogException::ThreadException {
                    message: "the jogging loop was lost by a previous failed start".to_string(),
                })?;
        self.shared.clear_stop_request();
        let shared = self.shared.clone();
        let realtime_config = self.realtime_config;
        let handle = thread::Builder::new()
            .name("jog_arm".to_string())
            .spawn(move || {
                let result = run_loop(&mut control_loop, &mut publisher, &shared, realtime_config);
                if let Err(error) = &result {
                    error!("The jogging loop stopped: {}", error);
                }
                ((control_loop, publisher), result)
            })
            .map_err(|error| JogException::ThreadException {
                message: format!("unable to spawn the jogging thread: {}", error),
            })?;
        self.thread = Some(handle);
        Ok(())
    }

    /// Stops the loop thread and waits for it. Does nothing if the loop is not running.
    ///
    /// The server can be started again afterwards.
    /// # Errors
    /// * the error which stopped the loop, e.g. RealTimeException
    /// * ThreadException if the loop thread panicked
    pub fn stop(&mut self) -> JogResult<()> {
        let handle = match self.thread.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        self.shared.request_stop();
        match handle.join() {
            Ok((worker, result)) => {
                self.idle_worker = Some(worker);
                result
            }
            Err(_) => Err(JogException::ThreadException {
                message: "the jogging thread panicked".to_string(),
            }),
        }
    }

    /// true while the loop thread is alive
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Gets the state shared with the loop, e.g. to provide commands from other threads.
    pub fn shared_state(&self) -> Arc<SharedControlState> {
        self.shared.clone()
    }

    /// Pauses or resumes jogging. While paused nothing is published.
    pub fn set_paused(&self, paused: bool) {
        self.shared.set_paused(paused);
    }

    /// Provides a Cartesian velocity command.
    pub fn provide_twist_command(&self, command: CartesianCommand) {
        self.shared.on_cartesian(command);
    }

    /// Provides a joint velocity command.
    pub fn provide_joint_command(&self, command: JointJogCommand) {
        self.shared.on_joint_jog(command);
    }

    /// Provides joint telemetry of the robot.
    pub fn provide_joint_state(&self, joint_state: JointState) {
        self.shared.on_telemetry(joint_state);
    }

    /// Sets which Cartesian dimensions (x, y, z, roll, pitch, yaw) may drift.
    pub fn change_drift_dimensions(&self, drift_dimensions: [bool; 6]) {
        self.shared.set_drift_dimensions(drift_dimensions);
    }

    /// Sets which Cartesian dimensions (x, y, z, roll, pitch, yaw) may be commanded.
    pub fn change_control_dimensions(&self, control_dimensions: [bool; 6]) {
        self.shared.set_control_dimensions(control_dimensions);
    }

    /// Sets the velocity scale of the collision proximity feed, clamped to \[0, 1\].
    pub fn set_collision_velocity_scale(&self, scale: f64) {
        self.shared.set_collision_velocity_scale(scale);
    }

    /// Gets the time in \[s\] the joints need at least to come to a stop.
    pub fn worst_case_stop_time(&self) -> f64 {
        self.shared.feedback().worst_case_stop_time
    }

    /// Gets the latest joint telemetry.
    pub fn joint_state(&self) -> Option<JointState> {
        self.shared.snapshot().joint_state.as_deref().cloned()
    }

    /// Gets the transform from the planning frame to the robot link command frame.
    ///
    /// `None` until the loop received joint telemetry.
    pub fn command_frame_transform(&self) -> Option<Isometry3<f64>> {
        self.shared.feedback().command_frame_transform
    }

    /// Gets the status of the last converted cycle.
    pub fn status(&self) -> StatusCode {
        self.shared.feedback().status
    }
}

impl<K: KinematicsProvider + 'static, P: CommandPublisher + 'static> Drop for JogServer<K, P> {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            error!("Error while stopping the jogging loop: {}", error);
        }
    }
}

fn run_loop<K: KinematicsProvider, P: CommandPublisher>(
    control_loop: &mut ControlLoop<K>,
    publisher: &mut P,
    shared: &SharedControlState,
    realtime_config: RealtimeConfig,
) -> JogResult<()> {
    apply_realtime_config(realtime_config)?;
    let period = Duration::from_secs_f64(control_loop.parameters().publish_period);
    if !control_loop.wait_for_joint_state(shared, period) {
        return Ok(());
    }
    for _ in 0..FILTER_SETTLING_CYCLES {
        if shared.stop_requested() {
            return Ok(());
        }
        thread::sleep(period);
    }
    info!("Jogging loop started with a period of {:?}", period);

    let mut overrun_throttle = LogThrottle::from_secs(5);
    let mut next_deadline = Instant::now() + period;
    while !shared.stop_requested() {
        let output = control_loop.tick(shared, now_since_epoch());
        if let Some(status) = output.status {
            publisher.publish_status(status);
        }
        if let Some(command) = output.command.as_ref() {
            publisher.publish_command(command);
        }

        let now = Instant::now();
        if now < next_deadline {
            thread::sleep(next_deadline - now);
            next_deadline += period;
        } else {
            if overrun_throttle.ready() {
                warn!(
                    overrun = ?(now - next_deadline),
                    "The jogging cycle took longer than the publish period"
                );
            }
            next_deadline = now + period;
        }
    }
    info!("Jogging loop stopped");
    Ok(())
}
