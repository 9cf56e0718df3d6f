// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the jogging calculations which run once per cycle.
use nalgebra::{DVector, Isometry3};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::exception::{create_kinematics_exception, JogException, JogResult};
use crate::jog::cartesian_jog::cartesian_jog_calcs;
use crate::jog::joint_jog::joint_jog_calcs;
use crate::jog::low_pass_filter::PositionFilterBank;
use crate::jog::parameters::JogParameters;
use crate::jog::rate_limiting::enforce_position_limits;
use crate::jog::shared_state::{IntakeData, LoopFeedback, SharedControlState};
use crate::jog::status::StatusCode;
use crate::jog::trajectory::{
    compose_joint_trajectory, halt_trajectory, insert_redundant_points_into_trajectory,
    JointTrajectory, OutgoingCommand,
};
use crate::jog::types::{
    CartesianCommand, ConversionInput, JointIncrement, JointJogCommand, JointState,
};
use crate::model::{find_joint_index, JointModel, KinematicsProvider};
use crate::utils::{now_since_epoch, LogThrottle};

/// State of the jogging loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JogState {
    /// No complete joint telemetry has been received yet.
    Uninitialized,
    /// Telemetry is available but no command with a timestamp has been received yet.
    WaitingForFirstCommand,
    /// Jogging is paused, the filters follow the robot.
    Paused,
    /// All commands are zero, the halt command is published.
    Idle,
    /// A non-zero command is executed.
    Active,
    /// A non-zero command is stopped because of a collision, a singularity or a position limit.
    Halted,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutput {
    /// state after the cycle
    pub state: JogState,
    /// command to publish, `None` if nothing should be published this cycle
    pub command: Option<OutgoingCommand>,
    /// status of the conversion, `None` if no conversion ran this cycle
    pub status: Option<StatusCode>,
    /// true while commands are published
    pub ok_to_publish: bool,
    /// true if the newest command was too old to be executed
    pub command_is_stale: bool,
}

/// Computes the time the joints need at least to stop from their current velocities.
///
/// The acceleration limit of a joint is the smaller magnitude of its acceleration bounds.
/// Joints without (or with zero) acceleration bounds are skipped and returned.
pub fn worst_case_stop_time(joints: &[JointModel], joint_state: &JointState) -> (f64, Vec<String>) {
    let mut worst_case_stop_time: f64 = 0.;
    let mut skipped_joints = Vec::new();
    for (name, velocity) in joint_state.name.iter().zip(joint_state.velocity.iter()) {
        let joint = match find_joint_index(joints, name) {
            Some(index) => &joints[index],
            None => continue,
        };
        let acceleration_limit = joint
            .bounds
            .acceleration
            .map(|limits| limits.conservative_magnitude())
            .filter(|limit| *limit > 0.);
        match acceleration_limit {
            Some(limit) => {
                worst_case_stop_time = worst_case_stop_time.max(f64::abs(velocity / limit))
            }
            None => skipped_joints.push(name.clone()),
        }
    }
    (worst_case_stop_time, skipped_joints)
}

struct Throttles {
    rejected_command: LogThrottle,
    status: LogThrottle,
    joint_bound: LogThrottle,
    unknown_joint: LogThrottle,
    stale_command: LogThrottle,
    stop_time: LogThrottle,
    transform: LogThrottle,
}

impl Default for Throttles {
    fn default() -> Self {
        Throttles {
            rejected_command: LogThrottle::from_secs(2),
            status: LogThrottle::from_secs(2),
            joint_bound: LogThrottle::from_secs(2),
            unknown_joint: LogThrottle::from_secs(5),
            stale_command: LogThrottle::from_secs(2),
            stop_time: LogThrottle::from_secs(5),
            transform: LogThrottle::from_secs(5),
        }
    }
}

/// The jogging calculations.
///
/// [`tick`](`Self::tick`) must be called once per publish period by a single thread.
/// Commands and telemetry are read from a [`SharedControlState`] which any number of
/// producers may write to concurrently.
pub struct ControlLoop<K: KinematicsProvider> {
    parameters: JogParameters,
    kinematics: K,
    joints: Vec<JointModel>,
    joint_names: Vec<String>,
    internal_joint_state: JointState,
    original_positions: DVector<f64>,
    previous_joint_velocity: DVector<f64>,
    position_filters: PositionFilterBank,
    outgoing_trajectory: JointTrajectory,
    cached_status: StatusCode,
    state: JogState,
    initialized: bool,
    waiting_for_first_command: bool,
    ok_to_publish: bool,
    zero_velocity_count: u32,
    worst_case_stop_time: f64,
    command_frame_transform: Option<Isometry3<f64>>,
    throttles: Throttles,
}

impl<K: KinematicsProvider> ControlLoop<K> {
    /// Creates a new ControlLoop.
    /// # Errors
    /// * ConfigException if the parameters are invalid.
    /// * KinematicsException if the move group has no active joints.
    pub fn new(parameters: JogParameters, kinematics: K) -> JogResult<Self> {
        parameters.validate()?;
        let joints = kinematics.active_joints();
        if joints.is_empty() {
            return Err(create_kinematics_exception(format!(
                "move group {} has no active joints",
                parameters.move_group_name
            )));
        }
        let joint_names: Vec<String> = joints.iter().map(|joint| joint.name.clone()).collect();
        let num_joints = joints.len();
        let outgoing_trajectory = halt_trajectory(&joint_names, &vec![0.; num_joints], &parameters);
        Ok(ControlLoop {
            position_filters: PositionFilterBank::new(num_joints, parameters.low_pass_filter_coeff),
            internal_joint_state: JointState::with_names(joint_names.clone()),
            original_positions: DVector::zeros(num_joints),
            previous_joint_velocity: DVector::zeros(num_joints),
            outgoing_trajectory,
            parameters,
            kinematics,
            joints,
            joint_names,
            cached_status: StatusCode::NoWarning,
            state: JogState::Uninitialized,
            initialized: false,
            waiting_for_first_command: true,
            ok_to_publish: false,
            zero_velocity_count: 0,
            worst_case_stop_time: 0.,
            command_frame_transform: None,
            throttles: Throttles::default(),
        })
    }

    /// Gets the parameters
    pub fn parameters(&self) -> &JogParameters {
        &self.parameters
    }

    /// Gets the kinematics provider
    pub fn kinematics(&self) -> &K {
        &self.kinematics
    }

    /// Gets the names of the active joints
    pub fn joint_names(&self) -> &[String] {
        &self.joint_names
    }

    /// Gets the current state
    pub fn state(&self) -> JogState {
        self.state
    }

    /// true once complete joint telemetry has been received
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Gets the joint positions at the start of the last cycle
    pub fn original_positions(&self) -> &DVector<f64> {
        &self.original_positions
    }

    /// Gets the joint velocities commanded in the last converted cycle
    pub fn previous_joint_velocity(&self) -> &DVector<f64> {
        &self.previous_joint_velocity
    }

    /// Gets the latest composed trajectory
    pub fn outgoing_trajectory(&self) -> &JointTrajectory {
        &self.outgoing_trajectory
    }

    /// Gets the worst case stop time of the last cycle in \[s\]
    pub fn worst_case_stop_time(&self) -> f64 {
        self.worst_case_stop_time
    }

    /// Gets the transform from the planning frame to the robot link command frame
    pub fn command_frame_transform(&self) -> Option<Isometry3<f64>> {
        self.command_frame_transform
    }

    /// Merges the latest telemetry into the internal joint state.
    ///
    /// # Return
    /// false if the telemetry does not contain at least as many joints as the move group.
    pub fn update_joints(&mut self, intake: &IntakeData) -> bool {
        let incoming = match intake.joint_state.as_ref() {
            Some(joint_state) => joint_state,
            None => return false,
        };
        if incoming.name.len() < self.joints.len() {
            return false;
        }
        for (name, position) in incoming.name.iter().zip(incoming.position.iter()) {
            match find_joint_index(&self.joints, name) {
                Some(index) => self.internal_joint_state.position[index] = *position,
                None => {
                    if self.throttles.unknown_joint.ready() {
                        debug!("Ignoring joint {}", name);
                    }
                }
            }
        }
        self.original_positions = DVector::from_column_slice(&self.internal_joint_state.position);

        let (stop_time, skipped_joints) = worst_case_stop_time(&self.joints, incoming);
        if !skipped_joints.is_empty() && self.throttles.stop_time.ready() {
            warn!(
                joints = ?skipped_joints,
                "An acceleration limit is not defined for these joints; the worst case stop time \
                 should not be used for collision checking"
            );
        }
        self.worst_case_stop_time = stop_time;
        true
    }

    /// Blocks until complete joint telemetry is available.
    ///
    /// # Return
    /// false if a stop was requested before.
    pub fn wait_for_joint_state(
        &mut self,
        shared: &SharedControlState,
        retry_period: Duration,
    ) -> bool {
        loop {
            if shared.stop_requested() {
                return false;
            }
            let intake = shared.snapshot();
            if self.update_joints(&intake) {
                if !self.initialized {
                    self.initialize(&intake, shared, now_since_epoch());
                }
                return true;
            }
            thread::sleep(retry_period);
        }
    }

    fn initialize(&mut self, intake: &IntakeData, shared: &SharedControlState, now: Duration) {
        self.position_filters
            .reset(self.original_positions.as_slice());
        self.outgoing_trajectory = halt_trajectory(
            &self.joint_names,
            self.original_positions.as_slice(),
            &self.parameters,
        );
        // a fresh command sent before the telemetry is executed, an outdated one is dropped
        if intake.command_is_stale(now, self.parameters.command_timeout()) {
            shared.clear_nonzero_flags(intake.command_sequence);
        }
        self.waiting_for_first_command = true;
        self.initialized = true;
        self.state = JogState::WaitingForFirstCommand;
        info!(
            "Received joint telemetry for all {} joints of {}",
            self.joints.len(),
            self.parameters.move_group_name
        );
    }

    fn lookup_command_frame_transform(&self) -> JogResult<Isometry3<f64>> {
        let planning_frame = self
            .kinematics
            .global_link_transform(&self.original_positions, &self.parameters.planning_frame)?;
        let command_frame = self.kinematics.global_link_transform(
            &self.original_positions,
            &self.parameters.robot_link_command_frame,
        )?;
        Ok(planning_frame.inverse() * command_frame)
    }

    /// Runs one cycle of the jogging calculations.
    ///
    /// # Arguments
    /// * `shared` - state shared with the producers, the loop feedback is published to it
    /// * `now` - current time since the UNIX epoch, used for the staleness check
    pub fn tick(&mut self, shared: &SharedControlState, now: Duration) -> CycleOutput {
        let intake = shared.snapshot();
        if !self.update_joints(&intake) {
            return self.finish_cycle(shared, None, None, false);
        }
        if !self.initialized {
            self.initialize(&intake, shared, now);
            return self.finish_cycle(shared, None, None, false);
        }

        let command_is_stale = intake.command_is_stale(now, self.parameters.command_timeout());

        match self.lookup_command_frame_transform() {
            Ok(transform) => self.command_frame_transform = Some(transform),
            Err(error) => {
                if self.throttles.transform.ready() {
                    warn!("Cannot update the command frame transform: {}", error);
                }
            }
        }

        let cartesian_command = intake.cartesian_command.as_ref().map(|command| {
            let mut command = CartesianCommand::clone(command);
            if command.frame_id.is_empty() {
                command.frame_id = self.parameters.robot_link_command_frame.clone();
            }
            command
        });
        let have_nonzero_command =
            intake.have_nonzero_cartesian_command || intake.have_nonzero_joint_command;

        let paused = shared.is_paused();
        if self.waiting_for_first_command || paused {
            // follow the robot so resuming does not jump
            self.position_filters
                .reset(self.original_positions.as_slice());
            self.previous_joint_velocity.fill(0.);
            self.waiting_for_first_command = intake.waiting_for_first_command();
            self.state = if paused {
                JogState::Paused
            } else if self.waiting_for_first_command {
                JogState::WaitingForFirstCommand
            } else {
                JogState::Idle
            };
            return self.finish_cycle(shared, None, None, command_is_stale);
        }

        let mut converted_status = None;
        if command_is_stale && have_nonzero_command && self.throttles.stale_command.ready() {
            warn!("Stale command. Try a larger incoming_command_timeout?");
        }
        if !command_is_stale {
            let conversion = if intake.have_nonzero_cartesian_command {
                cartesian_command
                    .as_ref()
                    .map(|command| self.cartesian_jog(command, &intake))
            } else if intake.have_nonzero_joint_command {
                intake
                    .joint_command
                    .as_ref()
                    .map(|command| self.joint_jog(command, &intake))
            } else {
                None
            };
            match conversion {
                Some(Ok(status)) => converted_status = Some(status),
                Some(Err(error)) => {
                    self.log_rejected_command(&error);
                    return self.finish_cycle(shared, None, None, command_is_stale);
                }
                None => {}
            }
        }

        if !have_nonzero_command {
            self.position_filters
                .reset(self.original_positions.as_slice());
            self.previous_joint_velocity.fill(0.);
            self.outgoing_trajectory = halt_trajectory(
                &self.joint_names,
                self.original_positions.as_slice(),
                &self.parameters,
            );
            shared.clear_nonzero_flags(intake.command_sequence);
        }

        let halt_messages = self.parameters.num_outgoing_halt_msgs_to_publish;
        self.ok_to_publish = have_nonzero_command
            || halt_messages == 0
            || self.zero_velocity_count <= halt_messages;
        let command = if self.ok_to_publish {
            Some(OutgoingCommand::new(
                self.outgoing_trajectory.clone(),
                &self.parameters,
            ))
        } else {
            None
        };

        self.zero_velocity_count = if have_nonzero_command {
            0
        } else {
            self.zero_velocity_count.saturating_add(1)
        };

        self.state = match converted_status {
            _ if !have_nonzero_command => JogState::Idle,
            Some(status) if status.is_halt() => JogState::Halted,
            _ => JogState::Active,
        };
        self.finish_cycle(shared, command, converted_status, command_is_stale)
    }

    fn finish_cycle(
        &mut self,
        shared: &SharedControlState,
        command: Option<OutgoingCommand>,
        status: Option<StatusCode>,
        command_is_stale: bool,
    ) -> CycleOutput {
        if let Some(status) = status {
            self.cached_status = status;
        }
        shared.publish_feedback(LoopFeedback {
            status: self.cached_status,
            ok_to_publish: self.ok_to_publish,
            command_is_stale,
            worst_case_stop_time: self.worst_case_stop_time,
            command_frame_transform: self.command_frame_transform,
        });
        CycleOutput {
            state: self.state,
            command,
            status,
            ok_to_publish: self.ok_to_publish,
            command_is_stale,
        }
    }

    fn log_rejected_command(&mut self, error: &JogException) {
        if !self.throttles.rejected_command.ready() {
            return;
        }
        match error {
            JogException::CommandException { message } => warn!("{}", message),
            error => warn!("Skipping this cycle: {}", error),
        }
    }

    fn cartesian_jog(
        &mut self,
        command: &CartesianCommand,
        intake: &IntakeData,
    ) -> JogResult<StatusCode> {
        let input = ConversionInput {
            joints: &self.joints,
            positions: &self.original_positions,
            previous_joint_velocity: &self.previous_joint_velocity,
            collision_velocity_scale: intake.collision_velocity_scale,
            control_dimensions: intake.control_dimensions,
            drift_dimensions: intake.drift_dimensions,
        };
        let increment = cartesian_jog_calcs(command, &self.parameters, &self.kinematics, &input)?;
        self.convert_deltas_to_outgoing_cmd(increment)
    }

    fn joint_jog(&mut self, command: &JointJogCommand, intake: &IntakeData) -> JogResult<StatusCode> {
        let input = ConversionInput {
            joints: &self.joints,
            positions: &self.original_positions,
            previous_joint_velocity: &self.previous_joint_velocity,
            collision_velocity_scale: intake.collision_velocity_scale,
            control_dimensions: intake.control_dimensions,
            drift_dimensions: intake.drift_dimensions,
        };
        let increment = joint_jog_calcs(command, &self.parameters, &input)?;
        self.convert_deltas_to_outgoing_cmd(increment)
    }

    /// Turns joint increments into the outgoing trajectory.
    ///
    /// # Return
    /// The status of this conversion. It is reported once and not carried into the next cycle.
    fn convert_deltas_to_outgoing_cmd(&mut self, increment: JointIncrement) -> JogResult<StatusCode> {
        let JointIncrement {
            delta_theta,
            mut status,
            ignored_joints,
        } = increment;
        if !ignored_joints.is_empty() && self.throttles.unknown_joint.ready() {
            debug!(joints = ?ignored_joints, "Ignoring joints which are not part of the move group");
        }
        if delta_theta.len() != self.joints.len() {
            return Err(JogException::DimensionMismatch {
                expected: self.joints.len(),
                actual: delta_theta.len(),
            });
        }
        let publish_period = self.parameters.publish_period;
        let velocities = &delta_theta / publish_period;
        let halting_joints = enforce_position_limits(
            &self.kinematics,
            &self.joints,
            self.original_positions.as_slice(),
            velocities.as_slice(),
            self.parameters.joint_limit_margin,
        )?;

        let mut positions = &self.original_positions + &delta_theta;
        self.position_filters.filter(positions.as_mut_slice());

        let mut trajectory = if halting_joints.is_empty() {
            self.previous_joint_velocity = velocities.clone();
            compose_joint_trajectory(
                &self.joint_names,
                positions.as_slice(),
                velocities.as_slice(),
                &self.parameters,
            )
        } else {
            if self.throttles.joint_bound.ready() {
                let names: Vec<&String> = halting_joints
                    .iter()
                    .map(|&index| &self.joint_names[index])
                    .collect();
                warn!(joints = ?names, "close to a position limit. Halting.");
            }
            status = StatusCode::JointBound;
            self.previous_joint_velocity = DVector::zeros(self.joints.len());
            halt_trajectory(
                &self.joint_names,
                self.original_positions.as_slice(),
                &self.parameters,
            )
        };
        if self.parameters.use_redundant_waypoints {
            insert_redundant_points_into_trajectory(
                &mut trajectory,
                self.parameters.num_redundant_waypoints,
                publish_period,
            );
        }
        self.outgoing_trajectory = trajectory;

        if status != StatusCode::NoWarning && self.throttles.status.ready() {
            warn!("{}", status);
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, Isometry3};
    use std::time::Duration;

    use crate::jog::control_loop::{worst_case_stop_time, ControlLoop, JogState};
    use crate::jog::parameters::{CommandInType, JogParameters};
    use crate::jog::shared_state::SharedControlState;
    use crate::jog::status::StatusCode;
    use crate::jog::trajectory::OutgoingCommand;
    use crate::jog::types::{CartesianCommand, JointJogCommand, JointState, Twist};
    use crate::model::{JointBounds, JointModel, Limits, MockKinematicsProvider};

    const NOW: Duration = Duration::from_secs(100);

    fn names() -> Vec<String> {
        (1..=6).map(|i| format!("joint{}", i)).collect()
    }

    fn identity_kinematics(bounds: JointBounds) -> MockKinematicsProvider {
        let joints: Vec<JointModel> = names()
            .into_iter()
            .map(|name| JointModel::new(name, bounds.clone()))
            .collect();
        let mut kinematics = MockKinematicsProvider::new();
        kinematics
            .expect_active_joints()
            .returning(move || joints.clone());
        kinematics
            .expect_jacobian()
            .returning(|_| Ok(DMatrix::identity(6, 6)));
        kinematics
            .expect_global_link_transform()
            .returning(|_, _| Ok(Isometry3::identity()));
        kinematics
            .expect_satisfies_position_bounds()
            .returning(|joint, position, margin| {
                joint.bounds.satisfies_position_bounds(position, margin)
            });
        kinematics
    }

    fn parameters(num_outgoing_halt_msgs_to_publish: u32) -> JogParameters {
        JogParameters {
            publish_period: 0.01,
            linear_scale: 1.,
            planning_frame: "base_link".to_string(),
            robot_link_command_frame: "base_link".to_string(),
            num_outgoing_halt_msgs_to_publish,
            ..Default::default()
        }
    }

    fn telemetry(positions: [f64; 6]) -> JointState {
        let mut joint_names = names();
        joint_names.push("gripper_finger".to_string());
        let mut positions = positions.to_vec();
        positions.push(0.04);
        JointState::new(joint_names, positions, vec![0.; 7])
    }

    fn moving_twist() -> CartesianCommand {
        CartesianCommand::new("", NOW, Twist::new([0.1, 0., 0.], [0.; 3]))
    }

    fn started_loop(
        parameters: JogParameters,
        bounds: JointBounds,
        positions: [f64; 6],
    ) -> (ControlLoop<MockKinematicsProvider>, SharedControlState) {
        let shared = SharedControlState::new();
        let mut control_loop = ControlLoop::new(parameters, identity_kinematics(bounds)).unwrap();
        shared.on_telemetry(telemetry(positions));
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::WaitingForFirstCommand);
        assert!(output.command.is_none());
        (control_loop, shared)
    }

    fn first_positions(command: &Option<OutgoingCommand>) -> Vec<f64> {
        match command {
            Some(OutgoingCommand::Trajectory(trajectory)) => {
                trajectory.points[0].positions.clone().unwrap()
            }
            other => panic!("expected a trajectory but got {:?}", other),
        }
    }

    #[test]
    fn incomplete_telemetry_keeps_loop_uninitialized() {
        let shared = SharedControlState::new();
        let mut control_loop =
            ControlLoop::new(parameters(4), identity_kinematics(JointBounds::default())).unwrap();
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Uninitialized);
        shared.on_telemetry(JointState::with_names(vec!["joint1".to_string()]));
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Uninitialized);
        assert!(output.command.is_none());
        assert!(!control_loop.is_initialized());
    }

    #[test]
    fn identity_jacobian_end_to_end() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(moving_twist());
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Idle);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Active);
        assert_eq!(output.status, Some(StatusCode::NoWarning));
        assert!(output.ok_to_publish);
        // velocity of the unfiltered increment 0.001 over 0.01 s
        assert!(f64::abs(control_loop.previous_joint_velocity()[0] - 0.1) < 1e-9);
        for i in 1..6 {
            assert!(f64::abs(control_loop.previous_joint_velocity()[i]) < 1e-9);
        }
        let positions = first_positions(&output.command);
        assert!(positions[0] > 0. && positions[0] < 0.001);
        assert_eq!(positions.len(), 6);
    }

    #[test]
    fn halt_messages_stop_after_threshold() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(CartesianCommand::new("", NOW, Twist::default()));
        control_loop.tick(&shared, NOW);
        for _ in 0..5 {
            let output = control_loop.tick(&shared, NOW);
            assert!(output.command.is_some());
            assert!(output.ok_to_publish);
            assert_eq!(output.state, JogState::Idle);
        }
        for _ in 0..3 {
            let output = control_loop.tick(&shared, NOW);
            assert!(output.command.is_none());
            assert!(!output.ok_to_publish);
        }
        assert!(!shared.feedback().ok_to_publish);

        shared.on_cartesian(moving_twist());
        let output = control_loop.tick(&shared, NOW);
        assert!(output.command.is_some());
        assert!(output.ok_to_publish);
    }

    #[test]
    fn zero_halt_threshold_publishes_forever() {
        let (mut control_loop, shared) =
            started_loop(parameters(0), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(CartesianCommand::new("", NOW, Twist::default()));
        control_loop.tick(&shared, NOW);
        for _ in 0..100 {
            let output = control_loop.tick(&shared, NOW);
            assert!(output.command.is_some());
            assert!(output.ok_to_publish);
        }
    }

    #[test]
    fn nan_keeps_previous_command() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(moving_twist());
        control_loop.tick(&shared, NOW);
        control_loop.tick(&shared, NOW);
        let previous = control_loop.outgoing_trajectory().clone();

        shared.on_cartesian(CartesianCommand::new(
            "",
            NOW,
            Twist::new([f64::NAN, 0., 0.], [0.; 3]),
        ));
        let output = control_loop.tick(&shared, NOW);
        assert!(output.command.is_none());
        assert_eq!(output.status, None);
        assert_eq!(control_loop.outgoing_trajectory(), &previous);
    }

    #[test]
    fn unitless_out_of_range_is_rejected() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(CartesianCommand::new(
            "",
            NOW,
            Twist::new([1.5, 0., 0.], [0.; 3]),
        ));
        control_loop.tick(&shared, NOW);
        let output = control_loop.tick(&shared, NOW);
        assert!(output.command.is_none());
        assert!(f64::abs(control_loop.previous_joint_velocity()[0]) < 1e-12);
    }

    #[test]
    fn stale_command_is_not_converted() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(moving_twist());
        control_loop.tick(&shared, NOW);
        control_loop.tick(&shared, NOW);
        let previous = control_loop.outgoing_trajectory().clone();

        let later = NOW + Duration::from_secs(1);
        let output = control_loop.tick(&shared, later);
        assert!(output.command_is_stale);
        assert_eq!(output.status, None);
        assert_eq!(control_loop.outgoing_trajectory(), &previous);
        assert!(shared.feedback().command_is_stale);
    }

    #[test]
    fn resume_starts_at_live_position() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_cartesian(moving_twist());
        for _ in 0..10 {
            control_loop.tick(&shared, NOW);
        }
        shared.set_paused(true);
        shared.on_telemetry(telemetry([0.5, -0.5, 0.2, 0., 0.1, 0.3]));
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Paused);
        assert!(output.command.is_none());

        shared.set_paused(false);
        shared.set_collision_velocity_scale(0.);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.status, Some(StatusCode::HaltForCollision));
        assert_eq!(output.state, JogState::Halted);
        let positions = first_positions(&output.command);
        let live = [0.5, -0.5, 0.2, 0., 0.1, 0.3];
        for (position, expected) in positions.iter().zip(live.iter()) {
            assert!(f64::abs(position - expected) < 1e-12);
        }

        // first moving cycle after a pause: filter seeded at the live position
        shared.set_paused(true);
        let moved = [0.2, 0.1, -0.3, 0.4, 0., -0.1];
        shared.on_telemetry(telemetry(moved));
        control_loop.tick(&shared, NOW);
        shared.set_paused(false);
        shared.set_collision_velocity_scale(1.);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.status, Some(StatusCode::NoWarning));
        assert_eq!(output.state, JogState::Active);
        let positions = first_positions(&output.command);
        assert!(f64::abs(positions[0] - (moved[0] + 0.001 / 3.)) < 1e-12);
        for i in 1..6 {
            assert!(f64::abs(positions[i] - moved[i]) < 1e-12);
        }
    }

    #[test]
    fn command_sent_before_telemetry_is_executed() {
        let shared = SharedControlState::new();
        let mut control_loop =
            ControlLoop::new(parameters(4), identity_kinematics(JointBounds::default())).unwrap();
        shared.on_telemetry(telemetry([0.; 6]));
        shared.on_cartesian(moving_twist());
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::WaitingForFirstCommand);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Idle);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.state, JogState::Active);
        assert_eq!(output.status, Some(StatusCode::NoWarning));
        assert!(f64::abs(control_loop.previous_joint_velocity()[0] - 0.1) < 1e-9);
    }

    #[test]
    fn outdated_command_before_telemetry_is_dropped() {
        let shared = SharedControlState::new();
        let mut control_loop =
            ControlLoop::new(parameters(4), identity_kinematics(JointBounds::default())).unwrap();
        shared.on_telemetry(telemetry([0.; 6]));
        shared.on_cartesian(moving_twist());
        let later = NOW + Duration::from_secs(1);
        control_loop.tick(&shared, later);
        assert!(!shared.snapshot().have_nonzero_cartesian_command);
        control_loop.tick(&shared, later);
        let output = control_loop.tick(&shared, later);
        assert_eq!(output.state, JogState::Idle);
        assert_eq!(output.status, None);
    }

    #[test]
    fn acceleration_baseline_restarts_from_rest() {
        let bounds = JointBounds {
            acceleration: Some(Limits::symmetric(10.)),
            ..Default::default()
        };
        let parameters = JogParameters {
            command_in_type: CommandInType::SpeedUnits,
            ..parameters(4)
        };
        let (mut control_loop, shared) = started_loop(parameters, bounds, [0.; 6]);
        let joint_jog = |velocity: f64| {
            JointJogCommand::new(vec!["joint1".to_string()], vec![velocity], NOW)
        };
        // 10 rad/s^2 over 0.01 s
        let max_velocity_step = 0.1 + 1e-9;

        for pause in [false, true] {
            shared.on_joint_jog(joint_jog(1.));
            for _ in 0..30 {
                let previous = control_loop.previous_joint_velocity()[0];
                control_loop.tick(&shared, NOW);
                let velocity = control_loop.previous_joint_velocity()[0];
                assert!(f64::abs(velocity - previous) <= max_velocity_step);
            }
            assert!(control_loop.previous_joint_velocity()[0] > 0.5);

            if pause {
                shared.set_paused(true);
                let output = control_loop.tick(&shared, NOW);
                assert_eq!(output.state, JogState::Paused);
                shared.set_paused(false);
            } else {
                shared.on_joint_jog(joint_jog(0.));
                let output = control_loop.tick(&shared, NOW);
                assert_eq!(output.state, JogState::Idle);
            }
            assert!(control_loop
                .previous_joint_velocity()
                .iter()
                .all(|velocity| *velocity == 0.));

            shared.on_joint_jog(joint_jog(1.));
            control_loop.tick(&shared, NOW);
            let velocity = control_loop.previous_joint_velocity()[0];
            assert!(velocity > 0. && velocity <= max_velocity_step);
        }
    }

    #[test]
    fn joint_bound_is_reported_in_same_cycle() {
        let bounds = JointBounds {
            position: Some(Limits::new(-1., 1.)),
            ..Default::default()
        };
        let (mut control_loop, shared) =
            started_loop(parameters(4), bounds, [0.95, 0., 0., 0., 0., 0.]);
        shared.on_cartesian(moving_twist());
        control_loop.tick(&shared, NOW);
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.status, Some(StatusCode::JointBound));
        assert_eq!(output.state, JogState::Halted);
        let positions = first_positions(&output.command);
        assert!(f64::abs(positions[0] - 0.95) < 1e-12);
        assert!(control_loop
            .previous_joint_velocity()
            .iter()
            .all(|velocity| *velocity == 0.));
        assert_eq!(shared.feedback().status, StatusCode::JointBound);

        // moving away from the bound is allowed
        shared.on_cartesian(CartesianCommand::new(
            "",
            NOW,
            Twist::new([-0.1, 0., 0.], [0.; 3]),
        ));
        let output = control_loop.tick(&shared, NOW);
        assert_eq!(output.status, Some(StatusCode::NoWarning));
        assert_eq!(output.state, JogState::Active);
    }

    #[test]
    fn cartesian_command_has_priority() {
        let (mut control_loop, shared) =
            started_loop(parameters(4), JointBounds::default(), [0.; 6]);
        shared.on_joint_jog(JointJogCommand::new(
            vec!["joint3".to_string()],
            vec![0.5],
            NOW,
        ));
        control_loop.tick(&shared, NOW);
        control_loop.tick(&shared, NOW);
        // 0.5 * joint_scale 0.5 * 0.01 s over 0.01 s
        assert!(f64::abs(control_loop.previous_joint_velocity()[2] - 0.25) < 1e-9);

        shared.on_cartesian(moving_twist());
        control_loop.tick(&shared, NOW);
        assert!(f64::abs(control_loop.previous_joint_velocity()[0] - 0.1) < 1e-9);
        assert!(f64::abs(control_loop.previous_joint_velocity()[2]) < 1e-9);
    }

    #[test]
    fn worst_case_stop_time_test() {
        let joints = vec![
            JointModel::new(
                "joint1",
                JointBounds {
                    acceleration: Some(Limits::new(-2., 4.)),
                    ..Default::default()
                },
            ),
            JointModel::new("joint2", JointBounds::default()),
            JointModel::new(
                "joint3",
                JointBounds {
                    acceleration: Some(Limits::symmetric(10.)),
                    ..Default::default()
                },
            ),
        ];
        let joint_state = JointState::new(
            vec![
                "joint1".to_string(),
                "joint2".to_string(),
                "joint3".to_string(),
                "other".to_string(),
            ],
            vec![0.; 4],
            vec![-1., 5., 1., 100.],
        );
        let (stop_time, skipped) = worst_case_stop_time(&joints, &joint_state);
        assert!(f64::abs(stop_time - 0.5) < 1e-12);
        assert_eq!(skipped, vec!["joint2".to_string()]);
    }
}
