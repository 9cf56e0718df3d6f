// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the state shared between the command producers and the jogging loop.
//!
//! Producers never block the loop. Every write publishes a new immutable [`IntakeData`]
//! snapshot, and the loop loads exactly one snapshot per cycle. In the other direction the
//! loop publishes a [`LoopFeedback`] once per cycle.
use arc_swap::ArcSwap;
use nalgebra::Isometry3;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::jog::status::StatusCode;
use crate::jog::types::{CartesianCommand, JointJogCommand, JointState};

/// Latest inputs of all producers.
#[derive(Debug, Clone)]
pub struct IntakeData {
    /// latest joint telemetry
    pub joint_state: Option<Arc<JointState>>,
    /// latest Cartesian command
    pub cartesian_command: Option<Arc<CartesianCommand>>,
    /// latest joint command
    pub joint_command: Option<Arc<JointJogCommand>>,
    /// true if the latest Cartesian command has a non-zero component
    pub have_nonzero_cartesian_command: bool,
    /// true if the latest joint command has a non-zero velocity
    pub have_nonzero_joint_command: bool,
    /// newest non-zero stamp of any command
    pub latest_command_stamp: Duration,
    /// incremented with every command
    pub command_sequence: u64,
    /// Cartesian dimensions which may be commanded
    pub control_dimensions: [bool; 6],
    /// Cartesian dimensions which may drift
    pub drift_dimensions: [bool; 6],
    /// scale in \[0, 1\] from the collision proximity feed
    pub collision_velocity_scale: f64,
}

impl Default for IntakeData {
    fn default() -> Self {
        IntakeData {
            joint_state: None,
            cartesian_command: None,
            joint_command: None,
            have_nonzero_cartesian_command: false,
            have_nonzero_joint_command: false,
            latest_command_stamp: Duration::ZERO,
            command_sequence: 0,
            control_dimensions: [true; 6],
            drift_dimensions: [false; 6],
            collision_velocity_scale: 1.,
        }
    }
}

impl IntakeData {
    /// true if the newest command is older than `timeout`.
    pub fn command_is_stale(&self, now: Duration, timeout: Duration) -> bool {
        now.saturating_sub(self.latest_command_stamp) >= timeout
    }

    /// true if no command with a non-zero stamp has been received yet.
    pub fn waiting_for_first_command(&self) -> bool {
        let cartesian_stamp = self
            .cartesian_command
            .as_ref()
            .map_or(Duration::ZERO, |command| command.stamp);
        let joint_stamp = self
            .joint_command
            .as_ref()
            .map_or(Duration::ZERO, |command| command.stamp);
        cartesian_stamp.is_zero() && joint_stamp.is_zero()
    }
}

/// Values published by the jogging loop once per cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopFeedback {
    /// status of the last converted cycle
    pub status: StatusCode,
    /// true while the loop publishes commands
    pub ok_to_publish: bool,
    /// true if the newest command is too old to be executed
    pub command_is_stale: bool,
    /// time in \[s\] the joints need at least to come to a stop
    pub worst_case_stop_time: f64,
    /// transform from the planning frame to the robot link command frame
    pub command_frame_transform: Option<Isometry3<f64>>,
}

/// State shared between any number of producers and the single jogging loop.
#[derive(Debug, Default)]
pub struct SharedControlState {
    intake: ArcSwap<IntakeData>,
    feedback: ArcSwap<LoopFeedback>,
    paused: AtomicBool,
    stop_requested: AtomicBool,
}

impl SharedControlState {
    /// Creates a new SharedControlState without any inputs.
    pub fn new() -> Self {
        SharedControlState::default()
    }

    /// Stores the latest joint telemetry.
    pub fn on_telemetry(&self, joint_state: JointState) {
        let joint_state = Arc::new(joint_state);
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.joint_state = Some(joint_state.clone());
            next
        });
    }

    /// Stores the latest Cartesian command.
    ///
    /// The freshness stamp is only updated if the command carries a non-zero stamp.
    pub fn on_cartesian(&self, command: CartesianCommand) {
        let have_nonzero = command.is_non_zero();
        let stamp = command.stamp;
        let command = Arc::new(command);
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.cartesian_command = Some(command.clone());
            next.have_nonzero_cartesian_command = have_nonzero;
            if !stamp.is_zero() {
                next.latest_command_stamp = stamp;
            }
            next.command_sequence = current.command_sequence.wrapping_add(1);
            next
        });
    }

    /// Stores the latest joint command.
    ///
    /// The freshness stamp is only updated if the command carries a non-zero stamp.
    pub fn on_joint_jog(&self, command: JointJogCommand) {
        let have_nonzero = command.is_non_zero();
        let stamp = command.stamp;
        let command = Arc::new(command);
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.joint_command = Some(command.clone());
            next.have_nonzero_joint_command = have_nonzero;
            if !stamp.is_zero() {
                next.latest_command_stamp = stamp;
            }
            next.command_sequence = current.command_sequence.wrapping_add(1);
            next
        });
    }

    /// Sets which Cartesian dimensions may be commanded.
    pub fn set_control_dimensions(&self, control_dimensions: [bool; 6]) {
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.control_dimensions = control_dimensions;
            next
        });
    }

    /// Sets which Cartesian dimensions may drift.
    pub fn set_drift_dimensions(&self, drift_dimensions: [bool; 6]) {
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.drift_dimensions = drift_dimensions;
            next
        });
    }

    /// Sets the collision velocity scale, clamped to \[0, 1\]. NaN is treated as 0.
    pub fn set_collision_velocity_scale(&self, scale: f64) {
        let scale = if scale.is_nan() { 0. } else { scale.clamp(0., 1.) };
        self.intake.rcu(|current| {
            let mut next = IntakeData::clone(current);
            next.collision_velocity_scale = scale;
            next
        });
    }

    /// Gets the latest inputs as one consistent snapshot.
    pub fn snapshot(&self) -> Arc<IntakeData> {
        self.intake.load_full()
    }

    /// Clears both non-zero flags unless a new command arrived after the snapshot with
    /// `sequence` was taken.
    pub fn clear_nonzero_flags(&self, sequence: u64) {
        self.intake.rcu(|current| {
            if current.command_sequence != sequence {
                return Arc::clone(current);
            }
            let mut next = IntakeData::clone(current);
            next.have_nonzero_cartesian_command = false;
            next.have_nonzero_joint_command = false;
            Arc::new(next)
        });
    }

    /// Publishes the feedback of one cycle.
    pub fn publish_feedback(&self, feedback: LoopFeedback) {
        self.feedback.store(Arc::new(feedback));
    }

    /// Gets the latest feedback of the loop.
    pub fn feedback(&self) -> Arc<LoopFeedback> {
        self.feedback.load_full()
    }

    /// Pauses or resumes jogging.
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    /// true while jogging is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Asks the loop to stop.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Withdraws a stop request so the loop can be started again.
    pub fn clear_stop_request(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// true if the loop should stop.
    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::jog::shared_state::SharedControlState;
    use crate::jog::types::{CartesianCommand, JointJogCommand, JointState, Twist};

    #[test]
    fn zero_stamp_keeps_freshness() {
        let shared = SharedControlState::new();
        let moving = Twist::new([0.1, 0., 0.], [0.; 3]);
        shared.on_cartesian(CartesianCommand::new("", Duration::from_secs(5), moving));
        shared.on_cartesian(CartesianCommand::new("", Duration::ZERO, moving));
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.latest_command_stamp, Duration::from_secs(5));
        assert!(snapshot.have_nonzero_cartesian_command);
        assert_eq!(snapshot.command_sequence, 2);
    }

    #[test]
    fn staleness() {
        let shared = SharedControlState::new();
        shared.on_joint_jog(JointJogCommand::new(
            vec!["joint1".to_string()],
            vec![0.1],
            Duration::from_millis(1000),
        ));
        let snapshot = shared.snapshot();
        let timeout = Duration::from_millis(100);
        assert!(!snapshot.command_is_stale(Duration::from_millis(1050), timeout));
        assert!(snapshot.command_is_stale(Duration::from_millis(1100), timeout));
        assert!(!snapshot.waiting_for_first_command());
        assert!(SharedControlState::new().snapshot().waiting_for_first_command());
    }

    #[test]
    fn clearing_flags_never_loses_a_new_command() {
        let shared = SharedControlState::new();
        let moving = Twist::new([0., 0., 0.1], [0.; 3]);
        shared.on_cartesian(CartesianCommand::new("", Duration::from_secs(1), moving));
        let sequence = shared.snapshot().command_sequence;
        shared.on_cartesian(CartesianCommand::new("", Duration::from_secs(2), moving));
        shared.clear_nonzero_flags(sequence);
        assert!(shared.snapshot().have_nonzero_cartesian_command);

        let sequence = shared.snapshot().command_sequence;
        shared.clear_nonzero_flags(sequence);
        assert!(!shared.snapshot().have_nonzero_cartesian_command);
    }

    #[test]
    fn collision_scale_is_clamped() {
        let shared = SharedControlState::new();
        assert!(f64::abs(shared.snapshot().collision_velocity_scale - 1.) < 1e-12);
        shared.set_collision_velocity_scale(1.7);
        assert!(f64::abs(shared.snapshot().collision_velocity_scale - 1.) < 1e-12);
        shared.set_collision_velocity_scale(-0.2);
        assert!(f64::abs(shared.snapshot().collision_velocity_scale) < 1e-12);
        shared.set_collision_velocity_scale(f64::NAN);
        assert!(f64::abs(shared.snapshot().collision_velocity_scale) < 1e-12);
    }

    #[test]
    fn concurrent_producers() {
        let shared = Arc::new(SharedControlState::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for j in 0..250 {
                        if i % 2 == 0 {
                            shared.on_joint_jog(JointJogCommand::new(
                                vec!["joint1".to_string()],
                                vec![0.1],
                                Duration::from_millis(j + 1),
                            ));
                        } else {
                            shared.on_telemetry(JointState::with_names(vec![
                                "joint1".to_string()
                            ]));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = shared.snapshot();
        assert_eq!(snapshot.command_sequence, 500);
        assert!(snapshot.joint_state.is_some());
    }
}
