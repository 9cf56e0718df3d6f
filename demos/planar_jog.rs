// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
use nalgebra::{DMatrix, DVector, Isometry3, Translation3, UnitQuaternion, Vector3};
use tracing::info;
use tracing_subscriber::EnvFilter;

use jog_arm::{
    now_since_epoch, CartesianCommand, CommandPublisher, JogException, JogParameters, JogResult,
    JogServer, JointBounds, JointModel, JointState, KinematicsProvider, Limits, OutgoingCommand,
    RealtimeConfig, StatusCode, Twist,
};

/// An example jogging a simulated planar arm with three revolute joints.
///
/// The arm moves in the x-y plane of `base_link`. The z, roll and pitch dimensions are allowed
/// to drift because the arm cannot move in them.
#[derive(Parser, Debug)]
#[clap(author, version, name = "planar_jog")]
struct CommandLineArguments {
    /// Linear velocity command in x, unitless in [-1, 1]
    #[clap(long, default_value_t = 0.5)]
    pub vx: f64,
    /// Linear velocity command in y, unitless in [-1, 1]
    #[clap(long, default_value_t = 0.)]
    pub vy: f64,
    /// Duration of the motion in seconds
    #[clap(short, long, default_value_t = 2.)]
    pub duration: f64,
    /// Optional TOML file with jogging parameters
    #[clap(short, long)]
    pub config: Option<String>,
    /// Use this option to enforce realtime scheduling of the jogging thread
    #[clap(short, long, action)]
    pub realtime: bool,
}

const LINKS: [f64; 3] = [0.5, 0.4, 0.3];

struct PlanarArm;

fn link_angles(positions: &[f64]) -> [f64; 3] {
    let mut angles = [0.; 3];
    let mut angle = 0.;
    for (i, position) in positions.iter().take(3).enumerate() {
        angle += position;
        angles[i] = angle;
    }
    angles
}

impl KinematicsProvider for PlanarArm {
    fn active_joints(&self) -> Vec<JointModel> {
        (1..=3)
            .map(|i| {
                JointModel::new(
                    format!("joint{}", i),
                    JointBounds {
                        position: Some(Limits::symmetric(2.8)),
                        velocity: Some(Limits::symmetric(2.)),
                        acceleration: Some(Limits::symmetric(10.)),
                    },
                )
            })
            .collect()
    }

    fn jacobian(&self, positions: &DVector<f64>) -> JogResult<DMatrix<f64>> {
        let angles = link_angles(positions.as_slice());
        Ok(DMatrix::from_fn(6, 3, |row, column| match row {
            0 => -(column..3).map(|i| LINKS[i] * f64::sin(angles[i])).sum::<f64>(),
            1 => (column..3).map(|i| LINKS[i] * f64::cos(angles[i])).sum::<f64>(),
            5 => 1.,
            _ => 0.,
        }))
    }

    fn global_link_transform(
        &self,
        positions: &DVector<f64>,
        frame: &str,
    ) -> JogResult<Isometry3<f64>> {
        match frame {
            "base_link" => Ok(Isometry3::identity()),
            "tool0" => {
                let angles = link_angles(positions.as_slice());
                let x: f64 = (0..3).map(|i| LINKS[i] * f64::cos(angles[i])).sum();
                let y: f64 = (0..3).map(|i| LINKS[i] * f64::sin(angles[i])).sum();
                Ok(Isometry3::from_parts(
                    Translation3::new(x, y, 0.),
                    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), angles[2]),
                ))
            }
            _ => Err(JogException::KinematicsException {
                message: format!("unknown frame {}", frame),
            }),
        }
    }
}

/// Stands in for the robot controller and executes the first waypoint immediately.
struct SimulatedController {
    positions: Arc<Mutex<Vec<f64>>>,
}

impl CommandPublisher for SimulatedController {
    fn publish_command(&mut self, command: &OutgoingCommand) {
        let target = match command {
            OutgoingCommand::Trajectory(trajectory) => trajectory
                .points
                .first()
                .and_then(|point| point.positions.clone()),
            OutgoingCommand::MultiArray(data) => Some(data.clone()),
        };
        if let (Some(target), Ok(mut positions)) = (target, self.positions.lock()) {
            *positions = target;
        }
    }

    fn publish_status(&mut self, status: StatusCode) {
        if status != StatusCode::NoWarning {
            info!("status: {}", status);
        }
    }
}

fn main() -> JogResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = CommandLineArguments::parse();
    let parameters = match args.config.as_ref() {
        Some(path) => JogParameters::load_from_file(path)?,
        None => JogParameters {
            lower_singularity_threshold: 100.,
            hard_stop_singularity_threshold: 200.,
            ..Default::default()
        },
    };
    let period = Duration::from_secs_f64(parameters.publish_period);
    let realtime_config = if args.realtime {
        RealtimeConfig::Enforce
    } else {
        RealtimeConfig::Ignore
    };

    let positions = Arc::new(Mutex::new(vec![0.3, 0.6, 0.4]));
    let controller = SimulatedController {
        positions: positions.clone(),
    };
    let mut server = JogServer::new(parameters, PlanarArm, controller, realtime_config)?;
    server.change_drift_dimensions([false, false, true, true, true, false]);
    server.start()?;

    let names: Vec<String> = (1..=3).map(|i| format!("joint{}", i)).collect();
    let cycles = (args.duration / period.as_secs_f64()) as usize;
    for cycle in 0..cycles {
        let current = positions
            .lock()
            .map_err(|_| JogException::ThreadException {
                message: "the simulated controller panicked".to_string(),
            })?
            .clone();
        server.provide_joint_state(JointState::new(names.clone(), current.clone(), vec![0.; 3]));
        server.provide_twist_command(CartesianCommand::new(
            "base_link",
            now_since_epoch(),
            Twist::new([args.vx, args.vy, 0.], [0.; 3]),
        ));
        if cycle % 50 == 0 {
            let tip = PlanarArm.global_link_transform(&DVector::from_vec(current), "tool0")?;
            info!(
                "tip at x: {:.4} y: {:.4} status: {}",
                tip.translation.x,
                tip.translation.y,
                server.status()
            );
        }
        thread::sleep(period);
    }
    server.provide_twist_command(CartesianCommand::new(
        "base_link",
        now_since_epoch(),
        Twist::default(),
    ));
    thread::sleep(period * 10);
    info!(
        "Finished jogging, worst case stop time {:.3} s, last status: {}",
        server.worst_case_stop_time(),
        server.status()
    );
    server.stop()
}
