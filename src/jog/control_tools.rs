// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Helpers for running the jogging thread with real-time priority.
use std::path::Path;

use crate::exception::{JogException, JogResult};

/// Decides whether the jogging thread has to run with real-time priority.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RealtimeConfig {
    /// fail to start if the thread cannot get real-time priority
    Enforce,
    /// run with the default scheduler
    #[default]
    Ignore,
}

/// Determines whether the current OS kernel is a realtime kernel.
///
/// On Linux, this checks for the existence of `/sys/kernel/realtime`.
pub fn has_realtime_kernel() -> bool {
    Path::new("/sys/kernel/realtime").exists()
}

fn realtime_exception(message: &str) -> JogException {
    JogException::RealTimeException {
        message: format!("jog-arm-rs: {}", message),
    }
}

/// Sets the current thread to the highest possible scheduler priority and locks its memory.
///
/// # Errors
/// * RealTimeException if realtime priority cannot be set for the current thread.
///
/// If the method returns an Error please check your /etc/security/limits.conf file
/// There should be a line like this:
/// ```text
///operator         -       rtprio          99
/// ```
pub fn set_current_thread_to_highest_scheduler_priority() -> JogResult<()> {
    unsafe {
        let max_priority = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if max_priority == -1 {
            return Err(realtime_exception(
                "unable to get maximum possible thread priority",
            ));
        }
        // one below the maximum
        let thread_param = libc::sched_param {
            sched_priority: max_priority - 1,
        };
        if libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &thread_param) != 0 {
            return Err(realtime_exception("unable to set realtime scheduling"));
        }
        if libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) != 0 {
            return Err(realtime_exception("unable to lock memory"));
        }
    }
    Ok(())
}

/// Applies the [`RealtimeConfig`] to the calling thread.
///
/// # Errors
/// * RealTimeException if `config` is [`Enforce`](`RealtimeConfig::Enforce`) and the kernel
/// has no realtime capabilities or the priority cannot be set.
pub fn apply_realtime_config(config: RealtimeConfig) -> JogResult<()> {
    match config {
        RealtimeConfig::Ignore => Ok(()),
        RealtimeConfig::Enforce => {
            if has_realtime_kernel() {
                set_current_thread_to_highest_scheduler_priority()
            } else {
                Err(realtime_exception(
                    "Running kernel does not have realtime capabilities.",
                ))
            }
        }
    }
}
