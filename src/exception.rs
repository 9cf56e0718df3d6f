// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use thiserror::Error;

/// Represents all kind of errors which can occur while jogging.
///
/// Apart from [`ConfigException`](`Self::ConfigException`) and
/// [`RealTimeException`](`Self::RealTimeException`) none of them are fatal. The jogging loop
/// logs them and continues with the next cycle.
#[derive(Error, Debug)]
pub enum JogException {
    /// ConfigException is thrown if the jogging parameters cannot be loaded or are inconsistent.
    #[error("{message:?}")]
    ConfigException { message: String },

    /// KinematicsException is thrown if the kinematics provider cannot answer a query,
    /// e.g. because a frame is unknown.
    #[error("{message:?}")]
    KinematicsException { message: String },

    /// CommandException is thrown if an incoming command is rejected, e.g. because it
    /// contains NaN or is out of range.
    #[error("{message:?}")]
    CommandException { message: String },

    /// DimensionMismatch is thrown if two vectors which must have the same length do not.
    #[error("Dimension mismatch: expected {expected} entries but got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// RealTimeException is thrown if the real-time priority cannot be set
    #[error("{message:?}")]
    RealTimeException { message: String },

    /// ThreadException is thrown if the jogging thread cannot be started or joined.
    #[error("{message:?}")]
    ThreadException { message: String },
}

/// creates a CommandException from a static string slice
pub(crate) fn create_command_exception(message: &'static str) -> JogException {
    JogException::CommandException {
        message: message.to_string(),
    }
}

/// creates a ConfigException from anything which can be turned into a String
pub(crate) fn create_config_exception<S: Into<String>>(message: S) -> JogException {
    JogException::ConfigException {
        message: message.into(),
    }
}

/// creates a KinematicsException from anything which can be turned into a String
pub(crate) fn create_kinematics_exception<S: Into<String>>(message: S) -> JogException {
    JogException::KinematicsException {
        message: message.into(),
    }
}

/// Result type which can have JogException as Error
pub type JogResult<T> = Result<T, JogException>;
