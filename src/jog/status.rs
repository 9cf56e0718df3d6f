// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later
//! Defines the status codes reported by the jogger.
use std::fmt::{Debug, Display, Formatter, Result};

use num_derive::{FromPrimitive, ToPrimitive};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Status of the jogger, reported once per converted cycle.
///
/// The integer values are stable and may be sent over the wire as is.
#[derive(Serialize_repr, Deserialize_repr, Debug, PartialEq, Eq, Copy, Clone)]
#[repr(i8)]
#[derive(FromPrimitive, ToPrimitive)]
pub enum StatusCode {
    /// Everything is fine.
    NoWarning = 0,
    /// The collision proximity feed asks to slow down.
    DecelerateForCollision = 1,
    /// The collision proximity feed asks to stop.
    HaltForCollision = 2,
    /// The commanded motion approaches a singularity and is slowed down.
    DecelerateForSingularity = 3,
    /// The commanded motion would pass the singularity hard stop threshold.
    HaltForSingularity = 4,
    /// A joint is close to a position limit and the command moves it further towards it.
    JointBound = 5,
}

impl Default for StatusCode {
    fn default() -> Self {
        StatusCode::NoWarning
    }
}

impl StatusCode {
    /// true for all codes which stop the motion.
    pub fn is_halt(&self) -> bool {
        matches!(
            self,
            StatusCode::HaltForCollision | StatusCode::HaltForSingularity | StatusCode::JointBound
        )
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            StatusCode::NoWarning => write!(f, "No warnings"),
            StatusCode::DecelerateForCollision => write!(f, "Close to a collision, decelerating"),
            StatusCode::HaltForCollision => write!(f, "Collision detected, emergency stop"),
            StatusCode::DecelerateForSingularity => {
                write!(f, "Close to a singularity, decelerating")
            }
            StatusCode::HaltForSingularity => write!(f, "Very close to a singularity, emergency stop"),
            StatusCode::JointBound => write!(f, "Close to a joint bound (position or velocity), halting"),
        }
    }
}
