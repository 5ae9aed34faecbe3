//! Published parameters and the sink they are written to.
//!
//! The controller never owns the parameter store. It is handed a
//! [`ParamSink`] at configure time and publishes per-axis values into it;
//! values become visible to observers after [`ParamSink::call_callbacks`].

use serde::{Deserialize, Serialize};

/// Parameters published by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    /// Motor position in steps (double).
    Position,
    /// Encoder position (double).
    EncoderPosition,
    /// Last commanded direction, 1 = positive.
    Direction,
    /// Encoder detected and in use.
    HasEncoder,
    /// Motion complete.
    Done,
    /// High limit switch.
    HighLimit,
    /// Home switch.
    Home,
    /// Driver fault.
    Problem,
    /// Low limit switch.
    LowLimit,
    /// Aux power output.
    PowerControl,
    /// Brake output.
    BrakeControl,
    /// Firmware version decoded from the PROM.
    FirmwareVersion,
    /// Move-all request, stored only.
    MoveAll,
}

impl Param {
    /// Controller-level parameters registered once at configure time.
    pub const CONTROLLER: [Param; 4] = [
        Param::PowerControl,
        Param::BrakeControl,
        Param::FirmwareVersion,
        Param::MoveAll,
    ];

    /// Name the parameter is registered under.
    pub fn name(self) -> &'static str {
        match self {
            Param::Position => "MOTOR_POSITION",
            Param::EncoderPosition => "MOTOR_ENCODER_POSITION",
            Param::Direction => "MOTOR_STATUS_DIRECTION",
            Param::HasEncoder => "MOTOR_STATUS_HAS_ENCODER",
            Param::Done => "MOTOR_STATUS_DONE",
            Param::HighLimit => "MOTOR_STATUS_HIGH_LIMIT",
            Param::Home => "MOTOR_STATUS_HOME",
            Param::Problem => "MOTOR_STATUS_PROBLEM",
            Param::LowLimit => "MOTOR_STATUS_LOW_LIMIT",
            Param::PowerControl => "HY8601_POWER",
            Param::BrakeControl => "HY8601_BRAKE",
            Param::FirmwareVersion => "HY8601_FIRMWARE",
            Param::MoveAll => "HY8601_MOVE_ALL",
        }
    }
}

/// Capability the controller publishes through.
///
/// Implementations must be cheap to call under the device lock and must not
/// call back into the controller.
pub trait ParamSink: Send + Sync {
    /// Register a parameter. Optional for sinks that accept any name.
    fn create_param(&self, _param: Param) {}

    fn set_integer(&self, axis: usize, param: Param, value: i32);

    fn set_double(&self, axis: usize, param: Param, value: f64);

    /// Last integer value, `None` if never set.
    fn get_integer(&self, axis: usize, param: Param) -> Option<i32>;

    /// Last double value, `None` if never set.
    fn get_double(&self, axis: usize, param: Param) -> Option<f64>;

    /// Make pending sets for `axis` visible to observers.
    fn call_callbacks(&self, axis: usize);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let all = [
            Param::Position,
            Param::EncoderPosition,
            Param::Direction,
            Param::HasEncoder,
            Param::Done,
            Param::HighLimit,
            Param::Home,
            Param::Problem,
            Param::LowLimit,
            Param::PowerControl,
            Param::BrakeControl,
            Param::FirmwareVersion,
            Param::MoveAll,
        ];
        let names: HashSet<_> = all.iter().map(|p| p.name()).collect();
        assert_eq!(names.len(), all.len());
    }
}
