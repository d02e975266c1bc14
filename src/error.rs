//! Crate-wide error type.
//!
//! One variant per error kind named in the control-plane specification,
//! grouped the same way: state, configuration, transport, device, handle.

use thiserror::Error;

/// Every fallible outcome a `Task` (or a free `program`/`config` helper) can
/// produce. Mirrors the original DLL's `ErrCode` table one-to-one so that an
/// ABI shim built on top of this crate can map variants back to integers
/// without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvmuError {
    // --- State ---
    #[error("task is not in the required state for this operation")]
    WrongState,
    #[error("task is not in the program type (sync/async) required for this operation")]
    WrongProgramType,

    // --- Configuration ---
    #[error("attenuation value is not valid for this hardware")]
    BadAtten,
    #[error("hop rate is not valid")]
    BadHop,
    #[error("path is not measured, or is not a valid path pair")]
    BadPath,
    #[error("IP address or port is not valid")]
    BadIpPort,
    #[error("no IP address has been set")]
    MissingIp,
    #[error("no port has been set")]
    MissingPort,
    #[error("no hop rate has been set")]
    MissingHop,
    #[error("switchboard requires an attenuation value and none was set")]
    MissingAtten,
    #[error("no frequencies have been set")]
    MissingFreqs,
    #[error("frequency is outside the hardware's tunable range")]
    FreqOutOfBounds,
    #[error("requested more points than the hardware supports")]
    TooManyPoints,
    #[error("one of the specified parameters is not valid")]
    InvalidParameter,
    #[error("no paths have been added to measure")]
    NoPathsMeasured,
    #[error("path has already been added to the measured set")]
    PathAlreadyMeasured,
    #[error("hardware feature is not present on this unit")]
    FeatureNotPresent,
    #[error("hardware has no attenuator present")]
    NoAttenPresent,
    #[error("index is out of bounds")]
    IndexOutOfBounds,

    // --- Transport ---
    #[error("socket error")]
    Socket,
    #[error("no response from the unit within the timeout")]
    NoResponse,
    #[error("frame length or checksum mismatch")]
    Bytes,
    #[error("operation was interrupted from another thread")]
    Interrupted,

    // --- Device ---
    #[error("PROM was not in a recognized format")]
    BadProm,
    #[error("PROM appears to be empty")]
    EmptyProm,
    #[error("PROM reports a hardware feature this version does not know about")]
    UnknownFeature,
    #[error("PROM feature flags are internally inconsistent")]
    PromInvalidFeatureConfiguration,
    #[error("generated program exceeds the device's instruction memory")]
    ProgOverflow,
    #[error("calibration data is invalid")]
    BadCal,

    // --- Handle / batch ---
    #[error("task handle is not valid")]
    BadHandle,
    #[error("task array is not valid for a batch operation")]
    TaskArrayInvalid,
    #[error("no data was acquired for the requested path")]
    PathHasNoData,
}

pub type Result<T> = std::result::Result<T, AvmuError>;
