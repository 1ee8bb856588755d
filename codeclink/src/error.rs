// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for CodecLink operations.
//!
//! This module defines the error types returned by session and driver calls,
//! mapping raw bridge status codes to idiomatic Rust error enums.

use crate::session::LifecycleState;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when driving a codec session.
///
/// This enum maps bridge driver status codes to Rust error variants and
/// includes additional error types for host-side failures (e.g., loading the
/// driver library, lifecycle violations, queue exhaustion).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unknown or unrecognized driver status code.
    #[error("Unknown driver error: {0}")]
    Unknown(codeclink_sys::Status),

    /// An argument was null, out of range, or otherwise invalid.
    #[error("Bad parameter")]
    BadParameter,

    /// A fixed-capacity queue (slot array or correlation ring) is full while
    /// older entries are still outstanding.
    #[error("Queue capacity exceeded")]
    CapacityExceeded,

    /// The driver could not allocate memory, address space, or a node.
    #[error("Insufficient resources")]
    InsufficientResources,

    /// A blocking operation timed out before completing.
    #[error("Timeout")]
    Timeout,

    /// The DSP session is dead (fatal coprocessor error, torn-down node, or
    /// a driver call against a stale handle).
    #[error("Hardware error")]
    Hardware,

    /// The requested operation is not permitted in the session's current
    /// lifecycle state.
    #[error("Operation not permitted in state {0:?}")]
    InvalidState(LifecycleState),

    /// A generic error for host-level failures not directly mapped to a
    /// driver status code.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to convert a Rust string to a C-compatible null-terminated
    /// string (library paths handed to the driver).
    #[error("Null string: {0}")]
    NulString(#[from] std::ffi::NulError),

    /// Failed to load or resolve symbols from the bridge driver library.
    #[error("Loading driver: {0}")]
    LibLoading(#[from] libloading::Error),
}

impl Error {
    /// Converts a raw bridge driver status code to a Rust [`Result`].
    ///
    /// # Arguments
    ///
    /// * `status` - The raw status word returned by a driver entry point
    ///
    /// # Returns
    ///
    /// - `Ok(())` if `status` denotes success
    /// - `Err(Error::...)` for any failure status
    pub fn from_status(status: codeclink_sys::Status) -> Result<()> {
        if !codeclink_sys::failed(status) {
            return Ok(());
        }
        match status {
            codeclink_sys::ERR_TIMEOUT => Err(Error::Timeout),
            codeclink_sys::ERR_POINTER => Err(Error::BadParameter),
            codeclink_sys::ERR_MEMORY => Err(Error::InsufficientResources),
            codeclink_sys::ERR_HANDLE => Err(Error::Hardware),
            codeclink_sys::ERR_QUEUE_FULL => Err(Error::CapacityExceeded),
            codeclink_sys::ERR_FAIL => Err(Error::Hardware),
            other => Err(Error::Unknown(other)),
        }
    }
}
