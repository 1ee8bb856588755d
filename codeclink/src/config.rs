// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Codec node configuration.
//!
//! This module defines the serde-backed description of a codec node: the
//! node and dependent-library identities to register with the driver, the
//! create-phase arguments, scheduling attributes, queue sizing and the
//! timestamp accounting mode.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bridge::LibraryKind;

/// Default capacity of the in-flight slot arrays and the correlation ring.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// Fallback DSP library directory when neither the configuration nor the
/// `DSP_PATH` environment variable names one.
pub const DEFAULT_DSP_PATH: &str = "/system/lib/dsp";

/// How completed output bytes are matched against submitted input metadata.
///
/// Some codecs emit exactly one output frame per input buffer; others report
/// consumption at output-frame granularity in bytes, so one submitted buffer
/// may account for several decoded frames (or a fraction of one).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Accounting {
    /// One correlation entry consumed per completed output buffer.
    #[default]
    Frames,
    /// Correlation entries consumed by reported byte counts, carrying
    /// partial residuals across completions.
    Bytes,
}

/// A DSP-side object to register with the driver before node allocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeLibrary {
    /// Registry identity of the object.
    pub uuid: Uuid,
    /// Whether this is the node executable itself or a dependent library.
    pub kind: LibraryKind,
    /// File name of the object, resolved against the DSP search path.
    pub file_name: String,
}

/// Scheduling attributes for node allocation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NodeAttributes {
    /// Node scheduling priority on the coprocessor.
    pub priority: i32,
    /// Driver-side operation timeout in milliseconds.
    pub timeout_ms: u32,
    /// Vendor profile identifier selecting a resource profile.
    pub profile_id: u32,
}

impl Default for NodeAttributes {
    fn default() -> Self {
        NodeAttributes {
            priority: 5,
            timeout_ms: 1000,
            profile_id: 0,
        }
    }
}

/// Complete description of one codec node instance.
///
/// # Examples
///
/// ```
/// use codeclink::config::CodecConfig;
///
/// let config: CodecConfig = serde_json::from_str(
///     r#"{
///         "node_uuid": "3bd5cbd0-a3e8-4e76-9b2a-2f1c8f0a1c00",
///         "libraries": [
///             {
///                 "uuid": "3bd5cbd0-a3e8-4e76-9b2a-2f1c8f0a1c00",
///                 "kind": "node",
///                 "file_name": "videodec_sn.dll64P"
///             }
///         ],
///         "create_args": [4, 320, 240]
///     }"#,
/// )
/// .unwrap();
/// assert_eq!(config.queue_capacity, 32);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Identity of the node to allocate (must also appear in `libraries`).
    pub node_uuid: Uuid,

    /// Objects to register with the driver before allocation, in order.
    pub libraries: Vec<NodeLibrary>,

    /// Create-phase arguments, marshalled to the node as 16-bit words.
    #[serde(default)]
    pub create_args: Vec<u16>,

    /// Node scheduling attributes.
    #[serde(default)]
    pub attributes: NodeAttributes,

    /// Capacity of the per-direction in-flight slot arrays and of the
    /// timestamp correlation ring.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Timestamp accounting mode for output completions.
    #[serde(default)]
    pub accounting: Accounting,

    /// Directory holding the DSP-side libraries. When absent, the
    /// `DSP_PATH` environment variable is consulted, then
    /// [`DEFAULT_DSP_PATH`].
    #[serde(default)]
    pub dsp_path: Option<PathBuf>,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl CodecConfig {
    /// Resolves a library file name to an absolute path on the DSP search
    /// path.
    ///
    /// Resolution order: the configured `dsp_path`, the `DSP_PATH`
    /// environment variable, then [`DEFAULT_DSP_PATH`].
    pub fn resolve_library_path(&self, file_name: &str) -> PathBuf {
        let base = match &self.dsp_path {
            Some(path) => path.clone(),
            None => std::env::var_os("DSP_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| Path::new(DEFAULT_DSP_PATH).to_path_buf()),
        };
        base.join(file_name)
    }

    /// Marshals the create-phase argument words into the byte block handed
    /// to node allocation.
    pub fn create_args_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.create_args.len() * 2);
        for word in &self.create_args {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes
    }
}
