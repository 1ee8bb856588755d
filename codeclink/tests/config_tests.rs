// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Configuration parsing and path-resolution tests.

use codeclink::{Accounting, CodecConfig, LibraryKind};

const MINIMAL_CONFIG: &str = r#"{
    "node_uuid": "3bd5cbd0-a3e8-4e76-9b2a-2f1c8f0a1c00",
    "libraries": [
        {
            "uuid": "3bd5cbd0-a3e8-4e76-9b2a-2f1c8f0a1c00",
            "kind": "node",
            "file_name": "videodec_sn.dll64P"
        },
        {
            "uuid": "9e9b4ff2-1a20-4c57-8a10-8b2f7a6f3e01",
            "kind": "library",
            "file_name": "usn.dll64P"
        }
    ],
    "create_args": [4, 1280, 720]
}"#;

/// Minimal configurations parse with the documented defaults applied.
#[test]
fn minimal_config_defaults() {
    let config: CodecConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
    assert_eq!(config.libraries.len(), 2);
    assert_eq!(config.libraries[0].kind, LibraryKind::Node);
    assert_eq!(config.libraries[1].kind, LibraryKind::Library);
    assert_eq!(config.queue_capacity, 32);
    assert_eq!(config.accounting, Accounting::Frames);
    assert_eq!(config.attributes.timeout_ms, 1000);
    assert!(config.dsp_path.is_none());
}

/// Configurations survive a serialize/deserialize round trip.
#[test]
fn config_round_trips() {
    let mut config: CodecConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
    config.queue_capacity = 16;
    config.accounting = Accounting::Bytes;
    config.dsp_path = Some("/opt/dsp".into());

    let json = serde_json::to_string(&config).unwrap();
    let restored: CodecConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.queue_capacity, 16);
    assert_eq!(restored.accounting, Accounting::Bytes);
    assert_eq!(restored.node_uuid, config.node_uuid);
    assert_eq!(restored.create_args, vec![4, 1280, 720]);
    assert_eq!(restored.dsp_path.as_deref(), Some(std::path::Path::new("/opt/dsp")));
}

/// An explicit search path wins over the environment fallback.
#[test]
fn library_path_resolution() {
    let mut config: CodecConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
    config.dsp_path = Some("/opt/dsp".into());
    assert_eq!(
        config.resolve_library_path("videodec_sn.dll64P"),
        std::path::Path::new("/opt/dsp/videodec_sn.dll64P")
    );

    // Without an explicit path the result still names the library file
    // under whatever base the environment selects.
    config.dsp_path = None;
    let resolved = config.resolve_library_path("usn.dll64P");
    assert!(resolved.ends_with("usn.dll64P"));
    assert!(resolved.is_absolute());
}

/// Create-phase words marshal to little-endian byte pairs.
#[test]
fn create_args_marshalling() {
    let config: CodecConfig = serde_json::from_str(MINIMAL_CONFIG).unwrap();
    let bytes = config.create_args_bytes();
    assert_eq!(bytes.len(), 6);
    assert_eq!(&bytes[0..2], &4u16.to_le_bytes());
    assert_eq!(&bytes[2..4], &1280u16.to_le_bytes());
    assert_eq!(&bytes[4..6], &720u16.to_le_bytes());
}
