// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Brings up a codec node against the real bridge driver, runs it briefly
//! and tears it down.
//!
//! Requires the driver library and a node configuration, e.g.:
//!
//! ```sh
//! cargo run --example decode_session -- \
//!     --driver /system/lib/libbridge.so --config h264_decoder.json
//! ```

mod common;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use codeclink::{CodecConfig, CodecEvent, CodecSession, ControlCommand, load_bridge};

#[derive(Parser)]
#[command(about = "Bring up a DSP codec node and exercise its control path")]
struct Args {
    /// Path of the bridge driver shared object.
    #[arg(long, default_value = "libbridge.so")]
    driver: PathBuf,

    /// JSON codec node configuration.
    #[arg(long)]
    config: PathBuf,

    /// How long to keep the node running, in seconds.
    #[arg(long, default_value_t = 2)]
    run_seconds: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    let bridge = load_bridge(&args.driver)?;
    let config: CodecConfig = serde_json::from_str(&std::fs::read_to_string(&args.config)?)?;
    info!(node = %config.node_uuid, "loaded codec configuration");

    let session = CodecSession::new(
        bridge,
        &config,
        Box::new(|event| match event {
            CodecEvent::BufferProcessed(buffer) => {
                info!(
                    filled = buffer.filled,
                    timestamp = buffer.timestamp,
                    "buffer returned"
                )
            }
            other => info!(?other, "codec event"),
        }),
    )?;

    session.control(ControlCommand::Start)?;
    info!("node running");
    std::thread::sleep(std::time::Duration::from_secs(args.run_seconds));

    session.control(ControlCommand::Stop)?;
    session.destroy()?;
    info!("session torn down");
    Ok(())
}
