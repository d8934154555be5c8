use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(version, about = "Binary AVL telemetry gateway for GPS trackers")]
pub struct Args {
    #[clap(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the ingest gateway
    Serve {
        #[arg(short, long, default_value_t = 5027)]
        port: u32,
        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
        /// JSON file of known devices: [{"identity": "...", "label": "..."}]
        #[arg(long)]
        devices: Option<PathBuf>,
        /// Close connections with no traffic for this long
        #[arg(long, default_value_t = 300)]
        idle_timeout_secs: u64,
        /// Reject handshakes from devices the registry cannot resolve
        #[arg(long)]
        strict_handshake: bool,
        /// Do not auto-register unknown devices
        #[arg(long)]
        no_auto_register: bool,
        /// Warn on records reporting speed above this many km/h
        #[arg(long)]
        speed_alert_kmh: Option<u16>,
    },
    /// Send synthetic tracker traffic at a gateway
    Simulate {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(short, long, default_value_t = 5027)]
        port: u32,
        /// Device serial to announce at handshake
        #[arg(long, default_value = "863719065062185")]
        identity: String,
        /// Number of data units to send
        #[arg(short, long, default_value_t = 10)]
        count: u32,
        /// Records per unit
        #[arg(long, default_value_t = 4)]
        records: u8,
        /// Use Codec 8 Extended framing
        #[arg(long)]
        extended: bool,
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },
}
