use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "meshcore-companion")]
#[command(author, version, about = "Talk to a MeshCore companion radio", long_about = None)]
pub struct Cli {
    /// TCP address of a serial bridge (e.g. 192.168.1.50:5000)
    #[arg(short, long)]
    pub address: Option<String>,

    /// Connection config as JSON
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Per-command timeout in seconds, overriding the config
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show node and firmware information
    Info,

    /// Read the device clock, or set it to the host clock
    Time {
        /// Set the device clock instead of reading it
        #[arg(long)]
        sync: bool,
    },

    /// Show battery voltage and storage usage
    Battery,

    /// List contacts
    Contacts {
        /// Only contacts modified after this unix time
        #[arg(long)]
        since: Option<u32>,
    },

    /// Drain the offline message queue
    Sync,

    /// Send a direct message
    Send {
        /// Recipient public key or 6-byte prefix, hex
        to: String,
        /// Message text
        text: String,
    },

    /// Send a message on a channel
    ChannelSend {
        /// Channel slot
        channel: u8,
        /// Message text
        text: String,
    },

    /// Broadcast a self advert
    Advert {
        #[arg(long, value_enum, default_value = "zero-hop")]
        kind: AdvertArg,
    },

    /// Request status from a repeater
    Status {
        /// Repeater public key, hex
        key: String,
    },

    /// Print push notifications as they arrive
    Listen {
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the default connection config as JSON
    DefaultConfig,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum AdvertArg {
    ZeroHop,
    Flood,
}
