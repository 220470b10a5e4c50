mod cli;

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use clap::Parser;
use meshcore_companion_client::protocol::{
    AdvertKind, NotificationCode, PublicKey, PublicKeyPrefix, ReceivedMessage, TextType,
    PUB_KEY_PREFIX_SIZE, PUB_KEY_SIZE,
};
use meshcore_companion_client::{CancelToken, Connection, ConnectionConfig, StreamTransport};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::{AdvertArg, Cli, Commands};

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Client(#[from] meshcore_companion_client::Error),

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid key '{0}': expected {1} hex characters")]
    InvalidKey(String, usize),

    #[error("--address is required for this command")]
    MissingAddress,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, CliError>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    setup_logging(cli.debug);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn setup_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<ConnectionConfig> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => ConnectionConfig::default(),
    };
    if let Some(secs) = cli.timeout {
        config.command_timeout_ms = Some(secs.saturating_mul(1000));
    }
    Ok(config)
}

fn read_config(path: &Path) -> Result<ConnectionConfig> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_key(text: &str) -> Result<PublicKey> {
    hex::decode(text)
        .ok()
        .and_then(|bytes| PublicKey::from_slice(&bytes))
        .ok_or_else(|| CliError::InvalidKey(text.to_string(), PUB_KEY_SIZE * 2))
}

fn parse_prefix(text: &str) -> Result<PublicKeyPrefix> {
    let bytes = hex::decode(text)
        .map_err(|_| CliError::InvalidKey(text.to_string(), PUB_KEY_PREFIX_SIZE * 2))?;
    if bytes.len() < PUB_KEY_PREFIX_SIZE {
        return Err(CliError::InvalidKey(
            text.to_string(),
            PUB_KEY_PREFIX_SIZE * 2,
        ));
    }
    let mut prefix = [0u8; PUB_KEY_PREFIX_SIZE];
    prefix.copy_from_slice(&bytes[..PUB_KEY_PREFIX_SIZE]);
    Ok(PublicKeyPrefix(prefix))
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    if let Commands::DefaultConfig = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let address = cli.address.as_deref().ok_or(CliError::MissingAddress)?;
    let transport = StreamTransport::connect_tcp(address)
        .await
        .map_err(meshcore_companion_client::Error::from)?;
    let conn = Connection::new(transport, config);
    conn.connect().await?;
    info!(address, "connected");

    let result = execute(&conn, cli.command).await;
    conn.disconnect().await?;
    result
}

async fn execute(conn: &Connection, command: Commands) -> Result<()> {
    let cancel = CancelToken::new();
    match command {
        Commands::Info => {
            let me = conn.get_self_info(&cancel).await?;
            let device = conn.device_query(&cancel).await?;
            println!("Name:       {}", me.name);
            println!("Public key: {}", me.public_key);
            println!("Position:   {:.6}, {:.6}", me.adv_lat, me.adv_lon);
            println!(
                "Radio:      {:.3} MHz, BW {} kHz, SF{}, CR{}, {} dBm",
                me.radio_freq_mhz, me.radio_bw_khz, me.radio_sf, me.radio_cr, me.tx_power
            );
            println!(
                "Firmware:   v{} ({}) {}",
                device.firmware_version, device.firmware_build_date, device.manufacturer_model
            );
            println!(
                "Capacity:   {} contacts, {} channels",
                device.max_contacts(),
                device.max_channels
            );
        }

        Commands::Time { sync } => {
            if sync {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as u32)
                    .unwrap_or(0);
                conn.set_device_time(now, &cancel).await?;
                println!("Device clock set to {now}");
            } else {
                println!("{}", conn.get_device_time(&cancel).await?);
            }
        }

        Commands::Battery => {
            let status = conn.get_battery_status(&cancel).await?;
            println!("Battery: {:.3} V", status.volts());
            if let Some(storage) = status.storage {
                println!("Storage: {} / {} KB", storage.used_kb, storage.total_kb);
            }
        }

        Commands::Contacts { since } => {
            let contacts = conn.get_contacts(since, &cancel).await?;
            for contact in &contacts {
                let path = if contact.has_direct_path() {
                    hex::encode(contact.path())
                } else {
                    "flood".to_string()
                };
                println!(
                    "{}  {:<32}  type {}  path {}",
                    contact.public_key.prefix(),
                    contact.adv_name,
                    contact.contact_type,
                    path
                );
            }
            println!("{} contacts", contacts.len());
        }

        Commands::Sync => {
            let mut count = 0;
            while let Some(message) = conn.sync_next_message(&cancel).await? {
                match &message {
                    ReceivedMessage::Contact(m) => println!("[{}] {}", m.sender_prefix, m.text),
                    ReceivedMessage::Channel(m) => println!("[#{}] {}", m.channel_index, m.text),
                }
                count += 1;
            }
            debug!(count, "message queue drained");
        }

        Commands::Send { to, text } => {
            let prefix = parse_prefix(&to)?;
            let sent = conn
                .send_text_message(prefix, TextType::Plain, 0, &text, &cancel)
                .await?;
            println!(
                "Sent ({}), ack {:08x}, timeout {} ms",
                if sent.result != 0 { "flood" } else { "direct" },
                sent.expected_ack_crc,
                sent.est_timeout_ms
            );
        }

        Commands::ChannelSend { channel, text } => {
            conn.send_channel_text_message(channel, &text, &cancel)
                .await?;
            println!("Sent on channel {channel}");
        }

        Commands::Advert { kind } => {
            let kind = match kind {
                AdvertArg::ZeroHop => AdvertKind::ZeroHop,
                AdvertArg::Flood => AdvertKind::Flood,
            };
            conn.send_advert(kind, &cancel).await?;
            println!("Advert sent");
        }

        Commands::Status { key } => {
            let key = parse_key(&key)?;
            let status = conn.get_status(&key, &cancel).await?;
            println!("{}: {}", status.sender_prefix, hex::encode(&status.data));
        }

        Commands::Listen { duration } => {
            let cancel = match duration {
                Some(secs) => CancelToken::with_timeout(Duration::from_secs(secs)),
                None => cancel,
            };
            let mut stream = conn.subscribe_push(NotificationCode::push_codes(), &cancel)?;
            while let Some(item) = stream.next().await {
                println!("{:?}", item?);
            }
        }

        Commands::DefaultConfig => {}
    }
    Ok(())
}
