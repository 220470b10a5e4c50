//! Common types used in the protocol.

use std::fmt;

use crate::constants::*;
use crate::wire::micro_to_degrees;

/// A 32-byte public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKey(pub [u8; PUB_KEY_SIZE]);

impl PublicKey {
    /// Create a new public key from bytes.
    pub fn new(bytes: [u8; PUB_KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    /// Create from a slice. Returns None if the slice is the wrong length.
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        <[u8; PUB_KEY_SIZE]>::try_from(slice).ok().map(PublicKey)
    }

    /// The 6-byte prefix the device uses to address peers.
    pub fn prefix(&self) -> PublicKeyPrefix {
        PublicKeyPrefix::from(self)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_SIZE] {
        &self.0
    }

    /// Get the bytes as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The first 6 bytes of a public key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PublicKeyPrefix(pub [u8; PUB_KEY_PREFIX_SIZE]);

impl PublicKeyPrefix {
    /// Create a new prefix from bytes.
    pub fn new(bytes: [u8; PUB_KEY_PREFIX_SIZE]) -> Self {
        PublicKeyPrefix(bytes)
    }

    /// Get the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; PUB_KEY_PREFIX_SIZE] {
        &self.0
    }

    /// Whether `key` starts with this prefix.
    pub fn matches(&self, key: &PublicKey) -> bool {
        key.0[..PUB_KEY_PREFIX_SIZE] == self.0
    }

    /// Get the bytes as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<&PublicKey> for PublicKeyPrefix {
    fn from(key: &PublicKey) -> Self {
        let mut prefix = [0u8; PUB_KEY_PREFIX_SIZE];
        prefix.copy_from_slice(&key.0[..PUB_KEY_PREFIX_SIZE]);
        PublicKeyPrefix(prefix)
    }
}

impl fmt::Display for PublicKeyPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A contact record as stored on the device.
///
/// Only the first `out_path_len` bytes of `out_path` are meaningful; a
/// negative length means no direct path is known and messages are flooded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Contact's public key.
    pub public_key: PublicKey,
    /// Advert type (chat, repeater, room server).
    pub contact_type: u8,
    /// Contact flags.
    pub flags: u8,
    /// Outbound path length, -1 if unknown.
    pub out_path_len: i8,
    /// Outbound path, padded to the full field width.
    pub out_path: [u8; MAX_PATH_SIZE],
    /// Advertised name (up to 31 bytes).
    pub adv_name: String,
    /// Unix time of the last advert heard.
    pub last_advert: u32,
    /// Advertised latitude in micro-degrees.
    pub adv_lat: i32,
    /// Advertised longitude in micro-degrees.
    pub adv_lon: i32,
    /// Unix time of the last local modification.
    pub last_mod: u32,
}

impl Default for Contact {
    fn default() -> Self {
        Contact {
            public_key: PublicKey::default(),
            contact_type: ADV_TYPE_CHAT,
            flags: 0,
            out_path_len: -1,
            out_path: [0u8; MAX_PATH_SIZE],
            adv_name: String::new(),
            last_advert: 0,
            adv_lat: 0,
            adv_lon: 0,
            last_mod: 0,
        }
    }
}

impl Contact {
    /// The meaningful part of the out path.
    pub fn path(&self) -> &[u8] {
        let len = (self.out_path_len.max(0) as usize).min(MAX_PATH_SIZE);
        &self.out_path[..len]
    }

    /// Replace the out path. Returns false if it is longer than the field.
    pub fn set_path(&mut self, path: &[u8]) -> bool {
        if path.len() > MAX_PATH_SIZE {
            return false;
        }
        self.out_path = [0u8; MAX_PATH_SIZE];
        self.out_path[..path.len()].copy_from_slice(path);
        self.out_path_len = path.len() as i8;
        true
    }

    /// Check if the contact has a known direct path.
    pub fn has_direct_path(&self) -> bool {
        self.out_path_len >= 0
    }

    /// Latitude in degrees.
    pub fn latitude(&self) -> f64 {
        micro_to_degrees(self.adv_lat)
    }

    /// Longitude in degrees.
    pub fn longitude(&self) -> f64 {
        micro_to_degrees(self.adv_lon)
    }
}

/// A group channel slot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    /// Slot index.
    pub index: u8,
    /// Channel name (up to 31 bytes).
    pub name: String,
    /// 128-bit channel secret.
    pub secret: [u8; CHANNEL_SECRET_SIZE],
}

/// Firmware identification returned by `DeviceQuery`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Firmware protocol version.
    pub firmware_version: i8,
    /// Contact table capacity divided by two.
    pub max_contacts_half: u8,
    /// Number of group channel slots.
    pub max_channels: u8,
    /// BLE pairing PIN (0 when not set).
    pub ble_pin: u32,
    /// Firmware build date, e.g. "12 Mar 2025".
    pub firmware_build_date: String,
    /// Manufacturer and model string.
    pub manufacturer_model: String,
}

impl DeviceInfo {
    /// Contact table capacity.
    pub fn max_contacts(&self) -> usize {
        self.max_contacts_half as usize * 2
    }
}

/// The node's own configuration, returned by `AppStart`.
///
/// Coordinates and radio settings are already scaled to their natural units.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelfInfo {
    /// Advert type of this node.
    pub advert_type: u8,
    /// Current TX power in dBm.
    pub tx_power: u8,
    /// Maximum TX power in dBm.
    pub max_tx_power: u8,
    /// This node's public key.
    pub public_key: PublicKey,
    /// Advertised latitude in degrees.
    pub adv_lat: f64,
    /// Advertised longitude in degrees.
    pub adv_lon: f64,
    /// Extra ACK transmissions.
    pub multi_acks: u8,
    /// Whether adverts carry the position.
    pub advert_loc_policy: u8,
    /// Packed telemetry permission modes.
    pub telemetry_modes: u8,
    /// Non-zero if new contacts must be added by the host.
    pub manual_add_contacts: u8,
    /// Radio frequency in MHz.
    pub radio_freq_mhz: f64,
    /// Radio bandwidth in kHz.
    pub radio_bw_khz: f64,
    /// LoRa spreading factor.
    pub radio_sf: u8,
    /// LoRa coding rate.
    pub radio_cr: u8,
    /// Node name.
    pub name: String,
}

/// LoRa modem settings for `SetRadioParams`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadioParams {
    /// Frequency in MHz.
    pub freq_mhz: f64,
    /// Bandwidth in kHz.
    pub bw_khz: f64,
    /// Spreading factor (5-12).
    pub sf: u8,
    /// Coding rate (5-8).
    pub cr: u8,
}

impl Default for RadioParams {
    fn default() -> Self {
        RadioParams {
            freq_mhz: 910.525,
            bw_khz: 62.5,
            sf: 7,
            cr: 5,
        }
    }
}

/// Miscellaneous settings for `SetOtherParams`.
///
/// Trailing options are only sent if every earlier option is present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtherParams {
    /// Require the host to add contacts manually.
    pub manual_add_contacts: u8,
    /// Packed telemetry permission modes.
    pub telemetry_modes: Option<u8>,
    /// Whether adverts carry the position.
    pub advert_loc_policy: Option<u8>,
    /// Extra ACK transmissions.
    pub multi_acks: Option<u8>,
}

/// How far a self advert travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertKind {
    /// Direct neighbours only.
    ZeroHop,
    /// Flooded through the mesh.
    Flood,
}

impl From<AdvertKind> for u8 {
    fn from(kind: AdvertKind) -> Self {
        match kind {
            AdvertKind::ZeroHop => SELF_ADVERT_ZERO_HOP,
            AdvertKind::Flood => SELF_ADVERT_FLOOD,
        }
    }
}

/// Message type for text messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextType {
    /// Plain text message.
    Plain,
    /// CLI/command data.
    CliData,
    /// Signed plain text.
    SignedPlain,
    /// Unknown type.
    Unknown(u8),
}

impl From<u8> for TextType {
    fn from(value: u8) -> Self {
        match value {
            TXT_TYPE_PLAIN => TextType::Plain,
            TXT_TYPE_CLI_DATA => TextType::CliData,
            TXT_TYPE_SIGNED_PLAIN => TextType::SignedPlain,
            _ => TextType::Unknown(value),
        }
    }
}

impl From<TextType> for u8 {
    fn from(value: TextType) -> Self {
        match value {
            TextType::Plain => TXT_TYPE_PLAIN,
            TextType::CliData => TXT_TYPE_CLI_DATA,
            TextType::SignedPlain => TXT_TYPE_SIGNED_PLAIN,
            TextType::Unknown(v) => v,
        }
    }
}

/// A direct message popped from the offline queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactMessage {
    /// Sender's key prefix.
    pub sender_prefix: PublicKeyPrefix,
    /// Hops travelled (0xFF = flood).
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's clock at send time.
    pub sender_time: u32,
    /// SNR scaled by 4 (newer firmware only).
    pub snr_x4: Option<i8>,
    /// Message text. Invalid UTF-8 from the sender is replaced with
    /// U+FFFD and anything after a NUL is dropped.
    pub text: String,
}

/// A channel message popped from the offline queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    /// Channel slot index.
    pub channel_index: u8,
    /// Hops travelled (0xFF = flood).
    pub path_len: u8,
    /// Message type.
    pub text_type: TextType,
    /// Sender's clock at send time.
    pub sender_time: u32,
    /// SNR scaled by 4 (newer firmware only).
    pub snr_x4: Option<i8>,
    /// Message text. Invalid UTF-8 from the sender is replaced with
    /// U+FFFD and anything after a NUL is dropped.
    pub text: String,
}

/// Either kind of queued message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceivedMessage {
    /// Direct message from a contact.
    Contact(ContactMessage),
    /// Message on a group channel.
    Channel(ChannelMessage),
}

/// Reply to a send: the ACK to wait for and how long to wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentResponse {
    /// Non-zero if the message was flooded.
    pub result: i8,
    /// CRC the delivery ACK will carry.
    pub expected_ack_crc: u32,
    /// Suggested timeout in milliseconds.
    pub est_timeout_ms: u32,
}

/// Storage usage reported alongside the battery voltage by newer firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageUsage {
    /// Used storage in KB.
    pub used_kb: u32,
    /// Total storage in KB.
    pub total_kb: u32,
}

/// Battery voltage and optional storage usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus {
    /// Battery voltage in millivolts.
    pub millivolts: u16,
    /// Storage usage, if reported.
    pub storage: Option<StorageUsage>,
}

impl BatteryStatus {
    /// Get battery voltage in volts.
    pub fn volts(&self) -> f32 {
        self.millivolts as f32 / 1000.0
    }
}

/// Reply to `SignStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignSession {
    /// Session status byte.
    pub status: u8,
    /// Largest total amount of data the device will sign.
    pub max_sign_data_len: u32,
}

/// ACK for a previously sent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendConfirmation {
    /// CRC matching `SentResponse::expected_ack_crc`.
    pub ack_crc: u32,
    /// Round trip in milliseconds.
    pub round_trip_ms: u32,
}

/// Raw packet or receive log line with signal quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// SNR scaled by 4.
    pub snr_x4: i8,
    /// RSSI in dBm.
    pub rssi: i8,
    /// Packet bytes.
    pub data: Vec<u8>,
}

/// Extra login details sent by newer server firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginDetails {
    /// Server clock.
    pub server_time: u32,
    /// ACL permission bits.
    pub acl_permissions: u8,
    /// Server firmware level.
    pub firmware_level: u8,
}

/// Login accepted by a server node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginSuccess {
    /// Permission byte (non-zero = admin).
    pub permissions: u8,
    /// Server key prefix.
    pub server_prefix: PublicKeyPrefix,
    /// Extra details from newer servers.
    pub details: Option<LoginDetails>,
}

/// Status blob from a repeater or room server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusResponse {
    /// Responder key prefix.
    pub sender_prefix: PublicKeyPrefix,
    /// Raw status bytes.
    pub data: Vec<u8>,
}

/// Telemetry reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryResponse {
    /// Responder key prefix.
    pub sender_prefix: PublicKeyPrefix,
    /// Cayenne LPP encoded readings.
    pub lpp: Vec<u8>,
}

/// Reply to a binary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryResponse {
    /// Tag matching the request's expected ACK.
    pub tag: u32,
    /// Response bytes.
    pub data: Vec<u8>,
}

/// Result of a trace along a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceData {
    /// Length of `path_hashes`.
    pub path_len: u8,
    /// Flags; the low two bits give the hash size shift.
    pub flags: u8,
    /// Tag of the trace request.
    pub tag: u32,
    /// Auth code of the trace request.
    pub auth_code: u32,
    /// Hop hashes.
    pub path_hashes: Vec<u8>,
    /// Per-hop SNR scaled by 4.
    pub path_snrs: Vec<u8>,
    /// SNR of the final hop to this node, scaled by 4.
    pub final_snr_x4: i8,
}

impl TraceData {
    /// Number of SNR entries for a path of `path_len` bytes.
    pub fn snr_count(path_len: u8, flags: u8) -> usize {
        (path_len as usize) >> (flags & 0x03)
    }
}
