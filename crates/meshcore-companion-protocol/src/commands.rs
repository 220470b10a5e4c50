//! Outbound command frames.

use bytes::BufMut;

use crate::codes::CommandCode;
use crate::constants::*;
use crate::error::ProtocolError;
use crate::types::*;
use crate::wire::{put_cstring, to_milli_units};

/// A host → device request.
///
/// Each variant encodes to exactly one frame; see [`Command::encode`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Handshake. The device answers with `SelfInfo`.
    AppStart { app_version: u8, app_name: String },

    /// Direct message to the contact whose key starts with `recipient_prefix`.
    SendTextMessage {
        text_type: TextType,
        /// 0 for the first try, incremented on resend.
        attempt: u8,
        /// Host clock, unix seconds.
        timestamp: u32,
        recipient_prefix: PublicKeyPrefix,
        text: String,
    },

    /// Message on a group channel slot.
    SendChannelTextMessage {
        text_type: TextType,
        channel_idx: u8,
        timestamp: u32,
        text: String,
    },

    /// Enumerate contacts; with `since`, only those modified after it.
    GetContacts { since: Option<u32> },

    GetDeviceTime,

    SetDeviceTime { time_secs: u32 },

    SendSelfAdvert { kind: AdvertKind },

    SetAdvertName { name: String },

    /// Insert a contact or overwrite the one with the same key.
    AddUpdateContact { contact: Contact },

    /// Pop one message from the device's offline queue.
    SyncNextMessage,

    SetRadioParams { params: RadioParams },

    SetTxPower { power_dbm: u8 },

    /// Forget the learned route; the next message floods.
    ResetPath { public_key: PublicKey },

    /// Position in micro-degrees.
    SetAdvertLatLon { lat: i32, lon: i32 },

    RemoveContact { public_key: PublicKey },

    /// Re-broadcast a stored contact as a zero-hop advert.
    ShareContact { public_key: PublicKey },

    /// Advert packet for a contact; `None` exports this node.
    ExportContact { public_key: Option<PublicKey> },

    /// Learn a contact from an advert packet produced by `ExportContact`.
    ImportContact { data: Vec<u8> },

    Reboot,

    GetBatteryVoltage,

    DeviceQuery { app_version: u8 },

    ExportPrivateKey,

    ImportPrivateKey { identity: [u8; PRIVATE_KEY_SIZE] },

    /// Raw payload sent along an explicit path of hop hashes.
    SendRawData { path: Vec<u8>, payload: Vec<u8> },

    /// Log in to a repeater or room server.
    SendLogin { public_key: PublicKey, password: String },

    SendStatusRequest { public_key: PublicKey },

    GetChannel { index: u8 },

    SetChannel { channel: ChannelInfo },

    /// Open a signing session.
    SignStart,

    /// One chunk of at most [`MAX_SIGN_CHUNK`] bytes.
    SignData { data: Vec<u8> },

    SignFinish,

    /// Trace packet; the reply `TraceData` carries the same `tag`.
    SendTracePath {
        tag: u32,
        auth: u32,
        flags: u8,
        path: Vec<u8>,
    },

    SetOtherParams { params: OtherParams },

    SendTelemetryRequest { public_key: PublicKey },

    /// Opaque request; the reply is tagged with the `Sent` ACK CRC.
    SendBinaryRequest { public_key: PublicKey, data: Vec<u8> },
}

impl Command {
    /// The code byte this command is sent under.
    pub fn code(&self) -> CommandCode {
        match self {
            Command::AppStart { .. } => CommandCode::AppStart,
            Command::SendTextMessage { .. } => CommandCode::SendTextMsg,
            Command::SendChannelTextMessage { .. } => CommandCode::SendChannelTextMsg,
            Command::GetContacts { .. } => CommandCode::GetContacts,
            Command::GetDeviceTime => CommandCode::GetDeviceTime,
            Command::SetDeviceTime { .. } => CommandCode::SetDeviceTime,
            Command::SendSelfAdvert { .. } => CommandCode::SendSelfAdvert,
            Command::SetAdvertName { .. } => CommandCode::SetAdvertName,
            Command::AddUpdateContact { .. } => CommandCode::AddUpdateContact,
            Command::SyncNextMessage => CommandCode::SyncNextMessage,
            Command::SetRadioParams { .. } => CommandCode::SetRadioParams,
            Command::SetTxPower { .. } => CommandCode::SetTxPower,
            Command::ResetPath { .. } => CommandCode::ResetPath,
            Command::SetAdvertLatLon { .. } => CommandCode::SetAdvertLatLon,
            Command::RemoveContact { .. } => CommandCode::RemoveContact,
            Command::ShareContact { .. } => CommandCode::ShareContact,
            Command::ExportContact { .. } => CommandCode::ExportContact,
            Command::ImportContact { .. } => CommandCode::ImportContact,
            Command::Reboot => CommandCode::Reboot,
            Command::GetBatteryVoltage => CommandCode::GetBatteryVoltage,
            Command::DeviceQuery { .. } => CommandCode::DeviceQuery,
            Command::ExportPrivateKey => CommandCode::ExportPrivateKey,
            Command::ImportPrivateKey { .. } => CommandCode::ImportPrivateKey,
            Command::SendRawData { .. } => CommandCode::SendRawData,
            Command::SendLogin { .. } => CommandCode::SendLogin,
            Command::SendStatusRequest { .. } => CommandCode::SendStatusReq,
            Command::GetChannel { .. } => CommandCode::GetChannel,
            Command::SetChannel { .. } => CommandCode::SetChannel,
            Command::SignStart => CommandCode::SignStart,
            Command::SignData { .. } => CommandCode::SignData,
            Command::SignFinish => CommandCode::SignFinish,
            Command::SendTracePath { .. } => CommandCode::SendTracePath,
            Command::SetOtherParams { .. } => CommandCode::SetOtherParams,
            Command::SendTelemetryRequest { .. } => CommandCode::SendTelemetryReq,
            Command::SendBinaryRequest { .. } => CommandCode::SendBinaryReq,
        }
    }

    /// Encode the command to a frame, code byte first.
    ///
    /// Fails if a fixed-width string or bounded field does not fit, or if the
    /// frame would exceed `MAX_FRAME_SIZE`.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(64);
        buf.put_u8(self.code().as_u8());

        match self {
            Command::AppStart {
                app_version,
                app_name,
            } => {
                buf.put_u8(*app_version);
                buf.put_bytes(0, 6);
                buf.put_slice(app_name.as_bytes());
            }

            Command::SendTextMessage {
                text_type,
                attempt,
                timestamp,
                recipient_prefix,
                text,
            } => {
                buf.put_u8((*text_type).into());
                buf.put_u8(*attempt);
                buf.put_u32_le(*timestamp);
                buf.put_slice(recipient_prefix.as_bytes());
                buf.put_slice(text.as_bytes());
            }

            Command::SendChannelTextMessage {
                text_type,
                channel_idx,
                timestamp,
                text,
            } => {
                buf.put_u8((*text_type).into());
                buf.put_u8(*channel_idx);
                buf.put_u32_le(*timestamp);
                buf.put_slice(text.as_bytes());
            }

            Command::GetContacts { since } => {
                if let Some(since) = since {
                    buf.put_u32_le(*since);
                }
            }

            Command::SetDeviceTime { time_secs } => buf.put_u32_le(*time_secs),

            Command::SendSelfAdvert { kind } => buf.put_u8((*kind).into()),

            Command::SetAdvertName { name } => buf.put_slice(name.as_bytes()),

            Command::AddUpdateContact { contact } => put_contact(&mut buf, contact)?,

            Command::SetRadioParams { params } => {
                buf.put_u32_le(to_milli_units(params.freq_mhz));
                buf.put_u32_le(to_milli_units(params.bw_khz));
                buf.put_u8(params.sf);
                buf.put_u8(params.cr);
            }

            Command::SetTxPower { power_dbm } => buf.put_u8(*power_dbm),

            Command::SetAdvertLatLon { lat, lon } => {
                buf.put_i32_le(*lat);
                buf.put_i32_le(*lon);
            }

            Command::ResetPath { public_key }
            | Command::RemoveContact { public_key }
            | Command::ShareContact { public_key } => buf.put_slice(public_key.as_bytes()),

            Command::ExportContact { public_key } => {
                if let Some(pk) = public_key {
                    buf.put_slice(pk.as_bytes());
                }
            }

            Command::ImportContact { data } => buf.put_slice(data),

            Command::Reboot => buf.put_slice(b"reboot"),

            Command::DeviceQuery { app_version } => buf.put_u8(*app_version),

            Command::ImportPrivateKey { identity } => buf.put_slice(identity),

            Command::SendRawData { path, payload } => {
                check_len("path", path.len(), MAX_PATH_SIZE)?;
                buf.put_u8(path.len() as u8);
                buf.put_slice(path);
                buf.put_slice(payload);
            }

            Command::SendLogin {
                public_key,
                password,
            } => {
                buf.put_slice(public_key.as_bytes());
                buf.put_slice(password.as_bytes());
            }

            Command::SendStatusRequest { public_key }
            | Command::SendTelemetryRequest { public_key } => {
                buf.put_bytes(0, 3);
                buf.put_slice(public_key.as_bytes());
            }

            Command::GetChannel { index } => buf.put_u8(*index),

            Command::SetChannel { channel } => {
                buf.put_u8(channel.index);
                put_cstring(&mut buf, &channel.name, NAME_FIELD_SIZE)?;
                buf.put_slice(&channel.secret);
            }

            Command::SignData { data } => {
                check_len("sign data", data.len(), MAX_SIGN_CHUNK)?;
                buf.put_slice(data);
            }

            Command::SendTracePath {
                tag,
                auth,
                flags,
                path,
            } => {
                check_len("path", path.len(), MAX_PATH_SIZE)?;
                buf.put_u32_le(*tag);
                buf.put_u32_le(*auth);
                buf.put_u8(*flags);
                buf.put_slice(path);
            }

            Command::SetOtherParams { params } => {
                buf.put_u8(params.manual_add_contacts);
                if let Some(tm) = params.telemetry_modes {
                    buf.put_u8(tm);
                    if let Some(alp) = params.advert_loc_policy {
                        buf.put_u8(alp);
                        if let Some(ma) = params.multi_acks {
                            buf.put_u8(ma);
                        }
                    }
                }
            }

            Command::SendBinaryRequest { public_key, data } => {
                buf.put_slice(public_key.as_bytes());
                buf.put_slice(data);
            }

            Command::GetDeviceTime
            | Command::SyncNextMessage
            | Command::GetBatteryVoltage
            | Command::ExportPrivateKey
            | Command::SignStart
            | Command::SignFinish => {}
        }

        if buf.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLong {
                max: MAX_FRAME_SIZE,
                actual: buf.len(),
            });
        }
        Ok(buf)
    }
}

/// Serialize a contact record (`CONTACT_RECORD_SIZE` bytes).
pub(crate) fn put_contact(buf: &mut Vec<u8>, contact: &Contact) -> Result<(), ProtocolError> {
    if contact.out_path_len > MAX_PATH_SIZE as i8 {
        return Err(ProtocolError::FieldTooLong {
            field: "out path",
            len: contact.out_path_len as usize,
            max: MAX_PATH_SIZE,
        });
    }
    buf.put_slice(contact.public_key.as_bytes());
    buf.put_u8(contact.contact_type);
    buf.put_u8(contact.flags);
    buf.put_i8(contact.out_path_len);
    buf.put_slice(&contact.out_path);
    put_cstring(buf, &contact.adv_name, NAME_FIELD_SIZE)?;
    buf.put_u32_le(contact.last_advert);
    buf.put_i32_le(contact.adv_lat);
    buf.put_i32_le(contact.adv_lon);
    buf.put_u32_le(contact.last_mod);
    Ok(())
}

fn check_len(field: &'static str, len: usize, max: usize) -> Result<(), ProtocolError> {
    if len > max {
        return Err(ProtocolError::FieldTooLong { field, len, max });
    }
    Ok(())
}
