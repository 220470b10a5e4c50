//! Notifications sent by the companion firmware.
//!
//! Every frame the device sends decodes into one [`Notification`] through a
//! single dispatch on the code byte. Decoding is strict: a payload shorter
//! than its layout, or longer than a layout with no trailing field, is
//! rejected with [`ProtocolError::Malformed`].

use bytes::BufMut;

use crate::codes::NotificationCode;
use crate::commands::put_contact;
use crate::constants::*;
use crate::error::{DeviceError, DeviceErrorCode, ProtocolError};
use crate::types::*;
use crate::wire::{
    degrees_to_micro, from_milli_units, micro_to_degrees, put_cstring, read_trailing_string,
    to_milli_units, Reader,
};

/// A decoded device → host frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Command succeeded.
    Ok,
    /// Command failed.
    Err(DeviceError),
    /// Contact enumeration begins.
    ContactsStart {
        /// Number of contacts to follow, if reported.
        count: Option<u32>,
    },
    /// One contact record.
    Contact(Contact),
    /// Contact enumeration finished.
    EndOfContacts {
        /// Most recent `last_mod` among the sent contacts, if reported.
        most_recent_lastmod: Option<u32>,
    },
    /// Self info.
    SelfInfo(SelfInfo),
    /// Message queued for sending.
    Sent(SentResponse),
    /// Queued direct message. Carries an SNR on newer firmware.
    ContactMessage(ContactMessage),
    /// Queued channel message. Carries an SNR on newer firmware.
    ChannelMessage(ChannelMessage),
    /// Device clock.
    CurrentTime(u32),
    /// Offline queue is empty.
    NoMoreMessages,
    /// Exported advert packet.
    ExportContact(Vec<u8>),
    /// Battery voltage and storage.
    BatteryVoltage(BatteryStatus),
    /// Device info.
    DeviceInfo(DeviceInfo),
    /// Exported identity.
    PrivateKey([u8; PRIVATE_KEY_SIZE]),
    /// Private key operations are disabled.
    Disabled,
    /// Channel slot.
    ChannelInfo(ChannelInfo),
    /// Signing session opened.
    SignStart(SignSession),
    /// Signature over the fed data.
    Signature([u8; SIGNATURE_SIZE]),

    /// An advert was heard from a known contact.
    Advert(PublicKey),
    /// The path to a contact changed.
    PathUpdated(PublicKey),
    /// A sent message was acknowledged.
    SendConfirmed(SendConfirmation),
    /// Messages are waiting in the offline queue.
    MsgWaiting,
    /// Raw data packet.
    RawData(RawPacket),
    /// Login accepted.
    LoginSuccess(LoginSuccess),
    /// Login rejected.
    LoginFail {
        /// Server key prefix.
        server_prefix: PublicKeyPrefix,
    },
    /// Status reply.
    StatusResponse(StatusResponse),
    /// Raw receive log line.
    LogRxData(RawPacket),
    /// Trace result.
    TraceData(TraceData),
    /// Advert from a node not yet in the contact table.
    NewAdvert(Contact),
    /// Telemetry reply.
    TelemetryResponse(TelemetryResponse),
    /// Binary request reply.
    BinaryResponse(BinaryResponse),
}

impl Notification {
    /// The code this notification travels under.
    pub fn code(&self) -> NotificationCode {
        match self {
            Notification::Ok => NotificationCode::Ok,
            Notification::Err(_) => NotificationCode::Err,
            Notification::ContactsStart { .. } => NotificationCode::ContactsStart,
            Notification::Contact(_) => NotificationCode::Contact,
            Notification::EndOfContacts { .. } => NotificationCode::EndOfContacts,
            Notification::SelfInfo(_) => NotificationCode::SelfInfo,
            Notification::Sent(_) => NotificationCode::Sent,
            Notification::ContactMessage(m) if m.snr_x4.is_some() => {
                NotificationCode::ContactMsgRecvV3
            }
            Notification::ContactMessage(_) => NotificationCode::ContactMsgRecv,
            Notification::ChannelMessage(m) if m.snr_x4.is_some() => {
                NotificationCode::ChannelMsgRecvV3
            }
            Notification::ChannelMessage(_) => NotificationCode::ChannelMsgRecv,
            Notification::CurrentTime(_) => NotificationCode::CurrTime,
            Notification::NoMoreMessages => NotificationCode::NoMoreMessages,
            Notification::ExportContact(_) => NotificationCode::ExportContact,
            Notification::BatteryVoltage(_) => NotificationCode::BatteryVoltage,
            Notification::DeviceInfo(_) => NotificationCode::DeviceInfo,
            Notification::PrivateKey(_) => NotificationCode::PrivateKey,
            Notification::Disabled => NotificationCode::Disabled,
            Notification::ChannelInfo(_) => NotificationCode::ChannelInfo,
            Notification::SignStart(_) => NotificationCode::SignStart,
            Notification::Signature(_) => NotificationCode::Signature,
            Notification::Advert(_) => NotificationCode::Advert,
            Notification::PathUpdated(_) => NotificationCode::PathUpdated,
            Notification::SendConfirmed(_) => NotificationCode::SendConfirmed,
            Notification::MsgWaiting => NotificationCode::MsgWaiting,
            Notification::RawData(_) => NotificationCode::RawData,
            Notification::LoginSuccess(_) => NotificationCode::LoginSuccess,
            Notification::LoginFail { .. } => NotificationCode::LoginFail,
            Notification::StatusResponse(_) => NotificationCode::StatusResponse,
            Notification::LogRxData(_) => NotificationCode::LogRxData,
            Notification::TraceData(_) => NotificationCode::TraceData,
            Notification::NewAdvert(_) => NotificationCode::NewAdvert,
            Notification::TelemetryResponse(_) => NotificationCode::TelemetryResponse,
            Notification::BinaryResponse(_) => NotificationCode::BinaryResponse,
        }
    }

    /// Decode a whole frame, code byte first.
    pub fn decode_frame(frame: &[u8]) -> Result<Self, ProtocolError> {
        match frame.split_first() {
            Some((&code, payload)) => Self::decode(code, payload),
            None => Err(ProtocolError::EmptyFrame),
        }
    }

    /// Decode the payload that followed `code`.
    pub fn decode(code: u8, payload: &[u8]) -> Result<Self, ProtocolError> {
        let kind = NotificationCode::try_from(code)?;
        let mut r = Reader::new(code, payload);

        let notification = match kind {
            NotificationCode::Ok => Notification::Ok,

            NotificationCode::Err => {
                let code = match payload.len() {
                    0 => DeviceErrorCode::Unknown,
                    _ => DeviceErrorCode::from(r.u8()?),
                };
                Notification::Err(DeviceError::new(code))
            }

            NotificationCode::ContactsStart => Notification::ContactsStart {
                count: optional_u32(&mut r)?,
            },

            NotificationCode::Contact => Notification::Contact(read_contact(&mut r)?),

            NotificationCode::EndOfContacts => Notification::EndOfContacts {
                most_recent_lastmod: optional_u32(&mut r)?,
            },

            NotificationCode::SelfInfo => {
                let info = SelfInfo {
                    advert_type: r.u8()?,
                    tx_power: r.u8()?,
                    max_tx_power: r.u8()?,
                    public_key: PublicKey(r.array()?),
                    adv_lat: micro_to_degrees(r.i32()?),
                    adv_lon: micro_to_degrees(r.i32()?),
                    multi_acks: r.u8()?,
                    advert_loc_policy: r.u8()?,
                    telemetry_modes: r.u8()?,
                    manual_add_contacts: r.u8()?,
                    radio_freq_mhz: from_milli_units(r.u32()?),
                    radio_bw_khz: from_milli_units(r.u32()?),
                    radio_sf: r.u8()?,
                    radio_cr: r.u8()?,
                    name: read_trailing_string(r.rest()),
                };
                Notification::SelfInfo(info)
            }

            NotificationCode::Sent => Notification::Sent(SentResponse {
                result: r.i8()?,
                expected_ack_crc: r.u32()?,
                est_timeout_ms: r.u32()?,
            }),

            NotificationCode::ContactMsgRecv | NotificationCode::ContactMsgRecvV3 => {
                let snr_x4 = read_v3_header(&mut r, kind == NotificationCode::ContactMsgRecvV3)?;
                Notification::ContactMessage(ContactMessage {
                    sender_prefix: PublicKeyPrefix(r.array()?),
                    path_len: r.u8()?,
                    text_type: TextType::from(r.u8()?),
                    sender_time: r.u32()?,
                    snr_x4,
                    text: read_trailing_string(r.rest()),
                })
            }

            NotificationCode::ChannelMsgRecv | NotificationCode::ChannelMsgRecvV3 => {
                let snr_x4 = read_v3_header(&mut r, kind == NotificationCode::ChannelMsgRecvV3)?;
                Notification::ChannelMessage(ChannelMessage {
                    channel_index: r.u8()?,
                    path_len: r.u8()?,
                    text_type: TextType::from(r.u8()?),
                    sender_time: r.u32()?,
                    snr_x4,
                    text: read_trailing_string(r.rest()),
                })
            }

            NotificationCode::CurrTime => Notification::CurrentTime(r.u32()?),

            NotificationCode::NoMoreMessages => Notification::NoMoreMessages,

            NotificationCode::ExportContact => Notification::ExportContact(r.rest().to_vec()),

            NotificationCode::BatteryVoltage => {
                let millivolts = r.u16()?;
                let storage = if r.remaining() == 0 {
                    None
                } else {
                    Some(StorageUsage {
                        used_kb: r.u32()?,
                        total_kb: r.u32()?,
                    })
                };
                Notification::BatteryVoltage(BatteryStatus {
                    millivolts,
                    storage,
                })
            }

            NotificationCode::DeviceInfo => Notification::DeviceInfo(DeviceInfo {
                firmware_version: r.i8()?,
                max_contacts_half: r.u8()?,
                max_channels: r.u8()?,
                ble_pin: r.u32()?,
                firmware_build_date: r.cstring(BUILD_DATE_FIELD_SIZE)?,
                manufacturer_model: read_trailing_string(r.rest()),
            }),

            NotificationCode::PrivateKey => Notification::PrivateKey(r.array()?),

            NotificationCode::Disabled => Notification::Disabled,

            NotificationCode::ChannelInfo => Notification::ChannelInfo(ChannelInfo {
                index: r.u8()?,
                name: r.cstring(NAME_FIELD_SIZE)?,
                secret: r.array()?,
            }),

            NotificationCode::SignStart => Notification::SignStart(SignSession {
                status: r.u8()?,
                max_sign_data_len: r.u32()?,
            }),

            NotificationCode::Signature => Notification::Signature(r.array()?),

            NotificationCode::Advert => Notification::Advert(PublicKey(r.array()?)),

            NotificationCode::PathUpdated => Notification::PathUpdated(PublicKey(r.array()?)),

            NotificationCode::SendConfirmed => Notification::SendConfirmed(SendConfirmation {
                ack_crc: r.u32()?,
                round_trip_ms: r.u32()?,
            }),

            NotificationCode::MsgWaiting => Notification::MsgWaiting,

            NotificationCode::RawData => {
                let snr_x4 = r.i8()?;
                let rssi = r.i8()?;
                r.u8()?; // reserved
                Notification::RawData(RawPacket {
                    snr_x4,
                    rssi,
                    data: r.rest().to_vec(),
                })
            }

            NotificationCode::LoginSuccess => {
                let permissions = r.u8()?;
                let server_prefix = PublicKeyPrefix(r.array()?);
                let details = if r.remaining() == 0 {
                    None
                } else {
                    Some(LoginDetails {
                        server_time: r.u32()?,
                        acl_permissions: r.u8()?,
                        firmware_level: r.u8()?,
                    })
                };
                Notification::LoginSuccess(LoginSuccess {
                    permissions,
                    server_prefix,
                    details,
                })
            }

            NotificationCode::LoginFail => {
                r.u8()?; // reserved
                Notification::LoginFail {
                    server_prefix: PublicKeyPrefix(r.array()?),
                }
            }

            NotificationCode::StatusResponse => {
                r.u8()?; // reserved
                Notification::StatusResponse(StatusResponse {
                    sender_prefix: PublicKeyPrefix(r.array()?),
                    data: r.rest().to_vec(),
                })
            }

            NotificationCode::LogRxData => Notification::LogRxData(RawPacket {
                snr_x4: r.i8()?,
                rssi: r.i8()?,
                data: r.rest().to_vec(),
            }),

            NotificationCode::TraceData => {
                r.u8()?; // reserved
                let path_len = r.u8()?;
                let flags = r.u8()?;
                let tag = r.u32()?;
                let auth_code = r.u32()?;
                let path_hashes = r.take(path_len as usize)?.to_vec();
                let path_snrs = r.take(TraceData::snr_count(path_len, flags))?.to_vec();
                Notification::TraceData(TraceData {
                    path_len,
                    flags,
                    tag,
                    auth_code,
                    path_hashes,
                    path_snrs,
                    final_snr_x4: r.i8()?,
                })
            }

            NotificationCode::NewAdvert => Notification::NewAdvert(read_contact(&mut r)?),

            NotificationCode::TelemetryResponse => {
                r.u8()?; // reserved
                Notification::TelemetryResponse(TelemetryResponse {
                    sender_prefix: PublicKeyPrefix(r.array()?),
                    lpp: r.rest().to_vec(),
                })
            }

            NotificationCode::BinaryResponse => {
                r.u8()?; // reserved
                Notification::BinaryResponse(BinaryResponse {
                    tag: r.u32()?,
                    data: r.rest().to_vec(),
                })
            }
        };

        r.finish()?;
        Ok(notification)
    }

    /// Encode as the device would send it, code byte first.
    ///
    /// Used by device doubles and tests; the host never sends notifications.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(64);
        buf.put_u8(self.code().as_u8());

        match self {
            Notification::Ok
            | Notification::NoMoreMessages
            | Notification::Disabled
            | Notification::MsgWaiting => {}

            Notification::Err(err) => buf.put_u8(err.code.raw()),

            Notification::ContactsStart { count } => {
                if let Some(count) = count {
                    buf.put_u32_le(*count);
                }
            }

            Notification::EndOfContacts {
                most_recent_lastmod,
            } => {
                if let Some(lastmod) = most_recent_lastmod {
                    buf.put_u32_le(*lastmod);
                }
            }

            Notification::Contact(contact) | Notification::NewAdvert(contact) => {
                put_contact(&mut buf, contact)?
            }

            Notification::SelfInfo(info) => {
                buf.put_u8(info.advert_type);
                buf.put_u8(info.tx_power);
                buf.put_u8(info.max_tx_power);
                buf.put_slice(info.public_key.as_bytes());
                buf.put_i32_le(degrees_to_micro(info.adv_lat));
                buf.put_i32_le(degrees_to_micro(info.adv_lon));
                buf.put_u8(info.multi_acks);
                buf.put_u8(info.advert_loc_policy);
                buf.put_u8(info.telemetry_modes);
                buf.put_u8(info.manual_add_contacts);
                buf.put_u32_le(to_milli_units(info.radio_freq_mhz));
                buf.put_u32_le(to_milli_units(info.radio_bw_khz));
                buf.put_u8(info.radio_sf);
                buf.put_u8(info.radio_cr);
                buf.put_slice(info.name.as_bytes());
            }

            Notification::Sent(sent) => {
                buf.put_i8(sent.result);
                buf.put_u32_le(sent.expected_ack_crc);
                buf.put_u32_le(sent.est_timeout_ms);
            }

            Notification::ContactMessage(msg) => {
                put_v3_header(&mut buf, msg.snr_x4);
                buf.put_slice(msg.sender_prefix.as_bytes());
                buf.put_u8(msg.path_len);
                buf.put_u8(msg.text_type.into());
                buf.put_u32_le(msg.sender_time);
                buf.put_slice(msg.text.as_bytes());
            }

            Notification::ChannelMessage(msg) => {
                put_v3_header(&mut buf, msg.snr_x4);
                buf.put_u8(msg.channel_index);
                buf.put_u8(msg.path_len);
                buf.put_u8(msg.text_type.into());
                buf.put_u32_le(msg.sender_time);
                buf.put_slice(msg.text.as_bytes());
            }

            Notification::CurrentTime(time) => buf.put_u32_le(*time),

            Notification::ExportContact(data) => buf.put_slice(data),

            Notification::BatteryVoltage(status) => {
                buf.put_u16_le(status.millivolts);
                if let Some(storage) = status.storage {
                    buf.put_u32_le(storage.used_kb);
                    buf.put_u32_le(storage.total_kb);
                }
            }

            Notification::DeviceInfo(info) => {
                buf.put_i8(info.firmware_version);
                buf.put_u8(info.max_contacts_half);
                buf.put_u8(info.max_channels);
                buf.put_u32_le(info.ble_pin);
                put_cstring(&mut buf, &info.firmware_build_date, BUILD_DATE_FIELD_SIZE)?;
                buf.put_slice(info.manufacturer_model.as_bytes());
            }

            Notification::PrivateKey(key) => buf.put_slice(key),

            Notification::ChannelInfo(channel) => {
                buf.put_u8(channel.index);
                put_cstring(&mut buf, &channel.name, NAME_FIELD_SIZE)?;
                buf.put_slice(&channel.secret);
            }

            Notification::SignStart(session) => {
                buf.put_u8(session.status);
                buf.put_u32_le(session.max_sign_data_len);
            }

            Notification::Signature(signature) => buf.put_slice(signature),

            Notification::Advert(key) | Notification::PathUpdated(key) => {
                buf.put_slice(key.as_bytes())
            }

            Notification::SendConfirmed(confirmation) => {
                buf.put_u32_le(confirmation.ack_crc);
                buf.put_u32_le(confirmation.round_trip_ms);
            }

            Notification::RawData(packet) => {
                buf.put_i8(packet.snr_x4);
                buf.put_i8(packet.rssi);
                buf.put_u8(0);
                buf.put_slice(&packet.data);
            }

            Notification::LoginSuccess(login) => {
                buf.put_u8(login.permissions);
                buf.put_slice(login.server_prefix.as_bytes());
                if let Some(details) = login.details {
                    buf.put_u32_le(details.server_time);
                    buf.put_u8(details.acl_permissions);
                    buf.put_u8(details.firmware_level);
                }
            }

            Notification::LoginFail { server_prefix } => {
                buf.put_u8(0);
                buf.put_slice(server_prefix.as_bytes());
            }

            Notification::StatusResponse(status) => {
                buf.put_u8(0);
                buf.put_slice(status.sender_prefix.as_bytes());
                buf.put_slice(&status.data);
            }

            Notification::LogRxData(packet) => {
                buf.put_i8(packet.snr_x4);
                buf.put_i8(packet.rssi);
                buf.put_slice(&packet.data);
            }

            Notification::TraceData(trace) => {
                let expected = TraceData::snr_count(trace.path_len, trace.flags);
                if trace.path_hashes.len() != trace.path_len as usize
                    || trace.path_snrs.len() != expected
                {
                    return Err(ProtocolError::Malformed {
                        code: PUSH_CODE_TRACE_DATA,
                        expected: trace.path_len as usize + expected,
                        actual: trace.path_hashes.len() + trace.path_snrs.len(),
                    });
                }
                buf.put_u8(0);
                buf.put_u8(trace.path_len);
                buf.put_u8(trace.flags);
                buf.put_u32_le(trace.tag);
                buf.put_u32_le(trace.auth_code);
                buf.put_slice(&trace.path_hashes);
                buf.put_slice(&trace.path_snrs);
                buf.put_i8(trace.final_snr_x4);
            }

            Notification::TelemetryResponse(telemetry) => {
                buf.put_u8(0);
                buf.put_slice(telemetry.sender_prefix.as_bytes());
                buf.put_slice(&telemetry.lpp);
            }

            Notification::BinaryResponse(response) => {
                buf.put_u8(0);
                buf.put_u32_le(response.tag);
                buf.put_slice(&response.data);
            }
        }

        Ok(buf)
    }
}

/// A `u32` that is either present as the whole payload or absent.
fn optional_u32(r: &mut Reader<'_>) -> Result<Option<u32>, ProtocolError> {
    match r.remaining() {
        0 => Ok(None),
        _ => Ok(Some(r.u32()?)),
    }
}

/// SNR byte plus two reserved bytes that lead newer message layouts.
fn read_v3_header(r: &mut Reader<'_>, v3: bool) -> Result<Option<i8>, ProtocolError> {
    if !v3 {
        return Ok(None);
    }
    let snr = r.i8()?;
    r.take(2)?;
    Ok(Some(snr))
}

fn put_v3_header(buf: &mut Vec<u8>, snr_x4: Option<i8>) {
    if let Some(snr) = snr_x4 {
        buf.put_i8(snr);
        buf.put_bytes(0, 2);
    }
}

fn read_contact(r: &mut Reader<'_>) -> Result<Contact, ProtocolError> {
    let public_key = PublicKey(r.array()?);
    let contact_type = r.u8()?;
    let flags = r.u8()?;
    let out_path_len = r.i8()?;
    let out_path = r.array()?;
    let adv_name = r.cstring(NAME_FIELD_SIZE)?;
    Ok(Contact {
        public_key,
        contact_type,
        flags,
        out_path_len,
        out_path,
        adv_name,
        last_advert: r.u32()?,
        adv_lat: r.i32()?,
        adv_lon: r.i32()?,
        last_mod: r.u32()?,
    })
}
