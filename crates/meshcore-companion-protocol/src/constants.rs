//! Protocol constants
//!
//! Literal byte values fixed by the companion radio firmware, plus the sizes
//! of the fixed-width fields that appear in frames.

// ============================================================================
// Command Codes (host → device)
// ============================================================================

/// Handshake; the device answers with its self info.
pub const CMD_APP_START: u8 = 1;
/// Send a direct text message to a contact.
pub const CMD_SEND_TXT_MSG: u8 = 2;
/// Send a text message on a group channel.
pub const CMD_SEND_CHANNEL_TXT_MSG: u8 = 3;
/// Enumerate contacts, optionally only those modified since a timestamp.
pub const CMD_GET_CONTACTS: u8 = 4;
/// Read the device clock.
pub const CMD_GET_DEVICE_TIME: u8 = 5;
/// Set the device clock.
pub const CMD_SET_DEVICE_TIME: u8 = 6;
/// Broadcast a self advertisement.
pub const CMD_SEND_SELF_ADVERT: u8 = 7;
/// Set the name carried in adverts.
pub const CMD_SET_ADVERT_NAME: u8 = 8;
/// Add a contact, or update it if the key is already known.
pub const CMD_ADD_UPDATE_CONTACT: u8 = 9;
/// Pop the next message from the device's offline queue.
pub const CMD_SYNC_NEXT_MESSAGE: u8 = 10;
/// Set frequency, bandwidth, spreading factor and coding rate.
pub const CMD_SET_RADIO_PARAMS: u8 = 11;
/// Set the transmit power.
pub const CMD_SET_TX_POWER: u8 = 12;
/// Forget the learned path to a contact.
pub const CMD_RESET_PATH: u8 = 13;
/// Set the position carried in adverts.
pub const CMD_SET_ADVERT_LATLON: u8 = 14;
/// Delete a contact.
pub const CMD_REMOVE_CONTACT: u8 = 15;
/// Share a contact as a zero-hop advert.
pub const CMD_SHARE_CONTACT: u8 = 16;
/// Export a contact (or self) as an advert packet.
pub const CMD_EXPORT_CONTACT: u8 = 17;
/// Import a contact from an advert packet.
pub const CMD_IMPORT_CONTACT: u8 = 18;
/// Reboot the device.
pub const CMD_REBOOT: u8 = 19;
/// Read the battery voltage (and storage usage on newer firmware).
pub const CMD_GET_BATTERY_VOLTAGE: u8 = 20;
/// Query firmware version and build information.
pub const CMD_DEVICE_QUERY: u8 = 22;
/// Export the node identity.
pub const CMD_EXPORT_PRIVATE_KEY: u8 = 23;
/// Import a node identity.
pub const CMD_IMPORT_PRIVATE_KEY: u8 = 24;
/// Send a raw data packet along a path.
pub const CMD_SEND_RAW_DATA: u8 = 25;
/// Log in to a repeater or room server.
pub const CMD_SEND_LOGIN: u8 = 26;
/// Request status from a repeater or room server.
pub const CMD_SEND_STATUS_REQ: u8 = 27;
/// Read a group channel slot.
pub const CMD_GET_CHANNEL: u8 = 31;
/// Write a group channel slot.
pub const CMD_SET_CHANNEL: u8 = 32;
/// Begin a signing session.
pub const CMD_SIGN_START: u8 = 33;
/// Feed one chunk of data into the signing session.
pub const CMD_SIGN_DATA: u8 = 34;
/// Finish a signing session.
pub const CMD_SIGN_FINISH: u8 = 35;
/// Send a trace packet along a path.
pub const CMD_SEND_TRACE_PATH: u8 = 36;
/// Set miscellaneous node parameters.
pub const CMD_SET_OTHER_PARAMS: u8 = 38;
/// Request telemetry from a node.
pub const CMD_SEND_TELEMETRY_REQ: u8 = 39;
/// Send an opaque binary request to a node.
pub const CMD_SEND_BINARY_REQ: u8 = 50;

// ============================================================================
// Response Codes (device → host, reply to a command)
// ============================================================================

/// Command succeeded.
pub const RESP_CODE_OK: u8 = 0;
/// Command failed; optionally followed by an error code byte.
pub const RESP_CODE_ERR: u8 = 1;
/// Contact enumeration begins.
pub const RESP_CODE_CONTACTS_START: u8 = 2;
/// One contact record.
pub const RESP_CODE_CONTACT: u8 = 3;
/// Contact enumeration finished.
pub const RESP_CODE_END_OF_CONTACTS: u8 = 4;
/// Self info (reply to `CMD_APP_START`).
pub const RESP_CODE_SELF_INFO: u8 = 5;
/// Message queued for sending (reply to the `CMD_SEND_*` family).
pub const RESP_CODE_SENT: u8 = 6;
/// Queued direct message.
pub const RESP_CODE_CONTACT_MSG_RECV: u8 = 7;
/// Queued channel message.
pub const RESP_CODE_CHANNEL_MSG_RECV: u8 = 8;
/// Device clock value.
pub const RESP_CODE_CURR_TIME: u8 = 9;
/// Offline queue is empty.
pub const RESP_CODE_NO_MORE_MESSAGES: u8 = 10;
/// Exported advert packet.
pub const RESP_CODE_EXPORT_CONTACT: u8 = 11;
/// Battery voltage.
pub const RESP_CODE_BATTERY_VOLTAGE: u8 = 12;
/// Device info (reply to `CMD_DEVICE_QUERY`).
pub const RESP_CODE_DEVICE_INFO: u8 = 13;
/// Exported identity.
pub const RESP_CODE_PRIVATE_KEY: u8 = 14;
/// Private key operations are disabled on this device.
pub const RESP_CODE_DISABLED: u8 = 15;
/// Queued direct message with SNR (newer firmware).
pub const RESP_CODE_CONTACT_MSG_RECV_V3: u8 = 16;
/// Queued channel message with SNR (newer firmware).
pub const RESP_CODE_CHANNEL_MSG_RECV_V3: u8 = 17;
/// Group channel slot.
pub const RESP_CODE_CHANNEL_INFO: u8 = 18;
/// Signing session opened.
pub const RESP_CODE_SIGN_START: u8 = 19;
/// Signature over the fed data.
pub const RESP_CODE_SIGNATURE: u8 = 20;

// ============================================================================
// Push Codes (device → host, unsolicited)
// ============================================================================

/// An advert was heard.
pub const PUSH_CODE_ADVERT: u8 = 0x80;
/// The path to a contact changed.
pub const PUSH_CODE_PATH_UPDATED: u8 = 0x81;
/// A sent message was acknowledged.
pub const PUSH_CODE_SEND_CONFIRMED: u8 = 0x82;
/// New messages are waiting in the offline queue.
pub const PUSH_CODE_MSG_WAITING: u8 = 0x83;
/// Raw data packet received.
pub const PUSH_CODE_RAW_DATA: u8 = 0x84;
/// Login accepted.
pub const PUSH_CODE_LOGIN_SUCCESS: u8 = 0x85;
/// Login rejected.
pub const PUSH_CODE_LOGIN_FAIL: u8 = 0x86;
/// Status reply from a server node.
pub const PUSH_CODE_STATUS_RESPONSE: u8 = 0x87;
/// Raw receive log line.
pub const PUSH_CODE_LOG_RX_DATA: u8 = 0x88;
/// Trace result.
pub const PUSH_CODE_TRACE_DATA: u8 = 0x89;
/// Advert from an unknown node while auto-add is off.
pub const PUSH_CODE_NEW_ADVERT: u8 = 0x8A;
/// Telemetry reply.
pub const PUSH_CODE_TELEMETRY_RESPONSE: u8 = 0x8B;
/// Binary request reply.
pub const PUSH_CODE_BINARY_RESPONSE: u8 = 0x8C;

/// First code of the push range.
pub const PUSH_CODE_FIRST: u8 = PUSH_CODE_ADVERT;
/// Last code of the push range.
pub const PUSH_CODE_LAST: u8 = PUSH_CODE_BINARY_RESPONSE;

// ============================================================================
// Device Error Codes (payload of `RESP_CODE_ERR`)
// ============================================================================

/// Unspecified error (also assumed when the payload is empty).
pub const ERR_CODE_UNKNOWN: u8 = 0;
/// Command not supported by this firmware.
pub const ERR_CODE_UNSUPPORTED_CMD: u8 = 1;
/// Contact, channel or item not found.
pub const ERR_CODE_NOT_FOUND: u8 = 2;
/// Contact or channel table is full.
pub const ERR_CODE_TABLE_FULL: u8 = 3;
/// Device is in the wrong state for this command.
pub const ERR_CODE_BAD_STATE: u8 = 4;
/// Flash filesystem error.
pub const ERR_CODE_FILE_IO_ERROR: u8 = 5;
/// Argument rejected.
pub const ERR_CODE_ILLEGAL_ARG: u8 = 6;

// ============================================================================
// Text and Advert Types
// ============================================================================

/// Plain text message.
pub const TXT_TYPE_PLAIN: u8 = 0;
/// CLI command text.
pub const TXT_TYPE_CLI_DATA: u8 = 1;
/// Signed plain text.
pub const TXT_TYPE_SIGNED_PLAIN: u8 = 2;

/// Advert heard only by direct neighbours.
pub const SELF_ADVERT_ZERO_HOP: u8 = 0;
/// Advert flooded through the mesh.
pub const SELF_ADVERT_FLOOD: u8 = 1;

/// Chat node.
pub const ADV_TYPE_CHAT: u8 = 1;
/// Repeater.
pub const ADV_TYPE_REPEATER: u8 = 2;
/// Room server.
pub const ADV_TYPE_ROOM_SERVER: u8 = 3;

// ============================================================================
// Sizes
// ============================================================================

/// Public key length.
pub const PUB_KEY_SIZE: usize = 32;
/// Public key prefix length used to address peers.
pub const PUB_KEY_PREFIX_SIZE: usize = 6;
/// Exported/imported identity length.
pub const PRIVATE_KEY_SIZE: usize = 64;
/// Signature length.
pub const SIGNATURE_SIZE: usize = 64;
/// Out-path field width in a contact record.
pub const MAX_PATH_SIZE: usize = 64;
/// Width of name fields (contact name, channel name).
pub const NAME_FIELD_SIZE: usize = 32;
/// Width of the firmware build date field.
pub const BUILD_DATE_FIELD_SIZE: usize = 12;
/// Channel secret length.
pub const CHANNEL_SECRET_SIZE: usize = 16;
/// Largest chunk a single `CMD_SIGN_DATA` may carry.
pub const MAX_SIGN_CHUNK: usize = 128;
/// Largest frame the serial framing will carry.
pub const MAX_FRAME_SIZE: usize = 1024;

/// Encoded contact record: key, type, flags, path len, path, name,
/// last advert, lat, lon, last modified.
pub const CONTACT_RECORD_SIZE: usize =
    PUB_KEY_SIZE + 3 + MAX_PATH_SIZE + NAME_FIELD_SIZE + 4 + 4 + 4 + 4;

// ============================================================================
// Link layer
// ============================================================================

/// BLE GATT service exposing the companion protocol (Nordic UART layout).
pub const BLE_SERVICE_UUID: &str = "6E400001-B5A3-F393-E0A9-E50E24DCCA9E";
/// Characteristic the host writes command frames to.
pub const BLE_RX_CHARACTERISTIC_UUID: &str = "6E400002-B5A3-F393-E0A9-E50E24DCCA9E";
/// Characteristic the device notifies frames on.
pub const BLE_TX_CHARACTERISTIC_UUID: &str = "6E400003-B5A3-F393-E0A9-E50E24DCCA9E";
/// Advertised local name prefix of companion radios.
pub const BLE_NAME_PREFIX: &str = "MeshCore-";
/// Serial line speed (8-N-1).
pub const SERIAL_BAUD_RATE: u32 = 115_200;
