//! Typed views of the first byte of every frame.

use crate::constants::*;
use crate::error::ProtocolError;

/// Code byte of a host → device frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandCode {
    AppStart = CMD_APP_START,
    SendTextMsg = CMD_SEND_TXT_MSG,
    SendChannelTextMsg = CMD_SEND_CHANNEL_TXT_MSG,
    GetContacts = CMD_GET_CONTACTS,
    GetDeviceTime = CMD_GET_DEVICE_TIME,
    SetDeviceTime = CMD_SET_DEVICE_TIME,
    SendSelfAdvert = CMD_SEND_SELF_ADVERT,
    SetAdvertName = CMD_SET_ADVERT_NAME,
    AddUpdateContact = CMD_ADD_UPDATE_CONTACT,
    SyncNextMessage = CMD_SYNC_NEXT_MESSAGE,
    SetRadioParams = CMD_SET_RADIO_PARAMS,
    SetTxPower = CMD_SET_TX_POWER,
    ResetPath = CMD_RESET_PATH,
    SetAdvertLatLon = CMD_SET_ADVERT_LATLON,
    RemoveContact = CMD_REMOVE_CONTACT,
    ShareContact = CMD_SHARE_CONTACT,
    ExportContact = CMD_EXPORT_CONTACT,
    ImportContact = CMD_IMPORT_CONTACT,
    Reboot = CMD_REBOOT,
    GetBatteryVoltage = CMD_GET_BATTERY_VOLTAGE,
    DeviceQuery = CMD_DEVICE_QUERY,
    ExportPrivateKey = CMD_EXPORT_PRIVATE_KEY,
    ImportPrivateKey = CMD_IMPORT_PRIVATE_KEY,
    SendRawData = CMD_SEND_RAW_DATA,
    SendLogin = CMD_SEND_LOGIN,
    SendStatusReq = CMD_SEND_STATUS_REQ,
    GetChannel = CMD_GET_CHANNEL,
    SetChannel = CMD_SET_CHANNEL,
    SignStart = CMD_SIGN_START,
    SignData = CMD_SIGN_DATA,
    SignFinish = CMD_SIGN_FINISH,
    SendTracePath = CMD_SEND_TRACE_PATH,
    SetOtherParams = CMD_SET_OTHER_PARAMS,
    SendTelemetryReq = CMD_SEND_TELEMETRY_REQ,
    SendBinaryReq = CMD_SEND_BINARY_REQ,
}

impl CommandCode {
    const ALL: [CommandCode; 35] = [
        CommandCode::AppStart,
        CommandCode::SendTextMsg,
        CommandCode::SendChannelTextMsg,
        CommandCode::GetContacts,
        CommandCode::GetDeviceTime,
        CommandCode::SetDeviceTime,
        CommandCode::SendSelfAdvert,
        CommandCode::SetAdvertName,
        CommandCode::AddUpdateContact,
        CommandCode::SyncNextMessage,
        CommandCode::SetRadioParams,
        CommandCode::SetTxPower,
        CommandCode::ResetPath,
        CommandCode::SetAdvertLatLon,
        CommandCode::RemoveContact,
        CommandCode::ShareContact,
        CommandCode::ExportContact,
        CommandCode::ImportContact,
        CommandCode::Reboot,
        CommandCode::GetBatteryVoltage,
        CommandCode::DeviceQuery,
        CommandCode::ExportPrivateKey,
        CommandCode::ImportPrivateKey,
        CommandCode::SendRawData,
        CommandCode::SendLogin,
        CommandCode::SendStatusReq,
        CommandCode::GetChannel,
        CommandCode::SetChannel,
        CommandCode::SignStart,
        CommandCode::SignData,
        CommandCode::SignFinish,
        CommandCode::SendTracePath,
        CommandCode::SetOtherParams,
        CommandCode::SendTelemetryReq,
        CommandCode::SendBinaryReq,
    ];

    /// The wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<CommandCode> for u8 {
    fn from(code: CommandCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        CommandCode::ALL
            .iter()
            .copied()
            .find(|c| *c as u8 == value)
            .ok_or(ProtocolError::UnknownCommand(value))
    }
}

/// Code byte of a device → host frame.
///
/// Codes below `0x80` answer a command; codes in `0x80..=0x8C` are pushed
/// by the device whenever something happens on the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum NotificationCode {
    Ok = RESP_CODE_OK,
    Err = RESP_CODE_ERR,
    ContactsStart = RESP_CODE_CONTACTS_START,
    Contact = RESP_CODE_CONTACT,
    EndOfContacts = RESP_CODE_END_OF_CONTACTS,
    SelfInfo = RESP_CODE_SELF_INFO,
    Sent = RESP_CODE_SENT,
    ContactMsgRecv = RESP_CODE_CONTACT_MSG_RECV,
    ChannelMsgRecv = RESP_CODE_CHANNEL_MSG_RECV,
    CurrTime = RESP_CODE_CURR_TIME,
    NoMoreMessages = RESP_CODE_NO_MORE_MESSAGES,
    ExportContact = RESP_CODE_EXPORT_CONTACT,
    BatteryVoltage = RESP_CODE_BATTERY_VOLTAGE,
    DeviceInfo = RESP_CODE_DEVICE_INFO,
    PrivateKey = RESP_CODE_PRIVATE_KEY,
    Disabled = RESP_CODE_DISABLED,
    ContactMsgRecvV3 = RESP_CODE_CONTACT_MSG_RECV_V3,
    ChannelMsgRecvV3 = RESP_CODE_CHANNEL_MSG_RECV_V3,
    ChannelInfo = RESP_CODE_CHANNEL_INFO,
    SignStart = RESP_CODE_SIGN_START,
    Signature = RESP_CODE_SIGNATURE,
    Advert = PUSH_CODE_ADVERT,
    PathUpdated = PUSH_CODE_PATH_UPDATED,
    SendConfirmed = PUSH_CODE_SEND_CONFIRMED,
    MsgWaiting = PUSH_CODE_MSG_WAITING,
    RawData = PUSH_CODE_RAW_DATA,
    LoginSuccess = PUSH_CODE_LOGIN_SUCCESS,
    LoginFail = PUSH_CODE_LOGIN_FAIL,
    StatusResponse = PUSH_CODE_STATUS_RESPONSE,
    LogRxData = PUSH_CODE_LOG_RX_DATA,
    TraceData = PUSH_CODE_TRACE_DATA,
    NewAdvert = PUSH_CODE_NEW_ADVERT,
    TelemetryResponse = PUSH_CODE_TELEMETRY_RESPONSE,
    BinaryResponse = PUSH_CODE_BINARY_RESPONSE,
}

impl NotificationCode {
    const RESPONSES: [NotificationCode; 21] = [
        NotificationCode::Ok,
        NotificationCode::Err,
        NotificationCode::ContactsStart,
        NotificationCode::Contact,
        NotificationCode::EndOfContacts,
        NotificationCode::SelfInfo,
        NotificationCode::Sent,
        NotificationCode::ContactMsgRecv,
        NotificationCode::ChannelMsgRecv,
        NotificationCode::CurrTime,
        NotificationCode::NoMoreMessages,
        NotificationCode::ExportContact,
        NotificationCode::BatteryVoltage,
        NotificationCode::DeviceInfo,
        NotificationCode::PrivateKey,
        NotificationCode::Disabled,
        NotificationCode::ContactMsgRecvV3,
        NotificationCode::ChannelMsgRecvV3,
        NotificationCode::ChannelInfo,
        NotificationCode::SignStart,
        NotificationCode::Signature,
    ];

    const PUSHES: [NotificationCode; 13] = [
        NotificationCode::Advert,
        NotificationCode::PathUpdated,
        NotificationCode::SendConfirmed,
        NotificationCode::MsgWaiting,
        NotificationCode::RawData,
        NotificationCode::LoginSuccess,
        NotificationCode::LoginFail,
        NotificationCode::StatusResponse,
        NotificationCode::LogRxData,
        NotificationCode::TraceData,
        NotificationCode::NewAdvert,
        NotificationCode::TelemetryResponse,
        NotificationCode::BinaryResponse,
    ];

    /// The wire value.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether the device may send this code without being asked.
    pub fn is_push(self) -> bool {
        (PUSH_CODE_FIRST..=PUSH_CODE_LAST).contains(&(self as u8))
    }

    /// Every push code, in wire order.
    pub fn push_codes() -> &'static [NotificationCode] {
        &Self::PUSHES
    }
}

impl From<NotificationCode> for u8 {
    fn from(code: NotificationCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for NotificationCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let table: &[NotificationCode] = if value >= PUSH_CODE_FIRST {
            &Self::PUSHES
        } else {
            &Self::RESPONSES
        };
        table
            .iter()
            .copied()
            .find(|c| *c as u8 == value)
            .ok_or(ProtocolError::UnknownNotification(value))
    }
}
