//! Command layer.
//!
//! A [`Connection`] owns one transport and one notification center. Every
//! operation subscribes to the codes that can end it, writes its command,
//! waits for a terminating notification or for its [`CancelToken`], and
//! releases the subscription on every exit path.
//!
//! Commands are serialized: at most one is in flight per connection.
//! Callers that want concurrency open more connections.

use std::time::{SystemTime, UNIX_EPOCH};

use meshcore_companion_protocol::wire::degrees_to_micro;
use meshcore_companion_protocol::{
    AdvertKind, BatteryStatus, BinaryResponse, ChannelInfo, Command, Contact, DeviceInfo,
    LoginSuccess, Notification, NotificationCode, OtherParams, PublicKey, PublicKeyPrefix,
    RadioParams, ReceivedMessage, SelfInfo, SentResponse, StatusResponse, TelemetryResponse,
    TextType, TraceData, MAX_SIGN_CHUNK, PRIVATE_KEY_SIZE, SIGNATURE_SIZE,
};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::center::{DeliveryPolicy, NotificationCenter, ShutdownReason, Subscription};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::push::PushStream;
use crate::transport::{FrameSink, Transport};

/// Lifecycle of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, transport not started.
    Fresh,
    /// Transport started; commands may run.
    Open,
    /// Disconnected or the link failed. Terminal.
    Closed,
}

/// Outcome of a login attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginResult {
    /// The server accepted the password.
    Success(LoginSuccess),
    /// The server rejected it.
    Failed,
}

enum Step<T> {
    Done(T),
    Continue,
}

const OK_CODES: &[NotificationCode] = &[NotificationCode::Ok, NotificationCode::Err];

const MESSAGE_CODES: &[NotificationCode] = &[
    NotificationCode::ContactMsgRecv,
    NotificationCode::ChannelMsgRecv,
    NotificationCode::ContactMsgRecvV3,
    NotificationCode::ChannelMsgRecvV3,
    NotificationCode::NoMoreMessages,
    NotificationCode::Err,
];

fn unexpected(operation: &'static str, notification: &Notification) -> Error {
    Error::UnexpectedNotification {
        operation,
        code: notification.code().as_u8(),
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// One command's hold on the connection: the command lock, its
/// subscription and its effective cancel token.
struct Exchange<'a> {
    connection: &'a Connection,
    operation: &'static str,
    sub: Subscription,
    cancel: CancelToken,
    _guard: MutexGuard<'a, ()>,
}

impl Exchange<'_> {
    async fn send(&self, command: &Command) -> Result<()> {
        let frame = command.encode()?;
        self.write(&frame).await
    }

    async fn write(&self, frame: &[u8]) -> Result<()> {
        trace!(
            operation = self.operation,
            frame = %hex::encode(frame),
            "sending"
        );
        let mut transport = self.connection.transport.lock().await;
        transport.write(frame).await?;
        Ok(())
    }

    /// Next notification for this command. `Err` and `Disabled` become
    /// errors here, so handlers only see the notifications they asked for.
    ///
    /// A fired token wins over anything already queued.
    async fn recv(&mut self) -> Result<Notification> {
        let next = tokio::select! {
            biased;
            reason = self.cancel.cancelled() => return Err(reason.into()),
            next = self.sub.recv() => next,
        };
        match next {
            Some(Ok(frame)) => match frame.decode()? {
                Notification::Err(err) => Err(Error::Device(err)),
                Notification::Disabled => Err(Error::PrivateKeyDisabled),
                notification => Ok(notification),
            },
            Some(Err(reason)) => Err(reason.into()),
            None => Err(Error::Closed),
        }
    }
}

/// A session with one companion radio.
///
/// Share it between tasks behind an `Arc`; every operation takes `&self`.
pub struct Connection {
    transport: AsyncMutex<Box<dyn Transport>>,
    center: NotificationCenter,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    commands: AsyncMutex<()>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wrap a transport. Nothing is started until [`connect`](Self::connect).
    pub fn new(transport: impl Transport + 'static, config: ConnectionConfig) -> Self {
        Connection {
            transport: AsyncMutex::new(Box::new(transport)),
            center: NotificationCenter::new(),
            config,
            state: Mutex::new(ConnectionState::Fresh),
            commands: AsyncMutex::new(()),
        }
    }

    /// Current lifecycle state. A failed link reads as `Closed`.
    pub fn state(&self) -> ConnectionState {
        if self.center.is_shut_down() {
            return ConnectionState::Closed;
        }
        *self.state.lock()
    }

    /// The configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// The notification center fed by the transport.
    pub fn center(&self) -> &NotificationCenter {
        &self.center
    }

    /// Start the transport. Calling it on an open connection does nothing.
    pub async fn connect(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        let state = self.state();
        match state {
            ConnectionState::Open => return Ok(()),
            ConnectionState::Closed => return Err(Error::Closed),
            ConnectionState::Fresh => {}
        }
        transport.start(FrameSink::new(&self.center)).await?;

        let mut state = self.state.lock();
        if *state != ConnectionState::Fresh {
            return Err(Error::Closed);
        }
        *state = ConnectionState::Open;
        debug!("connected");
        Ok(())
    }

    /// Close the connection.
    ///
    /// Pending operations fail with [`Error::Closed`], later ones too.
    /// Calling it again does nothing.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.lock(), ConnectionState::Closed);
        if previous == ConnectionState::Closed {
            return Ok(());
        }
        self.center.shutdown(ShutdownReason::Disconnected);
        let mut transport = self.transport.lock().await;
        transport.disconnect().await?;
        debug!("disconnected");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            ConnectionState::Fresh => Err(Error::NotConnected),
            ConnectionState::Closed => Err(Error::Closed),
        }
    }

    async fn begin(
        &self,
        operation: &'static str,
        codes: &[NotificationCode],
        cancel: &CancelToken,
    ) -> Result<Exchange<'_>> {
        self.ensure_open()?;
        let cancel = match self.config.command_timeout() {
            Some(timeout) => cancel.limited(timeout),
            None => cancel.clone(),
        };
        if let Some(reason) = cancel.reason() {
            return Err(reason.into());
        }

        let guard = tokio::select! {
            biased;
            guard = self.commands.lock() => guard,
            reason = cancel.cancelled() => return Err(reason.into()),
        };
        self.ensure_open()?;
        let sub = self.center.subscribe(codes, self.config.response_policy())?;
        Ok(Exchange {
            connection: self,
            operation,
            sub,
            cancel,
            _guard: guard,
        })
    }

    /// Run one command to completion. `handle` sees every notification the
    /// subscription yields until it returns `Done` or an error.
    async fn request<T>(
        &self,
        operation: &'static str,
        command: Command,
        codes: &[NotificationCode],
        cancel: &CancelToken,
        mut handle: impl FnMut(Notification) -> Result<Step<T>>,
    ) -> Result<T> {
        let frame = command.encode()?;
        debug!(operation, "command started");
        let result = async {
            let mut exchange = self.begin(operation, codes, cancel).await?;
            exchange.write(&frame).await?;
            loop {
                if let Step::Done(value) = handle(exchange.recv().await?)? {
                    return Ok(value);
                }
            }
        }
        .await;
        match &result {
            Ok(_) => debug!(operation, "command finished"),
            Err(e) => debug!(operation, error = %e, "command failed"),
        }
        result
    }

    async fn expect_ok(
        &self,
        operation: &'static str,
        command: Command,
        cancel: &CancelToken,
    ) -> Result<()> {
        self.request(operation, command, OK_CODES, cancel, |n| match n {
            Notification::Ok => Ok(Step::Done(())),
            other => Err(unexpected(operation, &other)),
        })
        .await
    }

    /// Handshake: announce the app and read the node's own settings.
    pub async fn get_self_info(&self, cancel: &CancelToken) -> Result<SelfInfo> {
        let command = Command::AppStart {
            app_version: self.config.app_version,
            app_name: self.config.app_name.clone(),
        };
        let codes = &[NotificationCode::SelfInfo, NotificationCode::Err];
        self.request("get_self_info", command, codes, cancel, |n| match n {
            Notification::SelfInfo(info) => Ok(Step::Done(info)),
            other => Err(unexpected("get_self_info", &other)),
        })
        .await
    }

    /// Firmware version and build information.
    pub async fn device_query(&self, cancel: &CancelToken) -> Result<DeviceInfo> {
        let command = Command::DeviceQuery {
            app_version: self.config.app_version,
        };
        let codes = &[NotificationCode::DeviceInfo, NotificationCode::Err];
        self.request("device_query", command, codes, cancel, |n| match n {
            Notification::DeviceInfo(info) => Ok(Step::Done(info)),
            other => Err(unexpected("device_query", &other)),
        })
        .await
    }

    /// Add a contact, or update it if the key is known.
    pub async fn add_or_update_contact(
        &self,
        contact: &Contact,
        cancel: &CancelToken,
    ) -> Result<()> {
        let command = Command::AddUpdateContact {
            contact: contact.clone(),
        };
        self.expect_ok("add_or_update_contact", command, cancel).await
    }

    /// Every contact, or those modified after `since`.
    ///
    /// On cancellation or error the contacts received so far are dropped;
    /// use [`get_contacts_into`](Self::get_contacts_into) to keep them.
    pub async fn get_contacts(
        &self,
        since: Option<u32>,
        cancel: &CancelToken,
    ) -> Result<Vec<Contact>> {
        let mut contacts = Vec::new();
        self.get_contacts_into(since, &mut contacts, cancel).await?;
        Ok(contacts)
    }

    /// Like [`get_contacts`](Self::get_contacts), appending to `out`.
    ///
    /// On cancellation or error `out` keeps the contacts received so far.
    pub async fn get_contacts_into(
        &self,
        since: Option<u32>,
        out: &mut Vec<Contact>,
        cancel: &CancelToken,
    ) -> Result<()> {
        let codes = &[
            NotificationCode::ContactsStart,
            NotificationCode::Contact,
            NotificationCode::EndOfContacts,
            NotificationCode::Err,
        ];
        let command = Command::GetContacts { since };
        self.request("get_contacts", command, codes, cancel, |n| match n {
            Notification::ContactsStart { count } => {
                trace!(?count, "contact enumeration started");
                Ok(Step::Continue)
            }
            Notification::Contact(contact) => {
                out.push(contact);
                Ok(Step::Continue)
            }
            Notification::EndOfContacts { .. } => Ok(Step::Done(())),
            other => Err(unexpected("get_contacts", &other)),
        })
        .await
    }

    /// Delete a contact.
    pub async fn remove_contact(&self, public_key: &PublicKey, cancel: &CancelToken) -> Result<()> {
        let command = Command::RemoveContact {
            public_key: *public_key,
        };
        self.expect_ok("remove_contact", command, cancel).await
    }

    /// Broadcast a contact as a zero-hop advert.
    pub async fn share_contact(&self, public_key: &PublicKey, cancel: &CancelToken) -> Result<()> {
        let command = Command::ShareContact {
            public_key: *public_key,
        };
        self.expect_ok("share_contact", command, cancel).await
    }

    /// Export a contact, or this node with `None`, as an advert packet.
    pub async fn export_contact(
        &self,
        public_key: Option<&PublicKey>,
        cancel: &CancelToken,
    ) -> Result<Vec<u8>> {
        let command = Command::ExportContact {
            public_key: public_key.copied(),
        };
        let codes = &[NotificationCode::ExportContact, NotificationCode::Err];
        self.request("export_contact", command, codes, cancel, |n| match n {
            Notification::ExportContact(packet) => Ok(Step::Done(packet)),
            other => Err(unexpected("export_contact", &other)),
        })
        .await
    }

    /// Import a contact from an advert packet.
    pub async fn import_contact(&self, packet: &[u8], cancel: &CancelToken) -> Result<()> {
        let command = Command::ImportContact {
            data: packet.to_vec(),
        };
        self.expect_ok("import_contact", command, cancel).await
    }

    /// Forget the learned path to a contact.
    pub async fn reset_path(&self, public_key: &PublicKey, cancel: &CancelToken) -> Result<()> {
        let command = Command::ResetPath {
            public_key: *public_key,
        };
        self.expect_ok("reset_path", command, cancel).await
    }

    /// Send a direct message, stamped with the host clock.
    pub async fn send_text_message(
        &self,
        recipient: PublicKeyPrefix,
        text_type: TextType,
        attempt: u8,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<SentResponse> {
        let command = Command::SendTextMessage {
            text_type,
            attempt,
            timestamp: unix_now(),
            recipient_prefix: recipient,
            text: text.to_string(),
        };
        let codes = &[NotificationCode::Sent, NotificationCode::Err];
        self.request("send_text_message", command, codes, cancel, |n| match n {
            Notification::Sent(sent) => Ok(Step::Done(sent)),
            other => Err(unexpected("send_text_message", &other)),
        })
        .await
    }

    /// Send a plain message on a channel slot.
    pub async fn send_channel_text_message(
        &self,
        channel_idx: u8,
        text: &str,
        cancel: &CancelToken,
    ) -> Result<()> {
        let command = Command::SendChannelTextMessage {
            text_type: TextType::Plain,
            channel_idx,
            timestamp: unix_now(),
            text: text.to_string(),
        };
        self.expect_ok("send_channel_text_message", command, cancel)
            .await
    }

    /// Pop the next queued message; `None` once the queue is empty.
    pub async fn sync_next_message(&self, cancel: &CancelToken) -> Result<Option<ReceivedMessage>> {
        self.request(
            "sync_next_message",
            Command::SyncNextMessage,
            MESSAGE_CODES,
            cancel,
            |n| match n {
                Notification::ContactMessage(msg) => {
                    Ok(Step::Done(Some(ReceivedMessage::Contact(msg))))
                }
                Notification::ChannelMessage(msg) => {
                    Ok(Step::Done(Some(ReceivedMessage::Channel(msg))))
                }
                Notification::NoMoreMessages => Ok(Step::Done(None)),
                other => Err(unexpected("sync_next_message", &other)),
            },
        )
        .await
    }

    /// The device clock, in unix seconds.
    pub async fn get_device_time(&self, cancel: &CancelToken) -> Result<u32> {
        let codes = &[NotificationCode::CurrTime, NotificationCode::Err];
        self.request("get_device_time", Command::GetDeviceTime, codes, cancel, |n| {
            match n {
                Notification::CurrentTime(secs) => Ok(Step::Done(secs)),
                other => Err(unexpected("get_device_time", &other)),
            }
        })
        .await
    }

    /// Set the device clock.
    pub async fn set_device_time(&self, time_secs: u32, cancel: &CancelToken) -> Result<()> {
        self.expect_ok("set_device_time", Command::SetDeviceTime { time_secs }, cancel)
            .await
    }

    /// Battery voltage in millivolts.
    pub async fn get_battery_voltage(&self, cancel: &CancelToken) -> Result<u16> {
        Ok(self.get_battery_status(cancel).await?.millivolts)
    }

    /// Battery voltage plus storage usage where the firmware reports it.
    pub async fn get_battery_status(&self, cancel: &CancelToken) -> Result<BatteryStatus> {
        let codes = &[NotificationCode::BatteryVoltage, NotificationCode::Err];
        self.request(
            "get_battery_status",
            Command::GetBatteryVoltage,
            codes,
            cancel,
            |n| match n {
                Notification::BatteryVoltage(status) => Ok(Step::Done(status)),
                other => Err(unexpected("get_battery_status", &other)),
            },
        )
        .await
    }

    /// Broadcast a self advert.
    pub async fn send_advert(&self, kind: AdvertKind, cancel: &CancelToken) -> Result<()> {
        self.expect_ok("send_advert", Command::SendSelfAdvert { kind }, cancel)
            .await
    }

    /// Set the name carried in adverts.
    pub async fn set_advert_name(&self, name: &str, cancel: &CancelToken) -> Result<()> {
        let command = Command::SetAdvertName {
            name: name.to_string(),
        };
        self.expect_ok("set_advert_name", command, cancel).await
    }

    /// Set the advertised position, in degrees.
    pub async fn set_advert_lat_lon(&self, lat: f64, lon: f64, cancel: &CancelToken) -> Result<()> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(Error::InvalidArgument(format!(
                "position out of range: {lat}, {lon}"
            )));
        }
        let command = Command::SetAdvertLatLon {
            lat: degrees_to_micro(lat),
            lon: degrees_to_micro(lon),
        };
        self.expect_ok("set_advert_lat_lon", command, cancel).await
    }

    /// Set frequency, bandwidth, spreading factor and coding rate.
    pub async fn set_radio_params(&self, params: RadioParams, cancel: &CancelToken) -> Result<()> {
        self.expect_ok("set_radio_params", Command::SetRadioParams { params }, cancel)
            .await
    }

    /// Set transmit power in dBm.
    pub async fn set_tx_power(&self, power_dbm: u8, cancel: &CancelToken) -> Result<()> {
        self.expect_ok("set_tx_power", Command::SetTxPower { power_dbm }, cancel)
            .await
    }

    /// Set miscellaneous node parameters.
    pub async fn set_other_params(&self, params: OtherParams, cancel: &CancelToken) -> Result<()> {
        self.expect_ok("set_other_params", Command::SetOtherParams { params }, cancel)
            .await
    }

    /// The node identity.
    ///
    /// Fails with [`Error::PrivateKeyDisabled`] if the firmware does not
    /// allow it.
    pub async fn export_private_key(&self, cancel: &CancelToken) -> Result<[u8; PRIVATE_KEY_SIZE]> {
        let codes = &[
            NotificationCode::PrivateKey,
            NotificationCode::Disabled,
            NotificationCode::Err,
        ];
        self.request(
            "export_private_key",
            Command::ExportPrivateKey,
            codes,
            cancel,
            |n| match n {
                Notification::PrivateKey(key) => Ok(Step::Done(key)),
                other => Err(unexpected("export_private_key", &other)),
            },
        )
        .await
    }

    /// Replace the node identity.
    pub async fn import_private_key(
        &self,
        identity: &[u8; PRIVATE_KEY_SIZE],
        cancel: &CancelToken,
    ) -> Result<()> {
        let codes = &[
            NotificationCode::Ok,
            NotificationCode::Disabled,
            NotificationCode::Err,
        ];
        let command = Command::ImportPrivateKey {
            identity: *identity,
        };
        self.request("import_private_key", command, codes, cancel, |n| match n {
            Notification::Ok => Ok(Step::Done(())),
            other => Err(unexpected("import_private_key", &other)),
        })
        .await
    }

    /// Read a channel slot.
    pub async fn get_channel(&self, index: u8, cancel: &CancelToken) -> Result<ChannelInfo> {
        let codes = &[NotificationCode::ChannelInfo, NotificationCode::Err];
        self.request("get_channel", Command::GetChannel { index }, codes, cancel, |n| {
            match n {
                Notification::ChannelInfo(info) => Ok(Step::Done(info)),
                other => Err(unexpected("get_channel", &other)),
            }
        })
        .await
    }

    /// Write a channel slot.
    pub async fn set_channel(&self, channel: &ChannelInfo, cancel: &CancelToken) -> Result<()> {
        let command = Command::SetChannel {
            channel: channel.clone(),
        };
        self.expect_ok("set_channel", command, cancel).await
    }

    /// Ask a repeater or room server for its status.
    ///
    /// Waits past the `Sent` acknowledgement for the reply from `public_key`;
    /// replies from other nodes are skipped.
    pub async fn get_status(
        &self,
        public_key: &PublicKey,
        cancel: &CancelToken,
    ) -> Result<StatusResponse> {
        let codes = &[
            NotificationCode::Sent,
            NotificationCode::StatusResponse,
            NotificationCode::Err,
        ];
        let command = Command::SendStatusRequest {
            public_key: *public_key,
        };
        self.request("get_status", command, codes, cancel, |n| match n {
            Notification::Sent(sent) => {
                trace!(ack = sent.expected_ack_crc, "status request sent");
                Ok(Step::Continue)
            }
            Notification::StatusResponse(status) if status.sender_prefix.matches(public_key) => {
                Ok(Step::Done(status))
            }
            Notification::StatusResponse(status) => {
                trace!(from = %status.sender_prefix, "status from another node");
                Ok(Step::Continue)
            }
            other => Err(unexpected("get_status", &other)),
        })
        .await
    }

    /// Ask a node for telemetry. Matches replies like
    /// [`get_status`](Self::get_status).
    pub async fn get_telemetry(
        &self,
        public_key: &PublicKey,
        cancel: &CancelToken,
    ) -> Result<TelemetryResponse> {
        let codes = &[
            NotificationCode::Sent,
            NotificationCode::TelemetryResponse,
            NotificationCode::Err,
        ];
        let command = Command::SendTelemetryRequest {
            public_key: *public_key,
        };
        self.request("get_telemetry", command, codes, cancel, |n| match n {
            Notification::Sent(_) => Ok(Step::Continue),
            Notification::TelemetryResponse(reply) if reply.sender_prefix.matches(public_key) => {
                Ok(Step::Done(reply))
            }
            Notification::TelemetryResponse(reply) => {
                trace!(from = %reply.sender_prefix, "telemetry from another node");
                Ok(Step::Continue)
            }
            other => Err(unexpected("get_telemetry", &other)),
        })
        .await
    }

    /// Sign `message` with the node identity.
    ///
    /// Opens a signing session, feeds the message in chunks no larger than
    /// the device allows, and returns the signature that answers the last
    /// chunk.
    pub async fn sign(&self, message: &[u8], cancel: &CancelToken) -> Result<[u8; SIGNATURE_SIZE]> {
        const OPERATION: &str = "sign";
        if message.is_empty() {
            return Err(Error::InvalidArgument("nothing to sign".into()));
        }
        let codes = &[
            NotificationCode::SignStart,
            NotificationCode::Ok,
            NotificationCode::Signature,
            NotificationCode::Err,
        ];
        debug!(operation = OPERATION, len = message.len(), "command started");

        let result = async {
            let mut exchange = self.begin(OPERATION, codes, cancel).await?;
            exchange.send(&Command::SignStart).await?;
            let session = match exchange.recv().await? {
                Notification::SignStart(session) => session,
                other => return Err(unexpected(OPERATION, &other)),
            };

            let chunk_size = (session.max_sign_data_len as usize).min(MAX_SIGN_CHUNK);
            if chunk_size == 0 {
                return Err(Error::SignUnavailable);
            }
            let chunks: Vec<&[u8]> = message.chunks(chunk_size).collect();
            trace!(chunk_size, chunks = chunks.len(), "signing session open");

            let Some((last, rest)) = chunks.split_last() else {
                return Err(Error::InvalidArgument("nothing to sign".into()));
            };
            for chunk in rest {
                exchange.send(&Command::SignData { data: chunk.to_vec() }).await?;
                match exchange.recv().await? {
                    Notification::Ok => {}
                    other => return Err(unexpected(OPERATION, &other)),
                }
            }
            exchange.send(&Command::SignData { data: last.to_vec() }).await?;
            match exchange.recv().await? {
                Notification::Signature(signature) => Ok(signature),
                other => Err(unexpected(OPERATION, &other)),
            }
        }
        .await;

        match &result {
            Ok(_) => debug!(operation = OPERATION, "command finished"),
            Err(e) => debug!(operation = OPERATION, error = %e, "command failed"),
        }
        result
    }

    /// Reboot the device. Nothing is awaited after the write.
    pub async fn reboot(&self, cancel: &CancelToken) -> Result<()> {
        let exchange = self.begin("reboot", &[], cancel).await?;
        exchange.send(&Command::Reboot).await?;
        debug!("reboot requested");
        Ok(())
    }

    /// Send raw bytes along an explicit path.
    pub async fn send_raw_data(
        &self,
        path: &[u8],
        payload: &[u8],
        cancel: &CancelToken,
    ) -> Result<()> {
        let command = Command::SendRawData {
            path: path.to_vec(),
            payload: payload.to_vec(),
        };
        self.expect_ok("send_raw_data", command, cancel).await
    }

    /// Log in to a repeater or room server.
    pub async fn send_login(
        &self,
        public_key: &PublicKey,
        password: &str,
        cancel: &CancelToken,
    ) -> Result<LoginResult> {
        let codes = &[
            NotificationCode::Sent,
            NotificationCode::LoginSuccess,
            NotificationCode::LoginFail,
            NotificationCode::Err,
        ];
        let command = Command::SendLogin {
            public_key: *public_key,
            password: password.to_string(),
        };
        self.request("send_login", command, codes, cancel, |n| match n {
            Notification::Sent(_) => Ok(Step::Continue),
            Notification::LoginSuccess(login) if login.server_prefix.matches(public_key) => {
                Ok(Step::Done(LoginResult::Success(login)))
            }
            Notification::LoginFail { server_prefix } if server_prefix.matches(public_key) => {
                Ok(Step::Done(LoginResult::Failed))
            }
            Notification::LoginSuccess(_) | Notification::LoginFail { .. } => Ok(Step::Continue),
            other => Err(unexpected("send_login", &other)),
        })
        .await
    }

    /// Trace a path and wait for the result carrying `tag`.
    pub async fn send_trace_path(
        &self,
        tag: u32,
        auth: u32,
        flags: u8,
        path: &[u8],
        cancel: &CancelToken,
    ) -> Result<TraceData> {
        let codes = &[
            NotificationCode::Sent,
            NotificationCode::TraceData,
            NotificationCode::Err,
        ];
        let command = Command::SendTracePath {
            tag,
            auth,
            flags,
            path: path.to_vec(),
        };
        self.request("send_trace_path", command, codes, cancel, |n| match n {
            Notification::Sent(_) => Ok(Step::Continue),
            Notification::TraceData(trace) if trace.tag == tag => Ok(Step::Done(trace)),
            Notification::TraceData(_) => Ok(Step::Continue),
            other => Err(unexpected("send_trace_path", &other)),
        })
        .await
    }

    /// Send an opaque request and wait for the reply tagged with the
    /// request's expected ACK.
    pub async fn send_binary_request(
        &self,
        public_key: &PublicKey,
        data: &[u8],
        cancel: &CancelToken,
    ) -> Result<BinaryResponse> {
        let codes = &[
            NotificationCode::Sent,
            NotificationCode::BinaryResponse,
            NotificationCode::Err,
        ];
        let command = Command::SendBinaryRequest {
            public_key: *public_key,
            data: data.to_vec(),
        };
        let mut tag = None;
        self.request("send_binary_request", command, codes, cancel, |n| match n {
            Notification::Sent(sent) => {
                tag = Some(sent.expected_ack_crc);
                Ok(Step::Continue)
            }
            Notification::BinaryResponse(reply) if Some(reply.tag) == tag => Ok(Step::Done(reply)),
            Notification::BinaryResponse(_) => Ok(Step::Continue),
            other => Err(unexpected("send_binary_request", &other)),
        })
        .await
    }

    /// Stream push notifications with the given codes.
    ///
    /// The stream holds one pending notification; if it is not read, a newer
    /// one replaces it. It ends when `cancel` fires or the connection closes.
    pub fn subscribe_push(
        &self,
        codes: &[NotificationCode],
        cancel: &CancelToken,
    ) -> Result<PushStream> {
        if let Some(code) = codes.iter().find(|code| !code.is_push()) {
            return Err(Error::InvalidArgument(format!(
                "{code:?} is not a push notification"
            )));
        }
        self.ensure_open()?;
        let sub = self.center.subscribe(codes, DeliveryPolicy::Coalesce)?;
        Ok(PushStream::new(sub, cancel.clone()))
    }
}
