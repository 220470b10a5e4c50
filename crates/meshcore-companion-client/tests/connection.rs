//! Integration tests driving a `Connection` against an in-memory device.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use meshcore_companion_client::protocol::{
    AdvertKind, BinaryResponse, ChannelInfo, Contact, DeviceErrorCode, DeviceInfo, LoginSuccess,
    Notification, NotificationCode, PublicKey, PublicKeyPrefix, ReceivedMessage, SentResponse,
    SignSession, StatusResponse, TextType, TraceData, ADV_TYPE_CHAT, ADV_TYPE_REPEATER,
    PUB_KEY_SIZE,
};
use meshcore_companion_client::{
    CancelToken, Connection, ConnectionConfig, ConnectionState, DeviceHandle, Error,
    LoginResult, MemoryTransport, TransportError,
};

// ============================================================================
// Helpers
// ============================================================================

async fn open_with(config: ConnectionConfig) -> (Arc<Connection>, DeviceHandle) {
    let (transport, device) = MemoryTransport::pair();
    let conn = Arc::new(Connection::new(transport, config));
    conn.connect().await.unwrap();
    (conn, device)
}

async fn open() -> (Arc<Connection>, DeviceHandle) {
    open_with(ConnectionConfig::default()).await
}

fn key(first: u8) -> PublicKey {
    let mut bytes = [0u8; PUB_KEY_SIZE];
    bytes[0] = first;
    PublicKey(bytes)
}

fn contact(name: &str, first: u8) -> Contact {
    let mut contact = Contact {
        public_key: key(first),
        contact_type: ADV_TYPE_CHAT,
        adv_name: name.into(),
        last_advert: 1_700_000_000,
        adv_lat: 47_606_209,
        adv_lon: -122_332_071,
        last_mod: 1_700_000_050,
        ..Default::default()
    };
    contact.set_path(&[0xA1, 0xB2]);
    contact
}

fn send(device: &DeviceHandle, notification: Notification) {
    assert!(device.send(&notification).unwrap(), "host is not listening");
}

fn sent(ack: u32) -> Notification {
    Notification::Sent(SentResponse {
        result: 0,
        expected_ack_crc: ack,
        est_timeout_ms: 1000,
    })
}

// ============================================================================
// Basic exchanges
// ============================================================================

#[tokio::test]
async fn test_get_device_time() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_device_time(&CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(&frame[..], &[5]);
    device.inject(&[9, 0x64, 0x00, 0x00, 0x00]);

    assert_eq!(task.await.unwrap().unwrap(), 100);
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_remove_contact_device_error() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.remove_contact(&key(0x2A), &CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    let mut expected = vec![15, 0x2A];
    expected.extend_from_slice(&[0u8; 31]);
    assert_eq!(&frame[..], &expected[..]);
    device.inject(&[1, 0x05]);

    let err = task.await.unwrap().unwrap_err();
    match &err {
        Error::Device(device_err) => assert_eq!(device_err.code, DeviceErrorCode::FileIo),
        other => panic!("expected device error, got {other:?}"),
    }
    assert_eq!(err.to_string(), "response error: 5 (file io error)");
}

#[tokio::test]
async fn test_empty_err_payload_is_unknown() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.set_device_time(1_700_000_000, &CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(&frame[..], &[6, 0x00, 0xF1, 0x53, 0x65]);
    device.inject(&[1]);

    match task.await.unwrap() {
        Err(Error::Device(err)) => assert_eq!(err.code, DeviceErrorCode::Unknown),
        other => panic!("expected device error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_contacts_collects_until_end() {
    let (conn, mut device) = open().await;
    let a = contact("Alice", 0x0A);
    let b = contact("Bob", 0x0B);
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_contacts(None, &CancelToken::new()).await }
    });

    assert_eq!(&device.next_frame().await.unwrap()[..], &[4]);
    send(&device, Notification::ContactsStart { count: None });
    send(&device, Notification::Contact(a.clone()));
    // A repeated start marker is ignored
    send(&device, Notification::ContactsStart { count: Some(2) });
    send(&device, Notification::Contact(b.clone()));
    send(
        &device,
        Notification::EndOfContacts {
            most_recent_lastmod: None,
        },
    );

    assert_eq!(task.await.unwrap().unwrap(), vec![a, b]);
}

#[tokio::test]
async fn test_get_contacts_since_filter() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_contacts(Some(100), &CancelToken::new()).await }
    });

    assert_eq!(&device.next_frame().await.unwrap()[..], &[4, 100, 0, 0, 0]);
    send(
        &device,
        Notification::EndOfContacts {
            most_recent_lastmod: Some(100),
        },
    );
    assert!(task.await.unwrap().unwrap().is_empty());
}

#[tokio::test]
async fn test_get_contacts_err_aborts() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_contacts(None, &CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    send(&device, Notification::Contact(contact("Alice", 1)));
    device.inject(&[1, 4]);
    match task.await.unwrap() {
        Err(Error::Device(err)) => assert_eq!(err.code, DeviceErrorCode::BadState),
        other => panic!("expected device error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_contacts_malformed_contact_aborts() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_contacts(None, &CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    device.inject(&[3, 1, 2, 3]);
    assert!(matches!(task.await.unwrap(), Err(Error::Protocol(_))));
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_get_contacts_keeps_partial_results_on_cancel() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    let a = contact("Alice", 0x0A);
    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move {
            let mut out = Vec::new();
            let result = conn.get_contacts_into(None, &mut out, &cancel).await;
            (result, out)
        }
    });

    device.next_frame().await.unwrap();
    send(&device, Notification::ContactsStart { count: Some(2) });
    send(&device, Notification::Contact(a.clone()));
    // Let the listing consume both frames before cancelling
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    cancel.cancel();

    let (result, out) = task.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(out, vec![a]);
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_send_text_message() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move {
            conn.send_text_message(
                PublicKeyPrefix([0x2A, 0, 0, 0, 0, 0]),
                TextType::Plain,
                0,
                "hello",
                &CancelToken::new(),
            )
            .await
        }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(frame[0], 2);
    assert_eq!(&frame[1..3], &[0, 0]);
    let sent_at = u32::from_le_bytes([frame[3], frame[4], frame[5], frame[6]]);
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as u32;
    assert!(now.abs_diff(sent_at) <= 5);
    assert_eq!(&frame[7..13], &[0x2A, 0, 0, 0, 0, 0]);
    assert_eq!(&frame[13..], b"hello");

    send(&device, sent(1_234_567_890));
    assert_eq!(
        task.await.unwrap().unwrap(),
        SentResponse {
            result: 0,
            expected_ack_crc: 1_234_567_890,
            est_timeout_ms: 1000,
        }
    );
}

#[tokio::test]
async fn test_send_channel_text_message() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move {
            conn.send_channel_text_message(2, "hi all", &CancelToken::new())
                .await
        }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(&frame[..3], &[3, 0, 2]);
    assert_eq!(&frame[7..], b"hi all");
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_sync_next_message() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.sync_next_message(&cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[10]);
    // v3 channel message: snr, 2 reserved, channel, path_len, type, time, text
    let mut frame = vec![17, 0xF4, 0, 0, 1, 0xFF, 0];
    frame.extend_from_slice(&1_700_000_000u32.to_le_bytes());
    frame.extend_from_slice(b"on air");
    device.inject(&frame);
    match task.await.unwrap().unwrap() {
        Some(ReceivedMessage::Channel(msg)) => {
            assert_eq!(msg.channel_index, 1);
            assert_eq!(msg.snr_x4, Some(-12));
            assert_eq!(msg.text, "on air");
        }
        other => panic!("expected channel message, got {other:?}"),
    }

    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sync_next_message(&cancel).await }
    });
    device.next_frame().await.unwrap();
    send(&device, Notification::NoMoreMessages);
    assert_eq!(task.await.unwrap().unwrap(), None);
}

#[tokio::test]
async fn test_get_self_info_sends_app_start() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_self_info(&CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    let mut expected = vec![1, 3, 0, 0, 0, 0, 0, 0];
    expected.extend_from_slice(b"meshcore-companion");
    assert_eq!(&frame[..], &expected[..]);

    let info = meshcore_companion_client::protocol::SelfInfo {
        advert_type: ADV_TYPE_CHAT,
        tx_power: 20,
        max_tx_power: 22,
        public_key: key(7),
        adv_lat: 47.5,
        adv_lon: -122.25,
        radio_freq_mhz: 910.525,
        radio_bw_khz: 62.5,
        radio_sf: 7,
        radio_cr: 5,
        name: "Base".into(),
        ..Default::default()
    };
    send(&device, Notification::SelfInfo(info.clone()));
    assert_eq!(task.await.unwrap().unwrap(), info);
}

#[tokio::test]
async fn test_battery_and_channel() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.get_battery_voltage(&cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[20]);
    device.inject(&[12, 0x10, 0x0E]);
    assert_eq!(task.await.unwrap().unwrap(), 3600);

    let channel = ChannelInfo {
        index: 1,
        name: "#ops".into(),
        secret: [0x5A; 16],
    };
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_channel(1, &cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[31, 1]);
    send(&device, Notification::ChannelInfo(channel.clone()));
    assert_eq!(task.await.unwrap().unwrap(), channel);
}

#[tokio::test]
async fn test_reboot_writes_without_waiting() {
    let (conn, mut device) = open().await;
    conn.reboot(&CancelToken::new()).await.unwrap();
    assert_eq!(&device.next_frame().await.unwrap()[..], b"\x13reboot");
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_device_query_uses_configured_version() {
    let config = ConnectionConfig {
        app_version: 7,
        ..Default::default()
    };
    let (conn, mut device) = open_with(config).await;
    let info = DeviceInfo {
        firmware_version: 8,
        max_contacts_half: 175,
        max_channels: 40,
        ble_pin: 123456,
        firmware_build_date: "12 Mar 2025".into(),
        manufacturer_model: "Heltec V3".into(),
    };

    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.device_query(&CancelToken::new()).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[22, 7]);
    send(&device, Notification::DeviceInfo(info.clone()));

    let reply = task.await.unwrap().unwrap();
    assert_eq!(reply, info);
    assert_eq!(reply.max_contacts(), 350);
}

#[tokio::test]
async fn test_contact_housekeeping_commands() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    let keyed = |code: u8| {
        let mut frame = vec![code, 0x2A];
        frame.extend_from_slice(&[0u8; 31]);
        frame
    };

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.share_contact(&key(0x2A), &cancel).await }
    });
    assert_eq!(device.next_frame().await.unwrap().to_vec(), keyed(16));
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.reset_path(&key(0x2A), &cancel).await }
    });
    assert_eq!(device.next_frame().await.unwrap().to_vec(), keyed(13));
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();

    // Exporting self sends the bare command
    let advert = vec![0x11, 0x22, 0x33, 0x44];
    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.export_contact(None, &cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[17]);
    send(&device, Notification::ExportContact(advert.clone()));
    assert_eq!(task.await.unwrap().unwrap(), advert);

    let task = tokio::spawn({
        let conn = conn.clone();
        let advert = advert.clone();
        async move { conn.import_contact(&advert, &cancel).await }
    });
    assert_eq!(
        &device.next_frame().await.unwrap()[..],
        &[18, 0x11, 0x22, 0x33, 0x44]
    );
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_advert_settings() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.send_advert(AdvertKind::Flood, &cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[7, 1]);
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.set_advert_name("base-camp", &cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], b"\x08base-camp");
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();

    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.set_advert_lat_lon(47.606209, -122.332071, &cancel).await }
    });
    let frame = device.next_frame().await.unwrap();
    let mut expected = vec![14];
    expected.extend_from_slice(&47_606_209i32.to_le_bytes());
    expected.extend_from_slice(&(-122_332_071i32).to_le_bytes());
    assert_eq!(&frame[..], &expected[..]);
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();
}

// ============================================================================
// Private key
// ============================================================================

#[tokio::test]
async fn test_export_private_key_disabled() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.export_private_key(&CancelToken::new()).await }
    });

    assert_eq!(&device.next_frame().await.unwrap()[..], &[23]);
    send(&device, Notification::Disabled);
    assert!(matches!(
        task.await.unwrap(),
        Err(Error::PrivateKeyDisabled)
    ));
}

#[tokio::test]
async fn test_private_key_roundtrip() {
    let (conn, mut device) = open().await;
    let identity = [0x42u8; 64];
    let cancel = CancelToken::new();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.export_private_key(&cancel).await }
    });
    device.next_frame().await.unwrap();
    send(&device, Notification::PrivateKey(identity));
    assert_eq!(task.await.unwrap().unwrap(), identity);

    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.import_private_key(&identity, &cancel).await }
    });
    let frame = device.next_frame().await.unwrap();
    assert_eq!(frame[0], 24);
    assert_eq!(&frame[1..], &identity[..]);
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();
}

// ============================================================================
// Signing
// ============================================================================

#[tokio::test]
async fn test_sign_long_message_in_chunks() {
    let (conn, mut device) = open().await;
    let message: Vec<u8> = (0..129u32).map(|i| i as u8).collect();
    let task = tokio::spawn({
        let conn = conn.clone();
        let message = message.clone();
        async move { conn.sign(&message, &CancelToken::new()).await }
    });

    assert_eq!(&device.next_frame().await.unwrap()[..], &[33]);
    send(
        &device,
        Notification::SignStart(SignSession {
            status: 0,
            max_sign_data_len: 1024,
        }),
    );

    let chunk = device.next_frame().await.unwrap();
    assert_eq!(chunk[0], 34);
    assert_eq!(&chunk[1..], &message[..128]);
    send(&device, Notification::Ok);

    let chunk = device.next_frame().await.unwrap();
    assert_eq!(&chunk[..], &[34, 128]);
    let mut signature = [0u8; 64];
    for (i, b) in signature.iter_mut().enumerate() {
        *b = i as u8 + 1;
    }
    send(&device, Notification::Signature(signature));

    assert_eq!(task.await.unwrap().unwrap(), signature);
    assert!(device.try_next_frame().is_none());
}

#[tokio::test]
async fn test_sign_uses_smaller_device_limit() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sign(&[1, 2, 3, 4, 5], &CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    send(
        &device,
        Notification::SignStart(SignSession {
            status: 0,
            max_sign_data_len: 2,
        }),
    );
    for expected in [&[34u8, 1, 2][..], &[34, 3, 4][..]] {
        assert_eq!(&device.next_frame().await.unwrap()[..], expected);
        send(&device, Notification::Ok);
    }
    assert_eq!(&device.next_frame().await.unwrap()[..], &[34, 5]);
    send(&device, Notification::Signature([9; 64]));
    assert_eq!(task.await.unwrap().unwrap(), [9; 64]);
}

#[tokio::test]
async fn test_sign_zero_limit_is_unavailable() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sign(b"data", &CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    send(
        &device,
        Notification::SignStart(SignSession {
            status: 0,
            max_sign_data_len: 0,
        }),
    );
    assert!(matches!(task.await.unwrap(), Err(Error::SignUnavailable)));
    assert!(device.try_next_frame().is_none());
}

#[tokio::test]
async fn test_sign_device_error_aborts() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.sign(b"data", &CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    device.inject(&[1, 1]);
    match task.await.unwrap() {
        Err(Error::Device(err)) => assert_eq!(err.code, DeviceErrorCode::UnsupportedCommand),
        other => panic!("expected device error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sign_empty_message_is_rejected() {
    let (conn, mut device) = open().await;
    assert!(matches!(
        conn.sign(&[], &CancelToken::new()).await,
        Err(Error::InvalidArgument(_))
    ));
    assert!(device.try_next_frame().is_none());
}

// ============================================================================
// Remote requests
// ============================================================================

#[tokio::test]
async fn test_get_status_waits_for_matching_prefix() {
    let (conn, mut device) = open().await;
    let repeater = key(0x33);
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_status(&repeater, &CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(&frame[..4], &[27, 0, 0, 0]);
    assert_eq!(&frame[4..], repeater.as_bytes());

    send(&device, sent(77));
    send(
        &device,
        Notification::StatusResponse(StatusResponse {
            sender_prefix: key(0x44).prefix(),
            data: vec![1],
        }),
    );
    let wanted = StatusResponse {
        sender_prefix: repeater.prefix(),
        data: vec![2, 3],
    };
    send(&device, Notification::StatusResponse(wanted.clone()));
    assert_eq!(task.await.unwrap().unwrap(), wanted);
}

#[tokio::test]
async fn test_get_telemetry() {
    let (conn, mut device) = open().await;
    let node = key(0x21);
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_telemetry(&node, &CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(&frame[..4], &[39, 0, 0, 0]);
    let mut reply = vec![0x8B, 0];
    reply.extend_from_slice(node.prefix().as_bytes());
    reply.extend_from_slice(&[1, 0x67, 0x00, 0xE1]);
    device.inject(&reply);

    let telemetry = task.await.unwrap().unwrap();
    assert_eq!(telemetry.sender_prefix, node.prefix());
    assert_eq!(telemetry.lpp, vec![1, 0x67, 0x00, 0xE1]);
}

#[tokio::test]
async fn test_login_success_and_failure() {
    let (conn, mut device) = open().await;
    let server = key(0x55);
    let cancel = CancelToken::new();

    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.send_login(&server, "secret", &cancel).await }
    });
    let frame = device.next_frame().await.unwrap();
    assert_eq!(frame[0], 26);
    assert_eq!(&frame[33..], b"secret");
    send(&device, sent(1));
    let login = LoginSuccess {
        permissions: 1,
        server_prefix: server.prefix(),
        details: None,
    };
    send(&device, Notification::LoginSuccess(login));
    assert_eq!(task.await.unwrap().unwrap(), LoginResult::Success(login));

    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.send_login(&server, "wrong", &cancel).await }
    });
    device.next_frame().await.unwrap();
    send(
        &device,
        Notification::LoginFail {
            server_prefix: key(0x66).prefix(),
        },
    );
    send(
        &device,
        Notification::LoginFail {
            server_prefix: server.prefix(),
        },
    );
    assert_eq!(task.await.unwrap().unwrap(), LoginResult::Failed);
}

#[tokio::test]
async fn test_binary_request_matches_ack_tag() {
    let (conn, mut device) = open().await;
    let node = key(0x12);
    let task = tokio::spawn({
        let conn = conn.clone();
        async move {
            conn.send_binary_request(&node, &[0x01, 0x02], &CancelToken::new())
                .await
        }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(frame[0], 50);
    assert_eq!(&frame[33..], &[0x01, 0x02]);
    send(&device, sent(0xCAFE));
    send(
        &device,
        Notification::BinaryResponse(BinaryResponse {
            tag: 0xBEEF,
            data: vec![0],
        }),
    );
    let wanted = BinaryResponse {
        tag: 0xCAFE,
        data: vec![7, 7],
    };
    send(&device, Notification::BinaryResponse(wanted.clone()));
    assert_eq!(task.await.unwrap().unwrap(), wanted);
}

#[tokio::test]
async fn test_trace_path_matches_tag() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move {
            conn.send_trace_path(42, 7, 0, &[0xA1, 0xB2], &CancelToken::new())
                .await
        }
    });

    let frame = device.next_frame().await.unwrap();
    assert_eq!(frame[0], 36);
    assert_eq!(&frame[1..5], &42u32.to_le_bytes());
    send(&device, sent(5));
    let trace = TraceData {
        path_len: 2,
        flags: 0,
        tag: 42,
        auth_code: 7,
        path_hashes: vec![0xA1, 0xB2],
        path_snrs: vec![40, 36],
        final_snr_x4: 28,
    };
    send(
        &device,
        Notification::TraceData(TraceData {
            tag: 41,
            ..trace.clone()
        }),
    );
    send(&device, Notification::TraceData(trace.clone()));
    assert_eq!(task.await.unwrap().unwrap(), trace);
}

// ============================================================================
// Cancellation, timeouts and shutdown
// ============================================================================

#[tokio::test]
async fn test_cancel_releases_subscription() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.get_device_time(&cancel).await }
    });

    device.next_frame().await.unwrap();
    assert_eq!(conn.center().subscriber_count(), 1);
    cancel.cancel();
    cancel.cancel();
    assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(conn.center().subscriber_count(), 0);

    // The late reply finds nobody listening
    assert_eq!(
        conn.center()
            .publish(meshcore_companion_client::Frame::new(9, vec![1, 0, 0, 0])),
        0
    );
}

#[tokio::test]
async fn test_cancel_beats_queued_frames() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.get_status(&key(0x2A), &cancel).await }
    });
    device.next_frame().await.unwrap();

    cancel.cancel();
    send(&device, sent(1));
    for other in 1..=5 {
        send(
            &device,
            Notification::StatusResponse(StatusResponse {
                sender_prefix: key(other).prefix(),
                data: vec![other],
            }),
        );
    }
    // Even a matching reply that is already queued loses to the fired token
    send(
        &device,
        Notification::StatusResponse(StatusResponse {
            sender_prefix: key(0x2A).prefix(),
            data: vec![0],
        }),
    );

    assert!(matches!(task.await.unwrap(), Err(Error::Cancelled)));
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_already_cancelled_token_writes_nothing() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(
        conn.get_device_time(&cancel).await,
        Err(Error::Cancelled)
    ));
    assert!(device.try_next_frame().is_none());
}

#[tokio::test]
async fn test_cancel_after_completion_has_no_effect() {
    let (conn, mut device) = open().await;
    let cancel = CancelToken::new();
    let task = tokio::spawn({
        let conn = conn.clone();
        let cancel = cancel.clone();
        async move { conn.set_tx_power(20, &cancel).await }
    });
    assert_eq!(&device.next_frame().await.unwrap()[..], &[12, 20]);
    send(&device, Notification::Ok);
    task.await.unwrap().unwrap();
    cancel.cancel();
    assert_eq!(conn.state(), ConnectionState::Open);
}

#[tokio::test(start_paused = true)]
async fn test_default_timeout() {
    let config = ConnectionConfig {
        command_timeout_ms: Some(50),
        ..Default::default()
    };
    let (conn, mut device) = open_with(config).await;
    assert!(matches!(
        conn.get_battery_voltage(&CancelToken::new()).await,
        Err(Error::Timeout)
    ));
    assert_eq!(&device.next_frame().await.unwrap()[..], &[20]);
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_wins_when_earlier() {
    let config = ConnectionConfig {
        command_timeout_ms: None,
        ..Default::default()
    };
    let (conn, _device) = open_with(config).await;
    let cancel = CancelToken::with_timeout(Duration::from_millis(20));
    assert!(matches!(
        conn.device_query(&cancel).await,
        Err(Error::Timeout)
    ));
}

#[tokio::test]
async fn test_disconnect_fails_pending_and_later_commands() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_device_time(&CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    conn.disconnect().await.unwrap();
    assert!(matches!(task.await.unwrap(), Err(Error::Closed)));
    assert!(device.is_disconnected());
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(
        conn.get_device_time(&CancelToken::new()).await,
        Err(Error::Closed)
    ));
    conn.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_link_failure_reaches_pending_command() {
    let (conn, mut device) = open().await;
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_device_time(&CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    device.fail(TransportError::Other("cable pulled".into()));
    assert!(matches!(
        task.await.unwrap(),
        Err(Error::Transport(TransportError::Other(_)))
    ));
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(
        conn.get_device_time(&CancelToken::new()).await,
        Err(Error::Closed)
    ));
}

#[tokio::test]
async fn test_write_error_surfaces_to_caller() {
    let (conn, device) = open().await;
    device.fail_writes(Some(TransportError::Other("busy".into())));
    assert!(matches!(
        conn.get_device_time(&CancelToken::new()).await,
        Err(Error::Transport(TransportError::Other(_)))
    ));
    assert_eq!(conn.center().subscriber_count(), 0);
    assert_eq!(conn.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_encode_error_writes_nothing() {
    let (conn, mut device) = open().await;
    let name = "x".repeat(200);
    let contact = Contact {
        adv_name: name,
        contact_type: ADV_TYPE_REPEATER,
        ..Default::default()
    };
    assert!(matches!(
        conn.add_or_update_contact(&contact, &CancelToken::new())
            .await,
        Err(Error::Protocol(_))
    ));
    assert!(device.try_next_frame().is_none());
}

#[tokio::test]
async fn test_commands_are_serialized() {
    let (conn, mut device) = open().await;
    let first = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_device_time(&CancelToken::new()).await }
    });
    let second = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_battery_voltage(&CancelToken::new()).await }
    });

    let frame = device.next_frame().await.unwrap();
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(device.try_next_frame().is_none(), "second command written early");

    let reply = |code: u8, device: &DeviceHandle| match code {
        5 => device.inject(&[9, 0x64, 0, 0, 0]),
        20 => device.inject(&[12, 0x10, 0x0E]),
        other => panic!("unexpected command {other}"),
    };
    reply(frame[0], &device);
    let frame = device.next_frame().await.unwrap();
    reply(frame[0], &device);

    assert_eq!(first.await.unwrap().unwrap(), 100);
    assert_eq!(second.await.unwrap().unwrap(), 3600);
}

// ============================================================================
// Push streams
// ============================================================================

#[tokio::test]
async fn test_push_stream_coalesces_and_skips_garbage() {
    let (conn, device) = open().await;
    let cancel = CancelToken::new();
    let mut stream = conn
        .subscribe_push(&[NotificationCode::Advert], &cancel)
        .unwrap();

    for first in 1..=3 {
        send(&device, Notification::Advert(key(first)));
    }
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        Notification::Advert(key(3))
    );

    device.inject(&[0x80, 1, 2, 3]);
    assert_eq!(conn.center().subscriber_count(), 1);
    let task = tokio::spawn(async move {
        let item = stream.next().await;
        (item, stream)
    });
    tokio::task::yield_now().await;
    send(&device, Notification::Advert(key(9)));
    let (item, mut stream) = task.await.unwrap();
    assert_eq!(item.unwrap().unwrap(), Notification::Advert(key(9)));

    cancel.cancel();
    assert!(stream.next().await.is_none());
    assert!(stream.is_closed());
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test]
async fn test_push_stream_ends_on_cancel_under_traffic() {
    let (conn, device) = open().await;
    let cancel = CancelToken::new();
    let mut stream = conn
        .subscribe_push(&[NotificationCode::Advert], &cancel)
        .unwrap();

    cancel.cancel();
    let mut yielded = 0;
    for first in 1..=5 {
        device.send(&Notification::Advert(key(first))).unwrap();
        if stream.next().await.is_some() {
            yielded += 1;
        }
    }
    assert_eq!(yielded, 0);
    assert!(stream.is_closed());
    assert_eq!(conn.center().subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_push_stream_deadline_ends_busy_stream() {
    let (conn, device) = open().await;
    let cancel = CancelToken::with_timeout(Duration::from_millis(100));
    let mut stream = conn
        .subscribe_push(&[NotificationCode::Advert], &cancel)
        .unwrap();

    send(&device, Notification::Advert(key(1)));
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        Notification::Advert(key(1))
    );

    tokio::time::advance(Duration::from_millis(150)).await;
    send(&device, Notification::Advert(key(2)));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_push_stream_ends_on_disconnect() {
    let (conn, device) = open().await;
    let mut stream = conn
        .subscribe_push(NotificationCode::push_codes(), &CancelToken::new())
        .unwrap();
    send(&device, Notification::MsgWaiting);
    conn.disconnect().await.unwrap();

    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        Notification::MsgWaiting
    );
    assert!(stream.next().await.is_none());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_push_stream_reports_link_failure_once() {
    use futures_util::StreamExt;

    let (conn, device) = open().await;
    let stream = conn
        .subscribe_push(&[NotificationCode::PathUpdated], &CancelToken::new())
        .unwrap()
        .into_stream();
    send(&device, Notification::PathUpdated(key(4)));
    device.close();

    let items: Vec<_> = stream.collect().await;
    assert_eq!(items.len(), 2);
    assert_eq!(
        items[0].as_ref().unwrap(),
        &Notification::PathUpdated(key(4))
    );
    assert!(matches!(
        items[1],
        Err(Error::Transport(TransportError::Closed))
    ));
}

#[tokio::test]
async fn test_push_and_command_share_the_link() {
    let (conn, mut device) = open().await;
    let mut stream = conn
        .subscribe_push(&[NotificationCode::MsgWaiting], &CancelToken::new())
        .unwrap();
    let task = tokio::spawn({
        let conn = conn.clone();
        async move { conn.get_device_time(&CancelToken::new()).await }
    });

    device.next_frame().await.unwrap();
    send(&device, Notification::MsgWaiting);
    send(&device, Notification::CurrentTime(7));
    assert_eq!(task.await.unwrap().unwrap(), 7);
    assert_eq!(
        stream.next().await.unwrap().unwrap(),
        Notification::MsgWaiting
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_config_from_json() {
    let config: ConnectionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, ConnectionConfig::default());

    let config: ConnectionConfig =
        serde_json::from_str(r#"{"app_name": "bench", "command_timeout_ms": null}"#).unwrap();
    assert_eq!(config.app_name, "bench");
    assert_eq!(config.command_timeout(), None);
    assert_eq!(config.app_version, 3);

    let json = serde_json::to_string(&ConnectionConfig::default()).unwrap();
    assert!(json.contains("\"response_buffer\":64"));
}
