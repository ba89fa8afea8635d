//! Commands carried through the full wire path and back out of the registry.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{BufMut, Bytes, BytesMut};
use minetest_protocol::core::packet::{Packet, Payload};
use minetest_protocol::error::ProtocolError;
use minetest_protocol::protocol::command::{put_string, put_wide_string, Command, V2f, V3f, V3s16};
use minetest_protocol::protocol::commands::{client, server, ClientCommand, ServerCommand};
use minetest_protocol::protocol::registry;
use proptest::prelude::*;

/// Wrap a payload in a reliable packet, encode, decode, and return what came out.
fn over_the_wire(payload: Payload) -> Payload {
    let bytes = Packet::reliable(1, 1, 65500, payload).to_bytes();
    Packet::decode(bytes).unwrap().payload().cloned().unwrap()
}

fn server_commands() -> Vec<ServerCommand> {
    vec![
        ServerCommand::Hello(server::Hello {
            serialization_version: 28,
            compression_mode: 0,
            protocol_version: 39,
            auth_mechanisms: server::auth::SRP,
            legacy_player_name: String::new(),
        }),
        ServerCommand::AuthAccept(server::AuthAccept {
            player_position: V3f::new(10.5, -3.0, 7.25),
            map_seed: 0xdead_beef_cafe,
            recommended_send_interval: 0.09,
            sudo_auth_methods: server::auth::SRP,
        }),
        ServerCommand::AccessDenied(server::AccessDenied {
            code: server::AccessDenied::SHUTDOWN,
            reason: Some("maintenance".into()),
            reconnect: Some(true),
        }),
        ServerCommand::BlockData(server::BlockData {
            position: V3s16::new(-2, 0, 31),
            data: Bytes::from(vec![7u8; 900]),
        }),
        ServerCommand::TimeOfDay(server::TimeOfDay {
            time: 6000,
            speed: 72.0,
        }),
        ServerCommand::CsmRestrictionFlags(server::CsmRestrictionFlags {
            flags: 0x3e,
            noderange: 8,
        }),
        ServerCommand::ChatMessage(server::ChatMessage {
            version: 1,
            message_type: 1,
            sender: "admin".into(),
            message: "Grüße 🌍".into(),
            timestamp: 1_700_000_000,
        }),
        ServerCommand::MovePlayer(server::MovePlayer {
            position: V3f::new(1.0, 2.0, 3.0),
            pitch: 12.5,
            yaw: -90.0,
        }),
        ServerCommand::DeleteParticleSpawner(server::DeleteParticleSpawner { id: 77 }),
        ServerCommand::SrpBytesSB(server::SrpBytesSB {
            bytes_s: Bytes::from_static(b"salt-bytes"),
            bytes_b: Bytes::from(vec![0x42; 256]),
        }),
        ServerCommand::ActiveObjectMessages(server::ActiveObjectMessages {
            messages: vec![
                server::ObjectMessage {
                    object_id: 12,
                    data: Bytes::from_static(b"\x00\x01"),
                },
                server::ObjectMessage {
                    object_id: 13,
                    data: Bytes::new(),
                },
            ],
        }),
        ServerCommand::Media(server::Media {
            bunch_count: 3,
            bunch_index: 1,
            files: vec![server::MediaFile {
                name: "default_dirt.png".into(),
                data: Bytes::from(vec![0x89; 700]),
            }],
        }),
        ServerCommand::AnnounceMedia(server::AnnounceMedia {
            files: vec![server::AnnouncedFile {
                name: "default_dirt.png".into(),
                sha1_base64: "2jmj7l5rSw0yVb/vlWAYkK/YBwk=".into(),
            }],
            remote_servers: "http://media.example.net/".into(),
        }),
        ServerCommand::DetachedInventory(server::DetachedInventory {
            name: "creative_test".into(),
            contents: Some(Bytes::from_static(b"List main 1\nEmpty\nEndInventoryList\n")),
        }),
        ServerCommand::AddParticleSpawner(server::AddParticleSpawner {
            amount: 40,
            spawn_time: 1.5,
            min_pos: V3f::new(-1.0, 0.0, -1.0),
            max_pos: V3f::new(1.0, 2.0, 1.0),
            min_vel: V3f::default(),
            max_vel: V3f::new(0.0, 1.0, 0.0),
            min_acc: V3f::default(),
            max_acc: V3f::new(0.0, -9.81, 0.0),
            min_exptime: 0.5,
            max_exptime: 2.0,
            min_size: 1.0,
            max_size: 3.0,
            collision_detection: true,
            texture: "smoke.png".into(),
            id: 5,
            vertical: false,
            collision_removal: true,
            attached_id: 0,
            extra: Bytes::from_static(&[0, 0, 0, 0, 0]),
        }),
        ServerCommand::HudChange(server::HudChange {
            id: 3,
            stat: server::hud_stat::SCALE,
            value: server::HudValue::Vector(V2f::new(2.0, 2.0)),
        }),
    ]
}

#[test]
fn test_server_commands_survive_wire_path() {
    for command in server_commands() {
        let payload = over_the_wire(command.to_payload().unwrap());
        assert_eq!(payload.command_id, command.id());
        assert_eq!(
            registry::server_command_name(command.id()),
            Some(command.name())
        );

        let decoded = registry::decode_server(payload).unwrap();
        assert_eq!(decoded, command, "{} changed on the wire", command.name());
    }
}

#[test]
fn test_client_commands_survive_wire_path() {
    let commands: Vec<ClientCommand> = vec![
        client::PeerInit.into(),
        client::Init::new("test").into(),
        client::Init2 {
            language: "fr".into(),
        }
        .into(),
        client::ChatMessage {
            message: "hello world".into(),
        }
        .into(),
        client::FirstSrp {
            salt: Bytes::from_static(b"salt"),
            verifier: Bytes::from(vec![9u8; 128]),
            is_empty_password: false,
        }
        .into(),
        client::SrpBytesA::new(vec![0xa1; 256]).into(),
        client::SrpBytesM {
            bytes_m: Bytes::from(vec![0x33; 32]),
        }
        .into(),
        client::RequestMedia {
            files: vec!["a.png".into(), String::new()],
        }
        .into(),
    ];

    for command in commands {
        let payload = over_the_wire(command.to_payload().unwrap());
        assert_eq!(
            registry::client_command_name(payload.command_id),
            Some(command.name())
        );
        let decoded = registry::decode_client(payload).unwrap();
        assert_eq!(decoded, command);
    }
}

#[test]
fn test_truncated_server_payloads_fail_cleanly() {
    for command in server_commands() {
        let payload = command.to_payload().unwrap();
        if payload.data.is_empty() {
            continue;
        }
        // Drop the final byte: either a field is now short or an optional
        // trailing field vanished. Neither may panic.
        let short = Payload::new(payload.command_id, payload.data.slice(..payload.data.len() - 1));
        let _ = registry::decode_server(short);

        let empty = Payload::new(payload.command_id, Bytes::new());
        match registry::decode_server(empty) {
            // A batch of object messages may legitimately be empty.
            Ok(ServerCommand::ActiveObjectMessages(batch)) => assert!(batch.messages.is_empty()),
            Err(ProtocolError::CommandDecode { command, .. }) => {
                assert_eq!(command, registry::server_command_name(payload.command_id).unwrap());
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(decoded) => panic!("{} decoded from nothing", decoded.name()),
        }
    }
}

#[test]
fn test_unknown_id_reports_raw_payload() {
    let payload = Payload::new(0x7777, Bytes::from_static(b"opaque"));
    match registry::decode_server(payload) {
        Err(ProtocolError::UnknownCommand { id, payload }) => {
            assert_eq!(id, 0x7777);
            assert_eq!(&payload[..], b"opaque");
        }
        other => panic!("expected unknown command, got {other:?}"),
    }
    assert_eq!(registry::server_command_name(0x7777), None);
}

fn server_roundtrip(command: ServerCommand) -> ServerCommand {
    registry::decode_server(over_the_wire(command.to_payload().unwrap())).unwrap()
}

fn client_roundtrip(command: ClientCommand) -> ClientCommand {
    registry::decode_client(over_the_wire(command.to_payload().unwrap())).unwrap()
}

/// Any float except NaN, which never compares equal.
fn float() -> impl Strategy<Value = f32> {
    any::<f32>().prop_filter("NaN", |f| !f.is_nan())
}

fn v3f() -> impl Strategy<Value = V3f> {
    (float(), float(), float()).prop_map(|(x, y, z)| V3f::new(x, y, z))
}

proptest! {
    #[test]
    fn prop_hello_roundtrip(
        serialization_version in any::<u8>(),
        compression_mode in any::<u16>(),
        protocol_version in any::<u16>(),
        auth_mechanisms in any::<u32>(),
        legacy_player_name in ".{0,40}",
    ) {
        let command = ServerCommand::Hello(server::Hello {
            serialization_version,
            compression_mode,
            protocol_version,
            auth_mechanisms,
            legacy_player_name,
        });
        prop_assert_eq!(server_roundtrip(command.clone()), command);
    }

    #[test]
    fn prop_auth_accept_roundtrip(
        player_position in v3f(),
        map_seed in any::<u64>(),
        recommended_send_interval in float(),
        sudo_auth_methods in any::<u32>(),
    ) {
        let command = ServerCommand::AuthAccept(server::AuthAccept {
            player_position,
            map_seed,
            recommended_send_interval,
            sudo_auth_methods,
        });
        prop_assert_eq!(server_roundtrip(command.clone()), command);
    }

    #[test]
    fn prop_block_data_roundtrip(
        x in any::<i16>(),
        y in any::<i16>(),
        z in any::<i16>(),
        data in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let command = ServerCommand::BlockData(server::BlockData {
            position: V3s16::new(x, y, z),
            data: Bytes::from(data),
        });
        prop_assert_eq!(server_roundtrip(command.clone()), command);
    }

    #[test]
    fn prop_chat_message_roundtrip(
        version in any::<u8>(),
        message_type in any::<u8>(),
        sender in any::<String>(),
        message in any::<String>(),
        timestamp in any::<u64>(),
    ) {
        let command = ServerCommand::ChatMessage(server::ChatMessage {
            version,
            message_type,
            sender,
            message,
            timestamp,
        });
        prop_assert_eq!(server_roundtrip(command.clone()), command);
    }

    #[test]
    fn prop_access_denied_roundtrip(
        code in any::<u8>(),
        reason in prop::option::of(".{0,64}"),
        reconnect in prop::option::of(any::<bool>()),
    ) {
        let command = server::AccessDenied { code, reason, reconnect };
        let decoded = server_roundtrip(ServerCommand::AccessDenied(command.clone()));
        let ServerCommand::AccessDenied(decoded) = decoded else {
            panic!("decoded into another command");
        };
        prop_assert_eq!(decoded.code, command.code);
        prop_assert_eq!(decoded.reconnect, command.reconnect);
        // An absent reason goes out empty when the reconnect flag follows it.
        let expected_reason = match (&command.reason, command.reconnect) {
            (None, Some(_)) => Some(String::new()),
            (reason, _) => reason.clone(),
        };
        prop_assert_eq!(decoded.reason, expected_reason);
    }

    #[test]
    fn prop_srp_bytes_roundtrip(
        bytes_s in prop::collection::vec(any::<u8>(), 0..512),
        bytes_b in prop::collection::vec(any::<u8>(), 0..512),
        based_on in any::<u8>(),
        is_empty_password in any::<bool>(),
    ) {
        let challenge = ServerCommand::SrpBytesSB(server::SrpBytesSB {
            bytes_s: Bytes::from(bytes_s.clone()),
            bytes_b: Bytes::from(bytes_b.clone()),
        });
        prop_assert_eq!(server_roundtrip(challenge.clone()), challenge);

        let public_a = ClientCommand::SrpBytesA(client::SrpBytesA {
            bytes_a: Bytes::from(bytes_b.clone()),
            based_on,
        });
        prop_assert_eq!(client_roundtrip(public_a.clone()), public_a);

        let first = ClientCommand::FirstSrp(client::FirstSrp {
            salt: Bytes::from(bytes_s),
            verifier: Bytes::from(bytes_b),
            is_empty_password,
        });
        prop_assert_eq!(client_roundtrip(first.clone()), first);
    }

    #[test]
    fn prop_init_roundtrip(
        serialization_version in any::<u8>(),
        supported_compression in any::<u16>(),
        min_protocol_version in any::<u16>(),
        max_protocol_version in any::<u16>(),
        player_name in any::<String>(),
    ) {
        let command = ClientCommand::Init(client::Init {
            serialization_version,
            supported_compression,
            min_protocol_version,
            max_protocol_version,
            player_name,
        });
        prop_assert_eq!(client_roundtrip(command.clone()), command);
    }
}

#[test]
fn test_numeric_fields_at_their_limits() {
    for (time, flags, noderange, id) in [(0, 0, 0, 0), (u16::MAX, u64::MAX, u32::MAX, u32::MAX)] {
        let commands = vec![
            ServerCommand::TimeOfDay(server::TimeOfDay {
                time,
                speed: f32::MAX,
            }),
            ServerCommand::CsmRestrictionFlags(server::CsmRestrictionFlags { flags, noderange }),
            ServerCommand::DeleteParticleSpawner(server::DeleteParticleSpawner { id }),
            ServerCommand::AuthAccept(server::AuthAccept {
                player_position: V3f::new(f32::MIN, f32::MAX, f32::INFINITY),
                map_seed: flags,
                recommended_send_interval: f32::MIN_POSITIVE,
                sudo_auth_methods: noderange,
            }),
            ServerCommand::HudChange(server::HudChange {
                id,
                stat: server::hud_stat::SIZE,
                value: server::HudValue::Size {
                    x: i32::MIN,
                    y: i32::MAX,
                },
            }),
        ];
        for command in commands {
            assert_eq!(server_roundtrip(command.clone()), command);
        }
    }

    let block = ServerCommand::BlockData(server::BlockData {
        position: V3s16::new(i16::MIN, i16::MAX, 0),
        data: Bytes::new(),
    });
    assert_eq!(server_roundtrip(block.clone()), block);
}

#[test]
fn test_strings_at_their_limits() {
    let longest = "x".repeat(u16::MAX as usize);

    for name in [String::new(), longest.clone()] {
        let init = ClientCommand::Init(client::Init::new(name));
        assert_eq!(client_roundtrip(init.clone()), init);
    }

    let salt = Bytes::from(vec![0xab; u16::MAX as usize]);
    let first = ClientCommand::FirstSrp(client::FirstSrp {
        salt: salt.clone(),
        verifier: Bytes::new(),
        is_empty_password: true,
    });
    assert_eq!(client_roundtrip(first.clone()), first);

    // Wide strings count UTF-16 units, so the limit is in units.
    let widest = "\u{e9}".repeat(u16::MAX as usize);
    for message in [String::new(), widest] {
        let chat = ClientCommand::ChatMessage(client::ChatMessage { message });
        assert_eq!(client_roundtrip(chat.clone()), chat);
    }

    let empty_chat = ServerCommand::ChatMessage(server::ChatMessage {
        version: 1,
        message_type: 0,
        sender: String::new(),
        message: String::new(),
        timestamp: 0,
    });
    assert_eq!(server_roundtrip(empty_chat.clone()), empty_chat);
}

#[test]
fn test_string_over_limit_is_rejected() {
    let too_long = "x".repeat(u16::MAX as usize + 1);

    let mut dst = BytesMut::new();
    assert!(put_string(&mut dst, "Init", too_long.as_bytes()).is_err());
    assert!(put_wide_string(&mut dst, "ChatMessage", &too_long).is_err());
    assert!(dst.is_empty(), "nothing written for a rejected string");

    match client::Init::new(too_long.clone()).to_payload() {
        Err(ProtocolError::CommandEncode { command, .. }) => assert_eq!(command, "Init"),
        other => panic!("expected an encode error, got {other:?}"),
    }
    let chat = client::ChatMessage { message: too_long };
    assert!(matches!(
        chat.to_payload(),
        Err(ProtocolError::CommandEncode {
            command: "ChatMessage",
            ..
        })
    ));

    // A wide string of 65536 units also fails, even though each unit fits.
    let surrogate_pairs = "\u{1F30D}".repeat(u16::MAX as usize / 2 + 1);
    assert!(client::ChatMessage {
        message: surrogate_pairs
    }
    .to_payload()
    .is_err());
}

#[test]
fn test_declared_length_past_payload_end_is_rejected() {
    let mut data = BytesMut::new();
    data.put_u8(28);
    data.put_u16(0);
    data.put_u16(37);
    data.put_u16(39);
    data.put_u16(10);
    data.put_slice(b"short");

    assert!(matches!(
        registry::decode_client(Payload::new(client::Init::ID, data.freeze())),
        Err(ProtocolError::CommandDecode { command: "Init", .. })
    ));
}
