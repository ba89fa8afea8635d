// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::error::ProtocolError;
use crate::protocol::commands::client::{FirstSrp, Init, Init2, SrpBytesA, SrpBytesM};
use crate::protocol::commands::server::{auth, AccessDenied, AuthAccept, Hello, SrpBytesSB, TimeOfDay};
use crate::protocol::commands::{ClientCommand, ServerCommand};
use crate::protocol::command::V3f;
use crate::protocol::handshake::*;
use crate::transport::fanout::Event;
use bytes::Bytes;
use std::time::Duration;

#[derive(Default)]
struct CountingSrp {
    initiate_calls: usize,
    verifier_calls: usize,
    complete_calls: usize,
    proof_calls: usize,
    reject_challenge: bool,
}

impl SrpClient for CountingSrp {
    fn initiate(&mut self) -> crate::error::Result<(Vec<u8>, Vec<u8>)> {
        self.initiate_calls += 1;
        Ok((vec![0xa1; 4], vec![0xa2; 4]))
    }

    fn derive_verifier(
        &mut self,
        identity: &[u8],
        _passphrase: &[u8],
    ) -> crate::error::Result<(Vec<u8>, Vec<u8>)> {
        self.verifier_calls += 1;
        Ok((b"salt".to_vec(), identity.to_vec()))
    }

    fn complete(
        &mut self,
        client_public: &[u8],
        client_private: &[u8],
        _identity: &[u8],
        _passphrase: &[u8],
        _server_salt: &[u8],
        server_public: &[u8],
    ) -> crate::error::Result<Vec<u8>> {
        self.complete_calls += 1;
        assert_eq!(client_public, &[0xa1; 4]);
        assert_eq!(client_private, &[0xa2; 4]);
        if self.reject_challenge {
            return Err(ProtocolError::Custom("B mod N is zero".into()));
        }
        Ok(server_public.to_vec())
    }

    fn proof(
        &mut self,
        _identity: &[u8],
        _server_salt: &[u8],
        _client_public: &[u8],
        _server_public: &[u8],
        shared_secret: &[u8],
    ) -> crate::error::Result<Vec<u8>> {
        self.proof_calls += 1;
        Ok(shared_secret.iter().rev().copied().collect())
    }
}

fn hello(mechanisms: u32) -> Event {
    Event::Command(ServerCommand::Hello(Hello {
        serialization_version: 28,
        compression_mode: 0,
        protocol_version: 39,
        auth_mechanisms: mechanisms,
        legacy_player_name: String::new(),
    }))
}

fn auth_accept() -> Event {
    Event::Command(ServerCommand::AuthAccept(AuthAccept {
        player_position: V3f::new(0.0, 10.0, 0.0),
        map_seed: 42,
        recommended_send_interval: 0.09,
        sudo_auth_methods: auth::SRP,
    }))
}

/// A handshake that has been assigned a peer id and sent its init.
fn awaiting_hello(srp: CountingSrp) -> Handshake<CountingSrp> {
    let mut handshake = Handshake::new(srp, "test", "enter").with_settle_delay(Duration::ZERO);
    handshake.peer_init_sent();
    let action = handshake.on_event(&Event::PeerAssigned(257)).unwrap();
    assert_eq!(
        action,
        Action::SendOriginalAfter {
            delay: Duration::ZERO,
            command: ClientCommand::Init(Init::new("test")),
        }
    );
    assert_eq!(handshake.state(), HandshakeState::PeerAssigned);
    handshake.init_sent();
    assert_eq!(handshake.state(), HandshakeState::AwaitingHello);
    handshake
}

#[test]
fn test_srp_greeting_sends_public_a_once() {
    let mut handshake = awaiting_hello(CountingSrp::default());

    let action = handshake.on_event(&hello(auth::SRP)).unwrap();

    assert_eq!(
        action,
        Action::SendReliable(SrpBytesA::new(vec![0xa1; 4]).into())
    );
    assert_eq!(handshake.srp().initiate_calls, 1);
    assert_eq!(handshake.srp().verifier_calls, 0);
    assert_eq!(handshake.state(), HandshakeState::SrpInitiated);
}

#[test]
fn test_first_srp_greeting_sends_verifier_once() {
    let mut handshake = awaiting_hello(CountingSrp::default());

    let action = handshake.on_event(&hello(auth::FIRST_SRP)).unwrap();

    assert_eq!(
        action,
        Action::SendReliable(ClientCommand::FirstSrp(FirstSrp {
            salt: Bytes::from_static(b"salt"),
            verifier: Bytes::from_static(b"test"),
            is_empty_password: false,
        }))
    );
    assert_eq!(handshake.srp().verifier_calls, 1);
    assert_eq!(handshake.srp().initiate_calls, 0);
    assert_eq!(handshake.state(), HandshakeState::FirstSrpSent);
}

#[test]
fn test_greeting_without_mechanism_sends_nothing() {
    let mut handshake = awaiting_hello(CountingSrp::default());

    let action = handshake.on_event(&hello(auth::LEGACY_PASSWORD)).unwrap();

    assert_eq!(action, Action::Wait);
    assert_eq!(handshake.srp().initiate_calls, 0);
    assert_eq!(handshake.srp().verifier_calls, 0);
    assert_eq!(handshake.state(), HandshakeState::AwaitingHello);
}

#[test]
fn test_both_mechanisms_prefer_existing_account() {
    let mut handshake = awaiting_hello(CountingSrp::default());

    let action = handshake
        .on_event(&hello(auth::SRP | auth::FIRST_SRP))
        .unwrap();

    assert!(matches!(action, Action::SendReliable(ClientCommand::SrpBytesA(_))));
    assert_eq!(handshake.srp().initiate_calls, 1);
    assert_eq!(handshake.srp().verifier_calls, 0);
}

#[test]
fn test_full_srp_flow_reaches_connected() {
    let mut handshake = awaiting_hello(CountingSrp::default()).with_language("de");
    handshake.on_event(&hello(auth::SRP)).unwrap();

    let challenge = Event::Command(ServerCommand::SrpBytesSB(SrpBytesSB {
        bytes_s: Bytes::from_static(b"salt"),
        bytes_b: Bytes::from_static(&[1, 2, 3]),
    }));
    let action = handshake.on_event(&challenge).unwrap();
    assert_eq!(
        action,
        Action::SendReliable(ClientCommand::SrpBytesM(SrpBytesM {
            bytes_m: Bytes::from_static(&[3, 2, 1]),
        }))
    );
    assert_eq!(handshake.state(), HandshakeState::ProofSent);

    // A retransmitted challenge no longer has keys to work with.
    assert_eq!(handshake.on_event(&challenge).unwrap(), Action::Wait);
    assert_eq!(handshake.srp().complete_calls, 1);

    let action = handshake.on_event(&auth_accept()).unwrap();
    assert_eq!(
        action,
        Action::SendReliable(ClientCommand::Init2(Init2 {
            language: "de".into()
        }))
    );
    assert!(handshake.is_connected());
}

#[test]
fn test_first_srp_flow_reaches_connected() {
    let mut handshake = awaiting_hello(CountingSrp::default());
    handshake.on_event(&hello(auth::FIRST_SRP)).unwrap();
    let action = handshake.on_event(&auth_accept()).unwrap();
    assert!(matches!(action, Action::SendReliable(ClientCommand::Init2(_))));
    assert!(handshake.is_connected());
}

#[test]
fn test_rejected_challenge_is_fatal() {
    let srp = CountingSrp {
        reject_challenge: true,
        ..CountingSrp::default()
    };
    let mut handshake = awaiting_hello(srp);
    handshake.on_event(&hello(auth::SRP)).unwrap();

    let err = handshake
        .on_event(&Event::Command(ServerCommand::SrpBytesSB(SrpBytesSB {
            bytes_s: Bytes::new(),
            bytes_b: Bytes::new(),
        })))
        .unwrap_err();

    assert!(matches!(err, ProtocolError::HandshakeFailure(_)));
    assert_eq!(handshake.state(), HandshakeState::Failed);
    assert_eq!(handshake.srp().proof_calls, 0);
}

#[test]
fn test_access_denied_ends_handshake() {
    let mut handshake = awaiting_hello(CountingSrp::default());
    let err = handshake
        .on_event(&Event::Command(ServerCommand::AccessDenied(AccessDenied {
            code: AccessDenied::WRONG_PASSWORD,
            reason: None,
            reconnect: None,
        })))
        .unwrap_err();

    assert!(matches!(err, ProtocolError::AccessDenied(ref reason) if reason == "invalid password"));
    assert_eq!(handshake.state(), HandshakeState::Failed);
}

#[test]
fn test_unrelated_commands_do_not_change_state() {
    let mut handshake = awaiting_hello(CountingSrp::default());
    let action = handshake
        .on_event(&Event::Command(ServerCommand::TimeOfDay(TimeOfDay {
            time: 6000,
            speed: 72.0,
        })))
        .unwrap();
    assert_eq!(action, Action::Wait);
    assert_eq!(handshake.state(), HandshakeState::AwaitingHello);

    // Auth accept before any proof is ignored.
    assert_eq!(handshake.on_event(&auth_accept()).unwrap(), Action::Wait);
    assert_eq!(handshake.state(), HandshakeState::AwaitingHello);
}

#[test]
fn test_repeated_peer_assignment_schedules_init_once() {
    let mut handshake = awaiting_hello(CountingSrp::default());
    assert_eq!(
        handshake.on_event(&Event::PeerAssigned(257)).unwrap(),
        Action::Wait
    );
}
