//! Loopback stand-in for a game server.

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used)]

use minetest_protocol::core::packet::{Body, Control, Packet, PEER_ID_SERVER};
use minetest_protocol::protocol::commands::{ClientCommand, ServerCommand};
use minetest_protocol::protocol::handshake::SrpClient;
use minetest_protocol::protocol::registry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeServer {
    socket: UdpSocket,
    client: Option<SocketAddr>,
    next_seq: u16,
}

impl FakeServer {
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Self {
            socket,
            client: None,
            next_seq: 65500,
        }
    }

    pub fn address(&self) -> String {
        self.socket.local_addr().unwrap().to_string()
    }

    /// Next datagram from the client, decoded.
    pub async fn recv(&mut self) -> Packet {
        let mut buf = vec![0u8; 2048];
        let (len, from) = timeout(TIMEOUT, self.socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for the client")
            .unwrap();
        self.client = Some(from);
        Packet::from_bytes(&buf[..len]).expect("client sent a malformed packet")
    }

    /// Next packet that is not an acknowledgement.
    pub async fn recv_non_ack(&mut self) -> Packet {
        loop {
            let packet = self.recv().await;
            if !is_ack(&packet) {
                return packet;
            }
        }
    }

    /// Next acknowledgement as `(channel, sequence number)`.
    pub async fn recv_ack(&mut self) -> (u8, u16) {
        loop {
            let packet = self.recv().await;
            if let Body::Control {
                sequence_number,
                control: Control::Ack,
            } = packet.body
            {
                return (packet.channel, sequence_number);
            }
        }
    }

    /// Next client command, skipping acknowledgements.
    pub async fn recv_command(&mut self) -> (Packet, ClientCommand) {
        let packet = self.recv_non_ack().await;
        let payload = packet.payload().cloned().expect("packet carries no payload");
        let command = registry::decode_client(payload).unwrap();
        (packet, command)
    }

    /// Assert that nothing arrives for `wait`.
    pub async fn expect_silence(&self, wait: Duration) {
        let mut buf = vec![0u8; 2048];
        let received = timeout(wait, self.socket.recv_from(&mut buf)).await;
        assert!(received.is_err(), "unexpected datagram from the client");
    }

    pub async fn send(&self, packet: &Packet) {
        let client = self.client.expect("client address not known yet");
        self.socket.send_to(&packet.to_bytes(), client).await.unwrap();
    }

    pub async fn send_raw(&self, bytes: &[u8]) {
        let client = self.client.expect("client address not known yet");
        self.socket.send_to(bytes, client).await.unwrap();
    }

    pub async fn assign_peer_id(&self, peer_id: u16) {
        self.send(&Packet::control(PEER_ID_SERVER, 0, Control::SetPeerId(peer_id)))
            .await;
    }

    /// Send `command` reliably on channel 1 and return its sequence number.
    pub async fn send_reliable(&mut self, command: &ServerCommand) -> u16 {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        let payload = command.to_payload().unwrap();
        self.send(&Packet::reliable(PEER_ID_SERVER, 1, seq, payload))
            .await;
        seq
    }
}

pub fn is_ack(packet: &Packet) -> bool {
    matches!(
        packet.body,
        Body::Control {
            control: Control::Ack,
            ..
        }
    )
}

/// SRP stand-in: fixed keys, echoes its inputs so tests can see the plumbing.
#[derive(Debug, Default)]
pub struct EchoSrp;

impl SrpClient for EchoSrp {
    fn initiate(&mut self) -> minetest_protocol::Result<(Vec<u8>, Vec<u8>)> {
        Ok((b"public-a".to_vec(), b"private-a".to_vec()))
    }

    fn derive_verifier(
        &mut self,
        _identity: &[u8],
        passphrase: &[u8],
    ) -> minetest_protocol::Result<(Vec<u8>, Vec<u8>)> {
        Ok((b"fresh-salt".to_vec(), passphrase.to_vec()))
    }

    fn complete(
        &mut self,
        _client_public: &[u8],
        _client_private: &[u8],
        _identity: &[u8],
        _passphrase: &[u8],
        _server_salt: &[u8],
        server_public: &[u8],
    ) -> minetest_protocol::Result<Vec<u8>> {
        Ok(server_public.to_vec())
    }

    fn proof(
        &mut self,
        _identity: &[u8],
        _server_salt: &[u8],
        _client_public: &[u8],
        _server_public: &[u8],
        shared_secret: &[u8],
    ) -> minetest_protocol::Result<Vec<u8>> {
        Ok([b"proof:".as_slice(), shared_secret].concat())
    }
}
