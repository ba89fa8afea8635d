//! Static id-to-decoder tables for both directions.
//!
//! Inbound dispatch looks the command id up in [`SERVER_COMMANDS`]; an id
//! with no entry comes back as [`ProtocolError::UnknownCommand`] carrying the
//! raw payload, which callers log and skip.

use crate::core::packet::Payload;
use crate::error::{ProtocolError, Result};
use crate::protocol::command::Command;
use crate::protocol::commands::{client, server, ClientCommand, ServerCommand};
use bytes::Bytes;

/// One registered command: its id, name and payload decoder.
pub struct Entry<C> {
    pub id: u16,
    pub name: &'static str,
    decode: fn(Bytes) -> Result<C>,
}

impl<C> Entry<C> {
    pub fn decode(&self, data: Bytes) -> Result<C> {
        (self.decode)(data)
    }
}

impl<C> std::fmt::Debug for Entry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("id", &format_args!("0x{:02x}", self.id))
            .field("name", &self.name)
            .finish()
    }
}

pub static SERVER_COMMANDS: &[Entry<ServerCommand>] = &[
    Entry {
        id: server::Hello::ID,
        name: server::Hello::NAME,
        decode: |data| server::Hello::from_bytes(data).map(ServerCommand::Hello),
    },
    Entry {
        id: server::AuthAccept::ID,
        name: server::AuthAccept::NAME,
        decode: |data| server::AuthAccept::from_bytes(data).map(ServerCommand::AuthAccept),
    },
    Entry {
        id: server::AccessDenied::ID,
        name: server::AccessDenied::NAME,
        decode: |data| server::AccessDenied::from_bytes(data).map(ServerCommand::AccessDenied),
    },
    Entry {
        id: server::BlockData::ID,
        name: server::BlockData::NAME,
        decode: |data| server::BlockData::from_bytes(data).map(ServerCommand::BlockData),
    },
    Entry {
        id: server::TimeOfDay::ID,
        name: server::TimeOfDay::NAME,
        decode: |data| server::TimeOfDay::from_bytes(data).map(ServerCommand::TimeOfDay),
    },
    Entry {
        id: server::CsmRestrictionFlags::ID,
        name: server::CsmRestrictionFlags::NAME,
        decode: |data| {
            server::CsmRestrictionFlags::from_bytes(data).map(ServerCommand::CsmRestrictionFlags)
        },
    },
    Entry {
        id: server::ChatMessage::ID,
        name: server::ChatMessage::NAME,
        decode: |data| server::ChatMessage::from_bytes(data).map(ServerCommand::ChatMessage),
    },
    Entry {
        id: server::MovePlayer::ID,
        name: server::MovePlayer::NAME,
        decode: |data| server::MovePlayer::from_bytes(data).map(ServerCommand::MovePlayer),
    },
    Entry {
        id: server::DeleteParticleSpawner::ID,
        name: server::DeleteParticleSpawner::NAME,
        decode: |data| {
            server::DeleteParticleSpawner::from_bytes(data)
                .map(ServerCommand::DeleteParticleSpawner)
        },
    },
    Entry {
        id: server::SrpBytesSB::ID,
        name: server::SrpBytesSB::NAME,
        decode: |data| server::SrpBytesSB::from_bytes(data).map(ServerCommand::SrpBytesSB),
    },
    Entry {
        id: server::ActiveObjectMessages::ID,
        name: server::ActiveObjectMessages::NAME,
        decode: |data| server::ActiveObjectMessages::from_bytes(data).map(ServerCommand::ActiveObjectMessages),
    },
    Entry {
        id: server::Media::ID,
        name: server::Media::NAME,
        decode: |data| server::Media::from_bytes(data).map(ServerCommand::Media),
    },
    Entry {
        id: server::AnnounceMedia::ID,
        name: server::AnnounceMedia::NAME,
        decode: |data| server::AnnounceMedia::from_bytes(data).map(ServerCommand::AnnounceMedia),
    },
    Entry {
        id: server::DetachedInventory::ID,
        name: server::DetachedInventory::NAME,
        decode: |data| server::DetachedInventory::from_bytes(data).map(ServerCommand::DetachedInventory),
    },
    Entry {
        id: server::AddParticleSpawner::ID,
        name: server::AddParticleSpawner::NAME,
        decode: |data| server::AddParticleSpawner::from_bytes(data).map(ServerCommand::AddParticleSpawner),
    },
    Entry {
        id: server::HudChange::ID,
        name: server::HudChange::NAME,
        decode: |data| server::HudChange::from_bytes(data).map(ServerCommand::HudChange),
    },
];

pub static CLIENT_COMMANDS: &[Entry<ClientCommand>] = &[
    Entry {
        id: client::PeerInit::ID,
        name: client::PeerInit::NAME,
        decode: |data| client::PeerInit::from_bytes(data).map(ClientCommand::PeerInit),
    },
    Entry {
        id: client::Init::ID,
        name: client::Init::NAME,
        decode: |data| client::Init::from_bytes(data).map(ClientCommand::Init),
    },
    Entry {
        id: client::Init2::ID,
        name: client::Init2::NAME,
        decode: |data| client::Init2::from_bytes(data).map(ClientCommand::Init2),
    },
    Entry {
        id: client::ChatMessage::ID,
        name: client::ChatMessage::NAME,
        decode: |data| client::ChatMessage::from_bytes(data).map(ClientCommand::ChatMessage),
    },
    Entry {
        id: client::FirstSrp::ID,
        name: client::FirstSrp::NAME,
        decode: |data| client::FirstSrp::from_bytes(data).map(ClientCommand::FirstSrp),
    },
    Entry {
        id: client::SrpBytesA::ID,
        name: client::SrpBytesA::NAME,
        decode: |data| client::SrpBytesA::from_bytes(data).map(ClientCommand::SrpBytesA),
    },
    Entry {
        id: client::SrpBytesM::ID,
        name: client::SrpBytesM::NAME,
        decode: |data| client::SrpBytesM::from_bytes(data).map(ClientCommand::SrpBytesM),
    },
    Entry {
        id: client::RequestMedia::ID,
        name: client::RequestMedia::NAME,
        decode: |data| client::RequestMedia::from_bytes(data).map(ClientCommand::RequestMedia),
    },
];

fn lookup<C>(table: &'static [Entry<C>], id: u16) -> Option<&'static Entry<C>> {
    table.iter().find(|entry| entry.id == id)
}

fn decode_with<C>(table: &'static [Entry<C>], payload: Payload) -> Result<C> {
    match lookup(table, payload.command_id) {
        Some(entry) => entry.decode(payload.data),
        None => Err(ProtocolError::UnknownCommand {
            id: payload.command_id,
            payload: payload.data,
        }),
    }
}

/// Decode a server-to-client command.
pub fn decode_server(payload: Payload) -> Result<ServerCommand> {
    decode_with(SERVER_COMMANDS, payload)
}

/// Decode a client-to-server command, as a test server would.
pub fn decode_client(payload: Payload) -> Result<ClientCommand> {
    decode_with(CLIENT_COMMANDS, payload)
}

pub fn server_command_name(id: u16) -> Option<&'static str> {
    lookup(SERVER_COMMANDS, id).map(|entry| entry.name)
}

pub fn client_command_name(id: u16) -> Option<&'static str> {
    lookup(CLIENT_COMMANDS, id).map(|entry| entry.name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_per_direction() {
        let server: HashSet<u16> = SERVER_COMMANDS.iter().map(|e| e.id).collect();
        assert_eq!(server.len(), SERVER_COMMANDS.len());
        let client: HashSet<u16> = CLIENT_COMMANDS.iter().map(|e| e.id).collect();
        assert_eq!(client.len(), CLIENT_COMMANDS.len());
    }

    #[test]
    fn same_id_resolves_per_direction() {
        assert_eq!(server_command_name(0x02), Some("Hello"));
        assert_eq!(client_command_name(0x02), Some("Init"));
        assert_eq!(server_command_name(0x50), None);
    }

    #[test]
    fn unknown_id_keeps_payload() {
        let err = decode_server(Payload::new(0x4b, vec![1u8, 2, 3])).unwrap_err();
        match err {
            ProtocolError::UnknownCommand { id, payload } => {
                assert_eq!(id, 0x4b);
                assert_eq!(&payload[..], &[1, 2, 3]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn short_payload_is_decode_error() {
        let err = decode_server(Payload::new(server::TimeOfDay::ID, vec![0u8])).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CommandDecode {
                command: "TimeOfDay",
                ..
            }
        ));
    }
}
