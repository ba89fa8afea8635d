//! Closed sets of commands for each direction.
//!
//! Both directions share one numeric id space but each id is only valid in
//! one direction, so `0x02` is [`client::Init`] going out and
//! [`server::Hello`] coming in.

pub mod client;
pub mod server;

use crate::core::packet::Payload;
use crate::error::Result;
use crate::protocol::command::Command;

/// Every command this client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    PeerInit(client::PeerInit),
    Init(client::Init),
    Init2(client::Init2),
    ChatMessage(client::ChatMessage),
    FirstSrp(client::FirstSrp),
    SrpBytesA(client::SrpBytesA),
    SrpBytesM(client::SrpBytesM),
    RequestMedia(client::RequestMedia),
}

impl ClientCommand {
    pub fn id(&self) -> u16 {
        match self {
            ClientCommand::PeerInit(_) => client::PeerInit::ID,
            ClientCommand::Init(_) => client::Init::ID,
            ClientCommand::Init2(_) => client::Init2::ID,
            ClientCommand::ChatMessage(_) => client::ChatMessage::ID,
            ClientCommand::FirstSrp(_) => client::FirstSrp::ID,
            ClientCommand::SrpBytesA(_) => client::SrpBytesA::ID,
            ClientCommand::SrpBytesM(_) => client::SrpBytesM::ID,
            ClientCommand::RequestMedia(_) => client::RequestMedia::ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::PeerInit(_) => client::PeerInit::NAME,
            ClientCommand::Init(_) => client::Init::NAME,
            ClientCommand::Init2(_) => client::Init2::NAME,
            ClientCommand::ChatMessage(_) => client::ChatMessage::NAME,
            ClientCommand::FirstSrp(_) => client::FirstSrp::NAME,
            ClientCommand::SrpBytesA(_) => client::SrpBytesA::NAME,
            ClientCommand::SrpBytesM(_) => client::SrpBytesM::NAME,
            ClientCommand::RequestMedia(_) => client::RequestMedia::NAME,
        }
    }

    pub fn to_payload(&self) -> Result<Payload> {
        match self {
            ClientCommand::PeerInit(cmd) => cmd.to_payload(),
            ClientCommand::Init(cmd) => cmd.to_payload(),
            ClientCommand::Init2(cmd) => cmd.to_payload(),
            ClientCommand::ChatMessage(cmd) => cmd.to_payload(),
            ClientCommand::FirstSrp(cmd) => cmd.to_payload(),
            ClientCommand::SrpBytesA(cmd) => cmd.to_payload(),
            ClientCommand::SrpBytesM(cmd) => cmd.to_payload(),
            ClientCommand::RequestMedia(cmd) => cmd.to_payload(),
        }
    }
}

/// Every command this client understands from a server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCommand {
    Hello(server::Hello),
    AuthAccept(server::AuthAccept),
    AccessDenied(server::AccessDenied),
    BlockData(server::BlockData),
    TimeOfDay(server::TimeOfDay),
    CsmRestrictionFlags(server::CsmRestrictionFlags),
    ChatMessage(server::ChatMessage),
    MovePlayer(server::MovePlayer),
    DeleteParticleSpawner(server::DeleteParticleSpawner),
    SrpBytesSB(server::SrpBytesSB),
    ActiveObjectMessages(server::ActiveObjectMessages),
    Media(server::Media),
    AnnounceMedia(server::AnnounceMedia),
    DetachedInventory(server::DetachedInventory),
    AddParticleSpawner(server::AddParticleSpawner),
    HudChange(server::HudChange),
}

impl ServerCommand {
    pub fn id(&self) -> u16 {
        match self {
            ServerCommand::Hello(_) => server::Hello::ID,
            ServerCommand::AuthAccept(_) => server::AuthAccept::ID,
            ServerCommand::AccessDenied(_) => server::AccessDenied::ID,
            ServerCommand::BlockData(_) => server::BlockData::ID,
            ServerCommand::TimeOfDay(_) => server::TimeOfDay::ID,
            ServerCommand::CsmRestrictionFlags(_) => server::CsmRestrictionFlags::ID,
            ServerCommand::ChatMessage(_) => server::ChatMessage::ID,
            ServerCommand::MovePlayer(_) => server::MovePlayer::ID,
            ServerCommand::DeleteParticleSpawner(_) => server::DeleteParticleSpawner::ID,
            ServerCommand::SrpBytesSB(_) => server::SrpBytesSB::ID,
            ServerCommand::ActiveObjectMessages(_) => server::ActiveObjectMessages::ID,
            ServerCommand::Media(_) => server::Media::ID,
            ServerCommand::AnnounceMedia(_) => server::AnnounceMedia::ID,
            ServerCommand::DetachedInventory(_) => server::DetachedInventory::ID,
            ServerCommand::AddParticleSpawner(_) => server::AddParticleSpawner::ID,
            ServerCommand::HudChange(_) => server::HudChange::ID,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerCommand::Hello(_) => server::Hello::NAME,
            ServerCommand::AuthAccept(_) => server::AuthAccept::NAME,
            ServerCommand::AccessDenied(_) => server::AccessDenied::NAME,
            ServerCommand::BlockData(_) => server::BlockData::NAME,
            ServerCommand::TimeOfDay(_) => server::TimeOfDay::NAME,
            ServerCommand::CsmRestrictionFlags(_) => server::CsmRestrictionFlags::NAME,
            ServerCommand::ChatMessage(_) => server::ChatMessage::NAME,
            ServerCommand::MovePlayer(_) => server::MovePlayer::NAME,
            ServerCommand::DeleteParticleSpawner(_) => server::DeleteParticleSpawner::NAME,
            ServerCommand::SrpBytesSB(_) => server::SrpBytesSB::NAME,
            ServerCommand::ActiveObjectMessages(_) => server::ActiveObjectMessages::NAME,
            ServerCommand::Media(_) => server::Media::NAME,
            ServerCommand::AnnounceMedia(_) => server::AnnounceMedia::NAME,
            ServerCommand::DetachedInventory(_) => server::DetachedInventory::NAME,
            ServerCommand::AddParticleSpawner(_) => server::AddParticleSpawner::NAME,
            ServerCommand::HudChange(_) => server::HudChange::NAME,
        }
    }

    /// Encode as a server would; used by test servers and tooling.
    pub fn to_payload(&self) -> Result<Payload> {
        match self {
            ServerCommand::Hello(cmd) => cmd.to_payload(),
            ServerCommand::AuthAccept(cmd) => cmd.to_payload(),
            ServerCommand::AccessDenied(cmd) => cmd.to_payload(),
            ServerCommand::BlockData(cmd) => cmd.to_payload(),
            ServerCommand::TimeOfDay(cmd) => cmd.to_payload(),
            ServerCommand::CsmRestrictionFlags(cmd) => cmd.to_payload(),
            ServerCommand::ChatMessage(cmd) => cmd.to_payload(),
            ServerCommand::MovePlayer(cmd) => cmd.to_payload(),
            ServerCommand::DeleteParticleSpawner(cmd) => cmd.to_payload(),
            ServerCommand::SrpBytesSB(cmd) => cmd.to_payload(),
            ServerCommand::ActiveObjectMessages(cmd) => cmd.to_payload(),
            ServerCommand::Media(cmd) => cmd.to_payload(),
            ServerCommand::AnnounceMedia(cmd) => cmd.to_payload(),
            ServerCommand::DetachedInventory(cmd) => cmd.to_payload(),
            ServerCommand::AddParticleSpawner(cmd) => cmd.to_payload(),
            ServerCommand::HudChange(cmd) => cmd.to_payload(),
        }
    }
}

impl From<client::PeerInit> for ClientCommand {
    fn from(cmd: client::PeerInit) -> Self {
        ClientCommand::PeerInit(cmd)
    }
}

impl From<client::Init> for ClientCommand {
    fn from(cmd: client::Init) -> Self {
        ClientCommand::Init(cmd)
    }
}

impl From<client::Init2> for ClientCommand {
    fn from(cmd: client::Init2) -> Self {
        ClientCommand::Init2(cmd)
    }
}

impl From<client::ChatMessage> for ClientCommand {
    fn from(cmd: client::ChatMessage) -> Self {
        ClientCommand::ChatMessage(cmd)
    }
}

impl From<client::FirstSrp> for ClientCommand {
    fn from(cmd: client::FirstSrp) -> Self {
        ClientCommand::FirstSrp(cmd)
    }
}

impl From<client::SrpBytesA> for ClientCommand {
    fn from(cmd: client::SrpBytesA) -> Self {
        ClientCommand::SrpBytesA(cmd)
    }
}

impl From<client::SrpBytesM> for ClientCommand {
    fn from(cmd: client::SrpBytesM) -> Self {
        ClientCommand::SrpBytesM(cmd)
    }
}

impl From<client::RequestMedia> for ClientCommand {
    fn from(cmd: client::RequestMedia) -> Self {
        ClientCommand::RequestMedia(cmd)
    }
}
