//! Wire codec for the packet envelope.
//!
//! Every datagram starts with the same 8-byte envelope, all integers big-endian:
//!
//! ```text
//! [ProtocolId(4)] [PeerId(2)] [Channel(1)] [PacketType(1)] [Body...]
//! ```
//!
//! Bodies by packet type:
//!
//! ```text
//! Control:  [ControlType(1)] [SeqNr(2)] [NewPeerId(2), SetPeerId only]
//! Original: [CommandId(2)] [CommandPayload...]
//! Reliable: [SeqNr(2)] [SubType(1)] [Inner...]
//!   inner Control:  [ControlType(1)] [NewPeerId(2), SetPeerId only]
//!   inner Original: [CommandId(2)] [CommandPayload...]
//!   inner Split:    [SplitSeqNr(2)] [ChunkCount(2)] [ChunkIndex(2)] [Data...]
//! ```
//!
//! Decoding is pure and never panics on hostile input: anything that does not
//! fit the layout above is reported as [`ProtocolError::MalformedPacket`].

use crate::error::{constants, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Fixed protocol marker that prefixes every datagram.
pub const PROTOCOL_ID: [u8; 4] = [0x4f, 0x45, 0x74, 0x03];

/// Envelope length: marker, peer id, channel and packet type.
pub const ENVELOPE_LEN: usize = 8;

/// Reliable header: sequence number and sub-type.
pub const RELIABLE_HEADER_LEN: usize = 3;

/// Split header: split sequence number, chunk count and chunk index.
pub const SPLIT_HEADER_LEN: usize = 6;

/// Peer id used before the server assigns one.
pub const PEER_ID_UNASSIGNED: u16 = 0;

/// Peer id the server uses for itself.
pub const PEER_ID_SERVER: u16 = 1;

/// Numeric packet type, shared by the envelope and the reliable sub-type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Control = 0,
    Original = 1,
    Split = 2,
    Reliable = 3,
}

impl TryFrom<u8> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::Control),
            1 => Ok(PacketType::Original),
            2 => Ok(PacketType::Split),
            3 => Ok(PacketType::Reliable),
            _ => Err(ProtocolError::MalformedPacket(
                constants::ERR_UNKNOWN_PACKET_TYPE,
            )),
        }
    }
}

/// Transport-management indication carried by control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    Ack,
    /// Server assignment of the client's peer id.
    SetPeerId(u16),
    Ping,
    Disconnect,
}

impl Control {
    const ACK: u8 = 0;
    const SET_PEER_ID: u8 = 1;
    const PING: u8 = 2;
    const DISCONNECT: u8 = 3;

    /// Wire value of the control type.
    pub fn code(self) -> u8 {
        match self {
            Control::Ack => Self::ACK,
            Control::SetPeerId(_) => Self::SET_PEER_ID,
            Control::Ping => Self::PING,
            Control::Disconnect => Self::DISCONNECT,
        }
    }
}

/// A raw application command: its 16-bit id and undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub command_id: u16,
    pub data: Bytes,
}

impl Payload {
    pub fn new(command_id: u16, data: impl Into<Bytes>) -> Self {
        Self {
            command_id,
            data: data.into(),
        }
    }

    /// Parses `[CommandId(2)] [Data...]`, as carried by original bodies and
    /// by reassembled split messages.
    pub fn from_bytes(mut buf: Bytes) -> Result<Self> {
        if buf.len() < 2 {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_TRUNCATED_COMMAND,
            ));
        }
        let command_id = buf.get_u16();
        Ok(Self {
            command_id,
            data: buf,
        })
    }

    /// Length on the wire including the command id.
    pub fn wire_len(&self) -> usize {
        2 + self.data.len()
    }

    /// `[CommandId(2)] [Data...]`, the form split across fragments.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_len());
        self.write(&mut dst);
        dst.freeze()
    }

    fn write(&self, dst: &mut BytesMut) {
        dst.put_u16(self.command_id);
        dst.put_slice(&self.data);
    }
}

/// One chunk of a logical payload too large for a single datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFragment {
    /// Groups the fragments of one logical message.
    pub sequence_number: u16,
    pub chunk_count: u16,
    /// Zero-based, always below `chunk_count`.
    pub chunk_index: u16,
    pub data: Bytes,
}

/// Body of a reliable packet, selected by its sub-type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reliable {
    Control(Control),
    Original(Payload),
    Split(SplitFragment),
}

/// Body of a packet, selected by the envelope's packet type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Control {
        sequence_number: u16,
        control: Control,
    },
    Original(Payload),
    Reliable {
        sequence_number: u16,
        inner: Reliable,
    },
}

/// A decoded datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub peer_id: u16,
    pub channel: u8,
    pub body: Body,
}

impl Packet {
    /// Unreliable control packet on channel 0.
    pub fn control(peer_id: u16, sequence_number: u16, control: Control) -> Self {
        Self {
            peer_id,
            channel: 0,
            body: Body::Control {
                sequence_number,
                control,
            },
        }
    }

    /// Acknowledgement echoing a reliable packet's sequence number and channel.
    pub fn ack(peer_id: u16, channel: u8, sequence_number: u16) -> Self {
        Self {
            peer_id,
            channel,
            body: Body::Control {
                sequence_number,
                control: Control::Ack,
            },
        }
    }

    /// Unreliable command packet on channel 1.
    pub fn original(peer_id: u16, payload: Payload) -> Self {
        Self {
            peer_id,
            channel: 1,
            body: Body::Original(payload),
        }
    }

    pub fn reliable(peer_id: u16, channel: u8, sequence_number: u16, payload: Payload) -> Self {
        Self {
            peer_id,
            channel,
            body: Body::Reliable {
                sequence_number,
                inner: Reliable::Original(payload),
            },
        }
    }

    pub fn reliable_split(
        peer_id: u16,
        channel: u8,
        sequence_number: u16,
        fragment: SplitFragment,
    ) -> Self {
        Self {
            peer_id,
            channel,
            body: Body::Reliable {
                sequence_number,
                inner: Reliable::Split(fragment),
            },
        }
    }

    pub fn reliable_control(
        peer_id: u16,
        channel: u8,
        sequence_number: u16,
        control: Control,
    ) -> Self {
        Self {
            peer_id,
            channel,
            body: Body::Reliable {
                sequence_number,
                inner: Reliable::Control(control),
            },
        }
    }

    /// Envelope packet type.
    pub fn packet_type(&self) -> PacketType {
        match self.body {
            Body::Control { .. } => PacketType::Control,
            Body::Original(_) => PacketType::Original,
            Body::Reliable { .. } => PacketType::Reliable,
        }
    }

    /// Sub-type of a reliable packet.
    pub fn sub_type(&self) -> Option<PacketType> {
        match &self.body {
            Body::Reliable { inner, .. } => Some(match inner {
                Reliable::Control(_) => PacketType::Control,
                Reliable::Original(_) => PacketType::Original,
                Reliable::Split(_) => PacketType::Split,
            }),
            _ => None,
        }
    }

    /// Sequence number of reliable and control packets.
    pub fn sequence_number(&self) -> Option<u16> {
        match self.body {
            Body::Control {
                sequence_number, ..
            }
            | Body::Reliable {
                sequence_number, ..
            } => Some(sequence_number),
            Body::Original(_) => None,
        }
    }

    /// Control indication, whether top-level or wrapped in a reliable packet.
    pub fn control_type(&self) -> Option<Control> {
        match &self.body {
            Body::Control { control, .. } => Some(*control),
            Body::Reliable {
                inner: Reliable::Control(control),
                ..
            } => Some(*control),
            _ => None,
        }
    }

    /// Command payload of original and reliable-original packets.
    pub fn payload(&self) -> Option<&Payload> {
        match &self.body {
            Body::Original(payload)
            | Body::Reliable {
                inner: Reliable::Original(payload),
                ..
            } => Some(payload),
            _ => None,
        }
    }

    pub fn split_fragment(&self) -> Option<&SplitFragment> {
        match &self.body {
            Body::Reliable {
                inner: Reliable::Split(fragment),
                ..
            } => Some(fragment),
            _ => None,
        }
    }

    /// Peer id carried by a SetPeerId indication.
    pub fn assigned_peer_id(&self) -> Option<u16> {
        match self.control_type() {
            Some(Control::SetPeerId(peer_id)) => Some(peer_id),
            _ => None,
        }
    }

    /// Encode this packet into a byte buffer.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.write(&mut dst);
        dst.freeze()
    }

    /// Number of bytes `to_bytes` produces.
    pub fn encoded_len(&self) -> usize {
        ENVELOPE_LEN
            + match &self.body {
                Body::Control { control, .. } => 3 + control_extra_len(*control),
                Body::Original(payload) => payload.wire_len(),
                Body::Reliable { inner, .. } => {
                    RELIABLE_HEADER_LEN
                        + match inner {
                            Reliable::Control(control) => 1 + control_extra_len(*control),
                            Reliable::Original(payload) => payload.wire_len(),
                            Reliable::Split(fragment) => SPLIT_HEADER_LEN + fragment.data.len(),
                        }
                }
            }
    }

    /// Encode into an existing buffer.
    pub fn write(&self, dst: &mut BytesMut) {
        dst.put_slice(&PROTOCOL_ID);
        dst.put_u16(self.peer_id);
        dst.put_u8(self.channel);
        dst.put_u8(self.packet_type() as u8);

        match &self.body {
            Body::Control {
                sequence_number,
                control,
            } => {
                dst.put_u8(control.code());
                dst.put_u16(*sequence_number);
                if let Control::SetPeerId(assigned) = control {
                    dst.put_u16(*assigned);
                }
            }
            Body::Original(payload) => payload.write(dst),
            Body::Reliable {
                sequence_number,
                inner,
            } => {
                dst.put_u16(*sequence_number);
                match inner {
                    Reliable::Control(control) => {
                        dst.put_u8(PacketType::Control as u8);
                        dst.put_u8(control.code());
                        if let Control::SetPeerId(assigned) = control {
                            dst.put_u16(*assigned);
                        }
                    }
                    Reliable::Original(payload) => {
                        dst.put_u8(PacketType::Original as u8);
                        payload.write(dst);
                    }
                    Reliable::Split(fragment) => {
                        dst.put_u8(PacketType::Split as u8);
                        dst.put_u16(fragment.sequence_number);
                        dst.put_u16(fragment.chunk_count);
                        dst.put_u16(fragment.chunk_index);
                        dst.put_slice(&fragment.data);
                    }
                }
            }
        }
    }

    /// Decode a packet from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::decode(Bytes::copy_from_slice(data))
    }

    /// Decode a packet, sharing payload storage with `buf`.
    ///
    /// A SetPeerId indication overrides the envelope's peer id with the
    /// newly assigned one.
    pub fn decode(mut buf: Bytes) -> Result<Self> {
        if buf.len() < 5 {
            return Err(ProtocolError::MalformedPacket(constants::ERR_SHORT_ENVELOPE));
        }
        if buf[..4] != PROTOCOL_ID {
            return Err(ProtocolError::MalformedPacket(
                constants::ERR_BAD_PROTOCOL_ID,
            ));
        }
        if buf.len() < ENVELOPE_LEN {
            return Err(ProtocolError::MalformedPacket(constants::ERR_SHORT_ENVELOPE));
        }

        buf.advance(4);
        let peer_id = buf.get_u16();
        let channel = buf.get_u8();
        let packet_type = PacketType::try_from(buf.get_u8())?;

        let body = match packet_type {
            PacketType::Control => {
                let (sequence_number, control) = decode_control(&mut buf)?;
                Body::Control {
                    sequence_number,
                    control,
                }
            }
            PacketType::Original => Body::Original(Payload::from_bytes(buf)?),
            PacketType::Reliable => {
                if buf.remaining() < RELIABLE_HEADER_LEN {
                    return Err(ProtocolError::MalformedPacket(
                        constants::ERR_TRUNCATED_RELIABLE,
                    ));
                }
                let sequence_number = buf.get_u16();
                let inner = match PacketType::try_from(buf.get_u8()) {
                    Ok(PacketType::Control) => Reliable::Control(decode_inner_control(&mut buf)?),
                    Ok(PacketType::Original) => Reliable::Original(Payload::from_bytes(buf)?),
                    Ok(PacketType::Split) => Reliable::Split(decode_split(buf)?),
                    _ => {
                        return Err(ProtocolError::MalformedPacket(
                            constants::ERR_UNKNOWN_SUB_TYPE,
                        ))
                    }
                };
                Body::Reliable {
                    sequence_number,
                    inner,
                }
            }
            PacketType::Split => {
                return Err(ProtocolError::MalformedPacket(
                    constants::ERR_UNKNOWN_PACKET_TYPE,
                ))
            }
        };

        let mut packet = Packet {
            peer_id,
            channel,
            body,
        };
        if let Some(assigned) = packet.assigned_peer_id() {
            packet.peer_id = assigned;
        }
        Ok(packet)
    }
}

fn control_extra_len(control: Control) -> usize {
    match control {
        Control::SetPeerId(_) => 2,
        _ => 0,
    }
}

fn control_from_code(code: u8, buf: &mut Bytes) -> Result<Control> {
    match code {
        Control::ACK => Ok(Control::Ack),
        Control::SET_PEER_ID => {
            if buf.remaining() < 2 {
                return Err(ProtocolError::MalformedPacket(
                    constants::ERR_TRUNCATED_CONTROL,
                ));
            }
            Ok(Control::SetPeerId(buf.get_u16()))
        }
        Control::PING => Ok(Control::Ping),
        Control::DISCONNECT => Ok(Control::Disconnect),
        _ => Err(ProtocolError::MalformedPacket(
            constants::ERR_UNKNOWN_CONTROL_TYPE,
        )),
    }
}

/// Top-level control body. Servers omit the sequence number on ping and
/// disconnect, so it defaults to zero there.
fn decode_control(buf: &mut Bytes) -> Result<(u16, Control)> {
    if !buf.has_remaining() {
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_TRUNCATED_CONTROL,
        ));
    }
    let code = buf.get_u8();
    if buf.remaining() < 2 {
        return match code {
            Control::PING => Ok((0, Control::Ping)),
            Control::DISCONNECT => Ok((0, Control::Disconnect)),
            _ => Err(ProtocolError::MalformedPacket(
                constants::ERR_TRUNCATED_CONTROL,
            )),
        };
    }
    let sequence_number = buf.get_u16();
    let control = control_from_code(code, buf)?;
    Ok((sequence_number, control))
}

fn decode_inner_control(buf: &mut Bytes) -> Result<Control> {
    if !buf.has_remaining() {
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_TRUNCATED_CONTROL,
        ));
    }
    let code = buf.get_u8();
    control_from_code(code, buf)
}

fn decode_split(mut buf: Bytes) -> Result<SplitFragment> {
    if buf.remaining() < SPLIT_HEADER_LEN {
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_TRUNCATED_SPLIT,
        ));
    }
    let sequence_number = buf.get_u16();
    let chunk_count = buf.get_u16();
    let chunk_index = buf.get_u16();
    if chunk_index >= chunk_count {
        return Err(ProtocolError::MalformedPacket(
            constants::ERR_BAD_CHUNK_INDEX,
        ));
    }
    Ok(SplitFragment {
        sequence_number,
        chunk_count,
        chunk_index,
        data: buf,
    })
}
