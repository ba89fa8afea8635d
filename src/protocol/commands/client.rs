//! Client-to-server commands.

use crate::error::{ProtocolError, Result};
use crate::protocol::command::{put_string, put_wide_string, Command, PayloadReader};
use bytes::{BufMut, Bytes, BytesMut};

/// Highest map serialization version this client understands.
pub const SERIALIZATION_VERSION: u8 = 28;
pub const MIN_PROTOCOL_VERSION: u16 = 37;
pub const MAX_PROTOCOL_VERSION: u16 = 39;

/// Empty command that opens a session before a peer id is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerInit;

impl Command for PeerInit {
    const ID: u16 = 0x00;
    const NAME: &'static str = "PeerInit";

    fn encode(&self, _dst: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn decode(_src: &mut PayloadReader) -> Result<Self> {
        Ok(PeerInit)
    }
}

/// Client init: announces the player name and supported versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Init {
    pub serialization_version: u8,
    pub supported_compression: u16,
    pub min_protocol_version: u16,
    pub max_protocol_version: u16,
    pub player_name: String,
}

impl Init {
    pub fn new(player_name: impl Into<String>) -> Self {
        Self {
            serialization_version: SERIALIZATION_VERSION,
            supported_compression: 0,
            min_protocol_version: MIN_PROTOCOL_VERSION,
            max_protocol_version: MAX_PROTOCOL_VERSION,
            player_name: player_name.into(),
        }
    }
}

impl Command for Init {
    const ID: u16 = 0x02;
    const NAME: &'static str = "Init";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        dst.put_u8(self.serialization_version);
        dst.put_u16(self.supported_compression);
        dst.put_u16(self.min_protocol_version);
        dst.put_u16(self.max_protocol_version);
        put_string(dst, Self::NAME, self.player_name.as_bytes())
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            serialization_version: src.u8("serialization_version")?,
            supported_compression: src.u16("supported_compression")?,
            min_protocol_version: src.u16("min_protocol_version")?,
            max_protocol_version: src.u16("max_protocol_version")?,
            player_name: src.string("player_name")?,
        })
    }
}

/// Init confirmation sent once authentication is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Init2 {
    pub language: String,
}

impl Command for Init2 {
    const ID: u16 = 0x11;
    const NAME: &'static str = "Init2";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_string(dst, Self::NAME, self.language.as_bytes())
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        // Older clients sent an empty body.
        let language = if src.is_empty() {
            String::new()
        } else {
            src.string("language")?
        };
        Ok(Self { language })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub message: String,
}

impl Command for ChatMessage {
    const ID: u16 = 0x32;
    const NAME: &'static str = "ChatMessage";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_wide_string(dst, Self::NAME, &self.message)
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            message: src.wide_string("message")?,
        })
    }
}

/// Registers a new account: salt and verifier derived from the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirstSrp {
    pub salt: Bytes,
    pub verifier: Bytes,
    pub is_empty_password: bool,
}

impl Command for FirstSrp {
    const ID: u16 = 0x50;
    const NAME: &'static str = "FirstSrp";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_string(dst, Self::NAME, &self.salt)?;
        put_string(dst, Self::NAME, &self.verifier)?;
        dst.put_u8(self.is_empty_password as u8);
        Ok(())
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            salt: src.string_bytes("salt")?,
            verifier: src.string_bytes("verifier")?,
            is_empty_password: src.u8("is_empty_password")? != 0,
        })
    }
}

/// Client public value `A` of the SRP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpBytesA {
    pub bytes_a: Bytes,
    /// 1 selects the SRP verifier stored on the server.
    pub based_on: u8,
}

impl SrpBytesA {
    pub fn new(bytes_a: impl Into<Bytes>) -> Self {
        Self {
            bytes_a: bytes_a.into(),
            based_on: 1,
        }
    }
}

impl Command for SrpBytesA {
    const ID: u16 = 0x51;
    const NAME: &'static str = "SrpBytesA";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_string(dst, Self::NAME, &self.bytes_a)?;
        dst.put_u8(self.based_on);
        Ok(())
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            bytes_a: src.string_bytes("bytes_a")?,
            based_on: src.u8("based_on")?,
        })
    }
}

/// Client proof `M` of the SRP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpBytesM {
    pub bytes_m: Bytes,
}

impl Command for SrpBytesM {
    const ID: u16 = 0x52;
    const NAME: &'static str = "SrpBytesM";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_string(dst, Self::NAME, &self.bytes_m)
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        Ok(Self {
            bytes_m: src.string_bytes("bytes_m")?,
        })
    }
}

/// Asks the server for announced media files by name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestMedia {
    pub files: Vec<String>,
}

impl Command for RequestMedia {
    const ID: u16 = 0x40;
    const NAME: &'static str = "RequestMedia";

    fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let count = u16::try_from(self.files.len()).map_err(|_| {
            ProtocolError::encode(
                Self::NAME,
                format!("{} files exceed one request", self.files.len()),
            )
        })?;
        dst.put_u16(count);
        for name in &self.files {
            put_string(dst, Self::NAME, name.as_bytes())?;
        }
        Ok(())
    }

    fn decode(src: &mut PayloadReader) -> Result<Self> {
        let count = src.u16("file_count")?;
        let files = (0..count)
            .map(|_| src.string("name"))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { files })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn init_layout_is_byte_exact() {
        let payload = Init::new("test").to_payload().unwrap();
        assert_eq!(payload.command_id, 0x02);
        assert_eq!(
            &payload.data[..],
            &[28, 0x00, 0x00, 0x00, 37, 0x00, 39, 0x00, 0x04, b't', b'e', b's', b't']
        );
    }

    #[test]
    fn srp_bytes_a_defaults_to_verifier_based() {
        let payload = SrpBytesA::new(vec![0xaa, 0xbb]).to_payload().unwrap();
        assert_eq!(&payload.data[..], &[0x00, 0x02, 0xaa, 0xbb, 0x01]);
    }

    #[test]
    fn init2_accepts_empty_body() {
        assert_eq!(Init2::from_bytes(Bytes::new()).unwrap(), Init2::default());
    }

    #[test]
    fn request_media_counts_files() {
        let request = RequestMedia {
            files: vec!["a.png".into(), "b.ogg".into()],
        };
        let payload = request.to_payload().unwrap();
        assert_eq!(&payload.data[..2], &[0x00, 0x02]);
        assert_eq!(RequestMedia::from_bytes(payload.data).unwrap(), request);

        let too_many = RequestMedia {
            files: vec![String::new(); u16::MAX as usize + 1],
        };
        assert!(too_many.to_payload().is_err());
    }

    #[test]
    fn peer_init_is_empty() {
        assert!(PeerInit.to_payload().unwrap().data.is_empty());
    }
}
