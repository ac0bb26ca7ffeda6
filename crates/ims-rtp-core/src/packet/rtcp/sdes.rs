use bytes::{Buf, BufMut, BytesMut};

use crate::error::Error;
use crate::{Result, RtpSsrc};

/// SDES item type (RFC 3550 §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdesItemType {
    Cname,
    Name,
    Email,
    Phone,
    Loc,
    Tool,
    Note,
    Priv,
}

impl SdesItemType {
    fn to_u8(self) -> u8 {
        match self {
            Self::Cname => 1,
            Self::Name => 2,
            Self::Email => 3,
            Self::Phone => 4,
            Self::Loc => 5,
            Self::Tool => 6,
            Self::Note => 7,
            Self::Priv => 8,
        }
    }

    fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            1 => Self::Cname,
            2 => Self::Name,
            3 => Self::Email,
            4 => Self::Phone,
            5 => Self::Loc,
            6 => Self::Tool,
            7 => Self::Note,
            8 => Self::Priv,
            other => return Err(Error::rtcp(format!("unknown SDES item type {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesItem {
    pub item_type: SdesItemType,
    pub value: String,
}

/// One chunk of a compound SDES packet: an SSRC/CSRC and its items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdesChunk {
    pub ssrc: RtpSsrc,
    pub items: Vec<SdesItem>,
}

impl SdesChunk {
    pub fn new_cname(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        Self {
            ssrc,
            items: vec![SdesItem { item_type: SdesItemType::Cname, value: cname.into() }],
        }
    }

    fn unpadded_size(&self) -> usize {
        let mut size = 4; // ssrc
        for item in &self.items {
            size += 2 + item.value.len(); // type + length + text
        }
        size += 1; // null terminator
        size
    }

    fn size(&self) -> usize {
        let raw = self.unpadded_size();
        raw + ((4 - (raw % 4)) % 4)
    }

    fn serialize(&self, buf: &mut BytesMut) -> Result<()> {
        let start = buf.len();
        buf.put_u32(self.ssrc);
        for item in &self.items {
            if item.value.len() > 255 {
                return Err(Error::invalid_parameter("SDES item text exceeds 255 bytes"));
            }
            buf.put_u8(item.item_type.to_u8());
            buf.put_u8(item.value.len() as u8);
            buf.put_slice(item.value.as_bytes());
        }
        buf.put_u8(0); // item-list terminator

        let written = buf.len() - start;
        let padding = (4 - (written % 4)) % 4;
        for _ in 0..padding {
            buf.put_u8(0);
        }
        Ok(())
    }

    fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < 4 {
            return Err(Error::BufferTooSmall { required: 4, available: buf.remaining() });
        }
        let start_remaining = buf.remaining();
        let ssrc = buf.get_u32();

        let mut items = Vec::new();
        loop {
            if !buf.has_remaining() {
                return Err(Error::rtcp("SDES chunk missing item-list terminator"));
            }
            let item_type_byte = buf.get_u8();
            if item_type_byte == 0 {
                break;
            }
            if !buf.has_remaining() {
                return Err(Error::BufferTooSmall { required: 1, available: 0 });
            }
            let len = buf.get_u8() as usize;
            if buf.remaining() < len {
                return Err(Error::BufferTooSmall { required: len, available: buf.remaining() });
            }
            let mut text = vec![0u8; len];
            buf.copy_to_slice(&mut text);
            items.push(SdesItem {
                item_type: SdesItemType::from_u8(item_type_byte)?,
                value: String::from_utf8_lossy(&text).to_string(),
            });
        }

        let consumed = start_remaining - buf.remaining();
        let padding = (4 - (consumed % 4)) % 4;
        for _ in 0..padding {
            if buf.has_remaining() {
                buf.advance(1);
            }
        }

        Ok(Self { ssrc, items })
    }
}

/// RTCP Source Description (SDES) packet: a list of per-source chunks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RtcpSourceDescription {
    pub chunks: Vec<SdesChunk>,
}

impl RtcpSourceDescription {
    pub fn size(&self) -> usize {
        self.chunks.iter().map(SdesChunk::size).sum()
    }

    pub fn serialize(&self) -> Result<BytesMut> {
        let mut buf = BytesMut::with_capacity(self.size());
        for chunk in &self.chunks {
            chunk.serialize(&mut buf)?;
        }
        Ok(buf)
    }
}

pub fn parse_sdes(buf: &mut impl Buf, chunk_count: u8) -> Result<RtcpSourceDescription> {
    let mut chunks = Vec::with_capacity(chunk_count as usize);
    for _ in 0..chunk_count {
        chunks.push(SdesChunk::parse(buf)?);
    }
    Ok(RtcpSourceDescription { chunks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk_roundtrip() {
        let sdes = RtcpSourceDescription {
            chunks: vec![SdesChunk::new_cname(0x12345678, "user@host")],
        };
        let serialized = sdes.serialize().unwrap();
        assert_eq!(serialized.len() % 4, 0);

        let parsed = parse_sdes(&mut serialized.freeze(), 1).unwrap();
        assert_eq!(parsed.chunks.len(), 1);
        assert_eq!(parsed.chunks[0].ssrc, 0x12345678);
        assert_eq!(parsed.chunks[0].items[0].value, "user@host");
        assert_eq!(parsed.chunks[0].items[0].item_type, SdesItemType::Cname);
    }

    #[test]
    fn multiple_chunks_with_multiple_items() {
        let mut chunk = SdesChunk::new_cname(1, "a");
        chunk.items.push(SdesItem { item_type: SdesItemType::Tool, value: "ims-media".into() });
        let sdes = RtcpSourceDescription {
            chunks: vec![chunk, SdesChunk::new_cname(2, "bb")],
        };

        let serialized = sdes.serialize().unwrap();
        let parsed = parse_sdes(&mut serialized.freeze(), 2).unwrap();

        assert_eq!(parsed.chunks.len(), 2);
        assert_eq!(parsed.chunks[0].items.len(), 2);
        assert_eq!(parsed.chunks[0].items[1].value, "ims-media");
        assert_eq!(parsed.chunks[1].ssrc, 2);
    }
}
