use super::Reader;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use serde::Serialize;

/// The two record encodings the gateway speaks. They share the unit and
/// record layout; what differs is the width of IO element ids and counts,
/// and whether the variable-length element group exists at all. Everything
/// downstream parametrizes over this instead of branching on the raw id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CodecVariant {
    Codec8,
    Codec8Extended,
}

pub const CODEC8_ID: u8 = 0x08;
pub const CODEC8_EXTENDED_ID: u8 = 0x8E;

impl CodecVariant {
    pub fn from_wire(id: u8) -> Result<Self> {
        match id {
            CODEC8_ID => Ok(CodecVariant::Codec8),
            CODEC8_EXTENDED_ID => Ok(CodecVariant::Codec8Extended),
            other => Err(Error::UnknownCodec(other)),
        }
    }

    pub const fn wire_id(self) -> u8 {
        match self {
            CodecVariant::Codec8 => CODEC8_ID,
            CodecVariant::Codec8Extended => CODEC8_EXTENDED_ID,
        }
    }

    /// Only the extended variant carries the trailing variable-length
    /// element group.
    pub const fn has_nx_group(self) -> bool {
        matches!(self, CodecVariant::Codec8Extended)
    }

    /// IO element id: one byte on the wire for Codec 8, two for extended.
    /// Always widened to u16 in memory.
    pub fn read_id(self, r: &mut Reader) -> Result<u16> {
        match self {
            CodecVariant::Codec8 => Ok(r.u8()? as u16),
            CodecVariant::Codec8Extended => r.u16(),
        }
    }

    /// Element counts use the same width rule as ids.
    pub fn read_count(self, r: &mut Reader) -> Result<u16> {
        self.read_id(r)
    }

    pub fn put_id(self, id: u16, dst: &mut BytesMut) -> Result<()> {
        match self {
            CodecVariant::Codec8 => {
                let narrow = u8::try_from(id).map_err(|_| {
                    Error::General(format!("IO id {id} does not fit codec 8 key width"))
                })?;
                dst.put_u8(narrow);
            }
            CodecVariant::Codec8Extended => dst.put_u16(id),
        }
        Ok(())
    }

    pub fn put_count(self, n: u16, dst: &mut BytesMut) -> Result<()> {
        match self {
            CodecVariant::Codec8 => {
                let narrow = u8::try_from(n).map_err(|_| {
                    Error::General(format!("element count {n} does not fit codec 8"))
                })?;
                dst.put_u8(narrow);
            }
            CodecVariant::Codec8Extended => dst.put_u16(n),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_ids_round_trip() {
        for variant in [CodecVariant::Codec8, CodecVariant::Codec8Extended] {
            assert_eq!(CodecVariant::from_wire(variant.wire_id()).unwrap(), variant);
        }
    }

    #[test]
    fn unknown_codec_id_is_rejected() {
        assert!(matches!(
            CodecVariant::from_wire(0x10),
            Err(Error::UnknownCodec(0x10))
        ));
    }

    #[test]
    fn key_widths_differ_between_variants() {
        let mut dst = BytesMut::new();
        CodecVariant::Codec8.put_id(0x42, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), &[0x42]);

        dst.clear();
        CodecVariant::Codec8Extended.put_id(11700, &mut dst).unwrap();
        assert_eq!(dst.as_ref(), &[0x2D, 0xB4]);

        let mut r = Reader::new(&[0x2D, 0xB4]);
        assert_eq!(CodecVariant::Codec8Extended.read_id(&mut r).unwrap(), 11700);
    }

    #[test]
    fn wide_id_rejected_for_narrow_codec() {
        let mut dst = BytesMut::new();
        assert!(CodecVariant::Codec8.put_id(11700, &mut dst).is_err());
    }
}
