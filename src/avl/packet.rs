use super::Reader;
use super::codec::CodecVariant;
use super::crc::crc16;
use super::record::AvlRecord;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use serde::Serialize;

pub const PREAMBLE_LEN: usize = 4;
/// zero preamble + 4-byte data length
pub const HEADER_LEN: usize = 8;
pub const CRC_FIELD_LEN: usize = 4;
/// codec id + record count + trailing record count
pub const MIN_DATA_LENGTH: usize = 3;
/// device-side bound on one AVL packet
pub const MAX_DATA_LENGTH: usize = 1280;

/// One decoded data unit: which encoding it used and its records, in wire
/// order. The two on-wire record-count fields are validated during parse
/// and not carried around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvlPacket {
    pub variant: CodecVariant,
    pub records: Vec<AvlRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// A complete unit of `total_len` bytes sits at the head of the buffer.
    Unit { total_len: usize },
    /// Framing is plausible so far but the unit has not fully arrived.
    NeedMore,
    /// The head of the buffer cannot start a unit; skip a byte and rescan.
    Corrupt,
}

/// Frame scan over a buffer assumed to start at a unit boundary. Rejects a
/// non-zero preamble as early as the bytes allow, so garbage is skipped
/// without waiting for a full header.
pub fn scan(buf: &[u8]) -> Scan {
    let lead = buf.len().min(PREAMBLE_LEN);
    if buf[..lead].iter().any(|&b| b != 0) {
        return Scan::Corrupt;
    }
    if buf.len() < HEADER_LEN {
        return Scan::NeedMore;
    }
    let data_len = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]) as usize;
    if !(MIN_DATA_LENGTH..=MAX_DATA_LENGTH).contains(&data_len) {
        return Scan::Corrupt;
    }
    let total_len = HEADER_LEN + data_len + CRC_FIELD_LEN;
    if buf.len() < total_len {
        Scan::NeedMore
    } else {
        Scan::Unit { total_len }
    }
}

/// The record count a unit claims in its header. Used to acknowledge
/// checksum-rejected units without trusting their content.
pub fn claimed_record_count(unit: &[u8]) -> u32 {
    unit.get(HEADER_LEN + 1).copied().unwrap_or(0) as u32
}

/// Decode one complete unit, as delimited by [`scan`]. Checksum is
/// verified first: a unit that fails it is reported as
/// [`Error::ChecksumMismatch`] without trusting any structure beyond the
/// claimed record count. A unit that passes must then be internally
/// consistent, and its records must consume the declared data length
/// exactly.
pub fn decode_unit(unit: &[u8]) -> Result<AvlPacket> {
    let data_len = u32::from_be_bytes(unit[PREAMBLE_LEN..HEADER_LEN].try_into()?) as usize;
    if unit.len() != HEADER_LEN + data_len + CRC_FIELD_LEN {
        return Err(Error::Framing(format!(
            "unit of {} bytes disagrees with declared data length {data_len}",
            unit.len()
        )));
    }
    let payload = &unit[HEADER_LEN..HEADER_LEN + data_len];
    let wire_crc = u32::from_be_bytes(unit[unit.len() - CRC_FIELD_LEN..].try_into()?);
    let computed = crc16(payload);
    if wire_crc != computed as u32 {
        return Err(Error::ChecksumMismatch {
            expected: computed,
            actual: (wire_crc & 0xFFFF) as u16,
        });
    }

    let mut r = Reader::new(payload);
    let variant = CodecVariant::from_wire(r.u8()?)?;
    let count = r.u8()?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(AvlRecord::decode(variant, &mut r)?);
    }
    let trailing = r.u8()?;
    if trailing != count {
        return Err(Error::Framing(format!(
            "header record count {count} does not match trailing count {trailing}"
        )));
    }
    if !r.is_empty() {
        return Err(Error::Framing(format!(
            "{} bytes of declared data length left after records",
            r.remaining()
        )));
    }
    Ok(AvlPacket { variant, records })
}

/// Tracker-side encoding of a unit: preamble, data length, codec payload,
/// CRC. Shared by the simulator and the round-trip tests.
pub fn encode_unit(packet: &AvlPacket, dst: &mut BytesMut) -> Result<()> {
    let count = u8::try_from(packet.records.len())
        .map_err(|_| Error::General("a unit carries at most 255 records".into()))?;

    let mut payload = BytesMut::new();
    payload.put_u8(packet.variant.wire_id());
    payload.put_u8(count);
    for record in &packet.records {
        record.encode(packet.variant, &mut payload)?;
    }
    payload.put_u8(count);
    if payload.len() > MAX_DATA_LENGTH {
        return Err(Error::General(format!(
            "unit data length {} exceeds the {MAX_DATA_LENGTH}-byte device bound",
            payload.len()
        )));
    }

    dst.put_u32(0);
    dst.put_u32(payload.len() as u32);
    let crc = crc16(&payload);
    dst.put_slice(&payload);
    dst.put_u32(crc as u32);
    Ok(())
}
