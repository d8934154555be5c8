use super::Reader;
use super::codec::CodecVariant;
use crate::{Error, Result};
use bytes::{BufMut, BytesMut};
use serde::Serialize;
use std::collections::BTreeMap;

/// Longitude, latitude, altitude, angle, satellites, speed. 15 bytes on
/// the wire, always present; an all-zero block is the tracker's "no fix"
/// sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GpsFix {
    /// 1e-7 degree fixed point
    pub longitude: i32,
    /// 1e-7 degree fixed point
    pub latitude: i32,
    /// meters
    pub altitude: i16,
    /// degrees clockwise from north
    pub angle: u16,
    pub satellites: u8,
    pub speed_kmh: u16,
}

pub const GPS_BLOCK_LEN: usize = 15;

impl GpsFix {
    pub const NO_FIX: GpsFix = GpsFix {
        longitude: 0,
        latitude: 0,
        altitude: 0,
        angle: 0,
        satellites: 0,
        speed_kmh: 0,
    };

    pub fn has_fix(&self) -> bool {
        *self != Self::NO_FIX
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude as f64 * 1e-7
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude as f64 * 1e-7
    }

    fn decode(r: &mut Reader) -> Result<Self> {
        Ok(GpsFix {
            longitude: r.i32()?,
            latitude: r.i32()?,
            altitude: r.i16()?,
            angle: r.u16()?,
            satellites: r.u8()?,
            speed_kmh: r.u16()?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32(self.longitude);
        dst.put_i32(self.latitude);
        dst.put_i16(self.altitude);
        dst.put_u16(self.angle);
        dst.put_u8(self.satellites);
        dst.put_u16(self.speed_kmh);
    }
}

/// One decoded sensor/diagnostic reading. Fixed-width values are unsigned
/// big-endian integers of 1, 2, 4 or 8 bytes; `Raw` holds the extended
/// variant's variable-length payloads, passed through as opaque bytes for
/// the consumer to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IoValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Raw(Vec<u8>),
}

impl IoValue {
    /// Numeric view of a fixed-width value; `None` for raw payloads.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            IoValue::U8(v) => Some(*v as u64),
            IoValue::U16(v) => Some(*v as u64),
            IoValue::U32(v) => Some(*v as u64),
            IoValue::U64(v) => Some(*v),
            IoValue::Raw(_) => None,
        }
    }
}

/// The IO element set of one record: unique id per element, a duplicate id
/// on the wire keeps the last value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IoElements {
    elements: BTreeMap<u16, IoValue>,
}

impl IoElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u16, value: IoValue) {
        self.elements.insert(id, value);
    }

    pub fn get(&self, id: u16) -> Option<&IoValue> {
        self.elements.get(&id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &IoValue)> {
        self.elements.iter().map(|(id, value)| (*id, value))
    }

    /// Four fixed-order width buckets, each with its own leading count,
    /// then (extended only) the variable-length group. The leading total
    /// must equal the sum of all bucket counts or the unit is corrupt.
    pub fn decode(variant: CodecVariant, r: &mut Reader) -> Result<Self> {
        let total = variant.read_count(r)? as u32;
        let mut elements = BTreeMap::new();
        let mut seen: u32 = 0;

        let n1 = variant.read_count(r)?;
        for _ in 0..n1 {
            let id = variant.read_id(r)?;
            elements.insert(id, IoValue::U8(r.u8()?));
        }
        let n2 = variant.read_count(r)?;
        for _ in 0..n2 {
            let id = variant.read_id(r)?;
            elements.insert(id, IoValue::U16(r.u16()?));
        }
        let n4 = variant.read_count(r)?;
        for _ in 0..n4 {
            let id = variant.read_id(r)?;
            elements.insert(id, IoValue::U32(r.u32()?));
        }
        let n8 = variant.read_count(r)?;
        for _ in 0..n8 {
            let id = variant.read_id(r)?;
            elements.insert(id, IoValue::U64(r.u64()?));
        }
        seen += n1 as u32 + n2 as u32 + n4 as u32 + n8 as u32;

        if variant.has_nx_group() {
            let nx = variant.read_count(r)?;
            for _ in 0..nx {
                let id = r.u16()?;
                let len = r.u16()?;
                let bytes = r.bytes(len as usize)?;
                elements.insert(id, IoValue::Raw(bytes.to_vec()));
            }
            seen += nx as u32;
        }

        if seen != total {
            return Err(Error::Framing(format!(
                "IO element total {total} disagrees with bucket counts {seen}"
            )));
        }

        Ok(IoElements { elements })
    }

    pub fn encode(&self, variant: CodecVariant, dst: &mut BytesMut) -> Result<()> {
        let mut ones = Vec::new();
        let mut twos = Vec::new();
        let mut fours = Vec::new();
        let mut eights = Vec::new();
        let mut raws = Vec::new();
        for (&id, value) in &self.elements {
            match value {
                IoValue::U8(v) => ones.push((id, *v)),
                IoValue::U16(v) => twos.push((id, *v)),
                IoValue::U32(v) => fours.push((id, *v)),
                IoValue::U64(v) => eights.push((id, *v)),
                IoValue::Raw(bytes) => raws.push((id, bytes)),
            }
        }
        if !raws.is_empty() && !variant.has_nx_group() {
            return Err(Error::General(
                "variable-length IO elements require codec 8 extended".into(),
            ));
        }

        let total = u16::try_from(self.elements.len())
            .map_err(|_| Error::General("too many IO elements for one record".into()))?;
        variant.put_count(total, dst)?;

        variant.put_count(ones.len() as u16, dst)?;
        for (id, v) in ones {
            variant.put_id(id, dst)?;
            dst.put_u8(v);
        }
        variant.put_count(twos.len() as u16, dst)?;
        for (id, v) in twos {
            variant.put_id(id, dst)?;
            dst.put_u16(v);
        }
        variant.put_count(fours.len() as u16, dst)?;
        for (id, v) in fours {
            variant.put_id(id, dst)?;
            dst.put_u32(v);
        }
        variant.put_count(eights.len() as u16, dst)?;
        for (id, v) in eights {
            variant.put_id(id, dst)?;
            dst.put_u64(v);
        }

        if variant.has_nx_group() {
            variant.put_count(raws.len() as u16, dst)?;
            for (id, bytes) in raws {
                let len = u16::try_from(bytes.len()).map_err(|_| {
                    Error::General(format!("IO element {id} payload exceeds u16 length"))
                })?;
                dst.put_u16(id);
                dst.put_u16(len);
                dst.put_slice(bytes);
            }
        }
        Ok(())
    }
}

pub const MAX_PRIORITY: u8 = 3;

/// One timestamped AVL record: when, how urgent, where, and what the
/// sensors said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvlRecord {
    /// milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub priority: u8,
    pub position: GpsFix,
    /// id of the IO element that triggered this record, 0 for periodic
    pub event_io_id: u16,
    pub io: IoElements,
}

impl AvlRecord {
    pub fn decode(variant: CodecVariant, r: &mut Reader) -> Result<Self> {
        let timestamp_ms = r.u64()?;
        let priority = r.u8()?;
        if priority > MAX_PRIORITY {
            return Err(Error::Framing(format!("priority {priority} out of range")));
        }
        let position = GpsFix::decode(r)?;
        let event_io_id = variant.read_id(r)?;
        let io = IoElements::decode(variant, r)?;
        Ok(AvlRecord {
            timestamp_ms,
            priority,
            position,
            event_io_id,
            io,
        })
    }

    pub fn encode(&self, variant: CodecVariant, dst: &mut BytesMut) -> Result<()> {
        dst.put_u64(self.timestamp_ms);
        dst.put_u8(self.priority);
        self.position.encode(dst);
        variant.put_id(self.event_io_id, dst)?;
        self.io.encode(variant, dst)
    }
}
