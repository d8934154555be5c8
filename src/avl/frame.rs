use super::packet::{self, AvlPacket, Scan};
use crate::{Error, Result};
use atoi::FromRadix10;
use bytes::{Buf, BufMut, BytesMut};
use derive_more::Display;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

/// Handshake response bytes.
pub const HANDSHAKE_ACCEPT: u8 = 0x01;
pub const HANDSHAKE_REJECT: u8 = 0x00;

/// The ASCII-digit serial (typically a 15-digit IMEI) a tracker announces
/// once per connection, before any data unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize)]
#[display("{_0}")]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub const MAX_LEN: usize = 20;

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > Self::MAX_LEN {
            return Err(Error::InvalidIdentity(format!(
                "identity length {} outside 1..={}",
                bytes.len(),
                Self::MAX_LEN
            )));
        }
        // digits only, all of them; 20 digits always fit a u128
        let (_, used) = u128::from_radix_10(bytes);
        if used != bytes.len() {
            return Err(Error::InvalidIdentity(format!(
                "identity is not all ASCII digits: {:?}",
                String::from_utf8_lossy(bytes)
            )));
        }
        Ok(DeviceIdentity(String::from_utf8_lossy(bytes).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the stream yields to the connection driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Handshake completed; the device announced this identity.
    Identity(DeviceIdentity),
    /// One fully validated data unit.
    Packet(AvlPacket),
    /// A unit that failed its checksum. Content is dropped, but the
    /// acknowledgment is still owed with the unit's claimed record count,
    /// or the tracker retransmits forever.
    Rejected { claimed_records: u32 },
}

/// What the connection driver writes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    HandshakeAccept,
    HandshakeReject,
    Ack(u32),
}

/// Stateful framing over one tracker connection: the identity exchange
/// first, then repeated unit extraction with one-byte resynchronization on
/// corrupt framing. `Ok(None)` always means "await more bytes"; an `Err`
/// is connection-fatal.
#[derive(Debug, Default)]
pub struct AvlStreamCodec {
    authenticated: bool,
}

impl AvlStreamCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_identity(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        if src.len() < 2 {
            return Ok(None);
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if len > DeviceIdentity::MAX_LEN {
            return Err(Error::InvalidIdentity(format!(
                "declared identity length {len} is implausible"
            )));
        }
        if src.len() < 2 + len {
            src.reserve(2 + len - src.len());
            return Ok(None);
        }
        let handshake = src.split_to(2 + len);
        let identity = DeviceIdentity::parse(&handshake[2..])?;
        self.authenticated = true;
        Ok(Some(Inbound::Identity(identity)))
    }
}

impl Decoder for AvlStreamCodec {
    type Item = Inbound;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        if !self.authenticated {
            return self.decode_identity(src);
        }
        loop {
            match packet::scan(src) {
                Scan::NeedMore => return Ok(None),
                Scan::Corrupt => {
                    // corrupt framing: drop a single byte and rescan, so a
                    // desynchronized stream recovers at the next preamble
                    src.advance(1);
                }
                Scan::Unit { total_len } => {
                    let unit = src.split_to(total_len);
                    match packet::decode_unit(&unit) {
                        Ok(pkt) => return Ok(Some(Inbound::Packet(pkt))),
                        Err(Error::ChecksumMismatch { expected, actual }) => {
                            let claimed_records = packet::claimed_record_count(&unit);
                            warn!(
                                claimed_records,
                                "unit failed checksum (expected {expected:#06x}, got {actual:#06x}), dropped but acknowledged"
                            );
                            return Ok(Some(Inbound::Rejected { claimed_records }));
                        }
                        Err(err) => {
                            // the whole unit is already consumed; scanning
                            // continues with whatever follows it
                            warn!(%err, unit_len = unit.len(), "corrupt unit discarded");
                        }
                    }
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Inbound>> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => {
                if !src.is_empty() {
                    // no partial unit ever surfaces past a closed socket
                    debug!(discarded = src.len(), "partial unit at connection close");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Outbound> for AvlStreamCodec {
    type Error = Error;

    fn encode(&mut self, item: Outbound, dst: &mut BytesMut) -> Result<()> {
        match item {
            Outbound::HandshakeAccept => dst.put_u8(HANDSHAKE_ACCEPT),
            Outbound::HandshakeReject => dst.put_u8(HANDSHAKE_REJECT),
            Outbound::Ack(count) => dst.put_u32(count),
        }
        Ok(())
    }
}

/// Tracker-side handshake frame. Shared by the simulator and tests.
pub fn encode_handshake(identity: &DeviceIdentity, dst: &mut BytesMut) {
    let bytes = identity.as_str().as_bytes();
    dst.put_u16(bytes.len() as u16);
    dst.put_slice(bytes);
}
