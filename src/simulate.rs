//! Synthetic tracker: handshakes, streams randomized-but-plausible units
//! at a gateway, and verifies every acknowledgment. Doubles as a live
//! smoke test for a deployed listener.

use crate::avl::codec::CodecVariant;
use crate::avl::frame::{self, DeviceIdentity, HANDSHAKE_ACCEPT};
use crate::avl::packet::{AvlPacket, encode_unit};
use crate::avl::record::{AvlRecord, GpsFix, IoElements, IoValue};
use crate::{Error, Result};
use bytes::BytesMut;
use rand::Rng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SimulateOpts {
    pub host: String,
    pub port: u32,
    pub identity: String,
    pub units: u32,
    pub records_per_unit: u8,
    pub extended: bool,
    pub interval: Duration,
}

pub async fn run(opts: SimulateOpts) -> Result<()> {
    let identity = DeviceIdentity::parse(opts.identity.as_bytes())?;
    let variant = if opts.extended {
        CodecVariant::Codec8Extended
    } else {
        CodecVariant::Codec8
    };
    let address = format!("{}:{}", opts.host, opts.port);
    let mut socket = TcpStream::connect(&address).await?;
    info!(%address, device = %identity, "simulator connected");

    let mut buf = BytesMut::new();
    frame::encode_handshake(&identity, &mut buf);
    socket.write_all(&buf).await?;
    let mut response = [0u8; 1];
    socket.read_exact(&mut response).await?;
    if response[0] != HANDSHAKE_ACCEPT {
        return Err(Error::General(format!(
            "gateway refused handshake: {:#04x}",
            response[0]
        )));
    }

    let mut rng = rand::rng();
    for unit in 0..opts.units {
        let packet = random_packet(&mut rng, variant, opts.records_per_unit);
        buf.clear();
        encode_unit(&packet, &mut buf)?;
        socket.write_all(&buf).await?;

        let mut ack = [0u8; 4];
        socket.read_exact(&mut ack).await?;
        let acked = u32::from_be_bytes(ack);
        if acked as usize == packet.records.len() {
            info!(unit, acked, "unit acknowledged");
        } else {
            warn!(
                unit,
                acked,
                sent = packet.records.len(),
                "acknowledgment count mismatch"
            );
        }
        tokio::time::sleep(opts.interval).await;
    }
    Ok(())
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

pub fn random_packet(rng: &mut impl Rng, variant: CodecVariant, records: u8) -> AvlPacket {
    let base = epoch_ms();
    let records = (0..records)
        .map(|i| random_record(rng, variant, base + i as u64 * 1000))
        .collect();
    AvlPacket { variant, records }
}

fn random_record(rng: &mut impl Rng, variant: CodecVariant, timestamp_ms: u64) -> AvlRecord {
    // wanders around Vilnius
    let position = GpsFix {
        longitude: 254_000_000 + rng.random_range(-500_000..500_000),
        latitude: 546_000_000 + rng.random_range(-500_000..500_000),
        altitude: rng.random_range(80..160),
        angle: rng.random_range(0..360),
        satellites: rng.random_range(5..14),
        speed_kmh: rng.random_range(0..140),
    };
    let mut io = IoElements::new();
    io.insert(239, IoValue::U8(rng.random_range(0..=1))); // ignition
    io.insert(66, IoValue::U16(rng.random_range(11_000..14_500))); // external voltage, mV
    io.insert(16, IoValue::U64(rng.random_range(0..500_000_000))); // odometer, m
    if variant.has_nx_group() {
        io.insert(11700, IoValue::U8(rng.random_range(0..=3)));
        io.insert(256, IoValue::Raw(b"WVWZZZ1KZAW123456".to_vec()));
    }
    AvlRecord {
        timestamp_ms,
        priority: 0,
        position,
        event_io_id: 0,
        io,
    }
}
