#[cfg(test)]
mod ingest_e2e_tests {
    use avl_ingest::avl::codec::CodecVariant;
    use avl_ingest::avl::frame::{
        self, AvlStreamCodec, DeviceIdentity, HANDSHAKE_ACCEPT, Inbound,
    };
    use avl_ingest::avl::packet::{AvlPacket, encode_unit};
    use avl_ingest::avl::record::{AvlRecord, GpsFix, IoElements, IoValue};
    use avl_ingest::avl::server::{self, ServerConfig};
    use avl_ingest::registry::RegistryTx;
    use avl_ingest::simulate::{self, SimulateOpts};
    use avl_ingest::tracer;
    use bytes::{Bytes, BytesMut};
    use futures::StreamExt;
    use std::net::SocketAddr;
    use std::sync::Once;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::codec::FramedRead;
    use tokio_util::io::StreamReader;

    const IMEI: &str = "863719065062185";

    static TRACING: Once = Once::new();

    fn init_tracing() {
        TRACING.call_once(|| {
            let _x = tracer::setup_simple_tracing();
        });
    }

    async fn start_gateway(registry: RegistryTx) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Err(e) = server::serve(listener, ServerConfig::default(), registry).await {
                eprintln!("gateway error: {e:?}");
            }
        });
        addr
    }

    fn identity(text: &str) -> DeviceIdentity {
        DeviceIdentity::parse(text.as_bytes()).unwrap()
    }

    fn handshake_bytes(text: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        frame::encode_handshake(&identity(text), &mut buf);
        buf
    }

    fn speed_packet(speed_kmh: u16) -> AvlPacket {
        let mut io = IoElements::new();
        io.insert(239, IoValue::U8(1));
        AvlPacket {
            variant: CodecVariant::Codec8,
            records: vec![AvlRecord {
                timestamp_ms: 1_717_427_853_000,
                priority: 1,
                position: GpsFix {
                    longitude: 254708740,
                    latitude: 546152330,
                    altitude: 112,
                    angle: 274,
                    satellites: 9,
                    speed_kmh,
                },
                event_io_id: 239,
                io,
            }],
        }
    }

    fn unit_bytes(packet: &AvlPacket) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_unit(packet, &mut buf).unwrap();
        buf
    }

    async fn handshake(socket: &mut TcpStream, imei: &str) {
        socket.write_all(&handshake_bytes(imei)).await.unwrap();
        let mut response = [0u8; 1];
        socket.read_exact(&mut response).await.unwrap();
        assert_eq!(response[0], HANDSHAKE_ACCEPT);
    }

    async fn read_ack(socket: &mut TcpStream) -> u32 {
        let mut ack = [0u8; 4];
        socket.read_exact(&mut ack).await.unwrap();
        u32::from_be_bytes(ack)
    }

    #[tokio::test]
    async fn handshake_is_answered_with_a_single_accept_byte() {
        init_tracing();
        let addr = start_gateway(RegistryTx::new(true)).await;

        let mut socket = TcpStream::connect(addr).await.unwrap();
        handshake(&mut socket, IMEI).await;
    }

    #[tokio::test]
    async fn one_record_unit_is_acknowledged_and_snapshotted() {
        init_tracing();
        let registry = RegistryTx::new(true);
        let addr = start_gateway(registry.clone()).await;

        let mut socket = TcpStream::connect(addr).await.unwrap();
        handshake(&mut socket, IMEI).await;

        socket
            .write_all(&unit_bytes(&speed_packet(120)))
            .await
            .unwrap();
        assert_eq!(read_ack(&mut socket).await, 1);

        let vehicle = registry.resolve(identity(IMEI)).await.unwrap().unwrap();
        let snapshot = registry.snapshot(vehicle).await.unwrap().unwrap();
        assert_eq!(snapshot.record_count, 1);
        assert_eq!(snapshot.latest.unwrap().position.speed_kmh, 120);
    }

    #[tokio::test]
    async fn a_unit_smeared_across_many_writes_decodes_once() {
        init_tracing();
        let registry = RegistryTx::new(true);
        let addr = start_gateway(registry.clone()).await;

        let mut socket = TcpStream::connect(addr).await.unwrap();
        handshake(&mut socket, IMEI).await;

        let unit = unit_bytes(&speed_packet(87));
        for chunk in unit.chunks(3) {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(read_ack(&mut socket).await, 1);

        let vehicle = registry.resolve(identity(IMEI)).await.unwrap().unwrap();
        let snapshot = registry.snapshot(vehicle).await.unwrap().unwrap();
        assert_eq!(snapshot.record_count, 1);
    }

    #[tokio::test]
    async fn fragmented_stream_decodes_like_a_contiguous_one() {
        // the same session bytes, as one buffer and as a stream of tiny
        // chunks, must produce identical frames
        let mut session = BytesMut::new();
        frame::encode_handshake(&identity(IMEI), &mut session);
        session.extend_from_slice(&unit_bytes(&speed_packet(55)));
        session.extend_from_slice(&unit_bytes(&speed_packet(56)));
        let session = session.freeze();

        async fn decode_chunked(session: &Bytes, chunk_len: usize) -> Vec<Inbound> {
            let chunks: Vec<Bytes> = session
                .chunks(chunk_len)
                .map(Bytes::copy_from_slice)
                .collect();
            let byte_stream = async_stream::stream! {
                for chunk in chunks {
                    yield Ok::<_, std::io::Error>(chunk);
                }
            };
            let reader = StreamReader::new(Box::pin(byte_stream));
            let mut framed = FramedRead::new(reader, AvlStreamCodec::new());
            let mut items = Vec::new();
            while let Some(item) = framed.next().await {
                items.push(item.unwrap());
            }
            items
        }

        let contiguous = decode_chunked(&session, session.len()).await;
        assert_eq!(contiguous.len(), 3); // identity + two packets
        for chunk_len in [1, 2, 3, 7, 16] {
            assert_eq!(decode_chunked(&session, chunk_len).await, contiguous);
        }
    }

    #[tokio::test]
    async fn concurrent_trackers_keep_independent_state() {
        init_tracing();
        let registry = RegistryTx::new(true);
        let addr = start_gateway(registry.clone()).await;

        let mut tasks = Vec::new();
        for (imei, speed) in [("863719065062185", 40), ("356307042441013", 90)] {
            let task = tokio::spawn(async move {
                let mut socket = TcpStream::connect(addr).await.unwrap();
                handshake(&mut socket, imei).await;
                socket
                    .write_all(&unit_bytes(&speed_packet(speed)))
                    .await
                    .unwrap();
                assert_eq!(read_ack(&mut socket).await, 1);
            });
            tasks.push(task);
        }
        for task in tasks {
            task.await.unwrap();
        }

        for (imei, speed) in [("863719065062185", 40u16), ("356307042441013", 90)] {
            let vehicle = registry.resolve(identity(imei)).await.unwrap().unwrap();
            let snapshot = registry.snapshot(vehicle).await.unwrap().unwrap();
            assert_eq!(snapshot.record_count, 1, "history of {imei}");
            assert_eq!(snapshot.latest.unwrap().position.speed_kmh, speed);
        }
    }

    #[tokio::test]
    async fn simulator_round_trips_against_a_live_gateway() -> anyhow::Result<()> {
        init_tracing();
        let registry = RegistryTx::new(true);
        let addr = start_gateway(registry.clone()).await;

        simulate::run(SimulateOpts {
            host: "127.0.0.1".into(),
            port: addr.port() as u32,
            identity: IMEI.into(),
            units: 3,
            records_per_unit: 2,
            extended: true,
            interval: Duration::ZERO,
        })
        .await?;

        let vehicle = registry
            .resolve(identity(IMEI))
            .await?
            .ok_or_else(|| anyhow::anyhow!("simulated device was not registered"))?;
        let snapshot = registry
            .snapshot(vehicle)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no snapshot for {vehicle}"))?;
        assert_eq!(snapshot.record_count, 6);
        let latest = snapshot.latest.expect("six records were appended");
        assert!(latest.io.get(11700).is_some());
        Ok(())
    }
}
