//! Optional consumers of the decoded-record stream. They subscribe to the
//! registry's broadcast channel and never sit on the decode path: a slow
//! or lagging subscriber loses events, not the gateway.

use crate::registry::{RecordEvent, RegistryTx};
use futures::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{debug, warn};

/// Log a warning for every record whose reported speed exceeds the
/// threshold. Runs until the registry shuts down.
pub fn spawn_speed_monitor(
    registry: &RegistryTx,
    threshold_kmh: u16,
) -> tokio::task::JoinHandle<()> {
    let mut stream = BroadcastStream::new(registry.subscribe());
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                Ok(RecordEvent { vehicle, record }) => {
                    if record.position.speed_kmh > threshold_kmh {
                        warn!(
                            %vehicle,
                            speed_kmh = record.position.speed_kmh,
                            threshold_kmh,
                            lat = record.position.latitude_deg(),
                            lon = record.position.longitude_deg(),
                            "speed threshold exceeded"
                        );
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!(skipped, "speed monitor lagged behind the record stream");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avl::frame::DeviceIdentity;
    use crate::avl::record::{AvlRecord, GpsFix, IoElements};

    #[tokio::test]
    async fn monitor_drains_events_and_stops_with_the_registry() {
        let registry = RegistryTx::new(true);
        let monitor = spawn_speed_monitor(&registry, 90);

        let identity = DeviceIdentity::parse(b"863719065062185").unwrap();
        let vehicle = registry.resolve(identity).await.unwrap().unwrap();
        registry
            .append(
                vehicle,
                vec![AvlRecord {
                    timestamp_ms: 0,
                    priority: 0,
                    position: GpsFix {
                        speed_kmh: 132,
                        ..GpsFix::NO_FIX
                    },
                    event_io_id: 0,
                    io: IoElements::new(),
                }],
            )
            .unwrap();

        // dropping the last handle closes the actor, which closes the
        // broadcast channel, which ends the monitor
        drop(registry);
        monitor.await.unwrap();
    }
}
