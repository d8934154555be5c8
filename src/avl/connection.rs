use super::frame::{AvlStreamCodec, DeviceIdentity, Inbound, Outbound};
use super::server::ServerConfig;
use crate::registry::{RegistryTx, VehicleRef};
use crate::Result;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingIdentity,
    Authenticated,
    Closed,
}

/// Per-connection protocol state. The byte buffer itself lives inside the
/// `Framed` transport; this tracks who is on the other end.
#[derive(Debug)]
pub struct ConnectionSession {
    peer: SocketAddr,
    state: SessionState,
    identity: Option<DeviceIdentity>,
    vehicle: Option<VehicleRef>,
}

impl ConnectionSession {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: SessionState::AwaitingIdentity,
            identity: None,
            vehicle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Bind the connection to a device. `vehicle` stays `None` when the
    /// registry declined to resolve the identity but the handshake was
    /// accepted anyway; records then decode but are not persisted.
    fn authenticate(&mut self, identity: DeviceIdentity, vehicle: Option<VehicleRef>) {
        self.identity = Some(identity);
        self.vehicle = vehicle;
        self.state = SessionState::Authenticated;
    }

    fn vehicle(&self) -> Option<VehicleRef> {
        self.vehicle
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

/// Drive one tracker connection to completion: handshake, then one
/// decode-persist-acknowledge round per data unit, strictly in arrival
/// order. Returns when the peer closes, errors, or goes idle past the
/// configured timeout; any partially buffered unit dies with the framing
/// layer.
pub async fn handle_connection<S>(
    socket: S,
    peer: SocketAddr,
    registry: RegistryTx,
    cfg: Arc<ServerConfig>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!(%peer, "tracker connected");
    let mut framed = Framed::new(socket, AvlStreamCodec::new());
    let mut session = ConnectionSession::new(peer);

    loop {
        let next = match timeout(cfg.idle_timeout, framed.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!(%peer, "idle timeout, closing connection");
                break;
            }
        };
        let item = match next {
            None => break,
            Some(Err(err)) => {
                session.close();
                warn!(%peer, %err, "closing connection");
                return Err(err);
            }
            Some(Ok(item)) => item,
        };

        match item {
            Inbound::Identity(identity) => {
                match registry.resolve(identity.clone()).await? {
                    Some(vehicle) => {
                        info!(%peer, device = %identity, %vehicle, "device authenticated");
                        session.authenticate(identity, Some(vehicle));
                        framed.send(Outbound::HandshakeAccept).await?;
                    }
                    None if cfg.strict_handshake => {
                        warn!(%peer, device = %identity, "unknown device rejected");
                        framed.send(Outbound::HandshakeReject).await?;
                        break;
                    }
                    None => {
                        // accept-first: what an unknown device means is the
                        // registry's call, not the protocol layer's
                        info!(%peer, device = %identity, "unresolved device accepted");
                        session.authenticate(identity, None);
                        framed.send(Outbound::HandshakeAccept).await?;
                    }
                }
            }
            Inbound::Packet(packet) => {
                let count = packet.records.len() as u32;
                match session.vehicle() {
                    Some(vehicle) => {
                        debug!(%peer, %vehicle, count, "unit decoded");
                        registry.append(vehicle, packet.records)?;
                    }
                    None => {
                        debug!(%peer, count, "records from unregistered device dropped");
                    }
                }
                framed.send(Outbound::Ack(count)).await?;
            }
            Inbound::Rejected { claimed_records } => {
                warn!(%peer, claimed_records, "acknowledging checksum-rejected unit");
                framed.send(Outbound::Ack(claimed_records)).await?;
            }
        }
    }

    session.close();
    info!(%peer, "tracker disconnected");
    Ok(())
}
