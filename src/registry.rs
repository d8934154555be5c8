//! The persistence/registry collaborator behind the decoder: resolves a
//! device identity to a tracked vehicle and appends decoded records. The
//! decoder depends only on this boundary, never on how a real deployment
//! stores vehicles. Implemented as a single actor task owning the store,
//! which also serializes all updates per device.

use crate::avl::frame::DeviceIdentity;
use crate::avl::record::AvlRecord;
use crate::{Error, Result};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

/// Latest-state snapshots keep this many trailing records per vehicle.
const HISTORY_LIMIT: usize = 10_000;
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize)]
#[display("vehicle-{_0}")]
pub struct VehicleRef(u64);

/// One entry of the `--devices` seed file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceSeed {
    pub identity: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VehicleSnapshot {
    pub vehicle: VehicleRef,
    pub identity: DeviceIdentity,
    pub label: Option<String>,
    pub record_count: u64,
    pub latest: Option<AvlRecord>,
}

/// Fan-out item for subscribers off the decode path (alerting and the
/// like).
#[derive(Debug, Clone)]
pub struct RecordEvent {
    pub vehicle: VehicleRef,
    pub record: AvlRecord,
}

enum Command {
    Resolve {
        identity: DeviceIdentity,
        reply: oneshot::Sender<Option<VehicleRef>>,
    },
    Append {
        vehicle: VehicleRef,
        records: Vec<AvlRecord>,
    },
    Snapshot {
        vehicle: VehicleRef,
        reply: oneshot::Sender<Option<VehicleSnapshot>>,
    },
}

#[derive(Debug, Clone)]
pub struct RegistryTx {
    sender: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<RecordEvent>,
}

impl RegistryTx {
    pub fn new(auto_register: bool) -> Self {
        Self::spawn(auto_register, Vec::new())
    }

    /// Start a registry pre-populated with known devices.
    pub fn with_seeds(auto_register: bool, seeds: Vec<DeviceSeed>) -> Result<Self> {
        let mut parsed = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let identity = DeviceIdentity::parse(seed.identity.as_bytes())?;
            parsed.push((identity, seed.label));
        }
        Ok(Self::spawn(auto_register, parsed))
    }

    fn spawn(auto_register: bool, seeds: Vec<(DeviceIdentity, Option<String>)>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let mut store = Store {
            auto_register,
            next_ref: 1,
            devices: HashMap::new(),
            vehicles: HashMap::new(),
            events: events.clone(),
        };
        for (identity, label) in seeds {
            store.register(identity, label);
        }
        tokio::spawn(run_registry(store, receiver));
        RegistryTx { sender, events }
    }

    pub async fn resolve(&self, identity: DeviceIdentity) -> Result<Option<VehicleRef>> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Command::Resolve { identity, reply })
            .map_err(|_| Error::General("registry closed".into()))?;
        receiver
            .await
            .map_err(|_| Error::General("registry dropped a resolve reply".into()))
    }

    /// Hand a unit's records over for persistence. Never blocks the
    /// connection: the actor drains its queue at its own pace.
    pub fn append(&self, vehicle: VehicleRef, records: Vec<AvlRecord>) -> Result<()> {
        self.sender
            .send(Command::Append { vehicle, records })
            .map_err(|_| Error::General("registry closed".into()))
    }

    pub async fn snapshot(&self, vehicle: VehicleRef) -> Result<Option<VehicleSnapshot>> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Command::Snapshot { vehicle, reply })
            .map_err(|_| Error::General("registry closed".into()))?;
        receiver
            .await
            .map_err(|_| Error::General("registry dropped a snapshot reply".into()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordEvent> {
        self.events.subscribe()
    }
}

pub fn load_seeds(path: &Path) -> Result<Vec<DeviceSeed>> {
    let bytes = std::fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

struct VehicleState {
    identity: DeviceIdentity,
    label: Option<String>,
    history: VecDeque<AvlRecord>,
    total_records: u64,
}

struct Store {
    auto_register: bool,
    next_ref: u64,
    devices: HashMap<DeviceIdentity, VehicleRef>,
    vehicles: HashMap<VehicleRef, VehicleState>,
    events: broadcast::Sender<RecordEvent>,
}

impl Store {
    fn register(&mut self, identity: DeviceIdentity, label: Option<String>) -> VehicleRef {
        if let Some(&vehicle) = self.devices.get(&identity) {
            return vehicle;
        }
        let vehicle = VehicleRef(self.next_ref);
        self.next_ref += 1;
        self.devices.insert(identity.clone(), vehicle);
        self.vehicles.insert(
            vehicle,
            VehicleState {
                identity: identity.clone(),
                label,
                history: VecDeque::new(),
                total_records: 0,
            },
        );
        info!(%vehicle, device = %identity, "device registered");
        vehicle
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Resolve { identity, reply } => {
                let vehicle = match self.devices.get(&identity) {
                    Some(&vehicle) => Some(vehicle),
                    None if self.auto_register => Some(self.register(identity, None)),
                    None => {
                        debug!(device = %identity, "identity not in registry");
                        None
                    }
                };
                let _ = reply.send(vehicle);
            }
            Command::Append { vehicle, records } => {
                let Some(state) = self.vehicles.get_mut(&vehicle) else {
                    debug!(%vehicle, "append for unknown vehicle ignored");
                    return;
                };
                for record in records {
                    state.total_records += 1;
                    if state.history.len() == HISTORY_LIMIT {
                        state.history.pop_front();
                    }
                    state.history.push_back(record.clone());
                    let _ = self.events.send(RecordEvent { vehicle, record });
                }
            }
            Command::Snapshot { vehicle, reply } => {
                let snapshot = self.vehicles.get(&vehicle).map(|state| VehicleSnapshot {
                    vehicle,
                    identity: state.identity.clone(),
                    label: state.label.clone(),
                    record_count: state.total_records,
                    latest: state.history.back().cloned(),
                });
                let _ = reply.send(snapshot);
            }
        }
    }
}

async fn run_registry(mut store: Store, mut receiver: mpsc::UnboundedReceiver<Command>) {
    while let Some(cmd) = receiver.recv().await {
        store.handle(cmd);
    }
    debug!("registry task stopped");
}
