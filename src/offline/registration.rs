// Worker registration: which worker is active, which one waits, who is controlled
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::offline::error::NetworkFetchError;
use crate::offline::network::{FetchRequest, Network};
use crate::offline::version::CacheVersion;
use crate::offline::worker::{ActivateReport, CacheWorker, FetchResponse, InstallReport};

/// A page (or proxy connection) whose requests may be intercepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

/// Message posted by a controlling client, e.g. `{"type":"SKIP_WAITING"}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
}

struct Slot {
    worker: Arc<CacheWorker>,
    state: WorkerState,
}

impl Slot {
    fn new(worker: Arc<CacheWorker>, state: WorkerState) -> Self {
        Self { worker, state }
    }

    fn status(&self) -> WorkerStatus {
        WorkerStatus {
            version: self.worker.version().to_string(),
            state: self.state,
        }
    }
}

#[derive(Default)]
struct RegistrationState {
    installing: Option<Slot>,
    waiting: Option<Slot>,
    active: Option<Slot>,
    /// Most recently replaced worker
    retired: Option<Slot>,
    /// Client -> version of the worker controlling it, if any
    clients: HashMap<ClientId, Option<CacheVersion>>,
}

impl RegistrationState {
    fn controlled_clients(&self) -> usize {
        self.clients.values().filter(|c| c.is_some()).count()
    }

    fn retire(&mut self, mut slot: Slot) {
        tracing::info!("Worker {} is now redundant", slot.worker.version());
        slot.state = WorkerState::Redundant;
        self.retired = Some(slot);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub version: String,
    pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationStatus {
    pub installing: Option<WorkerStatus>,
    pub waiting: Option<WorkerStatus>,
    pub active: Option<WorkerStatus>,
    pub redundant: Option<WorkerStatus>,
    pub clients: usize,
    pub controlled_clients: usize,
}

/// Lifecycle owner for cache workers.
///
/// A newly registered worker installs, then either activates right away
/// (skip-waiting, no active worker, or nobody controlled by the old one) or
/// waits until a `SKIP_WAITING` message arrives or the last controlled
/// client disconnects. Lifecycle transitions are serialized; fetches are not.
pub struct WorkerRegistration {
    network: Arc<dyn Network>,
    state: RwLock<RegistrationState>,
    lifecycle: Mutex<()>,
}

impl WorkerRegistration {
    /// `network` answers requests from clients no worker controls
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            state: RwLock::new(RegistrationState::default()),
            lifecycle: Mutex::new(()),
        }
    }

    /// Install a worker and activate it if nothing holds it back
    pub async fn register(&self, worker: CacheWorker) -> InstallReport {
        let _guard = self.lifecycle.lock().await;
        let worker = Arc::new(worker);

        self.state.write().await.installing = Some(Slot::new(worker.clone(), WorkerState::Installing));
        let report = worker.install().await;

        let activate_now = {
            let mut state = self.state.write().await;
            state.installing = None;
            if let Some(previous) = state
                .waiting
                .replace(Slot::new(worker.clone(), WorkerState::Installed))
            {
                state.retire(previous);
            }
            worker.config().skip_waiting || state.active.is_none() || state.controlled_clients() == 0
        };

        if activate_now {
            self.activate_waiting().await;
        } else {
            tracing::info!("Worker {} installed, waiting for clients to close", worker.version());
        }

        report
    }

    /// Handle a message from a controlling client
    pub async fn post_message(&self, message: ControlMessage) -> Option<ActivateReport> {
        match message {
            ControlMessage::SkipWaiting => {
                tracing::info!("Received SKIP_WAITING");
                let _guard = self.lifecycle.lock().await;
                self.activate_waiting().await
            }
        }
    }

    /// Promote the waiting worker. Caller holds the lifecycle lock.
    async fn activate_waiting(&self) -> Option<ActivateReport> {
        let worker = {
            let mut state = self.state.write().await;
            let slot = state.waiting.as_mut()?;
            slot.state = WorkerState::Activating;
            slot.worker.clone()
        };

        let report = worker.activate().await;

        let mut state = self.state.write().await;
        state.waiting = None;
        if let Some(previous) = state.active.take() {
            state.retire(previous);
        }

        let version = worker.version().clone();
        let claim = worker.config().claim_clients;
        let mut claimed = 0;
        for controller in state.clients.values_mut() {
            // clients of the old worker move over; uncontrolled ones only when claiming
            if controller.is_some() || claim {
                *controller = Some(version.clone());
                claimed += 1;
            }
        }
        tracing::info!("Worker {} controls {} client(s)", version, claimed);

        state.active = Some(Slot::new(worker, WorkerState::Activated));
        Some(report)
    }

    /// A new client is controlled by the active worker, if there is one
    pub async fn connect_client(&self) -> ClientId {
        let id = ClientId::new();
        let mut state = self.state.write().await;
        let controller = state.active.as_ref().map(|slot| slot.worker.version().clone());
        state.clients.insert(id, controller);
        id
    }

    /// Drop a client; the waiting worker activates once nobody is controlled
    pub async fn disconnect_client(&self, client: ClientId) {
        let promote = {
            let mut state = self.state.write().await;
            state.clients.remove(&client);
            state.waiting.is_some() && state.controlled_clients() == 0
        };

        if promote {
            let _guard = self.lifecycle.lock().await;
            self.activate_waiting().await;
        }
    }

    pub async fn controller_of(&self, client: ClientId) -> Option<CacheVersion> {
        self.state.read().await.clients.get(&client).cloned().flatten()
    }

    /// Route a request from a client through its controlling worker, or
    /// straight to the network when it is not controlled
    pub async fn fetch(
        &self,
        client: ClientId,
        request: FetchRequest,
    ) -> Result<FetchResponse, NetworkFetchError> {
        let worker = {
            let state = self.state.read().await;
            match (state.clients.get(&client), state.active.as_ref()) {
                (Some(Some(version)), Some(active)) if active.worker.version() == version => {
                    Some(active.worker.clone())
                }
                _ => None,
            }
        };

        match worker {
            Some(worker) => worker.handle_fetch(request).await,
            None => self
                .network
                .fetch(&request)
                .await
                .map(FetchResponse::from_network),
        }
    }

    pub async fn status(&self) -> RegistrationStatus {
        let state = self.state.read().await;
        RegistrationStatus {
            installing: state.installing.as_ref().map(Slot::status),
            waiting: state.waiting.as_ref().map(Slot::status),
            active: state.active.as_ref().map(Slot::status),
            redundant: state.retired.as_ref().map(Slot::status),
            clients: state.clients.len(),
            controlled_clients: state.controlled_clients(),
        }
    }
}
