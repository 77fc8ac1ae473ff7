// ── Engine ──
//
// Owns the store and the three services, and the lifecycle of the
// periodic executor: an independently scheduled stale sweep and cadence
// tick, both cancelled and joined on shutdown.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cadence::CadenceScheduler;
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::ingest::Ingestor;
use crate::model::{
    ChunkReceipt, Company, Device, DeviceId, DeviceWrite, EngineEvent, EntityId, ImageMetadata,
    ImageTransfer, ManualSweepResult, Observation, ObservationWrite, Program, Site,
    SiteCadenceConfig, SiteWrite, SweepReport, TickReport, TransferAck,
};
use crate::reclaim::{DEFAULT_MANUAL_AGE_HOURS, Reclaimer};
use crate::store::DataStore;
use crate::stream::EntityStream;

// ── EngineState ──────────────────────────────────────────────────

/// Lifecycle of the periodic executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    Stopping,
}

// ── Engine ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<EngineInner>`. Device-facing operations are
/// synchronous and usable whether or not the executor is running; the
/// executor only adds the two periodic tasks.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    store: Arc<DataStore>,
    events: EventBus,
    ingestor: Ingestor,
    reclaimer: Reclaimer,
    scheduler: CadenceScheduler,
    state: watch::Sender<EngineState>,
    tasks: Mutex<Tasks>,
}

struct Tasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Create an engine with an empty store. Does NOT start the executor;
    /// call [`start()`](Self::start) for that.
    pub fn new(config: EngineConfig) -> Self {
        let store = Arc::new(DataStore::new());
        let events = EventBus::new(config.event_channel_size);
        let (state, _) = watch::channel(EngineState::Stopped);
        let scheduler = CadenceScheduler::new(
            Arc::clone(&store),
            events.clone(),
            config.default_timezone,
        );

        Self {
            inner: Arc::new(EngineInner {
                ingestor: Ingestor::new(Arc::clone(&store), events.clone(), scheduler.clone()),
                reclaimer: Reclaimer::new(
                    Arc::clone(&store),
                    events.clone(),
                    config.stale_threshold,
                ),
                scheduler,
                config,
                store,
                events,
                state,
                tasks: Mutex::new(Tasks {
                    cancel: CancellationToken::new(),
                    handles: Vec::new(),
                }),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<DataStore> {
        &self.inner.store
    }

    /// Ingestion service, for callers that supply their own clock.
    pub fn ingestor(&self) -> &Ingestor {
        &self.inner.ingestor
    }

    /// Reclamation service, for callers that supply their own clock.
    pub fn reclaimer(&self) -> &Reclaimer {
        &self.inner.reclaimer
    }

    /// Cadence scheduler, for callers that supply their own clock.
    pub fn scheduler(&self) -> &CadenceScheduler {
        &self.inner.scheduler
    }

    // ── Executor lifecycle ───────────────────────────────────────

    /// Spawn the periodic sweep and cadence tasks. Calling it on a running
    /// engine does nothing. A zero period disables that task.
    pub async fn start(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if !tasks.handles.is_empty() {
            debug!("engine already running");
            return;
        }
        if tasks.cancel.is_cancelled() {
            tasks.cancel = CancellationToken::new();
        }

        let config = &self.inner.config;
        if !config.sweep_interval.is_zero() {
            let engine = self.clone();
            let cancel = tasks.cancel.clone();
            tasks.handles.push(tokio::spawn(sweep_task(
                engine,
                config.sweep_interval,
                cancel,
            )));
        }
        if !config.cadence_tick.is_zero() {
            let engine = self.clone();
            let cancel = tasks.cancel.clone();
            tasks.handles.push(tokio::spawn(cadence_task(
                engine,
                config.cadence_tick,
                cancel,
            )));
        }

        let _ = self.inner.state.send(EngineState::Running);
        info!(
            sweep_interval = ?config.sweep_interval,
            cadence_tick = ?config.cadence_tick,
            "engine started"
        );
    }

    /// Cancel the periodic tasks and wait for them to finish.
    ///
    /// A task stopped mid-batch leaves every entity it touched in a valid
    /// state; the next run picks up whatever remains.
    pub async fn shutdown(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        if tasks.handles.is_empty() {
            let _ = self.inner.state.send(EngineState::Stopped);
            return;
        }
        let _ = self.inner.state.send(EngineState::Stopping);
        tasks.cancel.cancel();
        for handle in tasks.handles.drain(..) {
            let _ = handle.await;
        }
        let _ = self.inner.state.send(EngineState::Stopped);
        info!("engine stopped");
    }

    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.inner.state.subscribe()
    }

    /// Subscribe to the event broadcast stream.
    pub fn events(&self) -> broadcast::Receiver<Arc<EngineEvent>> {
        self.inner.events.subscribe()
    }

    // ── Tenant hierarchy ─────────────────────────────────────────

    pub fn add_company(&self, company: Company) -> Arc<Company> {
        self.inner.store.add_company(company)
    }

    pub fn add_program(&self, program: Program) -> Result<Arc<Program>, CoreError> {
        self.inner.store.add_program(program)
    }

    pub fn add_site(&self, site: SiteWrite) -> Result<Arc<Site>, CoreError> {
        self.inner.store.add_site(site)
    }

    /// Create or update a device through the lineage gate.
    pub fn write_device(&self, write: DeviceWrite) -> Result<Arc<Device>, CoreError> {
        self.inner.store.write_device(write)
    }

    pub fn set_site_cadence(
        &self,
        site_id: &EntityId,
        config: Option<SiteCadenceConfig>,
    ) -> Result<Arc<Site>, CoreError> {
        self.inner.store.set_site_cadence(site_id, config)
    }

    // ── Device-facing operations (wall clock) ────────────────────

    pub fn ingest_metadata(&self, meta: ImageMetadata) -> Result<Arc<ImageTransfer>, CoreError> {
        self.inner.ingestor.ingest_metadata(meta, Utc::now())
    }

    pub fn create_transfer(
        &self,
        device: &DeviceId,
        image_name: &str,
        total_chunks: u32,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        self.inner
            .ingestor
            .create_transfer(device, image_name, total_chunks, Utc::now())
    }

    pub fn accept_chunk(
        &self,
        transfer_id: &EntityId,
        index: u32,
        payload: Option<Bytes>,
    ) -> Result<ChunkReceipt, CoreError> {
        self.inner
            .ingestor
            .accept_chunk(transfer_id, index, payload, Utc::now())
    }

    pub fn missing_chunks(&self, transfer_id: &EntityId) -> Result<Vec<u32>, CoreError> {
        self.inner.ingestor.missing_chunks(transfer_id)
    }

    /// Reply owed to the device for `transfer_id`: a resend list or `ACK_OK`.
    pub fn acknowledge(&self, transfer_id: &EntityId) -> Result<TransferAck, CoreError> {
        self.inner.ingestor.acknowledge(transfer_id, Utc::now())
    }

    pub fn record_heartbeat(
        &self,
        device: &DeviceId,
        pending_images: u32,
    ) -> Result<Arc<Device>, CoreError> {
        self.inner
            .ingestor
            .record_heartbeat(device, pending_images, Utc::now())
    }

    pub fn record_observation(&self, write: ObservationWrite) -> Result<Arc<Observation>, CoreError> {
        self.inner.store.record_observation(write)
    }

    pub fn observations_matching(&self, key: &str, value: &Value) -> Vec<Arc<Observation>> {
        self.inner.store.observations_matching(key, value)
    }

    // ── Reclamation and scheduling (wall clock) ──────────────────

    /// Run the automatic stale sweep once, outside the executor.
    pub fn sweep_stale(&self) -> SweepReport {
        self.inner.reclaimer.sweep_stale(Utc::now())
    }

    /// Operator sweep for one device. `age_hours` defaults to 1.
    pub fn clear_stale(&self, device: &DeviceId, age_hours: Option<u32>) -> ManualSweepResult {
        self.inner.reclaimer.clear_stale_for_device(
            device,
            age_hours.unwrap_or(DEFAULT_MANUAL_AGE_HOURS),
            Utc::now(),
        )
    }

    pub fn is_due(&self, site_id: &EntityId) -> Result<bool, CoreError> {
        self.inner.scheduler.is_due(site_id, Utc::now())
    }

    /// Run one cadence tick, outside the executor.
    pub fn run_tick(&self) -> TickReport {
        self.inner.scheduler.run_tick(Utc::now())
    }

    // ── Streams ──────────────────────────────────────────────────

    pub fn transfers(&self) -> EntityStream<ImageTransfer> {
        self.inner.store.subscribe_transfers()
    }

    pub fn devices(&self) -> EntityStream<Device> {
        self.inner.store.subscribe_devices()
    }

    pub fn sites(&self) -> EntityStream<Site> {
        self.inner.store.subscribe_sites()
    }

    pub fn observations(&self) -> EntityStream<Observation> {
        self.inner.store.subscribe_observations()
    }
}

// ── Background tasks ─────────────────────────────────────────────

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

/// Periodically fail stale transfers.
async fn sweep_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                engine.inner.reclaimer.sweep_stale(Utc::now());
            }
        }
    }
    debug!("sweep task stopped");
}

/// Periodically issue snapshot commands for due sites.
async fn cadence_task(engine: Engine, period: Duration, cancel: CancellationToken) {
    let mut interval = ticker(period);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let report = engine.inner.scheduler.run_tick(Utc::now());
                debug!(issued = report.issued.len(), failed = report.failed.len(), "cadence tick");
            }
        }
    }
    debug!("cadence task stopped");
}
