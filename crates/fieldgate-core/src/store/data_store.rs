// ── Central reactive data store ──
//
// Thread-safe storage for every entity the engine tracks. Each entity is
// an independent unit of mutation; there is no global lock. Mutations are
// broadcast to subscribers via `watch` channels.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::collection::EntityCollection;
use crate::model::{
    Company, Device, DeviceId, EntityId, ImageTransfer, Observation, Program, Site, TransferState,
};
use crate::stream::EntityStream;

/// Central store for the tenant hierarchy, transfers and observations.
///
/// All reads are lock-free snapshots or single-shard lookups; writes take a
/// per-shard lock within `DashMap` for the duration of one entity update.
pub struct DataStore {
    pub(crate) companies: EntityCollection<EntityId, Company>,
    pub(crate) programs: EntityCollection<EntityId, Program>,
    pub(crate) sites: EntityCollection<EntityId, Site>,
    pub(crate) devices: EntityCollection<DeviceId, Device>,
    pub(crate) transfers: EntityCollection<EntityId, ImageTransfer>,
    pub(crate) observations: EntityCollection<EntityId, Observation>,

    /// (device, image name) → id of the transfer still in flight for it.
    pub(crate) active_transfers: DashMap<(DeviceId, String), EntityId>,

    /// Chunk payloads of in-flight transfers, by transfer id then index.
    pub(crate) chunk_buffers: DashMap<EntityId, BTreeMap<u32, Bytes>>,

    /// Last cadence boundary a snapshot was issued for, per site.
    pub(crate) snapshot_boundaries: DashMap<EntityId, DateTime<Utc>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            companies: EntityCollection::new(),
            programs: EntityCollection::new(),
            sites: EntityCollection::new(),
            devices: EntityCollection::new(),
            transfers: EntityCollection::new(),
            observations: EntityCollection::new(),
            active_transfers: DashMap::new(),
            chunk_buffers: DashMap::new(),
            snapshot_boundaries: DashMap::new(),
        }
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn companies_snapshot(&self) -> Arc<Vec<Arc<Company>>> {
        self.companies.snapshot()
    }

    pub fn programs_snapshot(&self) -> Arc<Vec<Arc<Program>>> {
        self.programs.snapshot()
    }

    pub fn sites_snapshot(&self) -> Arc<Vec<Arc<Site>>> {
        self.sites.snapshot()
    }

    pub fn devices_snapshot(&self) -> Arc<Vec<Arc<Device>>> {
        self.devices.snapshot()
    }

    pub fn transfers_snapshot(&self) -> Arc<Vec<Arc<ImageTransfer>>> {
        self.transfers.snapshot()
    }

    pub fn observations_snapshot(&self) -> Arc<Vec<Arc<Observation>>> {
        self.observations.snapshot()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn company(&self, id: &EntityId) -> Option<Arc<Company>> {
        self.companies.get(id)
    }

    pub fn program(&self, id: &EntityId) -> Option<Arc<Program>> {
        self.programs.get(id)
    }

    pub fn site(&self, id: &EntityId) -> Option<Arc<Site>> {
        self.sites.get(id)
    }

    pub fn device(&self, id: &DeviceId) -> Option<Arc<Device>> {
        self.devices.get(id)
    }

    pub fn transfer(&self, id: &EntityId) -> Option<Arc<ImageTransfer>> {
        self.transfers.get(id)
    }

    /// The in-flight transfer for `device` + `image_name`, if any.
    pub fn active_transfer(&self, device: &DeviceId, image_name: &str) -> Option<Arc<ImageTransfer>> {
        let id = self
            .active_transfers
            .get(&(device.clone(), image_name.to_owned()))
            .map(|r| r.value().clone())?;
        self.transfers.get(&id)
    }

    /// Transfers belonging to `device`, in any state.
    pub fn transfers_for_device(&self, device: &DeviceId) -> Vec<Arc<ImageTransfer>> {
        self.transfers.filter(|t| &t.device_id == device)
    }

    /// Transfers currently in `state`.
    pub fn transfers_in_state(&self, state: TransferState) -> Vec<Arc<ImageTransfer>> {
        self.transfers.filter(|t| t.state == state)
    }

    /// Devices currently pinned to `site_id`.
    pub fn devices_at_site(&self, site_id: &EntityId) -> Vec<Arc<Device>> {
        self.devices.filter(|d| d.site_id() == site_id)
    }

    /// Last cadence boundary a snapshot was issued for.
    pub fn last_snapshot_boundary(&self, site_id: &EntityId) -> Option<DateTime<Utc>> {
        self.snapshot_boundaries.get(site_id).map(|r| *r.value())
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn site_count(&self) -> usize {
        self.sites.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn transfer_count(&self) -> usize {
        self.transfers.len()
    }

    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Transfers that currently hold buffered chunk payloads.
    pub fn chunk_buffer_count(&self) -> usize {
        self.chunk_buffers.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_sites(&self) -> EntityStream<Site> {
        EntityStream::new(self.sites.subscribe())
    }

    pub fn subscribe_devices(&self) -> EntityStream<Device> {
        EntityStream::new(self.devices.subscribe())
    }

    pub fn subscribe_transfers(&self) -> EntityStream<ImageTransfer> {
        EntityStream::new(self.transfers.subscribe())
    }

    pub fn subscribe_observations(&self) -> EntityStream<Observation> {
        EntityStream::new(self.observations.subscribe())
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}
