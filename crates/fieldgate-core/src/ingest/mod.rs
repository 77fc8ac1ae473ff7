// ── Chunk ingestion ──
//
// Admission of image announcements and chunk arrivals. Every transition
// runs inside the transfer's read-modify-write, so concurrent chunks for
// one transfer serialize on its entry and never lose a count.

pub(crate) mod machine;

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};

use crate::cadence::CadenceScheduler;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::model::{
    ChunkOutcome, ChunkReceipt, Device, DeviceId, EngineEvent, EntityId, ImageMetadata,
    ImageTransfer, ObservationWrite, SiteLineage, TransferAck, TransferState,
};
use crate::store::DataStore;

/// Device-facing ingestion service.
pub struct Ingestor {
    store: Arc<DataStore>,
    events: EventBus,
    /// Source of the next wake time handed back on acknowledgement.
    scheduler: CadenceScheduler,
}

impl Ingestor {
    pub(crate) fn new(store: Arc<DataStore>, events: EventBus, scheduler: CadenceScheduler) -> Self {
        Self {
            store,
            events,
            scheduler,
        }
    }

    /// Start tracking an image with no accompanying metadata.
    ///
    /// Equivalent to [`ingest_metadata`](Self::ingest_metadata) without a
    /// capture timestamp or sensor snapshot.
    pub fn create_transfer(
        &self,
        device: &DeviceId,
        image_name: &str,
        total_chunks: u32,
        now: DateTime<Utc>,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        self.ingest_metadata(
            ImageMetadata {
                device_id: device.clone(),
                image_name: image_name.to_owned(),
                total_chunks,
                captured_at: None,
                capture: None,
            },
            now,
        )
    }

    /// Handle an image announcement.
    ///
    /// Creates a `Pending` transfer tagged with the device's lineage, or
    /// returns the transfer already in flight for the same device and image.
    /// A repeated announcement may still change the chunk count while
    /// nothing has arrived; after that a different count is refused. A sensor snapshot on a new announcement is
    /// stored as a device-generated observation.
    pub fn ingest_metadata(
        &self,
        meta: ImageMetadata,
        now: DateTime<Utc>,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        let device = self
            .store
            .device(&meta.device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device: meta.device_id.clone(),
            })?;
        self.store.touch_device(&device.id, now);

        let key = (device.id.clone(), meta.image_name.clone());
        let lineage = device.lineage();
        let active = match self.store.active_transfers.entry(key) {
            Entry::Occupied(mut slot) => {
                let open = self
                    .store
                    .transfer(slot.get())
                    .filter(|t| !t.state.is_terminal());
                if let Some(active) = open {
                    active
                } else {
                    let created = self.insert_transfer(&meta, &lineage, now)?;
                    slot.insert(created.id.clone());
                    drop(slot);
                    return self.announced(created, meta, now);
                }
            }
            Entry::Vacant(slot) => {
                let created = self.insert_transfer(&meta, &lineage, now)?;
                slot.insert(created.id.clone());
                return self.announced(created, meta, now);
            }
        };

        if active.total_chunks == meta.total_chunks {
            debug!(device = %active.device_id, image = %active.image_name, "repeated announcement");
            return Ok(active);
        }
        let resized = self
            .store
            .transfers
            .update(&active.id, |t| machine::resize(t, meta.total_chunks).map(|next| (next, ())));
        match resized {
            Some(Ok((transfer, ()))) => {
                info!(
                    transfer = %transfer.id,
                    total = transfer.total_chunks,
                    "announced chunk count changed"
                );
                Ok(transfer)
            }
            Some(Err(e)) => {
                warn!(transfer = %active.id, error = %e, "chunk count change refused");
                Err(e)
            }
            None => Ok(active),
        }
    }

    /// Record one chunk arrival.
    ///
    /// `payload` is buffered when given; once every index has arrived the
    /// buffered payloads are assembled in index order and published.
    pub fn accept_chunk(
        &self,
        transfer_id: &EntityId,
        index: u32,
        payload: Option<Bytes>,
        now: DateTime<Utc>,
    ) -> Result<ChunkReceipt, CoreError> {
        if let Some(bytes) = payload {
            self.buffer_payload(transfer_id, index, bytes);
        }

        let committed = self
            .store
            .transfers
            .update(transfer_id, |t| machine::accept_chunk(t, index, now))
            .ok_or_else(|| CoreError::TransferNotFound {
                transfer_id: transfer_id.clone(),
            })?;
        let (transfer, outcome) = match committed {
            Ok(done) => done,
            Err(e) => {
                if e.is_benign() {
                    // Late chunk: whatever was just buffered belongs to nobody.
                    self.store.chunk_buffers.remove(transfer_id);
                    debug!(transfer = %transfer_id, index, "chunk for finished transfer ignored");
                }
                return Err(e);
            }
        };

        self.store.touch_device(&transfer.device_id, now);
        debug!(
            transfer = %transfer.id,
            device = %transfer.device_id,
            index,
            received = transfer.received_chunks(),
            total = transfer.total_chunks,
            ?outcome,
            "chunk accepted"
        );
        if outcome == ChunkOutcome::Completed {
            self.finish(&transfer);
        }
        Ok(ChunkReceipt { outcome, transfer })
    }

    /// [`accept_chunk`](Self::accept_chunk) addressed by device and image
    /// name instead of transfer id.
    pub fn accept_chunk_for(
        &self,
        device: &DeviceId,
        image_name: &str,
        index: u32,
        payload: Option<Bytes>,
        now: DateTime<Utc>,
    ) -> Result<ChunkReceipt, CoreError> {
        let transfer = self.open_or_latest(device, image_name)?;
        if transfer.state.is_terminal() {
            return Err(CoreError::AlreadyTerminal {
                transfer_id: transfer.id.clone(),
                state: transfer.state,
            });
        }
        self.accept_chunk(&transfer.id, index, payload, now)
    }

    /// Handle a device status message: refresh liveness and the count of
    /// images the device still holds locally.
    pub fn record_heartbeat(
        &self,
        device: &DeviceId,
        pending_images: u32,
        now: DateTime<Utc>,
    ) -> Result<Arc<Device>, CoreError> {
        let updated = self.store.record_heartbeat(device, pending_images, now)?;
        debug!(%device, pending_images, "heartbeat");
        self.events.emit(EngineEvent::DeviceHeartbeat {
            device: updated.id.clone(),
            pending_images,
            at: now,
        });
        Ok(updated)
    }

    /// Indices not yet received, ascending.
    pub fn missing_chunks(&self, transfer_id: &EntityId) -> Result<Vec<u32>, CoreError> {
        self.store
            .transfer(transfer_id)
            .map(|t| t.missing_chunks())
            .ok_or_else(|| CoreError::TransferNotFound {
                transfer_id: transfer_id.clone(),
            })
    }

    /// Decide the reply to a device that has finished a transmission.
    ///
    /// An open transfer answers with the indices still missing, for the
    /// device to resend. A complete one answers `ACK_OK` with the next time
    /// the device's site is due a snapshot, or no wake time when the site
    /// has no cadence. A failed transfer cannot be resumed and yields
    /// [`CoreError::AlreadyTerminal`].
    pub fn acknowledge(
        &self,
        transfer_id: &EntityId,
        now: DateTime<Utc>,
    ) -> Result<TransferAck, CoreError> {
        let transfer = self
            .store
            .transfer(transfer_id)
            .ok_or_else(|| CoreError::TransferNotFound {
                transfer_id: transfer_id.clone(),
            })?;
        self.ack_for(&transfer, now)
    }

    /// [`acknowledge`](Self::acknowledge) addressed by device and image
    /// name. Resolves to the open transfer, else the most recent one.
    pub fn acknowledge_for(
        &self,
        device: &DeviceId,
        image_name: &str,
        now: DateTime<Utc>,
    ) -> Result<TransferAck, CoreError> {
        let transfer = self.open_or_latest(device, image_name)?;
        self.ack_for(&transfer, now)
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn ack_for(&self, transfer: &ImageTransfer, now: DateTime<Utc>) -> Result<TransferAck, CoreError> {
        match transfer.state {
            TransferState::Pending | TransferState::Receiving => {
                let missing = transfer.missing_chunks();
                debug!(transfer = %transfer.id, missing = missing.len(), "requesting resend");
                Ok(TransferAck::MissingChunks(missing))
            }
            TransferState::Complete => {
                let site_id = self
                    .store
                    .device(&transfer.device_id)
                    .map_or_else(|| transfer.lineage.site_id.clone(), |d| d.site_id().clone());
                let next_wake = self
                    .scheduler
                    .next_due(&site_id, now)
                    .unwrap_or_else(|e| {
                        warn!(transfer = %transfer.id, site = %site_id, error = %e, "no wake time");
                        None
                    });
                debug!(transfer = %transfer.id, ?next_wake, "transfer acknowledged");
                Ok(TransferAck::Ok { next_wake })
            }
            TransferState::Failed => Err(CoreError::AlreadyTerminal {
                transfer_id: transfer.id.clone(),
                state: transfer.state,
            }),
        }
    }

    /// The in-flight transfer for `device` + `image_name`, or failing that
    /// the most recently created one in any state.
    fn open_or_latest(
        &self,
        device: &DeviceId,
        image_name: &str,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        if let Some(active) = self.store.active_transfer(device, image_name) {
            return Ok(active);
        }
        self.store
            .transfers
            .filter(|t| &t.device_id == device && t.image_name == image_name)
            .into_iter()
            .max_by_key(|t| t.created_at)
            .ok_or_else(|| CoreError::ValidationFailed {
                message: format!("no transfer announced for {device} / {image_name}"),
            })
    }


    fn insert_transfer(
        &self,
        meta: &ImageMetadata,
        lineage: &SiteLineage,
        now: DateTime<Utc>,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        let transfer = machine::new_transfer(
            meta.device_id.clone(),
            meta.image_name.clone(),
            meta.total_chunks,
            lineage.clone(),
            meta.captured_at,
            now,
        )?;
        Ok(self.store.transfers.put(transfer.id.clone(), transfer))
    }

    /// Bookkeeping after a new transfer is registered as active.
    fn announced(
        &self,
        transfer: Arc<ImageTransfer>,
        meta: ImageMetadata,
        now: DateTime<Utc>,
    ) -> Result<Arc<ImageTransfer>, CoreError> {
        info!(
            transfer = %transfer.id,
            device = %transfer.device_id,
            image = %transfer.image_name,
            total = transfer.total_chunks,
            "transfer started"
        );
        self.events.emit(EngineEvent::TransferStarted {
            transfer_id: transfer.id.clone(),
            device: transfer.device_id.clone(),
            image: transfer.image_name.clone(),
            total_chunks: transfer.total_chunks,
        });

        if let Some(capture) = meta.capture {
            self.store.record_observation(ObservationWrite {
                device_id: meta.device_id,
                recorded_at: meta.captured_at.unwrap_or(now),
                is_device_generated: true,
                device_capture: Some(capture),
            })?;
        }
        Ok(transfer)
    }

    fn buffer_payload(&self, transfer_id: &EntityId, index: u32, bytes: Bytes) {
        let open = self
            .store
            .transfer(transfer_id)
            .is_some_and(|t| !t.state.is_terminal() && index < t.total_chunks);
        if open {
            self.store
                .chunk_buffers
                .entry(transfer_id.clone())
                .or_default()
                .entry(index)
                .or_insert(bytes);
        }
    }

    /// Release the active slot and publish the assembled image.
    fn finish(&self, transfer: &ImageTransfer) {
        let key = (transfer.device_id.clone(), transfer.image_name.clone());
        self.store
            .active_transfers
            .remove_if(&key, |_, id| id == &transfer.id);

        info!(
            transfer = %transfer.id,
            device = %transfer.device_id,
            image = %transfer.image_name,
            chunks = transfer.total_chunks,
            "transfer complete"
        );
        self.events.emit(EngineEvent::TransferCompleted {
            transfer_id: transfer.id.clone(),
            device: transfer.device_id.clone(),
            image: transfer.image_name.clone(),
        });

        let buffered = self
            .store
            .chunk_buffers
            .remove(&transfer.id)
            .map(|(_, chunks)| chunks);
        match buffered.and_then(|chunks| assemble(&chunks, transfer.total_chunks)) {
            Some(bytes) => self.events.emit(EngineEvent::ImageAssembled {
                transfer_id: transfer.id.clone(),
                device: transfer.device_id.clone(),
                image: transfer.image_name.clone(),
                size: bytes.len(),
                bytes,
            }),
            None => debug!(transfer = %transfer.id, "completed without a full payload"),
        }
    }
}

/// Concatenate payloads in index order. `None` unless every index is present.
fn assemble(chunks: &BTreeMap<u32, Bytes>, total_chunks: u32) -> Option<Bytes> {
    if usize::try_from(total_chunks).ok()? != chunks.len() {
        return None;
    }
    let size = chunks.values().map(Bytes::len).sum();
    let mut out = BytesMut::with_capacity(size);
    for chunk in chunks.values() {
        out.extend_from_slice(chunk);
    }
    Some(out.freeze())
}
