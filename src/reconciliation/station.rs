use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::scan::{ScanClassifier, ScanInput};
use crate::{
    client::WmsApi,
    config::AppConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{KitMerge, MissionInventory, MissionKitMergeItem, PickProgress, PtlRecord},
    services::{KitMergeService, PtlService},
};

/// Where the station is in its scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationState {
    Idle,
    MaterialSelected,
    Updating,
}

/// Result of feeding one scanned line to the station.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    MaterialSelected { material_no: String, visible: usize },
    Updated(PtlRecord),
    NotFound { quantity: i64 },
    /// Negative or fractional quantity; reported as not-found, never sent.
    UnmatchableQuantity { scanned: String },
    UpdateFailed { record_id: Option<i64>, message: String },
    Discarded,
}

impl ScanOutcome {
    /// Whether the kiosk should schedule a delayed re-fetch after this scan.
    pub fn requests_refetch(&self) -> bool {
        matches!(
            self,
            ScanOutcome::MaterialSelected { .. }
                | ScanOutcome::Updated(_)
                | ScanOutcome::UpdateFailed { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct StationSettings {
    pub gate: String,
    pub material_code_min_len: usize,
    pub stale_after: Duration,
}

impl StationSettings {
    pub fn new(gate: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            material_code_min_len: 6,
            stale_after: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &AppConfig, gate: impl Into<String>) -> Self {
        Self {
            gate: gate.into(),
            material_code_min_len: config.material_code_min_len,
            stale_after: config.stale_after(),
        }
    }
}

/// One gate's pick-to-light reconciliation state.
///
/// Owns the in-memory snapshot of the active kit-merge and its PTL records.
/// The displayed list is always derived from that snapshot and the active
/// material filter; nothing here is persisted.
pub struct PtlStation {
    kit_merges: KitMergeService,
    ptl: PtlService,
    events: EventSender,
    classifier: ScanClassifier,
    gate: String,
    stale_after: Duration,
    state: StationState,
    kit_merge: Option<KitMerge>,
    mission: Option<MissionKitMergeItem>,
    records: Vec<PtlRecord>,
    material_filter: Option<String>,
    fetched_at: Option<Instant>,
}

impl PtlStation {
    pub fn new(api: Arc<dyn WmsApi>, events: EventSender, settings: StationSettings) -> Self {
        Self::with_services(
            KitMergeService::new(api.clone()),
            PtlService::new(api),
            events,
            settings,
        )
    }

    pub fn with_services(
        kit_merges: KitMergeService,
        ptl: PtlService,
        events: EventSender,
        settings: StationSettings,
    ) -> Self {
        Self {
            kit_merges,
            ptl,
            events,
            classifier: ScanClassifier::new(settings.material_code_min_len),
            gate: settings.gate,
            stale_after: settings.stale_after,
            state: StationState::Idle,
            kit_merge: None,
            mission: None,
            records: Vec::new(),
            material_filter: None,
            fetched_at: None,
        }
    }

    pub fn gate(&self) -> &str {
        &self.gate
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    pub fn kit_merge(&self) -> Option<&KitMerge> {
        self.kit_merge.as_ref()
    }

    pub fn mission(&self) -> Option<&MissionKitMergeItem> {
        self.mission.as_ref()
    }

    pub fn material_filter(&self) -> Option<&str> {
        self.material_filter.as_deref()
    }

    /// Every record of the last fetch, regardless of the filter.
    pub fn records(&self) -> &[PtlRecord] {
        &self.records
    }

    /// Records whose material matches the active filter. Empty while idle.
    pub fn visible_records(&self) -> Vec<&PtlRecord> {
        self.records.iter().filter(|r| self.is_visible(r)).collect()
    }

    pub fn progress(&self) -> PickProgress {
        PickProgress::from_records(self.visible_records())
    }

    /// Mission inventory rows for the material being worked on.
    pub fn current_material_inventory(&self) -> Vec<&MissionInventory> {
        match (&self.mission, &self.material_filter) {
            (Some(mission), Some(material)) => mission.inventory_for(material).collect(),
            _ => Vec::new(),
        }
    }

    /// True when nothing was fetched yet or the snapshot is older than the threshold.
    pub fn is_stale(&self, now: Instant) -> bool {
        match self.fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) >= self.stale_after,
            None => true,
        }
    }

    fn is_visible(&self, record: &PtlRecord) -> bool {
        self.material_filter
            .as_deref()
            .map_or(false, |material| record.material_no == material)
    }

    /// Drops the snapshot and filter; the display goes blank.
    pub fn clear(&mut self) {
        self.state = StationState::Idle;
        self.kit_merge = None;
        self.mission = None;
        self.records.clear();
        self.material_filter = None;
        self.fetched_at = None;
    }

    /// Loads the in-progress batch for the gate. A different batch than the
    /// one on display drops the old records and the material filter; no batch
    /// idles the station.
    #[instrument(skip(self), fields(gate = %self.gate))]
    pub async fn load_active_kit_merge(&mut self) -> Result<Option<KitMerge>, ServiceError> {
        let active = self.kit_merges.load_active_kit_merge(&self.gate).await?;

        match active {
            Some(merge) => {
                let changed = self.kit_merge.as_ref().map(|m| m.id) != Some(merge.id);
                if changed {
                    // the previous batch's slots must never be shown or patched under this one
                    self.records.clear();
                    self.fetched_at = None;
                    self.material_filter = None;
                    self.mission = None;
                    self.state = StationState::Idle;
                    self.events
                        .notify(Event::KitMergeLoaded {
                            kit_merge_id: merge.id,
                            kits: merge.kit_no.clone(),
                        })
                        .await;
                }
                self.kit_merge = Some(merge.clone());
                Ok(Some(merge))
            }
            None => {
                if self.kit_merge.is_some() || self.fetched_at.is_none() {
                    self.events
                        .notify(Event::KitMergeIdle {
                            gate: self.gate.clone(),
                        })
                        .await;
                }
                self.clear();
                // an empty answer is still a fresh answer
                self.fetched_at = Some(Instant::now());
                Ok(None)
            }
        }
    }

    /// Fetches the PTL records of the loaded batch's kits.
    #[instrument(skip(self), fields(gate = %self.gate))]
    pub async fn load_ptl_records(&mut self) -> Result<usize, ServiceError> {
        let kits = self
            .kit_merge
            .as_ref()
            .map(|m| m.kit_no.clone())
            .unwrap_or_default();

        self.records = self.ptl.load_ptl_records(&kits).await?;
        self.fetched_at = Some(Instant::now());

        let count = self.records.len();
        if !kits.is_empty() {
            self.events.notify(Event::PtlRecordsLoaded { count }).await;
        }
        Ok(count)
    }

    /// Fetches the mission detail of the loaded batch, for the current-material panel.
    #[instrument(skip(self), fields(gate = %self.gate))]
    pub async fn load_mission_detail(
        &mut self,
    ) -> Result<Option<&MissionKitMergeItem>, ServiceError> {
        let Some(kit_merge_id) = self.kit_merge.as_ref().map(|m| m.id) else {
            self.mission = None;
            return Ok(None);
        };

        let mission = self.kit_merges.load_mission_detail(kit_merge_id).await?;
        self.mission = Some(mission);
        Ok(self.mission.as_ref())
    }

    /// Re-reads the active batch and its records. Failures are reported to the
    /// operator and leave the current display untouched.
    pub async fn refresh(&mut self) -> Result<(), ServiceError> {
        if let Err(err) = self.reload().await {
            warn!(gate = %self.gate, error = %err, "refresh failed");
            self.events
                .notify(Event::RemoteError {
                    message: err.operator_message(),
                })
                .await;
            return Err(err);
        }
        Ok(())
    }

    async fn reload(&mut self) -> Result<(), ServiceError> {
        if self.load_active_kit_merge().await?.is_some() {
            self.load_ptl_records().await?;
        }
        Ok(())
    }

    /// Feeds one scanned line to the flow.
    #[instrument(skip(self), fields(gate = %self.gate))]
    pub async fn on_scan(&mut self, raw: &str) -> ScanOutcome {
        match self.classifier.classify(raw) {
            ScanInput::MaterialCode(material_no) => {
                metrics::counter!("ptl.scans", 1, "kind" => "material");
                let visible = self.select_material(material_no.clone());
                self.events
                    .notify(Event::MaterialSelected {
                        material_no: material_no.clone(),
                        visible,
                    })
                    .await;
                ScanOutcome::MaterialSelected {
                    material_no,
                    visible,
                }
            }
            ScanInput::Quantity(quantity) => {
                metrics::counter!("ptl.scans", 1, "kind" => "quantity");
                let record_id = self
                    .quantity_matches(quantity)
                    .first()
                    .map(|&index| self.records[index].id);

                match self.apply_picked_quantity(quantity).await {
                    Ok(record) => ScanOutcome::Updated(record),
                    Err(_) if record_id.is_none() => ScanOutcome::NotFound { quantity },
                    Err(err) => ScanOutcome::UpdateFailed {
                        record_id,
                        message: err.operator_message(),
                    },
                }
            }
            ScanInput::UnmatchableQuantity(scanned) => {
                metrics::counter!("ptl.scans", 1, "kind" => "quantity");
                info!(scanned = %scanned, "quantity can never match a slot");
                self.report_not_found(scanned.clone()).await;
                ScanOutcome::UnmatchableQuantity { scanned }
            }
            ScanInput::Discard => {
                metrics::counter!("ptl.scans", 1, "kind" => "discarded");
                let raw = raw.trim();
                debug!(raw, "scan discarded");
                if !raw.is_empty() {
                    self.events
                        .notify(Event::ScanDiscarded {
                            raw: raw.to_string(),
                        })
                        .await;
                }
                ScanOutcome::Discarded
            }
        }
    }

    /// Sets the material filter and returns how many records it shows.
    pub fn select_material(&mut self, material_no: impl Into<String>) -> usize {
        self.material_filter = Some(material_no.into());
        self.state = StationState::MaterialSelected;
        self.visible_records().len()
    }

    /// Updates the first displayed record whose required quantity equals the
    /// scanned value.
    ///
    /// The required quantity stands in for slot identity: the operator knows
    /// how many units went into the slot they just filled. When several
    /// displayed records share that quantity the first wins and an
    /// [`Event::AmbiguousQuantityMatch`] warning is raised; use
    /// [`PtlStation::apply_to_record`] to address a slot unambiguously.
    #[instrument(skip(self), fields(gate = %self.gate, material_no = ?self.material_filter))]
    pub async fn apply_picked_quantity(&mut self, quantity: i64) -> Result<PtlRecord, ServiceError> {
        let candidates = self.quantity_matches(quantity);

        let Some(&index) = candidates.first() else {
            info!(quantity, "no displayed slot requires this quantity");
            self.report_not_found(quantity.to_string()).await;
            return Err(ServiceError::material_not_found());
        };

        if candidates.len() > 1 {
            let record_ids: Vec<i64> = candidates.iter().map(|&i| self.records[i].id).collect();
            warn!(quantity, ?record_ids, "several displayed slots require this quantity");
            self.events
                .notify(Event::AmbiguousQuantityMatch {
                    quantity,
                    chosen: self.records[index].id,
                    record_ids,
                })
                .await;
        }

        self.commit_picked_qty(index, quantity).await
    }

    /// Updates the record with the given id. Identity-based counterpart of
    /// [`PtlStation::apply_picked_quantity`].
    #[instrument(skip(self), fields(gate = %self.gate))]
    pub async fn apply_to_record(
        &mut self,
        record_id: i64,
        picked_qty: i64,
    ) -> Result<PtlRecord, ServiceError> {
        let Some(index) = self.records.iter().position(|r| r.id == record_id) else {
            return Err(ServiceError::NotFound(format!(
                "PTL record {} is not part of the active kit merge",
                record_id
            )));
        };

        self.commit_picked_qty(index, picked_qty).await
    }

    async fn report_not_found(&self, scanned: String) {
        metrics::counter!("ptl.material_not_found", 1);
        self.events
            .notify(Event::MaterialNotFound {
                material_no: self.material_filter.clone(),
                scanned,
            })
            .await;
    }

    fn quantity_matches(&self, quantity: i64) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| self.is_visible(r) && r.ptl_qty == quantity)
            .map(|(index, _)| index)
            .collect()
    }

    /// Optimistically applies the quantity, sends it, and restores the
    /// previous value if the server rejects it.
    async fn commit_picked_qty(
        &mut self,
        index: usize,
        picked_qty: i64,
    ) -> Result<PtlRecord, ServiceError> {
        let (record_id, material_no, previous) = {
            let record = &mut self.records[index];
            let previous = record.picked_qty;
            if picked_qty > record.ptl_qty {
                warn!(
                    record_id = record.id,
                    picked_qty,
                    ptl_qty = record.ptl_qty,
                    "picked quantity exceeds required quantity"
                );
            }
            record.picked_qty = picked_qty;
            (record.id, record.material_no.clone(), previous)
        };

        let resume = self.state;
        self.state = StationState::Updating;
        let result = self.ptl.update_picked_qty(record_id, picked_qty).await;
        self.state = match resume {
            StationState::Updating => StationState::MaterialSelected,
            other => other,
        };

        match result {
            Ok(()) => {
                metrics::counter!("ptl.picked_qty.updated", 1);
                info!(record_id, picked_qty, "picked quantity updated");
                self.events
                    .notify(Event::PickedQtyUpdated {
                        record_id,
                        material_no,
                        picked_qty,
                    })
                    .await;
                Ok(self.records[index].clone())
            }
            Err(err) => {
                self.records[index].picked_qty = previous;
                metrics::counter!("ptl.picked_qty.reverted", 1);
                warn!(record_id, picked_qty, previous, error = %err, "update failed, optimistic change reverted");
                self.events
                    .notify(Event::RemoteError {
                        message: err.operator_message(),
                    })
                    .await;
                self.events
                    .notify(Event::PickedQtyReverted {
                        record_id,
                        restored_qty: previous,
                        attempted_qty: picked_qty,
                    })
                    .await;
                Err(err)
            }
        }
    }
}
