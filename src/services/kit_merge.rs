use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    client::WmsApi,
    errors::ServiceError,
    models::{KitMerge, KitMergeStatus, KitMergeType, ListKitMergeRequest, MissionKitMergeItem},
};

/// Looks up the kit-merge batch a gate is currently working on.
#[derive(Clone)]
pub struct KitMergeService {
    api: Arc<dyn WmsApi>,
    kind: KitMergeType,
    status: KitMergeStatus,
    page_limit: u64,
}

impl KitMergeService {
    pub fn new(api: Arc<dyn WmsApi>) -> Self {
        Self {
            api,
            kind: KitMergeType::Odd,
            status: KitMergeStatus::InProgress,
            page_limit: 1,
        }
    }

    pub fn with_filter(mut self, kind: KitMergeType, status: KitMergeStatus) -> Self {
        self.kind = kind;
        self.status = status;
        self
    }

    pub fn with_page_limit(mut self, page_limit: u64) -> Self {
        self.page_limit = page_limit.clamp(1, 2);
        self
    }

    /// Most recent batch matching the gate, type and status. `None` when the
    /// gate has nothing in progress.
    #[instrument(skip(self))]
    pub async fn load_active_kit_merge(&self, gate: &str) -> Result<Option<KitMerge>, ServiceError> {
        if gate.trim().is_empty() {
            return Err(ServiceError::InvalidInput("gate must not be empty".into()));
        }

        let request =
            ListKitMergeRequest::first_page(gate, self.kind, self.status, self.page_limit);
        let page = self.api.list_kit_merges(&request).await?;
        debug!(total = page.total, returned = page.meta_data.len(), "kit merge page received");

        let active = page.into_first();
        match &active {
            Some(merge) => info!(kit_merge_id = merge.id, kits = merge.kit_no.len(), "active kit merge"),
            None => info!("no active kit merge"),
        }
        Ok(active)
    }

    #[instrument(skip(self))]
    pub async fn load_mission_detail(
        &self,
        kit_merge_id: i64,
    ) -> Result<MissionKitMergeItem, ServiceError> {
        self.api.get_mission_kit_merge(kit_merge_id).await
    }
}
