use async_trait::async_trait;
use tracing::instrument;

use super::ApiClient;
use crate::errors::ServiceError;
use crate::models::{
    GetPtlByKitsRequest, KitMerge, ListKitMergeRequest, MissionKitMergeItem, Paginated,
    PtlRecord, UpdatePickedQtyRequest,
};

pub const KIT_MERGER_LIST_PATH: &str = "kit-merger/list";
pub const PTL_BY_KITS_PATH: &str = "ptl/get-by-kits";

/// Remote operations the reconciliation flow depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WmsApi: Send + Sync {
    async fn list_kit_merges(
        &self,
        request: &ListKitMergeRequest,
    ) -> Result<Paginated<KitMerge>, ServiceError>;

    async fn get_ptl_by_kits(&self, kits: &[String]) -> Result<Vec<PtlRecord>, ServiceError>;

    async fn update_picked_qty(&self, id: i64, picked_qty: i64) -> Result<(), ServiceError>;

    async fn get_mission_kit_merge(&self, id: i64) -> Result<MissionKitMergeItem, ServiceError>;
}

/// [`WmsApi`] over the REST endpoints.
#[derive(Clone)]
pub struct HttpWmsApi {
    client: ApiClient,
}

impl HttpWmsApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl WmsApi for HttpWmsApi {
    #[instrument(skip(self, request), fields(gate = %request.filter.gate))]
    async fn list_kit_merges(
        &self,
        request: &ListKitMergeRequest,
    ) -> Result<Paginated<KitMerge>, ServiceError> {
        self.client.post_json(KIT_MERGER_LIST_PATH, request).await
    }

    #[instrument(skip(self))]
    async fn get_ptl_by_kits(&self, kits: &[String]) -> Result<Vec<PtlRecord>, ServiceError> {
        let request = GetPtlByKitsRequest {
            kits: kits.to_vec(),
        };
        self.client.post_json(PTL_BY_KITS_PATH, &request).await
    }

    #[instrument(skip(self))]
    async fn update_picked_qty(&self, id: i64, picked_qty: i64) -> Result<(), ServiceError> {
        self.client
            .patch(&format!("ptl/{}", id), &UpdatePickedQtyRequest { picked_qty })
            .await
    }

    #[instrument(skip(self))]
    async fn get_mission_kit_merge(&self, id: i64) -> Result<MissionKitMergeItem, ServiceError> {
        self.client
            .get_json(&format!("mission/kit-merge/{}", id))
            .await
    }
}
