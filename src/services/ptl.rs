use std::sync::Arc;

use tracing::{debug, instrument};
use validator::Validate;

use crate::{
    client::WmsApi,
    errors::ServiceError,
    models::{PtlRecord, UpdatePickedQtyRequest},
};

/// Fetches and patches pick-to-light records.
#[derive(Clone)]
pub struct PtlService {
    api: Arc<dyn WmsApi>,
}

impl PtlService {
    pub fn new(api: Arc<dyn WmsApi>) -> Self {
        Self { api }
    }

    /// All PTL records across the given kits. An empty kit list is answered
    /// locally without a request.
    #[instrument(skip(self), fields(kits = kit_no.len()))]
    pub async fn load_ptl_records(&self, kit_no: &[String]) -> Result<Vec<PtlRecord>, ServiceError> {
        if kit_no.is_empty() {
            debug!("no kits to fetch PTL records for");
            return Ok(Vec::new());
        }

        let records = self.api.get_ptl_by_kits(kit_no).await?;
        debug!(count = records.len(), "PTL records fetched");
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn update_picked_qty(&self, record_id: i64, picked_qty: i64) -> Result<(), ServiceError> {
        UpdatePickedQtyRequest { picked_qty }.validate()?;
        self.api.update_picked_qty(record_id, picked_qty).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::wms::MockWmsApi;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn empty_kit_list_makes_no_request() {
        let mut api = MockWmsApi::new();
        api.expect_get_ptl_by_kits().never();

        let service = PtlService::new(Arc::new(api));
        assert!(service.load_ptl_records(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_quantity_never_reaches_the_server() {
        let mut api = MockWmsApi::new();
        api.expect_update_picked_qty().never();

        let service = PtlService::new(Arc::new(api));
        let err = service.update_picked_qty(1, -3).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[tokio::test]
    async fn update_forwards_id_and_quantity() {
        let mut api = MockWmsApi::new();
        api.expect_update_picked_qty()
            .with(eq(1), eq(16))
            .times(1)
            .returning(|_, _| Ok(()));

        let service = PtlService::new(Arc::new(api));
        service.update_picked_qty(1, 16).await.unwrap();
    }
}
