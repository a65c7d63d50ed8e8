//! Property-based tests for scan classification and quantity reconciliation.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proptest::prelude::*;
use wms_ptl::{
    client::WmsApi,
    errors::ServiceError,
    events::EventSender,
    models::{KitMerge, ListKitMergeRequest, MissionKitMergeItem, Paginated, PtlRecord},
    reconciliation::{ScanClassifier, ScanInput, ScanOutcome, StationSettings},
    PtlStation,
};

/// In-memory WMS that records every picked-quantity update.
struct FakeWms {
    records: Vec<PtlRecord>,
    updates: Mutex<Vec<(i64, i64)>>,
}

#[async_trait]
impl WmsApi for FakeWms {
    async fn list_kit_merges(
        &self,
        _request: &ListKitMergeRequest,
    ) -> Result<Paginated<KitMerge>, ServiceError> {
        Ok(Paginated {
            meta_data: vec![KitMerge {
                id: 1,
                kit_no: vec!["K1".into(), "K2".into()],
                gate: Some("G01".into()),
                kind: Default::default(),
                status: Default::default(),
                created_at: None,
                updated_at: None,
            }],
            total: 1,
        })
    }

    async fn get_ptl_by_kits(&self, _kits: &[String]) -> Result<Vec<PtlRecord>, ServiceError> {
        Ok(self.records.clone())
    }

    async fn update_picked_qty(&self, id: i64, picked_qty: i64) -> Result<(), ServiceError> {
        self.updates.lock().unwrap().push((id, picked_qty));
        Ok(())
    }

    async fn get_mission_kit_merge(&self, id: i64) -> Result<MissionKitMergeItem, ServiceError> {
        Err(ServiceError::NotFound(format!("mission {}", id)))
    }
}

// Strategies for generating test data
fn material_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["60988953", "70000001", "80012345"]).prop_map(String::from)
}

fn records_strategy() -> impl Strategy<Value = Vec<PtlRecord>> {
    prop::collection::vec((material_strategy(), 1i64..30), 0..12).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (material_no, ptl_qty))| PtlRecord {
                id: i as i64 + 1,
                issue_ord_no: if i % 2 == 0 { "K1".into() } else { "K2".into() },
                material_no,
                ptl_qty,
                picked_qty: 0,
                station: None,
                box_tp: None,
                trolley_tp: None,
            })
            .collect()
    })
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

// Property: scan classification
proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn long_scans_are_material_codes(code in "[A-Za-z0-9]{7,20}") {
        let classifier = ScanClassifier::new(6);
        prop_assert_eq!(classifier.classify(&format!("  {}\r\n", code)), ScanInput::MaterialCode(code));
    }

    #[test]
    fn short_integers_are_quantities(n in 0i64..=999_999) {
        let classifier = ScanClassifier::new(6);
        prop_assert_eq!(classifier.classify(&n.to_string()), ScanInput::Quantity(n));
    }

    #[test]
    fn short_non_numeric_scans_are_discarded(s in "[a-z]{1,6}") {
        let classifier = ScanClassifier::new(6);
        prop_assert_eq!(classifier.classify(&s), ScanInput::Discard);
    }
}

// Property: filtering and quantity matching over a station
proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn material_filter_shows_exactly_that_material(
        records in records_strategy(),
        material in material_strategy(),
    ) {
        let api = Arc::new(FakeWms { records: records.clone(), updates: Mutex::new(Vec::new()) });
        let (events, _rx) = EventSender::channel(256);
        let mut station = PtlStation::new(api, events, StationSettings::new("G01"));

        let visible: Vec<i64> = block_on(async {
            station.refresh().await.unwrap();
            station.on_scan(&material).await;
            station.visible_records().iter().map(|r| r.id).collect()
        });

        let expected: Vec<i64> = records
            .iter()
            .filter(|r| r.material_no == material)
            .map(|r| r.id)
            .collect();
        prop_assert_eq!(visible, expected);
    }

    #[test]
    fn quantity_scan_updates_first_match_or_nothing(
        records in records_strategy(),
        material in material_strategy(),
        quantity in 1i64..30,
    ) {
        let api = Arc::new(FakeWms { records: records.clone(), updates: Mutex::new(Vec::new()) });
        let (events, _rx) = EventSender::channel(256);
        let mut station = PtlStation::new(api.clone(), events, StationSettings::new("G01"));

        let outcome = block_on(async {
            station.refresh().await.unwrap();
            station.on_scan(&material).await;
            station.on_scan(&quantity.to_string()).await
        });

        let first_match = records
            .iter()
            .find(|r| r.material_no == material && r.ptl_qty == quantity)
            .map(|r| r.id);
        let updates = api.updates.lock().unwrap().clone();

        match first_match {
            Some(id) => {
                prop_assert_eq!(updates, vec![(id, quantity)]);
                prop_assert!(matches!(outcome, ScanOutcome::Updated(ref r) if r.id == id && r.picked_qty == quantity));
            }
            None => {
                prop_assert!(updates.is_empty());
                prop_assert_eq!(outcome, ScanOutcome::NotFound { quantity });
            }
        }
    }
}
