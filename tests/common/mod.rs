#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};
use wms_ptl::{
    auth::TokenPair,
    client::{ApiClient, ApiClientConfig, HttpWmsApi, WmsApi},
    events::{Event, EventSender, Notice},
    reconciliation::{PtlStation, StationSettings},
};
use tokio::sync::mpsc::Receiver;

pub const GATE: &str = "G01";
pub const MATERIAL: &str = "60988953";
pub const KITS: [&str; 2] = ["K365015", "K365005"];

/// Client pointed at the mock server with a short timeout.
pub fn client(server: &MockServer, tokens: Option<TokenPair>) -> ApiClient {
    client_with_session(server, tokens, None)
}

pub fn client_with_session(
    server: &MockServer,
    tokens: Option<TokenPair>,
    session_file: Option<PathBuf>,
) -> ApiClient {
    let mut config = ApiClientConfig::new(server.uri());
    config.timeout = Duration::from_secs(5);
    config.session_file = session_file;
    ApiClient::new(config, tokens).expect("client builds")
}

pub fn api(client: ApiClient) -> Arc<dyn WmsApi> {
    Arc::new(HttpWmsApi::new(client))
}

/// Station for [`GATE`] backed by the mock server.
pub fn station(server: &MockServer) -> (PtlStation, Receiver<Notice>) {
    let (events, rx) = EventSender::channel(64);
    let station = PtlStation::new(
        api(client(server, Some(TokenPair::new("t1", "r1")))),
        events,
        StationSettings::new(GATE),
    );
    (station, rx)
}

pub fn drain(rx: &mut Receiver<Notice>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        events.push(notice.event);
    }
    events
}

pub fn list_request_body() -> Value {
    json!({
        "filter": {"gate": GATE, "type": "ODD", "status": "in_progress"},
        "limit": 1,
        "page": 1
    })
}

pub fn kit_merge_page(id: i64, kits: &[&str]) -> Value {
    json!({
        "metaData": [{
            "id": id,
            "kit_no": kits,
            "gate": GATE,
            "type": "ODD",
            "status": "in_progress",
            "created_at": "2024-05-02T07:30:00Z"
        }],
        "total": 1
    })
}

pub fn ptl_records() -> Value {
    json!([
        {"id": 1, "issue_ord_no": "K365015", "material_no": MATERIAL, "ptl_qty": 16, "picked_qty": 0, "station": "S1"},
        {"id": 2, "issue_ord_no": "K365005", "material_no": MATERIAL, "ptl_qty": 18, "picked_qty": 0, "station": "S2"},
        {"id": 3, "issue_ord_no": "K365005", "material_no": "70000001", "ptl_qty": 16, "station": "S2"}
    ])
}

/// Mounts the active batch of the reference scenario and its records.
pub async fn mount_scenario(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/kit-merger/list"))
        .and(body_json(list_request_body()))
        .respond_with(ResponseTemplate::new(200).set_body_json(kit_merge_page(7, &KITS)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/ptl/get-by-kits"))
        .and(body_json(json!({"kits": KITS})))
        .respond_with(ResponseTemplate::new(200).set_body_json(ptl_records()))
        .mount(server)
        .await;
}
