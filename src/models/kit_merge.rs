use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of kit-merge batch. Odd batches are the ones handled at PTL gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum KitMergeType {
    Standard,
    Odd,
}

impl Default for KitMergeType {
    fn default() -> Self {
        KitMergeType::Odd
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum KitMergeStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl Default for KitMergeStatus {
    fn default() -> Self {
        KitMergeStatus::InProgress
    }
}

/// A batch of kits being processed together at one gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitMerge {
    pub id: i64,
    #[serde(default)]
    pub kit_no: Vec<String>,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: KitMergeType,
    #[serde(default)]
    pub status: KitMergeStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl KitMerge {
    pub fn has_kits(&self) -> bool {
        !self.kit_no.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KitMergeFilter {
    pub gate: String,
    #[serde(rename = "type")]
    pub kind: KitMergeType,
    pub status: KitMergeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListKitMergeRequest {
    pub filter: KitMergeFilter,
    pub limit: u64,
    pub page: u64,
}

impl ListKitMergeRequest {
    /// First page of batches for a gate, most recent first as ordered by the server.
    pub fn first_page(
        gate: impl Into<String>,
        kind: KitMergeType,
        status: KitMergeStatus,
        limit: u64,
    ) -> Self {
        Self {
            filter: KitMergeFilter {
                gate: gate.into(),
                kind,
                status,
            },
            limit,
            page: 1,
        }
    }
}

/// Paginated list envelope used by the IWMS list endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paginated<T> {
    #[serde(rename = "metaData", default = "Vec::new")]
    pub meta_data: Vec<T>,
    #[serde(default)]
    pub total: u64,
}

impl<T> Paginated<T> {
    pub fn into_first(self) -> Option<T> {
        self.meta_data.into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn list_request_uses_wire_field_names() {
        let req = ListKitMergeRequest::first_page(
            "G01",
            KitMergeType::Odd,
            KitMergeStatus::InProgress,
            1,
        );
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "filter": {"gate": "G01", "type": "ODD", "status": "in_progress"},
                "limit": 1,
                "page": 1
            })
        );
    }

    #[test]
    fn envelope_tolerates_sparse_batches() {
        let page: Paginated<KitMerge> = serde_json::from_value(json!({
            "metaData": [{"id": 7, "kit_no": ["K365015"], "type": "ODD", "status": "in_progress"}],
            "total": 1
        }))
        .unwrap();

        let merge = page.into_first().unwrap();
        assert_eq!(merge.id, 7);
        assert_eq!(merge.kind, KitMergeType::Odd);
        assert_eq!(merge.gate, None);
        assert!(merge.has_kits());
    }

    #[test]
    fn enums_parse_from_cli_spelling() {
        assert_eq!(KitMergeType::from_str("odd").unwrap(), KitMergeType::Odd);
        assert_eq!(
            KitMergeStatus::from_str("IN_PROGRESS").unwrap(),
            KitMergeStatus::InProgress
        );
        assert_eq!(KitMergeStatus::Cancelled.to_string(), "cancelled");
    }
}
