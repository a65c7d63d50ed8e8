use serde::{Deserialize, Serialize};
use validator::Validate;

/// One pick-to-light slot: a (kit, material) pair with its required and
/// picked quantities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtlRecord {
    pub id: i64,
    /// Kit identifier the slot belongs to.
    pub issue_ord_no: String,
    pub material_no: String,
    /// Quantity required for the slot.
    pub ptl_qty: i64,
    /// Quantity fulfilled so far.
    #[serde(default)]
    pub picked_qty: i64,
    #[serde(default)]
    pub station: Option<String>,
    #[serde(default)]
    pub box_tp: Option<String>,
    #[serde(default)]
    pub trolley_tp: Option<String>,
}

impl PtlRecord {
    pub fn is_fulfilled(&self) -> bool {
        self.picked_qty >= self.ptl_qty
    }

    pub fn remaining(&self) -> i64 {
        (self.ptl_qty - self.picked_qty).max(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetPtlByKitsRequest {
    pub kits: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct UpdatePickedQtyRequest {
    #[validate(range(min = 0))]
    pub picked_qty: i64,
}

/// Required vs picked totals over a set of slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PickProgress {
    pub slots: usize,
    pub fulfilled_slots: usize,
    pub required_qty: i64,
    pub picked_qty: i64,
}

impl PickProgress {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PtlRecord>) -> Self {
        records
            .into_iter()
            .fold(PickProgress::default(), |mut acc, record| {
                acc.slots += 1;
                acc.required_qty += record.ptl_qty;
                acc.picked_qty += record.picked_qty;
                if record.is_fulfilled() {
                    acc.fulfilled_slots += 1;
                }
                acc
            })
    }

    pub fn is_complete(&self) -> bool {
        self.slots > 0 && self.fulfilled_slots == self.slots
    }
}
