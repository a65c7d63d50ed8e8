use serde::{Deserialize, Serialize};

/// Inventory snapshot row attached to a kit-merge mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionInventory {
    pub material_no: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub location: Option<String>,
}

/// Detail view of a kit-merge mission as returned by `mission/kit-merge/:id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionKitMergeItem {
    pub id: i64,
    #[serde(default)]
    pub kit_no: Vec<String>,
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub inventories: Vec<MissionInventory>,
}

impl MissionKitMergeItem {
    pub fn inventory_for<'a>(
        &'a self,
        material_no: &'a str,
    ) -> impl Iterator<Item = &'a MissionInventory> + 'a {
        self.inventories
            .iter()
            .filter(move |inv| inv.material_no == material_no)
    }
}
