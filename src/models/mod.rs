pub mod kit_merge;
pub mod mission;
pub mod ptl;

pub use kit_merge::{
    KitMerge, KitMergeFilter, KitMergeStatus, KitMergeType, ListKitMergeRequest, Paginated,
};
pub use mission::{MissionInventory, MissionKitMergeItem};
pub use ptl::{GetPtlByKitsRequest, PickProgress, PtlRecord, UpdatePickedQtyRequest};
