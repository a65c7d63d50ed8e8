pub mod kit_merge;
pub mod ptl;

pub use kit_merge::KitMergeService;
pub use ptl::PtlService;
