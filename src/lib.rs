pub mod core;

// Re-export key items for easy importing in this crate
pub use core::types;

// Re-export key items for easy importing in other crates
pub use core::alloc::{allocate, parse_build_spec, resolve_build_paths};
pub use core::campaign::{Campaign, CampaignOutcome, CampaignSettings, WorkerPlan};
pub use core::main_shared::run_main;
pub use core::worker::{WorkerProcess, WorkerState};
