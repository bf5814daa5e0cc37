pub mod config;
pub mod init;
pub mod plan;
pub mod run;
pub mod stats;

pub use config::execute_config;
pub use init::execute_init;
pub use plan::execute_plan;
pub use run::execute_run;
pub use stats::execute_stats;
