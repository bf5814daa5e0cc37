pub mod alloc;
pub mod campaign;
pub mod cli;
pub mod cmdfile;
pub mod cmds;
pub mod format;
pub mod logging;
pub mod main_shared;
pub mod stats;
pub mod term;
pub mod types;
pub mod utils;
pub mod worker;
