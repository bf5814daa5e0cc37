use fuzzman::run_main;

/// Exit code for configuration, spawn and I/O errors
const FATAL_EXIT_CODE: i32 = 7;

#[tokio::main]
async fn main() {
    if let Err(e) = run_main().await {
        eprintln!("{e}");
        std::process::exit(FATAL_EXIT_CODE);
    }
}
