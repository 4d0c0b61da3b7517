pub mod abbreviations;
pub mod candle;
pub mod env;
pub mod progress_config;
pub mod resolution_config;

pub async fn get_memory_usage() -> u64 {
    use sysinfo::System;
    let mut sys = System::new_all();
    sys.refresh_memory();
    sys.used_memory() / (1024 * 1024) // Convert to MB
}
