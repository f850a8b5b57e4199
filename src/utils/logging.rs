// src/utils/logging.rs - Logging initialization

use std::io::Write;
use std::sync::Once;

use chrono::Local;
use env_logger::{Builder, Env};
use log::info;

static INIT: Once = Once::new();

/// Initialize the logging system. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logger() {
    INIT.call_once(|| {
        let env = Env::default().filter_or("LOG_LEVEL", "info");

        Builder::from_env(env)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] - {}: {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .init();

        info!("Logging initialized");
    });
}
