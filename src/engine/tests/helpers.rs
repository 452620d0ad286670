use std::path::Path;

use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, EngineConfig};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Open an engine with the default configuration.
pub fn open(path: &Path) -> Engine {
    init_tracing();
    Engine::open(path, EngineConfig::default()).expect("open")
}

/// Open an engine with a small memtable so flushes trigger quickly.
pub fn open_with_threshold(path: &Path, memtable_max: usize) -> Engine {
    init_tracing();
    Engine::open(path, EngineConfig { memtable_max }).expect("open")
}
