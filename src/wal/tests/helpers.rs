use std::sync::Arc;

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::io::BlockFile;
use crate::layout::{BLOCK_SIZE, JOURNAL_OFF, MANIFEST_OFF};
use crate::superblock::SuperblockManager;
use crate::wal::{RECORD_HEADER_SIZE, RingWal};

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times — only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A formatted backing file (superblocks + journal region) plus a loaded
/// superblock manager, ready for journal tests.
pub fn setup(tmp: &TempDir) -> (Arc<BlockFile>, SuperblockManager, RingWal) {
    init_tracing();

    let file = Arc::new(BlockFile::create(tmp.path().join("db.bin")).unwrap());
    file.ensure_size(MANIFEST_OFF + BLOCK_SIZE as u64).unwrap();

    let mut superblock = SuperblockManager::new(Arc::clone(&file));
    superblock.format_initial(JOURNAL_OFF, 1).unwrap();

    let wal = RingWal::new(Arc::clone(&file));
    (file, superblock, wal)
}

/// A value whose journal record occupies exactly `record_bytes` on disk.
///
/// `record_bytes` must be a multiple of the record alignment and at least
/// one header plus padding.
pub fn value_for_record_size(record_bytes: u64) -> Vec<u8> {
    assert!(record_bytes % 8 == 0);
    assert!(record_bytes as usize > RECORD_HEADER_SIZE);
    vec![0xAB; record_bytes as usize - RECORD_HEADER_SIZE]
}
