//! Shared helpers for the integration tests.

#![allow(dead_code)]

use hfr::cache::CacheLimits;
use hfr::index::{IndexPaths, LineIndex, LineIndexConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A source file and an index directory that live as long as the fixture
pub struct Fixture {
    pub dir: TempDir,
    pub source: PathBuf,
}

impl Fixture {
    pub fn new(content: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let source = dir.path().join("source.txt");
        fs::write(&source, content).expect("Failed to write source file");
        Self { dir, source }
    }

    pub fn index_dir(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    /// Small buffers so tests exercise block boundaries and several flushes
    pub fn config(&self) -> LineIndexConfig {
        let mut config = LineIndexConfig::with_index_dir(self.index_dir());
        config.read_buffer_size = 4096;
        config.flush_block_lines = 16;
        config.cache = CacheLimits::count(64);
        config
    }

    pub fn paths(&self) -> IndexPaths {
        IndexPaths::for_source(&self.index_dir(), &self.source)
    }

    /// Open the source and wait for the load and the full hash check
    pub fn open(&self) -> LineIndex {
        self.open_with(self.config())
    }

    pub fn open_with(&self, config: LineIndexConfig) -> LineIndex {
        let index = LineIndex::new(config);
        index.open(&self.source).expect("open failed");
        index.wait();
        index
    }
}

/// `count` numbered lines, LF terminated
pub fn numbered_lines(count: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|i| format!("line number {}\n", i).into_bytes())
        .collect()
}

/// Every line of an index, in order
pub fn all_lines(index: &LineIndex) -> Vec<String> {
    (0..index.rows() as i64)
        .map(|row| index.line(row).expect("row should be readable"))
        .collect()
}

pub fn modified(path: &Path) -> std::time::SystemTime {
    fs::metadata(path).unwrap().modified().unwrap()
}
