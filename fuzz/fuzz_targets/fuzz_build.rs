#![no_main]

use arbitrary::Arbitrary;
use hfr::index::{IndexBuilder, IndexPaths, IndexStore, LiveCounters};
use libfuzzer_sys::fuzz_target;
use std::fs::File;
use std::sync::atomic::AtomicBool;

#[derive(Debug, Arbitrary)]
struct Input {
    content: Vec<u8>,
    buffer: u16,
    flush: u8,
}

fuzz_target!(|input: Input| {
    // Offsets must be strictly increasing and inside the file for any input
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("source");
    std::fs::write(&path, &input.content).unwrap();
    let file = File::open(&path).unwrap();
    let store = IndexStore::create(IndexPaths::for_source(dir.path(), &path)).unwrap();
    let counters = LiveCounters::default();
    let cancel = AtomicBool::new(false);

    let summary = IndexBuilder::new(&file, &store, &counters, &cancel)
        .read_buffer_size(input.buffer as usize)
        .flush_block_lines(input.flush as usize)
        .build(input.content.len() as u64, |_| {})
        .unwrap();

    let mut previous = None;
    for row in 0..summary.rows {
        let offset = store.read_offset(row).unwrap().unwrap();
        assert!(offset < input.content.len() as u64);
        assert!(previous.is_none_or(|p| p < offset));
        previous = Some(offset);
    }
    assert_eq!(store.read_offset(summary.rows).unwrap(), None);
});
