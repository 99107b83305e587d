#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Detection must never panic and must stay self-consistent
    let sniffed = hfr::index::sniff::sniff(data);
    assert!(sniffed.content_start as usize <= data.len().max(3));
    assert!(sniffed.eol_len <= 4);
    let _ = hfr::utils::decode_offset_at(data, 0);
});
