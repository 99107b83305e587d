/// Width in bytes of one entry of the line offset table
pub const OFFSET_WIDTH: usize = 8;

/// Append offsets to `buf` as little-endian u64s
pub fn encode_offsets(offsets: &[u64], buf: &mut Vec<u8>) {
    buf.reserve(offsets.len() * OFFSET_WIDTH);
    for &offset in offsets {
        buf.extend_from_slice(&offset.to_le_bytes());
    }
}

/// Decode the `index`-th offset of a table held in memory
pub fn decode_offset_at(buf: &[u8], index: u64) -> Option<u64> {
    let start = usize::try_from(index).ok()?.checked_mul(OFFSET_WIDTH)?;
    let bytes = buf.get(start..start.checked_add(OFFSET_WIDTH)?)?;
    let mut le = [0u8; OFFSET_WIDTH];
    le.copy_from_slice(bytes);
    Some(u64::from_le_bytes(le))
}

/// Lowercase hex rendering of a digest
pub fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
