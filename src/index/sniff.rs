//! Encoding and line terminator detection from the first read block.
//!
//! This is a best-effort heuristic. Only the first block is inspected, so a
//! file that starts with plain ASCII and switches to BOM-less UTF-16 later is
//! decoded with the default single-byte decoder.

use crate::index::types::BomKind;
use encoding_rs::Encoding;

const LF: u8 = 0x0a;
const CR: u8 = 0x0d;

/// What the first block says about the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    pub bom: BomKind,
    /// LF if any LF was seen, otherwise CR if any CR was seen
    pub terminator: Option<u8>,
    /// Terminator length in bytes (LF and CR each count one code unit)
    pub eol_len: u8,
    /// Byte offset where line 0 begins
    pub content_start: u64,
    pub nul_count: usize,
    pub non_ascii_count: usize,
    pub lf_count: usize,
    pub cr_count: usize,
}

impl Sniffed {
    pub fn encoding(&self) -> &'static Encoding {
        self.bom.encoding()
    }

    pub fn unit_len(&self) -> usize {
        self.bom.unit_len()
    }
}

/// Inspect the first block of a file
pub fn sniff(buf: &[u8]) -> Sniffed {
    let mut nul_count = 0;
    let mut non_ascii_count = 0;
    let mut lf_count = 0;
    let mut cr_count = 0;

    for &b in buf {
        match b {
            0 => nul_count += 1,
            LF => lf_count += 1,
            CR => cr_count += 1,
            b if b >= 0x80 => non_ascii_count += 1,
            _ => {}
        }
    }

    let terminator = if lf_count > 0 {
        Some(LF)
    } else if cr_count > 0 {
        Some(CR)
    } else {
        None
    };

    let bom = if nul_count > 0 && buf.starts_with(&[0xfe, 0xff]) {
        BomKind::Utf16Be
    } else if nul_count > 0 && buf.starts_with(&[0xff, 0xfe]) {
        BomKind::Utf16Le
    } else if non_ascii_count > 0 && buf.starts_with(&[0xef, 0xbb, 0xbf]) {
        BomKind::Utf8
    } else {
        BomKind::Ansi
    };

    let unit = bom.unit_len() as u8;
    let lf_len = if lf_count > 0 { unit } else { 0 };
    let cr_len = if cr_count > 0 { unit } else { 0 };
    let eol_len = lf_len + cr_len;

    Sniffed {
        bom,
        terminator,
        eol_len,
        content_start: bom.bom_len(),
        nul_count,
        non_ascii_count,
        lf_count,
        cr_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lf_only() {
        let s = sniff(b"one\ntwo\nthree");
        assert_eq!(s.bom, BomKind::Ansi);
        assert_eq!(s.terminator, Some(b'\n'));
        assert_eq!(s.eol_len, 1);
        assert_eq!(s.content_start, 0);
    }

    #[test]
    fn test_crlf_folds_cr_into_eol_len() {
        let s = sniff(b"one\r\ntwo\r\n");
        assert_eq!(s.terminator, Some(b'\n'));
        assert_eq!(s.eol_len, 2);
    }

    #[test]
    fn test_cr_only() {
        let s = sniff(b"one\rtwo\r");
        assert_eq!(s.terminator, Some(b'\r'));
        assert_eq!(s.eol_len, 1);
    }

    #[test]
    fn test_no_terminator() {
        let s = sniff(b"just one line");
        assert_eq!(s.terminator, None);
        assert_eq!(s.eol_len, 0);
    }

    #[test]
    fn test_utf8_bom() {
        let s = sniff(b"\xef\xbb\xbfhello\n");
        assert_eq!(s.bom, BomKind::Utf8);
        assert_eq!(s.content_start, 3);
        assert_eq!(s.encoding().name(), "UTF-8");
    }

    #[test]
    fn test_utf16_le_bom() {
        let s = sniff(&[0xff, 0xfe, b'a', 0, b'\n', 0, b'b', 0]);
        assert_eq!(s.bom, BomKind::Utf16Le);
        assert_eq!(s.content_start, 2);
        assert_eq!(s.eol_len, 2);
        assert_eq!(s.unit_len(), 2);
    }

    #[test]
    fn test_utf16_be_bom() {
        let s = sniff(&[0xfe, 0xff, 0, b'a', 0, b'\r', 0, b'\n']);
        assert_eq!(s.bom, BomKind::Utf16Be);
        assert_eq!(s.eol_len, 4);
    }

    #[test]
    fn test_utf16_bom_without_nuls_falls_back() {
        // FF FE followed by non-NUL bytes only: the NUL requirement is not met
        let s = sniff(&[0xff, 0xfe, 0x41, 0x42]);
        assert_eq!(s.bom, BomKind::Ansi);
        assert_eq!(s.content_start, 0);
    }

    #[test]
    fn test_non_ascii_without_bom_is_default() {
        let s = sniff("caf\u{e9}\n".as_bytes());
        assert_eq!(s.bom, BomKind::Ansi);
        assert_eq!(s.non_ascii_count, 2);
    }

    #[test]
    fn test_empty_buffer() {
        let s = sniff(b"");
        assert_eq!(s.bom, BomKind::Ansi);
        assert_eq!(s.terminator, None);
    }
}
