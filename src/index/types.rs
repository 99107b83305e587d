use crate::cache::CacheLimits;
use crate::utils::AppConfig;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sidecar format version. Bump when the offset table or sidecar layout changes.
pub const INDEX_VERSION: u32 = 1;

/// Byte-order mark / encoding family detected at the start of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum BomKind {
    /// No BOM, single-byte system decoding
    #[default]
    Ansi = 0,
    Utf8 = 1,
    Utf16Be = 2,
    Utf16Le = 3,
}

impl BomKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => BomKind::Utf8,
            2 => BomKind::Utf16Be,
            3 => BomKind::Utf16Le,
            _ => BomKind::Ansi,
        }
    }

    /// Bytes occupied by the BOM, i.e. where line 0 begins
    pub fn bom_len(self) -> u64 {
        match self {
            BomKind::Ansi => 0,
            BomKind::Utf8 => 3,
            BomKind::Utf16Be | BomKind::Utf16Le => 2,
        }
    }

    /// Width of one code unit in bytes
    pub fn unit_len(self) -> usize {
        match self {
            BomKind::Utf16Be | BomKind::Utf16Le => 2,
            BomKind::Ansi | BomKind::Utf8 => 1,
        }
    }

    /// Decoder used for line text
    pub fn encoding(self) -> &'static Encoding {
        match self {
            BomKind::Ansi => WINDOWS_1252,
            BomKind::Utf8 => UTF_8,
            BomKind::Utf16Be => UTF_16BE,
            BomKind::Utf16Le => UTF_16LE,
        }
    }

    pub fn decoder_name(self) -> &'static str {
        self.encoding().name()
    }
}

/// Lifecycle of one open session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoadState {
    #[default]
    Idle = 0,
    Opening = 1,
    ValidatingExistingIndex = 2,
    BuildingIndex = 3,
    Ready = 4,
    Error = 5,
    Cancelled = 6,
}

impl LoadState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => LoadState::Opening,
            2 => LoadState::ValidatingExistingIndex,
            3 => LoadState::BuildingIndex,
            4 => LoadState::Ready,
            5 => LoadState::Error,
            6 => LoadState::Cancelled,
            _ => LoadState::Idle,
        }
    }

    /// Name published on the `lines.state` key
    pub fn as_str(self) -> &'static str {
        match self {
            LoadState::Idle => "Idle",
            LoadState::Opening => "Opening",
            LoadState::ValidatingExistingIndex => "Validating",
            LoadState::BuildingIndex => "Building",
            LoadState::Ready => "Ready",
            LoadState::Error => "Error",
            LoadState::Cancelled => "Cancelled",
        }
    }

    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            LoadState::Opening | LoadState::ValidatingExistingIndex | LoadState::BuildingIndex
        )
    }
}

/// Sidecar record persisted next to the offset table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: u32,
    pub source_path: PathBuf,
    pub rows: u64,
    /// Widest line in bytes, excluding the terminator
    pub cols: u32,
    pub bom: BomKind,
    /// Name of the decoder (an encoding label)
    pub decoder: String,
    /// Terminator length in bytes: 0 (no terminator), one or two code units
    pub eol_len: u8,
    pub file_len: u64,
    pub fast_fingerprint: String,
    /// Filled in by the background full-content hash
    #[serde(default)]
    pub full_fingerprint: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Result of looking up one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineLookup {
    Text(String),
    /// Beyond the rows indexed so far while the build is still running
    NotYetAvailable,
    /// Beyond the final row count
    OutOfRange,
    /// No file open, the file is empty, or the row number is negative
    NotOpen,
}

impl LineLookup {
    /// Collapse to the `line()` surface: out of range reads as an empty line
    pub fn into_line(self) -> Option<String> {
        match self {
            LineLookup::Text(text) => Some(text),
            LineLookup::OutOfRange => Some(String::new()),
            LineLookup::NotYetAvailable | LineLookup::NotOpen => None,
        }
    }
}

/// Sampling parameters of the fast fingerprint
#[derive(Debug, Clone, Copy)]
pub struct FingerprintConfig {
    pub samples: usize,
    pub sample_bytes: usize,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            samples: 16,
            sample_bytes: 4096,
        }
    }
}

/// Configuration of a [`LineIndex`](crate::index::LineIndex)
#[derive(Debug, Clone)]
pub struct LineIndexConfig {
    pub index_dir: PathBuf,
    pub cache: CacheLimits,
    pub read_buffer_size: usize,
    pub flush_block_lines: usize,
    pub max_line_bytes: usize,
    pub verify_full_hash: bool,
    pub fingerprint: FingerprintConfig,
}

impl LineIndexConfig {
    /// Defaults with indexes stored in `index_dir`
    pub fn with_index_dir(index_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self::from(&AppConfig::default());
        config.index_dir = index_dir.into();
        config
    }
}

impl From<&AppConfig> for LineIndexConfig {
    fn from(app: &AppConfig) -> Self {
        Self {
            index_dir: app.resolved_index_dir(),
            cache: CacheLimits {
                max_count: app.cache_max_lines,
                max_age: Duration::from_secs(app.cache_max_age_secs),
                keep_purged: app.cache_keep_purged,
            },
            // Even sizes keep UTF-16 code units aligned across reads
            read_buffer_size: (app.read_buffer_size.max(4096) + 1) & !1,
            flush_block_lines: app.flush_block_lines.max(1),
            max_line_bytes: app.max_line_bytes.max(1),
            verify_full_hash: app.verify_full_hash,
            fingerprint: FingerprintConfig {
                samples: app.fingerprint_samples.max(1),
                sample_bytes: app.fingerprint_sample_bytes.max(1),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bom_kind_properties() {
        assert_eq!(BomKind::Utf8.bom_len(), 3);
        assert_eq!(BomKind::Utf16Le.unit_len(), 2);
        assert_eq!(BomKind::Ansi.decoder_name(), "windows-1252");
        assert_eq!(BomKind::from_u8(BomKind::Utf16Be as u8), BomKind::Utf16Be);
        assert_eq!(BomKind::from_u8(200), BomKind::Ansi);
    }

    #[test]
    fn test_bom_kind_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&BomKind::Utf16Le).unwrap(), "\"UTF16LE\"");
        let parsed: BomKind = serde_json::from_str("\"ANSI\"").unwrap();
        assert_eq!(parsed, BomKind::Ansi);
    }

    #[test]
    fn test_load_state_roundtrip() {
        for state in [
            LoadState::Idle,
            LoadState::Opening,
            LoadState::ValidatingExistingIndex,
            LoadState::BuildingIndex,
            LoadState::Ready,
            LoadState::Error,
            LoadState::Cancelled,
        ] {
            assert_eq!(LoadState::from_u8(state as u8), state);
        }
        assert!(LoadState::BuildingIndex.is_in_progress());
        assert!(!LoadState::Ready.is_in_progress());
    }

    #[test]
    fn test_line_lookup_collapse() {
        assert_eq!(LineLookup::OutOfRange.into_line(), Some(String::new()));
        assert_eq!(LineLookup::NotYetAvailable.into_line(), None);
        assert_eq!(LineLookup::Text("x".into()).into_line(), Some("x".into()));
    }

    #[test]
    fn test_read_buffer_is_even() {
        let app = AppConfig {
            read_buffer_size: 10_001,
            ..Default::default()
        };
        assert_eq!(LineIndexConfig::from(&app).read_buffer_size % 2, 0);
    }
}
