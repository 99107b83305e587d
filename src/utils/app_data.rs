use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "hfr";
const CONFIG_FILE: &str = "config.json";

/// Extension of the flat binary line offset table
pub const INDEX_EXTENSION: &str = "hfr-index";
/// Extension of the JSON sidecar metadata record
pub const SIDECAR_EXTENSION: &str = "hfr-json";

/// Application configuration stored in the config directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where index and sidecar files live. Defaults to `<temp>/hfr`.
    #[serde(default)]
    pub index_dir: Option<PathBuf>,

    /// Maximum number of decoded lines kept in memory
    #[serde(default = "default_cache_max_lines")]
    pub cache_max_lines: usize,

    /// Maximum age of a cached line in seconds (0 disables age eviction)
    #[serde(default)]
    pub cache_max_age_secs: u64,

    /// Evicted lines retained for inspection
    #[serde(default)]
    pub cache_keep_purged: usize,

    /// Size of each sequential read while building the index
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Offsets accumulated before one write to the offset table
    #[serde(default = "default_flush_block_lines")]
    pub flush_block_lines: usize,

    /// Upper bound on the bytes decoded for a single line
    #[serde(default = "default_max_line_bytes")]
    pub max_line_bytes: usize,

    /// Compute the full content hash in the background after open
    #[serde(default = "default_verify_full_hash")]
    pub verify_full_hash: bool,

    /// Number of regions sampled by the fast fingerprint
    #[serde(default = "default_fingerprint_samples")]
    pub fingerprint_samples: usize,

    /// Bytes read per sampled region
    #[serde(default = "default_fingerprint_sample_bytes")]
    pub fingerprint_sample_bytes: usize,
}

fn default_cache_max_lines() -> usize {
    2000
}

fn default_read_buffer_size() -> usize {
    8 * 1024 * 1024
}

fn default_flush_block_lines() -> usize {
    32 * 1024
}

fn default_max_line_bytes() -> usize {
    1024 * 1024
}

fn default_verify_full_hash() -> bool {
    true
}

fn default_fingerprint_samples() -> usize {
    16
}

fn default_fingerprint_sample_bytes() -> usize {
    4096
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            index_dir: None,
            cache_max_lines: default_cache_max_lines(),
            cache_max_age_secs: 0,
            cache_keep_purged: 0,
            read_buffer_size: default_read_buffer_size(),
            flush_block_lines: default_flush_block_lines(),
            max_line_bytes: default_max_line_bytes(),
            verify_full_hash: default_verify_full_hash(),
            fingerprint_samples: default_fingerprint_samples(),
            fingerprint_sample_bytes: default_fingerprint_sample_bytes(),
        }
    }
}

impl AppConfig {
    /// Load config from the config directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from an explicit file, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)
                .context("Failed to read config file")?;
            let config: AppConfig = serde_json::from_str(&content)
                .context("Failed to parse config file")?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to `config_path`, creating its directory
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(config_path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Effective index directory (configured or the per-application temp dir)
    pub fn resolved_index_dir(&self) -> PathBuf {
        self.index_dir.clone().unwrap_or_else(default_index_dir)
    }
}

/// Per-application temporary directory holding indexes
pub fn default_index_dir() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine config directory")?;
    let app_dir = base.join(APP_NAME);
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// A persisted index found on disk
#[derive(Debug, Clone)]
pub struct IndexLocation {
    pub source_path: PathBuf,
    pub sidecar_path: PathBuf,
    pub index_path: PathBuf,
}

/// List every index in `index_dir` whose sidecar names its source file
pub fn list_indexed_files(index_dir: &Path) -> Result<Vec<IndexLocation>> {
    if !index_dir.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();

    for entry in fs::read_dir(index_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some(SIDECAR_EXTENSION) {
            continue;
        }

        // Unreadable sidecars are skipped; they are rebuilt on next open
        if let Ok(file) = fs::File::open(&path) {
            if let Ok(meta) = serde_json::from_reader::<_, serde_json::Value>(file) {
                if let Some(source) = meta.get("source_path").and_then(|v| v.as_str()) {
                    found.push(IndexLocation {
                        source_path: PathBuf::from(source),
                        index_path: path.with_extension(INDEX_EXTENSION),
                        sidecar_path: path,
                    });
                }
            }
        }
    }

    found.sort_by(|a, b| a.source_path.cmp(&b.source_path));
    Ok(found)
}

/// Remove every index and sidecar in `index_dir`. Returns the number of files removed.
pub fn clear_indexes(index_dir: &Path) -> Result<usize> {
    if !index_dir.exists() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(index_dir)? {
        let path = entry?.path();
        let ext = path.extension().and_then(|e| e.to_str());
        if ext == Some(INDEX_EXTENSION) || ext == Some(SIDECAR_EXTENSION) {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.cache_max_lines, 2000);
        assert_eq!(config.read_buffer_size, 8 * 1024 * 1024);
        assert!(config.verify_full_hash);
        assert!(config.index_dir.is_none());
    }

    #[test]
    fn test_app_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{"cache_max_lines": 10}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.cache_max_lines, 10);
        assert_eq!(config.flush_block_lines, 32 * 1024);
    }

    #[test]
    fn test_app_config_empty_json() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.fingerprint_samples, 16);
        assert_eq!(config.resolved_index_dir(), default_index_dir());
    }

    #[test]
    fn test_load_from_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("none.json")).unwrap();
        assert_eq!(config.max_line_bytes, 1024 * 1024);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            cache_max_lines: 7,
            index_dir: Some(dir.path().join("idx")),
            ..Default::default()
        };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.cache_max_lines, 7);
        assert_eq!(loaded.resolved_index_dir(), dir.path().join("idx"));
    }

    #[test]
    fn test_load_from_invalid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_list_and_clear_indexes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("abc.hfr-json"),
            r#"{"source_path": "/data/big.log"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("abc.hfr-index"), [0u8; 8]).unwrap();
        fs::write(dir.path().join("junk.hfr-json"), "garbage").unwrap();
        fs::write(dir.path().join("other.txt"), "keep").unwrap();

        let listed = list_indexed_files(dir.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].source_path, PathBuf::from("/data/big.log"));
        assert_eq!(listed[0].index_path, dir.path().join("abc.hfr-index"));

        assert_eq!(clear_indexes(dir.path()).unwrap(), 3);
        assert!(dir.path().join("other.txt").exists());
    }
}
