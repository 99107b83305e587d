//! Persistence of the line offset table and its sidecar record.
//!
//! Layout in the index directory, both named by the path key:
//!
//! - `<key>.hfr-index` - flat little-endian u64 offsets, one per row
//! - `<key>.hfr-json` - [`IndexMeta`] as JSON

use crate::error::{HfrError, Result};
use crate::index::fingerprint::path_key;
use crate::index::types::{BomKind, INDEX_VERSION, IndexMeta};
use crate::utils::encoding::{OFFSET_WIDTH, decode_offset_at, encode_offsets};
use crate::utils::io::{read_full_at, write_all_at};
use crate::utils::{INDEX_EXTENSION, SIDECAR_EXTENSION};
use log::debug;
use memmap2::Mmap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Neighbouring row pairs compared by [`IndexStore::check_contents`]
const CHECK_SAMPLES: u64 = 64;

/// Locations of the two files belonging to one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub index: PathBuf,
    pub sidecar: PathBuf,
}

impl IndexPaths {
    pub fn for_source(index_dir: &Path, source: &Path) -> Self {
        let key = path_key(source);
        Self {
            index: index_dir.join(format!("{}.{}", key, INDEX_EXTENSION)),
            sidecar: index_dir.join(format!("{}.{}", key, SIDECAR_EXTENSION)),
        }
    }

    /// Remove both files, sidecar first. Missing files are not an error.
    ///
    /// Both removals are attempted; the first failure is returned.
    pub fn delete(&self) -> Result<()> {
        let mut first_err = None;
        for path in [&self.sidecar, &self.index] {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Could not remove {}: {}", path.display(), e);
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn exists(&self) -> bool {
        self.index.exists() && self.sidecar.exists()
    }
}

/// What the current source file looks like, checked against a stored sidecar
#[derive(Debug, Clone)]
pub struct Expected<'a> {
    pub file_len: u64,
    pub fast_fingerprint: &'a str,
    pub bom: BomKind,
}

/// Read a sidecar. `Ok(None)` when it does not exist.
pub fn load_sidecar(path: &Path) -> Result<Option<IndexMeta>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta = serde_json::from_reader(BufReader::new(file))?;
    Ok(Some(meta))
}

/// Write a sidecar through a temporary file so readers never see a partial record
pub fn save_sidecar(path: &Path, meta: &IndexMeta) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("{}.tmp", SIDECAR_EXTENSION));
    {
        let file = File::create(&tmp)?;
        serde_json::to_writer_pretty(BufWriter::new(file), meta)?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Check a stored sidecar and offset table against the current source file
pub fn validate(meta: &IndexMeta, expected: &Expected<'_>, index_len: u64) -> Result<()> {
    if meta.version != INDEX_VERSION {
        return Err(HfrError::CorruptIndex(format!(
            "version {} (expected {})",
            meta.version, INDEX_VERSION
        )));
    }
    if meta.file_len != expected.file_len {
        return Err(HfrError::CorruptIndex(format!(
            "file length changed from {} to {}",
            meta.file_len, expected.file_len
        )));
    }
    if meta.fast_fingerprint != expected.fast_fingerprint {
        return Err(HfrError::CorruptIndex("fast fingerprint mismatch".into()));
    }
    if meta.bom != expected.bom || meta.decoder != expected.bom.decoder_name() {
        return Err(HfrError::CorruptIndex(format!(
            "decoder {} does not match detected {}",
            meta.decoder,
            expected.bom.decoder_name()
        )));
    }
    let table_len = meta.rows.checked_mul(OFFSET_WIDTH as u64);
    if table_len != Some(index_len) {
        return Err(HfrError::CorruptIndex(format!(
            "offset table holds {} bytes for {} rows",
            index_len, meta.rows
        )));
    }
    Ok(())
}

/// The offset table of one source file
pub struct IndexStore {
    paths: IndexPaths,
    file: File,
    /// Read-only mapping installed once the table is complete
    sealed: OnceLock<Mmap>,
}

impl IndexStore {
    /// Create (or truncate) the offset table
    pub fn create(paths: IndexPaths) -> Result<Self> {
        if let Some(parent) = paths.index.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&paths.index)?;
        Ok(Self {
            paths,
            file,
            sealed: OnceLock::new(),
        })
    }

    /// Open an existing table, or create an empty one
    pub fn open_or_create(paths: IndexPaths) -> Result<Self> {
        if let Some(parent) = paths.index.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&paths.index)?;
        Ok(Self {
            paths,
            file,
            sealed: OnceLock::new(),
        })
    }

    pub fn paths(&self) -> &IndexPaths {
        &self.paths
    }

    /// Byte length of the table on disk
    pub fn byte_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Write `offsets` as rows `start_row..start_row + offsets.len()`
    pub fn write_block(&self, offsets: &[u64], start_row: u64) -> Result<()> {
        if offsets.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(offsets.len() * OFFSET_WIDTH);
        encode_offsets(offsets, &mut buf);
        write_all_at(&self.file, &buf, start_row * OFFSET_WIDTH as u64)?;
        Ok(())
    }

    /// Spot-check the contents of a complete table.
    ///
    /// Row 0 must start right after the BOM, the last row must start inside
    /// the file and sampled neighbours must be strictly increasing.
    pub fn check_contents(&self, rows: u64, bom: BomKind, file_len: u64) -> Result<()> {
        if rows == 0 {
            return Ok(());
        }
        let offset = |row: u64| -> Result<u64> {
            self.read_offset(row)?
                .ok_or_else(|| HfrError::CorruptIndex(format!("row {} missing from table", row)))
        };

        let first = offset(0)?;
        if first != bom.bom_len() {
            return Err(HfrError::CorruptIndex(format!(
                "row 0 starts at {} (expected {})",
                first,
                bom.bom_len()
            )));
        }
        let last = offset(rows - 1)?;
        if last >= file_len {
            return Err(HfrError::CorruptIndex(format!(
                "row {} starts at {} past the end of a {} byte file",
                rows - 1,
                last,
                file_len
            )));
        }

        let step = (rows / CHECK_SAMPLES).max(1);
        let mut row = 0;
        while row + 1 < rows {
            let (a, b) = (offset(row)?, offset(row + 1)?);
            if a >= b {
                return Err(HfrError::CorruptIndex(format!(
                    "rows {} and {} are out of order ({} >= {})",
                    row,
                    row + 1,
                    a,
                    b
                )));
            }
            row += step;
        }
        Ok(())
    }

    /// Offset of `row`, or `None` if the table does not hold it (yet)
    pub fn read_offset(&self, row: u64) -> Result<Option<u64>> {
        if let Some(map) = self.sealed.get() {
            return Ok(decode_offset_at(map, row));
        }

        let Some(pos) = row.checked_mul(OFFSET_WIDTH as u64) else {
            return Ok(None);
        };
        let mut buf = [0u8; OFFSET_WIDTH];
        let n = read_full_at(&self.file, &mut buf, pos)?;
        if n < OFFSET_WIDTH {
            return Ok(None);
        }
        Ok(Some(u64::from_le_bytes(buf)))
    }

    /// Flush to disk and switch lookups to a memory map
    pub fn seal(&self) -> Result<()> {
        self.file.sync_data()?;
        if self.byte_len()? == 0 || self.sealed.get().is_some() {
            return Ok(());
        }
        // The table is never written again once sealed
        let map = unsafe { Mmap::map(&self.file)? };
        let _ = self.sealed.set(map);
        debug!("Sealed offset table {}", self.paths.index.display());
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }
}
