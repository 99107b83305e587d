use crate::index::fingerprint::normalize_path;
use crate::index::store::{IndexPaths, load_sidecar};
use crate::utils::list_indexed_files;
use anyhow::{Context, Result};
use std::path::Path;

/// Display the persisted index of one source file
pub fn show_stats(index_dir: &Path, source: &Path) -> Result<()> {
    let paths = IndexPaths::for_source(index_dir, source);
    let meta = load_sidecar(&paths.sidecar)
        .with_context(|| format!("Failed to read {}", paths.sidecar.display()))?;

    let Some(meta) = meta else {
        println!("No index for {}", normalize_path(source).display());
        return Ok(());
    };

    println!("Index Statistics");
    println!("================");
    println!();
    println!("Source file:      {}", meta.source_path.display());
    println!("Offset table:     {}", paths.index.display());
    println!("Sidecar:          {}", paths.sidecar.display());
    println!("Index version:    {}", meta.version);
    println!("Rows:             {}", meta.rows);
    println!("Widest line:      {} bytes", meta.cols);
    println!("Encoding:         {:?} ({})", meta.bom, meta.decoder);
    println!("EOL length:       {}", meta.eol_len);
    println!("Source size:      {}", format_size(meta.file_len));

    if let Ok(md) = std::fs::metadata(&paths.index) {
        println!("Index size:       {}", format_size(md.len()));
    }

    println!();
    println!("Fast fingerprint: {}", meta.fast_fingerprint);
    match &meta.full_fingerprint {
        Some(hash) => println!("Full fingerprint: {}", hash),
        None => println!("Full fingerprint: (not computed)"),
    }

    println!();
    println!("Created:          {}", format_timestamp(meta.created_at));
    println!("Updated:          {}", format_timestamp(meta.updated_at));

    Ok(())
}

/// List every source file with a persisted index
pub fn list_indexes(index_dir: &Path) -> Result<()> {
    let indexes = list_indexed_files(index_dir)?;

    if indexes.is_empty() {
        println!("No indexed files found in {}.", index_dir.display());
        return Ok(());
    }

    println!("Indexed Files");
    println!("=============");
    println!();

    for found in indexes {
        let status = if found.source_path.exists() { "" } else { " [missing]" };
        println!("  {}{}", found.source_path.display(), status);
        match load_sidecar(&found.sidecar_path) {
            Ok(Some(meta)) => println!(
                "    {} rows, {:?}, {}",
                meta.rows,
                meta.bom,
                format_size(meta.file_len)
            ),
            _ => println!("    [unreadable sidecar]"),
        }
        println!("    Index: {}", found.index_path.display());
        println!();
    }

    Ok(())
}

/// Format byte size to human readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

fn format_timestamp(ts: u64) -> String {
    use std::time::{Duration, UNIX_EPOCH};
    let datetime = UNIX_EPOCH + Duration::from_secs(ts);
    format!("{:?}", datetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_stats_without_index() {
        let dir = tempfile::tempdir().unwrap();
        show_stats(dir.path(), &dir.path().join("none.txt")).unwrap();
        list_indexes(dir.path()).unwrap();
    }
}
