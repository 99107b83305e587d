use crate::error::{HfrError, Result};
use crate::index::sniff::{Sniffed, sniff};
use crate::index::store::IndexStore;
use crate::index::types::BomKind;
use crate::utils::io::read_full_at;
use log::debug;
use memchr::memchr_iter;
use std::fs::File;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};

/// Bytes scanned between cancellation checks when no terminator is hit.
/// Bounds cancellation latency on long terminator-free runs.
const CANCEL_STRIDE: usize = 64 * 1024;

/// Counters the builder publishes while it runs.
///
/// Readers on other threads see monotonically increasing snapshots.
#[derive(Debug, Default)]
pub struct LiveCounters {
    rows: AtomicU64,
    cols: AtomicU32,
    bom: AtomicU8,
    eol_len: AtomicU8,
}

impl LiveCounters {
    pub fn reset(&self) {
        self.rows.store(0, Ordering::Release);
        self.cols.store(0, Ordering::Release);
        self.bom.store(BomKind::Ansi as u8, Ordering::Release);
        self.eol_len.store(0, Ordering::Release);
    }

    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Acquire)
    }

    pub fn cols(&self) -> u32 {
        self.cols.load(Ordering::Acquire)
    }

    pub fn bom(&self) -> BomKind {
        BomKind::from_u8(self.bom.load(Ordering::Acquire))
    }

    pub fn eol_len(&self) -> u8 {
        self.eol_len.load(Ordering::Acquire)
    }

    /// Install the values of a validated index in one go
    pub fn load(&self, rows: u64, cols: u32, bom: BomKind, eol_len: u8) {
        self.bom.store(bom as u8, Ordering::Release);
        self.eol_len.store(eol_len, Ordering::Release);
        self.cols.store(cols, Ordering::Release);
        self.rows.store(rows, Ordering::Release);
    }

    fn set_encoding(&self, bom: BomKind, eol_len: u8) {
        self.bom.store(bom as u8, Ordering::Release);
        self.eol_len.store(eol_len, Ordering::Release);
    }

    fn record_width(&self, width: u64) {
        let width = u32::try_from(width).unwrap_or(u32::MAX);
        self.cols.fetch_max(width, Ordering::AcqRel);
    }

    fn add_rows(&self, n: u64) {
        self.rows.fetch_add(n, Ordering::AcqRel);
    }
}

/// Outcome of a completed build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub rows: u64,
    pub cols: u32,
    pub sniffed: Sniffed,
    pub file_len: u64,
}

/// Single sequential pass over a source file producing its offset table
pub struct IndexBuilder<'a> {
    source: &'a File,
    store: &'a IndexStore,
    counters: &'a LiveCounters,
    cancel: &'a AtomicBool,
    read_buffer_size: usize,
    flush_block_lines: usize,
}

/// Mutable state of one pass
struct Pass<'b> {
    store: &'b IndexStore,
    counters: &'b LiveCounters,
    pending: Vec<u64>,
    flushed: u64,
    line_start: u64,
    unit: u64,
    eol_len: u64,
    flush_block_lines: usize,
}

impl Pass<'_> {
    /// A terminator code unit starts at absolute offset `pos`
    fn terminator_at(&mut self, pos: u64) -> Result<()> {
        let next = pos + self.unit;
        if pos < self.line_start {
            // second half of the BOM or an already consumed unit
            return Ok(());
        }
        self.pending.push(self.line_start);
        self.counters
            .record_width((next - self.line_start).saturating_sub(self.eol_len));
        self.line_start = next;

        if self.pending.len() >= self.flush_block_lines {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.store.write_block(&self.pending, self.flushed)?;
        let n = self.pending.len() as u64;
        self.flushed += n;
        self.counters.add_rows(n);
        debug!("Flushed {} offsets ({} rows total)", n, self.flushed);
        self.pending.clear();
        Ok(())
    }
}

impl<'a> IndexBuilder<'a> {
    pub fn new(
        source: &'a File,
        store: &'a IndexStore,
        counters: &'a LiveCounters,
        cancel: &'a AtomicBool,
    ) -> Self {
        Self {
            source,
            store,
            counters,
            cancel,
            read_buffer_size: 8 * 1024 * 1024,
            flush_block_lines: 32 * 1024,
        }
    }

    /// Size of each sequential read. Rounded up to an even number.
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = (size.max(2) + 1) & !1;
        self
    }

    pub fn flush_block_lines(mut self, lines: usize) -> Self {
        self.flush_block_lines = lines.max(1);
        self
    }

    fn check_cancel(&self) -> Result<()> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(HfrError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Index `file_len` bytes of the source.
    ///
    /// `on_progress` receives permille values, only when they change.
    /// On error or cancellation the table holds a partial result the caller must discard.
    pub fn build<F: FnMut(u32)>(&self, file_len: u64, mut on_progress: F) -> Result<BuildSummary> {
        self.counters.reset();

        let mut buf = vec![0u8; self.read_buffer_size];
        let mut n = read_full_at(self.source, &mut buf, 0)?;
        let sniffed = sniff(&buf[..n]);
        self.counters.set_encoding(sniffed.bom, sniffed.eol_len);
        debug!(
            "Detected {:?}, terminator {:?}, eol length {}",
            sniffed.bom, sniffed.terminator, sniffed.eol_len
        );

        let mut pass = Pass {
            store: self.store,
            counters: self.counters,
            pending: Vec::with_capacity(self.flush_block_lines.min(1 << 20)),
            flushed: 0,
            line_start: sniffed.content_start,
            unit: sniffed.unit_len() as u64,
            eol_len: sniffed.eol_len as u64,
            flush_block_lines: self.flush_block_lines,
        };

        let mut pos = 0u64;
        let mut last_permille = None;

        while n > 0 {
            let block = &buf[..n];
            if let Some(terminator) = sniffed.terminator {
                self.scan_block(block, pos, terminator, sniffed.bom, &mut pass)?;
            } else {
                self.check_cancel()?;
            }

            pos += n as u64;
            let permille = permille(pos, file_len);
            if last_permille != Some(permille) {
                last_permille = Some(permille);
                on_progress(permille);
            }

            if pos >= file_len {
                break;
            }
            n = read_full_at(self.source, &mut buf, pos)?;
        }

        if pos != file_len {
            return Err(HfrError::CorruptIndex(format!(
                "source changed during build: read {} of {} bytes",
                pos, file_len
            )));
        }

        // Trailing content without a terminator is the last row
        if pass.line_start < file_len {
            pass.pending.push(pass.line_start);
            self.counters.record_width(file_len - pass.line_start);
        }
        pass.flush()?;

        Ok(BuildSummary {
            rows: pass.flushed,
            cols: self.counters.cols(),
            sniffed,
            file_len,
        })
    }

    fn scan_block(
        &self,
        block: &[u8],
        pos: u64,
        terminator: u8,
        bom: BomKind,
        pass: &mut Pass<'_>,
    ) -> Result<()> {
        for (chunk_no, chunk) in block.chunks(CANCEL_STRIDE).enumerate() {
            self.check_cancel()?;
            let base = pos + (chunk_no * CANCEL_STRIDE) as u64;

            match bom {
                BomKind::Ansi | BomKind::Utf8 => {
                    for i in memchr_iter(terminator, chunk) {
                        self.check_cancel()?;
                        pass.terminator_at(base + i as u64)?;
                    }
                }
                BomKind::Utf16Le | BomKind::Utf16Be => {
                    // Block and stride sizes are even, so offsets stay unit aligned
                    for (i, unit) in chunk.chunks_exact(2).enumerate() {
                        let hit = match bom {
                            BomKind::Utf16Le => unit[0] == terminator && unit[1] == 0,
                            _ => unit[0] == 0 && unit[1] == terminator,
                        };
                        if hit {
                            self.check_cancel()?;
                            pass.terminator_at(base + (i * 2) as u64)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn permille(done: u64, total: u64) -> u32 {
    if total == 0 {
        return 1000;
    }
    ((done.min(total) as u128 * 1000) / total as u128) as u32
}
