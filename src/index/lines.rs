//! The line index façade.
//!
//! [`LineIndex::open`] returns as soon as the source file is open; a worker
//! thread then validates the persisted index or rebuilds it, and finally
//! checks the full content hash. Lines can be read at any point: rows that
//! are already indexed are served while the rest of the file is still being
//! scanned.

use crate::cache::{CacheStats, RecencyCache};
use crate::error::{HfrError, Result};
use crate::events::{EventChannel, keys};
use crate::index::builder::{IndexBuilder, LiveCounters};
use crate::index::fingerprint::{fast_fingerprint, full_fingerprint, normalize_path};
use crate::index::sniff::sniff;
use crate::index::store::{self, Expected, IndexPaths, IndexStore};
use crate::index::types::{BomKind, INDEX_VERSION, IndexMeta, LineIndexConfig, LineLookup, LoadState};
use crate::search::{self, LineSource, SearchHandle, SearchRequest};
use crate::utils::io::read_full_at;
use log::{debug, error, info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// One open file
struct Session {
    path: PathBuf,
    source: File,
    paths: IndexPaths,
    /// Installed once the worker has a valid or in-progress table
    store: RwLock<Option<IndexStore>>,
    cancel: AtomicBool,
}

impl Session {
    fn table(&self) -> RwLockReadGuard<'_, Option<IndexStore>> {
        self.store.read().unwrap_or_else(|e| e.into_inner())
    }

    fn install(&self, table: IndexStore) {
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = Some(table);
    }

    /// Close the table (and its mapping) so the file can be removed
    fn release(&self) {
        self.store.write().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// State shared between the caller, the load worker and searches
struct Shared {
    config: LineIndexConfig,
    events: Arc<EventChannel>,
    counters: LiveCounters,
    cache: RecencyCache<u64, String>,
    state: AtomicU8,
    loaded: AtomicBool,
    file_len: AtomicU64,
    session: RwLock<Option<Arc<Session>>>,
}

/// Random-access view of one huge text file
pub struct LineIndex {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    search: Mutex<Option<SearchHandle>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Shared {
    fn session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_session(&self, session: Option<Arc<Session>>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    fn state(&self) -> LoadState {
        LoadState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LoadState) {
        self.state.store(state as u8, Ordering::Release);
        self.events.publish(keys::LINES_STATE, state.as_str());
    }

    fn status(&self, message: &str) {
        self.events.publish(keys::LINES_STATUS, message);
    }

    /// Forget everything about the current file
    fn reset(&self) {
        self.set_session(None);
        self.cache.clear();
        self.counters.reset();
        self.loaded.store(false, Ordering::Release);
        self.file_len.store(0, Ordering::Release);
    }

    fn fetch(&self, row: i64) -> Result<LineLookup> {
        let Some(session) = self.session() else {
            return Ok(LineLookup::NotOpen);
        };
        let file_len = self.file_len.load(Ordering::Acquire);
        let Ok(row) = u64::try_from(row) else {
            return Ok(LineLookup::NotOpen);
        };
        if file_len == 0 {
            return Ok(LineLookup::NotOpen);
        }

        let loaded = self.loaded.load(Ordering::Acquire);
        let rows = self.counters.rows();
        if row >= rows {
            return Ok(if loaded {
                LineLookup::OutOfRange
            } else {
                LineLookup::NotYetAvailable
            });
        }

        if let Some(text) = self.cache.get(&row) {
            return Ok(LineLookup::Text(text));
        }

        match self.read_uncached(&session, row, rows, file_len, loaded)? {
            Some(text) => {
                self.cache.put(row, text.clone())?;
                Ok(LineLookup::Text(text))
            }
            None => Ok(LineLookup::NotYetAvailable),
        }
    }

    fn read_uncached(
        &self,
        session: &Session,
        row: u64,
        rows: u64,
        file_len: u64,
        loaded: bool,
    ) -> Result<Option<String>> {
        let table = session.table();
        let Some(store) = table.as_ref() else {
            return Ok(None);
        };
        let Some(start) = store.read_offset(row)? else {
            return Ok(None);
        };

        let bom = self.counters.bom();
        let end = if row + 1 < rows {
            store.read_offset(row + 1)?.unwrap_or(file_len)
        } else if loaded {
            file_len
        } else {
            // Next offset not flushed yet: no line is wider than cols
            start + self.counters.cols() as u64 + self.counters.eol_len() as u64
        }
        .min(file_len);

        let mut len = (end.saturating_sub(start) as usize).min(self.config.max_line_bytes);
        if bom.unit_len() == 2 {
            len &= !1;
        }
        let mut buf = vec![0u8; len];
        let n = read_full_at(&session.source, &mut buf, start)?;

        let (text, _) = bom.encoding().decode_without_bom_handling(&buf[..n]);
        let line = match text.find(['\r', '\n']) {
            Some(cut) => &text[..cut],
            None => &text[..],
        };
        Ok(Some(line.trim_end().to_string()))
    }

    /// Worker body: validate or build, then verify the full hash
    fn run(&self, session: Arc<Session>, started: Instant) {
        let meta = match self.load(&session) {
            Ok(meta) => meta,
            Err(e) => {
                self.fail(&session, e);
                return;
            }
        };

        self.loaded.store(true, Ordering::Release);
        let elapsed = started.elapsed();
        info!(
            "Loaded {} ({} rows, {} cols) in {:.2?}",
            session.path.display(),
            meta.rows,
            meta.cols,
            elapsed
        );
        self.events.publish(keys::LINES_ROWS, meta.rows as i64);
        self.events.publish(keys::LINES_PROGRESS, 1000i64);
        self.events.publish(keys::LINES_LOADED, true);
        self.events.publish(keys::LINES_ELAPSED, elapsed);
        self.status("Ready.");
        self.set_state(LoadState::Ready);

        if self.config.verify_full_hash && meta.file_len > 0 {
            self.verify(&session, meta);
        }
    }

    fn load(&self, session: &Session) -> Result<IndexMeta> {
        let metadata = session.source.metadata()?;
        let file_len = metadata.len();
        self.file_len.store(file_len, Ordering::Release);

        self.set_state(LoadState::ValidatingExistingIndex);
        self.status("Checking index file.");
        let fast = fast_fingerprint(
            &session.source,
            file_len,
            metadata.modified().ok(),
            self.config.fingerprint,
        )?;

        match self.validate(session, file_len, &fast) {
            Ok(Some(meta)) => return Ok(meta),
            Ok(None) => debug!("No index for {}", session.path.display()),
            Err(HfrError::CorruptIndex(reason)) => {
                info!("Discarding stale index for {}: {}", session.path.display(), reason);
            }
            Err(HfrError::Sidecar(e)) => {
                info!("Discarding unreadable sidecar for {}: {}", session.path.display(), e);
            }
            Err(e) => return Err(e),
        }
        session.paths.delete()?;

        self.set_state(LoadState::BuildingIndex);
        self.status("Building index.");
        self.build(session, file_len, fast)
    }

    /// `Ok(None)` when there is nothing to validate
    fn validate(&self, session: &Session, file_len: u64, fast: &str) -> Result<Option<IndexMeta>> {
        let Some(meta) = store::load_sidecar(&session.paths.sidecar)? else {
            return Ok(None);
        };
        if !session.paths.index.exists() {
            return Err(HfrError::CorruptIndex("offset table missing".into()));
        }

        // Same first block the builder sniffs
        let mut first = vec![0u8; self.config.read_buffer_size.min(file_len as usize)];
        let n = read_full_at(&session.source, &mut first, 0)?;
        let bom = sniff(&first[..n]).bom;

        let table = IndexStore::open_or_create(session.paths.clone())?;
        let expected = Expected {
            file_len,
            fast_fingerprint: fast,
            bom,
        };
        store::validate(&meta, &expected, table.byte_len()?)?;

        table.seal()?;
        table.check_contents(meta.rows, meta.bom, file_len)?;
        self.counters.load(meta.rows, meta.cols, meta.bom, meta.eol_len);
        session.install(table);
        debug!("Reusing index {}", session.paths.index.display());
        Ok(Some(meta))
    }

    fn build(&self, session: &Session, file_len: u64, fast: String) -> Result<IndexMeta> {
        session.install(IndexStore::create(session.paths.clone())?);
        let installed = session.table();
        let table = installed
            .as_ref()
            .ok_or_else(|| HfrError::Invariant("offset table not installed".into()))?;

        let summary = IndexBuilder::new(&session.source, table, &self.counters, &session.cancel)
            .read_buffer_size(self.config.read_buffer_size)
            .flush_block_lines(self.config.flush_block_lines)
            .build(file_len, |permille| {
                self.events.publish(keys::LINES_PROGRESS, permille as i64);
                self.events.publish(keys::LINES_ROWS, self.counters.rows() as i64);
            })?;
        table.seal()?;

        let now = now_secs();
        let meta = IndexMeta {
            version: INDEX_VERSION,
            source_path: normalize_path(&session.path),
            rows: summary.rows,
            cols: summary.cols,
            bom: summary.sniffed.bom,
            decoder: summary.sniffed.bom.decoder_name().to_string(),
            eol_len: summary.sniffed.eol_len,
            file_len,
            fast_fingerprint: fast,
            full_fingerprint: None,
            created_at: now,
            updated_at: now,
        };
        store::save_sidecar(&session.paths.sidecar, &meta)?;
        Ok(meta)
    }

    /// Compare the full content hash with the stored one, or store it
    fn verify(&self, session: &Session, mut meta: IndexMeta) {
        let actual = match full_fingerprint(&session.source, &session.cancel) {
            Ok(hash) => hash,
            Err(e) if e.is_cancelled() => {
                debug!("Full hash of {} cancelled", session.path.display());
                return;
            }
            Err(e) => {
                warn!("Full hash of {} failed: {}", session.path.display(), e);
                return;
            }
        };

        match meta.full_fingerprint.take() {
            None => {
                meta.full_fingerprint = Some(actual);
                meta.updated_at = now_secs();
                if let Err(e) = store::save_sidecar(&session.paths.sidecar, &meta) {
                    warn!("Could not store full hash for {}: {}", session.path.display(), e);
                }
            }
            Some(expected) if expected == actual => {
                debug!("Full hash of {} verified", session.path.display());
            }
            Some(expected) => {
                warn!("Content of {} changed since it was indexed", session.path.display());
                self.fail(
                    session,
                    HfrError::IntegrityMismatch {
                        path: session.path.clone(),
                        expected,
                        actual,
                    },
                );
            }
        }
    }

    /// Tear the session down after a failed or cancelled load
    fn fail(&self, session: &Session, err: HfrError) {
        self.reset();
        session.release();
        if let Err(e) = session.paths.delete() {
            warn!("Could not remove index files of {}: {}", session.path.display(), e);
        }
        self.events.publish(keys::LINES_LOADED, false);
        self.events.publish(keys::LINES_ROWS, 0i64);

        if err.is_cancelled() {
            info!("Loading {} cancelled", session.path.display());
            self.events.publish(keys::LINES_REASON, "Loading cancelled.");
            self.status("Cancelled.");
            self.set_state(LoadState::Cancelled);
        } else {
            error!("Loading {} failed: {}", session.path.display(), err);
            self.events.publish(keys::LINES_REASON, err.to_string());
            self.status(&err.to_string());
            self.events.publish(keys::LINES_ERROR, err);
            self.set_state(LoadState::Error);
        }
    }
}

impl LineSource for Shared {
    fn rows(&self) -> u64 {
        self.counters.rows()
    }

    fn read_line(&self, row: u64) -> Result<Option<String>> {
        let row = i64::try_from(row).unwrap_or(i64::MAX);
        Ok(match self.fetch(row)? {
            LineLookup::Text(text) => Some(text),
            _ => None,
        })
    }
}

impl LineIndex {
    pub fn new(config: LineIndexConfig) -> Self {
        Self::with_events(config, Arc::new(EventChannel::new()))
    }

    /// Publish into an existing channel
    pub fn with_events(config: LineIndexConfig, events: Arc<EventChannel>) -> Self {
        let cache = RecencyCache::new(config.cache);
        Self {
            shared: Arc::new(Shared {
                config,
                events,
                counters: LiveCounters::default(),
                cache,
                state: AtomicU8::new(LoadState::Idle as u8),
                loaded: AtomicBool::new(false),
                file_len: AtomicU64::new(0),
                session: RwLock::new(None),
            }),
            worker: Mutex::new(None),
            search: Mutex::new(None),
        }
    }

    pub fn events(&self) -> &Arc<EventChannel> {
        &self.shared.events
    }

    pub fn config(&self) -> &LineIndexConfig {
        &self.shared.config
    }

    /// Open `path`, closing whatever was open before.
    ///
    /// Only a missing or unreadable file fails here; everything else is
    /// reported through the event channel.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.close();
        let started = Instant::now();

        self.shared.events.publish(keys::LINES_FILE, path.display().to_string());
        self.shared.events.publish(keys::LINES_LOADED, false);
        self.shared.set_state(LoadState::Opening);
        self.shared.status("Opening file.");

        let source = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                let err = if e.kind() == std::io::ErrorKind::NotFound {
                    HfrError::NotFound(path.to_path_buf())
                } else {
                    HfrError::Io(e)
                };
                warn!("Cannot open {}: {}", path.display(), err);
                self.shared.events.publish(keys::LINES_REASON, err.to_string());
                self.shared.events.publish(keys::LINES_ERROR, err.duplicate());
                self.shared.set_state(LoadState::Error);
                return Err(err);
            }
        };

        if let Ok(metadata) = source.metadata() {
            self.shared.file_len.store(metadata.len(), Ordering::Release);
        }
        let session = Arc::new(Session {
            path: path.to_path_buf(),
            source,
            paths: IndexPaths::for_source(&self.shared.config.index_dir, path),
            store: RwLock::new(None),
            cancel: AtomicBool::new(false),
        });
        self.shared.set_session(Some(Arc::clone(&session)));

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("hfr-index".into())
            .spawn(move || shared.run(session, started))?;
        *lock(&self.worker) = Some(handle);
        Ok(())
    }

    /// Cancel the build (or full hash check) in flight and wait for the worker
    pub fn stop_load(&self) {
        if let Some(session) = self.shared.session() {
            session.cancel.store(true, Ordering::Release);
        }
        self.join_worker();
    }

    /// Stop everything and release the file handles
    pub fn close(&self) {
        self.stop_search();
        self.stop_load();
        self.shared.reset();
        self.shared.state.store(LoadState::Idle as u8, Ordering::Release);
    }

    /// Wait until the worker (load and full hash check) is done
    pub fn wait(&self) {
        self.join_worker();
    }

    fn join_worker(&self) {
        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Index worker panicked");
            }
        }
    }

    /// Poll until loading leaves its in-progress states or `timeout` passes
    pub fn wait_for_load(&self, timeout: Duration) -> LoadState {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.state();
            if !state.is_in_progress() || Instant::now() >= deadline {
                return state;
            }
            thread::sleep(Duration::from_millis(2));
        }
    }

    pub fn state(&self) -> LoadState {
        self.shared.state()
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_in_progress()
    }

    /// True once the row count is final
    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::Acquire)
    }

    /// Path of the open file
    pub fn path(&self) -> Option<PathBuf> {
        self.shared.session().map(|s| s.path.clone())
    }

    /// Rows indexed so far
    pub fn rows(&self) -> u64 {
        self.shared.counters.rows()
    }

    /// Widest line seen so far, in bytes
    pub fn cols(&self) -> u32 {
        self.shared.counters.cols()
    }

    pub fn bom(&self) -> BomKind {
        self.shared.counters.bom()
    }

    pub fn eol_len(&self) -> u8 {
        self.shared.counters.eol_len()
    }

    pub fn file_len(&self) -> u64 {
        self.shared.file_len.load(Ordering::Acquire)
    }

    /// Look up `row`, telling apart the reasons no text is available
    pub fn fetch(&self, row: i64) -> Result<LineLookup> {
        self.shared.fetch(row)
    }

    /// Right-trimmed text of `row`.
    ///
    /// `None` when no file is open, the row is negative or not indexed yet;
    /// an empty string past the end of a fully loaded file. Read failures
    /// degrade to `None`.
    pub fn line(&self, row: i64) -> Option<String> {
        match self.fetch(row) {
            Ok(lookup) => lookup.into_line(),
            Err(e) => {
                warn!("Reading row {} failed: {}", row, e);
                None
            }
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    pub fn cached_lines(&self) -> usize {
        self.shared.cache.len()
    }

    /// Start a background search, replacing any running one
    pub fn start_search(
        &self,
        row: i64,
        col: u32,
        needle: &str,
        case_sensitive: bool,
        forward: bool,
    ) -> Result<()> {
        self.stop_search();
        let source: Arc<dyn LineSource> = self.shared.clone();
        let handle = search::start(
            source,
            Arc::clone(&self.shared.events),
            SearchRequest {
                row,
                col,
                needle: needle.to_string(),
                case_sensitive,
                forward,
            },
        )?;
        *lock(&self.search) = Some(handle);
        Ok(())
    }

    /// Cancel the running search and wait for it
    pub fn stop_search(&self) {
        let handle = lock(&self.search).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.stop() {
                warn!("Search ended with an error: {}", e);
            }
        }
    }

    pub fn is_searching(&self) -> bool {
        lock(&self.search)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Wait for the running search and return its outcome
    pub fn wait_search(&self) -> Result<Option<search::SearchOutcome>> {
        let handle = lock(&self.search).take();
        handle.map(SearchHandle::join).transpose()
    }
}

impl Drop for LineIndex {
    fn drop(&mut self) {
        self.close();
    }
}
