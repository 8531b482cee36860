//! Durable, cached, fixed-size page I/O plus raw offset I/O into one file.

use crate::cache::LruCache;
use keel_common::{KeelError, Page, PageId, PagerConfig, Result, PAGE_SIZE};
use parking_lot::{Condvar, Mutex};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Mutable pager state guarded by the per-pager lock.
struct PagerState {
    /// Underlying file; taken on close.
    file: Option<File>,
    /// Number of pages currently allocated in the file.
    num_pages: u32,
    /// Head of the free-page list (invalid = empty).
    free_list_id: PageId,
    /// Write-back page cache.
    cache: LruCache,
    closed: bool,
}

struct PagerCore {
    state: Mutex<PagerState>,
    shutdown: Mutex<bool>,
    shutdown_signal: Condvar,
    max_cache_pages: usize,
}

/// A paged file: fixed-size page I/O with an LRU write-back cache, a
/// free-page list threaded through page bodies, and raw byte I/O used by
/// the record log.
///
/// All mutating operations take the single per-pager lock. A background
/// worker flushes dirty pages every `sync_period` until `close` signals
/// shutdown. After `close`, every public call fails with
/// [`KeelError::PagerClosed`]; a second `close` is a no-op.
pub struct Pager {
    core: Arc<PagerCore>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Pager {
    /// Opens (or creates) the file at `path` and starts the periodic sync
    /// worker.
    pub fn open(path: impl AsRef<Path>, config: PagerConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())?;

        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        let core = Arc::new(PagerCore {
            state: Mutex::new(PagerState {
                file: Some(file),
                num_pages,
                free_list_id: PageId::INVALID,
                cache: LruCache::new(),
                closed: false,
            }),
            shutdown: Mutex::new(false),
            shutdown_signal: Condvar::new(),
            max_cache_pages: config.max_cache_pages,
        });

        let worker_core = Arc::clone(&core);
        let period = config.sync_period;
        let handle = std::thread::Builder::new()
            .name("keel-pager-sync".to_string())
            .spawn(move || sync_loop(worker_core, period))?;

        Ok(Self {
            core,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Reads a page, serving it from the cache when possible.
    pub fn read_page(&self, id: PageId) -> Result<Page> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;
        read_page_locked(&mut state, self.core.max_cache_pages, id)
    }

    /// Writes a page into the cache and marks it dirty. The page reaches
    /// disk on flush, eviction, or close.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;
        state.cache.insert(page.clone(), true);
        evict_excess(&mut state, self.core.max_cache_pages)
    }

    /// Allocates a page: pops the free-list head if one exists, otherwise
    /// extends the file by one page. The returned page is all zero.
    pub fn new_page(&self) -> Result<Page> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;

        if state.free_list_id.is_valid() {
            let id = state.free_list_id;
            let mut page = read_page_locked(&mut state, self.core.max_cache_pages, id)?;
            let next = u32::from_le_bytes([page.data[0], page.data[1], page.data[2], page.data[3]]);
            state.free_list_id = PageId(next);
            page.zero();
            return Ok(page);
        }

        let page = Page::new(PageId(state.num_pages));
        // Written through so the file extent always covers allocated ids.
        let file = state.file.as_mut().ok_or(KeelError::PagerClosed)?;
        write_page_to_disk(file, &page)?;
        state.num_pages += 1;
        state.cache.insert(page.clone(), false);
        evict_excess(&mut state, self.core.max_cache_pages)?;

        Ok(page)
    }

    /// Pushes a page onto the free list. The old head is threaded through
    /// the first four bytes of the page body.
    pub fn free_page(&self, id: PageId) -> Result<()> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;

        let mut page = Page::new(id);
        page.data[0..4].copy_from_slice(&state.free_list_id.0.to_le_bytes());
        state.cache.insert(page, true);
        evict_excess(&mut state, self.core.max_cache_pages)?;
        state.free_list_id = id;
        Ok(())
    }

    /// Writes raw bytes at a file offset, bypassing the cache. The data is
    /// synced to durable storage before this returns.
    pub fn write_at_offset(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;
        let file = state.file.as_mut().ok_or(KeelError::PagerClosed)?;

        file.seek(SeekFrom::Start(offset))?;
        write_full(file, data)?;
        file.sync_all()?;
        Ok(())
    }

    /// Reads `size` raw bytes at a file offset, bypassing the cache.
    pub fn read_at_offset(&self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;
        let file = state.file.as_mut().ok_or(KeelError::PagerClosed)?;

        file.seek(SeekFrom::Start(offset))?;
        let mut data = vec![0u8; size];
        let n = read_full(file, &mut data)?;
        if n != size {
            return Err(KeelError::PartialIo {
                expected: size,
                actual: n,
            });
        }
        Ok(data)
    }

    /// Writes all dirty cached pages through to the file and syncs.
    pub fn flush(&self) -> Result<()> {
        self.core.flush()
    }

    /// Stops the sync worker, flushes, and closes the file. Idempotent.
    pub fn close(&self) -> Result<()> {
        if self.core.state.lock().closed {
            return Ok(());
        }

        *self.core.shutdown.lock() = true;
        self.core.shutdown_signal.notify_all();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }

        let mut state = self.core.state.lock();
        if state.closed {
            return Ok(());
        }
        flush_locked(&mut state)?;
        state.file = None;
        state.closed = true;
        Ok(())
    }

    /// Current file size in bytes.
    pub fn size(&self) -> Result<u64> {
        let state = self.core.state.lock();
        ensure_open(&state)?;
        let file = state.file.as_ref().ok_or(KeelError::PagerClosed)?;
        Ok(file.metadata()?.len())
    }

    /// Number of allocated pages.
    pub fn num_pages(&self) -> Result<u32> {
        let state = self.core.state.lock();
        ensure_open(&state)?;
        Ok(state.num_pages)
    }

    /// Head of the free-page list.
    pub fn free_list_id(&self) -> Result<PageId> {
        let state = self.core.state.lock();
        ensure_open(&state)?;
        Ok(state.free_list_id)
    }

    /// Installs the free-list head (used when loading the index meta page).
    pub fn set_free_list_id(&self, id: PageId) -> Result<()> {
        let mut state = self.core.state.lock();
        ensure_open(&state)?;
        state.free_list_id = id;
        Ok(())
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl PagerCore {
    fn flush(&self) -> Result<()> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        flush_locked(&mut state)
    }
}

/// Periodic sync worker: flushes every `period` until shutdown is signaled.
fn sync_loop(core: Arc<PagerCore>, period: Duration) {
    loop {
        {
            let mut stop = core.shutdown.lock();
            if *stop {
                return;
            }
            core.shutdown_signal.wait_for(&mut stop, period);
            if *stop {
                return;
            }
        }
        if let Err(e) = core.flush() {
            tracing::warn!(error = %e, "periodic sync failed");
        }
    }
}

fn ensure_open(state: &PagerState) -> Result<()> {
    if state.closed {
        Err(KeelError::PagerClosed)
    } else {
        Ok(())
    }
}

fn read_page_locked(state: &mut PagerState, max_cache_pages: usize, id: PageId) -> Result<Page> {
    if let Some(frame) = state.cache.get(id) {
        return Ok(frame.page.clone());
    }

    if id.0 >= state.num_pages {
        return Err(KeelError::PageOutOfRange { page_id: id.0 });
    }

    let file = state.file.as_mut().ok_or(KeelError::PagerClosed)?;
    let page = read_page_from_disk(file, id)?;
    state.cache.insert(page.clone(), false);
    evict_excess(state, max_cache_pages)?;

    Ok(page)
}

/// Evicts least-recently-used frames until the cache is within bounds,
/// flushing dirty victims first.
fn evict_excess(state: &mut PagerState, max_cache_pages: usize) -> Result<()> {
    while state.cache.len() > max_cache_pages {
        let Some(frame) = state.cache.pop_lru() else {
            break;
        };
        if frame.dirty {
            let file = state.file.as_mut().ok_or(KeelError::PagerClosed)?;
            write_page_to_disk(file, &frame.page)?;
        }
    }
    Ok(())
}

fn flush_locked(state: &mut PagerState) -> Result<()> {
    let PagerState { file, cache, .. } = state;
    let file = file.as_mut().ok_or(KeelError::PagerClosed)?;

    for frame in cache.frames_mut() {
        if frame.dirty {
            write_page_to_disk(file, &frame.page)?;
            frame.dirty = false;
        }
    }
    file.sync_all()?;
    Ok(())
}

fn read_page_from_disk(file: &mut File, id: PageId) -> Result<Page> {
    file.seek(SeekFrom::Start(id.file_offset()))?;
    let mut page = Page::new(id);
    let n = read_full(file, &mut page.data[..])?;
    if n != PAGE_SIZE {
        return Err(KeelError::PartialIo {
            expected: PAGE_SIZE,
            actual: n,
        });
    }
    Ok(page)
}

fn write_page_to_disk(file: &mut File, page: &Page) -> Result<()> {
    file.seek(SeekFrom::Start(page.id.file_offset()))?;
    write_full(file, &page.data[..])
}

/// Reads until the buffer is full or EOF; returns the number of bytes read.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Writes the whole buffer, surfacing a short write as `PartialIo`.
fn write_full(file: &mut File, buf: &[u8]) -> Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match file.write(&buf[written..]) {
            Ok(0) => {
                return Err(KeelError::PartialIo {
                    expected: buf.len(),
                    actual: written,
                })
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
