//! The storage engine facade.
//!
//! A [`StorageEngine`] ties the layers together: the page cache over
//! the data file, the write-ahead log, the free-space index, and a
//! reference-counted cache of [`DataItem`]s keyed by uid. All mutation
//! is logged before it touches a page, so recovery can always redo or
//! undo from the log alone.

use std::path::Path;
use std::sync::Arc;

use crate::buffer::page_cache::PageCache;
use crate::buffer::ref_cache::{Backing, RefCache};
use crate::common::{Error, Result, Uid, Xid};
use crate::concurrency::txn_table::TxnTable;
use crate::recovery::log_record::LogRecord;
use crate::recovery::recover::recover;
use crate::recovery::wal::Wal;
use crate::storage::data_item::{DataItem, ItemUpdate};
use crate::storage::free_space::FreeSpaceIndex;
use crate::storage::page::Page;
use crate::storage::{page_one, page_x};

/// Data file name within the engine directory.
pub const DATA_FILE: &str = "data.db";
/// Write-ahead log file name within the engine directory.
pub const LOG_FILE: &str = "data.log";

/// How many times an insert retries page selection before giving up.
const INSERT_RETRIES: usize = 5;

/// Loads [`DataItem`]s through the page cache. Each resident item pins
/// its page; evicting the item unpins it.
struct ItemStore {
    pages: Arc<PageCache>,
}

impl Backing for ItemStore {
    type Value = Arc<DataItem>;

    fn fetch(&self, key: u64) -> Result<Arc<DataItem>> {
        let uid = Uid(key);
        // A page number past the end of the file means the uid names
        // nothing, the same as an offset past the page's records.
        let page = match self.pages.get_page(uid.page_no()) {
            Ok(page) => page,
            Err(Error::PageNotFound(_)) => return Err(Error::RecordAbsent(uid)),
            Err(e) => return Err(e),
        };
        match DataItem::parse(Arc::clone(&page), uid) {
            Ok(item) => Ok(Arc::new(item)),
            Err(e) => {
                self.pages.release_page(&page);
                Err(e)
            }
        }
    }

    fn evict(&self, item: &Arc<DataItem>) {
        self.pages.release_page(item.page());
    }
}

/// A single-file storage engine with write-ahead logging.
pub struct StorageEngine {
    txns: Arc<TxnTable>,
    pages: Arc<PageCache>,
    wal: Wal,
    free_space: FreeSpaceIndex,
    items: RefCache<ItemStore>,
    /// Page 1, pinned for the lifetime of the engine.
    page_one: Arc<Page>,
}

impl StorageEngine {
    /// Create a fresh database under `dir`.
    ///
    /// `memory_budget` is the page cache budget in bytes; `txns` is the
    /// transaction table recovery will consult.
    pub fn create<P: AsRef<Path>>(
        dir: P,
        memory_budget: usize,
        txns: Arc<TxnTable>,
    ) -> Result<StorageEngine> {
        let dir = dir.as_ref();
        let pages = Arc::new(PageCache::create(dir.join(DATA_FILE), memory_budget)?);
        let wal = Wal::create(dir.join(LOG_FILE))?;

        pages.new_page(&page_one::init_raw())?;
        let page_one = pages.get_page(1)?;

        tracing::info!(dir = %dir.display(), "created database");
        Ok(Self::assemble(txns, pages, wal, page_one))
    }

    /// Open an existing database under `dir`, running recovery if the
    /// last shutdown was not clean.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        memory_budget: usize,
        txns: Arc<TxnTable>,
    ) -> Result<StorageEngine> {
        let dir = dir.as_ref();
        let pages = Arc::new(PageCache::open(dir.join(DATA_FILE), memory_budget)?);
        let wal = Wal::open(dir.join(LOG_FILE))?;

        // A data file torn before page 1 completed is an empty
        // database that crashed during creation.
        if pages.page_count() == 0 {
            pages.new_page(&page_one::init_raw())?;
        }
        let page_one = pages.get_page(1)?;

        if !page_one::is_clean(&page_one) {
            tracing::info!(dir = %dir.display(), "unclean shutdown detected, recovering");
            recover(&txns, &wal, &pages)?;
        }

        let engine = Self::assemble(txns, pages, wal, page_one);
        engine.rebuild_free_space()?;

        page_one::set_open(&engine.page_one);
        engine.pages.flush_page(&engine.page_one)?;

        tracing::info!(dir = %dir.display(), pages = engine.pages.page_count(), "opened database");
        Ok(engine)
    }

    fn assemble(
        txns: Arc<TxnTable>,
        pages: Arc<PageCache>,
        wal: Wal,
        page_one: Arc<Page>,
    ) -> StorageEngine {
        let items = RefCache::new(
            ItemStore {
                pages: Arc::clone(&pages),
            },
            0,
        );
        StorageEngine {
            txns,
            pages,
            wal,
            free_space: FreeSpaceIndex::new(),
            items,
            page_one,
        }
    }

    /// Scan every record page and register its free space.
    fn rebuild_free_space(&self) -> Result<()> {
        for page_no in 2..=self.pages.page_count() {
            let page = self.pages.get_page(page_no)?;
            self.free_space.add(page_no, page_x::free_space(&page));
            self.pages.release_page(&page);
        }
        Ok(())
    }

    /// Look up the record at `uid`, pinning it in the item cache.
    ///
    /// Returns `Ok(None)` when `uid` does not name a live record. On
    /// `Some`, the caller owns one reference and must pair it with
    /// [`release_item`](Self::release_item).
    pub fn read_item(&self, uid: Uid) -> Result<Option<Arc<DataItem>>> {
        let item = match self.items.get(uid.0) {
            Ok(item) => item,
            Err(Error::RecordAbsent(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if !item.is_valid() {
            self.items.release(uid.0);
            return Ok(None);
        }
        Ok(Some(item))
    }

    /// Drop one reference to the item at `uid`.
    pub fn release_item(&self, uid: Uid) {
        self.items.release(uid.0);
    }

    /// Copy out the payload of the record at `uid`, if it is live.
    pub fn read(&self, uid: Uid) -> Result<Option<Vec<u8>>> {
        let Some(item) = self.read_item(uid)? else {
            return Ok(None);
        };
        let data = item.data();
        self.release_item(uid);
        Ok(Some(data))
    }

    /// Insert a record on behalf of `xid`. The insert is logged before
    /// the page changes; the returned [`Uid`] is its permanent address.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        let raw = DataItem::wrap_raw(data);
        if raw.len() > page_x::MAX_FREE_SPACE {
            return Err(Error::DataTooLarge);
        }

        // Check a page out of the free-space index, allocating fresh
        // pages when nothing fits. Another insert may grab a page we
        // just allocated, hence the retry loop.
        let mut slot = None;
        for _ in 0..INSERT_RETRIES {
            if let Some(s) = self.free_space.select(raw.len()) {
                slot = Some(s);
                break;
            }
            let page_no = self.pages.new_page(&page_x::init_raw())?;
            self.free_space.add(page_no, page_x::MAX_FREE_SPACE);
        }
        let slot = slot.ok_or(Error::DatabaseBusy)?;

        let page = match self.pages.get_page(slot.page_no) {
            Ok(page) => page,
            Err(e) => {
                self.free_space.add(slot.page_no, slot.free);
                return Err(e);
            }
        };

        let result = (|| {
            let record = LogRecord::Insert {
                xid,
                page_no: slot.page_no,
                offset: page_x::fso(&page),
                raw: raw.clone(),
            };
            self.wal.log(&record.encode())?;

            let offset = page_x::insert(&page, &raw);
            Ok(Uid::new(slot.page_no, offset))
        })();

        // Re-register the page whether or not the insert landed.
        self.free_space.add(slot.page_no, page_x::free_space(&page));
        self.pages.release_page(&page);
        result
    }

    /// Start the before/after protocol on `item`. See [`ItemUpdate`].
    pub fn open_update<'a>(&'a self, item: &'a DataItem) -> ItemUpdate<'a> {
        ItemUpdate::begin(self, item)
    }

    pub(crate) fn log_update(
        &self,
        xid: Xid,
        uid: Uid,
        old: &[u8],
        new: &[u8],
    ) -> Result<()> {
        let record = LogRecord::Update {
            xid,
            uid,
            old: old.to_vec(),
            new: new.to_vec(),
        };
        self.wal.log(&record.encode())
    }

    /// Shut down cleanly: flush everything and stamp page 1 so the next
    /// open skips recovery. The engine must not be used afterward.
    pub fn close(&self) -> Result<()> {
        self.items.close();

        page_one::set_close(&self.page_one);
        self.pages.flush_page(&self.page_one)?;
        self.pages.release_page(&self.page_one);
        self.pages.close();

        tracing::info!("closed database");
        Ok(())
    }
}
