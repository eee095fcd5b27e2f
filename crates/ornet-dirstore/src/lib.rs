//! On-disk storage for directory documents.
//!
//! # Overview
//!
//! Descriptors are stored per document kind in two files: a compacted
//! *store* (`cached-routers`, `cached-extrainfo`) holding concatenated
//! signed bodies, memory-mapped at load; and an append-only *journal*
//! (`cached-routers.new`, …) that receives every newly accepted body.
//! When the journal outgrows the store — or enough store bytes have
//! been dropped — the live bodies are rewritten into a fresh store,
//! sorted by publication time for locality, the file is atomically
//! replaced, and the journal is truncated.
//!
//! Network-status documents are stored one file per authority under
//! `cached-status/`, and a v1-era aggregate `cached-directory` file is
//! read (never written) if present.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

use ornet_llcrypto::pk::rsa::RsaIdentity;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info, warn};

/// An error from the descriptor store.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// An underlying I/O operation failed.
    #[error("I/O error in directory storage")]
    Io(#[from] std::io::Error),
    /// The cache contents did not match what we recorded about them.
    #[error("directory cache corrupted: {0}")]
    CacheCorruption(&'static str),
}

/// A Result with this crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of document a store holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum DocKind {
    /// Router descriptors.
    Routers,
    /// Extra-info documents.
    ExtraInfo,
}

impl DocKind {
    /// The base filename for this kind's store.
    fn store_name(self) -> &'static str {
        match self {
            DocKind::Routers => "cached-routers",
            DocKind::ExtraInfo => "cached-extrainfo",
        }
    }
}

/// Where a document's bytes currently live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum SavedLocation {
    /// Not saved anywhere yet.
    Nowhere,
    /// Appended to the journal.
    Journal,
    /// Inside the compacted, memory-mapped store.
    Cache,
}

/// A document's recorded position in the store or journal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DocLocation {
    /// Which file holds the bytes.
    pub location: SavedLocation,
    /// Byte offset within that file.
    pub offset: u64,
    /// Length of the signed body.
    pub len: usize,
}

impl DocLocation {
    /// A location for a document that is not saved at all.
    pub fn nowhere() -> Self {
        DocLocation {
            location: SavedLocation::Nowhere,
            offset: 0,
            len: 0,
        }
    }
}

/// Tunables for when the store is rebuilt.
///
/// The defaults match the behavior of the original implementation;
/// they are exposed because the right thresholds are genuinely
/// workload-dependent.
#[derive(Copy, Clone, Debug)]
pub struct StoreConfig {
    /// Rebuild when `journal_len > store_len / journal_vs_store_divisor`.
    pub journal_vs_store_divisor: u64,
    /// Rebuild when `bytes_dropped > store_len / dropped_vs_store_divisor`.
    pub dropped_vs_store_divisor: u64,
    /// A store smaller than this is "small"…
    pub small_store_bytes: u64,
    /// …and rebuilt as soon as the journal passes this size.
    pub small_journal_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            journal_vs_store_divisor: 2,
            dropped_vs_store_divisor: 2,
            small_store_bytes: 64 * 1024,
            small_journal_bytes: 32 * 1024,
        }
    }
}

/// The contents of a loaded store file: mapped if possible, read into
/// memory otherwise.
#[derive(Debug)]
enum StoreData {
    /// Memory-mapped bytes.
    Mapped(memmap2::Mmap),
    /// Plain in-memory bytes (mmap failed, or the file was empty).
    Buf(Vec<u8>),
}

impl AsRef<[u8]> for StoreData {
    fn as_ref(&self) -> &[u8] {
        match self {
            StoreData::Mapped(m) => &m[..],
            StoreData::Buf(v) => &v[..],
        }
    }
}

/// A compacted store plus its append-only journal, for one document
/// kind.
#[derive(Debug)]
pub struct Store {
    /// Directory containing the cache files.
    dir: PathBuf,
    /// Which kind of documents we hold.
    kind: DocKind,
    /// Rebuild tunables.
    config: StoreConfig,
    /// The loaded store contents.
    data: StoreData,
    /// Open handle to the journal, positioned at its end.
    journal: File,
    /// Current length of the journal.
    journal_len: u64,
    /// Number of store bytes whose documents have been dropped.
    bytes_dropped: u64,
}

impl Store {
    /// Open (creating if absent) the store for `kind` in `dir`.
    pub fn open(dir: &Path, kind: DocKind, config: StoreConfig) -> Result<Store> {
        let store_path = dir.join(kind.store_name());
        let journal_path = dir.join(format!("{}.new", kind.store_name()));

        let data = load_store_file(&store_path)?;
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&journal_path)?;
        let journal_len = journal.metadata()?.len();
        debug!(
            "opened {} store: {} bytes, journal {} bytes",
            kind.store_name(),
            data.as_ref().len(),
            journal_len
        );
        Ok(Store {
            dir: dir.to_owned(),
            kind,
            config,
            data,
            journal,
            journal_len,
            bytes_dropped: 0,
        })
    }

    /// Return the store contents, as a byte slice.
    pub fn store_bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Return the current journal length.
    pub fn journal_len(&self) -> u64 {
        self.journal_len
    }

    /// Append a signed body to the journal, returning its new location.
    pub fn append(&mut self, body: &[u8]) -> Result<DocLocation> {
        let offset = self.journal_len;
        self.journal.write_all(body)?;
        self.journal.flush()?;
        self.journal_len += body.len() as u64;
        Ok(DocLocation {
            location: SavedLocation::Journal,
            offset,
            len: body.len(),
        })
    }

    /// Record that a document occupying `len` bytes of the store has
    /// been dropped, so its bytes are dead weight until a rebuild.
    pub fn note_dropped(&mut self, len: usize) {
        self.bytes_dropped = self.bytes_dropped.saturating_add(len as u64);
    }

    /// Read back the bytes at a recorded location.
    pub fn read(&self, loc: &DocLocation) -> Result<Vec<u8>> {
        match loc.location {
            SavedLocation::Nowhere => Err(Error::CacheCorruption("read of unsaved document")),
            SavedLocation::Cache => {
                let store = self.data.as_ref();
                let start = usize::try_from(loc.offset)
                    .map_err(|_| Error::CacheCorruption("offset out of range"))?;
                let end = start
                    .checked_add(loc.len)
                    .filter(|end| *end <= store.len())
                    .ok_or(Error::CacheCorruption("document extends past store"))?;
                Ok(store[start..end].to_vec())
            }
            SavedLocation::Journal => {
                let mut f = File::open(self.journal_path())?;
                f.seek(SeekFrom::Start(loc.offset))?;
                let mut buf = vec![0_u8; loc.len];
                f.read_exact(&mut buf)
                    .map_err(|_| Error::CacheCorruption("document extends past journal"))?;
                Ok(buf)
            }
        }
    }

    /// Check the store invariant for one document: the bytes at its
    /// recorded location must equal its signed body.
    pub fn verify(&self, loc: &DocLocation, body: &[u8]) -> bool {
        match self.read(loc) {
            Ok(stored) => stored == body,
            Err(_) => false,
        }
    }

    /// Return true if the rebuild thresholds say it is time to compact.
    pub fn should_rebuild(&self) -> bool {
        let store_len = self.data.as_ref().len() as u64;
        if self.journal_len > store_len / self.config.journal_vs_store_divisor.max(1) {
            return true;
        }
        if self.bytes_dropped > store_len / self.config.dropped_vs_store_divisor.max(1) {
            return true;
        }
        if store_len < self.config.small_store_bytes
            && self.journal_len > self.config.small_journal_bytes
        {
            return true;
        }
        false
    }

    /// Rebuild the store from the full set of live documents.
    ///
    /// `documents` provides, for each live document, a key for the
    /// caller's use, the signed body, and the publication time.  The
    /// bodies are written sorted by publication time, the store file
    /// is atomically replaced and re-mapped, and the journal is
    /// truncated.  Returns each key's new location within the store.
    pub fn rebuild<K: std::hash::Hash + Eq + Clone>(
        &mut self,
        documents: &[(K, &[u8], SystemTime)],
    ) -> Result<HashMap<K, DocLocation>> {
        let store_path = self.store_path();
        let tmp_path = self.dir.join(format!("{}.tmp", self.kind.store_name()));

        // Sort by publication time, for locality of the likely-related.
        let mut docs: Vec<&(K, &[u8], SystemTime)> = documents.iter().collect();
        docs.sort_by_key(|d| d.2);

        let mut locations = HashMap::with_capacity(docs.len());
        {
            let mut f = File::create(&tmp_path)?;
            let mut offset: u64 = 0;
            for (key, body, _) in docs {
                f.write_all(body)?;
                locations.insert(
                    key.clone(),
                    DocLocation {
                        location: SavedLocation::Cache,
                        offset,
                        len: body.len(),
                    },
                );
                offset += body.len() as u64;
            }
            f.sync_all()?;
        }
        std::fs::rename(&tmp_path, &store_path)?;

        // Re-map the new store, truncate the journal, reset counters.
        self.data = load_store_file(&store_path)?;
        self.journal.set_len(0)?;
        self.journal.seek(SeekFrom::End(0))?;
        self.journal_len = 0;
        self.bytes_dropped = 0;
        info!(
            "rebuilt {} store: {} documents, {} bytes",
            self.kind.store_name(),
            locations.len(),
            self.data.as_ref().len()
        );
        Ok(locations)
    }

    /// Path of the compacted store file.
    fn store_path(&self) -> PathBuf {
        self.dir.join(self.kind.store_name())
    }
    /// Path of the journal file.
    fn journal_path(&self) -> PathBuf {
        self.dir.join(format!("{}.new", self.kind.store_name()))
    }
}

/// Load a store file, preferring to map it.
fn load_store_file(path: &Path) -> Result<StoreData> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(StoreData::Buf(Vec::new()));
        }
        Err(e) => return Err(e.into()),
    };
    if f.metadata()?.len() > 0 {
        // Mapping can fail for odd filesystems; fall through to a read.
        // Safety: nothing else in this process writes the store except
        // through the atomic-rename path, which leaves old maps intact.
        if let Ok(mapping) = unsafe { memmap2::Mmap::map(&f) } {
            return Ok(StoreData::Mapped(mapping));
        }
    }
    let mut buf = Vec::new();
    let mut f = std::io::BufReader::new(f);
    f.read_to_end(&mut buf)?;
    Ok(StoreData::Buf(buf))
}

/// Storage for network-status documents: one file per authority,
/// named by its hex identity digest, under `cached-status/`.
#[derive(Debug)]
pub struct StatusCache {
    /// The `cached-status` directory.
    dir: PathBuf,
}

impl StatusCache {
    /// Open (creating if absent) the status cache under `dir`.
    pub fn open(dir: &Path) -> Result<StatusCache> {
        let dir = dir.join("cached-status");
        std::fs::create_dir_all(&dir)?;
        Ok(StatusCache { dir })
    }

    /// Store an authority's network-status document.
    ///
    /// The write goes to a temporary file first, so a crash can't
    /// leave a half-written status behind.
    pub fn store(&self, authority: &RsaIdentity, text: &str) -> Result<()> {
        let name = hex::encode(authority.as_bytes());
        let tmp = self.dir.join(format!("{}.tmp", name));
        let path = self.dir.join(name);
        {
            let mut f = File::create(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load every stored status, as (authority, text) pairs.
    ///
    /// Unreadable or misnamed files are skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<(RsaIdentity, String)>> {
        let mut result = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let id = match hex::decode(name.as_ref())
                .ok()
                .and_then(|b| RsaIdentity::from_bytes(&b))
            {
                Some(id) => id,
                None => {
                    if !name.ends_with(".tmp") {
                        warn!("skipping strange file {:?} in status cache", name);
                    }
                    continue;
                }
            };
            match std::fs::read_to_string(entry.path()) {
                Ok(text) => result.push((id, text)),
                Err(e) => warn!("skipping unreadable status {:?}: {}", name, e),
            }
        }
        Ok(result)
    }
}

/// Read the legacy v1 aggregate directory file, if one is present.
///
/// Nothing writes this file any more, but an old cache directory may
/// still contain one worth reading at startup.
pub fn read_legacy_directory(dir: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(dir.join("cached-directory")) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::time::Duration;

    fn body(tag: u8, len: usize) -> Vec<u8> {
        let mut v = vec![tag; len];
        // Make each body self-describing, so offset mixups can't
        // accidentally match.
        v[0] = b'@';
        v[1] = tag;
        v
    }

    fn t(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn append_and_read_journal() {
        let td = tempfile::tempdir().unwrap();
        let mut store = Store::open(td.path(), DocKind::Routers, StoreConfig::default()).unwrap();

        let b1 = body(1, 100);
        let b2 = body(2, 200);
        let l1 = store.append(&b1).unwrap();
        let l2 = store.append(&b2).unwrap();
        assert_eq!(l1.location, SavedLocation::Journal);
        assert_eq!((l1.offset, l1.len), (0, 100));
        assert_eq!((l2.offset, l2.len), (100, 200));
        assert_eq!(store.journal_len(), 300);

        assert_eq!(store.read(&l1).unwrap(), b1);
        assert_eq!(store.read(&l2).unwrap(), b2);
        assert!(store.verify(&l1, &b1));
        assert!(!store.verify(&l1, &b2));

        // Reopening finds the journal where we left it.
        drop(store);
        let store = Store::open(td.path(), DocKind::Routers, StoreConfig::default()).unwrap();
        assert_eq!(store.journal_len(), 300);
    }

    #[test]
    fn rebuild_sorts_and_remaps() {
        let td = tempfile::tempdir().unwrap();
        let mut store = Store::open(td.path(), DocKind::Routers, StoreConfig::default()).unwrap();

        let b_new = body(1, 64);
        let b_old = body(2, 80);
        store.append(&b_new).unwrap();
        store.append(&b_old).unwrap();

        // Rebuild with the "old" document published first: it must
        // come first in the new store.
        let docs: Vec<(u8, &[u8], SystemTime)> =
            vec![(1, &b_new[..], t(2000)), (2, &b_old[..], t(1000))];
        let locations = store.rebuild(&docs).unwrap();

        let l_old = locations[&2];
        let l_new = locations[&1];
        assert_eq!(l_old.location, SavedLocation::Cache);
        assert_eq!(l_old.offset, 0);
        assert_eq!(l_new.offset, 80);
        assert_eq!(store.journal_len(), 0);

        // Every live document is recoverable byte for byte.
        assert_eq!(store.read(&l_old).unwrap(), b_old);
        assert_eq!(store.read(&l_new).unwrap(), b_new);
        assert!(store.verify(&l_new, &b_new));
        assert_eq!(store.store_bytes().len(), 64 + 80);

        // And the layout survives a reopen.
        drop(store);
        let store = Store::open(td.path(), DocKind::Routers, StoreConfig::default()).unwrap();
        assert_eq!(store.read(&l_old).unwrap(), b_old);
        assert_eq!(store.read(&l_new).unwrap(), b_new);
    }

    #[test]
    fn rebuild_thresholds() {
        let td = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            small_store_bytes: 1024,
            small_journal_bytes: 512,
            ..StoreConfig::default()
        };
        let mut store = Store::open(td.path(), DocKind::ExtraInfo, config).unwrap();
        assert!(!store.should_rebuild());

        // A small store rebuilds once the journal passes its bound.
        store.append(&body(1, 600)).unwrap();
        assert!(store.should_rebuild());

        let b = body(1, 600);
        let docs: Vec<(u8, &[u8], SystemTime)> = vec![(1, &b[..], t(1))];
        store.rebuild(&docs).unwrap();
        assert!(!store.should_rebuild());

        // Dropping more than half the store triggers a rebuild too.
        store.note_dropped(400);
        assert!(store.should_rebuild());
    }

    #[test]
    fn bad_locations_do_not_read() {
        let td = tempfile::tempdir().unwrap();
        let store = Store::open(td.path(), DocKind::Routers, StoreConfig::default()).unwrap();
        assert!(store.read(&DocLocation::nowhere()).is_err());
        let silly = DocLocation {
            location: SavedLocation::Cache,
            offset: 10,
            len: 100,
        };
        assert!(store.read(&silly).is_err());
    }

    #[test]
    fn status_cache_round_trip() {
        let td = tempfile::tempdir().unwrap();
        let cache = StatusCache::open(td.path()).unwrap();
        let id1: RsaIdentity = [1_u8; 20].into();
        let id2: RsaIdentity = [2_u8; 20].into();
        cache.store(&id1, "status one\n").unwrap();
        cache.store(&id2, "status two\n").unwrap();
        // A rewrite replaces the old copy.
        cache.store(&id1, "status one again\n").unwrap();

        let mut all = cache.load_all().unwrap();
        all.sort_by_key(|(id, _)| *id);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], (id1, "status one again\n".to_string()));
        assert_eq!(all[1], (id2, "status two\n".to_string()));
    }

    #[test]
    fn legacy_directory() {
        let td = tempfile::tempdir().unwrap();
        assert_eq!(read_legacy_directory(td.path()).unwrap(), None);
        std::fs::write(td.path().join("cached-directory"), "ancient data").unwrap();
        assert_eq!(
            read_legacy_directory(td.path()).unwrap().as_deref(),
            Some("ancient data")
        );
    }
}
