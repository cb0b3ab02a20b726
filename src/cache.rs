//! Request-addressed image cache shared by every chapter of a series.
//!
//! Entries live at `<cache_dir>/<sha256(url)><ext>`. The key is the request
//! URL, not the content, so the same remote asset referenced from several
//! chapters is only downloaded once. An entry below the minimum size is
//! invalid and gets evicted the next time it is looked up.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::Builder;

use reqwest::Url;

const PART_SUFFIX: &str = ".part";

#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
    min_size: u64,
}

/// State of the cache slot for one URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    /// Valid entry of `size` bytes
    Hit { path: PathBuf, size: u64 },
    /// Undersized entry; it has already been removed
    Evicted { path: PathBuf, size: u64 },
    Miss { path: PathBuf },
}

/// Result of filling a cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored { path: PathBuf, size: u64 },
    /// Body was below the minimum size and was discarded
    Rejected { size: u64 },
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, min_size: u64) -> Self {
        Self {
            dir: dir.into(),
            min_size,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    /// Hex sha256 of the absolute URL
    pub fn key(url: &Url) -> String {
        let digest = Sha256::digest(url.as_str().as_bytes());
        format!("{:x}", digest)
    }

    pub fn entry_path(&self, url: &Url, ext: &str) -> PathBuf {
        self.dir.join(format!("{}{}", Self::key(url), ext))
    }

    /// Look up `url`, evicting an undersized entry on the way
    pub fn lookup(&self, url: &Url, ext: &str) -> io::Result<CacheLookup> {
        let path = self.entry_path(url, ext);
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheLookup::Miss { path }),
            Err(e) => return Err(e),
        };

        if size >= self.min_size {
            return Ok(CacheLookup::Hit { path, size });
        }

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(CacheLookup::Evicted { path, size })
    }

    /// Fill the slot for `url` through `fill`, which receives the writer and
    /// returns the number of bytes it produced.
    ///
    /// Every writer gets its own `<key>*.part` temporary inside the cache
    /// directory, persisted over the entry only once it passes the size gate.
    /// A visible entry is always complete; concurrent writers of one key are
    /// last-writer-wins.
    pub fn store<E, F>(&self, url: &Url, ext: &str, fill: F) -> Result<StoreOutcome, E>
    where
        E: From<io::Error>,
        F: FnOnce(&mut dyn Write) -> Result<u64, E>,
    {
        fs::create_dir_all(&self.dir)?;
        let key = Self::key(url);
        let path = self.entry_path(url, ext);

        // Dropping `part` on any early return removes the temporary
        let mut part = Builder::new()
            .prefix(&key)
            .suffix(PART_SUFFIX)
            .tempfile_in(&self.dir)?;
        {
            let mut writer = BufWriter::new(part.as_file_mut());
            fill(&mut writer)?;
            writer.flush()?;
        }

        let size = part.as_file().metadata()?.len();
        if size < self.min_size {
            return Ok(StoreOutcome::Rejected { size });
        }

        part.persist(&path).map_err(io::Error::from)?;
        Ok(StoreOutcome::Stored { path, size })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_key_is_stable_hex_sha256() {
        let u = url("https://cdn.example.com/a/001.webp");
        let key = CacheStore::key(&u);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, CacheStore::key(&url("https://cdn.example.com/a/001.webp")));
        assert_ne!(key, CacheStore::key(&url("https://cdn.example.com/a/002.webp")));
    }

    #[test]
    fn test_lookup_states() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 10);
        let u = url("https://cdn.example.com/p.webp");

        assert!(matches!(cache.lookup(&u, ".webp").unwrap(), CacheLookup::Miss { .. }));

        fs::write(cache.entry_path(&u, ".webp"), b"tiny").unwrap();
        match cache.lookup(&u, ".webp").unwrap() {
            CacheLookup::Evicted { path, size } => {
                assert_eq!(size, 4);
                assert!(!path.exists());
            }
            other => panic!("expected eviction, got {:?}", other),
        }

        fs::write(cache.entry_path(&u, ".webp"), vec![7u8; 10]).unwrap();
        assert!(matches!(
            cache.lookup(&u, ".webp").unwrap(),
            CacheLookup::Hit { size: 10, .. }
        ));
    }

    #[test]
    fn test_store_gates_on_size() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path().join("cache"), 8);
        let u = url("https://cdn.example.com/big.webp");

        let small = cache
            .store::<io::Error, _>(&u, ".webp", |w| {
                w.write_all(b"abc")?;
                Ok(3)
            })
            .unwrap();
        assert_eq!(small, StoreOutcome::Rejected { size: 3 });
        assert!(!cache.entry_path(&u, ".webp").exists());

        let big = cache
            .store::<io::Error, _>(&u, ".webp", |w| {
                w.write_all(&[1u8; 16])?;
                Ok(16)
            })
            .unwrap();
        assert!(matches!(big, StoreOutcome::Stored { size: 16, .. }));
        assert_eq!(fs::read(cache.entry_path(&u, ".webp")).unwrap(), vec![1u8; 16]);
        assert_eq!(fs::read_dir(cache.dir()).unwrap().count(), 1);
    }

    #[test]
    fn test_concurrent_writers_of_one_key_both_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(CacheStore::new(dir.path(), 8));
        let u = url("https://cdn.example.com/twice.webp");
        let both_writing = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2u8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                let u = u.clone();
                let both_writing = Arc::clone(&both_writing);
                thread::spawn(move || {
                    cache.store::<io::Error, _>(&u, ".webp", |w| {
                        w.write_all(&[i; 8])?;
                        both_writing.wait();
                        w.write_all(&[i; 8])?;
                        Ok(16)
                    })
                })
            })
            .collect();

        for h in handles {
            let outcome = h.join().unwrap().unwrap();
            assert!(matches!(outcome, StoreOutcome::Stored { size: 16, .. }));
        }
        let entry = fs::read(cache.entry_path(&u, ".webp")).unwrap();
        assert!(entry == vec![0u8; 16] || entry == vec![1u8; 16]);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_fill_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 1);
        let u = url("https://cdn.example.com/broken.webp");

        let result = cache.store::<io::Error, _>(&u, ".webp", |w| {
            w.write_all(b"partial")?;
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
