//! Byte stores backing a series: a growable buffer or a file

use super::OpenMode;
use crate::{Result, TickError};
use memmap2::Mmap;
use std::fmt::Debug;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Random-access byte storage
pub trait Store: Send + Debug {
    /// Current length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow `len` bytes at `offset`
    fn view(&mut self, offset: u64, len: u64) -> Result<&[u8]>;

    /// Write `data` at `offset`, growing the store as needed
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()>;

    /// Cut the store to `len` bytes
    fn truncate(&mut self, len: u64) -> Result<()>;

    /// Make written bytes durable
    fn sync(&mut self) -> Result<()>;

    /// Backing file, if any
    fn path(&self) -> Option<&Path> {
        None
    }

    fn is_read_only(&self) -> bool {
        false
    }

    /// Copy of the entire contents
    fn image(&mut self) -> Result<Vec<u8>> {
        let len = self.len();
        Ok(self.view(0, len)?.to_vec())
    }
}

fn check_range(offset: u64, len: u64, have: u64) -> Result<(usize, usize)> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| TickError::Corruption(format!("range {}+{} overflows", offset, len)))?;
    if end > have {
        return Err(TickError::truncated(
            "store",
            end as usize,
            have as usize,
        ));
    }
    Ok((offset as usize, end as usize))
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    data: Vec<u8>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl Store for MemStore {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn view(&mut self, offset: u64, len: u64) -> Result<&[u8]> {
        let (beg, end) = check_range(offset, len, self.len())?;
        Ok(&self.data[beg..end])
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let beg = offset as usize;
        let end = beg + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[beg..end].copy_from_slice(data);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.data.truncate(len as usize);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn image(&mut self) -> Result<Vec<u8>> {
        Ok(self.data.clone())
    }
}

/// File store; reads go through a lazily (re)created read-only mapping
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    file: File,
    mode: OpenMode,
    len: u64,
    map: Option<Mmap>,
}

impl FileStore {
    /// Open `path`, creating it in read-write mode
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let file = match mode {
            OpenMode::ReadWrite => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)?,
            OpenMode::ReadOnly => File::open(path)?,
        };
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file,
            mode,
            len,
            map: None,
        })
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    fn writable(&self) -> Result<()> {
        match self.mode {
            OpenMode::ReadWrite => Ok(()),
            OpenMode::ReadOnly => Err(TickError::ReadOnly),
        }
    }
}

impl Store for FileStore {
    fn len(&self) -> u64 {
        self.len
    }

    fn view(&mut self, offset: u64, len: u64) -> Result<&[u8]> {
        let (beg, end) = check_range(offset, len, self.len)?;
        if len == 0 {
            return Ok(&[]);
        }
        let stale = self.map.as_ref().map_or(true, |m| m.len() < end);
        if stale {
            self.map = Some(unsafe { Mmap::map(&self.file)? });
        }
        match &self.map {
            Some(map) if map.len() >= end => Ok(&map[beg..end]),
            _ => Err(TickError::truncated("mapping", end, beg)),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.writable()?;
        // the mapping is rebuilt on the next read
        self.map = None;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> Result<()> {
        self.writable()?;
        self.map = None;
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        if self.mode == OpenMode::ReadWrite {
            self.file.sync_data()?;
        }
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn is_read_only(&self) -> bool {
        self.mode == OpenMode::ReadOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(store: &mut dyn Store) {
        assert!(store.is_empty());
        store.write_at(0, b"hello").unwrap();
        store.write_at(8, b"world").unwrap();
        assert_eq!(store.len(), 13);
        assert_eq!(store.view(0, 5).unwrap(), b"hello");
        assert_eq!(store.view(5, 3).unwrap(), &[0, 0, 0]);

        store.write_at(3, b"LO").unwrap();
        assert_eq!(store.view(0, 5).unwrap(), b"helLO");

        store.truncate(4).unwrap();
        assert_eq!(store.len(), 4);
        assert!(store.view(0, 5).unwrap_err().is_corruption());
        assert_eq!(store.image().unwrap(), b"helL");
        store.sync().unwrap();
    }

    #[test]
    fn test_mem_store() {
        exercise(&mut MemStore::new());
    }

    #[test]
    fn test_file_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data");
        let mut store = FileStore::open(&path, OpenMode::ReadWrite).unwrap();
        exercise(&mut store);
        assert_eq!(store.path(), Some(path.as_path()));
        drop(store);

        let mut ro = FileStore::open(&path, OpenMode::ReadOnly).unwrap();
        assert!(ro.is_read_only());
        assert_eq!(ro.view(0, 4).unwrap(), b"helL");
        assert!(matches!(ro.write_at(0, b"x"), Err(TickError::ReadOnly)));
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = FileStore::open(&dir.path().join("nope"), OpenMode::ReadOnly).unwrap_err();
        assert!(matches!(err, TickError::Io(_)));
    }
}
