//! Memory-mapped shadow file backing the WAL rows

use super::header::ShadowHeader;
use crate::{config, Result, TickError};
use memmap2::MmapMut;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// WAL rows mapped from `<series file>.wal`
#[derive(Debug)]
pub struct Shadow {
    path: PathBuf,
    map: MmapMut,
    // keeps the mapping's file open
    _file: File,
}

impl Shadow {
    /// Shadow path for a series file
    pub fn path_for(series: &Path) -> PathBuf {
        let mut name = OsString::from(series.as_os_str());
        name.push(config::SHADOW_SUFFIX);
        PathBuf::from(name)
    }

    /// Open the shadow of `series`, creating it when missing or unusable.
    ///
    /// Returns the shadow and the number of committed rows recovered.
    pub fn open(series: &Path, block_size: usize, row_size: usize) -> Result<(Self, usize)> {
        let path = Self::path_for(series);
        let wanted = ShadowHeader {
            block_size: block_size as u64,
            row_size: row_size as u64,
            rowi: 0,
        };

        if let Some(found) = Self::read_header(&path)? {
            if found.block_size == wanted.block_size && found.row_size == wanted.row_size {
                let file = OpenOptions::new().read(true).write(true).open(&path)?;
                if file.metadata()?.len() >= found.file_size() {
                    let map = unsafe { MmapMut::map_mut(&file)? };
                    if found.rowi > 0 {
                        info!("Recovered {} WAL rows from {:?}", found.rowi, path);
                    }
                    return Ok((
                        Self {
                            path,
                            map,
                            _file: file,
                        },
                        found.rowi as usize,
                    ));
                }
            }
            warn!(
                "Discarding shadow {:?}: geometry {}x{} does not match {}x{}",
                path, found.block_size, found.row_size, block_size, row_size
            );
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(wanted.file_size())?;
        let mut map = unsafe { MmapMut::map_mut(&file)? };
        map[..ShadowHeader::SIZE].copy_from_slice(&wanted.to_bytes());
        debug!("Created shadow {:?}", path);

        Ok((
            Self {
                path,
                map,
                _file: file,
            },
            0,
        ))
    }

    /// Read the header of an existing shadow, `None` if absent or unreadable
    fn read_header(path: &Path) -> Result<Option<ShadowHeader>> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TickError::Io(e)),
        };
        let mut raw = [0u8; ShadowHeader::SIZE];
        if file.read_exact(&mut raw).is_err() {
            warn!("Shadow {:?} too short for a header", path);
            return Ok(None);
        }
        match ShadowHeader::from_bytes(&raw) {
            Ok(h) => Ok(Some(h)),
            Err(e) => {
                warn!("Ignoring shadow {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Row area
    pub fn rows(&self) -> &[u8] {
        &self.map[ShadowHeader::SIZE..]
    }

    pub fn rows_mut(&mut self) -> &mut [u8] {
        &mut self.map[ShadowHeader::SIZE..]
    }

    /// Record the committed row count
    pub fn set_rowi(&mut self, rowi: usize) {
        let at = ShadowHeader::ROWI_OFFSET;
        self.map[at..at + 8].copy_from_slice(&(rowi as u64).to_ne_bytes());
    }

    /// msync the mapping
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        Ok(())
    }

    /// Unmap and delete the shadow file
    pub fn remove(self) -> Result<()> {
        let Shadow { path, map, _file } = self;
        drop(map);
        drop(_file);
        fs::remove_file(&path)?;
        debug!("Removed shadow {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shadow_path() {
        assert_eq!(
            Shadow::path_for(Path::new("/tmp/eurusd.cots")),
            PathBuf::from("/tmp/eurusd.cots.wal")
        );
    }

    #[test]
    fn test_create_and_recover() {
        let dir = TempDir::new().unwrap();
        let series = dir.path().join("s.cots");

        {
            let (mut shadow, recovered) = Shadow::open(&series, 512, 16).unwrap();
            assert_eq!(recovered, 0);
            assert_eq!(shadow.rows().len(), 512 * 16);
            shadow.rows_mut()[..16].copy_from_slice(&[7u8; 16]);
            shadow.set_rowi(1);
            shadow.flush().unwrap();
        }

        let (shadow, recovered) = Shadow::open(&series, 512, 16).unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(&shadow.rows()[..16], &[7u8; 16]);

        shadow.remove().unwrap();
        assert!(!Shadow::path_for(&series).exists());
    }

    #[test]
    fn test_geometry_mismatch_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let series = dir.path().join("s.cots");
        {
            let (mut shadow, _) = Shadow::open(&series, 512, 16).unwrap();
            shadow.set_rowi(3);
        }
        let (shadow, recovered) = Shadow::open(&series, 1024, 16).unwrap();
        assert_eq!(recovered, 0);
        assert_eq!(shadow.rows().len(), 1024 * 16);
    }
}
