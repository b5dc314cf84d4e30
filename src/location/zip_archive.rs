//! ZIP-archive backend. The archive is treated as a filesystem rooted at its
//! own contents. `write`/`delete` rebuild the archive into a sibling temp
//! file and persist (rename) it over the original so a crash mid-write never
//! leaves a truncated archive.

use std::io::{Read, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::{Backend, Location, Snapshot};
use crate::error::{Error, Result};

pub struct ZipBackend {
    location: Location,
    path: PathBuf,
}

impl ZipBackend {
    pub fn new(location: Location) -> Self {
        let path = match &location {
            Location::Zip { path } => path.clone(),
            _ => unreachable!("ZipBackend constructed from non-zip Location"),
        };
        Self { location, path }
    }

    fn open_archive(&self) -> Result<ZipArchive<std::fs::File>> {
        let file = std::fs::File::open(&self.path)?;
        ZipArchive::new(file).map_err(Error::from)
    }

    /// Rebuilds the archive with `mutate` applied, writing to a sibling temp
    /// file and persisting it over the original on success.
    fn rebuild(
        &self,
        mutate: impl FnOnce(&mut ZipArchive<std::fs::File>, &mut ZipWriter<&mut std::fs::File>) -> Result<()>,
    ) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| Error::IoError(format!("creating temp file in {}: {e}", dir.display())))?;

        {
            let mut archive = self.open_archive()?;
            let mut writer = ZipWriter::new(tmp.as_file_mut());
            let result = mutate(&mut archive, &mut writer);
            writer
                .finish()
                .map_err(|e| Error::IoError(format!("finishing zip write: {e}")))?;
            result?;
        }

        tmp.persist(&self.path)
            .map_err(|e| Error::IoError(format!("persisting archive {}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

fn dos_datetime_to_epoch(dt: zip::DateTime) -> f64 {
    // DOS dates are 1980-based; interpret as local time with an unknown DST
    // flag, per the spec's preserved (lossy, flagged) behavior.
    let year = dt.year() as i64;
    let days = days_since_epoch(year, dt.month() as u32, dt.day() as u32);
    let secs_of_day =
        dt.hour() as i64 * 3600 + dt.minute() as i64 * 60 + dt.second() as i64;
    (days * 86_400 + secs_of_day) as f64
}

/// Days between 1970-01-01 and the given (proleptic Gregorian) date.
fn days_since_epoch(year: i64, month: u32, day: u32) -> i64 {
    // Howard Hinnant's civil_from_days inverse, widely used for epoch math.
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (month as i64 + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[async_trait]
impl Backend for ZipBackend {
    async fn list(&self) -> Snapshot {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut out = Snapshot::new();
            let file = match std::fs::File::open(&path) {
                Ok(f) => f,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not open zip archive");
                    return out;
                }
            };
            let mut archive = match ZipArchive::new(file) {
                Ok(a) => a,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not read zip archive");
                    return out;
                }
            };
            for i in 0..archive.len() {
                let entry = match archive.by_index(i) {
                    Ok(e) => e,
                    Err(e) => {
                        tracing::warn!(index = i, error = %e, "could not read zip entry");
                        continue;
                    }
                };
                if entry.is_dir() {
                    continue;
                }
                let rel = entry.name().to_string();
                let mtime = dos_datetime_to_epoch(entry.last_modified());
                out.insert(rel, mtime);
            }
            out
        })
        .await
        .unwrap_or_default()
    }

    async fn read(&self, rel_path: &str) -> Result<Vec<u8>> {
        let path = self.path.clone();
        let rel_path = rel_path.to_string();
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&path)?;
            let mut archive = ZipArchive::new(file).map_err(Error::from)?;
            for i in 0..archive.len() {
                let mut entry = archive.by_index(i).map_err(Error::from)?;
                if entry.is_dir() {
                    continue;
                }
                if entry.name() == rel_path {
                    let mut buf = Vec::with_capacity(entry.size() as usize);
                    entry.read_to_end(&mut buf)?;
                    return Ok(buf);
                }
            }
            Err(Error::NotFound(rel_path))
        })
        .await
        .map_err(|e| Error::IoError(format!("zip read task panicked: {e}")))?
    }

    async fn write(&self, rel_path: &str, bytes: &[u8]) -> Result<()> {
        let this_path = self.path.clone();
        let rel_path = rel_path.to_string();
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let backend = ZipBackend { location: Location::Zip { path: this_path.clone() }, path: this_path };
            backend.rebuild(|archive, writer| {
                for i in 0..archive.len() {
                    let entry = archive.by_index(i).map_err(Error::from)?;
                    if entry.is_dir() || entry.name() == rel_path {
                        continue;
                    }
                    writer
                        .raw_copy_file(entry)
                        .map_err(|e| Error::IoError(format!("copying zip entry: {e}")))?;
                }
                let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
                writer
                    .start_file(rel_path.clone(), options)
                    .map_err(|e| Error::IoError(format!("starting zip entry {rel_path}: {e}")))?;
                writer
                    .write_all(&bytes)
                    .map_err(|e| Error::IoError(format!("writing zip entry {rel_path}: {e}")))?;
                Ok(())
            })
        })
        .await
        .map_err(|e| Error::IoError(format!("zip write task panicked: {e}")))?
    }

    async fn delete(&self, rel_path: &str) -> Result<()> {
        let this_path = self.path.clone();
        let rel_path = rel_path.to_string();
        tokio::task::spawn_blocking(move || {
            let backend = ZipBackend { location: Location::Zip { path: this_path.clone() }, path: this_path };
            backend.rebuild(|archive, writer| {
                for i in 0..archive.len() {
                    let entry = archive.by_index(i).map_err(Error::from)?;
                    if entry.name() == rel_path {
                        continue;
                    }
                    writer
                        .raw_copy_file(entry)
                        .map_err(|e| Error::IoError(format!("copying zip entry: {e}")))?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| Error::IoError(format!("zip delete task panicked: {e}")))?
    }

    fn location(&self) -> &Location {
        &self.location
    }
}
