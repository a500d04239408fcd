//! Persistent index cache sidecar.
//!
//! Reopening a large file repeats the chunk analysis even though nothing
//! changed. The sidecar stores the planner's output — chunk boundaries,
//! per-chunk row counts and ending quote states, schema, and Elias-Fano
//! coded sampled row offsets — keyed to the source's mtime and size, so a
//! fresh cache lets `read_all` jump straight to the parse phase.

pub mod elias_fano;

pub use elias_fano::EliasFano;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use velocsv_core::errors::{Error, Result};
use xxhash_rust::xxh64::xxh64;

use crate::schema::{ColumnSchema, DataType};

/// Cache file magic: "VIDX" little-endian.
pub const VIDX_MAGIC: u32 = 0x5844_4956;
pub const VIDX_VERSION: u8 = 1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CacheLocation {
    /// Next to the source file, `<name>.vidx`.
    SameDir,
    /// `$XDG_CACHE_HOME/velocsv/<hash>.vidx`.
    XdgCache,
    /// A caller-provided directory.
    Custom(PathBuf),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    pub location: CacheLocation,
    /// Every Kth row offset is sampled into the index.
    pub sample_interval: u16,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            location: CacheLocation::SameDir,
            sample_interval: 32,
        }
    }
}

/// Per-chunk analysis metadata persisted from the planning phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkMeta {
    pub row_count: u32,
    pub ends_inside_starting_outside: bool,
}

/// Complete cached index for one source file.
#[derive(Clone, Debug, Default)]
pub struct CachedIndex {
    pub source_mtime: u64,
    pub source_size: u64,
    pub header_end_offset: u64,
    pub total_rows: u64,
    pub sample_interval: u16,
    pub schema: Vec<ColumnSchema>,
    pub chunk_boundaries: Vec<(u64, u64)>,
    pub chunk_analysis: Vec<ChunkMeta>,
    pub sampled_offsets: EliasFano,
}

pub struct IndexCache;

impl IndexCache {
    /// Deterministic sidecar path for a source file.
    pub fn compute_path(source_path: &Path, cfg: &CacheConfig) -> PathBuf {
        match &cfg.location {
            CacheLocation::SameDir => {
                let mut name = source_path
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_default();
                name.push(".vidx");
                source_path.with_file_name(name)
            }
            CacheLocation::XdgCache => {
                let base = std::env::var_os("XDG_CACHE_HOME")
                    .map(PathBuf::from)
                    .or_else(|| {
                        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".cache"))
                    })
                    .unwrap_or_else(std::env::temp_dir);
                base.join("velocsv")
                    .join(format!("{}.vidx", Self::hash_path(source_path)))
            }
            CacheLocation::Custom(dir) => {
                dir.join(format!("{}.vidx", Self::hash_path(source_path)))
            }
        }
    }

    pub fn hash_path(path: &Path) -> String {
        format!("{:016x}", xxh64(path.to_string_lossy().as_bytes(), 0))
    }

    /// Load and validate a cached index against the current source file.
    pub fn load(cache_path: &Path, source_path: &Path) -> Result<CachedIndex> {
        let bytes = fs::read(cache_path)?;
        let index = Self::deserialize(&bytes)?;
        let (mtime, size) = Self::stat(source_path)?;
        if index.source_mtime != mtime || index.source_size != size {
            return Err(Error::ParseError(format!(
                "index cache is stale for {}",
                source_path.display()
            )));
        }
        Ok(index)
    }

    /// Write the index atomically: temp file in the target directory, then
    /// rename over the final path.
    pub fn write_atomic(
        cache_path: &Path,
        index: &CachedIndex,
        source_path: &Path,
    ) -> Result<()> {
        let (mtime, size) = Self::stat(source_path)?;
        let mut stamped = index.clone();
        stamped.source_mtime = mtime;
        stamped.source_size = size;
        let bytes = Self::serialize(&stamped);

        let dir = cache_path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(cache_path)
            .map_err(|e| Error::General(format!("cannot persist index cache: {e}")))?;
        Ok(())
    }

    fn stat(source_path: &Path) -> Result<(u64, u64)> {
        let meta = fs::metadata(source_path)?;
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok((mtime, meta.len()))
    }

    fn serialize(index: &CachedIndex) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + index.sampled_offsets.serialized_size());
        out.extend_from_slice(&VIDX_MAGIC.to_le_bytes());
        out.push(VIDX_VERSION);
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&index.source_mtime.to_le_bytes());
        out.extend_from_slice(&index.source_size.to_le_bytes());
        out.extend_from_slice(&index.header_end_offset.to_le_bytes());
        out.extend_from_slice(&index.total_rows.to_le_bytes());
        out.extend_from_slice(&index.sample_interval.to_le_bytes());

        out.extend_from_slice(&(index.schema.len() as u32).to_le_bytes());
        for col in &index.schema {
            let name = col.name.as_bytes();
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name);
            out.push(col.dtype as u8);
            out.push(col.nullable as u8);
        }

        out.extend_from_slice(&(index.chunk_boundaries.len() as u32).to_le_bytes());
        for (i, &(start, end)) in index.chunk_boundaries.iter().enumerate() {
            let meta = index
                .chunk_analysis
                .get(i)
                .copied()
                .unwrap_or(ChunkMeta {
                    row_count: 0,
                    ends_inside_starting_outside: false,
                });
            out.extend_from_slice(&start.to_le_bytes());
            out.extend_from_slice(&end.to_le_bytes());
            out.extend_from_slice(&meta.row_count.to_le_bytes());
            out.push(meta.ends_inside_starting_outside as u8);
        }

        index.sampled_offsets.serialize_into(&mut out);
        out
    }

    fn deserialize(bytes: &[u8]) -> Result<CachedIndex> {
        let mut r = Cursor { bytes, pos: 0 };

        if r.u32()? != VIDX_MAGIC {
            return Err(Error::ParseError("bad index cache magic".into()));
        }
        if r.u8()? != VIDX_VERSION {
            return Err(Error::ParseError("unsupported index cache version".into()));
        }
        r.skip(3)?;

        let mut index = CachedIndex {
            source_mtime: r.u64()?,
            source_size: r.u64()?,
            header_end_offset: r.u64()?,
            total_rows: r.u64()?,
            sample_interval: r.u16()?,
            ..Default::default()
        };

        let n_cols = r.u32()? as usize;
        for i in 0..n_cols {
            let name_len = r.u32()? as usize;
            let name = String::from_utf8(r.take(name_len)?.to_vec())
                .map_err(|_| Error::ParseError("non-UTF-8 column name in cache".into()))?;
            let dtype = decode_dtype(r.u8()?)?;
            let nullable = r.u8()? != 0;
            index.schema.push(ColumnSchema {
                name,
                index: i as u32,
                dtype,
                nullable,
            });
        }

        let n_chunks = r.u32()? as usize;
        for _ in 0..n_chunks {
            let start = r.u64()?;
            let end = r.u64()?;
            let row_count = r.u32()?;
            let ends_inside = r.u8()? != 0;
            index.chunk_boundaries.push((start, end));
            index.chunk_analysis.push(ChunkMeta {
                row_count,
                ends_inside_starting_outside: ends_inside,
            });
        }

        let (ef, _consumed) = EliasFano::deserialize(&bytes[r.pos..])?;
        index.sampled_offsets = ef;

        Ok(index)
    }
}

fn decode_dtype(tag: u8) -> Result<DataType> {
    Ok(match tag {
        0 => DataType::Null,
        1 => DataType::Bool,
        2 => DataType::Int32,
        3 => DataType::Int64,
        4 => DataType::Float64,
        5 => DataType::String,
        6 => DataType::Date,
        7 => DataType::Timestamp,
        other => {
            return Err(Error::ParseError(format!(
                "unknown data type tag {other} in cache"
            )))
        }
    })
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.bytes.len() {
            return Err(Error::EOF("index cache truncated".into()));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap_or_default()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap_or_default()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> CachedIndex {
        CachedIndex {
            source_mtime: 0,
            source_size: 0,
            header_end_offset: 4,
            total_rows: 100,
            sample_interval: 32,
            schema: vec![
                ColumnSchema {
                    name: "a".into(),
                    index: 0,
                    dtype: DataType::Int32,
                    nullable: true,
                },
                ColumnSchema {
                    name: "b".into(),
                    index: 1,
                    dtype: DataType::String,
                    nullable: true,
                },
            ],
            chunk_boundaries: vec![(4, 50), (50, 120)],
            chunk_analysis: vec![
                ChunkMeta {
                    row_count: 40,
                    ends_inside_starting_outside: true,
                },
                ChunkMeta {
                    row_count: 60,
                    ends_inside_starting_outside: false,
                },
            ],
            sampled_offsets: EliasFano::encode(&[4, 50], 120),
        }
    }

    #[test]
    fn serialize_round_trip() {
        let index = sample_index();
        let bytes = IndexCache::serialize(&index);
        let back = IndexCache::deserialize(&bytes).unwrap();
        assert_eq!(back.header_end_offset, 4);
        assert_eq!(back.total_rows, 100);
        assert_eq!(back.schema, index.schema);
        assert_eq!(back.chunk_boundaries, index.chunk_boundaries);
        assert_eq!(back.chunk_analysis, index.chunk_analysis);
        assert_eq!(back.sampled_offsets.select(1), 50);
    }

    #[test]
    fn bad_magic_rejected() {
        let index = sample_index();
        let mut bytes = IndexCache::serialize(&index);
        bytes[0] ^= 0xFF;
        assert!(IndexCache::deserialize(&bytes).is_err());
    }

    #[test]
    fn write_load_and_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("data.csv");
        fs::write(&source, b"a,b\n1,2\n").unwrap();
        let cfg = CacheConfig::default();
        let cache_path = IndexCache::compute_path(&source, &cfg);
        assert_eq!(cache_path, dir.path().join("data.csv.vidx"));

        IndexCache::write_atomic(&cache_path, &sample_index(), &source).unwrap();
        let loaded = IndexCache::load(&cache_path, &source).unwrap();
        assert_eq!(loaded.total_rows, 100);

        // Growing the file invalidates the cache via the size check.
        fs::write(&source, b"a,b\n1,2\n3,4\n").unwrap();
        assert!(IndexCache::load(&cache_path, &source).is_err());
    }

    #[test]
    fn custom_location_uses_hash() {
        let cfg = CacheConfig {
            location: CacheLocation::Custom(PathBuf::from("/tmp/idx")),
            sample_interval: 32,
        };
        let p = IndexCache::compute_path(Path::new("/data/file.csv"), &cfg);
        assert!(p.starts_with("/tmp/idx"));
        assert!(p.extension().unwrap() == "vidx");
    }
}
