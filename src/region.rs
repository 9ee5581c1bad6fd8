use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::{
    read::{GzDecoder, ZlibDecoder},
    write::ZlibEncoder,
    Compression as Level,
};
use log::{debug, info, trace, warn};

use crate::{
    chunk::Chunk,
    config::Config,
    error::{Error, Result},
};
use std::{
    collections::{hash_map::Entry, BTreeSet, HashMap},
    fs::{self, File, OpenOptions},
    io::{self, BufReader, ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Chunks along one edge of a region.
pub const REGION_SIZE: i32 = 32;
/// Chunk slots in a region, and entries in each header table.
pub const CHUNKS_PER_REGION: usize = 1024;
pub const SECTOR_SIZE: usize = 4096;
/// The location and timestamp tables, one sector each.
pub const HEADER_SIZE: usize = 2 * SECTOR_SIZE;
/// Largest sector offset a location entry can hold.
pub const MAX_SECTOR_OFFSET: u32 = 0xff_ffff;
/// Largest sector count a location entry can hold.
pub const MAX_SECTOR_COUNT: usize = 0xff;
/// Length prefix plus compression byte in front of every chunk payload.
const PAYLOAD_HEADER_SIZE: usize = 5;

/// How a chunk payload is compressed. Both are read, only zlib is ever written.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    Gzip = 1,
    Zlib = 2,
}

impl TryFrom<u8> for Compression {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Compression::Gzip),
            2 => Ok(Compression::Zlib),
            other => Err(Error::Format(format!(
                "unsupported chunk compression method {}",
                other
            ))),
        }
    }
}

impl Compression {
    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let read = match self {
            Compression::Gzip => GzDecoder::new(data).read_to_end(&mut out),
            Compression::Zlib => ZlibDecoder::new(data).read_to_end(&mut out),
        };
        read.map_err(|e| Error::Format(format!("corrupt {:?} payload: {}", self, e)))?;
        Ok(out)
    }
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Level::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Splits a location entry into its sector offset and sector count.
fn split_location(location: u32) -> (u32, u32) {
    (location >> 8, location & 0xff)
}

/// Index of a chunk slot in both header tables.
pub fn chunk_index(chunk_x: i32, chunk_z: i32) -> Result<usize> {
    let range = 0..REGION_SIZE;
    if !range.contains(&chunk_x) || !range.contains(&chunk_z) {
        return Err(Error::Bounds(format!(
            "chunk ({}, {}) is outside the 32x32 region",
            chunk_x, chunk_z
        )));
    }
    Ok(((chunk_x & 31) + (chunk_z & 31) * REGION_SIZE) as usize)
}

/// An Anvil region file: 32x32 chunks behind a table of sector locations and a table of
/// timestamps. Chunks are decoded on first access and kept until the region is dropped.
pub struct Region {
    path: PathBuf,
    config: Config,
    locations: Vec<u32>,
    timestamps: Vec<u32>,
    used_sectors: BTreeSet<u32>,
    chunks: HashMap<usize, Chunk>,
}

impl Region {
    /// Opens the region file at `path`. A file that does not exist yet is treated as an empty
    /// region, nothing is created until [`Region::save`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Region> {
        Region::open_with_config(path, Config::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Region> {
        let mut region = Region {
            path: path.as_ref().to_path_buf(),
            config,
            locations: vec![0; CHUNKS_PER_REGION],
            timestamps: vec![0; CHUNKS_PER_REGION],
            used_sectors: (0..2).collect(),
            chunks: HashMap::new(),
        };
        if region.path.exists() {
            region.read_header()?;
        }
        debug!(
            "opened region {} with {} chunks on disk",
            region.path.display(),
            region.locations.iter().filter(|&&l| l != 0).count()
        );
        Ok(region)
    }

    fn read_header(&mut self) -> Result<()> {
        let file = File::open(&self.path)?;
        let sectors_on_disk = (file.metadata()?.len() as usize + SECTOR_SIZE - 1) / SECTOR_SIZE;
        let mut reader = BufReader::new(file);

        for location in self.locations.iter_mut() {
            *location = reader.read_u32::<BigEndian>()?;
        }
        for timestamp in self.timestamps.iter_mut() {
            *timestamp = reader.read_u32::<BigEndian>()?;
        }

        for (index, &location) in self.locations.iter().enumerate() {
            let (offset, count) = split_location(location);
            if offset == 0 || count == 0 {
                continue;
            }
            if (offset + count) as usize > sectors_on_disk {
                warn!(
                    "chunk slot {} of {} points past the end of the file",
                    index,
                    self.path.display()
                );
            }
            self.used_sectors.extend(offset..offset + count);
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the sector offset and sector count recorded for a chunk, `(0, 0)` if it has
    /// never been written.
    pub fn chunk_location(&self, chunk_x: i32, chunk_z: i32) -> Result<(u32, u32)> {
        Ok(split_location(self.locations[chunk_index(chunk_x, chunk_z)?]))
    }

    /// Returns the last time a chunk was written, in seconds since the Unix epoch.
    pub fn timestamp(&self, chunk_x: i32, chunk_z: i32) -> Result<u32> {
        Ok(self.timestamps[chunk_index(chunk_x, chunk_z)?])
    }

    pub fn has_chunk(&self, chunk_x: i32, chunk_z: i32) -> Result<bool> {
        Ok(self.locations[chunk_index(chunk_x, chunk_z)?] != 0)
    }

    pub fn is_sector_used(&self, sector: u32) -> bool {
        self.used_sectors.contains(&sector)
    }

    /// Number of chunks decoded or created so far, all of which the next save writes.
    pub fn cached_chunks(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the chunk at region local `chunk_x`, `chunk_z` (0-31), reading it from disk on
    /// first access. A chunk that has never been written comes back empty, positioned at its
    /// local coordinates since the region does not know where it sits in the world.
    ///
    /// A payload that cannot be decoded fails with [`Error::Format`] and is not cached, the
    /// rest of the region stays usable.
    pub fn get_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<&mut Chunk> {
        let index = chunk_index(chunk_x, chunk_z)?;
        match self.chunks.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let location = self.locations[index];
                let chunk = if location == 0 {
                    debug!("created chunk ({}, {})", chunk_x, chunk_z);
                    Chunk::with_config(chunk_x, chunk_z, &self.config)
                } else {
                    read_chunk(&self.path, location, &self.config)
                        .map_err(|e| e.context(&format!("chunk ({}, {})", chunk_x, chunk_z)))?
                };
                Ok(entry.insert(chunk))
            }
        }
    }

    /// Writes every cached chunk back to disk, then rewrites both header tables.
    ///
    /// A chunk stays where it was if its old allocation is big enough, otherwise it moves to
    /// the end of the file. Allocations never shrink and freed sectors are not reused.
    pub fn save(&mut self) -> Result<()> {
        if !self.path.exists() {
            fs::write(&self.path, vec![0u8; HEADER_SIZE])?;
        }
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let mut indices: Vec<usize> = self.chunks.keys().copied().collect();
        indices.sort_unstable();

        for &index in &indices {
            let chunk = &self.chunks[&index];
            let payload = encode_payload(chunk)?;
            let sectors_needed = (payload.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
            if sectors_needed > MAX_SECTOR_COUNT {
                return Err(Error::Bounds(format!(
                    "chunk ({}, {}) needs {} sectors, a region entry holds at most {}",
                    chunk.x, chunk.z, sectors_needed, MAX_SECTOR_COUNT
                )));
            }
            trace!(
                "chunk slot {} is {} bytes compressed, {} sectors",
                index,
                payload.len(),
                sectors_needed
            );

            let (old_offset, old_count) = split_location(self.locations[index]);
            let (offset, count) = if old_offset > 0 && old_count as usize >= sectors_needed {
                debug!("chunk slot {} stays at sector {}", index, old_offset);
                (old_offset, old_count)
            } else {
                let offset = append_offset(&mut file)?;
                if offset > MAX_SECTOR_OFFSET {
                    return Err(Error::Bounds(format!(
                        "sector offset {} does not fit in a region entry",
                        offset
                    )));
                }
                debug!(
                    "chunk slot {} moves from sector {} to {}",
                    index, old_offset, offset
                );
                if old_offset > 0 {
                    for sector in old_offset..old_offset + old_count {
                        self.used_sectors.remove(&sector);
                    }
                }
                (offset, sectors_needed as u32)
            };

            file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;
            file.write_all(&payload)?;
            let padding = (SECTOR_SIZE - payload.len() % SECTOR_SIZE) % SECTOR_SIZE;
            file.write_all(&vec![0u8; padding])?;

            self.used_sectors.extend(offset..offset + count);
            self.locations[index] = (offset << 8) | count;
            self.timestamps[index] = now;
        }

        file.seek(SeekFrom::Start(0))?;
        let mut header = Vec::with_capacity(HEADER_SIZE);
        for &location in &self.locations {
            header.write_u32::<BigEndian>(location)?;
        }
        for &timestamp in &self.timestamps {
            header.write_u32::<BigEndian>(timestamp)?;
        }
        file.write_all(&header)?;
        file.flush()?;

        info!(
            "saved {} chunks to {} ({} bytes)",
            indices.len(),
            self.path.display(),
            file.metadata()?.len()
        );
        Ok(())
    }
}

/// Sector index at the end of the file, padding a trailing partial sector with zeros first.
fn append_offset(file: &mut File) -> Result<u32> {
    let mut end = file.seek(SeekFrom::End(0))? as usize;
    let partial = end % SECTOR_SIZE;
    if partial != 0 {
        file.write_all(&vec![0u8; SECTOR_SIZE - partial])?;
        end += SECTOR_SIZE - partial;
    }
    // the header sectors are always there, even in a truncated file
    Ok((end / SECTOR_SIZE).max(2) as u32)
}

/// Length prefix, compression byte and zlib data for one chunk.
fn encode_payload(chunk: &Chunk) -> Result<Vec<u8>> {
    let compressed = compress(&chunk.to_bytes()?)?;
    let mut payload = Vec::with_capacity(compressed.len() + PAYLOAD_HEADER_SIZE);
    payload.write_u32::<BigEndian>(compressed.len() as u32 + 1)?;
    payload.write_u8(Compression::Zlib as u8)?;
    payload.extend_from_slice(&compressed);
    Ok(payload)
}

fn read_chunk(path: &Path, location: u32, config: &Config) -> Result<Chunk> {
    let (offset, count) = split_location(location);
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset as u64 * SECTOR_SIZE as u64))?;

    let truncated = |e: io::Error| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Format(format!(
            "payload truncated, sector {} runs past the end of the file",
            offset
        )),
        _ => Error::Io(e),
    };

    let length = file.read_u32::<BigEndian>().map_err(truncated)? as usize;
    let compression = file.read_u8().map_err(truncated)?;
    if length == 0 || length + 4 > count as usize * SECTOR_SIZE {
        return Err(Error::Format(format!(
            "payload length {} does not fit its {} sectors",
            length, count
        )));
    }
    let compression = Compression::try_from(compression)?;

    let mut compressed = vec![0u8; length - 1];
    file.read_exact(&mut compressed).map_err(truncated)?;
    let data = compression.decompress(&compressed)?;
    Chunk::from_bytes(&data, config)
}
