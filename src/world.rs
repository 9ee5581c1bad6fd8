use log::debug;

use crate::{
    block::Block,
    chunk::Chunk,
    config::Config,
    error::{Error, Result},
    region::Region,
};
use std::{
    collections::{hash_map::Entry, HashMap},
    path::{Path, PathBuf},
};

/// File name of the region holding region coordinates `region_x`, `region_z`.
pub fn region_file_name(region_x: i32, region_z: i32) -> String {
    format!("r.{}.{}.mca", region_x, region_z)
}

/// Writes every chunk the region has cached back to its file.
pub fn flush(region: &mut Region) -> Result<()> {
    region.save()
}

/// A directory of region files, addressed in world block coordinates. Regions are opened on
/// first use and kept open until [`World::flush`].
///
/// # Example:
///
/// ```rust,no_run
/// use anvil_codec::{block::Block, world::World};
/// let mut world = World::new("saves/New World/region");
/// let ground = world.sample_height(120, -40).unwrap();
/// world.place_block(120, ground + 1, -40, &Block::from_name("minecraft:oak_planks")).unwrap();
/// world.flush().unwrap();
/// ```
pub struct World {
    region_dir: PathBuf,
    config: Config,
    regions: HashMap<(i32, i32), Region>,
}

impl World {
    pub fn new<P: AsRef<Path>>(region_dir: P) -> World {
        World::with_config(region_dir, Config::default())
    }

    pub fn with_config<P: AsRef<Path>>(region_dir: P, config: Config) -> World {
        World {
            region_dir: region_dir.as_ref().to_path_buf(),
            config,
            regions: HashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn open_regions(&self) -> usize {
        self.regions.len()
    }

    /// Returns the region with region coordinates `region_x`, `region_z`, opening it if needed.
    pub fn region(&mut self, region_x: i32, region_z: i32) -> Result<&mut Region> {
        match self.regions.entry((region_x, region_z)) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let path = self.region_dir.join(region_file_name(region_x, region_z));
                let region = Region::open_with_config(path, self.config.clone())?;
                Ok(entry.insert(region))
            }
        }
    }

    /// Returns the chunk holding world column `x`, `z`, stamped with its absolute chunk
    /// coordinates.
    pub fn chunk_at(&mut self, x: i32, z: i32) -> Result<&mut Chunk> {
        let (chunk_x, chunk_z) = (x >> 4, z >> 4);
        let region = self.region(chunk_x >> 5, chunk_z >> 5)?;
        let chunk = region.get_chunk(chunk_x & 31, chunk_z & 31)?;
        chunk.x = chunk_x;
        chunk.z = chunk_z;
        Ok(chunk)
    }

    /// Sets the block at world coordinates `x`, `y`, `z`. Nothing reaches disk until
    /// [`World::flush`].
    pub fn place_block(&mut self, x: i32, y: i32, z: i32, block: &Block) -> Result<()> {
        if !self.config.contains_y(y) {
            return Err(Error::Bounds(format!(
                "y {} is outside the world ({}..={})",
                y, self.config.min_y, self.config.max_y
            )));
        }
        self.chunk_at(x, z)?.set_block(x & 15, y, z & 15, block)
    }

    /// Returns the Y of the highest non air block at world column `x`, `z`, or the world floor
    /// if there is none.
    pub fn sample_height(&mut self, x: i32, z: i32) -> Result<i32> {
        self.chunk_at(x, z)?.get_highest_solid_y(x & 15, z & 15)
    }

    /// Saves every open region and closes it. Regions that fail to save stay open, the error
    /// of the first failure is returned.
    pub fn flush(&mut self) -> Result<()> {
        let mut keys: Vec<(i32, i32)> = self.regions.keys().copied().collect();
        keys.sort_unstable();
        for key in keys {
            if let Some(region) = self.regions.get_mut(&key) {
                flush(region)?;
                debug!("closed region ({}, {})", key.0, key.1);
            }
            self.regions.remove(&key);
        }
        Ok(())
    }
}
