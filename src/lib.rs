//! # Overview
//!
//! This crate provides a simple interface for reading and writing Minecraft region files
//! (.mca). Chunks are decoded down to their block palettes so single blocks can be read or
//! replaced, and a region writes every chunk it has touched back to disk in one pass.
//!
//! # Example:
//!
//! ```rust,no_run
//! use anvil_codec::{block::Block, region::Region};
//! fn main() -> anvil_codec::Result<()> {
//!     let mut region = Region::open("r.0.0.mca")?;
//!     let chunk = region.get_chunk(2, 3)?;
//!     let ground = chunk.get_highest_solid_y(5, 9)?;
//!     chunk.set_block(5, ground + 1, 9, &Block::from_name("minecraft:torch"))?;
//!     region.save()?;
//!     Ok(())
//! }
//! ```

/// Packing of palette indices into 64 bit words.
pub mod bits;

/// A struct to represent a block in Minecraft: its namespaced name and its state properties.
pub mod block;

/// A representation of a chunk of blocks in Minecraft. A chunk is a 16x16 column of 16 block tall sections, 384 blocks high (-64 to 319) with the default config. This struct is used to get and set particular Blocks or to get information such as heightmaps and biomes.
pub mod chunk;

/// Defaults for new chunks and the height of the world.
pub mod config;

/// The crate error type: malformed data, out of range coordinates and I/O failures.
pub mod error;

/// The per section list of blocks that block indices refer to.
pub mod palette;

/// A representation of a region file that is used to store chunk data: its header tables, sector allocation and chunk cache.
pub mod region;

/// One 16x16x16 cube of a chunk.
pub mod section;

/// World coordinate access to a directory of region files.
pub mod world;

pub use error::{Error, Result};
