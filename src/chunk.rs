use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use nbt::{Blob, Value};

use crate::{
    bits,
    block::Block,
    config::Config,
    error::{Error, Result},
    section::{self, Section, SECTION_SIZE},
};

use std::collections::BTreeMap;

const TAG_COMPOUND: u8 = 0x0a;

/// Top level fields the chunk writes itself. Anything else read from disk is carried through
/// untouched.
const MANAGED_FIELDS: [&str; 6] = ["DataVersion", "Status", "xPos", "zPos", "yPos", "sections"];

/// A simple representation of a Minecraft Chunk
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The chunk x, absolute once the chunk has been read from disk or fetched through a World
    pub x: i32,
    /// The chunk z
    pub z: i32,
    pub data_version: i32,
    pub status: String,
    min_y: i32,
    sections: BTreeMap<i8, Section>,
    other: Vec<(String, Value)>,
}

impl Chunk {
    /// An empty chunk, stamped with the default data version and status.
    pub fn new(x: i32, z: i32) -> Chunk {
        Chunk::with_config(x, z, &Config::default())
    }

    pub fn with_config(x: i32, z: i32, config: &Config) -> Chunk {
        Chunk {
            x,
            z,
            data_version: config.data_version,
            status: config.status.clone(),
            min_y: config.min_y,
            sections: BTreeMap::new(),
            other: Vec::new(),
        }
    }

    /// Returns a string representing the current generation state of the Chunk. 'minecraft:full' is completely generated.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use anvil_codec::region::Region;
    /// let mut region = Region::open("r.0.0.mca").unwrap();
    /// let chunk = region.get_chunk(0, 0).unwrap();
    /// if chunk.get_status() == "minecraft:full" {
    ///     println!("Fully Generated!");
    /// }
    /// ```
    pub fn get_status(&self) -> &str {
        &self.status
    }

    /// The lowest block Y of the world this chunk belongs to.
    pub fn min_y(&self) -> i32 {
        self.min_y
    }

    /// Sections present in the chunk, lowest first.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// Returns a vertical section of a Chunk
    ///
    /// # Arguments
    ///
    /// * `y` - The y index of the section.
    pub fn get_section(&self, y: i8) -> Option<&Section> {
        self.sections.get(&y)
    }

    /// Returns the section at `y`, creating an all air one if it is missing.
    pub fn get_or_create_section(&mut self, y: i8) -> &mut Section {
        self.sections.entry(y).or_insert_with(|| Section::new(y))
    }

    /// Returns a top level field that was read from disk but is not managed by the chunk.
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.other.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Sets an unmanaged top level field. Names of managed fields are ignored on save.
    pub fn insert_extra<K: Into<String>>(&mut self, key: K, value: Value) {
        let key = key.into();
        match self.other.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.other.push((key, value)),
        }
    }

    /// Sets the block at chunk local `x`, `z` (0-15) and world height `y`, creating the section
    /// if needed.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: &Block) -> Result<()> {
        let section_y = section_index(y)?;
        self.get_or_create_section(section_y)
            .set_block(x, y & 15, z, block)
    }

    /// Returns the block at a particular x, y, z coordinate within a chunk. x and z should be the coordinates within the Chunk (0-15).
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use anvil_codec::region::Region;
    /// let mut region = Region::open("r.0.0.mca").unwrap();
    /// let chunk = region.get_chunk(0, 0).unwrap();
    /// let block = chunk.get_block(5, -12, 11).unwrap();
    /// println!("{}", block.id);
    /// ```
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<Block> {
        let section_y = section_index(y)?;
        match self.sections.get(&section_y) {
            Some(section) => section.get_block(x, y & 15, z).map(Block::clone),
            None => {
                section::block_index(x, y & 15, z)?;
                Ok(Block::air())
            }
        }
    }

    /// Returns the world Y of the highest block in the column that is not air, or the world
    /// floor if the whole column is air. Only sections present in the chunk are scanned.
    pub fn get_highest_solid_y(&self, x: i32, z: i32) -> Result<i32> {
        section::block_index(x, 0, z)?;
        for (section_y, section) in self.sections.iter().rev() {
            for y in (0..SECTION_SIZE).rev() {
                if !section.get_block(x, y, z)?.is_air() {
                    return Ok(*section_y as i32 * SECTION_SIZE + y);
                }
            }
        }
        Ok(self.min_y)
    }

    /// Returns the biome at a block of the chunk, read from the section's biome palette. Biomes
    /// are stored per 4x4x4 cell. `None` when the section or its biome data is absent.
    pub fn get_biome(&self, x: i32, y: i32, z: i32) -> Result<Option<String>> {
        let section_y = section_index(y)?;
        section::block_index(x, y & 15, z)?;
        let section = match self.sections.get(&section_y) {
            Some(s) => s,
            None => return Ok(None),
        };
        let biomes = match section.extra("biomes") {
            Some(Value::Compound(b)) => b,
            _ => return Ok(None),
        };
        let palette = match biomes.get("palette") {
            Some(Value::List(p)) if !p.is_empty() => p,
            _ => {
                return Err(Error::Format(format!(
                    "biomes of section {} have no palette",
                    section_y
                )))
            }
        };

        let index = match biomes.get("data") {
            Some(Value::LongArray(words)) => {
                let bits = bits::bit_length(palette.len() - 1).max(1);
                let cell = (((y & 15) >> 2) * 16 + (z >> 2) * 4 + (x >> 2)) as usize;
                bits::unpack(words, bits, 64)[cell] as usize
            }
            _ => 0,
        };
        match palette.get(index) {
            Some(Value::String(name)) => Ok(Some(name.clone())),
            Some(_) => Err(Error::Format(format!(
                "biome palette of section {} holds a non string entry",
                section_y
            ))),
            None => Err(Error::Format(format!(
                "biome index {} out of range in section {}",
                index, section_y
            ))),
        }
    }

    /// Returns a heightmap of the Chunk, as stored when it was last generated or saved by the
    /// game. If the Chunk is not fully generated then a None is returned.
    ///
    /// # Arguments
    ///
    /// * `ignore_water` - Determines which heightmap to return, if true then a heightmap that does not take into account the water is returned (OCEAN_FLOOR), if false then the water is accounted for (WORLD_SURFACE).
    pub fn get_heightmap(&self, ignore_water: bool) -> Result<Option<Vec<i32>>> {
        if self.status != "minecraft:full" && self.status != "full" {
            return Ok(None);
        }
        let maps = match self.extra("Heightmaps") {
            Some(Value::Compound(hm)) => hm,
            _ => return Ok(None),
        };
        let map = if ignore_water {
            "OCEAN_FLOOR"
        } else {
            "WORLD_SURFACE"
        };
        match maps.get(map) {
            Some(Value::LongArray(words)) => Ok(Some(
                bits::unpack(words, 9, 256)
                    .into_iter()
                    .map(|n| n as i32 + self.min_y - 1)
                    .collect(),
            )),
            Some(other) => Err(Error::Format(format!(
                "heightmap {} is a {}, expected a long array",
                map,
                other.tag_name()
            ))),
            None => Ok(None),
        }
    }

    /// Builds the root compound written to disk. Managed fields always come from the chunk
    /// itself, preserved fields follow.
    pub fn to_nbt(&self) -> Result<Blob> {
        let mut blob = Blob::new();
        blob.insert("DataVersion", Value::Int(self.data_version))?;
        blob.insert("Status", Value::String(self.status.clone()))?;
        blob.insert("xPos", Value::Int(self.x))?;
        blob.insert("zPos", Value::Int(self.z))?;
        blob.insert("yPos", Value::Int(self.min_y >> 4))?;
        blob.insert(
            "sections",
            Value::List(self.sections.values().map(Section::to_nbt).collect()),
        )?;
        for (key, value) in &self.other {
            if !MANAGED_FIELDS.contains(&key.as_str()) {
                blob.insert(key.as_str(), value.clone())?;
            }
        }
        Ok(blob)
    }

    /// Serializes the chunk to uncompressed NBT.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_nbt()?.to_writer(&mut buf)?;
        Ok(buf)
    }

    /// Reads a chunk from its root compound. `config` supplies the world floor when the chunk
    /// does not record one.
    pub fn from_nbt(tag: &Value, config: &Config) -> Result<Chunk> {
        let tag = if let Value::Compound(t) = tag {
            t
        } else {
            return Err(Error::Format(format!(
                "chunk root is a {}, expected a compound",
                tag.tag_name()
            )));
        };
        let int_field = |key: &str| match tag.get(key) {
            Some(Value::Int(v)) => Ok(Some(*v)),
            None => Ok(None),
            Some(other) => Err(Error::Format(format!(
                "{} is a {}, expected an int",
                key,
                other.tag_name()
            ))),
        };

        let x = int_field("xPos")?.ok_or_else(|| Error::Format("chunk has no xPos".to_string()))?;
        let z = int_field("zPos")?.ok_or_else(|| Error::Format("chunk has no zPos".to_string()))?;
        let mut chunk = Chunk::with_config(x, z, config);
        if let Some(version) = int_field("DataVersion")? {
            chunk.data_version = version;
        }
        if let Some(y_pos) = int_field("yPos")? {
            // section heights are stored as bytes, so is the floor
            let y_pos = i8::try_from(y_pos)
                .map_err(|_| Error::Format(format!("yPos {} is out of range", y_pos)))?;
            chunk.min_y = y_pos as i32 * SECTION_SIZE;
        }
        match tag.get("Status") {
            Some(Value::String(s)) => chunk.status = s.clone(),
            None => {}
            Some(other) => {
                return Err(Error::Format(format!(
                    "Status is a {}, expected a string",
                    other.tag_name()
                )))
            }
        }

        match tag.get("sections") {
            Some(Value::List(sections)) => {
                for section_tag in sections {
                    let section = Section::from_nbt(section_tag)?;
                    let y = section.y();
                    if chunk.sections.insert(y, section).is_some() {
                        return Err(Error::Format(format!("section {} appears twice", y)));
                    }
                }
            }
            None => {}
            Some(other) => {
                return Err(Error::Format(format!(
                    "sections is a {}, expected a list",
                    other.tag_name()
                )))
            }
        }

        chunk.other = tag
            .iter()
            .filter(|(k, _)| !MANAGED_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        // hash order on the way in, keep the output stable
        chunk.other.sort_by(|a, b| a.0.cmp(&b.0));

        debug!(
            "decoded chunk ({}, {}) with {} sections and {} extra fields",
            chunk.x,
            chunk.z,
            chunk.sections.len(),
            chunk.other.len()
        );
        Ok(chunk)
    }

    /// Parses uncompressed NBT as produced by [`Chunk::to_bytes`].
    pub fn from_bytes(bytes: &[u8], config: &Config) -> Result<Chunk> {
        let truncated = || Error::Format("chunk payload ends inside the root tag header".to_string());
        let mut src = bytes;
        let id = src.read_u8().map_err(|_| truncated())?;
        if id != TAG_COMPOUND {
            return Err(Error::Format(format!(
                "chunk root has tag id {}, expected a compound",
                id
            )));
        }
        let name_len = src.read_u16::<BigEndian>().map_err(|_| truncated())? as usize;
        if src.len() < name_len {
            return Err(truncated());
        }
        src = &src[name_len..];
        let root = Value::from_reader(TAG_COMPOUND, &mut src)?;
        Chunk::from_nbt(&root, config)
    }
}

/// Section height of a world Y, which has to fit the byte the format stores it in.
fn section_index(y: i32) -> Result<i8> {
    i8::try_from(y >> 4)
        .map_err(|_| Error::Bounds(format!("world y {} has no section in a chunk", y)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> Block {
        Block::from_name("minecraft:stone")
    }

    #[test]
    fn set_block_routes_to_section() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(3, -20, 4, &stone()).unwrap();
        let section = chunk.get_section(-2).unwrap();
        assert_eq!(section.get_block(3, 12, 4).unwrap().name(), "minecraft:stone");
        assert_eq!(chunk.get_block(3, -20, 4).unwrap(), stone());
        assert!(chunk.get_block(3, 100, 4).unwrap().is_air());
        assert!(chunk.get_block(16, 100, 4).unwrap_err().is_bounds());
    }

    #[test]
    fn highest_solid_in_sparse_column() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(0, 48, 0, &stone()).unwrap();
        assert_eq!(chunk.sections().count(), 1);
        assert_eq!(chunk.get_highest_solid_y(0, 0).unwrap(), 48);
        assert_eq!(chunk.get_highest_solid_y(1, 0).unwrap(), -64);
    }

    #[test]
    fn highest_solid_skips_air_sections() {
        let mut chunk = Chunk::new(0, 0);
        chunk.set_block(5, 10, 5, &stone()).unwrap();
        chunk.set_block(5, 200, 5, &Block::air()).unwrap();
        chunk.set_block(5, -30, 5, &stone()).unwrap();
        assert_eq!(chunk.get_highest_solid_y(5, 5).unwrap(), 10);
    }

    #[test]
    fn empty_chunk_returns_configured_floor() {
        let config = Config {
            min_y: 0,
            ..Config::default()
        };
        let chunk = Chunk::with_config(0, 0, &config);
        assert_eq!(chunk.get_highest_solid_y(7, 7).unwrap(), 0);
        assert_eq!(Chunk::new(0, 0).get_highest_solid_y(7, 7).unwrap(), -64);
        assert!(chunk.get_highest_solid_y(-1, 0).unwrap_err().is_bounds());
    }

    #[test]
    fn round_trip_through_bytes() {
        let mut chunk = Chunk::new(-3, 17);
        chunk.set_block(1, 64, 2, &stone()).unwrap();
        chunk.set_block(1, -64, 2, &Block::from_name("minecraft:bedrock")).unwrap();
        chunk.insert_extra("InhabitedTime", Value::Long(42));

        let decoded = Chunk::from_bytes(&chunk.to_bytes().unwrap(), &Config::default()).unwrap();
        assert_eq!((decoded.x, decoded.z), (-3, 17));
        assert_eq!(decoded.data_version, 3465);
        assert_eq!(decoded.get_status(), "minecraft:full");
        assert_eq!(decoded.min_y(), -64);
        let ys: Vec<i8> = decoded.sections().map(Section::y).collect();
        assert_eq!(ys, vec![-4, 4]);
        assert_eq!(decoded.get_block(1, 64, 2).unwrap(), stone());
        assert_eq!(decoded.get_block(1, -64, 2).unwrap().id, "bedrock");
        assert_eq!(decoded.extra("InhabitedTime"), Some(&Value::Long(42)));
    }

    #[test]
    fn managed_fields_are_never_taken_from_extras() {
        let mut chunk = Chunk::new(1, 1);
        chunk.insert_extra("xPos", Value::Int(99));
        chunk.insert_extra("Status", Value::String("minecraft:empty".to_string()));
        let blob = chunk.to_nbt().unwrap();
        assert_eq!(blob.get("xPos"), Some(&Value::Int(1)));
        assert_eq!(
            blob.get("Status"),
            Some(&Value::String("minecraft:full".to_string()))
        );
    }

    #[test]
    fn missing_position_is_a_format_error() {
        let root = Value::Compound(
            vec![("DataVersion".to_string(), Value::Int(3465))].into_iter().collect(),
        );
        assert!(Chunk::from_nbt(&root, &Config::default()).unwrap_err().is_format());
        assert!(Chunk::from_bytes(&[0x0a], &Config::default()).unwrap_err().is_format());
        assert!(Chunk::from_bytes(&[0x08, 0, 0], &Config::default()).unwrap_err().is_format());
    }

    #[test]
    fn out_of_range_floor_is_a_format_error() {
        let root = |y_pos: i32| {
            Value::Compound(
                vec![
                    ("xPos".to_string(), Value::Int(0)),
                    ("zPos".to_string(), Value::Int(0)),
                    ("yPos".to_string(), Value::Int(y_pos)),
                ]
                .into_iter()
                .collect(),
            )
        };
        let err = Chunk::from_nbt(&root(0x1000_0000), &Config::default()).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("yPos"));
        assert!(Chunk::from_nbt(&root(-129), &Config::default()).unwrap_err().is_format());

        let lowest = Chunk::from_nbt(&root(-128), &Config::default()).unwrap();
        assert_eq!(lowest.min_y(), -2048);
        assert_eq!(lowest.get_highest_solid_y(0, 0).unwrap(), -2048);
    }

    #[test]
    fn reads_biomes_and_heightmaps() {
        let biomes = Value::Compound(
            vec![
                (
                    "palette".to_string(),
                    Value::List(vec![
                        Value::String("minecraft:plains".to_string()),
                        Value::String("minecraft:river".to_string()),
                    ]),
                ),
                // cell 1 (x 4..8) is the river, everything else plains
                ("data".to_string(), Value::LongArray(vec![0b10])),
            ]
            .into_iter()
            .collect(),
        );
        let section = Value::Compound(
            vec![
                ("Y".to_string(), Value::Byte(0)),
                ("biomes".to_string(), biomes),
            ]
            .into_iter()
            .collect(),
        );
        // every column reports a stored height value of 65
        let heights = bits::pack(&[65; 256], 9);
        let heightmaps = Value::Compound(
            vec![("WORLD_SURFACE".to_string(), Value::LongArray(heights))]
                .into_iter()
                .collect(),
        );
        let root = Value::Compound(
            vec![
                ("xPos".to_string(), Value::Int(0)),
                ("zPos".to_string(), Value::Int(0)),
                ("yPos".to_string(), Value::Int(-4)),
                ("Status".to_string(), Value::String("minecraft:full".to_string())),
                ("sections".to_string(), Value::List(vec![section])),
                ("Heightmaps".to_string(), heightmaps),
            ]
            .into_iter()
            .collect(),
        );
        let chunk = Chunk::from_nbt(&root, &Config::default()).unwrap();
        assert_eq!(
            chunk.get_biome(0, 0, 0).unwrap().as_deref(),
            Some("minecraft:plains")
        );
        assert_eq!(
            chunk.get_biome(5, 3, 1).unwrap().as_deref(),
            Some("minecraft:river")
        );
        assert_eq!(chunk.get_biome(0, 100, 0).unwrap(), None);

        let heightmap = chunk.get_heightmap(false).unwrap().unwrap();
        assert_eq!(heightmap.len(), 256);
        assert!(heightmap.iter().all(|&h| h == 0));
        assert_eq!(chunk.get_heightmap(true).unwrap(), None);
    }
}
