use nbt::Value;

use crate::{
    bits,
    block::Block,
    error::{Error, Result},
    palette::Palette,
};

/// Blocks along one edge of a section.
pub const SECTION_SIZE: i32 = 16;
/// Blocks in a whole section.
pub const SECTION_BLOCKS: usize = 4096;

/// Flattens local coordinates as `y * 256 + z * 16 + x`.
pub(crate) fn block_index(x: i32, y: i32, z: i32) -> Result<usize> {
    let range = 0..SECTION_SIZE;
    if !range.contains(&x) || !range.contains(&y) || !range.contains(&z) {
        return Err(Error::Bounds(format!(
            "local block ({}, {}, {}) is outside the 16x16x16 section",
            x, y, z
        )));
    }
    Ok((y * SECTION_SIZE * SECTION_SIZE + z * SECTION_SIZE + x) as usize)
}

/// A 16x16x16 cube of blocks, stored as palette indices.
#[derive(Clone, Debug)]
pub struct Section {
    y: i8,
    palette: Palette,
    blocks: Vec<u32>,
    /// Fields other than `Y` and `block_states`, kept as they were read.
    extra: Vec<(String, Value)>,
    /// False for sections read without `block_states` that nothing has been written to yet.
    has_states: bool,
}

impl Section {
    /// An all air section at section height `y`.
    pub fn new(y: i8) -> Section {
        Section {
            y,
            palette: Palette::new(),
            blocks: vec![0; SECTION_BLOCKS],
            extra: Vec::new(),
            has_states: true,
        }
    }

    pub fn y(&self) -> i8 {
        self.y
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: &Block) -> Result<()> {
        let index = block_index(x, y, z)?;
        let palette_index = self.palette.index_of(block);
        self.blocks[index] = palette_index as u32;
        self.has_states = true;
        Ok(())
    }

    pub fn get_block_index(&self, x: i32, y: i32, z: i32) -> Result<usize> {
        Ok(self.blocks[block_index(x, y, z)?] as usize)
    }

    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&Block> {
        let index = self.get_block_index(x, y, z)?;
        // every stored index is checked against the palette on the way in
        self.palette.get(index).ok_or_else(|| {
            Error::Format(format!(
                "palette index {} out of range in section {}",
                index, self.y
            ))
        })
    }

    /// Builds the section compound. A palette with a single entry is written without a `data`
    /// array, which readers take to mean every block is that entry.
    pub fn to_nbt(&self) -> Value {
        let mut fields = vec![("Y".to_string(), Value::Byte(self.y))];

        if self.has_states {
            let mut states = vec![("palette".to_string(), self.palette.to_nbt())];
            if self.palette.len() > 1 {
                let bits = bits::bits_per_entry(self.palette.len() - 1);
                states.push((
                    "data".to_string(),
                    Value::LongArray(bits::pack(&self.blocks, bits)),
                ));
            }
            fields.push((
                "block_states".to_string(),
                Value::Compound(states.into_iter().collect()),
            ));
        }

        for (key, value) in &self.extra {
            if key != "Y" && key != "block_states" {
                fields.push((key.clone(), value.clone()));
            }
        }
        Value::Compound(fields.into_iter().collect())
    }

    pub fn from_nbt(tag: &Value) -> Result<Section> {
        let tag = if let Value::Compound(t) = tag {
            t
        } else {
            return Err(Error::Format(format!(
                "section is a {}, expected a compound",
                tag.tag_name()
            )));
        };
        let y = match tag.get("Y") {
            Some(Value::Byte(y)) => *y,
            _ => return Err(Error::Format("section without a byte Y".to_string())),
        };

        let mut section = Section::new(y);
        section.extra = tag
            .iter()
            .filter(|(k, _)| k.as_str() != "Y" && k.as_str() != "block_states")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let states = match tag.get("block_states") {
            None => {
                section.has_states = false;
                return Ok(section);
            }
            Some(Value::Compound(bs)) => bs,
            Some(other) => {
                return Err(Error::Format(format!(
                    "block_states of section {} is a {}, expected a compound",
                    y,
                    other.tag_name()
                )))
            }
        };

        let palette = match states.get("palette") {
            Some(p) => Palette::from_nbt(p).map_err(|e| e.context(&format!("section {}", y)))?,
            None => {
                return Err(Error::Format(format!(
                    "block_states of section {} has no palette",
                    y
                )))
            }
        };

        match states.get("data") {
            None => {}
            Some(Value::LongArray(words)) => {
                let bits = bits::bits_per_entry(palette.len() - 1);
                let blocks = bits::unpack(words, bits, SECTION_BLOCKS);
                if let Some(bad) = blocks.iter().find(|&&i| i as usize >= palette.len()) {
                    return Err(Error::Format(format!(
                        "section {} refers to palette index {} but the palette has {} entries",
                        y,
                        bad,
                        palette.len()
                    )));
                }
                section.blocks = blocks;
            }
            Some(other) => {
                return Err(Error::Format(format!(
                    "block state data of section {} is a {}, expected a long array",
                    y,
                    other.tag_name()
                )))
            }
        }
        section.palette = palette;
        Ok(section)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field<'a>(tag: &'a Value, key: &str) -> Option<&'a Value> {
        match tag {
            Value::Compound(map) => map.get(key),
            _ => None,
        }
    }

    #[test]
    fn flattening_order() {
        assert_eq!(block_index(0, 0, 0).unwrap(), 0);
        assert_eq!(block_index(1, 0, 0).unwrap(), 1);
        assert_eq!(block_index(0, 0, 1).unwrap(), 16);
        assert_eq!(block_index(0, 1, 0).unwrap(), 256);
        assert_eq!(block_index(15, 15, 15).unwrap(), 4095);
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        let mut section = Section::new(0);
        let stone = Block::from_name("minecraft:stone");
        assert!(section.set_block(16, 0, 0, &stone).unwrap_err().is_bounds());
        assert!(section.set_block(0, -1, 0, &stone).unwrap_err().is_bounds());
        assert!(section.get_block_index(0, 0, 16).unwrap_err().is_bounds());
    }

    #[test]
    fn equivalent_properties_share_a_slot() {
        let mut section = Section::new(0);
        let a = Block::from_name("minecraft:test").with_property("a", "1").with_property("b", "2");
        let b = Block::from_name("minecraft:test").with_property("b", "2").with_property("a", "1");
        section.set_block(0, 0, 0, &a).unwrap();
        section.set_block(1, 0, 0, &b).unwrap();
        assert_eq!(section.palette().len(), 2);
        assert_eq!(section.get_block_index(0, 0, 0).unwrap(), 1);
        assert_eq!(section.get_block_index(1, 0, 0).unwrap(), 1);
    }

    #[test]
    fn single_entry_palette_has_no_data() {
        let tag = Section::new(2).to_nbt();
        let states = field(&tag, "block_states").unwrap();
        assert!(field(states, "data").is_none());
        assert_eq!(field(&tag, "Y"), Some(&Value::Byte(2)));

        let decoded = Section::from_nbt(&tag).unwrap();
        for index in 0..SECTION_BLOCKS as i32 {
            let (x, y, z) = (index % 16, index / 256, index / 16 % 16);
            assert!(decoded.get_block(x, y, z).unwrap().is_air());
        }
    }

    #[test]
    fn single_non_air_entry_fills_the_section() {
        let stone = Block::from_name("minecraft:stone").to_palette();
        let states = Value::Compound(
            vec![("palette".to_string(), Value::List(vec![stone]))].into_iter().collect(),
        );
        let tag = Value::Compound(
            vec![
                ("Y".to_string(), Value::Byte(-1)),
                ("block_states".to_string(), states),
            ]
            .into_iter()
            .collect(),
        );
        let section = Section::from_nbt(&tag).unwrap();
        assert_eq!(section.get_block(7, 3, 12).unwrap().name(), "minecraft:stone");
        assert_eq!(section.get_block(0, 15, 0).unwrap().name(), "minecraft:stone");
    }

    #[test]
    fn packed_round_trip() {
        let mut section = Section::new(-3);
        for i in 0..20 {
            let block = Block::from_name(&format!("minecraft:block_{}", i));
            section.set_block(i % 16, i / 16, 5, &block).unwrap();
        }
        let tag = section.to_nbt();
        let states = field(&tag, "block_states").unwrap();
        match field(states, "data") {
            // 21 entries need 5 bits, 12 per word
            Some(Value::LongArray(words)) => assert_eq!(words.len(), 342),
            other => panic!("expected packed data, got {:?}", other),
        }

        let decoded = Section::from_nbt(&tag).unwrap();
        assert_eq!(decoded.y(), -3);
        assert_eq!(decoded.palette().len(), 21);
        for i in 0..20 {
            assert_eq!(
                decoded.get_block(i % 16, i / 16, 5).unwrap().name(),
                format!("minecraft:block_{}", i)
            );
        }
        assert!(decoded.get_block(0, 0, 0).unwrap().is_air());
    }

    #[test]
    fn index_past_palette_is_a_format_error() {
        let palette = Value::List(vec![
            Block::air().to_palette(),
            Block::from_name("minecraft:stone").to_palette(),
        ]);
        // index 5 in the first slot of a two entry palette
        let states = Value::Compound(
            vec![
                ("palette".to_string(), palette),
                ("data".to_string(), Value::LongArray(vec![5])),
            ]
            .into_iter()
            .collect(),
        );
        let tag = Value::Compound(
            vec![
                ("Y".to_string(), Value::Byte(0)),
                ("block_states".to_string(), states),
            ]
            .into_iter()
            .collect(),
        );
        assert!(Section::from_nbt(&tag).unwrap_err().is_format());
    }

    #[test]
    fn light_only_sections_stay_light_only() {
        let light = Value::ByteArray(vec![0; 2048]);
        let tag = Value::Compound(
            vec![
                ("Y".to_string(), Value::Byte(-5)),
                ("SkyLight".to_string(), light.clone()),
            ]
            .into_iter()
            .collect(),
        );
        let mut section = Section::from_nbt(&tag).unwrap();
        assert_eq!(section.extra("SkyLight"), Some(&light));

        let written = section.to_nbt();
        assert!(field(&written, "block_states").is_none());
        assert_eq!(field(&written, "SkyLight"), Some(&light));

        section.set_block(0, 0, 0, &Block::from_name("minecraft:stone")).unwrap();
        assert!(field(&section.to_nbt(), "block_states").is_some());
    }
}
