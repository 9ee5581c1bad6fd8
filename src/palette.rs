use std::collections::HashMap;

use log::warn;
use nbt::Value;

use crate::{block::Block, error::Error, error::Result};

/// The blocks a section refers to, in index order. Entries are only ever appended, and two
/// entries never share a canonical key unless they were stored that way on disk.
#[derive(Clone, Debug)]
pub struct Palette {
    entries: Vec<Block>,
    lookup: HashMap<String, usize>,
}

impl Palette {
    /// A palette holding only air, at index 0.
    pub fn new() -> Palette {
        Palette::from_blocks(vec![Block::air()])
    }

    /// Builds a palette from stored entries, keeping their order. If a key repeats, lookups
    /// resolve to its first index.
    pub fn from_blocks(entries: Vec<Block>) -> Palette {
        let mut lookup = HashMap::with_capacity(entries.len());
        for (index, block) in entries.iter().enumerate() {
            let key = block.canonical_key();
            if lookup.contains_key(&key) {
                warn!("palette repeats {} at index {}", key, index);
                continue;
            }
            lookup.insert(key, index);
        }
        Palette { entries, lookup }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.entries.iter()
    }

    /// Returns the index of `block`, appending it first if no entry has its canonical key.
    pub fn index_of(&mut self, block: &Block) -> usize {
        let key = block.canonical_key();
        if let Some(&index) = self.lookup.get(&key) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(block.clone());
        self.lookup.insert(key, index);
        index
    }

    pub fn find(&self, block: &Block) -> Option<usize> {
        self.lookup.get(&block.canonical_key()).copied()
    }

    pub fn to_nbt(&self) -> Value {
        Value::List(self.entries.iter().map(Block::to_palette).collect())
    }

    pub fn from_nbt(tag: &Value) -> Result<Palette> {
        let list = if let Value::List(l) = tag {
            l
        } else {
            return Err(Error::Format(format!(
                "palette is a {}, expected a list",
                tag.tag_name()
            )));
        };
        if list.is_empty() {
            return Err(Error::Format("palette is empty".to_string()));
        }
        let entries = list.iter().map(Block::from_palette).collect::<Result<Vec<_>>>()?;
        Ok(Palette::from_blocks(entries))
    }
}

impl Default for Palette {
    fn default() -> Self {
        Palette::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_air() {
        let palette = Palette::new();
        assert_eq!(palette.len(), 1);
        assert!(palette.get(0).unwrap().is_air());
    }

    #[test]
    fn index_of_appends_once() {
        let mut palette = Palette::new();
        let stone = Block::from_name("minecraft:stone");
        assert_eq!(palette.index_of(&stone), 1);
        assert_eq!(palette.index_of(&stone), 1);
        assert_eq!(palette.index_of(&Block::air()), 0);
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.find(&stone), Some(1));
        assert_eq!(palette.find(&Block::from_name("minecraft:dirt")), None);
    }

    #[test]
    fn repeated_stored_keys_resolve_to_first() {
        let stone = Block::from_name("minecraft:stone");
        let palette = Palette::from_blocks(vec![Block::air(), stone.clone(), stone.clone()]);
        assert_eq!(palette.len(), 3);
        assert_eq!(palette.find(&stone), Some(1));
    }

    #[test]
    fn nbt_round_trip_keeps_order() {
        let mut palette = Palette::new();
        palette.index_of(&Block::from_name("minecraft:grass_block").with_property("snowy", "false"));
        palette.index_of(&Block::from_name("minecraft:dirt"));

        let decoded = Palette::from_nbt(&palette.to_nbt()).unwrap();
        let names: Vec<String> = decoded.iter().map(|b| b.to_string()).collect();
        assert_eq!(
            names,
            vec!["minecraft:air", "minecraft:grass_block[snowy=false]", "minecraft:dirt"]
        );
    }

    #[test]
    fn empty_palette_is_a_format_error() {
        assert!(Palette::from_nbt(&Value::List(vec![])).unwrap_err().is_format());
        assert!(Palette::from_nbt(&Value::Int(0)).unwrap_err().is_format());
    }
}
