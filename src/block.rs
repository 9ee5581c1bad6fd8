use core::fmt;
use std::collections::BTreeMap;

use nbt::Value;

use crate::error::{Error, Result};

pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// A block type together with its state properties, e.g. `minecraft:oak_stairs[facing=east]`.
///
/// Two blocks are equal when their names and full property sets match. Properties are kept
/// sorted by name, so the order they were supplied in never matters.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Block {
    namespace: String,
    pub id: String,
    properties: BTreeMap<String, String>,
}

impl Block {
    pub fn new<N: Into<String>, I: Into<String>>(namespace: N, id: I) -> Block {
        Block {
            namespace: namespace.into(),
            id: id.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Parses a namespaced name such as `minecraft:stone`. A bare `stone` is placed in the
    /// `minecraft` namespace.
    pub fn from_name(name: &str) -> Block {
        match name.split_once(':') {
            Some((namespace, id)) => Block::new(namespace, id),
            None => Block::new(DEFAULT_NAMESPACE, name),
        }
    }

    pub fn air() -> Block {
        Block::new(DEFAULT_NAMESPACE, "air")
    }

    pub fn with_property<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Block {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> String {
        format!("{}:{}", self.namespace, self.id)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn is_air(&self) -> bool {
        self.namespace == DEFAULT_NAMESPACE && self.id == "air"
    }

    /// The key a palette deduplicates on: `name[k1=v1,k2=v2]`, properties in name order.
    pub fn canonical_key(&self) -> String {
        let properties: Vec<String> = self
            .properties
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        format!("{}[{}]", self.name(), properties.join(","))
    }

    /// Reads one entry of a `block_states` palette: a compound with a `Name` string and an
    /// optional `Properties` compound of strings.
    pub fn from_palette(tag: &Value) -> Result<Block> {
        let tag = if let Value::Compound(t) = tag {
            t
        } else {
            return Err(Error::Format(format!(
                "palette entry is a {}, expected a compound",
                tag.tag_name()
            )));
        };
        let name = match tag.get("Name") {
            Some(Value::String(n)) => n,
            _ => return Err(Error::Format("palette entry without a Name".to_string())),
        };
        let mut block = Block::from_name(name);

        match tag.get("Properties") {
            None => {}
            Some(Value::Compound(properties)) => {
                for (key, value) in properties {
                    match value {
                        Value::String(v) => {
                            block.properties.insert(key.clone(), v.clone());
                        }
                        other => {
                            return Err(Error::Format(format!(
                                "property {} of {} is a {}, expected a string",
                                key,
                                name,
                                other.tag_name()
                            )))
                        }
                    }
                }
            }
            Some(other) => {
                return Err(Error::Format(format!(
                    "Properties of {} is a {}, expected a compound",
                    name,
                    other.tag_name()
                )))
            }
        }
        Ok(block)
    }

    /// Builds the palette entry [`Block::from_palette`] reads. `Properties` is left out when
    /// there are none.
    pub fn to_palette(&self) -> Value {
        let mut entry = vec![("Name".to_string(), Value::String(self.name()))];
        if !self.properties.is_empty() {
            let properties = self
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            entry.push(("Properties".to_string(), Value::Compound(properties)));
        }
        Value::Compound(entry.into_iter().collect())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)?;
        if !self.properties.is_empty() {
            let properties: Vec<String> = self
                .properties
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "[{}]", properties.join(","))?;
        }
        Ok(())
    }
}
