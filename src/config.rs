/// Settings for chunks this crate creates and for the vertical extent of the world it writes to.
///
/// ```rust
/// use anvil_codec::config::Config;
/// let config = Config {
///     min_y: 0,
///     max_y: 255,
///     ..Config::default()
/// };
/// assert_eq!(config.status, "minecraft:full");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// `DataVersion` stamped on new chunks. 3465 is Minecraft 1.20.1.
    pub data_version: i32,
    /// `Status` stamped on new chunks.
    pub status: String,
    /// Lowest block Y of the world. Also what a height query returns for an empty column.
    pub min_y: i32,
    /// Highest block Y of the world, inclusive.
    pub max_y: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_version: 3465,
            status: String::from("minecraft:full"),
            min_y: -64,
            max_y: 319,
        }
    }
}

impl Config {
    pub fn contains_y(&self, y: i32) -> bool {
        (self.min_y..=self.max_y).contains(&y)
    }
}
