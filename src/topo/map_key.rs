use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::TabletRecord;

/// Port name every serving tablet exposes.
pub const CANONICAL_PORT_NAME: &str = "vt";

/// Address identity of a tablet as known to the health registry.
///
/// Built from the hostname and every `name:port` pair (sorted by name), so a
/// restart on another host or port yields a new key even though the alias is
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapKey(String);

impl MapKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&TabletRecord> for MapKey {
    fn from(tablet: &TabletRecord) -> Self {
        tablet_to_map_key(tablet)
    }
}

impl fmt::Display for MapKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn tablet_to_map_key(tablet: &TabletRecord) -> MapKey {
    let mut key = tablet.hostname.clone();
    // port_map is a BTreeMap, iteration is already sorted by name
    for (name, port) in &tablet.port_map {
        key.push(',');
        key.push_str(name);
        key.push(':');
        key.push_str(&port.to_string());
    }
    MapKey(key)
}

/// The `vt` port of a tablet, if it has one.
pub fn canonical_port(tablet: &TabletRecord) -> Option<u32> {
    tablet.port_map.get(CANONICAL_PORT_NAME).copied()
}
