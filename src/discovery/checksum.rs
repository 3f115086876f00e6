use std::collections::BTreeMap;

use crate::MapKey;
use crate::TabletRecord;

/// Checksum of an empty tracked set.
pub const EMPTY_TOPO_CHECKSUM: u32 = 0;

/// CRC32 (IEEE) over the sorted alias strings of the tracked tablets.
///
/// Depends only on which aliases are tracked, so a tablet moving to a new address
/// keeps the checksum stable while an add or remove changes it.
pub fn topo_checksum(tracked: &BTreeMap<MapKey, TabletRecord>) -> u32 {
    let mut aliases: Vec<String> = tracked.values().map(|t| t.alias.to_string()).collect();
    aliases.sort_unstable();

    let mut hasher = crc32fast::Hasher::new();
    for alias in &aliases {
        hasher.update(alias.as_bytes());
    }
    hasher.finalize()
}
