//! Tablet inclusion filters.
//!
//! A watcher can be restricted to a subset of the cell: either to a list of
//! keyspaces, or to a list of `keyspace|shard` entries where the shard is an exact
//! name (`0`, `customer_1`) or a key range (`-80`, `40-c0`, `80-`).

use std::collections::HashMap;
use std::collections::HashSet;

use tracing::warn;

use crate::config::FilterConfig;
use crate::Error;
use crate::Result;
use crate::TabletListing;
use crate::TabletRecord;

#[derive(Debug, Clone, Default)]
pub enum TabletFilter {
    /// Every tablet is included
    #[default]
    None,
    Shard(FilterByShard),
    Keyspace(FilterByKeyspace),
}

impl TabletFilter {
    pub fn by_shard<S: AsRef<str>>(filters: &[S]) -> Result<Self> {
        Ok(TabletFilter::Shard(FilterByShard::new(filters)?))
    }

    pub fn by_keyspace<S: AsRef<str>>(keyspaces: &[S]) -> Self {
        TabletFilter::Keyspace(FilterByKeyspace::new(keyspaces))
    }

    /// Builds the filter described by configuration. Shard and keyspace filters are
    /// mutually exclusive.
    pub fn from_config(config: &FilterConfig) -> Result<Self> {
        match (config.shards.is_empty(), config.keyspaces.is_empty()) {
            (true, true) => Ok(TabletFilter::None),
            (false, true) => Self::by_shard(config.shards.as_slice()),
            (true, false) => Ok(Self::by_keyspace(config.keyspaces.as_slice())),
            (false, false) => Err(Error::InvalidConfig(
                "filter.shards and filter.keyspaces cannot both be set".into(),
            )),
        }
    }

    pub fn is_included(
        &self,
        tablet: &TabletRecord,
    ) -> bool {
        self.includes(&tablet.keyspace, &tablet.shard)
    }

    pub fn is_listing_included(
        &self,
        listing: &TabletListing,
    ) -> bool {
        self.includes(&listing.keyspace, &listing.shard)
    }

    fn includes(
        &self,
        keyspace: &str,
        shard: &str,
    ) -> bool {
        match self {
            TabletFilter::None => true,
            TabletFilter::Shard(f) => f.includes(keyspace, shard),
            TabletFilter::Keyspace(f) => f.includes(keyspace),
        }
    }
}

/// Half-open key range `[start, end)`; an empty bound is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    /// `self` fully covers `other`.
    pub fn contains_range(
        &self,
        other: &KeyRange,
    ) -> bool {
        // an empty start is the lowest possible key, so it compares naturally
        let start_ok = trim_zeros(&self.start) <= trim_zeros(&other.start);
        let end_ok = self.end.is_empty()
            || (!other.end.is_empty() && trim_zeros(&other.end) <= trim_zeros(&self.end));
        start_ok && end_ok
    }
}

// "80" and "8000" denote the same boundary
fn trim_zeros(bound: &[u8]) -> &[u8] {
    let len = bound.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    &bound[..len]
}

/// Validates a shard name. Returns the canonical name and, for key range shards,
/// the parsed range.
pub fn parse_shard_name(shard: &str) -> Result<(String, Option<KeyRange>)> {
    if !shard.contains('-') {
        return Ok((shard.to_string(), None));
    }

    let mut parts = shard.split('-');
    let (start, end) = match (parts.next(), parts.next(), parts.next()) {
        (Some(start), Some(end), None) => (start, end),
        _ => {
            return Err(Error::InvalidFilterSpec(format!(
                "key range {shard} must have exactly one '-'"
            )))
        }
    };
    let start_bytes = decode_hex(start)
        .ok_or_else(|| Error::InvalidFilterSpec(format!("invalid start bound in key range {shard}")))?;
    let end_bytes = decode_hex(end)
        .ok_or_else(|| Error::InvalidFilterSpec(format!("invalid end bound in key range {shard}")))?;
    if !start_bytes.is_empty() && !end_bytes.is_empty() && trim_zeros(&start_bytes) >= trim_zeros(&end_bytes) {
        return Err(Error::InvalidFilterSpec(format!(
            "key range {shard} start must be lower than end"
        )));
    }

    let canonical = format!("{}-{}", start.to_ascii_lowercase(), end.to_ascii_lowercase());
    Ok((
        canonical,
        Some(KeyRange {
            start: start_bytes,
            end: end_bytes,
        }),
    ))
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.bytes().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| s.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
        .collect()
}

#[derive(Debug, Clone)]
struct ShardEntry {
    shard: String,
    key_range: Option<KeyRange>,
}

/// Includes tablets whose keyspace is listed and whose shard matches one of that
/// keyspace's entries exactly or lies inside one of its key ranges.
#[derive(Debug, Clone, Default)]
pub struct FilterByShard {
    filters: HashMap<String, Vec<ShardEntry>>,
}

impl FilterByShard {
    pub fn new<S: AsRef<str>>(filters: &[S]) -> Result<Self> {
        let mut by_keyspace: HashMap<String, Vec<ShardEntry>> = HashMap::new();
        for filter in filters {
            let filter = filter.as_ref();
            let (keyspace, shard) = match filter.split_once('|') {
                Some((keyspace, shard)) if !shard.contains('|') => (keyspace, shard),
                _ => {
                    return Err(Error::InvalidFilterSpec(format!(
                        "expected keyspace|shard, got {filter}"
                    )))
                }
            };
            let (canonical, key_range) = parse_shard_name(shard)?;

            let entries = by_keyspace.entry(keyspace.to_string()).or_default();
            if entries.iter().any(|e| e.shard == canonical) {
                return Err(Error::InvalidFilterSpec(format!(
                    "duplicate {keyspace}/{shard} entry"
                )));
            }
            entries.push(ShardEntry {
                shard: canonical,
                key_range,
            });
        }
        Ok(Self {
            filters: by_keyspace,
        })
    }

    fn includes(
        &self,
        keyspace: &str,
        shard: &str,
    ) -> bool {
        let Some(entries) = self.filters.get(keyspace) else {
            return false;
        };
        let (canonical, key_range) = match parse_shard_name(shard) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("ignoring tablet in {}/{}: {}", keyspace, shard, e);
                return false;
            }
        };

        entries.iter().any(|entry| {
            entry.shard == canonical
                || matches!(
                    (&entry.key_range, &key_range),
                    (Some(outer), Some(inner)) if outer.contains_range(inner)
                )
        })
    }
}

/// Includes tablets of the listed keyspaces, any shard.
#[derive(Debug, Clone, Default)]
pub struct FilterByKeyspace {
    keyspaces: HashSet<String>,
}

impl FilterByKeyspace {
    pub fn new<S: AsRef<str>>(keyspaces: &[S]) -> Self {
        Self {
            keyspaces: keyspaces.iter().map(|k| k.as_ref().to_string()).collect(),
        }
    }

    fn includes(
        &self,
        keyspace: &str,
    ) -> bool {
        self.keyspaces.contains(keyspace)
    }
}
