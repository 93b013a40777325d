mod npy;
pub mod source;

use queue_vision::{Detection, PixelBox};
use serde::Deserialize;
use std::str::FromStr;

pub use source::{load_zones, ZoneSourceError};

/// Axis-aligned queue lane in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Zone {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl Zone {
    pub fn new(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self { xmin, ymin, xmax, ymax }
    }

    pub fn is_degenerate(&self) -> bool {
        self.xmin >= self.xmax || self.ymin >= self.ymax
    }

    pub fn contains(&self, b: &PixelBox, rule: ContainmentRule) -> bool {
        let horizontal = b.xmin > self.xmin && b.xmax < self.xmax;
        match rule {
            ContainmentRule::Horizontal => horizontal,
            ContainmentRule::Full => horizontal && b.ymin > self.ymin && b.ymax < self.ymax,
        }
    }
}

/// When a detection box counts as standing in a zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainmentRule {
    /// Box strictly inside the zone's x-extent; y is ignored (queues are lanes).
    #[default]
    Horizontal,
    /// Box strictly inside the zone on both axes.
    Full,
}

impl FromStr for ContainmentRule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "horizontal" => Ok(Self::Horizontal),
            "full" => Ok(Self::Full),
            other => anyhow::bail!("unknown containment rule: {} (expected horizontal or full)", other),
        }
    }
}

/// Ordered zones. Ids are 1-based positions in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneRegistry {
    zones: Vec<Zone>,
}

impl ZoneRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `zone` and returns its id.
    pub fn add_zone(&mut self, zone: Zone) -> usize {
        self.zones.push(zone);
        self.zones.len()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Zone)> {
        self.zones.iter().enumerate().map(|(i, z)| (i + 1, z))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

impl FromIterator<Zone> for ZoneRegistry {
    fn from_iter<I: IntoIterator<Item = Zone>>(iter: I) -> Self {
        Self { zones: iter.into_iter().collect() }
    }
}

/// Per-zone head count for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OccupancyCount {
    counts: Vec<u32>,
}

impl OccupancyCount {
    /// Count for zone `id` (1-based).
    pub fn get(&self, id: usize) -> Option<u32> {
        id.checked_sub(1).and_then(|i| self.counts.get(i)).copied()
    }

    /// `(zone id, count)` in zone order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u32)> + '_ {
        self.counts.iter().enumerate().map(|(i, c)| (i + 1, *c))
    }
}

impl std::fmt::Display for OccupancyCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("{")?;
        for (i, (id, c)) in self.iter().enumerate() {
            if i > 0 { f.write_str(", ")?; }
            write!(f, "{}: {}", id, c)?;
        }
        f.write_str("}")
    }
}

/// Counts every (detection, zone) pair that satisfies `rule`.
pub fn count_occupancy(zones: &ZoneRegistry, detections: &[Detection], rule: ContainmentRule) -> OccupancyCount {
    let counts = zones
        .zones()
        .iter()
        .map(|z| detections.iter().filter(|d| z.contains(&d.bbox, rule)).count() as u32)
        .collect();
    OccupancyCount { counts }
}
