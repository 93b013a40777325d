//! Zone files.
//!
//! Two formats are understood, picked by extension:
//! - `.toml`: one `[[zone]]` table per lane with `xmin`, `ymin`, `xmax`, `ymax`.
//! - `.npy`: a NumPy array of shape `(N, 4)` holding `xmin, ymin, xmax, ymax` rows.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::npy::{self, NpyError};
use crate::{Zone, ZoneRegistry};

#[derive(Debug, thiserror::Error)]
pub enum ZoneSourceError {
    #[error("no zone file configured")]
    Missing,
    #[error("read zone file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse zone toml {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("parse zone npy {path}: {source}")]
    Npy {
        path: PathBuf,
        #[source]
        source: NpyError,
    },
    #[error("zone coordinate {value} in {path} does not fit in 32 bits")]
    OutOfRange { path: PathBuf, value: i64 },
    #[error("unsupported zone file extension: {0} (expected .toml or .npy)")]
    UnknownFormat(PathBuf),
}

#[derive(Debug, Deserialize)]
struct ZoneFile {
    #[serde(default)]
    zone: Vec<Zone>,
}

/// Loads the registry from `path`. Callers treat errors as non-fatal.
pub fn load_zones(path: Option<&Path>) -> Result<ZoneRegistry, ZoneSourceError> {
    let path = path.ok_or(ZoneSourceError::Missing)?;
    let io_err = |source| ZoneSourceError::Io { path: path.to_path_buf(), source };

    let zones: Vec<Zone> = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let s = std::fs::read_to_string(path).map_err(io_err)?;
            parse_toml(&s).map_err(|source| ZoneSourceError::Toml { path: path.to_path_buf(), source })?
        }
        Some("npy") => {
            let bytes = std::fs::read(path).map_err(io_err)?;
            let rows = npy::read_rows4(&bytes)
                .map_err(|source| ZoneSourceError::Npy { path: path.to_path_buf(), source })?;
            let coord = |v: i64| {
                i32::try_from(v).map_err(|_| ZoneSourceError::OutOfRange { path: path.to_path_buf(), value: v })
            };
            rows.into_iter()
                .map(|[xmin, ymin, xmax, ymax]| -> Result<Zone, ZoneSourceError> {
                    Ok(Zone::new(coord(xmin)?, coord(ymin)?, coord(xmax)?, coord(ymax)?))
                })
                .collect::<Result<_, _>>()?
        }
        _ => return Err(ZoneSourceError::UnknownFormat(path.to_path_buf())),
    };

    let mut reg = ZoneRegistry::new();
    for z in zones {
        let id = reg.add_zone(z);
        if z.is_degenerate() {
            warn!("zones: zone {} {:?} has no area and will never be occupied", id, z);
        }
    }
    info!("zones: loaded {} zone(s) from {}", reg.len(), path.display());
    Ok(reg)
}

fn parse_toml(s: &str) -> Result<Vec<Zone>, toml::de::Error> {
    Ok(toml::from_str::<ZoneFile>(s)?.zone)
}
