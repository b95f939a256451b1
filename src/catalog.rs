//! # Station Catalog
//!
//! Static list of named radio stations loaded from a TOML file at startup.
//!
//! ```toml
//! [[stations]]
//! name = "Jazz FM"
//! stream_url = "https://example.com/jazz.mp3"
//! tags = ["jazz", "chill"]
//! ```
//!
//! The catalog is immutable after [`StationCatalog::load`] and is shared
//! between every guild session behind an `Arc`, without locking.

use config::{File, FileFormat};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};
use tracing::{info, warn};
use url::Url;

use crate::error::CatalogError;

/// Una estación de radio con nombre único dentro del catálogo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Station {
    pub name: String,
    pub stream_url: Url,
    pub tags: BTreeSet<String>,
}

impl Station {
    pub fn new<I, S>(name: impl Into<String>, stream_url: Url, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            stream_url,
            tags: normalize_tags(tags),
        }
    }

    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| self.tags.contains(tag))
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    stations: Vec<RawStation>,
}

#[derive(Debug, Deserialize)]
struct RawStation {
    name: Option<String>,
    stream_url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    stations: Vec<Station>,
}

impl StationCatalog {
    /// Carga el catálogo desde disco.
    ///
    /// Si `path` es relativo y no existe, también se busca junto al ejecutable.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let resolved = locate(path)?;
        info!("📻 Cargando estaciones desde {}", resolved.display());

        let settings = config::Config::builder()
            .add_source(File::from(resolved).format(FileFormat::Toml))
            .build()?;

        Self::from_raw(settings.try_deserialize()?)
    }

    /// Parsea el catálogo desde un string TOML.
    pub fn from_toml(raw: &str) -> Result<Self, CatalogError> {
        let settings = config::Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?;

        Self::from_raw(settings.try_deserialize()?)
    }

    fn from_raw(raw: RawCatalog) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        let mut stations = Vec::with_capacity(raw.stations.len());

        for (index, entry) in raw.stations.into_iter().enumerate() {
            let name = entry
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .ok_or(CatalogError::MissingField { index, field: "name" })?;

            let raw_url = entry
                .stream_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .ok_or(CatalogError::MissingField { index, field: "stream_url" })?;

            let stream_url = parse_stream_url(&raw_url).ok_or_else(|| CatalogError::InvalidUrl {
                name: name.clone(),
                url: raw_url.clone(),
            })?;

            if !seen.insert(name.to_lowercase()) {
                return Err(CatalogError::DuplicateName(name));
            }

            stations.push(Station::new(name, stream_url, entry.tags));
        }

        if stations.is_empty() {
            warn!("⚠️ El catálogo no contiene estaciones");
        } else {
            info!("✅ {} estaciones cargadas", stations.len());
        }

        Ok(Self { stations })
    }

    /// Busca una estación por nombre, sin distinguir mayúsculas.
    pub fn lookup(&self, name: &str) -> Option<&Station> {
        let wanted = name.trim().to_lowercase();
        self.stations
            .iter()
            .find(|station| station.name.to_lowercase() == wanted)
    }

    /// Estaciones cuyo conjunto de etiquetas intersecta `tags`.
    ///
    /// Un resultado vacío es válido y significa "sin coincidencias".
    pub fn filter_by_tags(&self, tags: &[String]) -> Vec<&Station> {
        let wanted: Vec<String> = normalize_tags(tags).into_iter().collect();
        self.stations
            .iter()
            .filter(|station| station.has_any_tag(&wanted))
            .collect()
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn names(&self) -> Vec<&str> {
        self.stations.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Elección uniforme entre candidatos. Error si no hay ninguno.
pub fn random_choice<T>(candidates: &[T]) -> Result<&T, CatalogError> {
    candidates
        .choose(&mut rand::thread_rng())
        .ok_or(CatalogError::NoCandidates)
}

/// Acepta solo URLs absolutas http(s) con host.
pub fn parse_stream_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}

fn normalize_tags<I, S>(tags: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tags.into_iter()
        .map(|t| t.as_ref().trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn locate(path: &Path) -> Result<PathBuf, CatalogError> {
    let mut searched = vec![path.to_path_buf()];
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    if path.is_relative() {
        if let Some(dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
            let candidate = dir.join(path);
            if candidate.exists() {
                return Ok(candidate);
            }
            searched.push(candidate);
        }
    }

    Err(CatalogError::NotFound { searched })
}
