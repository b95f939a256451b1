//! # Audio Source Resolver
//!
//! Turns a user request into something the guild session can play:
//!
//! - station name → catalog lookup ([`Resolver::resolve_station`])
//! - comma separated tags → random matching station ([`Resolver::resolve_tagged`])
//! - URL or search text → on-demand track via yt-dlp ([`Resolver::resolve_on_demand`])
//!
//! External tools sit behind two traits so the resolver and the sessions can
//! be exercised without network access: [`Extractor`] (yt-dlp) and
//! [`StationDirectory`] (Radio Browser).

pub mod radio_browser;
pub mod youtube;

use async_trait::async_trait;
use regex::Regex;
use serenity::model::id::UserId;
use std::{sync::{Arc, OnceLock}, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

pub use radio_browser::RadioBrowserClient;
pub use youtube::YtDlpClient;

use crate::{
    audio::queue::QueueItem,
    catalog::{random_choice, Station, StationCatalog},
    error::ResolveError,
};

/// Petición on-demand ya clasificada: URL directa o texto de búsqueda.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnDemandQuery {
    Url(Url),
    Search(String),
}

impl OnDemandQuery {
    /// Único punto donde se decide si la entrada es URL o búsqueda.
    ///
    /// Las URLs de YouTube sin esquema (`youtu.be/...`) también cuentan.
    pub fn classify(input: &str) -> Self {
        let input = input.trim();

        if let Ok(url) = Url::parse(input) {
            if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() {
                return Self::Url(url);
            }
        }

        if schemeless_youtube().is_match(input) {
            if let Ok(url) = Url::parse(&format!("https://{}", input)) {
                return Self::Url(url);
            }
        }

        Self::Search(input.to_string())
    }

    /// Argumento para yt-dlp.
    pub fn target(&self) -> String {
        match self {
            Self::Url(url) => url.to_string(),
            Self::Search(text) => format!("ytsearch1:{}", text),
        }
    }
}

impl std::fmt::Display for OnDemandQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{}", url),
            Self::Search(text) => write!(f, "{}", text),
        }
    }
}

fn schemeless_youtube() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/\S+$")
            .expect("patrón de URL de YouTube válido")
    })
}

/// Metadata de un track resuelto por el extractor.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackInfo {
    pub title: String,
    pub page_url: String,
    pub duration: Option<Duration>,
    pub is_live: bool,
}

/// Herramienta externa de extracción (yt-dlp).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resuelve una URL o la primera coincidencia de una búsqueda.
    async fn lookup(&self, query: &OnDemandQuery) -> Result<TrackInfo, ResolveError>;

    /// Obtiene la URL directa del audio para una página ya resuelta.
    async fn stream_url(&self, page_url: &str) -> Result<String, ResolveError>;
}

/// Directorio remoto de estaciones, consultado por etiquetas.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StationDirectory: Send + Sync {
    async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<Station>, ResolveError>;
}

/// Resultado de `/play` con o sin nombre de estación.
#[derive(Debug, Clone, PartialEq)]
pub enum StationChoice {
    Found(Station),
    /// Sin nombre: hay que mostrar el selector al usuario.
    Prompt,
}

pub struct Resolver {
    catalog: Arc<StationCatalog>,
    extractor: Arc<dyn Extractor>,
    directory: Option<Arc<dyn StationDirectory>>,
}

impl Resolver {
    pub fn new(
        catalog: Arc<StationCatalog>,
        extractor: Arc<dyn Extractor>,
        directory: Option<Arc<dyn StationDirectory>>,
    ) -> Self {
        Self {
            catalog,
            extractor,
            directory,
        }
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn resolve_station(&self, name: Option<&str>) -> Result<StationChoice, ResolveError> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(StationChoice::Prompt);
        };

        self.catalog
            .lookup(name)
            .cloned()
            .map(StationChoice::Found)
            .ok_or_else(|| ResolveError::StationNotFound {
                name: name.to_string(),
                available: self.catalog.names().join(", "),
            })
    }

    pub async fn resolve_tagged(&self, tag_csv: &str) -> Result<Station, ResolveError> {
        let tags = parse_tags(tag_csv);
        if tags.is_empty() {
            return Err(ResolveError::NoMatch(tag_csv.trim().to_string()));
        }

        let local = self.catalog.filter_by_tags(&tags);
        if let Ok(station) = random_choice(&local) {
            info!("🏷️ Estación del catálogo para {:?}: {}", tags, station.name);
            return Ok((*station).clone());
        }

        let Some(directory) = &self.directory else {
            return Err(ResolveError::NoMatch(tags.join(", ")));
        };

        debug!("🌐 Sin coincidencias locales para {:?}, consultando directorio", tags);
        let remote = directory.search_by_tags(&tags).await?;
        match random_choice(&remote) {
            Ok(station) => {
                info!(
                    "📡 Estación remota para {:?}: {} ({} candidatas)",
                    tags,
                    station.name,
                    remote.len()
                );
                Ok(station.clone())
            }
            Err(_) => {
                warn!("⚠️ No hay estaciones para las etiquetas {:?}", tags);
                Err(ResolveError::NoMatch(tags.join(", ")))
            }
        }
    }

    pub async fn resolve_on_demand(
        &self,
        query: &OnDemandQuery,
        requested_by: UserId,
    ) -> Result<QueueItem, ResolveError> {
        info!("🔍 Resolviendo on-demand: {}", query);
        let info = self.extractor.lookup(query).await?;
        Ok(QueueItem::new(info, requested_by))
    }
}

/// Separa por comas si las hay; si no, por espacios.
pub fn parse_tags(raw: &str) -> Vec<String> {
    let parts: Vec<&str> = if raw.contains(',') {
        raw.split(',').collect()
    } else {
        raw.split_whitespace().collect()
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in parts.into_iter().map(|t| t.trim().to_lowercase()) {
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CATALOG: &str = r#"
        [[stations]]
        name = "Jazz FM"
        stream_url = "https://example.com/jazz"
        tags = ["jazz", "chill"]

        [[stations]]
        name = "Rock Radio"
        stream_url = "https://example.com/rock"
        tags = ["rock"]
    "#;

    fn catalog() -> Arc<StationCatalog> {
        Arc::new(StationCatalog::from_toml(CATALOG).unwrap())
    }

    fn resolver(
        extractor: MockExtractor,
        directory: Option<MockStationDirectory>,
    ) -> Resolver {
        Resolver::new(
            catalog(),
            Arc::new(extractor),
            directory.map(|d| Arc::new(d) as Arc<dyn StationDirectory>),
        )
    }

    #[test]
    fn classify_urls_and_searches() {
        assert!(matches!(
            OnDemandQuery::classify("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            OnDemandQuery::Url(_)
        ));
        assert!(matches!(
            OnDemandQuery::classify("  http://example.com/song.mp3 "),
            OnDemandQuery::Url(_)
        ));
        assert_eq!(
            OnDemandQuery::classify("youtu.be/dQw4w9WgXcQ"),
            OnDemandQuery::Url(Url::parse("https://youtu.be/dQw4w9WgXcQ").unwrap())
        );
        assert_eq!(
            OnDemandQuery::classify("daft punk around the world"),
            OnDemandQuery::Search("daft punk around the world".to_string())
        );
        // "mailto:" y similares no son fuentes reproducibles
        assert!(matches!(
            OnDemandQuery::classify("mailto:someone@example.com"),
            OnDemandQuery::Search(_)
        ));
    }

    #[test]
    fn search_target_uses_first_result() {
        assert_eq!(
            OnDemandQuery::Search("lofi".into()).target(),
            "ytsearch1:lofi"
        );
    }

    #[test]
    fn parse_tags_splits_on_commas_or_spaces() {
        assert_eq!(parse_tags("Rock, Pop ,,jazz"), vec!["rock", "pop", "jazz"]);
        assert_eq!(parse_tags("rock pop rock"), vec!["rock", "pop"]);
        assert!(parse_tags("  , ").is_empty());
    }

    #[test]
    fn resolve_station_lookup_and_prompt() {
        let resolver = resolver(MockExtractor::new(), None);

        assert_eq!(resolver.resolve_station(None).unwrap(), StationChoice::Prompt);
        assert_eq!(resolver.resolve_station(Some("  ")).unwrap(), StationChoice::Prompt);

        match resolver.resolve_station(Some("jazz fm")).unwrap() {
            StationChoice::Found(station) => assert_eq!(station.name, "Jazz FM"),
            other => panic!("esperaba estación, obtuve {:?}", other),
        }

        let err = resolver.resolve_station(Some("Classical")).unwrap_err();
        assert!(matches!(err, ResolveError::StationNotFound { ref available, .. } if available == "Jazz FM, Rock Radio"));
    }

    #[tokio::test]
    async fn resolve_tagged_prefers_catalog() {
        let mut directory = MockStationDirectory::new();
        directory.expect_search_by_tags().never();
        let resolver = resolver(MockExtractor::new(), Some(directory));

        let station = resolver.resolve_tagged("jazz").await.unwrap();
        assert_eq!(station.name, "Jazz FM");
    }

    #[tokio::test]
    async fn resolve_tagged_falls_back_to_directory() {
        let mut directory = MockStationDirectory::new();
        directory
            .expect_search_by_tags()
            .withf(|tags| tags.len() == 1 && tags[0] == "metal")
            .times(1)
            .returning(|_| {
                Ok(vec![Station::new(
                    "Metal Remote",
                    Url::parse("https://metal.example.com/live").unwrap(),
                    ["metal"],
                )])
            });
        let resolver = resolver(MockExtractor::new(), Some(directory));

        let station = resolver.resolve_tagged("metal").await.unwrap();
        assert_eq!(station.name, "Metal Remote");
    }

    #[tokio::test]
    async fn resolve_tagged_without_matches_fails() {
        let resolver_local = resolver(MockExtractor::new(), None);
        assert!(matches!(
            resolver_local.resolve_tagged("metal").await,
            Err(ResolveError::NoMatch(_))
        ));

        let mut directory = MockStationDirectory::new();
        directory.expect_search_by_tags().returning(|_| Ok(Vec::new()));
        let resolver_remote = resolver(MockExtractor::new(), Some(directory));
        assert!(matches!(
            resolver_remote.resolve_tagged("metal").await,
            Err(ResolveError::NoMatch(_))
        ));

        assert!(matches!(
            resolver_local.resolve_tagged(" , ").await,
            Err(ResolveError::NoMatch(_))
        ));
    }

    #[tokio::test]
    async fn resolve_on_demand_builds_queue_item() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_lookup()
            .withf(|q| matches!(q, OnDemandQuery::Search(text) if text == "lofi beats"))
            .returning(|_| {
                Ok(TrackInfo {
                    title: "Lofi Beats".into(),
                    page_url: "https://www.youtube.com/watch?v=abc".into(),
                    duration: Some(Duration::from_secs(200)),
                    is_live: false,
                })
            });
        let resolver = resolver(extractor, None);

        let item = resolver
            .resolve_on_demand(&OnDemandQuery::classify("lofi beats"), UserId::new(42))
            .await
            .unwrap();

        assert_eq!(item.title, "Lofi Beats");
        assert_eq!(item.source_url, "https://www.youtube.com/watch?v=abc");
        assert_eq!(item.requested_by, UserId::new(42));
    }

    #[tokio::test]
    async fn resolve_on_demand_propagates_extraction_errors() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_lookup()
            .returning(|q| Err(ResolveError::NoResults(q.to_string())));
        let resolver = resolver(extractor, None);

        let err = resolver
            .resolve_on_demand(&OnDemandQuery::classify("zzzz"), UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NoResults(_)));
    }
}
