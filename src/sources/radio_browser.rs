use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::StationDirectory;
use crate::{
    catalog::{parse_stream_url, Station},
    error::ResolveError,
};

const USER_AGENT: &str = concat!("open-radio/", env!("CARGO_PKG_VERSION"));
const SEARCH_LIMIT: usize = 100;

/// Cliente mínimo de la API pública de Radio Browser.
pub struct RadioBrowserClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiStation {
    name: String,
    #[serde(default)]
    url_resolved: String,
    #[serde(default)]
    tags: String,
}

impl RadioBrowserClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self, tags: &[String]) -> String {
        format!(
            "{}/json/stations/search?tagList={}&hidebroken=true&order=clickcount&reverse=true&limit={}",
            self.base_url,
            urlencoding::encode(&tags.join(",")),
            SEARCH_LIMIT
        )
    }
}

#[async_trait]
impl StationDirectory for RadioBrowserClient {
    async fn search_by_tags(&self, tags: &[String]) -> Result<Vec<Station>, ResolveError> {
        let url = self.search_url(tags);
        debug!("🌐 Radio Browser: {}", url);

        let results: Vec<ApiStation> = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ResolveError::Directory(e.to_string()))?
            .json()
            .await
            .map_err(|e| ResolveError::Directory(e.to_string()))?;

        Ok(into_stations(results))
    }
}

/// Descarta resultados sin URL resuelta válida.
fn into_stations(results: Vec<ApiStation>) -> Vec<Station> {
    let total = results.len();
    let stations: Vec<Station> = results
        .into_iter()
        .filter_map(|api| {
            let url = parse_stream_url(&api.url_resolved)?;
            let name = api.name.trim();
            let name = if name.is_empty() { url.as_str() } else { name }.to_string();
            Some(Station::new(name, url, api.tags.split(',')))
        })
        .collect();

    if stations.len() < total {
        warn!(
            "⚠️ {} de {} estaciones remotas descartadas por URL inválida",
            total - stations.len(),
            total
        );
    }
    stations
}
