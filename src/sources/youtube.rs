use async_trait::async_trait;
use serde::Deserialize;
use std::{process::Stdio, time::Duration};
use tokio::{process::Command, sync::Semaphore, time::timeout};
use tracing::{debug, info, warn};

use super::{Extractor, OnDemandQuery, TrackInfo};
use crate::error::ResolveError;

/// Cliente de yt-dlp.
///
/// Cada invocación corre como proceso hijo con `kill_on_drop`, limitada por
/// un timeout, así que una extracción colgada nunca bloquea la sesión.
pub struct YtDlpClient {
    binary: String,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    webpage_url: Option<String>,
    original_url: Option<String>,
    url: Option<String>,
    duration: Option<f64>,
    is_live: Option<bool>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Extraction(e.to_string()))?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ResolveError::Timeout(self.timeout))?
            .map_err(|e| ResolveError::Extraction(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp terminó con {}: {}", output.status, stderr.trim());
            return Err(ResolveError::Extraction(first_error_line(&stderr)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Extractor for YtDlpClient {
    async fn lookup(&self, query: &OnDemandQuery) -> Result<TrackInfo, ResolveError> {
        let target = query.target();
        debug!("📊 Obteniendo info de: {}", target);

        let stdout = self
            .run(&[
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "--default-search",
                "ytsearch",
                &target,
            ])
            .await?;

        let info = parse_dump_json(&stdout).ok_or_else(|| ResolveError::NoResults(query.to_string()))?;
        info!("🎵 Resuelto '{}' -> {}", query, info.title);
        Ok(info)
    }

    async fn stream_url(&self, page_url: &str) -> Result<String, ResolveError> {
        debug!("🎵 Obteniendo URL de stream para: {}", page_url);

        let stdout = self
            .run(&[
                "--no-playlist",
                "-f",
                "bestaudio[abr>=128]/bestaudio/best",
                "--get-url",
                "--no-warnings",
                page_url,
            ])
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::Extraction("yt-dlp no devolvió URL de stream".into()))
    }
}

/// Toma la primera línea JSON válida de la salida de `--dump-json`.
fn parse_dump_json(stdout: &str) -> Option<TrackInfo> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
        .find_map(|info| {
            let page_url = info.webpage_url.or(info.original_url).or(info.url)?;
            Some(TrackInfo {
                title: info.title,
                page_url,
                duration: info
                    .duration
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .map(Duration::from_secs_f64),
                is_live: info.is_live.unwrap_or(false),
            })
        })
}

fn first_error_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .find(|line| line.starts_with("ERROR"))
        .or_else(|| stderr.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("yt-dlp falló sin mensaje")
        .to_string()
}
