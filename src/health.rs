use anyhow::{bail, Context, Result};
use tracing::debug;

/// Versiones detectadas de las herramientas externas.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolVersions {
    pub ytdlp: String,
    pub ffmpeg: String,
}

/// Verifica que yt-dlp y ffmpeg existan y respondan.
pub async fn verify_dependencies(ytdlp_path: &str, ffmpeg_path: &str) -> Result<ToolVersions> {
    let ytdlp = tool_version(ytdlp_path, "--version").await?;
    let ffmpeg = tool_version(ffmpeg_path, "-version").await?;

    debug!("🔧 yt-dlp {} / {}", ytdlp, ffmpeg);
    Ok(ToolVersions { ytdlp, ffmpeg })
}

async fn tool_version(binary: &str, flag: &str) -> Result<String> {
    let output = async_process::Command::new(binary)
        .arg(flag)
        .output()
        .await
        .with_context(|| format!("no se pudo ejecutar {}", binary))?;

    if !output.status.success() {
        bail!("{} terminó con {}", binary, output.status);
    }

    Ok(String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string())
}
