use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::{sync::LazyLock, time::Duration};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::{is_url, TrackDescriptor, TrackResolver};
use crate::audio::error::ResolutionError;

static ERROR_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^ERROR:\s*(?:\[[^\]]+\]\s*)?(.+)$").expect("regex válida"));

/// Resolvedor basado en el ejecutable de yt-dlp
pub struct YtDlpResolver {
    program: String,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    entries: Option<Vec<YtDlpInfo>>,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            program: program.into(),
            timeout,
            rate_limiter: Semaphore::new(max_concurrent.max(1)),
        }
    }

    fn target(query: &str) -> String {
        let query = query.trim();
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    async fn run(&self, target: &str) -> Result<String, ResolutionError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolutionError::Backend(e.to_string()))?;

        let output = Command::new(&self.program)
            .args([
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--dump-json",
                "--no-warnings",
                "--quiet",
                target,
            ])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| ResolutionError::Timeout(self.timeout))?
            .map_err(|e| ResolutionError::Backend(format!("no se pudo ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError> {
        if query.trim().is_empty() {
            return Err(ResolutionError::InvalidInput("consulta vacía".to_string()));
        }

        let target = Self::target(query);
        info!("🔍 Resolviendo: {}", target);

        let stdout = self.run(&target).await?;
        let descriptor = parse_output(&stdout)?
            .ok_or_else(|| ResolutionError::NotFound(query.to_string()))?;

        debug!("✅ Resuelto '{}' -> {}", query, descriptor.display_title());
        Ok(descriptor)
    }
}

/// Toma la primera línea JSON útil de `--dump-json`.
fn parse_output(stdout: &str) -> Result<Option<TrackDescriptor>, ResolutionError> {
    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match serde_json::from_str::<YtDlpInfo>(line) {
            Ok(info) => return info_to_descriptor(info).map(Some),
            Err(e) => warn!("⚠️ Línea de yt-dlp ignorada: {}", e),
        }
    }
    Ok(None)
}

fn info_to_descriptor(info: YtDlpInfo) -> Result<TrackDescriptor, ResolutionError> {
    let info = match info.entries {
        Some(entries) => entries
            .into_iter()
            .next()
            .ok_or_else(|| ResolutionError::NotFound("la lista no tiene entradas".to_string()))?,
        None => info,
    };

    let stream_url = info
        .url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ResolutionError::Backend("yt-dlp no devolvió URL de stream".to_string()))?;

    Ok(TrackDescriptor {
        title: info.title.unwrap_or_default(),
        stream_url,
        page_url: info.webpage_url,
        artist: info.uploader,
        thumbnail: info.thumbnail,
        duration: info
            .duration
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
    })
}

fn classify_failure(stderr: &str) -> ResolutionError {
    let message = ERROR_LINE
        .captures(stderr)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| stderr.trim().to_string());

    let lower = message.to_lowercase();
    if lower.contains("unsupported url") || lower.contains("is not a valid url") {
        ResolutionError::InvalidInput(message)
    } else if lower.contains("video unavailable") || lower.contains("no video results") {
        ResolutionError::NotFound(message)
    } else {
        ResolutionError::Backend(message)
    }
}
