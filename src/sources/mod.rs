//! # Sources Module
//!
//! Resolución de peticiones de usuario (URL o texto libre) a pistas
//! reproducibles. El núcleo de reproducción solo conoce el trait
//! [`TrackResolver`]; la implementación real usa yt-dlp.

pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::audio::error::ResolutionError;

pub use ytdlp::YtDlpResolver;

/// Pista resuelta, lista para entregarse al sink de audio.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackDescriptor {
    /// Puede venir vacío si la fuente no publica título.
    pub title: String,
    /// Localizador del stream de audio que consume el sink.
    pub stream_url: String,
    pub page_url: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<Duration>,
}

impl TrackDescriptor {
    /// Título para mostrar, con respaldo cuando la fuente no dio ninguno.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Sin título"
        } else {
            &self.title
        }
    }
}

/// Convierte una URL o un término de búsqueda en un [`TrackDescriptor`].
///
/// No reintenta: si falla, el llamador decide si prueba con otra consulta.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError>;
}

/// `true` si la consulta es una URL http(s); cualquier otra cosa se busca como texto.
pub fn is_url(query: &str) -> bool {
    Url::parse(query.trim())
        .map(|url| matches!(url.scheme(), "http" | "https") && url.host().is_some())
        .unwrap_or(false)
}
