use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        queue::{self, QueueEntry},
        session::{AdvanceReport, NowPlaying, SessionNotice, SessionSnapshot},
        state::PlaybackState,
    },
    sources::TrackDescriptor,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Voice Queue";

/// Límite de Discord para la descripción de un embed
const DESCRIPTION_LIMIT: usize = 4096;
/// Largo máximo con el que se muestra una consulta de usuario
const QUERY_DISPLAY_CHARS: usize = 200;

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(now_playing: &NowPlaying, state: PlaybackState) -> CreateEmbed {
    let title = if state == PlaybackState::Paused {
        "⏸️ En Pausa"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    track_embed(&now_playing.track, title)
        .color(colors::MUSIC_PURPLE)
        .field("👤 Solicitado por", format!("<@{}>", now_playing.requested_by), true)
}

/// Embed de respuesta a `/play` cuando la pista empezó de inmediato
pub fn create_started_embed(track: &TrackDescriptor) -> CreateEmbed {
    track_embed(track, "🎵 Reproduciendo Ahora").color(colors::SUCCESS_GREEN)
}

/// Crea un embed para mostrar que se agregó una canción a la cola
pub fn create_track_queued_embed(query: &str, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Agregado a la Cola")
        .description(format!("**{}**", clip(query, QUERY_DISPLAY_CHARS)))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", position.to_string(), true)
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente cuando le toque",
        ))
        .timestamp(Timestamp::now())
}

/// Confirma un salto; `skipped` puede ser la consulta si la pista aún cargaba
pub fn create_skipped_embed(skipped: &str) -> CreateEmbed {
    create_success_embed(
        "⏭️ Saltado",
        &format!("**{}**", clip(skipped, QUERY_DISPLAY_CHARS)),
    )
}

/// Resumen de un intento de reproducción que no terminó sonando
pub fn create_advance_failed_embed(report: &AdvanceReport) -> CreateEmbed {
    let description = if report.failures.is_empty() {
        "La petición se canceló antes de empezar a sonar".to_string()
    } else {
        report
            .failures
            .iter()
            .map(|failure| {
                format!(
                    "• `{}`: {}",
                    clip(&failure.query, QUERY_DISPLAY_CHARS),
                    failure.reason
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    create_error_embed(
        "❌ No se pudo reproducir",
        &clip(&description, DESCRIPTION_LIMIT),
    )
}

/// Crea el embed de la cola de reproducción
pub fn create_queue_embed(
    snapshot: &SessionSnapshot,
    page: usize,
    items_per_page: usize,
) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(title) = snapshot.now_playing_title() {
        embed = embed.field(
            format!("{} Reproduciendo", state_emoji(snapshot.state)),
            format!("**{}**", title),
            false,
        );
    }

    if snapshot.queue.is_empty() {
        return embed
            .description(
                "😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música",
            )
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    let queue_page = queue::page(&snapshot.queue, page, items_per_page);
    embed
        .description(clip(&format_queue_lines(&queue_page.entries), DESCRIPTION_LIMIT))
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {} en cola",
            queue_page.current_page, queue_page.total_pages, queue_page.total_items
        )))
        .timestamp(Timestamp::now())
}

/// Embed para avisos de la sesión
pub fn create_notice_embed(notice: &SessionNotice) -> CreateEmbed {
    match notice {
        SessionNotice::NowPlaying(track) => create_started_embed(track),
        SessionNotice::ResolutionFailed { query, reason } => create_error_embed(
            "⚠️ Canción Omitida",
            &clip(
                &format!(
                    "No se pudo cargar `{}`: {}\nPasando a la siguiente.",
                    clip(query, QUERY_DISPLAY_CHARS),
                    reason
                ),
                DESCRIPTION_LIMIT,
            ),
        )
        .color(colors::WARNING_ORANGE),
        SessionNotice::PlaybackFailed { title, reason } => create_error_embed(
            "⚠️ Error de Reproducción",
            &format!("**{}** falló: {}\nPasando a la siguiente.", title, reason),
        )
        .color(colors::WARNING_ORANGE),
        SessionNotice::QueueFinished => {
            create_info_embed("📭 Cola Terminada", "No quedan canciones. ¡Hasta la próxima!")
        }
        SessionNotice::ConnectionLost => create_error_embed(
            "🔌 Conexión Perdida",
            "Se perdió la conexión de voz, intentando reconectar una vez...",
        ),
        SessionNotice::Reconnected => {
            create_success_embed("🔄 Reconectado", "Retomando la reproducción")
        }
    }
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

fn track_embed(track: &TrackDescriptor, title: &str) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.display_title()))
        .field(
            "🎤 Artista",
            track.artist.clone().unwrap_or_else(|| "Desconocido".to_string()),
            true,
        );

    embed = match track.duration {
        Some(duration) => embed.field("⏱️ Duración", format_duration(duration), true),
        None => embed.field("⏱️ Duración", "🔴 En vivo", true),
    };

    if let Some(thumbnail) = &track.thumbnail {
        embed = embed.thumbnail(thumbnail);
    }
    if let Some(url) = &track.page_url {
        embed = embed.url(url);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn state_emoji(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Paused => "⏸️",
        PlaybackState::Playing => "▶️",
        _ => "⏳",
    }
}

/// Una línea por entrada, con la posición 1-based de la cola
pub fn format_queue_lines(entries: &[QueueEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            format!(
                "**{}**. {} • <@{}>",
                entry.position,
                clip(&entry.request.query, QUERY_DISPLAY_CHARS),
                entry.request.requested_by
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Recorta a `max_chars` caracteres, terminando en `…` si hizo falta.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
