use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{
        error::SessionError,
        queue::TrackRequest,
        session::{EnqueueOutcome, GuildSession, SessionSnapshot},
        state::PlaybackState,
    },
    bot::VoiceQueueBot,
    ui::{
        buttons::{self, button_ids},
        embeds,
    },
};

/// Acción del reproductor, venga de un comando slash o de un botón.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play(String),
    Pause,
    Resume,
    Skip,
    Stop,
    Queue { page: usize },
    NowPlaying,
    Join,
    Leave,
    Help,
}

impl PlayerCommand {
    pub fn from_slash(name: &str, query: Option<&str>, page: Option<i64>) -> Option<Self> {
        let command = match name {
            "play" => {
                let query = query.map(str::trim).filter(|q| !q.is_empty())?;
                PlayerCommand::Play(query.to_string())
            }
            "pause" => PlayerCommand::Pause,
            "resume" => PlayerCommand::Resume,
            "skip" => PlayerCommand::Skip,
            "stop" => PlayerCommand::Stop,
            "queue" => PlayerCommand::Queue {
                page: page.and_then(|p| usize::try_from(p).ok()).unwrap_or(1).max(1),
            },
            "nowplaying" => PlayerCommand::NowPlaying,
            "join" => PlayerCommand::Join,
            "leave" => PlayerCommand::Leave,
            "help" => PlayerCommand::Help,
            _ => return None,
        };
        Some(command)
    }

    pub fn from_button(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PAUSE => Some(PlayerCommand::Pause),
            button_ids::RESUME => Some(PlayerCommand::Resume),
            button_ids::SKIP => Some(PlayerCommand::Skip),
            button_ids::STOP => Some(PlayerCommand::Stop),
            button_ids::QUEUE => Some(PlayerCommand::Queue { page: 1 }),
            _ => None,
        }
    }

    /// Comandos que pueden tardar (resolución de pistas, conexión de voz).
    fn is_slow(&self) -> bool {
        matches!(self, PlayerCommand::Play(_) | PlayerCommand::Join)
    }
}

/// Respuesta ya renderizada para la interacción.
pub struct Reply {
    embed: CreateEmbed,
    components: Vec<CreateActionRow>,
    ephemeral: bool,
}

impl Reply {
    fn public(embed: CreateEmbed) -> Self {
        Self {
            embed,
            components: Vec::new(),
            ephemeral: false,
        }
    }

    fn private(embed: CreateEmbed) -> Self {
        Self {
            embed,
            components: Vec::new(),
            ephemeral: true,
        }
    }

    fn with_controls(mut self, state: PlaybackState) -> Self {
        self.components = buttons::create_player_controls(state);
        self
    }

    fn from_error(error: &SessionError) -> Self {
        if error.is_noop() {
            Reply::private(embeds::create_info_embed("ℹ️ Nada que hacer", &error.to_string()))
        } else {
            Reply::private(embeds::create_error_embed("❌ Error", &error.to_string()))
        }
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        CreateInteractionResponseMessage::new()
            .embed(self.embed)
            .components(self.components)
            .ephemeral(self.ephemeral)
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &VoiceQueueBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str());
    let page = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "page")
        .and_then(|opt| opt.value.as_i64());

    let Some(player_command) = PlayerCommand::from_slash(&command.data.name, query, page) else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Comando no reconocido")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    bot.remember_channel(guild_id, command.channel_id);

    if player_command.is_slow() {
        // Defer la respuesta ya que puede tomar tiempo
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;

        let reply = execute(ctx, bot, guild_id, command.user.id, player_command).await;
        command
            .edit_response(
                &ctx.http,
                EditInteractionResponse::new()
                    .embed(reply.embed)
                    .components(reply.components),
            )
            .await?;
    } else {
        let reply = execute(ctx, bot, guild_id, command.user.id, player_command).await;
        command
            .create_response(&ctx.http, CreateInteractionResponse::Message(reply.into_message()))
            .await?;
    }

    Ok(())
}

/// Maneja interacciones con botones
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &VoiceQueueBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(player_command) = PlayerCommand::from_button(&component.data.custom_id) else {
        warn!("Botón desconocido: {}", component.data.custom_id);
        return Ok(());
    };

    let reply = execute(ctx, bot, guild_id, component.user.id, player_command).await;
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(reply.into_message().ephemeral(true)),
        )
        .await?;

    Ok(())
}

/// Punto único de ejecución de comandos del reproductor.
pub async fn execute(
    ctx: &Context,
    bot: &VoiceQueueBot,
    guild_id: GuildId,
    user_id: UserId,
    command: PlayerCommand,
) -> Reply {
    debug!("▶️ Ejecutando {:?} en guild {}", command, guild_id);

    match command {
        PlayerCommand::Play(query) => play(ctx, bot, guild_id, user_id, query).await,
        PlayerCommand::Pause => match existing_session(bot, guild_id) {
            Ok(session) => match session.pause().await {
                Ok(()) => Reply::public(embeds::create_success_embed(
                    "⏸️ Pausado",
                    "Usa `/resume` para continuar",
                ))
                .with_controls(PlaybackState::Paused),
                Err(e) => Reply::from_error(&e),
            },
            Err(e) => Reply::from_error(&e),
        },
        PlayerCommand::Resume => match existing_session(bot, guild_id) {
            Ok(session) => match session.resume().await {
                Ok(()) => Reply::public(embeds::create_success_embed(
                    "▶️ Reanudado",
                    "La reproducción continúa",
                ))
                .with_controls(PlaybackState::Playing),
                Err(e) => Reply::from_error(&e),
            },
            Err(e) => Reply::from_error(&e),
        },
        PlayerCommand::Skip => match existing_session(bot, guild_id) {
            Ok(session) => match session.skip().await {
                Ok(skipped) => Reply::public(embeds::create_skipped_embed(&skipped)),
                Err(e) => Reply::from_error(&e),
            },
            Err(e) => Reply::from_error(&e),
        },
        PlayerCommand::Stop => match existing_session(bot, guild_id) {
            Ok(session) => match session.stop().await {
                Ok(cleared) => Reply::public(embeds::create_success_embed(
                    "⏹️ Detenido",
                    &format!("Se eliminaron {} canciones de la cola", cleared),
                )),
                Err(e) => Reply::from_error(&e),
            },
            Err(e) => Reply::from_error(&e),
        },
        PlayerCommand::Queue { page } => {
            let snapshot = match bot.registry.get(guild_id) {
                Some(session) => session.snapshot().await,
                None => empty_snapshot(),
            };
            Reply::private(embeds::create_queue_embed(
                &snapshot,
                page,
                bot.config.queue_page_size,
            ))
        }
        PlayerCommand::NowPlaying => {
            let snapshot = match bot.registry.get(guild_id) {
                Some(session) => session.snapshot().await,
                None => empty_snapshot(),
            };
            match &snapshot.now_playing {
                Some(now_playing) => Reply::public(embeds::create_now_playing_embed(
                    now_playing,
                    snapshot.state,
                ))
                .with_controls(snapshot.state),
                None => Reply::from_error(&SessionError::NothingPlaying),
            }
        }
        PlayerCommand::Join => {
            let channel_id = match user_voice_channel(ctx, guild_id, user_id) {
                Ok(channel_id) => channel_id,
                Err(e) => {
            return Reply::private(embeds::create_error_embed("❌ Error", &e.to_string()))
        }
            };
            let session = bot.registry.get_or_create(guild_id);
            match bot.ensure_voice(ctx, guild_id, channel_id, &session).await {
                Ok(()) => Reply::public(embeds::create_success_embed(
                    "🔊 Conectado",
                    &format!("Listo en <#{}>", channel_id),
                )),
                Err(e) => Reply::private(embeds::create_error_embed("❌ Error", &e.to_string())),
            }
        }
        PlayerCommand::Leave => {
            let was_connected = bot.leave(guild_id).await;
            if was_connected {
                Reply::public(embeds::create_success_embed(
                    "👋 Desconectado",
                    "Cola eliminada, ¡hasta la próxima!",
                ))
            } else {
                Reply::from_error(&SessionError::NotConnected)
            }
        }
        PlayerCommand::Help => Reply::private(embeds::create_info_embed("🎵 Comandos", HELP_TEXT)),
    }
}

async fn play(
    ctx: &Context,
    bot: &VoiceQueueBot,
    guild_id: GuildId,
    user_id: UserId,
    query: String,
) -> Reply {
    // Verificar que el usuario esté en un canal de voz
    let channel_id = match user_voice_channel(ctx, guild_id, user_id) {
        Ok(channel_id) => channel_id,
        Err(e) => {
            return Reply::private(embeds::create_error_embed("❌ Error", &e.to_string()))
        }
    };

    let session = bot.registry.get_or_create(guild_id);
    if let Err(e) = bot.ensure_voice(ctx, guild_id, channel_id, &session).await {
        return Reply::private(embeds::create_error_embed("❌ Error", &e.to_string()));
    }

    match session.enqueue(TrackRequest::new(query.clone(), user_id)).await {
        Ok(EnqueueOutcome::Queued { position }) => {
            Reply::public(embeds::create_track_queued_embed(&query, position))
        }
        Ok(EnqueueOutcome::Started(report)) => match &report.started {
            Some(track) => Reply::public(embeds::create_started_embed(track))
                .with_controls(PlaybackState::Playing),
            None => Reply::public(embeds::create_advance_failed_embed(&report)),
        },
        Err(e) => Reply::from_error(&e),
    }
}

fn existing_session(
    bot: &VoiceQueueBot,
    guild_id: GuildId,
) -> Result<Arc<GuildSession>, SessionError> {
    bot.registry.get(guild_id).ok_or(SessionError::NotConnected)
}

fn empty_snapshot() -> SessionSnapshot {
    SessionSnapshot {
        state: PlaybackState::Idle,
        queue: Vec::new(),
        now_playing: None,
    }
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

const HELP_TEXT: &str = "\
`/play <canción>` Agrega una canción (URL o búsqueda) a la cola\n\
`/pause` `/resume` Pausa o reanuda la canción actual\n\
`/skip` Salta a la siguiente canción\n\
`/stop` Detiene la reproducción y vacía la cola\n\
`/queue [página]` Muestra la cola\n\
`/nowplaying` Muestra la canción actual\n\
`/join` `/leave` Conecta o desconecta el bot";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slash_commands_parse() {
        assert_eq!(
            PlayerCommand::from_slash("play", Some("  lofi beats "), None),
            Some(PlayerCommand::Play("lofi beats".to_string()))
        );
        assert_eq!(PlayerCommand::from_slash("skip", None, None), Some(PlayerCommand::Skip));
        assert_eq!(PlayerCommand::from_slash("volume", None, None), None);
    }

    #[test]
    fn test_play_requires_query() {
        assert_eq!(PlayerCommand::from_slash("play", None, None), None);
        assert_eq!(PlayerCommand::from_slash("play", Some("   "), None), None);
    }

    #[test]
    fn test_queue_page_defaults_and_clamps() {
        assert_eq!(
            PlayerCommand::from_slash("queue", None, None),
            Some(PlayerCommand::Queue { page: 1 })
        );
        assert_eq!(
            PlayerCommand::from_slash("queue", None, Some(3)),
            Some(PlayerCommand::Queue { page: 3 })
        );
        assert_eq!(
            PlayerCommand::from_slash("queue", None, Some(-2)),
            Some(PlayerCommand::Queue { page: 1 })
        );
    }

    #[test]
    fn test_buttons_map_to_same_commands() {
        assert_eq!(PlayerCommand::from_button(button_ids::PAUSE), Some(PlayerCommand::Pause));
        assert_eq!(PlayerCommand::from_button(button_ids::RESUME), Some(PlayerCommand::Resume));
        assert_eq!(PlayerCommand::from_button(button_ids::SKIP), Some(PlayerCommand::Skip));
        assert_eq!(PlayerCommand::from_button(button_ids::STOP), Some(PlayerCommand::Stop));
        assert_eq!(
            PlayerCommand::from_button(button_ids::QUEUE),
            Some(PlayerCommand::Queue { page: 1 })
        );
        assert_eq!(PlayerCommand::from_button("track_selection"), None);
    }

    #[test]
    fn test_only_play_and_join_are_deferred() {
        assert!(PlayerCommand::Play("x".to_string()).is_slow());
        assert!(PlayerCommand::Join.is_slow());
        assert!(!PlayerCommand::Skip.is_slow());
        assert!(!PlayerCommand::Queue { page: 1 }.is_slow());
    }
}
