//! # Bot Module
//!
//! Discord front end for the per-guild playback sessions.
//!
//! The bot is built around the [`VoiceQueueBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It manages:
//!
//! - Slash command registration and dispatch
//! - Voice connections, one [`SongbirdSink`] per guild
//! - Forwarding session notices to the text channel of the last command
//! - Detecting when the bot is disconnected from a voice channel
//!
//! ## Module Structure
//!
//! - [`commands`] - Slash command definitions and registration
//! - [`handlers`] - Command and button dispatch

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
    http::Http,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        registry::SessionRegistry,
        session::{GuildSession, SessionNotice},
        sink::AudioSink,
        state::PlaybackState,
        voice::SongbirdSink,
    },
    config::Config,
    ui::{buttons, embeds},
};

pub mod commands;
pub mod handlers;

/// Main bot structure.
///
/// The registry owns the sessions; this struct owns the voice connections and
/// only hands sessions a weak reference to them.
pub struct VoiceQueueBot {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    voice: DashMap<GuildId, Arc<SongbirdSink>>,
    announce_channels: Arc<DashMap<GuildId, ChannelId>>,
    http: reqwest::Client,
    forwarder_started: AtomicBool,
}

impl VoiceQueueBot {
    pub fn new(config: Config, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            voice: DashMap::new(),
            announce_channels: Arc::new(DashMap::new()),
            http: reqwest::Client::new(),
            forwarder_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Per-guild registration when `GUILD_ID` is set (fast propagation, meant
    /// for development), global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Guarda el canal de texto donde se anuncian los avisos de la guild.
    pub fn remember_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.announce_channels.insert(guild_id, channel_id);
    }

    /// Connects the session to a voice channel, reusing a live connection.
    ///
    /// A live connection stays in its channel even if the caller is elsewhere.
    pub async fn ensure_voice(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
        session: &Arc<GuildSession>,
    ) -> Result<()> {
        let existing = self.voice.get(&guild_id).map(|sink| sink.clone());
        let sink = match existing {
            Some(sink) if sink.is_connected() => {
                debug!(
                    "🔊 Reutilizando conexión en canal {} para guild {}",
                    sink.channel_id(),
                    session.guild_id()
                );
                sink
            }
            _ => {
                let manager = songbird::get(ctx)
                    .await
                    .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;
                let sink = SongbirdSink::connect(
                    manager,
                    guild_id,
                    channel_id,
                    Arc::downgrade(session),
                    self.http.clone(),
                )
                .await?;
                self.voice.insert(guild_id, sink.clone());
                sink
            }
        };

        let sink: Arc<dyn AudioSink> = sink;
        session.attach(Arc::downgrade(&sink)).await;
        Ok(())
    }

    /// Closes the guild's session and drops its voice connection.
    ///
    /// Returns whether there was a connection to close.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        let had_session = self.registry.leave(guild_id).await;
        self.announce_channels.remove(&guild_id);

        match self.voice.remove(&guild_id) {
            Some((_, sink)) => {
                let was_connected = sink.is_connected();
                if was_connected {
                    sink.disconnect().await;
                }
                had_session || was_connected
            }
            None => had_session,
        }
    }

    fn start_notice_forwarder(&self, http: Arc<Http>) {
        if self.forwarder_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let receiver = self.registry.subscribe();
        let channels = self.announce_channels.clone();
        tokio::spawn(forward_notices(receiver, channels, http));
    }
}

#[async_trait]
impl EventHandler for VoiceQueueBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        self.start_notice_forwarder(ctx.http.clone());
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detects the bot being kicked or dropped from its voice channel.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        if let Some(session) = self.registry.get(guild_id) {
            session.connection_lost().await;
        }
    }
}

/// Reenvía los avisos de las sesiones al último canal de texto usado en cada guild.
async fn forward_notices(
    mut receiver: tokio::sync::broadcast::Receiver<(GuildId, SessionNotice)>,
    channels: Arc<DashMap<GuildId, ChannelId>>,
    http: Arc<Http>,
) {
    loop {
        match receiver.recv().await {
            Ok((guild_id, notice)) => {
                let Some(channel_id) = channels.get(&guild_id).map(|c| *c) else {
                    debug!("Aviso sin canal para guild {}: {:?}", guild_id, notice);
                    continue;
                };

                let mut message = CreateMessage::new().embed(embeds::create_notice_embed(&notice));
                if matches!(notice, SessionNotice::NowPlaying(_)) {
                    message = message
                        .components(buttons::create_player_controls(PlaybackState::Playing));
                }

                if let Err(e) = channel_id.send_message(&http, message).await {
                    warn!("No se pudo enviar aviso a canal {}: {:?}", channel_id, e);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se descartaron {} avisos atrasados", skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Canal de avisos cerrado");
                break;
            }
        }
    }
}
