use anyhow::Result;
use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::{PlayMode, TrackHandle},
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Weak,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    error::PlaybackError,
    session::GuildSession,
    sink::{AudioSink, Completion, CompletionSlot, PlaybackHandle},
};
use crate::sources::TrackDescriptor;

/// Conexión de voz de songbird vista como [`AudioSink`].
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    channel_id: ChannelId,
    call: Arc<Mutex<Call>>,
    connected: Arc<AtomicBool>,
    http: reqwest::Client,
}

impl SongbirdSink {
    /// Se une al canal y registra la detección de desconexiones para la sesión.
    pub async fn connect(
        manager: Arc<Songbird>,
        guild_id: GuildId,
        channel_id: ChannelId,
        session: Weak<GuildSession>,
        http: reqwest::Client,
    ) -> Result<Arc<Self>> {
        let call = manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| anyhow::anyhow!("Error al conectar al canal de voz: {}", e))?;

        let connected = Arc::new(AtomicBool::new(true));
        {
            let mut handler = call.lock().await;
            // Un Call sobrevive entre conexiones; evitar handlers duplicados
            handler.remove_all_global_events();
            handler.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DisconnectNotifier {
                    guild_id,
                    connected: connected.clone(),
                    session,
                },
            );
        }

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Arc::new(Self {
            manager,
            guild_id,
            channel_id,
            call,
            connected,
            http,
        }))
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
            && self
                .manager
                .get(self.guild_id)
                .is_some_and(|call| Arc::ptr_eq(&call, &self.call))
    }

    async fn start(
        &self,
        track: &TrackDescriptor,
        volume: f32,
        on_complete: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        if !self.is_connected() {
            return Err(PlaybackError::Disconnected);
        }

        let input = HttpRequest::new(self.http.clone(), track.stream_url.clone());
        let handle = {
            let mut call = self.call.lock().await;
            call.play_only_input(input.into())
        };

        handle
            .set_volume(volume)
            .map_err(|e| PlaybackError::Start(e.to_string()))?;

        let slot = Arc::new(CompletionSlot::new(on_complete));
        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    slot: slot.clone(),
                    connected: self.connected.clone(),
                },
            )
            .map_err(|e| PlaybackError::Start(format!("Error al agregar event handler: {}", e)))?;
        handle
            .add_event(Event::Track(TrackEvent::Error), TrackErrorNotifier { slot })
            .map_err(|e| PlaybackError::Start(format!("Error al agregar event handler: {}", e)))?;

        debug!("▶️ Pista enviada al driver en guild {}", self.guild_id);
        Ok(Box::new(SongbirdHandle(handle)))
    }

    async fn reconnect(&self) -> Result<(), PlaybackError> {
        info!("🔄 Reconectando al canal de voz en guild {}", self.guild_id);

        let call = self
            .manager
            .join(self.guild_id, self.channel_id)
            .await
            .map_err(|e| PlaybackError::Reconnect(e.to_string()))?;

        if !Arc::ptr_eq(&call, &self.call) {
            // El Call original ya no existe; esta conexión no se puede recuperar
            return Err(PlaybackError::Reconnect("el handler de voz fue reemplazado".to_string()));
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);

        if self.manager.get(self.guild_id).is_none() {
            return;
        }
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Desconectado del canal de voz en guild {}", self.guild_id),
            Err(e) => warn!("⚠️ Error al desconectar en guild {}: {:?}", self.guild_id, e),
        }
    }
}

struct SongbirdHandle(TrackHandle);

impl PlaybackHandle for SongbirdHandle {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.0.pause().map_err(|e| PlaybackError::Control(e.to_string()))
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.0.play().map_err(|e| PlaybackError::Control(e.to_string()))
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        self.0.stop().map_err(|e| PlaybackError::Control(e.to_string()))
    }
}

/// Handler para cuando termina una canción
struct TrackEndNotifier {
    slot: Arc<CompletionSlot>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PlaybackError::Disconnected)
        };
        self.slot.fire(outcome);
        None
    }
}

/// Handler para errores de tracks
struct TrackErrorNotifier {
    slot: Arc<CompletionSlot>,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let reason = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(format!("{:?}", e)),
                    _ => None,
                })
                .unwrap_or_else(|| "error desconocido".to_string()),
            _ => "error desconocido".to_string(),
        };

        error!("❌ Error en track: {}", reason);
        self.slot.fire(Err(PlaybackError::Stream(reason)));
        None
    }
}

/// Detecta la caída del driver de voz y avisa a la sesión
struct DisconnectNotifier {
    guild_id: GuildId,
    connected: Arc<AtomicBool>,
    session: Weak<GuildSession>,
}

#[async_trait]
impl VoiceEventHandler for DisconnectNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return None;
        }

        warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
        if let Some(session) = self.session.upgrade() {
            tokio::spawn(async move {
                session.connection_lost().await;
            });
        }
        None
    }
}
