use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::session::{GuildSession, SessionNotice, SessionSettings};
use crate::sources::TrackResolver;

const NOTICE_CAPACITY: usize = 256;

/// Dueño de todas las sesiones: como mucho una por guild.
///
/// No serializa operaciones de una misma guild; eso lo hace cada [`GuildSession`].
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    resolver: Arc<dyn TrackResolver>,
    settings: SessionSettings,
    notices: broadcast::Sender<(GuildId, SessionNotice)>,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<dyn TrackResolver>, settings: SessionSettings) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            sessions: DashMap::new(),
            resolver,
            settings,
            notices,
        }
    }

    /// Devuelve la sesión de la guild, creándola en `Idle` si no existe.
    pub fn get_or_create(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Sesión creada para guild {}", guild_id);
                GuildSession::new(
                    guild_id,
                    self.settings,
                    self.resolver.clone(),
                    self.notices.clone(),
                )
            })
            .clone()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|session| session.clone())
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.remove(&guild_id).map(|(_, session)| session)
    }

    /// Saca la sesión del registro y la cierra. Devuelve si había conexión de voz.
    pub async fn leave(&self, guild_id: GuildId) -> bool {
        match self.remove(guild_id) {
            Some(session) => {
                let was_connected = session.leave().await;
                info!("👋 Sesión cerrada para guild {}", guild_id);
                was_connected
            }
            None => false,
        }
    }

    /// Avisos de todas las sesiones, etiquetados con su guild.
    pub fn subscribe(&self) -> broadcast::Receiver<(GuildId, SessionNotice)> {
        self.notices.subscribe()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
