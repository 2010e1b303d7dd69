use serenity::model::id::{GuildId, UserId};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::{
    error::{PlaybackError, ResolutionError, SessionError},
    queue::{PlaybackQueue, QueueEntry, TrackRequest},
    sink::{AudioSink, Completion, PlaybackHandle, TrackOutcome},
    state::{PlaybackEvent, PlaybackState},
};
use crate::sources::{TrackDescriptor, TrackResolver};

/// Parámetros de reproducción compartidos por todas las sesiones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub volume: f32,
    pub max_queue_size: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            volume: 0.5,
            max_queue_size: 1000,
        }
    }
}

/// Avisos para transiciones que no tienen un comando esperando respuesta.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    NowPlaying(TrackDescriptor),
    ResolutionFailed { query: String, reason: ResolutionError },
    PlaybackFailed { title: String, reason: PlaybackError },
    QueueFinished,
    ConnectionLost,
    Reconnected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadFailure {
    pub query: String,
    pub reason: String,
}

/// Qué pasó al intentar avanzar la cola.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub started: Option<TrackDescriptor>,
    pub failures: Vec<LoadFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueOutcome {
    /// Ya había algo sonando; la petición quedó en la posición indicada (1-based).
    Queued { position: usize },
    /// La sesión estaba parada y se intentó reproducir de inmediato.
    Started(AdvanceReport),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: TrackDescriptor,
    pub requested_by: UserId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub queue: Vec<QueueEntry>,
    pub now_playing: Option<NowPlaying>,
}

impl SessionSnapshot {
    pub fn now_playing_title(&self) -> Option<&str> {
        self.now_playing.as_ref().map(|np| np.track.display_title())
    }
}

/// Petición que se está cargando o reproduciendo.
struct Current {
    request: TrackRequest,
    track: Option<TrackDescriptor>,
}

struct Inner {
    guild_id: GuildId,
    state: PlaybackState,
    queue: PlaybackQueue,
    sink: Option<Weak<dyn AudioSink>>,
    current: Option<Current>,
    handle: Option<Box<dyn PlaybackHandle>>,
    /// Identifica el intento de reproducción vigente. Callbacks y
    /// resoluciones con otra generación se descartan.
    generation: u64,
    reconnect_available: bool,
}

impl Inner {
    fn apply(&mut self, event: PlaybackEvent) -> Option<PlaybackState> {
        let next = self.state.next(event)?;
        debug!(
            "🔁 Guild {}: {} --{:?}--> {}",
            self.guild_id, self.state, event, next
        );
        self.state = next;
        Some(next)
    }

    /// Conexión viva, comprobada en cada uso.
    fn live_sink(&self) -> Option<Arc<dyn AudioSink>> {
        self.sink
            .as_ref()
            .and_then(Weak::upgrade)
            .filter(|sink| sink.is_connected())
    }

    fn bump_generation(&mut self) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.generation
    }

    fn stop_handle(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.stop() {
                debug!("Stop sobre pista ya terminada: {}", e);
            }
        }
    }

    fn reject(&self, command: &'static str) -> SessionError {
        if self.state == PlaybackState::Disconnected {
            SessionError::ConnectionLost
        } else if self.live_sink().is_none() {
            SessionError::NotConnected
        } else if self.state == PlaybackState::Idle {
            SessionError::NothingPlaying
        } else {
            SessionError::InvalidCommand {
                command,
                state: self.state,
            }
        }
    }
}

/// Estado de reproducción de una guild.
///
/// Cada operación toma el mutex de la sesión antes de tocar cola o estado, así
/// la tabla de transiciones siempre se evalúa contra un estado consistente.
/// El mutex se suelta mientras se resuelve una pista; al volver, la generación
/// decide si el resultado sigue vigente.
pub struct GuildSession {
    guild_id: GuildId,
    settings: SessionSettings,
    resolver: Arc<dyn TrackResolver>,
    notices: broadcast::Sender<(GuildId, SessionNotice)>,
    inner: Mutex<Inner>,
    this: Weak<GuildSession>,
}

impl GuildSession {
    pub fn new(
        guild_id: GuildId,
        settings: SessionSettings,
        resolver: Arc<dyn TrackResolver>,
        notices: broadcast::Sender<(GuildId, SessionNotice)>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            guild_id,
            settings,
            resolver,
            notices,
            inner: Mutex::new(Inner {
                guild_id,
                state: PlaybackState::Idle,
                queue: PlaybackQueue::new(),
                sink: None,
                current: None,
                handle: None,
                generation: 0,
                reconnect_available: true,
            }),
            this: this.clone(),
        })
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Asocia la conexión de voz de la guild. La sesión no la mantiene viva.
    pub async fn attach(&self, sink: Weak<dyn AudioSink>) {
        let mut inner = self.inner.lock().await;
        inner.sink = Some(sink);
        debug!("🔗 Conexión de voz asociada a guild {}", self.guild_id);
    }

    /// Encola una petición; si no hay nada sonando, empieza a reproducir.
    pub async fn enqueue(&self, request: TrackRequest) -> Result<EnqueueOutcome, SessionError> {
        let mut inner = self.inner.lock().await;

        if inner.queue.len() >= self.settings.max_queue_size {
            return Err(SessionError::QueueFull {
                max: self.settings.max_queue_size,
            });
        }

        if inner.state.is_busy() {
            inner.queue.enqueue(request);
            let position = inner.queue.len();
            info!("➕ Encolado en guild {} (posición {})", self.guild_id, position);
            return Ok(EnqueueOutcome::Queued { position });
        }

        if inner.live_sink().is_none() {
            return Err(SessionError::NotConnected);
        }

        inner.queue.enqueue(request);
        let report = self.drive(inner, None, false).await;
        Ok(EnqueueOutcome::Started(report))
    }

    /// Pausa la reproducción actual
    pub async fn pause(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.live_sink().is_none() || inner.state.next(PlaybackEvent::Pause).is_none() {
            return Err(inner.reject("pause"));
        }

        if let Some(handle) = &inner.handle {
            handle.pause()?;
        }
        inner.apply(PlaybackEvent::Pause);
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(())
    }

    /// Reanuda la reproducción
    pub async fn resume(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.live_sink().is_none() || inner.state.next(PlaybackEvent::Resume).is_none() {
            return Err(inner.reject("resume"));
        }

        if let Some(handle) = &inner.handle {
            handle.resume()?;
        }
        inner.apply(PlaybackEvent::Resume);
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    /// Salta la pista actual y devuelve su título (o la consulta si aún cargaba).
    ///
    /// Desde `Playing`/`Paused` se detiene la pista y el avance ocurre en el
    /// callback de finalización. Desde `Connecting` se cancela la resolución en
    /// curso y se avanza aquí mismo.
    pub async fn skip(&self) -> Result<String, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.live_sink().is_none() || inner.state.next(PlaybackEvent::Skip).is_none() {
            return Err(inner.reject("skip"));
        }

        let skipped = inner
            .current
            .as_ref()
            .map(|current| match &current.track {
                Some(track) => track.display_title().to_string(),
                None => current.request.query.clone(),
            })
            .unwrap_or_default();

        let was_loading = inner.state == PlaybackState::Connecting;
        inner.apply(PlaybackEvent::Skip);
        // Una reconexión antes del callback debe seguir por la cola, no repetir esta pista
        inner.current = None;
        info!("⏭️ Saltando '{}' en guild {}", skipped, self.guild_id);

        if was_loading {
            inner.bump_generation();
            self.drive(inner, None, true).await;
            return Ok(skipped);
        }

        let stopped = inner.handle.as_ref().map(|handle| handle.stop());
        match stopped {
            Some(Ok(())) => {}
            other => {
                // Sin stop no habrá callback: avanzar ya e invalidar el que llegue tarde
                if let Some(Err(e)) = other {
                    warn!("⚠️ No se pudo detener la pista: {}", e);
                }
                inner.handle = None;
                inner.bump_generation();
                self.drive(inner, None, true).await;
            }
        }

        Ok(skipped)
    }

    /// Detiene la reproducción y limpia la cola. La conexión de voz se mantiene.
    pub async fn stop(&self) -> Result<usize, SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.apply(PlaybackEvent::Stop).is_none() {
            return Err(inner.reject("stop"));
        }

        inner.bump_generation();
        inner.stop_handle();
        inner.current = None;
        let cleared = inner.queue.clear();
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(cleared)
    }

    /// Limpia todo y cierra la conexión de voz. Devuelve si había conexión.
    pub async fn leave(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.apply(PlaybackEvent::Leave);
        inner.bump_generation();
        inner.stop_handle();
        inner.current = None;
        inner.queue.clear();
        inner.reconnect_available = true;

        let sink = inner.sink.take().and_then(|weak| weak.upgrade());
        drop(inner);

        match sink {
            Some(sink) => {
                sink.disconnect().await;
                true
            }
            None => false,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.lock().await;
        let now_playing = inner
            .current
            .as_ref()
            .filter(|_| inner.state.has_track())
            .and_then(|current| {
                current.track.clone().map(|track| NowPlaying {
                    track,
                    requested_by: current.request.requested_by,
                })
            });

        SessionSnapshot {
            state: inner.state,
            queue: inner.queue.peek_all(),
            now_playing,
        }
    }

    /// Desconexión detectada fuera de la sesión (kick, caída de red).
    pub async fn connection_lost(&self) {
        let mut inner = self.inner.lock().await;
        if !self.mark_disconnected(&mut inner) {
            return;
        }

        let (mut inner, reconnected) = self.try_reconnect(inner).await;
        if reconnected {
            let resume = inner.current.take().map(|current| current.request);
            self.drive(inner, resume, true).await;
        } else if inner.state == PlaybackState::Disconnected {
            self.give_up(&mut inner).await;
        }
    }

    /// Re-entrada desde el callback del sink.
    async fn on_track_end(&self, generation: u64, outcome: TrackOutcome) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            debug!("Callback de pista obsoleto ignorado en guild {}", self.guild_id);
            return;
        }

        let title = inner
            .current
            .as_ref()
            .and_then(|current| current.track.as_ref())
            .map(|track| track.display_title().to_string())
            .unwrap_or_default();

        match outcome {
            Err(PlaybackError::Disconnected) => {
                drop(inner);
                self.connection_lost().await;
                return;
            }
            Err(reason) => {
                error!("❌ Fallo en '{}' (guild {}): {}", title, self.guild_id, reason);
                self.notify(SessionNotice::PlaybackFailed { title, reason });
            }
            Ok(()) => {
                debug!("🎵 Track terminó en guild {}", self.guild_id);
                inner.reconnect_available = true;
            }
        }

        if inner.apply(PlaybackEvent::TrackEnded).is_none() {
            return;
        }
        inner.handle = None;
        inner.current = None;
        self.drive(inner, None, true).await;
    }

    /// Paso único de avance: saca (o recibe) una petición, la resuelve y la
    /// arranca. Las peticiones que fallan se descartan y se prueba la siguiente.
    async fn drive<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
        mut first: Option<TrackRequest>,
        announce: bool,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();

        loop {
            let Some(request) = first.take().or_else(|| inner.queue.pop_front()) else {
                self.finish_queue(&mut inner, announce).await;
                return report;
            };

            if inner.apply(PlaybackEvent::Load).is_none() {
                warn!("⚠️ Carga descartada en estado {}", inner.state);
                return report;
            }
            let generation = inner.bump_generation();
            inner.current = Some(Current {
                request: request.clone(),
                track: None,
            });
            drop(inner);

            let resolved = self.resolver.resolve(&request.query).await;

            inner = self.inner.lock().await;
            if inner.generation != generation || inner.state != PlaybackState::Connecting {
                debug!("Resolución obsoleta descartada: {}", request.query);
                return report;
            }

            let track = match resolved {
                Ok(track) => track,
                Err(reason) => {
                    warn!("❌ No se pudo resolver '{}': {}", request.query, reason);
                    report.failures.push(LoadFailure {
                        query: request.query.clone(),
                        reason: reason.to_string(),
                    });
                    if announce {
                        self.notify(SessionNotice::ResolutionFailed {
                            query: request.query,
                            reason,
                        });
                    }
                    inner.current = None;
                    inner.apply(PlaybackEvent::LoadFailed);
                    continue;
                }
            };

            match self.start_track(&mut inner, generation, &track).await {
                Ok(()) => {
                    if let Some(current) = inner.current.as_mut() {
                        current.track = Some(track.clone());
                    }
                    inner.apply(PlaybackEvent::Started);
                    info!(
                        "🎵 Reproduciendo: {} (guild {})",
                        track.display_title(),
                        self.guild_id
                    );
                    if announce {
                        self.notify(SessionNotice::NowPlaying(track.clone()));
                    }
                    report.started = Some(track);
                    return report;
                }
                Err(PlaybackError::Disconnected) => {
                    self.mark_disconnected(&mut inner);
                    let (relocked, reconnected) = self.try_reconnect(inner).await;
                    inner = relocked;
                    if !reconnected {
                        if inner.state == PlaybackState::Disconnected {
                            self.give_up(&mut inner).await;
                        }
                        return report;
                    }
                    first = inner.current.take().map(|current| current.request);
                }
                Err(reason) => {
                    error!("❌ El sink rechazó '{}': {}", track.display_title(), reason);
                    report.failures.push(LoadFailure {
                        query: request.query.clone(),
                        reason: reason.to_string(),
                    });
                    if announce {
                        self.notify(SessionNotice::PlaybackFailed {
                            title: track.display_title().to_string(),
                            reason,
                        });
                    }
                    inner.current = None;
                    inner.apply(PlaybackEvent::LoadFailed);
                }
            }
        }
    }

    async fn start_track(
        &self,
        inner: &mut Inner,
        generation: u64,
        track: &TrackDescriptor,
    ) -> Result<(), PlaybackError> {
        let sink = inner.live_sink().ok_or(PlaybackError::Disconnected)?;
        let handle = sink
            .start(track, self.settings.volume, self.completion(generation))
            .await?;
        inner.handle = Some(handle);
        Ok(())
    }

    fn completion(&self, generation: u64) -> Completion {
        let session = self.this.clone();
        let runtime = tokio::runtime::Handle::current();
        Box::new(move |outcome| {
            if let Some(session) = session.upgrade() {
                runtime.spawn(async move {
                    session.on_track_end(generation, outcome).await;
                });
            }
        })
    }

    /// Cola agotada: vuelve a `Idle` y suelta la conexión.
    async fn finish_queue(&self, inner: &mut Inner, announce: bool) {
        let event = if inner.state == PlaybackState::Disconnected {
            PlaybackEvent::GiveUp
        } else {
            PlaybackEvent::QueueDrained
        };
        inner.apply(event);
        inner.current = None;
        inner.handle = None;

        if let Some(sink) = inner.sink.take().and_then(|weak| weak.upgrade()) {
            sink.disconnect().await;
        }
        info!("📭 Cola terminada en guild {}", self.guild_id);
        if announce {
            self.notify(SessionNotice::QueueFinished);
        }
    }

    /// Fuerza `Disconnected`; devuelve `false` si no había nada que interrumpir.
    fn mark_disconnected(&self, inner: &mut Inner) -> bool {
        if inner.apply(PlaybackEvent::ConnectionLost).is_none() {
            debug!("Desconexión ignorada en estado {}", inner.state);
            return false;
        }
        inner.bump_generation();
        inner.handle = None;
        warn!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
        self.notify(SessionNotice::ConnectionLost);
        true
    }

    /// Un único intento de reconexión. Suelta el mutex mientras dura.
    async fn try_reconnect<'a>(
        &'a self,
        mut inner: MutexGuard<'a, Inner>,
    ) -> (MutexGuard<'a, Inner>, bool) {
        // La referencia antigua se descarta mientras dura el intento
        let Some(sink) = inner.sink.take().and_then(|weak| weak.upgrade()) else {
            return (inner, false);
        };
        if !inner.reconnect_available {
            debug!("Sin reintentos de reconexión en guild {}", self.guild_id);
            inner.sink = Some(Arc::downgrade(&sink));
            return (inner, false);
        }
        inner.reconnect_available = false;
        let generation = inner.generation;
        drop(inner);

        let result = sink.reconnect().await;

        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != PlaybackState::Disconnected {
            // La sesión se cerró durante el intento; no dejar el canal ocupado
            if result.is_ok() {
                debug!("Reconexión obsoleta en guild {}, desconectando", self.guild_id);
                sink.disconnect().await;
            }
            return (inner, false);
        }
        match result {
            Ok(()) => {
                inner.sink = Some(Arc::downgrade(&sink));
                info!("✅ Reconectado en guild {}", self.guild_id);
                self.notify(SessionNotice::Reconnected);
                (inner, true)
            }
            Err(e) => {
                error!("❌ Reconexión fallida en guild {}: {}", self.guild_id, e);
                inner.sink = Some(Arc::downgrade(&sink));
                (inner, false)
            }
        }
    }

    async fn give_up(&self, inner: &mut Inner) {
        inner.queue.clear();
        self.finish_queue(inner, true).await;
    }

    fn notify(&self, notice: SessionNotice) {
        // Sin suscriptores el aviso se pierde
        let _ = self.notices.send((self.guild_id, notice));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{ok_resolver, wait_for, FakeSink, GatedResolver};
    use pretty_assertions::assert_eq;

    fn request(query: &str) -> TrackRequest {
        TrackRequest::new(query, UserId::new(7))
    }

    fn queries(snapshot: &SessionSnapshot) -> Vec<String> {
        snapshot
            .queue
            .iter()
            .map(|entry| entry.request.query.clone())
            .collect()
    }

    async fn connected_session(
        resolver: Arc<dyn TrackResolver>,
        settings: SessionSettings,
    ) -> (
        Arc<GuildSession>,
        Arc<FakeSink>,
        broadcast::Receiver<(GuildId, SessionNotice)>,
    ) {
        let (tx, rx) = broadcast::channel(64);
        let session = GuildSession::new(GuildId::new(42), settings, resolver, tx);
        let sink = FakeSink::new();
        session.attach(sink.weak()).await;
        (session, sink, rx)
    }

    async fn idle_session() -> (
        Arc<GuildSession>,
        Arc<FakeSink>,
        broadcast::Receiver<(GuildId, SessionNotice)>,
    ) {
        connected_session(ok_resolver(), SessionSettings::default()).await
    }

    /// Sesión sin conexión de voz asociada.
    fn detached_session() -> Arc<GuildSession> {
        let (tx, _rx) = broadcast::channel(8);
        GuildSession::new(GuildId::new(42), SessionSettings::default(), ok_resolver(), tx)
    }

    /// Sesión reproduciendo `first` con el resto de consultas en cola.
    async fn playing(
        first: &str,
        rest: &[&str],
    ) -> (
        Arc<GuildSession>,
        Arc<FakeSink>,
        broadcast::Receiver<(GuildId, SessionNotice)>,
    ) {
        let (session, sink, rx) = idle_session().await;
        session.enqueue(request(first)).await.unwrap();
        for query in rest {
            session.enqueue(request(query)).await.unwrap();
        }
        (session, sink, rx)
    }

    #[tokio::test]
    async fn test_enqueue_while_idle_starts_playing() {
        let (session, sink, _rx) = idle_session().await;

        let outcome = session.enqueue(request("a")).await.unwrap();

        match outcome {
            EnqueueOutcome::Started(report) => {
                assert_eq!(report.started.map(|t| t.title), Some("title:a".to_string()));
                assert!(report.failures.is_empty());
            }
            other => panic!("se esperaba Started, llegó {:?}", other),
        }
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.now_playing_title(), Some("title:a"));
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.started(), vec!["title:a".to_string()]);
    }

    #[tokio::test]
    async fn test_enqueue_while_playing_only_appends() {
        let (session, sink, _rx) = playing("a", &[]).await;

        let second = session.enqueue(request("b")).await.unwrap();
        let third = session.enqueue(request("b")).await.unwrap();

        assert_eq!(second, EnqueueOutcome::Queued { position: 1 });
        assert_eq!(third, EnqueueOutcome::Queued { position: 2 });
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(queries(&snapshot), vec!["b".to_string(), "b".to_string()]);
        assert_eq!(snapshot.queue[1].position, 2);
        assert_eq!(sink.started().len(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_without_connection_is_rejected() {
        let session = detached_session();

        let err = session.enqueue(request("a")).await.unwrap_err();

        assert_eq!(err, SessionError::NotConnected);
        assert!(session.snapshot().await.queue.is_empty());
    }

    #[tokio::test]
    async fn test_queue_full() {
        let settings = SessionSettings {
            max_queue_size: 2,
            ..Default::default()
        };
        let (session, _sink, _rx) = connected_session(ok_resolver(), settings).await;
        session.enqueue(request("a")).await.unwrap();
        session.enqueue(request("b")).await.unwrap();
        session.enqueue(request("c")).await.unwrap();

        let err = session.enqueue(request("d")).await.unwrap_err();
        assert_eq!(err, SessionError::QueueFull { max: 2 });
    }

    #[tokio::test]
    async fn test_natural_end_advances_to_next() {
        let (session, sink, mut rx) = playing("a", &["b"]).await;

        assert!(sink.finish_current(Ok(())));

        let snapshot = wait_for(&session, |s| s.now_playing_title() == Some("title:b")).await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(snapshot.queue.is_empty());
        let (_, notice) = rx.recv().await.unwrap();
        assert_eq!(notice, SessionNotice::NowPlaying(crate::audio::testing::descriptor("b")));
    }

    #[tokio::test]
    async fn test_skip_with_items_removes_exactly_one() {
        let (session, sink, _rx) = playing("a", &["b", "c"]).await;

        let skipped = session.skip().await.unwrap();
        assert_eq!(skipped, "title:a");

        let snapshot = wait_for(&session, |s| s.state == PlaybackState::Playing).await;
        assert_eq!(snapshot.now_playing_title(), Some("title:b"));
        assert_eq!(queries(&snapshot), vec!["c".to_string()]);
        assert_eq!(sink.started(), vec!["title:a".to_string(), "title:b".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_on_last_track_goes_idle_and_disconnects() {
        let (session, sink, _rx) = playing("a", &[]).await;

        session.skip().await.unwrap();

        let snapshot = wait_for(&session, |s| s.state == PlaybackState::Idle).await;
        assert!(snapshot.now_playing.is_none());
        assert_eq!(sink.disconnects(), 1);
        assert!(!sink.is_connected());
    }

    #[tokio::test]
    async fn test_rapid_double_skip_advances_once() {
        let (session, sink, _rx) = playing("a", &["b", "c"]).await;
        sink.set_complete_on_stop(false);

        session.skip().await.unwrap();
        let second = session.skip().await.unwrap_err();
        assert_eq!(
            second,
            SessionError::InvalidCommand {
                command: "skip",
                state: PlaybackState::Advancing,
            }
        );

        // El stop del primer skip termina la pista una sola vez
        assert!(sink.finish_current(Ok(())));
        assert!(!sink.finish_current(Ok(())));

        let snapshot = wait_for(&session, |s| s.state == PlaybackState::Playing).await;
        assert_eq!(snapshot.now_playing_title(), Some("title:b"));
        assert_eq!(queries(&snapshot), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_skip_twice_on_single_track_never_panics() {
        let (session, sink, _rx) = playing("a", &[]).await;
        sink.set_complete_on_stop(false);

        session.skip().await.unwrap();
        assert!(session.skip().await.unwrap_err().is_noop());
        sink.finish_current(Ok(()));

        wait_for(&session, |s| s.state == PlaybackState::Idle).await;
        assert!(session.skip().await.unwrap_err().is_noop());
    }

    #[tokio::test]
    async fn test_resolution_error_does_not_block_queue() {
        let (session, sink, mut rx) = playing("a", &["bad_url", "good_url"]).await;

        sink.finish_current(Ok(()));

        let snapshot =
            wait_for(&session, |s| s.now_playing_title() == Some("title:good_url")).await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.started(), vec!["title:a".to_string(), "title:good_url".to_string()]);

        let (_, notice) = rx.recv().await.unwrap();
        assert_eq!(
            notice,
            SessionNotice::ResolutionFailed {
                query: "bad_url".to_string(),
                reason: ResolutionError::NotFound("bad_url".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_resolution_error_on_first_request_reports_and_idles() {
        let (session, sink, _rx) = idle_session().await;

        let outcome = session.enqueue(request("bad_url")).await.unwrap();

        let EnqueueOutcome::Started(report) = outcome else {
            panic!("se esperaba Started");
        };
        assert!(report.started.is_none());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].query, "bad_url");
        assert_eq!(session.snapshot().await.state, PlaybackState::Idle);
        assert_eq!(sink.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_sink_error_mid_track_advances() {
        let (session, sink, mut rx) = playing("a", &["b"]).await;

        sink.finish_current(Err(PlaybackError::Stream("decoder".to_string())));

        let snapshot = wait_for(&session, |s| s.now_playing_title() == Some("title:b")).await;
        assert!(snapshot.queue.is_empty());
        let (_, notice) = rx.recv().await.unwrap();
        assert_eq!(
            notice,
            SessionNotice::PlaybackFailed {
                title: "title:a".to_string(),
                reason: PlaybackError::Stream("decoder".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_sink_refusing_a_track_moves_on() {
        let (session, sink, _rx) = playing("a", &["b", "c"]).await;
        sink.fail_start("title:b", PlaybackError::Start("formato".to_string()));

        sink.finish_current(Ok(()));

        let snapshot = wait_for(&session, |s| s.now_playing_title() == Some("title:c")).await;
        assert!(snapshot.queue.is_empty());
    }

    #[tokio::test]
    async fn test_stop_clears_queue_and_ignores_stale_callback() {
        let (session, sink, _rx) = playing("a", &["b", "c", "d"]).await;

        let cleared = session.stop().await.unwrap();

        assert_eq!(cleared, 3);
        // El stop dispara el callback de la pista; no debe avanzar nada
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.started().len(), 1);
        assert!(sink.is_connected());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (session, sink, _rx) = playing("a", &[]).await;

        session.pause().await.unwrap();
        assert_eq!(session.snapshot().await.state, PlaybackState::Paused);
        assert!(sink.is_paused());
        assert_eq!(
            session.pause().await.unwrap_err(),
            SessionError::InvalidCommand {
                command: "pause",
                state: PlaybackState::Paused,
            }
        );

        session.resume().await.unwrap();
        assert_eq!(session.snapshot().await.state, PlaybackState::Playing);
        assert!(!sink.is_paused());
    }

    #[tokio::test]
    async fn test_commands_with_nothing_happening_are_noops() {
        let (session, _sink, _rx) = idle_session().await;
        assert_eq!(session.resume().await.unwrap_err(), SessionError::NothingPlaying);
        assert_eq!(session.pause().await.unwrap_err(), SessionError::NothingPlaying);
        assert_eq!(session.stop().await.unwrap_err(), SessionError::NothingPlaying);

        let detached = detached_session();
        for err in [
            detached.pause().await.unwrap_err(),
            detached.resume().await.unwrap_err(),
            detached.skip().await.unwrap_err(),
        ] {
            assert_eq!(err, SessionError::NotConnected);
        }
    }

    #[tokio::test]
    async fn test_stop_cancels_in_flight_resolution() {
        let resolver = Arc::new(GatedResolver::default());
        let (session, sink, _rx) =
            connected_session(resolver.clone(), SessionSettings::default()).await;

        let pending = {
            let session = session.clone();
            tokio::spawn(async move { session.enqueue(request("slow")).await })
        };
        wait_for(&session, |s| s.state == PlaybackState::Connecting).await;
        while resolver.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        session.stop().await.unwrap();
        resolver.open();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, EnqueueOutcome::Started(AdvanceReport::default()));
        assert_eq!(session.snapshot().await.state, PlaybackState::Idle);
        assert!(sink.started().is_empty());
    }

    #[tokio::test]
    async fn test_skip_while_loading_discards_that_track() {
        let resolver = Arc::new(GatedResolver::default());
        let (session, sink, _rx) =
            connected_session(resolver.clone(), SessionSettings::default()).await;
        session.enqueue(request("a")).await.unwrap();
        session.enqueue(request("slow")).await.unwrap();
        session.enqueue(request("c")).await.unwrap();

        sink.finish_current(Ok(()));
        wait_for(&session, |s| s.state == PlaybackState::Connecting).await;
        while resolver.waiting() == 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(session.skip().await.unwrap(), "slow");
        resolver.open();

        let snapshot = wait_for(&session, |s| s.now_playing_title() == Some("title:c")).await;
        assert!(snapshot.queue.is_empty());
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(sink.started(), vec!["title:a".to_string(), "title:c".to_string()]);
    }

    #[tokio::test]
    async fn test_connection_lost_reconnects_once_and_resumes() {
        let (session, sink, _rx) = playing("a", &["b"]).await;

        sink.set_connected(false);
        session.connection_lost().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.now_playing_title(), Some("title:a"));
        assert_eq!(queries(&snapshot), vec!["b".to_string()]);
        assert_eq!(sink.reconnects(), 1);

        // Segundo corte sin que ninguna pista haya terminado: no hay más intentos
        sink.set_connected(false);
        session.connection_lost().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.reconnects(), 1);
        assert_eq!(sink.disconnects(), 1);
    }

    #[tokio::test]
    async fn test_failed_reconnect_returns_to_idle() {
        let (session, sink, mut rx) = playing("a", &["b", "c"]).await;
        sink.set_reconnect_ok(false);
        sink.set_connected(false);

        sink.finish_current(Err(PlaybackError::Disconnected));

        let snapshot = wait_for(&session, |s| s.state == PlaybackState::Idle).await;
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.reconnects(), 1);
        assert_eq!(rx.recv().await.unwrap().1, SessionNotice::ConnectionLost);
        assert_eq!(rx.recv().await.unwrap().1, SessionNotice::QueueFinished);
    }

    #[tokio::test]
    async fn test_reconnect_after_skip_continues_with_next_request() {
        let (session, sink, _rx) = playing("a", &["b"]).await;
        sink.set_complete_on_stop(false);

        session.skip().await.unwrap();
        sink.set_connected(false);
        session.connection_lost().await;

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.now_playing_title(), Some("title:b"));
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.started(), vec!["title:a".to_string(), "title:b".to_string()]);
    }

    #[tokio::test]
    async fn test_commands_while_reconnecting_are_noops() {
        let (session, sink, _rx) = playing("a", &["b"]).await;
        sink.set_hold_reconnect(true);
        sink.set_connected(false);

        let lost = tokio::spawn({
            let session = session.clone();
            async move { session.connection_lost().await }
        });
        wait_for(&session, |s| s.state == PlaybackState::Disconnected).await;

        for err in [
            session.pause().await.unwrap_err(),
            session.resume().await.unwrap_err(),
            session.skip().await.unwrap_err(),
        ] {
            assert_eq!(err, SessionError::ConnectionLost);
            assert!(err.is_noop());
        }

        sink.release_reconnect();
        lost.await.unwrap();
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Playing);
        assert_eq!(snapshot.now_playing_title(), Some("title:a"));
    }

    #[tokio::test]
    async fn test_leave_during_reconnect_drops_the_rejoined_channel() {
        let (session, sink, _rx) = playing("a", &["b"]).await;
        sink.set_hold_reconnect(true);
        sink.set_connected(false);

        let lost = tokio::spawn({
            let session = session.clone();
            async move { session.connection_lost().await }
        });
        wait_for(&session, |s| s.state == PlaybackState::Disconnected).await;
        while sink.reconnects() == 0 {
            tokio::task::yield_now().await;
        }

        session.leave().await;
        sink.release_reconnect();
        lost.await.unwrap();

        assert_eq!(sink.disconnects(), 1);
        assert!(!sink.is_connected());
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.started(), vec!["title:a".to_string()]);
    }

    #[tokio::test]
    async fn test_connection_lost_while_idle_is_ignored() {
        let (session, sink, _rx) = idle_session().await;

        session.connection_lost().await;

        assert_eq!(session.snapshot().await.state, PlaybackState::Idle);
        assert_eq!(sink.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_leave_clears_and_disconnects() {
        let (session, sink, _rx) = playing("a", &["b"]).await;

        assert!(session.leave().await);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, PlaybackState::Idle);
        assert!(snapshot.queue.is_empty());
        assert_eq!(sink.disconnects(), 1);
        assert!(!session.leave().await);
    }
}
