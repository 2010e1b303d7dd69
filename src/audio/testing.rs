//! Dobles de prueba para el núcleo de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Weak,
    },
    time::Duration,
};
use tokio::sync::Notify;

use super::{
    error::{PlaybackError, ResolutionError},
    session::{GuildSession, SessionSnapshot},
    sink::{AudioSink, Completion, CompletionSlot, PlaybackHandle, TrackOutcome},
};
use crate::sources::{MockTrackResolver, TrackDescriptor, TrackResolver};

pub fn descriptor(query: &str) -> TrackDescriptor {
    TrackDescriptor {
        title: format!("title:{}", query),
        stream_url: format!("https://cdn.test/{}", query),
        ..Default::default()
    }
}

/// Resuelve todo salvo las consultas que empiezan por `bad`.
pub fn ok_resolver() -> Arc<dyn TrackResolver> {
    let mut mock = MockTrackResolver::new();
    mock.expect_resolve().returning(|query: &str| {
        if query.starts_with("bad") {
            Err(ResolutionError::NotFound(query.to_string()))
        } else {
            Ok(descriptor(query))
        }
    });
    Arc::new(mock)
}

/// Resolvedor que retiene las consultas `slow*` hasta que el test abre la puerta.
#[derive(Default)]
pub struct GatedResolver {
    gate: Notify,
    waiting: AtomicUsize,
}

impl GatedResolver {
    pub fn open(&self) {
        self.gate.notify_waiters();
    }

    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TrackResolver for GatedResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolutionError> {
        if query.starts_with("slow") {
            let notified = self.gate.notified();
            self.waiting.fetch_add(1, Ordering::SeqCst);
            notified.await;
        }
        Ok(descriptor(query))
    }
}

struct FakeTrack {
    slot: CompletionSlot,
    paused: AtomicBool,
    complete_on_stop: Arc<AtomicBool>,
}

struct FakeHandle(Arc<FakeTrack>);

impl PlaybackHandle for FakeHandle {
    fn pause(&self) -> Result<(), PlaybackError> {
        self.0.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> Result<(), PlaybackError> {
        self.0.paused.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        if self.0.complete_on_stop.load(Ordering::SeqCst) {
            self.0.slot.fire(Ok(()));
        }
        Ok(())
    }
}

/// Sink en memoria: registra lo que se reproduce y deja disparar los callbacks a mano.
pub struct FakeSink {
    connected: AtomicBool,
    reconnect_ok: AtomicBool,
    hold_reconnect: AtomicBool,
    reconnect_gate: Notify,
    complete_on_stop: Arc<AtomicBool>,
    reconnects: AtomicUsize,
    disconnects: AtomicUsize,
    started: Mutex<Vec<String>>,
    failing_titles: Mutex<HashMap<String, PlaybackError>>,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            reconnect_ok: AtomicBool::new(true),
            hold_reconnect: AtomicBool::new(false),
            reconnect_gate: Notify::new(),
            complete_on_stop: Arc::new(AtomicBool::new(true)),
            reconnects: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            started: Mutex::new(Vec::new()),
            failing_titles: Mutex::new(HashMap::new()),
            tracks: Mutex::new(Vec::new()),
        })
    }

    pub fn weak(self: &Arc<Self>) -> Weak<dyn AudioSink> {
        let sink: Arc<dyn AudioSink> = self.clone();
        Arc::downgrade(&sink)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_reconnect_ok(&self, ok: bool) {
        self.reconnect_ok.store(ok, Ordering::SeqCst);
    }

    /// Con `true`, `reconnect()` espera a [`FakeSink::release_reconnect`].
    pub fn set_hold_reconnect(&self, hold: bool) {
        self.hold_reconnect.store(hold, Ordering::SeqCst);
    }

    pub fn release_reconnect(&self) {
        self.reconnect_gate.notify_one();
    }

    /// Con `false`, `stop()` no dispara el callback hasta llamar a [`FakeSink::finish_current`].
    pub fn set_complete_on_stop(&self, complete: bool) {
        self.complete_on_stop.store(complete, Ordering::SeqCst);
    }

    pub fn fail_start(&self, title: &str, error: PlaybackError) {
        self.failing_titles.lock().insert(title.to_string(), error);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().clone()
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.tracks
            .lock()
            .last()
            .is_some_and(|track| track.paused.load(Ordering::SeqCst))
    }

    /// Dispara el callback de la última pista arrancada.
    pub fn finish_current(&self, outcome: TrackOutcome) -> bool {
        let track = self.tracks.lock().last().cloned();
        track.is_some_and(|track| track.slot.fire(outcome))
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn start(
        &self,
        track: &TrackDescriptor,
        _volume: f32,
        on_complete: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError> {
        if !self.is_connected() {
            return Err(PlaybackError::Disconnected);
        }
        if let Some(error) = self.failing_titles.lock().get(&track.title) {
            return Err(error.clone());
        }

        self.started.lock().push(track.title.clone());
        let fake = Arc::new(FakeTrack {
            slot: CompletionSlot::new(on_complete),
            paused: AtomicBool::new(false),
            complete_on_stop: self.complete_on_stop.clone(),
        });
        self.tracks.lock().push(fake.clone());
        Ok(Box::new(FakeHandle(fake)))
    }

    async fn reconnect(&self) -> Result<(), PlaybackError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.hold_reconnect.load(Ordering::SeqCst) {
            self.reconnect_gate.notified().await;
        }
        if self.reconnect_ok.load(Ordering::SeqCst) {
            self.set_connected(true);
            Ok(())
        } else {
            Err(PlaybackError::Reconnect("canal no disponible".to_string()))
        }
    }

    async fn disconnect(&self) {
        self.set_connected(false);
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Espera a que los callbacks en vuelo dejen la sesión en el estado esperado.
pub async fn wait_for(
    session: &GuildSession,
    condition: impl Fn(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    for _ in 0..500 {
        let snapshot = session.snapshot().await;
        if condition(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    panic!("la sesión no llegó al estado esperado: {:?}", session.snapshot().await);
}
