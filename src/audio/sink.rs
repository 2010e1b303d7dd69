use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::PlaybackError;
use crate::sources::TrackDescriptor;

/// Resultado final de una pista: `Ok` al terminar (o al detenerse), `Err` si falló.
pub type TrackOutcome = Result<(), PlaybackError>;

/// Callback de finalización; el sink lo invoca exactamente una vez.
pub type Completion = Box<dyn FnOnce(TrackOutcome) + Send + 'static>;

/// Control de una pista en reproducción.
pub trait PlaybackHandle: Send + Sync {
    fn pause(&self) -> Result<(), PlaybackError>;
    fn resume(&self) -> Result<(), PlaybackError>;
    /// Detiene la pista; el callback de finalización se dispara igual que en un fin natural.
    fn stop(&self) -> Result<(), PlaybackError>;
}

/// Salida de audio de una conexión de voz.
///
/// La conexión pertenece a la capa de voz del bot; las sesiones solo guardan
/// una referencia débil y comprueban [`AudioSink::is_connected`] antes de usarla.
#[async_trait]
pub trait AudioSink: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn start(
        &self,
        track: &TrackDescriptor,
        volume: f32,
        on_complete: Completion,
    ) -> Result<Box<dyn PlaybackHandle>, PlaybackError>;

    async fn reconnect(&self) -> Result<(), PlaybackError>;

    async fn disconnect(&self);
}

/// Guarda un [`Completion`] y garantiza que se invoque una sola vez,
/// aunque varios eventos del driver compitan por dispararlo.
pub struct CompletionSlot {
    inner: Mutex<Option<Completion>>,
}

impl CompletionSlot {
    pub fn new(on_complete: Completion) -> Self {
        Self {
            inner: Mutex::new(Some(on_complete)),
        }
    }

    /// Dispara el callback; devuelve `false` si ya se había disparado.
    pub fn fire(&self, outcome: TrackOutcome) -> bool {
        let callback = self.inner.lock().take();
        match callback {
            Some(callback) => {
                callback(outcome);
                true
            }
            None => false,
        }
    }
}
