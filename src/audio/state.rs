use std::fmt;

/// Estado de reproducción de una guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Resolviendo la petición actual y arrancando el sink.
    Connecting,
    Playing,
    Paused,
    /// Entre el fin de una pista y el arranque de la siguiente.
    Advancing,
    Disconnected,
}

/// Eventos que mueven la máquina de estados.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    /// Se sacó una petición de la cola (o se reintenta la actual) y empieza a resolverse.
    Load,
    /// El sink aceptó la pista.
    Started,
    /// La resolución o el arranque del sink falló.
    LoadFailed,
    Pause,
    Resume,
    Skip,
    Stop,
    /// Callback de finalización del sink: fin natural, error o stop.
    TrackEnded,
    QueueDrained,
    ConnectionLost,
    GiveUp,
    Leave,
}

impl PlaybackState {
    /// Tabla de transiciones. `None` significa que el evento no aplica en este estado.
    pub fn next(self, event: PlaybackEvent) -> Option<PlaybackState> {
        use PlaybackEvent as E;
        use PlaybackState as S;

        match (self, event) {
            (S::Idle | S::Advancing | S::Disconnected, E::Load) => Some(S::Connecting),
            (S::Connecting, E::Started) => Some(S::Playing),
            (S::Connecting, E::LoadFailed) => Some(S::Advancing),

            (S::Playing, E::Pause) => Some(S::Paused),
            (S::Paused, E::Resume) => Some(S::Playing),

            // En Advancing ya hay un salto pendiente: un segundo skip no avanza otra vez.
            (S::Playing | S::Paused | S::Connecting, E::Skip) => Some(S::Advancing),
            (S::Playing | S::Paused | S::Connecting | S::Advancing, E::Stop) => Some(S::Idle),

            (S::Playing | S::Paused | S::Advancing, E::TrackEnded) => Some(S::Advancing),
            (S::Advancing, E::QueueDrained) => Some(S::Idle),

            (S::Connecting | S::Playing | S::Paused | S::Advancing, E::ConnectionLost) => {
                Some(S::Disconnected)
            }
            (S::Disconnected, E::GiveUp) => Some(S::Idle),

            (_, E::Leave) => Some(S::Idle),
            _ => None,
        }
    }

    /// Hay una pista cargada en el sink.
    pub fn has_track(self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }

    /// Se está reproduciendo o preparando algo; un enqueue solo encola.
    pub fn is_busy(self) -> bool {
        !matches!(self, PlaybackState::Idle)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Idle => "Idle",
            PlaybackState::Connecting => "Connecting",
            PlaybackState::Playing => "Playing",
            PlaybackState::Paused => "Paused",
            PlaybackState::Advancing => "Advancing",
            PlaybackState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}
