use thiserror::Error;

use super::state::PlaybackState;

/// Fallo al convertir una petición en algo reproducible.
///
/// Siempre se recupera descartando la petición y pasando a la siguiente.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("no se encontraron resultados para `{0}`")]
    NotFound(String),
    #[error("entrada no válida: {0}")]
    InvalidInput(String),
    #[error("el resolvedor no respondió en {0:?}")]
    Timeout(std::time::Duration),
    #[error("error del resolvedor: {0}")]
    Backend(String),
}

/// Fallo del sink de audio durante o al iniciar una pista.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackError {
    #[error("no se pudo iniciar la pista: {0}")]
    Start(String),
    #[error("la pista falló durante la reproducción: {0}")]
    Stream(String),
    #[error("el control de la pista falló: {0}")]
    Control(String),
    #[error("la conexión de voz se cerró")]
    Disconnected,
    #[error("no se pudo reconectar: {0}")]
    Reconnect(String),
}

/// Resultado de una operación de sesión que no produjo el efecto pedido.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("no hay nada reproduciéndose")]
    NothingPlaying,
    #[error("`{command}` no tiene efecto en estado {state}")]
    InvalidCommand {
        command: &'static str,
        state: PlaybackState,
    },
    #[error("no hay conexión de voz activa")]
    NotConnected,
    #[error("la cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },
    #[error("se perdió la conexión de voz")]
    ConnectionLost,
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

impl SessionError {
    /// `true` when the command simply had nothing to act on.
    ///
    /// The front end answers these with an informational message instead of
    /// an error.
    pub fn is_noop(&self) -> bool {
        matches!(
            self,
            SessionError::NothingPlaying
                | SessionError::InvalidCommand { .. }
                | SessionError::NotConnected
                | SessionError::ConnectionLost
        )
    }
}
