use chrono::{DateTime, Utc};
use serenity::model::id::UserId;
use std::collections::VecDeque;
use tracing::{debug, info};

/// Petición de reproducción tal como la escribió el usuario.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRequest {
    pub query: String,
    pub requested_by: UserId,
    pub added_at: DateTime<Utc>,
}

impl TrackRequest {
    pub fn new(query: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            query: query.into(),
            requested_by,
            added_at: Utc::now(),
        }
    }
}

/// Entrada del listado de la cola, con posición 1-based para mostrar.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueEntry {
    pub position: usize,
    pub request: TrackRequest,
}

/// Cola FIFO de peticiones pendientes de una guild.
///
/// Solo cambia de orden al sacar por el frente o al limpiarse.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<TrackRequest>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega una petición al final de la cola
    pub fn enqueue(&mut self, request: TrackRequest) {
        debug!("➕ Agregado a la cola: {}", request.query);
        self.items.push_back(request);
    }

    /// Obtiene la siguiente petición (FIFO)
    pub fn pop_front(&mut self) -> Option<TrackRequest> {
        let next = self.items.pop_front();
        if next.is_none() {
            debug!("📭 Cola vacía, no hay siguiente petición");
        }
        next
    }

    /// Limpia la cola y devuelve cuántas peticiones se descartaron
    pub fn clear(&mut self) -> usize {
        let cleared = self.items.len();
        self.items.clear();
        if cleared > 0 {
            info!("🗑️ Cola limpiada: {} peticiones descartadas", cleared);
        }
        cleared
    }

    pub fn peek_all(&self) -> Vec<QueueEntry> {
        self.items
            .iter()
            .enumerate()
            .map(|(index, request)| QueueEntry {
                position: index + 1,
                request: request.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub entries: Vec<QueueEntry>,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Obtiene una página específica de un listado (páginas 1-based)
pub fn page(entries: &[QueueEntry], page: usize, items_per_page: usize) -> QueuePage {
    let items_per_page = items_per_page.max(1);
    let total_items = entries.len();
    let total_pages = if total_items == 0 {
        1
    } else {
        total_items.div_ceil(items_per_page)
    };
    let current_page = page.clamp(1, total_pages);
    let start = (current_page - 1) * items_per_page;
    let end = (start + items_per_page).min(total_items);

    QueuePage {
        entries: entries.get(start..end).map(<[_]>::to_vec).unwrap_or_default(),
        current_page,
        total_pages,
        total_items,
    }
}
