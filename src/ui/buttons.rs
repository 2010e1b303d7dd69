use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

use crate::audio::state::PlaybackState;

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "player_pause";
    pub const RESUME: &str = "player_resume";
    pub const SKIP: &str = "player_skip";
    pub const STOP: &str = "player_stop";
    pub const QUEUE: &str = "player_queue";
}

/// Controles del reproductor según el estado de la sesión.
///
/// En pausa se ofrece reanudar en lugar de pausar.
pub fn create_player_controls(state: PlaybackState) -> Vec<CreateActionRow> {
    let toggle = if state == PlaybackState::Paused {
        CreateButton::new(button_ids::RESUME)
            .emoji('▶')
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .emoji('⏸')
            .style(ButtonStyle::Primary)
    };

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    let queue = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .style(ButtonStyle::Secondary);

    vec![CreateActionRow::Buttons(vec![toggle, skip, stop, queue])]
}
