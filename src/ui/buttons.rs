use serenity::{all::ButtonStyle, builder::{CreateActionRow, CreateButton}};

use super::chat::PlaybackControls;

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const SKIP: &str = "music_skip";
}

/// Controles que acompañan al mensaje de "Now Playing".
///
/// The first button flips between Pause and Resume with the player state.
pub fn playback_controls(state: PlaybackControls) -> Vec<CreateActionRow> {
    let toggle = match state {
        PlaybackControls::Playing => CreateButton::new(button_ids::PAUSE)
            .label("Pause")
            .emoji('⏸')
            .style(ButtonStyle::Secondary),
        PlaybackControls::Paused => CreateButton::new(button_ids::RESUME)
            .label("Resume")
            .emoji('▶')
            .style(ButtonStyle::Success),
    };

    let skip = CreateButton::new(button_ids::SKIP)
        .label("Skip")
        .emoji('⏭')
        .style(ButtonStyle::Primary);

    vec![CreateActionRow::Buttons(vec![toggle, skip])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_row_for_each_state() {
        assert_eq!(playback_controls(PlaybackControls::Playing).len(), 1);
        assert_eq!(playback_controls(PlaybackControls::Paused).len(), 1);
    }
}
