use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use super::messages;

/// Paleta de colores del bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const FOOTER: &str = "Jukebox";

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Jukebox Commands")
        .color(colors::MUSIC_PURPLE)
        .description(messages::help("/"))
        .footer(CreateEmbedFooter::new(
            "When the queue runs dry the active autoplaylist keeps the music going",
        ))
        .timestamp(Timestamp::now())
}

/// Lista de autoplaylists, marcando la activa
pub fn create_autoplaylist_list_embed(names: &[String], active: Option<&str>) -> CreateEmbed {
    let description = if names.is_empty() {
        "No autoplaylists found".to_string()
    } else {
        names
            .iter()
            .map(|name| {
                if Some(name.as_str()) == active {
                    format!("• **{name}** (active)")
                } else {
                    format!("• {name}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("📻 Available autoplaylists")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// Contenido de una autoplaylist
pub fn create_autoplaylist_embed(name: &str, urls: &[String]) -> CreateEmbed {
    let body = if urls.is_empty() {
        "_empty_".to_string()
    } else {
        let mut listed: Vec<String> = urls.iter().take(20).map(|u| format!("• <{u}>")).collect();
        if urls.len() > 20 {
            listed.push(format!("... and {} more", urls.len() - 20));
        }
        listed.join("\n")
    };

    CreateEmbed::default()
        .title(format!("📻 {name}"))
        .description(body)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!("{} entries", urls.len())))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(FOOTER))
}
