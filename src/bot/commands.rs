use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        query_command("play", "Play a song or add a whole playlist to the queue"),
        query_command("playnext", "Add a song to the front of the queue"),
        query_command("playnow", "Play a song right away, skipping the current track"),
        CreateCommand::new("skip").description("Skip the current song"),
        CreateCommand::new("pause").description("Pause playback"),
        CreateCommand::new("resume").description("Resume playback"),
        CreateCommand::new("queue").description("Show the current queue"),
        CreateCommand::new("clear").description("Clear the queue"),
        CreateCommand::new("shuffle").description("Shuffle the queue"),
        autoplaylist_command(),
        CreateCommand::new("help").description("Show all commands"),
    ]
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Stop playback, clear the queue and leave")
}

// Comandos de reproducción

fn query_command(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description).add_option(
        CreateCommandOption::new(
            CommandOptionType::String,
            "query",
            "YouTube URL or search term",
        )
        .required(true),
    )
}

// Autoplaylists

fn autoplaylist_command() -> CreateCommand {
    let name_option = || {
        CreateCommandOption::new(CommandOptionType::String, "name", "Autoplaylist name")
            .required(true)
    };

    CreateCommand::new("autoplaylist")
        .description("Manage the playlists used when the queue runs dry")
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "List autoplaylists",
        ))
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "show", "Show an autoplaylist")
                .add_sub_option(name_option()),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "set",
                "Make an autoplaylist the active one",
            )
            .add_sub_option(name_option()),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "add",
                "Add a URL to an autoplaylist, creating it if needed",
            )
            .add_sub_option(name_option())
            .add_sub_option(
                CreateCommandOption::new(CommandOptionType::String, "url", "Track URL")
                    .required(true),
            ),
        )
}
