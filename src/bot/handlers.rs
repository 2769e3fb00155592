use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
        mention::Mentionable,
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{orchestrator::ControlOutcome, track::Requester},
    bot::JukeboxBot,
    sources::{autoplaylist::PlaylistChange, is_playlist_url},
    ui::{
        buttons::{self, button_ids},
        chat::PlaybackControls,
        embeds, messages,
    },
};

/// Where a requested track lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlayMode {
    Queue,
    Next,
    Now,
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await?,
        "leave" => handle_leave(ctx, &command, bot).await?,
        "play" => handle_play(ctx, &command, bot, guild_id, PlayMode::Queue).await?,
        "playnext" => handle_play(ctx, &command, bot, guild_id, PlayMode::Next).await?,
        "playnow" => handle_play(ctx, &command, bot, guild_id, PlayMode::Now).await?,
        "skip" => {
            let outcome = bot.orchestrator.skip();
            reply(ctx, &command, messages::control_reply(&outcome, command.user.display_name())).await?
        }
        "pause" => {
            let outcome = bot.orchestrator.pause();
            reply(ctx, &command, messages::control_reply(&outcome, command.user.display_name())).await?
        }
        "resume" => {
            let outcome = bot.orchestrator.resume();
            reply(ctx, &command, messages::control_reply(&outcome, command.user.display_name())).await?
        }
        "clear" => {
            let outcome = bot.orchestrator.clear();
            reply(ctx, &command, messages::control_reply(&outcome, command.user.display_name())).await?
        }
        "shuffle" => {
            let outcome = bot.orchestrator.shuffle();
            reply(ctx, &command, messages::control_reply(&outcome, command.user.display_name())).await?
        }
        "queue" => handle_queue(ctx, &command, bot).await?,
        "autoplaylist" => handle_autoplaylist(ctx, &command, bot).await?,
        "help" => reply_embed(ctx, &command, embeds::create_help_embed(), true).await?,
        _ => {
            command
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Unknown command")
                            .ephemeral(true),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

/// Botones del mensaje de "Now Playing"
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    info!(
        "🔘 Botón {} presionado por {}",
        component.data.custom_id, component.user.name
    );

    let outcome = match component.data.custom_id.as_str() {
        button_ids::PAUSE => bot.orchestrator.pause(),
        button_ids::RESUME => bot.orchestrator.resume(),
        button_ids::SKIP => bot.orchestrator.skip(),
        _ => {
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Message(
                        CreateInteractionResponseMessage::new()
                            .content("❌ Unknown action")
                            .ephemeral(true),
                    ),
                )
                .await?;
            return Ok(());
        }
    };

    let text = messages::control_reply(&outcome, component.user.display_name());
    let response = match outcome {
        // El botón cambia en el mismo mensaje
        ControlOutcome::Paused => CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .components(buttons::playback_controls(PlaybackControls::Paused)),
        ),
        ControlOutcome::Resumed => CreateInteractionResponse::UpdateMessage(
            CreateInteractionResponseMessage::new()
                .components(buttons::playback_controls(PlaybackControls::Playing)),
        ),
        ControlOutcome::Skipped(_) => {
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(text))
        }
        _ => CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        ),
    };

    component.create_response(&ctx.http, response).await?;
    Ok(())
}

/// Last resort reply when a handler failed. The interaction may or may not
/// have been answered already.
pub async fn report_failure(ctx: &Context, command: &CommandInteraction) {
    let embed = embeds::create_error_embed("Error", messages::COMMAND_ERROR);

    let responded = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed.clone())
                    .ephemeral(true),
            ),
        )
        .await;

    if responded.is_err() {
        if let Err(e) = command
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .embed(embed)
                    .ephemeral(true),
            )
            .await
        {
            debug!("No se pudo informar el error al usuario: {:?}", e);
        }
    }
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let Some(channel_id) = caller_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, messages::NOT_IN_VOICE_CHANNEL).await;
    };

    bot.orchestrator.set_message_channel(command.channel_id);
    let text = match bot.orchestrator.join(guild_id, channel_id).await {
        Ok(()) => messages::joined(channel_id.mention()),
        Err(e) => {
            warn!("⚠️ No se pudo unir al canal {}: {}", channel_id, e);
            messages::FAILED_TO_JOIN.to_string()
        }
    };

    reply(ctx, command, text).await
}

async fn handle_leave(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    bot.orchestrator.leave().await;
    reply(ctx, command, messages::LEFT_CHANNEL).await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
    mode: PlayMode,
) -> Result<()> {
    let query = string_option(&command.data.options, "query")
        .map(str::trim)
        .filter(|q| !q.is_empty());
    let Some(query) = query else {
        return reply(ctx, command, messages::PROVIDE_QUERY).await;
    };

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(text) = connect_caller(ctx, bot, guild_id, command).await {
        return edit(ctx, command, text).await;
    }

    let requester = Requester::new(command.user.display_name(), command.user.id);

    let text = if mode == PlayMode::Queue && is_playlist_url(query) {
        match bot.resolver.resolve_playlist(query, &requester).await {
            Ok(tracks) if !tracks.is_empty() => {
                messages::playlist_added(bot.orchestrator.add_all(tracks))
            }
            Ok(_) => messages::COULD_NOT_PROCESS.to_string(),
            Err(e) => {
                warn!("⚠️ No se pudo resolver la playlist {}: {}", query, e);
                messages::COULD_NOT_PROCESS.to_string()
            }
        }
    } else {
        match bot.resolver.resolve(query, &requester).await {
            Ok(track) => match mode {
                PlayMode::Queue => {
                    let text = messages::added_to_queue(&track);
                    bot.orchestrator.add_and_play(track);
                    text
                }
                PlayMode::Next => {
                    let text = messages::added_to_front(&track);
                    bot.orchestrator.add_next(track);
                    text
                }
                PlayMode::Now => {
                    let text = messages::now_playing_immediate(&track);
                    bot.orchestrator.play_now(track);
                    text
                }
            },
            Err(e) => {
                warn!("⚠️ No se pudo resolver '{}': {}", query, e);
                messages::COULD_NOT_PROCESS.to_string()
            }
        }
    };

    edit(ctx, command, text).await
}

async fn handle_queue(ctx: &Context, command: &CommandInteraction, bot: &JukeboxBot) -> Result<()> {
    let current = bot.orchestrator.now_playing();
    let pending = bot.orchestrator.snapshot();
    let listing = messages::queue_listing(
        current.as_ref().map(|(track, elapsed)| (track, *elapsed)),
        &pending,
    );
    reply(ctx, command, listing).await
}

async fn handle_autoplaylist(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(sub) = command.data.options.first() else {
        return reply(ctx, command, "❌ Missing subcommand").await;
    };
    let args: &[CommandDataOption] = match &sub.value {
        CommandDataOptionValue::SubCommand(args) => args,
        _ => &[],
    };
    let name = string_option(args, "name");
    let playlists = &bot.autoplaylists;

    let embed = match (sub.name.as_str(), name) {
        ("list", _) => match playlists.list().await {
            Ok(names) => {
                let active = playlists.active().await;
                embeds::create_autoplaylist_list_embed(&names, active.as_deref())
            }
            Err(e) => embeds::create_error_embed("Autoplaylist", &e.to_string()),
        },
        ("show", Some(name)) => match playlists.show(name).await {
            Ok(urls) => embeds::create_autoplaylist_embed(name, &urls),
            Err(e) => embeds::create_error_embed("Autoplaylist", &e.to_string()),
        },
        ("set", Some(name)) => match playlists.set_active(name).await {
            Ok(()) => embeds::create_success_embed(
                "Autoplaylist",
                &format!("Active autoplaylist set to **{name}**"),
            ),
            Err(e) => embeds::create_error_embed("Autoplaylist", &e.to_string()),
        },
        ("add", Some(name)) => match string_option(args, "url") {
            Some(url) => match playlists.add(name, url).await {
                Ok(PlaylistChange::Created) => embeds::create_success_embed(
                    "Autoplaylist",
                    &format!("Created **{name}** with <{url}>"),
                ),
                Ok(PlaylistChange::Updated) => embeds::create_success_embed(
                    "Autoplaylist",
                    &format!("Added <{url}> to **{name}**"),
                ),
                Err(e) => embeds::create_error_embed("Autoplaylist", &e.to_string()),
            },
            None => embeds::create_error_embed("Autoplaylist", "A URL is required"),
        },
        _ => embeds::create_error_embed("Autoplaylist", "Unknown subcommand"),
    };

    reply_embed(ctx, command, embed, false).await
}

// Funciones auxiliares

fn string_option<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn caller_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

/// Joins the caller's channel unless already connected. The error is the
/// reply to show.
async fn connect_caller(
    ctx: &Context,
    bot: &JukeboxBot,
    guild_id: GuildId,
    command: &CommandInteraction,
) -> std::result::Result<(), &'static str> {
    bot.orchestrator.set_message_channel(command.channel_id);
    if bot.orchestrator.is_connected() {
        return Ok(());
    }

    let channel_id =
        caller_voice_channel(ctx, guild_id, command.user.id).ok_or(messages::NOT_IN_VOICE_CHANNEL)?;

    bot.orchestrator
        .connect(guild_id, channel_id)
        .await
        .map_err(|e| {
            warn!("⚠️ No se pudo unir al canal {}: {}", channel_id, e);
            messages::FAILED_TO_JOIN
        })
}

async fn reply(ctx: &Context, command: &CommandInteraction, text: impl Into<String>) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().content(text)),
        )
        .await?;
    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(ctx: &Context, command: &CommandInteraction, text: impl Into<String>) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}
