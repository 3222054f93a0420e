use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use crate::{
    audio::{voice::VoiceTarget, AudioError},
    bot::HibikiBot,
    sources::SoundCategory,
    ui::embeds,
};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &HibikiBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(ctx, &command, bot, guild_id).await,
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "stop" => handle_stop(ctx, &command, bot, guild_id).await,
        "effect" => handle_effect(ctx, &command, bot, guild_id).await,
        "songs" => handle_list(ctx, &command, bot, SoundCategory::Music).await,
        "effects" => handle_list(ctx, &command, bot, SoundCategory::Effects).await,
        "status" => handle_status(ctx, &command, bot, guild_id).await,
        "help" => respond(ctx, &command, embeds::create_help_embed(), false).await,
        _ => {
            respond(
                ctx,
                &command,
                embeds::create_error_embed("Comando no reconocido", "Usa `/help`"),
                true,
            )
            .await
        }
    }
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    let target = match get_user_voice_channel(ctx, guild_id, command.user.id) {
        Ok(target) => target,
        Err(e) => {
            return respond(
                ctx,
                command,
                embeds::create_error_embed("Sin canal de voz", &e.to_string()),
                true,
            )
            .await;
        }
    };

    command.defer(ctx).await?;
    let label = target.label.clone();
    let embed = match bot.registry.connect(guild_id, target).await {
        Ok(()) => embeds::create_success_embed("Conectado", &format!("🔊 Conectado a **#{}**", label)),
        Err(e) => audio_error_embed(&e),
    };
    edit(ctx, command, embed).await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.registry.disconnect(guild_id).await;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Desconectado", "👋 Hibiki salió del canal de voz"),
        false,
    )
    .await
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    let track = string_option(command, "track").unwrap_or_default();
    let channel = channel_option(ctx, command, guild_id);

    command.defer(ctx).await?;
    let embed = match bot.registry.play_music(guild_id, &track, channel).await {
        Ok(file) => {
            let channel = bot
                .registry
                .connected_channel_id(guild_id)
                .await
                .map(|channel_id| channel_name(ctx, guild_id, channel_id));
            embeds::create_now_playing_embed(&file, channel.as_deref())
        }
        Err(e) => audio_error_embed(&e),
    };
    edit(ctx, command, embed).await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    bot.registry.stop(guild_id).await;

    respond(
        ctx,
        command,
        embeds::create_info_embed("Música detenida", "⏹️ Los efectos siguen disponibles"),
        false,
    )
    .await
}

async fn handle_effect(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    let name = string_option(command, "name").unwrap_or_default();
    let channel = channel_option(ctx, command, guild_id);

    command.defer(ctx).await?;
    let embed = match bot.registry.play_effect(guild_id, &name, channel).await {
        Ok(file) => embeds::create_effect_embed(&file),
        Err(e) => audio_error_embed(&e),
    };
    edit(ctx, command, embed).await
}

async fn handle_list(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    category: SoundCategory,
) -> Result<()> {
    let embed = match bot.catalog.list(category).await {
        Ok(entries) => embeds::create_sound_list_embed(category, &entries),
        Err(e) => audio_error_embed(&e),
    };
    respond(ctx, command, embed, false).await
}

async fn handle_status(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &HibikiBot,
    guild_id: GuildId,
) -> Result<()> {
    let state = bot
        .registry
        .get_state()
        .await
        .into_iter()
        .find(|state| state.guild_id == guild_id);

    respond(ctx, command, embeds::create_status_embed(state.as_ref()), true).await
}

fn audio_error_embed(error: &AudioError) -> CreateEmbed {
    match error {
        AudioError::NotConnected => embeds::create_error_embed("Sin conexión", &error.to_string()),
        AudioError::NotFound { .. } => embeds::create_error_embed("No encontrado", &error.to_string()),
        AudioError::ConnectionTimeout { .. } | AudioError::Voice(_) => {
            embeds::create_error_embed("Error de conexión", &error.to_string())
        }
        _ => {
            error!("Error de audio: {:?}", error);
            embeds::create_error_embed("Error de audio", &error.to_string())
        }
    }
}

async fn respond(
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

async fn edit(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

fn string_option(command: &CommandInteraction, name: &str) -> Option<String> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::to_string)
}

/// Canal indicado en la opción `channel`, con su nombre desde la caché
fn channel_option(ctx: &Context, command: &CommandInteraction, guild_id: GuildId) -> Option<VoiceTarget> {
    let channel_id = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "channel")
        .and_then(|opt| opt.value.as_channel_id())?;

    Some(VoiceTarget::new(channel_id, channel_name(ctx, guild_id, channel_id)))
}

fn channel_name(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> String {
    guild_id
        .to_guild_cached(&ctx.cache)
        .and_then(|guild| guild.channels.get(&channel_id).map(|channel| channel.name.clone()))
        .unwrap_or_else(|| channel_id.to_string())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<VoiceTarget> {
    let channel_id = {
        let guild = guild_id
            .to_guild_cached(&ctx.cache)
            .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

        guild
            .voice_states
            .get(&user_id)
            .and_then(|voice_state| voice_state.channel_id)
            .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?
    };

    Ok(VoiceTarget::new(channel_id, channel_name(ctx, guild_id, channel_id)))
}
