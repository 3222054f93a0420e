use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{
        application::CommandOptionType,
        channel::ChannelType,
        id::GuildId,
    },
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        stop_command(),
        effect_command(),
        songs_command(),
        effects_command(),
        status_command(),
        help_command(),
    ]
}

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

/// Canal de voz opcional; si se omite se usa la conexión actual
fn voice_channel_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::Channel,
        "channel",
        "Canal de voz donde reproducir (opcional)",
    )
    .channel_types(vec![ChannelType::Voice, ChannelType::Stage])
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta a Hibiki a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta a Hibiki del canal de voz")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una pista de música en bucle")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "track", "Id o nombre de la pista")
                .required(true),
        )
        .add_option(voice_channel_option())
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música")
}

fn effect_command() -> CreateCommand {
    CreateCommand::new("effect")
        .description("Reproduce un efecto de sonido sobre la música")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Id o nombre del efecto")
                .required(true),
        )
        .add_option(voice_channel_option())
}

// Comandos de información

fn songs_command() -> CreateCommand {
    CreateCommand::new("songs").description("Lista la música disponible")
}

fn effects_command() -> CreateCommand {
    CreateCommand::new("effects").description("Lista los efectos disponibles")
}

fn status_command() -> CreateCommand {
    CreateCommand::new("status").description("Muestra el canal y la pista actuales")
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra la ayuda del bot")
}
