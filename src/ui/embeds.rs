use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::player::{GuildPlaybackState, StateSource},
    sources::{SoundCategory, SoundEntry, SoundFile},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const EFFECT_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Hibiki";

/// Discord no acepta más de 25 campos ni descripciones enormes
const MAX_LISTED_SOUNDS: usize = 20;

/// Crea un embed para la música que empieza a sonar en bucle
pub fn create_now_playing_embed(file: &SoundFile, channel: Option<&str>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo en bucle")
        .description(format!("**{}**", file.info.name))
        .color(colors::MUSIC_PURPLE)
        .field("📄 Archivo", format!("`{}`", file.info.filename), true);

    if let Some(channel) = channel {
        embed = embed.field("🔊 Canal", channel, true);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para un efecto disparado
pub fn create_effect_embed(file: &SoundFile) -> CreateEmbed {
    CreateEmbed::default()
        .title("💥 Efecto")
        .description(format!("**{}**", file.info.name))
        .color(colors::EFFECT_ORANGE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con el listado de una categoría
pub fn create_sound_list_embed(category: SoundCategory, entries: &[SoundEntry]) -> CreateEmbed {
    let (title, color, hint) = match category {
        SoundCategory::Music => ("🎼 Música disponible", colors::MUSIC_PURPLE, "/play <pista>"),
        SoundCategory::Effects => ("💥 Efectos disponibles", colors::EFFECT_ORANGE, "/effect <nombre>"),
    };

    let embed = CreateEmbed::default().title(title).color(color);

    if entries.is_empty() {
        return embed
            .description("😴 **No hay sonidos en esta categoría**")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    let mut description = String::new();
    for entry in entries.iter().take(MAX_LISTED_SOUNDS) {
        description.push_str(&format!(
            "• **{}** `{}` ({})\n",
            entry.info.name,
            entry.info.id,
            format_size(entry.size)
        ));
    }
    if entries.len() > MAX_LISTED_SOUNDS {
        description.push_str(&format!("… y {} más\n", entries.len() - MAX_LISTED_SOUNDS));
    }

    embed
        .description(description)
        .footer(CreateEmbedFooter::new(format!(
            "{} sonidos • Usa {}",
            entries.len(),
            hint
        )))
        .timestamp(Timestamp::now())
}

/// Crea un embed con el estado del reproductor de una guild
pub fn create_status_embed(state: Option<&GuildPlaybackState>) -> CreateEmbed {
    let Some(state) = state else {
        return CreateEmbed::default()
            .title("📴 Sin conexión")
            .description("Hibiki no está en ningún canal de voz. Usa `/join` para empezar.")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    };

    let channel = state
        .connected_channel_name
        .as_deref()
        .map(|name| format!("#{}", name))
        .unwrap_or_else(|| "—".to_string());
    let track = state
        .track
        .as_ref()
        .map(|track| format!("**{}**", track.name))
        .unwrap_or_else(|| "Nada".to_string());
    let status = if state.is_idle { "💤 En silencio" } else { "🔊 Sonando" };
    let source = match state.source {
        StateSource::Live => "En vivo",
        StateSource::Snapshot => "Último estado guardado",
    };

    CreateEmbed::default()
        .title("📊 Estado de Hibiki")
        .color(if state.is_idle {
            colors::NEUTRAL_GRAY
        } else {
            colors::SUCCESS_GREEN
        })
        .field("🔊 Canal", channel, true)
        .field("🎵 Música", track, true)
        .field("📡 Estado", status, true)
        .footer(CreateEmbedFooter::new(format!("{} • {}", source, STANDARD_FOOTER)))
        .timestamp(Timestamp::from(state.last_updated))
}

/// Crea un embed de ayuda general
pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Hibiki - Guía")
        .color(colors::INFO_BLUE)
        .description("Música ambiental en bucle con efectos de sonido encima")
        .field(
            "🔊 Conexión",
            "• `/join` - Entra a tu canal de voz\n\
            • `/leave` - Sale del canal",
            false,
        )
        .field(
            "🎵 Música",
            "• `/play <pista> [canal]` - Reproduce una pista en bucle\n\
            • `/stop` - Detiene la música\n\
            • `/songs` - Lista la música disponible",
            false,
        )
        .field(
            "💥 Efectos",
            "• `/effect <nombre> [canal]` - Suena un efecto sobre la música\n\
            • `/effects` - Lista los efectos disponibles",
            false,
        )
        .field("📊 Estado", "• `/status` - Canal y pista actuales", false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea un tamaño en bytes en formato legible
fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f >= MB {
        format!("{:.1} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.0} KB", bytes_f / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2 KB");
        assert_eq!(format_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
