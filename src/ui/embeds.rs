use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        category::TrackCategory,
        player::{CurrentTrack, FadeSettings, PlaybackPhase, MAX_VOLUME},
    },
    storage::Palette,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎨 Open Palette";

/// Slots por campo del embed
const SLOTS_PER_FIELD: usize = 10;

/// Estado del player de una guild para el embed de reproducción actual
pub struct NowPlaying<'a> {
    pub track: &'a CurrentTrack,
    pub phase: PlaybackPhase,
    pub position: Option<f64>,
    pub duration: f64,
    pub volume: f32,
    pub looping: bool,
}

/// Crea un embed para mostrar el track actual
pub fn create_now_playing_embed(now: &NowPlaying<'_>) -> CreateEmbed {
    let (title, color) = match now.phase {
        PlaybackPhase::Paused => ("⏸️ En Pausa", colors::WARNING_ORANGE),
        _ => ("🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN),
    };

    let position = now.position.unwrap_or(0.0);
    let progress = if now.duration > 0.0 {
        format!(
            "{} / {}",
            format_seconds(position),
            format_seconds(now.duration)
        )
    } else {
        format!("{} / ?", format_seconds(position))
    };

    CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", now.track.file_name()))
        .color(color)
        .field("📂 Categoría", now.track.category.as_str(), true)
        .field("⏱️ Posición", progress, true)
        .field("🔊 Volumen", format!("{:.0}%", now.volume * 100.0), true)
        .field("🔁 Loop", if now.looping { "Activado" } else { "Desactivado" }, true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Panel de una paleta con sus slots asignados
pub fn create_palette_embed(name: &str, palette: &Palette, status: Option<&str>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("🎨 Paleta: {}", name))
        .description("Pulsa un slot para reproducirlo. Controles: Stop / Pause / Loop / Resume / Close")
        .color(colors::MUSIC_PURPLE);

    if let Some(status) = status {
        embed = embed.field("📢 Estado", status, false);
    }

    let lines: Vec<String> = palette
        .assigned()
        .map(|(slot, entry)| format!("`{:>2}` {} · _{}_", slot, entry.shortname, entry.category))
        .collect();

    if lines.is_empty() {
        embed = embed.field("🎚️ Slots", "Sin tracks asignados. Usa `/palette add`.", false);
    } else {
        for (i, chunk) in lines.chunks(SLOTS_PER_FIELD).enumerate() {
            let title = if i == 0 { "🎚️ Slots asignados" } else { "…" };
            embed = embed.field(title, chunk.join("\n"), false);
        }
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Configuración de fades de una categoría
pub fn create_fade_settings_embed(category: TrackCategory, fades: &FadeSettings) -> CreateEmbed {
    let describe = |enabled: bool, seconds: f64| {
        format!("{} · {:.1}s", if enabled { "✅ Activado" } else { "⛔ Desactivado" }, seconds)
    };

    CreateEmbed::default()
        .title(format!("🌗 Fades de '{}'", category))
        .color(colors::INFO_BLUE)
        .field("🌄 Fade-in", describe(fades.fade_in_enabled, fades.fade_in_duration), true)
        .field("🌅 Fade-out", describe(fades.fade_out_enabled, fades.fade_out_duration), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de volumen con indicador visual
pub fn create_volume_embed(category: TrackCategory, volume: f32) -> CreateEmbed {
    let volume_percent = (volume * 100.0).round() as u32;
    let status_emoji = if volume_percent == 0 {
        "🔈"
    } else if volume_percent <= 100 {
        "🔉"
    } else {
        "🔊"
    };

    CreateEmbed::default()
        .title(format!("{} Volumen de '{}'", status_emoji, category))
        .description(format!("**{}%**", volume_percent))
        .field("📊 Nivel", create_volume_bar(volume), false)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new("💡 Rango 0.0 – 2.0"))
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

/// Barra de 20 segmentos sobre el rango 0.0 – 2.0
fn create_volume_bar(volume: f32) -> String {
    let segments = 20;
    let filled = ((volume.clamp(0.0, MAX_VOLUME) / MAX_VOLUME) * segments as f32).round() as usize;
    let empty = segments - filled;

    let bar = "█".repeat(filled) + &"▒".repeat(empty);
    format!("`[{}]`", bar)
}

/// Segundos como `M:SS` o `H:MM:SS`
pub fn format_seconds(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    format_duration(Duration::from_secs_f64(seconds))
}

/// Formatea una duración en formato legible
fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.0), "0:00");
        assert_eq!(format_seconds(65.9), "1:05");
        assert_eq!(format_seconds(3725.0), "1:02:05");
        assert_eq!(format_seconds(-3.0), "0:00");
        assert_eq!(format_seconds(f64::INFINITY), "0:00");
    }

    #[test]
    fn test_volume_bar_scale() {
        assert_eq!(create_volume_bar(0.0), format!("`[{}]`", "▒".repeat(20)));
        assert_eq!(create_volume_bar(1.0), format!("`[{}{}]`", "█".repeat(10), "▒".repeat(10)));
        assert_eq!(create_volume_bar(9.0), format!("`[{}]`", "█".repeat(20)));
    }
}
