use anyhow::Result;
use serenity::{
    builder::{CreateAutocompleteResponse, CreateInteractionResponse},
    model::application::CommandInteraction,
    prelude::Context,
};
use tracing::debug;

use crate::{
    audio::category::TrackCategory,
    bot::{
        handlers::{get_str, subcommand},
        OpenPaletteBot,
    },
    library::AUTOCOMPLETE_LIMIT,
};

/// Discord rechaza opciones de más de 100 caracteres
const MAX_CHOICE_CHARS: usize = 100;

/// Sugerencias para nombres de archivo, paletas y grupos
pub async fn handle_autocomplete(
    ctx: &Context,
    request: &CommandInteraction,
    bot: &OpenPaletteBot,
) -> Result<()> {
    let Some(focused) = request.data.autocomplete() else {
        return Ok(());
    };

    let options = subcommand(&request.data.options)
        .map(|(_, inner)| inner)
        .unwrap_or(&request.data.options);
    let user = request.user.id;

    let choices = match focused.name {
        "filename" | "music_file" | "ambient_file" => {
            let selected = get_str(options, "category").or_else(|| get_str(options, "source"));
            let category = filename_category(focused.name, selected);
            bot.library.list(category, user, focused.value).await
        }
        "palette" => matching(bot.palettes.lock().await.list_palettes(user.get()), focused.value),
        "group" => matching(bot.palettes.lock().await.list_groups(user.get()), focused.value),
        _ => Vec::new(),
    };

    debug!(
        "Autocompletado /{} {}='{}': {} opciones",
        request.data.name,
        focused.name,
        focused.value,
        choices.len()
    );

    let response = choices
        .into_iter()
        .filter(|name| name.chars().count() <= MAX_CHOICE_CHARS)
        .fold(CreateAutocompleteResponse::new(), |response, name| {
            response.add_string_choice(name.clone(), name)
        });

    request
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;
    Ok(())
}

/// Carpeta que recorre una opción de archivo: fija para las entradas del
/// mezclador; si no, la categoría ya elegida (music por defecto).
fn filename_category(field: &str, selected: Option<&str>) -> TrackCategory {
    match field {
        "music_file" => TrackCategory::Music,
        "ambient_file" => TrackCategory::Ambient,
        _ => selected
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(TrackCategory::Music),
    }
}

/// Coincidencia parcial sin distinguir mayúsculas, limitada para Discord
fn matching(names: Vec<String>, filter: &str) -> Vec<String> {
    let filter = filter.trim().to_lowercase();
    names
        .into_iter()
        .filter(|name| name.to_lowercase().contains(&filter))
        .take(AUTOCOMPLETE_LIMIT)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_filename_category() {
        assert_eq!(filename_category("music_file", Some("ambient")), TrackCategory::Music);
        assert_eq!(filename_category("ambient_file", None), TrackCategory::Ambient);
        assert_eq!(filename_category("filename", Some("mixed")), TrackCategory::Mixed);
        assert_eq!(filename_category("filename", Some("nope")), TrackCategory::Music);
        assert_eq!(filename_category("filename", None), TrackCategory::Music);
    }

    #[test]
    fn test_matching_filters_and_caps() {
        let names = vec!["Noche".to_string(), "Taberna".to_string(), "noche lluviosa".to_string()];
        assert_eq!(matching(names, "NOCHE"), vec!["Noche", "noche lluviosa"]);

        let many: Vec<String> = (0..40).map(|i| format!("paleta {}", i)).collect();
        assert_eq!(matching(many, "").len(), AUTOCOMPLETE_LIMIT);
    }
}
