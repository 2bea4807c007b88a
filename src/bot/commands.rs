use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::{audio::category::TrackCategory, storage::PALETTE_SLOTS};

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

fn all_commands() -> Vec<CreateCommand> {
    vec![
        // reproducción
        play_command(),
        now_playing_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        leave_command(),
        volume_command(),
        seek_command(),
        loop_command(),
        fade_out_command(),
        fade_in_command(),
        fade_settings_command(),
        // tracks
        mix_command(),
        upload_command(),
        upload_url_command(),
        delete_track_command(),
        delete_all_tracks_command(),
        move_track_command(),
        track_duration_command(),
        // paletas
        palette_command(),
        group_command(),
    ]
}

// Opciones compartidas

/// Selector de categoría; las subidas solo ofrecen music y ambient
fn category_option(name: &str, description: &str, include_mixed: bool) -> CreateCommandOption {
    TrackCategory::ALL
        .into_iter()
        .filter(|category| include_mixed || category.accepts_uploads())
        .fold(
            CreateCommandOption::new(CommandOptionType::String, name, description).required(true),
            |option, category| option.add_string_choice(category.as_str(), category.as_str()),
        )
}

fn filename_option(name: &str, description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, name, description)
        .required(true)
        .set_autocomplete(true)
}

fn number_option(name: &str, description: &str, max: f64) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Number, name, description)
        .min_number_value(0.0)
        .max_number_value(max)
}

fn palette_name_option(autocomplete: bool) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "palette", "Nombre de la paleta")
        .required(true)
        .set_autocomplete(autocomplete)
}

fn group_name_option(autocomplete: bool) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::String, "group", "Nombre del grupo")
        .required(true)
        .set_autocomplete(autocomplete)
}

fn ephemeral_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::Boolean,
        "ephemeral",
        "Mostrar solo para ti (por defecto sí)",
    )
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce un track de tu colección")
        .add_option(category_option("category", "Categoría del track", true))
        .add_option(filename_option("filename", "Nombre del archivo"))
        .add_option(number_option("fade_in", "Fade-in en segundos", 60.0))
        .add_option(number_option("fade_out", "Fade-out en segundos", 60.0))
}

fn now_playing_command() -> CreateCommand {
    CreateCommand::new("now_playing").description("Muestra el track actual")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Muestra o ajusta el volumen de una categoría")
        .add_option(category_option("category", "Categoría", true))
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "level", "Volumen de 0.0 a 2.0")
                .min_number_value(0.0)
                .max_number_value(2.0),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición del track actual")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "position",
                "Segundos o hh:mm:ss",
            )
            .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Activa o desactiva la repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Repetir el track")
                .required(true),
        )
        .add_option(
            category_option("category", "Categoría (por defecto la del track actual)", true)
                .required(false),
        )
}

fn fade_out_command() -> CreateCommand {
    CreateCommand::new("fade_out")
        .description("Atenúa el track actual hasta silenciarlo")
        .add_option(number_option("duration", "Duración en segundos", 120.0).required(true))
}

fn fade_in_command() -> CreateCommand {
    CreateCommand::new("fade_in")
        .description("Reinicia el track actual con fade-in")
        .add_option(number_option("duration", "Duración en segundos", 120.0).required(true))
}

fn fade_settings_command() -> CreateCommand {
    CreateCommand::new("fade_settings")
        .description("Configuración de fades por categoría")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "show", "Muestra la configuración")
                .add_sub_option(category_option("category", "Categoría", true)),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "enable", "Activa o desactiva fades")
                .add_sub_option(category_option("category", "Categoría", true))
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "fade_in",
                    "Fade-in automático",
                ))
                .add_sub_option(CreateCommandOption::new(
                    CommandOptionType::Boolean,
                    "fade_out",
                    "Fade-out automático",
                )),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "duration", "Duración de los fades")
                .add_sub_option(category_option("category", "Categoría", true))
                .add_sub_option(number_option("fade_in", "Fade-in en segundos", 60.0))
                .add_sub_option(number_option("fade_out", "Fade-out en segundos", 60.0)),
        )
}

// Comandos de tracks

fn mix_command() -> CreateCommand {
    CreateCommand::new("mix")
        .description("Mezcla un track de música con uno ambiental")
        .add_option(filename_option("music_file", "Track de música"))
        .add_option(filename_option("ambient_file", "Track ambiental"))
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mix_name", "Nombre de la mezcla")
                .required(true)
                .max_length(64),
        )
        .add_option(number_option("music_volume", "Volumen de la música (1.0)", 2.0))
        .add_option(number_option("ambient_volume", "Volumen del ambiente", 2.0))
}

fn upload_command() -> CreateCommand {
    CreateCommand::new("upload")
        .description("Sube un track a tu colección")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Attachment, "file", "Archivo de audio")
                .required(true),
        )
        .add_option(category_option("category", "Categoría", false))
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "new_name", "Nuevo nombre")
                .max_length(64),
        )
}

fn upload_url_command() -> CreateCommand {
    CreateCommand::new("upload_url")
        .description("Descarga el audio de una URL a tu colección")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL del audio").required(true),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Nombre del track")
                .required(true)
                .max_length(64),
        )
        .add_option(category_option("category", "Categoría", false))
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "start",
            "Inicio hh:mm:ss (por defecto 00:00:00)",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::String,
            "end",
            "Fin hh:mm:ss",
        ))
}

fn delete_track_command() -> CreateCommand {
    CreateCommand::new("delete_track")
        .description("Elimina un track de tu colección")
        .add_option(category_option("category", "Categoría", true))
        .add_option(filename_option("filename", "Nombre del archivo"))
}

fn delete_all_tracks_command() -> CreateCommand {
    CreateCommand::new("delete_all_tracks")
        .description("Elimina todos tus tracks de una categoría")
        .add_option(category_option("category", "Categoría", true))
}

fn move_track_command() -> CreateCommand {
    CreateCommand::new("move_track")
        .description("Mueve un track entre categorías")
        .add_option(category_option("source", "Categoría de origen", true))
        .add_option(filename_option("filename", "Nombre del archivo"))
        .add_option(category_option("target", "Categoría de destino", true))
}

fn track_duration_command() -> CreateCommand {
    CreateCommand::new("track_duration")
        .description("Muestra la duración de un track")
        .add_option(category_option("category", "Categoría", true))
        .add_option(filename_option("filename", "Nombre del archivo"))
}

// Comandos de paletas

fn palette_command() -> CreateCommand {
    CreateCommand::new("palette")
        .description("Paletas de botones para reproducir tracks")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "create", "Crea una paleta vacía")
                .add_sub_option(palette_name_option(false)),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Asigna un track a un slot")
                .add_sub_option(palette_name_option(true))
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "slot", "Slot (1-20)")
                        .required(true)
                        .min_int_value(1)
                        .max_int_value(PALETTE_SLOTS as u64),
                )
                .add_sub_option(category_option("category", "Categoría", true))
                .add_sub_option(filename_option("filename", "Nombre del archivo"))
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "shortname", "Etiqueta del botón")
                        .max_length(40),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "remove", "Vacía un slot")
                .add_sub_option(palette_name_option(true))
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Integer, "slot", "Slot (1-20)")
                        .required(true)
                        .min_int_value(1)
                        .max_int_value(PALETTE_SLOTS as u64),
                ),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "show", "Muestra el panel de una paleta")
                .add_sub_option(palette_name_option(true))
                .add_sub_option(ephemeral_option()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "delete", "Elimina una paleta")
                .add_sub_option(palette_name_option(true)),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista tus paletas",
        ))
}

fn group_command() -> CreateCommand {
    CreateCommand::new("group")
        .description("Grupos de paletas")
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "create", "Crea un grupo vacío")
                .add_sub_option(group_name_option(false)),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "add", "Añade una paleta al grupo")
                .add_sub_option(group_name_option(true))
                .add_sub_option(palette_name_option(true)),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "show", "Muestra todas las paletas del grupo")
                .add_sub_option(group_name_option(true))
                .add_sub_option(ephemeral_option()),
        )
        .add_option(
            CreateCommandOption::new(CommandOptionType::SubCommand, "delete", "Elimina un grupo")
                .add_sub_option(group_name_option(true)),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "list",
            "Lista tus grupos",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names_are_unique() {
        let commands = all_commands();
        let names: std::collections::HashSet<String> = commands
            .iter()
            .map(|command| {
                serde_json::to_value(command).unwrap()["name"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        assert_eq!(names.len(), commands.len());
        assert!(names.contains("fade_settings"));
        assert!(names.contains("group"));
    }

    #[test]
    fn test_upload_category_excludes_mixed() {
        let option = serde_json::to_value(category_option("category", "c", false)).unwrap();
        let choices: Vec<&str> = option["choices"]
            .as_array()
            .unwrap()
            .iter()
            .map(|choice| choice["value"].as_str().unwrap())
            .collect();
        assert_eq!(choices, vec!["music", "ambient"]);
    }
}
