//! Track management commands: uploads, URL downloads, mixes and file moves.

use anyhow::Result;
use serenity::{
    builder::EditInteractionResponse,
    model::application::{CommandDataOptionValue, CommandInteraction},
    prelude::Context,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    audio::{category::TrackCategory, mixer::MixInput},
    bot::{
        handlers::{defer, get_category, get_f64, get_str, reply_embed, required_str},
        OpenPaletteBot,
    },
    error::LibraryError,
    library::{
        download::{DownloadRequest, UrlDownloader},
        format_hms, parse_timestamp, TrackLibrary,
    },
    ui::embeds,
};

/// Tiempo mínimo entre ediciones de progreso de `/upload_url`
const PROGRESS_INTERVAL: Duration = Duration::from_secs(3);

pub async fn handle_mix(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let options = &command.data.options;
    let user = command.user.id;
    let music_file = required_str(options, "music_file")?;
    let ambient_file = required_str(options, "ambient_file")?;
    let mix_name = required_str(options, "mix_name")?;
    let music_volume = get_f64(options, "music_volume").unwrap_or(1.0) as f32;
    let ambient_volume = get_f64(options, "ambient_volume")
        .map(|v| v as f32)
        .unwrap_or(bot.config.default_ambient_mix_volume);

    let music = bot.library.track_path(TrackCategory::Music, user, music_file).await?;
    let ambient = bot.library.track_path(TrackCategory::Ambient, user, ambient_file).await?;
    let output = bot.library.mix_output(user, mix_name).await?;

    defer(ctx, command, true).await?;
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content("🎛️ Mezclando, puede tardar unos segundos..."),
        )
        .await?;

    let output = bot
        .mixer
        .mix(
            MixInput::new(music, music_volume),
            MixInput::new(ambient, ambient_volume),
            &output,
        )
        .await?;

    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let embed = embeds::create_success_embed(
        "Mezcla lista",
        &format!("🎚️ `{}` guardado en `mixed`", name),
    );
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content("").embed(embed))
        .await?;
    Ok(())
}

pub async fn handle_upload(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let options = &command.data.options;
    let category = get_category(options, "category")?;
    if !category.accepts_uploads() {
        anyhow::bail!(LibraryError::UploadsNotAllowed(category.to_string()));
    }

    let attachment = options
        .iter()
        .find(|opt| opt.name == "file")
        .and_then(|opt| match &opt.value {
            CommandDataOptionValue::Attachment(id) => command.data.resolved.attachments.get(id),
            _ => None,
        })
        .ok_or_else(|| anyhow::anyhow!("Falta el archivo adjunto"))?;

    bot.library.check_size(u64::from(attachment.size))?;
    let filename = TrackLibrary::upload_name(&attachment.filename, get_str(options, "new_name"))?;

    defer(ctx, command, true).await?;
    let bytes = attachment.download().await?;
    bot.library
        .save_upload(category, command.user.id, &filename, &bytes)
        .await?;

    let embed = embeds::create_success_embed(
        "Track subido",
        &format!("📥 `{}` añadido a `{}`", filename, category),
    );
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

pub async fn handle_upload_url(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let options = &command.data.options;
    let url = required_str(options, "url")?;
    let name = required_str(options, "name")?;
    let category = get_category(options, "category")?;
    if !category.accepts_uploads() {
        anyhow::bail!(LibraryError::UploadsNotAllowed(category.to_string()));
    }

    let start = match get_str(options, "start") {
        Some(raw) => parse_timestamp(raw).ok_or_else(|| anyhow::anyhow!("Inicio inválido: `{}`", raw))?,
        None => 0,
    };
    let end = get_str(options, "end")
        .map(|raw| parse_timestamp(raw).ok_or_else(|| anyhow::anyhow!("Fin inválido: `{}`", raw)))
        .transpose()?;

    let request = DownloadRequest {
        url: url.to_string(),
        start,
        end,
        size_limit: bot.library.upload_limit(),
    };
    UrlDownloader::validate_url(&request.url)?;

    let filename = TrackLibrary::upload_name(name, Some(name))?;
    let target = bot.library.folder(category, command.user.id).await?.join(&filename);

    defer(ctx, command, true).await?;
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content("📥 Descargando..."))
        .await?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let download = bot.downloader.download(&request, &target, Some(tx));
    tokio::pin!(download);

    let mut last_edit = Instant::now();
    let result = loop {
        tokio::select! {
            result = &mut download => break result,
            Some(seconds) = rx.recv() => {
                if last_edit.elapsed() >= PROGRESS_INTERVAL {
                    last_edit = Instant::now();
                    let content = format!("📥 Descargando... {}", format_hms(seconds as f64));
                    // un fallo al editar no debe cortar la descarga
                    let _ = command
                        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
                        .await;
                }
            }
        }
    };

    let path = result?;
    bot.library.durations().invalidate(&path);
    info!("[{}] Track descargado: {}", command.user.id, path.display());

    let embed = embeds::create_success_embed(
        "Descarga completa",
        &format!("📥 `{}` añadido a `{}`", filename, category),
    );
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content("").embed(embed))
        .await?;
    Ok(())
}

pub async fn handle_delete_track(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let options = &command.data.options;
    let category = get_category(options, "category")?;
    let filename = required_str(options, "filename")?;

    bot.library.delete(category, command.user.id, filename).await?;

    let embed = embeds::create_success_embed(
        "Track eliminado",
        &format!("🗑️ `{}` eliminado de `{}`", filename, category),
    );
    reply_embed(ctx, command, embed, true).await
}

pub async fn handle_delete_all_tracks(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
) -> Result<()> {
    let category = get_category(&command.data.options, "category")?;
    let deleted = bot.library.delete_all(category, command.user.id).await?;

    let embed = embeds::create_success_embed(
        "Tracks eliminados",
        &format!("🗑️ {} tracks eliminados de `{}`", deleted, category),
    );
    reply_embed(ctx, command, embed, true).await
}

pub async fn handle_move_track(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let options = &command.data.options;
    let source = get_category(options, "source")?;
    let target = get_category(options, "target")?;
    let filename = required_str(options, "filename")?;

    bot.library
        .move_track(command.user.id, filename, source, target)
        .await?;

    let embed = embeds::create_success_embed(
        "Track movido",
        &format!("📂 `{}`: `{}` → `{}`", filename, source, target),
    );
    reply_embed(ctx, command, embed, true).await
}

pub async fn handle_track_duration(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
) -> Result<()> {
    let options = &command.data.options;
    let category = get_category(options, "category")?;
    let filename = required_str(options, "filename")?;

    let path = bot.library.track_path(category, command.user.id, filename).await?;
    let duration = bot.library.durations().duration(&path).await;

    let embed = if duration > 0.0 {
        embeds::create_info_embed(
            "Duración",
            &format!("⏱️ `{}`: {}", filename, format_hms(duration)),
        )
    } else {
        embeds::create_error_embed(
            "Duración desconocida",
            &format!("No se pudo leer la duración de `{}`", filename),
        )
    };
    reply_embed(ctx, command, embed, true).await
}
