use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{category::TrackCategory, player::GuildPlayer, task::display_name},
    bot::{palettes, tracks, OpenPaletteBot},
    error::{LibraryError, MixError, PlayerError, StorageError},
    library::parse_timestamp,
    ui::embeds::{self, NowPlaying},
};

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let result = match command.data.name.as_str() {
        "play" => handle_play(ctx, command, bot, guild_id).await,
        "now_playing" => handle_now_playing(ctx, command, bot, guild_id).await,
        "pause" => handle_pause(ctx, command, bot, guild_id).await,
        "resume" => handle_resume(ctx, command, bot, guild_id).await,
        "stop" => handle_stop(ctx, command, bot, guild_id).await,
        "leave" => handle_leave(ctx, command, bot, guild_id).await,
        "volume" => handle_volume(ctx, command, bot, guild_id).await,
        "seek" => handle_seek(ctx, command, bot, guild_id).await,
        "loop" => handle_loop(ctx, command, bot, guild_id).await,
        "fade_out" => handle_fade_out(ctx, command, bot, guild_id).await,
        "fade_in" => handle_fade_in(ctx, command, bot, guild_id).await,
        "fade_settings" => handle_fade_settings(ctx, command, bot, guild_id).await,
        "mix" => tracks::handle_mix(ctx, command, bot).await,
        "upload" => tracks::handle_upload(ctx, command, bot).await,
        "upload_url" => tracks::handle_upload_url(ctx, command, bot).await,
        "delete_track" => tracks::handle_delete_track(ctx, command, bot).await,
        "delete_all_tracks" => tracks::handle_delete_all_tracks(ctx, command, bot).await,
        "move_track" => tracks::handle_move_track(ctx, command, bot).await,
        "track_duration" => tracks::handle_track_duration(ctx, command, bot).await,
        "palette" => palettes::handle_palette(ctx, command, bot).await,
        "group" => palettes::handle_group(ctx, command, bot).await,
        _ => {
            reply(
                ctx,
                command,
                CreateInteractionResponseMessage::new()
                    .content("❌ Comando no reconocido")
                    .ephemeral(true),
            )
            .await
        }
    };

    if let Err(e) = result {
        warn!("[{}] /{} falló: {:#}", guild_id, command.data.name, e);
        reply_error(ctx, command, &e).await;
    }

    Ok(())
}

// Handlers de reproducción

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let options = &command.data.options;
    let category = get_category(options, "category")?;
    let filename = required_str(options, "filename")?;
    let fade_in = get_f64(options, "fade_in");
    let fade_out = get_f64(options, "fade_out");

    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id).await?;
    let path = bot.library.track_path(category, command.user.id, filename).await?;

    // conectar puede tardar más de los 3s que da Discord
    defer(ctx, command, false).await?;

    let player = bot.ensure_voice(ctx, guild_id, channel_id).await?;
    player.play(path, category, fade_in, fade_out).await?;

    let embed = embeds::create_success_embed(
        "Reproduciendo",
        &format!("🎵 `{}` de la categoría `{}`", filename, category),
    );
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_now_playing(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let playing = bot
        .players
        .get(guild_id)
        .and_then(|player| player.now_playing().map(|now| (player, now)));

    let Some((player, (track, phase))) = playing else {
        return reply_embed(
            ctx,
            command,
            embeds::create_info_embed("Nada en reproducción", "Usa `/play` o una paleta."),
            true,
        )
        .await;
    };

    let duration = player.duration(&track.path).await;
    let now = NowPlaying {
        track: &track,
        phase,
        position: player.current_position(),
        duration,
        volume: player.volume(track.category),
        looping: player.loop_enabled(track.category),
    };

    reply_embed(ctx, command, embeds::create_now_playing_embed(&now), false).await
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = bot.players.get(guild_id).ok_or(PlayerError::NothingToPause)?;
    player.pause().await?;
    reply_content(ctx, command, "⏸️ Pausado").await
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = bot.players.get(guild_id).ok_or(PlayerError::NothingToResume)?;
    player.resume().await?;
    reply_content(ctx, command, "▶️ Reanudado").await
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let player = bot.players.get(guild_id).ok_or(PlayerError::NothingToStop)?;
    player.stop().await?;
    reply_content(ctx, command, "⏹️ Detenido").await
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    if !bot.leave(guild_id).await {
        anyhow::bail!(PlayerError::NotConnected);
    }
    reply_content(ctx, command, "👋 Desconectado del canal de voz").await
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let options = &command.data.options;
    let category = get_category(options, "category")?;
    let player = bot.players.get_or_create(guild_id);

    let Some(level) = get_f64(options, "level") else {
        let embed = embeds::create_volume_embed(category, player.volume(category));
        return reply_embed(ctx, command, embed, true).await;
    };

    // si la categoría suena, el track se reinicia con el nuevo volumen
    defer(ctx, command, false).await?;
    let applied = player.set_volume(category, level as f32).await?;
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().embed(embeds::create_volume_embed(category, applied)),
        )
        .await?;
    Ok(())
}

async fn handle_seek(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let raw = required_str(&command.data.options, "position")?;
    let position =
        parse_position(raw).ok_or_else(|| anyhow::anyhow!("Posición inválida: `{}`", raw))?;
    let player = bot.players.get(guild_id).ok_or(PlayerError::NoCurrentTrack)?;

    defer(ctx, command, false).await?;
    let applied = player.seek(position).await?;

    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content(format!(
                "⏩ Posición: {}",
                embeds::format_seconds(applied)
            )),
        )
        .await?;
    Ok(())
}

async fn handle_loop(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let options = &command.data.options;
    let enabled = get_bool(options, "enabled")
        .ok_or_else(|| anyhow::anyhow!("Falta la opción `enabled`"))?;
    let player = bot.players.get_or_create(guild_id);

    let category = match get_str(options, "category") {
        Some(raw) => raw.parse::<TrackCategory>()?,
        None => current_category(&player)?,
    };

    player.set_loop(category, enabled).await;
    let status = if enabled { "activado" } else { "desactivado" };
    reply_content(ctx, command, &format!("🔁 Loop de `{}` {}", category, status)).await
}

async fn handle_fade_out(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let seconds = get_f64(&command.data.options, "duration")
        .ok_or_else(|| anyhow::anyhow!("Falta la opción `duration`"))?;
    let player = bot.players.get(guild_id).ok_or(PlayerError::NotConnected)?;

    defer(ctx, command, false).await?;
    let message = match player.fade_out(seconds).await {
        Some(applied) => format!("🌅 Fade-out de {:.1}s", applied),
        None => "Nada que atenuar.".to_string(),
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(message))
        .await?;
    Ok(())
}

async fn handle_fade_in(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let seconds = get_f64(&command.data.options, "duration")
        .ok_or_else(|| anyhow::anyhow!("Falta la opción `duration`"))?;
    let player = bot.players.get(guild_id).ok_or(PlayerError::NoCurrentTrack)?;

    player.restart_with_fade_in(seconds).await?;
    reply_content(ctx, command, &format!("🌄 Reinicio con fade-in de {:.1}s", seconds)).await
}

async fn handle_fade_settings(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
) -> Result<()> {
    let (name, options) = subcommand(&command.data.options)
        .ok_or_else(|| anyhow::anyhow!("Subcomando no proporcionado"))?;
    let category = get_category(options, "category")?;
    let player = bot.players.get_or_create(guild_id);

    let fades = match name {
        "show" => player.fade_settings(category),
        "enable" => player.set_fade_enabled(
            category,
            get_bool(options, "fade_in"),
            get_bool(options, "fade_out"),
        ),
        "duration" => player.set_fade_duration(
            category,
            get_f64(options, "fade_in"),
            get_f64(options, "fade_out"),
        ),
        other => anyhow::bail!("Subcomando desconocido: {}", other),
    };

    reply_embed(
        ctx,
        command,
        embeds::create_fade_settings_embed(category, &fades),
        name == "show",
    )
    .await
}

// Funciones auxiliares

fn current_category(player: &GuildPlayer) -> Result<TrackCategory, PlayerError> {
    player
        .current_track()
        .map(|track| track.category)
        .ok_or(PlayerError::NoCurrentTrack)
}

/// Segundos (`90`, `12.5`) o una marca `hh:mm:ss` / `mm:ss`
pub(crate) fn parse_position(text: &str) -> Option<f64> {
    let text = text.trim();
    match text.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds),
        Ok(_) => None,
        Err(_) => parse_timestamp(text).map(|seconds| seconds as f64),
    }
}

pub(crate) async fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Nombre y opciones del subcomando invocado
pub(crate) fn subcommand(options: &[CommandDataOption]) -> Option<(&str, &[CommandDataOption])> {
    options.iter().find_map(|option| match &option.value {
        CommandDataOptionValue::SubCommand(inner) => Some((option.name.as_str(), inner.as_slice())),
        _ => None,
    })
}

pub(crate) fn get_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

pub(crate) fn required_str<'a>(options: &'a [CommandDataOption], name: &str) -> Result<&'a str> {
    get_str(options, name).ok_or_else(|| anyhow::anyhow!("Falta la opción `{}`", name))
}

pub(crate) fn get_f64(options: &[CommandDataOption], name: &str) -> Option<f64> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_f64())
}

pub(crate) fn get_i64(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

pub(crate) fn get_bool(options: &[CommandDataOption], name: &str) -> Option<bool> {
    options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

pub(crate) fn get_category(options: &[CommandDataOption], name: &str) -> Result<TrackCategory> {
    Ok(required_str(options, name)?.parse::<TrackCategory>()?)
}

pub(crate) async fn defer(ctx: &Context, command: &CommandInteraction, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new().ephemeral(ephemeral)),
        )
        .await?;
    Ok(())
}

pub(crate) async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    message: CreateInteractionResponseMessage,
) -> Result<()> {
    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;
    Ok(())
}

pub(crate) async fn reply_content(ctx: &Context, command: &CommandInteraction, content: &str) -> Result<()> {
    reply(ctx, command, CreateInteractionResponseMessage::new().content(content)).await
}

pub(crate) async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    reply(
        ctx,
        command,
        CreateInteractionResponseMessage::new().embed(embed).ephemeral(ephemeral),
    )
    .await
}

/// Responde con un embed de error efímero, editando la respuesta diferida si
/// la interacción ya se había reconocido.
async fn reply_error(ctx: &Context, command: &CommandInteraction, error: &anyhow::Error) {
    let embed = embeds::create_error_embed("Error", &describe_error(error));

    let created = command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed.clone())
                    .ephemeral(true),
            ),
        )
        .await;

    if created.is_err() {
        if let Err(e) = command
            .edit_response(&ctx.http, EditInteractionResponse::new().content("").embed(embed))
            .await
        {
            warn!("No se pudo informar el error al usuario: {:?}", e);
        }
    }
}

/// Texto para el usuario de un fallo de handler
pub(crate) fn describe_error(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<PlayerError>() {
        return match e {
            PlayerError::NotConnected => "El bot no está en un canal de voz.".into(),
            PlayerError::NoCurrentTrack => "No hay ningún track cargado.".into(),
            PlayerError::NothingToPause => "Nada que pausar.".into(),
            PlayerError::NothingToResume => "Nada que reanudar.".into(),
            PlayerError::NothingToStop => "Nada que detener.".into(),
            PlayerError::TrackNotFound(path) => {
                format!("Track no encontrado: `{}`", display_name(path))
            }
            PlayerError::InvalidCategory(name) => format!("Categoría desconocida: `{}`", name),
            other => format!("Error de reproducción: {}", other),
        };
    }

    if let Some(e) = error.downcast_ref::<LibraryError>() {
        return match e {
            LibraryError::NotFound(name) => format!("Track no encontrado: `{}`", name),
            LibraryError::AlreadyExists(name) => {
                format!("Ya existe `{}` en la categoría de destino.", name)
            }
            LibraryError::SameCategory => "El origen y el destino son la misma categoría.".into(),
            LibraryError::UploadsNotAllowed(category) => {
                format!("La categoría `{}` solo admite mezclas.", category)
            }
            LibraryError::TooLarge { size, limit } => format!(
                "El archivo pesa {:.1} MB; el límite es {:.1} MB.",
                *size as f64 / 1_048_576.0,
                *limit as f64 / 1_048_576.0
            ),
            LibraryError::InvalidName(name) => format!("Nombre de archivo inválido: `{}`", name),
            LibraryError::InvalidUrl(reason) => format!("URL inválida: {}", reason),
            LibraryError::DownloadFailed(_) => "La descarga falló.".into(),
            LibraryError::Io(e) => format!("Error de archivos: {}", e),
        };
    }

    if let Some(e) = error.downcast_ref::<StorageError>() {
        return match e {
            StorageError::PaletteExists(name) => format!("La paleta `{}` ya existe.", name),
            StorageError::PaletteNotFound(name) => format!("La paleta `{}` no existe.", name),
            StorageError::GroupExists(name) => format!("El grupo `{}` ya existe.", name),
            StorageError::GroupNotFound(name) => format!("El grupo `{}` no existe.", name),
            StorageError::InvalidSlot(slot) => format!("El slot {} no existe (1-20).", slot),
            other => format!("Error guardando paletas: {}", other),
        };
    }

    if let Some(MixError::MixFailed { status, .. }) = error.downcast_ref::<MixError>() {
        return format!("La mezcla falló ({}).", status);
    }

    error.to_string()
}
