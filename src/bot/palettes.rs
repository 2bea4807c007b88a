//! `/palette` and `/group` commands plus the palette panel buttons.

use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandDataOption, CommandInteraction, ComponentInteraction},
        id::GuildId,
    },
    prelude::Context,
};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::{
    bot::{
        handlers::{
            describe_error, get_bool, get_category, get_i64, get_str, get_user_voice_channel,
            reply, reply_embed, required_str, subcommand,
        },
        OpenPaletteBot,
    },
    error::{PlayerError, StorageError},
    storage::{Palette, SlotEntry},
    ui::{
        buttons::{PaletteButton, PaletteControl, PaletteControls},
        embeds,
    },
};

pub async fn handle_palette(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let (name, options) = subcommand(&command.data.options)
        .ok_or_else(|| anyhow::anyhow!("Subcomando no proporcionado"))?;
    let user = command.user.id.get();

    match name {
        "create" => {
            let palette = required_str(options, "palette")?.trim();
            if palette.is_empty() || !PaletteControls::fits(user, palette) {
                anyhow::bail!("Nombre de paleta inválido o demasiado largo");
            }
            bot.palettes.lock().await.create_palette(user, palette).await?;
            let embed = embeds::create_success_embed(
                "Paleta creada",
                &format!("🎨 `{}` lista. Añade tracks con `/palette add`.", palette),
            );
            reply_embed(ctx, command, embed, true).await
        }
        "add" => {
            let palette = required_str(options, "palette")?;
            let slot = slot_option(options)?;
            let category = get_category(options, "category")?;
            let filename = required_str(options, "filename")?;

            // el track debe existir en la colección del dueño
            bot.library.track_path(category, command.user.id, filename).await?;

            let shortname = get_str(options, "shortname")
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| default_shortname(filename));

            let entry = SlotEntry {
                shortname: shortname.clone(),
                category,
                filename: filename.to_string(),
            };
            bot.palettes.lock().await.set_slot(user, palette, slot, entry).await?;

            let embed = embeds::create_success_embed(
                "Slot asignado",
                &format!("🎚️ Slot {} de `{}` → **{}**", slot, palette, shortname),
            );
            reply_embed(ctx, command, embed, true).await
        }
        "remove" => {
            let palette = required_str(options, "palette")?;
            let slot = slot_option(options)?;
            bot.palettes.lock().await.clear_slot(user, palette, slot).await?;
            let embed = embeds::create_success_embed(
                "Slot vaciado",
                &format!("Slot {} de `{}` vacío", slot, palette),
            );
            reply_embed(ctx, command, embed, true).await
        }
        "show" => {
            let palette_name = required_str(options, "palette")?;
            let ephemeral = get_bool(options, "ephemeral").unwrap_or(true);
            let palette = load_palette(bot, user, palette_name).await?;
            reply(ctx, command, panel_message(user, palette_name, &palette).ephemeral(ephemeral)).await
        }
        "delete" => {
            let palette = required_str(options, "palette")?;
            bot.palettes.lock().await.delete_palette(user, palette).await?;
            let embed = embeds::create_success_embed("Paleta eliminada", &format!("🗑️ `{}`", palette));
            reply_embed(ctx, command, embed, true).await
        }
        "list" => {
            let names = bot.palettes.lock().await.list_palettes(user);
            reply_embed(ctx, command, list_embed("🎨 Tus paletas", &names, "/palette create"), true).await
        }
        other => anyhow::bail!("Subcomando desconocido: {}", other),
    }
}

pub async fn handle_group(ctx: &Context, command: &CommandInteraction, bot: &OpenPaletteBot) -> Result<()> {
    let (name, options) = subcommand(&command.data.options)
        .ok_or_else(|| anyhow::anyhow!("Subcomando no proporcionado"))?;
    let user = command.user.id.get();

    match name {
        "create" => {
            let group = required_str(options, "group")?.trim();
            if group.is_empty() {
                anyhow::bail!("Nombre de grupo inválido");
            }
            bot.palettes.lock().await.create_group(user, group).await?;
            let embed = embeds::create_success_embed(
                "Grupo creado",
                &format!("📚 `{}` listo. Añade paletas con `/group add`.", group),
            );
            reply_embed(ctx, command, embed, true).await
        }
        "add" => {
            let group = required_str(options, "group")?;
            let palette = required_str(options, "palette")?;
            let added = bot.palettes.lock().await.add_to_group(user, group, palette).await?;
            let embed = if added {
                embeds::create_success_embed(
                    "Paleta añadida",
                    &format!("🎨 `{}` forma parte de `{}`", palette, group),
                )
            } else {
                embeds::create_info_embed(
                    "Sin cambios",
                    &format!("`{}` ya estaba en `{}`", palette, group),
                )
            };
            reply_embed(ctx, command, embed, true).await
        }
        "show" => {
            let group = required_str(options, "group")?;
            let ephemeral = get_bool(options, "ephemeral").unwrap_or(true);
            show_group(ctx, command, bot, user, group, ephemeral).await
        }
        "delete" => {
            let group = required_str(options, "group")?;
            bot.palettes.lock().await.delete_group(user, group).await?;
            let embed = embeds::create_success_embed("Grupo eliminado", &format!("🗑️ `{}`", group));
            reply_embed(ctx, command, embed, true).await
        }
        "list" => {
            let names = bot.palettes.lock().await.list_groups(user);
            reply_embed(ctx, command, list_embed("📚 Tus grupos", &names, "/group create"), true).await
        }
        other => anyhow::bail!("Subcomando desconocido: {}", other),
    }
}

/// Un panel por paleta del grupo: el primero como respuesta y el resto como
/// follow-ups (un mensaje admite cinco filas como máximo).
async fn show_group(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &OpenPaletteBot,
    user: u64,
    group: &str,
    ephemeral: bool,
) -> Result<()> {
    let palettes: Vec<(String, Palette)> = {
        let store = bot.palettes.lock().await;
        store
            .get_group(user, group)?
            .iter()
            .filter_map(|name| {
                store
                    .get_palette(user, name)
                    .ok()
                    .map(|palette| (name.clone(), palette.clone()))
            })
            .collect()
    };

    let Some(((first_name, first), rest)) = palettes.split_first() else {
        let embed = embeds::create_info_embed(
            "Grupo vacío",
            &format!("`{}` no tiene paletas. Usa `/group add`.", group),
        );
        return reply_embed(ctx, command, embed, true).await;
    };

    reply(ctx, command, panel_message(user, first_name, first).ephemeral(ephemeral)).await?;

    for (name, palette) in rest {
        command
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .embed(embeds::create_palette_embed(name, palette, None))
                    .components(PaletteControls::create_panel(user, name, palette))
                    .ephemeral(ephemeral),
            )
            .await?;
    }

    debug!("[{}] Grupo '{}' mostrado ({} paletas)", user, group, palettes.len());
    Ok(())
}

/// Maneja los botones de los paneles de paleta
pub async fn handle_component(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &OpenPaletteBot,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let Some(button) = PaletteButton::parse(&component.data.custom_id) else {
        return respond_ephemeral(ctx, component, "❌ Acción no reconocida").await;
    };

    if component.user.id.get() != button.owner() {
        return respond_ephemeral(ctx, component, "🔒 Solo el dueño de la paleta puede usarla").await;
    }

    // la conexión de voz puede tardar; se responde con un ack diferido
    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    let result = match &button {
        PaletteButton::Control {
            action: PaletteControl::Close,
            ..
        } => return close_panel(ctx, component).await,
        PaletteButton::Slot { palette, slot, .. } => {
            press_slot(ctx, component, bot, guild_id, palette, *slot).await
        }
        PaletteButton::Control { action, .. } => press_control(bot, guild_id, *action).await,
    };

    let followup = match result {
        Ok(message) => CreateInteractionResponseFollowup::new().content(message),
        Err(e) => {
            warn!("[{}] Botón {} falló: {:#}", guild_id, button, e);
            CreateInteractionResponseFollowup::new()
                .embed(embeds::create_error_embed("Error", &describe_error(&e)))
        }
    };

    component
        .create_followup(&ctx.http, followup.ephemeral(true))
        .await?;
    Ok(())
}

async fn press_slot(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &OpenPaletteBot,
    guild_id: GuildId,
    palette: &str,
    slot: u8,
) -> Result<String> {
    let owner = component.user.id;
    let entry = {
        let store = bot.palettes.lock().await;
        store.get_palette(owner.get(), palette)?.slot(slot).cloned()
    };
    let entry = entry.ok_or_else(|| anyhow::anyhow!("El slot {} está vacío", slot))?;

    let channel_id = get_user_voice_channel(ctx, guild_id, owner).await?;
    let path = bot
        .library
        .track_path(entry.category, owner, &entry.filename)
        .await?;

    let player = bot.ensure_voice(ctx, guild_id, channel_id).await?;
    player.play(path, entry.category, None, None).await?;

    Ok(format!("🎵 {} (`{}`)", entry.shortname, entry.category))
}

async fn press_control(bot: &OpenPaletteBot, guild_id: GuildId, action: PaletteControl) -> Result<String> {
    let player = bot.players.get(guild_id).ok_or(PlayerError::NotConnected)?;

    let message = match action {
        PaletteControl::Stop => {
            player.stop().await?;
            "⏹️ Detenido".to_string()
        }
        PaletteControl::Pause => {
            player.pause().await?;
            "⏸️ Pausado".to_string()
        }
        PaletteControl::Resume => {
            player.resume().await?;
            "▶️ Reanudado".to_string()
        }
        PaletteControl::Loop => {
            let category = player
                .current_track()
                .map(|track| track.category)
                .ok_or(PlayerError::NoCurrentTrack)?;
            let enabled = !player.loop_enabled(category);
            player.set_loop(category, enabled).await;
            let status = if enabled { "activado" } else { "desactivado" };
            format!("🔁 Loop de `{}` {}", category, status)
        }
        PaletteControl::Close => "❌ Panel cerrado".to_string(),
    };

    Ok(message)
}

/// Borra el mensaje del panel; los paneles efímeros no se pueden borrar, así
/// que se les quitan los botones.
async fn close_panel(ctx: &Context, component: &ComponentInteraction) -> Result<()> {
    if let Err(e) = component.message.delete(&ctx.http).await {
        debug!("No se pudo borrar el panel ({:?}), desactivando botones", e);
        component
            .edit_response(&ctx.http, EditInteractionResponse::new().components(Vec::new()))
            .await?;
    }
    Ok(())
}

async fn respond_ephemeral(ctx: &Context, component: &ComponentInteraction, content: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

// Funciones auxiliares

async fn load_palette(bot: &OpenPaletteBot, user: u64, name: &str) -> Result<Palette> {
    Ok(bot.palettes.lock().await.get_palette(user, name)?.clone())
}

fn panel_message(owner: u64, name: &str, palette: &Palette) -> CreateInteractionResponseMessage {
    CreateInteractionResponseMessage::new()
        .embed(embeds::create_palette_embed(name, palette, None))
        .components(PaletteControls::create_panel(owner, name, palette))
}

fn slot_option(options: &[CommandDataOption]) -> Result<u8> {
    let raw = get_i64(options, "slot").ok_or_else(|| anyhow::anyhow!("Falta la opción `slot`"))?;
    Ok(u8::try_from(raw).map_err(|_| StorageError::InvalidSlot(0))?)
}

/// Nombre de archivo sin extensión
fn default_shortname(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.to_string())
}

fn list_embed(title: &str, names: &[String], hint: &str) -> CreateEmbed {
    if names.is_empty() {
        return embeds::create_info_embed(title, &format!("Nada todavía. Usa `{}`.", hint));
    }
    let body = names
        .iter()
        .map(|name| format!("• {}", name))
        .collect::<Vec<_>>()
        .join("\n");
    embeds::create_info_embed(title, &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_shortname() {
        assert_eq!(default_shortname("lluvia fuerte.mp3"), "lluvia fuerte");
        assert_eq!(default_shortname("taberna"), "taberna");
    }
}
