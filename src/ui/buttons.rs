use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};
use std::{fmt, str::FromStr};

use crate::storage::{Palette, PALETTE_SLOTS};

/// Prefijos de los custom_id de los paneles
pub mod button_ids {
    pub const SLOT_PREFIX: &str = "palette";
    pub const CONTROL_PREFIX: &str = "palette_ctrl";
    pub const SLOT_MARKER: &str = "slot";
}

/// Discord limita las etiquetas de botón a 80 caracteres
const MAX_LABEL_CHARS: usize = 40;

/// Límite de Discord para un custom_id
const MAX_CUSTOM_ID_LEN: usize = 100;

const SLOTS_PER_ROW: u8 = 5;

/// Fila de controles de un panel de paleta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteControl {
    Stop,
    Pause,
    Loop,
    Resume,
    Close,
}

impl PaletteControl {
    pub const ALL: [PaletteControl; 5] = [Self::Stop, Self::Pause, Self::Loop, Self::Resume, Self::Close];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Loop => "loop",
            Self::Resume => "resume",
            Self::Close => "close",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Stop => "⏹ Stop",
            Self::Pause => "⏸ Pause",
            Self::Loop => "🔁 Loop",
            Self::Resume => "▶️ Resume",
            Self::Close => "❌ Close",
        }
    }

    fn style(&self) -> ButtonStyle {
        match self {
            Self::Stop | Self::Close => ButtonStyle::Danger,
            _ => ButtonStyle::Secondary,
        }
    }
}

impl FromStr for PaletteControl {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|control| control.as_str() == s)
            .ok_or(())
    }
}

/// Pulsación de botón de paleta ya decodificada
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteButton {
    Slot { owner: u64, palette: String, slot: u8 },
    Control { owner: u64, palette: String, action: PaletteControl },
}

impl PaletteButton {
    pub fn owner(&self) -> u64 {
        match self {
            Self::Slot { owner, .. } | Self::Control { owner, .. } => *owner,
        }
    }

    /// `palette:<owner>:<name>:slot:<n>` o `palette_ctrl:<owner>:<name>:<action>`,
    /// con el nombre codificado para que nunca contenga `:`.
    pub fn custom_id(&self) -> String {
        match self {
            Self::Slot { owner, palette, slot } => format!(
                "{}:{}:{}:{}:{}",
                button_ids::SLOT_PREFIX,
                owner,
                urlencoding::encode(palette),
                button_ids::SLOT_MARKER,
                slot
            ),
            Self::Control { owner, palette, action } => format!(
                "{}:{}:{}:{}",
                button_ids::CONTROL_PREFIX,
                owner,
                urlencoding::encode(palette),
                action.as_str()
            ),
        }
    }

    /// `None` si no es un botón de paleta.
    pub fn parse(custom_id: &str) -> Option<Self> {
        let parts: Vec<&str> = custom_id.split(':').collect();
        match parts.as_slice() {
            [prefix, owner, name, marker, slot]
                if *prefix == button_ids::SLOT_PREFIX && *marker == button_ids::SLOT_MARKER =>
            {
                let slot: u8 = slot.parse().ok()?;
                if !(1..=PALETTE_SLOTS).contains(&slot) {
                    return None;
                }
                Some(Self::Slot {
                    owner: owner.parse().ok()?,
                    palette: urlencoding::decode(name).ok()?.into_owned(),
                    slot,
                })
            }
            [prefix, owner, name, action] if *prefix == button_ids::CONTROL_PREFIX => Some(Self::Control {
                owner: owner.parse().ok()?,
                palette: urlencoding::decode(name).ok()?.into_owned(),
                action: action.parse().ok()?,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for PaletteButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.custom_id())
    }
}

/// Constructor de paneles de paleta
pub struct PaletteControls;

impl PaletteControls {
    /// 4 filas de 5 slots + una fila de controles.
    pub fn create_panel(owner: u64, name: &str, palette: &Palette) -> Vec<CreateActionRow> {
        let mut rows = Vec::with_capacity(5);

        for row in 0..(PALETTE_SLOTS / SLOTS_PER_ROW) {
            let buttons = (1..=SLOTS_PER_ROW)
                .map(|col| row * SLOTS_PER_ROW + col)
                .map(|slot| Self::slot_button(owner, name, palette, slot))
                .collect();
            rows.push(CreateActionRow::Buttons(buttons));
        }

        rows.push(Self::create_control_row(owner, name));
        rows
    }

    /// Indica si todos los custom_id del panel de `name` caben en el límite de Discord.
    pub fn fits(owner: u64, name: &str) -> bool {
        let longest_slot = PaletteButton::Slot {
            owner,
            palette: name.to_string(),
            slot: PALETTE_SLOTS,
        };
        let longest_control = PaletteButton::Control {
            owner,
            palette: name.to_string(),
            action: PaletteControl::Resume,
        };
        [longest_slot, longest_control]
            .iter()
            .all(|button| button.custom_id().len() <= MAX_CUSTOM_ID_LEN)
    }

    pub fn create_control_row(owner: u64, name: &str) -> CreateActionRow {
        let buttons = PaletteControl::ALL
            .into_iter()
            .map(|action| {
                let id = PaletteButton::Control {
                    owner,
                    palette: name.to_string(),
                    action,
                };
                CreateButton::new(id.custom_id())
                    .label(action.label())
                    .style(action.style())
            })
            .collect();
        CreateActionRow::Buttons(buttons)
    }

    fn slot_button(owner: u64, name: &str, palette: &Palette, slot: u8) -> CreateButton {
        let id = PaletteButton::Slot {
            owner,
            palette: name.to_string(),
            slot,
        };
        let button = CreateButton::new(id.custom_id());

        match palette.slot(slot) {
            Some(entry) => button
                .label(slot_label(slot, &entry.shortname))
                .style(ButtonStyle::Primary),
            None => button.label(slot.to_string()).style(ButtonStyle::Secondary),
        }
    }
}

fn slot_label(slot: u8, shortname: &str) -> String {
    let label = format!("{}. {}", slot, shortname.trim());
    if label.chars().count() > MAX_LABEL_CHARS {
        let mut cut: String = label.chars().take(MAX_LABEL_CHARS - 1).collect();
        cut.push('…');
        cut
    } else {
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_slot_custom_id() {
        let button = PaletteButton::Slot {
            owner: 42,
            palette: "noche: bosque".into(),
            slot: 7,
        };
        let id = button.custom_id();
        assert_eq!(id, "palette:42:noche%3A%20bosque:slot:7");
        assert_eq!(PaletteButton::parse(&id), Some(button));
    }

    #[test]
    fn test_control_custom_id() {
        let id = "palette_ctrl:42:taberna:loop";
        let parsed = PaletteButton::parse(id).unwrap();
        assert_eq!(
            parsed,
            PaletteButton::Control {
                owner: 42,
                palette: "taberna".into(),
                action: PaletteControl::Loop,
            }
        );
        assert_eq!(parsed.owner(), 42);
        assert_eq!(parsed.custom_id(), id);
    }

    #[test]
    fn test_parse_rejects_foreign_ids() {
        assert_eq!(PaletteButton::parse("music_play_pause"), None);
        assert_eq!(PaletteButton::parse("palette:42:x:slot:21"), None);
        assert_eq!(PaletteButton::parse("palette:42:x:slot:0"), None);
        assert_eq!(PaletteButton::parse("palette:abc:x:slot:1"), None);
        assert_eq!(PaletteButton::parse("palette_ctrl:42:x:skip"), None);
    }

    #[test]
    fn test_panel_layout() {
        let rows = PaletteControls::create_panel(1, "p", &Palette::empty());
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn test_long_names_do_not_fit() {
        let owner = 123_456_789_012_345_678;
        assert!(PaletteControls::fits(owner, "taberna"));
        assert!(!PaletteControls::fits(owner, &"ñ".repeat(30)));
    }

    #[test]
    fn test_slot_label_truncates() {
        assert_eq!(slot_label(3, "lluvia"), "3. lluvia");
        let long = slot_label(12, &"x".repeat(100));
        assert_eq!(long.chars().count(), MAX_LABEL_CHARS);
        assert!(long.ends_with('…'));
    }
}
