//! Discord presentation: embeds and palette button panels.

pub mod buttons;
pub mod embeds;
