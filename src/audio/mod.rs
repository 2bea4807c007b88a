//! # Audio Module
//!
//! Per-guild playback for local audio files, driven through an external
//! ffmpeg process and streamed into a songbird voice connection.
//!
//! ## Architecture
//!
//! ### [`player`] - Guild Player
//! - One state machine per guild: idle, starting, playing, paused
//! - Owns at most one [`task::PlaybackTask`] at a time; replacing it always
//!   cancels and awaits the previous one first
//! - Per-category volume, loop and fade settings
//!
//! ### [`task`] - Playback Task
//! - Runs one pipeline, waits for it to end, repeats it when looping
//! - Cancelled through a `CancellationToken`
//!
//! ### [`pipeline`] - ffmpeg Invocation
//! - Seek, volume and fade envelopes as a single `-filter:a` chain
//! - 48kHz stereo WAV on stdout
//!
//! ### [`duration`] - Duration Resolver
//! - `ffprobe` with a timeout, memoized in an LRU cache
//!
//! ### [`mixer`] - Offline Mixer
//! - Two tracks into one mp3; the shorter input loops under the longer one
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Bit Depth**: 16-bit signed integers
//! - **Channels**: Stereo (2 channels)

pub mod category;
pub mod duration;
pub mod mixer;
pub mod pipeline;
pub mod player;
pub mod registry;
pub mod task;
pub mod voice;

#[cfg(test)]
pub(crate) mod testing;
