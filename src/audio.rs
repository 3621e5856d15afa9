// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::speech::AudioClip;
use crate::viz::SignalTap;

pub mod mock;
pub mod rodio;

/// Typed error for audio playback operations.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("playback could not be started: {0}")]
    PlaybackStartFailed(String),

    #[error("no audio output device is available: {0}")]
    NoDevice(String),
}

/// An audio output device that can play synthesized clips.
pub trait Device: fmt::Display + Send + Sync {
    /// Starts playing the given clip and returns a transport handle for it.
    fn play(&self, clip: AudioClip) -> Result<Box<dyn Playback>, PlaybackError>;
}

/// The transport handle for one playing clip. At most one of these is active
/// per session; the orchestrator enforces that.
pub trait Playback: Send + Sync {
    /// Pauses playback, keeping the position.
    fn pause(&self);

    /// Resumes playback from the paused position.
    fn resume(&self);

    /// Returns true while playback is paused.
    fn is_paused(&self) -> bool;

    /// The current playback position.
    fn position(&self) -> Duration;

    /// Stops and detaches the playback. Used on teardown; the completion
    /// subscription will not fire afterwards.
    fn stop(&self);

    /// The live signal tap for this playback, feeding the visualizer.
    fn tap(&self) -> SignalTap;

    /// Subscribes to completion. The receiver resolves to true when the clip
    /// finishes playing naturally, and closes without resolving if the
    /// playback is stopped or dropped first.
    fn subscribe(&self) -> watch::Receiver<bool>;
}

/// Gets a device with the given name. Names starting with `mock` return a
/// mock device; anything else plays through the default audio output.
pub fn get_device(name: &str) -> Result<Arc<dyn Device>, PlaybackError> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Device::get(name)));
    }

    Ok(Arc::new(rodio::Output::get()?))
}
