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
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, span, Level, Span};

/// The default session duration, in seconds.
pub const DEFAULT_DURATION_SECS: u32 = 180;

struct State {
    is_playing: bool,
    position: u32,
    duration: u32,
}

/// The playback timeline of a session. The position advances one second at a
/// time while playing and is clamped to `[0, duration]`. The timeline is owned
/// by the session layer; the orchestrator only observes it through events.
#[derive(Clone)]
pub struct Timeline {
    state: Arc<RwLock<State>>,
    /// The logging span.
    span: Span,
}

impl Timeline {
    /// Creates a new, paused timeline starting at zero.
    pub fn new(duration: u32) -> Timeline {
        Timeline {
            state: Arc::new(RwLock::new(State {
                is_playing: false,
                position: 0,
                duration,
            })),
            span: span!(Level::INFO, "timeline"),
        }
    }

    /// Starts the timeline. If the session already ran to completion, playback
    /// restarts from the beginning.
    pub fn play(&self) {
        let _enter = self.span.enter();

        let mut state = self.state.write();
        if state.position >= state.duration {
            info!("Restarting session from the beginning.");
            state.position = 0;
        }
        state.is_playing = true;
    }

    /// Pauses the timeline.
    pub fn pause(&self) {
        self.state.write().is_playing = false;
    }

    /// Moves the timeline to the given position, clamped to the session
    /// duration. Seeking does not change the play/pause state.
    pub fn seek(&self, position: u32) {
        let mut state = self.state.write();
        state.position = position.min(state.duration);
    }

    /// Advances the timeline by one second if it is playing. Returns the new
    /// position, or None if the timeline is paused. Reaching the end of the
    /// session pauses the timeline.
    pub fn tick(&self) -> Option<u32> {
        let _enter = self.span.enter();

        let mut state = self.state.write();
        if !state.is_playing {
            return None;
        }

        state.position = (state.position + 1).min(state.duration);
        if state.position >= state.duration {
            info!("End of session reached.");
            state.is_playing = false;
        }
        Some(state.position)
    }

    /// Returns true while the timeline is advancing.
    pub fn is_playing(&self) -> bool {
        self.state.read().is_playing
    }

    /// The current position in seconds.
    pub fn position(&self) -> u32 {
        self.state.read().position
    }

    /// The fixed session duration in seconds.
    pub fn duration(&self) -> u32 {
        self.state.read().duration
    }
}
