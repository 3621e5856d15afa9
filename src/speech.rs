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
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config;

pub mod elevenlabs;
pub mod mock;

/// A synthesized, playable audio resource. Clones share the underlying
/// encoded buffer, so a clip handed to the audio device stays valid even if
/// the cache entry it came from is cleared.
#[derive(Clone, Debug)]
pub struct AudioClip {
    /// The encoded audio bytes as returned by the backend.
    pub bytes: Bytes,
    /// A playback duration hint. Real backends leave this unset and let the
    /// decoder figure it out; mocks use it to time their fake playback.
    pub duration: Option<Duration>,
}

/// Typed error for speech synthesis operations.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no API key is configured")]
    Unauthenticated,

    #[error("synthesis request rejected with status {0}")]
    SynthesisFailed(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0} must not be empty")]
    InvalidInput(&'static str),
}

/// Converts text into playable audio resources. Implementations own a
/// process-lifetime cache keyed by the exact (voice, text) pair.
#[async_trait::async_trait]
pub trait Synthesizer: fmt::Display + Send + Sync {
    /// Synthesizes the given text with the given voice. A cache hit returns
    /// the previously synthesized clip without touching the backend. Failures
    /// are reported upward after a single attempt, never retried here.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SpeechError>;

    /// Best-effort reachability probe for the backend credential. Only used
    /// for configuration feedback, never to gate playback.
    async fn verify_key(&self) -> bool;

    /// Releases every cached clip. Clips already handed out keep playing
    /// against the buffers their holders own.
    fn clear_cache(&self);
}

/// The process-wide audio cache shared by synthesizer implementations. There
/// is no eviction; entries live for the lifetime of the process.
#[derive(Clone, Default)]
pub struct AudioCache {
    entries: Arc<Mutex<HashMap<(String, String), AudioClip>>>,
}

impl AudioCache {
    /// Creates an empty cache.
    pub fn new() -> AudioCache {
        AudioCache::default()
    }

    /// Looks up a clip by the exact (voice, text) pair. No fuzzy matching.
    pub fn get(&self, voice_id: &str, text: &str) -> Option<AudioClip> {
        self.entries
            .lock()
            .get(&(voice_id.to_string(), text.to_string()))
            .cloned()
    }

    /// Stores a clip under the given (voice, text) pair.
    pub fn store(&self, voice_id: &str, text: &str, clip: AudioClip) {
        self.entries
            .lock()
            .insert((voice_id.to_string(), text.to_string()), clip);
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// The number of cached clips.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the cache holds no clips.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Gets a synthesizer for the given configuration. A backend named `mock`
/// returns the mock synthesizer, mirroring the audio device convention.
pub fn get_synthesizer(config: &config::ElevenLabs) -> Arc<dyn Synthesizer> {
    if config.backend().starts_with("mock") {
        return Arc::new(mock::Synthesizer::get(config.backend()));
    }

    Arc::new(elevenlabs::Client::new(config))
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use bytes::Bytes;

    use super::{AudioCache, AudioClip};

    fn clip(content: &str) -> AudioClip {
        AudioClip {
            bytes: Bytes::copy_from_slice(content.as_bytes()),
            duration: Some(Duration::from_millis(10)),
        }
    }

    #[test]
    fn test_cache_exact_key() {
        let cache = AudioCache::new();
        assert!(cache.is_empty());

        cache.store("voice-a", "hello", clip("a"));
        assert_eq!(cache.len(), 1);

        assert!(cache.get("voice-a", "hello").is_some());
        // Lookups require the exact pair.
        assert!(cache.get("voice-b", "hello").is_none());
        assert!(cache.get("voice-a", "hello there").is_none());
    }

    #[test]
    fn test_clear_leaves_handed_out_clips_alone() {
        let cache = AudioCache::new();
        cache.store("voice-a", "hello", clip("payload"));

        let handed_out = cache.get("voice-a", "hello").expect("expected clip");
        cache.clear();

        assert!(cache.is_empty());
        // The clip we already hold remains fully usable.
        assert_eq!(&handed_out.bytes[..], b"payload");
    }
}
