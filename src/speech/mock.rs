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
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::info;

use super::{AudioCache, AudioClip, SpeechError, Synthesizer as SynthesizerTrait};

const DEFAULT_CLIP_DURATION: Duration = Duration::from_millis(50);

/// A mock synthesizer. Doesn't talk to any backend; produces clips whose
/// bytes echo the requested text and records every backend request it would
/// have made, so tests can assert on cache behavior and ordering.
#[derive(Clone)]
pub struct Synthesizer {
    name: String,
    cache: AudioCache,
    requests: Arc<Mutex<Vec<(String, String)>>>,
    fail: Arc<AtomicBool>,
    clip_duration: Arc<Mutex<Duration>>,
}

impl Synthesizer {
    /// Gets the given mock synthesizer.
    pub fn get(name: &str) -> Synthesizer {
        Synthesizer {
            name: name.to_string(),
            cache: AudioCache::new(),
            requests: Arc::new(Mutex::new(Vec::new())),
            fail: Arc::new(AtomicBool::new(false)),
            clip_duration: Arc::new(Mutex::new(DEFAULT_CLIP_DURATION)),
        }
    }

    /// When set, every cache miss fails as if the backend rejected it.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Sets the playback duration hint attached to produced clips.
    pub fn set_clip_duration(&self, duration: Duration) {
        *self.clip_duration.lock() = duration;
    }

    /// The backend requests made so far, in order.
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }

    /// The number of backend requests made for the given (voice, text) pair.
    pub fn backend_requests(&self, voice_id: &str, text: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(v, t)| v == voice_id && t == text)
            .count()
    }

    /// The texts requested so far, in order. Convenient for asserting on
    /// speaker turn order.
    pub fn requested_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl fmt::Display for Synthesizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[async_trait::async_trait]
impl SynthesizerTrait for Synthesizer {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SpeechError> {
        if text.is_empty() {
            return Err(SpeechError::InvalidInput("text"));
        }
        if voice_id.is_empty() {
            return Err(SpeechError::InvalidInput("voice id"));
        }

        if let Some(clip) = self.cache.get(voice_id, text) {
            return Ok(clip);
        }

        if self.fail.load(Ordering::Relaxed) {
            return Err(SpeechError::SynthesisFailed(500));
        }

        info!(synthesizer = self.name, voice_id = voice_id, "Synthesizing (mock).");
        self.requests
            .lock()
            .push((voice_id.to_string(), text.to_string()));

        let clip = AudioClip {
            bytes: Bytes::copy_from_slice(text.as_bytes()),
            duration: Some(*self.clip_duration.lock()),
        };
        self.cache.store(voice_id, text, clip.clone());
        Ok(clip)
    }

    async fn verify_key(&self) -> bool {
        !self.fail.load(Ordering::Relaxed)
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::speech::{SpeechError, Synthesizer as _};

    use super::Synthesizer;

    #[tokio::test]
    async fn test_cache_idempotence() -> Result<(), SpeechError> {
        let synthesizer = Synthesizer::get("mock-synth");
        synthesizer.set_clip_duration(Duration::from_millis(5));

        let first = synthesizer.synthesize("hello", "voice-a").await?;
        let second = synthesizer.synthesize("hello", "voice-a").await?;

        // Identical arguments perform at most one backend request.
        assert_eq!(synthesizer.backend_requests("voice-a", "hello"), 1);
        assert_eq!(first.bytes, second.bytes);

        // A different voice for the same text is a different key.
        synthesizer.synthesize("hello", "voice-b").await?;
        assert_eq!(synthesizer.backend_requests("voice-b", "hello"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_cache_forces_fresh_request() -> Result<(), SpeechError> {
        let synthesizer = Synthesizer::get("mock-synth");

        let clip = synthesizer.synthesize("hello", "voice-a").await?;
        synthesizer.clear_cache();
        let fresh = synthesizer.synthesize("hello", "voice-a").await?;

        assert_eq!(synthesizer.backend_requests("voice-a", "hello"), 2);
        // The clip handed out before the clear is untouched.
        assert_eq!(&clip.bytes[..], b"hello");
        assert_eq!(clip.bytes, fresh.bytes);
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_mode() {
        let synthesizer = Synthesizer::get("mock-synth");
        synthesizer.set_fail(true);

        assert!(matches!(
            synthesizer.synthesize("hello", "voice-a").await,
            Err(SpeechError::SynthesisFailed(500))
        ));
        assert!(!synthesizer.verify_key().await);

        // Cached clips still hit even while failing.
        synthesizer.set_fail(false);
        synthesizer
            .synthesize("hello", "voice-a")
            .await
            .expect("expected synthesis");
        synthesizer.set_fail(true);
        assert!(synthesizer.synthesize("hello", "voice-a").await.is_ok());
    }
}
