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

use serde::Serialize;
use tracing::{debug, warn};

use crate::config;

use super::{AudioCache, AudioClip, SpeechError, Synthesizer};

/// The default ElevenLabs API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.elevenlabs.io/v1";

const DEFAULT_MODEL: &str = "eleven_multilingual_v2";
const STABILITY: f64 = 0.7;
const SIMILARITY_BOOST: f64 = 0.7;

/// The header carrying the API key.
const API_KEY_HEADER: &str = "xi-api-key";

#[derive(Serialize)]
struct VoiceSettings {
    stability: f64,
    similarity_boost: f64,
}

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

impl<'a> TtsRequest<'a> {
    fn new(text: &'a str) -> TtsRequest<'a> {
        TtsRequest {
            text,
            model_id: DEFAULT_MODEL,
            voice_settings: VoiceSettings {
                stability: STABILITY,
                similarity_boost: SIMILARITY_BOOST,
            },
        }
    }
}

/// A speech synthesis client for the ElevenLabs streaming text-to-speech
/// endpoint. The credential is handed in at construction; there is no global
/// key state.
pub struct Client {
    api_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
    cache: AudioCache,
}

impl Client {
    /// Creates a new client from the given configuration.
    pub fn new(config: &config::ElevenLabs) -> Client {
        Client {
            api_url: config.api_url().to_string(),
            api_key: config.api_key().map(|api_key| api_key.to_string()),
            http: reqwest::Client::new(),
            cache: AudioCache::new(),
        }
    }

    /// The number of cached clips, exposed for inspection.
    pub fn cached_clips(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElevenLabs ({})", self.api_url)
    }
}

#[async_trait::async_trait]
impl Synthesizer for Client {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<AudioClip, SpeechError> {
        if text.is_empty() {
            return Err(SpeechError::InvalidInput("text"));
        }
        if voice_id.is_empty() {
            return Err(SpeechError::InvalidInput("voice id"));
        }

        if let Some(clip) = self.cache.get(voice_id, text) {
            debug!(voice_id = voice_id, "Returning cached clip.");
            return Ok(clip);
        }

        let api_key = self.api_key.as_ref().ok_or(SpeechError::Unauthenticated)?;

        // One attempt only. The orchestrator drops the line on failure rather
        // than retrying or blocking the queue.
        let response = self
            .http
            .post(format!("{}/text-to-speech/{}/stream", self.api_url, voice_id))
            .header(API_KEY_HEADER, api_key)
            .json(&TtsRequest::new(text))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                detail = detail,
                "Synthesis request rejected."
            );
            return Err(SpeechError::SynthesisFailed(status.as_u16()));
        }

        let clip = AudioClip {
            bytes: response.bytes().await?,
            duration: None,
        };
        self.cache.store(voice_id, text, clip.clone());
        Ok(clip)
    }

    async fn verify_key(&self) -> bool {
        let api_key = match self.api_key.as_ref() {
            Some(api_key) => api_key,
            None => return false,
        };

        self.http
            .get(format!("{}/voices", self.api_url))
            .header(API_KEY_HEADER, api_key)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod test {
    use crate::config::ElevenLabs;
    use crate::speech::{SpeechError, Synthesizer};

    use super::{Client, TtsRequest};

    #[tokio::test]
    async fn test_requires_key_and_input() {
        let client = Client::new(&ElevenLabs::new(None, None));

        // Input validation fires before any credential check.
        assert!(matches!(
            client.synthesize("", "voice").await,
            Err(SpeechError::InvalidInput("text"))
        ));
        assert!(matches!(
            client.synthesize("hello", "").await,
            Err(SpeechError::InvalidInput("voice id"))
        ));

        // No key configured means no request is made at all.
        assert!(matches!(
            client.synthesize("hello", "voice").await,
            Err(SpeechError::Unauthenticated)
        ));
        assert!(!client.verify_key().await);
    }

    #[test]
    fn test_request_shape() {
        let request = serde_json::to_value(TtsRequest::new("hello there")).expect("serializable");
        assert_eq!(request["text"], "hello there");
        assert_eq!(request["model_id"], "eleven_multilingual_v2");
        assert_eq!(request["voice_settings"]["stability"], 0.7);
        assert_eq!(request["voice_settings"]["similarity_boost"], 0.7);
    }
}
