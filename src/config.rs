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
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use duration_string::DurationString;
use serde::Deserialize;

use crate::catalog::{Catalog, CatalogError};
use crate::orchestrator;
use crate::script::MIN_CHARACTERS;
use crate::speech::elevenlabs;
use crate::timeline;

const DEFAULT_AUDIO_DEVICE: &str = "default";
const DEFAULT_SPEECH_BACKEND: &str = "elevenlabs";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("error reading configuration: {0}")]
    Io(#[from] io::Error),
    #[error("error parsing configuration: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("error loading catalog: {0}")]
    Catalog(#[from] CatalogError),
    #[error("invalid duration {0}: {1}")]
    InvalidDuration(String, String),
    #[error("unknown character {0}")]
    UnknownCharacter(String),
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("a session needs at least {MIN_CHARACTERS} characters, got {0}")]
    NotEnoughCharacters(usize),
    #[error("session duration must not be zero")]
    ZeroDuration,
}

/// The speech synthesis backend configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ElevenLabs {
    /// The API key. Sessions without one run silently.
    api_key: Option<String>,
    /// The base API URL.
    api_url: Option<String>,
    /// The backend to use. Backends starting with "mock" use the mock
    /// synthesizer.
    backend: Option<String>,
}

impl ElevenLabs {
    /// Creates a new speech backend configuration.
    pub fn new(api_key: Option<String>, api_url: Option<String>) -> ElevenLabs {
        ElevenLabs {
            api_key,
            api_url,
            backend: None,
        }
    }

    /// Returns the API key from the configuration.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Returns the base API URL from the configuration.
    pub fn api_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or(elevenlabs::DEFAULT_API_URL)
    }

    /// Returns the speech backend from the configuration.
    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or(DEFAULT_SPEECH_BACKEND)
    }
}

/// The configuration for a simulated podcast session.
#[derive(Deserialize)]
pub struct Session {
    /// The ids of the participating characters.
    characters: Vec<String>,
    /// The id of the discussion topic.
    topic: String,
    /// The session duration.
    duration: Option<String>,
    /// The due-window half-width for dialogue lines.
    due_window: Option<String>,
    /// The grace delay between consecutive lines.
    grace_period: Option<String>,
    /// The audio device to use.
    audio_device: Option<String>,
    /// Path to a character catalog file. Defaults to the built-in catalog.
    characters_file: Option<PathBuf>,
    /// Path to a topic catalog file. Defaults to the built-in catalog.
    topics_file: Option<PathBuf>,
    /// The speech synthesis backend configuration.
    elevenlabs: Option<ElevenLabs>,
}

impl Session {
    /// Returns the ids of the participating characters.
    pub fn characters(&self) -> &[String] {
        &self.characters
    }

    /// Returns the id of the discussion topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns the session duration from the configuration.
    pub fn duration(&self) -> Result<Duration, ConfigError> {
        match &self.duration {
            Some(duration) => parse_duration(duration),
            None => Ok(Duration::from_secs(
                timeline::DEFAULT_DURATION_SECS as u64,
            )),
        }
    }

    /// Returns the due-window half-width from the configuration.
    pub fn due_window(&self) -> Result<Duration, ConfigError> {
        match &self.due_window {
            Some(due_window) => parse_duration(due_window),
            None => Ok(Duration::from_secs(
                orchestrator::DEFAULT_DUE_WINDOW_SECS as u64,
            )),
        }
    }

    /// Returns the grace delay from the configuration.
    pub fn grace_period(&self) -> Result<Duration, ConfigError> {
        match &self.grace_period {
            Some(grace_period) => parse_duration(grace_period),
            None => Ok(orchestrator::DEFAULT_GRACE_PERIOD),
        }
    }

    /// Returns the audio device from the configuration.
    pub fn audio_device(&self) -> &str {
        self.audio_device.as_deref().unwrap_or(DEFAULT_AUDIO_DEVICE)
    }

    /// Returns the speech backend configuration.
    pub fn elevenlabs(&self) -> ElevenLabs {
        self.elevenlabs.clone().unwrap_or_default()
    }

    /// Loads the catalog named by the configuration.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        if self.characters_file.is_none() && self.topics_file.is_none() {
            return Ok(Catalog::builtin());
        }
        Ok(Catalog::from_files(
            self.characters_file.as_deref(),
            self.topics_file.as_deref(),
        )?)
    }

    /// Validates the session against its catalog.
    pub fn validate(&self, catalog: &Catalog) -> Result<(), ConfigError> {
        if self.characters.len() < MIN_CHARACTERS {
            return Err(ConfigError::NotEnoughCharacters(self.characters.len()));
        }
        for character in &self.characters {
            if catalog.character(character).is_none() {
                return Err(ConfigError::UnknownCharacter(character.clone()));
            }
        }
        if catalog.topic(&self.topic).is_none() {
            return Err(ConfigError::UnknownTopic(self.topic.clone()));
        }
        if self.duration()?.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        Ok(())
    }
}

fn parse_duration(duration: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(duration.to_string())
        .map(|duration| duration.into())
        .map_err(|e| ConfigError::InvalidDuration(duration.to_string(), e.to_string()))
}

/// Parses a session configuration from the given path and validates it
/// against its catalog.
pub fn parse_session<P: AsRef<Path>>(path: P) -> Result<(Session, Catalog), ConfigError> {
    let session: Session = serde_yml::from_str(&fs::read_to_string(path)?)?;
    let catalog = session.catalog()?;
    session.validate(&catalog)?;
    Ok((session, catalog))
}

#[cfg(test)]
mod test {
    use std::io::Write;
    use std::time::Duration;

    use super::{parse_session, ConfigError};

    fn session_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[test]
    fn test_parse_session() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [aristotle, cleopatra, napoleon]
topic: meaning-of-life
duration: 3m
due_window: 10s
grace_period: 500ms
audio_device: mock
elevenlabs:
  api_key: test-key
"#,
        );

        let (session, catalog) = parse_session(file.path())?;
        assert_eq!(session.characters().len(), 3);
        assert_eq!(session.topic(), "meaning-of-life");
        assert_eq!(session.duration()?, Duration::from_secs(180));
        assert_eq!(session.due_window()?, Duration::from_secs(10));
        assert_eq!(session.grace_period()?, Duration::from_millis(500));
        assert_eq!(session.audio_device(), "mock");
        assert_eq!(session.elevenlabs().api_key(), Some("test-key"));
        assert!(catalog.character("aristotle").is_some());
        Ok(())
    }

    #[test]
    fn test_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [jesus, chef]
topic: afterlife
"#,
        );

        let (session, _) = parse_session(file.path())?;
        assert_eq!(session.duration()?, Duration::from_secs(180));
        assert_eq!(session.due_window()?, Duration::from_secs(10));
        assert_eq!(session.grace_period()?, Duration::from_millis(500));
        assert_eq!(session.audio_device(), "default");
        assert_eq!(session.elevenlabs().api_key(), None);
        assert_eq!(session.elevenlabs().backend(), "elevenlabs");
        Ok(())
    }

    #[test]
    fn test_validation_failures() {
        let too_few = session_file("characters: [jesus]\ntopic: afterlife\n");
        match parse_session(too_few.path()) {
            Err(ConfigError::NotEnoughCharacters(1)) => {}
            _ => panic!("expected not enough characters error"),
        }

        let unknown_character =
            session_file("characters: [jesus, socrates]\ntopic: afterlife\n");
        match parse_session(unknown_character.path()) {
            Err(ConfigError::UnknownCharacter(character)) => {
                assert_eq!(character, "socrates")
            }
            _ => panic!("expected unknown character error"),
        }

        let unknown_topic = session_file("characters: [jesus, chef]\ntopic: gardening\n");
        match parse_session(unknown_topic.path()) {
            Err(ConfigError::UnknownTopic(topic)) => assert_eq!(topic, "gardening"),
            _ => panic!("expected unknown topic error"),
        }

        let zero = session_file("characters: [jesus, chef]\ntopic: afterlife\nduration: 0s\n");
        match parse_session(zero.path()) {
            Err(ConfigError::ZeroDuration) => {}
            _ => panic!("expected zero duration error"),
        }
    }
}
