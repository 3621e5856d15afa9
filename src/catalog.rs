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
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

/// A character that can take part in a simulated podcast. Catalog entries are
/// immutable once loaded.
#[derive(Clone, Debug, Deserialize)]
pub struct Character {
    /// The unique identifier of the character.
    pub id: String,
    /// The display name of the character.
    pub name: String,
    /// A short description of the character.
    pub description: String,
    /// A reference to an avatar image for the character.
    pub image: String,
    /// The voice identifier understood by the speech synthesis backend. A
    /// character without a voice is shown but never spoken.
    pub voice_id: Option<String>,
    /// The accent color associated with the character.
    pub color: String,
    /// Tags for filtering in selection UIs.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl fmt::Display for Character {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}){}",
            self.name,
            self.id,
            if self.voice_id.is_none() {
                " [no voice]"
            } else {
                ""
            }
        )
    }
}

/// A discussion topic for a simulated podcast.
#[derive(Clone, Debug, Deserialize)]
pub struct Topic {
    /// The unique identifier of the topic.
    pub id: String,
    /// The display title of the topic.
    pub title: String,
    /// A short description of the topic.
    pub description: String,
    /// Tags for filtering in selection UIs.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.id)
    }
}

/// Typed error for catalog construction and loading.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("duplicate character id: {0}")]
    DuplicateCharacter(String),

    #[error("duplicate topic id: {0}")]
    DuplicateTopic(String),

    #[error("error reading catalog file: {0}")]
    Io(#[from] std::io::Error),

    #[error("error parsing catalog file: {0}")]
    Parse(#[from] serde_yml::Error),
}

/// The character and topic registry. Characters keep their catalog order,
/// which is used as the tie-break when two dialogue lines share a timestamp.
pub struct Catalog {
    characters: Vec<Arc<Character>>,
    characters_by_id: HashMap<String, usize>,
    topics: Vec<Arc<Topic>>,
    topics_by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Creates a catalog from the given characters and topics.
    pub fn new(characters: Vec<Character>, topics: Vec<Topic>) -> Result<Catalog, CatalogError> {
        let mut characters_by_id = HashMap::new();
        let characters: Vec<Arc<Character>> = characters.into_iter().map(Arc::new).collect();
        for (position, character) in characters.iter().enumerate() {
            if characters_by_id
                .insert(character.id.clone(), position)
                .is_some()
            {
                return Err(CatalogError::DuplicateCharacter(character.id.clone()));
            }
        }

        let mut topics_by_id = HashMap::new();
        let topics: Vec<Arc<Topic>> = topics.into_iter().map(Arc::new).collect();
        for (position, topic) in topics.iter().enumerate() {
            if topics_by_id.insert(topic.id.clone(), position).is_some() {
                return Err(CatalogError::DuplicateTopic(topic.id.clone()));
            }
        }

        Ok(Catalog {
            characters,
            characters_by_id,
            topics,
            topics_by_id,
        })
    }

    /// Creates the built-in catalog.
    pub fn builtin() -> Catalog {
        Catalog::new(builtin_characters(), builtin_topics())
            .expect("built-in catalog must be valid")
    }

    /// Loads a catalog from YAML files. Either file may be omitted, in which
    /// case the built-in entries are used for that half of the catalog.
    pub fn from_files(
        characters: Option<&Path>,
        topics: Option<&Path>,
    ) -> Result<Catalog, CatalogError> {
        let characters = match characters {
            Some(path) => serde_yml::from_str(&fs::read_to_string(path)?)?,
            None => builtin_characters(),
        };
        let topics = match topics {
            Some(path) => serde_yml::from_str(&fs::read_to_string(path)?)?,
            None => builtin_topics(),
        };
        Catalog::new(characters, topics)
    }

    /// Gets a character by id.
    pub fn character(&self, id: &str) -> Option<Arc<Character>> {
        self.characters_by_id
            .get(id)
            .map(|position| self.characters[*position].clone())
    }

    /// Gets the catalog position of a character.
    pub fn character_position(&self, id: &str) -> Option<usize> {
        self.characters_by_id.get(id).copied()
    }

    /// The characters in catalog order.
    pub fn characters(&self) -> &[Arc<Character>] {
        &self.characters
    }

    /// Gets a topic by id.
    pub fn topic(&self, id: &str) -> Option<Arc<Topic>> {
        self.topics_by_id
            .get(id)
            .map(|position| self.topics[*position].clone())
    }

    /// The topics in catalog order.
    pub fn topics(&self) -> &[Arc<Topic>] {
        &self.topics
    }
}

fn character(
    id: &str,
    name: &str,
    description: &str,
    voice_id: Option<&str>,
    color: &str,
    tags: &[&str],
) -> Character {
    Character {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        image: format!("images/characters/{}.png", id),
        voice_id: voice_id.map(|voice_id| voice_id.to_string()),
        color: color.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

fn topic(id: &str, title: &str, description: &str, tags: &[&str]) -> Topic {
    Topic {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        tags: tags.iter().map(|tag| tag.to_string()).collect(),
    }
}

/// The built-in character roster. The voice ids refer to ElevenLabs premade
/// voices standing in for each character.
fn builtin_characters() -> Vec<Character> {
    vec![
        character(
            "jesus",
            "Jesus Christ",
            "Religious figure and central character of Christianity",
            Some("XB0fDUnXU5powFXDhCwa"),
            "#BD93F9",
            &["religious", "historical", "spiritual"],
        ),
        character(
            "chef",
            "Chef",
            "Character from South Park known for his advice and songs",
            Some("TX3LPaxmHKxFdv7VOQHJ"),
            "#FF5555",
            &["fictional", "comedy", "south-park"],
        ),
        character(
            "aristotle",
            "Aristotle",
            "Ancient Greek philosopher and scientist",
            Some("JBFqnCBsd6RMkjVDRZzb"),
            "#50FA7B",
            &["historical", "philosophy", "science"],
        ),
        character(
            "cleopatra",
            "Cleopatra VII",
            "Last active ruler of the Ptolemaic Kingdom of Egypt",
            Some("EXAVITQu4vr4xnSDxMaL"),
            "#FFB86C",
            &["historical", "political", "egyptian"],
        ),
        character(
            "shakespeare",
            "William Shakespeare",
            "English playwright, poet, and actor",
            Some("iP95p4xoKVk53GoZ742B"),
            "#8BE9FD",
            &["historical", "literature", "arts"],
        ),
        character(
            "napoleon",
            "Napoleon Bonaparte",
            "French military leader and emperor",
            Some("N2lVS1w4EtoT3dr4eOWO"),
            "#FF79C6",
            &["historical", "political", "military"],
        ),
        character(
            "buddha",
            "Gautama Buddha",
            "Founder of Buddhism",
            Some("onwK4e9ZLuTAKqWW03F9"),
            "#F1FA8C",
            &["religious", "historical", "spiritual", "philosophy"],
        ),
        character(
            "marie-curie",
            "Marie Curie",
            "Physicist and chemist who conducted pioneering research on radioactivity",
            Some("FGY2WhTYpPnrIDTdsKH5"),
            "#9580FF",
            &["historical", "science", "nobel-prize"],
        ),
    ]
}

/// The built-in discussion topics.
fn builtin_topics() -> Vec<Topic> {
    vec![
        topic(
            "meaning-of-life",
            "The Meaning of Life",
            "Exploring perspectives on human existence and purpose",
            &["philosophy", "existential", "spiritual"],
        ),
        topic(
            "technology",
            "Modern Technology",
            "How would historical figures react to today's technology?",
            &["technology", "modern", "reactions"],
        ),
        topic(
            "leadership",
            "Leadership Philosophy",
            "Different approaches to leading people and nations",
            &["politics", "governance", "power"],
        ),
        topic(
            "morality",
            "Moral Frameworks",
            "Comparing different systems of ethics and morality",
            &["ethics", "philosophy", "religion"],
        ),
        topic(
            "afterlife",
            "Conceptions of the Afterlife",
            "Various beliefs about what happens after death",
            &["religion", "spirituality", "death"],
        ),
        topic(
            "art",
            "The Purpose of Art",
            "Discussing the role of art in society and human expression",
            &["culture", "creativity", "expression"],
        ),
    ]
}
