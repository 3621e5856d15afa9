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
use core::fmt;
use std::sync::Arc;

use rand::Rng;
use tracing::{span, Level, Span};

use crate::catalog::{Catalog, Character, Topic};

/// A single line of dialogue scheduled within a session. Lines are generated
/// once when a session is created and never mutated afterwards.
#[derive(Clone, Debug)]
pub struct DialogueLine {
    /// The unique identifier of the line.
    pub id: String,
    /// The character that speaks this line.
    pub character_id: String,
    /// The text to be spoken.
    pub text: String,
    /// The target timestamp of the line, in seconds from session start.
    pub timestamp: u32,
    /// A cached reference to previously synthesized audio, if any.
    pub audio_url: Option<String>,
}

/// Typed error for script generation.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("character {0} is not in the catalog")]
    UnknownCharacter(String),

    #[error("a session requires at least {0} characters")]
    NotEnoughCharacters(usize),

    #[error("session duration must be at least {0} seconds")]
    DurationTooShort(u32),
}

/// The minimum number of characters in a session.
pub const MIN_CHARACTERS: usize = 2;

const MIN_DURATION_SECS: u32 = 3;

/// The dialogue lines of one session, sorted by ascending timestamp with ties
/// broken by catalog order of the speaking character.
pub struct Script {
    lines: Vec<Arc<DialogueLine>>,
    /// The logging span.
    span: Span,
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Script ({} lines):", self.lines.len())?;
        for line in self.lines.iter() {
            writeln!(f, "  - [{:>4}s] {}: {}", line.timestamp, line.character_id, line.text)?;
        }
        Ok(())
    }
}

impl Script {
    /// Generates placeholder dialogue for the given characters and topic. Each
    /// character gets a greeting in the first third of the session and a
    /// perspective on the topic in the second third.
    pub fn generate<R: Rng>(
        catalog: &Catalog,
        characters: &[Arc<Character>],
        topic: &Topic,
        duration_secs: u32,
        rng: &mut R,
    ) -> Result<Script, ScriptError> {
        if characters.len() < MIN_CHARACTERS {
            return Err(ScriptError::NotEnoughCharacters(MIN_CHARACTERS));
        }
        if duration_secs < MIN_DURATION_SECS {
            return Err(ScriptError::DurationTooShort(MIN_DURATION_SECS));
        }

        let third = duration_secs / 3;
        let mut lines = Vec::with_capacity(characters.len() * 2);
        for character in characters.iter() {
            if catalog.character(&character.id).is_none() {
                return Err(ScriptError::UnknownCharacter(character.id.clone()));
            }

            lines.push(DialogueLine {
                id: format!("{}-1", character.id),
                character_id: character.id.clone(),
                text: format!(
                    "Hello and welcome to the podcast! I'm {}, and I'm excited to discuss \"{}\" today.",
                    character.name, topic.title
                ),
                timestamp: rng.gen_range(0..third),
                audio_url: None,
            });
            lines.push(DialogueLine {
                id: format!("{}-2", character.id),
                character_id: character.id.clone(),
                text: format!(
                    "From my perspective, {} involves thinking about how we interact with the world and each other.",
                    topic.description
                ),
                timestamp: third + rng.gen_range(0..third),
                audio_url: None,
            });
        }

        Script::from_lines(catalog, lines)
    }

    /// Creates a script from explicit lines, sorting them into schedule order.
    pub fn from_lines(
        catalog: &Catalog,
        mut lines: Vec<DialogueLine>,
    ) -> Result<Script, ScriptError> {
        for line in lines.iter() {
            if catalog.character_position(&line.character_id).is_none() {
                return Err(ScriptError::UnknownCharacter(line.character_id.clone()));
            }
        }

        lines.sort_by_key(|line| {
            (
                line.timestamp,
                catalog
                    .character_position(&line.character_id)
                    .expect("character presence was just verified"),
            )
        });

        Ok(Script {
            lines: lines.into_iter().map(Arc::new).collect(),
            span: span!(Level::INFO, "script"),
        })
    }

    /// The lines of the script in schedule order.
    pub fn lines(&self) -> &[Arc<DialogueLine>] {
        &self.lines
    }

    /// Returns every line whose due window contains the given time. A line is
    /// due when the distance between its timestamp and the current time is
    /// strictly less than the window half-width.
    pub fn due_at(&self, time: u32, window: u32) -> Vec<Arc<DialogueLine>> {
        let _enter = self.span.enter();

        self.lines
            .iter()
            .filter(|line| line.timestamp.abs_diff(time) < window)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::catalog::Catalog;

    use super::{DialogueLine, Script, ScriptError};

    fn line(id: &str, character_id: &str, timestamp: u32) -> DialogueLine {
        DialogueLine {
            id: id.to_string(),
            character_id: character_id.to_string(),
            text: format!("line {}", id),
            timestamp,
            audio_url: None,
        }
    }

    #[test]
    fn test_generate() -> Result<(), ScriptError> {
        let catalog = Catalog::builtin();
        let characters = vec![
            catalog.character("aristotle").expect("expected character"),
            catalog.character("cleopatra").expect("expected character"),
        ];
        let topic = catalog.topic("meaning-of-life").expect("expected topic");
        let mut rng = StdRng::seed_from_u64(7);

        let script = Script::generate(&catalog, &characters, &topic, 180, &mut rng)?;

        assert_eq!(script.lines().len(), 4);
        // Sorted by ascending timestamp.
        for pair in script.lines().windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
        // All timestamps lie within the session.
        for line in script.lines() {
            assert!(line.timestamp < 180);
            assert!(["aristotle", "cleopatra"].contains(&line.character_id.as_str()));
        }
        Ok(())
    }

    #[test]
    fn test_generate_requires_two_characters() {
        let catalog = Catalog::builtin();
        let characters = vec![catalog.character("buddha").expect("expected character")];
        let topic = catalog.topic("art").expect("expected topic");
        let mut rng = StdRng::seed_from_u64(7);

        assert!(matches!(
            Script::generate(&catalog, &characters, &topic, 180, &mut rng),
            Err(ScriptError::NotEnoughCharacters(_))
        ));
    }

    #[test]
    fn test_sort_ties_break_by_catalog_order() -> Result<(), ScriptError> {
        let catalog = Catalog::builtin();
        // chef precedes aristotle in the catalog, so on a timestamp tie the
        // chef line must come first regardless of insertion order.
        let script = Script::from_lines(
            &catalog,
            vec![
                line("a-1", "aristotle", 5),
                line("c-1", "chef", 5),
                line("a-2", "aristotle", 3),
            ],
        )?;

        let order: Vec<&str> = script.lines().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(order, vec!["a-2", "c-1", "a-1"]);
        Ok(())
    }

    #[test]
    fn test_due_at() -> Result<(), ScriptError> {
        let catalog = Catalog::builtin();
        let script = Script::from_lines(
            &catalog,
            vec![
                line("a-1", "aristotle", 5),
                line("c-1", "chef", 5),
                line("n-1", "napoleon", 40),
            ],
        )?;

        // Both timestamp-5 lines are due at t=0 with a 10 second window.
        let due = script.due_at(0, 10);
        let due: Vec<&str> = due.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(due, vec!["c-1", "a-1"]);

        // The window is strict: |40 - 30| is not < 10.
        assert!(script.due_at(30, 10).is_empty());
        assert_eq!(script.due_at(31, 10).len(), 1);

        // Nothing is due in the gap.
        assert!(script.due_at(20, 10).is_empty());
        Ok(())
    }

    #[test]
    fn test_unknown_character_rejected() {
        let catalog = Catalog::builtin();
        assert!(matches!(
            Script::from_lines(&catalog, vec![line("x-1", "socrates", 0)]),
            Err(ScriptError::UnknownCharacter(_))
        ));
    }
}
