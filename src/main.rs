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
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};

use podsim::catalog::Catalog;
use podsim::orchestrator::NowPlaying;
use podsim::session::Session;
use podsim::viz::{self, Visualizer};
use podsim::{audio, config, speech};

const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A simulated podcast player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available characters.
    Characters {},
    /// Lists the available topics.
    Topics {},
    /// Verifies the speech synthesis API key in the given session config.
    VerifyKey {
        /// The path to the session config.
        session_path: String,
    },
    /// Synthesizes and plays a single line for a character.
    Speak {
        /// The path to the session config.
        session_path: String,
        /// The id of the character to speak as.
        character: String,
        /// The text to speak.
        text: String,
    },
    /// Start will run a full simulated podcast session.
    Start {
        /// The path to the session config.
        session_path: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Characters {} => {
            let catalog = Catalog::builtin();
            println!("Characters (count: {}):", catalog.characters().len());
            for character in catalog.characters() {
                println!("- {}", character);
            }
        }
        Commands::Topics {} => {
            let catalog = Catalog::builtin();
            println!("Topics (count: {}):", catalog.topics().len());
            for topic in catalog.topics() {
                println!("- {}", topic);
            }
        }
        Commands::VerifyKey { session_path } => {
            let (session, _) = config::parse_session(PathBuf::from(session_path))?;
            let synthesizer = speech::get_synthesizer(&session.elevenlabs());

            if synthesizer.verify_key().await {
                println!("API key for {} is valid.", synthesizer);
            } else {
                println!("API key for {} is missing or invalid.", synthesizer);
            }
        }
        Commands::Speak {
            session_path,
            character,
            text,
        } => {
            let (session, catalog) = config::parse_session(PathBuf::from(session_path))?;
            let character = catalog
                .character(&character)
                .ok_or_else(|| format!("unknown character {}", character))?;
            let voice_id = character
                .voice_id
                .as_ref()
                .ok_or_else(|| format!("{} has no voice", character))?;

            let synthesizer = speech::get_synthesizer(&session.elevenlabs());
            let clip = synthesizer.synthesize(&text, voice_id).await?;

            let device = audio::get_device(session.audio_device())?;
            let playback = device.play(clip)?;
            playback.subscribe().wait_for(|done| *done).await?;
        }
        Commands::Start { session_path } => {
            let (session_config, catalog) = config::parse_session(PathBuf::from(session_path))?;
            let mut session = Session::new(&session_config, catalog)?;

            println!("Script ({} lines):", session.script().lines().len());
            for line in session.script().lines() {
                println!("- [{:>3}s] {}: {}", line.timestamp, line.character_id, line.text);
            }

            let renderer = tokio::spawn(render(session.now_playing()));
            session.start();
            session.join().await;
            session.stop().await;
            renderer.abort();

            println!("Session finished.");
        }
    }

    Ok(())
}

/// Renders the active speaker and its amplitude bars to stdout.
async fn render(mut now_playing: tokio::sync::watch::Receiver<NowPlaying>) {
    let visualizer = Visualizer::new(viz::DEFAULT_BAR_COUNT);
    let mut interval = tokio::time::interval(Duration::from_millis(250));
    let mut speaker: Option<String> = None;

    loop {
        interval.tick().await;

        let state = now_playing.borrow_and_update().clone();
        if state.speaker_id != speaker {
            match &state.speaker_id {
                Some(speaker_id) => println!("Now speaking: {}", speaker_id),
                // One static placeholder frame when nobody is speaking.
                // ThreadRng is not Send, so it must not live across ticks.
                None => println!(
                    "{}",
                    bar_string(&Visualizer::placeholder(&mut rand::thread_rng()))
                ),
            }
            speaker = state.speaker_id.clone();
        }

        if state.is_audio_playing {
            if let Some(tap) = &state.tap {
                println!("{}", bar_string(&visualizer.frame(tap)));
            }
        }
    }
}

fn bar_string(bars: &[f32]) -> String {
    bars.iter()
        .map(|bar| {
            let index = ((bar * BAR_GLYPHS.len() as f32) as usize).min(BAR_GLYPHS.len() - 1);
            BAR_GLYPHS[index]
        })
        .collect()
}
