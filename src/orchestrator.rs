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
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument, Level};

use crate::audio;
use crate::catalog::Catalog;
use crate::script::{DialogueLine, Script};
use crate::speech::Synthesizer;
use crate::viz::SignalTap;

/// The default due-window half-width: a line is eligible while the timeline
/// is within this many seconds of its timestamp.
pub const DEFAULT_DUE_WINDOW_SECS: u32 = 10;

/// The default grace delay between the end of one line and the start of the
/// next queued one.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(500);

/// Tunable timing for the orchestrator.
#[derive(Clone, Copy)]
pub struct Options {
    /// The due-window half-width in seconds.
    pub due_window_secs: u32,
    /// The delay between consecutive lines.
    pub grace_period: Duration,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            due_window_secs: DEFAULT_DUE_WINDOW_SECS,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// The events the orchestrator reacts to. Everything that changes speaker
/// state arrives here and is processed one transition at a time.
#[derive(Debug)]
pub enum Event {
    /// The timeline advanced to the given position (seconds).
    Tick(u32),

    /// The timeline was paused; in-flight audio is paused, not discarded.
    TransportPaused,

    /// The timeline resumed; paused audio continues from its position.
    TransportResumed,

    /// The active line finished playing naturally.
    LineFinished,

    /// The grace delay after a finished line elapsed.
    GraceElapsed,

    /// The session is tearing down.
    Shutdown,
}

/// The read-only projection of the speaker state published to the rendering
/// layer.
#[derive(Clone, Default)]
pub struct NowPlaying {
    /// The character currently speaking, if any.
    pub speaker_id: Option<String>,
    /// The line currently being spoken or synthesized.
    pub line: Option<Arc<DialogueLine>>,
    /// True while audio for the current line is actually playing.
    pub is_audio_playing: bool,
    /// The live signal tap of the playing audio, for visualization.
    pub tap: Option<SignalTap>,
}

/// Orchestrates speech playback for one session: watches timeline ticks for
/// due dialogue lines, serializes synthesis and playback so only one
/// character speaks at a time, and publishes the active speaker.
pub struct Orchestrator {
    events_tx: mpsc::Sender<Event>,
    now_playing_rx: watch::Receiver<NowPlaying>,
    handle: Option<JoinHandle<()>>,
}

impl Orchestrator {
    /// Creates a new orchestrator and starts its event runner.
    pub fn new(
        script: Arc<Script>,
        catalog: Arc<Catalog>,
        synthesizer: Arc<dyn Synthesizer>,
        device: Arc<dyn audio::Device>,
        options: Options,
    ) -> Orchestrator {
        let (events_tx, events_rx) = mpsc::channel(16);
        let (now_playing_tx, now_playing_rx) = watch::channel(NowPlaying::default());

        let runner = Runner {
            script,
            catalog,
            synthesizer,
            device,
            options,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            current: None,
            is_audio_playing: false,
            // The timeline starts paused; nothing may play until it ticks.
            transport_paused: true,
            now_playing_tx,
            events_tx: events_tx.clone(),
        };
        let handle = tokio::spawn(
            runner
                .run(events_rx)
                .instrument(tracing::span!(Level::INFO, "orchestrator")),
        );

        Orchestrator {
            events_tx,
            now_playing_rx,
            handle: Some(handle),
        }
    }

    /// The sender used to dispatch events into the runner.
    pub fn events(&self) -> mpsc::Sender<Event> {
        self.events_tx.clone()
    }

    /// Subscribes to the published speaker state.
    pub fn now_playing(&self) -> watch::Receiver<NowPlaying> {
        self.now_playing_rx.clone()
    }

    /// Tears the orchestrator down: active audio is paused and detached, the
    /// completion subscription is dropped, and the runner exits.
    pub async fn shutdown(&mut self) {
        let _ = self.events_tx.send(Event::Shutdown).await;
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

struct ActiveLine {
    line: Arc<DialogueLine>,
    playback: Box<dyn audio::Playback>,
}

/// The single task that owns all speaker state. Events are consumed one at a
/// time, so due-window scans and queue mutations never interleave.
struct Runner {
    script: Arc<Script>,
    catalog: Arc<Catalog>,
    synthesizer: Arc<dyn Synthesizer>,
    device: Arc<dyn audio::Device>,
    options: Options,

    /// Lines waiting for their turn, in schedule order.
    pending: VecDeque<Arc<DialogueLine>>,
    /// Every line that has ever been enqueued. Lines are spoken at most once
    /// per session; seeking backward does not replay them.
    seen: HashSet<String>,
    current: Option<ActiveLine>,
    is_audio_playing: bool,
    transport_paused: bool,

    now_playing_tx: watch::Sender<NowPlaying>,
    events_tx: mpsc::Sender<Event>,
}

impl Runner {
    async fn run(mut self, mut events_rx: mpsc::Receiver<Event>) {
        info!(lines = self.script.lines().len(), "Orchestrator started.");

        while let Some(event) = events_rx.recv().await {
            match event {
                Event::Tick(position) => self.handle_tick(position).await,
                Event::TransportPaused => self.handle_transport_paused(),
                Event::TransportResumed => self.handle_transport_resumed().await,
                Event::LineFinished => self.handle_line_finished(),
                Event::GraceElapsed => self.handle_grace_elapsed().await,
                Event::Shutdown => break,
            }
        }

        if let Some(active) = self.current.take() {
            active.playback.pause();
            active.playback.stop();
        }
        self.is_audio_playing = false;
        self.publish();
        info!("Orchestrator stopped.");
    }

    /// Scans for lines whose due window contains the new position and queues
    /// the ones that haven't been spoken yet. Ticks only arrive while the
    /// timeline is advancing, so a tick also lifts the pause overlay.
    async fn handle_tick(&mut self, position: u32) {
        self.transport_paused = false;

        for line in self.script.due_at(position, self.options.due_window_secs) {
            if self.seen.contains(&line.id) {
                continue;
            }

            info!(
                line = line.id,
                timestamp = line.timestamp,
                position = position,
                "Line is due."
            );
            self.seen.insert(line.id.clone());
            self.pending.push_back(line);
        }

        if !self.is_audio_playing && !self.transport_paused {
            self.start_next().await;
        }
    }

    fn handle_transport_paused(&mut self) {
        self.transport_paused = true;
        if let Some(active) = self.current.as_ref() {
            active.playback.pause();
        }
        self.is_audio_playing = false;
        self.publish();
    }

    async fn handle_transport_resumed(&mut self) {
        self.transport_paused = false;
        match self.current.as_ref() {
            Some(active) => {
                // Resume mid-line from the paused position, no re-synthesis.
                active.playback.resume();
                self.is_audio_playing = true;
                self.publish();
            }
            None => self.start_next().await,
        }
    }

    fn handle_line_finished(&mut self) {
        if let Some(active) = self.current.take() {
            info!(line = active.line.id, "Line finished playing.");
        }
        self.is_audio_playing = false;
        self.publish();

        // Breathe before the next speaker starts.
        let events_tx = self.events_tx.clone();
        let grace_period = self.options.grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let _ = events_tx.send(Event::GraceElapsed).await;
        });
    }

    async fn handle_grace_elapsed(&mut self) {
        if !self.is_audio_playing && !self.transport_paused {
            self.start_next().await;
        }
    }

    /// Starts the next queued line, skipping lines that cannot be spoken.
    /// Redundant triggers are no-ops while audio is already playing.
    async fn start_next(&mut self) {
        if self.is_audio_playing {
            return;
        }

        while let Some(line) = self.pending.pop_front() {
            let character = match self.catalog.character(&line.character_id) {
                Some(character) => character,
                None => {
                    warn!(
                        line = line.id,
                        character = line.character_id,
                        "Dropping line, character not in catalog."
                    );
                    continue;
                }
            };
            let voice_id = match character.voice_id.as_ref() {
                Some(voice_id) => voice_id.clone(),
                None => {
                    warn!(
                        line = line.id,
                        character = character.id,
                        "Dropping line, character has no voice."
                    );
                    continue;
                }
            };

            // The UI reflects the new speaker before its audio is ready.
            self.is_audio_playing = true;
            self.current = None;
            self.now_playing_tx.send_replace(NowPlaying {
                speaker_id: Some(character.id.clone()),
                line: Some(line.clone()),
                is_audio_playing: true,
                tap: None,
            });

            let clip = match self.synthesizer.synthesize(&line.text, &voice_id).await {
                Ok(clip) => clip,
                Err(e) => {
                    warn!(
                        err = e.to_string(),
                        line = line.id,
                        "Dropping line, synthesis failed."
                    );
                    self.clear_current();
                    continue;
                }
            };

            match self.device.play(clip) {
                Ok(playback) => {
                    let mut done = playback.subscribe();
                    self.now_playing_tx.send_replace(NowPlaying {
                        speaker_id: Some(character.id.clone()),
                        line: Some(line.clone()),
                        is_audio_playing: true,
                        tap: Some(playback.tap()),
                    });
                    self.current = Some(ActiveLine { line, playback });

                    // Waits for natural completion. If the playback is
                    // stopped or discarded on teardown, the subscription
                    // closes and no event fires.
                    let events_tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        if done.wait_for(|done| *done).await.is_ok() {
                            let _ = events_tx.send(Event::LineFinished).await;
                        }
                    });
                    return;
                }
                Err(e) => {
                    warn!(
                        err = e.to_string(),
                        line = line.id,
                        "Dropping line, playback could not start."
                    );
                    self.clear_current();
                    continue;
                }
            }
        }
    }

    fn clear_current(&mut self) {
        self.current = None;
        self.is_audio_playing = false;
        self.publish();
    }

    fn publish(&self) {
        let now_playing = match self.current.as_ref() {
            Some(active) => NowPlaying {
                speaker_id: Some(active.line.character_id.clone()),
                line: Some(active.line.clone()),
                is_audio_playing: self.is_audio_playing,
                tap: Some(active.playback.tap()),
            },
            None => NowPlaying::default(),
        };
        self.now_playing_tx.send_replace(now_playing);
    }
}
