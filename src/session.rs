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
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, span, Level};

use crate::audio;
use crate::catalog::Catalog;
use crate::config::{self, ConfigError};
use crate::orchestrator::{Event, NowPlaying, Options, Orchestrator};
use crate::playsync::CancelHandle;
use crate::script::{Script, ScriptError};
use crate::speech;
use crate::timeline::Timeline;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Playback(#[from] audio::PlaybackError),
}

/// A running simulated podcast session. Owns the timeline, its tick driver,
/// and the orchestrator that speaks the script.
pub struct Session {
    timeline: Timeline,
    script: Arc<Script>,
    orchestrator: Orchestrator,
    events_tx: mpsc::Sender<Event>,
    cancel_handle: CancelHandle,
    // The sender stays alive for the session so join() blocks until a
    // driver actually reports completion.
    finished_tx: watch::Sender<bool>,
    finished_rx: watch::Receiver<bool>,
    driver: Option<JoinHandle<()>>,
}

impl Session {
    /// Wires a session from its configuration: loads the catalog, generates
    /// a script, and connects the timeline to the orchestrator.
    pub fn new(config: &config::Session, catalog: Catalog) -> Result<Session, SessionError> {
        let span = span!(Level::INFO, "session");
        let _enter = span.enter();

        let catalog = Arc::new(catalog);
        let characters: Vec<_> = config
            .characters()
            .iter()
            .filter_map(|id| catalog.character(id))
            .collect();
        let topic = catalog
            .topic(config.topic())
            .ok_or_else(|| ConfigError::UnknownTopic(config.topic().to_string()))?;
        let duration_secs = config.duration()?.as_secs() as u32;

        let script = Arc::new(Script::generate(
            &catalog,
            &characters,
            &topic,
            duration_secs,
            &mut rand::thread_rng(),
        )?);
        info!(
            characters = characters.len(),
            topic = topic.id,
            lines = script.lines().len(),
            "Generated script."
        );

        let synthesizer = speech::get_synthesizer(&config.elevenlabs());
        let device = audio::get_device(config.audio_device())?;
        info!(
            synthesizer = synthesizer.to_string(),
            device = device.to_string(),
            "Session ready."
        );

        let orchestrator = Orchestrator::new(
            script.clone(),
            catalog,
            synthesizer,
            device,
            Options {
                due_window_secs: config.due_window()?.as_secs() as u32,
                grace_period: config.grace_period()?,
            },
        );
        let events_tx = orchestrator.events();
        let (finished_tx, finished_rx) = watch::channel(false);

        Ok(Session {
            timeline: Timeline::new(duration_secs),
            script,
            orchestrator,
            events_tx,
            cancel_handle: CancelHandle::new(),
            finished_tx,
            finished_rx,
            driver: None,
        })
    }

    /// The generated script for this session.
    pub fn script(&self) -> &Script {
        &self.script
    }

    /// Subscribes to the active speaker state.
    pub fn now_playing(&self) -> watch::Receiver<NowPlaying> {
        self.orchestrator.now_playing()
    }

    /// The current timeline position in seconds.
    pub fn position(&self) -> u32 {
        self.timeline.position()
    }

    /// The session duration in seconds.
    pub fn duration(&self) -> u32 {
        self.timeline.duration()
    }

    /// Starts the session: the timeline begins playing and a driver task
    /// ticks it once per second, forwarding each new position to the
    /// orchestrator.
    pub fn start(&mut self) {
        self.timeline.play();
        if let Some(driver) = self.driver.as_ref() {
            if !driver.is_finished() {
                return;
            }
        }

        let timeline = self.timeline.clone();
        let events_tx = self.events_tx.clone();
        let cancel_handle = self.cancel_handle.clone();
        let finished_tx = self.finished_tx.clone();
        let _ = finished_tx.send(false);

        self.driver = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                if cancel_handle.is_cancelled() {
                    return;
                }
                if let Some(position) = timeline.tick() {
                    if events_tx.send(Event::Tick(position)).await.is_err() {
                        return;
                    }
                }
                if !timeline.is_playing() && timeline.position() >= timeline.duration() {
                    let _ = finished_tx.send(true);
                    return;
                }
            }
        }));
    }

    /// Pauses the timeline and the active speaker.
    pub async fn pause(&self) {
        self.timeline.pause();
        let _ = self.events_tx.send(Event::TransportPaused).await;
    }

    /// Resumes the timeline and the paused speaker.
    pub async fn resume(&self) {
        self.timeline.play();
        let _ = self.events_tx.send(Event::TransportResumed).await;
    }

    /// Seeks the timeline. Lines already spoken are never replayed. While
    /// the timeline is playing, newly due lines at the target position are
    /// picked up immediately; while paused they wait for the next tick.
    pub async fn seek(&self, position: u32) {
        self.timeline.seek(position);
        if self.timeline.is_playing() {
            let _ = self
                .events_tx
                .send(Event::Tick(self.timeline.position()))
                .await;
        }
    }

    /// Waits for the timeline to run to its end.
    pub async fn join(&mut self) {
        let mut finished_rx = self.finished_rx.clone();
        let _ = finished_rx.wait_for(|finished| *finished).await;
    }

    /// Stops the session: the driver exits, active audio is paused and
    /// detached, and the orchestrator shuts down.
    pub async fn stop(&mut self) {
        self.timeline.pause();
        self.cancel_handle.cancel();
        if let Some(driver) = self.driver.take() {
            driver.abort();
            let _ = driver.await;
        }
        self.orchestrator.shutdown().await;
        info!("Session stopped.");
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use crate::config::parse_session;
    use crate::test::eventually;

    use super::Session;

    fn session_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write");
        file
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_runs_to_completion() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [jesus, chef]
topic: afterlife
duration: 3s
audio_device: mock
elevenlabs:
  backend: mock
"#,
        );
        let (config, catalog) = parse_session(file.path())?;
        let mut session = Session::new(&config, catalog)?;

        // Two lines per character, all inside the first due window.
        assert_eq!(session.script().lines().len(), 4);
        assert_eq!(session.duration(), 3);

        session.start();
        let now_playing = session.now_playing();
        eventually(
            || now_playing.borrow().speaker_id.is_some(),
            "Nobody ever spoke",
        );

        session.join().await;
        assert_eq!(session.position(), 3);

        // All four lines are spoken well before the timeline ends.
        eventually(
            || now_playing.borrow().speaker_id.is_none(),
            "Speaker never went idle",
        );

        session.stop().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_seek_before_start_stays_silent() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [jesus, chef]
topic: afterlife
duration: 1m
audio_device: mock
elevenlabs:
  backend: mock
"#,
        );
        let (config, catalog) = parse_session(file.path())?;
        let mut session = Session::new(&config, catalog)?;

        // A never-started session is paused; seeking into the due window of
        // every line must not start any playback.
        session.seek(5).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let now_playing = session.now_playing().borrow().clone();
        assert!(now_playing.speaker_id.is_none());
        assert!(!now_playing.is_audio_playing);
        assert_eq!(session.position(), 5);

        session.stop().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_join_waits_for_start() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [jesus, chef]
topic: afterlife
duration: 3s
audio_device: mock
elevenlabs:
  backend: mock
"#,
        );
        let (config, catalog) = parse_session(file.path())?;
        let mut session = Session::new(&config, catalog)?;

        // Before the driver exists there is nothing to wait for yet, but
        // join must block rather than report a finished session.
        assert!(tokio::time::timeout(
            std::time::Duration::from_millis(200),
            session.join()
        )
        .await
        .is_err());

        session.start();
        session.join().await;
        assert_eq!(session.position(), 3);

        session.stop().await;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_stops_ticking() -> Result<(), Box<dyn std::error::Error>> {
        let file = session_file(
            r#"
characters: [jesus, chef]
topic: afterlife
duration: 1m
audio_device: mock
elevenlabs:
  backend: mock
"#,
        );
        let (config, catalog) = parse_session(file.path())?;
        let mut session = Session::new(&config, catalog)?;

        session.start();
        eventually(|| session.position() >= 1, "Timeline never advanced");

        session.pause().await;
        let paused_at = session.position();
        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert_eq!(session.position(), paused_at);

        session.resume().await;
        eventually(|| session.position() > paused_at, "Timeline never resumed");

        session.stop().await;
        Ok(())
    }
}
