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
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, span, Level};

use crate::playsync::CancelHandle;
use crate::speech::AudioClip;
use crate::viz::SignalTap;

use super::{Playback, PlaybackError};

const DEFAULT_CLIP_DURATION: Duration = Duration::from_millis(50);
const TICK: Duration = Duration::from_millis(2);

/// A mock device. Doesn't actually play anything; it counts down the clip's
/// duration hint, honoring pause and stop, and feeds the signal tap with a
/// synthetic ramp.
#[derive(Clone)]
pub struct Device {
    name: String,
    is_playing: Arc<AtomicBool>,
    play_count: Arc<AtomicUsize>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            is_playing: Arc::new(AtomicBool::new(false)),
            play_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns true if the device is currently playing.
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::Relaxed)
    }

    /// The number of clips this device has started playing.
    pub fn play_count(&self) -> usize {
        self.play_count.load(Ordering::Relaxed)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

impl super::Device for Device {
    fn play(&self, clip: AudioClip) -> Result<Box<dyn Playback>, PlaybackError> {
        let span = span!(Level::INFO, "play clip (mock)");
        let _enter = span.enter();

        let duration = clip.duration.unwrap_or(DEFAULT_CLIP_DURATION);
        info!(
            device = self.name,
            duration = format!("{:?}", duration),
            "Playing clip."
        );

        self.play_count.fetch_add(1, Ordering::Relaxed);
        self.is_playing.store(true, Ordering::Relaxed);

        let state = Arc::new(Mutex::new(State {
            paused: false,
            elapsed: Duration::ZERO,
        }));
        let cancel_handle = CancelHandle::new();
        let tap = SignalTap::new();
        let (done_tx, done_rx) = watch::channel(false);

        {
            let state = state.clone();
            let cancel_handle = cancel_handle.clone();
            let tap = tap.clone();
            let is_playing = self.is_playing.clone();
            thread::spawn(move || {
                let mut ramp = 0u32;
                loop {
                    if cancel_handle.is_cancelled() {
                        // Stopped: close the channel without completing.
                        is_playing.store(false, Ordering::Relaxed);
                        return;
                    }

                    {
                        let mut state = state.lock();
                        if !state.paused {
                            state.elapsed += TICK;
                            tap.push((ramp % 100) as f32 / 100.0);
                            ramp += 1;
                            if state.elapsed >= duration {
                                break;
                            }
                        }
                    }
                    thread::sleep(TICK);
                }

                is_playing.store(false, Ordering::Relaxed);
                let _ = done_tx.send(true);
            });
        }

        Ok(Box::new(MockPlayback {
            state,
            cancel_handle,
            tap,
            done_rx,
        }))
    }
}

struct State {
    paused: bool,
    elapsed: Duration,
}

struct MockPlayback {
    state: Arc<Mutex<State>>,
    cancel_handle: CancelHandle,
    tap: SignalTap,
    done_rx: watch::Receiver<bool>,
}

impl Playback for MockPlayback {
    fn pause(&self) {
        self.state.lock().paused = true;
    }

    fn resume(&self) {
        self.state.lock().paused = false;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn position(&self) -> Duration {
        self.state.lock().elapsed
    }

    fn stop(&self) {
        self.cancel_handle.cancel();
    }

    fn tap(&self) -> SignalTap {
        self.tap.clone()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use bytes::Bytes;

    use crate::audio::Device as _;
    use crate::speech::AudioClip;
    use crate::test::eventually;

    use super::Device;

    fn clip(duration: Duration) -> AudioClip {
        AudioClip {
            bytes: Bytes::from_static(b"clip"),
            duration: Some(duration),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_play_to_completion() -> Result<(), Box<dyn std::error::Error>> {
        let device = Device::get("mock-device");
        let playback = device.play(clip(Duration::from_millis(20)))?;

        assert!(device.is_playing());
        assert_eq!(device.play_count(), 1);

        let mut done = playback.subscribe();
        done.wait_for(|done| *done).await?;
        assert!(!device.is_playing());

        // The tap received synthetic samples while playing.
        assert!(!playback.tap().window().is_empty());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_pause_holds_position() -> Result<(), Box<dyn std::error::Error>> {
        let device = Device::get("mock-device");
        let playback = device.play(clip(Duration::from_millis(500)))?;

        eventually(
            || playback.position() >= Duration::from_millis(10),
            "Playback never advanced",
        );

        playback.pause();
        assert!(playback.is_paused());
        let paused_at = playback.position();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(playback.position(), paused_at);
        assert!(device.is_playing());

        playback.resume();
        assert!(!playback.is_paused());
        eventually(
            || playback.position() > paused_at,
            "Playback never resumed",
        );

        let mut done = playback.subscribe();
        done.wait_for(|done| *done).await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_closes_subscription_without_completing() {
        let device = Device::get("mock-device");
        let playback = device
            .play(clip(Duration::from_millis(500)))
            .expect("expected playback");

        let mut done = playback.subscribe();
        playback.stop();

        // The channel closes without ever reporting completion.
        assert!(done.wait_for(|done| *done).await.is_err());
        eventually(|| !device.is_playing(), "Device never stopped");
    }
}
