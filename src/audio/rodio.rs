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
use std::io::Cursor;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::thread;
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tokio::sync::watch;
use tracing::{info, span, Level};

use crate::speech::AudioClip;
use crate::viz::SignalTap;

use super::{Playback, PlaybackError};

/// The default audio output. Clips are decoded with rodio and mixed onto the
/// system's default output stream.
pub struct Output {
    handle: OutputStreamHandle,
}

impl Output {
    /// Opens the default audio output. The output stream itself is parked on
    /// a dedicated thread for the lifetime of the process, since it cannot be
    /// sent across threads.
    pub fn get() -> Result<Output, PlaybackError> {
        let (tx, rx) = mpsc::channel();

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let span = span!(Level::INFO, "audio output");
                let _enter = span.enter();

                match OutputStream::try_default() {
                    Ok((stream, handle)) => {
                        if tx.send(Ok(handle)).is_err() {
                            return;
                        }
                        info!("Audio output opened.");
                        // The stream must outlive every sink attached to it.
                        let _stream = stream;
                        loop {
                            thread::park();
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(PlaybackError::NoDevice(e.to_string())));
                    }
                }
            })
            .map_err(|e| PlaybackError::NoDevice(e.to_string()))?;

        rx.recv()
            .map_err(|e| PlaybackError::NoDevice(e.to_string()))?
            .map(|handle| Output { handle })
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "default output (rodio)")
    }
}

impl super::Device for Output {
    fn play(&self, clip: AudioClip) -> Result<Box<dyn Playback>, PlaybackError> {
        let decoder = Decoder::new(Cursor::new(clip.bytes))
            .map_err(|e| PlaybackError::PlaybackStartFailed(e.to_string()))?;

        let tap = SignalTap::new();
        let source = Tapped {
            inner: decoder.convert_samples::<f32>(),
            tap: tap.clone(),
        };

        let sink = Sink::try_new(&self.handle)
            .map_err(|e| PlaybackError::PlaybackStartFailed(e.to_string()))?;
        sink.append(source);
        let sink = Arc::new(sink);

        let stopped = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = watch::channel(false);

        // Completion watcher. If the playback was stopped rather than
        // drained, the channel closes without reporting completion.
        {
            let sink = sink.clone();
            let stopped = stopped.clone();
            thread::spawn(move || {
                sink.sleep_until_end();
                if !stopped.load(Ordering::Relaxed) {
                    let _ = done_tx.send(true);
                }
            });
        }

        Ok(Box::new(SinkPlayback {
            sink,
            tap,
            stopped,
            done_rx,
        }))
    }
}

/// The transport handle over a rodio sink.
struct SinkPlayback {
    sink: Arc<Sink>,
    tap: SignalTap,
    stopped: Arc<AtomicBool>,
    done_rx: watch::Receiver<bool>,
}

impl Playback for SinkPlayback {
    fn pause(&self) {
        self.sink.pause();
    }

    fn resume(&self) {
        self.sink.play();
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.sink.stop();
    }

    fn tap(&self) -> SignalTap {
        self.tap.clone()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.done_rx.clone()
    }
}

/// A source wrapper that copies every sample into the signal tap on its way
/// to the mixer.
struct Tapped<S> {
    inner: S,
    tap: SignalTap,
}

impl<S> Iterator for Tapped<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next();
        if let Some(sample) = sample {
            self.tap.push(sample);
        }
        sample
    }
}

impl<S> Source for Tapped<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
