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
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// The FFT size used for the live spectrum. Matches an analyser window of
/// 256 samples with 128 usable frequency bins.
pub const FFT_SIZE: usize = 256;

/// The number of amplitude bars in a live frame. Only the first quarter of
/// the frequency bins carry interesting speech energy, so the bars fold that
/// quarter of the spectrum.
pub const DEFAULT_BAR_COUNT: usize = 32;

/// The number of bars in the static idle placeholder frame.
pub const PLACEHOLDER_BAR_COUNT: usize = 5;

/// A live tap on the audio signal of the currently playing resource. The
/// playback source pushes decoded samples in; the visualizer reads the most
/// recent window out. Dropping every clone releases the tap, so no analysis
/// state outlives its audio resource.
#[derive(Clone)]
pub struct SignalTap {
    samples: Arc<Mutex<VecDeque<f32>>>,
}

impl SignalTap {
    /// Creates a tap holding at most one FFT window of samples.
    pub fn new() -> SignalTap {
        SignalTap {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(FFT_SIZE))),
        }
    }

    /// Pushes one sample, discarding the oldest once the window is full.
    pub fn push(&self, sample: f32) {
        let mut samples = self.samples.lock();
        if samples.len() == FFT_SIZE {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    /// Copies out the current window, oldest sample first.
    pub fn window(&self) -> Vec<f32> {
        self.samples.lock().iter().copied().collect()
    }
}

impl Default for SignalTap {
    fn default() -> SignalTap {
        SignalTap::new()
    }
}

/// Produces amplitude-bar frames from a signal tap while audio is playing,
/// and a static randomized placeholder frame when nothing is.
pub struct Visualizer {
    bar_count: usize,
    fft: Arc<dyn Fft<f32>>,
}

impl Visualizer {
    /// Creates a visualizer with the given number of live bars.
    pub fn new(bar_count: usize) -> Visualizer {
        Visualizer {
            bar_count,
            fft: FftPlanner::new().plan_fft_forward(FFT_SIZE),
        }
    }

    /// Produces one live frame from the tap: Hann-windowed FFT over the most
    /// recent samples, first quarter of the frequency bins folded into
    /// `bar_count` bars, each normalized to `[0, 1]`.
    pub fn frame(&self, tap: &SignalTap) -> Vec<f32> {
        let samples = tap.window();

        let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let sample = samples.get(i).copied().unwrap_or(0.0);
                Complex::new(sample * hann(i, FFT_SIZE), 0.0)
            })
            .collect();
        self.fft.process(&mut buffer);

        // Only the first quarter of the usable bins, per the original
        // analyser rendering.
        let bins = FFT_SIZE / 2 / 4;
        let magnitudes: Vec<f32> = buffer[..bins].iter().map(|c| c.norm()).collect();

        // Fold the bins into bars by averaging, normalized against half the
        // window size (the peak magnitude of a full-scale sine).
        let scale = FFT_SIZE as f32 / 2.0;
        let chunk = (bins / self.bar_count).max(1);
        magnitudes
            .chunks(chunk)
            .take(self.bar_count)
            .map(|bin_chunk| {
                let sum: f32 = bin_chunk.iter().sum();
                (sum / bin_chunk.len() as f32 / scale).min(1.0)
            })
            .collect()
    }

    /// Produces the static idle frame: a fixed number of randomized bars
    /// between one third and two thirds of full scale.
    pub fn placeholder<R: Rng>(rng: &mut R) -> Vec<f32> {
        (0..PLACEHOLDER_BAR_COUNT)
            .map(|_| rng.gen_range(1.0 / 3.0..2.0 / 3.0))
            .collect()
    }
}

fn hann(i: usize, len: usize) -> f32 {
    let phase = 2.0 * std::f32::consts::PI * i as f32 / len as f32;
    0.5 * (1.0 - phase.cos())
}

#[cfg(test)]
mod test {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{SignalTap, Visualizer, DEFAULT_BAR_COUNT, FFT_SIZE, PLACEHOLDER_BAR_COUNT};

    #[test]
    fn test_tap_keeps_most_recent_window() {
        let tap = SignalTap::new();
        for i in 0..(FFT_SIZE + 10) {
            tap.push(i as f32);
        }

        let window = tap.window();
        assert_eq!(window.len(), FFT_SIZE);
        assert_eq!(window[0], 10.0);
        assert_eq!(*window.last().expect("expected samples"), (FFT_SIZE + 9) as f32);
    }

    #[test]
    fn test_frame_of_silence_is_flat() {
        let visualizer = Visualizer::new(DEFAULT_BAR_COUNT);
        let tap = SignalTap::new();

        let frame = visualizer.frame(&tap);
        assert_eq!(frame.len(), DEFAULT_BAR_COUNT);
        assert!(frame.iter().all(|bar| *bar == 0.0));
    }

    #[test]
    fn test_frame_reacts_to_signal() {
        let visualizer = Visualizer::new(DEFAULT_BAR_COUNT);
        let tap = SignalTap::new();

        // A low-frequency sine: two cycles across the window.
        for i in 0..FFT_SIZE {
            let phase = 2.0 * std::f32::consts::PI * 2.0 * i as f32 / FFT_SIZE as f32;
            tap.push(phase.sin());
        }

        let frame = visualizer.frame(&tap);
        assert_eq!(frame.len(), DEFAULT_BAR_COUNT);
        // Energy concentrates in the lowest bars.
        let peak = frame
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .expect("expected bars");
        assert!(peak.0 < 4, "peak bar {} should be near the bottom", peak.0);
        assert!(*peak.1 > 0.1);
        assert!(frame.iter().all(|bar| (0.0..=1.0).contains(bar)));
    }

    #[test]
    fn test_placeholder_bars() {
        let mut rng = StdRng::seed_from_u64(7);
        let frame = Visualizer::placeholder(&mut rng);

        assert_eq!(frame.len(), PLACEHOLDER_BAR_COUNT);
        for bar in frame {
            assert!((1.0 / 3.0..2.0 / 3.0).contains(&bar));
        }
    }
}
