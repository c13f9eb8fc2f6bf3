use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Minimum least-squares slope magnitude, in energy units per second, for a
/// trend to count as rising or falling rather than stable.
const SLOPE_EPSILON: f32 = 0.05;

/// One frame of analysed audio, delivered by the external feature
/// extractor. All levels are normalised to `[0, 1]`; `timestamp_ms` is
/// expected to be monotonic across a stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatureSample {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    pub energy: f32,
    pub timestamp_ms: u64,
}

/// Qualitative direction of the energy curve over a trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyTrend {
    Rising,
    Falling,
    Stable,
}

/// Time-windowed ring buffer of audio-feature samples.
///
/// Reacting only to the instantaneous sample makes pose changes lag and
/// flicker around energy boundaries; the engine instead reads a short
/// trailing window from this buffer to smooth its decisions and to commit
/// to a transition slightly ahead of a peak.
#[derive(Debug)]
pub struct AudioLookaheadBuffer {
    window_ms: u64,
    max_samples: usize,
    samples: VecDeque<AudioFeatureSample>,
}

impl AudioLookaheadBuffer {
    pub fn new(window_ms: u64, max_samples: usize) -> Self {
        Self {
            window_ms,
            max_samples,
            samples: VecDeque::with_capacity(max_samples.min(1024)),
        }
    }

    /// Appends a sample and evicts anything that has aged out of the
    /// retention window. A timestamp that does not advance past the newest
    /// stored sample is treated as a duplicate and ignored, so a
    /// non-monotonic producer cannot corrupt the trend computation.
    pub fn push(&mut self, sample: AudioFeatureSample) {
        if let Some(newest) = self.samples.back() {
            if sample.timestamp_ms <= newest.timestamp_ms {
                trace!(
                    timestamp_ms = sample.timestamp_ms,
                    newest_ms = newest.timestamp_ms,
                    "ignoring non-monotonic sample"
                );
                return;
            }
        }

        self.samples.push_back(sample);

        let horizon = sample.timestamp_ms.saturating_sub(self.window_ms);
        while let Some(oldest) = self.samples.front() {
            if oldest.timestamp_ms < horizon {
                self.samples.pop_front();
            } else {
                break;
            }
        }
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
    }

    /// Returns up to `n` of the most recent samples, oldest first.
    pub fn history(&self, n: usize) -> Vec<AudioFeatureSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).copied().collect()
    }

    /// Mean energy over the samples no older than `window_ms` relative to
    /// the newest sample. Returns 0.0 when the buffer is empty.
    pub fn average_energy(&self, window_ms: u64) -> f32 {
        let Some(newest) = self.samples.back() else {
            return 0.0;
        };

        let horizon = newest.timestamp_ms.saturating_sub(window_ms);
        let mut sum = 0.0;
        let mut count = 0usize;
        for sample in self.samples.iter().rev() {
            if sample.timestamp_ms < horizon {
                break;
            }
            sum += sample.energy;
            count += 1;
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f32
        }
    }

    /// Classifies the energy trend over the trailing `window_ms` using a
    /// least-squares fit of energy against time. Slopes within
    /// [`SLOPE_EPSILON`] of zero are reported as stable.
    pub fn analyze_future(&self, window_ms: u64) -> EnergyTrend {
        let Some(newest) = self.samples.back() else {
            return EnergyTrend::Stable;
        };

        let horizon = newest.timestamp_ms.saturating_sub(window_ms);
        let origin = horizon;

        let mut n = 0.0_f32;
        let mut sum_t = 0.0_f32;
        let mut sum_e = 0.0_f32;
        let mut sum_te = 0.0_f32;
        let mut sum_tt = 0.0_f32;
        for sample in self.samples.iter().rev() {
            if sample.timestamp_ms < horizon {
                break;
            }
            let t = (sample.timestamp_ms - origin) as f32 / 1_000.0;
            n += 1.0;
            sum_t += t;
            sum_e += sample.energy;
            sum_te += t * sample.energy;
            sum_tt += t * t;
        }

        if n < 2.0 {
            return EnergyTrend::Stable;
        }

        let denominator = n * sum_tt - sum_t * sum_t;
        if denominator.abs() <= f32::EPSILON {
            return EnergyTrend::Stable;
        }

        let slope = (n * sum_te - sum_t * sum_e) / denominator;
        if slope > SLOPE_EPSILON {
            EnergyTrend::Rising
        } else if slope < -SLOPE_EPSILON {
            EnergyTrend::Falling
        } else {
            EnergyTrend::Stable
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drops all retained samples while preserving configuration.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
