//! FFT spectrum analysis tuned for shader visuals.
//!
//! The pipeline turns a raw capture frame into a smoothed, normalized
//! spectrum: Hann window, FFT, log compression, frequency-domain and
//! temporal smoothing, a bass stretch, then adaptive peak
//! normalization. Every stage recovers locally; the render loop must
//! never see an error from here.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Log-compression gain: bins become `ln(1 + mag * LOG_GAIN)`.
pub const LOG_GAIN: f32 = 1000.0;

/// Temporal smoothing factor (0-1, higher = smoother).
pub const SMOOTHING: f32 = 0.8;

/// Per-frame decay of the running peak (closer to 1 = slower decay).
pub const PEAK_DECAY: f32 = 0.995;

/// Floor for the normalization divisor. Signals whose running peak
/// stays below this scale toward zero instead of amplifying noise.
pub const PEAK_FLOOR: f32 = 1e-3;

/// Mean absolute amplitude under which a frame is treated as silence.
pub const SILENCE_FLOOR: f32 = 1e-4;

/// Frequency-domain smoothing kernel width in bins.
const GAUSS_WIDTH: usize = 5;

/// One analyzed frame: normalized spectrum plus scalar descriptors.
#[derive(Debug, Clone)]
pub struct SpectrumFrame {
    /// Smoothed magnitude per bin, each in [0.0, 1.0]; bin 0 = lowest
    /// frequency. Length is always the analyzer's `fft_size`.
    pub bins: Vec<f32>,
    /// Spectral centroid as a fraction of Nyquist (0.0-1.0).
    pub centroid: f32,
    /// RMS amplitude of the raw frame.
    pub rms: f32,
    /// Peak absolute amplitude of the raw frame.
    pub peak: f32,
}

impl SpectrumFrame {
    fn silent(fft_size: usize, rms: f32, peak: f32) -> Self {
        Self {
            bins: vec![0.0; fft_size],
            centroid: 0.0,
            rms,
            peak,
        }
    }
}

/// Mutable analysis history, owned by whoever drives the render loop.
///
/// Created once at startup, updated every `analyze` call, reset only
/// when a new capture session starts.
pub struct AnalyzerState {
    /// Previous smoothed log-spectrum, the base for temporal smoothing.
    prev: Vec<f32>,
    /// Running peak for adaptive normalization (exponential decay).
    running_peak: f32,
}

impl AnalyzerState {
    pub fn new(fft_size: usize) -> Self {
        Self {
            prev: vec![0.0; fft_size],
            running_peak: 0.0,
        }
    }

    /// Forget all history, as if freshly constructed.
    pub fn reset(&mut self) {
        self.prev.fill(0.0);
        self.running_peak = 0.0;
    }
}

/// Immutable analysis machinery: planned FFT, window, kernel.
pub struct SpectrumAnalyzer {
    fft_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    kernel: [f32; GAUSS_WIDTH],
}

impl SpectrumAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        Self {
            fft_size,
            fft,
            window: hann_window(fft_size),
            kernel: gaussian_kernel(),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Analyze one raw frame into a normalized spectrum.
    ///
    /// Stages, in order (visual behavior depends on the ordering):
    /// 1. Hann window over the first `fft_size` samples (zero-padded).
    /// 2. Full complex FFT; magnitudes of all `fft_size` bins. The
    ///    upper half mirrors the lower for real input; only the lower
    ///    half survives the bass stretch below.
    /// 3. Log compression `ln(1 + mag * LOG_GAIN)`.
    /// 4. Width-5 Gaussian smoothing across bins.
    /// 5. Exponential temporal smoothing against the previous output
    ///    (falls back to the current frame on length mismatch).
    /// 6. Bass stretch: the lower half of the bins is linearly
    ///    interpolated across the full output width, so a tone at raw
    ///    bin b peaks near output bin 2b.
    /// 7. Adaptive peak normalization with decaying running peak.
    /// 8. Clamp to [0.0, 1.0].
    ///
    /// Empty and near-silent input short-circuit to a zero frame of
    /// the correct length.
    pub fn analyze(&self, raw: &[f32], state: &mut AnalyzerState) -> SpectrumFrame {
        let n = self.fft_size;

        let (rms, peak) = amplitude_features(raw);
        let mean_abs = if raw.is_empty() {
            0.0
        } else {
            raw.iter().map(|s| s.abs()).sum::<f32>() / raw.len() as f32
        };

        if raw.is_empty() || mean_abs < SILENCE_FLOOR {
            // The zero frame becomes the smoothing base for the next
            // frame, matching the running history contract.
            state.prev.clear();
            state.prev.resize(n, 0.0);
            state.running_peak *= PEAK_DECAY;
            return SpectrumFrame::silent(n, rms, peak);
        }

        // 1-2. Window, pad/truncate to fft_size, transform.
        let mut buf: Vec<Complex<f32>> = (0..n)
            .map(|i| {
                let s = raw.get(i).copied().unwrap_or(0.0);
                Complex::new(s * self.window[i], 0.0)
            })
            .collect();
        self.fft.process(&mut buf);

        let mut spec: Vec<f32> = buf.iter().map(|c| c.norm()).collect();
        let centroid = spectral_centroid(&spec[..n / 2]);

        // 3. Log compression maps the huge dynamic range of raw
        // magnitudes into something visually usable.
        for v in spec.iter_mut() {
            *v = (*v * LOG_GAIN).ln_1p();
        }

        // 4. Suppress bin-to-bin jitter.
        let spec = self.convolve_same(&spec);

        // 5. Temporal smoothing against the previous smoothed
        // spectrum, in the same (log) scale.
        let smoothed: Vec<f32> = if state.prev.len() == spec.len() {
            spec.iter()
                .zip(state.prev.iter())
                .map(|(&cur, &prev)| SMOOTHING * prev + (1.0 - SMOOTHING) * cur)
                .collect()
        } else {
            spec
        };
        state.prev.clear();
        state.prev.extend_from_slice(&smoothed);

        // 6. Perceptual emphasis: most audible energy sits in the
        // lower half of the bin range.
        let stretched = stretch_lower_half(&smoothed);

        // 7. Adaptive peak normalization.
        let cur_peak = stretched.iter().fold(0.0f32, |a, &b| a.max(b));
        state.running_peak = if cur_peak > state.running_peak {
            cur_peak
        } else {
            state.running_peak * PEAK_DECAY
        };
        let divisor = state.running_peak.max(PEAK_FLOOR);

        // 8. Clamp.
        let bins: Vec<f32> = stretched
            .iter()
            .map(|v| (v / divisor).clamp(0.0, 1.0))
            .collect();

        SpectrumFrame {
            bins,
            centroid,
            rms,
            peak,
        }
    }

    /// Zero-padded "same" convolution with the Gaussian kernel.
    fn convolve_same(&self, spec: &[f32]) -> Vec<f32> {
        let half = (GAUSS_WIDTH / 2) as isize;
        (0..spec.len())
            .map(|i| {
                self.kernel
                    .iter()
                    .enumerate()
                    .map(|(k, &w)| {
                        let idx = i as isize + k as isize - half;
                        if idx < 0 || idx >= spec.len() as isize {
                            0.0
                        } else {
                            spec[idx as usize] * w
                        }
                    })
                    .sum()
            })
            .collect()
    }
}

/// RMS and peak absolute amplitude of a raw frame.
fn amplitude_features(raw: &[f32]) -> (f32, f32) {
    if raw.is_empty() {
        return (0.0, 0.0);
    }
    let sum_sq: f32 = raw.iter().map(|s| s * s).sum();
    let rms = (sum_sq / raw.len() as f32).sqrt();
    let peak = raw.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    (rms, peak)
}

/// Spectral centroid over the real half-spectrum, in bin space,
/// normalized by the half width so the result is a fraction of Nyquist.
fn spectral_centroid(half: &[f32]) -> f32 {
    let total: f32 = half.iter().sum();
    if total <= 1e-10 || half.len() < 2 {
        return 0.0;
    }
    let weighted: f32 = half
        .iter()
        .enumerate()
        .map(|(i, &mag)| i as f32 * mag)
        .sum();
    (weighted / total) / (half.len() - 1) as f32
}

/// Linearly interpolate the lower half of `spec` across its full width.
fn stretch_lower_half(spec: &[f32]) -> Vec<f32> {
    let n = spec.len();
    let cutoff = n / 2;
    if cutoff < 2 {
        return spec.to_vec();
    }
    let low = &spec[..cutoff];
    (0..n)
        .map(|j| {
            let pos = j as f32 * (cutoff - 1) as f32 / (n - 1) as f32;
            let i = pos.floor() as usize;
            let frac = pos - i as f32;
            if i + 1 < cutoff {
                low[i] * (1.0 - frac) + low[i + 1] * frac
            } else {
                low[cutoff - 1]
            }
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * PI * i as f32 / (size - 1) as f32).cos()))
        .collect()
}

/// Width-5 Gaussian kernel: exp(-x²/2) sampled at -2..=2, normalized.
fn gaussian_kernel() -> [f32; GAUSS_WIDTH] {
    let mut kernel = [0.0f32; GAUSS_WIDTH];
    for (i, k) in kernel.iter_mut().enumerate() {
        let x = i as f32 - (GAUSS_WIDTH / 2) as f32;
        *k = (-x * x / 2.0).exp();
    }
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFT_SIZE: usize = 1024;
    const SAMPLE_RATE: f32 = 44100.0;

    fn sine(freq: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE).sin())
            .collect()
    }

    fn argmax(values: &[f32]) -> usize {
        values
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_output_length_and_range() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        for input in [
            sine(440.0, 4096, 0.5),
            sine(55.0, 100, 1.0), // shorter than fft_size: zero-padded
            vec![0.9; 4096],
            vec![-1.0; 8192], // longer than fft_size: truncated
        ] {
            let frame = analyzer.analyze(&input, &mut state);
            assert_eq!(frame.bins.len(), FFT_SIZE);
            for &v in &frame.bins {
                assert!((0.0..=1.0).contains(&v), "bin out of range: {}", v);
            }
        }
    }

    #[test]
    fn test_silence_yields_zero_spectrum() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        let frame = analyzer.analyze(&vec![0.0; 4096], &mut state);
        assert_eq!(frame.bins.len(), FFT_SIZE);
        assert!(frame.bins.iter().all(|&v| v == 0.0));
        assert_eq!(frame.rms, 0.0);
        assert_eq!(frame.peak, 0.0);
    }

    #[test]
    fn test_empty_input_is_guarded() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        let frame = analyzer.analyze(&[], &mut state);
        assert_eq!(frame.bins.len(), FFT_SIZE);
        assert!(frame.bins.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_sine_peak_lands_at_stretched_bin() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        // 440 Hz at 44100 Hz / 1024 bins -> raw bin ~10.2. The bass
        // stretch maps raw bin b to output bin ~2b.
        let input = sine(440.0, 4096, 0.5);
        let mut frame = analyzer.analyze(&input, &mut state);
        for _ in 0..4 {
            frame = analyzer.analyze(&input, &mut state);
        }

        let peak_bin = argmax(&frame.bins);
        assert!(
            (18..=22).contains(&peak_bin),
            "expected peak near bin 20, got {}",
            peak_bin
        );

        // Inverse mapping: the peak's raw-bin frequency range contains
        // the tone, within one bin of resolution.
        let raw_bin = peak_bin as f32 / 2.0;
        let bin_hz = SAMPLE_RATE / FFT_SIZE as f32;
        let freq = raw_bin * bin_hz;
        assert!(
            (freq - 440.0).abs() <= 1.5 * bin_hz,
            "peak maps to {} Hz, expected ~440 Hz",
            freq
        );
    }

    #[test]
    fn test_peak_normalizes_to_one() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        let frame = analyzer.analyze(&sine(440.0, 4096, 0.5), &mut state);
        let max = frame.bins.iter().fold(0.0f32, |a, &b| a.max(b));
        assert!((max - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_steady_state_is_idempotent() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);
        let input = sine(440.0, 4096, 0.5);

        let mut prev = analyzer.analyze(&input, &mut state);
        for _ in 0..80 {
            prev = analyzer.analyze(&input, &mut state);
        }
        let last = analyzer.analyze(&input, &mut state);

        let max_diff = prev
            .bins
            .iter()
            .zip(last.bins.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0f32, f32::max);
        assert!(
            max_diff < 0.02,
            "steady-state output still moving by {}",
            max_diff
        );
    }

    #[test]
    fn test_temporal_smoothing_bounds_swings() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        let loud = sine(440.0, 4096, 0.5);
        let quiet = vec![0.0; 4096];

        // Warm up the running peak on loud input.
        for _ in 0..10 {
            analyzer.analyze(&loud, &mut state);
        }

        // Raw input swings the full range; the smoothed output must
        // move more gradually after a silent frame.
        analyzer.analyze(&quiet, &mut state);
        let rebound = analyzer.analyze(&loud, &mut state);
        let max = rebound.bins.iter().fold(0.0f32, |a, &b| a.max(b));
        assert!(
            max < 0.6,
            "output rebounded to {} in one frame; smoothing too weak",
            max
        );
    }

    #[test]
    fn test_quiet_signal_not_amplified_above_floor() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        // Loud enough to pass the silence gate, far too quiet to
        // matter visually: the divisor floor keeps it small-ish
        // rather than blowing it up to full scale.
        let barely = sine(440.0, 4096, 3e-4);
        let frame = analyzer.analyze(&barely, &mut state);
        assert!(frame.bins.iter().all(|&v| v <= 1.0));
    }

    #[test]
    fn test_state_reset_forgets_history() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        analyzer.analyze(&sine(440.0, 4096, 0.5), &mut state);
        state.reset();
        assert_eq!(state.running_peak, 0.0);
        assert!(state.prev.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let analyzer = SpectrumAnalyzer::new(FFT_SIZE);
        let mut state = AnalyzerState::new(FFT_SIZE);

        let low = analyzer.analyze(&sine(200.0, 4096, 0.5), &mut state);
        state.reset();
        let high = analyzer.analyze(&sine(8000.0, 4096, 0.5), &mut state);

        assert!(low.centroid < high.centroid);
        assert!((0.0..=1.0).contains(&low.centroid));
        assert!((0.0..=1.0).contains(&high.centroid));
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel();
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        // Symmetric, peaked at the center.
        assert!((kernel[0] - kernel[4]).abs() < 1e-7);
        assert!(kernel[2] > kernel[1]);
    }

    #[test]
    fn test_hann_window_shape() {
        let window = hann_window(FFT_SIZE);

        // Zero at the edges, one at the center.
        assert!(window[0].abs() < 0.01);
        assert!(window[FFT_SIZE - 1].abs() < 0.01);
        assert!((window[FFT_SIZE / 2] - 1.0).abs() < 0.01);
    }
}
