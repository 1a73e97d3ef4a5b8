//! Parameter definitions with physical units and documented semantics.

/// Audio capture and analysis configuration.
#[derive(Debug, Clone)]
pub struct AudioParams {
    /// Preferred capture sample rate (Hz). The device's negotiated rate
    /// wins when it differs; 44100 matches most loopback devices.
    pub sample_rate_hz: u32,

    /// Samples per published raw frame. Every frame handed to the
    /// analyzer has exactly this length.
    pub chunk_size: usize,

    /// FFT window size and spectrum length (must be a power of 2).
    pub fft_size: usize,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44100,
            chunk_size: 4096,
            fft_size: 1024,
        }
    }
}

impl AudioParams {
    /// Width of one FFT bin in Hz.
    pub fn bin_hz(&self) -> f32 {
        self.sample_rate_hz as f32 / self.fft_size as f32
    }

    /// Convert frequency (Hz) to FFT bin index.
    pub fn hz_to_bin(&self, hz: f32) -> usize {
        ((hz * self.fft_size as f32) / self.sample_rate_hz as f32) as usize
    }

    /// Validate configuration (FFT size must be a power of 2, etc.)
    pub fn validate(&self) -> Result<(), String> {
        if self.fft_size == 0 || !self.fft_size.is_power_of_two() {
            return Err(format!(
                "fft_size must be a power of 2, got {}",
                self.fft_size
            ));
        }
        if self.chunk_size == 0 {
            return Err("chunk_size must be non-zero".to_string());
        }
        if self.sample_rate_hz == 0 {
            return Err("sample_rate_hz must be non-zero".to_string());
        }
        Ok(())
    }
}

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Initial window width (pixels)
    pub window_width: u32,

    /// Initial window height (pixels)
    pub window_height: u32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hz_to_bin() {
        let params = AudioParams::default();

        // At 44100 Hz sample rate and 1024 FFT size:
        // Bin resolution = 44100 / 1024 ≈ 43.07 Hz per bin
        assert_eq!(params.hz_to_bin(0.0), 0);
        assert_eq!(params.hz_to_bin(43.07), 1);
        assert_eq!(params.hz_to_bin(440.0), 10);
    }

    #[test]
    fn test_bin_hz() {
        let params = AudioParams::default();
        assert!((params.bin_hz() - 43.066).abs() < 0.01);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(AudioParams::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_power_of_two_fft() {
        let params = AudioParams {
            fft_size: 1000,
            ..AudioParams::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_chunk() {
        let params = AudioParams {
            chunk_size: 0,
            ..AudioParams::default()
        };
        assert!(params.validate().is_err());
    }
}
