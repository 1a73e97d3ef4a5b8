//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

use crate::params::{AudioParams, RenderParams};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "wavetoy")]
#[command(about = "Audio-reactive ShaderToy-style GLSL viewer", long_about = None)]
pub struct Args {
    /// Fragment shader to render (defaults to the bundled demo)
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Window width in pixels
    #[arg(long, value_name = "PIXELS", default_value = "1280")]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, value_name = "PIXELS", default_value = "720")]
    pub height: u32,

    /// Capture device name substring (overrides loopback detection)
    #[arg(long, value_name = "NAME")]
    pub device: Option<String>,

    /// FFT size, a power of two
    #[arg(long, value_name = "SAMPLES", default_value = "1024")]
    pub fft_size: usize,

    /// Samples per capture chunk
    #[arg(long, value_name = "SAMPLES", default_value = "4096")]
    pub chunk_size: usize,

    /// List audio capture devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

impl Args {
    pub fn shader_path(&self) -> PathBuf {
        self.shader
            .clone()
            .unwrap_or_else(|| PathBuf::from("shaders/spectrum.glsl"))
    }

    pub fn audio_params(&self) -> AudioParams {
        AudioParams {
            fft_size: self.fft_size,
            chunk_size: self.chunk_size,
            ..AudioParams::default()
        }
    }

    pub fn render_params(&self) -> RenderParams {
        RenderParams {
            window_width: self.width,
            window_height: self.height,
        }
    }
}
