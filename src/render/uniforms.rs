//! ShaderToy uniform set and the spectrum-to-texture bridge.

use glow::HasContext;

use crate::audio::SpectrumFrame;

/// Number of sampler slots exposed to shaders (`iChannel0..3`).
pub const CHANNEL_COUNT: usize = 4;

/// CPU-side texel data awaiting upload. One or four f32 components
/// per texel; the uploader picks `R32F` or `RGBA32F` accordingly.
#[derive(Debug, Clone)]
pub struct ChannelData {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<f32>,
}

impl ChannelData {
    /// Components per texel (1 or 4), derived from the data shape.
    pub fn components(&self) -> usize {
        let texels = self.width.max(1) * self.height.max(1);
        self.pixels.len() / texels
    }
}

/// One logical input slot: texture handle, declared resolution, and
/// the most recent CPU-side buffer awaiting upload.
#[derive(Debug, Default)]
pub struct TextureChannel {
    pub texture: Option<glow::NativeTexture>,
    pub resolution: [f32; 3],
    pub data: Option<ChannelData>,
}

/// The complete per-frame uniform snapshot, refreshed by the render
/// loop and consumed once per draw.
#[derive(Debug)]
pub struct UniformSet {
    /// Viewport size in pixels (z unused, kept for ShaderToy parity).
    pub resolution: [f32; 3],
    /// Seconds since startup.
    pub time: f32,
    /// Seconds since the previous frame.
    pub time_delta: f32,
    /// Smoothed frames per second.
    pub frame_rate: f32,
    /// Frame counter.
    pub frame: i32,
    /// xy = cursor while the left button is held, zw = press origin
    /// (negated after release).
    pub mouse: [f32; 4],
    /// (year, month0, day, seconds since midnight).
    pub date: [f32; 4],
    /// Capture sample rate in Hz.
    pub sample_rate: f32,
    pub channels: [TextureChannel; CHANNEL_COUNT],
}

impl UniformSet {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            resolution: [0.0, 0.0, 0.0],
            time: 0.0,
            time_delta: 0.0,
            frame_rate: 0.0,
            frame: 0,
            mouse: [0.0; 4],
            date: [0.0; 4],
            sample_rate,
            channels: Default::default(),
        }
    }

    /// Create the GL texture backing a channel slot and record its
    /// declared resolution. Only valid once a GL context exists; the
    /// caller manages that lifecycle. Misuse (bad slot, allocation
    /// failure) logs and no-ops rather than crashing.
    pub fn setup_channel(&mut self, gl: &glow::Context, slot: usize, width: usize, height: usize) {
        let Some(channel) = self.channels.get_mut(slot) else {
            log::warn!("setup_channel: slot {slot} out of range, ignoring");
            return;
        };

        let texture = unsafe {
            match gl.create_texture() {
                Ok(tex) => tex,
                Err(e) => {
                    log::warn!("setup_channel: texture allocation failed: {e}");
                    return;
                }
            }
        };

        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                glow::LINEAR as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.bind_texture(glow::TEXTURE_2D, None);
        }

        channel.texture = Some(texture);
        channel.resolution = [width as f32, height as f32, 0.0];
        channel.data = None;
    }

    /// Replace a channel's pending CPU buffer. No GL work happens
    /// here; upload is deferred to the draw step.
    pub fn update_channel_data(&mut self, slot: usize, data: ChannelData) {
        let Some(channel) = self.channels.get_mut(slot) else {
            log::warn!("update_channel_data: slot {slot} out of range, ignoring");
            return;
        };
        channel.data = Some(data);
    }
}

/// Pack an analyzed frame into a 1×N RGBA buffer: R carries the bin
/// magnitude, and every texel repeats the global descriptors in GBA
/// (G = spectral centroid, B = RMS, A = raw peak), so a single fetch
/// yields both the bin value and the frame-level features.
pub fn pack_spectrum(frame: &SpectrumFrame) -> ChannelData {
    let width = frame.bins.len();
    let mut pixels = Vec::with_capacity(width * 4);
    for &bin in &frame.bins {
        pixels.push(bin);
        pixels.push(frame.centroid);
        pixels.push(frame.rms);
        pixels.push(frame.peak);
    }
    ChannelData {
        width,
        height: 1,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(bins: Vec<f32>) -> SpectrumFrame {
        SpectrumFrame {
            bins,
            centroid: 0.25,
            rms: 0.5,
            peak: 0.75,
        }
    }

    #[test]
    fn test_pack_spectrum_shape() {
        let data = pack_spectrum(&frame(vec![0.0; 1024]));
        assert_eq!(data.width, 1024);
        assert_eq!(data.height, 1);
        assert_eq!(data.pixels.len(), 1024 * 4);
        assert_eq!(data.components(), 4);
    }

    #[test]
    fn test_pack_spectrum_layout() {
        let data = pack_spectrum(&frame(vec![0.1, 0.9]));
        // First texel: bin value plus the three descriptors.
        assert_eq!(&data.pixels[..4], &[0.1, 0.25, 0.5, 0.75]);
        // Second texel repeats the descriptors with its own bin.
        assert_eq!(&data.pixels[4..], &[0.9, 0.25, 0.5, 0.75]);
    }

    #[test]
    fn test_components_single_channel() {
        let data = ChannelData {
            width: 8,
            height: 1,
            pixels: vec![0.0; 8],
        };
        assert_eq!(data.components(), 1);
    }

    #[test]
    fn test_update_channel_data_out_of_range_is_noop() {
        let mut set = UniformSet::new(44100.0);
        set.update_channel_data(CHANNEL_COUNT, pack_spectrum(&frame(vec![0.0; 4])));
        assert!(set.channels.iter().all(|c| c.data.is_none()));
    }

    #[test]
    fn test_update_channel_data_replaces_pending() {
        let mut set = UniformSet::new(44100.0);
        set.update_channel_data(0, pack_spectrum(&frame(vec![0.1])));
        set.update_channel_data(0, pack_spectrum(&frame(vec![0.9])));
        let pending = set.channels[0].data.as_ref().unwrap();
        assert_eq!(pending.pixels[0], 0.9);
    }
}
