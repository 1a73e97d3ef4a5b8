//! Wavetoy - renders audio-reactive GLSL shaders in real time.
//!
//! A capture thread listens to system audio (loopback where the
//! platform exposes one); each frame the render loop turns the latest
//! chunk into a normalized spectrum and feeds it to the current shader
//! as `iChannel0`, alongside the usual ShaderToy uniform set.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, Result};
use chrono::{Datelike, Timelike};
use clap::Parser;
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, WindowEvent},
    event_loop::EventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::WindowId,
};

use wavetoy::audio::{capture, AnalyzerState, CaptureSource, FrameSlot, SpectrumAnalyzer};
use wavetoy::cli::Args;
use wavetoy::params::{AudioParams, RenderParams};
use wavetoy::render::{pack_spectrum, GlContext, ProgramManager, UniformSet};

/// Frames between capture diagnostics at debug level.
const DIAG_INTERVAL: i32 = 120;

/// Main application state
struct App {
    shader_path: PathBuf,
    render_params: RenderParams,

    // GPU side, created once the event loop provides a window
    gfx: Option<GlContext>,
    manager: ProgramManager,
    uniforms: UniformSet,

    // Audio side
    capture: CaptureSource,
    frames: Arc<FrameSlot>,
    analyzer: SpectrumAnalyzer,
    state: AnalyzerState,
    scratch: Vec<f32>,
    capture_loss_logged: bool,

    // Time tracking
    start_time: Instant,
    last_frame: Instant,
    frame_rate: f32,

    // Mouse state (ShaderToy convention)
    cursor: (f32, f32),
    mouse_down: bool,
}

impl App {
    fn new(args: &Args, audio_params: AudioParams) -> Self {
        let capture = CaptureSource::new(audio_params.clone(), args.device.clone());
        let frames = capture.frames();
        let analyzer = SpectrumAnalyzer::new(audio_params.fft_size);
        let state = AnalyzerState::new(audio_params.fft_size);

        Self {
            shader_path: args.shader_path(),
            render_params: args.render_params(),
            gfx: None,
            manager: ProgramManager::new(),
            uniforms: UniformSet::new(audio_params.sample_rate_hz as f32),
            capture,
            frames,
            analyzer,
            state,
            scratch: Vec::with_capacity(audio_params.chunk_size),
            capture_loss_logged: false,
            start_time: Instant::now(),
            last_frame: Instant::now(),
            frame_rate: 0.0,
            cursor: (0.0, 0.0),
            mouse_down: false,
        }
    }

    /// Render a single frame
    fn render_frame(&mut self) {
        let Some(gfx) = &self.gfx else {
            return;
        };

        // Time-based uniforms
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().max(1e-6);
        self.last_frame = now;
        self.uniforms.time = (now - self.start_time).as_secs_f32();
        self.uniforms.time_delta = dt;
        self.frame_rate = if self.uniforms.frame == 0 {
            1.0 / dt
        } else {
            0.9 * self.frame_rate + 0.1 / dt
        };
        self.uniforms.frame_rate = self.frame_rate;

        let size = gfx.window.inner_size();
        self.uniforms.resolution = [size.width as f32, size.height as f32, 0.0];

        let date = chrono::Local::now();
        self.uniforms.date = [
            date.year() as f32,
            date.month0() as f32,
            date.day() as f32,
            date.num_seconds_from_midnight() as f32,
        ];

        // Pull the latest raw frame and analyze it. The analyzer never
        // fails; a dead capture thread just means a stale/zero frame.
        self.frames.snapshot_into(&mut self.scratch);
        let frame = self.analyzer.analyze(&self.scratch, &mut self.state);

        if self.capture.failed() && !self.capture_loss_logged {
            log::error!("audio capture stopped; continuing with a frozen spectrum");
            self.capture_loss_logged = true;
        }
        if self.uniforms.frame % DIAG_INTERVAL == 0 {
            log::debug!(
                "frame={} spectrum_peak={:.4} raw_peak={:.4} rms={:.4}",
                self.uniforms.frame,
                frame.bins.iter().fold(0.0f32, |a, &b| a.max(b)),
                frame.peak,
                frame.rms
            );
        }

        self.uniforms.update_channel_data(0, pack_spectrum(&frame));

        // A broken or missing shader still clears to visible black.
        gfx.clear();
        if let Some(program) = self.manager.current() {
            program.update_uniforms(&gfx.gl, &mut self.uniforms);
            gfx.draw_fullscreen();
        }
        self.uniforms.frame += 1;

        gfx.swap();
    }

    fn reload_shader(&mut self) {
        let Some(gfx) = &self.gfx else {
            return;
        };
        match self.manager.reload(&gfx.gl) {
            Ok(()) => log::info!("shader reloaded: {}", self.shader_path.display()),
            Err(e) => log::warn!("shader reload failed, keeping previous program: {e}"),
        }
    }

    fn update_mouse(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                // ShaderToy uses a bottom-left origin.
                let height = self.uniforms.resolution[1];
                self.cursor = (position.x as f32, height - position.y as f32);
                if self.mouse_down {
                    self.uniforms.mouse[0] = self.cursor.0;
                    self.uniforms.mouse[1] = self.cursor.1;
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => {
                    self.mouse_down = true;
                    self.uniforms.mouse = [self.cursor.0, self.cursor.1, self.cursor.0, self.cursor.1];
                }
                ElementState::Released => {
                    self.mouse_down = false;
                    self.uniforms.mouse[2] = -self.uniforms.mouse[2].abs();
                    self.uniforms.mouse[3] = -self.uniforms.mouse[3].abs();
                }
            },
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        if let Some(gfx) = &self.gfx {
            gfx.window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &winit::event_loop::ActiveEventLoop) {
        if self.gfx.is_some() {
            return; // Already initialized
        }

        let gfx = GlContext::new(event_loop, &self.render_params, "wavetoy")
            .expect("failed to initialize OpenGL context");

        // Shader failures are not fatal: the loop renders black and
        // the log carries the compiler output.
        if let Err(e) = self.manager.load_file(&gfx.gl, &self.shader_path) {
            log::error!("failed to load {}: {e}", self.shader_path.display());
        }

        // Audio spectrum texture on iChannel0.
        self.uniforms
            .setup_channel(&gfx.gl, 0, self.analyzer.fft_size(), 1);

        // A machine without a capture device still gets visuals, just
        // with a flat spectrum.
        match self.capture.start() {
            Ok(()) => {
                if let Some(rate) = self.capture.sample_rate() {
                    self.uniforms.sample_rate = rate as f32;
                }
            }
            Err(e) => log::warn!("audio capture unavailable: {e}"),
        }

        self.gfx = Some(gfx);
        self.start_time = Instant::now();
        self.last_frame = self.start_time;
    }

    fn window_event(
        &mut self,
        event_loop: &winit::event_loop::ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match &event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => event_loop.exit(),
                KeyCode::KeyR => self.reload_shader(),
                _ => {}
            },
            WindowEvent::Resized(size) => {
                if let Some(gfx) = &self.gfx {
                    gfx.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => self.update_mouse(&event),
        }
    }

    fn exiting(&mut self, _event_loop: &winit::event_loop::ActiveEventLoop) {
        self.capture.stop();
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();

    if args.list_devices {
        let devices = capture::list_devices()?;
        if devices.is_empty() {
            println!("No audio capture devices found.");
        }
        for device in devices {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{}", device.name, marker);
        }
        return Ok(());
    }

    let audio_params = args.audio_params();
    audio_params
        .validate()
        .map_err(|e| anyhow!("invalid audio configuration: {e}"))?;

    log::info!(
        "fft_size={} chunk_size={} shader={}",
        audio_params.fft_size,
        audio_params.chunk_size,
        args.shader_path().display()
    );

    let mut app = App::new(&args, audio_params);
    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;

    app.capture.stop();
    Ok(())
}
