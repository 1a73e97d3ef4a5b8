//! Window and OpenGL context setup (winit + glutin + glow).

use std::ffi::CString;
use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use glow::HasContext;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, PossiblyCurrentContext, Version};
use glutin::display::GetGlDisplay;
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::DisplayBuilder;
use raw_window_handle::HasWindowHandle;
use winit::dpi::LogicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::params::RenderParams;

/// The render thread's exclusive GPU state: window, GL surface and
/// context, glow bindings, and the VAO for the attribute-less
/// fullscreen triangle.
pub struct GlContext {
    // Field order is drop order: surface and context go before the
    // window whose handle they were built from.
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
    pub gl: glow::Context,
    vao: glow::NativeVertexArray,
    pub window: Arc<Window>,
}

impl GlContext {
    /// Create the window and an OpenGL 3.3 core context on it.
    pub fn new(event_loop: &ActiveEventLoop, params: &RenderParams, title: &str) -> Result<Self> {
        let window_attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(LogicalSize::new(params.window_width, params.window_height));

        let template = ConfigTemplateBuilder::new().with_alpha_size(8);
        let display_builder = DisplayBuilder::new().with_window_attributes(Some(window_attributes));

        let (window, gl_config) = display_builder
            .build(event_loop, template, |configs| {
                configs
                    .reduce(|a, b| if a.num_samples() > b.num_samples() { a } else { b })
                    .unwrap()
            })
            .map_err(|e| anyhow!("failed to build GL display: {e}"))?;
        let window = Arc::new(window.ok_or_else(|| anyhow!("no window created"))?);

        let raw_window_handle = window
            .window_handle()
            .context("failed to acquire window handle")?
            .as_raw();
        let gl_display = gl_config.display();

        let context_attributes = ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(raw_window_handle));

        let not_current = unsafe {
            gl_display
                .create_context(&gl_config, &context_attributes)
                .context("failed to create GL context")?
        };

        let size = window.inner_size();
        let attrs = SurfaceAttributesBuilder::<WindowSurface>::new().build(
            raw_window_handle,
            NonZeroU32::new(size.width.max(1)).unwrap(),
            NonZeroU32::new(size.height.max(1)).unwrap(),
        );
        let surface = unsafe {
            gl_display
                .create_window_surface(&gl_config, &attrs)
                .context("failed to create window surface")?
        };

        let context = not_current
            .make_current(&surface)
            .context("failed to make GL context current")?;

        // Vsync paces the render loop at the display rate (~60 Hz);
        // not every driver supports it, so failure is non-fatal.
        if surface
            .set_swap_interval(&context, SwapInterval::Wait(NonZeroU32::new(1).unwrap()))
            .is_err()
        {
            log::warn!("vsync unavailable; frame pacing falls back to the display driver");
        }

        let gl = unsafe {
            glow::Context::from_loader_function(|s| {
                gl_display.get_proc_address(&CString::new(s).unwrap()) as *const _
            })
        };

        let vao = unsafe {
            gl.create_vertex_array()
                .map_err(|e| anyhow!("failed to create vertex array: {e}"))?
        };

        log::info!(
            "OpenGL initialized: {}",
            unsafe { gl.get_parameter_string(glow::VERSION) }
        );

        Ok(Self {
            surface,
            context,
            gl,
            vao,
            window,
        })
    }

    /// Resize the GL surface and viewport to the new window size.
    pub fn resize(&self, width: u32, height: u32) {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return; // minimized
        };
        self.surface.resize(&self.context, w, h);
        unsafe {
            self.gl.viewport(0, 0, width as i32, height as i32);
        }
    }

    /// Clear the framebuffer to opaque black.
    pub fn clear(&self) {
        unsafe {
            self.gl.clear_color(0.0, 0.0, 0.0, 1.0);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    /// Draw the fullscreen triangle. The caller binds the program and
    /// uniforms first.
    pub fn draw_fullscreen(&self) {
        unsafe {
            self.gl.bind_vertex_array(Some(self.vao));
            self.gl.draw_arrays(glow::TRIANGLES, 0, 3);
            self.gl.bind_vertex_array(None);
        }
    }

    /// Present the frame (blocks for vsync when available).
    pub fn swap(&self) {
        if let Err(e) = self.surface.swap_buffers(&self.context) {
            log::warn!("swap_buffers failed: {e}");
        }
    }
}
