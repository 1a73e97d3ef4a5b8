//! GLSL program compilation, uniform resolution, and per-frame upload.

use glow::HasContext;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::preprocess::{resolve_includes, wrap_bare_fragment};
use super::uniforms::{UniformSet, CHANNEL_COUNT};
use crate::error::Error;

/// Shared vertex stage: a fullscreen triangle from `gl_VertexID`,
/// no vertex buffers needed.
const VERT_SRC: &str = r#"#version 330 core
out vec2 v_uv;
void main() {
    vec2 pos;
    if (gl_VertexID == 0) pos = vec2(-1.0, -1.0);
    else if (gl_VertexID == 1) pos = vec2( 3.0, -1.0);
    else pos = vec2(-1.0,  3.0);
    v_uv = pos * 0.5 + 0.5;
    gl_Position = vec4(pos, 0.0, 1.0);
}"#;

/// Scalar uniforms resolved for every program.
const UNIFORM_NAMES: [&str; 8] = [
    "iResolution",
    "iTime",
    "iTimeDelta",
    "iFrameRate",
    "iFrame",
    "iMouse",
    "iDate",
    "iSampleRate",
];

/// A linked program plus its resolved uniform locations. Shaders need
/// not declare every uniform; absent names map to `None` and are
/// skipped at upload time.
pub struct ShaderProgram {
    program: glow::NativeProgram,
    locations: HashMap<String, Option<glow::NativeUniformLocation>>,
}

impl ShaderProgram {
    /// Load, preprocess, compile and link a fragment shader file.
    pub fn from_file(gl: &glow::Context, path: &Path) -> Result<Self, Error> {
        let source = fs::read_to_string(path)
            .map_err(|e| Error::Shader(format!("cannot read {}: {e}", path.display())))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_source(gl, &source, base_dir)
    }

    /// Compile raw fragment text. Includes resolve against `base_dir`;
    /// bare `mainImage` sources get the adapter wrapper.
    pub fn from_source(gl: &glow::Context, source: &str, base_dir: &Path) -> Result<Self, Error> {
        let resolved = resolve_includes(source, base_dir)?;
        let frag_src = wrap_bare_fragment(&resolved);

        let program = link_program(gl, VERT_SRC, &frag_src)?;

        let mut locations = HashMap::new();
        unsafe {
            for name in UNIFORM_NAMES {
                locations.insert(name.to_string(), gl.get_uniform_location(program, name));
            }
            for i in 0..CHANNEL_COUNT {
                let name = format!("iChannel{i}");
                locations.insert(name.clone(), gl.get_uniform_location(program, &name));
            }
        }

        Ok(Self { program, locations })
    }

    fn loc(&self, name: &str) -> Option<&glow::NativeUniformLocation> {
        self.locations.get(name).and_then(|l| l.as_ref())
    }

    /// Write every resolved uniform and upload pending channel data.
    ///
    /// Pending CPU buffers are taken and uploaded as 2-D float
    /// textures (`R32F` for single-component data, `RGBA32F` for
    /// four-component) before binding each channel to its texture
    /// unit. Leaves the program bound for the draw call.
    pub fn update_uniforms(&self, gl: &glow::Context, set: &mut UniformSet) {
        unsafe {
            gl.use_program(Some(self.program));

            if let Some(loc) = self.loc("iResolution") {
                let [w, h, z] = set.resolution;
                gl.uniform_3_f32(Some(loc), w, h, z);
            }
            if let Some(loc) = self.loc("iTime") {
                gl.uniform_1_f32(Some(loc), set.time);
            }
            if let Some(loc) = self.loc("iTimeDelta") {
                gl.uniform_1_f32(Some(loc), set.time_delta);
            }
            if let Some(loc) = self.loc("iFrameRate") {
                gl.uniform_1_f32(Some(loc), set.frame_rate);
            }
            if let Some(loc) = self.loc("iFrame") {
                gl.uniform_1_i32(Some(loc), set.frame);
            }
            if let Some(loc) = self.loc("iMouse") {
                let [x, y, z, w] = set.mouse;
                gl.uniform_4_f32(Some(loc), x, y, z, w);
            }
            if let Some(loc) = self.loc("iDate") {
                let [y, m, d, s] = set.date;
                gl.uniform_4_f32(Some(loc), y, m, d, s);
            }
            if let Some(loc) = self.loc("iSampleRate") {
                gl.uniform_1_f32(Some(loc), set.sample_rate);
            }

            for (i, channel) in set.channels.iter_mut().enumerate() {
                let Some(texture) = channel.texture else {
                    continue;
                };
                gl.active_texture(glow::TEXTURE0 + i as u32);
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));

                if let Some(data) = channel.data.take() {
                    let (internal, format) = match data.components() {
                        1 => (glow::R32F, glow::RED),
                        _ => (glow::RGBA32F, glow::RGBA),
                    };
                    gl.tex_image_2d(
                        glow::TEXTURE_2D,
                        0,
                        internal as i32,
                        data.width as i32,
                        data.height as i32,
                        0,
                        format,
                        glow::FLOAT,
                        Some(bytemuck::cast_slice(&data.pixels)),
                    );
                }

                if let Some(loc) = self.loc(&format!("iChannel{i}")) {
                    gl.uniform_1_i32(Some(loc), i as i32);
                }
            }
        }
    }

    /// Release the GL program object.
    pub fn destroy(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_program(self.program);
        }
    }
}

fn compile_stage(gl: &glow::Context, src: &str, kind: u32) -> Result<glow::NativeShader, Error> {
    unsafe {
        let shader = gl
            .create_shader(kind)
            .map_err(|e| Error::Shader(format!("create shader: {e}")))?;
        gl.shader_source(shader, src);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info_log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            let stage = if kind == glow::VERTEX_SHADER {
                "vertex"
            } else {
                "fragment"
            };
            return Err(Error::Shader(format!(
                "{stage} shader compile error:\n{info_log}"
            )));
        }
        Ok(shader)
    }
}

fn link_program(
    gl: &glow::Context,
    vert_src: &str,
    frag_src: &str,
) -> Result<glow::NativeProgram, Error> {
    unsafe {
        let vs = compile_stage(gl, vert_src, glow::VERTEX_SHADER)?;
        let fs = match compile_stage(gl, frag_src, glow::FRAGMENT_SHADER) {
            Ok(fs) => fs,
            Err(e) => {
                gl.delete_shader(vs);
                return Err(e);
            }
        };

        let program = gl
            .create_program()
            .map_err(|e| Error::Shader(format!("create program: {e}")))?;
        gl.attach_shader(program, vs);
        gl.attach_shader(program, fs);
        gl.link_program(program);

        let linked = gl.get_program_link_status(program);
        let info_log = if linked {
            String::new()
        } else {
            gl.get_program_info_log(program)
        };

        gl.detach_shader(program, vs);
        gl.detach_shader(program, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !linked {
            gl.delete_program(program);
            return Err(Error::Shader(format!("program link error:\n{info_log}")));
        }
        Ok(program)
    }
}

/// Program lifetime management: at most one linked program is current,
/// and a failed load never disturbs it.
#[derive(Default)]
pub struct ProgramManager {
    current: Option<ShaderProgram>,
    source_path: Option<PathBuf>,
    last_error: Option<String>,
}

impl ProgramManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently linked program, if any. Drawing is only valid
    /// while this returns `Some`.
    pub fn current(&self) -> Option<&ShaderProgram> {
        self.current.as_ref()
    }

    /// Human-readable log from the most recent failed load, for the
    /// owning UI to display.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Compile a shader file, replacing the current program only on
    /// success. On failure the previous program stays drawable and the
    /// error (with the driver log) is recorded and returned.
    pub fn load_file(&mut self, gl: &glow::Context, path: &Path) -> Result<(), Error> {
        let result = ShaderProgram::from_file(gl, path);
        self.install(gl, result, Some(path.to_path_buf()))
    }

    /// Compile raw shader text, e.g. handed over from the UI layer.
    pub fn load_source(
        &mut self,
        gl: &glow::Context,
        source: &str,
        base_dir: &Path,
    ) -> Result<(), Error> {
        let result = ShaderProgram::from_source(gl, source, base_dir);
        self.install(gl, result, None)
    }

    /// Recompile the last successfully loaded file.
    pub fn reload(&mut self, gl: &glow::Context) -> Result<(), Error> {
        let Some(path) = self.source_path.clone() else {
            return Err(Error::ResourceNotReady("shader program"));
        };
        self.load_file(gl, &path)
    }

    fn install(
        &mut self,
        gl: &glow::Context,
        result: Result<ShaderProgram, Error>,
        path: Option<PathBuf>,
    ) -> Result<(), Error> {
        match result {
            Ok(program) => {
                if let Some(old) = self.current.take() {
                    old.destroy(gl);
                }
                self.current = Some(program);
                if path.is_some() {
                    self.source_path = path;
                }
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
