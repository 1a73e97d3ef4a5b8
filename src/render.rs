//! GL context, shader program management, and the uniform bridge.

pub mod context;
pub mod preprocess;
pub mod shader;
pub mod uniforms;

pub use context::GlContext;
pub use shader::{ProgramManager, ShaderProgram};
pub use uniforms::{pack_spectrum, ChannelData, TextureChannel, UniformSet};
