//! Fragment-source preprocessing: `#include` resolution and the
//! adapter wrapper for bare `mainImage` shaders.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Recursively inline `#include "relative/path"` directives.
///
/// Paths resolve against the including file's directory. Each file is
/// inlined at most once per top-level resolution (tracked by canonical
/// path), so diamond includes do not duplicate and cycles terminate.
/// `#version` lines inside included files are stripped; only the
/// top-level file's version directive is honored.
pub fn resolve_includes(source: &str, base_dir: &Path) -> Result<String, Error> {
    let mut seen = HashSet::new();
    resolve_recursive(source, base_dir, &mut seen)
}

fn resolve_recursive(
    source: &str,
    base_dir: &Path,
    seen: &mut HashSet<PathBuf>,
) -> Result<String, Error> {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if let Some(name) = parse_include(line) {
            let path = base_dir.join(name);
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if !seen.insert(key) {
                // Already inlined somewhere above; skip silently.
                continue;
            }
            let text = fs::read_to_string(&path).map_err(|e| {
                Error::Shader(format!("included shader not found: {}: {e}", path.display()))
            })?;
            let stripped = strip_version_lines(&text);
            let parent = path.parent().unwrap_or(base_dir);
            out.push_str(&resolve_recursive(&stripped, parent, seen)?);
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Match `#include "file"` with optional leading whitespace.
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

/// Blank out `#version` lines, preserving line numbering for the
/// driver's error messages.
fn strip_version_lines(source: &str) -> String {
    source
        .lines()
        .map(|line| {
            if line.trim_start().starts_with("#version") {
                ""
            } else {
                line
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Uniform declarations handed to bare fragments and demo authors.
const UNIFORM_PRELUDE: &str = "\
uniform vec3      iResolution;
uniform float     iTime;
uniform float     iTimeDelta;
uniform float     iFrameRate;
uniform int       iFrame;
uniform vec4      iMouse;
uniform vec4      iDate;
uniform float     iSampleRate;
uniform sampler2D iChannel0;
uniform sampler2D iChannel1;
uniform sampler2D iChannel2;
uniform sampler2D iChannel3;
";

/// Wrap a bare ShaderToy-style fragment (no `#version`, defines
/// `mainImage(out vec4, in vec2)`) in a GLSL 330 scaffold declaring
/// the full uniform contract. Sources that already carry a `#version`
/// directive are returned unchanged.
pub fn wrap_bare_fragment(source: &str) -> String {
    let has_version = source
        .lines()
        .any(|line| line.trim_start().starts_with("#version"));
    if has_version {
        return source.to_string();
    }

    let mut out = String::with_capacity(source.len() + 512);
    out.push_str("#version 330 core\n");
    out.push_str(UNIFORM_PRELUDE);
    out.push_str("out vec4 wt_fragColor;\n");
    out.push_str(source);
    out.push_str("\nvoid main() { mainImage(wt_fragColor, gl_FragCoord.xy); }\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    /// Unique scratch directory per test; cleaned up on drop.
    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "wavetoy-test-{tag}-{}",
                std::process::id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.0.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(&path, contents).unwrap();
            path
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_include_is_inlined() {
        let dir = ScratchDir::new("inline");
        dir.write("lib.glsl", "float helper() { return 1.0; }\n");
        let src = "#include \"lib.glsl\"\nvoid main() {}\n";

        let out = resolve_includes(src, &dir.0).unwrap();
        assert!(out.contains("float helper()"));
        assert!(!out.contains("#include"));
    }

    #[test]
    fn test_diamond_include_inlined_once() {
        let dir = ScratchDir::new("diamond");
        dir.write("d.glsl", "float shared_fn() { return 0.5; }\n");
        dir.write("b.glsl", "#include \"d.glsl\"\nfloat b_fn() { return 1.0; }\n");
        dir.write("c.glsl", "#include \"d.glsl\"\nfloat c_fn() { return 2.0; }\n");
        let src = "#include \"b.glsl\"\n#include \"c.glsl\"\nvoid main() {}\n";

        let out = resolve_includes(src, &dir.0).unwrap();
        assert_eq!(out.matches("shared_fn").count(), 1);
        assert!(out.contains("b_fn"));
        assert!(out.contains("c_fn"));
    }

    #[test]
    fn test_cyclic_include_terminates() {
        let dir = ScratchDir::new("cycle");
        dir.write("a.glsl", "#include \"b.glsl\"\nfloat a_fn() { return 1.0; }\n");
        dir.write("b.glsl", "#include \"a.glsl\"\nfloat b_fn() { return 2.0; }\n");
        let src = "#include \"a.glsl\"\n";

        let out = resolve_includes(src, &dir.0).unwrap();
        assert_eq!(out.matches("a_fn").count(), 1);
        assert_eq!(out.matches("b_fn").count(), 1);
    }

    #[test]
    fn test_includes_resolve_relative_to_including_file() {
        let dir = ScratchDir::new("relative");
        dir.write("sub/inner.glsl", "float inner_fn() { return 3.0; }\n");
        dir.write("sub/outer.glsl", "#include \"inner.glsl\"\n");
        let src = "#include \"sub/outer.glsl\"\n";

        let out = resolve_includes(src, &dir.0).unwrap();
        assert!(out.contains("inner_fn"));
    }

    #[test]
    fn test_version_stripped_from_includes() {
        let dir = ScratchDir::new("version");
        dir.write("lib.glsl", "#version 330 core\nfloat f() { return 1.0; }\n");
        let src = "#version 330 core\n#include \"lib.glsl\"\n";

        let out = resolve_includes(src, &dir.0).unwrap();
        assert_eq!(out.matches("#version").count(), 1);
    }

    #[test]
    fn test_missing_include_is_shader_error() {
        let dir = ScratchDir::new("missing");
        let src = "#include \"nope.glsl\"\n";

        match resolve_includes(src, &dir.0) {
            Err(Error::Shader(msg)) => assert!(msg.contains("nope.glsl")),
            other => panic!("expected shader error, got {other:?}"),
        }
    }

    #[test]
    fn test_wrap_bare_fragment_adds_scaffold() {
        let src = "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }\n";
        let out = wrap_bare_fragment(src);

        assert!(out.starts_with("#version 330 core"));
        assert!(out.contains("uniform sampler2D iChannel0;"));
        assert!(out.contains("mainImage(wt_fragColor, gl_FragCoord.xy)"));
    }

    #[test]
    fn test_wrap_leaves_versioned_source_alone() {
        let src = "#version 330 core\nout vec4 c;\nvoid main() { c = vec4(0.0); }\n";
        assert_eq!(wrap_bare_fragment(src), src);
    }
}
