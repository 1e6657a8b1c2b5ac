//! Shader source handling shared by all backends.
//!
//! Programs are keyed by material name plus a [`ProgramDefines`] set. Both
//! backends run sources through [`preprocess`], which understands a small
//! line-directive language (`#define`, `#ifdef`, `#ifndef`, `#else`,
//! `#endif`, `#error`). The wgpu backend additionally reflects bindings out of
//! the WGSL text with [`reflect_wgsl`].

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Result, anyhow, bail};

/// An ordered set of preprocessor defines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProgramDefines(BTreeMap<String, String>);

impl ProgramDefines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Stable textual form used in the program cache key.
    pub fn serialize(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| format!("{k}={v};"))
            .collect::<String>()
    }

    pub fn to_vec(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Evaluates conditional directives against `defines`.
///
/// Directive lines are removed from the output; lines inside inactive blocks
/// are dropped. An `#error` inside an active block fails with its message.
pub fn preprocess(source: &str, defines: &ProgramDefines) -> Result<String> {
    let mut defined: HashSet<String> = defines.iter().map(|(k, _)| k.to_string()).collect();
    // each entry: (block active, parent active, seen #else)
    let mut stack: Vec<(bool, bool, bool)> = Vec::new();
    let mut out = String::with_capacity(source.len());

    for (line_no, line) in source.lines().enumerate() {
        let active = stack.last().map_or(true, |(a, _, _)| *a);
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            if active {
                out.push_str(line);
                out.push('\n');
            }
            continue;
        }
        let mut parts = trimmed[1..].split_whitespace();
        let directive = parts.next().unwrap_or_default();
        let arg = parts.next();
        match directive {
            "ifdef" | "ifndef" => {
                let name = arg.ok_or_else(|| anyhow!("line {}: #{directive} without name", line_no + 1))?;
                let is_set = defined.contains(name);
                let cond = if directive == "ifdef" { is_set } else { !is_set };
                stack.push((active && cond, active, false));
            }
            "else" => {
                let Some((block, parent, seen_else)) = stack.last_mut() else {
                    bail!("line {}: #else without #ifdef", line_no + 1);
                };
                if *seen_else {
                    bail!("line {}: duplicate #else", line_no + 1);
                }
                *seen_else = true;
                *block = *parent && !*block;
            }
            "endif" => {
                if stack.pop().is_none() {
                    bail!("line {}: #endif without #ifdef", line_no + 1);
                }
            }
            "define" if active => {
                let name = arg.ok_or_else(|| anyhow!("line {}: #define without name", line_no + 1))?;
                defined.insert(name.to_string());
            }
            "error" if active => {
                let message = trimmed[1..].trim_start_matches("error").trim();
                bail!("line {}: #error {}", line_no + 1, message);
            }
            // version, precision and extension pragmas pass through
            _ if active => {
                out.push_str(line);
                out.push('\n');
            }
            _ => {}
        }
    }
    if !stack.is_empty() {
        bail!("unterminated #ifdef block ({} open)", stack.len());
    }
    Ok(out)
}

/// The WGSL types the wgpu backend knows how to lay out in a uniform buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WgslUniformType {
    I32,
    U32,
    F32,
    Vec2,
    Vec3,
    Vec4,
    Mat3,
    Mat4,
}

impl WgslUniformType {
    fn parse(ty: &str) -> Option<Self> {
        let ty: String = ty.chars().filter(|c| !c.is_whitespace()).collect();
        Some(match ty.as_str() {
            "i32" => Self::I32,
            "u32" => Self::U32,
            "f32" => Self::F32,
            "vec2<f32>" | "vec2f" => Self::Vec2,
            "vec3<f32>" | "vec3f" => Self::Vec3,
            "vec4<f32>" | "vec4f" => Self::Vec4,
            "mat3x3<f32>" | "mat3x3f" => Self::Mat3,
            "mat4x4<f32>" | "mat4x4f" => Self::Mat4,
            _ => return None,
        })
    }

    /// Size in bytes as laid out in a uniform buffer.
    pub fn size(self) -> u64 {
        match self {
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::Vec2 => 8,
            Self::Vec3 | Self::Vec4 => 16,
            Self::Mat3 => 48,
            Self::Mat4 => 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct WgslUniform {
    pub binding: u32,
    pub ty: WgslUniformType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WgslTexture {
    pub binding: u32,
    pub sampler_binding: u32,
}

/// Bindings found in a vertex/fragment WGSL pair.
#[derive(Clone, Debug, Default)]
pub struct WgslReflection {
    pub attributes: HashMap<String, u32>,
    pub uniforms: HashMap<String, WgslUniform>,
    pub textures: HashMap<String, WgslTexture>,
}

/// Reflects a WGSL program.
///
/// Conventions: vertex inputs are the `@location` fields of `struct VertexInput`,
/// uniforms are `var<uniform>` declarations in group 0, textures are
/// `texture_2d<f32>` declarations in group 1 each paired with a `<name>_sampler`.
/// The vertex stage must define `vs_main`, the fragment stage `fs_main`.
pub fn reflect_wgsl(vertex: &str, fragment: &str) -> Result<WgslReflection> {
    if !vertex.contains("fn vs_main") {
        bail!("vertex stage has no `vs_main` entry point");
    }
    if !fragment.contains("fn fs_main") {
        bail!("fragment stage has no `fs_main` entry point");
    }
    let mut reflection = WgslReflection::default();
    reflect_vertex_input(vertex, &mut reflection.attributes);

    let mut samplers: HashMap<String, u32> = HashMap::new();
    let mut textures: HashMap<String, u32> = HashMap::new();
    for line in vertex.lines().chain(fragment.lines()) {
        let Some((group, binding, rest)) = parse_binding(line) else {
            continue;
        };
        let Some((name, ty)) = parse_var(rest) else {
            continue;
        };
        match group {
            0 if rest.contains("var<uniform>") => {
                let ty = WgslUniformType::parse(ty)
                    .ok_or_else(|| anyhow!("unsupported uniform type `{ty}` for `{name}`"))?;
                reflection
                    .uniforms
                    .insert(name.to_string(), WgslUniform { binding, ty });
            }
            1 if ty.starts_with("texture_2d") => {
                textures.insert(name.to_string(), binding);
            }
            1 if ty == "sampler" => {
                samplers.insert(name.to_string(), binding);
            }
            _ => log::debug!("ignoring binding `{name}` in group {group}"),
        }
    }
    for (name, binding) in textures {
        let sampler_binding = samplers
            .get(&format!("{name}_sampler"))
            .copied()
            .ok_or_else(|| anyhow!("texture `{name}` has no `{name}_sampler`"))?;
        reflection.textures.insert(
            name,
            WgslTexture {
                binding,
                sampler_binding,
            },
        );
    }
    Ok(reflection)
}

fn reflect_vertex_input(vertex: &str, attributes: &mut HashMap<String, u32>) {
    let Some(start) = vertex.find("struct VertexInput") else {
        return;
    };
    let body = &vertex[start..];
    let Some(open) = body.find('{') else { return };
    let Some(close) = body.find('}') else { return };
    for field in body[open + 1..close].split(',') {
        let field = field.trim();
        let Some(rest) = field.strip_prefix("@location(") else {
            continue;
        };
        let Some((location, rest)) = rest.split_once(')') else {
            continue;
        };
        let Ok(location) = location.trim().parse::<u32>() else {
            continue;
        };
        if let Some((name, _)) = rest.split_once(':') {
            attributes.insert(name.trim().to_string(), location);
        }
    }
}

fn parse_binding(line: &str) -> Option<(u32, u32, &str)> {
    let line = line.trim();
    let rest = line.strip_prefix("@group(")?;
    let (group, rest) = rest.split_once(')')?;
    let rest = rest.trim_start().strip_prefix("@binding(")?;
    let (binding, rest) = rest.split_once(')')?;
    Some((group.trim().parse().ok()?, binding.trim().parse().ok()?, rest.trim()))
}

fn parse_var(decl: &str) -> Option<(&str, &str)> {
    let decl = decl.strip_prefix("var")?;
    let decl = match decl.find('>') {
        Some(end) if decl.starts_with('<') => &decl[end + 1..],
        _ => decl,
    };
    let (name, ty) = decl.split_once(':')?;
    Some((name.trim(), ty.trim().trim_end_matches(';').trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(names: &[&str]) -> ProgramDefines {
        let mut d = ProgramDefines::new();
        for name in names {
            d.insert(*name, "1");
        }
        d
    }

    #[test]
    fn ifdef_blocks_follow_defines() {
        let src = "a\n#ifdef HAS_COLOR_0\nb\n#else\nc\n#endif\nd\n";
        assert_eq!(preprocess(src, &defines(&["HAS_COLOR_0"])).unwrap(), "a\nb\nd\n");
        assert_eq!(preprocess(src, &defines(&[])).unwrap(), "a\nc\nd\n");
    }

    #[test]
    fn nested_blocks_inside_inactive_parent_stay_inactive() {
        let src = "#ifdef A\n#ifndef B\nx\n#else\ny\n#endif\n#endif\nz\n";
        assert_eq!(preprocess(src, &defines(&[])).unwrap(), "z\n");
        assert_eq!(preprocess(src, &defines(&["A"])).unwrap(), "x\nz\n");
        assert_eq!(preprocess(src, &defines(&["A", "B"])).unwrap(), "y\nz\n");
    }

    #[test]
    fn error_directive_only_fires_when_active() {
        let src = "#ifdef BROKEN\n#error nope\n#endif\n";
        assert!(preprocess(src, &defines(&[])).is_ok());
        let err = preprocess(src, &defines(&["BROKEN"])).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn unbalanced_blocks_are_rejected() {
        assert!(preprocess("#ifdef A\nx\n", &defines(&[])).is_err());
        assert!(preprocess("#endif\n", &defines(&[])).is_err());
    }

    #[test]
    fn serialized_defines_are_order_independent() {
        let mut a = ProgramDefines::new();
        a.insert("B", "1");
        a.insert("A", "2");
        let mut b = ProgramDefines::new();
        b.insert("A", "2");
        b.insert("B", "1");
        assert_eq!(a.serialize(), "A=2;B=1;");
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn reflects_wgsl_bindings() {
        let vs = "struct VertexInput {\n  @location(0) POSITION: vec3<f32>,\n  @location(2) NORMAL: vec3<f32>,\n};\n\
                  @group(0) @binding(0) var<uniform> MODEL_MATRIX: mat4x4<f32>;\n\
                  @vertex fn vs_main(in: VertexInput) -> @builtin(position) vec4<f32> { return vec4<f32>(in.POSITION, 1.0); }\n";
        let fs = "@group(0) @binding(1) var<uniform> baseColorFactor: vec4<f32>;\n\
                  @group(1) @binding(0) var baseColorTex: texture_2d<f32>;\n\
                  @group(1) @binding(1) var baseColorTex_sampler: sampler;\n\
                  @fragment fn fs_main() -> @location(0) vec4<f32> { return baseColorFactor; }\n";
        let reflection = reflect_wgsl(vs, fs).unwrap();
        assert_eq!(reflection.attributes["POSITION"], 0);
        assert_eq!(reflection.attributes["NORMAL"], 2);
        assert_eq!(reflection.uniforms["MODEL_MATRIX"].ty, WgslUniformType::Mat4);
        assert_eq!(reflection.uniforms["baseColorFactor"].binding, 1);
        assert_eq!(
            reflection.textures["baseColorTex"],
            WgslTexture {
                binding: 0,
                sampler_binding: 1
            }
        );
    }

    #[test]
    fn missing_entry_point_fails_to_link() {
        assert!(reflect_wgsl("fn main() {}", "fn fs_main() {}").is_err());
    }
}
