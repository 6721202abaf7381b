//! Pre-emission analysis: uniform storage classes, struct input/output
//! usage, texture/sampler pairs, and per-function uniform/texture/sampler
//! requirements.

use crate::{keywords, Error, ParsedShader, ShaderKind, TokenKind};

/// Where a uniform's storage lives once translated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageClass {
    /// A member of the gathered `UniformData` block.
    Uniform,
    /// A flat texture argument on the fragment entry point.
    Texture,
}

bitflags::bitflags! {
    /// How a shader struct is used by the functions that mention it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct StructUsage: u32 {
        const INPUT = 1 << 0;
        const OUTPUT = 1 << 1;
    }
}

impl StructUsage {
    /// Structs used both ways split into distinct `_In`/`_Out` MSL types.
    pub fn is_split(self) -> bool {
        self.contains(StructUsage::INPUT | StructUsage::OUTPUT)
    }
}

/// What a function needs threaded through its parameter list.
#[derive(Clone, Debug, Default)]
pub struct FunctionInfo {
    /// True if the body (or any callee) reads a non-texture uniform.
    pub requires_uniforms: bool,
    /// Indices into `ParsedShader::uniforms`, deduplicated, in first-use
    /// order.
    pub textures: Vec<usize>,
    /// Indices into `ParsedShader::samplers`, deduplicated.
    pub samplers: Vec<usize>,
}

impl FunctionInfo {
    fn absorb(&mut self, callee: &FunctionInfo) {
        self.requires_uniforms |= callee.requires_uniforms;
        for &t in &callee.textures {
            if !self.textures.contains(&t) {
                self.textures.push(t);
            }
        }
        for &s in &callee.samplers {
            if !self.samplers.contains(&s) {
                self.samplers.push(s);
            }
        }
    }

    pub fn needs_extra_args(&self) -> bool {
        self.requires_uniforms || !self.textures.is_empty() || !self.samplers.is_empty()
    }
}

/// Analysis results for one shader, indexed parallel to the input tables.
#[derive(Clone, Debug, Default)]
pub struct ModuleInfo {
    pub uniform_classes: Vec<StorageClass>,
    pub struct_usage: Vec<StructUsage>,
    pub functions: Vec<FunctionInfo>,
    /// Per uniform, the sampler a texture is sampled with at its first
    /// `Sample*` site; the index doubles as the sampler's binding slot
    /// since slots follow declaration order. `None` for non-textures and
    /// for textures only ever read via `Load`.
    pub texture_samplers: Vec<Option<usize>>,
}

impl ModuleInfo {
    pub fn uniform_class(&self, shader: &ParsedShader, name: &str) -> Option<(usize, StorageClass)> {
        shader
            .uniforms
            .iter()
            .position(|u| u.name == name)
            .map(|i| (i, self.uniform_classes[i]))
    }

    pub fn struct_index(&self, shader: &ParsedShader, name: &str) -> Option<usize> {
        shader.structs.iter().position(|s| s.name == name)
    }

    /// True when any uniform landed in the `UniformData` block.
    pub fn has_uniform_block(&self) -> bool {
        self.uniform_classes
            .iter()
            .any(|&c| c == StorageClass::Uniform)
    }
}

pub fn analyze(shader: &ParsedShader, kind: ShaderKind) -> Result<ModuleInfo, Error> {
    let mut info = ModuleInfo::default();

    // Textures only exist as bindable objects in the fragment stage; a
    // vertex shader mentioning a texture type keeps it in the block (where
    // it will fail downstream if actually sampled).
    for uniform in &shader.uniforms {
        let class = if kind == ShaderKind::Fragment && uniform.type_name.starts_with("texture") {
            StorageClass::Texture
        } else {
            StorageClass::Uniform
        };
        info.uniform_classes.push(class);
    }

    info.texture_samplers = vec![None; shader.uniforms.len()];

    info.struct_usage = vec![StructUsage::default(); shader.structs.len()];
    for func in &shader.functions {
        for param in &func.params {
            if let Some(idx) = shader.structs.iter().position(|s| s.name == param.type_name) {
                info.struct_usage[idx] |= StructUsage::INPUT;
            }
        }
        if let Some(idx) = shader
            .structs
            .iter()
            .position(|s| s.name == func.return_type)
        {
            info.struct_usage[idx] |= StructUsage::OUTPUT;
        }
    }

    // Functions are declared before use, so by the time a caller is walked
    // every callee already has its info computed.
    for (func_idx, func) in shader.functions.iter().enumerate() {
        let mut fi = FunctionInfo::default();
        for tok_idx in func.body.clone() {
            let token = &shader.tokens[tok_idx];
            if token.kind != TokenKind::Name {
                continue;
            }
            let name = token.text.as_str();
            if let Some((uni_idx, class)) = info.uniform_class(shader, name) {
                match class {
                    StorageClass::Uniform => fi.requires_uniforms = true,
                    StorageClass::Texture => {
                        if !fi.textures.contains(&uni_idx) {
                            fi.textures.push(uni_idx);
                        }
                        if info.texture_samplers[uni_idx].is_none() {
                            info.texture_samplers[uni_idx] =
                                sampled_with(shader, tok_idx, func.body.end);
                        }
                    }
                }
                continue;
            }
            if let Some(callee_idx) = shader.functions[..func_idx]
                .iter()
                .position(|f| f.name == name)
            {
                let callee = info.functions[callee_idx].clone();
                fi.absorb(&callee);
                continue;
            }
            if kind == ShaderKind::Fragment {
                if let Some(smp_idx) = shader.samplers.iter().position(|s| s.name == name) {
                    if !fi.samplers.contains(&smp_idx) {
                        fi.samplers.push(smp_idx);
                    }
                }
            }
        }
        info.functions.push(fi);
    }

    Ok(info)
}

fn next_significant(shader: &ParsedShader, mut i: usize, end: usize) -> Option<usize> {
    while i < end {
        match shader.tokens[i].kind {
            TokenKind::SpaceTab | TokenKind::Newline | TokenKind::None => i += 1,
            _ => return Some(i),
        }
    }
    None
}

/// The sampler a texture is paired with at a `tex.Sample*(s, ...)` site,
/// if the name at `i` is such a site. `Load` takes no sampler, so it
/// yields nothing.
fn sampled_with(shader: &ParsedShader, i: usize, end: usize) -> Option<usize> {
    let dot = next_significant(shader, i + 1, end)?;
    let t = &shader.tokens[dot];
    if t.kind != TokenKind::Other || t.text != "." {
        return None;
    }
    let method = next_significant(shader, dot + 1, end)?;
    let m = &shader.tokens[method];
    if m.kind != TokenKind::Name || !keywords::sample_method(&m.text) {
        return None;
    }
    let open = next_significant(shader, method + 1, end)?;
    let o = &shader.tokens[open];
    if o.kind != TokenKind::Other || o.text != "(" {
        return None;
    }
    let arg = next_significant(shader, open + 1, end)?;
    let a = &shader.tokens[arg];
    if a.kind != TokenKind::Name {
        return None;
    }
    shader.samplers.iter().position(|s| s.name == a.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionDecl, SamplerDecl, StructDecl, StructField, Token, UniformDecl};

    fn uniform(name: &str, ty: &str) -> UniformDecl {
        UniformDecl {
            name: name.to_string(),
            type_name: ty.to_string(),
            mapping: None,
            is_const: false,
            default_value: Vec::new(),
            array_count: 0,
        }
    }

    fn name_tokens(names: &[&str]) -> Vec<Token> {
        names
            .iter()
            .map(|n| Token::new(TokenKind::Name, *n))
            .collect()
    }

    #[test]
    fn texture_class_only_in_fragment() {
        let mut shader = ParsedShader::default();
        shader.uniforms.push(uniform("image", "texture2d"));
        let frag = analyze(&shader, ShaderKind::Fragment).unwrap();
        assert_eq!(frag.uniform_classes, vec![StorageClass::Texture]);
        let vert = analyze(&shader, ShaderKind::Vertex).unwrap();
        assert_eq!(vert.uniform_classes, vec![StorageClass::Uniform]);
    }

    #[test]
    fn callee_requirements_propagate() {
        let mut shader = ParsedShader::default();
        shader.uniforms.push(uniform("gamma", "float"));
        shader.uniforms.push(uniform("image", "texture2d"));
        shader.tokens = name_tokens(&["gamma", "image", "helper"]);
        shader.functions.push(FunctionDecl {
            name: "helper".to_string(),
            return_type: "float4".to_string(),
            mapping: None,
            params: Vec::new(),
            body: 0..2,
        });
        shader.functions.push(FunctionDecl {
            name: "main".to_string(),
            return_type: "float4".to_string(),
            mapping: None,
            params: Vec::new(),
            body: 2..3,
        });
        let info = analyze(&shader, ShaderKind::Fragment).unwrap();
        assert!(info.functions[1].requires_uniforms);
        assert_eq!(info.functions[1].textures, vec![1]);
    }

    #[test]
    fn texture_sampler_pair_is_recorded() {
        let mut shader = ParsedShader::default();
        shader.uniforms.push(uniform("other", "texture2d"));
        shader.uniforms.push(uniform("tex", "texture2d"));
        shader.samplers.push(SamplerDecl {
            name: "unused".to_string(),
            info: Default::default(),
        });
        shader.samplers.push(SamplerDecl {
            name: "smp".to_string(),
            info: Default::default(),
        });
        shader.tokens = vec![
            Token::new(TokenKind::Name, "tex"),
            Token::new(TokenKind::Other, "."),
            Token::new(TokenKind::Name, "Sample"),
            Token::new(TokenKind::Other, "("),
            Token::new(TokenKind::Name, "smp"),
            Token::new(TokenKind::Other, ","),
            Token::new(TokenKind::Name, "uv"),
            Token::new(TokenKind::Other, ")"),
        ];
        shader.functions.push(FunctionDecl {
            name: "main".to_string(),
            return_type: "float4".to_string(),
            mapping: None,
            params: Vec::new(),
            body: 0..8,
        });
        let info = analyze(&shader, ShaderKind::Fragment).unwrap();
        // `tex` pairs with `smp` (sampler slot 1); `other` is never
        // sampled and pairs with nothing.
        assert_eq!(info.texture_samplers, vec![None, Some(1)]);
    }

    #[test]
    fn struct_used_both_ways_is_split() {
        let mut shader = ParsedShader::default();
        shader.structs.push(StructDecl {
            name: "VertInOut".to_string(),
            fields: vec![StructField {
                name: "pos".to_string(),
                type_name: "float4".to_string(),
                mapping: Some("POSITION".to_string()),
            }],
        });
        shader.functions.push(FunctionDecl {
            name: "main".to_string(),
            return_type: "VertInOut".to_string(),
            mapping: None,
            params: vec![crate::FunctionParam {
                name: "vert_in".to_string(),
                type_name: "VertInOut".to_string(),
                mapping: None,
            }],
            body: 0..0,
        });
        let info = analyze(&shader, ShaderKind::Vertex).unwrap();
        assert!(info.struct_usage[0].is_split());
    }
}
