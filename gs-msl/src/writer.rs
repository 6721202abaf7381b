//! MSL emission: the uniform block, the shader structs, and the rewritten
//! function bodies.

use std::fmt::Write as _;
use std::ops::Range;

use crate::analyze::{ModuleInfo, StorageClass};
use crate::{
    keywords, layout, sampler, Error, FunctionDecl, ParamKind, ParsedShader, ShaderKind,
    ShaderMeta, Stream, StructDecl, Token, TokenKind, UniformMeta, VertexAttribute, VertexFormat,
    UNIFORM_BUFFER_SLOT,
};

const INDENT: &str = "    ";

/// Struct variants a shader struct can be emitted as.
#[derive(Clone, Copy, PartialEq, Eq)]
enum StructVariant {
    /// Stage input: `[[attribute(i)]]` (vertex) or semantic (fragment).
    Input,
    /// Stage output: semantic attributes only.
    Output,
}

pub struct Writer<'a> {
    shader: &'a ParsedShader,
    info: &'a ModuleInfo,
    kind: ShaderKind,
    /// Byte offset per uniform; `None` for texture-class uniforms.
    offsets: Vec<Option<u32>>,
    block_size: u32,
}

impl<'a> Writer<'a> {
    pub fn new(shader: &'a ParsedShader, info: &'a ModuleInfo, kind: ShaderKind) -> Self {
        Writer {
            shader,
            info,
            kind,
            offsets: Vec::new(),
            block_size: 0,
        }
    }

    pub fn write(&mut self) -> Result<String, Error> {
        self.layout_uniforms()?;

        let mut out = String::new();
        out.push_str("#include <metal_stdlib>\n\nusing namespace metal;\n\n");
        self.write_uniform_struct(&mut out)?;
        self.write_structs(&mut out)?;
        self.write_functions(&mut out)?;
        Ok(out)
    }

    fn layout_uniforms(&mut self) -> Result<(), Error> {
        let mut layouter = layout::Layouter::new();
        for (uniform, &class) in self.shader.uniforms.iter().zip(&self.info.uniform_classes) {
            match class {
                StorageClass::Texture => self.offsets.push(None),
                StorageClass::Uniform => {
                    let offset = layouter.place(&uniform.type_name, uniform.array_count)?;
                    self.offsets.push(Some(offset));
                }
            }
        }
        self.block_size = layouter.finish();
        Ok(())
    }

    fn write_uniform_struct(&self, out: &mut String) -> Result<(), Error> {
        if !self.info.has_uniform_block() {
            return Ok(());
        }
        out.push_str("struct UniformData {\n");
        for (uniform, &class) in self.shader.uniforms.iter().zip(&self.info.uniform_classes) {
            if class != StorageClass::Uniform {
                continue;
            }
            let ty = self.convert_type_name(&uniform.type_name)?;
            write!(out, "{INDENT}{ty} {}", uniform.name)?;
            if uniform.array_count > 1 {
                write!(out, "[{}]", uniform.array_count)?;
            }
            out.push_str(";\n");
        }
        out.push_str("};\n\n");
        Ok(())
    }

    fn write_structs(&self, out: &mut String) -> Result<(), Error> {
        for (idx, decl) in self.shader.structs.iter().enumerate() {
            let usage = self.info.struct_usage[idx];
            if usage.is_split() {
                self.write_struct(out, decl, &format!("{}_In", decl.name), StructVariant::Input)?;
                self.write_struct(out, decl, &format!("{}_Out", decl.name), StructVariant::Output)?;
            } else if usage.contains(crate::StructUsage::INPUT) {
                self.write_struct(out, decl, &decl.name, StructVariant::Input)?;
            } else {
                self.write_struct(out, decl, &decl.name, StructVariant::Output)?;
            }
        }
        Ok(())
    }

    fn write_struct(
        &self,
        out: &mut String,
        decl: &StructDecl,
        name: &str,
        variant: StructVariant,
    ) -> Result<(), Error> {
        writeln!(out, "struct {name} {{")?;
        for (field_idx, field) in decl.fields.iter().enumerate() {
            let ty = self.convert_type_name(&field.type_name)?;
            write!(out, "{INDENT}{ty} {}", field.name)?;
            match variant {
                StructVariant::Input if self.kind == ShaderKind::Vertex => {
                    write!(out, " [[attribute({field_idx})]]")?;
                }
                StructVariant::Input | StructVariant::Output => {
                    if let Some(attr) = field.mapping.as_deref().and_then(semantic_attribute) {
                        write!(out, " [[{attr}]]")?;
                    }
                }
            }
            out.push_str(";\n");
        }
        out.push_str("};\n\n");
        Ok(())
    }

    fn write_functions(&self, out: &mut String) -> Result<(), Error> {
        for (idx, func) in self.shader.functions.iter().enumerate() {
            self.write_function(out, idx, func)?;
            out.push_str("\n\n");
        }
        // Trailing separator cleanup keeps the output stable for tests.
        while out.ends_with("\n\n\n") {
            out.pop();
        }
        Ok(())
    }

    fn write_function(&self, out: &mut String, idx: usize, func: &FunctionDecl) -> Result<(), Error> {
        let is_main = func.is_main();
        let frag_float3_return =
            is_main && self.kind == ShaderKind::Fragment && func.return_type == "float3";

        if is_main {
            out.push_str(match self.kind {
                ShaderKind::Vertex => "vertex ",
                ShaderKind::Fragment => "fragment ",
            });
        }

        let return_type = if frag_float3_return {
            "float4".to_string()
        } else {
            self.convert_type_name(&func.return_type)?
        };
        let fn_name = if is_main { "_main" } else { func.name.as_str() };
        write!(out, "{return_type} {fn_name}(")?;

        let mut first = true;
        for (param_idx, param) in func.params.iter().enumerate() {
            if !first {
                out.push_str(", ");
            }
            first = false;
            let ty = self.convert_param_type(&param.type_name)?;
            write!(out, "{ty} {}", param.name)?;
            if is_main {
                if let Some(attr) = param.mapping.as_deref().and_then(semantic_attribute) {
                    write!(out, " [[{attr}]]")?;
                } else if param_idx == 0 {
                    out.push_str(" [[stage_in]]");
                }
            }
        }

        let fi = &self.info.functions[idx];
        if is_main {
            if self.info.has_uniform_block() {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write!(
                    out,
                    "constant UniformData &uniforms [[buffer({UNIFORM_BUFFER_SLOT})]]"
                )?;
            }
            if self.kind == ShaderKind::Fragment {
                let mut texture_slot = 0;
                for (uniform, &class) in
                    self.shader.uniforms.iter().zip(&self.info.uniform_classes)
                {
                    if class != StorageClass::Texture {
                        continue;
                    }
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    let ty = self.convert_type_name(&uniform.type_name)?;
                    write!(out, "{ty} {} [[texture({texture_slot})]]", uniform.name)?;
                    texture_slot += 1;
                }
                for (slot, decl) in self.shader.samplers.iter().enumerate() {
                    if !first {
                        out.push_str(", ");
                    }
                    first = false;
                    write!(out, "sampler {} [[sampler({slot})]]", decl.name)?;
                }
            }
        } else {
            if fi.requires_uniforms {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                out.push_str("constant UniformData &uniforms");
            }
            for uni_idx in self.texture_decl_order(&fi.textures) {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                let uniform = &self.shader.uniforms[uni_idx];
                let ty = self.convert_type_name(&uniform.type_name)?;
                write!(out, "{ty} {}", uniform.name)?;
            }
            for smp_idx in self.sampler_decl_order(&fi.samplers) {
                if !first {
                    out.push_str(", ");
                }
                first = false;
                write!(out, "sampler {}", self.shader.samplers[smp_idx].name)?;
            }
        }
        out.push_str(")\n");

        let rewriter = Rewriter {
            shader: self.shader,
            info: self.info,
            frag_float3_return,
        };
        let body = rewriter.rewrite(func.body.clone())?;
        out.push_str(body.trim_start());
        Ok(())
    }

    /// Texture uniform indices from `set`, reordered by declaration.
    fn texture_decl_order(&self, set: &[usize]) -> Vec<usize> {
        (0..self.shader.uniforms.len())
            .filter(|i| set.contains(i))
            .collect()
    }

    fn sampler_decl_order(&self, set: &[usize]) -> Vec<usize> {
        (0..self.shader.samplers.len())
            .filter(|i| set.contains(i))
            .collect()
    }

    /// Type conversion for declarations: struct renames, then keyword map.
    fn convert_type_name(&self, name: &str) -> Result<String, Error> {
        if let Some(idx) = self.shader.structs.iter().position(|s| s.name == name) {
            if self.info.struct_usage[idx].is_split() {
                return Ok(format!("{name}_Out"));
            }
            return Ok(name.to_string());
        }
        match keywords::convert_type(name)? {
            Some(msl) => Ok(msl.into_owned()),
            None => Ok(name.to_string()),
        }
    }

    /// Parameter types pick the `_In` variant of split structs.
    fn convert_param_type(&self, name: &str) -> Result<String, Error> {
        if let Some(idx) = self.shader.structs.iter().position(|s| s.name == name) {
            if self.info.struct_usage[idx].is_split() {
                return Ok(format!("{name}_In"));
            }
            return Ok(name.to_string());
        }
        match keywords::convert_type(name)? {
            Some(msl) => Ok(msl.into_owned()),
            None => Ok(name.to_string()),
        }
    }

    pub fn finish_meta(&self) -> Result<ShaderMeta, Error> {
        let mut meta = ShaderMeta {
            uniform_block_size: self.block_size,
            ..Default::default()
        };

        let mut texture_slot = 0;
        for (idx, (uniform, &class)) in self
            .shader
            .uniforms
            .iter()
            .zip(&self.info.uniform_classes)
            .enumerate()
        {
            let (slot, sampler_slot) = match class {
                StorageClass::Texture => {
                    let s = texture_slot;
                    texture_slot += 1;
                    (
                        Some(s),
                        self.info.texture_samplers[idx].map(|smp| smp as u32),
                    )
                }
                StorageClass::Uniform => (None, None),
            };
            meta.uniforms.push(UniformMeta {
                name: uniform.name.clone(),
                kind: ParamKind::from_type_name(&uniform.type_name),
                offset: self.offsets[idx].unwrap_or(0),
                texture_slot: slot,
                sampler_slot,
                array_count: uniform.array_count.max(1),
                default_value: uniform.default_value.clone(),
            });
        }
        meta.texture_count = texture_slot;

        match self.kind {
            ShaderKind::Vertex => self.fill_vertex_meta(&mut meta)?,
            ShaderKind::Fragment => {
                meta.samplers = self
                    .shader
                    .samplers
                    .iter()
                    .map(|s| sampler::SamplerDescriptor::from_info(&s.info))
                    .collect();
            }
        }
        Ok(meta)
    }

    fn fill_vertex_meta(&self, meta: &mut ShaderMeta) -> Result<(), Error> {
        let main = self.shader.main_function().ok_or(Error::MissingMain)?;
        let mut attribute = 0u32;
        let mut first_struct = true;
        for param in &main.params {
            let Some(decl) = self.shader.structs.iter().find(|s| s.name == param.type_name)
            else {
                continue;
            };
            for field in &decl.fields {
                let Some(mapping) = field.mapping.as_deref() else {
                    continue;
                };
                let format = match stream_for_semantic(mapping) {
                    Some(Stream::Texcoord { .. }) => vertex_format_for_type(&field.type_name)
                        .ok_or_else(|| Error::BadVertexSemantic(field.name.clone()))?,
                    Some(_) => VertexFormat::Float4,
                    None => {
                        log::debug!("vertex input '{}' maps no stream ({mapping})", field.name);
                        continue;
                    }
                };
                meta.vertex_attributes.push(VertexAttribute {
                    attribute,
                    buffer: attribute,
                    format,
                    stride: format.size(),
                });
                attribute += 1;

                if first_struct {
                    match stream_for_semantic(mapping) {
                        Some(Stream::Texcoord { .. }) => {
                            if let Some(Stream::Texcoord { count }) = meta
                                .streams
                                .iter_mut()
                                .find(|s| matches!(s, Stream::Texcoord { .. }))
                            {
                                *count += 1;
                            } else {
                                meta.streams.push(Stream::Texcoord { count: 1 });
                            }
                        }
                        Some(stream) => {
                            if !meta.streams.contains(&stream) {
                                meta.streams.push(stream);
                            }
                        }
                        None => {}
                    }
                }
            }
            first_struct = false;
        }
        Ok(())
    }
}

/// Semantics that translate into Metal stage attributes.
fn semantic_attribute(mapping: &str) -> Option<&'static str> {
    match mapping {
        "POSITION" => Some("position"),
        "VERTEXID" => Some("vertex_id"),
        _ => None,
    }
}

/// Map a vertex-input semantic to the stream it reads from.
fn stream_for_semantic(mapping: &str) -> Option<Stream> {
    match mapping {
        "POSITION" => Some(Stream::Position),
        "NORMAL" => Some(Stream::Normal),
        "TANGENT" => Some(Stream::Tangent),
        "COLOR" => Some(Stream::Color),
        m if m.starts_with("TEXCOORD") => Some(Stream::Texcoord { count: 0 }),
        _ => None,
    }
}

/// Width of a texcoord attribute, taken from the trailing digit of its
/// declared type.
fn vertex_format_for_type(type_name: &str) -> Option<VertexFormat> {
    match type_name.as_bytes().last() {
        Some(b'2') => Some(VertexFormat::Float2),
        Some(b'3') => Some(VertexFormat::Float3),
        Some(b'4') => Some(VertexFormat::Float4),
        Some(c) if c.is_ascii_alphabetic() => Some(VertexFormat::Float),
        _ => None,
    }
}

/// Token-by-token body rewriting.
struct Rewriter<'a> {
    shader: &'a ParsedShader,
    info: &'a ModuleInfo,
    frag_float3_return: bool,
}

/// Keywords that never participate in name rewriting.
fn is_keyword(name: &str) -> bool {
    matches!(
        name,
        "return"
            | "if"
            | "else"
            | "for"
            | "while"
            | "do"
            | "switch"
            | "case"
            | "default"
            | "break"
            | "continue"
            | "discard"
            | "true"
            | "false"
            | "const"
    )
}

impl<'a> Rewriter<'a> {
    fn tokens(&self) -> &[Token] {
        &self.shader.tokens
    }

    fn rewrite(&self, range: Range<usize>) -> Result<String, Error> {
        let mut out = String::new();
        let mut i = range.start;
        while i < range.end {
            let token = &self.tokens()[i];
            match token.kind {
                TokenKind::None => i += 1,
                TokenKind::Name => i = self.rewrite_name(&mut out, i, range.end)?,
                _ => {
                    out.push_str(&token.text);
                    i += 1;
                }
            }
        }
        Ok(out)
    }

    fn next_significant(&self, mut i: usize, end: usize) -> Option<usize> {
        while i < end {
            match self.tokens()[i].kind {
                TokenKind::SpaceTab | TokenKind::Newline | TokenKind::None => i += 1,
                _ => return Some(i),
            }
        }
        None
    }

    fn prev_significant(&self, i: usize) -> Option<&Token> {
        self.tokens()[..i]
            .iter()
            .rev()
            .find(|t| !matches!(t.kind, TokenKind::SpaceTab | TokenKind::Newline | TokenKind::None))
    }

    fn preceded_by_dot(&self, i: usize) -> bool {
        matches!(self.prev_significant(i), Some(t) if t.kind == TokenKind::Other && t.text == ".")
    }

    /// Index just past the group closed by the matching delimiter of the
    /// opener at `open`.
    fn scan_balanced(&self, open: usize, end: usize) -> Result<usize, Error> {
        let (open_ch, close_ch) = match self.tokens()[open].text.as_str() {
            "(" => ("(", ")"),
            "[" => ("[", "]"),
            "{" => ("{", "}"),
            _ => return Err(Error::UnexpectedEnd),
        };
        let mut depth = 0usize;
        let mut i = open;
        while i < end {
            let t = &self.tokens()[i];
            if t.kind == TokenKind::Other {
                if t.text == open_ch {
                    depth += 1;
                } else if t.text == close_ch {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i + 1);
                    }
                }
            }
            i += 1;
        }
        Err(Error::Unbalanced(open_ch.chars().next().unwrap()))
    }

    /// Split the argument list of the call whose `(` sits at `open` into
    /// top-level comma-separated token ranges. Returns the ranges plus the
    /// index just past the closing paren.
    fn split_args(&self, open: usize, end: usize) -> Result<(Vec<Range<usize>>, usize), Error> {
        let after = self.scan_balanced(open, end)?;
        let close = after - 1;
        let mut args = Vec::new();
        let mut depth = 0usize;
        let mut arg_start = open + 1;
        for i in open..close {
            let t = &self.tokens()[i];
            if t.kind != TokenKind::Other {
                continue;
            }
            match t.text.as_str() {
                "(" | "[" => depth += 1,
                ")" | "]" => depth -= 1,
                "," if depth == 1 => {
                    args.push(arg_start..i);
                    arg_start = i + 1;
                }
                _ => {}
            }
        }
        if self.next_significant(arg_start, close).is_some() || !args.is_empty() {
            args.push(arg_start..close);
        }
        Ok((args, after))
    }

    /// End of the postfix chain starting at the name at `start`:
    /// member accesses, calls and index expressions.
    fn chain_end(&self, start: usize, end: usize) -> Result<usize, Error> {
        let mut i = start + 1;
        loop {
            let Some(sig) = self.next_significant(i, end) else {
                return Ok(i);
            };
            let t = &self.tokens()[sig];
            if t.kind != TokenKind::Other {
                return Ok(i);
            }
            match t.text.as_str() {
                "." => {
                    let Some(member) = self.next_significant(sig + 1, end) else {
                        return Ok(i);
                    };
                    if self.tokens()[member].kind != TokenKind::Name {
                        return Ok(i);
                    }
                    i = member + 1;
                }
                "(" | "[" => i = self.scan_balanced(sig, end)?,
                _ => return Ok(i),
            }
        }
    }

    /// End of a single comparison operand starting at `start`: optional
    /// unary prefixes, then a parenthesized group or a postfix chain.
    fn operand_end(&self, start: usize, end: usize) -> Result<usize, Error> {
        let mut i = start;
        loop {
            let Some(sig) = self.next_significant(i, end) else {
                return Err(Error::UnexpectedEnd);
            };
            let t = &self.tokens()[sig];
            match t.kind {
                TokenKind::Other if matches!(t.text.as_str(), "-" | "!" | "+" | "~") => {
                    i = sig + 1;
                }
                TokenKind::Other if t.text == "(" => return self.scan_balanced(sig, end),
                TokenKind::Name => return self.chain_end(sig, end),
                _ => return Err(Error::UnexpectedEnd),
            }
        }
    }

    /// The comparator that follows position `i`, with the index just past
    /// its tokens.
    fn comparator_at(&self, i: usize, end: usize) -> Option<(&'static str, usize)> {
        let first = self.next_significant(i, end)?;
        let a = &self.tokens()[first];
        if a.kind != TokenKind::Other {
            return None;
        }
        let b = self.tokens().get(first + 1).filter(|t| t.kind == TokenKind::Other);
        let op = keywords::comparator(&a.text, b.map(|t| t.text.as_str()))?;
        let consumed = if op.len() == 2 { first + 2 } else { first + 1 };
        Some((op, consumed))
    }

    fn rewrite_name(&self, out: &mut String, i: usize, end: usize) -> Result<usize, Error> {
        let name = self.tokens()[i].text.as_str();

        if name == "return" && self.frag_float3_return {
            return self.rewrite_return(out, i, end);
        }
        if is_keyword(name) {
            out.push_str(name);
            return Ok(i + 1);
        }
        if name == "clip" {
            return Err(Error::UnsupportedIntrinsic("clip".to_string()));
        }
        if name == "obs_glsl_compile" {
            out.push_str("false");
            return Ok(i + 1);
        }

        // Comparison sites reduce componentwise: `a.b == c` becomes
        // `all(a.b == c)`. Only chains that start outside a member access
        // are candidates, so the check runs before any other rewriting and
        // the wrapped operands are rewritten recursively.
        if !self.preceded_by_dot(i) {
            let lhs_end = self.chain_end(i, end)?;
            if let Some((op, after_op)) = self.comparator_at(lhs_end, end) {
                let rhs_end = self.operand_end(after_op, end)?;
                let lhs = self.rewrite(i..lhs_end)?;
                let rhs = self.rewrite(after_op..rhs_end)?;
                write!(out, "all({} {op} {})", lhs.trim(), rhs.trim())?;
                return Ok(rhs_end);
            }
        }

        if let Some((uni_idx, StorageClass::Texture)) = self.info.uniform_class(self.shader, name) {
            if let Some(consumed) = self.rewrite_texture_access(out, i, uni_idx, end)? {
                return Ok(consumed);
            }
            out.push_str(name);
            return Ok(i + 1);
        }

        if name == "mul" || name == "mad" {
            if let Some(open) = self.call_open(i, end) {
                let (args, after) = self.split_args(open, end)?;
                let parts = args
                    .iter()
                    .map(|r| self.rewrite(r.clone()).map(|s| s.trim().to_string()))
                    .collect::<Result<Vec<_>, _>>()?;
                match (name, parts.as_slice()) {
                    ("mul", [a, b]) => write!(out, "({a}) * ({b})")?,
                    ("mad", [a, b, c]) => write!(out, "(({a}) * ({b})) + ({c})")?,
                    _ => {
                        return Err(Error::BadArity(
                            name.to_string(),
                            parts.len(),
                            if name == "mul" { 2 } else { 3 },
                        ))
                    }
                }
                return Ok(after);
            }
        }

        if let Some(renamed) = keywords::intrinsic(name) {
            out.push_str(renamed);
            return Ok(i + 1);
        }

        if let Some(msl) = keywords::convert_type(name)? {
            out.push_str(&msl);
            return Ok(i + 1);
        }

        if let Some(func_idx) = self.shader.functions.iter().position(|f| f.name == name) {
            let fi = &self.info.functions[func_idx];
            if fi.needs_extra_args() {
                if let Some(open) = self.call_open(i, end) {
                    let (args, after) = self.split_args(open, end)?;
                    write!(out, "{name}(")?;
                    let mut first = true;
                    for arg in &args {
                        if !first {
                            out.push_str(", ");
                        }
                        first = false;
                        out.push_str(self.rewrite(arg.clone())?.trim());
                    }
                    if fi.requires_uniforms {
                        if !first {
                            out.push_str(", ");
                        }
                        first = false;
                        out.push_str("uniforms");
                    }
                    for uni_idx in 0..self.shader.uniforms.len() {
                        if fi.textures.contains(&uni_idx) {
                            if !first {
                                out.push_str(", ");
                            }
                            first = false;
                            out.push_str(&self.shader.uniforms[uni_idx].name);
                        }
                    }
                    for smp_idx in 0..self.shader.samplers.len() {
                        if fi.samplers.contains(&smp_idx) {
                            if !first {
                                out.push_str(", ");
                            }
                            first = false;
                            out.push_str(&self.shader.samplers[smp_idx].name);
                        }
                    }
                    out.push(')');
                    return Ok(after);
                }
            }
            out.push_str(name);
            return Ok(i + 1);
        }

        if let Some(struct_idx) = self.shader.structs.iter().position(|s| s.name == name) {
            if self.info.struct_usage[struct_idx].is_split() {
                write!(out, "{name}_Out")?;
                return Ok(i + 1);
            }
            out.push_str(name);
            return Ok(i + 1);
        }

        if let Some((_, StorageClass::Uniform)) = self.info.uniform_class(self.shader, name) {
            if !self.preceded_by_dot(i) {
                write!(out, "uniforms.{name}")?;
                return Ok(i + 1);
            }
        }

        out.push_str(name);
        Ok(i + 1)
    }

    /// Index of the `(` opening a call on the name at `i`, if one follows.
    fn call_open(&self, i: usize, end: usize) -> Option<usize> {
        let sig = self.next_significant(i + 1, end)?;
        let t = &self.tokens()[sig];
        (t.kind == TokenKind::Other && t.text == "(").then_some(sig)
    }

    /// Rewrite `return <expr>;` into `return float4(<expr>, 1);` for
    /// fragment entry points declared as returning `float3`. Metal
    /// forbids 3-component color attachments.
    fn rewrite_return(&self, out: &mut String, i: usize, end: usize) -> Result<usize, Error> {
        let mut j = i + 1;
        let mut depth = 0usize;
        while j < end {
            let t = &self.tokens()[j];
            if t.kind == TokenKind::Other {
                match t.text.as_str() {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth = depth.saturating_sub(1),
                    ";" if depth == 0 => break,
                    _ => {}
                }
            }
            j += 1;
        }
        if j >= end {
            return Err(Error::UnexpectedEnd);
        }
        let expr = self.rewrite(i + 1..j)?;
        write!(out, "return float4({}, 1);", expr.trim())?;
        Ok(j + 1)
    }

    /// Rewrite `tex.Sample*(...)` / `tex.Load(...)` member calls. Returns
    /// `None` when the texture name is not followed by a sampling method
    /// (for example when passed through to a helper function).
    fn rewrite_texture_access(
        &self,
        out: &mut String,
        i: usize,
        _uni_idx: usize,
        end: usize,
    ) -> Result<Option<usize>, Error> {
        let name = self.tokens()[i].text.as_str();
        let Some(dot) = self.next_significant(i + 1, end) else {
            return Ok(None);
        };
        if self.tokens()[dot].kind != TokenKind::Other || self.tokens()[dot].text != "." {
            return Ok(None);
        }
        let Some(method_idx) = self.next_significant(dot + 1, end) else {
            return Ok(None);
        };
        let method = self.tokens()[method_idx].text.as_str();
        if self.tokens()[method_idx].kind != TokenKind::Name || !keywords::sample_method(method) {
            return Ok(None);
        }
        let Some(open) = self.call_open(method_idx, end) else {
            return Ok(None);
        };
        let (args, after) = self.split_args(open, end)?;
        let parts = args
            .iter()
            .map(|r| self.rewrite(r.clone()).map(|s| s.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        match (method, parts.as_slice()) {
            ("Sample", [s, uv]) => write!(out, "{name}.sample({s}, {uv})")?,
            ("SampleBias", [s, uv, b]) => write!(out, "{name}.sample({s}, {uv}, bias({b}))")?,
            ("SampleGrad", [s, uv, dx, dy]) => {
                write!(out, "{name}.sample({s}, {uv}, gradient2d({dx}, {dy}))")?
            }
            ("SampleLevel", [s, uv, l]) => write!(out, "{name}.sample({s}, {uv}, level({l}))")?,
            ("Load", [_]) => {
                let arg = args[0].clone();
                self.rewrite_texture_load(out, name, arg, end)?;
            }
            _ => {
                return Err(Error::BadArity(
                    format!("{name}.{method}"),
                    parts.len(),
                    match method {
                        "Sample" => 2,
                        "SampleBias" | "SampleLevel" => 3,
                        "SampleGrad" => 4,
                        _ => 1,
                    },
                ))
            }
        }
        Ok(Some(after))
    }

    /// `Load` coordinates arrive as `int3(x, y, mip)`, `int2(x, y)` or a
    /// vector expression; `read` wants a `uint2` plus a separate level.
    fn rewrite_texture_load(
        &self,
        out: &mut String,
        name: &str,
        arg: Range<usize>,
        end: usize,
    ) -> Result<(), Error> {
        if let Some(head) = self.next_significant(arg.start, arg.end) {
            let t = &self.tokens()[head];
            if t.kind == TokenKind::Name && (t.text == "int3" || t.text == "int2") {
                if let Some(open) = self.call_open(head, end.min(arg.end)) {
                    let (parts, _) = self.split_args(open, arg.end)?;
                    let comps = parts
                        .iter()
                        .map(|r| self.rewrite(r.clone()).map(|s| s.trim().to_string()))
                        .collect::<Result<Vec<_>, _>>()?;
                    match comps.as_slice() {
                        [x, y, mip] => {
                            write!(out, "{name}.read(uint2({x}, {y}), uint({mip}))")?;
                            return Ok(());
                        }
                        [x, y] => {
                            write!(out, "{name}.read(uint2({x}, {y}), uint(0))")?;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
        let v = self.rewrite(arg)?;
        write!(out, "{name}.read(uint2(({}).xy), uint(0))", v.trim())?;
        Ok(())
    }
}
