//! Rename tables between the source language and MSL.

use std::borrow::Cow;

use crate::Error;

/// Intrinsics that exist under a different name in MSL.
pub fn intrinsic(name: &str) -> Option<&'static str> {
    match name {
        "ddx" => Some("dfdx"),
        "ddy" => Some("dfdy"),
        "frac" => Some("fract"),
        "lerp" => Some("mix"),
        _ => None,
    }
}

/// Texture sampling methods rewritten at member-call sites.
pub fn sample_method(name: &str) -> bool {
    matches!(
        name,
        "Sample" | "SampleBias" | "SampleGrad" | "SampleLevel" | "Load"
    )
}

/// Comparison operators that get wrapped in `all(...)` so vector operands
/// reduce componentwise.
pub fn comparator(a: &str, b: Option<&str>) -> Option<&'static str> {
    match (a, b) {
        ("=", Some("=")) => Some("=="),
        ("!", Some("=")) => Some("!="),
        ("<", Some("=")) => Some("<="),
        (">", Some("=")) => Some(">="),
        // A doubled bracket is a shift, not a comparison.
        ("<", Some("<")) | (">", Some(">")) => None,
        ("<", _) => Some("<"),
        (">", _) => Some(">"),
        _ => None,
    }
}

/// Translate a source type name into its MSL spelling.
///
/// The source's `half` is single precision semantically, so it widens to
/// `float`; the reduced-precision `min16*` family becomes Metal's native
/// half/short types instead.
pub fn type_name(name: &str) -> Result<Cow<'static, str>, Error> {
    match name {
        "texture2d" => return Ok(Cow::Borrowed("texture2d<float>")),
        "texture3d" => return Ok(Cow::Borrowed("texture3d<float>")),
        "texture_cube" => return Ok(Cow::Borrowed("texturecube<float>")),
        "double" | "min10float" | "min13int" | "texture_rect" => {
            return Err(Error::UnsupportedType(name.to_string()))
        }
        _ => {}
    }
    if let Some(rest) = name.strip_prefix("min16float") {
        return Ok(Cow::Owned(format!("half{rest}")));
    }
    if let Some(rest) = name.strip_prefix("min16int") {
        return Ok(Cow::Owned(format!("short{rest}")));
    }
    if let Some(rest) = name.strip_prefix("min16uint") {
        return Ok(Cow::Owned(format!("ushort{rest}")));
    }
    if let Some(rest) = name.strip_prefix("half") {
        if rest.is_empty() || rest.bytes().all(|b| b.is_ascii_digit() || b == b'x') {
            return Ok(Cow::Owned(format!("float{rest}")));
        }
    }
    Ok(Cow::Borrowed(""))
}

/// Whether `name` has a dedicated MSL spelling at all; passthrough names
/// return `None` from [`type_name`] via the empty sentinel.
pub fn convert_type(name: &str) -> Result<Option<Cow<'static, str>>, Error> {
    let mapped = type_name(name)?;
    if mapped.is_empty() {
        Ok(None)
    } else {
        Ok(Some(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textures_gain_component_type() {
        assert_eq!(type_name("texture2d").unwrap(), "texture2d<float>");
        assert_eq!(type_name("texture_cube").unwrap(), "texturecube<float>");
    }

    #[test]
    fn half_widens_min16_narrows() {
        assert_eq!(type_name("half4").unwrap(), "float4");
        assert_eq!(type_name("min16float2").unwrap(), "half2");
        assert_eq!(type_name("min16uint").unwrap(), "ushort");
    }

    #[test]
    fn doubles_are_rejected() {
        assert!(matches!(
            type_name("double"),
            Err(Error::UnsupportedType(_))
        ));
    }

    #[test]
    fn halfword_names_pass_through() {
        // `halfpel` is a user identifier, not the half type family.
        assert_eq!(type_name("halfpel").unwrap(), "");
    }
}
