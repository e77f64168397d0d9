//! Shader compiler contract and the inputs the loader feeds it: the include
//! path set, the embedded macro table, and the shader-model selection
//! derived from the renderer id. Preprocessing and parsing themselves are
//! external; the runtime only routes sources through and collects the
//! resulting [`Module`] or error text.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use catalog::Module;
use thiserror::Error;

/// Compiler failure, carrying the preprocessor's or parser's own log.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct CompilerError(pub String);

/// Preprocessed source plus any warnings emitted along the way.
pub struct PreprocessOutput {
    pub source: String,
    pub warnings: String,
}

/// Parsed module plus any warnings emitted along the way.
pub struct ParseOutput {
    pub module: Module,
    pub warnings: String,
}

/// Code generation target selected from the renderer id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderLanguage {
    Hlsl,
    Glsl,
}

/// The external effect preprocessor and parser.
///
/// Implementations run on loader worker threads, one file per call, and
/// must not retain references into the request.
pub trait EffectCompiler: Send + Sync {
    fn preprocess(
        &self,
        source_file: &Path,
        include_paths: &[PathBuf],
        macros: &[(String, String)],
    ) -> Result<PreprocessOutput, CompilerError>;

    fn parse(
        &self,
        source: &str,
        language: ShaderLanguage,
        shader_model: u32,
    ) -> Result<ParseOutput, CompilerError>;
}

/// Shader model tier for a renderer id.
pub fn shader_model_for(renderer_id: u32) -> u32 {
    if renderer_id < 0xa000 {
        30
    } else if renderer_id < 0xa100 {
        40
    } else if renderer_id < 0xb000 {
        41
    } else {
        50
    }
}

/// Code generation backend for a renderer id.
pub fn shader_language_for(renderer_id: u32) -> ShaderLanguage {
    if renderer_id & 0x10000 != 0 {
        ShaderLanguage::Glsl
    } else {
        ShaderLanguage::Hlsl
    }
}

/// Inputs for the embedded macro table, snapshotted at reload time.
pub(crate) struct MacroEnvironment {
    pub(crate) performance_mode: bool,
    pub(crate) vendor_id: u32,
    pub(crate) device_id: u32,
    pub(crate) renderer_id: u32,
    pub(crate) application_stem: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) definitions: Vec<String>,
}

/// Builds the macro set handed to the preprocessor: the fixed runtime
/// identifiers first, then the user's definitions so they may override.
pub(crate) fn build_macro_set(env: &MacroEnvironment) -> Vec<(String, String)> {
    let mut macros: Vec<(String, String)> = vec![
        ("__RESHADE__".into(), runtime_version().to_string()),
        (
            "__RESHADE_PERFORMANCE_MODE__".into(),
            if env.performance_mode { "1" } else { "0" }.into(),
        ),
        ("__VENDOR__".into(), env.vendor_id.to_string()),
        ("__DEVICE__".into(), env.device_id.to_string()),
        ("__RENDERER__".into(), env.renderer_id.to_string()),
        (
            "__APPLICATION__".into(),
            application_hash(&env.application_stem).to_string(),
        ),
        ("BUFFER_WIDTH".into(), env.width.to_string()),
        ("BUFFER_HEIGHT".into(), env.height.to_string()),
        (
            "BUFFER_RCP_WIDTH".into(),
            (1.0 / env.width as f32).to_string(),
        ),
        (
            "BUFFER_RCP_HEIGHT".into(),
            (1.0 / env.height as f32).to_string(),
        ),
    ];

    for definition in &env.definitions {
        if definition.is_empty() {
            continue;
        }
        match definition.split_once('=') {
            Some((name, value)) => macros.push((name.to_string(), value.to_string())),
            None => macros.push((definition.clone(), "1".to_string())),
        }
    }

    macros
}

/// `major * 10000 + minor * 100 + patch` of this crate.
fn runtime_version() -> u32 {
    let parse = |text: &str| text.parse::<u32>().unwrap_or(0);
    parse(env!("CARGO_PKG_VERSION_MAJOR")) * 10000
        + parse(env!("CARGO_PKG_VERSION_MINOR")) * 100
        + parse(env!("CARGO_PKG_VERSION_PATCH"))
}

/// Hash of the host executable stem, stable for the process lifetime.
fn application_hash(stem: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    stem.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_model_tiers() {
        assert_eq!(shader_model_for(0x9100), 30);
        assert_eq!(shader_model_for(0xa000), 40);
        assert_eq!(shader_model_for(0xa0ff), 40);
        assert_eq!(shader_model_for(0xa100), 41);
        assert_eq!(shader_model_for(0xb000), 50);
        assert_eq!(shader_model_for(0x1b000), 50);
    }

    #[test]
    fn language_follows_api_flag() {
        assert_eq!(shader_language_for(0xb000), ShaderLanguage::Hlsl);
        assert_eq!(shader_language_for(0x10000 | 0xb000), ShaderLanguage::Glsl);
    }

    fn environment() -> MacroEnvironment {
        MacroEnvironment {
            performance_mode: true,
            vendor_id: 0x10de,
            device_id: 0x1c82,
            renderer_id: 0xb000,
            application_stem: "game".to_string(),
            width: 1920,
            height: 1080,
            definitions: vec!["QUALITY=2".to_string(), "FAST_PATH".to_string()],
        }
    }

    fn lookup<'a>(macros: &'a [(String, String)], name: &str) -> Option<&'a str> {
        macros
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn macro_set_exposes_runtime_identity() {
        let macros = build_macro_set(&environment());

        assert_eq!(lookup(&macros, "__RESHADE_PERFORMANCE_MODE__"), Some("1"));
        assert_eq!(lookup(&macros, "__VENDOR__"), Some("4318"));
        assert_eq!(lookup(&macros, "__DEVICE__"), Some("7298"));
        assert_eq!(lookup(&macros, "__RENDERER__"), Some("45056"));
        assert_eq!(lookup(&macros, "BUFFER_WIDTH"), Some("1920"));
        assert_eq!(lookup(&macros, "BUFFER_HEIGHT"), Some("1080"));
        assert!(lookup(&macros, "__RESHADE__").is_some());
        assert!(lookup(&macros, "__APPLICATION__").is_some());

        let rcp: f32 = lookup(&macros, "BUFFER_RCP_WIDTH").unwrap().parse().unwrap();
        assert!((rcp - 1.0 / 1920.0).abs() < f32::EPSILON);
    }

    #[test]
    fn user_definitions_append_last() {
        let macros = build_macro_set(&environment());
        let tail: Vec<&str> = macros[macros.len() - 2..]
            .iter()
            .map(|(n, _)| n.as_str())
            .collect();
        assert_eq!(tail, ["QUALITY", "FAST_PATH"]);
        assert_eq!(lookup(&macros, "QUALITY"), Some("2"));
        assert_eq!(lookup(&macros, "FAST_PATH"), Some("1"));
    }

    #[test]
    fn application_hash_is_stable() {
        assert_eq!(application_hash("game"), application_hash("game"));
        assert_ne!(application_hash("game"), application_hash("other"));
    }
}
