//! Test doubles shared by the runtime's unit tests: a recording backend, a
//! canned-module compiler, and small builders for publishing catalog rows.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use catalog::{
    Annotations, BaseType, EffectCatalog, Module, TechniqueHandle, TextureHandle, TextureInfo,
    UniformInfo, UniformType,
};
use input::SharedInput;

use crate::backend::Backend;
use crate::compiler::{
    CompilerError, EffectCompiler, ParseOutput, PreprocessOutput, ShaderLanguage,
};
use crate::{Runtime, RuntimeDesc};

pub(crate) const FLOAT1: UniformType = UniformType {
    base: BaseType::Float,
    components: 1,
};
pub(crate) const INT1: UniformType = UniformType {
    base: BaseType::Int,
    components: 1,
};

/// Shared observation channels of a [`TestBackend`].
#[derive(Clone, Default)]
pub(crate) struct BackendLog {
    pub(crate) rendered: Arc<Mutex<Vec<String>>>,
    pub(crate) compiled: Arc<Mutex<Vec<usize>>>,
    pub(crate) updated: Arc<Mutex<Vec<(String, usize)>>>,
    pub(crate) compile_succeeds: Arc<AtomicBool>,
}

impl BackendLog {
    fn new() -> Self {
        let log = Self::default();
        log.compile_succeeds.store(true, Ordering::SeqCst);
        log
    }
}

pub(crate) struct TestBackend {
    log: BackendLog,
    next_handle: u64,
}

impl TestBackend {
    pub(crate) fn new() -> (Self, BackendLog) {
        let log = BackendLog::new();
        (
            Self {
                log: log.clone(),
                next_handle: 1,
            },
            log,
        )
    }
}

impl Backend for TestBackend {
    fn on_init(&mut self, _width: u32, _height: u32) -> bool {
        true
    }

    fn on_reset(&mut self) {}

    fn compile_effect(&mut self, effect_index: usize, catalog: &mut EffectCatalog) -> bool {
        self.log.compiled.lock().unwrap().push(effect_index);
        if !self.log.compile_succeeds.load(Ordering::SeqCst) {
            catalog.effects[effect_index].errors.push_str("backend refused\n");
            return false;
        }

        let filename = catalog.effects[effect_index]
            .source_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        for technique in &mut catalog.techniques {
            if technique.effect_index == effect_index && technique.handle.is_none() {
                technique.handle = TechniqueHandle::new(self.next_handle);
                self.next_handle += 1;
            }
        }
        for texture in &mut catalog.textures {
            if texture.effect_filename == filename && texture.handle.is_none() {
                texture.handle = TextureHandle::new(self.next_handle);
                self.next_handle += 1;
            }
        }
        true
    }

    fn update_texture(&mut self, texture: &catalog::Texture, data: &[u8]) {
        self.log
            .updated
            .lock()
            .unwrap()
            .push((texture.unique_name.clone(), data.len()));
    }

    fn render_technique(&mut self, technique: &catalog::Technique) {
        self.log.rendered.lock().unwrap().push(technique.name.clone());
    }

    fn capture_frame(&mut self, target: &mut [u8]) {
        for (index, byte) in target.iter_mut().enumerate() {
            *byte = (index % 251) as u8;
        }
    }
}

/// Compiler returning canned modules. Preprocessing emits the file stem as
/// "source"; parsing maps that stem back to a configured [`Module`]. Stems
/// starting with `bad_pre` or `bad_parse` fail the respective stage.
#[derive(Default)]
pub(crate) struct StubCompiler {
    modules: Mutex<HashMap<String, Module>>,
}

impl StubCompiler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_module(self, stem: &str, module: Module) -> Self {
        self.modules.lock().unwrap().insert(stem.to_string(), module);
        self
    }
}

impl EffectCompiler for StubCompiler {
    fn preprocess(
        &self,
        source_file: &Path,
        _include_paths: &[std::path::PathBuf],
        _macros: &[(String, String)],
    ) -> Result<PreprocessOutput, CompilerError> {
        let stem = source_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.starts_with("bad_pre") {
            return Err(CompilerError("unterminated #if".to_string()));
        }
        Ok(PreprocessOutput {
            source: stem,
            warnings: String::new(),
        })
    }

    fn parse(
        &self,
        source: &str,
        _language: ShaderLanguage,
        _shader_model: u32,
    ) -> Result<ParseOutput, CompilerError> {
        if source.starts_with("bad_parse") {
            return Err(CompilerError("syntax error".to_string()));
        }
        let module = self
            .modules
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .unwrap_or_default();
        Ok(ParseOutput {
            module,
            warnings: String::new(),
        })
    }
}

/// A runtime wired to a [`TestBackend`], a [`StubCompiler`], and a shared
/// input pump, with its configuration inside `dir`.
pub(crate) fn test_runtime(dir: &Path) -> (Runtime, SharedInput, BackendLog) {
    test_runtime_with_compiler(dir, StubCompiler::new())
}

pub(crate) fn test_runtime_with_compiler(
    dir: &Path,
    compiler: impl EffectCompiler + 'static,
) -> (Runtime, SharedInput, BackendLog) {
    let (backend, log) = TestBackend::new();
    let pump = SharedInput::new();
    let desc = RuntimeDesc {
        renderer_id: 0xb000,
        vendor_id: 0x10de,
        device_id: 0x1c82,
        executable_path: dir.join("game.exe"),
        config_path: dir.join("runtime.ini"),
    };
    let mut runtime = Runtime::new(
        desc,
        Box::new(backend),
        Arc::new(compiler),
        Box::new(pump.clone()),
    );
    runtime.width = 64;
    runtime.height = 64;
    (runtime, pump, log)
}

/// Publishes a module built from loose parts, assigning sequential offsets.
pub(crate) fn publish(
    catalog: &mut EffectCatalog,
    file: &str,
    mut uniforms: Vec<UniformInfo>,
    textures: Vec<TextureInfo>,
) -> usize {
    let mut offset = 0;
    for info in &mut uniforms {
        info.offset = offset;
        offset += info.size;
    }
    catalog.publish_module(
        Path::new(file),
        Module {
            uniforms,
            textures,
            ..Module::default()
        },
        String::new(),
    )
}

/// A uniform info with annotations given as string pairs; values that look
/// numeric become typed annotation values.
pub(crate) fn uniform(name: &str, ty: UniformType, annotations: &[(&str, &str)]) -> UniformInfo {
    let mut ann = Annotations::new();
    for (key, value) in annotations {
        if value.contains('.') {
            if let Ok(parsed) = value.parse::<f32>() {
                ann.insert(*key, parsed);
                continue;
            }
        }
        if let Ok(parsed) = value.parse::<i32>() {
            ann.insert(*key, parsed);
        } else {
            ann.insert(*key, *value);
        }
    }
    UniformInfo {
        name: name.to_string(),
        ty,
        size: ty.components * 4,
        offset: 0,
        annotations: ann,
        initializer: None,
    }
}
