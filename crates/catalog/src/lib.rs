//! In-memory database of loaded effects. Loader workers publish parsed
//! modules into the catalog one at a time; the render thread reads rows and
//! drives uniform values through the shared storage arena.
//!
//! ```text
//!   loader worker ──▶ EffectCatalog::publish_module ──▶ effects/uniforms/
//!         (one per file, serialised by the              textures/techniques
//!          runtime's catalog mutex)                     + UniformStorage
//!                                                              │
//!   render thread ◀── rows by index, values by UniformSlot ◀───┘
//! ```
//!
//! Publication materialises rows from the parser's [`Module`]: uniform slots
//! are appended to the arena and reset to their initializers, `source`
//! annotations are baked into [`Special`] dispatch values, textures are
//! deduplicated globally by `unique_name`, and techniques record the index
//! of their owning effect. Each effect's region is padded to a 16-byte
//! multiple and never overlaps another effect's.

mod annotations;
mod module;
mod rows;
mod special;
mod storage;

use std::path::Path;

pub use annotations::{AnnotationValue, Annotations};
pub use module::{
    BaseType, Constant, Module, SpecConstant, TechniqueInfo, TextureFormat, TextureInfo,
    UniformInfo, UniformType,
};
pub use rows::{
    EffectData, MovingAverage, Technique, TechniqueHandle, Texture, TextureHandle,
    TextureReference, Uniform,
};
pub use special::{Special, TriggerMode};
pub use storage::{UniformSlot, UniformStorage};

use input::KeyCombo;

/// Row tables for everything the loader has published, plus the value arena.
#[derive(Debug, Default)]
pub struct EffectCatalog {
    pub effects: Vec<EffectData>,
    pub uniforms: Vec<Uniform>,
    pub textures: Vec<Texture>,
    pub techniques: Vec<Technique>,
    pub storage: UniformStorage,
}

impl EffectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every row and the arena. Row indices from before a clear are
    /// meaningless afterwards.
    pub fn clear(&mut self) {
        self.effects.clear();
        self.uniforms.clear();
        self.textures.clear();
        self.techniques.clear();
        self.storage.clear();
    }

    /// Materialises one parsed module into catalog rows. `errors` carries
    /// the warnings accumulated so far for this file; registration may
    /// append to it. Returns the new effect's index.
    pub fn publish_module(
        &mut self,
        source_file: &Path,
        module: Module,
        mut errors: String,
    ) -> usize {
        let effect_index = self.effects.len();
        let effect_filename = source_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let base_offset = self.storage.len();

        for info in &module.uniforms {
            let storage_offset = base_offset + info.offset as usize;
            self.storage.grow_to(storage_offset + info.size as usize);

            let uniform = Uniform {
                name: info.name.clone(),
                effect_filename: effect_filename.clone(),
                ty: info.ty,
                size: info.size,
                offset: info.offset,
                storage_offset,
                special: Special::from_annotations(&info.annotations),
                hidden: info.annotations.flag("hidden"),
                annotations: info.annotations.clone(),
                initializer: info.initializer,
            };
            self.storage
                .reset(uniform.slot(), uniform.initializer.as_ref());
            self.uniforms.push(uniform);
        }

        for info in &module.textures {
            self.register_texture(info, &effect_filename, &mut errors);
        }

        for info in &module.techniques {
            self.techniques.push(Technique {
                name: info.name.clone(),
                effect_filename: effect_filename.clone(),
                effect_index,
                enabled: info.annotations.flag("enabled"),
                hidden: info.annotations.flag("hidden"),
                timeout: info.annotations.int("timeout") as i64,
                timeleft: info.annotations.int("timeout") as i64,
                toggle_key: KeyCombo {
                    keycode: info.annotations.uint("toggle"),
                    ctrl: info.annotations.flag("togglectrl"),
                    shift: info.annotations.flag("toggleshift"),
                    alt: info.annotations.flag("togglealt"),
                },
                average_cpu: MovingAverage::new(),
                average_gpu: MovingAverage::new(),
                handle: None,
                annotations: info.annotations.clone(),
            });
        }

        let storage_size = (self.storage.len() - base_offset + 15) & !15;
        self.storage.grow_to(base_offset + storage_size);

        self.effects.push(EffectData {
            source_file: source_file.to_path_buf(),
            errors,
            module,
            storage_offset: base_offset,
            storage_size,
        });

        effect_index
    }

    /// Registers a texture, enforcing global `unique_name` uniqueness. The
    /// first registrant owns the texture; later declarations merge silently
    /// unless a plain texture disagrees on dimensions, which appends a
    /// warning to the current effect's error block.
    fn register_texture(&mut self, info: &TextureInfo, effect_filename: &str, errors: &mut String) {
        if let Some(existing) = self
            .textures
            .iter()
            .find(|texture| texture.unique_name == info.unique_name)
        {
            if info.semantic.is_empty()
                && (existing.width != info.width
                    || existing.height != info.height
                    || existing.levels != info.levels
                    || existing.format != info.format)
            {
                errors.push_str(&format!(
                    "warning: {} already created a texture with the same name but different dimensions; \
                     textures are shared across all effects, so either rename the variable or adjust \
                     the dimensions so they match\n",
                    existing.effect_filename
                ));
            }
            return;
        }

        let impl_reference = match info.semantic.as_str() {
            "COLOR" => TextureReference::BackBuffer,
            "DEPTH" => TextureReference::DepthBuffer,
            "" => TextureReference::None,
            other => {
                errors.push_str(&format!(
                    "warning: {}: unknown semantic '{other}'\n",
                    info.unique_name
                ));
                TextureReference::None
            }
        };

        self.textures.push(Texture {
            unique_name: info.unique_name.clone(),
            effect_filename: effect_filename.to_string(),
            width: info.width,
            height: info.height,
            levels: info.levels,
            format: info.format,
            impl_reference,
            annotations: info.annotations.clone(),
            handle: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn float_uniform(name: &str, offset: u32) -> UniformInfo {
        UniformInfo {
            name: name.to_string(),
            ty: UniformType::scalar(BaseType::Float),
            size: 4,
            offset,
            ..UniformInfo::default()
        }
    }

    fn texture(name: &str, width: u32, semantic: &str) -> TextureInfo {
        TextureInfo {
            unique_name: name.to_string(),
            semantic: semantic.to_string(),
            width,
            height: 32,
            levels: 1,
            ..TextureInfo::default()
        }
    }

    #[test]
    fn publication_lays_out_padded_regions() {
        let mut catalog = EffectCatalog::new();

        let first = Module {
            uniforms: vec![float_uniform("intensity", 0), float_uniform("radius", 4)],
            ..Module::default()
        };
        let second = Module {
            uniforms: vec![float_uniform("strength", 0)],
            ..Module::default()
        };

        let a = catalog.publish_module(Path::new("a.fx"), first, String::new());
        let b = catalog.publish_module(Path::new("b.fx"), second, String::new());

        assert_eq!((a, b), (0, 1));
        assert_eq!(catalog.effects[a].storage_offset, 0);
        assert_eq!(catalog.effects[a].storage_size, 16);
        assert_eq!(catalog.effects[b].storage_offset, 16);
        assert_eq!(catalog.effects[b].storage_size, 16);
        assert_eq!(catalog.storage.len(), 32);

        // Regions must not overlap and every uniform must fit its region.
        for uniform in &catalog.uniforms {
            assert!(uniform.storage_offset + uniform.size as usize <= catalog.storage.len());
        }
        assert_eq!(catalog.uniforms[2].name, "strength");
        assert_eq!(catalog.uniforms[2].storage_offset, 16);
    }

    #[test]
    fn uniform_initializers_are_applied() {
        let mut catalog = EffectCatalog::new();
        let mut info = float_uniform("intensity", 0);
        info.initializer = Some(Constant::from_float(0.75));

        catalog.publish_module(Path::new("a.fx"), Module {
            uniforms: vec![info],
            ..Module::default()
        }, String::new());

        let mut out = [0.0f32; 1];
        let slot = catalog.uniforms[0].slot();
        catalog.storage.get_float(slot, &mut out);
        assert_eq!(out, [0.75]);
    }

    #[test]
    fn special_classification_from_source_annotation() {
        let mut info = float_uniform("timer", 0);
        info.annotations.insert("source", "frametime");

        let mut plain = float_uniform("user", 4);
        plain.annotations.insert("ui_label", "User value");

        let mut catalog = EffectCatalog::new();
        catalog.publish_module(Path::new("a.fx"), Module {
            uniforms: vec![info, plain],
            ..Module::default()
        }, String::new());

        assert_eq!(catalog.uniforms[0].special, Some(Special::FrameTime));
        assert_eq!(catalog.uniforms[1].special, None);
    }

    #[test]
    fn duplicate_texture_with_differing_dimensions_warns_once() {
        let mut catalog = EffectCatalog::new();

        catalog.publish_module(Path::new("a.fx"), Module {
            textures: vec![texture("Tex", 64, "")],
            ..Module::default()
        }, String::new());
        catalog.publish_module(Path::new("b.fx"), Module {
            textures: vec![texture("Tex", 128, "")],
            ..Module::default()
        }, String::new());

        assert_eq!(catalog.textures.len(), 1, "first registrant wins");
        assert_eq!(catalog.textures[0].width, 64);
        assert_eq!(catalog.textures[0].effect_filename, "a.fx");
        assert!(catalog.effects[1].errors.contains("different dimensions"));
        assert!(catalog.effects[0].errors.is_empty());
    }

    #[test]
    fn duplicate_texture_with_matching_dimensions_merges_silently() {
        let mut catalog = EffectCatalog::new();

        catalog.publish_module(Path::new("a.fx"), Module {
            textures: vec![texture("Tex", 64, "")],
            ..Module::default()
        }, String::new());
        catalog.publish_module(Path::new("b.fx"), Module {
            textures: vec![texture("Tex", 64, "")],
            ..Module::default()
        }, String::new());

        assert_eq!(catalog.textures.len(), 1);
        assert!(catalog.effects[1].errors.is_empty());
    }

    #[test]
    fn semantics_reserve_runtime_resources() {
        let mut catalog = EffectCatalog::new();

        catalog.publish_module(Path::new("a.fx"), Module {
            textures: vec![
                texture("BackBufferTex", 0, "COLOR"),
                texture("DepthTex", 0, "DEPTH"),
                texture("OddTex", 0, "NORMALS"),
            ],
            ..Module::default()
        }, String::new());

        assert_eq!(
            catalog.textures[0].impl_reference,
            TextureReference::BackBuffer
        );
        assert_eq!(
            catalog.textures[1].impl_reference,
            TextureReference::DepthBuffer
        );
        assert_eq!(catalog.textures[2].impl_reference, TextureReference::None);
        assert!(catalog.effects[0].errors.contains("unknown semantic 'NORMALS'"));
    }

    #[test]
    fn techniques_record_owning_effect_and_annotations() {
        let mut info = TechniqueInfo {
            name: "Vibrance".to_string(),
            ..TechniqueInfo::default()
        };
        info.annotations.insert("enabled", 1u32);
        info.annotations.insert("timeout", 250i32);
        info.annotations.insert("toggle", 0x20u32);
        info.annotations.insert("togglectrl", 1u32);

        let mut catalog = EffectCatalog::new();
        catalog.publish_module(Path::new("first.fx"), Module::default(), String::new());
        catalog.publish_module(Path::new("vibrance.fx"), Module {
            techniques: vec![info],
            ..Module::default()
        }, String::new());

        let technique = &catalog.techniques[0];
        assert_eq!(technique.effect_index, 1);
        assert_eq!(technique.effect_filename, "vibrance.fx");
        assert!(technique.enabled);
        assert_eq!(technique.timeout, 250);
        assert_eq!(technique.timeleft, 250);
        assert_eq!(technique.toggle_key.keycode, 0x20);
        assert!(technique.toggle_key.ctrl);
        assert!(technique.handle.is_none());
    }

    #[test]
    fn clear_resets_everything() {
        let mut catalog = EffectCatalog::new();
        catalog.publish_module(Path::new("a.fx"), Module {
            uniforms: vec![float_uniform("x", 0)],
            textures: vec![texture("Tex", 64, "")],
            techniques: vec![TechniqueInfo {
                name: "T".to_string(),
                ..TechniqueInfo::default()
            }],
            ..Module::default()
        }, String::new());

        catalog.clear();
        assert!(catalog.effects.is_empty());
        assert!(catalog.uniforms.is_empty());
        assert!(catalog.textures.is_empty());
        assert!(catalog.techniques.is_empty());
        assert_eq!(catalog.storage.len(), 0);

        let path = PathBuf::from("b.fx");
        let index = catalog.publish_module(&path, Module::default(), String::new());
        assert_eq!(index, 0, "indices restart after a clear");
    }
}
