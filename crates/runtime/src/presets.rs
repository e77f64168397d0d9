//! Preset load and save: an INI document binds technique enablement, a
//! total ordering over techniques, per-technique toggle hotkeys, and the
//! values of every user-facing uniform, keyed by effect filename.

use std::collections::HashSet;
use std::path::Path;

use catalog::{BaseType, EffectCatalog};
use inifile::{IniFile, GLOBAL_SECTION};
use tracing::{error, info, warn};

use crate::{disable_technique, enable_technique, Runtime};

impl Runtime {
    /// Applies the preset selected in the settings, if any.
    pub fn load_current_preset(&mut self) {
        if let Some(path) = self.settings.current_preset_file().map(Path::to_path_buf) {
            self.load_preset(&path);
        }
    }

    /// Writes current state back into the selected preset, if any.
    pub fn save_current_preset(&self) {
        if let Some(path) = self.settings.current_preset_file().map(Path::to_path_buf) {
            self.save_preset(&path);
        }
    }

    pub fn load_preset(&mut self, path: &Path) {
        let preset = match IniFile::load(path) {
            Ok(preset) => preset,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "preset unreadable");
                return;
            }
        };
        info!(path = %path.display(), "loading preset");

        let technique_list: Vec<String> = preset
            .get(GLOBAL_SECTION, "Techniques")
            .unwrap_or_default();
        let mut sorting: Vec<String> = preset
            .get(GLOBAL_SECTION, "TechniqueSorting")
            .unwrap_or_default();
        if sorting.is_empty() {
            sorting = technique_list.clone();
        }

        let mut catalog = self.shared.catalog();
        let catalog = &mut *catalog;

        // Stable sort; names missing from the ordering keep their relative
        // order at the tail.
        catalog.techniques.sort_by_key(|technique| {
            sorting
                .iter()
                .position(|name| *name == technique.name)
                .unwrap_or(sorting.len())
        });

        let EffectCatalog {
            uniforms, storage, ..
        } = catalog;
        for uniform in uniforms.iter() {
            if uniform.special.is_some() {
                continue;
            }
            let slot = uniform.slot();
            match uniform.ty.base {
                BaseType::Int => {
                    let mut values = [0i32; 16];
                    storage.get_int(slot, &mut values);
                    preset.read_values(&uniform.effect_filename, &uniform.name, &mut values);
                    storage.set_int(slot, &values);
                }
                BaseType::Bool | BaseType::Uint => {
                    let mut values = [0u32; 16];
                    storage.get_uint(slot, &mut values);
                    preset.read_values(&uniform.effect_filename, &uniform.name, &mut values);
                    storage.set_uint(slot, &values);
                }
                BaseType::Float => {
                    let mut values = [0.0f32; 16];
                    storage.get_float(slot, &mut values);
                    preset.read_values(&uniform.effect_filename, &uniform.name, &mut values);
                    storage.set_float(slot, &values);
                }
            }
        }

        for technique in &mut catalog.techniques {
            // The "enabled" annotation overrides whatever the preset says.
            if technique.annotations.flag("enabled")
                || technique_list.contains(&technique.name)
            {
                enable_technique(technique, &mut self.reload_queue);
            } else {
                disable_technique(technique);
            }

            preset.read(
                GLOBAL_SECTION,
                &format!("Key{}", technique.name),
                &mut technique.toggle_key,
            );
        }
    }

    pub fn save_preset(&self, path: &Path) {
        self.save_preset_as(path, path);
    }

    /// Saves the state belonging to the preset at `path` into `save_path`;
    /// the two differ for screenshot snapshots.
    pub(crate) fn save_preset_as(&self, path: &Path, save_path: &Path) {
        let mut preset = match IniFile::load(path) {
            Ok(preset) => preset,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "existing preset unreadable, writing fresh");
                IniFile::new()
            }
        };

        let catalog = self.shared.catalog();

        let mut technique_list = Vec::new();
        let mut sorting = Vec::new();
        let mut active_effects: HashSet<&str> = HashSet::new();

        for technique in &catalog.techniques {
            if technique.enabled {
                technique_list.push(technique.name.clone());
                active_effects.insert(technique.effect_filename.as_str());
            }
            sorting.push(technique.name.clone());

            let key_name = format!("Key{}", technique.name);
            if technique.toggle_key.keycode != 0 {
                preset.set(GLOBAL_SECTION, &key_name, technique.toggle_key);
            } else if preset.get::<u32>(GLOBAL_SECTION, &key_name).unwrap_or(0) != 0 {
                // A key was configured before this save; write an explicit
                // zero so loading does not resurrect it.
                preset.set(GLOBAL_SECTION, &key_name, 0u32);
            }
        }

        preset.set(GLOBAL_SECTION, "Techniques", technique_list);
        preset.set(GLOBAL_SECTION, "TechniqueSorting", sorting);

        for uniform in &catalog.uniforms {
            if uniform.special.is_some()
                || !active_effects.contains(uniform.effect_filename.as_str())
            {
                continue;
            }

            let slot = uniform.slot();
            let components = uniform.ty.components as usize;
            match uniform.ty.base {
                BaseType::Int => {
                    let mut values = [0i32; 16];
                    catalog.storage.get_int(slot, &mut values);
                    preset.set_values(
                        &uniform.effect_filename,
                        &uniform.name,
                        &values[..components],
                    );
                }
                BaseType::Bool | BaseType::Uint => {
                    let mut values = [0u32; 16];
                    catalog.storage.get_uint(slot, &mut values);
                    preset.set_values(
                        &uniform.effect_filename,
                        &uniform.name,
                        &values[..components],
                    );
                }
                BaseType::Float => {
                    let mut values = [0.0f32; 16];
                    catalog.storage.get_float(slot, &mut values);
                    preset.set_values(
                        &uniform.effect_filename,
                        &uniform.name,
                        &values[..components],
                    );
                }
            }
        }

        if let Err(err) = preset.save(save_path) {
            error!(path = %save_path.display(), error = %err, "failed to save preset");
        }
    }
}
