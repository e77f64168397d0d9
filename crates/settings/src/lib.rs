//! Global runtime configuration: hotkeys, search paths, preprocessor
//! definitions, the preset file list, and screenshot options, persisted as a
//! flat INI document with `[INPUT]` and `[GENERAL]` sections.
//!
//! Types:
//!
//! - `Settings` is the plain data struct the runtime consults every frame;
//!   `read_from`/`write_to` map it onto an [`IniFile`].
//! - `ConfigStore` owns the configuration path and the callback registries
//!   that let subsystems piggyback their own keys onto load and save.
//! - `ScreenshotFormat` selects the on-disk image container.
//!
//! Loading clamps the current preset index into `[-1, len)` and scans the
//! configuration directory for preset files that were dropped next to it; a
//! candidate counts as a preset when it carries a non-empty `Techniques`
//! key. Missing keys leave the compiled-in defaults untouched.

use std::fs;
use std::path::{Path, PathBuf};

use inifile::{IniError, IniFile, IniValue, GLOBAL_SECTION};
use input::{vk, KeyCombo};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Ini(#[from] IniError),
}

/// On-disk container for screenshots.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScreenshotFormat {
    #[default]
    Bmp,
    Png,
}

impl ScreenshotFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Bmp => "bmp",
            Self::Png => "png",
        }
    }
}

impl IniValue for ScreenshotFormat {
    fn from_items(items: &[String]) -> Option<Self> {
        match u32::from_items(items)? {
            0 => Some(Self::Bmp),
            1 => Some(Self::Png),
            _ => None,
        }
    }

    fn to_items(&self) -> Vec<String> {
        match self {
            Self::Bmp => 0u32,
            Self::Png => 1u32,
        }
        .to_items()
    }
}

/// Everything the runtime reads from its configuration file.
#[derive(Clone, Debug)]
pub struct Settings {
    pub screenshot_key: KeyCombo,
    pub reload_key: KeyCombo,
    pub effects_key: KeyCombo,

    pub performance_mode: bool,
    pub effect_search_paths: Vec<PathBuf>,
    pub texture_search_paths: Vec<PathBuf>,
    pub preprocessor_definitions: Vec<String>,
    pub preset_files: Vec<PathBuf>,
    /// Index into `preset_files`; -1 selects no preset.
    pub current_preset: i32,
    pub screenshot_path: PathBuf,
    pub screenshot_format: ScreenshotFormat,
    pub screenshot_include_preset: bool,
    pub screenshot_include_configuration: bool,
    pub no_reload_on_init: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screenshot_key: KeyCombo::new(vk::SNAPSHOT),
            reload_key: KeyCombo::default(),
            effects_key: KeyCombo::default(),
            performance_mode: false,
            effect_search_paths: Vec::new(),
            texture_search_paths: Vec::new(),
            preprocessor_definitions: Vec::new(),
            preset_files: Vec::new(),
            current_preset: -1,
            screenshot_path: PathBuf::new(),
            screenshot_format: ScreenshotFormat::default(),
            screenshot_include_preset: false,
            screenshot_include_configuration: false,
            no_reload_on_init: false,
        }
    }
}

impl Settings {
    /// Overwrites fields for which the document has keys; the rest keep
    /// their current values.
    pub fn read_from(&mut self, ini: &IniFile) {
        ini.read("INPUT", "KeyScreenshot", &mut self.screenshot_key);
        ini.read("INPUT", "KeyReload", &mut self.reload_key);
        ini.read("INPUT", "KeyEffects", &mut self.effects_key);

        ini.read("GENERAL", "PerformanceMode", &mut self.performance_mode);
        ini.read("GENERAL", "EffectSearchPaths", &mut self.effect_search_paths);
        ini.read("GENERAL", "TextureSearchPaths", &mut self.texture_search_paths);
        ini.read(
            "GENERAL",
            "PreprocessorDefinitions",
            &mut self.preprocessor_definitions,
        );
        ini.read("GENERAL", "PresetFiles", &mut self.preset_files);
        ini.read("GENERAL", "CurrentPreset", &mut self.current_preset);
        ini.read("GENERAL", "ScreenshotPath", &mut self.screenshot_path);
        ini.read("GENERAL", "ScreenshotFormat", &mut self.screenshot_format);
        ini.read(
            "GENERAL",
            "ScreenshotIncludePreset",
            &mut self.screenshot_include_preset,
        );
        ini.read(
            "GENERAL",
            "ScreenshotIncludeConfiguration",
            &mut self.screenshot_include_configuration,
        );
        ini.read("GENERAL", "NoReloadOnInit", &mut self.no_reload_on_init);
    }

    pub fn write_to(&self, ini: &mut IniFile) {
        ini.set("INPUT", "KeyScreenshot", self.screenshot_key);
        ini.set("INPUT", "KeyReload", self.reload_key);
        ini.set("INPUT", "KeyEffects", self.effects_key);

        ini.set("GENERAL", "PerformanceMode", self.performance_mode);
        ini.set(
            "GENERAL",
            "EffectSearchPaths",
            self.effect_search_paths.clone(),
        );
        ini.set(
            "GENERAL",
            "TextureSearchPaths",
            self.texture_search_paths.clone(),
        );
        ini.set(
            "GENERAL",
            "PreprocessorDefinitions",
            self.preprocessor_definitions.clone(),
        );
        ini.set("GENERAL", "PresetFiles", self.preset_files.clone());
        ini.set("GENERAL", "CurrentPreset", self.current_preset);
        ini.set("GENERAL", "ScreenshotPath", self.screenshot_path.clone());
        ini.set("GENERAL", "ScreenshotFormat", self.screenshot_format);
        ini.set(
            "GENERAL",
            "ScreenshotIncludePreset",
            self.screenshot_include_preset,
        );
        ini.set(
            "GENERAL",
            "ScreenshotIncludeConfiguration",
            self.screenshot_include_configuration,
        );
        ini.set("GENERAL", "NoReloadOnInit", self.no_reload_on_init);
    }

    /// Forces the preset index back into `[-1, len)`.
    pub fn clamp_current_preset(&mut self) {
        if self.current_preset < -1 || self.current_preset as usize >= self.preset_files.len() {
            self.current_preset = -1;
        }
    }

    /// Path of the selected preset, if any.
    pub fn current_preset_file(&self) -> Option<&Path> {
        usize::try_from(self.current_preset)
            .ok()
            .and_then(|index| self.preset_files.get(index))
            .map(PathBuf::as_path)
    }

    /// Adds preset files found in `dir` that are not yet in the list. Only
    /// `.ini`/`.txt` documents with a non-empty `Techniques` key qualify.
    pub fn discover_presets(&mut self, dir: &Path) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "preset scan skipped");
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !extension.eq_ignore_ascii_case("ini") && !extension.eq_ignore_ascii_case("txt") {
                continue;
            }

            let already_known = self.preset_files.iter().any(|known| {
                known.file_name() == path.file_name()
                    && (known.parent() == Some(dir) || !known.is_absolute())
            });
            if already_known {
                continue;
            }

            let Ok(candidate) = IniFile::load(&path) else {
                continue;
            };
            let techniques: Vec<String> = candidate
                .get(GLOBAL_SECTION, "Techniques")
                .unwrap_or_default();
            if !techniques.is_empty() {
                debug!(path = %path.display(), "discovered preset");
                self.preset_files.push(path);
            }
        }
    }
}

type LoadCallback = Box<dyn Fn(&IniFile) + Send>;
type SaveCallback = Box<dyn Fn(&mut IniFile) + Send>;

/// The configuration file plus the extension callbacks other subsystems
/// register for their own keys.
pub struct ConfigStore {
    path: PathBuf,
    load_callbacks: Vec<LoadCallback>,
    save_callbacks: Vec<SaveCallback>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            load_callbacks: Vec::new(),
            save_callbacks: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Registers a callback run after every load, with the raw document.
    pub fn on_load(&mut self, callback: impl Fn(&IniFile) + Send + 'static) {
        self.load_callbacks.push(Box::new(callback));
    }

    /// Registers a callback run before every save, with the raw document.
    pub fn on_save(&mut self, callback: impl Fn(&mut IniFile) + Send + 'static) {
        self.save_callbacks.push(Box::new(callback));
    }

    /// Reads settings from the configuration file, clamps the preset index,
    /// and scans the configuration directory for new presets.
    pub fn load(&self) -> Result<Settings, ConfigError> {
        let ini = IniFile::load(&self.path)?;

        let mut settings = Settings::default();
        settings.read_from(&ini);
        settings.clamp_current_preset();
        if let Some(dir) = self.path.parent() {
            settings.discover_presets(dir);
        }

        for callback in &self.load_callbacks {
            callback(&ini);
        }
        Ok(settings)
    }

    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        self.save_as(&self.path, settings)
    }

    /// Writes a configuration snapshot to an arbitrary path, preserving any
    /// foreign keys already present in the main configuration file.
    pub fn save_as(&self, path: &Path, settings: &Settings) -> Result<(), ConfigError> {
        let mut ini = IniFile::load(&self.path)?;
        settings.write_to(&mut ini);
        for callback in &self.save_callbacks {
            callback(&mut ini);
        }
        ini.save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn defaults_bind_only_the_screenshot_key() {
        let settings = Settings::default();
        assert_eq!(settings.screenshot_key, KeyCombo::new(vk::SNAPSHOT));
        assert!(settings.reload_key.is_unbound());
        assert!(settings.effects_key.is_unbound());
        assert_eq!(settings.current_preset, -1);
    }

    #[test]
    fn settings_round_trip() {
        let mut settings = Settings::default();
        settings.performance_mode = true;
        settings.effect_search_paths = vec![PathBuf::from("shaders"), PathBuf::from("extra")];
        settings.preprocessor_definitions = vec!["QUALITY=2".to_string()];
        settings.preset_files = vec![PathBuf::from("Cinematic.ini")];
        settings.current_preset = 0;
        settings.screenshot_format = ScreenshotFormat::Png;
        settings.screenshot_include_preset = true;
        settings.reload_key = KeyCombo {
            keycode: 0x75,
            ctrl: true,
            ..KeyCombo::default()
        };

        let mut ini = IniFile::new();
        settings.write_to(&mut ini);

        let mut reloaded = Settings::default();
        reloaded.read_from(&IniFile::parse(&ini.to_string()));

        assert!(reloaded.performance_mode);
        assert_eq!(reloaded.effect_search_paths, settings.effect_search_paths);
        assert_eq!(
            reloaded.preprocessor_definitions,
            settings.preprocessor_definitions
        );
        assert_eq!(reloaded.preset_files, settings.preset_files);
        assert_eq!(reloaded.current_preset, 0);
        assert_eq!(reloaded.screenshot_format, ScreenshotFormat::Png);
        assert!(reloaded.screenshot_include_preset);
        assert_eq!(reloaded.reload_key, settings.reload_key);
    }

    #[test]
    fn out_of_range_preset_index_clamps_to_none() {
        let mut settings = Settings::default();
        settings.preset_files = vec![PathBuf::from("a.ini")];

        settings.current_preset = 5;
        settings.clamp_current_preset();
        assert_eq!(settings.current_preset, -1);

        settings.current_preset = -3;
        settings.clamp_current_preset();
        assert_eq!(settings.current_preset, -1);

        settings.current_preset = 0;
        settings.clamp_current_preset();
        assert_eq!(settings.current_preset, 0);
        assert_eq!(
            settings.current_preset_file(),
            Some(Path::new("a.ini"))
        );
    }

    #[test]
    fn discovery_requires_a_technique_list() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("real.ini"), "Techniques=Clarity\n").unwrap();
        fs::write(dir.path().join("legacy.txt"), "Techniques=Vibrance\n").unwrap();
        fs::write(dir.path().join("empty.ini"), "Techniques=\n").unwrap();
        fs::write(dir.path().join("unrelated.ini"), "Other=1\n").unwrap();
        fs::write(dir.path().join("notes.md"), "Techniques=Nope\n").unwrap();

        let mut settings = Settings::default();
        settings.discover_presets(dir.path());

        let mut names: Vec<_> = settings
            .preset_files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["legacy.txt", "real.ini"]);
    }

    #[test]
    fn discovery_skips_known_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("known.ini"), "Techniques=Clarity\n").unwrap();

        let mut settings = Settings::default();
        settings.preset_files = vec![PathBuf::from("known.ini")];
        settings.discover_presets(dir.path());
        assert_eq!(settings.preset_files.len(), 1);
    }

    #[test]
    fn store_loads_clamps_and_discovers() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("runtime.ini");
        fs::write(
            &config_path,
            "[GENERAL]\nCurrentPreset=7\nPerformanceMode=1\n",
        )
        .unwrap();
        fs::write(dir.path().join("found.ini"), "Techniques=Clarity\n").unwrap();

        let store = ConfigStore::new(&config_path);
        let settings = store.load().unwrap();

        assert!(settings.performance_mode);
        assert_eq!(settings.current_preset, -1, "index beyond list clamps");
        assert_eq!(settings.preset_files.len(), 1);
    }

    #[test]
    fn callbacks_extend_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("runtime.ini");

        let seen = Arc::new(AtomicUsize::new(0));
        let mut store = ConfigStore::new(&config_path);
        {
            let seen = seen.clone();
            store.on_load(move |ini| {
                if ini.contains("OVERLAY", "FontSize") {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        store.on_save(|ini| ini.set("OVERLAY", "FontSize", 16u32));

        store.save(&Settings::default()).unwrap();
        store.load().unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn save_as_preserves_foreign_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("runtime.ini");
        fs::write(&config_path, "[OTHER]\nCustom=kept\n").unwrap();

        let store = ConfigStore::new(&config_path);
        let snapshot = dir.path().join("snapshot.ini");
        store.save_as(&snapshot, &Settings::default()).unwrap();

        let written = IniFile::load(&snapshot).unwrap();
        assert_eq!(
            written.get::<String>("OTHER", "Custom").as_deref(),
            Some("kept")
        );
        assert!(written.contains("GENERAL", "PerformanceMode"));
    }
}
