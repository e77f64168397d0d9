//! The concurrent effect-load pipeline. `reload` clears the catalog,
//! enumerates `*.fx` files across the configured search paths, and hands
//! each file to its own worker thread. Workers preprocess, parse, and
//! publish under the catalog mutex, then decrement the cycle's countdown;
//! the worker that reaches zero latches the finished flag the render thread
//! polls from `on_present`.
//!
//! Every cycle is its own guard object. A new `reload` cancels the previous
//! cycle before tearing the catalog down, so workers that are still in
//! flight decrement their own cycle's countdown but never publish into the
//! replacement catalog.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

use catalog::{BaseType, Module};
use inifile::IniFile;
use tracing::{debug, error, info, warn};

use crate::compiler::{
    build_macro_set, shader_language_for, shader_model_for, EffectCompiler, MacroEnvironment,
};
use crate::{Runtime, SharedState};

/// Completion and cancellation state of one reload cycle.
pub(crate) struct ReloadCycle {
    remaining: AtomicUsize,
    finished: AtomicBool,
    cancelled: AtomicBool,
    finished_at: Mutex<Option<Instant>>,
}

impl ReloadCycle {
    /// The state before any reload has run: nothing pending, nothing to
    /// finish.
    pub(crate) fn idle() -> Self {
        Self {
            remaining: AtomicUsize::new(0),
            finished: AtomicBool::new(false),
            cancelled: AtomicBool::new(true),
            finished_at: Mutex::new(None),
        }
    }

    /// A cycle with `count` dispatched workers. Zero workers latches the
    /// finished flag immediately.
    pub(crate) fn dispatched(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            finished: AtomicBool::new(count == 0),
            cancelled: AtomicBool::new(false),
            finished_at: Mutex::new((count == 0).then(Instant::now)),
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Completion barrier: the worker that brings the countdown to zero
    /// records the reload timestamp and latches the finished flag, with
    /// release ordering so the render thread's acquire read observes every
    /// catalog write that came before.
    pub(crate) fn complete_one(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            *self
                .finished_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
            self.finished.store(true, Ordering::Release);
        }
    }

    /// Consumes the finished latch; true at most once per cycle.
    pub(crate) fn take_finished(&self) -> bool {
        self.finished.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn finished_at(&self) -> Option<Instant> {
        *self
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// Everything a worker needs, snapshotted when the cycle is dispatched so
/// later settings edits cannot race the workers.
struct LoadContext {
    compiler: Arc<dyn EffectCompiler>,
    shared: Arc<SharedState>,
    cycle: Arc<ReloadCycle>,
    search_paths: Vec<PathBuf>,
    performance_mode: bool,
    preset_file: Option<PathBuf>,
    renderer_id: u32,
    macros: Vec<(String, String)>,
}

impl Runtime {
    /// Drops all loaded effects and starts a fresh load cycle, one worker
    /// per effect file.
    pub fn reload(&mut self) {
        self.reset_effects();
        self.shared.reload_successful.store(true, Ordering::Relaxed);

        let mut effect_files = Vec::new();
        for search_path in &self.settings.effect_search_paths {
            let entries = match fs::read_dir(search_path) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(path = %search_path.display(), error = %err, "effect search path unreadable");
                    continue;
                }
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension() == Some(OsStr::new("fx")) {
                    effect_files.push(path);
                }
            }
        }
        info!(count = effect_files.len(), "reloading effects");

        let cycle = Arc::new(ReloadCycle::dispatched(effect_files.len()));
        self.cycle = cycle.clone();

        let context = Arc::new(LoadContext {
            compiler: self.compiler.clone(),
            shared: self.shared.clone(),
            cycle,
            search_paths: self.settings.effect_search_paths.clone(),
            performance_mode: self.settings.performance_mode,
            preset_file: self.settings.current_preset_file().map(Path::to_path_buf),
            renderer_id: self.renderer_id,
            macros: build_macro_set(&MacroEnvironment {
                performance_mode: self.settings.performance_mode,
                vendor_id: self.vendor_id,
                device_id: self.device_id,
                renderer_id: self.renderer_id,
                application_stem: self
                    .executable_path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                width: self.width,
                height: self.height,
                definitions: self.settings.preprocessor_definitions.clone(),
            }),
        });

        for file in effect_files {
            let context = context.clone();
            thread::spawn(move || load_effect(&context, file));
        }
    }

    /// Tears down the loaded-effect state: cancels the active cycle, clears
    /// the catalog, and drops any queued recompilations, all under the
    /// catalog mutex so an in-flight worker can never publish in between.
    pub(crate) fn reset_effects(&mut self) {
        let mut catalog = self.shared.catalog();
        self.cycle.cancel();
        catalog.clear();
        self.reload_queue.clear();
    }
}

/// Worker body: one effect file from source to published catalog rows.
fn load_effect(context: &LoadContext, path: PathBuf) {
    let mut errors = String::new();

    let mut include_paths = Vec::new();
    if path.is_absolute() {
        if let Some(parent) = path.parent() {
            include_paths.push(parent.to_path_buf());
        }
    }
    include_paths.extend(
        context
            .search_paths
            .iter()
            .filter(|p| !p.as_os_str().is_empty())
            .cloned(),
    );

    let source = match context
        .compiler
        .preprocess(&path, &include_paths, &context.macros)
    {
        Ok(output) => {
            errors.push_str(&output.warnings);
            output.source
        }
        Err(err) => {
            error!(path = %path.display(), errors = %err, "failed to pre-process effect");
            return fail(context);
        }
    };

    let language = shader_language_for(context.renderer_id);
    let shader_model = shader_model_for(context.renderer_id);
    let mut module = match context.compiler.parse(&source, language, shader_model) {
        Ok(output) => {
            errors.push_str(&output.warnings);
            output.module
        }
        Err(err) => {
            error!(path = %path.display(), errors = %err, "failed to compile effect");
            return fail(context);
        }
    };

    if context.performance_mode {
        if let Some(preset_file) = &context.preset_file {
            apply_spec_constant_overrides(&mut module, &path, preset_file);
        }
    }

    {
        let mut catalog = context.shared.catalog();
        if context.cycle.is_cancelled() {
            debug!(path = %path.display(), "dropping effect from superseded reload");
        } else {
            if errors.is_empty() {
                info!(path = %path.display(), "successfully compiled effect");
            } else {
                warn!(path = %path.display(), warnings = %errors, "compiled effect with warnings");
            }
            catalog.publish_module(&path, module, errors);
        }
    }

    context.cycle.complete_one();
}

fn fail(context: &LoadContext) {
    context
        .shared
        .reload_successful
        .store(false, Ordering::Relaxed);
    context.cycle.complete_one();
}

/// In performance mode, specialisation constants take their values from the
/// selected preset: section = effect file name, key = constant name.
fn apply_spec_constant_overrides(module: &mut Module, source_file: &Path, preset_file: &Path) {
    let preset = match IniFile::load(preset_file) {
        Ok(preset) => preset,
        Err(err) => {
            warn!(path = %preset_file.display(), error = %err, "preset unreadable for spec constants");
            return;
        }
    };
    let section = source_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for constant in &mut module.spec_constants {
        match constant.ty.base {
            BaseType::Int => {
                preset.read_values(&section, &constant.name, &mut constant.initializer.as_int)
            }
            BaseType::Bool | BaseType::Uint => {
                preset.read_values(&section, &constant.name, &mut constant.initializer.as_uint)
            }
            BaseType::Float => {
                preset.read_values(&section, &constant.name, &mut constant.initializer.as_float)
            }
        }
    }
}
