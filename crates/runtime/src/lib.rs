//! Effect runtime: loads shader effect files through an external compiler,
//! materialises them into the catalog, and drives evaluation every frame.
//!
//! ```text
//!   host (graphics hook)
//!          │ on_init / on_present / on_present_effect
//!          ▼
//!   Runtime ──reload()──▶ loader workers ──▶ EffectCatalog + UniformStorage
//!      │                                            ▲
//!      ├── special uniforms (time/input/random) ────┘ per frame
//!      ├── technique toggles, timeouts, render dispatch ─▶ Backend
//!      └── presets / settings / screenshots ─▶ INI documents on disk
//! ```
//!
//! The runtime is single-threaded from the host's point of view: every
//! public method runs on the render thread. `reload` fans file compilation
//! out to one worker per effect file; workers publish into the catalog
//! under its mutex and signal completion through an atomic countdown, which
//! `on_present` observes to finish the cycle (preset load, texture upload).

mod backend;
mod compiler;
mod loader;
mod presets;
mod screenshot;
#[cfg(test)]
pub(crate) mod testing;
mod textures;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use catalog::{EffectCatalog, Special, Technique, TriggerMode};
use chrono::{Datelike, Local, Timelike};
use input::InputSource;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use settings::{ConfigStore, Settings};
use tracing::{error, info, warn};

pub use backend::Backend;
pub use compiler::{
    shader_language_for, shader_model_for, CompilerError, EffectCompiler, ParseOutput,
    PreprocessOutput, ShaderLanguage,
};

/// Identity of the host process and graphics device, fixed for the lifetime
/// of the runtime.
#[derive(Clone, Debug)]
pub struct RuntimeDesc {
    /// Graphics API and feature-level id; selects the shader model and
    /// code generation backend.
    pub renderer_id: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    /// The host executable; its stem feeds the `__APPLICATION__` macro and
    /// screenshot filenames.
    pub executable_path: PathBuf,
    /// The INI document configuration is read from and written to.
    pub config_path: PathBuf,
}

/// Per-frame counters the host's hooks increment; reset at the end of
/// every presented frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
    pub drawcalls: u32,
    pub vertices: u32,
    pub network_traffic: u32,
}

/// State shared between the render thread and loader workers.
pub(crate) struct SharedState {
    pub(crate) catalog: Mutex<EffectCatalog>,
    pub(crate) reload_successful: AtomicBool,
}

impl SharedState {
    pub(crate) fn catalog(&self) -> MutexGuard<'_, EffectCatalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct Runtime {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) input: Box<dyn InputSource>,
    pub(crate) compiler: Arc<dyn EffectCompiler>,
    pub(crate) config: ConfigStore,
    pub(crate) settings: Settings,

    pub(crate) shared: Arc<SharedState>,
    pub(crate) cycle: Arc<loader::ReloadCycle>,
    pub(crate) reload_queue: Vec<usize>,

    pub(crate) renderer_id: u32,
    pub(crate) vendor_id: u32,
    pub(crate) device_id: u32,
    pub(crate) executable_path: PathBuf,

    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) is_initialized: bool,
    pub(crate) effects_enabled: bool,

    pub(crate) start_time: Instant,
    pub(crate) last_present_time: Instant,
    pub(crate) last_frame_duration: Duration,
    pub(crate) last_reload_time: Instant,
    pub(crate) framecount: u64,
    pub(crate) date: [i32; 4],
    pub(crate) rng: StdRng,

    pub(crate) screenshot_key_capture: bool,
    pub(crate) toggle_key_capture: bool,
    pub(crate) overlay: Option<Box<dyn FnMut() + Send>>,

    /// Counters for the host's draw/traffic hooks.
    pub stats: FrameStats,
}

impl Runtime {
    /// Builds a runtime and loads its configuration. A missing or broken
    /// configuration file falls back to defaults rather than failing; the
    /// runtime is expected to come up inside a host that cannot retry.
    pub fn new(
        desc: RuntimeDesc,
        backend: Box<dyn Backend>,
        compiler: Arc<dyn EffectCompiler>,
        input: Box<dyn InputSource>,
    ) -> Self {
        let config = ConfigStore::new(&desc.config_path);
        let settings = config.load().unwrap_or_else(|err| {
            warn!(error = %err, "configuration unreadable, using defaults");
            Settings::default()
        });

        let now = Instant::now();
        Self {
            backend,
            input,
            compiler,
            config,
            settings,
            shared: Arc::new(SharedState {
                catalog: Mutex::new(EffectCatalog::new()),
                reload_successful: AtomicBool::new(true),
            }),
            cycle: Arc::new(loader::ReloadCycle::idle()),
            reload_queue: Vec::new(),
            renderer_id: desc.renderer_id,
            vendor_id: desc.vendor_id,
            device_id: desc.device_id,
            executable_path: desc.executable_path,
            width: 0,
            height: 0,
            is_initialized: false,
            effects_enabled: true,
            start_time: now,
            last_present_time: now,
            last_frame_duration: Duration::from_millis(1),
            last_reload_time: now,
            framecount: 0,
            date: [0; 4],
            rng: StdRng::from_entropy(),
            screenshot_key_capture: false,
            toggle_key_capture: false,
            overlay: None,
            stats: FrameStats::default(),
        }
    }

    /// Brings the runtime up against a freshly created swapchain.
    pub fn on_init(&mut self, width: u32, height: u32) -> bool {
        if !self.backend.on_init(width, height) {
            return false;
        }

        self.width = width;
        self.height = height;
        self.is_initialized = true;
        self.last_reload_time = Instant::now();
        info!(width, height, "recreated runtime environment");

        if !self.settings.no_reload_on_init {
            self.reload();
        }
        true
    }

    /// Tears the effect state down ahead of a swapchain loss.
    pub fn on_reset(&mut self) {
        self.reset_effects();
        self.backend.on_reset();

        if !self.is_initialized {
            return;
        }

        info!("destroyed runtime environment");
        self.width = 0;
        self.height = 0;
        self.is_initialized = false;
    }

    /// Frame bookkeeping, hotkeys, reload completion, and the overlay.
    /// Runs once per presented frame, after [`Self::on_present_effect`].
    pub fn on_present(&mut self) {
        let now_local = Local::now();
        self.date = [
            now_local.year(),
            now_local.month() as i32,
            now_local.day() as i32,
            now_local.num_seconds_from_midnight() as i32,
        ];

        self.framecount += 1;
        let now = Instant::now();
        self.last_frame_duration = now - self.last_present_time;
        self.last_present_time = now;

        if self.settings.reload_key.is_pressed(self.input.as_ref()) {
            self.reload();
        }
        if !self.screenshot_key_capture
            && self.settings.screenshot_key.is_pressed(self.input.as_ref())
        {
            self.save_screenshot();
        }

        if self.cycle.take_finished() {
            if let Some(at) = self.cycle.finished_at() {
                self.last_reload_time = at;
            }
            self.load_current_preset();
            self.load_textures();
        } else if let Some(effect_index) = self.reload_queue.pop() {
            let mut catalog = self.shared.catalog();
            if !self.backend.compile_effect(effect_index, &mut catalog) {
                let effect = &catalog.effects[effect_index];
                error!(
                    path = %effect.source_file.display(),
                    errors = %effect.errors,
                    "failed to compile effect"
                );
                self.shared.reload_successful.store(false, Ordering::Relaxed);
            }
        }

        if let Some(overlay) = self.overlay.as_mut() {
            overlay();
        }

        self.input.next_frame();
        self.stats = FrameStats::default();
    }

    /// Evaluates special uniforms and renders enabled techniques. Runs once
    /// per frame, before the host presents.
    pub fn on_present_effect(&mut self) {
        if !self.toggle_key_capture && self.settings.effects_key.is_pressed(self.input.as_ref()) {
            self.effects_enabled = !self.effects_enabled;
        }
        if !self.effects_enabled {
            return;
        }

        let timing = FrameTiming {
            last_frame_duration: self.last_frame_duration,
            framecount: self.framecount,
            date: self.date,
            time_since_start: self.last_present_time.duration_since(self.start_time),
        };
        let frame_ms = self.last_frame_duration.as_millis() as i64;

        let mut catalog = self.shared.catalog();
        let catalog = &mut *catalog;

        update_special_uniforms(catalog, self.input.as_ref(), &timing, &mut self.rng);

        for technique in &mut catalog.techniques {
            if technique.timeleft > 0 {
                technique.timeleft -= frame_ms;
                if technique.timeleft <= 0 {
                    disable_technique(technique);
                }
            } else if !self.toggle_key_capture
                && toggle_requested(technique, self.input.as_ref())
            {
                if technique.enabled {
                    disable_technique(technique);
                } else {
                    enable_technique(technique, &mut self.reload_queue);
                }
            }

            if technique.handle.is_none() || !technique.enabled {
                continue;
            }

            let started = Instant::now();
            self.backend.render_technique(technique);
            technique
                .average_cpu
                .append(started.elapsed().as_nanos() as u64);
        }
    }

    /// Locked view of the effect database.
    pub fn catalog(&self) -> MutexGuard<'_, EffectCatalog> {
        self.shared.catalog()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    /// Configuration store, for registering load/save extension callbacks.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn save_config(&self) {
        if let Err(err) = self.config.save(&self.settings) {
            error!(error = %err, "failed to save configuration");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn effects_enabled(&self) -> bool {
        self.effects_enabled
    }

    pub fn framecount(&self) -> u64 {
        self.framecount
    }

    pub fn last_frame_duration(&self) -> Duration {
        self.last_frame_duration
    }

    /// True unless the most recent reload had a preprocess, parse, or
    /// backend compile failure.
    pub fn last_reload_successful(&self) -> bool {
        self.shared.reload_successful.load(Ordering::Relaxed)
    }

    /// While set, the screenshot hotkey is ignored (a settings dialog is
    /// capturing it).
    pub fn set_screenshot_key_capture(&mut self, active: bool) {
        self.screenshot_key_capture = active;
    }

    /// While set, technique toggle hotkeys and the global effects hotkey
    /// are ignored.
    pub fn set_toggle_key_capture(&mut self, active: bool) {
        self.toggle_key_capture = active;
    }

    /// Registers the overlay draw hook invoked every presented frame.
    pub fn set_overlay_callback(&mut self, callback: impl FnMut() + Send + 'static) {
        self.overlay = Some(Box::new(callback));
    }
}

/// Snapshot of the clock state one frame's uniform updates run against.
pub(crate) struct FrameTiming {
    pub(crate) last_frame_duration: Duration,
    pub(crate) framecount: u64,
    pub(crate) date: [i32; 4],
    pub(crate) time_since_start: Duration,
}

/// Marks a technique enabled and restarts its timeout. A technique whose
/// effect has no backend objects yet queues the effect for compilation.
pub(crate) fn enable_technique(technique: &mut Technique, reload_queue: &mut Vec<usize>) {
    technique.enabled = true;
    technique.timeleft = technique.timeout;
    if technique.handle.is_none() {
        reload_queue.push(technique.effect_index);
    }
}

pub(crate) fn disable_technique(technique: &mut Technique) {
    technique.enabled = false;
    technique.timeleft = 0;
    technique.average_cpu.clear();
    technique.average_gpu.clear();
}

/// A technique's toggle fires on its key combo, or on the mouse button its
/// keycode encodes (0x01..=0x06 map to buttons 0..=5).
fn toggle_requested(technique: &Technique, input: &dyn InputSource) -> bool {
    technique.toggle_key.is_pressed(input)
        || ((0x01..=0x06).contains(&technique.toggle_key.keycode)
            && input.is_mouse_button_pressed(technique.toggle_key.keycode - 1))
}

/// Writes this frame's value into every runtime-driven uniform.
pub(crate) fn update_special_uniforms(
    catalog: &mut EffectCatalog,
    input: &dyn InputSource,
    timing: &FrameTiming,
    rng: &mut StdRng,
) {
    let EffectCatalog {
        uniforms, storage, ..
    } = catalog;

    for uniform in uniforms.iter() {
        let Some(special) = uniform.special else {
            continue;
        };
        let slot = uniform.slot();

        match special {
            Special::FrameTime => {
                storage.set_float(
                    slot,
                    &[timing.last_frame_duration.as_nanos() as f32 * 1e-6],
                );
            }
            Special::FrameCount => {
                if slot.ty.is_boolean() {
                    storage.set_bool(slot, &[timing.framecount % 2 == 0]);
                } else {
                    storage.set_uint(slot, &[(timing.framecount % u64::from(u32::MAX)) as u32]);
                }
            }
            Special::Random { min, max } => {
                let value = if min < max { rng.gen_range(min..=max) } else { min };
                storage.set_int(slot, &[value]);
            }
            Special::PingPong {
                min,
                max,
                step,
                smoothing,
            } => {
                let mut value = [0.0f32; 2];
                storage.get_float(slot, &mut value);

                let mut increment = if step[1] == 0.0 {
                    step[0]
                } else {
                    step[0] + rng.gen::<u16>() as f32 % (step[1] - step[0] + 1.0)
                };
                let delta = timing.last_frame_duration.as_nanos() as f32 * 1e-9;

                if value[1] >= 0.0 {
                    increment = (increment - (smoothing - (max - value[0])).max(0.0)).max(0.05);
                    value[0] += increment * delta;
                    if value[0] >= max {
                        value[0] = max;
                        value[1] = -1.0;
                    }
                } else {
                    increment = (increment - (smoothing - (value[0] - min)).max(0.0)).max(0.05);
                    value[0] -= increment * delta;
                    if value[0] <= min {
                        value[0] = min;
                        value[1] = 1.0;
                    }
                }
                storage.set_float(slot, &value);
            }
            Special::Date => {
                storage.set_int(slot, &timing.date);
            }
            Special::Timer => {
                storage.set_float(slot, &[timing.time_since_start.as_nanos() as f32 * 1e-6]);
            }
            Special::Key { keycode, mode } => match mode {
                TriggerMode::Toggle => {
                    if input.is_key_pressed(keycode) {
                        let mut current = [false];
                        storage.get_bool(slot, &mut current);
                        storage.set_bool(slot, &[!current[0]]);
                    }
                }
                TriggerMode::Press => storage.set_bool(slot, &[input.is_key_pressed(keycode)]),
                TriggerMode::Level => storage.set_bool(slot, &[input.is_key_down(keycode)]),
            },
            Special::MousePoint => {
                let (x, y) = input.mouse_position();
                storage.set_int(slot, &[x, y]);
            }
            Special::MouseDelta => {
                let (x, y) = input.mouse_delta();
                storage.set_int(slot, &[x, y]);
            }
            Special::MouseButton { button, mode } => match mode {
                TriggerMode::Toggle => {
                    if input.is_mouse_button_pressed(button) {
                        let mut current = [false];
                        storage.get_bool(slot, &mut current);
                        storage.set_bool(slot, &[!current[0]]);
                    }
                }
                TriggerMode::Press => {
                    storage.set_bool(slot, &[input.is_mouse_button_pressed(button)])
                }
                TriggerMode::Level => storage.set_bool(slot, &[input.is_mouse_button_down(button)]),
            },
        }
    }
}
