//! Graphics adapter contract. The runtime owns the effect database and the
//! frame cadence; everything that touches a GPU object lives behind this
//! trait, implemented once per graphics API by the host.

use catalog::{EffectCatalog, Technique, Texture};

/// Adapter over the graphics API the host is rendering with.
///
/// All calls arrive on the render thread. The runtime is trusted to be
/// serial within a frame, so implementations need no internal
/// synchronisation of their own.
pub trait Backend {
    /// Prepares swapchain-sized resources. Returning `false` aborts
    /// runtime initialisation.
    fn on_init(&mut self, width: u32, height: u32) -> bool;

    /// Releases everything `on_init` and effect compilation created.
    fn on_reset(&mut self);

    /// Builds GPU objects for one published effect. On success the
    /// implementation assigns [`Technique::handle`] and [`Texture::handle`]
    /// for the effect's rows; on failure it appends to the effect's
    /// `errors` string and returns `false`, leaving the handles empty so
    /// the orchestrator keeps skipping those rows.
    fn compile_effect(&mut self, effect_index: usize, catalog: &mut EffectCatalog) -> bool;

    /// Uploads pixel data into a realised texture.
    fn update_texture(&mut self, texture: &Texture, data: &[u8]);

    /// Renders one enabled technique.
    fn render_technique(&mut self, technique: &Technique);

    /// Copies the current back buffer into `target` as tightly packed
    /// RGBA8; `target` is sized `width * height * 4`.
    fn capture_frame(&mut self, target: &mut [u8]);
}
