//! Row types of the effect catalog. Techniques and textures refer back to
//! their effect by index rather than by reference because the effect table
//! relocates while loader workers append to it; backend objects are opaque
//! id handles assigned by the graphics adapter for the same reason.

use std::num::NonZeroU64;
use std::path::PathBuf;

use input::KeyCombo;

use crate::annotations::Annotations;
use crate::module::{Constant, Module, TextureFormat, UniformType};
use crate::special::Special;
use crate::storage::UniformSlot;

/// Opaque backend identity of a realised technique.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TechniqueHandle(NonZeroU64);

/// Opaque backend identity of a realised texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(NonZeroU64);

impl TechniqueHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TextureHandle {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// A shader-visible variable backed by a slice of the uniform arena.
#[derive(Clone, Debug)]
pub struct Uniform {
    pub name: String,
    pub effect_filename: String,
    pub ty: UniformType,
    /// Slot size in bytes.
    pub size: u32,
    /// Offset within the owning effect's constant block.
    pub offset: u32,
    /// Absolute offset into the shared arena.
    pub storage_offset: usize,
    pub annotations: Annotations,
    pub initializer: Option<Constant>,
    pub special: Option<Special>,
    pub hidden: bool,
}

impl Uniform {
    pub fn slot(&self) -> UniformSlot {
        UniformSlot {
            offset: self.storage_offset,
            size: self.size as usize,
            ty: self.ty,
        }
    }
}

/// Runtime-provided resource a texture may alias instead of owning storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureReference {
    #[default]
    None,
    BackBuffer,
    DepthBuffer,
}

/// A texture shared across all effects under its `unique_name`.
#[derive(Clone, Debug)]
pub struct Texture {
    pub unique_name: String,
    pub effect_filename: String,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: TextureFormat,
    pub impl_reference: TextureReference,
    pub annotations: Annotations,
    pub handle: Option<TextureHandle>,
}

/// A renderable pass sequence, independently toggled.
#[derive(Clone, Debug)]
pub struct Technique {
    pub name: String,
    pub effect_filename: String,
    /// Index of the owning effect in the catalog's effect table.
    pub effect_index: usize,
    pub annotations: Annotations,
    pub enabled: bool,
    pub hidden: bool,
    /// Auto-disable delay in milliseconds; 0 means stay enabled.
    pub timeout: i64,
    pub timeleft: i64,
    pub toggle_key: KeyCombo,
    pub average_cpu: MovingAverage,
    pub average_gpu: MovingAverage,
    pub handle: Option<TechniqueHandle>,
}

/// One loaded effect file with its region of the uniform arena.
#[derive(Clone, Debug)]
pub struct EffectData {
    pub source_file: PathBuf,
    /// Accumulated warnings and errors from preprocess, parse, and backend
    /// compilation, surfaced to the host as one block.
    pub errors: String,
    pub module: Module,
    pub storage_offset: usize,
    /// Region size in bytes, padded to a 16-byte multiple.
    pub storage_size: usize,
}

const AVERAGE_WINDOW: usize = 60;

/// Rolling average over the most recent 60 samples, in nanoseconds.
#[derive(Clone, Debug)]
pub struct MovingAverage {
    samples: [u64; AVERAGE_WINDOW],
    cursor: usize,
    len: usize,
}

impl MovingAverage {
    pub fn new() -> Self {
        Self {
            samples: [0; AVERAGE_WINDOW],
            cursor: 0,
            len: 0,
        }
    }

    pub fn append(&mut self, value: u64) {
        self.samples[self.cursor] = value;
        self.cursor = (self.cursor + 1) % AVERAGE_WINDOW;
        self.len = (self.len + 1).min(AVERAGE_WINDOW);
    }

    pub fn average(&self) -> u64 {
        if self.len == 0 {
            return 0;
        }
        self.samples[..self.len].iter().sum::<u64>() / self.len as u64
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_over_recent_window() {
        let mut avg = MovingAverage::new();
        assert_eq!(avg.average(), 0);

        avg.append(10);
        avg.append(30);
        assert_eq!(avg.average(), 20);

        for _ in 0..AVERAGE_WINDOW {
            avg.append(100);
        }
        assert_eq!(avg.average(), 100, "old samples age out");

        avg.clear();
        assert_eq!(avg.average(), 0);
    }
}
