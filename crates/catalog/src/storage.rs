//! Flat storage arena for uniform values. Every loaded effect reserves a
//! 16-byte-padded region; individual uniforms address `(offset, size)` byte
//! ranges inside it. The arena is word-based because every uniform slot
//! rounds to a 4-byte boundary by construction, which keeps all bulk moves
//! word-aligned.
//!
//! Typed access converts between the caller's value type and the uniform's
//! declared type: one copy primitive over `u32` words plus pure per-word
//! conversions, never per-type duplicated block logic.

use crate::module::{BaseType, Constant, UniformType};

/// Addressing information for one uniform's slice of the arena.
#[derive(Clone, Copy, Debug)]
pub struct UniformSlot {
    /// Byte offset into the arena.
    pub offset: usize,
    /// Slot size in bytes; always a multiple of 4.
    pub size: usize,
    pub ty: UniformType,
}

impl UniformSlot {
    fn word_count(&self) -> usize {
        self.size / 4
    }
}

/// Byte arena shared by all loaded effects.
#[derive(Debug, Default)]
pub struct UniformStorage {
    words: Vec<u32>,
}

impl UniformStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arena size in bytes.
    pub fn len(&self) -> usize {
        self.words.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    /// Grows the arena to hold at least `len` bytes, zero-filling new space.
    pub fn grow_to(&mut self, len: usize) {
        let words = len.div_ceil(4);
        if words > self.words.len() {
            self.words.resize(words, 0);
        }
    }

    /// Raw byte view, for handing a whole effect region to the backend.
    pub fn bytes(&self, offset: usize, size: usize) -> &[u8] {
        &bytemuck::cast_slice(&self.words)[offset..offset + size]
    }

    pub fn write_bytes(&mut self, offset: usize, data: &[u8]) {
        bytemuck::cast_slice_mut::<u32, u8>(&mut self.words)[offset..offset + data.len()]
            .copy_from_slice(data);
    }

    fn slot_words(&self, slot: UniformSlot) -> &[u32] {
        debug_assert!(slot.offset % 4 == 0 && slot.size % 4 == 0);
        &self.words[slot.offset / 4..slot.offset / 4 + slot.word_count()]
    }

    fn slot_words_mut(&mut self, slot: UniformSlot) -> &mut [u32] {
        debug_assert!(slot.offset % 4 == 0 && slot.size % 4 == 0);
        &mut self.words[slot.offset / 4..slot.offset / 4 + slot.word_count()]
    }

    pub fn get_bool(&self, slot: UniformSlot, out: &mut [bool]) {
        let words = self.slot_words(slot);
        for (value, word) in out.iter_mut().zip(words) {
            *value = *word != 0;
        }
    }

    pub fn get_int(&self, slot: UniformSlot, out: &mut [i32]) {
        let words = self.slot_words(slot);
        let floating = slot.ty.is_floating_point();
        for (value, word) in out.iter_mut().zip(words) {
            *value = if floating {
                f32::from_bits(*word) as i32
            } else {
                *word as i32
            };
        }
    }

    pub fn get_uint(&self, slot: UniformSlot, out: &mut [u32]) {
        let words = self.slot_words(slot);
        let floating = slot.ty.is_floating_point();
        for (value, word) in out.iter_mut().zip(words) {
            *value = if floating {
                f32::from_bits(*word) as i32 as u32
            } else {
                *word
            };
        }
    }

    pub fn get_float(&self, slot: UniformSlot, out: &mut [f32]) {
        let words = self.slot_words(slot);
        let ty = slot.ty;
        for (value, word) in out.iter_mut().zip(words) {
            *value = if ty.is_floating_point() {
                f32::from_bits(*word)
            } else if ty.is_signed() {
                (*word as i32) as f32
            } else {
                *word as f32
            };
        }
    }

    pub fn set_bool(&mut self, slot: UniformSlot, values: &[bool]) {
        let base = slot.ty.base;
        for (word, value) in self.slot_words_mut(slot).iter_mut().zip(values) {
            *word = match base {
                BaseType::Bool => {
                    if *value {
                        u32::MAX
                    } else {
                        0
                    }
                }
                BaseType::Int | BaseType::Uint => *value as u32,
                BaseType::Float => (*value as u32 as f32).to_bits(),
            };
        }
    }

    pub fn set_int(&mut self, slot: UniformSlot, values: &[i32]) {
        let floating = slot.ty.is_floating_point();
        for (word, value) in self.slot_words_mut(slot).iter_mut().zip(values) {
            *word = if floating {
                (*value as f32).to_bits()
            } else {
                *value as u32
            };
        }
    }

    pub fn set_uint(&mut self, slot: UniformSlot, values: &[u32]) {
        let floating = slot.ty.is_floating_point();
        for (word, value) in self.slot_words_mut(slot).iter_mut().zip(values) {
            *word = if floating {
                (*value as f32).to_bits()
            } else {
                *value
            };
        }
    }

    pub fn set_float(&mut self, slot: UniformSlot, values: &[f32]) {
        let floating = slot.ty.is_floating_point();
        for (word, value) in self.slot_words_mut(slot).iter_mut().zip(values) {
            *word = if floating {
                value.to_bits()
            } else {
                (*value as i32) as u32
            };
        }
    }

    /// Restores a slot to its declared initializer, or zero when it has none.
    pub fn reset(&mut self, slot: UniformSlot, initializer: Option<&Constant>) {
        let base = slot.ty.base;
        let words = self.slot_words_mut(slot);
        match initializer {
            Some(constant) => {
                for (index, word) in words.iter_mut().enumerate() {
                    *word = match (base, index < 16) {
                        (_, false) => 0,
                        (BaseType::Int, _) => constant.as_int[index] as u32,
                        (BaseType::Float, _) => constant.as_float[index].to_bits(),
                        (BaseType::Bool | BaseType::Uint, _) => constant.as_uint[index],
                    };
                }
            }
            None => words.fill(0),
        }
    }
}
