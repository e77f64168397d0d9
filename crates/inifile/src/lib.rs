//! Ordered INI document used by the preset and configuration stores. The
//! format is deliberately schema-less: a document is a set of named sections,
//! each section a set of keys, each key a list of comma-separated items.
//! Typed access happens at the call site through [`IniValue`] and
//! [`IniScalar`], so the same document can hand a `Techniques` key to the
//! preset loader as a `Vec<String>` and a `CurrentPreset` key to the settings
//! loader as an `i32`.
//!
//! Types:
//!
//! - `IniFile` owns the section/key/items tree and performs parsing,
//!   formatting, and file I/O.
//! - `IniValue` converts whole values (scalars, strings, paths, lists) to and
//!   from item lists.
//! - `IniScalar` converts a single item; slices of scalars are read and
//!   written through `read_values`/`set_values` for fixed-size buffers.
//! - `IniError` classifies read and write failures for error reporting.
//!
//! Missing keys are never an error: `read` and `read_values` leave the
//! caller's value untouched, which is how "absent key means keep the
//! default" works throughout the runtime.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IniError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The unnamed section at the top of a document.
pub const GLOBAL_SECTION: &str = "";

type Section = BTreeMap<String, Vec<String>>;

/// An in-memory INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniFile {
    sections: BTreeMap<String, Section>,
}

impl IniFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a document from disk. A missing file yields an empty document,
    /// matching the "absent means default" contract of the callers.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IniError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(err) => Err(IniError::Read {
                path: path.to_path_buf(),
                source: err,
            }),
        }
    }

    /// Parses a document from text. Malformed lines are skipped rather than
    /// rejected; comment lines start with `;` or `#`.
    pub fn parse(text: &str) -> Self {
        let mut sections: BTreeMap<String, Section> = BTreeMap::new();
        let mut current = GLOBAL_SECTION.to_string();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = name.trim().to_string();
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                let value = value.trim();
                let items = if value.is_empty() {
                    Vec::new()
                } else {
                    value.split(',').map(|item| item.trim().to_string()).collect()
                };
                sections
                    .entry(current.clone())
                    .or_default()
                    .insert(key.trim().to_string(), items);
            }
        }

        Self { sections }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IniError> {
        let path = path.as_ref();
        fs::write(path, self.to_string()).map_err(|err| IniError::Write {
            path: path.to_path_buf(),
            source: err,
        })
    }

    /// Raw item list for a key, if present.
    pub fn items(&self, section: &str, key: &str) -> Option<&[String]> {
        self.sections
            .get(section)
            .and_then(|s| s.get(key))
            .map(Vec::as_slice)
    }

    pub fn set_items(&mut self, section: &str, key: &str, items: Vec<String>) {
        self.sections
            .entry(section.to_string())
            .or_default()
            .insert(key.to_string(), items);
    }

    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.items(section, key).is_some()
    }

    pub fn remove(&mut self, section: &str, key: &str) {
        if let Some(s) = self.sections.get_mut(section) {
            s.remove(key);
            if s.is_empty() {
                self.sections.remove(section);
            }
        }
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Typed lookup; `None` when the key is absent or fails to convert.
    pub fn get<T: IniValue>(&self, section: &str, key: &str) -> Option<T> {
        self.items(section, key).and_then(T::from_items)
    }

    /// Overwrites `slot` with the stored value when the key is present and
    /// converts; leaves it untouched otherwise.
    pub fn read<T: IniValue>(&self, section: &str, key: &str, slot: &mut T) {
        if let Some(value) = self.get(section, key) {
            *slot = value;
        }
    }

    pub fn set<T: IniValue>(&mut self, section: &str, key: &str, value: T) {
        self.set_items(section, key, value.to_items());
    }

    /// Fills `out` element-wise from the stored items, stopping at whichever
    /// of the two runs out first. Elements past the stored list keep their
    /// previous contents.
    pub fn read_values<T: IniScalar>(&self, section: &str, key: &str, out: &mut [T]) {
        let Some(items) = self.items(section, key) else {
            return;
        };
        for (slot, item) in out.iter_mut().zip(items) {
            if let Some(value) = T::parse_item(item) {
                *slot = value;
            }
        }
    }

    pub fn set_values<T: IniScalar>(&mut self, section: &str, key: &str, values: &[T]) {
        self.set_items(
            section,
            key,
            values.iter().map(IniScalar::format_item).collect(),
        );
    }
}

impl fmt::Display for IniFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, section) in &self.sections {
            if !name.is_empty() {
                if !first {
                    writeln!(f)?;
                }
                writeln!(f, "[{name}]")?;
            }
            for (key, items) in section {
                writeln!(f, "{key}={}", items.join(","))?;
            }
            first = false;
        }
        Ok(())
    }
}

/// Conversion between a whole stored value and its item list.
pub trait IniValue: Sized {
    fn from_items(items: &[String]) -> Option<Self>;
    fn to_items(&self) -> Vec<String>;
}

/// Conversion for one item of a list-valued key.
pub trait IniScalar: Sized {
    fn parse_item(item: &str) -> Option<Self>;
    fn format_item(&self) -> String;
}

macro_rules! numeric_scalar {
    ($($ty:ty),*) => {
        $(impl IniScalar for $ty {
            fn parse_item(item: &str) -> Option<Self> {
                item.parse().ok()
            }

            fn format_item(&self) -> String {
                self.to_string()
            }
        })*
    };
}

numeric_scalar!(i32, u32, i64, u64, f32);

impl IniScalar for bool {
    fn parse_item(item: &str) -> Option<Self> {
        i64::parse_item(item).map(|v| v != 0)
    }

    fn format_item(&self) -> String {
        if *self { "1" } else { "0" }.to_string()
    }
}

impl<T: IniScalar> IniValue for T {
    fn from_items(items: &[String]) -> Option<Self> {
        items.first().and_then(|item| T::parse_item(item))
    }

    fn to_items(&self) -> Vec<String> {
        vec![self.format_item()]
    }
}

impl IniValue for String {
    fn from_items(items: &[String]) -> Option<Self> {
        items.first().cloned()
    }

    fn to_items(&self) -> Vec<String> {
        vec![self.clone()]
    }
}

impl IniValue for PathBuf {
    fn from_items(items: &[String]) -> Option<Self> {
        items.first().map(PathBuf::from)
    }

    fn to_items(&self) -> Vec<String> {
        vec![self.display().to_string()]
    }
}

impl IniValue for Vec<String> {
    fn from_items(items: &[String]) -> Option<Self> {
        Some(items.to_vec())
    }

    fn to_items(&self) -> Vec<String> {
        self.clone()
    }
}

impl IniValue for Vec<PathBuf> {
    fn from_items(items: &[String]) -> Option<Self> {
        Some(items.iter().map(PathBuf::from).collect())
    }

    fn to_items(&self) -> Vec<String> {
        self.iter().map(|p| p.display().to_string()).collect()
    }
}
