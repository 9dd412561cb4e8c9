//! The per-element data object.
//!
//! A [`DataObject`] maps data kinds (`"BOLD"`, `"T1w"`, `"Warp"`) to entries.
//! Entries are reference counted: cloning a data object is cheap and a step
//! that mutates an entry through [`DataObject::item_mut`] gets its own copy,
//! leaving every other holder of the previous object untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::data::image::{Image, LazyImage};
use crate::data::space::Space;
use crate::errors::DataError;

pub const WARP_KIND: &str = "Warp";

/// In-memory payload of a data item.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Path only; nothing loaded.
    #[default]
    Empty,
    Image(LazyImage),
    Table(Array2<f64>),
    Value(Value),
}

impl Payload {
    pub fn image(&self) -> Option<&LazyImage> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Provenance trail of a data item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// Step name (`datareader`, `preprocess`, `marker`) to `{class, ...params}`.
    pub steps: BTreeMap<String, Value>,
    /// Element keys and values this item belongs to.
    pub element: BTreeMap<String, String>,
    /// Libraries needed to reproduce the item.
    pub dependencies: BTreeSet<String>,
}

/// One data kind of an element.
#[derive(Debug, Clone)]
pub struct DataItem {
    pub path: Option<PathBuf>,
    pub data: Payload,
    pub space: Space,
    pub meta: Meta,
    /// Native-space reference image used as the target grid of native warps.
    pub reference: Option<PathBuf>,
    /// Mask computed upstream, picked up by `"inherit"` mask requests.
    pub mask: Option<Box<DataItem>>,
    pub extra: Map<String, Value>,
}

impl DataItem {
    pub fn new(space: Space) -> Self {
        Self {
            path: None,
            data: Payload::Empty,
            space,
            meta: Meta::default(),
            reference: None,
            mask: None,
            extra: Map::new(),
        }
    }

    /// An item whose payload is an image file loaded on first use.
    pub fn from_path(path: impl Into<PathBuf>, space: Space) -> Self {
        let path = path.into();
        Self {
            data: Payload::Image(LazyImage::new(path.clone())),
            path: Some(path),
            ..Self::new(space)
        }
    }

    /// An item holding an already loaded image.
    pub fn from_image(image: Image, path: impl Into<PathBuf>, space: Space) -> Self {
        let path = path.into();
        Self {
            data: Payload::Image(LazyImage::loaded(path.clone(), image)),
            path: Some(path),
            ..Self::new(space)
        }
    }

    pub fn with_reference(mut self, reference: impl Into<PathBuf>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_mask(mut self, mask: DataItem) -> Self {
        self.mask = Some(Box::new(mask));
        self
    }

    /// The item's image, loading it if needed.
    pub fn image(&self) -> Result<Arc<Image>, DataError> {
        match &self.data {
            Payload::Image(lazy) => lazy.get(),
            _ => Err(DataError::configuration(format!(
                "Data item at {} does not hold an image",
                self.path
                    .as_ref()
                    .map_or_else(|| "<memory>".to_string(), |p| p.display().to_string())
            ))),
        }
    }
}

/// External tool family that produced a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Warper {
    Fsl,
    Ants,
}

impl Warper {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fsl => "fsl",
            Self::Ants => "ants",
        }
    }
}

impl fmt::Display for Warper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Warper {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fsl" => Ok(Self::Fsl),
            "ants" => Ok(Self::Ants),
            other => Err(DataError::invalid_parameter("warper", other, &["fsl", "ants"])),
        }
    }
}

/// One transform edge of the `"Warp"` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpSpec {
    pub src: Space,
    pub dst: Space,
    pub path: PathBuf,
    pub warper: Warper,
}

#[derive(Debug, Clone)]
pub enum DataEntry {
    Item(DataItem),
    /// Only ever stored under [`WARP_KIND`].
    Warp(Vec<WarpSpec>),
}

/// Mapping from data kind to entry for one element.
#[derive(Debug, Clone, Default)]
pub struct DataObject {
    entries: BTreeMap<String, Arc<DataEntry>>,
}

impl DataObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data kinds present, sorted.
    pub fn kinds(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.entries.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, kind: &str) -> Option<&DataEntry> {
        self.entries.get(kind).map(Arc::as_ref)
    }

    pub fn item(&self, kind: &str) -> Option<&DataItem> {
        match self.get(kind)? {
            DataEntry::Item(item) => Some(item),
            DataEntry::Warp(_) => None,
        }
    }

    /// Mutable access, copying the entry first if it is shared.
    pub fn item_mut(&mut self, kind: &str) -> Option<&mut DataItem> {
        match Arc::make_mut(self.entries.get_mut(kind)?) {
            DataEntry::Item(item) => Some(item),
            DataEntry::Warp(_) => None,
        }
    }

    /// Transform edges of the `"Warp"` entry, if any.
    pub fn warps(&self) -> Option<&[WarpSpec]> {
        match self.get(WARP_KIND)? {
            DataEntry::Warp(specs) => Some(specs),
            DataEntry::Item(_) => None,
        }
    }

    pub fn insert_item(&mut self, kind: impl Into<String>, item: DataItem) {
        self.entries
            .insert(kind.into(), Arc::new(DataEntry::Item(item)));
    }

    pub fn insert_warps(&mut self, specs: Vec<WarpSpec>) {
        self.entries
            .insert(WARP_KIND.to_string(), Arc::new(DataEntry::Warp(specs)));
    }

    pub fn insert(&mut self, kind: impl Into<String>, entry: DataEntry) {
        self.entries.insert(kind.into(), Arc::new(entry));
    }

    pub fn remove(&mut self, kind: &str) -> Option<DataEntry> {
        self.entries
            .remove(kind)
            .map(|entry| Arc::try_unwrap(entry).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// A copy without `kind`; used as the extra input of a marker.
    pub fn without(&self, kind: &str) -> DataObject {
        let mut copy = self.clone();
        copy.entries.remove(kind);
        copy
    }

    /// Whether the entry for `kind` is the same allocation in both objects.
    pub fn shares_entry(&self, other: &DataObject, kind: &str) -> bool {
        match (self.entries.get(kind), other.entries.get(kind)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}
