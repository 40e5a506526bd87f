//! Parsed, not-yet-live object declarations

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use void_core::ObjectId;

use crate::value::{Property, RefKind, Value};

/// Declaration of one object: identifier, type name and properties.
///
/// Descriptors are immutable once parsed. The engine keeps the last committed
/// descriptor of every object so dependents can be rebuilt during a reload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Stable identifier, unique within a batch
    pub id: ObjectId,
    /// Name the type was registered under
    #[serde(rename = "type")]
    pub type_name: String,
    /// Properties by name, in name order
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

impl ObjectDescriptor {
    /// Create a descriptor with no properties
    pub fn new(id: impl Into<ObjectId>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder: add a plain value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), Property::Value(value.into()));
        self
    }

    /// Builder: add an aliasing reference
    pub fn link(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.insert(name.into(), Property::Link(target.into()));
        self
    }

    /// Builder: add a list of aliasing references
    pub fn links<I, S>(mut self, name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let targets = targets.into_iter().map(Into::into).collect();
        self.properties.insert(name.into(), Property::Links(targets));
        self
    }

    /// Builder: add an owning reference
    pub fn embed(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.properties.insert(name.into(), Property::Embed(target.into()));
        self
    }

    /// Plain values only
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().filter_map(|(name, prop)| match prop {
            Property::Value(v) => Some((name.as_str(), v)),
            _ => None,
        })
    }

    /// Every reference slot as `(slot, index, kind, target)`.
    ///
    /// Single references have index 0; list slots count up from 0.
    pub fn references(&self) -> impl Iterator<Item = (&str, usize, RefKind, &str)> {
        self.properties.iter().flat_map(|(name, prop)| {
            prop.targets()
                .into_iter()
                .enumerate()
                .map(move |(i, (kind, target))| (name.as_str(), i, kind, target))
        })
    }

    /// Identifiers this descriptor refers to, of either kind
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.references().map(|(_, _, _, target)| target)
    }

    /// Identifiers this descriptor embeds
    pub fn embedded(&self) -> impl Iterator<Item = &str> {
        self.references()
            .filter(|(_, _, kind, _)| *kind == RefKind::Embed)
            .map(|(_, _, _, target)| target)
    }
}
