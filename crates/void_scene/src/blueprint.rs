//! Declarative composite descriptions

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use void_core::{Error, ErrorReport, ObjectId};
use void_resource::Value;

use crate::path::ComponentPath;

/// Declaration of one component inside a blueprint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Identifier, unique within its composite
    pub id: ObjectId,
    /// Name the component type was registered under
    #[serde(rename = "type")]
    pub type_name: String,
    /// Plain values
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Aliasing references to resources, by slot
    #[serde(default)]
    pub links: BTreeMap<String, ObjectId>,
    /// Paths to other component instances, by slot
    #[serde(default)]
    pub pointers: BTreeMap<String, String>,
}

impl ComponentDescriptor {
    /// Create a descriptor with no properties
    pub fn new(id: impl Into<ObjectId>, type_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            type_name: type_name.into(),
            properties: BTreeMap::new(),
            links: BTreeMap::new(),
            pointers: BTreeMap::new(),
        }
    }

    /// Builder: add a plain value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Builder: link a resource
    pub fn link(mut self, slot: impl Into<String>, target: impl Into<ObjectId>) -> Self {
        self.links.insert(slot.into(), target.into());
        self
    }

    /// Builder: point at another component instance
    pub fn pointer(mut self, slot: impl Into<String>, path: impl Into<String>) -> Self {
        self.pointers.insert(slot.into(), path.into());
        self
    }
}

/// Declaration of an entity: ordered components plus nested children
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompositeBlueprint {
    /// Identifier; unique among root blueprints, local among siblings
    pub id: ObjectId,
    /// Components in declaration order
    #[serde(default)]
    pub components: Vec<ComponentDescriptor>,
    /// Child blueprints, instantiated after this composite's components
    #[serde(default)]
    pub children: Vec<CompositeBlueprint>,
}

impl CompositeBlueprint {
    /// Create an empty blueprint
    pub fn new(id: impl Into<ObjectId>) -> Self {
        Self {
            id: id.into(),
            components: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: append a component
    pub fn component(mut self, component: ComponentDescriptor) -> Self {
        self.components.push(component);
        self
    }

    /// Builder: append a child blueprint
    pub fn child(mut self, child: CompositeBlueprint) -> Self {
        self.children.push(child);
        self
    }

    /// Check identifiers in this blueprint and its children.
    ///
    /// Component ids must be present and unique within each composite.
    pub fn validate(&self) -> ErrorReport {
        let mut report = ErrorReport::new();
        self.validate_into(self.id.as_str(), &mut report);
        report
    }

    fn validate_into(&self, path: &str, report: &mut ErrorReport) {
        if let Err(e) = self.id.validate() {
            report.push(e);
        }
        let mut seen = BTreeSet::new();
        for component in &self.components {
            if component.id.validate().is_err() {
                report.push(Error::InvalidIdentifier(format!("{}/{}", path, component.id)));
            } else if !seen.insert(component.id.as_str()) {
                report.push(Error::DuplicateIdentifier(format!("{}/{}", path, component.id)));
            }
        }
        for child in &self.children {
            child.validate_into(&format!("{}/{}", path, child.id), report);
        }
    }

    /// Every resource identifier linked anywhere in this blueprint
    pub fn linked_resources(&self) -> BTreeSet<ObjectId> {
        let mut out = BTreeSet::new();
        self.collect_links(&mut out);
        out
    }

    fn collect_links(&self, out: &mut BTreeSet<ObjectId>) {
        for component in &self.components {
            out.extend(component.links.values().cloned());
        }
        for child in &self.children {
            child.collect_links(out);
        }
    }

    /// Root composites named by absolute pointer paths anywhere in this
    /// blueprint, as `name` or `name:index`
    pub fn pointer_roots(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut pending = vec![self];
        while let Some(blueprint) = pending.pop() {
            for component in &blueprint.components {
                out.extend(
                    component
                        .pointers
                        .values()
                        .filter_map(|path| ComponentPath::parse(path).ok()?.root_id()),
                );
            }
            pending.extend(&blueprint.children);
        }
        out
    }
}
