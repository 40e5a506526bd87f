//! Descriptor batches
//!
//! A batch is the unit handed over by a descriptor source: a set of object
//! descriptors plus the composite blueprints built from them. Loading and
//! reloading both take a whole batch and apply it completely or not at all.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use void_core::{Error, ErrorReport};
use void_resource::ObjectDescriptor;
use void_scene::CompositeBlueprint;

/// Objects and composite blueprints applied together
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptorBatch {
    /// Object descriptors
    #[serde(default)]
    pub objects: Vec<ObjectDescriptor>,
    /// Root composite blueprints
    #[serde(default)]
    pub composites: Vec<CompositeBlueprint>,
}

impl DescriptorBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an object descriptor
    pub fn object(mut self, descriptor: ObjectDescriptor) -> Self {
        self.objects.push(descriptor);
        self
    }

    /// Add a composite blueprint
    pub fn composite(mut self, blueprint: CompositeBlueprint) -> Self {
        self.composites.push(blueprint);
        self
    }

    /// Check if the batch declares nothing
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty() && self.composites.is_empty()
    }

    /// Total number of declarations
    pub fn len(&self) -> usize {
        self.objects.len() + self.composites.len()
    }

    /// Identifier checks that need no registry: empty or duplicated object
    /// ids, duplicated blueprint ids, and each blueprint's own checks.
    pub fn validate(&self) -> ErrorReport {
        let mut report = ErrorReport::new();

        let mut objects = BTreeSet::new();
        for desc in &self.objects {
            if let Err(e) = desc.id.validate() {
                report.push(e);
            } else if !objects.insert(desc.id.as_str()) {
                report.push(Error::DuplicateIdentifier(desc.id.to_string()));
            }
        }

        let mut composites = BTreeSet::new();
        for blueprint in &self.composites {
            report.merge(blueprint.validate());
            if blueprint.id.validate().is_ok() && !composites.insert(blueprint.id.as_str()) {
                report.push(Error::DuplicateIdentifier(blueprint.id.to_string()));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use void_scene::ComponentDescriptor;

    #[test]
    fn test_duplicates_reported() {
        let batch = DescriptorBatch::new()
            .object(ObjectDescriptor::new("mesh", "Mesh"))
            .object(ObjectDescriptor::new("mesh", "Mesh"))
            .object(ObjectDescriptor::new("", "Mesh"))
            .composite(CompositeBlueprint::new("player"))
            .composite(CompositeBlueprint::new("player"));

        let report = batch.validate();
        assert_eq!(report.len(), 3);
        assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "mesh")));
        assert!(report.contains(|e| matches!(e, Error::DuplicateIdentifier(id) if id == "player")));
        assert!(report.contains(|e| matches!(e, Error::InvalidIdentifier(_))));
    }

    #[test]
    fn test_deserialize_batch() {
        let batch: DescriptorBatch = serde_json::from_str(
            r#"{
                "objects": [
                    { "id": "cube", "type": "Mesh", "properties": { "size": { "value": 2 } } }
                ],
                "composites": [
                    { "id": "player", "components": [
                        { "id": "body", "type": "Body", "links": { "mesh": "cube" } }
                    ] }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.objects[0].id, "cube");
        assert_eq!(
            batch.composites[0],
            CompositeBlueprint::new("player")
                .component(ComponentDescriptor::new("body", "Body").link("mesh", "cube"))
        );
        assert!(batch.validate().is_empty());
    }
}
