//! Component pointer paths
//!
//! A pointer names another component instance relative to the composite that
//! holds the pointing component:
//!
//! ```text
//! transform              sibling component
//! ./arm/transform        component of child composite `arm`
//! ./wheel:1/transform    second child composite named `wheel`
//! ../transform           component of the parent composite
//! player/arm/transform   absolute, starting at root composite `player`
//! ```
//!
//! Only components that finished initialization resolve.

use std::collections::BTreeMap;

use void_core::ObjectId;

use crate::scene::{ComponentHandle, CompositeHandle, Scene};

/// One step through the composite hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step<'a> {
    /// Stay on the current composite
    Current,
    /// Move to the parent composite
    Parent,
    /// Move to the `index`-th child named `name`
    Child { name: &'a str, index: usize },
}

/// A parsed pointer path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentPath<'a> {
    /// Root composite name for absolute paths
    pub root: Option<(&'a str, usize)>,
    /// Steps taken from the start composite
    pub steps: Vec<Step<'a>>,
    /// Declared identifier of the target component
    pub component: &'a str,
}

fn named(segment: &str) -> Result<(&str, usize), String> {
    match segment.split_once(':') {
        Some((name, index)) => {
            let index = index
                .parse()
                .map_err(|_| format!("invalid index in segment '{}'", segment))?;
            Ok((name, index))
        }
        None => Ok((segment, 0)),
    }
}

impl<'a> ComponentPath<'a> {
    /// Parse a path; the error is a human-readable reason
    pub fn parse(path: &'a str) -> Result<Self, String> {
        let segments: Vec<&str> = path.split('/').collect();
        let Some((&component, composites)) = segments.split_last() else {
            return Err("empty path".into());
        };
        if component.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err("empty path segment".into());
        }

        let mut root = None;
        let mut steps = Vec::new();
        for (i, segment) in composites.iter().enumerate() {
            let step = match *segment {
                "." => Step::Current,
                ".." => Step::Parent,
                other if i == 0 => {
                    root = Some(named(other)?);
                    continue;
                }
                other => {
                    let (name, index) = named(other)?;
                    Step::Child { name, index }
                }
            };
            steps.push(step);
        }

        Ok(Self {
            root,
            steps,
            component,
        })
    }

    /// Identifier of the root an absolute path starts at
    pub fn root_id(&self) -> Option<String> {
        self.root.map(|(name, index)| match index {
            0 => name.to_string(),
            n => format!("{}:{}", name, n),
        })
    }

    /// Resolve against the scene, starting from composite `from` inside the
    /// tree rooted at `tree_root`. Absolute paths look in `staged_roots`
    /// before the live roots, so trees built earlier in the same batch shadow
    /// the live ones they replace.
    pub fn resolve(
        &self,
        scene: &Scene,
        from: CompositeHandle,
        tree_root: CompositeHandle,
        staged_roots: &BTreeMap<ObjectId, CompositeHandle>,
    ) -> Result<ComponentHandle, String> {
        let mut current = match self.root {
            None => from,
            Some((name, index)) => {
                let own_root = scene
                    .composite(tree_root)
                    .map_or(false, |c| index == 0 && (c.name() == name || c.id() == name));
                if own_root {
                    tree_root
                } else {
                    let id = self.root_id().unwrap_or_else(|| name.to_string());
                    staged_roots
                        .get(id.as_str())
                        .copied()
                        .or_else(|| scene.find(&id))
                        .ok_or_else(|| format!("no root composite '{}'", id))?
                }
            }
        };

        for step in &self.steps {
            current = match *step {
                Step::Current => current,
                Step::Parent => scene
                    .parent(current)
                    .ok_or_else(|| "composite has no parent".to_string())?,
                Step::Child { name, index } => scene
                    .children(current)
                    .iter()
                    .copied()
                    .filter(|c| scene.composite(*c).map_or(false, |c| c.name() == name))
                    .nth(index)
                    .ok_or_else(|| format!("no child '{}' at index {}", name, index))?,
            };
        }

        let handle = scene
            .component_named(current, self.component)
            .ok_or_else(|| format!("no component '{}'", self.component))?;
        let initialized = scene.component(handle).map_or(false, |c| c.is_initialized());
        if !initialized {
            return Err(format!("component '{}' is not initialized yet", self.component));
        }
        Ok(handle)
    }
}
