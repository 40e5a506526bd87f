//! Name-keyed type table used to construct objects from declarations
//!
//! Concrete types register a constructor under their type name once, at
//! process start. After that the table is only read: a declaration names a
//! type, the factory looks it up and produces a blank, uninitialized value.
//!
//! The table is generic over the product (`T`, usually a trait object) and
//! the construction arguments (`A`), so resources and components share the
//! same mechanism.

use core::any::Any;
use core::fmt;
use std::collections::BTreeMap;

use crate::error::Error;

/// Static information about a registered type
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeInfo {
    /// Type name used by declarations
    pub name: String,
    /// Type names that instances of this type must be initialized after
    pub dependencies: Vec<String>,
}

impl TypeInfo {
    /// Describe a type with no dependencies
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
        }
    }

    /// Declare that instances must be initialized after instances of `ty`
    pub fn after(mut self, ty: impl Into<String>) -> Self {
        self.dependencies.push(ty.into());
        self
    }

    /// Declare several dependencies at once
    pub fn depends_on<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(types.into_iter().map(Into::into));
        self
    }
}

/// Boxed constructor stored in the table
pub type Constructor<T, A> = Box<dyn Fn(&A) -> Box<T> + Send + Sync>;

struct TypeEntry<T: ?Sized, A: ?Sized> {
    info: TypeInfo,
    constructor: Constructor<T, A>,
}

/// Maps type names to constructors
pub struct TypeFactory<T: ?Sized, A: ?Sized> {
    types: BTreeMap<String, TypeEntry<T, A>>,
}

impl<T: ?Sized, A: ?Sized> TypeFactory<T, A> {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Register a constructor. Re-registering a name replaces the entry.
    pub fn register<F>(&mut self, info: TypeInfo, constructor: F) -> &mut Self
    where
        F: Fn(&A) -> Box<T> + Send + Sync + 'static,
    {
        let name = info.name.clone();
        self.types.insert(
            name,
            TypeEntry {
                info,
                constructor: Box::new(constructor),
            },
        );
        self
    }

    /// Produce a blank value of the named type.
    ///
    /// `object` only labels the error when the type is unknown.
    pub fn create(&self, object: &str, type_name: &str, args: &A) -> Result<Box<T>, Error> {
        let entry = self.types.get(type_name).ok_or_else(|| Error::UnknownType {
            object: object.to_string(),
            type_name: type_name.to_string(),
        })?;
        Ok((entry.constructor)(args))
    }

    /// Get type info by name
    pub fn info(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(type_name).map(|e| &e.info)
    }

    /// Check if a type is registered by name
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Iterate over all registered types, by name
    pub fn iter(&self) -> impl Iterator<Item = &TypeInfo> {
        self.types.values().map(|e| &e.info)
    }

    /// Get the number of registered types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl<T: ?Sized, A: ?Sized> Default for TypeFactory<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized, A: ?Sized> fmt::Debug for TypeFactory<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeFactory")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Downcasting support for trait objects built by a [`TypeFactory`]
pub trait AsAny: Any {
    /// Get as Any reference (for downcasting)
    fn as_any(&self) -> &dyn Any;

    /// Get as mutable Any reference (for downcasting)
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
