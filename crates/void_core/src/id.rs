//! Stable string identifiers for declared objects and their instances

use core::borrow::Borrow;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of a declared object, blueprint, or runtime instance.
///
/// Identifiers come from the descriptor source and are stable across reloads:
/// reloading a descriptor with the same id replaces the live object.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Box<str>);

impl ObjectId {
    /// Create an identifier without validation
    pub fn new(id: impl Into<Box<str>>) -> Self {
        Self(id.into())
    }

    /// Create an identifier, rejecting empty or blank ids
    pub fn parse(id: &str) -> Result<Self, Error> {
        let id = Self::new(id);
        id.validate()?;
        Ok(id)
    }

    /// Check that this id is usable as a key
    pub fn validate(&self) -> Result<(), Error> {
        if self.0.trim().is_empty() {
            return Err(Error::InvalidIdentifier(self.0.to_string()));
        }
        Ok(())
    }

    /// The identifier text
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({:?})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ObjectId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ObjectId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for ObjectId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ObjectId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Generate `base`, `base_1`, `base_2`, ... until `taken` reports a free id
pub fn unique_id(base: &str, mut taken: impl FnMut(&str) -> bool) -> ObjectId {
    if !taken(base) {
        return ObjectId::new(base);
    }
    let mut index = 1u32;
    loop {
        let candidate = format!("{}_{}", base, index);
        if !taken(&candidate) {
            return ObjectId::new(candidate);
        }
        index += 1;
    }
}
