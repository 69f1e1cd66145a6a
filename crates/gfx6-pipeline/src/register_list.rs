//! Sparse register list carried by a compiled pipeline binary
//!
//! The shader compiler only records registers it has an opinion about. Absent registers read
//! as zero, but some consumers need to tell "explicitly zero" apart from "unspecified".

use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while building a register list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegisterListError {
    #[error("register {0:#06x} is specified more than once")]
    DuplicateRegister(u16),
}

/// Sparse map of register address to value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterList {
    entries: BTreeMap<u16, u32>,
}

impl RegisterList {
    /// Creates an empty register list
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a register list from `(address, value)` pairs
    ///
    /// # Arguments
    /// * `pairs` - Register address and value pairs in any order
    ///
    /// # Returns
    /// The register list, or an error if an address appears twice
    pub fn from_pairs(pairs: impl IntoIterator<Item = (u16, u32)>) -> Result<Self, RegisterListError> {
        let mut entries = BTreeMap::new();
        for (addr, value) in pairs {
            if entries.insert(addr, value).is_some() {
                return Err(RegisterListError::DuplicateRegister(addr));
            }
        }
        Ok(Self { entries })
    }

    /// Sets a register value, returning the previous value if there was one
    pub fn insert(&mut self, addr: u16, value: u32) -> Option<u32> {
        self.entries.insert(addr, value)
    }

    /// Returns the value of a register, or zero when it is not specified
    pub fn at(&self, addr: u16) -> u32 {
        self.entries.get(&addr).copied().unwrap_or(0)
    }

    /// Returns the value of a register only if it is specified
    pub fn has_entry(&self, addr: u16) -> Option<u32> {
        self.entries.get(&addr).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the specified registers in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = (u16, u32)> + '_ {
        self.entries.iter().map(|(addr, value)| (*addr, *value))
    }
}

impl FromIterator<(u16, u32)> for RegisterList {
    /// Collects pairs, letting later duplicates overwrite earlier ones
    fn from_iter<T: IntoIterator<Item = (u16, u32)>>(iter: T) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}
