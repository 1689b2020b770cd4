//! Captured invocation arguments.

use indexmap::IndexMap;

use crate::error::Result;
use crate::reactive::{Reference, Runtime, Value};

/// Positional and named argument references for one invocation.
#[derive(Debug, Clone, Default)]
pub struct CapturedArgs {
    pub positional: Vec<Reference>,
    pub named: IndexMap<String, Reference>,
}

impl CapturedArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positional(mut self, reference: Reference) -> Self {
        self.positional.push(reference);
        self
    }

    pub fn with_named(mut self, name: impl Into<String>, reference: Reference) -> Self {
        self.named.insert(name.into(), reference);
        self
    }

    pub fn positional(&self, index: usize) -> Option<&Reference> {
        self.positional.get(index)
    }

    pub fn named(&self, name: &str) -> Option<&Reference> {
        self.named.get(name)
    }

    pub fn has_named(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Read every positional argument.
    pub fn positional_values(&self, rt: &Runtime) -> Result<Vec<Value>> {
        self.positional.iter().map(|r| r.value(rt)).collect()
    }

    /// Read every named argument.
    pub fn named_values(&self, rt: &Runtime) -> Result<IndexMap<String, Value>> {
        self.named
            .iter()
            .map(|(name, r)| Ok((name.clone(), r.value(rt)?)))
            .collect()
    }

    /// Read everything, registering each argument with the current frame.
    pub fn consume(&self, rt: &Runtime) -> Result<()> {
        for reference in self.positional.iter().chain(self.named.values()) {
            reference.value(rt)?;
        }
        Ok(())
    }
}
