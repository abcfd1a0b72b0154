//! Per-link handler name interning.
//!
//! The first time a tag crosses the link it is sent in full; both ends then
//! assign it the next reference (`len + 1`) and later frames carry only that
//! number. Nothing acknowledges the assignment: the two dictionaries agree only
//! because both ends observe the same ordered stream of first uses. That holds
//! for a single ordered byte stream with no loss or reordering below the
//! transport, and breaks otherwise. Both dictionaries are cleared together on
//! every disconnection so a new session starts from reference 1 again.

use std::collections::BTreeMap;

/// Outcome of looking a tag up on the sending side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRef {
    /// First use on this session; the name goes inline and now owns `reference`
    Registered(u32),
    /// Seen before; only the reference goes on the wire
    Known(u32),
}

impl SendRef {
    pub fn reference(self) -> u32 {
        match self {
            SendRef::Registered(reference) | SendRef::Known(reference) => reference,
        }
    }
}

/// Sending side: name → reference
#[derive(Debug, Default, Clone)]
pub struct SendDictionary {
    refs: BTreeMap<String, u32>,
}

impl SendDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look `name` up, registering it under the next reference when absent
    pub fn resolve(&mut self, name: &str) -> SendRef {
        if let Some(&reference) = self.refs.get(name) {
            return SendRef::Known(reference);
        }
        let reference = self.next_reference();
        self.refs.insert(name.to_owned(), reference);
        SendRef::Registered(reference)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.refs.get(name).copied()
    }

    fn next_reference(&self) -> u32 {
        self.refs.len() as u32 + 1
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    pub fn clear(&mut self) {
        self.refs.clear();
    }

    /// Registered `(name, reference)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.refs.iter().map(|(name, &reference)| (name.as_str(), reference))
    }
}

/// Receiving side: reference → name, references allocated densely from 1
#[derive(Debug, Default, Clone)]
pub struct ReceiveDictionary {
    names: Vec<String>,
}

impl ReceiveDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a name seen inline, returning the reference it now owns
    pub fn register(&mut self, name: String) -> u32 {
        self.names.push(name);
        self.names.len() as u32
    }

    pub fn lookup(&self, reference: u32) -> Option<&str> {
        let index = (reference as usize).checked_sub(1)?;
        self.names.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// Registered `(reference, name)` pairs in reference order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (index as u32 + 1, name.as_str()))
    }
}
