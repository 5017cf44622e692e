//! Protocol library: validated definitions keyed by protocol id.
//!
//! The bundled documents are compiled into the binary so a session can start
//! with no filesystem access at all.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::info;

use super::ProtocolDefinition;
use crate::error::ProtocolError;

const BUNDLED: [(&str, &str); 2] = [
    ("cpr", include_str!("../../protocols/cpr.json")),
    ("choking", include_str!("../../protocols/choking.json")),
];

/// Read-only set of protocols a session can be started from.
#[derive(Debug, Clone, Default)]
pub struct ProtocolLibrary {
    protocols: BTreeMap<String, Arc<ProtocolDefinition>>,
}

impl ProtocolLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding every protocol shipped with the crate.
    pub fn bundled() -> Result<Self, ProtocolError> {
        let mut library = Self::new();
        for (name, json) in BUNDLED {
            let id = library.load_json(json)?;
            info!("Library: bundled '{name}' loaded as '{id}'");
        }
        Ok(library)
    }

    /// Parse, validate and insert a JSON document.  Returns its id.
    pub fn load_json(&mut self, json: &str) -> Result<String, ProtocolError> {
        let protocol = ProtocolDefinition::from_json(json)?;
        let id = protocol.id().to_owned();
        self.insert(protocol);
        Ok(id)
    }

    /// Insert a validated definition, replacing any with the same id.
    pub fn insert(&mut self, protocol: ProtocolDefinition) -> Arc<ProtocolDefinition> {
        let protocol = Arc::new(protocol);
        self.protocols
            .insert(protocol.id().to_owned(), Arc::clone(&protocol));
        protocol
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProtocolDefinition>> {
        self.protocols.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.protocols.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.protocols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.protocols.is_empty()
    }
}
