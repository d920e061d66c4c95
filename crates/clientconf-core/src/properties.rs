//! Property tables used for `${name}` substitution
//!
//! A table is an ordered list of named layers; lookups return the value
//! from the first layer that defines the name. Process-wide sources such as
//! the environment are captured into a layer when the caller asks for them,
//! so a resolution pass never reads ambient state.

use std::collections::HashMap;

/// One named source of properties
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyLayer {
    name: String,
    values: HashMap<String, String>,
}

impl PropertyLayer {
    /// Create an empty layer
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    /// Create a layer from key/value pairs
    pub fn from_pairs<I, K, V>(name: impl Into<String>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snapshot the current process environment
    pub fn environment() -> Self {
        Self::from_pairs("environment", std::env::vars())
    }

    /// Builder: set a property
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a property
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// The layer name (used in log output)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a property in this layer only
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Layered property table, first match wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTable {
    layers: Vec<PropertyLayer>,
}

impl PropertyTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a single-layer table of explicit properties
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new().with_layer(PropertyLayer::from_pairs("properties", pairs))
    }

    /// Builder: append a layer (consulted after the existing ones)
    pub fn with_layer(mut self, layer: PropertyLayer) -> Self {
        self.layers.push(layer);
        self
    }

    /// Builder: append a layer of explicit properties
    pub fn with_properties<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.with_layer(PropertyLayer::from_pairs("properties", pairs))
    }

    /// Builder: append a snapshot of the process environment
    pub fn with_environment(self) -> Self {
        self.with_layer(PropertyLayer::environment())
    }

    /// Look up a property, returning the value from the first layer defining it
    pub fn get(&self, key: &str) -> Option<&str> {
        self.layers.iter().find_map(|layer| layer.get(key))
    }

    /// Look up a property along with the name of the layer that supplied it
    pub fn get_with_layer(&self, key: &str) -> Option<(&str, &str)> {
        self.layers
            .iter()
            .find_map(|layer| layer.get(key).map(|v| (v, layer.name())))
    }

    /// Check whether any layer defines the property
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// The layers, in lookup order
    pub fn layers(&self) -> &[PropertyLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(PropertyLayer::is_empty)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PropertyTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
