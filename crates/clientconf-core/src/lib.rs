//! clientconf-core: client configuration loading with recursive imports
//!
//! This crate turns a root configuration document into a single, import-free
//! element tree. `${name}` placeholders are substituted from a caller-built
//! property table, and `<import resource="..."/>` directives are replaced by
//! the content of the referenced resource, recursively, with cycle detection.
//!
//! # Example
//!
//! ```rust
//! use clientconf_core::{ConfigBuilder, PropertyTable};
//!
//! let xml = r#"
//! <hazelcast-client>
//!     <import resource="classpath:group.xml"/>
//!     <executor-pool-size>${executor.pool.size}</executor-pool-size>
//! </hazelcast-client>
//! "#;
//!
//! let config = ConfigBuilder::from_xml(xml)
//!     .with_embedded_resource(
//!         "group.xml",
//!         "<hazelcast-client><group><name>dev</name></group></hazelcast-client>",
//!     )
//!     .with_properties(PropertyTable::from_pairs([("executor.pool.size", "40")]))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.get_text("group.name").unwrap(), "dev");
//! assert_eq!(config.get_i64("executor-pool-size").unwrap(), 40);
//! ```

pub mod document;
pub mod error;
pub mod import;
pub mod locator;
pub mod properties;
pub mod substitution;

mod config;

pub use config::{
    ConfigBuilder, ConfigOptions, ResolvedConfig, DEFAULT_IMPORT_ELEMENT,
    DEFAULT_MAX_IMPORT_DEPTH, DEFAULT_RESOURCE_ATTRIBUTE, DEFAULT_ROOT_ELEMENT,
};
pub use document::{Document, Element};
pub use error::{Error, Result};
pub use import::{DuplicateImportPolicy, ImportResolver, VisitedSet};
pub use locator::{EmbeddedResources, Locator, LocatorOptions, ResourceRef, Transport, TransportRegistry};
pub use properties::{PropertyLayer, PropertyTable};
pub use substitution::{substitute, Substituter, UnresolvedPolicy};
