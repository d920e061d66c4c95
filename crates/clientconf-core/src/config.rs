//! Main entry point for clientconf
//!
//! [`ConfigBuilder`] takes the root document, a property table and options,
//! and runs one resolution pass per call to [`ConfigBuilder::build`]. The
//! result is a [`ResolvedConfig`]: a single-root, import-free, fully
//! substituted element tree ready for a typed settings builder.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::document::{Document, Element};
use crate::error::{Error, Result};
use crate::import::{DuplicateImportPolicy, ImportResolver};
use crate::locator::{
    decode_text, EmbeddedResources, Locator, LocatorOptions, Transport, TransportRegistry,
};
use crate::properties::PropertyTable;
use crate::substitution::{Substituter, UnresolvedPolicy, ValueEscape};

/// Default name of the root marker element
pub const DEFAULT_ROOT_ELEMENT: &str = "hazelcast-client";
/// Default name of the import directive element
pub const DEFAULT_IMPORT_ELEMENT: &str = "import";
/// Default name of the attribute holding an import's resource reference
pub const DEFAULT_RESOURCE_ATTRIBUTE: &str = "resource";
/// Default limit on nested imports
pub const DEFAULT_MAX_IMPORT_DEPTH: usize = 32;

/// Options for a resolution pass
#[derive(Debug, Clone)]
pub struct ConfigOptions {
    /// Name of the root marker element
    pub root_element: String,
    /// Name of the import directive element
    pub import_element: String,
    /// Attribute of the import directive holding the resource reference
    pub resource_attribute: String,
    /// What to do with placeholders missing from the property table
    pub unresolved_placeholders: UnresolvedPolicy,
    /// Whether a resource may be imported from more than one branch
    pub duplicate_imports: DuplicateImportPolicy,
    /// Maximum nesting of imports below the root document
    pub max_import_depth: usize,
    /// Base path for relative file references
    pub base_path: Option<PathBuf>,
    /// Allow HTTP imports (disabled by default for security)
    pub allow_http: bool,
    /// HTTP URL allowlist (glob patterns)
    pub http_allowlist: Vec<String>,
    /// Timeout for each HTTP request
    pub http_timeout: Duration,
}

impl Default for ConfigOptions {
    fn default() -> Self {
        let locator = LocatorOptions::default();
        Self {
            root_element: DEFAULT_ROOT_ELEMENT.to_string(),
            import_element: DEFAULT_IMPORT_ELEMENT.to_string(),
            resource_attribute: DEFAULT_RESOURCE_ATTRIBUTE.to_string(),
            unresolved_placeholders: UnresolvedPolicy::default(),
            duplicate_imports: DuplicateImportPolicy::default(),
            max_import_depth: DEFAULT_MAX_IMPORT_DEPTH,
            base_path: locator.base_path,
            allow_http: locator.allow_http,
            http_allowlist: locator.http_allowlist,
            http_timeout: locator.http_timeout,
        }
    }
}

impl ConfigOptions {
    pub fn with_root_element(mut self, name: impl Into<String>) -> Self {
        self.root_element = name.into();
        self
    }

    pub fn with_import_element(mut self, name: impl Into<String>) -> Self {
        self.import_element = name.into();
        self
    }

    pub fn with_resource_attribute(mut self, name: impl Into<String>) -> Self {
        self.resource_attribute = name.into();
        self
    }

    pub fn with_unresolved_placeholders(mut self, policy: UnresolvedPolicy) -> Self {
        self.unresolved_placeholders = policy;
        self
    }

    pub fn with_duplicate_imports(mut self, policy: DuplicateImportPolicy) -> Self {
        self.duplicate_imports = policy;
        self
    }

    pub fn with_max_import_depth(mut self, depth: usize) -> Self {
        self.max_import_depth = depth;
        self
    }

    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    pub fn with_http_allowlist<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.http_allowlist = patterns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// The locator settings carried by these options
    pub fn locator_options(&self) -> LocatorOptions {
        LocatorOptions {
            base_path: self.base_path.clone(),
            allow_http: self.allow_http,
            http_allowlist: self.http_allowlist.clone(),
            http_timeout: self.http_timeout,
        }
    }

    /// The substituter applied to every document of a pass
    ///
    /// Values are always XML-escaped so a property can never introduce markup.
    pub fn substituter(&self) -> Substituter {
        Substituter::new()
            .with_policy(self.unresolved_placeholders)
            .with_escape(ValueEscape::Xml)
    }
}

/// Builder for a resolution pass
///
/// The builder is reusable: each call to [`build`](Self::build) is an
/// independent pass with its own visited set.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    input: Vec<u8>,
    /// Identifier of the root document when it was read from a file
    source: Option<String>,
    /// Directory of the root file, used when no base path is configured
    root_dir: Option<PathBuf>,
    properties: PropertyTable,
    options: ConfigOptions,
    embedded: EmbeddedResources,
    transports: TransportRegistry,
}

impl ConfigBuilder {
    /// Create a builder for an in-memory root document
    pub fn from_bytes(input: impl Into<Vec<u8>>) -> Self {
        Self {
            input: input.into(),
            source: None,
            root_dir: None,
            properties: PropertyTable::new(),
            options: ConfigOptions::default(),
            embedded: EmbeddedResources::new(),
            transports: TransportRegistry::with_builtins(),
        }
    }

    /// Create a builder for root document text
    pub fn from_xml(xml: &str) -> Self {
        Self::from_bytes(xml.as_bytes())
    }

    /// Create a builder by reading the root document from a stream
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut input = Vec::new();
        reader
            .read_to_end(&mut input)
            .map_err(|e| Error::io(format!("Failed to read configuration input: {}", e)))?;
        Ok(Self::from_bytes(input))
    }

    /// Create a builder for a root document on disk
    ///
    /// The root is identified by its canonical path, so an import chain
    /// leading back to it is reported as a cycle.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read(path).map_err(|e| {
            Error::io(format!("Failed to read file '{}': {}", path.display(), e))
        })?;
        let canonical = path.canonicalize().map_err(|e| {
            Error::io(format!("Failed to resolve path '{}': {}", path.display(), e))
        })?;

        let mut builder = Self::from_bytes(input);
        builder.root_dir = canonical.parent().map(Path::to_path_buf);
        builder.source = Some(canonical.display().to_string());
        Ok(builder)
    }

    /// Set the property table used for every document of the pass
    pub fn with_properties(mut self, properties: PropertyTable) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_options(mut self, options: ConfigOptions) -> Self {
        self.options = options;
        self
    }

    /// Register an in-memory resource reachable as `classpath:<name>`
    pub fn with_embedded_resource(
        mut self,
        name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.embedded.insert(name, content);
        self
    }

    /// Add a directory searched for `classpath:` references
    pub fn with_classpath_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.embedded.add_root(root);
        self
    }

    /// Register a transport for its scheme
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.register(transport);
        self
    }

    /// Register a function as the transport for `scheme`
    pub fn with_transport_fn<F>(mut self, scheme: impl Into<String>, func: F) -> Self
    where
        F: Fn(&str, &LocatorOptions) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.transports.register_fn(scheme, func);
        self
    }

    pub fn properties(&self) -> &PropertyTable {
        &self.properties
    }

    pub fn options(&self) -> &ConfigOptions {
        &self.options
    }

    /// Run one resolution pass
    pub fn build(&self) -> Result<ResolvedConfig> {
        let mut locator_options = self.options.locator_options();
        if locator_options.base_path.is_none() {
            locator_options.base_path = self.root_dir.clone();
        }
        let locator = Locator::new(locator_options)
            .with_embedded(self.embedded.clone())
            .with_transports(self.transports.clone());

        let identifier = self.source.as_deref().unwrap_or("<input>");
        let text = decode_text(self.input.clone(), identifier)?;
        let substituted = self.options.substituter().apply(&text, &self.properties)?;
        let document = Document::parse(&substituted, self.source.as_deref())?;

        ImportResolver::new(&locator, &self.properties, &self.options).resolve(document)
    }
}

/// The result of a resolution pass
///
/// Cloning is cheap; the tree is shared and never modified.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    root: Arc<Element>,
    imported: Arc<[String]>,
}

impl ResolvedConfig {
    pub(crate) fn new(root: Element, imported: Vec<String>) -> Self {
        Self {
            root: Arc::new(root),
            imported: imported.into(),
        }
    }

    /// The root marker element
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Identifiers of every imported resource, in expansion order
    pub fn imported_resources(&self) -> &[String] {
        &self.imported
    }

    /// Get the element at `path`
    ///
    /// Paths are relative to the root element. When several elements match,
    /// the last one in document order wins, so a later declaration overrides
    /// an earlier (possibly imported) one.
    pub fn get(&self, path: &str) -> Result<&Element> {
        self.root
            .select(path)?
            .pop()
            .ok_or_else(|| Error::path_not_found(path))
    }

    /// Get every element matching `path`, in document order
    pub fn get_all(&self, path: &str) -> Result<Vec<&Element>> {
        self.root.select(path)
    }

    /// Check whether any element matches `path`
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_ok()
    }

    /// Get the text of the element at `path` (empty if it has none)
    pub fn get_text(&self, path: &str) -> Result<String> {
        Ok(self.get(path)?.text().unwrap_or_default().to_string())
    }

    /// Get the texts of every element matching `path`
    pub fn texts(&self, path: &str) -> Result<Vec<&str>> {
        Ok(self
            .get_all(path)?
            .into_iter()
            .map(|e| e.text().unwrap_or_default())
            .collect())
    }

    pub fn get_i64(&self, path: &str) -> Result<i64> {
        let text = self.get_text(path)?;
        text.trim()
            .parse()
            .map_err(|_| Error::type_coercion(path, "integer", format!("text (\"{}\")", text)))
    }

    pub fn get_f64(&self, path: &str) -> Result<f64> {
        let text = self.get_text(path)?;
        text.trim()
            .parse()
            .map_err(|_| Error::type_coercion(path, "float", format!("text (\"{}\")", text)))
    }

    /// Get a boolean; only "true" and "false" (any case) are accepted
    pub fn get_bool(&self, path: &str) -> Result<bool> {
        let text = self.get_text(path)?;
        match text.trim().to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(Error::type_coercion(
                path,
                "boolean",
                format!("text (\"{}\") - only \"true\" or \"false\" allowed", text),
            )),
        }
    }

    /// Get an attribute of the element at `path`
    pub fn attribute(&self, path: &str, name: &str) -> Result<&str> {
        self.get(path)?
            .attribute(name)
            .ok_or_else(|| Error::path_not_found(format!("{}@{}", path, name)))
    }

    /// Export the resolved tree as XML
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }

    /// Export the resolved tree as JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.root).map_err(|e| Error::parse(e.to_string()))
    }

    /// Export the resolved tree as YAML
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(&*self.root).map_err(|e| Error::parse(e.to_string()))
    }
}
