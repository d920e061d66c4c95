//! Resource locator
//!
//! Turns the `resource` reference of an import into bytes. Recognized forms:
//!   classpath:name              - embedded resource, by logical name
//!   file:///absolute/path       - local file (RFC 8089)
//!   file://localhost/path       - local file, explicit localhost
//!   file:/absolute/path         - local file, minimal form
//!   path/to/file.xml            - bare path, relative to the base path
//!   scheme://rest               - fetched through the transport registered for `scheme`
//!
//! The locator does no caching; every call re-fetches.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, ErrorKind, ImportErrorKind, Result};

const CLASSPATH_PREFIX: &str = "classpath:";
const FILE_PREFIX: &str = "file:";
const UTF8_BOM: char = '\u{feff}';

/// A classified resource reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRef {
    /// `classpath:name` lookup in the embedded resources
    Embedded(String),
    /// A filesystem path, possibly relative
    File(PathBuf),
    /// A URL handled by a registered transport
    Url { scheme: String, url: String },
}

impl ResourceRef {
    /// Classify a reference string
    ///
    /// Fails with an empty resource reference error for blank input and with
    /// resource unavailable for `file:` URIs naming a remote host.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::empty_resource());
        }

        if let Some(name) = reference.strip_prefix(CLASSPATH_PREFIX) {
            let name = name.trim_start_matches('/');
            if name.is_empty() {
                return Err(Error::empty_resource().with_resource(reference));
            }
            return Ok(ResourceRef::Embedded(name.to_string()));
        }

        if let Some(rest) = strip_prefix_ignore_case(reference, FILE_PREFIX) {
            return normalize_file_uri(reference, rest).map(ResourceRef::File);
        }

        if let Some(scheme) = url_scheme(reference) {
            return Ok(ResourceRef::Url {
                scheme: scheme.to_ascii_lowercase(),
                url: reference.to_string(),
            });
        }

        Ok(ResourceRef::File(PathBuf::from(reference)))
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    match s.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&s[prefix.len()..]),
        _ => None,
    }
}

/// The scheme of a `scheme://rest` reference
///
/// Single-letter schemes are rejected so Windows drive paths stay paths.
fn url_scheme(reference: &str) -> Option<&str> {
    let (scheme, _) = reference.split_once("://")?;
    let mut chars = scheme.chars();
    let valid = scheme.len() > 1
        && chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Check if a hostname represents localhost
fn is_localhost(hostname: &str) -> bool {
    hostname.eq_ignore_ascii_case("localhost")
        || hostname.starts_with("127.")
        || hostname == "::1"
        || hostname == "[::1]"
}

/// Normalize the part of a `file:` URI after the scheme
fn normalize_file_uri(reference: &str, rest: &str) -> Result<PathBuf> {
    if rest.contains('\0') {
        return Err(Error::resource_unavailable(
            reference,
            "File paths cannot contain null bytes",
        ));
    }

    if let Some(after_slashes) = rest.strip_prefix("//") {
        // file:///path - empty authority
        if after_slashes.starts_with('/') {
            return Ok(PathBuf::from(after_slashes));
        }

        let (hostname, path) = after_slashes
            .split_once('/')
            .unwrap_or((after_slashes, ""));
        if hostname.is_empty() || is_localhost(hostname) {
            Ok(PathBuf::from(format!("/{}", path)))
        } else {
            Err(Error::resource_unavailable(
                reference,
                format!(
                    "Remote file URIs are not supported: hostname '{}' is not localhost",
                    hostname
                ),
            ))
        }
    } else {
        // file:/path (absolute) or file:relative/path
        Ok(PathBuf::from(rest))
    }
}

/// Embedded resources reachable through `classpath:` references
///
/// Registered entries are consulted first, then each root directory in the
/// order it was added.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedResources {
    entries: HashMap<String, Arc<[u8]>>,
    roots: Vec<PathBuf>,
}

impl EmbeddedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-memory resource (e.g. from `include_bytes!`)
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) {
        let name = name.into();
        let name = name.trim_start_matches('/').to_string();
        self.entries.insert(name, Arc::from(content.into()));
    }

    /// Builder: register an in-memory resource
    pub fn with_entry(mut self, name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(name, content);
        self
    }

    /// Builder: add a directory searched for resources not registered in memory
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Add a directory searched for resources not registered in memory
    pub fn add_root(&mut self, root: impl Into<PathBuf>) {
        self.roots.push(root.into());
    }

    /// Check whether a resource name can be found
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
            || (is_contained_name(name) && self.roots.iter().any(|r| r.join(name).is_file()))
    }

    /// Load a resource by name
    ///
    /// Names looked up under the root directories must be plain relative
    /// paths; `..`, absolute paths and prefixes are rejected.
    pub fn load(&self, name: &str) -> Option<std::io::Result<Vec<u8>>> {
        if let Some(content) = self.entries.get(name) {
            return Some(Ok(content.to_vec()));
        }

        if !is_contained_name(name) {
            return Some(Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Resource name '{}' escapes the classpath roots", name),
            )));
        }

        self.roots
            .iter()
            .map(|root| root.join(name))
            .find(|candidate| candidate.is_file())
            .map(std::fs::read)
    }
}

fn is_contained_name(name: &str) -> bool {
    Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Options controlling how references are located
#[derive(Debug, Clone)]
pub struct LocatorOptions {
    /// Base directory for relative filesystem paths (defaults to the working directory)
    pub base_path: Option<PathBuf>,
    /// Allow the built-in HTTP transports (disabled by default)
    pub allow_http: bool,
    /// HTTP URL allowlist (glob patterns); empty allows every URL
    pub http_allowlist: Vec<String>,
    /// Timeout applied to each HTTP request
    pub http_timeout: Duration,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            base_path: None,
            allow_http: false,
            http_allowlist: Vec::new(),
            http_timeout: Duration::from_secs(30),
        }
    }
}

/// Trait for transports fetching `scheme://` references
pub trait Transport: Send + Sync {
    /// Fetch the full content behind `url`
    fn fetch(&self, url: &str, options: &LocatorOptions) -> Result<Vec<u8>>;

    /// The URL scheme this transport serves
    fn scheme(&self) -> &str;
}

/// A simple function-based transport
pub struct FnTransport<F>
where
    F: Fn(&str, &LocatorOptions) -> Result<Vec<u8>> + Send + Sync,
{
    scheme: String,
    func: F,
}

impl<F> FnTransport<F>
where
    F: Fn(&str, &LocatorOptions) -> Result<Vec<u8>> + Send + Sync,
{
    /// Create a new function-based transport
    pub fn new(scheme: impl Into<String>, func: F) -> Self {
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            func,
        }
    }
}

impl<F> Transport for FnTransport<F>
where
    F: Fn(&str, &LocatorOptions) -> Result<Vec<u8>> + Send + Sync,
{
    fn fetch(&self, url: &str, options: &LocatorOptions) -> Result<Vec<u8>> {
        (self.func)(url, options)
    }

    fn scheme(&self) -> &str {
        &self.scheme
    }
}

/// Registry of transports, keyed by scheme
#[derive(Clone)]
pub struct TransportRegistry {
    transports: HashMap<String, Arc<dyn Transport>>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            transports: HashMap::new(),
        }
    }

    /// Create a registry with the built-in transports
    pub fn with_builtins() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "http")]
        {
            registry.register(Arc::new(http::HttpTransport::new("http")));
            registry.register(Arc::new(http::HttpTransport::new("https")));
        }

        registry
    }

    /// Register a transport, replacing any existing one for the same scheme
    pub fn register(&mut self, transport: Arc<dyn Transport>) {
        self.transports
            .insert(transport.scheme().to_ascii_lowercase(), transport);
    }

    /// Register a function as a transport
    pub fn register_fn<F>(&mut self, scheme: impl Into<String>, func: F)
    where
        F: Fn(&str, &LocatorOptions) -> Result<Vec<u8>> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnTransport::new(scheme, func)));
    }

    /// Get a transport by scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn Transport>> {
        self.transports.get(&scheme.to_ascii_lowercase())
    }

    /// Check if a scheme has a transport
    pub fn contains(&self, scheme: &str) -> bool {
        self.get(scheme).is_some()
    }
}

impl std::fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.transports.keys().collect();
        schemes.sort();
        f.debug_struct("TransportRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

/// A fetched resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    /// Canonical identifier of the resource
    pub identifier: String,
    /// Raw content
    pub bytes: Vec<u8>,
}

/// Resolves references into bytes
#[derive(Debug, Clone, Default)]
pub struct Locator {
    options: LocatorOptions,
    embedded: EmbeddedResources,
    transports: TransportRegistry,
}

impl Locator {
    /// Create a locator with the built-in transports and no embedded resources
    pub fn new(options: LocatorOptions) -> Self {
        Self {
            options,
            embedded: EmbeddedResources::new(),
            transports: TransportRegistry::with_builtins(),
        }
    }

    /// Replace the embedded resources
    pub fn with_embedded(mut self, embedded: EmbeddedResources) -> Self {
        self.embedded = embedded;
        self
    }

    /// Replace the transport registry
    pub fn with_transports(mut self, transports: TransportRegistry) -> Self {
        self.transports = transports;
        self
    }

    pub fn options(&self) -> &LocatorOptions {
        &self.options
    }

    /// Classify, normalize and fetch a reference in one step
    pub fn locate(&self, reference: &str) -> Result<Located> {
        let resource = ResourceRef::parse(reference)?;
        let identifier = self.identifier(&resource);
        let bytes = self.fetch(&resource, &identifier)?;
        Ok(Located { identifier, bytes })
    }

    /// The canonical identifier of a reference
    ///
    /// Files are identified by their canonical absolute path (or the
    /// lexically absolute path when they do not exist), embedded resources
    /// by `classpath:name` and URLs by their text with a lower-cased scheme.
    pub fn identifier(&self, resource: &ResourceRef) -> String {
        match resource {
            ResourceRef::Embedded(name) => format!("{}{}", CLASSPATH_PREFIX, name),
            ResourceRef::File(path) => {
                let absolute = self.absolute_path(path);
                absolute
                    .canonicalize()
                    .unwrap_or(absolute)
                    .display()
                    .to_string()
            }
            ResourceRef::Url { scheme, url } => {
                format!("{}{}", scheme, &url[scheme.len()..])
            }
        }
    }

    /// Fetch the content of a reference
    ///
    /// Missing, unreadable and empty resources all fail with
    /// resource unavailable.
    pub fn fetch(&self, resource: &ResourceRef, identifier: &str) -> Result<Vec<u8>> {
        let bytes = match resource {
            ResourceRef::Embedded(name) => {
                log::trace!("Loading embedded resource '{}'", name);
                match self.embedded.load(name) {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => return Err(Error::resource_unavailable(identifier, e.to_string())),
                    None => {
                        return Err(Error::resource_unavailable(
                            identifier,
                            "Not found among the embedded resources",
                        ))
                    }
                }
            }
            ResourceRef::File(path) => {
                let path = self.absolute_path(path);
                log::trace!("Reading file '{}'", path.display());
                std::fs::read(&path)
                    .map_err(|e| Error::resource_unavailable(identifier, e.to_string()))?
            }
            ResourceRef::Url { scheme, url } => {
                let transport = self.transports.get(scheme).ok_or_else(|| {
                    Error::resource_unavailable(
                        identifier,
                        format!("No transport registered for scheme '{}'", scheme),
                    )
                    .with_help(format!(
                        "Register a transport for '{}' or use a file path or classpath: reference",
                        scheme
                    ))
                })?;
                log::trace!("Fetching '{}' via the {} transport", url, scheme);
                transport
                    .fetch(url, &self.options)
                    .map_err(|e| as_unavailable(e, identifier))?
            }
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::resource_unavailable(identifier, "Resource is empty"));
        }

        Ok(bytes)
    }

    fn absolute_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.options.base_path {
            Some(base) => base.join(path),
            None => std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf()),
        }
    }
}

fn as_unavailable(err: Error, identifier: &str) -> Error {
    match err.kind {
        ErrorKind::Import(ImportErrorKind::ResourceUnavailable { .. }) => err,
        _ => Error::resource_unavailable(identifier, err.to_string()),
    }
}

/// Decode fetched bytes as UTF-8 text, dropping a leading byte order mark
pub fn decode_text(bytes: Vec<u8>, identifier: &str) -> Result<String> {
    let text = String::from_utf8(bytes).map_err(|e| {
        Error::parse(format!("Resource is not valid UTF-8: {}", e)).with_resource(identifier)
    })?;
    Ok(match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

#[cfg(feature = "http")]
mod http {
    //! `http://` and `https://` transports backed by ureq

    use super::{LocatorOptions, Transport};
    use crate::error::{Error, Result};

    /// Fetches references over HTTP(S)
    ///
    /// Disabled unless `allow_http` is set; when an allowlist is configured
    /// the URL must match one of its glob patterns.
    pub struct HttpTransport {
        scheme: &'static str,
    }

    impl HttpTransport {
        pub fn new(scheme: &'static str) -> Self {
            Self { scheme }
        }
    }

    impl Transport for HttpTransport {
        fn fetch(&self, url: &str, options: &LocatorOptions) -> Result<Vec<u8>> {
            if !options.allow_http {
                return Err(Error::resource_unavailable(
                    url,
                    format!("{} imports are disabled", self.scheme.to_uppercase()),
                )
                .with_help("Enable with ConfigOptions::with_allow_http(true)"));
            }

            if !options.http_allowlist.is_empty()
                && !options
                    .http_allowlist
                    .iter()
                    .any(|pattern| url_matches_pattern(url, pattern))
            {
                return Err(Error::resource_unavailable(
                    url,
                    format!(
                        "URL not in allowlist. Current allowlist: {}",
                        options.http_allowlist.join(", ")
                    ),
                ));
            }

            let config = ureq::Agent::config_builder()
                .timeout_global(Some(options.http_timeout))
                .build();
            let agent: ureq::Agent = config.into();

            let response = agent.get(url).call().map_err(|e| {
                let message = match &e {
                    ureq::Error::StatusCode(code) => format!("HTTP {}", code),
                    ureq::Error::Timeout(kind) => format!("Request timeout: {:?}", kind),
                    ureq::Error::Io(io_err) => format!("Connection error: {}", io_err),
                    _ => format!("HTTP request failed: {}", e),
                };
                Error::resource_unavailable(url, message)
            })?;

            response
                .into_body()
                .read_to_vec()
                .map_err(|e| Error::resource_unavailable(url, e.to_string()))
        }

        fn scheme(&self) -> &str {
            self.scheme
        }
    }

    /// Check if a URL matches an allowlist pattern
    ///
    /// Supports glob-style patterns:
    /// - `https://config.example.com/*` matches any path on that host
    /// - `https://*.example.com/*` matches any subdomain
    pub(super) fn url_matches_pattern(url: &str, pattern: &str) -> bool {
        let parsed_url = match url::Url::parse(url) {
            Ok(u) => u,
            Err(_) => {
                log::warn!("Invalid URL '{}' rejected by allowlist", url);
                return false;
            }
        };

        if pattern.contains("**") || pattern.contains(".*.*") {
            log::warn!(
                "Invalid allowlist pattern '{}' - contains dangerous sequence",
                pattern
            );
            return false;
        }

        match glob::Pattern::new(pattern) {
            Ok(glob_pattern) => glob_pattern.matches(parsed_url.as_str()),
            Err(_) => {
                log::warn!(
                    "Invalid glob pattern '{}' - falling back to exact match",
                    pattern
                );
                url == pattern
            }
        }
    }
}


// HTTP transport tests (require http feature and mockito)
#[cfg(all(test, feature = "http"))]
mod http_transport_tests {
    use super::*;
    use mockito::Server;

    fn http_options() -> LocatorOptions {
        LocatorOptions {
            allow_http: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_http_fetch() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/network.xml")
            .with_status(200)
            .with_header("content-type", "application/xml")
            .with_body("<hazelcast-client><network/></hazelcast-client>")
            .create();

        let locator = Locator::new(http_options());
        let located = locator
            .locate(&format!("{}/network.xml", server.url()))
            .unwrap();
        assert_eq!(
            located.bytes,
            b"<hazelcast-client><network/></hazelcast-client>"
        );

        mock.assert();
    }

    #[test]
    fn test_http_disabled_by_default() {
        let locator = Locator::new(LocatorOptions::default());
        let err = locator.locate("http://127.0.0.1:1/network.xml").unwrap_err();
        assert!(err.to_string().contains("HTTP imports are disabled"));
    }

    #[test]
    fn test_http_not_found() {
        let mut server = Server::new();
        let mock = server.mock("GET", "/missing.xml").with_status(404).create();

        let locator = Locator::new(http_options());
        let err = locator
            .locate(&format!("{}/missing.xml", server.url()))
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 404"));

        mock.assert();
    }

    #[test]
    fn test_http_allowlist() {
        let options = LocatorOptions {
            allow_http: true,
            http_allowlist: vec!["https://config.example.com/*".into()],
            ..Default::default()
        };
        let locator = Locator::new(options);
        let err = locator.locate("http://127.0.0.1:1/network.xml").unwrap_err();
        assert!(err.to_string().contains("URL not in allowlist"));
    }

    #[test]
    fn test_url_matches_pattern() {
        use super::http::url_matches_pattern;

        assert!(url_matches_pattern(
            "https://config.example.com/hz/network.xml",
            "https://config.example.com/*"
        ));
        assert!(url_matches_pattern(
            "https://eu.example.com/a.xml",
            "https://*.example.com/*"
        ));
        assert!(!url_matches_pattern(
            "https://evil.com/a.xml",
            "https://config.example.com/*"
        ));
        assert!(!url_matches_pattern("https://x.com/a", "https://**"));
    }
}
