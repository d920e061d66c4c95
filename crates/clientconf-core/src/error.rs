//! Error types for clientconf
//!
//! Every failure during a resolution pass is fatal: the caller gets a single
//! error naming the failure kind and, where one is involved, the offending
//! resource reference and element path.

use std::fmt;

/// Result type alias for clientconf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for clientconf operations
#[derive(Debug, Clone)]
pub struct Error {
    /// The kind of error that occurred
    pub kind: ErrorKind,
    /// Element path where the error occurred (e.g., "hazelcast-client/network/import")
    pub path: Option<String>,
    /// The resource reference being processed, if any
    pub resource: Option<String>,
    /// Source location (resource, line) if available
    pub source_location: Option<SourceLocation>,
    /// Actionable help message
    pub help: Option<String>,
    /// Underlying cause (as string for Clone compatibility)
    pub cause: Option<String>,
}

/// Location in a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub line: Option<usize>,
    pub column: Option<usize>,
}

/// Categories of errors that can occur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed markup reported by the XML parser
    Parse,
    /// The document tree violates a structural rule
    Structure(StructureErrorKind),
    /// An import directive could not be expanded
    Import(ImportErrorKind),
    /// A placeholder had no value and the pass was configured to fail
    UnresolvedPlaceholder { name: String },
    /// Accessing a path that doesn't exist in a resolved config
    PathNotFound,
    /// Text could not be converted to the requested type
    TypeCoercion,
    /// I/O error reading the root input
    Io,
    /// Internal error (bug in clientconf)
    Internal,
}

/// Structural validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureErrorKind {
    /// The document contains no element at all
    MissingRootElement,
    /// The outermost element is not the root marker
    UnexpectedRootElement { expected: String, found: String },
    /// The root marker appears more than once
    DuplicateRootElement,
    /// An import element sits somewhere other than directly under the root
    ImportNotAllowedAtTopLevel,
}

/// Import expansion failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportErrorKind {
    /// The resource attribute is missing or empty
    EmptyResourceReference,
    /// The resource could not be fetched, or was empty once fetched
    ResourceUnavailable { resource: String },
    /// The resource was already visited during this pass
    CyclicImport { resource: String, chain: Vec<String> },
    /// Import chain nested deeper than the configured limit
    DepthExceeded { limit: usize },
}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: None,
            resource: None,
            source_location: None,
            help: None,
            cause: None,
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Parse)
        }
    }

    /// Create a missing root element error
    pub fn missing_root(expected: impl Into<String>) -> Self {
        Self {
            help: Some(format!(
                "Wrap the configuration in a <{}> element",
                expected.into()
            )),
            ..Self::new(ErrorKind::Structure(StructureErrorKind::MissingRootElement))
        }
    }

    /// Create an unexpected root element error
    pub fn unexpected_root(expected: impl Into<String>, found: impl Into<String>) -> Self {
        let expected = expected.into();
        Self {
            help: Some(format!("The outermost element must be <{}>", expected)),
            ..Self::new(ErrorKind::Structure(
                StructureErrorKind::UnexpectedRootElement {
                    expected,
                    found: found.into(),
                },
            ))
        }
    }

    /// Create a duplicate root element error
    pub fn duplicate_root(root: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            help: Some(format!(
                "<{}> may appear only once, as the outermost element",
                root.into()
            )),
            ..Self::new(ErrorKind::Structure(StructureErrorKind::DuplicateRootElement))
        }
    }

    /// Create an import placement error
    pub fn import_not_allowed(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            help: Some("Move the import so it is a direct child of the root element".into()),
            ..Self::new(ErrorKind::Structure(
                StructureErrorKind::ImportNotAllowedAtTopLevel,
            ))
        }
    }

    /// Create an empty resource reference error
    pub fn empty_resource() -> Self {
        Self {
            help: Some("Set the resource attribute to a file path, classpath: name or URL".into()),
            ..Self::new(ErrorKind::Import(ImportErrorKind::EmptyResourceReference))
        }
    }

    /// Create a resource unavailable error
    pub fn resource_unavailable(resource: impl Into<String>, message: impl Into<String>) -> Self {
        let resource = resource.into();
        Self {
            resource: Some(resource.clone()),
            help: Some(format!(
                "Check that '{}' exists, is readable and is not empty",
                resource
            )),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Import(ImportErrorKind::ResourceUnavailable {
                resource,
            }))
        }
    }

    /// Create a cyclic import error
    pub fn cyclic_import(resource: impl Into<String>, chain: Vec<String>) -> Self {
        let resource = resource.into();
        let chain_str = chain.join(" → ");
        Self {
            resource: Some(resource.clone()),
            help: Some("Break the cycle by removing one of the imports".into()),
            cause: Some(format!("Chain: {}", chain_str)),
            ..Self::new(ErrorKind::Import(ImportErrorKind::CyclicImport {
                resource,
                chain,
            }))
        }
    }

    /// Create an import depth error
    pub fn depth_exceeded(resource: impl Into<String>, limit: usize) -> Self {
        Self {
            resource: Some(resource.into()),
            help: Some("Flatten the import hierarchy or raise max_import_depth".into()),
            ..Self::new(ErrorKind::Import(ImportErrorKind::DepthExceeded { limit }))
        }
    }

    /// Create an unresolved placeholder error
    pub fn unresolved_placeholder(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            help: Some(format!(
                "Add '{}' to the property table or use UnresolvedPolicy::Keep",
                name
            )),
            ..Self::new(ErrorKind::UnresolvedPlaceholder { name })
        }
    }

    /// Create a path not found error
    pub fn path_not_found(path: impl Into<String>) -> Self {
        let path_str = path.into();
        Self {
            path: Some(path_str.clone()),
            help: Some(format!(
                "Check that '{}' exists in the configuration",
                path_str
            )),
            ..Self::new(ErrorKind::PathNotFound)
        }
    }

    /// Create a type coercion error
    pub fn type_coercion(
        path: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        Self {
            path: Some(path.into()),
            help: Some(format!(
                "Ensure the value can be converted to {}",
                expected.into()
            )),
            cause: Some(format!("Got: {}", got.into())),
            ..Self::new(ErrorKind::TypeCoercion)
        }
    }

    /// Create an I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self {
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Io)
        }
    }

    /// Create an internal error (bug in clientconf)
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            help: Some("This is likely a bug in clientconf. Please report it.".into()),
            cause: Some(message.into()),
            ..Self::new(ErrorKind::Internal)
        }
    }

    /// Add path context to the error
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add the resource reference being processed
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Add source location to the error
    pub fn with_source_location(mut self, loc: SourceLocation) -> Self {
        self.source_location = Some(loc);
        self
    }

    /// Add help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Whether this error came from import expansion
    pub fn is_import_error(&self) -> bool {
        matches!(self.kind, ErrorKind::Import(_))
    }

    /// Kinds whose headline already includes the resource reference
    fn headline_names_resource(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Import(
                ImportErrorKind::ResourceUnavailable { .. } | ImportErrorKind::CyclicImport { .. }
            )
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Parse => write!(f, "Parse error")?,
            ErrorKind::Structure(s) => match s {
                StructureErrorKind::MissingRootElement => write!(f, "Missing root element")?,
                StructureErrorKind::UnexpectedRootElement { expected, found } => write!(
                    f,
                    "Unexpected root element <{}>, expected <{}>",
                    found, expected
                )?,
                StructureErrorKind::DuplicateRootElement => {
                    write!(f, "Root element appears more than once")?
                }
                StructureErrorKind::ImportNotAllowedAtTopLevel => {
                    write!(f, "Import is only allowed at the top level of the document")?
                }
            },
            ErrorKind::Import(i) => match i {
                ImportErrorKind::EmptyResourceReference => write!(f, "Empty resource reference")?,
                ImportErrorKind::ResourceUnavailable { resource } => {
                    write!(f, "Resource unavailable: {}", resource)?
                }
                ImportErrorKind::CyclicImport { resource, .. } => {
                    write!(f, "Cyclic import of resource: {}", resource)?
                }
                ImportErrorKind::DepthExceeded { limit } => {
                    write!(f, "Import depth exceeded the limit of {}", limit)?
                }
            },
            ErrorKind::UnresolvedPlaceholder { name } => {
                write!(f, "Unresolved placeholder: ${{{}}}", name)?
            }
            ErrorKind::PathNotFound => write!(f, "Path not found")?,
            ErrorKind::TypeCoercion => write!(f, "Type coercion failed")?,
            ErrorKind::Io => write!(f, "I/O error")?,
            ErrorKind::Internal => write!(f, "Internal error")?,
        }

        if let Some(path) = &self.path {
            write!(f, "\n  Path: {}", path)?;
        }

        if let (Some(resource), false) = (&self.resource, self.headline_names_resource()) {
            write!(f, "\n  Resource: {}", resource)?;
        }

        if let Some(loc) = &self.source_location {
            write!(f, "\n  File: {}", loc.file)?;
            if let Some(line) = loc.line {
                write!(f, ":{}", line)?;
            }
        }

        if let Some(cause) = &self.cause {
            write!(f, "\n  {}", cause)?;
        }

        if let Some(help) = &self.help {
            write!(f, "\n  Help: {}", help)?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
