//! Import graph resolution
//!
//! Expands `<import resource="..."/>` directives depth-first. Each imported
//! resource is located, substituted against the same property table as the
//! root, parsed, validated and recursively expanded before its root's
//! children are spliced into the importing document where the directive
//! stood.
//!
//! Every resource identifier seen during a pass is recorded in a
//! [`VisitedSet`]. Meeting an identifier again fails the pass with a cyclic
//! import error: this catches two-node and longer cycles, and (under the
//! default [`DuplicateImportPolicy::Reject`]) a resource imported from two
//! independent branches.

use indexmap::IndexSet;

use crate::config::{ConfigOptions, ResolvedConfig};
use crate::document::{Document, Element};
use crate::error::{Error, Result};
use crate::locator::{decode_text, Locator, ResourceRef};
use crate::properties::PropertyTable;

/// What to do when a resource is imported a second time without forming a cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateImportPolicy {
    /// Any repeated identifier in the pass is a cyclic import (diamonds fail)
    #[default]
    Reject,
    /// Only identifiers on the current import chain are cycles (diamonds expand twice)
    Allow,
}

/// Resource identifiers seen during one resolution pass
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    identifiers: IndexSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier; returns false if it was already present
    pub fn insert(&mut self, identifier: impl Into<String>) -> bool {
        self.identifiers.insert(identifier.into())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.identifiers.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// Identifiers in the order they were first visited
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }
}

/// Resolver for one pass
///
/// A resolver owns its visited set, so it is consumed by [`resolve`](Self::resolve);
/// every pass starts from a fresh one.
pub struct ImportResolver<'a> {
    locator: &'a Locator,
    properties: &'a PropertyTable,
    options: &'a ConfigOptions,
    visited: VisitedSet,
    /// Identifiers of the documents currently being expanded, outermost first
    chain: Vec<String>,
    /// Every expanded import, in expansion order
    imported: Vec<String>,
    depth: usize,
}

impl<'a> ImportResolver<'a> {
    pub fn new(
        locator: &'a Locator,
        properties: &'a PropertyTable,
        options: &'a ConfigOptions,
    ) -> Self {
        Self {
            locator,
            properties,
            options,
            visited: VisitedSet::new(),
            chain: Vec::new(),
            imported: Vec::new(),
            depth: 0,
        }
    }

    /// Resolve an already substituted root document into an import-free tree
    pub fn resolve(mut self, document: Document) -> Result<ResolvedConfig> {
        if let Some(source) = document.source() {
            self.visited.insert(source);
            self.chain.push(source.to_string());
        }

        let root = self.expand(document)?;

        if root.contains_descendant(&self.options.import_element) {
            return Err(Error::internal(
                "import directive left in the tree after resolution",
            ));
        }

        log::debug!(
            "Resolved <{}> with {} imported resource(s)",
            root.name,
            self.imported.len()
        );
        Ok(ResolvedConfig::new(root, self.imported))
    }

    /// Validate a document and expand the imports directly under its root
    fn expand(&mut self, document: Document) -> Result<Element> {
        let source = document.source().map(str::to_string);
        let mut root = validate(document.into_elements(), self.options).map_err(|e| {
            match (&source, e.resource.is_none()) {
                (Some(source), true) => e.with_resource(source.as_str()),
                _ => e,
            }
        })?;

        let mut children = Vec::with_capacity(root.children.len());
        for child in std::mem::take(&mut root.children) {
            if child.name == self.options.import_element {
                let path = format!("{}/{}", root.name, child.name);
                children.extend(self.import(&child, &path)?);
            } else {
                children.push(child);
            }
        }
        root.children = children;

        Ok(root)
    }

    /// Expand one directive into the children of the imported root
    fn import(&mut self, directive: &Element, path: &str) -> Result<Vec<Element>> {
        let reference = directive
            .attribute(&self.options.resource_attribute)
            .map(str::trim)
            .unwrap_or_default();
        if reference.is_empty() {
            return Err(Error::empty_resource().with_path(path));
        }

        let resource = ResourceRef::parse(reference).map_err(|e| e.with_path(path))?;
        let identifier = self.locator.identifier(&resource);

        let on_chain = self.chain.contains(&identifier);
        let repeated = match self.options.duplicate_imports {
            DuplicateImportPolicy::Reject => self.visited.contains(&identifier),
            DuplicateImportPolicy::Allow => on_chain,
        };
        if repeated {
            let mut chain = self.chain.clone();
            chain.push(identifier.clone());
            let mut err = Error::cyclic_import(&identifier, chain).with_path(path);
            if !on_chain {
                err = err.with_help(
                    "The resource was already imported elsewhere in this configuration; import it once",
                );
            }
            return Err(err);
        }

        if self.depth >= self.options.max_import_depth {
            return Err(
                Error::depth_exceeded(&identifier, self.options.max_import_depth).with_path(path),
            );
        }

        log::debug!("Importing '{}' from {}", reference, identifier);
        let bytes = self
            .locator
            .fetch(&resource, &identifier)
            .map_err(|e| e.with_path(path))?;
        let text = decode_text(bytes, &identifier)?;
        let substituted = self
            .options
            .substituter()
            .apply(&text, self.properties)
            .map_err(|e| e.with_resource(identifier.as_str()))?;
        let document = Document::parse(&substituted, Some(identifier.as_str()))?;

        self.visited.insert(identifier.as_str());
        self.imported.push(identifier.clone());
        self.chain.push(identifier);
        self.depth += 1;

        let root = self.expand(document)?;

        self.depth -= 1;
        self.chain.pop();

        Ok(root.children)
    }
}

/// Structural checks on the top-level elements of one document
///
/// The first element must be the root marker; the root marker may not
/// appear anywhere else, and import directives may only be direct children
/// of the root.
fn validate(elements: Vec<Element>, options: &ConfigOptions) -> Result<Element> {
    let root_name = options.root_element.as_str();
    let import_name = options.import_element.as_str();

    let mut elements = elements.into_iter();
    let root = elements
        .next()
        .ok_or_else(|| Error::missing_root(root_name))?;

    if root.name == import_name {
        return Err(Error::import_not_allowed(import_name));
    }
    if root.name != root_name {
        return Err(Error::unexpected_root(root_name, &root.name));
    }

    if let Some(extra) = elements.next() {
        return Err(if extra.name == root_name {
            Error::duplicate_root(root_name, root_name)
        } else if extra.name == import_name {
            Error::import_not_allowed(import_name)
        } else {
            Error::parse(format!(
                "Unexpected top-level element <{}> after <{}>",
                extra.name, root_name
            ))
        });
    }

    check_nested(&root, &root.name, true, options)?;
    Ok(root)
}

fn check_nested(
    element: &Element,
    path: &str,
    is_root: bool,
    options: &ConfigOptions,
) -> Result<()> {
    for child in &element.children {
        let child_path = format!("{}/{}", path, child.name);
        if child.name == options.root_element {
            return Err(Error::duplicate_root(&options.root_element, child_path));
        }
        if child.name == options.import_element && !is_root {
            return Err(Error::import_not_allowed(child_path));
        }
        check_nested(child, &child_path, false, options)?;
    }
    Ok(())
}

/// Resolve a parsed root document with a locator built from `options`
pub fn resolve(
    document: Document,
    properties: &PropertyTable,
    options: &ConfigOptions,
) -> Result<ResolvedConfig> {
    let locator = Locator::new(options.locator_options());
    ImportResolver::new(&locator, properties, options).resolve(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ImportErrorKind, StructureErrorKind};
    use crate::locator::{EmbeddedResources, LocatorOptions};
    use pretty_assertions::assert_eq;

    fn parse(xml: &str) -> Document {
        Document::parse(xml, None).unwrap()
    }

    fn embedded_locator(entries: &[(&str, &str)]) -> Locator {
        let embedded = entries
            .iter()
            .fold(EmbeddedResources::new(), |acc, (name, xml)| {
                acc.with_entry(*name, *xml)
            });
        Locator::new(LocatorOptions::default()).with_embedded(embedded)
    }

    fn resolve_with(
        locator: &Locator,
        options: &ConfigOptions,
        xml: &str,
    ) -> Result<ResolvedConfig> {
        ImportResolver::new(locator, &PropertyTable::new(), options).resolve(parse(xml))
    }

    fn structure_kind(err: &Error) -> Option<&StructureErrorKind> {
        match &err.kind {
            ErrorKind::Structure(kind) => Some(kind),
            _ => None,
        }
    }

    #[test]
    fn test_no_imports_is_noop() {
        let xml = r#"<hazelcast-client>
            <group><name>dev</name></group>
            <network><smart-routing>true</smart-routing></network>
        </hazelcast-client>"#;

        let resolved = resolve(parse(xml), &PropertyTable::new(), &ConfigOptions::default()).unwrap();
        assert_eq!(resolved.root(), parse(xml).root().unwrap());
        assert!(resolved.imported_resources().is_empty());
    }

    #[test]
    fn test_splice_preserves_sibling_order() {
        let locator = embedded_locator(&[(
            "middle.xml",
            "<hazelcast-client><b/><c/></hazelcast-client>",
        )]);
        let resolved = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><a/><import resource="classpath:middle.xml"/><d/></hazelcast-client>"#,
        )
        .unwrap();

        let names: Vec<_> = resolved.root().children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
        assert_eq!(resolved.imported_resources(), &["classpath:middle.xml".to_string()]);
    }

    #[test]
    fn test_nested_imports_expand_depth_first() {
        let locator = embedded_locator(&[
            (
                "outer.xml",
                r#"<hazelcast-client><o1/><import resource="classpath:inner.xml"/><o2/></hazelcast-client>"#,
            ),
            ("inner.xml", "<hazelcast-client><i/></hazelcast-client>"),
        ]);
        let resolved = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:outer.xml"/><r/></hazelcast-client>"#,
        )
        .unwrap();

        let names: Vec<_> = resolved.root().children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["o1", "i", "o2", "r"]);
        assert_eq!(
            resolved.imported_resources(),
            &["classpath:outer.xml".to_string(), "classpath:inner.xml".to_string()]
        );
    }

    #[test]
    fn test_two_node_cycle() {
        let locator = embedded_locator(&[
            ("a.xml", r#"<hazelcast-client><import resource="classpath:b.xml"/></hazelcast-client>"#),
            ("b.xml", r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#),
        ]);
        let err = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();

        match err.kind {
            ErrorKind::Import(ImportErrorKind::CyclicImport { resource, chain }) => {
                assert_eq!(resource, "classpath:a.xml");
                assert_eq!(
                    chain,
                    vec!["classpath:a.xml", "classpath:b.xml", "classpath:a.xml"]
                );
            }
            other => panic!("Expected CyclicImport, got {:?}", other),
        }
    }

    #[test]
    fn test_three_node_cycle() {
        let locator = embedded_locator(&[
            ("a.xml", r#"<hazelcast-client><import resource="classpath:b.xml"/></hazelcast-client>"#),
            ("b.xml", r#"<hazelcast-client><import resource="classpath:c.xml"/></hazelcast-client>"#),
            ("c.xml", r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#),
        ]);
        let err = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::CyclicImport { .. })
        ));
        assert!(err.to_string().contains("classpath:a.xml → classpath:b.xml → classpath:c.xml → classpath:a.xml"));
    }

    #[test]
    fn test_self_import_of_identified_root() {
        let locator = embedded_locator(&[]);
        let xml = r#"<hazelcast-client><import resource="classpath:root.xml"/></hazelcast-client>"#;
        let document = Document::parse(xml, Some("classpath:root.xml")).unwrap();

        let err = ImportResolver::new(&locator, &PropertyTable::new(), &ConfigOptions::default())
            .resolve(document)
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::CyclicImport { .. })
        ));
    }

    const DIAMOND_ROOT: &str = r#"<hazelcast-client>
        <import resource="classpath:left.xml"/>
        <import resource="classpath:right.xml"/>
    </hazelcast-client>"#;

    fn diamond_locator() -> Locator {
        embedded_locator(&[
            ("left.xml", r#"<hazelcast-client><left/><import resource="classpath:shared.xml"/></hazelcast-client>"#),
            ("right.xml", r#"<hazelcast-client><right/><import resource="classpath:shared.xml"/></hazelcast-client>"#),
            ("shared.xml", "<hazelcast-client><shared/></hazelcast-client>"),
        ])
    }

    #[test]
    fn test_diamond_import_rejected_by_default() {
        let err = resolve_with(&diamond_locator(), &ConfigOptions::default(), DIAMOND_ROOT).unwrap_err();

        assert!(matches!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::CyclicImport { ref resource, .. }) if resource == "classpath:shared.xml"
        ));
        assert!(err.to_string().contains("already imported"));
    }

    #[test]
    fn test_diamond_import_allowed_by_policy() {
        let options = ConfigOptions::default().with_duplicate_imports(DuplicateImportPolicy::Allow);
        let resolved = resolve_with(&diamond_locator(), &options, DIAMOND_ROOT).unwrap();

        let names: Vec<_> = resolved.root().children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["left", "shared", "right", "shared"]);
    }

    #[test]
    fn test_cycle_still_detected_when_duplicates_allowed() {
        let locator = embedded_locator(&[
            ("a.xml", r#"<hazelcast-client><import resource="classpath:b.xml"/></hazelcast-client>"#),
            ("b.xml", r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#),
        ]);
        let options = ConfigOptions::default().with_duplicate_imports(DuplicateImportPolicy::Allow);
        let err = resolve_with(
            &locator,
            &options,
            r#"<hazelcast-client><import resource="classpath:a.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::CyclicImport { .. })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let locator = embedded_locator(&[
            ("1.xml", r#"<hazelcast-client><import resource="classpath:2.xml"/></hazelcast-client>"#),
            ("2.xml", r#"<hazelcast-client><import resource="classpath:3.xml"/></hazelcast-client>"#),
            ("3.xml", "<hazelcast-client><leaf/></hazelcast-client>"),
        ]);
        let root = r#"<hazelcast-client><import resource="classpath:1.xml"/></hazelcast-client>"#;

        let err = resolve_with(&locator, &ConfigOptions::default().with_max_import_depth(2), root)
            .unwrap_err();
        assert_eq!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::DepthExceeded { limit: 2 })
        );

        let resolved =
            resolve_with(&locator, &ConfigOptions::default().with_max_import_depth(3), root).unwrap();
        assert_eq!(resolved.root().children[0].name, "leaf");
    }

    #[test]
    fn test_import_nested_in_section_rejected_before_fetch() {
        let err = resolve_with(
            &embedded_locator(&[]),
            &ConfigOptions::default(),
            r#"<hazelcast-client><network><import resource=""/></network></hazelcast-client>"#,
        )
        .unwrap_err();

        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::ImportNotAllowedAtTopLevel)
        );
        assert_eq!(err.path.as_deref(), Some("hazelcast-client/network/import"));
    }

    #[test]
    fn test_import_nested_in_imported_document_rejected() {
        let locator = embedded_locator(&[(
            "bad.xml",
            r#"<hazelcast-client><network><import resource="x.xml"/></network></hazelcast-client>"#,
        )]);
        let err = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:bad.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();

        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::ImportNotAllowedAtTopLevel)
        );
        assert_eq!(err.resource.as_deref(), Some("classpath:bad.xml"));
    }

    #[test]
    fn test_import_as_top_level_sibling_rejected() {
        let err = resolve_with(
            &embedded_locator(&[]),
            &ConfigOptions::default(),
            r#"<hazelcast-client/><import resource="a.xml"/>"#,
        )
        .unwrap_err();
        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::ImportNotAllowedAtTopLevel)
        );
    }

    #[test]
    fn test_duplicate_root_nested() {
        let err = resolve_with(
            &embedded_locator(&[]),
            &ConfigOptions::default(),
            "<hazelcast-client><hazelcast-client></hazelcast-client></hazelcast-client>",
        )
        .unwrap_err();
        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::DuplicateRootElement)
        );
        assert_eq!(err.path.as_deref(), Some("hazelcast-client/hazelcast-client"));
    }

    #[test]
    fn test_duplicate_root_top_level() {
        let err = resolve_with(
            &embedded_locator(&[]),
            &ConfigOptions::default(),
            "<hazelcast-client/><hazelcast-client/>",
        )
        .unwrap_err();
        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::DuplicateRootElement)
        );
    }

    #[test]
    fn test_duplicate_root_in_imported_document() {
        let locator = embedded_locator(&[(
            "twice.xml",
            "<hazelcast-client><group><hazelcast-client/></group></hazelcast-client>",
        )]);
        let err = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:twice.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();
        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::DuplicateRootElement)
        );
    }

    #[test]
    fn test_wrong_or_missing_root() {
        let err = resolve_with(&embedded_locator(&[]), &ConfigOptions::default(), "<hazelcast/>")
            .unwrap_err();
        assert!(matches!(
            structure_kind(&err),
            Some(StructureErrorKind::UnexpectedRootElement { .. })
        ));

        let err = resolve_with(&embedded_locator(&[]), &ConfigOptions::default(), "<!-- nothing -->")
            .unwrap_err();
        assert_eq!(
            structure_kind(&err),
            Some(&StructureErrorKind::MissingRootElement)
        );
    }

    #[test]
    fn test_empty_and_missing_resource_attribute() {
        for xml in [
            r#"<hazelcast-client><import resource=""/></hazelcast-client>"#,
            r#"<hazelcast-client><import resource="   "/></hazelcast-client>"#,
            "<hazelcast-client><import/></hazelcast-client>",
        ] {
            let err = resolve_with(&embedded_locator(&[]), &ConfigOptions::default(), xml)
                .unwrap_err();
            assert_eq!(
                err.kind,
                ErrorKind::Import(ImportErrorKind::EmptyResourceReference),
                "{}",
                xml
            );
            assert_eq!(err.path.as_deref(), Some("hazelcast-client/import"));
        }
    }

    #[test]
    fn test_unavailable_resource_carries_path() {
        let err = resolve_with(
            &embedded_locator(&[]),
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:nowhere.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ErrorKind::Import(ImportErrorKind::ResourceUnavailable { ref resource }) if resource == "classpath:nowhere.xml"
        ));
        assert_eq!(err.path.as_deref(), Some("hazelcast-client/import"));
    }

    #[test]
    fn test_imported_parse_error_passes_through() {
        let locator = embedded_locator(&[("broken.xml", "<hazelcast-client><group></hazelcast-client>")]);
        let err = resolve_with(
            &locator,
            &ConfigOptions::default(),
            r#"<hazelcast-client><import resource="classpath:broken.xml"/></hazelcast-client>"#,
        )
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert_eq!(err.resource.as_deref(), Some("classpath:broken.xml"));
    }

    #[test]
    fn test_custom_element_names() {
        let options = ConfigOptions::default()
            .with_root_element("client")
            .with_import_element("include")
            .with_resource_attribute("href");
        let locator = embedded_locator(&[("part.xml", "<client><part/></client>")]);

        let resolved = resolve_with(
            &locator,
            &options,
            r#"<client><include href="classpath:part.xml"/></client>"#,
        )
        .unwrap();
        assert_eq!(resolved.root().children[0].name, "part");
    }

    #[test]
    fn test_visited_set() {
        let mut visited = VisitedSet::new();
        assert!(visited.is_empty());
        assert!(visited.insert("a"));
        assert!(visited.insert("b"));
        assert!(!visited.insert("a"));
        assert!(visited.contains("b"));
        assert_eq!(visited.len(), 2);
        assert_eq!(visited.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
