//! `${name}` placeholder substitution
//!
//! Substitution is a single flat pass over raw document text:
//! - `${name}` is replaced by the value of `name` from a [`PropertyTable`]
//! - replacement values are never scanned again, so substitution cannot loop
//! - a name missing from the table leaves the token untouched, unless the
//!   substituter is configured with [`UnresolvedPolicy::Fail`]
//! - `${}` and an unterminated `${` are plain text
//!
//! With [`ValueEscape::Xml`] a value inserted into ordinary markup is
//! escaped, while a value inserted inside a CDATA section is copied as-is
//! with any `]]>` split across two sections.

use std::borrow::Cow;

use crate::error::{Error, Result};
use crate::properties::PropertyTable;

const CDATA_START: &str = "<![CDATA[";
const CDATA_END: &str = "]]>";

/// What to do with a placeholder whose name is not in the property table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Leave `${name}` in the output verbatim
    #[default]
    Keep,
    /// Fail the pass with an unresolved placeholder error
    Fail,
}

/// How replacement values are encoded into the surrounding text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueEscape {
    /// Insert values as-is
    #[default]
    None,
    /// Escape XML markup characters so values can only ever become text
    ///
    /// Inside a CDATA section the value is kept literal and only `]]>` is
    /// split so it cannot end the section.
    Xml,
}

/// A piece of scanned text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Text to copy through unchanged
    Literal(&'a str),
    /// A `${name}` token; `raw` is the full token including delimiters
    Placeholder { name: &'a str, raw: &'a str },
}

/// Iterator splitting text into literals and placeholders
pub struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Tokens<'a> {
    pub fn new(text: &'a str) -> Self {
        Self { rest: text }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Token<'a>> {
        if self.rest.is_empty() {
            return None;
        }

        let rest = self.rest;
        match rest.find("${") {
            // Literal text up to the next token start
            Some(start) if start > 0 => {
                self.rest = &rest[start..];
                Some(Token::Literal(&rest[..start]))
            }
            Some(_) => match rest[2..].find('}') {
                Some(end) => {
                    let raw = &rest[..end + 3];
                    self.rest = &rest[end + 3..];
                    let name = &raw[2..raw.len() - 1];
                    if name.is_empty() {
                        Some(Token::Literal(raw))
                    } else {
                        Some(Token::Placeholder { name, raw })
                    }
                }
                None => {
                    self.rest = "";
                    Some(Token::Literal(rest))
                }
            },
            None => {
                self.rest = "";
                Some(Token::Literal(rest))
            }
        }
    }
}

/// Configurable placeholder substituter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Substituter {
    pub policy: UnresolvedPolicy,
    pub escape: ValueEscape,
}

impl Substituter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for names missing from the table
    pub fn with_policy(mut self, policy: UnresolvedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set how replacement values are encoded
    pub fn with_escape(mut self, escape: ValueEscape) -> Self {
        self.escape = escape;
        self
    }

    /// Substitute every placeholder in `text`
    pub fn apply(&self, text: &str, properties: &PropertyTable) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut in_cdata = false;

        for token in Tokens::new(text) {
            match token {
                Token::Literal(s) => {
                    out.push_str(s);
                    in_cdata = cdata_state_after(s, in_cdata);
                }
                Token::Placeholder { name, raw } => match properties.get_with_layer(name) {
                    Some((value, layer)) => {
                        log::trace!("Substituting ${{{}}} from '{}' properties", name, layer);
                        out.push_str(&self.encode(value, in_cdata));
                    }
                    None => match self.policy {
                        UnresolvedPolicy::Keep => {
                            log::warn!("No property for placeholder {}; leaving it unresolved", raw);
                            out.push_str(raw);
                        }
                        UnresolvedPolicy::Fail => return Err(Error::unresolved_placeholder(name)),
                    },
                },
            }
        }

        Ok(out)
    }

    fn encode<'v>(&self, value: &'v str, in_cdata: bool) -> Cow<'v, str> {
        match (self.escape, in_cdata) {
            (ValueEscape::None, _) => Cow::Borrowed(value),
            (ValueEscape::Xml, false) => quick_xml::escape::escape(value),
            (ValueEscape::Xml, true) if value.contains(CDATA_END) => {
                Cow::Owned(value.replace(CDATA_END, "]]]]><![CDATA[>"))
            }
            (ValueEscape::Xml, true) => Cow::Borrowed(value),
        }
    }
}

/// Whether scanning `text` from the given state ends inside a CDATA section
fn cdata_state_after(mut text: &str, mut in_cdata: bool) -> bool {
    loop {
        let marker = if in_cdata { CDATA_END } else { CDATA_START };
        match text.find(marker) {
            Some(pos) => {
                text = &text[pos + marker.len()..];
                in_cdata = !in_cdata;
            }
            None => return in_cdata,
        }
    }
}

/// Substitute placeholders verbatim, leaving unknown names in place
pub fn substitute(text: &str, properties: &PropertyTable) -> String {
    let mut out = String::with_capacity(text.len());
    for token in Tokens::new(text) {
        match token {
            Token::Literal(s) => out.push_str(s),
            Token::Placeholder { name, raw } => out.push_str(properties.get(name).unwrap_or(raw)),
        }
    }
    out
}

/// List the placeholder names referenced by `text`, in order of appearance
pub fn placeholders(text: &str) -> Vec<&str> {
    Tokens::new(text)
        .filter_map(|token| match token {
            Token::Placeholder { name, .. } => Some(name),
            Token::Literal(_) => None,
        })
        .collect()
}

/// Check whether `text` contains any placeholder
pub fn contains_placeholder(text: &str) -> bool {
    Tokens::new(text).any(|token| matches!(token, Token::Placeholder { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> PropertyTable {
        PropertyTable::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_substitute_known_placeholder() {
        let table = props(&[("executor.pool.size", "40")]);
        assert_eq!(
            substitute(
                "<executor-pool-size>${executor.pool.size}</executor-pool-size>",
                &table
            ),
            "<executor-pool-size>40</executor-pool-size>"
        );
    }

    #[test]
    fn test_unknown_placeholder_left_verbatim() {
        let table = props(&[("a", "1")]);
        assert_eq!(substitute("x=${a} y=${b}", &table), "x=1 y=${b}");
    }

    #[test]
    fn test_second_pass_is_idempotent_for_unknown_names() {
        let table = props(&[("a", "1")]);
        let once = substitute("${a}-${missing}", &table);
        assert_eq!(substitute(&once, &table), once);
    }

    #[test]
    fn test_single_pass_does_not_resubstitute_values() {
        let table = props(&[("a", "${b}"), ("b", "boom")]);
        assert_eq!(substitute("${a}", &table), "${b}");

        // A self-referencing value cannot loop
        let table = props(&[("loop", "${loop}")]);
        assert_eq!(substitute("${loop}", &table), "${loop}");
    }

    #[test]
    fn test_each_occurrence_replaced() {
        let table = props(&[("ip", "10.0.0.1")]);
        assert_eq!(substitute("${ip}:${ip}", &table), "10.0.0.1:10.0.0.1");
    }

    #[test]
    fn test_empty_and_unterminated_tokens_pass_through() {
        let table = props(&[("", "never")]);
        assert_eq!(substitute("a ${} b", &table), "a ${} b");
        assert_eq!(substitute("tail ${open", &table), "tail ${open");
        assert_eq!(substitute("just $dollar {brace}", &table), "just $dollar {brace}");
    }

    #[test]
    fn test_identifier_is_any_run_without_closing_brace() {
        let table = props(&[("weird name:with/chars", "ok")]);
        assert_eq!(substitute("${weird name:with/chars}", &table), "ok");
    }

    #[test]
    fn test_fail_policy() {
        let sub = Substituter::new().with_policy(UnresolvedPolicy::Fail);
        let err = sub.apply("${present} ${absent}", &props(&[("present", "x")])).unwrap_err();
        assert_eq!(
            err.kind,
            crate::error::ErrorKind::UnresolvedPlaceholder {
                name: "absent".into()
            }
        );
    }

    #[test]
    fn test_xml_escaping_keeps_values_as_text() {
        let table = props(&[("evil", r#"<import resource="x.xml"/>"#)]);
        let sub = Substituter::new().with_escape(ValueEscape::Xml);

        let out = sub.apply("<name>${evil}</name>", &table).unwrap();
        assert_eq!(
            out,
            "<name>&lt;import resource=&quot;x.xml&quot;/&gt;</name>"
        );
    }

    #[test]
    fn test_xml_escaping_inside_cdata_keeps_value_literal() {
        let table = props(&[("v", "a&b<c>")]);
        let sub = Substituter::new().with_escape(ValueEscape::Xml);

        let out = sub
            .apply("<a><![CDATA[${v}]]></a><b>${v}</b>", &table)
            .unwrap();
        assert_eq!(out, "<a><![CDATA[a&b<c>]]></a><b>a&amp;b&lt;c&gt;</b>");
    }

    #[test]
    fn test_cdata_terminator_in_value_is_split() {
        let table = props(&[("v", "x]]><import/>")]);
        let sub = Substituter::new().with_escape(ValueEscape::Xml);

        let out = sub.apply("<a><![CDATA[${v}]]></a>", &table).unwrap();
        assert_eq!(out, "<a><![CDATA[x]]]]><![CDATA[><import/>]]></a>");
    }

    #[test]
    fn test_cdata_state_after() {
        assert!(cdata_state_after("<a><![CDATA[", false));
        assert!(!cdata_state_after("<a><![CDATA[x]]></a>", false));
        assert!(!cdata_state_after("]]></a>", true));
        assert!(cdata_state_after("plain", true));
    }

    #[test]
    fn test_keep_policy_matches_substitute() {
        let table = props(&[("a", "1")]);
        let text = "${a} ${b} ${} ${c";
        assert_eq!(
            Substituter::new().apply(text, &table).unwrap(),
            substitute(text, &table)
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("${config.location} and ${ip.address} and ${}"),
            vec!["config.location", "ip.address"]
        );
        assert!(contains_placeholder("x ${y}"));
        assert!(!contains_placeholder("x ${} ${y"));
    }

    #[test]
    fn test_tokens() {
        let tokens: Vec<_> = Tokens::new("a${b}c").collect();
        assert_eq!(
            tokens,
            vec![
                Token::Literal("a"),
                Token::Placeholder {
                    name: "b",
                    raw: "${b}"
                },
                Token::Literal("c"),
            ]
        );
    }
}
