//! Path template compiler and matcher.
//!
//! Templates use `{name}` placeholders, which match one or more non-slash
//! characters, or `{name:regex}` placeholders with a custom pattern. Braces
//! inside a custom pattern are written escaped, e.g. `{id:\d\{1,3\}}`.
//!
//! Values are percent-encoded when interpolated and decoded after a match,
//! so a value may contain `/`, spaces or any other character.
//!
//! # Example
//!
//! ```
//! use rapidwire::schema::PathPattern;
//!
//! let pattern = PathPattern::compile("/users/{username}/posts/{id:\\d+}").unwrap();
//! let params = pattern.matches("/users/alice/posts/42").unwrap();
//! assert_eq!(params.get("username"), Some("alice"));
//! assert_eq!(params.get("id"), Some("42"));
//! assert!(pattern.matches("/users/alice/posts/latest").is_none());
//! ```

use std::fmt::Display;
use std::sync::OnceLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use regex::Regex;

use super::Params;
use crate::error::{RapidError, Result};

/// Everything but the unreserved characters of RFC 3986.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Pattern matching one placeholder in a template.
fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(\w+)(?::((?:\\.|[^}])+))?\}").expect("placeholder pattern is valid")
    })
}

/// A compiled path template.
///
/// Compiled once per route when a dispatcher is built and reused for the
/// lifetime of the process.
#[derive(Debug, Clone)]
pub struct PathPattern {
    template: String,
    regex: Regex,
    params: Vec<String>,
    groups: Vec<String>,
}

impl PathPattern {
    /// Compile a template into a fully-anchored pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RapidError::Pattern`] if a custom placeholder pattern is not
    /// a valid regular expression.
    pub fn compile(template: &str) -> Result<Self> {
        let mut pattern = String::with_capacity(template.len() + 16);
        let mut params = Vec::new();
        let mut groups = Vec::new();
        let mut last = 0;

        pattern.push('^');
        for caps in placeholder().captures_iter(template) {
            let whole = caps.get(0).expect("group 0 always participates");
            pattern.push_str(&regex::escape(&template[last..whole.start()]));

            // Named groups keep positions stable even if a custom pattern
            // contains capturing groups of its own.
            let group = format!("p{}", params.len());
            let inner = match caps.get(2) {
                Some(custom) => custom.as_str().replace(r"\{", "{").replace(r"\}", "}"),
                None => "[^/]+".to_string(),
            };
            pattern.push_str(&format!("(?P<{group}>{inner})"));

            params.push(caps[1].to_string());
            groups.push(group);
            last = whole.end();
        }
        pattern.push_str(&regex::escape(&template[last..]));
        pattern.push('$');

        Ok(Self {
            template: template.to_string(),
            regex: Regex::new(&pattern)?,
            params,
            groups,
        })
    }

    /// The original template.
    #[inline]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The anchored regular expression this template compiled to.
    #[inline]
    pub fn as_regex(&self) -> &Regex {
        &self.regex
    }

    /// Placeholder names in declaration order.
    #[inline]
    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// Match a full request path, returning the captured parameters.
    ///
    /// The path is matched as it arrives on the wire; each captured value
    /// is percent-decoded afterwards, so an encoded `%2F` stays inside its
    /// segment.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let mut params = Params::new();
        for (name, group) in self.params.iter().zip(&self.groups) {
            if let Some(value) = caps.name(group) {
                let decoded = percent_decode_str(value.as_str()).decode_utf8_lossy();
                params.insert(name.clone(), decoded);
            }
        }
        Some(params)
    }

    /// Replace placeholders with `args`, in declaration order.
    pub fn interpolate<D: Display>(&self, args: &[D]) -> Result<String> {
        interpolate(&self.template, args)
    }
}

/// Replace the placeholders of `template` with `args`, in declaration order.
///
/// Each value is percent-encoded as a single path segment.
///
/// # Errors
///
/// Returns [`RapidError::Protocol`] if the number of arguments does not match
/// the number of placeholders.
pub fn interpolate<D: Display>(template: &str, args: &[D]) -> Result<String> {
    let count = placeholder().find_iter(template).count();
    if count != args.len() {
        return Err(RapidError::Protocol(format!(
            "path {template} has {count} parameters but {} values were given",
            args.len()
        )));
    }

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for (whole, arg) in placeholder().find_iter(template).zip(args) {
        out.push_str(&template[last..whole.start()]);
        out.extend(utf8_percent_encode(&arg.to_string(), SEGMENT));
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Strip custom patterns, leaving bare `{name}` placeholders.
pub fn simplify(template: &str) -> String {
    placeholder().replace_all(template, "{$1}").into_owned()
}
