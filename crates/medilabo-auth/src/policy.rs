//! Route policy tables
//!
//! An ordered list of `(path pattern, methods) -> requirement` entries.
//! The first entry matching a request decides what credential it needs.
//! The gateway and every resource service evaluate their own table with
//! the same [`RouteTable::decide`] function.

use axum::http::{HeaderMap, Method, header::AUTHORIZATION};
use chrono::{DateTime, Utc};
use medilabo_db::Role;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::token::{Identity, TokenCodec};
use crate::translator::BEARER_PREFIX;

/// Maximum iterations allowed for pattern matching to prevent ReDoS
const MAX_MATCH_ITERATIONS: usize = 10000;

/// Errors building a policy table from configuration
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Invalid path pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("Invalid role: {0}")]
    InvalidRole(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternPart {
    /// Literal text that must match exactly
    Literal(String),
    /// Any run of characters within one path segment (*)
    SingleWildcard,
    /// Any number of path segments (**)
    MultiWildcard,
}

/// Compiled path pattern
///
/// `*` matches within one segment and `**` across segments. A pattern
/// ending in `/**` also matches the bare prefix, so `/patients/**`
/// covers `/patients` as well as `/patients/12/notes`.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    parts: Vec<PatternPart>,
    bare_prefix: Option<String>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, PolicyError> {
        if !pattern.starts_with('/') {
            return Err(PolicyError::InvalidPattern(format!(
                "'{}' must start with '/'",
                pattern
            )));
        }
        if pattern.contains("***") {
            return Err(PolicyError::InvalidPattern(format!(
                "'{}' contains more than two consecutive '*'",
                pattern
            )));
        }

        let bare_prefix = pattern
            .strip_suffix("/**")
            .filter(|prefix| !prefix.is_empty())
            .map(String::from);

        Ok(Self {
            pattern: pattern.to_string(),
            parts: Self::compile(pattern),
            bare_prefix,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    fn compile(pattern: &str) -> Vec<PatternPart> {
        let mut parts = Vec::new();
        let mut current = String::new();

        let chars: Vec<char> = pattern.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            let ch = chars[i];

            if ch == '*' {
                if !current.is_empty() {
                    parts.push(PatternPart::Literal(std::mem::take(&mut current)));
                }

                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    parts.push(PatternPart::MultiWildcard);
                    i += 2;
                } else {
                    parts.push(PatternPart::SingleWildcard);
                    i += 1;
                }
            } else {
                current.push(ch);
                i += 1;
            }
        }

        if !current.is_empty() {
            parts.push(PatternPart::Literal(current));
        }

        parts
    }

    /// Check if the pattern matches a request path
    pub fn matches(&self, path: &str) -> bool {
        if self.bare_prefix.as_deref() == Some(path) {
            return true;
        }
        let mut iterations = 0;
        Self::match_recursive(&self.parts, path, 0, 0, &mut iterations)
    }

    fn match_recursive(
        parts: &[PatternPart],
        path: &str,
        part_idx: usize,
        path_pos: usize,
        iterations: &mut usize,
    ) -> bool {
        *iterations += 1;
        if *iterations > MAX_MATCH_ITERATIONS {
            warn!(
                "Pattern matching exceeded {} iterations, aborting",
                MAX_MATCH_ITERATIONS
            );
            return false;
        }

        if part_idx >= parts.len() {
            return path_pos >= path.len();
        }

        let remaining = &path[path_pos..];

        match &parts[part_idx] {
            PatternPart::Literal(lit) => {
                remaining.starts_with(lit.as_str())
                    && Self::match_recursive(parts, path, part_idx + 1, path_pos + lit.len(), iterations)
            }
            PatternPart::SingleWildcard => {
                let segment_len = remaining.find('/').unwrap_or(remaining.len());
                (0..=segment_len)
                    .rev()
                    .filter(|i| remaining.is_char_boundary(*i))
                    .any(|i| Self::match_recursive(parts, path, part_idx + 1, path_pos + i, iterations))
            }
            PatternPart::MultiWildcard => {
                if part_idx + 1 == parts.len() {
                    return true;
                }
                (0..=remaining.len())
                    .filter(|i| remaining.is_char_boundary(*i))
                    .any(|i| Self::match_recursive(parts, path, part_idx + 1, path_pos + i, iterations))
            }
        }
    }
}

/// What a matching request must present
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Reachable without any credential
    Public,
    /// Any valid token
    Authenticated,
    /// A valid token carrying at least one of these roles
    AnyOf(BTreeSet<Role>),
}

/// One row of a route policy table
#[derive(Debug, Clone)]
pub struct RoutePolicyEntry {
    pattern: PathPattern,
    /// Empty means every method
    methods: Vec<Method>,
    requirement: Requirement,
}

impl RoutePolicyEntry {
    pub fn new(pattern: &str, methods: &[Method], requirement: Requirement) -> Result<Self, PolicyError> {
        Ok(Self {
            pattern: PathPattern::new(pattern)?,
            methods: methods.to_vec(),
            requirement,
        })
    }

    pub fn public(pattern: &str) -> Result<Self, PolicyError> {
        Self::new(pattern, &[], Requirement::Public)
    }

    pub fn authenticated(pattern: &str) -> Result<Self, PolicyError> {
        Self::new(pattern, &[], Requirement::Authenticated)
    }

    pub fn any_of(pattern: &str, methods: &[Method], roles: &[Role]) -> Result<Self, PolicyError> {
        Self::new(
            pattern,
            methods,
            Requirement::AnyOf(roles.iter().copied().collect()),
        )
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn matches(&self, path: &str, method: &Method) -> bool {
        (self.methods.is_empty() || self.methods.contains(method)) && self.pattern.matches(path)
    }

    fn is_catch_all(&self) -> bool {
        self.methods.is_empty() && self.pattern.as_str() == "/**"
    }
}

/// Outcome of evaluating a request against a table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Let the request through; carries the identity when a token was checked
    Allow(Option<Identity>),
    /// No usable credential
    RedirectToLogin,
    /// Valid credential without a required role
    Deny,
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Allow(_) => "allow",
            Decision::RedirectToLogin => "unauthenticated",
            Decision::Deny => "deny",
        }
    }
}

/// Ordered, immutable route policy table
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RoutePolicyEntry>,
}

impl RouteTable {
    pub fn new(entries: Vec<RoutePolicyEntry>) -> Self {
        if let Some(idx) = entries.iter().position(RoutePolicyEntry::is_catch_all)
            && idx + 1 < entries.len()
        {
            warn!(
                "Route policy entries after catch-all '{}' (position {}) are unreachable",
                entries[idx].pattern(),
                idx
            );
        }
        Self { entries }
    }

    pub fn entries(&self) -> &[RoutePolicyEntry] {
        &self.entries
    }

    /// First entry matching the request, in declaration order
    pub fn find(&self, path: &str, method: &Method) -> Option<&RoutePolicyEntry> {
        self.entries.iter().find(|e| e.matches(path, method))
    }

    /// Evaluate a request, keeping the reason for a refusal
    ///
    /// Unmatched requests need an authenticated caller. `Ok(None)` means a
    /// public route; refusals are `Forbidden` for a missing role and an
    /// unauthenticated error otherwise.
    pub fn evaluate(
        &self,
        path: &str,
        method: &Method,
        token: Option<&str>,
        codec: &TokenCodec,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, AuthError> {
        if !is_canonical_path(path) {
            debug!("{} {}: path is not canonical", method, path);
            return Err(AuthError::InvalidPath);
        }

        let requirement = match self.find(path, method) {
            Some(entry) => entry.requirement(),
            None => &Requirement::Authenticated,
        };

        if *requirement == Requirement::Public {
            return Ok(None);
        }

        let Some(token) = token else {
            debug!("{} {}: no credential presented", method, path);
            return Err(AuthError::MissingCredential);
        };

        let identity = codec.verify(token, now).inspect_err(|e| {
            debug!("{} {}: credential rejected ({})", method, path, e.kind());
        })?;

        match requirement {
            Requirement::AnyOf(required) if !identity.has_any_role(required) => {
                debug!(
                    "{} {}: subject {} lacks a required role",
                    method, path, identity.subject
                );
                Err(AuthError::Forbidden)
            }
            _ => Ok(Some(identity)),
        }
    }

    /// Decide whether a request may proceed
    pub fn decide(
        &self,
        path: &str,
        method: &Method,
        token: Option<&str>,
        codec: &TokenCodec,
        now: DateTime<Utc>,
    ) -> Decision {
        match self.evaluate(path, method, token, codec, now) {
            Ok(identity) => Decision::Allow(identity),
            Err(AuthError::Forbidden) => Decision::Deny,
            Err(_) => Decision::RedirectToLogin,
        }
    }
}

/// Whether a path reaches a backend unchanged
///
/// URL resolution collapses `.` and `..` segments (also when written as
/// `%2e`) and treats `\` as `/`, so such a path could be checked as one
/// route and served as another. Encoded separators are refused too since
/// a backend may decode them.
pub fn is_canonical_path(path: &str) -> bool {
    if !path.starts_with('/') || path.contains('\\') {
        return false;
    }

    path.split('/').all(|segment| {
        let segment = segment.to_ascii_lowercase();
        if segment.contains("%2f") || segment.contains("%5c") {
            return false;
        }
        let decoded = segment.replace("%2e", ".");
        decoded != "." && decoded != ".."
    })
}

/// Token from a canonical `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
