//! Scope: the predicate describing exactly what a token permits.
//!
//! A scope pins the tool name, optionally pins argument values exactly,
//! optionally confines path-like arguments under a directory prefix, and
//! optionally bounds content size. Matching is a pure function over the
//! scope and a concrete request; it never touches the filesystem — path
//! containment is decided lexically.

use crate::request::{ArgValue, Arguments};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Argument keys probed, in order, for the path confinement check.
const PATH_KEYS: [&str; 3] = ["path", "file_path", "target"];

/// Argument keys probed, in order, for the content size check.
const SIZE_KEYS: [&str; 2] = ["content", "data"];

/// Why a request fell outside a scope.
///
/// These are decision reasons, not errors: they surface inside a
/// `PCCAP_SCOPE_MISMATCH` denial with the rendered message attached.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeMismatch {
    #[error("tool mismatch: scope permits '{permitted}', request is for '{requested}'")]
    ToolMismatch {
        permitted: String,
        requested: String,
    },

    #[error("path traversal attempt in '{path}'")]
    PathTraversal { path: String },

    /// Relative, empty, NUL-carrying, or non-string paths land here; an
    /// unresolvable path is a non-match, never an error.
    #[error("path '{path}' could not be resolved to an absolute form")]
    PathUnresolvable { path: String },

    #[error("path '{path}' is outside the permitted prefix '{prefix}'")]
    PathOutsidePrefix { path: String, prefix: String },

    #[error("content size {size} bytes exceeds the permitted {limit} bytes")]
    ContentTooLarge { size: u64, limit: u64 },

    #[error("required argument '{key}' is missing")]
    MissingArgument { key: String },

    #[error("argument '{key}' mismatch: expected {expected}, got {actual}")]
    ArgumentMismatch {
        key: String,
        expected: String,
        actual: String,
    },
}

/// Constraints a capability token enforces.
///
/// Immutable by convention once attached to a token: the signature covers
/// every field, so mutation invalidates the token anyway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    /// Exact identifier of the permitted operation, e.g. `fs.delete`.
    pub tool_name: String,

    /// Argument values the request must reproduce exactly. Keys absent
    /// here are unconstrained.
    #[serde(default)]
    pub allowed_args: BTreeMap<String, ArgValue>,

    /// Directory prefix any path-like argument must stay under.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Upper bound on `content`/`data` argument size, in bytes.
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

impl Scope {
    /// Scope permitting `tool_name` with no further constraints.
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            allowed_args: BTreeMap::new(),
            path_prefix: None,
            max_bytes: None,
        }
    }

    /// Scope for deleting files under `path_prefix` (lexically normalized).
    pub fn fs_delete(path_prefix: &str) -> Self {
        Self::new("fs.delete").with_path_prefix(normalize_path(path_prefix))
    }

    /// Require the argument `key` to equal `value` exactly.
    pub fn allow_arg(mut self, key: impl Into<String>, value: impl Into<ArgValue>) -> Self {
        self.allowed_args.insert(key.into(), value.into());
        self
    }

    /// Confine path-like arguments under `prefix`.
    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Bound the size of `content`/`data` arguments.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Decide whether a concrete request falls inside this scope.
    ///
    /// Checks run in a fixed order and stop at the first failure: tool
    /// name, path confinement, content size, then exact argument pins.
    /// Pure — no side effects, no clock, no filesystem.
    pub fn matches_request(
        &self,
        tool_name: &str,
        arguments: &Arguments,
    ) -> Result<(), ScopeMismatch> {
        if tool_name != self.tool_name {
            return Err(ScopeMismatch::ToolMismatch {
                permitted: self.tool_name.clone(),
                requested: tool_name.to_string(),
            });
        }

        if let Some(prefix) = &self.path_prefix {
            if let Some(value) = first_present(arguments, &PATH_KEYS) {
                match value.as_str() {
                    Some(path) => check_path_confinement(path, prefix)?,
                    None => {
                        return Err(ScopeMismatch::PathUnresolvable {
                            path: value.to_string(),
                        })
                    }
                }
            }
        }

        if let Some(limit) = self.max_bytes {
            if let Some(value) = size_candidate(arguments) {
                let size = value.size_bytes();
                if size > limit {
                    return Err(ScopeMismatch::ContentTooLarge { size, limit });
                }
            }
        }

        for (key, expected) in &self.allowed_args {
            match arguments.get(key) {
                None => {
                    return Err(ScopeMismatch::MissingArgument { key: key.clone() });
                }
                Some(actual) if actual != expected => {
                    return Err(ScopeMismatch::ArgumentMismatch {
                        key: key.clone(),
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}

/// First argument value present under any of `keys`, probing in order.
fn first_present<'a>(arguments: &'a Arguments, keys: &[&str]) -> Option<&'a ArgValue> {
    keys.iter().find_map(|k| arguments.get(*k))
}

/// Size value to bound: `content` unless its value is blank, else `data`.
/// A blank `content` never shadows an oversized `data`.
fn size_candidate(arguments: &Arguments) -> Option<&ArgValue> {
    arguments
        .get(SIZE_KEYS[0])
        .filter(|value| !is_blank(value))
        .or_else(|| arguments.get(SIZE_KEYS[1]))
}

/// Blank values fall through size-key resolution: the empty string or
/// byte array, integer zero, and false.
fn is_blank(value: &ArgValue) -> bool {
    match value {
        ArgValue::String(s) => s.is_empty(),
        ArgValue::Bytes(b) => b.is_empty(),
        ArgValue::Integer(n) => *n == 0,
        ArgValue::Boolean(b) => !*b,
    }
}

/// Full path check: traversal rejection (raw and normalized), absolute
/// resolution, then component-wise containment under the prefix.
fn check_path_confinement(path: &str, prefix: &str) -> Result<(), ScopeMismatch> {
    // Traversal markers are rejected before any other processing, so a
    // request cannot smuggle `..` past normalization.
    if has_parent_component(path) {
        return Err(ScopeMismatch::PathTraversal {
            path: path.to_string(),
        });
    }
    if path.contains('\0') || !is_absolute_path(path) {
        return Err(ScopeMismatch::PathUnresolvable {
            path: path.to_string(),
        });
    }

    let normalized = normalize_path(path);
    if has_parent_component(&normalized) {
        return Err(ScopeMismatch::PathTraversal { path: normalized });
    }

    if prefix.contains('\0') {
        return Err(ScopeMismatch::PathUnresolvable {
            path: prefix.to_string(),
        });
    }
    let prefix_normalized = normalize_path(prefix);
    if !is_absolute_path(&prefix_normalized) {
        return Err(ScopeMismatch::PathUnresolvable {
            path: prefix.to_string(),
        });
    }

    if !path_under_prefix(&normalized, &prefix_normalized) {
        return Err(ScopeMismatch::PathOutsidePrefix {
            path: normalized,
            prefix: prefix_normalized,
        });
    }

    Ok(())
}

/// True if any path component is the parent-directory marker.
fn has_parent_component(path: &str) -> bool {
    path.split(['/', '\\']).any(|component| component == "..")
}

/// Absolute in the Unix sense, or a Windows drive-rooted path.
fn is_absolute_path(path: &str) -> bool {
    if path.starts_with('/') {
        return true;
    }
    if path.len() >= 3 {
        let bytes = path.as_bytes();
        if bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && (bytes[2] == b'\\' || bytes[2] == b'/')
        {
            return true;
        }
    }
    false
}

/// Normalize a path lexically (resolve `.` and `..`, collapse separators).
///
/// Pure string operation — no filesystem access, no symlink resolution.
fn normalize_path(path: &str) -> String {
    let mut components: Vec<&str> = Vec::new();

    // Preserve a leading slash or Windows drive letter.
    let (root, rest) = if let Some(stripped) = path.strip_prefix('/') {
        ("/".to_string(), stripped)
    } else if path.len() >= 2 && path.as_bytes()[1] == b':' {
        let sep = if path.len() > 2 && (path.as_bytes()[2] == b'\\' || path.as_bytes()[2] == b'/') {
            3
        } else {
            2
        };
        (path[..sep].to_string(), &path[sep..])
    } else {
        (String::new(), path)
    };

    for component in rest.split(['/', '\\']) {
        match component {
            "" | "." => continue,
            ".." => {
                // Never climbs above the root.
                components.pop();
            }
            _ => components.push(component),
        }
    }

    let mut result = root.clone();
    for (i, component) in components.iter().enumerate() {
        if (i > 0 || !root.is_empty()) && !result.ends_with('/') && !result.ends_with('\\') {
            result.push('/');
        }
        result.push_str(component);
    }

    if result.is_empty() {
        result = root;
    }
    result
}

/// Component-wise containment: equal to the prefix, or strictly under it.
/// String prefixes are not enough — `/tmp/scratchy` is not under
/// `/tmp/scratch`.
fn path_under_prefix(path: &str, prefix: &str) -> bool {
    if path == prefix {
        return true;
    }
    let prefix_with_sep = format!("{}/", prefix.trim_end_matches('/'));
    path.starts_with(&prefix_with_sep)
}
