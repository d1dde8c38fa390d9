use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque handle for one cooperative execution context (the main program or
/// one fiber/coroutine). Assigned by the host; the profiler only compares
/// and hashes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle for a native (built-in) function, derived from its entry
/// address by the host. Stable only as long as the host guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeRef(pub u64);

/// Opaque handle for one loaded script source (a file or an inline chunk).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef(pub u64);

/// Raw identity of a callsite as the host's hook reports it.
///
/// The same key arrives on the call and on the matching return, so it is
/// what frames match against. Native and scripted identities are never
/// comparable to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionKey {
    /// A built-in registered with the runtime.
    Native(NativeRef),
    /// An interpreted function, identified by where it was defined.
    Scripted { source: SourceRef, line: i32 },
}

/// How a call entered the callee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// Ordinary call: the caller's frame stays below the callee's.
    #[default]
    Normal,
    /// Tail call: the callee's frame replaces the caller's.
    Tail,
}

/// Debug metadata for a callsite, fetched from the host's introspection API
/// on first sight only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Defining line; `-1` for natives, mirroring the host convention.
    #[serde(default = "DebugInfo::no_line")]
    pub line: i32,
}

impl DebugInfo {
    /// Placeholder when the host has no metadata for a callsite.
    pub fn unknown() -> Self {
        Self {
            name: None,
            source: None,
            line: Self::no_line(),
        }
    }

    fn no_line() -> i32 {
        -1
    }
}
