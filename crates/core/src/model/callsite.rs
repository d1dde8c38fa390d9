use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hotpath_protocol::{DebugInfo, FunctionKey, NativeRef, SourceRef};

/// Native builtins that stay invisible to the tracer: iterator and
/// reflection primitives called so often that tracing them would drown the
/// profile. Calls into these (and anything they invoke) fold into the
/// caller's self time.
const FILTERED_BUILTINS: &[&str] = &[
    "next",
    "require",
    "assert",
    "error",
    "getmetatable",
    "setmetatable",
    "ipairs",
    "pairs",
    "xpcall",
    "pcall",
    "rawequal",
    "rawget",
    "rawset",
    "rawlen",
    "select",
    "tonumber",
    "tostring",
    "type",
    "for iterator",
];

/// Identity of an interned callsite. Keys that resolve to the same logical
/// callsite always carry the same id, so comparing ids is comparing
/// callsite identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallsiteId(u32);

/// Canonical, immutable descriptor for one distinct callsite.
#[derive(Debug)]
pub struct Callsite {
    id: CallsiteId,
    name: String,
    source: String,
    line: i32,
}

impl Callsite {
    fn new(id: CallsiteId, info: DebugInfo) -> Self {
        let name = info.name.unwrap_or_else(|| "?".to_string());
        // Keep real source identifiers ('@file' paths and '=' markers);
        // anything else was loaded from a string chunk.
        let source = match info.source {
            Some(s) if s.starts_with('@') || s.starts_with('=') => s,
            Some(_) => "(string)".to_string(),
            None => String::new(),
        };
        Self {
            id,
            name,
            source,
            line: info.line,
        }
    }

    pub fn id(&self) -> CallsiteId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line(&self) -> i32 {
        self.line
    }

    /// Display label used in reports.
    pub fn label(&self) -> String {
        format!("{}:{}:{}", self.name, self.source, self.line)
    }
}

/// Interns raw callsite identity into canonical descriptors.
///
/// Native and scripted identities live in disjoint tables — a native entry
/// address and a scripted (source, line) pair are never comparable. Debug
/// metadata is fetched only on first sight of a key; afterwards resolution
/// is a single map hit.
pub struct CallsiteRegistry {
    native: HashMap<NativeRef, Arc<Callsite>>,
    scripted: HashMap<(SourceRef, i32), Arc<Callsite>>,
    filtered: HashSet<NativeRef>,
    next_id: u32,
}

impl CallsiteRegistry {
    pub fn new() -> Self {
        Self {
            native: HashMap::new(),
            scripted: HashMap::new(),
            filtered: HashSet::new(),
            next_id: 0,
        }
    }

    /// Resolve a raw identity to its canonical descriptor, interning on
    /// first sight. Returns `None` for filtered builtins — the caller must
    /// treat such calls as fully transparent.
    pub fn resolve(
        &mut self,
        key: FunctionKey,
        fetch: impl FnOnce() -> DebugInfo,
    ) -> Option<Arc<Callsite>> {
        match key {
            FunctionKey::Native(func) => {
                if self.filtered.contains(&func) {
                    return None;
                }
                if let Some(site) = self.native.get(&func) {
                    return Some(Arc::clone(site));
                }
                let info = fetch();
                if let Some(name) = info.name.as_deref()
                    && FILTERED_BUILTINS.contains(&name)
                {
                    self.filtered.insert(func);
                    return None;
                }
                let site = self.intern(info);
                self.native.insert(func, Arc::clone(&site));
                Some(site)
            }
            FunctionKey::Scripted { source, line } => {
                if let Some(site) = self.scripted.get(&(source, line)) {
                    return Some(Arc::clone(site));
                }
                let site = self.intern(fetch());
                self.scripted.insert((source, line), Arc::clone(&site));
                Some(site)
            }
        }
    }

    /// Return-side check: a filtered call's return must produce no stack
    /// effect either. Never fetches debug info.
    pub fn is_filtered(&self, key: FunctionKey) -> bool {
        matches!(key, FunctionKey::Native(func) if self.filtered.contains(&func))
    }

    /// Number of descriptors interned so far.
    pub fn len(&self) -> usize {
        self.native.len() + self.scripted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.native.is_empty() && self.scripted.is_empty()
    }

    fn intern(&mut self, info: DebugInfo) -> Arc<Callsite> {
        let id = CallsiteId(self.next_id);
        self.next_id += 1;
        Arc::new(Callsite::new(id, info))
    }
}

impl Default for CallsiteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted_info(name: &str, source: &str, line: i32) -> DebugInfo {
        DebugInfo {
            name: Some(name.to_string()),
            source: Some(source.to_string()),
            line,
        }
    }

    #[test]
    fn same_scripted_identity_interns_once() {
        let mut registry = CallsiteRegistry::new();
        let key = FunctionKey::Scripted {
            source: SourceRef(1),
            line: 10,
        };
        let a = registry.resolve(key, || scripted_info("f", "@main.lua", 10)).unwrap();
        let b = registry.resolve(key, || scripted_info("f", "@main.lua", 10)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id(), b.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn different_line_is_a_different_callsite() {
        let mut registry = CallsiteRegistry::new();
        let a = registry
            .resolve(
                FunctionKey::Scripted {
                    source: SourceRef(1),
                    line: 10,
                },
                || scripted_info("f", "@main.lua", 10),
            )
            .unwrap();
        let b = registry
            .resolve(
                FunctionKey::Scripted {
                    source: SourceRef(1),
                    line: 20,
                },
                || scripted_info("f", "@main.lua", 20),
            )
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn debug_info_is_fetched_once_per_callsite() {
        let mut registry = CallsiteRegistry::new();
        let key = FunctionKey::Scripted {
            source: SourceRef(2),
            line: 5,
        };
        let mut fetches = 0;
        for _ in 0..3 {
            registry.resolve(key, || {
                fetches += 1;
                scripted_info("g", "@lib.lua", 5)
            });
        }
        assert_eq!(fetches, 1);
    }

    #[test]
    fn filtered_builtin_resolves_to_nothing_on_both_sides() {
        let mut registry = CallsiteRegistry::new();
        let key = FunctionKey::Native(NativeRef(0xbeef));
        assert!(!registry.is_filtered(key));
        let resolved = registry.resolve(key, || DebugInfo {
            name: Some("pairs".to_string()),
            source: Some("=[C]".to_string()),
            line: -1,
        });
        assert!(resolved.is_none());
        assert!(registry.is_filtered(key));
        // Still filtered on a later call, without refetching debug info.
        assert!(registry.resolve(key, DebugInfo::unknown).is_none());
    }

    #[test]
    fn unfiltered_native_gets_a_descriptor() {
        let mut registry = CallsiteRegistry::new();
        let key = FunctionKey::Native(NativeRef(0x10));
        let site = registry
            .resolve(key, || DebugInfo {
                name: Some("string.format".to_string()),
                source: Some("=[C]".to_string()),
                line: -1,
            })
            .unwrap();
        assert_eq!(site.label(), "string.format:=[C]:-1");
        assert!(!registry.is_filtered(key));
    }

    #[test]
    fn source_normalization_and_name_fallback() {
        let mut registry = CallsiteRegistry::new();
        let anon = registry
            .resolve(
                FunctionKey::Scripted {
                    source: SourceRef(3),
                    line: 1,
                },
                || DebugInfo {
                    name: None,
                    source: Some("return 1 + 1".to_string()),
                    line: 1,
                },
            )
            .unwrap();
        assert_eq!(anon.name(), "?");
        assert_eq!(anon.source(), "(string)");
        assert_eq!(anon.label(), "?:(string):1");
    }
}
