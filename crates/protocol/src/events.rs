use serde::{Deserialize, Serialize};

use crate::types::{CallKind, ContextId, DebugInfo, FunctionKey};

/// One recorded hook event.
///
/// A trace is a sequence of these, one JSON object per line. The replay tool
/// feeds them to a profiler in order; test fixtures build them directly.
/// Timestamps are nanoseconds from an arbitrary per-trace origin and must be
/// non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HookEvent {
    /// Register a context's call stack. Must precede any event for it.
    DeclareContext { context: ContextId },

    /// A function call observed by the host. `info` is the debug metadata
    /// the host would serve on first sight; replays fall back to
    /// `DebugInfo::unknown` when it is absent.
    Call {
        context: ContextId,
        key: FunctionKey,
        #[serde(default)]
        kind: CallKind,
        #[serde(default)]
        info: Option<DebugInfo>,
        at: u64,
    },

    /// A function return observed by the host.
    Return {
        context: ContextId,
        key: FunctionKey,
        at: u64,
    },

    /// Capture the counters as the next snapshot.
    SaveSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NativeRef;

    #[test]
    fn call_event_wire_shape() {
        let line = "{\"event\":\"call\",\"context\":1,\"key\":{\"native\":42},\"at\":100}";
        let event: HookEvent = serde_json::from_str(line).unwrap();
        match event {
            HookEvent::Call {
                context,
                key,
                kind,
                info,
                at,
            } => {
                assert_eq!(context, ContextId(1));
                assert_eq!(key, FunctionKey::Native(NativeRef(42)));
                assert_eq!(kind, CallKind::Normal);
                assert_eq!(info, None);
                assert_eq!(at, 100);
            }
            other => panic!("expected a call event, got {other:?}"),
        }
    }

    #[test]
    fn tail_kind_round_trips() {
        let line =
            "{\"event\":\"call\",\"context\":2,\"key\":{\"scripted\":{\"source\":3,\"line\":10}},\"kind\":\"tail\",\"at\":5}";
        let event: HookEvent = serde_json::from_str(line).unwrap();
        let HookEvent::Call { kind, .. } = event else {
            panic!("expected a call event");
        };
        assert_eq!(kind, CallKind::Tail);
    }
}
