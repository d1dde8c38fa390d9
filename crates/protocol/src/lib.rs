pub mod events;
pub mod types;

pub use events::HookEvent;
pub use types::{CallKind, ContextId, DebugInfo, FunctionKey, NativeRef, SourceRef};
