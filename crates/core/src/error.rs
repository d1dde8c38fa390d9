use std::path::PathBuf;

use hotpath_protocol::ContextId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("profiler is already running")]
    AlreadyRunning,

    #[error("profiler is not running")]
    NotRunning,

    /// An event arrived for a context that was never declared. The host
    /// operation delivering the event must abort: the stack set would be
    /// inconsistent if the event were dropped silently.
    #[error("context {0} has no declared stack")]
    UnknownContext(ContextId),

    #[error("invalid snapshot window {start:?}..{end}: {snapshots} snapshot(s) saved")]
    InvalidWindow {
        start: Option<usize>,
        end: usize,
        snapshots: usize,
    },

    /// The window's root total elapsed is zero, so percentages are undefined.
    #[error("window has zero total elapsed time")]
    UndefinedPercentage,

    #[error("cannot open dump destination {}: {source}", path.display())]
    DestinationUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
