use hotpath_protocol::FunctionKey;

use crate::model::NodeId;

/// One in-progress call on a context's stack. Exists only while the call is
/// in flight; popping it is the frame's end.
///
/// `entered_at` is the frame's timer: `Some` while the frame is the current
/// (innermost running) one, `None` while a callee or another context has
/// the clock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Frame {
    /// Raw identity used for matching returns.
    pub key: FunctionKey,
    /// The tree node this frame's time accrues to.
    pub node: NodeId,
    pub entered_at: Option<u64>,
}

/// Call stack of one cooperative execution context.
#[derive(Debug, Default)]
pub(crate) struct CallStack {
    frames: Vec<Frame>,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn top(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
