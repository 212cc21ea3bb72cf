//! Trace frames.
//!
//! Every transform body runs inside a [`TraceFrame`]. A scope remembers the
//! frame it was created in and refuses to be used from any other frame, which
//! catches scopes leaking into (or out of) a transform body.

use std::cell::{Cell, RefCell};

/// Level of code running outside every transform.
pub const TOP_LEVEL: u64 = 0;

thread_local! {
    static FRAMES: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
    static NEXT_LEVEL: Cell<u64> = const { Cell::new(TOP_LEVEL + 1) };
}

/// Identifier of the innermost active frame on this thread.
pub fn current_level() -> u64 {
    FRAMES.with(|frames| frames.borrow().last().copied().unwrap_or(TOP_LEVEL))
}

/// Number of active frames on this thread.
pub fn depth() -> usize {
    FRAMES.with(|frames| frames.borrow().len())
}

/// Guard for an active trace frame. The frame is popped on drop.
#[derive(Debug)]
pub struct TraceFrame {
    level: u64,
}

impl TraceFrame {
    /// Push a new frame with a level no other frame on this thread has used.
    pub fn enter() -> Self {
        let level = NEXT_LEVEL.with(|next| {
            let level = next.get();
            next.set(level + 1);
            level
        });
        FRAMES.with(|frames| frames.borrow_mut().push(level));
        Self { level }
    }

    pub fn level(&self) -> u64 {
        self.level
    }
}

impl Drop for TraceFrame {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.last(), Some(&self.level));
            frames.pop();
        });
    }
}
