//! Host frames: the objects that own native execution contexts.
//!
//! Whatever created a context (a browser frame, a document, or
//! [`StandaloneFrame`]) owns it and hands it out through [`WebFrame`]. A
//! bridge only holds a retain of its own until it is disposed.

use jscore_sys::*;
use parking_lot::Mutex;
use std::cell::Cell;
use std::marker::PhantomData;
use std::ptr;

use crate::error::{JscError, JscResult};

/// JSC's initialization is not fully thread-safe, so context creation is serialized.
static CONTEXT_CREATION_LOCK: Mutex<()> = Mutex::new(());

/// Something that can hand out its native execution context.
///
/// # Safety
///
/// A `Some` returned by [`global_context`](Self::global_context) must be a
/// live JavaScriptCore global context at the time of the call. Bridges take
/// their own retain on it straight away, so the frame may release its
/// reference afterwards, even while a bridge still borrows it.
pub unsafe trait WebFrame {
    /// The frame's global context, or `None` when the frame has none
    /// (not loaded yet, or already torn down).
    fn global_context(&self) -> Option<JSGlobalContextRef>;
}

// SAFETY: forwards to F, whose contract covers the same borrow
unsafe impl<F: WebFrame + ?Sized> WebFrame for &F {
    fn global_context(&self) -> Option<JSGlobalContextRef> {
        (**self).global_context()
    }
}

/// A frame that owns a fresh global context, for hosts without a browser.
///
/// Bridges borrow the frame, so it cannot be dropped under them. Closing it
/// early only gives up the frame's reference: live bridges keep their own.
pub struct StandaloneFrame {
    ctx: Cell<JSGlobalContextRef>,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl StandaloneFrame {
    /// Create a frame with a new global context
    pub fn new() -> JscResult<Self> {
        let _guard = CONTEXT_CREATION_LOCK.lock();

        // SAFETY: a null class creates a default global object
        let ctx = unsafe { JSGlobalContextCreate(ptr::null_mut()) };
        if ctx.is_null() {
            return Err(JscError::null_pointer("JSGlobalContextCreate"));
        }
        tracing::debug!(ctx = ?ctx, "created standalone global context");

        Ok(Self {
            ctx: Cell::new(ctx),
            _not_send: PhantomData,
        })
    }

    /// Release the frame's context. Later bridge construction fails with
    /// `InvalidFrame`; the context itself is freed once no bridge retains it.
    pub fn close(&self) {
        let ctx = self.ctx.replace(ptr::null_mut());
        if !ctx.is_null() {
            // SAFETY: the frame owns exactly one reference
            unsafe { JSGlobalContextRelease(ctx) };
            tracing::debug!(ctx = ?ctx, "released standalone global context");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.ctx.get().is_null()
    }
}

// SAFETY: the frame holds a reference until close(); a closed frame reports None
unsafe impl WebFrame for StandaloneFrame {
    fn global_context(&self) -> Option<JSGlobalContextRef> {
        let ctx = self.ctx.get();
        (!ctx.is_null()).then_some(ctx)
    }
}

impl Drop for StandaloneFrame {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StandaloneFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StandaloneFrame({:?})", self.ctx.get())
    }
}
