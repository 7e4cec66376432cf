//! Context bridge: script evaluation and value manufacture over one native context

use jscore_sys::*;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ffi::c_void;
use std::marker::PhantomData;
use std::ptr;
use std::rc::Rc;

use crate::config::{BridgeConfig, EvaluateOptions};
use crate::error::{ExceptionDetails, JscError, JscResult};
use crate::frame::WebFrame;
use crate::host::{self, HostObject, HostSlot};
use crate::object::JsObject;
use crate::string::JscString;
use crate::value::{JsValue, ValueOrigin, exception_error};

/// Shared state behind a bridge; wrappers hold it weakly.
pub(crate) struct ContextInner {
    /// Null once disposed
    ctx: Cell<JSContextRef>,
    global: JSGlobalContextRef,
    config: BridgeConfig,
    /// Outstanding protections taken on behalf of wrappers, by slot
    protections: RefCell<HashMap<u64, JSValueRef>>,
    next_slot: Cell<u64>,
    /// Minted for an engine callback rather than by the host. Host bridges
    /// hold one retain on `global`, released at disposal.
    callback: bool,
}

impl ContextInner {
    pub(crate) fn live_ctx(&self) -> JscResult<JSContextRef> {
        let ctx = self.ctx.get();
        if ctx.is_null() {
            Err(JscError::Disposed)
        } else {
            Ok(ctx)
        }
    }

    pub(crate) fn global(&self) -> JSGlobalContextRef {
        self.global
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub(crate) fn protect(&self, ctx: JSContextRef, raw: JSValueRef) -> u64 {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        // SAFETY: raw lives in ctx, which is this bridge's live context
        unsafe { JSValueProtect(ctx, raw) };
        self.protections.borrow_mut().insert(slot, raw);
        slot
    }

    /// Release one slot; no-op if it was already released.
    pub(crate) fn unprotect(&self, slot: u64) {
        let ctx = self.ctx.get();
        if ctx.is_null() {
            return;
        }
        let released = self.protections.borrow_mut().remove(&slot);
        if let Some(raw) = released {
            // SAFETY: the slot held exactly one protection on raw in ctx
            unsafe { JSValueUnprotect(ctx, raw) };
        }
    }

    pub(crate) fn protected_count(&self) -> usize {
        self.protections.borrow().len()
    }

    /// Enter the Disposed state. Returns the number of protections released,
    /// or `None` if already disposed.
    fn dispose(&self) -> Option<usize> {
        let ctx = self.ctx.replace(ptr::null_mut());
        if ctx.is_null() {
            return None;
        }
        let drained: Vec<JSValueRef> = self.protections.borrow_mut().drain().map(|(_, raw)| raw).collect();
        for raw in &drained {
            // SAFETY: each entry holds one protection taken in ctx
            unsafe { JSValueUnprotect(ctx, *raw) };
        }
        if !self.callback {
            // SAFETY: balances the retain taken in JsContext::with_config
            unsafe { JSGlobalContextRelease(self.global) };
        }
        Some(drained.len())
    }
}

/// A host-side view of one JavaScript execution context.
///
/// The frame that produced the native context owns it; the bridge borrows
/// the frame for `'f` and holds one retain of its own until disposal, so the
/// context stays valid even if the frame is closed first. Disposing the
/// bridge (explicitly or by dropping it) releases the protections it holds
/// for outstanding wrappers, drops that retain, and moves it to a terminal
/// state in which every operation fails with [`JscError::Disposed`].
///
/// ```compile_fail
/// use jscore_bridge::{JsContext, StandaloneFrame};
///
/// // the frame is dropped at the end of the statement while still borrowed
/// let ctx = JsContext::new(&StandaloneFrame::new().unwrap()).unwrap();
/// ctx.evaluate_script("1 + 1").unwrap();
/// ```
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScriptCore contexts are not
/// thread-safe.
pub struct JsContext<'f> {
    inner: Rc<ContextInner>,
    _frame: PhantomData<&'f ()>,
}

impl<'f> JsContext<'f> {
    /// Bridge to the frame's execution context
    pub fn new<F: WebFrame + ?Sized>(frame: &'f F) -> JscResult<Self> {
        Self::with_config(frame, BridgeConfig::default())
    }

    pub fn with_config<F: WebFrame + ?Sized>(frame: &'f F, config: BridgeConfig) -> JscResult<Self> {
        let global = frame
            .global_context()
            .filter(|ctx| !ctx.is_null())
            .ok_or_else(|| JscError::invalid_frame("frame has no execution context"))?;

        // SAFETY: WebFrame guarantees global is live at this point
        unsafe { JSGlobalContextRetain(global) };
        tracing::debug!(ctx = ?global, "created context bridge");
        Ok(Self::wrap(global as JSContextRef, global, config, false))
    }

    /// Bridge to a context handed to us by the engine (callback arguments).
    ///
    /// # Safety
    /// `ctx` must be a live context for the lifetime of the returned bridge.
    pub(crate) unsafe fn from_raw(ctx: JSContextRef) -> Self {
        // SAFETY: ctx is live per caller contract
        let global = unsafe { JSContextGetGlobalContext(ctx) };
        Self::wrap(ctx, global, BridgeConfig::default(), true)
    }

    fn wrap(
        ctx: JSContextRef,
        global: JSGlobalContextRef,
        config: BridgeConfig,
        callback: bool,
    ) -> Self {
        Self {
            inner: Rc::new(ContextInner {
                ctx: Cell::new(ctx),
                global,
                config,
                protections: RefCell::new(HashMap::new()),
                next_slot: Cell::new(0),
                callback,
            }),
            _frame: PhantomData,
        }
    }

    pub(crate) fn inner(&self) -> &Rc<ContextInner> {
        &self.inner
    }

    /// Raw context pointer
    pub fn raw(&self) -> JscResult<JSContextRef> {
        self.inner.live_ctx()
    }

    pub fn config(&self) -> &BridgeConfig {
        self.inner.config()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.live_ctx().is_err()
    }

    /// Release every protection held for outstanding wrappers and the
    /// bridge's own retain, then enter the Disposed state. The frame's
    /// reference is left alone. Idempotent.
    pub fn dispose(&self) {
        let Some(released) = self.inner.dispose() else {
            return;
        };
        if self.inner.callback {
            tracing::trace!(released, "disposed callback bridge");
        } else {
            tracing::debug!(ctx = ?self.inner.global, released, "disposed context bridge");
        }
    }

    /// Evaluate a script with default options
    pub fn evaluate_script(&self, script: &str) -> JscResult<JsValue> {
        self.evaluate_script_with(script, &EvaluateOptions::default())
    }

    /// Compile and run `script`, optionally binding `this` and tagging the
    /// source location used in stack traces.
    pub fn evaluate_script_with(
        &self,
        script: &str,
        options: &EvaluateOptions<'_>,
    ) -> JscResult<JsValue> {
        let ctx = self.inner.live_ctx()?;
        let this_object = match options.this_object {
            Some(this) => this.as_value().raw_for(&self.inner)? as JSObjectRef,
            None => ptr::null_mut(),
        };
        let (source_url, line) = options.resolve(self.inner.config());

        let script_ref = JscString::new(script);
        let source_ref = source_url.map(JscString::new);

        // SAFETY: ctx is live; strings and this_object are valid for the call
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let result = JSEvaluateScript(
                ctx,
                script_ref.raw(),
                this_object,
                source_ref.as_ref().map_or(ptr::null_mut(), JscString::raw),
                line,
                &mut exception,
            );

            if !exception.is_null() {
                let err = exception_error(&self.inner, ctx, exception);
                if self.inner.config().trace_exceptions {
                    tracing::warn!(source_url, line, error = %err, "script threw");
                } else {
                    tracing::debug!(source_url, line, error = %err, "script threw");
                }
                return Err(err);
            }
            if result.is_null() {
                return Err(JscError::null_pointer("JSEvaluateScript"));
            }

            Ok(JsValue::adopt(&self.inner, ctx, result, ValueOrigin::Evaluated))
        }
    }

    /// Check syntax with default options
    pub fn check_script_syntax(&self, script: &str) -> JscResult<bool> {
        self.check_script_syntax_with(script, &EvaluateOptions::default())
    }

    /// Parse `script` without running it. Invalid syntax is `Ok(false)`,
    /// never an error.
    pub fn check_script_syntax_with(
        &self,
        script: &str,
        options: &EvaluateOptions<'_>,
    ) -> JscResult<bool> {
        Ok(self.syntax_diagnostic(script, options)?.is_none())
    }

    /// Parse `script` without running it and describe the first syntax
    /// error, if any.
    pub fn syntax_diagnostic(
        &self,
        script: &str,
        options: &EvaluateOptions<'_>,
    ) -> JscResult<Option<ExceptionDetails>> {
        let ctx = self.inner.live_ctx()?;
        if let Some(this) = options.this_object {
            this.as_value().raw_for(&self.inner)?;
        }
        let (source_url, line) = options.resolve(self.inner.config());

        let script_ref = JscString::new(script);
        let source_ref = source_url.map(JscString::new);

        // SAFETY: ctx is live; strings are valid for the call
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let valid = JSCheckScriptSyntax(
                ctx,
                script_ref.raw(),
                source_ref.as_ref().map_or(ptr::null_mut(), JscString::raw),
                line,
                &mut exception,
            );

            if valid {
                return Ok(None);
            }
            if exception.is_null() {
                return Ok(Some(ExceptionDetails::new("SyntaxError", "invalid syntax")));
            }

            let thrown = JsValue::adopt(&self.inner, ctx, exception, ValueOrigin::Exception);
            let details = ExceptionDetails::extract(&thrown);
            tracing::trace!(source_url, line, %details, "syntax check failed");
            Ok(Some(details))
        }
    }

    /// Ask the engine for a collection pass. Protected values survive.
    pub fn garbage_collect(&self) -> JscResult<()> {
        let ctx = self.inner.live_ctx()?;
        tracing::trace!(
            protected = self.inner.protected_count(),
            "requesting garbage collection"
        );
        // SAFETY: ctx is live
        unsafe { JSGarbageCollect(ctx) };
        Ok(())
    }

    pub fn make_undefined(&self) -> JscResult<JsValue> {
        // SAFETY: JSValueMakeUndefined always returns a valid value
        self.make_with(|ctx| unsafe { JSValueMakeUndefined(ctx) })
    }

    pub fn make_null(&self) -> JscResult<JsValue> {
        // SAFETY: JSValueMakeNull always returns a valid value
        self.make_with(|ctx| unsafe { JSValueMakeNull(ctx) })
    }

    pub fn make_boolean(&self, b: bool) -> JscResult<JsValue> {
        // SAFETY: JSValueMakeBoolean always returns a valid value
        self.make_with(|ctx| unsafe { JSValueMakeBoolean(ctx, b) })
    }

    /// Any `f64`, including NaN, infinities and negative zero
    pub fn make_number(&self, n: f64) -> JscResult<JsValue> {
        // SAFETY: JSValueMakeNumber always returns a valid value
        self.make_with(|ctx| unsafe { JSValueMakeNumber(ctx, n) })
    }

    /// Any Rust string; interior NULs are preserved
    pub fn make_string(&self, s: &str) -> JscResult<JsValue> {
        let js_str = JscString::new(s);
        // SAFETY: js_str is valid; JSValueMakeString copies it
        self.make_with(|ctx| unsafe { JSValueMakeString(ctx, js_str.raw()) })
    }

    fn make_with(&self, make: impl FnOnce(JSContextRef) -> JSValueRef) -> JscResult<JsValue> {
        let ctx = self.inner.live_ctx()?;
        let raw = make(ctx);
        if raw.is_null() {
            return Err(JscError::null_pointer("JSValueMake"));
        }
        // SAFETY: raw was just created in ctx
        Ok(unsafe { JsValue::adopt(&self.inner, ctx, raw, ValueOrigin::Made) })
    }

    /// Parse `json` with the engine's JSON parser
    pub fn make_value_from_json_string(&self, json: &str) -> JscResult<JsValue> {
        let ctx = self.inner.live_ctx()?;
        let js_str = JscString::new(json);

        // SAFETY: ctx is live; js_str is valid for the call
        let raw = unsafe { JSValueMakeFromJSONString(ctx, js_str.raw()) };
        if raw.is_null() {
            // The engine gives no reason; serde_json usually can
            let message = serde_json::from_str::<serde::de::IgnoredAny>(json)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "input rejected by the engine".into());
            return Err(JscError::JsonParse { message });
        }

        // SAFETY: raw was just created in ctx
        Ok(unsafe { JsValue::adopt(&self.inner, ctx, raw, ValueOrigin::Json) })
    }

    /// Serialize a host value with serde and materialize it in the context
    pub fn make_value_from_serde<T: Serialize + ?Sized>(&self, value: &T) -> JscResult<JsValue> {
        self.inner.live_ctx()?;
        let json = serde_json::to_string(value)?;
        self.make_value_from_json_string(&json)
    }

    /// Expose a host object to script.
    ///
    /// The native object keeps one strong reference to `host` until the
    /// engine finalizes it.
    pub fn make_object<T: HostObject>(&self, host: Rc<T>) -> JscResult<JsObject> {
        let ctx = self.inner.live_ctx()?;
        let class = host::class_for(host.is_callable())?;
        let slot = Box::into_raw(Box::new(HostSlot::new(host)));

        // SAFETY: ctx is live; the class finalizer takes ownership of slot
        unsafe {
            let raw = JSObjectMake(ctx, class, slot as *mut c_void);
            if raw.is_null() {
                drop(Box::from_raw(slot));
                return Err(JscError::null_pointer("JSObjectMake"));
            }
            let value = JsValue::adopt(&self.inner, ctx, raw as JSValueRef, ValueOrigin::Made);
            Ok(JsObject::from_value_unchecked(value))
        }
    }

    /// The context's global object
    pub fn global_object(&self) -> JscResult<JsObject> {
        let ctx = self.inner.live_ctx()?;
        // SAFETY: ctx is live
        unsafe {
            let raw = JSContextGetGlobalObject(ctx);
            if raw.is_null() {
                return Err(JscError::null_pointer("JSContextGetGlobalObject"));
            }
            let value = JsValue::adopt(&self.inner, ctx, raw as JSValueRef, ValueOrigin::Global);
            Ok(JsObject::from_value_unchecked(value))
        }
    }
}

impl Drop for JsContext<'_> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for JsContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsContext")
            .field("ctx", &self.inner.ctx.get())
            .field("disposed", &self.is_disposed())
            .field("protected", &self.inner.protected_count())
            .finish()
    }
}
