//! Value wrappers with registry-backed GC protection
//!
//! Every [`JsValue`] holds exactly one protection (`JSValueProtect`) on its
//! native value. The protection is recorded in the owning bridge's registry
//! under a slot id; it is released once, either when the wrapper drops or
//! when the bridge is disposed, whichever comes first.

use jscore_sys::*;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::rc::{Rc, Weak};

use crate::context::ContextInner;
use crate::error::{JscError, JscResult};
use crate::object::JsObject;
use crate::string::{JscString, js_string_to_rust};

/// Engine type tag of a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    BigInt,
    Object,
}

impl ValueKind {
    pub(crate) fn from_js_type(ty: JSType) -> Self {
        match ty {
            K_JS_TYPE_UNDEFINED => Self::Undefined,
            K_JS_TYPE_NULL => Self::Null,
            K_JS_TYPE_BOOLEAN => Self::Boolean,
            K_JS_TYPE_NUMBER => Self::Number,
            K_JS_TYPE_STRING => Self::String,
            K_JS_TYPE_SYMBOL => Self::Symbol,
            K_JS_TYPE_BIGINT => Self::BigInt,
            _ => Self::Object,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Symbol => "symbol",
            Self::BigInt => "bigint",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a wrapper came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueOrigin {
    /// `make_*` constructors
    Made,
    /// Result of script evaluation
    Evaluated,
    /// Parsed from JSON text
    Json,
    /// Thrown by the engine
    Exception,
    /// Handed to a host object by script
    Argument,
    /// Read from an object property or index
    Property,
    /// Returned from a function or constructor call
    CallResult,
    /// The context's global object
    Global,
}

/// A JavaScript value produced by one context bridge.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScript values are tied to
/// their context's thread.
pub struct JsValue {
    raw: JSValueRef,
    kind: ValueKind,
    origin: ValueOrigin,
    /// Identity of the native context, for cross-context checks
    global: JSGlobalContextRef,
    slot: u64,
    owner: Weak<ContextInner>,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl JsValue {
    /// Protect `raw` on behalf of `owner` and wrap it.
    ///
    /// # Safety
    /// `raw` must be a non-null value living in `ctx`, and `ctx` must be the
    /// owner's live context.
    pub(crate) unsafe fn adopt(
        owner: &Rc<ContextInner>,
        ctx: JSContextRef,
        raw: JSValueRef,
        origin: ValueOrigin,
    ) -> Self {
        // SAFETY: guaranteed by the caller
        let kind = ValueKind::from_js_type(unsafe { JSValueGetType(ctx, raw) });
        let slot = owner.protect(ctx, raw);
        Self {
            raw,
            kind,
            origin,
            global: owner.global(),
            slot,
            owner: Rc::downgrade(owner),
            _not_send: PhantomData,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn origin(&self) -> ValueOrigin {
        self.origin
    }

    /// Raw value reference; fails once the owning bridge is disposed
    pub fn raw(&self) -> JscResult<JSValueRef> {
        self.live().map(|_| self.raw)
    }

    /// Owning bridge state and its live context
    pub(crate) fn live(&self) -> JscResult<(Rc<ContextInner>, JSContextRef)> {
        let owner = self.owner.upgrade().ok_or(JscError::Disposed)?;
        let ctx = owner.live_ctx()?;
        Ok((owner, ctx))
    }

    /// Raw reference for use by `target`; rejects values from other contexts.
    pub(crate) fn raw_for(&self, target: &ContextInner) -> JscResult<JSValueRef> {
        self.live()?;
        if self.global != target.global() {
            return Err(JscError::ContextMismatch);
        }
        Ok(self.raw)
    }

    pub fn is_undefined(&self) -> bool {
        self.kind == ValueKind::Undefined
    }

    pub fn is_null(&self) -> bool {
        self.kind == ValueKind::Null
    }

    pub fn is_boolean(&self) -> bool {
        self.kind == ValueKind::Boolean
    }

    pub fn is_number(&self) -> bool {
        self.kind == ValueKind::Number
    }

    pub fn is_string(&self) -> bool {
        self.kind == ValueKind::String
    }

    pub fn is_object(&self) -> bool {
        self.kind == ValueKind::Object
    }

    /// Check if the value is an array
    ///
    /// Returns `false` once the bridge is disposed, since the engine can no
    /// longer be asked.
    pub fn is_array(&self) -> bool {
        self.is_object()
            && self
                .live()
                // SAFETY: ctx is live and owns self.raw
                .map(|(_, ctx)| unsafe { JSValueIsArray(ctx, self.raw) })
                .unwrap_or(false)
    }

    /// The boolean, if this is a boolean
    pub fn as_bool(&self) -> Option<bool> {
        if self.is_boolean() {
            self.to_bool().ok()
        } else {
            None
        }
    }

    /// The number, if this is a number
    pub fn as_number(&self) -> Option<f64> {
        if self.is_number() {
            self.to_number().ok()
        } else {
            None
        }
    }

    /// The string, if this is a string
    pub fn as_string(&self) -> Option<String> {
        if self.is_string() {
            self.to_string().ok()
        } else {
            None
        }
    }

    /// JavaScript truthiness
    pub fn to_bool(&self) -> JscResult<bool> {
        let (_, ctx) = self.live()?;
        // SAFETY: ctx is live and owns self.raw
        Ok(unsafe { JSValueToBoolean(ctx, self.raw) })
    }

    /// JavaScript `ToNumber`; may run script (`valueOf`) and throw
    pub fn to_number(&self) -> JscResult<f64> {
        let (owner, ctx) = self.live()?;
        // SAFETY: ctx is live and owns self.raw
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let result = JSValueToNumber(ctx, self.raw, &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            Ok(result)
        }
    }

    /// JavaScript `ToString`; may run script (`toString`) and throw
    pub fn to_string(&self) -> JscResult<String> {
        let (owner, ctx) = self.live()?;
        // SAFETY: ctx is live and owns self.raw
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let js_str = JSValueToStringCopy(ctx, self.raw, &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            let js_str =
                JscString::adopt(js_str).ok_or_else(|| JscError::null_pointer("JSValueToStringCopy"))?;
            Ok(js_string_to_rust(js_str.raw()))
        }
    }

    /// `JSON.stringify` of the value
    pub fn to_json(&self) -> JscResult<String> {
        let (owner, ctx) = self.live()?;
        // SAFETY: ctx is live and owns self.raw
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let js_str = JSValueCreateJSONString(ctx, self.raw, 0, &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            // undefined and functions have no JSON form
            let js_str = JscString::adopt(js_str)
                .ok_or_else(|| JscError::type_error("JSON-serializable value", self.kind.as_str()))?;
            Ok(js_string_to_rust(js_str.raw()))
        }
    }

    /// Deserialize from JSON to a Rust type
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> JscResult<T> {
        let json = self.to_json()?;
        Ok(serde_json::from_str(&json)?)
    }

    /// `===` against another value from the same context
    pub fn strict_equals(&self, other: &JsValue) -> JscResult<bool> {
        let (owner, ctx) = self.live()?;
        let other = other.raw_for(&owner)?;
        // SAFETY: both values are live in ctx
        Ok(unsafe { JSValueIsStrictEqual(ctx, self.raw, other) })
    }

    /// A second, independently protected handle to this object
    pub fn to_object(&self) -> JscResult<JsObject> {
        if !self.is_object() {
            return Err(JscError::type_error("object", self.kind.as_str()));
        }
        let (owner, ctx) = self.live()?;
        // SAFETY: self.raw lives in ctx
        let value = unsafe { Self::adopt(&owner, ctx, self.raw, self.origin) };
        Ok(JsObject::from_value_unchecked(value))
    }

    /// Convert into an object wrapper, keeping this protection
    pub fn into_object(self) -> JscResult<JsObject> {
        JsObject::try_from(self)
    }
}

impl Drop for JsValue {
    fn drop(&mut self) {
        // A disposed or dropped owner has already released every slot
        if let Some(owner) = self.owner.upgrade() {
            owner.unprotect(self.slot);
        }
    }
}

impl fmt::Debug for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ValueKind::Undefined | ValueKind::Null => write!(f, "JsValue({})", self.kind),
            ValueKind::String => match self.to_string() {
                Ok(s) => write!(f, "JsValue({:?})", s),
                Err(_) => write!(f, "JsValue(string, <disposed>)"),
            },
            _ => match self.to_string() {
                Ok(s) => write!(f, "JsValue({}: {})", self.kind, s),
                Err(_) => write!(f, "JsValue({}, <opaque>)", self.kind),
            },
        }
    }
}

/// Wrap a thrown value as a `ScriptEvaluation` error
///
/// # Safety
/// `exception` must be a non-null value living in `ctx`, the owner's live context
pub(crate) unsafe fn exception_error(
    owner: &Rc<ContextInner>,
    ctx: JSContextRef,
    exception: JSValueRef,
) -> JscError {
    // SAFETY: guaranteed by the caller
    let value = unsafe { JsValue::adopt(owner, ctx, exception, ValueOrigin::Exception) };
    JscError::script(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JsContext, StandaloneFrame};

    #[test]
    fn test_kinds() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        assert_eq!(ctx.make_undefined().unwrap().kind(), ValueKind::Undefined);
        assert_eq!(ctx.make_null().unwrap().kind(), ValueKind::Null);
        assert_eq!(ctx.make_boolean(false).unwrap().kind(), ValueKind::Boolean);
        assert_eq!(ctx.make_number(1.5).unwrap().kind(), ValueKind::Number);
        assert_eq!(ctx.make_string("x").unwrap().kind(), ValueKind::String);
        assert_eq!(ctx.evaluate_script("Symbol('s')").unwrap().kind(), ValueKind::Symbol);
        assert_eq!(ctx.evaluate_script("({})").unwrap().kind(), ValueKind::Object);
    }

    #[test]
    fn test_typed_accessors() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let n = ctx.make_number(3.0).unwrap();
        assert_eq!(n.as_number(), Some(3.0));
        assert_eq!(n.as_bool(), None);
        assert_eq!(n.as_string(), None);

        let s = ctx.make_string("42").unwrap();
        assert_eq!(s.as_string().as_deref(), Some("42"));
        assert_eq!(s.as_number(), None);
        assert_eq!(s.to_number().unwrap(), 42.0);
    }

    #[test]
    fn test_to_string_throws_through_script() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let value = ctx
            .evaluate_script("({ toString() { throw new TypeError('nope'); } })")
            .unwrap();
        let err = value.to_string().unwrap_err();
        assert_eq!(err.error_type(), "TypeError");
        assert_eq!(err.exception_details().unwrap().message, "nope");
    }

    #[test]
    fn test_json_and_deserialize() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Point {
            x: i32,
            y: i32,
        }

        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let value = ctx.evaluate_script("({ x: 1, y: 2 })").unwrap();
        assert_eq!(value.to_json().unwrap(), r#"{"x":1,"y":2}"#);
        assert_eq!(value.deserialize::<Point>().unwrap(), Point { x: 1, y: 2 });

        let undefined = ctx.make_undefined().unwrap();
        assert!(matches!(undefined.to_json(), Err(JscError::TypeError { .. })));
    }

    #[test]
    fn test_strict_equals() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let a = ctx.make_number(1.0).unwrap();
        let b = ctx.evaluate_script("1").unwrap();
        let c = ctx.make_string("1").unwrap();
        assert!(a.strict_equals(&b).unwrap());
        assert!(!a.strict_equals(&c).unwrap());
    }

    #[test]
    fn test_to_object_requires_object() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let n = ctx.make_number(1.0).unwrap();
        assert!(matches!(n.to_object(), Err(JscError::TypeError { .. })));

        let obj = ctx.evaluate_script("[1, 2]").unwrap();
        assert!(obj.is_array());
        let handle = obj.to_object().unwrap();
        assert!(handle.is_array());
    }

    #[test]
    fn test_drop_releases_slot() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        let before = ctx.inner().protected_count();
        let value = ctx.make_string("held").unwrap();
        assert_eq!(ctx.inner().protected_count(), before + 1);
        drop(value);
        assert_eq!(ctx.inner().protected_count(), before);
    }
}
