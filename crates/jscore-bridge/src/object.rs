//! Object wrapper with property access, calls and host-object access

use jscore_sys::*;
use std::ptr;
use std::rc::Rc;

use crate::error::{JscError, JscResult};
use crate::host::{self, HostObject, HostSlot};
use crate::string::{JscString, js_string_to_rust};
use crate::value::{JsValue, ValueKind, ValueOrigin, exception_error};

/// A JavaScript object, specialised from [`JsValue`]
///
/// Provides safe methods for property access, function calls, and array operations.
/// Shares the value's protection and release rules.
///
/// # Thread Safety
///
/// This type is `!Send` and `!Sync` because JavaScript objects are tied to
/// their context's thread.
pub struct JsObject {
    value: JsValue,
}

impl JsObject {
    /// Caller guarantees `value` is of kind object
    pub(crate) fn from_value_unchecked(value: JsValue) -> Self {
        debug_assert_eq!(value.kind(), ValueKind::Object);
        Self { value }
    }

    pub fn as_value(&self) -> &JsValue {
        &self.value
    }

    pub fn into_value(self) -> JsValue {
        self.value
    }

    /// Get the raw object reference
    pub fn raw(&self) -> JscResult<JSObjectRef> {
        self.value.raw()
    }

    /// Check if the object is a function
    ///
    /// Returns `false` once the bridge is disposed; `call` reports
    /// [`JscError::Disposed`] in that case.
    pub fn is_function(&self) -> bool {
        self.value
            .live()
            // SAFETY: ctx is live and owns the object
            .map(|(_, ctx)| unsafe { JSObjectIsFunction(ctx, self.object()) })
            .unwrap_or(false)
    }

    /// Check if the object is a constructor
    ///
    /// Returns `false` once the bridge is disposed; `construct` reports
    /// [`JscError::Disposed`] in that case.
    pub fn is_constructor(&self) -> bool {
        self.value
            .live()
            // SAFETY: ctx is live and owns the object
            .map(|(_, ctx)| unsafe { JSObjectIsConstructor(ctx, self.object()) })
            .unwrap_or(false)
    }

    /// See [`JsValue::is_array`]
    pub fn is_array(&self) -> bool {
        self.value.is_array()
    }

    fn object(&self) -> JSObjectRef {
        // live() has been checked by every caller
        self.value.raw().unwrap_or(ptr::null_mut())
    }

    /// Get a property by name
    pub fn get(&self, name: &str) -> JscResult<JsValue> {
        let (owner, ctx) = self.value.live()?;
        let name_ref = JscString::new(name);

        // SAFETY: ctx is live and owns the object; name_ref is valid
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let value = JSObjectGetProperty(ctx, self.object(), name_ref.raw(), &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }
            if value.is_null() {
                return Err(JscError::null_pointer("JSObjectGetProperty"));
            }

            Ok(JsValue::adopt(&owner, ctx, value, ValueOrigin::Property))
        }
    }

    /// Set a property by name
    pub fn set(&self, name: &str, value: &JsValue) -> JscResult<()> {
        let (owner, ctx) = self.value.live()?;
        let raw_value = value.raw_for(&owner)?;
        let name_ref = JscString::new(name);

        // SAFETY: ctx is live and owns both the object and the value
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            JSObjectSetProperty(
                ctx,
                self.object(),
                name_ref.raw(),
                raw_value,
                K_JS_PROPERTY_ATTRIBUTE_NONE,
                &mut exception,
            );

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            Ok(())
        }
    }

    /// Check if a property exists (own or inherited)
    pub fn has(&self, name: &str) -> JscResult<bool> {
        let (_, ctx) = self.value.live()?;
        let name_ref = JscString::new(name);
        // SAFETY: ctx is live and owns the object
        Ok(unsafe { JSObjectHasProperty(ctx, self.object(), name_ref.raw()) })
    }

    /// Delete a property
    pub fn delete(&self, name: &str) -> JscResult<bool> {
        let (owner, ctx) = self.value.live()?;
        let name_ref = JscString::new(name);

        // SAFETY: ctx is live and owns the object
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let deleted = JSObjectDeleteProperty(ctx, self.object(), name_ref.raw(), &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            Ok(deleted)
        }
    }

    /// Get array element by index
    pub fn get_index(&self, index: u32) -> JscResult<JsValue> {
        let (owner, ctx) = self.value.live()?;

        // SAFETY: ctx is live and owns the object
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let value = JSObjectGetPropertyAtIndex(ctx, self.object(), index, &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }
            if value.is_null() {
                return Err(JscError::null_pointer("JSObjectGetPropertyAtIndex"));
            }

            Ok(JsValue::adopt(&owner, ctx, value, ValueOrigin::Property))
        }
    }

    /// Set array element by index
    pub fn set_index(&self, index: u32, value: &JsValue) -> JscResult<()> {
        let (owner, ctx) = self.value.live()?;
        let raw_value = value.raw_for(&owner)?;

        // SAFETY: ctx is live and owns both the object and the value
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            JSObjectSetPropertyAtIndex(ctx, self.object(), index, raw_value, &mut exception);

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }

            Ok(())
        }
    }

    /// Enumerable property names, in engine order
    pub fn property_names(&self) -> JscResult<Vec<String>> {
        let (_, ctx) = self.value.live()?;

        // SAFETY: ctx is live; the array is released before returning
        unsafe {
            let names = JSObjectCopyPropertyNames(ctx, self.object());
            if names.is_null() {
                return Err(JscError::null_pointer("JSObjectCopyPropertyNames"));
            }

            let count = JSPropertyNameArrayGetCount(names);
            let result = (0..count)
                .map(|i| js_string_to_rust(JSPropertyNameArrayGetNameAtIndex(names, i)))
                .collect();

            JSPropertyNameArrayRelease(names);
            Ok(result)
        }
    }

    /// Array length (for array objects)
    ///
    /// A `length` property that is not a valid array length (missing, NaN,
    /// negative, fractional or above `u32::MAX`) is a [`JscError::TypeError`].
    pub fn length(&self) -> JscResult<u32> {
        let len = self.get("length")?.to_number()?;
        if len.is_finite() && len >= 0.0 && len.fract() == 0.0 && len <= u32::MAX as f64 {
            Ok(len as u32)
        } else {
            Err(JscError::type_error("array length", format!("{len}")))
        }
    }

    /// Call this object as a function with arguments
    pub fn call(&self, this: Option<&JsObject>, args: &[&JsValue]) -> JscResult<JsValue> {
        let (owner, ctx) = self.value.live()?;
        if !self.is_function() {
            return Err(JscError::type_error("function", "non-function object"));
        }

        let this_obj = match this {
            Some(this) => this.value.raw_for(&owner)?,
            None => ptr::null_mut(),
        };
        let arg_values = args
            .iter()
            .map(|v| v.raw_for(&owner))
            .collect::<JscResult<Vec<JSValueRef>>>()?;

        // SAFETY: ctx is live; this and every argument belong to ctx
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let result = JSObjectCallAsFunction(
                ctx,
                self.object(),
                this_obj,
                arg_values.len(),
                if arg_values.is_empty() {
                    ptr::null()
                } else {
                    arg_values.as_ptr()
                },
                &mut exception,
            );

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }
            if result.is_null() {
                return Err(JscError::null_pointer("JSObjectCallAsFunction"));
            }

            Ok(JsValue::adopt(&owner, ctx, result, ValueOrigin::CallResult))
        }
    }

    /// `new this(...args)`
    pub fn construct(&self, args: &[&JsValue]) -> JscResult<JsObject> {
        let (owner, ctx) = self.value.live()?;
        if !self.is_constructor() {
            return Err(JscError::type_error("constructor", "non-constructor object"));
        }

        let arg_values = args
            .iter()
            .map(|v| v.raw_for(&owner))
            .collect::<JscResult<Vec<JSValueRef>>>()?;

        // SAFETY: ctx is live; every argument belongs to ctx
        unsafe {
            let mut exception: JSValueRef = ptr::null_mut();
            let result = JSObjectCallAsConstructor(
                ctx,
                self.object(),
                arg_values.len(),
                if arg_values.is_empty() {
                    ptr::null()
                } else {
                    arg_values.as_ptr()
                },
                &mut exception,
            );

            if !exception.is_null() {
                return Err(exception_error(&owner, ctx, exception));
            }
            if result.is_null() {
                return Err(JscError::null_pointer("JSObjectCallAsConstructor"));
            }

            let value = JsValue::adopt(&owner, ctx, result, ValueOrigin::CallResult);
            Ok(Self::from_value_unchecked(value))
        }
    }

    /// The host object behind this object, if it was made by `make_object`
    ///
    /// `None` once the bridge is disposed.
    pub fn host(&self) -> Option<Rc<dyn HostObject>> {
        let (_, ctx) = self.value.live().ok()?;
        // SAFETY: ctx is live and owns the object
        let slot = unsafe { host::slot_of(ctx, self.object()) };
        slot.map(HostSlot::host)
    }

    /// The host object behind this object, if it is a `T`
    ///
    /// `None` once the bridge is disposed.
    pub fn host_object<T: HostObject>(&self) -> Option<Rc<T>> {
        let (_, ctx) = self.value.live().ok()?;
        // SAFETY: ctx is live and owns the object
        let slot = unsafe { host::slot_of(ctx, self.object()) };
        slot.and_then(HostSlot::downcast::<T>)
    }
}

impl TryFrom<JsValue> for JsObject {
    type Error = JscError;

    fn try_from(value: JsValue) -> JscResult<Self> {
        if value.is_object() {
            Ok(Self::from_value_unchecked(value))
        } else {
            Err(JscError::type_error("object", value.kind().as_str()))
        }
    }
}

impl From<JsObject> for JsValue {
    fn from(object: JsObject) -> Self {
        object.value
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.host() {
            Some(host) => write!(f, "JsObject(host {})", host.class_name()),
            None => write!(f, "JsObject({:?})", self.value.raw().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{JsContext, StandaloneFrame};

    fn object(ctx: &JsContext, script: &str) -> JsObject {
        ctx.evaluate_script(script).unwrap().into_object().unwrap()
    }

    #[test]
    fn test_property_access() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let obj = object(&ctx, "({})");

        let value = ctx.make_number(42.0).unwrap();
        obj.set("foo", &value).unwrap();

        assert!(obj.has("foo").unwrap());
        assert!(!obj.has("bar").unwrap());

        let got = obj.get("foo").unwrap();
        assert_eq!(got.origin(), ValueOrigin::Property);
        assert_eq!(got.to_number().unwrap(), 42.0);
        assert!(obj.get("bar").unwrap().is_undefined());
    }

    #[test]
    fn test_delete_property() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let obj = object(&ctx, "({ foo: 1 })");

        assert!(obj.delete("foo").unwrap());
        assert!(!obj.has("foo").unwrap());
    }

    #[test]
    fn test_array_access() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let arr = object(&ctx, "[1, 2, 3]");

        assert!(arr.is_array());
        assert_eq!(arr.length().unwrap(), 3);
        assert_eq!(arr.get_index(0).unwrap().to_number().unwrap(), 1.0);
        assert_eq!(arr.get_index(2).unwrap().to_number().unwrap(), 3.0);

        arr.set_index(3, &ctx.make_string("four").unwrap()).unwrap();
        assert_eq!(arr.length().unwrap(), 4);
    }

    #[test]
    fn test_length_rejects_invalid_values() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();

        for script in ["({ length: -1 })", "({ length: 2 ** 40 })", "({ length: 1.5 })", "({})"] {
            let obj = object(&ctx, script);
            assert!(
                matches!(obj.length(), Err(JscError::TypeError { .. })),
                "{script} should not have an array length"
            );
        }

        assert_eq!(object(&ctx, "({ length: 4294967295 })").length().unwrap(), u32::MAX);
        assert_eq!(object(&ctx, "[]").length().unwrap(), 0);
    }

    #[test]
    fn test_predicates_after_dispose() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let func = object(&ctx, "(function() {})");
        let arr = object(&ctx, "[]");
        assert!(func.is_function());

        ctx.dispose();
        assert!(!func.is_function());
        assert!(!func.is_constructor());
        assert!(!arr.is_array());
        assert!(func.host().is_none());
        assert!(matches!(func.call(None, &[]), Err(JscError::Disposed)));
        assert!(matches!(func.construct(&[]), Err(JscError::Disposed)));
        assert!(matches!(arr.length(), Err(JscError::Disposed)));
    }

    #[test]
    fn test_property_names() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let obj = object(&ctx, "({ b: 1, a: 2, [Symbol('s')]: 3 })");

        assert_eq!(obj.property_names().unwrap(), vec!["b", "a"]);
    }

    #[test]
    fn test_function_call() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let func = object(&ctx, "(function(a, b) { return a + b; })");
        assert!(func.is_function());

        let arg1 = ctx.make_number(2.0).unwrap();
        let arg2 = ctx.make_number(3.0).unwrap();
        let sum = func.call(None, &[&arg1, &arg2]).unwrap();

        assert_eq!(sum.origin(), ValueOrigin::CallResult);
        assert_eq!(sum.to_number().unwrap(), 5.0);
    }

    #[test]
    fn test_call_with_this() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let func = object(&ctx, "(function() { return this.n * 2; })");
        let this = object(&ctx, "({ n: 21 })");

        let result = func.call(Some(&this), &[]).unwrap();
        assert_eq!(result.to_number().unwrap(), 42.0);
    }

    #[test]
    fn test_call_non_function() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let obj = object(&ctx, "({})");

        assert!(matches!(obj.call(None, &[]), Err(JscError::TypeError { .. })));
    }

    #[test]
    fn test_call_throws() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let func = object(&ctx, "(function() { throw new Error('inside'); })");

        let err = func.call(None, &[]).unwrap_err();
        assert!(err.is_script_error());
        assert_eq!(err.exception_details().unwrap().message, "inside");
    }

    #[test]
    fn test_construct() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let class = object(&ctx, "(class Point { constructor(x) { this.x = x; } })");
        assert!(class.is_constructor());

        let arg = ctx.make_number(7.0).unwrap();
        let point = class.construct(&[&arg]).unwrap();
        assert_eq!(point.get("x").unwrap().to_number().unwrap(), 7.0);
    }

    #[test]
    fn test_try_from_rejects_primitives() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let value = ctx.make_boolean(true).unwrap();

        let err = JsObject::try_from(value).unwrap_err();
        assert!(matches!(err, JscError::TypeError { .. }));
    }

    #[test]
    fn test_plain_object_has_no_host() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let obj = object(&ctx, "({})");
        assert!(obj.host().is_none());
    }
}
