//! Host objects: Rust values exposed to script through a native class
//!
//! [`JsContext::make_object`] boxes an `Rc<T: HostObject>` into the private
//! slot of an instance of one of two process-wide classes (plain or
//! callable). The engine calls back into the trampolines below; each builds a
//! temporary bridge over the callback context, runs the host method under
//! `catch_unwind`, and turns failures into thrown JavaScript exceptions.
//!
//! The finalizer drops the boxed reference when the object is collected.
//! Host objects should not store the `JsValue`s they receive: those belong to
//! the callback bridge and report `Disposed` once the callback returns.

use jscore_sys::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;
use std::slice;

use crate::context::JsContext;
use crate::error::{JscError, JscResult};
use crate::object::JsObject;
use crate::string::{JscString, js_string_to_rust};
use crate::value::{JsValue, ValueOrigin};

/// A Rust type that script can see.
///
/// Every method has a default, so implementors opt into the capabilities
/// they need. Methods take `&self`; use interior mutability for state.
pub trait HostObject: 'static {
    /// Name used in logs and `Debug` output
    fn class_name(&self) -> &str {
        "HostObject"
    }

    /// Whether script may call the object as a function. Read once, when the
    /// object is made.
    fn is_callable(&self) -> bool {
        false
    }

    /// Invoked for `obj(...args)` when [`is_callable`](Self::is_callable) is true
    fn call(
        &self,
        ctx: &JsContext<'_>,
        this: Option<&JsObject>,
        args: &[JsValue],
    ) -> JscResult<JsValue> {
        let _ = (ctx, this, args);
        Err(JscError::type_error("callable host object", self.class_name()))
    }

    /// Property read. `Ok(None)` falls through to ordinary lookup.
    fn get_property(&self, ctx: &JsContext<'_>, name: &str) -> JscResult<Option<JsValue>> {
        let _ = (ctx, name);
        Ok(None)
    }

    /// Property write. `Ok(false)` falls through to an ordinary assignment.
    fn set_property(&self, ctx: &JsContext<'_>, name: &str, value: &JsValue) -> JscResult<bool> {
        let _ = (ctx, name, value);
        Ok(false)
    }

    /// Extra names reported during property enumeration
    fn property_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// What the native object's private slot points at
pub(crate) struct HostSlot {
    host: Rc<dyn HostObject>,
    /// Same allocation, for typed downcasts
    any: Rc<dyn Any>,
}

impl HostSlot {
    pub(crate) fn new<T: HostObject>(host: Rc<T>) -> Self {
        Self {
            host: host.clone(),
            any: host,
        }
    }

    pub(crate) fn host(&self) -> Rc<dyn HostObject> {
        Rc::clone(&self.host)
    }

    pub(crate) fn downcast<T: HostObject>(&self) -> Option<Rc<T>> {
        Rc::clone(&self.any).downcast::<T>().ok()
    }
}

thread_local! {
    /// [plain, callable]
    static CLASSES: [JSClassRef; 2] = [create_class(false), create_class(true)];
}

fn create_class(callable: bool) -> JSClassRef {
    let definition = JSClassDefinition {
        class_name: c"HostObject".as_ptr(),
        finalize: Some(finalize),
        get_property: Some(get_property),
        set_property: Some(set_property),
        get_property_names: Some(get_property_names),
        call_as_function: if callable { Some(call_as_function) } else { None },
        ..Default::default()
    };
    // SAFETY: the definition and its static name outlive the call; JSC copies both
    unsafe { JSClassCreate(&definition) }
}

/// Native class for new host objects
pub(crate) fn class_for(callable: bool) -> JscResult<JSClassRef> {
    let class = CLASSES.with(|classes| classes[callable as usize]);
    if class.is_null() {
        return Err(JscError::null_pointer("JSClassCreate"));
    }
    Ok(class)
}

/// The slot behind `object`, if it is an instance of a host class.
///
/// # Safety
/// `ctx` must be live and own `object`. The returned reference is only valid
/// while the object is reachable.
pub(crate) unsafe fn slot_of<'a>(ctx: JSContextRef, object: JSObjectRef) -> Option<&'a HostSlot> {
    let is_host = CLASSES.with(|classes| {
        classes.iter().any(|&class| {
            // SAFETY: ctx is live and owns object
            !class.is_null() && unsafe { JSValueIsObjectOfClass(ctx, object, class) }
        })
    });
    if !is_host {
        return None;
    }
    // SAFETY: objects of the host classes carry a HostSlot (or null once finalized)
    unsafe { (JSObjectGetPrivate(object) as *const HostSlot).as_ref() }
}

/// Host behind an object the engine handed to one of our class callbacks
unsafe fn host_of(object: JSObjectRef) -> Option<Rc<dyn HostObject>> {
    // SAFETY: callbacks only fire for instances of the host classes
    let slot = unsafe { (JSObjectGetPrivate(object) as *const HostSlot).as_ref() };
    slot.map(HostSlot::host)
}

/// Run a host method on a temporary bridge; failures become a thrown exception.
unsafe fn guarded<R>(
    ctx: JSContextRef,
    exception: *mut JSValueRef,
    operation: &str,
    f: impl FnOnce(&JsContext) -> JscResult<R>,
) -> Option<R> {
    // SAFETY: the engine passes a live context to class callbacks
    let bridge = unsafe { JsContext::from_raw(ctx) };

    let err = match panic::catch_unwind(AssertUnwindSafe(|| f(&bridge))) {
        Ok(Ok(value)) => return Some(value),
        Ok(Err(err)) => err,
        Err(payload) => JscError::internal(format!(
            "host object panicked in {}: {}",
            operation,
            panic_message(payload.as_ref())
        )),
    };

    tracing::debug!(operation, error = %err, "host object callback failed");
    if !exception.is_null() {
        // SAFETY: exception is the engine's out-parameter for this callback
        unsafe { *exception = error_to_js(&bridge, &err) };
    }
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Script errors rethrow the value that was thrown; anything else becomes
/// an `Error` carrying the display message.
fn error_to_js(bridge: &JsContext, err: &JscError) -> JSValueRef {
    if let Some(Ok(raw)) = err.exception().map(|thrown| thrown.raw_for(bridge.inner())) {
        return raw;
    }

    let Ok(ctx) = bridge.raw() else {
        return ptr::null_mut();
    };
    let message = JscString::new(&err.to_string());
    // SAFETY: ctx is live for the duration of the callback
    unsafe {
        let arg = JSValueMakeString(ctx, message.raw());
        JSObjectMakeError(ctx, 1, &arg, ptr::null_mut())
    }
}

unsafe extern "C" fn finalize(object: JSObjectRef) {
    // SAFETY: JSObjectGetPrivate is permitted during finalization
    let slot = unsafe { JSObjectGetPrivate(object) } as *mut HostSlot;
    if slot.is_null() {
        return;
    }
    // SAFETY: slot came from Box::into_raw in make_object and is finalized once
    let slot = unsafe { Box::from_raw(slot) };
    tracing::trace!(class = slot.host.class_name(), "finalized host object");

    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(slot)));
}

unsafe extern "C" fn call_as_function(
    ctx: JSContextRef,
    function: JSObjectRef,
    this_object: JSObjectRef,
    argument_count: usize,
    arguments: *const JSValueRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    // SAFETY: function is an instance of the callable host class
    let Some(host) = (unsafe { host_of(function) }) else {
        // SAFETY: ctx is live
        return unsafe { JSValueMakeUndefined(ctx) };
    };

    let raw_args: &[JSValueRef] = if argument_count == 0 || arguments.is_null() {
        &[]
    } else {
        // SAFETY: the engine passes argument_count valid values
        unsafe { slice::from_raw_parts(arguments, argument_count) }
    };

    // SAFETY: ctx is live; exception is the engine's out-parameter
    let result = unsafe {
        guarded(ctx, exception, "call", |bridge| {
            let inner = bridge.inner();
            let ctx = bridge.raw()?;

            let this = (!this_object.is_null()).then(|| {
                // SAFETY: this_object is a live object in ctx
                let value =
                    unsafe { JsValue::adopt(inner, ctx, this_object, ValueOrigin::Argument) };
                JsObject::from_value_unchecked(value)
            });
            let args: Vec<JsValue> = raw_args
                .iter()
                // SAFETY: every argument is a live value in ctx
                .map(|&raw| unsafe { JsValue::adopt(inner, ctx, raw, ValueOrigin::Argument) })
                .collect();

            host.call(bridge, this.as_ref(), &args)?.raw_for(inner)
        })
    };
    result.unwrap_or(ptr::null_mut())
}

unsafe extern "C" fn get_property(
    ctx: JSContextRef,
    object: JSObjectRef,
    property_name: JSStringRef,
    exception: *mut JSValueRef,
) -> JSValueRef {
    // SAFETY: object is an instance of a host class
    let Some(host) = (unsafe { host_of(object) }) else {
        return ptr::null_mut();
    };
    // SAFETY: property_name is valid for the callback
    let name = unsafe { js_string_to_rust(property_name) };

    // SAFETY: ctx is live; exception is the engine's out-parameter
    let result = unsafe {
        guarded(ctx, exception, "get_property", |bridge| {
            match host.get_property(bridge, &name)? {
                Some(value) => value.raw_for(bridge.inner()),
                None => Ok(ptr::null_mut()),
            }
        })
    };
    result.unwrap_or(ptr::null_mut())
}

unsafe extern "C" fn set_property(
    ctx: JSContextRef,
    object: JSObjectRef,
    property_name: JSStringRef,
    value: JSValueRef,
    exception: *mut JSValueRef,
) -> bool {
    // SAFETY: object is an instance of a host class
    let Some(host) = (unsafe { host_of(object) }) else {
        return false;
    };
    // SAFETY: property_name is valid for the callback
    let name = unsafe { js_string_to_rust(property_name) };

    // SAFETY: ctx is live; exception is the engine's out-parameter
    let result = unsafe {
        guarded(ctx, exception, "set_property", |bridge| {
            let ctx = bridge.raw()?;
            // SAFETY: value is a live value in ctx
            let value = unsafe { JsValue::adopt(bridge.inner(), ctx, value, ValueOrigin::Argument) };
            host.set_property(bridge, &name, &value)
        })
    };
    result.unwrap_or(false)
}

unsafe extern "C" fn get_property_names(
    _ctx: JSContextRef,
    object: JSObjectRef,
    property_names: JSPropertyNameAccumulatorRef,
) {
    // SAFETY: object is an instance of a host class
    let Some(host) = (unsafe { host_of(object) }) else {
        return;
    };

    match panic::catch_unwind(AssertUnwindSafe(|| host.property_names())) {
        Ok(names) => {
            for name in names {
                let name_ref = JscString::new(&name);
                // SAFETY: the accumulator copies the name
                unsafe { JSPropertyNameAccumulatorAddName(property_names, name_ref.raw()) };
            }
        }
        Err(payload) => {
            tracing::debug!(
                panic = panic_message(payload.as_ref()),
                "host object panicked in property_names"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StandaloneFrame;
    use std::cell::{Cell, RefCell};

    struct Adder;

    impl HostObject for Adder {
        fn class_name(&self) -> &str {
            "Adder"
        }

        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, ctx: &JsContext, _this: Option<&JsObject>, args: &[JsValue]) -> JscResult<JsValue> {
            let mut sum = 0.0;
            for arg in args {
                sum += arg.to_number()?;
            }
            ctx.make_number(sum)
        }
    }

    #[derive(Default)]
    struct Settings {
        values: RefCell<Vec<(String, String)>>,
        writes: Cell<u32>,
    }

    impl HostObject for Settings {
        fn get_property(&self, ctx: &JsContext, name: &str) -> JscResult<Option<JsValue>> {
            let values = self.values.borrow();
            match values.iter().find(|(k, _)| k == name) {
                Some((_, v)) => ctx.make_string(v).map(Some),
                None => Ok(None),
            }
        }

        fn set_property(&self, _ctx: &JsContext, name: &str, value: &JsValue) -> JscResult<bool> {
            if !name.starts_with("opt_") {
                return Ok(false);
            }
            self.writes.set(self.writes.get() + 1);
            self.values
                .borrow_mut()
                .push((name.to_string(), value.to_string()?));
            Ok(true)
        }

        fn property_names(&self) -> Vec<String> {
            self.values.borrow().iter().map(|(k, _)| k.clone()).collect()
        }
    }

    struct Failing;

    impl HostObject for Failing {
        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, _ctx: &JsContext, _this: Option<&JsObject>, args: &[JsValue]) -> JscResult<JsValue> {
            match args.first() {
                // rethrow whatever the callback throws
                Some(callback) => callback.to_object()?.call(None, &[]),
                None => Err(JscError::internal("boom")),
            }
        }
    }

    struct Panicking;

    impl HostObject for Panicking {
        fn is_callable(&self) -> bool {
            true
        }

        fn call(&self, _ctx: &JsContext, _this: Option<&JsObject>, _args: &[JsValue]) -> JscResult<JsValue> {
            panic!("host bug");
        }
    }

    fn install<T: HostObject>(ctx: &JsContext, name: &str, host: T) -> JsObject {
        let object = ctx.make_object(Rc::new(host)).unwrap();
        ctx.global_object().unwrap().set(name, object.as_value()).unwrap();
        object
    }

    #[test]
    fn test_callable_host() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let adder = install(&ctx, "add", Adder);

        assert!(adder.as_value().is_object());
        assert!(adder.is_function());
        assert_eq!(ctx.evaluate_script("typeof add").unwrap().to_string().unwrap(), "function");
        assert_eq!(ctx.evaluate_script("add(2, 3, 4)").unwrap().to_number().unwrap(), 9.0);
    }

    #[test]
    fn test_plain_host_is_not_callable() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let settings = install(&ctx, "settings", Settings::default());

        assert!(!settings.is_function());
        let err = ctx.evaluate_script("settings()").unwrap_err();
        assert_eq!(err.error_type(), "TypeError");
    }

    #[test]
    fn test_host_object_downcast() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let host = Rc::new(Adder);
        let object = ctx.make_object(Rc::clone(&host)).unwrap();

        let found = object.host_object::<Adder>().unwrap();
        assert!(Rc::ptr_eq(&found, &host));
        assert!(object.host_object::<Settings>().is_none());
        assert_eq!(object.host().unwrap().class_name(), "Adder");
    }

    #[test]
    fn test_host_properties() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        let settings = Rc::new(Settings::default());
        let object = ctx.make_object(Rc::clone(&settings)).unwrap();
        ctx.global_object().unwrap().set("settings", object.as_value()).unwrap();

        ctx.evaluate_script("settings.opt_theme = 'dark'; settings.plain = 1;").unwrap();
        assert_eq!(settings.writes.get(), 1);
        assert_eq!(
            ctx.evaluate_script("settings.opt_theme").unwrap().to_string().unwrap(),
            "dark"
        );
        // ordinary assignment fell through
        assert_eq!(ctx.evaluate_script("settings.plain").unwrap().to_number().unwrap(), 1.0);
        assert!(object.property_names().unwrap().contains(&"opt_theme".to_string()));
    }

    #[test]
    fn test_host_error_becomes_exception() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        install(&ctx, "fail", Failing);

        let message = ctx
            .evaluate_script("try { fail(); 'no' } catch (e) { e.message }")
            .unwrap();
        assert_eq!(message.to_string().unwrap(), "Internal error: boom");
    }

    #[test]
    fn test_script_error_is_rethrown() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        install(&ctx, "fail", Failing);

        let same = ctx
            .evaluate_script(
                "const thrown = { tag: 1 };
                 try { fail(() => { throw thrown; }); false } catch (e) { e === thrown }",
            )
            .unwrap();
        assert_eq!(same.as_bool(), Some(true));
    }

    #[test]
    fn test_host_panic_becomes_exception() {
        let frame = StandaloneFrame::new().unwrap();
        let ctx = JsContext::new(&frame).unwrap();
        install(&ctx, "explode", Panicking);

        let err = ctx.evaluate_script("explode()").unwrap_err();
        let message = &err.exception_details().unwrap().message;
        assert!(message.contains("panicked"));
        assert!(message.contains("host bug"));
    }
}
