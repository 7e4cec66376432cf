// Allow raw pointer dereference in public functions - this is an FFI wrapper
// where callers hand us engine pointers obtained from the engine itself.
#![allow(clippy::not_unsafe_ptr_arg_deref)]

//! Lifetime-safe bridge between host code and a JavaScriptCore execution context.
//!
//! A [`JsContext`] wraps the native context of a [`WebFrame`] and
//! evaluates scripts, checks syntax, and manufactures values. Every
//! [`JsValue`] it hands out holds one GC protection, released exactly once:
//! when the wrapper drops, or when the bridge is disposed, whichever comes
//! first. After disposal every operation reports [`JscError::Disposed`].
//!
//! # Example
//!
//! ```
//! use jscore_bridge::{JsContext, StandaloneFrame};
//!
//! let frame = StandaloneFrame::new().unwrap();
//! let ctx = JsContext::new(&frame).unwrap();
//! let result = ctx.evaluate_script("1 + 1").unwrap();
//! assert_eq!(result.to_number().unwrap(), 2.0);
//! ```
//!
//! # Thread Safety
//!
//! All types in this crate are `!Send` and `!Sync` because JavaScriptCore
//! contexts and values are not thread-safe.
//!
//! ## Example: Wrong (won't compile)
//!
//! ```compile_fail
//! use jscore_bridge::{JsContext, StandaloneFrame};
//! use std::thread;
//!
//! let frame = StandaloneFrame::new().unwrap();
//! let ctx = JsContext::new(&frame).unwrap();
//! thread::spawn(move || {
//!     ctx.evaluate_script("1 + 1"); // Error: JsContext is !Send
//! });
//! ```

mod config;
mod context;
mod error;
mod frame;
mod host;
mod object;
pub mod string;
mod value;

pub use config::{BridgeConfig, EvaluateOptions};
pub use context::JsContext;
pub use error::{ExceptionDetails, JscError, JscResult, ScriptException};
pub use frame::{StandaloneFrame, WebFrame};
pub use host::HostObject;
pub use object::JsObject;
pub use string::{JscString, js_string_to_rust};
pub use value::{JsValue, ValueKind, ValueOrigin};

// Re-export sys crate for advanced usage
pub use jscore_sys;
