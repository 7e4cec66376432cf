//! RAII wrapper for JSC strings

use jscore_sys::*;
use std::fmt;
use std::marker::PhantomData;

/// Owned `JSStringRef`, released on drop.
///
/// Strings are marshaled as UTF-16, so every Rust string (including ones
/// with interior NULs) converts without loss.
pub struct JscString {
    raw: JSStringRef,
    /// Marker to make this type !Send + !Sync
    _not_send: PhantomData<*mut ()>,
}

impl JscString {
    /// Create a new JSC string from a Rust string
    pub fn new(s: &str) -> Self {
        let units: Vec<JSChar> = s.encode_utf16().collect();
        // SAFETY: units is a valid buffer of units.len() code units; JSC copies it
        let raw = unsafe { JSStringCreateWithCharacters(units.as_ptr(), units.len()) };
        Self {
            raw,
            _not_send: PhantomData,
        }
    }

    /// Take ownership of a string returned at +1 by the engine
    /// (e.g. `JSValueToStringCopy`). Returns `None` for null.
    ///
    /// # Safety
    /// `raw` must be null or an owned reference the caller would otherwise release.
    pub unsafe fn adopt(raw: JSStringRef) -> Option<Self> {
        (!raw.is_null()).then_some(Self {
            raw,
            _not_send: PhantomData,
        })
    }

    /// Get the raw JSStringRef
    pub fn raw(&self) -> JSStringRef {
        self.raw
    }

    /// Length in UTF-16 code units
    pub fn len(&self) -> usize {
        // SAFETY: self.raw is a live string
        unsafe { JSStringGetLength(self.raw) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for JscString {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: we own exactly one reference
            unsafe { JSStringRelease(self.raw) };
        }
    }
}

impl fmt::Display for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // SAFETY: self.raw is a live string
        f.write_str(&unsafe { js_string_to_rust(self.raw) })
    }
}

impl fmt::Debug for JscString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JscString({:?})", self.to_string())
    }
}

/// Copy a borrowed JSStringRef into a Rust String.
///
/// Unpaired surrogates are replaced with U+FFFD.
///
/// # Safety
/// `js_str` must be null or a live JSStringRef
pub unsafe fn js_string_to_rust(js_str: JSStringRef) -> String {
    if js_str.is_null() {
        return String::new();
    }

    // SAFETY: js_str is live per caller contract; the character buffer is
    // valid for JSStringGetLength units while the string is alive
    unsafe {
        let len = JSStringGetLength(js_str);
        let chars = JSStringGetCharactersPtr(js_str);
        if len == 0 || chars.is_null() {
            return String::new();
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(chars, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_creation() {
        let s = JscString::new("hello");
        assert_eq!(s.to_string(), "hello");
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn test_empty_string() {
        let s = JscString::new("");
        assert!(s.is_empty());
        assert_eq!(s.to_string(), "");
    }

    #[test]
    fn test_interior_nul_survives() {
        let s = JscString::new("a\0b");
        assert_eq!(s.len(), 3);
        assert_eq!(s.to_string(), "a\0b");
    }

    #[test]
    fn test_length_counts_utf16_units() {
        let s = JscString::new("h\u{e9}llo \u{1F600}");
        assert_eq!(s.len(), 8);
        assert_eq!(s.to_string(), "h\u{e9}llo \u{1F600}");
    }

    #[test]
    fn test_adopt_null() {
        assert!(unsafe { JscString::adopt(std::ptr::null_mut()) }.is_none());
    }
}
