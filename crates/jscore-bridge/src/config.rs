//! Bridge configuration and per-call evaluation options.

use serde::Deserialize;

use crate::error::JscResult;
use crate::object::JsObject;

/// Settings shared by every operation on one bridge.
///
/// Deserializable so hosts can keep it next to their own settings; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Source URL used when a call does not name one.
    /// Default: none
    pub default_source_url: Option<String>,

    /// Starting line used when a call does not name one.
    /// Default: 1
    pub default_starting_line: i32,

    /// Log script exceptions at `warn` instead of `debug`.
    /// Default: false
    pub trace_exceptions: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_source_url: None,
            default_starting_line: 1,
            trace_exceptions: false,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document such as `{"defaultSourceUrl": "app.js"}`.
    pub fn from_json(json: &str) -> JscResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn default_source_url(mut self, url: impl Into<String>) -> Self {
        self.default_source_url = Some(url.into());
        self
    }

    pub fn default_starting_line(mut self, line: i32) -> Self {
        self.default_starting_line = line;
        self
    }

    pub fn trace_exceptions(mut self, enabled: bool) -> Self {
        self.trace_exceptions = enabled;
        self
    }
}

/// Optional inputs for `evaluate_script_with` and `check_script_syntax_with`.
///
/// Unset fields fall back to the bridge's [`BridgeConfig`].
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions<'a> {
    /// Binds `this` for the top-level script. Ignored by syntax checks.
    pub this_object: Option<&'a JsObject>,
    /// Tag used in stack traces and error locations.
    pub source_url: Option<String>,
    /// Line number of the script's first line.
    pub starting_line_number: Option<i32>,
}

impl<'a> EvaluateOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn this_object(mut self, this: &'a JsObject) -> Self {
        self.this_object = Some(this);
        self
    }

    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn starting_line_number(mut self, line: i32) -> Self {
        self.starting_line_number = Some(line);
        self
    }

    /// Resolve against the bridge defaults: (source URL, starting line)
    pub(crate) fn resolve<'c>(&'c self, config: &'c BridgeConfig) -> (Option<&'c str>, i32) {
        let url = self
            .source_url
            .as_deref()
            .or(config.default_source_url.as_deref());
        let line = self
            .starting_line_number
            .unwrap_or(config.default_starting_line);
        (url, line)
    }
}
