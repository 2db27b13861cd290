//! Extraction of the timestamp and transformation functions from player scripts

pub mod patterns;
pub mod signature;
pub mod throttling;
pub mod timestamp;

pub use patterns::{Capture, MatcherList, MatcherSpec, PatternLibrary, PatternMatch};
pub use signature::extract_signature_function;
pub use throttling::extract_throttling_function;
pub use timestamp::extract_signature_timestamp;

use crate::error::PlayerError;
use crate::script::ScriptSandbox;
use serde::Serialize;
use tracing::debug;

/// Self-contained script defining a callable named `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFunction {
    pub name: String,
    pub body: String,
}

impl ExtractedFunction {
    /// Call the function on `input` inside `sandbox`
    pub fn run(&self, sandbox: &dyn ScriptSandbox, input: &str) -> Result<String, PlayerError> {
        sandbox.run(&self.body, &self.name, &[input])
    }
}

/// Run `matchers` and follow array indirection to a bare function name
pub(crate) fn resolve_function_name(
    script: &str,
    matchers: &MatcherList,
) -> Result<String, PlayerError> {
    match matchers.find_first(script)? {
        (_, PatternMatch::Value(name)) => Ok(name),
        (_, PatternMatch::Indexed { array, index }) => resolve_array_element(script, &array, &index),
    }
}

/// Look up `array[index]` in a `var array=[a,b,c]` declaration
pub(crate) fn resolve_array_element(
    script: &str,
    array: &str,
    index: &str,
) -> Result<String, PlayerError> {
    let declaration = patterns::instantiate(patterns::FUNCTION_ARRAY_TEMPLATE, array)?;
    let captures = declaration
        .captures(script)
        .ok_or(PlayerError::PatternNotFound {
            kind: "function name array",
        })?;
    let names: Vec<&str> = captures[1].split(',').map(str::trim).collect();

    let out_of_bounds = || PlayerError::IndirectionOutOfBounds {
        array: array.to_string(),
        index: index.to_string(),
        len: names.len(),
    };
    let position: usize = index.parse().map_err(|_| out_of_bounds())?;
    let name = names
        .get(position)
        .filter(|name| !name.is_empty())
        .ok_or_else(out_of_bounds)?;

    debug!("Resolved {}[{}] to `{}`", array, position, name);
    Ok(name.to_string())
}
