//! Signature deobfuscation function extraction

use super::patterns::{
    self, PatternLibrary, HELPER_BODY_TEMPLATE, HELPER_REFERENCE_PATTERN, SIGNATURE_BODY_TEMPLATE,
};
use super::{resolve_function_name, ExtractedFunction};
use crate::error::PlayerError;
use crate::script::{match_to_closing_brace, LexError, ScriptSandbox};
use regex::Regex;
use tracing::debug;

/// Locate, isolate and validate the signature function
pub fn extract_signature_function(
    script: &str,
    patterns: &PatternLibrary,
    sandbox: &dyn ScriptSandbox,
) -> Result<ExtractedFunction, PlayerError> {
    let name = resolve_function_name(script, &patterns.signature_name)?;
    debug!("Signature function is `{}`", name);

    let function = function_source(script, &name)?;
    let body = match helper_source(script, &function)? {
        Some(helper) => format!("{}\n{}", helper, function),
        None => function,
    };

    sandbox.compile_or_fail(&body)?;
    Ok(ExtractedFunction { name, body })
}

/// Definition of `name` as a `var` statement
fn function_source(script: &str, name: &str) -> Result<String, PlayerError> {
    let assigned = format!("{}=function", name);
    match match_to_closing_brace(script, &assigned) {
        Ok(rest) => return Ok(format!("var {}{};", assigned, rest)),
        Err(e) => debug!("Lexer missed `{}`: {}", assigned, e),
    }

    let declared = format!("function {}", name);
    match match_to_closing_brace(script, &declared) {
        Ok(rest) => return Ok(format!("var {}=function{};", name, rest)),
        Err(e) => debug!("Lexer missed `{}`: {}", declared, e),
    }

    debug!("Falling back to regex for signature function body");
    let captures = patterns::instantiate(SIGNATURE_BODY_TEMPLATE, name)?
        .captures(script)
        .ok_or(PlayerError::PatternNotFound {
            kind: "signature function body",
        })?;
    Ok(format!(
        "var {}=function({}){{{}}};",
        name, &captures[1], &captures[2]
    ))
}

/// Helper object the function calls into, if one is declared in the script
fn helper_source(script: &str, function: &str) -> Result<Option<String>, PlayerError> {
    let reference = Regex::new(HELPER_REFERENCE_PATTERN)?;
    for captures in reference.captures_iter(function) {
        let candidate = &captures[1];
        if let Some(helper) = helper_object(script, candidate)? {
            debug!("Signature helper object is `{}`", candidate);
            return Ok(Some(helper));
        }
    }
    Ok(None)
}

fn helper_object(script: &str, name: &str) -> Result<Option<String>, PlayerError> {
    let anchor = format!("var {}=", name);
    match match_to_closing_brace(script, &anchor) {
        Ok(object) => return Ok(Some(format!("{}{};", anchor, object))),
        Err(LexError::AnchorNotFound(_)) => return Ok(None),
        Err(e) => debug!("Lexer missed helper `{}`: {}", name, e),
    }

    let helper = patterns::instantiate(HELPER_BODY_TEMPLATE, name)?
        .captures(script)
        .map(|captures| captures[1].to_string());
    Ok(helper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::V8Sandbox;

    const HELPER_PLAYER: &str = r#"var x=1;var XY={ab:function(a){a.reverse()},cd:function(a,b){a.splice(0,b)},ef:function(a,b){var c=a[0];a[0]=a[b%a.length];a[b%a.length]=c}};
Ghi=function(a){a=a.split("");XY.cd(a,1);XY.ab(a,2);return a.join("")};
var y=function(){c&&d.set(b,encodeURIComponent(Ghi(decodeURIComponent(c))))};"#;

    #[test]
    fn test_extract_with_helper() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();

        let function = extract_signature_function(HELPER_PLAYER, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "Ghi");
        assert!(function.body.starts_with("var XY={"));
        assert!(function.body.contains("var Ghi=function(a){"));

        assert_eq!(function.run(&sandbox, "ABCDE").unwrap(), "EDCB");
    }

    #[test]
    fn test_extract_reverse_function() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let js = r#"xyz=function(a){a=a.split("");return a.reverse().join("")};c&&d.set(b,encodeURIComponent(xyz(c)));"#;

        let function = extract_signature_function(js, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "xyz");
        assert_eq!(function.run(&sandbox, "ABCD").unwrap(), "DCBA");
    }

    #[test]
    fn test_function_declaration_form() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let js = r#"function Qr(a){a=a.split("");a.push("!");return a.join("")}c&&d.set(b,Qr(c));"#;

        let function = extract_signature_function(js, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "Qr");
        assert_eq!(function.run(&sandbox, "ab").unwrap(), "ab!");
    }

    #[test]
    fn test_regex_fallback_when_lexer_fails() {
        // The bare assignment is found first and has no block
        let js = "c&&d.set(b,Mn(c));Mn=function;var Mn=function(a){return a+a};";
        let source = function_source(js, "Mn").unwrap();
        assert_eq!(source, "var Mn=function(a){return a+a};");
    }

    #[test]
    fn test_undeclared_helper_is_skipped() {
        let function = r#"var f=function(a){a=a.split("");ZZ.q(a);return a.join("")};"#;
        assert_eq!(helper_source("var other=1;", function).unwrap(), None);
    }

    #[test]
    fn test_missing_name() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let result = extract_signature_function("var a=1;", &patterns, &sandbox);

        assert!(matches!(
            result,
            Err(PlayerError::PatternNotFound {
                kind: "signature function name"
            })
        ));
    }

    #[test]
    fn test_missing_body() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let result = extract_signature_function("c&&d.set(b,Nope(c));", &patterns, &sandbox);

        assert!(matches!(
            result,
            Err(PlayerError::PatternNotFound {
                kind: "signature function body"
            })
        ));
    }

    #[test]
    fn test_uncompilable_body_is_rejected() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let js = r#"c&&d.set(b,Bad(c));Bad=function(a){return a..b};"#;

        let result = extract_signature_function(js, &patterns, &sandbox);
        assert!(matches!(result, Err(PlayerError::CompileError(_))));
    }
}
