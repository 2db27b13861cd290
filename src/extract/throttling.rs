//! Throttling parameter (`n`) decryption function extraction

use super::patterns::{self, PatternLibrary, THROTTLING_BODY_TEMPLATE};
use super::{resolve_function_name, ExtractedFunction};
use crate::error::PlayerError;
use crate::script::{match_to_closing_brace, ScriptSandbox};
use tracing::debug;

/// Locate, isolate and validate the throttling decryption function
pub fn extract_throttling_function(
    script: &str,
    patterns: &PatternLibrary,
    sandbox: &dyn ScriptSandbox,
) -> Result<ExtractedFunction, PlayerError> {
    let name = resolve_function_name(script, &patterns.throttling_name)?;
    debug!("Throttling function is `{}`", name);

    let body = function_source(script, &name)?;
    sandbox.compile_or_fail(&body)?;
    Ok(ExtractedFunction { name, body })
}

/// Lexer first, then the `return x.join("")` tail regex
fn function_source(script: &str, name: &str) -> Result<String, PlayerError> {
    let anchor = format!("{}=function", name);
    match match_to_closing_brace(script, &anchor) {
        Ok(rest) => return Ok(format!("var {}{};", anchor, rest)),
        Err(e) => debug!("Lexer missed `{}`: {}, trying regex", anchor, e),
    }

    let captures = patterns::instantiate(THROTTLING_BODY_TEMPLATE, name)?
        .captures(script)
        .ok_or(PlayerError::PatternNotFound {
            kind: "throttling function body",
        })?;
    Ok(format!("function {}{}", name, &captures[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::V8Sandbox;

    const ARRAY_PLAYER: &str = r#"var SDa=[Wma],x=2;
Wma=function(a){var b=a.split(""),c={VVF2xyZLVRZZxHXZ:"iHywZkMipkszqA"};if(c[a])return c[a];try{b.reverse()}catch(d){return "err_"+a}return b.join("")};
g.D&&(b="nn"[+a.D],WL(a),c=a.j[b]||null)&&(c=SDa[0](c),a.set(b,c))"#;

    #[test]
    fn test_extract_through_array() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();

        let function = extract_throttling_function(ARRAY_PLAYER, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "Wma");
        assert!(function.body.starts_with("var Wma=function(a){"));
        assert!(function.body.ends_with("return b.join(\"\")};"));

        assert_eq!(
            function.run(&sandbox, "VVF2xyZLVRZZxHXZ").unwrap(),
            "iHywZkMipkszqA"
        );
        assert_eq!(function.run(&sandbox, "abc").unwrap(), "cba");
    }

    #[test]
    fn test_earliest_matcher_selected() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();

        // Only the `.get("n")` shape is present, naming a different function
        let direct = r#"Wma=function(a){return a+"-w"};Dea=function(a){return a+"-d"};b=a.get("n"))&&(b=Dea(b),a.set("n",b))"#;
        let function = extract_throttling_function(direct, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "Dea");

        // Adding an earlier shape takes precedence
        let array_call = &ARRAY_PLAYER[ARRAY_PLAYER.find("g.D").unwrap()..];
        let both = format!("{};var SDa=[Wma];{}", direct, array_call);
        let function = extract_throttling_function(&both, &patterns, &sandbox).unwrap();
        assert_eq!(function.name, "Wma");
    }

    #[test]
    fn test_regex_fallback() {
        let js = r#"Xy=function;var Xy=function(a){var b=a.split("");try{b.reverse()}catch(c){}return b.join("")};"#;
        let source = function_source(js, "Xy").unwrap();
        assert_eq!(
            source,
            r#"function Xy(a){var b=a.split("");try{b.reverse()}catch(c){}return b.join("")};"#
        );
    }

    #[test]
    fn test_index_out_of_bounds() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let js = ARRAY_PLAYER.replace("SDa[0]", "SDa[4]");

        let result = extract_throttling_function(&js, &patterns, &sandbox);
        assert!(matches!(
            result,
            Err(PlayerError::IndirectionOutOfBounds { len: 1, .. })
        ));
    }

    #[test]
    fn test_missing_body() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();
        let js = r#"b=a.get("n"))&&(b=Gone(b),a.set("n",b))"#;

        let result = extract_throttling_function(js, &patterns, &sandbox);
        assert!(matches!(
            result,
            Err(PlayerError::PatternNotFound {
                kind: "throttling function body"
            })
        ));
    }

    #[test]
    fn test_no_name_pattern() {
        let patterns = PatternLibrary::new().unwrap();
        let sandbox = V8Sandbox::new();

        let result = extract_throttling_function("var a=function(b){return b};", &patterns, &sandbox);
        assert!(matches!(
            result,
            Err(PlayerError::PatternNotFound {
                kind: "throttling function name"
            })
        ));
    }
}
