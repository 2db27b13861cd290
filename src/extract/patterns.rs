//! Ordered matcher tables for locating values in player scripts
//!
//! Each target kind owns a list of matchers tried strictly in order; the
//! first one that matches wins. The order encodes which obfuscation variant
//! takes precedence, so new variants are appended (or inserted) as table
//! entries rather than as new control flow.

use crate::error::PlayerError;
use regex::{Captures, Regex};
use tracing::debug;

/// How the capture groups of a matcher are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// Group 1 is the value
    Direct,
    /// Group 1 names an array of function names, optional group 2 is the index
    ArrayElement,
    /// Group 1 is the value, the listed groups must capture identical text
    DirectWithEqualGroups(&'static [usize]),
}

impl Capture {
    fn required_groups(&self) -> usize {
        match self {
            Capture::Direct => 1,
            Capture::ArrayElement => 2,
            Capture::DirectWithEqualGroups(groups) => {
                groups.iter().copied().max().unwrap_or(1).max(1)
            }
        }
    }
}

/// Static description of one matcher
#[derive(Debug, Clone, Copy)]
pub struct MatcherSpec {
    pub label: &'static str,
    pub pattern: &'static str,
    pub capture: Capture,
}

/// What a matcher found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternMatch {
    Value(String),
    Indexed { array: String, index: String },
}

/// Compiled matcher
#[derive(Debug, Clone)]
pub struct Matcher {
    spec: MatcherSpec,
    regex: Regex,
}

impl Matcher {
    /// Compile a matcher, checking that the pattern has the groups its capture needs
    pub fn new(spec: MatcherSpec) -> Result<Self, PlayerError> {
        let regex = Regex::new(spec.pattern)?;
        // captures_len counts the implicit whole-match group
        if regex.captures_len() <= spec.capture.required_groups() {
            return Err(PlayerError::RegexError(regex::Error::Syntax(format!(
                "matcher `{}` needs {} capture groups",
                spec.label,
                spec.capture.required_groups()
            ))));
        }
        Ok(Self { spec, regex })
    }

    pub fn label(&self) -> &'static str {
        self.spec.label
    }

    /// First match in `text` that satisfies the capture rules
    pub fn find(&self, text: &str) -> Option<PatternMatch> {
        self.regex
            .captures_iter(text)
            .find_map(|caps| self.interpret(&caps))
    }

    fn interpret(&self, caps: &Captures<'_>) -> Option<PatternMatch> {
        let value = caps.get(1)?.as_str().to_string();
        match self.spec.capture {
            Capture::Direct => Some(PatternMatch::Value(value)),
            Capture::ArrayElement => match caps.get(2) {
                Some(index) => Some(PatternMatch::Indexed {
                    array: value,
                    index: index.as_str().to_string(),
                }),
                None => Some(PatternMatch::Value(value)),
            },
            Capture::DirectWithEqualGroups(groups) => {
                let mut texts = groups.iter().map(|group| caps.get(*group).map(|m| m.as_str()));
                let first = texts.next()??;
                texts
                    .all(|text| text == Some(first))
                    .then_some(PatternMatch::Value(value))
            }
        }
    }
}

/// Ordered matchers for one target kind
#[derive(Debug, Clone)]
pub struct MatcherList {
    kind: &'static str,
    matchers: Vec<Matcher>,
}

impl MatcherList {
    pub fn new(kind: &'static str, specs: &[MatcherSpec]) -> Result<Self, PlayerError> {
        let matchers = specs
            .iter()
            .map(|spec| Matcher::new(*spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { kind, matchers })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Append a matcher with the lowest precedence
    pub fn push(&mut self, spec: MatcherSpec) -> Result<(), PlayerError> {
        self.matchers.push(Matcher::new(spec)?);
        Ok(())
    }

    /// Insert a matcher at `position` in the precedence order
    pub fn insert(&mut self, position: usize, spec: MatcherSpec) -> Result<(), PlayerError> {
        let position = position.min(self.matchers.len());
        self.matchers.insert(position, Matcher::new(spec)?);
        Ok(())
    }

    /// Try every matcher in order, returning the position and result of the first hit
    pub fn find_first(&self, text: &str) -> Result<(usize, PatternMatch), PlayerError> {
        for (position, matcher) in self.matchers.iter().enumerate() {
            if let Some(found) = matcher.find(text) {
                debug!(
                    "{} matched by #{} ({})",
                    self.kind,
                    position + 1,
                    matcher.label()
                );
                return Ok((position, found));
            }
        }

        debug!("No {} matcher out of {} matched", self.kind, self.matchers.len());
        Err(PlayerError::PatternNotFound { kind: self.kind })
    }
}

pub const TIMESTAMP_MATCHERS: &[MatcherSpec] = &[MatcherSpec {
    label: "signatureTimestamp assignment",
    pattern: r"signatureTimestamp[=:](\d+)",
    capture: Capture::Direct,
}];

pub const SIGNATURE_NAME_MATCHERS: &[MatcherSpec] = &[
    MatcherSpec {
        label: "set with encodeURIComponent",
        pattern: r"\b[cs]s\s*&&\s*[adf]\.set\([^,]+\s*,\s*encodeURIComponent\s*\(\s*([a-zA-Z0-9$]+)\(",
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "assignment from decoded h.s",
        pattern: r"\bm=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(h\.s\)\)",
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "assignment from decoded c",
        pattern: r"\bc&&\(c=([a-zA-Z0-9$]{2,})\(decodeURIComponent\(c\)\)",
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "split on function parameter a",
        pattern: r#"(?:\b|[^a-zA-Z0-9$])([a-zA-Z0-9$]{2,})\s*=\s*function\(\s*a\s*\)\s*\{\s*a\s*=\s*a\.split\(\s*""\s*\)"#,
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "split on own parameter",
        pattern: r#"([\w$]+)\s*=\s*function\((\w+)\)\{\s*(\w+)=\s*(\w+)\.split\(""\)\s*;"#,
        capture: Capture::DirectWithEqualGroups(&[2, 3, 4]),
    },
    MatcherSpec {
        label: "set with optional encodeURIComponent",
        pattern: r"\bc\s*&&\s*d\.set\([^,]+\s*,\s*(?:encodeURIComponent\s*\()?\s*([a-zA-Z0-9$]+)\(",
        capture: Capture::Direct,
    },
];

pub const THROTTLING_NAME_MATCHERS: &[MatcherSpec] = &[
    MatcherSpec {
        label: "nn lookup with null fallback",
        pattern: r#"[a-zA-Z0-9$_]="nn"\[\+[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\],[a-zA-Z0-9$_]+\([a-zA-Z0-9$_]+\),[a-zA-Z0-9$_]+=[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\[[a-zA-Z0-9$_]+\]\|\|null\).+?\|\|([a-zA-Z0-9$_]+)\(""\)"#,
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "nn lookup with null fallback into array",
        pattern: r#"[a-zA-Z0-9$_]="nn"\[\+[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\],[a-zA-Z0-9$_]+\([a-zA-Z0-9$_]+\),[a-zA-Z0-9$_]+=[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\[[a-zA-Z0-9$_]+\]\|\|null\)&&\([a-zA-Z0-9$_]+=([a-zA-Z0-9$_]+)\[(\d+)\]"#,
        capture: Capture::ArrayElement,
    },
    MatcherSpec {
        label: "nn lookup through get",
        pattern: r#"[a-zA-Z0-9$_]="nn"\[\+[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\],[a-zA-Z0-9$_]+=[a-zA-Z0-9$_]+\.get\([a-zA-Z0-9$_]+\)\).+?\|\|([a-zA-Z0-9$_]+)\(""\)"#,
        capture: Capture::Direct,
    },
    MatcherSpec {
        label: "nn lookup through get into array",
        pattern: r#"[a-zA-Z0-9$_]="nn"\[\+[a-zA-Z0-9$_]+\.[a-zA-Z0-9$_]+\],[a-zA-Z0-9$_]+=[a-zA-Z0-9$_]+\.get\([a-zA-Z0-9$_]+\)\)&&\([a-zA-Z0-9$_]+=([a-zA-Z0-9$_]+)\[(\d+)\]"#,
        capture: Capture::ArrayElement,
    },
    MatcherSpec {
        label: "fromCharCode(110) lookup",
        pattern: r"\([a-zA-Z0-9$_]=String\.fromCharCode\(110\),[a-zA-Z0-9$_]=[a-zA-Z0-9$_]\.get\([a-zA-Z0-9$_]\)\)&&\([a-zA-Z0-9$_]=([a-zA-Z0-9$_]+)(?:\[(\d+)\])?\([a-zA-Z0-9$_]\)",
        capture: Capture::ArrayElement,
    },
    MatcherSpec {
        label: "get(\"n\") lookup",
        pattern: r#"\.get\("n"\)\)&&\([a-zA-Z0-9$_]=([a-zA-Z0-9$_]+)(?:\[(\d+)\])?\([a-zA-Z0-9$_]\)"#,
        capture: Capture::ArrayElement,
    },
];

/// Regex fallback for the signature function body; `{name}` is substituted
pub const SIGNATURE_BODY_TEMPLATE: &str = r"(?:function\s+{name}|[{;,]\s*{name}\s*=\s*function|var\s+{name}\s*=\s*function)\s*\(([^)]*)\)\s*\{([^}]+?)\}";

/// Helper object referenced from inside the signature function
pub const HELPER_REFERENCE_PATTERN: &str = r";\s*([A-Za-z0-9_$]{2,})\.[A-Za-z0-9_$]+\(";

/// Regex fallback for the helper object literal
pub const HELPER_BODY_TEMPLATE: &str = r"(var {name}=\{[\s\S]+?\}\};)";

/// Regex fallback for the throttling function body
pub const THROTTLING_BODY_TEMPLATE: &str =
    r#"(?:^|[^\w$.]){name}=\s*function(\s*\([\S\s]*?\}\s*return [\w$]+?\.join\(""\)\s*\};)"#;

/// Declaration of an array of function names
pub const FUNCTION_ARRAY_TEMPLATE: &str = r"var {name}\s*=\s*\[(.+?)\][;,]";

/// Build a regex from `template` with every `{name}` replaced by the escaped identifier
pub fn instantiate(template: &str, name: &str) -> Result<Regex, PlayerError> {
    Ok(Regex::new(&template.replace("{name}", &regex::escape(name)))?)
}

/// Every ordered matcher table used by the extractors
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    pub timestamp: MatcherList,
    pub signature_name: MatcherList,
    pub throttling_name: MatcherList,
}

impl PatternLibrary {
    /// Library with the built-in tables
    pub fn new() -> Result<Self, PlayerError> {
        Ok(Self {
            timestamp: MatcherList::new("signature timestamp", TIMESTAMP_MATCHERS)?,
            signature_name: MatcherList::new("signature function name", SIGNATURE_NAME_MATCHERS)?,
            throttling_name: MatcherList::new(
                "throttling function name",
                THROTTLING_NAME_MATCHERS,
            )?,
        })
    }
}
