//! Output formatting for command results

use crate::cli::args::VerbosityLevel;
use crate::extract::ExtractedFunction;
use crate::utils::cache::CacheStats;
use colored::Colorize;
use serde::Serialize;

/// Result of one CLI command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutput {
    Timestamp {
        identity: String,
        timestamp: String,
    },
    Signature {
        identity: String,
        signature: String,
    },
    StreamUrl {
        identity: String,
        url: String,
    },
    Functions {
        identity: String,
        timestamp: String,
        signature_function: ExtractedFunction,
        throttling_function: ExtractedFunction,
    },
}

/// Output formatter for ryt-player
pub struct OutputFormatter {
    verbosity: VerbosityLevel,
    json: bool,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            json: false,
        }
    }

    /// Emit results as JSON
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Render a command result
    ///
    /// Quiet mode prints bare values so the output can be piped.
    pub fn render(&self, output: &CommandOutput) -> Result<String, serde_json::Error> {
        if self.json {
            return serde_json::to_string_pretty(output);
        }

        let quiet = self.verbosity == VerbosityLevel::Quiet;
        let text = match output {
            CommandOutput::Timestamp { timestamp, .. } if quiet => timestamp.clone(),
            CommandOutput::Signature { signature, .. } if quiet => signature.clone(),
            CommandOutput::StreamUrl { url, .. } if quiet => url.clone(),
            CommandOutput::Timestamp {
                identity,
                timestamp,
            } => format!("{} {}\n{} {}", "🎬".bold(), identity, "sts:".cyan(), timestamp),
            CommandOutput::Signature {
                identity,
                signature,
            } => format!("{} {}\n{} {}", "🎬".bold(), identity, "sig:".cyan(), signature),
            CommandOutput::StreamUrl { identity, url } => {
                format!("{} {}\n{} {}", "🎬".bold(), identity, "url:".cyan(), url)
            }
            CommandOutput::Functions {
                identity,
                timestamp,
                signature_function,
                throttling_function,
            } => {
                let mut text = String::new();
                if !quiet {
                    text.push_str(&format!("{} {}\n", "🎬".bold(), identity));
                    text.push_str(&format!("{} {}\n", "sts:".cyan(), timestamp));
                }
                text.push_str(&format_function("signature", signature_function, quiet));
                text.push('\n');
                text.push_str(&format_function("throttling", throttling_function, quiet));
                text
            }
        };
        Ok(text)
    }

    /// Print a command result to stdout
    pub fn print(&self, output: &CommandOutput) -> Result<(), serde_json::Error> {
        println!("{}", self.render(output)?);
        Ok(())
    }

    /// Print cache statistics in verbose mode
    pub fn print_cache_stats(&self, stats: &CacheStats) {
        if self.verbosity != VerbosityLevel::Verbose || self.json {
            return;
        }

        eprintln!(
            "{} scripts={} timestamps={} signature={} throttling={} parameters={} failures={}",
            "cache".dimmed(),
            stats.script_entries,
            stats.timestamp_entries,
            stats.signature_function_entries,
            stats.throttling_function_entries,
            stats.throttling_parameter_entries,
            stats.failure_entries
        );
    }

    /// Print info message
    pub fn info(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "info".blue().bold(), message);
        }
    }

    /// Print warning message
    pub fn warning(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            eprintln!("{} {}", "warning".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error".red().bold(), message);
    }
}

fn format_function(label: &str, function: &ExtractedFunction, quiet: bool) -> String {
    if quiet {
        return function.body.clone();
    }
    format!(
        "{} {} ({})\n{}",
        "fn".green().bold(),
        function.name,
        label,
        function.body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamp() -> CommandOutput {
        CommandOutput::Timestamp {
            identity: "vid".to_string(),
            timestamp: "19950".to_string(),
        }
    }

    #[test]
    fn test_render_quiet_prints_bare_value() {
        let formatter = OutputFormatter::new(VerbosityLevel::Quiet);
        assert_eq!(formatter.render(&timestamp()).unwrap(), "19950");

        let url = CommandOutput::StreamUrl {
            identity: "vid".to_string(),
            url: "https://host/v?n=abc".to_string(),
        };
        assert_eq!(formatter.render(&url).unwrap(), "https://host/v?n=abc");
    }

    #[test]
    fn test_render_normal_includes_identity() {
        colored::control::set_override(false);
        let formatter = OutputFormatter::new(VerbosityLevel::Normal);
        let text = formatter.render(&timestamp()).unwrap();
        assert!(text.contains("vid"));
        assert!(text.ends_with("sts: 19950"));
    }

    #[test]
    fn test_render_json() {
        let formatter = OutputFormatter::new(VerbosityLevel::Normal).with_json(true);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.render(&timestamp()).unwrap()).unwrap();
        assert_eq!(json["kind"], "timestamp");
        assert_eq!(json["timestamp"], "19950");
    }

    #[test]
    fn test_render_functions() {
        let functions = CommandOutput::Functions {
            identity: "vid".to_string(),
            timestamp: "1".to_string(),
            signature_function: ExtractedFunction {
                name: "sig".to_string(),
                body: "var sig=function(a){return a};".to_string(),
            },
            throttling_function: ExtractedFunction {
                name: "thr".to_string(),
                body: "var thr=function(a){return a};".to_string(),
            },
        };

        let quiet = OutputFormatter::new(VerbosityLevel::Quiet);
        assert_eq!(
            quiet.render(&functions).unwrap(),
            "var sig=function(a){return a};\nvar thr=function(a){return a};"
        );

        let json = OutputFormatter::new(VerbosityLevel::Quiet).with_json(true);
        let value: serde_json::Value =
            serde_json::from_str(&json.render(&functions).unwrap()).unwrap();
        assert_eq!(value["signature_function"]["name"], "sig");
        assert_eq!(value["throttling_function"]["name"], "thr");
    }

    #[test]
    fn test_messages_do_not_panic() {
        let formatter = OutputFormatter::new(VerbosityLevel::Verbose);
        formatter.info("info");
        formatter.warning("warning");
        formatter.error("error");
        formatter.print_cache_stats(&CacheStats::default());
    }
}
