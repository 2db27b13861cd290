//! Command line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Player script deobfuscation tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Use a local player script instead of fetching one
    #[arg(long, global = true, value_name = "PATH")]
    pub player_file: Option<PathBuf>,

    /// Override User-Agent header
    #[arg(long, global = true, value_name = "USER_AGENT")]
    pub user_agent: Option<String>,

    /// HTTP timeout (e.g., 30s, 1m)
    #[arg(long, global = true, value_name = "DURATION", default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Time limit for one script execution
    #[arg(long, global = true, value_name = "DURATION", default_value = "5s")]
    pub sandbox_timeout: humantime::Duration,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet output (only errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Operations on a player script
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Print the signature timestamp
    Sts {
        /// Video URL or ID
        video: String,
    },

    /// Deobfuscate a signature
    Sig {
        /// Video URL or ID
        video: String,
        /// Obfuscated signature
        signature: String,
    },

    /// Build a stream URL from a signatureCipher value
    Cipher {
        /// Video URL or ID
        video: String,
        /// Form-encoded signatureCipher
        cipher: String,
    },

    /// Decrypt the throttling parameter of a stream URL
    N {
        /// Video URL or ID
        video: String,
        /// Stream URL carrying `n`
        url: String,
        /// Append a fresh playback nonce
        #[arg(long)]
        finalize: bool,
        /// Streaming token appended as `pot` (implies --finalize)
        #[arg(long, value_name = "TOKEN")]
        po_token: Option<String>,
    },

    /// Print the timestamp and the extracted functions
    Extract {
        /// Video URL or ID
        video: String,
    },
}

impl Command {
    /// Video URL or ID the command operates on
    pub fn video(&self) -> &str {
        match self {
            Command::Sts { video }
            | Command::Sig { video, .. }
            | Command::Cipher { video, .. }
            | Command::N { video, .. }
            | Command::Extract { video } => video,
        }
    }
}

impl Args {
    /// Get HTTP timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        self.timeout.into()
    }

    /// Get sandbox timeout as Duration
    pub fn sandbox_timeout_duration(&self) -> Duration {
        self.sandbox_timeout.into()
    }

    /// Get output verbosity level
    pub fn verbosity_level(&self) -> VerbosityLevel {
        if self.quiet {
            VerbosityLevel::Quiet
        } else if self.verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default log filter when `RUST_LOG` is unset
    pub fn log_level(&self) -> &'static str {
        match self.verbosity_level() {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "info",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

/// Output verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbosityLevel {
    /// Quiet (only errors)
    Quiet,
    /// Normal
    Normal,
    /// Verbose (debug info)
    Verbose,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ryt-player").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(
            parse(&["sts", "dQw4w9WgXcQ"]).command,
            Command::Sts {
                video: "dQw4w9WgXcQ".to_string()
            }
        );
        assert_eq!(
            parse(&["sig", "vid", "ABCD"]).command,
            Command::Sig {
                video: "vid".to_string(),
                signature: "ABCD".to_string()
            }
        );
        assert_eq!(
            parse(&["n", "vid", "https://host/v?n=abc", "--po-token", "tok"]).command,
            Command::N {
                video: "vid".to_string(),
                url: "https://host/v?n=abc".to_string(),
                finalize: false,
                po_token: Some("tok".to_string()),
            }
        );
    }

    #[test]
    fn test_command_video() {
        let args = parse(&["cipher", "https://youtu.be/dQw4w9WgXcQ", "s=AB&url=x"]);
        assert_eq!(args.command.video(), "https://youtu.be/dQw4w9WgXcQ");
    }

    #[test]
    fn test_default_values() {
        let args = parse(&["extract", "vid"]);
        assert_eq!(args.timeout_duration(), Duration::from_secs(30));
        assert_eq!(args.sandbox_timeout_duration(), Duration::from_secs(5));
        assert_eq!(args.player_file, None);
        assert_eq!(args.user_agent, None);
        assert!(!args.json);
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let args = parse(&[
            "sts",
            "vid",
            "--player-file",
            "/tmp/base.js",
            "--timeout",
            "1m",
            "--json",
        ]);
        assert_eq!(args.player_file, Some(PathBuf::from("/tmp/base.js")));
        assert_eq!(args.timeout_duration(), Duration::from_secs(60));
        assert!(args.json);
    }

    #[test]
    fn test_verbosity_level() {
        assert_eq!(parse(&["sts", "vid"]).verbosity_level(), VerbosityLevel::Normal);
        assert_eq!(parse(&["-q", "sts", "vid"]).verbosity_level(), VerbosityLevel::Quiet);

        let args = parse(&["sts", "vid", "--verbose"]);
        assert_eq!(args.verbosity_level(), VerbosityLevel::Verbose);
        assert_eq!(args.log_level(), "debug");
    }

    #[test]
    fn test_missing_subcommand_is_rejected() {
        assert!(Args::try_parse_from(["ryt-player"]).is_err());
        assert!(Args::try_parse_from(["ryt-player", "sig", "vid"]).is_err());
    }
}
