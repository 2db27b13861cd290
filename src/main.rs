//! Main entry point for the ryt-player CLI

use anyhow::Context;
use clap::Parser;
use ryt_player::cli::output::CommandOutput;
use ryt_player::cli::{Args, Command, OutputFormatter};
use ryt_player::player::{
    finalize_stream_url, generate_content_playback_nonce, ClientVariant, FileScriptSource,
    HttpScriptSource, HttpSourceConfig, PlayerManager, PoTokenResult, StaticPoTokenProvider,
};
use ryt_player::script::SandboxLimits;
use ryt_player::utils::url::{contains_n_param, identity_from_input};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.log_level())?;
    debug!("Starting ryt-player with args: {:?}", args);

    let formatter = OutputFormatter::new(args.verbosity_level()).with_json(args.json);

    let manager = build_manager(&args, &formatter)?;
    match run(&manager, &args.command, &formatter) {
        Ok(output) => {
            formatter.print(&output)?;
            formatter.print_cache_stats(&manager.cache_stats());
            Ok(())
        }
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            std::process::exit(1);
        }
    }
}

/// Build the manager from command line options
fn build_manager(args: &Args, formatter: &OutputFormatter) -> anyhow::Result<PlayerManager> {
    let limits = SandboxLimits::default().with_timeout(args.sandbox_timeout_duration());
    let mut builder = PlayerManager::builder().with_limits(limits);

    if let Command::N {
        po_token: Some(token),
        ..
    } = &args.command
    {
        let token = PoTokenResult::new(String::new(), token.clone());
        builder = builder.with_po_token_provider(
            StaticPoTokenProvider::new().with_token(ClientVariant::Web, token),
        );
    }

    let builder = match &args.player_file {
        Some(path) => {
            formatter.info(&format!("Using local player script {}", path.display()));
            builder.with_source(FileScriptSource::new(path))
        }
        None => {
            let config = HttpSourceConfig {
                timeout: args.timeout_duration(),
                user_agent: args.user_agent.clone(),
                ..HttpSourceConfig::default()
            };
            builder.with_source(HttpScriptSource::with_config(config)?)
        }
    };

    Ok(builder.build()?)
}

/// Execute one subcommand
fn run(
    manager: &PlayerManager,
    command: &Command,
    formatter: &OutputFormatter,
) -> anyhow::Result<CommandOutput> {
    let identity = identity_from_input(command.video())?;

    let output = match command {
        Command::Sts { .. } => CommandOutput::Timestamp {
            timestamp: manager
                .signature_timestamp(&identity)
                .context("Failed to extract signature timestamp")?,
            identity,
        },
        Command::Sig { signature, .. } => CommandOutput::Signature {
            signature: manager
                .deobfuscate_signature(&identity, signature)
                .context("Failed to deobfuscate signature")?,
            identity,
        },
        Command::Cipher { cipher, .. } => CommandOutput::StreamUrl {
            url: manager
                .deobfuscate_cipher_url(&identity, cipher)
                .context("Failed to deobfuscate signature cipher")?,
            identity,
        },
        Command::N {
            url,
            finalize,
            po_token,
            ..
        } => {
            if !contains_n_param(url) {
                formatter.warning("URL has no throttling parameter, leaving it unchanged");
            }
            let mut url = manager
                .decrypt_throttling_parameter(url, &identity)
                .context("Failed to decrypt throttling parameter")?;
            if *finalize || po_token.is_some() {
                let cpn = generate_content_playback_nonce();
                let pot = manager.streaming_po_token(ClientVariant::Web, &identity);
                url = finalize_stream_url(&url, &cpn, pot.as_deref());
            }
            CommandOutput::StreamUrl { identity, url }
        }
        Command::Extract { .. } => CommandOutput::Functions {
            timestamp: manager
                .signature_timestamp(&identity)
                .context("Failed to extract signature timestamp")?,
            signature_function: manager
                .signature_function(&identity)
                .context("Failed to extract signature function")?
                .as_ref()
                .clone(),
            throttling_function: manager
                .throttling_function(&identity)
                .context("Failed to extract throttling function")?
                .as_ref()
                .clone(),
            identity,
        },
    };

    Ok(output)
}

/// Initialize logging system
fn init_logging(default_level: &str) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()?;

    Ok(())
}
