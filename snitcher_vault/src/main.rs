//! Snitcher - CLI
//!
//! Command-line front end for the Snitcher core.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use snitcher_vault::{
    display_timestamp, AuthOutcome, BiometricAuthenticator, BiometricStatus, FixedAuthenticator,
    LoginOutcome, PromptInfo, Snitcher, SnitcherConfig, VaultState,
};

#[derive(Parser)]
#[command(name = "snitcher")]
#[command(version = snitcher_vault::VERSION)]
#[command(about = "Snitcher - biometric-gated login and sealed animal-welfare reports")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, default_value = "snitcher.json")]
    config: PathBuf,

    /// Data directory, overrides the configuration
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign up (first run) or log in
    Login {
        /// Email address, required to sign up
        #[arg(short, long, default_value = "")]
        email: String,

        /// Treat the authentication prompt as confirmed
        #[arg(short, long)]
        yes: bool,
    },

    /// Seal and record a report
    Report {
        /// Report category
        #[arg(short, long)]
        category: String,

        /// Report text
        text: String,
    },

    /// Decrypt a saved report
    ReadReport {
        /// Report ID
        id: String,
    },

    /// Check that a file is a JPEG
    ValidateImage {
        /// Image path
        path: PathBuf,
    },

    /// List report categories
    Categories,

    /// Show login and key state
    Status,

    /// Clear the cache directory
    PurgeCache,
}

/// Terminal stand-in for the biometric prompt
struct ConsoleAuthenticator;

impl BiometricAuthenticator for ConsoleAuthenticator {
    fn status(&self) -> BiometricStatus {
        BiometricStatus::NoHardware
    }

    fn authenticate(&self, prompt: &PromptInfo) -> AuthOutcome {
        print!("🔐 {} - {} [y/N]: ", prompt.title, prompt.subtitle);
        if let Err(e) = io::stdout().flush() {
            return AuthOutcome::Error {
                code: 1,
                message: e.to_string(),
            };
        }

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) if answer.trim().eq_ignore_ascii_case("y") => AuthOutcome::Succeeded,
            Ok(_) => AuthOutcome::Failed,
            Err(e) => AuthOutcome::Error {
                code: 1,
                message: e.to_string(),
            },
        }
    }
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<SnitcherConfig> {
    let config = SnitcherConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    Ok(match &cli.data_dir {
        Some(dir) => SnitcherConfig {
            data_dir: dir.clone(),
            cache_dir: dir.join("cache"),
            ..config
        },
        None => config,
    })
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;

    if let Commands::Categories = cli.command {
        for (i, category) in snitcher_vault::REPORT_CATEGORIES.iter().enumerate() {
            println!("{:>2}. {}", i + 1, category);
        }
        return Ok(());
    }

    let app = Snitcher::open(config).context("opening Snitcher data directory")?;

    match cli.command {
        Commands::Login { email, yes } => {
            let result = if yes {
                app.login(&email, &FixedAuthenticator::succeeding())
            } else {
                app.login(&email, &ConsoleAuthenticator)
            };
            let outcome = result.context("login failed")?;

            match outcome {
                LoginOutcome::SignedUp => println!("✅ Signed up"),
                LoginOutcome::LoggedIn { last_login } => {
                    println!("✅ Logged in");
                    if let Some(at) = last_login {
                        println!("   Last login: {}", display_timestamp(at));
                    }
                }
            }
        }

        Commands::Report { category, text } => {
            let receipt = app
                .submit_report(&category, &text)
                .context("saving report")?;

            println!("✅ Thank you for your report. Report: {}", receipt.session_count);
            println!("   ID:   {}", receipt.report_id);
            println!("   File: {}", receipt.path.display());
            println!("   Payload for {}:", receipt.submission.endpoint);
            println!("{}", serde_json::to_string_pretty(&receipt.submission)?);
        }

        Commands::ReadReport { id } => {
            let text = app.read_report(&id).with_context(|| format!("reading report {}", id))?;
            println!("{}", text);
        }

        Commands::ValidateImage { path } => {
            let mut file =
                File::open(&path).with_context(|| format!("opening {}", path.display()))?;

            if app.validate_image(&mut file)? {
                println!("✅ {} is a JPEG", path.display());
            } else {
                println!("❌ Please choose a JPEG image");
            }
        }

        Commands::Status => {
            let status = app.status()?;

            println!("📊 Snitcher status");
            println!("{:-<40}", "");
            println!("Signed up:        {}", status.signed_up);
            println!(
                "Login key:        {}",
                match app.vault_state() {
                    VaultState::NoKey => "not provisioned".to_string(),
                    VaultState::Locked => "locked".to_string(),
                    VaultState::Unlocked { remaining } =>
                        format!("unlocked ({}s left)", remaining.num_seconds()),
                }
            );
            println!(
                "Last login:       {}",
                status
                    .last_login
                    .map(display_timestamp)
                    .unwrap_or_else(|| "never".into())
            );
            println!("Data directory:   {}", app.config().data_dir.display());
        }

        Commands::PurgeCache => {
            let removed = app.purge_cache()?;
            println!("🧹 Removed {} cached file(s)", removed);
        }

        Commands::Categories => {}
    }

    Ok(())
}
