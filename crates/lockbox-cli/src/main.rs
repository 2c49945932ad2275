//! Lockbox command line.
//!
//! # Usage
//!
//! ```bash
//! # Derive (and cache) the identity from a wallet signature
//! lockbox identity --store seeds.redb --account 0xabc... --signature-hex 0x1b2c...
//!
//! # Encrypt a file to several recipients
//! lockbox encrypt --to <handle> --to <handle> --input note.txt --output-dir out/
//!
//! # Decrypt with the cached identity
//! lockbox decrypt --store seeds.redb --account 0xabc... --input out/envelope-0.cbor
//! ```

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use lockbox_cli::{CliError, DEFAULT_SIGN_MESSAGE, IdentitySource};
use lockbox_core::SeedExpansion;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Lockbox wallet-derived messaging
#[derive(Parser, Debug)]
#[command(name = "lockbox")]
#[command(about = "Wallet-derived end-to-end encrypted messaging")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prepare the local identity and print its public key handle
    Identity(IdentityArgs),

    /// Encrypt a file to one or more public key handles
    Encrypt {
        /// Recipient public key handle (repeatable)
        #[arg(long = "to", required = true)]
        to: Vec<String>,

        /// File to encrypt
        #[arg(long)]
        input: PathBuf,

        /// Directory for the envelope files
        #[arg(long)]
        output_dir: PathBuf,
    },

    /// Decrypt an envelope file with the local identity
    Decrypt {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Envelope file (CBOR)
        #[arg(long)]
        input: PathBuf,

        /// Plaintext destination (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct IdentityArgs {
    /// Seed store path
    #[arg(long)]
    store: PathBuf,

    /// Account (wallet address)
    #[arg(long)]
    account: String,

    /// Wallet signature over the sign message, hex encoded
    #[arg(long)]
    signature_hex: Option<String>,

    /// Message the wallet signs
    #[arg(long, default_value = DEFAULT_SIGN_MESSAGE)]
    sign_message: String,

    /// Seed expansion mode
    #[arg(long, value_enum, default_value_t = Expansion::Hardened)]
    seed_expansion: Expansion,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Expansion {
    Legacy,
    Hardened,
}

impl From<IdentityArgs> for IdentitySource {
    fn from(args: IdentityArgs) -> Self {
        Self {
            store: args.store,
            account: args.account,
            signature_hex: args.signature_hex,
            sign_message: args.sign_message,
            seed_expansion: match args.seed_expansion {
                Expansion::Legacy => SeedExpansion::Legacy,
                Expansion::Hardened => SeedExpansion::Hardened,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "command failed");
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command) -> Result<ExitCode, CliError> {
    match command {
        Command::Identity(args) => {
            let handle = lockbox_cli::identity(&args.into()).await?;
            write_stdout(format!("{handle}\n").as_bytes())?;
            Ok(ExitCode::SUCCESS)
        },
        Command::Encrypt { to, input, output_dir } => {
            let report = lockbox_cli::encrypt(&to, &input, &output_dir)?;
            for path in &report.written {
                tracing::info!(path = %path.display(), "wrote envelope");
            }
            for failure in &report.failures {
                tracing::error!(index = failure.index, error = %failure.error, "recipient failed");
            }
            Ok(if report.failures.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        },
        Command::Decrypt { identity, input, output } => {
            let plaintext = lockbox_cli::decrypt(&identity.into(), &input).await?;
            match output {
                Some(path) => lockbox_cli::write(&path, &plaintext)?,
                None => write_stdout(&plaintext)?,
            }
            Ok(ExitCode::SUCCESS)
        },
    }
}

fn write_stdout(bytes: &[u8]) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(bytes)
        .and_then(|()| stdout.flush())
        .map_err(|source| CliError::Io { path: PathBuf::from("<stdout>"), source })
}
