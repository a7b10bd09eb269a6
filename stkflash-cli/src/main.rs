//! stkflash CLI - Command-line tool for programming AVR boards through
//! STK500 bootloaders.
//!
//! ## Features
//!
//! - Program and verify Intel HEX images
//! - Read the bootloader version and device signature
//! - Serial port discovery with interactive selection
//! - Shell completion generation
//! - Environment variable and TOML configuration support

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use stkflash::TxEnable;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(std::sync::atomic::Ordering::Relaxed) && console::colors_enabled_stderr()
}

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// stkflash - Program AVR boards through STK500 (v1) serial bootloaders.
///
/// Environment variables:
///   STKFLASH_PORT              - Default serial port
///   STKFLASH_BAUD              - Baud rate (default: 19200)
///   STKFLASH_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "stkflash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(
    after_help = "Examples:\n  stkflash program blink.hex --verify\n  stkflash -p /dev/ttyUSB0 -b 115200 info --json"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "STKFLASH_PORT")]
    port: Option<String>,

    /// Baud rate of the bootloader [default: 19200].
    #[arg(short, long, global = true, env = "STKFLASH_BAUD")]
    baud: Option<u32>,

    /// Modem-control line driving a half-duplex transceiver.
    #[arg(long, global = true, value_enum, value_name = "LINE")]
    tx_enable: Option<TxEnableArg>,

    /// Drive the transmit-enable line active-low.
    #[arg(long, global = true)]
    tx_enable_inverted: bool,

    /// Do not pulse DTR/RTS to reset the board before a session.
    #[arg(long, global = true)]
    no_reset: bool,

    /// Verbose output level (-v, -vv, -vvv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "STKFLASH_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected boards.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// Offer all available ports (including unknown types).
    #[arg(long, global = true)]
    list_all_ports: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Transmit-enable line choices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum TxEnableArg {
    /// Full duplex, no direction control.
    None,
    /// Assert RTS while transmitting.
    Rts,
    /// Assert DTR while transmitting.
    Dtr,
}

impl From<TxEnableArg> for TxEnable {
    fn from(arg: TxEnableArg) -> Self {
        match arg {
            TxEnableArg::None => TxEnable::None,
            TxEnableArg::Rts => TxEnable::Rts,
            TxEnableArg::Dtr => TxEnable::Dtr,
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Program an Intel HEX image into flash.
    Program {
        /// Intel HEX file to program.
        #[arg(value_name = "HEX")]
        hex: PathBuf,

        /// Read flash back and compare after programming.
        #[arg(long)]
        verify: bool,

        /// Refuse to program unless the board reports this part (e.g. atmega328p).
        #[arg(long, value_name = "PART")]
        part: Option<String>,
    },

    /// Compare flash contents against an Intel HEX image.
    Verify {
        /// Intel HEX file to compare against.
        #[arg(value_name = "HEX")]
        hex: PathBuf,
    },

    /// Show bootloader parameters and the device signature.
    Info {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List available serial ports.
    ListPorts {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// CLI-level failures that are not library errors.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Bad invocation or an unresolvable port choice.
    #[error("{0}")]
    Usage(String),
    /// Unreadable or invalid configuration.
    #[error("{0}")]
    Config(String),
    /// The user declined a prompt.
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
///
/// 1 generic, 2 usage, 3 config, 4 device, 5 image, 6 verify, 130 cancelled.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Config(_) => 3,
            CliError::Cancelled(_) => 130,
        };
    }

    match err.downcast_ref::<stkflash::Error>() {
        Some(stkflash::Error::Config(_)) => 3,
        Some(
            stkflash::Error::Serial(_)
            | stkflash::Error::DeviceNotFound
            | stkflash::Error::NoResponse
            | stkflash::Error::UnexpectedDeviceType { .. }
            | stkflash::Error::LeaveProgramModeFailed,
        ) => 4,
        Some(
            stkflash::Error::SourceNotFound(_)
            | stkflash::Error::MalformedLine { .. }
            | stkflash::Error::ChecksumMismatch { .. },
        ) => 5,
        Some(stkflash::Error::VerifyMismatch) => 6,
        Some(stkflash::Error::Io(_)) | None => 1,
    }
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, std::sync::atomic::Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "stkflash v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = match &cli.config_path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load(),
    };

    match &cli.command {
        Commands::Program { hex, verify, part } => {
            commands::program::cmd_program(cli, &mut config, hex, *verify, part.as_deref())
        },
        Commands::Verify { hex } => commands::program::cmd_verify(cli, &mut config, hex),
        Commands::Info { json } => commands::info::cmd_info(cli, &mut config, *json),
        Commands::ListPorts { json } => commands::info::cmd_list_ports(*json),
        Commands::Completions { shell } => {
            commands::completions::cmd_completions(*shell);
            Ok(())
        },
    }
}

/// Get serial port from CLI args, config or interactive selection.
fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        list_all_ports: cli.list_all_ports,
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };

    let selected = select_serial_port(&options, config)?;

    if !selected.is_known && !cli.non_interactive {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}
