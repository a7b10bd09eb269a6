//! Command implementations.
//!
//! Each subcommand lives in its own module; helpers shared by the commands
//! that talk to a board are kept here.

pub(crate) mod completions;
pub(crate) mod info;
pub(crate) mod program;

use crate::{Cli, config::Config, get_port, use_fancy_output};
use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;
use stkflash::{DEFAULT_BAUD, NativePort, Part, Programmer, ProgrammerConfig, SerialConfig};

/// Receive poll interval used on real serial ports.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_micros(200);

/// Resolved serial settings: CLI and environment win over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LinkSettings {
    pub baud: u32,
    pub tx_enable: stkflash::TxEnable,
    pub tx_enable_inverted: bool,
    pub reset: bool,
}

impl LinkSettings {
    pub(crate) fn resolve(cli: &Cli, config: &Config) -> Self {
        let conn = &config.port.connection;
        Self {
            baud: cli.baud.or(conn.baud).unwrap_or(DEFAULT_BAUD),
            tx_enable: cli
                .tx_enable
                .map(Into::into)
                .or(conn.tx_enable)
                .unwrap_or_default(),
            tx_enable_inverted: cli.tx_enable_inverted || conn.tx_enable_inverted,
            reset: !(cli.no_reset || config.program.no_reset),
        }
    }
}

/// Session options taken from the config file.
pub(crate) fn programmer_config(config: &Config, part: Option<Part>) -> ProgrammerConfig {
    let mut programmer = ProgrammerConfig::default()
        .with_poll_interval(config.poll_interval().unwrap_or(DEFAULT_POLL_INTERVAL))
        .with_expected_signature(part.map(|p| p.signature()));
    if let Some(ticks) = config.program.rx_wait_ticks {
        programmer = programmer.with_rx_wait_ticks(ticks);
    }
    programmer
}

/// Select a port, open it and wrap it in a programmer with a reset hook.
pub(crate) fn connect(
    cli: &Cli,
    config: &mut Config,
    part: Option<Part>,
) -> Result<Programmer<NativePort>> {
    let port_name = get_port(cli, config)?;
    let link = LinkSettings::resolve(cli, config);

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            port_name,
            link.baud
        );
    }

    let serial = SerialConfig::new(port_name.as_str(), link.baud)
        .with_tx_enable(link.tx_enable, link.tx_enable_inverted);
    let port =
        NativePort::open(&serial).with_context(|| format!("failed to open {port_name}"))?;

    let reset = if link.reset {
        let mut line = port.reset_line()?;
        if let Some(settle) = config.reset_settle() {
            line = line.with_settle(settle);
        }
        Some(line.into_hook())
    } else {
        None
    };

    let mut programmer = Programmer::new(port, programmer_config(config, part));
    programmer.set_reset_hook(reset);
    Ok(programmer)
}

/// Byte-count progress bar on stderr, hidden when quiet or not a terminal.
pub(crate) fn progress_bar(cli: &Cli, total: u64, message: &'static str) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb.set_message(message);
    pb
}
