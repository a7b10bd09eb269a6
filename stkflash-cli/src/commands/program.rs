//! `program` and `verify` commands.

use super::{connect, progress_bar};
use crate::{Cli, CliError, config::Config};
use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::io;
use std::path::Path;
use stkflash::{NativePort, Part, Programmer};

/// Program command implementation.
pub(crate) fn cmd_program(
    cli: &Cli,
    config: &mut Config,
    hex: &Path,
    verify: bool,
    part: Option<&str>,
) -> Result<()> {
    let part = resolve_part(part, config)?;
    let size = source_size(hex)?;
    let verify = verify || config.program.verify;

    if !cli.quiet {
        eprintln!(
            "{} Loading {} ({size} bytes)",
            style("📦").cyan(),
            hex.display()
        );
    }

    let mut programmer = connect(cli, config, part)?;

    let pb = progress_bar(cli, size, "Programming");
    let processed = programmer
        .program_file(hex, |done| pb.set_position(as_u64(done)))
        .with_context(|| format!("failed to program {}", hex.display()));
    let processed = match processed {
        Ok(n) => n,
        Err(e) => {
            pb.abandon();
            return Err(e);
        },
    };
    pb.finish_with_message("Programmed");

    if !cli.quiet {
        eprintln!(
            "{} Programmed {} ({processed} HEX bytes processed)",
            style("✓").green(),
            hex.display()
        );
    }

    if verify {
        verify_with(cli, &mut programmer, hex, size)?;
    }

    if !cli.quiet {
        eprintln!("\n{} Done!", style("🎉").green().bold());
    }
    Ok(())
}

/// Verify command implementation.
pub(crate) fn cmd_verify(cli: &Cli, config: &mut Config, hex: &Path) -> Result<()> {
    let size = source_size(hex)?;
    let mut programmer = connect(cli, config, None)?;
    verify_with(cli, &mut programmer, hex, size)
}

fn verify_with(
    cli: &Cli,
    programmer: &mut Programmer<NativePort>,
    hex: &Path,
    size: u64,
) -> Result<()> {
    let pb = progress_bar(cli, size, "Verifying");
    let result = programmer
        .verify_file(hex, |done| pb.set_position(as_u64(done)))
        .with_context(|| format!("failed to verify {}", hex.display()));
    if result.is_err() {
        pb.abandon();
        return result;
    }
    pb.finish_with_message("Verified");

    if !cli.quiet {
        eprintln!(
            "{} Flash matches {}",
            style("✓").green(),
            hex.display()
        );
    }
    Ok(())
}

/// `--part` wins over the config file; a bad name on the command line is a
/// usage error.
fn resolve_part(arg: Option<&str>, config: &Config) -> Result<Option<Part>> {
    match arg {
        Some(name) => Part::from_name(name)
            .map(Some)
            .ok_or_else(|| CliError::Usage(format!("unknown part '{name}'")).into()),
        None => config.part(),
    }
}

/// Size of the HEX file, checked before any port is opened.
fn source_size(hex: &Path) -> Result<u64> {
    match fs::metadata(hex) {
        Ok(meta) if meta.is_file() => Ok(meta.len()),
        Ok(_) => Err(stkflash::Error::SourceNotFound(hex.to_path_buf()).into()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(stkflash::Error::SourceNotFound(hex.to_path_buf()).into())
        },
        Err(e) => Err(stkflash::Error::Io(e).into()),
    }
}

fn as_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}
