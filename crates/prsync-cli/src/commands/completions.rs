//! `prsync completions` command.

use std::io::Write;

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use super::Cli;

/// Write completions for `shell` to `out`.
#[allow(clippy::unnecessary_wraps)]
pub fn run(shell: Shell, out: &mut impl Write) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
    Ok(())
}
