mod assembler;
use assembler::{AssembleError, AssemblerArgs, Config};
mod diagnostic;
use diagnostic::{Verbosity, VERBOSITY};


use clap::Parser;
use clap_verbosity_flag::WarnLevel;
use shadow_rs::shadow;
use thiserror::Error;

shadow!(build);

/// Two-pass assembler for the ten-bit teaching machine.
#[derive(Parser, Debug)]
#[command(name = "tenasm", author, version = build::CLAP_LONG_VERSION, about)]
struct Args {
    #[clap(flatten)]
    verbose: clap_verbosity_flag::Verbosity<WarnLevel>,

    #[clap(flatten)]
    assemble: AssemblerArgs,
}

#[derive(Debug, Error)]
enum Error {
    #[error(transparent)]
    Io(#[from] AssembleError),
    #[error("assembly of {0} file(s) failed due to previous errors")]
    Assembler(usize),
}

fn main() -> Result<(), Error> {
    let cli = Args::parse();

    env_logger::Builder::new()
        .filter_level(cli.verbose.log_level_filter())
        .init();
    VERBOSITY.get_or_init(|| Verbosity::from(cli.verbose.log_level()));

    match assembler::assemble(&cli.assemble, &Config::default())? {
        0 => Ok(()),
        failed => Err(Error::Assembler(failed)),
    }
}
