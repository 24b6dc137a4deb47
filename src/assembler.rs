//! Assembles source files for the ten-bit machine.
//!
//! A run goes through four stages: macro expansion, the first pass, the
//! second pass and emission. Every stage reports into one [`Diagnostics`]
//! log; an error reported by a stage stops the run at the end of that stage.

pub mod ast;
pub mod emit;
pub mod encode;
pub mod first_pass;
pub mod lex;
pub mod macros;
pub mod second_pass;
pub mod symbol;
pub mod table;
pub mod word;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use clio::{Input, Output};
use colored::Colorize;
use thiserror::Error;

use crate::diagnostic::Diagnostics;
use emit::ObjectFiles;
use lex::Limits;
use macros::Expanded;

/// Address of the first instruction word.
pub const CODE_BASE: u16 = 100;
/// Words of machine memory available to code and data together.
pub const MEMORY_WORDS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub limits: Limits,
    pub memory_words: usize,
    pub code_base: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            limits: Limits::default(),
            memory_words: MEMORY_WORDS,
            code_base: CODE_BASE,
        }
    }
}

/// Everything one run produced.
///
/// `expanded` is present once macro expansion succeeded and `output` once
/// every stage did.
#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub expanded: Option<Expanded>,
    pub output: Option<ObjectFiles>,
    pub diagnostics: Diagnostics,
}

impl Assembly {
    pub fn succeeded(&self) -> bool {
        self.output.is_some()
    }
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("unable to read `{path}`: {source}")]
    Read { path: String, source: io::Error },
    #[error("unable to write `{path}`: {source}")]
    Write { path: String, source: io::Error },
}

pub fn assemble_source(name: &str, text: &str, config: &Config) -> Assembly {
    let mut diagnostics = Diagnostics::new();

    let mark = diagnostics.mark();
    let expanded = macros::expand(text.lines(), &config.limits, &mut diagnostics);
    if diagnostics.errors_since(mark) > 0 {
        log::info!("`{name}`: stopping after macro expansion");
        return Assembly {
            expanded: None,
            output: None,
            diagnostics,
        };
    }

    let mark = diagnostics.mark();
    let mut program = first_pass::first_pass(&expanded.lines, config, &mut diagnostics);
    if diagnostics.errors_since(mark) > 0 {
        log::info!("`{name}`: stopping after the first pass");
        return Assembly {
            expanded: Some(expanded),
            output: None,
            diagnostics,
        };
    }

    let mark = diagnostics.mark();
    let externals = second_pass::second_pass(&mut program, config, &mut diagnostics);
    if diagnostics.errors_since(mark) > 0 {
        log::info!("`{name}`: stopping after the second pass");
        return Assembly {
            expanded: Some(expanded),
            output: None,
            diagnostics,
        };
    }

    let output = emit::emit(&program, &externals);
    Assembly {
        expanded: Some(expanded),
        output: Some(output),
        diagnostics,
    }
}

fn other<E>(err: E) -> io::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    io::Error::new(io::ErrorKind::Other, err)
}

pub fn assemble_file<P: AsRef<Path>>(path: P, config: &Config) -> Result<Assembly, AssembleError> {
    let name = path.as_ref().display().to_string();
    let read_error = |source: io::Error| AssembleError::Read {
        path: name.clone(),
        source,
    };

    let mut input = Input::new(&name).map_err(|err| read_error(other(err)))?;
    let mut text = String::new();
    input.read_to_string(&mut text).map_err(read_error)?;

    Ok(assemble_source(&name, &text, config))
}

fn write_file(path: &Path, contents: &str) -> Result<(), AssembleError> {
    let name = path.display().to_string();
    let write_error = |source: io::Error| AssembleError::Write {
        path: name.clone(),
        source,
    };

    let mut output = Output::new(&name).map_err(|err| write_error(other(err)))?;
    output
        .lock()
        .write_all(contents.as_bytes())
        .map_err(write_error)?;
    output.finish().map_err(|err| write_error(other(err)))?;

    log::debug!("wrote `{name}`");
    Ok(())
}

#[derive(Debug, Args)]
pub struct AssemblerArgs {
    /// Source files, conventionally with an `.as` extension.
    #[clap(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the generated files.
    ///
    /// Defaults to the directory of each source file.
    #[clap(short, long)]
    output: Option<PathBuf>,
}

impl AssemblerArgs {
    /// Output path for `input` without its extension.
    fn base(&self, input: &Path) -> PathBuf {
        match &self.output {
            Some(dir) => dir.join(input.file_stem().unwrap_or_default()),
            None => input.with_extension(""),
        }
    }
}

/// Assembles every input independently. Returns the number of failed files.
pub fn assemble(args: &AssemblerArgs, config: &Config) -> Result<usize, AssembleError> {
    let mut failed = 0;

    for input in &args.inputs {
        let start = Instant::now();
        let name = input.display().to_string();

        let assembly = assemble_file(input, config)?;
        assembly.diagnostics.emit(&name);

        let base = args.base(input);
        if let Some(expanded) = &assembly.expanded {
            write_file(&base.with_extension("am"), &expanded.to_string())?;
        }

        if let Some(files) = &assembly.output {
            write_file(&base.with_extension("ob"), &files.object)?;
            if !files.entries.is_empty() {
                write_file(&base.with_extension("ent"), &files.entries)?;
            }
            if !files.externals.is_empty() {
                write_file(&base.with_extension("ext"), &files.externals)?;
            }
        }

        let elapsed = start.elapsed().as_millis();
        let seconds = elapsed / 1000;
        let millis = elapsed % 1000;
        if assembly.succeeded() {
            println!(
                "    {} assembling `{name}` in {seconds}.{millis:03}s",
                "Finished".green().bold(),
            );
        } else {
            failed += 1;
            println!(
                "      {} assembling `{name}`: {} error(s), {} warning(s)",
                "Failed".red().bold(),
                assembly.diagnostics.error_count(),
                assembly.diagnostics.warning_count()
            );
        }
    }

    Ok(failed)
}
