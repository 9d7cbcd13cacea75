//! # symscope - Main Entry Point
//!
//! Builds the source list from the command line, symbolizes the given
//! addresses in one batch and prints one block (or JSON object) per address.

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::io::{self, BufWriter, Write};

use symscope::cli::Args;
use symscope::domain::{Pid, SymbolizeError};
use symscope::export::{write_json, write_text};
use symscope::preflight::{check_binary_exists, check_debug_symbols, check_kernel_symbol_access};
use symscope::symbolization::{SourceDescriptor, Symbolizer, SymbolizerConfig};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(err) = err.downcast_ref::<SymbolizeError>() {
        if err.load_error().is_permission_denied() {
            return EXIT_NOPERM;
        }
    }
    if err.to_string().to_lowercase().contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Build the source list: ELF files, then kernel, then processes.
fn sources_from_args(args: &Args) -> Result<Vec<SourceDescriptor>> {
    if args.elf.len() != args.base.len() {
        bail!(
            "Missing required argument: every --elf needs its own --base \
             ({} --elf, {} --base)\n\n\
             The load base is never guessed; pass --base 0 for files linked at their runtime address.",
            args.elf.len(),
            args.base.len()
        );
    }

    let mut sources: Vec<SourceDescriptor> = args
        .elf
        .iter()
        .zip(&args.base)
        .map(|(path, &base)| SourceDescriptor::elf(path, base))
        .collect();

    if args.wants_kernel() {
        sources.push(SourceDescriptor::Kernel {
            kallsyms: args.kallsyms.clone(),
            kernel_image: args.kernel_image.clone(),
        });
    }

    sources.extend(args.pid.iter().map(|&pid| SourceDescriptor::process(Pid(pid))));

    if sources.is_empty() {
        bail!(
            "Missing required argument: at least one source\n\n\
             Usage:\n  \
             symscope --elf ./app --base 0x1000 ADDR...\n  \
             symscope --pid 1234 ADDR...\n  \
             symscope --kernel ADDR...\n\n\
             Run 'symscope --help' for more options"
        );
    }

    Ok(sources)
}

fn run() -> Result<()> {
    let args = Args::parse();
    let sources = sources_from_args(&args)?;

    for path in &args.elf {
        check_binary_exists(path)?;
        check_debug_symbols(path, args.quiet)?;
    }
    if args.wants_kernel() && args.kallsyms.is_none() {
        check_kernel_symbol_access(args.quiet);
    }

    let config = SymbolizerConfig::default()
        .with_demangle(!args.no_demangle)
        .with_debug_info(!args.no_debug_info);
    let symbolizer = Symbolizer::with_config(config);

    let results = symbolizer
        .symbolize(&sources, &args.addresses)
        .context("Symbolization failed")?;

    let stats = symbolizer.stats();
    info!("Resolver builds: {}, cache hits: {}", stats.builds, stats.hits);

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if args.json {
        write_json(&mut out, &args.addresses, &results)?;
    } else {
        write_text(&mut out, &args.addresses, &results)?;
    }
    out.flush()?;

    Ok(())
}
