//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "symscope",
    about = "Resolve raw addresses to symbols, source files and lines",
    after_help = "\
EXAMPLES:
    symscope --elf ./app --base 0x555555554000 0x555555556780
    symscope --pid 1234 0x7f3a2b4c780 0x55f3a2b4d120
    sudo symscope --kernel 0xffffffff81000010
    symscope --kernel --kallsyms ./kallsyms.txt --json 0xffffffff81000010

Sources are consulted in this order: ELF files, kernel, processes."
)]
pub struct Args {
    /// Addresses to symbolize (hex with 0x prefix, or decimal)
    #[arg(value_name = "ADDR", required = true, value_parser = parse_addr)]
    pub addresses: Vec<u64>,

    /// ELF file to use as a symbol source (repeatable, paired with --base)
    #[arg(long, value_name = "PATH")]
    pub elf: Vec<PathBuf>,

    /// Load base address of the matching --elf (required per ELF file)
    #[arg(long, value_name = "ADDR", value_parser = parse_addr)]
    pub base: Vec<u64>,

    /// Use the kernel as a symbol source
    #[arg(long)]
    pub kernel: bool,

    /// kallsyms snapshot to use instead of /proc/kallsyms (implies --kernel)
    #[arg(long, value_name = "PATH")]
    pub kallsyms: Option<PathBuf>,

    /// Kernel image with debug info (default: auto-locate vmlinux; implies --kernel)
    #[arg(long, value_name = "PATH")]
    pub kernel_image: Option<PathBuf>,

    /// Process whose loaded object files are symbol sources (repeatable)
    #[arg(short, long)]
    pub pid: Vec<u32>,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Keep mangled symbol names
    #[arg(long)]
    pub no_demangle: bool,

    /// Skip DWARF line information
    #[arg(long)]
    pub no_debug_info: bool,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Whether any kernel option was given
    #[must_use]
    pub fn wants_kernel(&self) -> bool {
        self.kernel || self.kallsyms.is_some() || self.kernel_image.is_some()
    }
}

/// Parse an address given as `0x`-prefixed hex or decimal
///
/// # Errors
/// Returns a message when the text is not a valid 64-bit address.
pub fn parse_addr(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid address '{s}': {e}"))
}
