//! # symscope - Multi-source Address Symbolization
//!
//! symscope turns raw program-counter addresses, as collected by profilers,
//! tracers or crash handlers, into symbol names, symbol start addresses and
//! (when DWARF is present) source file, line and column.
//!
//! ## Architecture Overview
//!
//! ```text
//!   sources: [Elf{path, base}, Kernel{kallsyms?, image?}, Process{pid}]
//!   addresses: [0x55f3a2b4c780, 0xffffffff81000010, ...]
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Symbolizer                           │
//! │   resolver cache (one build per source identity)            │
//! └──────┬──────────────────────┬─────────────────────┬─────────┘
//!        ▼                      ▼                     ▼
//! ┌──────────────┐   ┌────────────────────┐   ┌────────────────┐
//! │ ELF loader   │   │ Kernel loader      │   │ Process loader │
//! │ symtab+dynsym│   │ kallsyms + vmlinux │   │ /proc/pid/maps │
//! │ DWARF lines  │   │ DWARF lines        │   │ → ELF per file │
//! └──────────────┘   └────────────────────┘   └────────────────┘
//!                         │
//!                         ▼
//!   results: one match list per address, in input order
//! ```
//!
//! ## Module Structure
//!
//! - [`symbolization`]: loaders, sorted address indices, the resolver cache
//!   and the [`symbolization::Symbolizer`] orchestrator
//! - [`domain`]: newtypes (`Pid`, `Addr`) and error types
//! - [`export`]: text and JSON rendering of results
//! - [`preflight`]: environment checks used by the CLI
//! - [`cli`]: command-line argument definitions

pub mod cli;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod symbolization;
