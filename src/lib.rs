//! machound - Mach-O binary inspector for security assessment.
//!
//! This library decodes the structural metadata of Mach-O files from
//! untrusted input: headers of thin and fat (universal) binaries, load
//! commands, segments and sections, symbol tables, linked libraries and
//! code-signature blobs. Both byte orders and both address widths are
//! supported.
//!
//! Malformed input never panics. Problems that leave the rest of the file
//! readable are collected as warnings on the report they belong to; only a
//! file that cannot be read, or one without a single recognizable
//! architecture, fails the parse.
//!
//! # Example
//!
//! ```no_run
//! fn main() -> machound::Result<()> {
//!     let file = machound::parse("/bin/ls")?;
//!
//!     for report in &file.reports {
//!         println!("{}: {} segments", report.header.arch_name(), report.segments.len());
//!         for lib in &report.libraries {
//!             println!("  {}", lib.path);
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod macho;
pub mod print;
pub mod util;

// Re-export main types
pub use error::{Error, Result};
pub use macho::{ContainerKind, ParseReport, SliceEntry};

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, warn};

use macho::{decode_container, parse_architecture_slice};

/// Options for parsing.
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Fail with [`Error::Strict`] if any warning was recorded
    pub strict: bool,
    /// Skip symbol table decoding
    pub skip_symbols: bool,
    /// Skip code signature decoding
    pub skip_code_signature: bool,
}

/// A parsed file: its container and one report per usable slice.
#[derive(Debug)]
pub struct MachOFile {
    /// File size in bytes
    pub size: u64,
    /// Thin or fat
    pub kind: ContainerKind,
    /// Fat table entries that passed range checks (empty for thin files)
    pub fat_arches: Vec<SliceEntry>,
    /// One report per decoded slice, in table order
    pub reports: Vec<ParseReport>,
    /// Problems with the container itself or with whole slices
    pub warnings: Vec<Error>,
}

impl MachOFile {
    /// Returns true for a fat (universal) binary.
    pub fn is_fat(&self) -> bool {
        matches!(self.kind, ContainerKind::Fat { .. })
    }

    /// Returns every warning, file-level first.
    pub fn all_warnings(&self) -> impl Iterator<Item = &Error> {
        self.warnings
            .iter()
            .chain(self.reports.iter().flat_map(|r| r.warnings.iter()))
    }

    /// Returns the total number of warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len() + self.reports.iter().map(|r| r.warnings.len()).sum::<usize>()
    }

    fn take_first_warning(&mut self) -> Option<Error> {
        if !self.warnings.is_empty() {
            return Some(self.warnings.remove(0));
        }
        self.reports
            .iter_mut()
            .find(|r| !r.warnings.is_empty())
            .map(|r| r.warnings.remove(0))
    }
}

/// Parses the file at `path` with default options.
pub fn parse<P: AsRef<Path>>(path: P) -> Result<MachOFile> {
    parse_with_options(path, &ParseOptions::default())
}

/// Parses the file at `path`.
///
/// The file is memory-mapped for the duration of the call.
pub fn parse_with_options<P: AsRef<Path>>(path: P, options: &ParseOptions) -> Result<MachOFile> {
    let path = path.as_ref();

    let file = File::open(path).map_err(|e| Error::FileOpen {
        path: path.to_path_buf(),
        source: e,
    })?;

    let len = file.metadata()?.len();
    if len == 0 {
        debug!("{} is empty", path.display());
        return parse_bytes(&[], options);
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MemoryMap {
        path: path.to_path_buf(),
        source: e,
    })?;

    parse_bytes(&mmap, options)
}

/// Parses an in-memory file.
pub fn parse_bytes(data: &[u8], options: &ParseOptions) -> Result<MachOFile> {
    let container = decode_container(data)?;
    let mut warnings = container.warnings;
    let mut reports = Vec::with_capacity(container.slices.len());

    match container.kind {
        ContainerKind::Thin => {
            reports.push(parse_architecture_slice(data, 0, options)?);
        }
        ContainerKind::Fat { .. } => {
            for slice in &container.slices {
                let start = slice.offset as usize;
                let Some(bytes) = data.get(start..start.saturating_add(slice.size as usize)) else {
                    warnings.push(Error::fat(Some(slice.index), "slice range not addressable"));
                    continue;
                };

                match parse_architecture_slice(bytes, slice.offset, options) {
                    Ok(mut report) => {
                        report.index = slice.index;
                        if report.header.cputype != slice.cputype {
                            warn!(
                                "Slice {} header says {}, fat table says {}",
                                slice.index,
                                report.header.arch_name(),
                                slice.arch_name()
                            );
                        }
                        reports.push(report);
                    }
                    Err(e) => {
                        debug!("Slice {} rejected: {}", slice.index, e);
                        warnings.push(Error::Slice {
                            index: slice.index,
                            source: Box::new(e),
                        });
                    }
                }
            }

            if reports.is_empty() {
                return Err(Error::NoValidArchitecture {
                    slices: container.declared,
                });
            }
        }
    }

    let mut file = MachOFile {
        size: data.len() as u64,
        kind: container.kind,
        fat_arches: match container.kind {
            ContainerKind::Thin => Vec::new(),
            ContainerKind::Fat { .. } => container.slices,
        },
        reports,
        warnings,
    };

    if options.strict {
        let count = file.warning_count();
        if let Some(first) = file.take_first_warning() {
            return Err(Error::Strict {
                count,
                first: Box::new(first),
            });
        }
    }

    Ok(file)
}
