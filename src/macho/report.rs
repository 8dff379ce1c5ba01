//! Per-slice parse results.
//!
//! [`parse_architecture_slice`] runs every decoder over one architecture
//! slice and collects what they produce into a [`ParseReport`]. Thin files
//! and each slice of a fat file go through the same function.

use tracing::{debug, info};

use super::commands::{walk_load_commands, Command, LinkedLibrary, LoadCommand};
use super::constants::*;
use super::header::ArchitectureHeader;
use super::segment::Segment;
use super::signature::{decode_code_signature, CodeSignature};
use super::structs::{
    BuildVersionCommand, DysymtabCommand, EncryptionInfoCommand, EntryPointCommand, ThreadCommand,
};
use super::symbols::{decode_symbols, Symbol};
use crate::error::{Error, Result};
use crate::ParseOptions;

/// Where execution starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    /// LC_MAIN: offset of main() in __TEXT
    Main(EntryPointCommand),
    /// LC_UNIXTHREAD / LC_THREAD initial register state
    Thread(ThreadCommand),
}

/// Minimum OS and SDK from LC_BUILD_VERSION or LC_VERSION_MIN_*.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformVersion {
    /// PLATFORM_* value
    pub platform: u32,
    /// Minimum OS version, packed
    pub minos: u32,
    /// SDK version, packed
    pub sdk: u32,
}

/// Security-relevant facts read directly from the parsed structures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecurityFeatures {
    /// MH_PIE is set
    pub pie: bool,
    /// MH_ALLOW_STACK_EXECUTION is clear
    pub nx_stack: bool,
    /// MH_NO_HEAP_EXECUTION is set
    pub nx_heap: bool,
    /// A __RESTRICT segment exists
    pub restrict: bool,
    /// Stack protector symbols are referenced
    pub stack_canary: bool,
    /// Objective-C ARC runtime symbols are referenced
    pub arc: bool,
    /// LC_CODE_SIGNATURE is present
    pub code_signature: bool,
    /// Encryption info with a non-zero cryptid is present
    pub encrypted: bool,
}

impl SecurityFeatures {
    /// Returns (label, value) pairs in display order.
    pub fn entries(&self) -> [(&'static str, bool); 8] {
        [
            ("PIE", self.pie),
            ("NX stack", self.nx_stack),
            ("NX heap", self.nx_heap),
            ("Restrict", self.restrict),
            ("Stack canary", self.stack_canary),
            ("ARC", self.arc),
            ("Code signature", self.code_signature),
            ("Encrypted", self.encrypted),
        ]
    }
}

/// Everything decoded from one architecture slice.
#[derive(Debug)]
pub struct ParseReport {
    /// Position of the slice in the fat table (0 for thin files)
    pub index: u32,
    /// Offset of the slice in the file
    pub offset: u64,
    /// Size of the slice
    pub size: u64,
    /// Slice header
    pub header: ArchitectureHeader,
    /// Load commands in on-disk order
    pub load_commands: Vec<LoadCommand>,
    /// Segments that passed bounds validation, in command order
    pub segments: Vec<Segment>,
    /// Symbols in table order
    pub symbols: Vec<Symbol>,
    /// Dependent libraries in link order
    pub libraries: Vec<LinkedLibrary>,
    /// Embedded code signature
    pub code_signature: Option<CodeSignature>,
    /// Recoverable problems, in the order they were found
    pub warnings: Vec<Error>,
}

impl ParseReport {
    fn commands(&self) -> impl Iterator<Item = &Command> {
        self.load_commands.iter().map(|lc| &lc.command)
    }

    /// Returns the first segment with the given name.
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// Returns true if any symbol has exactly this name.
    pub fn has_symbol(&self, name: &str) -> bool {
        self.symbols.iter().any(|s| s.name == name)
    }

    /// Returns the entry point. The first LC_MAIN or thread command wins.
    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.commands().find_map(|c| match c {
            Command::Main(main) => Some(EntryPoint::Main(*main)),
            Command::Thread(thread) => Some(EntryPoint::Thread(*thread)),
            _ => None,
        })
    }

    /// Returns the UUID.
    pub fn uuid(&self) -> Option<&[u8; 16]> {
        self.commands().find_map(|c| match c {
            Command::Uuid(uuid) => Some(uuid),
            _ => None,
        })
    }

    /// Returns the install name of a dylib.
    pub fn install_name(&self) -> Option<&LinkedLibrary> {
        self.commands().find_map(|c| match c {
            Command::IdDylib(id) => Some(id),
            _ => None,
        })
    }

    /// Returns the dynamic linker path.
    pub fn dylinker(&self) -> Option<&str> {
        self.commands().find_map(|c| match c {
            Command::Dylinker(path) => Some(path.as_str()),
            _ => None,
        })
    }

    /// Returns every LC_RPATH entry in order.
    pub fn rpaths(&self) -> impl Iterator<Item = &str> {
        self.commands().filter_map(|c| match c {
            Command::Rpath(path) => Some(path.as_str()),
            _ => None,
        })
    }

    /// Returns the LC_BUILD_VERSION command.
    pub fn build_version(&self) -> Option<&BuildVersionCommand> {
        self.commands().find_map(|c| match c {
            Command::BuildVersion(bv) => Some(bv),
            _ => None,
        })
    }

    /// Returns the deployment target from LC_BUILD_VERSION, falling back to
    /// LC_VERSION_MIN_*.
    pub fn platform_version(&self) -> Option<PlatformVersion> {
        if let Some(bv) = self.build_version() {
            return Some(PlatformVersion {
                platform: bv.platform,
                minos: bv.minos,
                sdk: bv.sdk,
            });
        }
        self.commands().find_map(|c| match c {
            Command::VersionMin(vm) => Some(PlatformVersion {
                platform: vm.platform,
                minos: vm.version,
                sdk: vm.sdk,
            }),
            _ => None,
        })
    }

    /// Returns the packed LC_SOURCE_VERSION value.
    pub fn source_version(&self) -> Option<u64> {
        self.commands().find_map(|c| match c {
            Command::SourceVersion(v) => Some(*v),
            _ => None,
        })
    }

    /// Returns the encryption info command.
    pub fn encryption(&self) -> Option<&EncryptionInfoCommand> {
        self.commands().find_map(|c| match c {
            Command::EncryptionInfo(info) => Some(info),
            _ => None,
        })
    }

    /// Returns the dynamic symbol table command.
    pub fn dysymtab(&self) -> Option<&DysymtabCommand> {
        self.commands().find_map(|c| match c {
            Command::Dysymtab(d) => Some(d),
            _ => None,
        })
    }

    /// Returns true if an LC_CODE_SIGNATURE command is present.
    pub fn has_code_signature_command(&self) -> bool {
        self.commands()
            .any(|c| matches!(c, Command::CodeSignature(_)))
    }

    /// Computes the security facts of this slice.
    pub fn security(&self) -> SecurityFeatures {
        let flags = self.header.flags();
        SecurityFeatures {
            pie: flags.contains(MachOFlags::PIE),
            nx_stack: !flags.contains(MachOFlags::ALLOW_STACK_EXECUTION),
            nx_heap: flags.contains(MachOFlags::NO_HEAP_EXECUTION),
            restrict: self.segment("__RESTRICT").is_some(),
            stack_canary: self.has_symbol("___stack_chk_fail")
                || self.has_symbol("___stack_chk_guard"),
            arc: self.has_symbol("_objc_release"),
            code_signature: self.has_code_signature_command(),
            encrypted: self.encryption().is_some_and(|e| e.is_encrypted()),
        }
    }
}

/// Parses one architecture slice.
///
/// `data` is the slice alone; all offsets inside it are relative to its
/// start. `offset` is only recorded. The header is the one hard requirement:
/// if it cannot be decoded the slice fails, otherwise every problem lands in
/// the report's warnings.
pub fn parse_architecture_slice(
    data: &[u8],
    offset: u64,
    options: &ParseOptions,
) -> Result<ParseReport> {
    let header = ArchitectureHeader::decode(data)?;
    debug!("Slice at {:#x}: {}", offset, header);

    let (load_commands, mut warnings) = walk_load_commands(data, &header);

    let segments: Vec<Segment> = load_commands
        .iter()
        .filter_map(|lc| match &lc.command {
            Command::Segment(segment) => Some(segment.clone()),
            _ => None,
        })
        .collect();

    let libraries: Vec<LinkedLibrary> = load_commands
        .iter()
        .filter_map(|lc| match &lc.command {
            Command::Dylib(lib) => Some(lib.clone()),
            _ => None,
        })
        .collect();

    let mut symtabs = load_commands.iter().filter_map(|lc| match &lc.command {
        Command::Symtab(symtab) => Some((lc, *symtab)),
        _ => None,
    });
    let first_symtab = symtabs.next();
    for (extra, _) in symtabs {
        warnings.push(Error::malformed(
            extra.cmd,
            extra.offset,
            "duplicate LC_SYMTAB ignored",
        ));
    }

    let symbols = match first_symtab {
        Some((_, symtab)) if !options.skip_symbols => {
            decode_symbols(data, &symtab, header.endian, header.width, &mut warnings)
        }
        _ => Vec::new(),
    };

    let code_signature = if options.skip_code_signature {
        None
    } else {
        load_commands
            .iter()
            .find_map(|lc| match &lc.command {
                Command::CodeSignature(cs) => Some(*cs),
                _ => None,
            })
            .and_then(|cs| decode_code_signature(data, &cs, &mut warnings))
    };

    info!(
        "{}: {} commands, {} segments, {} symbols, {} libraries, {} warnings",
        header.arch_name(),
        load_commands.len(),
        segments.len(),
        symbols.len(),
        libraries.len(),
        warnings.len()
    );

    Ok(ParseReport {
        index: 0,
        offset,
        size: data.len() as u64,
        header,
        load_commands,
        segments,
        symbols,
        libraries,
        code_signature,
        warnings,
    })
}
