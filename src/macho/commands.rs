//! Load command walking and typed dispatch.
//!
//! [`LoadCommandWalker`] splits the command table into raw commands and
//! enforces the structural rules (minimum size, table and file bounds). Each
//! raw command is then handed to the decoder registered for its tag in
//! [`DECODERS`]. Tags with no decoder are kept as [`Command::Other`] when the
//! tag is known and as [`Command::Unknown`] otherwise.

use tracing::{debug, trace};

use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use super::header::{AddressWidth, ArchitectureHeader};
use super::segment::{decode_segment, Segment};
use super::structs::*;
use crate::error::{Error, Result};
use crate::util::c_str_lossy;

// =============================================================================
// Decoded Commands
// =============================================================================

/// How a dependent library is linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DylibKind {
    /// LC_LOAD_DYLIB
    Load,
    /// LC_LOAD_WEAK_DYLIB
    Weak,
    /// LC_REEXPORT_DYLIB
    Reexport,
    /// LC_LAZY_LOAD_DYLIB
    Lazy,
    /// LC_LOAD_UPWARD_DYLIB
    Upward,
    /// LC_ID_DYLIB (the library's own install name)
    Id,
}

impl DylibKind {
    fn from_cmd(cmd: u32) -> Self {
        match cmd {
            LC_LOAD_WEAK_DYLIB => DylibKind::Weak,
            LC_REEXPORT_DYLIB => DylibKind::Reexport,
            LC_LAZY_LOAD_DYLIB => DylibKind::Lazy,
            LC_LOAD_UPWARD_DYLIB => DylibKind::Upward,
            LC_ID_DYLIB => DylibKind::Id,
            _ => DylibKind::Load,
        }
    }

    /// Returns a short label.
    pub fn name(self) -> &'static str {
        match self {
            DylibKind::Load => "load",
            DylibKind::Weak => "weak",
            DylibKind::Reexport => "reexport",
            DylibKind::Lazy => "lazy",
            DylibKind::Upward => "upward",
            DylibKind::Id => "id",
        }
    }
}

/// A dylib reference from a dylib-family load command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedLibrary {
    /// Install path
    pub path: String,
    /// Link kind
    pub kind: DylibKind,
    /// Build timestamp
    pub timestamp: u32,
    /// Current version, packed
    pub current_version: u32,
    /// Compatibility version, packed
    pub compatibility_version: u32,
}

/// Typed payload of a load command.
#[derive(Debug, Clone)]
#[allow(missing_docs)] // Variants are named after the commands they hold
pub enum Command {
    Segment(Segment),
    Symtab(SymtabCommand),
    Dysymtab(DysymtabCommand),
    Dylib(LinkedLibrary),
    IdDylib(LinkedLibrary),
    Dylinker(String),
    Rpath(String),
    Main(EntryPointCommand),
    Thread(ThreadCommand),
    CodeSignature(LinkeditDataCommand),
    LinkeditData(LinkeditDataCommand),
    DyldInfo(DyldInfoCommand),
    Uuid([u8; 16]),
    BuildVersion(BuildVersionCommand),
    VersionMin(VersionMinCommand),
    SourceVersion(u64),
    EncryptionInfo(EncryptionInfoCommand),
    /// A known tag this parser does not decode further
    Other,
    /// The typed decoder failed; the warning carries the reason
    Rejected,
    /// Unrecognized tag, with the payload after the 8-byte header
    Unknown(Vec<u8>),
}

/// A load command in on-disk order.
#[derive(Debug, Clone)]
pub struct LoadCommand {
    /// Command tag
    pub cmd: u32,
    /// Declared size including the header
    pub cmdsize: u32,
    /// Offset of the command from the start of the slice
    pub offset: usize,
    /// Decoded payload
    pub command: Command,
}

impl LoadCommand {
    /// Returns the LC_* name of the command.
    pub fn name(&self) -> &'static str {
        load_command_name(self.cmd).unwrap_or("LC_UNKNOWN")
    }
}

/// Returns the LC_* name for a command tag, if known.
pub fn load_command_name(cmd: u32) -> Option<&'static str> {
    Some(match cmd {
        LC_SEGMENT => "LC_SEGMENT",
        LC_SYMTAB => "LC_SYMTAB",
        LC_SYMSEG => "LC_SYMSEG",
        LC_THREAD => "LC_THREAD",
        LC_UNIXTHREAD => "LC_UNIXTHREAD",
        LC_LOADFVMLIB => "LC_LOADFVMLIB",
        LC_IDFVMLIB => "LC_IDFVMLIB",
        LC_IDENT => "LC_IDENT",
        LC_FVMFILE => "LC_FVMFILE",
        LC_PREPAGE => "LC_PREPAGE",
        LC_DYSYMTAB => "LC_DYSYMTAB",
        LC_LOAD_DYLIB => "LC_LOAD_DYLIB",
        LC_ID_DYLIB => "LC_ID_DYLIB",
        LC_LOAD_DYLINKER => "LC_LOAD_DYLINKER",
        LC_ID_DYLINKER => "LC_ID_DYLINKER",
        LC_PREBOUND_DYLIB => "LC_PREBOUND_DYLIB",
        LC_ROUTINES => "LC_ROUTINES",
        LC_SUB_FRAMEWORK => "LC_SUB_FRAMEWORK",
        LC_SUB_UMBRELLA => "LC_SUB_UMBRELLA",
        LC_SUB_CLIENT => "LC_SUB_CLIENT",
        LC_SUB_LIBRARY => "LC_SUB_LIBRARY",
        LC_TWOLEVEL_HINTS => "LC_TWOLEVEL_HINTS",
        LC_PREBIND_CKSUM => "LC_PREBIND_CKSUM",
        LC_LOAD_WEAK_DYLIB => "LC_LOAD_WEAK_DYLIB",
        LC_SEGMENT_64 => "LC_SEGMENT_64",
        LC_ROUTINES_64 => "LC_ROUTINES_64",
        LC_UUID => "LC_UUID",
        LC_RPATH => "LC_RPATH",
        LC_CODE_SIGNATURE => "LC_CODE_SIGNATURE",
        LC_SEGMENT_SPLIT_INFO => "LC_SEGMENT_SPLIT_INFO",
        LC_REEXPORT_DYLIB => "LC_REEXPORT_DYLIB",
        LC_LAZY_LOAD_DYLIB => "LC_LAZY_LOAD_DYLIB",
        LC_ENCRYPTION_INFO => "LC_ENCRYPTION_INFO",
        LC_DYLD_INFO => "LC_DYLD_INFO",
        LC_DYLD_INFO_ONLY => "LC_DYLD_INFO_ONLY",
        LC_LOAD_UPWARD_DYLIB => "LC_LOAD_UPWARD_DYLIB",
        LC_VERSION_MIN_MACOSX => "LC_VERSION_MIN_MACOSX",
        LC_VERSION_MIN_IPHONEOS => "LC_VERSION_MIN_IPHONEOS",
        LC_FUNCTION_STARTS => "LC_FUNCTION_STARTS",
        LC_DYLD_ENVIRONMENT => "LC_DYLD_ENVIRONMENT",
        LC_MAIN => "LC_MAIN",
        LC_DATA_IN_CODE => "LC_DATA_IN_CODE",
        LC_SOURCE_VERSION => "LC_SOURCE_VERSION",
        LC_DYLIB_CODE_SIGN_DRS => "LC_DYLIB_CODE_SIGN_DRS",
        LC_ENCRYPTION_INFO_64 => "LC_ENCRYPTION_INFO_64",
        LC_LINKER_OPTION => "LC_LINKER_OPTION",
        LC_LINKER_OPTIMIZATION_HINT => "LC_LINKER_OPTIMIZATION_HINT",
        LC_VERSION_MIN_TVOS => "LC_VERSION_MIN_TVOS",
        LC_VERSION_MIN_WATCHOS => "LC_VERSION_MIN_WATCHOS",
        LC_NOTE => "LC_NOTE",
        LC_BUILD_VERSION => "LC_BUILD_VERSION",
        LC_DYLD_EXPORTS_TRIE => "LC_DYLD_EXPORTS_TRIE",
        LC_DYLD_CHAINED_FIXUPS => "LC_DYLD_CHAINED_FIXUPS",
        LC_FILESET_ENTRY => "LC_FILESET_ENTRY",
        LC_ATOM_INFO => "LC_ATOM_INFO",
        _ => return None,
    })
}

// =============================================================================
// Walker
// =============================================================================

/// A load command as it sits in the table, before typed decoding.
#[derive(Debug, Clone, Copy)]
pub struct RawCommand<'a> {
    /// Command tag
    pub cmd: u32,
    /// Declared size
    pub cmdsize: u32,
    /// Offset from the start of the slice
    pub offset: usize,
    /// Exactly `cmdsize` bytes, header included
    pub bytes: &'a [u8],
}

/// Walker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// Commands left to read and the offset of the next one
    Scanning {
        /// Commands not yet read
        remaining: u32,
        /// Offset of the next command header
        offset: usize,
    },
    /// The count ran out or the table end was reached
    Done {
        /// Commands read
        parsed: u32,
        /// Bytes of command table consumed
        consumed: usize,
    },
    /// A structural violation stopped the walk at `offset`
    Aborted {
        /// Offset of the offending command
        offset: usize,
    },
}

/// Iterates the load command table of one slice.
///
/// Yields at most one `Err`, after which the walk is [`WalkState::Aborted`].
/// The cursor always advances by the declared `cmdsize`, no matter how much
/// of the command a decoder reads.
#[derive(Debug)]
pub struct LoadCommandWalker<'a> {
    data: &'a [u8],
    endian: Endian,
    start: usize,
    table_end: usize,
    ncmds: u32,
    sizeofcmds: u32,
    parsed: u32,
    state: WalkState,
}

impl<'a> LoadCommandWalker<'a> {
    /// Creates a walker for the table described by `header`.
    pub fn new(data: &'a [u8], header: &ArchitectureHeader) -> Self {
        let start = header.size();
        Self {
            data,
            endian: header.endian,
            start,
            table_end: header.command_table_end(),
            ncmds: header.ncmds,
            sizeofcmds: header.sizeofcmds,
            parsed: 0,
            state: WalkState::Scanning {
                remaining: header.ncmds,
                offset: start,
            },
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> WalkState {
        self.state
    }

    /// After a clean finish, reports a disagreement between the declared
    /// command count and the declared table size.
    pub fn mismatch(&self) -> Option<Error> {
        match self.state {
            WalkState::Done { parsed, consumed }
                if parsed != self.ncmds || consumed != self.sizeofcmds as usize =>
            {
                Some(Error::CommandTableMismatch {
                    ncmds: self.ncmds,
                    sizeofcmds: self.sizeofcmds,
                    parsed,
                    consumed,
                })
            }
            _ => None,
        }
    }

    fn abort(&mut self, offset: usize, cmdsize: u32, reason: impl Into<String>) -> Error {
        self.state = WalkState::Aborted { offset };
        Error::truncated(offset, cmdsize, reason)
    }

    fn step(&mut self, remaining: u32, offset: usize) -> Option<Result<RawCommand<'a>>> {
        if remaining == 0 || offset >= self.table_end {
            self.state = WalkState::Done {
                parsed: self.parsed,
                consumed: offset - self.start,
            };
            return None;
        }

        if offset + LoadCommandHeader::SIZE > self.table_end {
            return Some(Err(self.abort(
                offset,
                0,
                "command header crosses the end of the command table",
            )));
        }

        let header = match ByteCursor::at(self.data, offset)
            .and_then(|mut cursor| LoadCommandHeader::decode(&mut cursor, self.endian))
        {
            Ok(header) => header,
            Err(_) => {
                return Some(Err(self.abort(
                    offset,
                    0,
                    "command header extends past end of file",
                )))
            }
        };

        let cmdsize = header.cmdsize as usize;
        if cmdsize < LoadCommandHeader::SIZE {
            return Some(Err(self.abort(
                offset,
                header.cmdsize,
                "cmdsize smaller than the command header",
            )));
        }

        let end = match offset.checked_add(cmdsize) {
            Some(end) if end <= self.table_end => end,
            _ => {
                return Some(Err(self.abort(
                    offset,
                    header.cmdsize,
                    "command extends past the end of the command table",
                )))
            }
        };

        if end > self.data.len() {
            return Some(Err(self.abort(
                offset,
                header.cmdsize,
                "command extends past end of file",
            )));
        }

        self.parsed += 1;
        self.state = WalkState::Scanning {
            remaining: remaining - 1,
            offset: end,
        };

        trace!(
            "Load command {:#x} at {:#x} ({} bytes)",
            header.cmd,
            offset,
            header.cmdsize
        );

        Some(Ok(RawCommand {
            cmd: header.cmd,
            cmdsize: header.cmdsize,
            offset,
            bytes: &self.data[offset..end],
        }))
    }
}

impl<'a> Iterator for LoadCommandWalker<'a> {
    type Item = Result<RawCommand<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            WalkState::Scanning { remaining, offset } => self.step(remaining, offset),
            WalkState::Done { .. } | WalkState::Aborted { .. } => None,
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// Slice-wide facts the typed decoders need.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext {
    /// Byte order of the slice
    pub endian: Endian,
    /// Pointer width of the slice
    pub width: AddressWidth,
    /// CPU type, for thread state layouts
    pub cputype: u32,
    /// Length of the slice in bytes
    pub file_len: usize,
}

impl DecodeContext {
    /// Builds the context for a slice.
    pub fn new(header: &ArchitectureHeader, file_len: usize) -> Self {
        Self {
            endian: header.endian,
            width: header.width,
            cputype: header.cputype,
            file_len,
        }
    }
}

/// A typed decoder. Recoverable problems that do not invalidate the whole
/// command are pushed to `warnings`; an `Err` rejects the command.
pub type Decoder = fn(&RawCommand<'_>, &DecodeContext, &mut Vec<Error>) -> Result<Command>;

/// Tag to decoder table.
pub const DECODERS: &[(u32, Decoder)] = &[
    (LC_SEGMENT, decode_segment_command),
    (LC_SEGMENT_64, decode_segment_command),
    (LC_SYMTAB, decode_symtab),
    (LC_DYSYMTAB, decode_dysymtab),
    (LC_LOAD_DYLIB, decode_dylib),
    (LC_LOAD_WEAK_DYLIB, decode_dylib),
    (LC_REEXPORT_DYLIB, decode_dylib),
    (LC_LAZY_LOAD_DYLIB, decode_dylib),
    (LC_LOAD_UPWARD_DYLIB, decode_dylib),
    (LC_ID_DYLIB, decode_dylib),
    (LC_LOAD_DYLINKER, decode_dylinker),
    (LC_ID_DYLINKER, decode_dylinker),
    (LC_RPATH, decode_rpath),
    (LC_MAIN, decode_main),
    (LC_THREAD, decode_thread),
    (LC_UNIXTHREAD, decode_thread),
    (LC_CODE_SIGNATURE, decode_linkedit),
    (LC_FUNCTION_STARTS, decode_linkedit),
    (LC_DATA_IN_CODE, decode_linkedit),
    (LC_SEGMENT_SPLIT_INFO, decode_linkedit),
    (LC_DYLIB_CODE_SIGN_DRS, decode_linkedit),
    (LC_LINKER_OPTIMIZATION_HINT, decode_linkedit),
    (LC_DYLD_EXPORTS_TRIE, decode_linkedit),
    (LC_DYLD_CHAINED_FIXUPS, decode_linkedit),
    (LC_ATOM_INFO, decode_linkedit),
    (LC_DYLD_INFO, decode_dyld_info),
    (LC_DYLD_INFO_ONLY, decode_dyld_info),
    (LC_UUID, decode_uuid),
    (LC_BUILD_VERSION, decode_build_version),
    (LC_VERSION_MIN_MACOSX, decode_version_min),
    (LC_VERSION_MIN_IPHONEOS, decode_version_min),
    (LC_VERSION_MIN_TVOS, decode_version_min),
    (LC_VERSION_MIN_WATCHOS, decode_version_min),
    (LC_SOURCE_VERSION, decode_source_version),
    (LC_ENCRYPTION_INFO, decode_encryption_info),
    (LC_ENCRYPTION_INFO_64, decode_encryption_info),
];

/// Looks up the decoder for a command tag.
pub fn decoder_for(cmd: u32) -> Option<Decoder> {
    DECODERS
        .iter()
        .find(|(tag, _)| *tag == cmd)
        .map(|&(_, decoder)| decoder)
}

/// Decodes one raw command, recording any problem in `warnings`.
pub fn dispatch(raw: &RawCommand<'_>, ctx: &DecodeContext, warnings: &mut Vec<Error>) -> Command {
    match decoder_for(raw.cmd) {
        Some(decode) => match decode(raw, ctx, warnings) {
            Ok(command) => command,
            Err(e) => {
                let e = match e {
                    Error::OutOfBounds { .. } => Error::malformed(
                        raw.cmd,
                        raw.offset,
                        format!("{} bytes is too short for its fields", raw.cmdsize),
                    ),
                    other => other,
                };
                debug!("Rejected load command at {:#x}: {}", raw.offset, e);
                warnings.push(e);
                Command::Rejected
            }
        },
        None if load_command_name(raw.cmd).is_some() => Command::Other,
        None => {
            debug!("Unknown load command {:#x} at {:#x}", raw.cmd, raw.offset);
            warnings.push(Error::UnknownLoadCommand {
                cmd: raw.cmd,
                offset: raw.offset,
            });
            Command::Unknown(raw.bytes[LoadCommandHeader::SIZE..].to_vec())
        }
    }
}

/// Walks the command table of a slice and decodes every command.
///
/// Returns the commands read before the walk ended and the warnings raised
/// along the way.
pub fn walk_load_commands(
    data: &[u8],
    header: &ArchitectureHeader,
) -> (Vec<LoadCommand>, Vec<Error>) {
    let ctx = DecodeContext::new(header, data.len());
    let mut walker = LoadCommandWalker::new(data, header);
    let mut commands = Vec::with_capacity((header.ncmds as usize).min(256));
    let mut warnings = Vec::new();

    for item in walker.by_ref() {
        match item {
            Ok(raw) => {
                let command = dispatch(&raw, &ctx, &mut warnings);
                commands.push(LoadCommand {
                    cmd: raw.cmd,
                    cmdsize: raw.cmdsize,
                    offset: raw.offset,
                    command,
                });
            }
            Err(e) => {
                debug!("Load command walk aborted: {}", e);
                warnings.push(e);
            }
        }
    }

    if let Some(mismatch) = walker.mismatch() {
        debug!("{}", mismatch);
        warnings.push(mismatch);
    }

    (commands, warnings)
}

// =============================================================================
// Typed Decoders
// =============================================================================

fn payload<'a>(raw: &RawCommand<'a>) -> Result<ByteCursor<'a>> {
    ByteCursor::at(raw.bytes, LoadCommandHeader::SIZE)
}

/// Like [`payload`], but rejects a command smaller than its fixed record.
fn sized_payload<'a>(raw: &RawCommand<'a>, size: usize) -> Result<ByteCursor<'a>> {
    if raw.bytes.len() < size {
        return Err(Error::malformed(
            raw.cmd,
            raw.offset,
            format!("cmdsize {} is smaller than the {}-byte record", raw.cmdsize, size),
        ));
    }
    payload(raw)
}

/// Reads an `lc_str` at `name_offset` from the start of the command.
///
/// `fixed` is the size of the command's fixed fields; the string may not
/// overlap them.
fn lc_str(raw: &RawCommand<'_>, name_offset: u32, fixed: usize) -> Result<String> {
    let at = name_offset as usize;
    if at < fixed || at >= raw.bytes.len() {
        return Err(Error::malformed(
            raw.cmd,
            raw.offset,
            format!(
                "string offset {} outside command (fixed part {}, cmdsize {})",
                name_offset, fixed, raw.cmdsize
            ),
        ));
    }
    Ok(c_str_lossy(&raw.bytes[at..]))
}

fn decode_segment_command(
    raw: &RawCommand<'_>,
    ctx: &DecodeContext,
    warnings: &mut Vec<Error>,
) -> Result<Command> {
    decode_segment(raw, ctx, warnings).map(Command::Segment)
}

fn decode_symtab(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, SymtabCommand::SIZE)?;
    SymtabCommand::decode(&mut cursor, ctx.endian).map(Command::Symtab)
}

fn decode_dysymtab(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, DysymtabCommand::SIZE)?;
    DysymtabCommand::decode(&mut cursor, ctx.endian).map(Command::Dysymtab)
}

fn decode_dylib(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    // dylib_command: cmd, cmdsize, name.offset, timestamp, current, compat
    const FIXED: usize = 24;

    let mut cursor = sized_payload(raw, FIXED)?;
    let name_offset = cursor.read_u32(ctx.endian)?;
    let timestamp = cursor.read_u32(ctx.endian)?;
    let current_version = cursor.read_u32(ctx.endian)?;
    let compatibility_version = cursor.read_u32(ctx.endian)?;
    let path = lc_str(raw, name_offset, FIXED)?;

    let library = LinkedLibrary {
        path,
        kind: DylibKind::from_cmd(raw.cmd),
        timestamp,
        current_version,
        compatibility_version,
    };

    Ok(if raw.cmd == LC_ID_DYLIB {
        Command::IdDylib(library)
    } else {
        Command::Dylib(library)
    })
}

fn decode_dylinker(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let name_offset = payload(raw)?.read_u32(ctx.endian)?;
    lc_str(raw, name_offset, 12).map(Command::Dylinker)
}

fn decode_rpath(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let path_offset = payload(raw)?.read_u32(ctx.endian)?;
    lc_str(raw, path_offset, 12).map(Command::Rpath)
}

fn decode_main(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, EntryPointCommand::SIZE)?;
    EntryPointCommand::decode(&mut cursor, ctx.endian).map(Command::Main)
}

fn decode_thread(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = payload(raw)?;
    ThreadCommand::decode(&mut cursor, ctx.endian, ctx.cputype).map(Command::Thread)
}

fn decode_linkedit(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, LinkeditDataCommand::SIZE)?;
    let command = LinkeditDataCommand::decode(&mut cursor, ctx.endian)?;
    Ok(if raw.cmd == LC_CODE_SIGNATURE {
        Command::CodeSignature(command)
    } else {
        Command::LinkeditData(command)
    })
}

fn decode_dyld_info(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, DyldInfoCommand::SIZE)?;
    DyldInfoCommand::decode(&mut cursor, ctx.endian).map(Command::DyldInfo)
}

fn decode_uuid(raw: &RawCommand<'_>, _: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    payload(raw)?.read_array::<16>().map(Command::Uuid)
}

fn decode_build_version(
    raw: &RawCommand<'_>,
    ctx: &DecodeContext,
    warnings: &mut Vec<Error>,
) -> Result<Command> {
    let mut cursor = sized_payload(raw, BuildVersionCommand::SIZE)?;
    let declared = raw
        .bytes
        .get(20..24)
        .map(|b| ctx.endian.read_u32(b))
        .unwrap_or(0);
    let command = BuildVersionCommand::decode(&mut cursor, ctx.endian)?;
    if command.tools.len() < declared as usize {
        warnings.push(Error::malformed(
            raw.cmd,
            raw.offset,
            format!(
                "{} build tools declared, {} fit in the command",
                declared,
                command.tools.len()
            ),
        ));
    }
    Ok(Command::BuildVersion(command))
}

fn decode_version_min(raw: &RawCommand<'_>, ctx: &DecodeContext, _: &mut Vec<Error>) -> Result<Command> {
    let mut cursor = sized_payload(raw, VersionMinCommand::SIZE)?;
    VersionMinCommand::decode(&mut cursor, ctx.endian, raw.cmd).map(Command::VersionMin)
}

fn decode_source_version(
    raw: &RawCommand<'_>,
    ctx: &DecodeContext,
    _: &mut Vec<Error>,
) -> Result<Command> {
    payload(raw)?.read_u64(ctx.endian).map(Command::SourceVersion)
}

fn decode_encryption_info(
    raw: &RawCommand<'_>,
    ctx: &DecodeContext,
    _: &mut Vec<Error>,
) -> Result<Command> {
    let mut cursor = sized_payload(raw, EncryptionInfoCommand::SIZE)?;
    EncryptionInfoCommand::decode(&mut cursor, ctx.endian).map(Command::EncryptionInfo)
}
