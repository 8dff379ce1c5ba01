//! Error types for Mach-O parsing.
//!
//! A single enum covers both tiers of failure. Fatal variants abort a whole
//! [`parse`](crate::parse) call; recoverable variants are collected as
//! warnings on the report of the slice they were found in and parsing
//! continues past them.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for Mach-O parsing.
#[derive(Error, Debug)]
pub enum Error {
    // ==================== I/O Errors ====================
    /// Reading the input failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input file could not be opened.
    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        /// Path of the input
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The input file could not be mapped.
    #[error("failed to memory map file '{path}': {source}")]
    MemoryMap {
        /// Path of the input
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    // ==================== Container Errors ====================
    /// The first four bytes are neither a thin nor a fat magic.
    #[error("not a Mach-O file (magic: {0:#010x})")]
    UnknownMagic(u32),

    /// The fat table (`index: None`) or one of its entries cannot be used.
    #[error("{}", fat_message(.index, .reason))]
    UnsupportedFatFormat {
        /// Entry index, `None` for the table itself
        index: Option<u32>,
        /// What is wrong
        reason: String,
    },

    /// One fat slice failed to parse.
    #[error("architecture slice {index} skipped: {source}")]
    Slice {
        /// Fat table index of the slice
        index: u32,
        /// Why the slice was rejected
        #[source]
        source: Box<Error>,
    },

    /// Every slice of a fat file was rejected.
    #[error("no usable architecture in fat binary ({slices} slices declared)")]
    NoValidArchitecture {
        /// Declared slice count
        slices: u32,
    },

    // ==================== Read Errors ====================
    /// A read ran past the end of its buffer.
    #[error("read of {width} bytes at offset {offset:#x} exceeds buffer length {len:#x}")]
    OutOfBounds {
        /// Start of the read
        offset: usize,
        /// Bytes requested
        width: usize,
        /// Buffer length
        len: usize,
    },

    /// The input has a Mach-O magic but is too short for the header.
    #[error("truncated Mach-O header: {len} bytes, {needed} needed")]
    TruncatedHeader {
        /// Bytes available
        len: usize,
        /// Header size for the detected layout
        needed: usize,
    },

    // ==================== Load Command Errors ====================
    /// A load command breaks the table structure; the walk stops here.
    #[error("truncated load command at offset {offset:#x} (cmdsize {cmdsize}): {reason}")]
    TruncatedCommand {
        /// Offset of the command in the slice
        offset: usize,
        /// Declared size, 0 if the header itself was unreadable
        cmdsize: u32,
        /// What is wrong
        reason: String,
    },

    /// A load command is structurally sound but its fields are not.
    #[error("malformed load command {cmd:#x} at offset {offset:#x}: {reason}")]
    MalformedCommand {
        /// Command tag
        cmd: u32,
        /// Offset of the command in the slice
        offset: usize,
        /// What is wrong
        reason: String,
    },

    /// `ncmds` and `sizeofcmds` disagree with the table that was walked.
    #[error(
        "load command table mismatch: header declares {ncmds} commands in {sizeofcmds} bytes, \
         walked {parsed} commands in {consumed} bytes"
    )]
    CommandTableMismatch {
        /// Declared command count
        ncmds: u32,
        /// Declared table size
        sizeofcmds: u32,
        /// Commands walked
        parsed: u32,
        /// Bytes walked
        consumed: usize,
    },

    /// Unrecognized load command tag.
    #[error("unknown load command {cmd:#x} at offset {offset:#x}, skipped")]
    UnknownLoadCommand {
        /// Command tag
        cmd: u32,
        /// Offset of the command in the slice
        offset: usize,
    },

    // ==================== Segment Errors ====================
    /// A segment's file range lies outside the slice.
    #[error(
        "segment '{name}' file range {fileoff:#x}+{filesize:#x} exceeds file length {file_len:#x}"
    )]
    InvalidSegmentBounds {
        /// Segment name
        name: String,
        /// Declared file offset
        fileoff: u64,
        /// Declared file size
        filesize: u64,
        /// Slice length
        file_len: usize,
    },

    /// A section's file range lies outside the slice.
    #[error(
        "section '{segment},{section}' file range {offset:#x}+{size:#x} exceeds file length {file_len:#x}"
    )]
    InvalidSectionBounds {
        /// Segment name
        segment: String,
        /// Section name
        section: String,
        /// Declared file offset
        offset: u64,
        /// Declared size
        size: u64,
        /// Slice length
        file_len: usize,
    },

    // ==================== Symbol Errors ====================
    /// The symbol or string table does not fit in the slice.
    #[error("invalid symbol table: {reason}")]
    InvalidSymbolTable {
        /// What is wrong
        reason: String,
    },

    /// A symbol name runs to the end of the string table.
    #[error("symbol {index}: name at string index {strx} is not NUL-terminated")]
    UnterminatedSymbolName {
        /// Symbol index
        index: usize,
        /// String table index of the name
        strx: u32,
    },

    /// A symbol's string index is past the string table.
    #[error("symbol {index}: string index {strx} out of bounds (size: {strsize})")]
    SymbolNameOutOfBounds {
        /// Symbol index
        index: usize,
        /// String table index of the name
        strx: u32,
        /// String table size
        strsize: u32,
    },

    // ==================== Code Signature Errors ====================
    /// The code signature blob could not be fully decoded.
    #[error("invalid code signature at offset {offset:#x}: {reason}")]
    InvalidCodeSignature {
        /// Offset of the signature in the slice
        offset: u64,
        /// What is wrong
        reason: String,
    },

    // ==================== Strict Mode ====================
    /// Strict mode found at least one warning.
    #[error("strict mode: {count} warning(s), first: {first}")]
    Strict {
        /// Total warnings
        count: usize,
        /// First warning, file-level ones first
        first: Box<Error>,
    },
}

/// A specialized Result type for Mach-O parsing.
pub type Result<T> = std::result::Result<T, Error>;

fn fat_message(index: &Option<u32>, reason: &str) -> String {
    match index {
        Some(i) => format!("unsupported fat architecture entry {}: {}", i, reason),
        None => format!("unsupported fat header: {}", reason),
    }
}

impl Error {
    /// Returns true if this error is collected as a warning instead of
    /// failing the whole parse.
    ///
    /// `UnsupportedFatFormat` is recoverable only when it names a single
    /// entry of the fat table.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::UnsupportedFatFormat { index, .. } => index.is_some(),
            Error::OutOfBounds { .. }
            | Error::Slice { .. }
            | Error::TruncatedCommand { .. }
            | Error::MalformedCommand { .. }
            | Error::CommandTableMismatch { .. }
            | Error::UnknownLoadCommand { .. }
            | Error::InvalidSegmentBounds { .. }
            | Error::InvalidSectionBounds { .. }
            | Error::InvalidSymbolTable { .. }
            | Error::UnterminatedSymbolName { .. }
            | Error::SymbolNameOutOfBounds { .. }
            | Error::InvalidCodeSignature { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the file itself could not be read.
    #[inline]
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::FileOpen { .. } | Error::MemoryMap { .. }
        )
    }

    /// Creates an out of bounds error.
    #[inline]
    pub fn out_of_bounds(offset: usize, width: usize, len: usize) -> Self {
        Error::OutOfBounds { offset, width, len }
    }

    /// Creates a truncated command error.
    #[inline]
    pub fn truncated(offset: usize, cmdsize: u32, reason: impl Into<String>) -> Self {
        Error::TruncatedCommand {
            offset,
            cmdsize,
            reason: reason.into(),
        }
    }

    /// Creates a malformed command error.
    #[inline]
    pub fn malformed(cmd: u32, offset: usize, reason: impl Into<String>) -> Self {
        Error::MalformedCommand {
            cmd,
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an unsupported fat format error.
    #[inline]
    pub fn fat(index: Option<u32>, reason: impl Into<String>) -> Self {
        Error::UnsupportedFatFormat {
            index,
            reason: reason.into(),
        }
    }

    /// Creates an invalid code signature error.
    #[inline]
    pub fn signature(offset: u64, reason: impl Into<String>) -> Self {
        Error::InvalidCodeSignature {
            offset,
            reason: reason.into(),
        }
    }
}
