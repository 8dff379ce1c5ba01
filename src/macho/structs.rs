//! Mach-O binary structures.
//!
//! Fat tables are always big-endian, so they are declared with zerocopy's
//! big-endian integer types and read in place. Everything inside a slice
//! uses the slice's own byte order and is decoded field by field through a
//! [`ByteCursor`].

use std::fmt;

use zerocopy::byteorder::big_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use crate::error::Result;

// =============================================================================
// Fat Structures
// =============================================================================

/// Fat (universal) binary header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FatHeader {
    /// FAT_MAGIC or FAT_MAGIC_64
    pub magic: U32,
    /// Number of fat_arch entries that follow
    pub nfat_arch: U32,
}

impl FatHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 8;
}

/// Fat architecture entry with 32-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FatArch {
    /// CPU type
    pub cputype: U32,
    /// CPU subtype
    pub cpusubtype: U32,
    /// File offset to this slice
    pub offset: U32,
    /// Size of this slice
    pub size: U32,
    /// Alignment as a power of 2
    pub align: U32,
}

impl FatArch {
    /// Size of an entry in bytes.
    pub const SIZE: usize = 20;
}

/// Fat architecture entry with 64-bit offsets.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FatArch64 {
    /// CPU type
    pub cputype: U32,
    /// CPU subtype
    pub cpusubtype: U32,
    /// File offset to this slice
    pub offset: U64,
    /// Size of this slice
    pub size: U64,
    /// Alignment as a power of 2
    pub align: U32,
    /// Reserved
    pub reserved: U32,
}

impl FatArch64 {
    /// Size of an entry in bytes.
    pub const SIZE: usize = 32;
}

// =============================================================================
// Load Command Header
// =============================================================================

/// Generic load command header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadCommandHeader {
    /// Type of load command
    pub cmd: u32,
    /// Size of load command
    pub cmdsize: u32,
}

impl LoadCommandHeader {
    /// Size of the load command header.
    pub const SIZE: usize = 8;

    /// Reads a header at the cursor position.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            cmd: cursor.read_u32(endian)?,
            cmdsize: cursor.read_u32(endian)?,
        })
    }
}

// =============================================================================
// Symbol Table Commands
// =============================================================================

/// Symbol table command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SymtabCommand {
    /// Symbol table offset
    pub symoff: u32,
    /// Number of symbol table entries
    pub nsyms: u32,
    /// String table offset
    pub stroff: u32,
    /// String table size in bytes
    pub strsize: u32,
}

impl SymtabCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            symoff: cursor.read_u32(endian)?,
            nsyms: cursor.read_u32(endian)?,
            stroff: cursor.read_u32(endian)?,
            strsize: cursor.read_u32(endian)?,
        })
    }
}

/// Dynamic symbol table command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DysymtabCommand {
    /// Index of local symbols
    pub ilocalsym: u32,
    /// Number of local symbols
    pub nlocalsym: u32,
    /// Index of externally defined symbols
    pub iextdefsym: u32,
    /// Number of externally defined symbols
    pub nextdefsym: u32,
    /// Index of undefined symbols
    pub iundefsym: u32,
    /// Number of undefined symbols
    pub nundefsym: u32,
    /// File offset to table of contents
    pub tocoff: u32,
    /// Number of entries in table of contents
    pub ntoc: u32,
    /// File offset to module table
    pub modtaboff: u32,
    /// Number of module table entries
    pub nmodtab: u32,
    /// Offset to referenced symbol table
    pub extrefsymoff: u32,
    /// Number of referenced symbol table entries
    pub nextrefsyms: u32,
    /// File offset to the indirect symbol table
    pub indirectsymoff: u32,
    /// Number of indirect symbol table entries
    pub nindirectsyms: u32,
    /// Offset to external relocation entries
    pub extreloff: u32,
    /// Number of external relocation entries
    pub nextrel: u32,
    /// Offset to local relocation entries
    pub locreloff: u32,
    /// Number of local relocation entries
    pub nlocrel: u32,
}

impl DysymtabCommand {
    /// Size of this command.
    pub const SIZE: usize = 80;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        let mut f = [0u32; 18];
        for field in f.iter_mut() {
            *field = cursor.read_u32(endian)?;
        }
        Ok(Self {
            ilocalsym: f[0],
            nlocalsym: f[1],
            iextdefsym: f[2],
            nextdefsym: f[3],
            iundefsym: f[4],
            nundefsym: f[5],
            tocoff: f[6],
            ntoc: f[7],
            modtaboff: f[8],
            nmodtab: f[9],
            extrefsymoff: f[10],
            nextrefsyms: f[11],
            indirectsymoff: f[12],
            nindirectsyms: f[13],
            extreloff: f[14],
            nextrel: f[15],
            locreloff: f[16],
            nlocrel: f[17],
        })
    }
}

// =============================================================================
// Dyld Info Command
// =============================================================================

/// Dyld info command (compressed LINKEDIT information).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DyldInfoCommand {
    /// File offset to rebase info
    pub rebase_off: u32,
    /// Size of rebase info
    pub rebase_size: u32,
    /// File offset to binding info
    pub bind_off: u32,
    /// Size of binding info
    pub bind_size: u32,
    /// File offset to weak binding info
    pub weak_bind_off: u32,
    /// Size of weak binding info
    pub weak_bind_size: u32,
    /// File offset to lazy binding info
    pub lazy_bind_off: u32,
    /// Size of lazy binding info
    pub lazy_bind_size: u32,
    /// File offset to export info
    pub export_off: u32,
    /// Size of export info
    pub export_size: u32,
}

impl DyldInfoCommand {
    /// Size of this command.
    pub const SIZE: usize = 48;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            rebase_off: cursor.read_u32(endian)?,
            rebase_size: cursor.read_u32(endian)?,
            bind_off: cursor.read_u32(endian)?,
            bind_size: cursor.read_u32(endian)?,
            weak_bind_off: cursor.read_u32(endian)?,
            weak_bind_size: cursor.read_u32(endian)?,
            lazy_bind_off: cursor.read_u32(endian)?,
            lazy_bind_size: cursor.read_u32(endian)?,
            export_off: cursor.read_u32(endian)?,
            export_size: cursor.read_u32(endian)?,
        })
    }
}

// =============================================================================
// Linkedit Data Command
// =============================================================================

/// Generic linkedit data command (LC_CODE_SIGNATURE, LC_FUNCTION_STARTS, etc.).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkeditDataCommand {
    /// File offset, relative to the slice
    pub dataoff: u32,
    /// Size
    pub datasize: u32,
}

impl LinkeditDataCommand {
    /// Size of this command.
    pub const SIZE: usize = 16;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            dataoff: cursor.read_u32(endian)?,
            datasize: cursor.read_u32(endian)?,
        })
    }
}

// =============================================================================
// Entry Point Commands
// =============================================================================

/// LC_MAIN entry point command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryPointCommand {
    /// Offset of main() from the start of __TEXT
    pub entryoff: u64,
    /// Initial stack size, 0 for the default
    pub stacksize: u64,
}

impl EntryPointCommand {
    /// Size of this command.
    pub const SIZE: usize = 24;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            entryoff: cursor.read_u64(endian)?,
            stacksize: cursor.read_u64(endian)?,
        })
    }
}

/// LC_THREAD / LC_UNIXTHREAD command.
///
/// Only the first thread state is kept; `pc` is present when the flavor is
/// one whose program counter location is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThreadCommand {
    /// Thread state flavor
    pub flavor: u32,
    /// Size of the state in 32-bit words
    pub count: u32,
    /// Initial program counter
    pub pc: Option<u64>,
}

impl ThreadCommand {
    /// Decodes the first state following the command header.
    ///
    /// `cputype` selects the register layout.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian, cputype: u32) -> Result<Self> {
        let mut flavor = cursor.read_u32(endian)?;
        let mut count = cursor.read_u32(endian)?;

        // x86_THREAD_STATE wraps the real flavor in a second header
        if flavor == X86_THREAD_STATE
            && matches!(cputype, CPU_TYPE_X86 | CPU_TYPE_X86_64)
            && cursor.remaining() >= 8
        {
            flavor = cursor.read_u32(endian)?;
            count = cursor.read_u32(endian)?;
        }

        let state_len = (count as usize).saturating_mul(4).min(cursor.remaining());
        let state = cursor.read_fixed_bytes(state_len)?;
        let pc = thread_pc(cputype, flavor, state, endian);

        Ok(Self { flavor, count, pc })
    }
}

/// Extracts the program counter from a thread state.
fn thread_pc(cputype: u32, flavor: u32, state: &[u8], endian: Endian) -> Option<u64> {
    // (register index, register width)
    let (index, width) = match (cputype, flavor) {
        (CPU_TYPE_X86, X86_THREAD_STATE32) => (10, 4),
        (CPU_TYPE_X86_64, X86_THREAD_STATE64) => (16, 8),
        (CPU_TYPE_ARM, ARM_THREAD_STATE) => (15, 4),
        (CPU_TYPE_ARM64 | CPU_TYPE_ARM64_32, ARM_THREAD_STATE64) => (32, 8),
        (CPU_TYPE_POWERPC, PPC_THREAD_STATE) => (0, 4),
        (CPU_TYPE_POWERPC64, PPC_THREAD_STATE64) => (0, 8),
        _ => return None,
    };
    let start = index * width;
    let bytes = state.get(start..start + width)?;
    Some(if width == 8 {
        endian.read_u64(bytes)
    } else {
        u64::from(endian.read_u32(bytes))
    })
}

// =============================================================================
// Version Commands
// =============================================================================

/// Build tool entry of LC_BUILD_VERSION.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildTool {
    /// Tool identifier (1=clang, 2=swift, 3=ld)
    pub tool: u32,
    /// Tool version, packed
    pub version: u32,
}

/// Build version command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildVersionCommand {
    /// Platform
    pub platform: u32,
    /// Minimum OS version (X.Y.Z packed into 32 bits)
    pub minos: u32,
    /// SDK version (X.Y.Z packed into 32 bits)
    pub sdk: u32,
    /// Tool entries that fit inside the command
    pub tools: Vec<BuildTool>,
}

impl BuildVersionCommand {
    /// Size of this command (without tool entries).
    pub const SIZE: usize = 24;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        let platform = cursor.read_u32(endian)?;
        let minos = cursor.read_u32(endian)?;
        let sdk = cursor.read_u32(endian)?;
        let ntools = cursor.read_u32(endian)?;

        let fits = cursor.remaining() / 8;
        let mut tools = Vec::with_capacity((ntools as usize).min(fits));
        for _ in 0..(ntools as usize).min(fits) {
            tools.push(BuildTool {
                tool: cursor.read_u32(endian)?,
                version: cursor.read_u32(endian)?,
            });
        }

        Ok(Self {
            platform,
            minos,
            sdk,
            tools,
        })
    }

    /// Returns the platform name.
    pub fn platform_name(&self) -> &'static str {
        platform_name(self.platform)
    }
}

/// LC_VERSION_MIN_* command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionMinCommand {
    /// Platform implied by the command tag
    pub platform: u32,
    /// Minimum OS version, packed
    pub version: u32,
    /// SDK version, packed
    pub sdk: u32,
}

impl VersionMinCommand {
    /// Size of this command.
    pub const SIZE: usize = 16;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian, cmd: u32) -> Result<Self> {
        let platform = match cmd {
            LC_VERSION_MIN_MACOSX => PLATFORM_MACOS,
            LC_VERSION_MIN_IPHONEOS => PLATFORM_IOS,
            LC_VERSION_MIN_TVOS => PLATFORM_TVOS,
            LC_VERSION_MIN_WATCHOS => PLATFORM_WATCHOS,
            _ => 0,
        };
        Ok(Self {
            platform,
            version: cursor.read_u32(endian)?,
            sdk: cursor.read_u32(endian)?,
        })
    }
}

/// Returns the display name of a build platform.
pub fn platform_name(platform: u32) -> &'static str {
    match platform {
        PLATFORM_MACOS => "macOS",
        PLATFORM_IOS => "iOS",
        PLATFORM_TVOS => "tvOS",
        PLATFORM_WATCHOS => "watchOS",
        PLATFORM_BRIDGEOS => "bridgeOS",
        PLATFORM_MACCATALYST => "Mac Catalyst",
        PLATFORM_IOSSIMULATOR => "iOS Simulator",
        PLATFORM_TVOSSIMULATOR => "tvOS Simulator",
        PLATFORM_WATCHOSSIMULATOR => "watchOS Simulator",
        PLATFORM_DRIVERKIT => "DriverKit",
        PLATFORM_VISIONOS => "visionOS",
        PLATFORM_VISIONOSSIMULATOR => "visionOS Simulator",
        _ => "unknown",
    }
}

// =============================================================================
// Encryption Info Command
// =============================================================================

/// LC_ENCRYPTION_INFO / LC_ENCRYPTION_INFO_64 command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptionInfoCommand {
    /// File offset of encrypted range
    pub cryptoff: u32,
    /// Size of encrypted range
    pub cryptsize: u32,
    /// Encryption system ID (0 = not encrypted yet)
    pub cryptid: u32,
}

impl EncryptionInfoCommand {
    /// Size of the 32-bit command (the 64-bit form adds 4 bytes of padding).
    pub const SIZE: usize = 20;

    /// Decodes the fields following the command header.
    pub fn decode(cursor: &mut ByteCursor<'_>, endian: Endian) -> Result<Self> {
        Ok(Self {
            cryptoff: cursor.read_u32(endian)?,
            cryptsize: cursor.read_u32(endian)?,
            cryptid: cursor.read_u32(endian)?,
        })
    }

    /// Returns true if the range is currently encrypted.
    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.cryptid != 0
    }
}

// =============================================================================
// Display Implementations
// =============================================================================

impl fmt::Display for SymtabCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Symtab {{ symbols: {} at {:#x}, strings: {:#x}+{:#x} }}",
            self.nsyms, self.symoff, self.stroff, self.strsize
        )
    }
}

impl fmt::Display for LinkeditDataCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{:#x}", self.dataoff, self.datasize)
    }
}
