//! Header decoding and container detection.
//!
//! A file is either a thin Mach-O (one architecture starting at offset 0) or
//! a fat wrapper holding a big-endian table of architecture slices. Both are
//! reduced to a list of [`SliceEntry`] values so the rest of the parser only
//! ever deals with one slice at a time.

use std::fmt;

use tracing::debug;
use zerocopy::FromBytes;

use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use super::structs::{FatArch, FatArch64, FatHeader};
use crate::error::{Error, Result};

// =============================================================================
// Address Width
// =============================================================================

/// Pointer width of a Mach-O slice, selected by its magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressWidth {
    /// `mach_header` layout
    Bits32,
    /// `mach_header_64` layout
    Bits64,
}

impl AddressWidth {
    /// Returns 32 or 64.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            AddressWidth::Bits32 => 32,
            AddressWidth::Bits64 => 64,
        }
    }

    /// Returns true for 64-bit slices.
    #[inline]
    pub fn is_64(self) -> bool {
        self == AddressWidth::Bits64
    }

    /// Size of the Mach-O header.
    #[inline]
    pub fn header_size(self) -> usize {
        match self {
            AddressWidth::Bits32 => 28,
            AddressWidth::Bits64 => 32,
        }
    }

    /// Size of a segment command without its sections.
    #[inline]
    pub fn segment_command_size(self) -> usize {
        match self {
            AddressWidth::Bits32 => 56,
            AddressWidth::Bits64 => 72,
        }
    }

    /// Size of a section record.
    #[inline]
    pub fn section_size(self) -> usize {
        match self {
            AddressWidth::Bits32 => 68,
            AddressWidth::Bits64 => 80,
        }
    }

    /// Size of an nlist record.
    #[inline]
    pub fn nlist_size(self) -> usize {
        match self {
            AddressWidth::Bits32 => 12,
            AddressWidth::Bits64 => 16,
        }
    }
}

// =============================================================================
// Architecture Header
// =============================================================================

/// Decoded header of one architecture slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchitectureHeader {
    /// Magic decoded in the slice's own byte order (MH_MAGIC or MH_MAGIC_64)
    pub magic: u32,
    /// CPU type
    pub cputype: u32,
    /// CPU subtype
    pub cpusubtype: u32,
    /// File type
    pub filetype: u32,
    /// Number of load commands
    pub ncmds: u32,
    /// Size of load commands
    pub sizeofcmds: u32,
    /// Flags
    pub flags: u32,
    /// Reserved (64-bit header only)
    pub reserved: u32,
    /// Byte order of every field in the slice
    pub endian: Endian,
    /// Header layout and pointer width
    pub width: AddressWidth,
}

impl ArchitectureHeader {
    /// Decodes the header at the start of a slice.
    ///
    /// Fails with [`Error::UnknownMagic`] if the first four bytes are not a
    /// thin Mach-O magic in either byte order, and with
    /// [`Error::TruncatedHeader`] if the header does not fit.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (endian, width) = match peek_magic(data, Endian::Little) {
            MH_MAGIC => (Endian::Little, AddressWidth::Bits32),
            MH_MAGIC_64 => (Endian::Little, AddressWidth::Bits64),
            MH_CIGAM => (Endian::Big, AddressWidth::Bits32),
            MH_CIGAM_64 => (Endian::Big, AddressWidth::Bits64),
            _ => return Err(Error::UnknownMagic(peek_magic(data, Endian::Big))),
        };

        if data.len() < width.header_size() {
            return Err(Error::TruncatedHeader {
                len: data.len(),
                needed: width.header_size(),
            });
        }
        let magic = peek_magic(data, endian);

        let mut cursor = ByteCursor::at(data, 4)?;
        let cputype = cursor.read_u32(endian)?;
        let cpusubtype = cursor.read_u32(endian)?;
        let filetype = cursor.read_u32(endian)?;
        let ncmds = cursor.read_u32(endian)?;
        let sizeofcmds = cursor.read_u32(endian)?;
        let flags = cursor.read_u32(endian)?;
        let reserved = if width.is_64() {
            cursor.read_u32(endian)?
        } else {
            0
        };

        Ok(Self {
            magic,
            cputype,
            cpusubtype,
            filetype,
            ncmds,
            sizeofcmds,
            flags,
            reserved,
            endian,
            width,
        })
    }

    /// Size of the header in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.width.header_size()
    }

    /// Declared end offset of the load command table.
    #[inline]
    pub fn command_table_end(&self) -> usize {
        self.size().saturating_add(self.sizeofcmds as usize)
    }

    /// Returns the header flags.
    #[inline]
    pub fn flags(&self) -> MachOFlags {
        MachOFlags::from_bits_retain(self.flags)
    }

    /// Returns true if this is an ARM64e binary (with pointer authentication).
    #[inline]
    pub fn is_arm64e(&self) -> bool {
        self.cputype == CPU_TYPE_ARM64 && (self.cpusubtype & !CPU_SUBTYPE_MASK) == CPU_SUBTYPE_ARM64E
    }

    /// Returns the architecture as a string.
    pub fn arch_name(&self) -> &'static str {
        arch_name(self.cputype, self.cpusubtype)
    }

    /// Returns the file type as a string.
    pub fn filetype_name(&self) -> &'static str {
        filetype_name(self.filetype)
    }
}

impl fmt::Display for ArchitectureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MachO {{ arch: {}, {}-bit {}, type: {}, cmds: {}, flags: {:#x} }}",
            self.arch_name(),
            self.width.bits(),
            self.endian.name(),
            self.filetype_name(),
            self.ncmds,
            self.flags
        )
    }
}

/// Reads the first four bytes, zero-padding short inputs.
fn peek_magic(data: &[u8], endian: Endian) -> u32 {
    let mut raw = [0u8; 4];
    let n = data.len().min(4);
    raw[..n].copy_from_slice(&data[..n]);
    endian.read_u32(&raw)
}

/// Returns the architecture name for a CPU type/subtype pair.
pub fn arch_name(cputype: u32, cpusubtype: u32) -> &'static str {
    let subtype = cpusubtype & !CPU_SUBTYPE_MASK;
    match cputype {
        CPU_TYPE_ARM64 => match subtype {
            CPU_SUBTYPE_ARM64E => "arm64e",
            _ => "arm64",
        },
        CPU_TYPE_ARM64_32 => "arm64_32",
        CPU_TYPE_ARM => match subtype {
            CPU_SUBTYPE_ARM_V6 => "armv6",
            CPU_SUBTYPE_ARM_V7 => "armv7",
            CPU_SUBTYPE_ARM_V7S => "armv7s",
            CPU_SUBTYPE_ARM_V7K => "armv7k",
            CPU_SUBTYPE_ARM_V8 => "armv8",
            _ => "arm",
        },
        CPU_TYPE_X86_64 => match subtype {
            CPU_SUBTYPE_X86_64_H => "x86_64h",
            _ => "x86_64",
        },
        CPU_TYPE_X86 => "i386",
        CPU_TYPE_POWERPC => "ppc",
        CPU_TYPE_POWERPC64 => "ppc64",
        CPU_TYPE_MC680X0 => "m68k",
        CPU_TYPE_SPARC => "sparc",
        _ => "unknown",
    }
}

/// Returns the name of a Mach-O file type.
pub fn filetype_name(filetype: u32) -> &'static str {
    match filetype {
        MH_OBJECT => "object",
        MH_EXECUTE => "execute",
        MH_FVMLIB => "fvmlib",
        MH_CORE => "core",
        MH_PRELOAD => "preload",
        MH_DYLIB => "dylib",
        MH_DYLINKER => "dylinker",
        MH_BUNDLE => "bundle",
        MH_DYLIB_STUB => "dylib stub",
        MH_DSYM => "dsym",
        MH_KEXT_BUNDLE => "kext bundle",
        MH_FILESET => "fileset",
        _ => "unknown",
    }
}

// =============================================================================
// Containers
// =============================================================================

/// Outer format of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// A single architecture at offset 0
    Thin,
    /// A fat wrapper; `wide` is set for the FAT_MAGIC_64 variant
    Fat {
        /// 64-bit fat-arch entries
        wide: bool,
    },
}

/// Location of one architecture slice inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceEntry {
    /// Position in the fat table (0 for thin files)
    pub index: u32,
    /// CPU type declared by the fat table (0 for thin files)
    pub cputype: u32,
    /// CPU subtype declared by the fat table (0 for thin files)
    pub cpusubtype: u32,
    /// File offset of the slice
    pub offset: u64,
    /// Size of the slice
    pub size: u64,
    /// Alignment as a power of 2
    pub align: u32,
}

impl SliceEntry {
    /// Returns the architecture named by the fat table.
    pub fn arch_name(&self) -> &'static str {
        arch_name(self.cputype, self.cpusubtype)
    }
}

/// Result of container detection.
#[derive(Debug)]
pub struct Container {
    /// Thin or fat
    pub kind: ContainerKind,
    /// Slices whose file range is in bounds, in table order
    pub slices: Vec<SliceEntry>,
    /// Declared slice count (1 for thin files)
    pub declared: u32,
    /// Rejected fat-table entries
    pub warnings: Vec<Error>,
}

/// Identifies the container format and lists its slices.
///
/// Slice headers are not decoded here; a thin file is only checked for a
/// recognized magic.
pub fn decode_container(data: &[u8]) -> Result<Container> {
    let magic = peek_magic(data, Endian::Big);
    match magic {
        FAT_MAGIC => decode_fat(data, false),
        FAT_MAGIC_64 => decode_fat(data, true),
        _ => {
            let le = peek_magic(data, Endian::Little);
            if !matches!(le, MH_MAGIC | MH_MAGIC_64 | MH_CIGAM | MH_CIGAM_64) {
                return Err(Error::UnknownMagic(magic));
            }
            Ok(Container {
                kind: ContainerKind::Thin,
                slices: vec![SliceEntry {
                    index: 0,
                    cputype: 0,
                    cpusubtype: 0,
                    offset: 0,
                    size: data.len() as u64,
                    align: 0,
                }],
                declared: 1,
                warnings: Vec::new(),
            })
        }
    }
}

fn decode_fat(data: &[u8], wide: bool) -> Result<Container> {
    let header = FatHeader::read_from_prefix(data)
        .map_err(|_| Error::fat(None, "file too small for fat header"))?
        .0;
    let nfat_arch = header.nfat_arch.get();
    let entry_size = if wide { FatArch64::SIZE } else { FatArch::SIZE };

    let available = data.len() - FatHeader::SIZE;
    let needed = u64::from(nfat_arch) * entry_size as u64;
    if needed > available as u64 {
        return Err(Error::fat(
            None,
            format!(
                "{} architectures need {} bytes of fat table, {} available",
                nfat_arch, needed, available
            ),
        ));
    }

    debug!("Fat binary with {} architectures", nfat_arch);

    let mut slices = Vec::with_capacity(nfat_arch as usize);
    let mut warnings = Vec::new();

    for index in 0..nfat_arch {
        let entry_offset = FatHeader::SIZE + index as usize * entry_size;
        let table = &data[entry_offset..];
        let entry = if wide {
            let arch = FatArch64::read_from_prefix(table)
                .map_err(|_| Error::fat(Some(index), "entry truncated"))?
                .0;
            SliceEntry {
                index,
                cputype: arch.cputype.get(),
                cpusubtype: arch.cpusubtype.get(),
                offset: arch.offset.get(),
                size: arch.size.get(),
                align: arch.align.get(),
            }
        } else {
            let arch = FatArch::read_from_prefix(table)
                .map_err(|_| Error::fat(Some(index), "entry truncated"))?
                .0;
            SliceEntry {
                index,
                cputype: arch.cputype.get(),
                cpusubtype: arch.cpusubtype.get(),
                offset: u64::from(arch.offset.get()),
                size: u64::from(arch.size.get()),
                align: arch.align.get(),
            }
        };

        match entry.offset.checked_add(entry.size) {
            _ if entry.size == 0 => {
                warnings.push(Error::fat(Some(index), "empty slice"));
            }
            Some(end) if end <= data.len() as u64 => slices.push(entry),
            _ => {
                warnings.push(Error::fat(
                    Some(index),
                    format!(
                        "slice {:#x}+{:#x} exceeds file length {:#x}",
                        entry.offset,
                        entry.size,
                        data.len()
                    ),
                ));
            }
        }
    }

    Ok(Container {
        kind: ContainerKind::Fat { wide },
        slices,
        declared: nfat_arch,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::testutil::{fat, MachOBuilder};

    #[test]
    fn test_all_thin_magics() {
        let cases = [
            (AddressWidth::Bits32, Endian::Little, MH_MAGIC),
            (AddressWidth::Bits64, Endian::Little, MH_MAGIC_64),
            (AddressWidth::Bits32, Endian::Big, MH_MAGIC),
            (AddressWidth::Bits64, Endian::Big, MH_MAGIC_64),
        ];
        for (width, endian, magic) in cases {
            let data = MachOBuilder::new(width, endian)
                .cpu(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E)
                .build();
            let header = ArchitectureHeader::decode(&data).unwrap();
            assert_eq!(header.magic, magic);
            assert_eq!(header.width, width);
            assert_eq!(header.endian, endian);
            assert_eq!(header.cputype, CPU_TYPE_ARM64);
            assert_eq!(header.filetype, MH_EXECUTE);
            assert_eq!(header.size(), width.header_size());
            assert!(header.is_arm64e());
        }
    }

    #[test]
    fn test_unknown_magic() {
        let elf = b"\x7fELF\x02\x01\x01\x00";
        assert!(matches!(
            decode_container(elf),
            Err(Error::UnknownMagic(0x7F45_4C46))
        ));
        assert!(matches!(
            ArchitectureHeader::decode(elf),
            Err(Error::UnknownMagic(_))
        ));
        assert!(matches!(decode_container(&[]), Err(Error::UnknownMagic(0))));
    }

    #[test]
    fn test_truncated_header() {
        let data = MachOBuilder::new(AddressWidth::Bits64, Endian::Little).build();
        let err = ArchitectureHeader::decode(&data[..20]).unwrap_err();
        assert!(matches!(err, Error::TruncatedHeader { len: 20, needed: 32 }));
        assert!(!err.is_recoverable());

        let data = MachOBuilder::new(AddressWidth::Bits32, Endian::Big).build();
        assert!(matches!(
            ArchitectureHeader::decode(&data[..27]),
            Err(Error::TruncatedHeader { len: 27, needed: 28 })
        ));
    }

    #[test]
    fn test_thin_container() {
        let data = MachOBuilder::new(AddressWidth::Bits32, Endian::Big).build();
        let container = decode_container(&data).unwrap();
        assert_eq!(container.kind, ContainerKind::Thin);
        assert_eq!(container.slices.len(), 1);
        assert_eq!(container.slices[0].offset, 0);
        assert_eq!(container.slices[0].size, data.len() as u64);
    }

    #[test]
    fn test_fat_container() {
        let a = MachOBuilder::new(AddressWidth::Bits64, Endian::Little)
            .cpu(CPU_TYPE_X86_64, 3)
            .build();
        let b = MachOBuilder::new(AddressWidth::Bits64, Endian::Little)
            .cpu(CPU_TYPE_ARM64, 0)
            .build();
        let data = fat(&[(CPU_TYPE_X86_64, 3, &a[..]), (CPU_TYPE_ARM64, 0, &b[..])], false);

        let container = decode_container(&data).unwrap();
        assert_eq!(container.kind, ContainerKind::Fat { wide: false });
        assert_eq!(container.declared, 2);
        assert_eq!(container.slices.len(), 2);
        assert!(container.warnings.is_empty());
        assert_eq!(container.slices[0].arch_name(), "x86_64");
        assert_eq!(container.slices[1].arch_name(), "arm64");

        let s = &container.slices[1];
        let slice = &data[s.offset as usize..(s.offset + s.size) as usize];
        let header = ArchitectureHeader::decode(slice).unwrap();
        assert_eq!(header.cputype, CPU_TYPE_ARM64);
    }

    #[test]
    fn test_fat64_container() {
        let a = MachOBuilder::new(AddressWidth::Bits64, Endian::Little).build();
        let data = fat(&[(CPU_TYPE_ARM64, 0, &a[..])], true);
        let container = decode_container(&data).unwrap();
        assert_eq!(container.kind, ContainerKind::Fat { wide: true });
        assert_eq!(container.slices.len(), 1);
    }

    #[test]
    fn test_fat_table_exceeds_buffer() {
        let mut data = Vec::new();
        data.extend_from_slice(&FAT_MAGIC.to_be_bytes());
        data.extend_from_slice(&1000u32.to_be_bytes());
        data.extend_from_slice(&[0u8; 40]);
        let err = decode_container(&data).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFatFormat { index: None, .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_fat_entry_out_of_range() {
        let a = MachOBuilder::new(AddressWidth::Bits64, Endian::Little).build();
        let mut data = fat(&[(CPU_TYPE_ARM64, 0, &a[..]), (CPU_TYPE_X86_64, 3, &a[..])], false);
        // Second entry: size field at 8 + 20 + 12
        let size_at = FatHeader::SIZE + FatArch::SIZE + 12;
        data[size_at..size_at + 4].copy_from_slice(&0x7FFF_FFFFu32.to_be_bytes());

        let container = decode_container(&data).unwrap();
        assert_eq!(container.slices.len(), 1);
        assert_eq!(container.warnings.len(), 1);
        assert!(matches!(
            container.warnings[0],
            Error::UnsupportedFatFormat { index: Some(1), .. }
        ));
    }

    #[test]
    fn test_arch_names() {
        assert_eq!(arch_name(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64E | 0x8000_0000), "arm64e");
        assert_eq!(arch_name(CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL), "arm64");
        assert_eq!(arch_name(CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7S), "armv7s");
        assert_eq!(arch_name(CPU_TYPE_X86_64, CPU_SUBTYPE_X86_64_H), "x86_64h");
        assert_eq!(arch_name(CPU_TYPE_X86, 3), "i386");
        assert_eq!(arch_name(CPU_TYPE_POWERPC, 0), "ppc");
        assert_eq!(arch_name(0x1234, 0), "unknown");
    }
}
