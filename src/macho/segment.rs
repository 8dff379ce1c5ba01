//! Segment and section decoding.

use std::fmt;

use tracing::debug;

use super::commands::{DecodeContext, RawCommand};
use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use super::header::AddressWidth;
use super::structs::LoadCommandHeader;
use crate::error::{Error, Result};
use crate::util::{checked_range_end, fixed_name};

/// A decoded segment with its sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Segment name (not unique)
    pub name: String,
    /// Virtual memory address
    pub vmaddr: u64,
    /// Virtual memory size
    pub vmsize: u64,
    /// File offset, relative to the slice
    pub fileoff: u64,
    /// Bytes mapped from the file
    pub filesize: u64,
    /// Maximum VM protection
    pub maxprot: VmProt,
    /// Initial VM protection
    pub initprot: VmProt,
    /// SG_* flags
    pub flags: u32,
    /// Sections in command order
    pub sections: Vec<Section>,
    /// Offset of the segment command in the slice
    pub command_offset: usize,
}

impl Segment {
    /// Returns the section with the given name.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Returns true if the segment is writable and executable at load.
    pub fn is_wx(&self) -> bool {
        self.initprot.contains(VmProt::WRITE | VmProt::EXECUTE)
    }

    /// Returns true if the segment is marked SG_PROTECTED_VERSION_1.
    pub fn is_protected(&self) -> bool {
        self.flags & SG_PROTECTED_VERSION_1 != 0
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:#x}+{:#x} file {:#x}+{:#x} {}/{}",
            self.name,
            self.vmaddr,
            self.vmsize,
            self.fileoff,
            self.filesize,
            self.initprot.rwx(),
            self.maxprot.rwx()
        )
    }
}

/// A decoded section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section name
    pub name: String,
    /// Segment name as recorded in the section itself
    pub segment_name: String,
    /// Virtual memory address
    pub addr: u64,
    /// Size in bytes
    pub size: u64,
    /// File offset, relative to the slice
    pub offset: u32,
    /// Alignment as a power of 2
    pub align: u32,
    /// File offset of relocation entries
    pub reloff: u32,
    /// Number of relocation entries
    pub nreloc: u32,
    /// Type and attributes
    pub flags: u32,
    /// Reserved (indirect symbol index for stubs and pointers)
    pub reserved1: u32,
    /// Reserved (stub size for S_SYMBOL_STUBS)
    pub reserved2: u32,
}

impl Section {
    /// Returns the section type (low byte of flags).
    #[inline]
    pub fn section_type(&self) -> u32 {
        self.flags & SECTION_TYPE
    }

    /// Returns true if the section occupies no file space.
    #[inline]
    pub fn is_zerofill(&self) -> bool {
        matches!(
            self.section_type(),
            S_ZEROFILL | S_GB_ZEROFILL | S_THREAD_LOCAL_ZEROFILL
        )
    }

    /// Returns true if the section contains machine instructions.
    #[inline]
    pub fn has_instructions(&self) -> bool {
        self.flags & (S_ATTR_PURE_INSTRUCTIONS | S_ATTR_SOME_INSTRUCTIONS) != 0
    }

    /// Returns `segment,section`.
    pub fn full_name(&self) -> String {
        format!("{},{}", self.segment_name, self.name)
    }

    /// Returns the name of the section type.
    pub fn type_name(&self) -> &'static str {
        match self.section_type() {
            S_REGULAR => "regular",
            S_ZEROFILL => "zerofill",
            S_CSTRING_LITERALS => "cstring_literals",
            S_4BYTE_LITERALS => "4byte_literals",
            S_8BYTE_LITERALS => "8byte_literals",
            S_LITERAL_POINTERS => "literal_pointers",
            S_NON_LAZY_SYMBOL_POINTERS => "non_lazy_symbol_pointers",
            S_LAZY_SYMBOL_POINTERS => "lazy_symbol_pointers",
            S_SYMBOL_STUBS => "symbol_stubs",
            S_MOD_INIT_FUNC_POINTERS => "mod_init_funcs",
            S_MOD_TERM_FUNC_POINTERS => "mod_term_funcs",
            S_COALESCED => "coalesced",
            S_GB_ZEROFILL => "gb_zerofill",
            S_INTERPOSING => "interposing",
            S_16BYTE_LITERALS => "16byte_literals",
            S_DTRACE_DOF => "dtrace_dof",
            S_LAZY_DYLIB_SYMBOL_POINTERS => "lazy_dylib_symbol_pointers",
            S_THREAD_LOCAL_REGULAR => "thread_local_regular",
            S_THREAD_LOCAL_ZEROFILL => "thread_local_zerofill",
            S_THREAD_LOCAL_VARIABLES => "thread_local_variables",
            S_THREAD_LOCAL_VARIABLE_POINTERS => "thread_local_variable_pointers",
            S_THREAD_LOCAL_INIT_FUNCTION_POINTERS => "thread_local_init_function_pointers",
            S_INIT_FUNC_OFFSETS => "init_func_offsets",
            _ => "unknown",
        }
    }

    fn decode(cursor: &mut ByteCursor<'_>, endian: Endian, wide: bool) -> Result<Self> {
        let name = fixed_name(&cursor.read_array::<16>()?);
        let segment_name = fixed_name(&cursor.read_array::<16>()?);
        let addr = cursor.read_word(endian, wide)?;
        let size = cursor.read_word(endian, wide)?;
        let offset = cursor.read_u32(endian)?;
        let align = cursor.read_u32(endian)?;
        let reloff = cursor.read_u32(endian)?;
        let nreloc = cursor.read_u32(endian)?;
        let flags = cursor.read_u32(endian)?;
        let reserved1 = cursor.read_u32(endian)?;
        let reserved2 = cursor.read_u32(endian)?;
        if wide {
            cursor.skip(4)?; // reserved3
        }

        Ok(Self {
            name,
            segment_name,
            addr,
            size,
            offset,
            align,
            reloff,
            nreloc,
            flags,
            reserved1,
            reserved2,
        })
    }
}

/// Decodes an LC_SEGMENT or LC_SEGMENT_64 command.
///
/// The layout follows the command tag. A segment whose file range does not
/// fit in the slice is rejected with [`Error::InvalidSegmentBounds`]. Sections
/// are decoded up to what the command can hold, and a section whose file
/// range is out of bounds is dropped with a warning.
pub fn decode_segment(
    raw: &RawCommand<'_>,
    ctx: &DecodeContext,
    warnings: &mut Vec<Error>,
) -> Result<Segment> {
    let width = if raw.cmd == LC_SEGMENT_64 {
        AddressWidth::Bits64
    } else {
        AddressWidth::Bits32
    };
    let wide = width.is_64();
    let endian = ctx.endian;
    let mut cursor = ByteCursor::at(raw.bytes, LoadCommandHeader::SIZE)?;

    let name = fixed_name(&cursor.read_array::<16>()?);
    let vmaddr = cursor.read_word(endian, wide)?;
    let vmsize = cursor.read_word(endian, wide)?;
    let fileoff = cursor.read_word(endian, wide)?;
    let filesize = cursor.read_word(endian, wide)?;
    let maxprot = VmProt::from_bits_retain(cursor.read_u32(endian)?);
    let initprot = VmProt::from_bits_retain(cursor.read_u32(endian)?);
    let nsects = cursor.read_u32(endian)?;
    let flags = cursor.read_u32(endian)?;

    if checked_range_end(fileoff, filesize, ctx.file_len).is_none() {
        return Err(Error::InvalidSegmentBounds {
            name,
            fileoff,
            filesize,
            file_len: ctx.file_len,
        });
    }

    let fits = cursor.remaining() / width.section_size();
    let count = (nsects as usize).min(fits);
    if count < nsects as usize {
        warnings.push(Error::malformed(
            raw.cmd,
            raw.offset,
            format!(
                "segment '{}' declares {} sections, command holds {}",
                name, nsects, fits
            ),
        ));
    }

    let mut sections = Vec::with_capacity(count);
    for _ in 0..count {
        let section = Section::decode(&mut cursor, endian, wide)?;

        if !section.is_zerofill()
            && section.size > 0
            && checked_range_end(u64::from(section.offset), section.size, ctx.file_len).is_none()
        {
            debug!(
                "Section {} out of bounds ({:#x}+{:#x})",
                section.full_name(),
                section.offset,
                section.size
            );
            warnings.push(Error::InvalidSectionBounds {
                segment: section.segment_name.clone(),
                section: section.name.clone(),
                offset: u64::from(section.offset),
                size: section.size,
                file_len: ctx.file_len,
            });
            continue;
        }

        sections.push(section);
    }

    Ok(Segment {
        name,
        vmaddr,
        vmsize,
        fileoff,
        filesize,
        maxprot,
        initprot,
        flags,
        sections,
        command_offset: raw.offset,
    })
}
