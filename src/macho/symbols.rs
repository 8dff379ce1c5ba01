//! Symbol table decoding.
//!
//! Entries are decoded in table order and never deduplicated. A name that
//! cannot be resolved is replaced by [`INVALID_SYMBOL_NAME`] so the index of
//! every later symbol stays correct.

use std::fmt;

use tracing::debug;

use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use super::header::AddressWidth;
use super::structs::SymtabCommand;
use crate::error::Error;
use crate::util::c_str;

/// Name given to a symbol whose string table entry is unusable.
pub const INVALID_SYMBOL_NAME: &str = "<invalid>";

/// A decoded nlist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Resolved name
    pub name: String,
    /// Value (usually an address)
    pub value: u64,
    /// Type and flag bits
    pub n_type: u8,
    /// Section number, or 0 (NO_SECT)
    pub n_sect: u8,
    /// Description bits
    pub n_desc: u16,
}

impl Symbol {
    /// Returns true if this is a debugging (stab) entry.
    #[inline]
    pub fn is_stab(&self) -> bool {
        self.n_type & N_STAB != 0
    }

    /// Returns true if the symbol is external.
    #[inline]
    pub fn is_external(&self) -> bool {
        self.n_type & N_EXT != 0
    }

    /// Returns true if the symbol is a private external.
    #[inline]
    pub fn is_private_external(&self) -> bool {
        self.n_type & N_PEXT != 0
    }

    /// Returns the N_TYPE bits.
    #[inline]
    pub fn type_bits(&self) -> u8 {
        self.n_type & N_TYPE
    }

    /// Returns true if the symbol is undefined (imported).
    #[inline]
    pub fn is_undefined(&self) -> bool {
        !self.is_stab() && self.type_bits() == N_UNDF
    }

    /// Returns a short label for the symbol kind.
    pub fn kind(&self) -> &'static str {
        if self.is_stab() {
            return "stab";
        }
        match self.type_bits() {
            N_UNDF => "undef",
            N_ABS => "abs",
            N_SECT => "sect",
            N_PBUD => "prebound",
            N_INDR => "indirect",
            _ => "unknown",
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#018x} {:<8} {}{}",
            self.value,
            self.kind(),
            if self.is_external() { "[ext] " } else { "" },
            self.name
        )
    }
}

/// Decodes the nlist table described by `symtab`.
///
/// Range problems shrink what is decoded and are reported in `warnings`:
/// a table running past the end of the file yields only the entries that
/// fit, and a string table running past it is clamped.
pub fn decode_symbols(
    data: &[u8],
    symtab: &SymtabCommand,
    endian: Endian,
    width: AddressWidth,
    warnings: &mut Vec<Error>,
) -> Vec<Symbol> {
    let entry_size = width.nlist_size();
    let symoff = symtab.symoff as usize;

    if symtab.nsyms > 0 && symoff > data.len() {
        warnings.push(Error::InvalidSymbolTable {
            reason: format!(
                "symbol table offset {:#x} beyond file length {:#x}",
                symoff,
                data.len()
            ),
        });
        return Vec::new();
    }

    let fits = (data.len() - symoff.min(data.len())) / entry_size;
    let count = (symtab.nsyms as usize).min(fits);
    if count < symtab.nsyms as usize {
        warnings.push(Error::InvalidSymbolTable {
            reason: format!(
                "{} symbols declared, {} fit in the file",
                symtab.nsyms, count
            ),
        });
    }

    let strtab = string_table(data, symtab, warnings);
    let mut cursor = match ByteCursor::at(data, symoff.min(data.len())) {
        Ok(cursor) => cursor,
        Err(_) => return Vec::new(),
    };

    let mut symbols = Vec::with_capacity(count);
    for index in 0..count {
        let Ok(entry) = read_nlist(&mut cursor, endian, width) else {
            break;
        };
        let (strx, n_type, n_sect, n_desc, value) = entry;
        let name = resolve_name(strtab, index, strx, symtab.strsize, warnings);
        symbols.push(Symbol {
            name,
            value,
            n_type,
            n_sect,
            n_desc,
        });
    }

    debug!("Decoded {} symbols", symbols.len());
    symbols
}

fn string_table<'a>(data: &'a [u8], symtab: &SymtabCommand, warnings: &mut Vec<Error>) -> &'a [u8] {
    let stroff = (symtab.stroff as usize).min(data.len());
    let end = stroff.saturating_add(symtab.strsize as usize);
    if end > data.len() {
        warnings.push(Error::InvalidSymbolTable {
            reason: format!(
                "string table {:#x}+{:#x} exceeds file length {:#x}",
                symtab.stroff,
                symtab.strsize,
                data.len()
            ),
        });
    }
    &data[stroff..end.min(data.len())]
}

fn read_nlist(
    cursor: &mut ByteCursor<'_>,
    endian: Endian,
    width: AddressWidth,
) -> crate::error::Result<(u32, u8, u8, u16, u64)> {
    let strx = cursor.read_u32(endian)?;
    let n_type = cursor.read_u8()?;
    let n_sect = cursor.read_u8()?;
    let n_desc = cursor.read_u16(endian)?;
    let value = cursor.read_word(endian, width.is_64())?;
    Ok((strx, n_type, n_sect, n_desc, value))
}

fn resolve_name(
    strtab: &[u8],
    index: usize,
    strx: u32,
    strsize: u32,
    warnings: &mut Vec<Error>,
) -> String {
    if strx == 0 {
        return String::new();
    }

    let Some(tail) = strtab.get(strx as usize..).filter(|t| !t.is_empty()) else {
        warnings.push(Error::SymbolNameOutOfBounds {
            index,
            strx,
            strsize,
        });
        return INVALID_SYMBOL_NAME.to_string();
    };

    match c_str(tail) {
        Some(name) => String::from_utf8_lossy(name).into_owned(),
        None => {
            warnings.push(Error::UnterminatedSymbolName { index, strx });
            INVALID_SYMBOL_NAME.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::commands::{walk_load_commands, Command};
    use crate::macho::header::ArchitectureHeader;
    use crate::macho::testutil::{MachOBuilder, NlistSpec};

    fn symbols_of(data: &[u8]) -> (Vec<Symbol>, Vec<Error>) {
        let header = ArchitectureHeader::decode(data).unwrap();
        let (commands, _) = walk_load_commands(data, &header);
        let symtab = commands
            .iter()
            .find_map(|c| match &c.command {
                Command::Symtab(s) => Some(*s),
                _ => None,
            })
            .unwrap();
        let mut warnings = Vec::new();
        let symbols = decode_symbols(data, &symtab, header.endian, header.width, &mut warnings);
        (symbols, warnings)
    }

    fn nlist(strx: u32) -> NlistSpec {
        NlistSpec {
            strx,
            n_type: N_SECT | N_EXT,
            n_sect: 1,
            n_desc: 0,
            value: 0x1000,
        }
    }

    #[test]
    fn test_names_match_string_table() {
        let names = ["_main", "_helper", "___stack_chk_fail", "_main"];
        for (width, endian) in [
            (AddressWidth::Bits64, Endian::Little),
            (AddressWidth::Bits32, Endian::Big),
        ] {
            let table: Vec<_> = names
                .iter()
                .enumerate()
                .map(|(i, n)| (*n, N_SECT | N_EXT, 1u8, 0x1000 + i as u64 * 0x10))
                .collect();
            let data = MachOBuilder::new(width, endian).symbols(&table).build();
            let (symbols, warnings) = symbols_of(&data);

            assert!(warnings.is_empty(), "{:?}", warnings);
            assert_eq!(symbols.len(), names.len());
            for (symbol, name) in symbols.iter().zip(names) {
                assert_eq!(symbol.name, name);
            }
            // Duplicates are preserved
            assert_eq!(symbols[0].name, symbols[3].name);
            assert_eq!(symbols[1].value, 0x1010);
            assert!(symbols[1].is_external());
            assert_eq!(symbols[1].kind(), "sect");
        }
    }

    #[test]
    fn test_undefined_symbol() {
        let data = MachOBuilder::arm64()
            .symbols(&[("_printf", N_UNDF | N_EXT, 0, 0)])
            .build();
        let (symbols, _) = symbols_of(&data);
        assert!(symbols[0].is_undefined());
        assert_eq!(symbols[0].kind(), "undef");
    }

    #[test]
    fn test_unterminated_name_keeps_position() {
        // "\0_ok\0_bad" with no final terminator
        let strtab = b"\0_ok\0_bad".to_vec();
        let data = MachOBuilder::arm64()
            .symtab_raw(vec![nlist(5), nlist(1), nlist(0)], strtab, None)
            .build();
        let (symbols, warnings) = symbols_of(&data);

        assert_eq!(symbols.len(), 3);
        assert_eq!(symbols[0].name, INVALID_SYMBOL_NAME);
        assert_eq!(symbols[1].name, "_ok");
        assert_eq!(symbols[2].name, "");
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            Error::UnterminatedSymbolName { index: 0, strx: 5 }
        ));
    }

    #[test]
    fn test_name_index_out_of_bounds() {
        let data = MachOBuilder::arm64()
            .symtab_raw(vec![nlist(1), nlist(500)], b"\0_a\0".to_vec(), None)
            .build();
        let (symbols, warnings) = symbols_of(&data);
        assert_eq!(symbols[0].name, "_a");
        assert_eq!(symbols[1].name, INVALID_SYMBOL_NAME);
        assert!(matches!(
            warnings[0],
            Error::SymbolNameOutOfBounds { index: 1, strx: 500, strsize: 4 }
        ));
    }

    #[test]
    fn test_symbol_count_capped_to_file() {
        let data = MachOBuilder::arm64()
            .symtab_raw(vec![nlist(1)], b"\0_a\0".to_vec(), Some(0x0FFF_FFFF))
            .build();
        let (symbols, warnings) = symbols_of(&data);
        assert!(!symbols.is_empty());
        assert!(symbols.len() < 100);
        assert!(matches!(warnings[0], Error::InvalidSymbolTable { .. }));
    }

    #[test]
    fn test_symbol_table_offset_beyond_file() {
        let symtab = SymtabCommand {
            symoff: 0x10_0000,
            nsyms: 4,
            stroff: 0,
            strsize: 0,
        };
        let mut warnings = Vec::new();
        let symbols = decode_symbols(
            &[0u8; 64],
            &symtab,
            Endian::Little,
            AddressWidth::Bits64,
            &mut warnings,
        );
        assert!(symbols.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_string_table_clamped() {
        let symtab = SymtabCommand {
            symoff: 0,
            nsyms: 1,
            stroff: 16,
            strsize: 0x1000,
        };
        let mut data = vec![0u8; 32];
        data[0] = 1; // strx = 1
        data[17..21].copy_from_slice(b"_foo");
        let mut warnings = Vec::new();
        let symbols = decode_symbols(
            &data,
            &symtab,
            Endian::Little,
            AddressWidth::Bits64,
            &mut warnings,
        );
        assert_eq!(symbols[0].name, "_foo");
        assert!(matches!(warnings[0], Error::InvalidSymbolTable { .. }));
    }
}
