//! Synthetic Mach-O images for unit tests.
//!
//! The builder lays out the header, then the load command table, then a data
//! area for everything commands point at (symbol tables, string tables,
//! linkedit blobs). Offsets into the data area are resolved at build time.

use super::constants::*;
use super::cursor::Endian;
use super::header::AddressWidth;

fn put16(out: &mut Vec<u8>, endian: Endian, v: u16) {
    match endian {
        Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
    }
}

fn put32(out: &mut Vec<u8>, endian: Endian, v: u32) {
    match endian {
        Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
    }
}

fn put64(out: &mut Vec<u8>, endian: Endian, v: u64) {
    match endian {
        Endian::Little => out.extend_from_slice(&v.to_le_bytes()),
        Endian::Big => out.extend_from_slice(&v.to_be_bytes()),
    }
}

fn put_word(out: &mut Vec<u8>, endian: Endian, wide: bool, v: u64) {
    if wide {
        put64(out, endian, v);
    } else {
        put32(out, endian, v as u32);
    }
}

fn name16(name: &str) -> [u8; 16] {
    let mut raw = [0u8; 16];
    let n = name.len().min(16);
    raw[..n].copy_from_slice(&name.as_bytes()[..n]);
    raw
}

/// A section inside a [`SegmentSpec`].
#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub name: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub flags: u32,
}

/// A segment load command.
#[derive(Debug, Clone)]
pub struct SegmentSpec {
    pub name: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub flags: u32,
    pub sections: Vec<SectionSpec>,
    pub nsects: Option<u32>,
}

impl SegmentSpec {
    pub fn new(name: &str, fileoff: u64, filesize: u64) -> Self {
        Self {
            name: name.to_string(),
            vmaddr: 0x1_0000_0000u64.wrapping_add(fileoff),
            vmsize: filesize,
            fileoff,
            filesize,
            maxprot: 5,
            initprot: 5,
            flags: 0,
            sections: Vec::new(),
            nsects: None,
        }
    }

    pub fn prot(mut self, maxprot: u32, initprot: u32) -> Self {
        self.maxprot = maxprot;
        self.initprot = initprot;
        self
    }

    pub fn section(mut self, name: &str, offset: u32, size: u64) -> Self {
        self.sections.push(SectionSpec {
            name: name.to_string(),
            addr: self.vmaddr.wrapping_add(u64::from(offset)),
            size,
            offset,
            flags: S_REGULAR,
        });
        self
    }

    pub fn section_with_flags(mut self, name: &str, offset: u32, size: u64, flags: u32) -> Self {
        self = self.section(name, offset, size);
        if let Some(last) = self.sections.last_mut() {
            last.flags = flags;
        }
        self
    }

    /// Overrides the declared section count.
    pub fn nsects(mut self, n: u32) -> Self {
        self.nsects = Some(n);
        self
    }
}

/// A raw nlist entry.
#[derive(Debug, Clone, Copy)]
pub struct NlistSpec {
    pub strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub value: u64,
}

#[derive(Debug, Clone)]
enum Cmd {
    Raw { cmd: u32, payload: Vec<u8> },
    Segment(SegmentSpec),
    Symtab { entries: Vec<NlistSpec>, strtab: Vec<u8>, nsyms: Option<u32> },
    Linkedit { cmd: u32, data: Vec<u8> },
}

/// Builds a single-architecture Mach-O image.
#[derive(Debug, Clone)]
pub struct MachOBuilder {
    width: AddressWidth,
    endian: Endian,
    cputype: u32,
    cpusubtype: u32,
    filetype: u32,
    flags: u32,
    commands: Vec<Cmd>,
    ncmds: Option<u32>,
    sizeofcmds: Option<u32>,
    trailing: usize,
}

impl MachOBuilder {
    pub fn new(width: AddressWidth, endian: Endian) -> Self {
        let (cputype, cpusubtype) = if width.is_64() {
            (CPU_TYPE_ARM64, CPU_SUBTYPE_ARM64_ALL)
        } else {
            (CPU_TYPE_ARM, CPU_SUBTYPE_ARM_V7)
        };
        Self {
            width,
            endian,
            cputype,
            cpusubtype,
            filetype: MH_EXECUTE,
            flags: 0,
            commands: Vec::new(),
            ncmds: None,
            sizeofcmds: None,
            trailing: 0,
        }
    }

    /// 64-bit little-endian arm64 executable.
    pub fn arm64() -> Self {
        Self::new(AddressWidth::Bits64, Endian::Little)
    }

    pub fn cpu(mut self, cputype: u32, cpusubtype: u32) -> Self {
        self.cputype = cputype;
        self.cpusubtype = cpusubtype;
        self
    }

    pub fn filetype(mut self, filetype: u32) -> Self {
        self.filetype = filetype;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn ncmds(mut self, n: u32) -> Self {
        self.ncmds = Some(n);
        self
    }

    pub fn sizeofcmds(mut self, n: u32) -> Self {
        self.sizeofcmds = Some(n);
        self
    }

    /// Appends zero bytes after the data area.
    pub fn trailing(mut self, n: usize) -> Self {
        self.trailing = n;
        self
    }

    /// Adds a command with an arbitrary payload (without the 8-byte header).
    pub fn raw(mut self, cmd: u32, payload: Vec<u8>) -> Self {
        self.commands.push(Cmd::Raw { cmd, payload });
        self
    }

    pub fn segment(mut self, spec: SegmentSpec) -> Self {
        self.commands.push(Cmd::Segment(spec));
        self
    }

    /// Adds an LC_SYMTAB whose string table holds `names` in order.
    pub fn symbols(mut self, symbols: &[(&str, u8, u8, u64)]) -> Self {
        let mut strtab = vec![0u8];
        let mut entries = Vec::with_capacity(symbols.len());
        for &(name, n_type, n_sect, value) in symbols {
            let strx = if name.is_empty() { 0 } else { strtab.len() as u32 };
            if !name.is_empty() {
                strtab.extend_from_slice(name.as_bytes());
                strtab.push(0);
            }
            entries.push(NlistSpec {
                strx,
                n_type,
                n_sect,
                n_desc: 0,
                value,
            });
        }
        self.commands.push(Cmd::Symtab {
            entries,
            strtab,
            nsyms: None,
        });
        self
    }

    /// Adds an LC_SYMTAB with explicit entries and string table bytes.
    pub fn symtab_raw(mut self, entries: Vec<NlistSpec>, strtab: Vec<u8>, nsyms: Option<u32>) -> Self {
        self.commands.push(Cmd::Symtab {
            entries,
            strtab,
            nsyms,
        });
        self
    }

    pub fn dylib(self, cmd: u32, name: &str, current: u32, compat: u32) -> Self {
        let endian = self.endian;
        let mut payload = Vec::new();
        put32(&mut payload, endian, 24);
        put32(&mut payload, endian, 2);
        put32(&mut payload, endian, current);
        put32(&mut payload, endian, compat);
        payload.extend_from_slice(name.as_bytes());
        payload.push(0);
        self.raw(cmd, payload)
    }

    /// LC_RPATH, LC_LOAD_DYLINKER and friends: one lc_str at offset 12.
    pub fn string_command(self, cmd: u32, value: &str) -> Self {
        let mut payload = Vec::new();
        put32(&mut payload, self.endian, 12);
        payload.extend_from_slice(value.as_bytes());
        payload.push(0);
        self.raw(cmd, payload)
    }

    pub fn uuid(self, uuid: [u8; 16]) -> Self {
        self.raw(LC_UUID, uuid.to_vec())
    }

    pub fn main(self, entryoff: u64, stacksize: u64) -> Self {
        let mut payload = Vec::new();
        put64(&mut payload, self.endian, entryoff);
        put64(&mut payload, self.endian, stacksize);
        self.raw(LC_MAIN, payload)
    }

    /// LC_UNIXTHREAD with a zeroed register state of `count` words and the
    /// given pc written at `pc_word`.
    pub fn unixthread(self, flavor: u32, count: u32, pc_word: usize, pc: u64, pc_wide: bool) -> Self {
        let endian = self.endian;
        let mut payload = Vec::new();
        put32(&mut payload, endian, flavor);
        put32(&mut payload, endian, count);
        let mut state = Vec::new();
        for _ in 0..count {
            put32(&mut state, endian, 0);
        }
        let mut pc_bytes = Vec::new();
        put_word(&mut pc_bytes, endian, pc_wide, pc);
        let start = pc_word * 4;
        state[start..start + pc_bytes.len()].copy_from_slice(&pc_bytes);
        payload.extend_from_slice(&state);
        self.raw(LC_UNIXTHREAD, payload)
    }

    pub fn build_version(self, platform: u32, minos: u32, sdk: u32, tools: &[(u32, u32)]) -> Self {
        let endian = self.endian;
        let mut payload = Vec::new();
        put32(&mut payload, endian, platform);
        put32(&mut payload, endian, minos);
        put32(&mut payload, endian, sdk);
        put32(&mut payload, endian, tools.len() as u32);
        for &(tool, version) in tools {
            put32(&mut payload, endian, tool);
            put32(&mut payload, endian, version);
        }
        self.raw(LC_BUILD_VERSION, payload)
    }

    pub fn encryption(self, cryptoff: u32, cryptsize: u32, cryptid: u32) -> Self {
        let endian = self.endian;
        let wide = self.width.is_64();
        let mut payload = Vec::new();
        put32(&mut payload, endian, cryptoff);
        put32(&mut payload, endian, cryptsize);
        put32(&mut payload, endian, cryptid);
        let cmd = if wide {
            put32(&mut payload, endian, 0);
            LC_ENCRYPTION_INFO_64
        } else {
            LC_ENCRYPTION_INFO
        };
        self.raw(cmd, payload)
    }

    /// Adds a linkedit data command whose range covers `data` in the data area.
    pub fn linkedit(mut self, cmd: u32, data: Vec<u8>) -> Self {
        self.commands.push(Cmd::Linkedit { cmd, data });
        self
    }

    pub fn code_signature(self, blob: Vec<u8>) -> Self {
        self.linkedit(LC_CODE_SIGNATURE, blob)
    }

    fn pad(&self, len: usize) -> usize {
        let align = if self.width.is_64() { 8 } else { 4 };
        (len + align - 1) / align * align
    }

    fn command_size(&self, cmd: &Cmd) -> usize {
        match cmd {
            Cmd::Raw { payload, .. } => self.pad(8 + payload.len()),
            Cmd::Segment(spec) => {
                self.width_for_segment().0 + spec.sections.len() * self.width_for_segment().1
            }
            Cmd::Symtab { .. } => 24,
            Cmd::Linkedit { .. } => 16,
        }
    }

    fn width_for_segment(&self) -> (usize, usize) {
        (self.width.segment_command_size(), self.width.section_size())
    }

    pub fn build(&self) -> Vec<u8> {
        let endian = self.endian;
        let wide = self.width.is_64();
        let table_size: usize = self.commands.iter().map(|c| self.command_size(c)).sum();
        let data_start = self.width.header_size() + table_size;

        let mut table = Vec::with_capacity(table_size);
        let mut data = Vec::new();

        for cmd in &self.commands {
            let cmdsize = self.command_size(cmd) as u32;
            let start = table.len();
            match cmd {
                Cmd::Raw { cmd, payload } => {
                    put32(&mut table, endian, *cmd);
                    put32(&mut table, endian, cmdsize);
                    table.extend_from_slice(payload);
                }
                Cmd::Segment(spec) => {
                    put32(&mut table, endian, if wide { LC_SEGMENT_64 } else { LC_SEGMENT });
                    put32(&mut table, endian, cmdsize);
                    table.extend_from_slice(&name16(&spec.name));
                    put_word(&mut table, endian, wide, spec.vmaddr);
                    put_word(&mut table, endian, wide, spec.vmsize);
                    put_word(&mut table, endian, wide, spec.fileoff);
                    put_word(&mut table, endian, wide, spec.filesize);
                    put32(&mut table, endian, spec.maxprot);
                    put32(&mut table, endian, spec.initprot);
                    put32(
                        &mut table,
                        endian,
                        spec.nsects.unwrap_or(spec.sections.len() as u32),
                    );
                    put32(&mut table, endian, spec.flags);
                    for section in &spec.sections {
                        table.extend_from_slice(&name16(&section.name));
                        table.extend_from_slice(&name16(&spec.name));
                        put_word(&mut table, endian, wide, section.addr);
                        put_word(&mut table, endian, wide, section.size);
                        put32(&mut table, endian, section.offset);
                        put32(&mut table, endian, 0); // align
                        put32(&mut table, endian, 0); // reloff
                        put32(&mut table, endian, 0); // nreloc
                        put32(&mut table, endian, section.flags);
                        put32(&mut table, endian, 0); // reserved1
                        put32(&mut table, endian, 0); // reserved2
                        if wide {
                            put32(&mut table, endian, 0); // reserved3
                        }
                    }
                }
                Cmd::Symtab {
                    entries,
                    strtab,
                    nsyms,
                } => {
                    let symoff = data_start + data.len();
                    for entry in entries {
                        put32(&mut data, endian, entry.strx);
                        data.push(entry.n_type);
                        data.push(entry.n_sect);
                        put16(&mut data, endian, entry.n_desc);
                        put_word(&mut data, endian, wide, entry.value);
                    }
                    let stroff = data_start + data.len();
                    data.extend_from_slice(strtab);
                    put32(&mut table, endian, LC_SYMTAB);
                    put32(&mut table, endian, cmdsize);
                    put32(&mut table, endian, symoff as u32);
                    put32(&mut table, endian, nsyms.unwrap_or(entries.len() as u32));
                    put32(&mut table, endian, stroff as u32);
                    put32(&mut table, endian, strtab.len() as u32);
                }
                Cmd::Linkedit { cmd, data: blob } => {
                    let dataoff = data_start + data.len();
                    data.extend_from_slice(blob);
                    put32(&mut table, endian, *cmd);
                    put32(&mut table, endian, cmdsize);
                    put32(&mut table, endian, dataoff as u32);
                    put32(&mut table, endian, blob.len() as u32);
                }
            }
            table.resize(start + cmdsize as usize, 0);
        }

        let magic = match self.width {
            AddressWidth::Bits32 => MH_MAGIC,
            AddressWidth::Bits64 => MH_MAGIC_64,
        };

        let mut out = Vec::with_capacity(data_start + data.len() + self.trailing);
        put32(&mut out, endian, magic);
        put32(&mut out, endian, self.cputype);
        put32(&mut out, endian, self.cpusubtype);
        put32(&mut out, endian, self.filetype);
        put32(
            &mut out,
            endian,
            self.ncmds.unwrap_or(self.commands.len() as u32),
        );
        put32(
            &mut out,
            endian,
            self.sizeofcmds.unwrap_or(table_size as u32),
        );
        put32(&mut out, endian, self.flags);
        if wide {
            put32(&mut out, endian, 0);
        }
        out.extend_from_slice(&table);
        out.extend_from_slice(&data);
        out.resize(out.len() + self.trailing, 0);
        out
    }
}

/// Wraps slices in a fat container. Slices are aligned to 256 bytes.
pub fn fat(slices: &[(u32, u32, &[u8])], wide: bool) -> Vec<u8> {
    const ALIGN: usize = 0x100;
    let entry_size = if wide { 32 } else { 20 };
    let mut offset = (8 + slices.len() * entry_size + ALIGN - 1) / ALIGN * ALIGN;

    let mut out = Vec::new();
    out.extend_from_slice(&(if wide { FAT_MAGIC_64 } else { FAT_MAGIC }).to_be_bytes());
    out.extend_from_slice(&(slices.len() as u32).to_be_bytes());

    let mut placed = Vec::new();
    for &(cputype, cpusubtype, bytes) in slices {
        out.extend_from_slice(&cputype.to_be_bytes());
        out.extend_from_slice(&cpusubtype.to_be_bytes());
        if wide {
            out.extend_from_slice(&(offset as u64).to_be_bytes());
            out.extend_from_slice(&(bytes.len() as u64).to_be_bytes());
            out.extend_from_slice(&8u32.to_be_bytes());
            out.extend_from_slice(&0u32.to_be_bytes());
        } else {
            out.extend_from_slice(&(offset as u32).to_be_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            out.extend_from_slice(&8u32.to_be_bytes());
        }
        placed.push((offset, bytes));
        offset = (offset + bytes.len() + ALIGN - 1) / ALIGN * ALIGN;
    }

    for (at, bytes) in placed {
        out.resize(at, 0);
        out.extend_from_slice(bytes);
    }
    out
}

// =============================================================================
// Code signature blobs (always big-endian)
// =============================================================================

/// Builds an embedded-signature SuperBlob from (slot, blob) pairs.
pub fn superblob(blobs: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let header = 12 + blobs.len() * 8;
    let total = header + blobs.iter().map(|(_, b)| b.len()).sum::<usize>();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&CSMAGIC_EMBEDDED_SIGNATURE.to_be_bytes());
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(blobs.len() as u32).to_be_bytes());

    let mut offset = header;
    for (slot, blob) in blobs {
        out.extend_from_slice(&slot.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        offset += blob.len();
    }
    for (_, blob) in blobs {
        out.extend_from_slice(blob);
    }
    out
}

/// Builds a CodeDirectory with no hash slots.
pub fn code_directory(version: u32, flags: u32, identifier: &str, team: Option<&str>) -> Vec<u8> {
    let fixed = if version >= CS_SUPPORTSTEAMID { 52 } else { 44 };
    let ident_offset = fixed;
    let team_offset = ident_offset + identifier.len() + 1;
    let total = team_offset + team.map_or(0, |t| t.len() + 1);

    let mut out = Vec::with_capacity(total);
    for v in [
        CSMAGIC_CODEDIRECTORY,
        total as u32,
        version,
        flags,
        total as u32, // hashOffset
        ident_offset as u32,
        0, // nSpecialSlots
        0, // nCodeSlots
        0x4000, // codeLimit
    ] {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out.extend_from_slice(&[32, 2, 0, 12]); // hashSize, hashType, platform, pageSize
    out.extend_from_slice(&0u32.to_be_bytes()); // spare2
    if version >= CS_SUPPORTSTEAMID {
        out.extend_from_slice(&0u32.to_be_bytes()); // scatterOffset
        let team_field = if team.is_some() { team_offset as u32 } else { 0 };
        out.extend_from_slice(&team_field.to_be_bytes());
    }
    out.extend_from_slice(identifier.as_bytes());
    out.push(0);
    if let Some(team) = team {
        out.extend_from_slice(team.as_bytes());
        out.push(0);
    }
    out
}

/// Builds an XML entitlements blob.
pub fn entitlements(xml: &str) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&CSMAGIC_EMBEDDED_ENTITLEMENTS.to_be_bytes());
    out.extend_from_slice(&((8 + xml.len()) as u32).to_be_bytes());
    out.extend_from_slice(xml.as_bytes());
    out
}

/// The two-section binary used by the end-to-end scenario tests.
pub fn minimal_two_sections() -> Vec<u8> {
    MachOBuilder::arm64()
        .segment(
            SegmentSpec::new("__TEXT", 0, 0x100)
                .section("__text", 0x80, 0x40)
                .section("__cstring", 0xC0, 0x20),
        )
        .trailing(0x100)
        .build()
}
