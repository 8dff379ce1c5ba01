//! Human-readable report rendering.
//!
//! Rendering is a pure function of a parsed [`MachOFile`]: it never touches
//! the input file and can only fail on a write to the sink.

use std::io::{self, Write};
use std::path::Path;

use crate::macho::{platform_name, CodeSignature, DylibKind, EntryPoint, MachOFlags, ParseReport};
use crate::util::{format_size, format_source_version, format_uuid, format_version};
use crate::{ContainerKind, MachOFile};

/// Width of the separator lines.
const RULE: usize = 50;

/// Options for report rendering.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    /// Print the symbol list
    pub show_symbols: bool,
    /// Print at most this many symbols per slice
    pub max_symbols: Option<usize>,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            show_symbols: true,
            max_symbols: None,
        }
    }
}

/// Writes the full report for one file.
pub fn write_report<W: Write>(
    out: &mut W,
    path: &Path,
    file: &MachOFile,
    options: &PrintOptions,
) -> io::Result<()> {
    writeln!(out, "machound - Mach-O security assessment tool")?;
    writeln!(out, "{}", "=".repeat(RULE))?;
    writeln!(out, "File:         {}", path.display())?;
    writeln!(out, "Size:         {} ({} bytes)", format_size(file.size), file.size)?;

    match file.kind {
        ContainerKind::Thin => writeln!(out, "Format:       thin")?,
        ContainerKind::Fat { wide } => {
            writeln!(
                out,
                "Format:       fat{} ({} architectures)",
                if wide { "64" } else { "" },
                file.fat_arches.len()
            )?;
            writeln!(out, "\nFat architectures:")?;
            for arch in &file.fat_arches {
                writeln!(
                    out,
                    "  [{:2}] {:<10} offset {:#010x}  size {:>8}  align 2^{}",
                    arch.index,
                    arch.arch_name(),
                    arch.offset,
                    format_size(arch.size),
                    arch.align
                )?;
            }
        }
    }

    for report in &file.reports {
        write_slice(out, report, options)?;
    }

    if !file.warnings.is_empty() {
        writeln!(out, "\nFile warnings ({}):", file.warnings.len())?;
        for warning in &file.warnings {
            writeln!(out, "  - {}", warning)?;
        }
    }

    Ok(())
}

fn write_slice<W: Write>(
    out: &mut W,
    report: &ParseReport,
    options: &PrintOptions,
) -> io::Result<()> {
    let header = &report.header;

    writeln!(out)?;
    writeln!(
        out,
        "Architecture [{}] {} (offset {:#x})",
        report.index,
        header.arch_name(),
        report.offset
    )?;
    writeln!(out, "{}", "-".repeat(RULE))?;
    writeln!(
        out,
        "Magic:        {:#010x} ({}-bit {})",
        header.magic,
        header.width.bits(),
        header.endian.name()
    )?;
    writeln!(
        out,
        "CPU:          {} (type {:#x}, subtype {:#x})",
        header.arch_name(),
        header.cputype,
        header.cpusubtype
    )?;
    writeln!(out, "File type:    {}", header.filetype_name())?;
    writeln!(
        out,
        "Commands:     {} ({} bytes)",
        header.ncmds, header.sizeofcmds
    )?;

    let flags = header.flags();
    let mut names: Vec<String> = flags.iter_names().map(|(n, _)| n.to_string()).collect();
    let unknown = flags.bits() & !MachOFlags::all().bits();
    if unknown != 0 {
        names.push(format!("{:#x}", unknown));
    }
    writeln!(
        out,
        "Flags:        {}",
        if names.is_empty() {
            "none".to_string()
        } else {
            names.join(" ")
        }
    )?;

    writeln!(out, "\nLoad commands:")?;
    for (i, lc) in report.load_commands.iter().enumerate() {
        writeln!(
            out,
            "  [{:2}] {:<28} offset {:#06x}  size {}",
            i,
            lc.name(),
            lc.offset,
            lc.cmdsize
        )?;
    }

    writeln!(out, "\nSegments:")?;
    for segment in &report.segments {
        writeln!(
            out,
            "  {:<16} {:#018x} - {:#018x}  file {:#x}+{:#x}  {}/{}",
            segment.name,
            segment.vmaddr,
            segment.vmaddr.wrapping_add(segment.vmsize),
            segment.fileoff,
            segment.filesize,
            segment.initprot.rwx(),
            segment.maxprot.rwx()
        )?;
        for section in &segment.sections {
            writeln!(
                out,
                "    {:<18} {:#018x}  size {:#8x}  offset {:#8x}  {}",
                section.name,
                section.addr,
                section.size,
                section.offset,
                section.type_name()
            )?;
        }
    }

    if !report.libraries.is_empty() {
        writeln!(out, "\nLibraries:")?;
        for lib in &report.libraries {
            let kind = match lib.kind {
                DylibKind::Load => String::new(),
                other => format!(" [{}]", other.name()),
            };
            writeln!(
                out,
                "  {} (compatibility {}, current {}){}",
                lib.path,
                format_version(lib.compatibility_version),
                format_version(lib.current_version),
                kind
            )?;
        }
    }

    let rpaths: Vec<&str> = report.rpaths().collect();
    if !rpaths.is_empty() {
        writeln!(out, "\nRpaths:")?;
        for rpath in rpaths {
            writeln!(out, "  {}", rpath)?;
        }
    }

    writeln!(out)?;
    if let Some(id) = report.install_name() {
        writeln!(
            out,
            "Install name: {} ({})",
            id.path,
            format_version(id.current_version)
        )?;
    }
    if let Some(dylinker) = report.dylinker() {
        writeln!(out, "Dylinker:     {}", dylinker)?;
    }
    match report.entry_point() {
        Some(EntryPoint::Main(main)) => writeln!(
            out,
            "Entry point:  LC_MAIN offset {:#x} (stack {:#x})",
            main.entryoff, main.stacksize
        )?,
        Some(EntryPoint::Thread(thread)) => match thread.pc {
            Some(pc) => writeln!(out, "Entry point:  thread pc {:#x}", pc)?,
            None => writeln!(
                out,
                "Entry point:  thread (flavor {}, pc unknown)",
                thread.flavor
            )?,
        },
        None => {}
    }
    if let Some(uuid) = report.uuid() {
        writeln!(out, "UUID:         {}", format_uuid(uuid))?;
    }
    if let Some(version) = report.platform_version() {
        writeln!(
            out,
            "Platform:     {} {} (SDK {})",
            platform_name(version.platform),
            format_version(version.minos),
            format_version(version.sdk)
        )?;
    }
    if let Some(source) = report.source_version() {
        writeln!(out, "Source:       {}", format_source_version(source))?;
    }
    if let Some(enc) = report.encryption() {
        writeln!(
            out,
            "Encryption:   cryptid {} range {:#x}+{:#x}",
            enc.cryptid, enc.cryptoff, enc.cryptsize
        )?;
    }

    if let Some(signature) = &report.code_signature {
        write_signature(out, signature)?;
    }

    writeln!(out, "\nSecurity:")?;
    for (label, value) in report.security().entries() {
        writeln!(out, "  {:<16} {}", label, if value { "yes" } else { "no" })?;
    }

    if options.show_symbols {
        writeln!(out, "\nSymbols ({}):", report.symbols.len())?;
        let limit = options.max_symbols.unwrap_or(usize::MAX);
        for symbol in report.symbols.iter().take(limit) {
            writeln!(out, "  {}", symbol)?;
        }
        if report.symbols.len() > limit {
            writeln!(out, "  ... {} more", report.symbols.len() - limit)?;
        }
    }

    if !report.warnings.is_empty() {
        writeln!(out, "\nWarnings ({}):", report.warnings.len())?;
        for warning in &report.warnings {
            writeln!(out, "  - {}", warning)?;
        }
    }

    Ok(())
}

fn write_signature<W: Write>(out: &mut W, signature: &CodeSignature) -> io::Result<()> {
    writeln!(out, "\nCode signature:")?;
    writeln!(
        out,
        "  Location:     {:#x}+{:#x}",
        signature.offset, signature.size
    )?;
    for blob in &signature.blobs {
        writeln!(
            out,
            "  Blob:         {:<24} magic {:#010x} at {:#x}",
            blob.slot_name(),
            blob.magic,
            blob.offset
        )?;
    }
    if let Some(cd) = &signature.code_directory {
        writeln!(out, "  Identifier:   {}", cd.identifier)?;
        if let Some(team) = &cd.team_id {
            writeln!(out, "  Team ID:      {}", team)?;
        }
        let mut kinds = Vec::new();
        if cd.is_adhoc() {
            kinds.push("adhoc");
        }
        if cd.has_runtime() {
            kinds.push("runtime");
        }
        if cd.is_linker_signed() {
            kinds.push("linker-signed");
        }
        writeln!(
            out,
            "  Directory:    version {:#x}, flags {:#x}{}, {} pages, {}",
            cd.version,
            cd.flags,
            if kinds.is_empty() {
                String::new()
            } else {
                format!(" ({})", kinds.join(", "))
            },
            cd.n_code_slots,
            cd.hash_name()
        )?;
    }
    if let Some(xml) = &signature.entitlements {
        writeln!(out, "  Entitlements:")?;
        for line in xml.lines() {
            writeln!(out, "    {}", line)?;
        }
    }
    if signature.der_entitlements {
        writeln!(out, "  DER entitlements present")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::testutil::*;
    use crate::macho::{
        AddressWidth, Endian, CSSLOT_CODEDIRECTORY, CSSLOT_ENTITLEMENTS, LC_LOAD_DYLIB, N_EXT, N_SECT,
    };
    use crate::{parse_bytes, ParseOptions};

    fn render(data: &[u8], options: &PrintOptions) -> String {
        let file = parse_bytes(data, &ParseOptions::default()).unwrap();
        let mut out = Vec::new();
        write_report(&mut out, Path::new("a.out"), &file, options).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_banner_and_sections() {
        let text = render(&minimal_two_sections(), &PrintOptions::default());
        assert!(text.starts_with("machound - Mach-O security assessment tool\n"));
        assert!(text.contains("Format:       thin"));
        assert!(text.contains("arm64"));
        assert!(text.contains("__TEXT"));
        assert!(text.contains("__cstring"));
        assert!(text.contains("Symbols (0):"));
        assert!(!text.contains("Warnings"));
    }

    #[test]
    fn test_libraries_signature_and_symbols() {
        let data = MachOBuilder::arm64()
            .dylib(LC_LOAD_DYLIB, "/usr/lib/libSystem.B.dylib", 0x051F_0A02, 0x0001_0000)
            .symbols(&[
                ("_a", N_SECT | N_EXT, 1, 0x1000),
                ("_b", N_SECT | N_EXT, 1, 0x1010),
                ("_c", N_SECT | N_EXT, 1, 0x1020),
            ])
            .code_signature(superblob(&[
                (
                    CSSLOT_CODEDIRECTORY,
                    code_directory(0x20400, 0, "com.example.app", Some("TEAM123456")),
                ),
                (CSSLOT_ENTITLEMENTS, entitlements("<plist>\n<dict/>\n</plist>")),
            ]))
            .build();
        let options = PrintOptions {
            show_symbols: true,
            max_symbols: Some(2),
        };
        let text = render(&data, &options);

        assert!(text.contains(
            "/usr/lib/libSystem.B.dylib (compatibility 1.0.0, current 1311.10.2)"
        ));
        assert!(text.contains("Identifier:   com.example.app"));
        assert!(text.contains("Team ID:      TEAM123456"));
        assert!(text.contains("    <dict/>"));
        assert!(text.contains("_b"));
        assert!(!text.contains("_c\n"));
        assert!(text.contains("... 1 more"));
    }

    #[test]
    fn test_warnings_listed() {
        let data = MachOBuilder::arm64().raw(0x7777, vec![0; 8]).build();
        let text = render(&data, &PrintOptions::default());
        assert!(text.contains("Warnings (1):"));
        assert!(text.contains("unknown load command 0x7777"));
    }

    #[test]
    fn test_fat_table() {
        let slice = minimal_two_sections();
        let data = fat(&[(crate::macho::CPU_TYPE_ARM64, 0, &slice[..])], false);
        let text = render(&data, &PrintOptions::default());
        assert!(text.contains("Format:       fat (1 architectures)"));
        assert!(text.contains("Fat architectures:"));
        assert!(text.contains("Architecture [0] arm64"));
    }

    #[test]
    fn test_architecture_uses_fat_index() {
        let bad = vec![0xEEu8; 64];
        let good = minimal_two_sections();
        let data = fat(
            &[
                (crate::macho::CPU_TYPE_X86_64, 3, &bad[..]),
                (crate::macho::CPU_TYPE_ARM64, 0, &good[..]),
            ],
            false,
        );
        let text = render(&data, &PrintOptions::default());
        assert!(text.contains("Architecture [1] arm64"));
        assert!(!text.contains("Architecture [0]"));
        assert!(text.contains("File warnings (1):"));
    }

    #[test]
    fn test_big_endian_magic_in_own_byte_order() {
        let data = MachOBuilder::new(AddressWidth::Bits32, Endian::Big).build();
        let text = render(&data, &PrintOptions::default());
        assert!(text.contains("Magic:        0xfeedface (32-bit big-endian)"));
    }
}
