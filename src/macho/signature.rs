//! Embedded code signature metadata.
//!
//! The LC_CODE_SIGNATURE range holds a big-endian SuperBlob: a header and an
//! index of (slot, offset) pairs, each offset pointing at a blob that starts
//! with its own magic and length. Only structure is read here. Hashes and
//! the CMS signature are never checked.

use tracing::debug;

use super::constants::*;
use super::cursor::{ByteCursor, Endian};
use super::structs::LinkeditDataCommand;
use crate::error::{Error, Result};
use crate::util::{c_str, checked_range_end};

/// One entry of the SuperBlob index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobIndex {
    /// Slot type (CSSLOT_*)
    pub slot: u32,
    /// Offset from the start of the SuperBlob
    pub offset: u32,
    /// Magic of the blob at that offset
    pub magic: u32,
}

impl BlobIndex {
    /// Returns a name for the slot.
    pub fn slot_name(&self) -> &'static str {
        match self.slot {
            CSSLOT_CODEDIRECTORY => "CodeDirectory",
            CSSLOT_REQUIREMENTS => "Requirements",
            CSSLOT_ENTITLEMENTS => "Entitlements",
            CSSLOT_DER_ENTITLEMENTS => "DER Entitlements",
            CSSLOT_SIGNATURESLOT => "CMS Signature",
            s if (CSSLOT_ALTERNATE_CODEDIRECTORIES..CSSLOT_ALTERNATE_CODEDIRECTORIES + 5)
                .contains(&s) =>
            {
                "Alternate CodeDirectory"
            }
            _ => "unknown",
        }
    }
}

/// Fields of the CodeDirectory blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeDirectory {
    /// Format version
    pub version: u32,
    /// CS_* flags
    pub flags: u32,
    /// Signing identifier (usually the bundle id)
    pub identifier: String,
    /// Team identifier, version 0x20200 and later
    pub team_id: Option<String>,
    /// Number of special hash slots
    pub n_special_slots: u32,
    /// Number of code page hash slots
    pub n_code_slots: u32,
    /// Bytes of the file covered by code hashes
    pub code_limit: u32,
    /// Size of each hash
    pub hash_size: u8,
    /// Hash algorithm (1=SHA-1, 2=SHA-256)
    pub hash_type: u8,
    /// Page size as a power of 2
    pub page_size_log2: u8,
}

impl CodeDirectory {
    /// Returns true for an ad-hoc signature.
    pub fn is_adhoc(&self) -> bool {
        self.flags & CS_ADHOC != 0
    }

    /// Returns true if the hardened runtime is enabled.
    pub fn has_runtime(&self) -> bool {
        self.flags & CS_RUNTIME != 0
    }

    /// Returns true for a signature produced by the linker.
    pub fn is_linker_signed(&self) -> bool {
        self.flags & CS_LINKER_SIGNED != 0
    }

    /// Returns the hash algorithm name.
    pub fn hash_name(&self) -> &'static str {
        match self.hash_type {
            1 => "sha1",
            2 => "sha256",
            3 => "sha256-truncated",
            4 => "sha384",
            _ => "unknown",
        }
    }

    fn decode(blob: &[u8]) -> Result<Self> {
        const BE: Endian = Endian::Big;

        let mut cursor = ByteCursor::at(blob, 8)?;
        let version = cursor.read_u32(BE)?;
        let flags = cursor.read_u32(BE)?;
        let _hash_offset = cursor.read_u32(BE)?;
        let ident_offset = cursor.read_u32(BE)?;
        let n_special_slots = cursor.read_u32(BE)?;
        let n_code_slots = cursor.read_u32(BE)?;
        let code_limit = cursor.read_u32(BE)?;
        let hash_size = cursor.read_u8()?;
        let hash_type = cursor.read_u8()?;
        let _platform = cursor.read_u8()?;
        let page_size_log2 = cursor.read_u8()?;

        let identifier = blob_string(blob, ident_offset)?
            .ok_or_else(|| Error::out_of_bounds(ident_offset as usize, 1, blob.len()))?;

        let team_id = if version >= CS_SUPPORTSTEAMID {
            // spare2 at 40, scatterOffset at 44, teamOffset at 48
            cursor.seek(48)?;
            match cursor.read_u32(BE)? {
                0 => None,
                team_offset => blob_string(blob, team_offset)?,
            }
        } else {
            None
        };

        Ok(Self {
            version,
            flags,
            identifier,
            team_id,
            n_special_slots,
            n_code_slots,
            code_limit,
            hash_size,
            hash_type,
            page_size_log2,
        })
    }
}

/// Reads a NUL-terminated string at `offset` inside a blob.
fn blob_string(blob: &[u8], offset: u32) -> Result<Option<String>> {
    let tail = blob
        .get(offset as usize..)
        .ok_or_else(|| Error::out_of_bounds(offset as usize, 1, blob.len()))?;
    Ok(c_str(tail).map(|s| String::from_utf8_lossy(s).into_owned()))
}

/// Decoded code signature of one slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeSignature {
    /// Offset of the SuperBlob in the slice
    pub offset: u64,
    /// Size declared by LC_CODE_SIGNATURE
    pub size: u64,
    /// SuperBlob magic as found
    pub magic: u32,
    /// Index entries in order
    pub blobs: Vec<BlobIndex>,
    /// First CodeDirectory
    pub code_directory: Option<CodeDirectory>,
    /// XML entitlements plist
    pub entitlements: Option<String>,
    /// A DER entitlements blob is present
    pub der_entitlements: bool,
}

impl CodeSignature {
    /// Returns true if the blob is an embedded signature SuperBlob.
    pub fn is_embedded(&self) -> bool {
        self.magic == CSMAGIC_EMBEDDED_SIGNATURE
    }

    /// Returns the signing identifier.
    pub fn identifier(&self) -> Option<&str> {
        self.code_directory.as_ref().map(|cd| cd.identifier.as_str())
    }

    /// Returns the team identifier.
    pub fn team_id(&self) -> Option<&str> {
        self.code_directory
            .as_ref()
            .and_then(|cd| cd.team_id.as_deref())
    }
}

/// Decodes the SuperBlob referenced by an LC_CODE_SIGNATURE command.
///
/// Returns `None` if the range is outside the slice. Every other problem is
/// a warning and the signature keeps whatever was decoded before it.
pub fn decode_code_signature(
    data: &[u8],
    command: &LinkeditDataCommand,
    warnings: &mut Vec<Error>,
) -> Option<CodeSignature> {
    let offset = u64::from(command.dataoff);
    let size = u64::from(command.datasize);

    let Some(end) = checked_range_end(offset, size, data.len()) else {
        warnings.push(Error::signature(
            offset,
            format!(
                "range {:#x}+{:#x} exceeds file length {:#x}",
                offset,
                size,
                data.len()
            ),
        ));
        return None;
    };

    let region = &data[offset as usize..end as usize];
    let mut signature = CodeSignature {
        offset,
        size,
        ..Default::default()
    };

    if let Err(e) = decode_superblob(region, &mut signature, warnings) {
        warnings.push(Error::signature(offset, e.to_string()));
    }

    debug!(
        "Code signature: {} blobs, identifier {:?}",
        signature.blobs.len(),
        signature.identifier()
    );

    Some(signature)
}

fn decode_superblob(
    region: &[u8],
    signature: &mut CodeSignature,
    warnings: &mut Vec<Error>,
) -> Result<()> {
    const BE: Endian = Endian::Big;
    let base = signature.offset;

    let mut cursor = ByteCursor::new(region);
    signature.magic = cursor.read_u32(BE)?;
    if signature.magic != CSMAGIC_EMBEDDED_SIGNATURE {
        warnings.push(Error::signature(
            base,
            format!("unexpected SuperBlob magic {:#010x}", signature.magic),
        ));
        return Ok(());
    }

    let length = cursor.read_u32(BE)? as usize;
    let count = cursor.read_u32(BE)?;

    let length = if length > region.len() {
        warnings.push(Error::signature(
            base,
            format!(
                "SuperBlob length {:#x} exceeds signature size {:#x}",
                length,
                region.len()
            ),
        ));
        region.len()
    } else {
        length
    };
    let superblob = &region[..length];

    let fits = superblob.len().saturating_sub(12) / 8;
    if count as usize > fits {
        warnings.push(Error::signature(
            base,
            format!("{} blobs declared, index holds {}", count, fits),
        ));
    }

    for _ in 0..(count as usize).min(fits) {
        let slot = cursor.read_u32(BE)?;
        let blob_offset = cursor.read_u32(BE)?;

        let Some(blob) = superblob.get(blob_offset as usize..).filter(|b| b.len() >= 8) else {
            warnings.push(Error::signature(
                base + u64::from(blob_offset),
                format!("blob for slot {:#x} outside SuperBlob", slot),
            ));
            continue;
        };

        let magic = BE.read_u32(blob);
        let blob_len = (BE.read_u32(&blob[4..]) as usize).min(blob.len());
        let blob = &blob[..blob_len.max(8)];

        signature.blobs.push(BlobIndex {
            slot,
            offset: blob_offset,
            magic,
        });

        match magic {
            CSMAGIC_CODEDIRECTORY if signature.code_directory.is_none() => {
                match CodeDirectory::decode(blob) {
                    Ok(cd) => signature.code_directory = Some(cd),
                    Err(e) => warnings.push(Error::signature(
                        base + u64::from(blob_offset),
                        format!("CodeDirectory: {}", e),
                    )),
                }
            }
            CSMAGIC_EMBEDDED_ENTITLEMENTS => {
                let xml = &blob[8..];
                signature.entitlements = Some(String::from_utf8_lossy(xml).into_owned());
            }
            CSMAGIC_EMBEDDED_DER_ENTITLEMENTS => signature.der_entitlements = true,
            _ => {}
        }
    }

    Ok(())
}
