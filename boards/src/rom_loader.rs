//! ROM-set loading and validation.
//!
//! Reads pre-extracted ROM directories (or programmatic byte slices in
//! tests) and assembles board memory regions from them. Model 3 program
//! and data ROMs are striped across chips: consecutive 16-bit (or wider)
//! lanes come from different files, so regions support an interleave
//! width in addition to the plain concatenated layout.

use std::collections::HashMap;
use std::path::Path;

use thiserror::Error;

/// CRC-32 lookup table (reflected polynomial 0xEDB88320), as used by ZIP
/// and MAME ROM manifests.
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    crc ^ 0xFFFF_FFFF
}

#[derive(Debug, Error)]
pub enum RomLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing ROM file: {0}")]
    MissingFile(String),
    #[error("ROM {file}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        file: String,
        expected: usize,
        actual: usize,
    },
    #[error("ROM {file}: CRC32 0x{actual:08X} not among accepted values")]
    ChecksumMismatch { file: String, actual: u32 },
}

/// A collection of ROM files loaded from disk or supplied directly.
pub struct RomSet {
    files: HashMap<String, Vec<u8>>,
}

impl RomSet {
    /// Read every file of an extracted ROM directory (non-recursive),
    /// keyed by bare filename.
    pub fn from_directory(path: &Path) -> Result<Self, RomLoadError> {
        let mut files = HashMap::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            if file_path.is_file() {
                let name = file_path
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy()
                    .to_string();
                files.insert(name, std::fs::read(&file_path)?);
            }
        }
        Ok(Self { files })
    }

    /// Build a set from (filename, data) pairs; used by tests.
    pub fn from_slices(entries: &[(&str, &[u8])]) -> Self {
        let files = entries
            .iter()
            .map(|(name, data)| (name.to_string(), data.to_vec()))
            .collect();
        Self { files }
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(|v| v.as_slice())
    }

    fn require_sized(&self, name: &str, expected: usize) -> Result<&[u8], RomLoadError> {
        let data = self
            .get(name)
            .ok_or_else(|| RomLoadError::MissingFile(name.to_string()))?;
        if data.len() != expected {
            return Err(RomLoadError::SizeMismatch {
                file: name.to_string(),
                expected,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

/// One ROM chip within a region.
pub struct RomEntry {
    pub name: &'static str,
    pub size: usize,
    /// Byte offset (plain layout) or lane index (interleaved layout).
    pub offset: usize,
    /// Accepted CRC32 values across known revisions; empty = unchecked.
    pub crc32: &'static [u32],
}

/// How a region's chips combine into one memory image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RomLayout {
    /// Each entry copied at its byte offset.
    Contiguous,
    /// Entries are byte lanes: `width` bytes from each chip in turn,
    /// ordered by the entries' lane indices.
    Interleaved { width: usize },
}

/// The complete ROM mapping for one board memory region.
pub struct RomRegion {
    pub size: usize,
    pub layout: RomLayout,
    pub entries: &'static [RomEntry],
}

impl RomRegion {
    pub fn load(&self, rom_set: &RomSet) -> Result<Vec<u8>, RomLoadError> {
        self.load_inner(rom_set, true)
    }

    /// Skip CRC validation (modified or development ROMs).
    pub fn load_skip_checksums(&self, rom_set: &RomSet) -> Result<Vec<u8>, RomLoadError> {
        self.load_inner(rom_set, false)
    }

    fn load_inner(&self, rom_set: &RomSet, verify: bool) -> Result<Vec<u8>, RomLoadError> {
        let mut region = vec![0u8; self.size];
        let mut lanes: Vec<(usize, &[u8])> = Vec::with_capacity(self.entries.len());

        for entry in self.entries {
            let data = rom_set.require_sized(entry.name, entry.size)?;
            if verify && !entry.crc32.is_empty() {
                let actual = crc32(data);
                if !entry.crc32.contains(&actual) {
                    return Err(RomLoadError::ChecksumMismatch {
                        file: entry.name.to_string(),
                        actual,
                    });
                }
            }
            lanes.push((entry.offset, data));
        }

        match self.layout {
            RomLayout::Contiguous => {
                for (offset, data) in lanes {
                    let end = (offset + data.len()).min(self.size);
                    region[offset..end].copy_from_slice(&data[..end - offset]);
                }
            }
            RomLayout::Interleaved { width } => {
                lanes.sort_by_key(|&(lane, _)| lane);
                let group = lanes.len() * width;
                for (slot, (_, data)) in lanes.iter().enumerate() {
                    for (chunk_idx, chunk) in data.chunks(width).enumerate() {
                        let dst = chunk_idx * group + slot * width;
                        if dst + width > self.size {
                            break;
                        }
                        region[dst..dst + chunk.len()].copy_from_slice(chunk);
                    }
                }
            }
        }
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32_canonical_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn contiguous_region_assembles_at_offsets() {
        static REGION: RomRegion = RomRegion {
            size: 8,
            layout: RomLayout::Contiguous,
            entries: &[
                RomEntry { name: "lo.bin", size: 4, offset: 0, crc32: &[] },
                RomEntry { name: "hi.bin", size: 4, offset: 4, crc32: &[] },
            ],
        };
        let set = RomSet::from_slices(&[("lo.bin", &[1, 2, 3, 4]), ("hi.bin", &[5, 6, 7, 8])]);
        assert_eq!(REGION.load(&set).unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn interleaved_region_stripes_lanes() {
        static REGION: RomRegion = RomRegion {
            size: 8,
            layout: RomLayout::Interleaved { width: 2 },
            entries: &[
                RomEntry { name: "even.bin", size: 4, offset: 0, crc32: &[] },
                RomEntry { name: "odd.bin", size: 4, offset: 1, crc32: &[] },
            ],
        };
        let set = RomSet::from_slices(&[
            ("even.bin", &[0x00, 0x01, 0x04, 0x05]),
            ("odd.bin", &[0x02, 0x03, 0x06, 0x07]),
        ]);
        assert_eq!(
            REGION.load(&set).unwrap(),
            vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]
        );
    }

    #[test]
    fn checksum_mismatch_is_reported() {
        static REGION: RomRegion = RomRegion {
            size: 4,
            layout: RomLayout::Contiguous,
            entries: &[RomEntry { name: "a.bin", size: 4, offset: 0, crc32: &[0x1234_5678] }],
        };
        let set = RomSet::from_slices(&[("a.bin", &[9, 9, 9, 9])]);
        assert!(matches!(
            REGION.load(&set),
            Err(RomLoadError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn missing_file_is_reported() {
        static REGION: RomRegion = RomRegion {
            size: 4,
            layout: RomLayout::Contiguous,
            entries: &[RomEntry { name: "gone.bin", size: 4, offset: 0, crc32: &[] }],
        };
        let set = RomSet::from_slices(&[]);
        assert!(matches!(
            REGION.load(&set),
            Err(RomLoadError::MissingFile(_))
        ));
    }
}
