/// Filesystem attribute bits, packed into a single byte per node.
///
/// Raw attributes use the Win32 numbering on every platform. On Unix the
/// local filesystem synthesizes the subset that has a meaning there
/// (hidden dot-files, read-only permissions, symlinks as reparse points).
use std::fmt;

/// Raw attribute word as produced by a directory enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileAttributes(pub u32);

impl FileAttributes {
    pub const READONLY: u32 = 0x0001;
    pub const HIDDEN: u32 = 0x0002;
    pub const SYSTEM: u32 = 0x0004;
    pub const DIRECTORY: u32 = 0x0010;
    pub const ARCHIVE: u32 = 0x0020;
    pub const REPARSE_POINT: u32 = 0x0400;
    pub const COMPRESSED: u32 = 0x0800;
    pub const ENCRYPTED: u32 = 0x4000;

    /// Sentinel for "attributes could not be read".
    pub const INVALID: FileAttributes = FileAttributes(u32::MAX);

    #[inline]
    pub fn contains(self, bits: u32) -> bool {
        self != Self::INVALID && self.0 & bits == bits
    }

    #[inline]
    pub fn is_hidden(self) -> bool {
        self.contains(Self::HIDDEN)
    }

    #[inline]
    pub fn is_reparse_point(self) -> bool {
        self.contains(Self::REPARSE_POINT)
    }

    #[inline]
    pub fn is_directory(self) -> bool {
        self.contains(Self::DIRECTORY)
    }
}

// Packed layout, one bit each:
//   0 R | 1 H | 2 S | 3 A | 4 reparse | 5 C | 6 E | 7 invalid
const PACKED_INVALID: u8 = 0x80;

/// Compact attribute byte stored on every node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Attributes(u8);

impl Attributes {
    /// Encode raw attributes into the packed byte.
    pub fn from_raw(raw: FileAttributes) -> Self {
        if raw == FileAttributes::INVALID {
            return Self(PACKED_INVALID);
        }
        let attr = raw.0;
        // R, H and S keep their positions in the low three bits.
        let mut packed = attr
            & (FileAttributes::READONLY | FileAttributes::HIDDEN | FileAttributes::SYSTEM);
        packed |= (attr & FileAttributes::ARCHIVE) >> 2;
        packed |= (attr & (FileAttributes::REPARSE_POINT | FileAttributes::COMPRESSED)) >> 6;
        packed |= (attr & FileAttributes::ENCRYPTED) >> 8;
        Self(packed as u8)
    }

    /// Decode back into raw attributes. The directory bit is not stored.
    pub fn to_raw(self) -> FileAttributes {
        if self.is_invalid() {
            return FileAttributes::INVALID;
        }
        let packed = self.0 as u32;
        let mut raw = packed
            & (FileAttributes::READONLY | FileAttributes::HIDDEN | FileAttributes::SYSTEM);
        raw |= (packed & 0x08) << 2;
        raw |= (packed & 0x30) << 6;
        raw |= (packed & 0x40) << 8;
        FileAttributes(raw)
    }

    #[inline]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_invalid(self) -> bool {
        self.0 & PACKED_INVALID != 0
    }

    #[inline]
    pub fn is_reparse_point(self) -> bool {
        !self.is_invalid() && self.0 & 0x10 != 0
    }

    /// Sort key honouring the RHSACE priority: read-only dominates,
    /// encrypted weighs least. Invalid attributes sort first.
    pub fn sort_key(self) -> u32 {
        if self.is_invalid() {
            return 0;
        }
        let weights: [(u8, u32); 6] = [
            (0x01, 1_000_000),
            (0x02, 100_000),
            (0x04, 10_000),
            (0x08, 1_000),
            (0x20, 100),
            (0x40, 10),
        ];
        weights
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, weight)| weight)
            .sum()
    }
}

impl fmt::Display for Attributes {
    /// `RHSACE` letters for the set flags; `?` for unreadable attributes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return f.write_str("?");
        }
        let letters = [
            (0x01, 'R'),
            (0x02, 'H'),
            (0x04, 'S'),
            (0x08, 'A'),
            (0x20, 'C'),
            (0x40, 'E'),
        ];
        for (bit, letter) in letters {
            if self.0 & bit != 0 {
                write!(f, "{letter}")?;
            }
        }
        Ok(())
    }
}
