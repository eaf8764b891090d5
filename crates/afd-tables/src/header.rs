//! Word header shared by every table file, and a read-only mapped table.

use std::fs::File;
use std::marker::PhantomData;
use std::path::Path;

use memmap2::Mmap;

use crate::{Result, TableError};

/// Size of the header in front of every table body.
pub const AFD_WORD_OFFSET: usize = 16;

/// Offset of the version byte inside the header.
pub const VERSION_BYTE_OFFSET: usize = 7;

/// Table header in shared memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TableHeader {
    pub no_of_entries: i32,
    pub _reserved1: [u8; 3],
    pub version: u8,
    pub _reserved2: [u8; 8],
}

const _: () = assert!(std::mem::size_of::<TableHeader>() == AFD_WORD_OFFSET);
const _: () = assert!(std::mem::offset_of!(TableHeader, version) == VERSION_BYTE_OFFSET);

impl TableHeader {
    pub fn new(no_of_entries: usize, version: u8) -> Self {
        Self {
            no_of_entries: no_of_entries as i32,
            version,
            ..Self::default()
        }
    }

    /// Read the header from the front of a mapped file.
    pub fn read(table: &'static str, bytes: &[u8]) -> Result<Self> {
        if bytes.len() < AFD_WORD_OFFSET {
            return Err(TableError::Truncated {
                table,
                len: bytes.len(),
                needed: AFD_WORD_OFFSET,
            });
        }
        let mut count = [0u8; 4];
        count.copy_from_slice(&bytes[..4]);
        Ok(Self {
            no_of_entries: i32::from_ne_bytes(count),
            version: bytes[VERSION_BYTE_OFFSET],
            ..Self::default()
        })
    }

    /// Entry count, treating a corrupt negative value as empty.
    pub fn count(&self) -> usize {
        self.no_of_entries.max(0) as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        // Safety: TableHeader is repr(C) plain data with no padding.
        unsafe {
            std::slice::from_raw_parts(self as *const Self as *const u8, AFD_WORD_OFFSET)
        }
    }
}

/// A fixed-layout record stored densely after the word header.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain only integer and byte-array
/// fields (every bit pattern valid), and have an alignment no larger than 8.
pub unsafe trait TableEntry: Copy + 'static {
    /// Table name used in errors and logs
    const TABLE: &'static str;
    /// Expected version byte, or `None` for unversioned tables
    const VERSION: Option<u8>;

    fn as_bytes(&self) -> &[u8] {
        // Safety: guaranteed plain data by the trait contract.
        unsafe {
            std::slice::from_raw_parts(self as *const Self as *const u8, std::mem::size_of::<Self>())
        }
    }
}

/// Validate header and size of a mapped table, returning the entry count.
pub(crate) fn validate<T: TableEntry>(bytes: &[u8]) -> Result<usize> {
    let header = TableHeader::read(T::TABLE, bytes)?;
    if let Some(expected) = T::VERSION {
        if header.version != expected {
            return Err(TableError::VersionMismatch {
                table: T::TABLE,
                expected,
                found: header.version,
            });
        }
    }
    let count = header.count();
    let needed = AFD_WORD_OFFSET + count * std::mem::size_of::<T>();
    if bytes.len() < needed {
        return Err(TableError::Truncated {
            table: T::TABLE,
            len: bytes.len(),
            needed,
        });
    }
    Ok(count)
}

/// Entry slice behind the header.
///
/// Callers must have run `validate::<T>` on `bytes` and pass its count.
pub(crate) fn entries<T: TableEntry>(bytes: &[u8], count: usize) -> &[T] {
    debug_assert!(bytes.len() >= AFD_WORD_OFFSET + count * std::mem::size_of::<T>());
    // Safety: the map is page aligned, AFD_WORD_OFFSET is a multiple of 8 and
    // validate() checked the length; T is plain data per TableEntry.
    unsafe { std::slice::from_raw_parts(bytes.as_ptr().add(AFD_WORD_OFFSET) as *const T, count) }
}

/// Mutable entry slice behind the header.
pub(crate) fn entries_mut<T: TableEntry>(bytes: &mut [u8], count: usize) -> &mut [T] {
    debug_assert!(bytes.len() >= AFD_WORD_OFFSET + count * std::mem::size_of::<T>());
    // Safety: see entries().
    unsafe {
        std::slice::from_raw_parts_mut(bytes.as_mut_ptr().add(AFD_WORD_OFFSET) as *mut T, count)
    }
}

/// Read-only mapping of one table file.
pub struct MappedTable<T: TableEntry> {
    map: Mmap,
    count: usize,
    _entry: PhantomData<T>,
}

impl<T: TableEntry> MappedTable<T> {
    /// Map `path` read-only and validate its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len() as usize;
        if len == 0 {
            return Err(TableError::Truncated {
                table: T::TABLE,
                len: 0,
                needed: AFD_WORD_OFFSET,
            });
        }
        // Safety: the daemon replaces these tables by rename, it never
        // truncates a file that readers may have mapped.
        let map = unsafe { Mmap::map(&file)? };
        let count = validate::<T>(&map)?;
        Ok(Self {
            map,
            count,
            _entry: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn entries(&self) -> &[T] {
        entries::<T>(&self.map, self.count)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries().get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = TableHeader::new(3, 7);
        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), AFD_WORD_OFFSET);
        assert_eq!(bytes[VERSION_BYTE_OFFSET], 7);
        assert_eq!(i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]), 3);

        let parsed = TableHeader::read("test", bytes).unwrap();
        assert_eq!(parsed.count(), 3);
        assert_eq!(parsed.version, 7);
    }

    #[test]
    fn test_short_header_rejected() {
        let err = TableHeader::read("test", &[0u8; 4]).unwrap_err();
        assert!(matches!(err, TableError::Truncated { needed: AFD_WORD_OFFSET, .. }));
    }

    #[test]
    fn test_negative_count_is_empty() {
        let header = TableHeader {
            no_of_entries: -4,
            ..TableHeader::default()
        };
        assert_eq!(header.count(), 0);
    }
}
