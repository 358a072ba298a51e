//! Pack index (v1 and v2) reading and lookup.
//!
//! The pack index provides fast OID → offset mapping using a fan-out table
//! and binary search.
//!
//! Version 1 (no magic, identified by the absence of the v2 signature):
//!
//! ```text
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! Entries: N × (4-byte offset, 20-byte OID), sorted by OID
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```
//!
//! Version 2:
//!
//! ```text
//! Header:  \xff tOc (4 bytes) | version (4 bytes = 2)
//! Fanout:  256 × 4-byte big-endian cumulative counts
//! OIDs:    N × 20-byte sorted OIDs
//! CRC32:   N × 4-byte CRC32 values
//! Offsets: N × 4-byte offsets (high bit = 1 → use 64-bit table)
//! 64-bit:  M × 8-byte offsets (for packs > 2GB)
//! Trailer: 20-byte pack checksum | 20-byte index checksum
//! ```

use std::path::{Path, PathBuf};

use git_hash::{HashAlgorithm, ObjectId};
use memmap2::Mmap;

use crate::{IDX_SIGNATURE, IDX_VERSION, PackError};

/// Layout-specific byte offsets, computed once at open time.
enum Layout {
    V1 {
        /// Byte offset where the (offset, oid) entry array starts.
        entries_offset: usize,
    },
    V2 {
        oid_offset: usize,
        crc_offset: usize,
        offset32_offset: usize,
        offset64_offset: usize,
    },
}

/// Pack index providing OID → offset mapping, supporting both v1 and v2.
pub struct PackIndex {
    data: Mmap,
    version: u32,
    num_objects: u32,
    /// Byte offset where the fanout table starts.
    fanout_offset: usize,
    layout: Layout,
    /// Path to the .idx file.
    idx_path: PathBuf,
    hash_algo: HashAlgorithm,
}

impl PackIndex {
    /// Open a pack index file, assuming SHA-1 object identifiers.
    pub fn open(idx_path: impl AsRef<Path>) -> Result<Self, PackError> {
        Self::open_with_algo(idx_path, HashAlgorithm::Sha1)
    }

    /// Open a pack index file using the given hash algorithm for OID width.
    pub fn open_with_algo(
        idx_path: impl AsRef<Path>,
        hash_algo: HashAlgorithm,
    ) -> Result<Self, PackError> {
        let idx_path = idx_path.as_ref().to_path_buf();
        let file = std::fs::File::open(&idx_path)?;
        let data = unsafe { Mmap::map(&file)? };
        let hash_len = hash_algo.digest_len();

        if data.len() < 4 {
            return Err(PackError::InvalidIndex("file too small".into()));
        }

        if data[0..4] == IDX_SIGNATURE {
            Self::open_v2(data, idx_path, hash_algo, hash_len)
        } else {
            Self::open_v1(data, idx_path, hash_algo, hash_len)
        }
    }

    fn open_v1(
        data: Mmap,
        idx_path: PathBuf,
        hash_algo: HashAlgorithm,
        hash_len: usize,
    ) -> Result<Self, PackError> {
        let fanout_offset = 0;

        // Minimum size: fanout(1024) + trailer(2 * hash_len)
        if data.len() < 1024 + 2 * hash_len {
            return Err(PackError::InvalidIndex("file too small for v1 index".into()));
        }

        let last_fanout_pos = fanout_offset + 255 * 4;
        let num_objects = u32::from_be_bytes([
            data[last_fanout_pos],
            data[last_fanout_pos + 1],
            data[last_fanout_pos + 2],
            data[last_fanout_pos + 3],
        ]);

        let n = num_objects as usize;
        let entries_offset = fanout_offset + 1024;
        let entry_size = 4 + hash_len;
        let min_size = entries_offset + n * entry_size + 2 * hash_len;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            version: 1,
            num_objects,
            fanout_offset,
            layout: Layout::V1 { entries_offset },
            idx_path,
            hash_algo,
        })
    }

    fn open_v2(
        data: Mmap,
        idx_path: PathBuf,
        hash_algo: HashAlgorithm,
        hash_len: usize,
    ) -> Result<Self, PackError> {
        // Minimum size: header(8) + fanout(1024) + trailer(2 * hash_len)
        if data.len() < 8 + 1024 + 2 * hash_len {
            return Err(PackError::InvalidIndex("file too small".into()));
        }

        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::InvalidIndex(format!(
                "unsupported version {version}, expected {IDX_VERSION}"
            )));
        }

        let fanout_offset = 8;
        let last_fanout_pos = fanout_offset + 255 * 4;
        let num_objects = u32::from_be_bytes([
            data[last_fanout_pos],
            data[last_fanout_pos + 1],
            data[last_fanout_pos + 2],
            data[last_fanout_pos + 3],
        ]);

        let n = num_objects as usize;
        let oid_offset = fanout_offset + 1024;
        let crc_offset = oid_offset + n * hash_len;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;

        let min_size = offset64_offset + 2 * hash_len;
        if data.len() < min_size {
            return Err(PackError::InvalidIndex(format!(
                "file too small: {} < {min_size}",
                data.len()
            )));
        }

        Ok(Self {
            data,
            version,
            num_objects,
            fanout_offset,
            layout: Layout::V2 {
                oid_offset,
                crc_offset,
                offset32_offset,
                offset64_offset,
            },
            idx_path,
            hash_algo,
        })
    }

    /// Look up an OID, returning the offset in the pack file.
    pub fn lookup(&self, oid: &ObjectId) -> Option<u64> {
        let (lo, hi) = self.fanout_range(oid.first_byte());
        if lo >= hi {
            return None;
        }
        let target = oid.as_bytes();

        let mut low = lo;
        let mut high = hi;
        while low < high {
            let mid = low + (high - low) / 2;
            let mid_oid = self.oid_bytes_at(mid);
            match mid_oid.cmp(target) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => {
                    return Some(self.offset_at_index(mid as u32));
                }
            }
        }
        None
    }

    /// Look up by OID prefix, returning all matches as (OID, offset) pairs.
    pub fn lookup_prefix(&self, prefix: &[u8]) -> Vec<(ObjectId, u64)> {
        if prefix.is_empty() {
            return Vec::new();
        }

        let first_byte = prefix[0];
        let (lo, hi) = self.fanout_range(first_byte);

        let mut results = Vec::new();
        for i in lo..hi {
            let oid_bytes = self.oid_bytes_at(i);
            if oid_bytes.len() >= prefix.len() && oid_bytes[..prefix.len()] == *prefix {
                if let Ok(oid) = ObjectId::from_bytes(oid_bytes, self.hash_algo) {
                    results.push((oid, self.offset_at_index(i as u32)));
                }
            }
        }
        results
    }

    /// Get the OID at the given sorted index position.
    pub fn oid_at_index(&self, index: u32) -> ObjectId {
        let bytes = self.oid_bytes_at(index as usize);
        ObjectId::from_bytes(bytes, self.hash_algo).expect("valid OID in index")
    }

    /// Get the pack file offset at the given sorted index position.
    pub fn offset_at_index(&self, index: u32) -> u64 {
        match &self.layout {
            Layout::V1 { entries_offset } => {
                let hash_len = self.hash_algo.digest_len();
                let entry_size = 4 + hash_len;
                let pos = entries_offset + index as usize * entry_size;
                u32::from_be_bytes([
                    self.data[pos],
                    self.data[pos + 1],
                    self.data[pos + 2],
                    self.data[pos + 3],
                ]) as u64
            }
            Layout::V2 {
                offset32_offset,
                offset64_offset,
                ..
            } => {
                let pos = offset32_offset + index as usize * 4;
                let val = u32::from_be_bytes([
                    self.data[pos],
                    self.data[pos + 1],
                    self.data[pos + 2],
                    self.data[pos + 3],
                ]);

                if val & 0x8000_0000 != 0 {
                    // 64-bit offset: high bit is set, lower 31 bits index into 64-bit table
                    let idx64 = (val & 0x7FFF_FFFF) as usize;
                    let pos64 = offset64_offset + idx64 * 8;
                    u64::from_be_bytes([
                        self.data[pos64],
                        self.data[pos64 + 1],
                        self.data[pos64 + 2],
                        self.data[pos64 + 3],
                        self.data[pos64 + 4],
                        self.data[pos64 + 5],
                        self.data[pos64 + 6],
                        self.data[pos64 + 7],
                    ])
                } else {
                    val as u64
                }
            }
        }
    }

    /// Get the CRC32 at the given sorted index position.
    ///
    /// Returns `None` for a v1 index, which does not store per-object CRC32s.
    pub fn crc32_at_index(&self, index: u32) -> Option<u32> {
        match &self.layout {
            Layout::V1 { .. } => None,
            Layout::V2 { crc_offset, .. } => {
                let pos = crc_offset + index as usize * 4;
                Some(u32::from_be_bytes([
                    self.data[pos],
                    self.data[pos + 1],
                    self.data[pos + 2],
                    self.data[pos + 3],
                ]))
            }
        }
    }

    /// Total number of objects in this index.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Index version (1 or 2).
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Path to the .idx file.
    pub fn path(&self) -> &Path {
        &self.idx_path
    }

    /// Pack checksum stored in the index trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let hash_len = self.hash_algo.digest_len();
        let start = self.data.len() - 2 * hash_len;
        ObjectId::from_bytes(&self.data[start..start + hash_len], self.hash_algo)
            .expect("valid checksum in index trailer")
    }

    /// Index checksum (the trailing hash of the index file itself).
    pub fn index_checksum(&self) -> ObjectId {
        let hash_len = self.hash_algo.digest_len();
        let start = self.data.len() - hash_len;
        ObjectId::from_bytes(&self.data[start..start + hash_len], self.hash_algo)
            .expect("valid checksum in index trailer")
    }

    /// Verify the index file's own trailing checksum by hashing every byte
    /// that precedes it and comparing against the stored `index_checksum()`.
    pub fn verify(&self) -> Result<(), PackError> {
        let hash_len = self.hash_algo.digest_len();
        let body_end = self.data.len() - hash_len;
        let mut hasher = git_hash::hasher::Hasher::new(self.hash_algo);
        hasher.update(&self.data[..body_end]);
        let computed = hasher.finalize()?;
        let expected = self.index_checksum();
        if computed != expected {
            return Err(PackError::ChecksumMismatch {
                expected,
                actual: computed,
            });
        }
        Ok(())
    }

    /// Iterate over all (OID, offset) pairs in sorted order.
    pub fn iter(&self) -> PackIndexIter<'_> {
        PackIndexIter {
            index: self,
            pos: 0,
        }
    }

    /// Get the fan-out range for a given first byte.
    /// Returns (start, end) indices into the sorted OID list.
    fn fanout_range(&self, first_byte: u8) -> (usize, usize) {
        let end = self.fanout_entry(first_byte) as usize;
        let start = if first_byte == 0 {
            0
        } else {
            self.fanout_entry(first_byte - 1) as usize
        };
        (start, end)
    }

    /// Read a single fanout table entry.
    fn fanout_entry(&self, index: u8) -> u32 {
        let pos = self.fanout_offset + index as usize * 4;
        u32::from_be_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ])
    }

    /// Raw OID bytes at the given sorted index position.
    fn oid_bytes_at(&self, index: usize) -> &[u8] {
        let hash_len = self.hash_algo.digest_len();
        match &self.layout {
            Layout::V1 { entries_offset } => {
                let entry_size = 4 + hash_len;
                let start = entries_offset + index * entry_size + 4;
                &self.data[start..start + hash_len]
            }
            Layout::V2 { oid_offset, .. } => {
                let start = oid_offset + index * hash_len;
                &self.data[start..start + hash_len]
            }
        }
    }
}

/// Iterator over (OID, offset) pairs in a pack index.
pub struct PackIndexIter<'a> {
    index: &'a PackIndex,
    pos: u32,
}

impl<'a> Iterator for PackIndexIter<'a> {
    type Item = (ObjectId, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.index.num_objects {
            return None;
        }
        let oid = self.index.oid_at_index(self.pos);
        let offset = self.index.offset_at_index(self.pos);
        self.pos += 1;
        Some((oid, offset))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.index.num_objects - self.pos) as usize;
        (remaining, Some(remaining))
    }
}

impl<'a> ExactSizeIterator for PackIndexIter<'a> {}
