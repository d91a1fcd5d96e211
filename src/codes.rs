//! Fixed-width PQ code storage.
//!
//! Codes are held in one flat buffer, vector-major and subspace-minor:
//! entry `(i, s)` lives at `i * subspace_num + s`. The element type is the
//! narrowest unsigned integer that can address every cluster.

use crate::PqError;

/// Integer width of a single PQ code entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeWidth {
    U8,
    U16,
}

impl CodeWidth {
    /// Narrowest width that can hold cluster ids `0..clusters`.
    pub fn for_clusters(clusters: usize) -> Option<Self> {
        match clusters {
            0 => None,
            1..=256 => Some(Self::U8),
            257..=65536 => Some(Self::U16),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
        }
    }

    pub fn from_bytes(bytes: u8) -> Option<Self> {
        match bytes {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            _ => None,
        }
    }

    pub fn max_clusters(self) -> usize {
        match self {
            Self::U8 => 1 << 8,
            Self::U16 => 1 << 16,
        }
    }
}

/// Borrowed view of the raw code buffer.
#[derive(Debug, Clone, Copy)]
pub enum CodeView<'a> {
    U8(&'a [u8]),
    U16(&'a [u16]),
}

#[derive(Debug, Clone, PartialEq)]
enum CodeStorage {
    U8(Vec<u8>),
    U16(Vec<u16>),
}

/// PQ codes for every database vector, positionally aligned with vector ids.
#[derive(Debug, Clone, PartialEq)]
pub struct PqCodes {
    subspace_num: usize,
    storage: CodeStorage,
}

impl PqCodes {
    /// Create an empty code set.
    pub fn new(width: CodeWidth, subspace_num: usize) -> Self {
        let storage = match width {
            CodeWidth::U8 => CodeStorage::U8(Vec::new()),
            CodeWidth::U16 => CodeStorage::U16(Vec::new()),
        };
        Self {
            subspace_num,
            storage,
        }
    }

    /// Adopt a flat `u8` buffer of `len * subspace_num` entries.
    pub fn from_u8(subspace_num: usize, data: Vec<u8>) -> Result<Self, PqError> {
        check_shape(subspace_num, data.len())?;
        Ok(Self {
            subspace_num,
            storage: CodeStorage::U8(data),
        })
    }

    /// Adopt a flat `u16` buffer of `len * subspace_num` entries.
    pub fn from_u16(subspace_num: usize, data: Vec<u16>) -> Result<Self, PqError> {
        check_shape(subspace_num, data.len())?;
        Ok(Self {
            subspace_num,
            storage: CodeStorage::U16(data),
        })
    }

    /// Interleave per-subspace assignments into vector-major codes.
    ///
    /// `assignments[s][i]` is the cluster of vector `i` in subspace `s`.
    /// Every value must fit in `width`.
    pub(crate) fn from_assignments(width: CodeWidth, assignments: &[Vec<usize>]) -> Self {
        let subspace_num = assignments.len();
        let len = assignments.first().map_or(0, Vec::len);
        let mut codes = Self::new(width, subspace_num);
        codes.reserve(len);
        let mut row = vec![0usize; subspace_num];
        for i in 0..len {
            for (slot, subspace) in row.iter_mut().zip(assignments.iter()) {
                *slot = subspace[i];
            }
            codes.push(&row);
        }
        codes
    }

    fn reserve(&mut self, vectors: usize) {
        let additional = vectors * self.subspace_num;
        match &mut self.storage {
            CodeStorage::U8(data) => data.reserve(additional),
            CodeStorage::U16(data) => data.reserve(additional),
        }
    }

    /// Append the code of one vector.
    pub fn push(&mut self, code: &[usize]) {
        assert_eq!(code.len(), self.subspace_num, "code length mismatch");
        match &mut self.storage {
            CodeStorage::U8(data) => {
                data.extend(code.iter().map(|&c| {
                    debug_assert!(c <= u8::MAX as usize);
                    c as u8
                }));
            }
            CodeStorage::U16(data) => {
                data.extend(code.iter().map(|&c| {
                    debug_assert!(c <= u16::MAX as usize);
                    c as u16
                }));
            }
        }
    }

    pub fn width(&self) -> CodeWidth {
        match self.storage {
            CodeStorage::U8(_) => CodeWidth::U8,
            CodeStorage::U16(_) => CodeWidth::U16,
        }
    }

    pub fn subspace_num(&self) -> usize {
        self.subspace_num
    }

    /// Number of encoded vectors.
    pub fn len(&self) -> usize {
        if self.subspace_num == 0 {
            return 0;
        }
        let entries = match &self.storage {
            CodeStorage::U8(data) => data.len(),
            CodeStorage::U16(data) => data.len(),
        };
        entries / self.subspace_num
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cluster id of vector `id` in subspace `subspace`.
    #[inline]
    pub fn get(&self, id: usize, subspace: usize) -> usize {
        let offset = id * self.subspace_num + subspace;
        match &self.storage {
            CodeStorage::U8(data) => data[offset] as usize,
            CodeStorage::U16(data) => data[offset] as usize,
        }
    }

    /// The full code of vector `id`, widened to `usize`.
    pub fn code(&self, id: usize) -> Vec<usize> {
        (0..self.subspace_num).map(|s| self.get(id, s)).collect()
    }

    pub fn view(&self) -> CodeView<'_> {
        match &self.storage {
            CodeStorage::U8(data) => CodeView::U8(data),
            CodeStorage::U16(data) => CodeView::U16(data),
        }
    }

    /// Largest cluster id referenced by subspace `subspace`, if any vector exists.
    pub(crate) fn max_in_subspace(&self, subspace: usize) -> Option<usize> {
        (0..self.len()).map(|id| self.get(id, subspace)).max()
    }
}

fn check_shape(subspace_num: usize, entries: usize) -> Result<(), PqError> {
    if subspace_num == 0 {
        return Err(PqError::InvalidConfig("subspace_num must be positive"));
    }
    if entries % subspace_num != 0 {
        return Err(PqError::InvalidConfig(
            "code buffer length must be a multiple of subspace_num",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_selection() {
        assert_eq!(CodeWidth::for_clusters(0), None);
        assert_eq!(CodeWidth::for_clusters(1), Some(CodeWidth::U8));
        assert_eq!(CodeWidth::for_clusters(256), Some(CodeWidth::U8));
        assert_eq!(CodeWidth::for_clusters(257), Some(CodeWidth::U16));
        assert_eq!(CodeWidth::for_clusters(65536), Some(CodeWidth::U16));
        assert_eq!(CodeWidth::for_clusters(65537), None);
    }

    #[test]
    fn test_assignments_are_interleaved_vector_major() {
        let assignments = vec![vec![0, 1, 2], vec![3, 4, 5]];
        let codes = PqCodes::from_assignments(CodeWidth::U8, &assignments);
        assert_eq!(codes.len(), 3);
        assert_eq!(codes.code(0), vec![0, 3]);
        assert_eq!(codes.code(2), vec![2, 5]);
        match codes.view() {
            CodeView::U8(raw) => assert_eq!(raw, &[0, 3, 1, 4, 2, 5]),
            CodeView::U16(_) => panic!("expected u8 codes"),
        }
    }

    #[test]
    fn test_wide_codes_keep_large_ids() {
        let mut codes = PqCodes::new(CodeWidth::U16, 2);
        codes.push(&[300, 65535]);
        assert_eq!(codes.get(0, 0), 300);
        assert_eq!(codes.get(0, 1), 65535);
        assert_eq!(codes.max_in_subspace(1), Some(65535));
    }

    #[test]
    fn test_rejects_ragged_buffers() {
        assert!(PqCodes::from_u8(3, vec![0; 7]).is_err());
        assert!(PqCodes::from_u16(0, vec![]).is_err());
        assert_eq!(PqCodes::from_u8(3, vec![0; 9]).unwrap().len(), 3);
    }
}
