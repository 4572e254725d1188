//! Byte source addressed through a mask.
//!
//! A ring of `2^n` bytes wraps with `index & (2^n - 1)`. A plain slice is a ring whose mask
//! is all ones, so the same reads serve both.

use crate::trie::TrieError;

#[derive(Debug, Clone, Copy)]
pub struct ByteRing<'a> {
    data: &'a [u8],
    mask: usize,
}

impl<'a> ByteRing<'a> {
    /// Wrap a power-of-two ring; `mask` must be `data.len() - 1`.
    pub fn new(data: &'a [u8], mask: usize) -> Result<Self, TrieError> {
        if data.is_empty() || !data.len().is_power_of_two() || mask != data.len() - 1 {
            return Err(TrieError::RingSize {
                len: data.len(),
                mask,
            });
        }
        Ok(ByteRing { data, mask })
    }

    /// A non-wrapping source over the whole slice.
    pub fn linear(data: &'a [u8]) -> Self {
        ByteRing {
            data,
            mask: usize::MAX,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn mask(&self) -> usize {
        self.mask
    }

    pub fn is_linear(&self) -> bool {
        self.mask == usize::MAX
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn byte_at(&self, index: usize) -> u8 {
        self.data[index & self.mask]
    }

    /// True when `length` bytes starting at `position` are addressable without overlap.
    pub fn contains(&self, position: usize, length: usize) -> bool {
        if self.is_linear() {
            position
                .checked_add(length)
                .is_some_and(|end| end <= self.data.len())
        } else {
            length <= self.data.len()
        }
    }

    pub(crate) fn check(&self, position: usize, length: usize) -> Result<(), TrieError> {
        if self.contains(position, length) {
            Ok(())
        } else {
            Err(TrieError::SourceWindow {
                position,
                length,
                capacity: self.data.len(),
            })
        }
    }

    pub fn copy_to_vec(&self, position: usize, length: usize) -> Result<Vec<u8>, TrieError> {
        self.check(position, length)?;
        Ok((0..length).map(|i| self.byte_at(position + i)).collect())
    }

    /// Copy a window into `target`, itself addressed with `target_mask` from `target_pos`.
    pub fn copy_into(
        &self,
        position: usize,
        length: usize,
        target: &mut [u8],
        target_pos: usize,
        target_mask: usize,
    ) -> Result<(), TrieError> {
        self.check(position, length)?;
        let fits = if target_mask == usize::MAX {
            target_pos
                .checked_add(length)
                .is_some_and(|end| end <= target.len())
        } else {
            length <= target.len() && target_mask.checked_add(1) == Some(target.len())
        };
        if !fits {
            return Err(TrieError::SourceWindow {
                position: target_pos,
                length,
                capacity: target.len(),
            });
        }
        for i in 0..length {
            target[(target_pos + i) & target_mask] = self.byte_at(position + i);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_wraps_through_mask() {
        let data = *b"cdefab__";
        let ring = ByteRing::new(&data, 7).expect("ring");
        assert_eq!(ring.copy_to_vec(4, 4).expect("copy"), b"ab__".to_vec());
        assert_eq!(ring.copy_to_vec(6, 4).expect("copy"), b"__cd".to_vec());
    }

    #[test]
    fn ring_size_must_match_mask() {
        assert!(ByteRing::new(&[0u8; 6], 5).is_err());
        assert!(ByteRing::new(&[0u8; 8], 3).is_err());
        assert!(ByteRing::new(&[], 0).is_err());
    }

    #[test]
    fn linear_windows_are_bounded() {
        let ring = ByteRing::linear(b"abc");
        assert!(ring.contains(1, 2));
        assert!(!ring.contains(2, 2));
        assert!(!ring.contains(usize::MAX, 2));
    }
}
