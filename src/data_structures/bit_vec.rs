//! A minimalistic dynamically sized compact bit vector with a fixed block size of 64 bits.
//!
//! Used for the live-island bitmap and the per-update "broken" and "affected" island bitmaps.

use core::ops::BitOrAssign;
use core::slice;

/// A dynamically sized compact bit vector with a fixed block size of 64 bits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct BitVec {
    blocks: Vec<u64>,
    block_count: usize,
}

#[inline]
fn bits_to_blocks(bits: usize) -> usize {
    bits.div_ceil(u64::BITS as usize)
}

impl BitVec {
    /// Creates a new [`BitVec`] with room for at least `bit_capacity` bits.
    #[inline]
    pub fn new(bit_capacity: usize) -> Self {
        Self {
            blocks: vec![0; bits_to_blocks(bit_capacity)],
            block_count: 0,
        }
    }

    /// Sets the bit count of the [`BitVec`] and clears all bits.
    ///
    /// If the new bit count exceeds the current block capacity, the block capacity is increased.
    #[inline]
    pub fn set_bit_count_and_clear(&mut self, bit_count: usize) {
        let block_count = bits_to_blocks(bit_count);

        if self.blocks.len() < block_count {
            self.blocks.resize(block_count, 0);
        }

        self.block_count = block_count;
        self.blocks.iter_mut().for_each(|b| *b = 0);
    }

    /// Sets the bit at the specified index.
    ///
    /// # Panics
    ///
    /// Panics if the index exceeds the current bit count with `debug_assertions` enabled.
    #[inline]
    pub fn set(&mut self, index: usize) {
        let block_index = index / 64;
        debug_assert!(block_index < self.block_count);
        let bit_index = index % 64;
        let mask = 1 << bit_index;
        self.blocks[block_index] |= mask;
    }

    /// Sets the bit at the specified index, growing the bit count if needed.
    #[inline]
    pub fn set_and_grow(&mut self, index: usize) {
        let block_index = index / 64;

        if block_index >= self.block_count {
            if block_index >= self.blocks.len() {
                self.blocks.resize(block_index + 1, 0);
            }
            self.block_count = block_index + 1;
        }

        self.blocks[block_index] |= 1 << (index % 64);
    }

    /// Unsets the bit at the specified index.
    #[inline]
    pub fn unset(&mut self, index: usize) {
        let block_index = index / 64;
        if block_index >= self.block_count {
            return;
        }
        let bit_index = index % 64;
        let mask = 1 << bit_index;
        self.blocks[block_index] &= !mask;
    }

    /// Gets the bit at the specified index.
    ///
    /// Returns `false` if the index is out of bounds or the bit is unset.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        let block_index = index / 64;
        if block_index >= self.block_count {
            return false;
        }
        let bit_index = index % 64;
        let mask = 1 << bit_index;
        (self.blocks[block_index] & mask) != 0
    }

    /// Returns the number of bits that can be addressed without growing.
    #[inline]
    pub fn bit_count(&self) -> usize {
        self.block_count * 64
    }

    /// Returns the block count of the [`BitVec`].
    #[inline]
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the number of set bits.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.blocks().map(|b| b.count_ones() as usize).sum()
    }

    /// Returns `true` if no bits are set.
    #[inline]
    pub fn is_clear(&self) -> bool {
        self.blocks().all(|b| b == 0)
    }

    /// Clears all bits in the [`BitVec`].
    #[inline]
    pub fn clear(&mut self) {
        self.blocks.iter_mut().for_each(|b| *b = 0);
    }

    /// Returns an iterator over the blocks of the [`BitVec`].
    #[inline]
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            iter: self.blocks[..self.block_count].iter(),
        }
    }

    /// Returns an iterator over the indices of the set bits, in ascending order.
    #[inline]
    pub fn iter_ones(&self) -> Ones<'_> {
        Ones {
            blocks: self.blocks(),
            block_index: 0,
            current: None,
        }
    }

    /// Performs an in-place bitwise OR operation with another [`BitVec`].
    #[inline]
    pub fn or(&mut self, other: &Self) {
        debug_assert!(
            self.block_count == other.block_count,
            "block counts do not match for `BitVec::or` ({} != {})",
            self.block_count,
            other.block_count
        );

        for i in 0..self.block_count {
            self.blocks[i] |= other.blocks[i];
        }
    }
}

impl BitOrAssign<&BitVec> for BitVec {
    #[inline]
    fn bitor_assign(&mut self, rhs: &BitVec) {
        self.or(rhs);
    }
}

/// An iterator over the blocks of a [`BitVec`].
#[derive(Clone)]
pub struct Blocks<'a> {
    iter: slice::Iter<'a, u64>,
}

impl Iterator for Blocks<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<u64> {
        self.iter.next().cloned()
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.iter.size_hint()
    }
}

impl DoubleEndedIterator for Blocks<'_> {
    #[inline]
    fn next_back(&mut self) -> Option<u64> {
        self.iter.next_back().cloned()
    }
}

impl ExactSizeIterator for Blocks<'_> {}

/// An iterator over the indices of the set bits of a [`BitVec`].
#[derive(Clone)]
pub struct Ones<'a> {
    blocks: Blocks<'a>,
    block_index: usize,
    current: Option<u64>,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        loop {
            let block = match self.current {
                Some(block) if block != 0 => block,
                Some(_) => {
                    self.block_index += 1;
                    self.current = Some(self.blocks.next()?);
                    continue;
                }
                None => {
                    self.current = Some(self.blocks.next()?);
                    continue;
                }
            };

            let bit = block.trailing_zeros() as usize;
            // Clear the lowest set bit.
            self.current = Some(block & (block - 1));
            return Some(self.block_index * 64 + bit);
        }
    }
}
