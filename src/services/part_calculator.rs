//! Splits a byte span into the parts of a download specification.

use crate::models::specification::Part;
use thiserror::Error;

/// 20 MiB.
pub const DEFAULT_PART_SIZE: u64 = 20 * 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartError {
    #[error("length {0} is unresolved; resolve it against the object size before dividing")]
    UnresolvedLength(i64),
    #[error("part size must be greater than zero")]
    ZeroPartSize,
}

#[derive(Clone, Copy, Debug)]
pub struct PartCalculator {
    part_size: u64,
}

impl PartCalculator {
    pub fn new(part_size: u64) -> Result<Self, PartError> {
        if part_size == 0 {
            return Err(PartError::ZeroPartSize);
        }
        Ok(Self { part_size })
    }

    /// One opaque part covering `[offset, offset + length)`; a negative
    /// `length` leaves the part open-ended.
    pub fn specify(&self, offset: u64, length: i64) -> Part {
        Part::new(1, offset, u64::try_from(length).ok())
    }

    /// Contiguous parts of at most `part_size` bytes whose union is exactly
    /// `[offset, offset + length)`. Only the last part may be shorter.
    pub fn divide(&self, offset: u64, length: i64) -> Result<Vec<Part>, PartError> {
        let length = u64::try_from(length).map_err(|_| PartError::UnresolvedLength(length))?;
        let end = offset + length;

        let mut parts = Vec::with_capacity(length.div_ceil(self.part_size) as usize);
        let mut start = offset;
        while start < end {
            let size = self.part_size.min(end - start);
            parts.push(Part::new(parts.len() as u32 + 1, start, Some(size)));
            start += size;
        }
        Ok(parts)
    }
}

impl Default for PartCalculator {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(parts: &[Part], offset: u64, length: u64) {
        let mut cursor = offset;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.part_number as usize, i + 1);
            assert_eq!(part.offset, cursor, "gap or overlap before part {}", i + 1);
            cursor += part.part_size.unwrap();
        }
        assert_eq!(cursor, offset + length);
    }

    #[test]
    fn divide_covers_span_exactly() {
        let calculator = PartCalculator::new(100).unwrap();
        for (offset, length) in [(0, 1000), (500, 300), (7, 1), (3, 250), (0, 99), (42, 100)] {
            let parts = calculator.divide(offset, length as i64).unwrap();
            assert_covers(&parts, offset, length);
            assert!(parts.iter().all(|p| p.part_size.unwrap() <= 100));
        }
    }

    #[test]
    fn only_last_part_is_short() {
        let calculator = PartCalculator::new(100).unwrap();
        let parts = calculator.divide(10, 250).unwrap();
        let sizes: Vec<_> = parts.iter().map(|p| p.part_size.unwrap()).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn empty_span_has_no_parts() {
        let calculator = PartCalculator::new(100).unwrap();
        assert!(calculator.divide(500, 0).unwrap().is_empty());
    }

    #[test]
    fn divide_rejects_unresolved_length() {
        let calculator = PartCalculator::default();
        assert_eq!(calculator.divide(0, -1), Err(PartError::UnresolvedLength(-1)));
    }

    #[test]
    fn specify_is_a_single_part() {
        let calculator = PartCalculator::new(100).unwrap();
        let part = calculator.specify(500, 300);
        assert_eq!(part.byte_range(), Some(500..800));

        let whole = calculator.specify(0, -1);
        assert_eq!(whole.part_number, 1);
        assert_eq!(whole.part_size, None);
    }

    #[test]
    fn zero_part_size_is_rejected() {
        assert_eq!(PartCalculator::new(0).unwrap_err(), PartError::ZeroPartSize);
    }
}
