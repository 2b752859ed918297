use std::fmt::{self, Debug, Formatter};
use std::iter::{Enumerate, FromIterator};
use std::slice::Iter;
use std::vec::IntoIter as VecIntoIter;

/// Number of slots a value takes up (two for `long` and `double`, one otherwise)
pub trait Width {
    fn width(&self) -> usize;
}

/// Values addressed by slot rather than by position
///
/// The slot of an entry is the initial offset plus the widths of everything before it. The
/// constant pool numbers its entries this way (from 1), and so does the operand stack in a
/// `StackMapTable` frame.
#[derive(Clone)]
pub struct OffsetVec<T> {
    entries: Vec<(Offset, T)>,
    next: Offset,
    start: Offset,
}

/// Slot in an `OffsetVec`
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct Offset(pub usize);

impl<T: Width> OffsetVec<T> {
    pub fn new() -> OffsetVec<T> {
        OffsetVec::new_starting_at(Offset(0))
    }

    pub fn new_starting_at(start: Offset) -> OffsetVec<T> {
        OffsetVec {
            entries: vec![],
            next: start,
            start,
        }
    }

    /// Count of values, ignoring their widths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot the next pushed value will get
    pub fn offset_len(&self) -> Offset {
        self.next
    }

    pub fn push(&mut self, value: T) -> Offset {
        let slot = self.next;
        self.next.0 += value.width();
        self.entries.push((slot, value));
        slot
    }

    pub fn pop(&mut self) -> Option<(Offset, T)> {
        let (slot, value) = self.entries.pop()?;
        self.next = slot;
        Some((slot, value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.next = self.start;
    }

    pub fn get_offset(&self, slot: Offset) -> OffsetResult<T> {
        match self.entries.binary_search_by_key(&slot, |(at, _)| *at) {
            Ok(position) => OffsetResult::Ok(position, &self.entries[position].1),
            Err(position) if position == self.entries.len() => OffsetResult::TooLarge,
            Err(position) => OffsetResult::InvalidOffset(position),
        }
    }

    pub fn iter(&self) -> OffsetVecIter<'_, T> {
        self.into_iter()
    }
}

impl<T: PartialEq> PartialEq for OffsetVec<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for OffsetVec<T> {}

impl<T: Width> Default for OffsetVec<T> {
    fn default() -> Self {
        OffsetVec::new()
    }
}

/// Result of `OffsetVec::get_offset`
#[derive(Debug)]
pub enum OffsetResult<'a, T> {
    Ok(usize, &'a T),

    /// Slot is covered by the wide value at this position without being its start
    InvalidOffset(usize),

    TooLarge,
}

/// Yields `(slot, position, value)`
pub struct OffsetVecIntoIter<T>(Enumerate<VecIntoIter<(Offset, T)>>);

impl<T> Iterator for OffsetVecIntoIter<T> {
    type Item = (Offset, usize, T);

    fn next(&mut self) -> Option<Self::Item> {
        let (position, (slot, value)) = self.0.next()?;
        Some((slot, position, value))
    }
}

impl<T> IntoIterator for OffsetVec<T> {
    type Item = (Offset, usize, T);
    type IntoIter = OffsetVecIntoIter<T>;

    fn into_iter(self) -> OffsetVecIntoIter<T> {
        OffsetVecIntoIter(self.entries.into_iter().enumerate())
    }
}

/// Yields `(slot, position, &value)`
pub struct OffsetVecIter<'a, T>(Enumerate<Iter<'a, (Offset, T)>>);

impl<'a, T> Iterator for OffsetVecIter<'a, T> {
    type Item = (Offset, usize, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let (position, (slot, value)) = self.0.next()?;
        Some((*slot, position, value))
    }
}

impl<'a, T> IntoIterator for &'a OffsetVec<T> {
    type Item = (Offset, usize, &'a T);
    type IntoIter = OffsetVecIter<'a, T>;

    fn into_iter(self) -> OffsetVecIter<'a, T> {
        OffsetVecIter(self.entries.iter().enumerate())
    }
}

impl<T: Width> FromIterator<T> for OffsetVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(values: I) -> Self {
        let mut collected = OffsetVec::new();
        collected.extend(values);
        collected
    }
}

impl<T: Width> Extend<T> for OffsetVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, values: I) {
        for value in values {
            self.push(value);
        }
    }
}

impl<T: Debug> Debug for OffsetVec<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|(slot, value)| format!("#{} = {:?}", slot.0, value)),
            )
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Copy, Clone, Eq, PartialEq, Debug)]
    enum PoolEntry {
        Narrow(u8),
        Wide(u8),
    }

    impl Width for PoolEntry {
        fn width(&self) -> usize {
            match self {
                PoolEntry::Narrow(_) => 1,
                PoolEntry::Wide(_) => 2,
            }
        }
    }

    #[test]
    fn offsets_skip_second_half_of_wide_entries() {
        let mut pool = OffsetVec::new_starting_at(Offset(1));
        assert_eq!(pool.push(PoolEntry::Narrow(1)), Offset(1));
        assert_eq!(pool.push(PoolEntry::Wide(2)), Offset(2));
        assert_eq!(pool.push(PoolEntry::Narrow(3)), Offset(4));
        assert_eq!(pool.offset_len(), Offset(5));
        assert_eq!(pool.len(), 3);

        assert!(matches!(
            pool.get_offset(Offset(2)),
            OffsetResult::Ok(1, PoolEntry::Wide(2))
        ));
        assert!(matches!(
            pool.get_offset(Offset(3)),
            OffsetResult::InvalidOffset(2)
        ));
        assert!(matches!(pool.get_offset(Offset(5)), OffsetResult::TooLarge));
        assert_eq!(
            format!("{:?}", pool),
            "[\"#1 = Narrow(1)\", \"#2 = Wide(2)\", \"#4 = Narrow(3)\"]"
        );
    }

    #[test]
    fn pop_rewinds_offset() {
        let mut stack: OffsetVec<PoolEntry> = vec![PoolEntry::Wide(1), PoolEntry::Narrow(2)]
            .into_iter()
            .collect();
        assert_eq!(stack.offset_len(), Offset(3));
        assert_eq!(stack.pop(), Some((Offset(2), PoolEntry::Narrow(2))));
        assert_eq!(stack.offset_len(), Offset(2));
        assert_eq!(
            stack.iter().collect::<Vec<_>>(),
            vec![(Offset(0), 0, &PoolEntry::Wide(1))]
        );
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.offset_len(), Offset(0));
    }
}
