//! Pick a width for every jump
//!
//! Most jump instructions only have a signed 16-bit relative offset. When a jump needs to go
//! further than that, it gets widened:
//!
//! ```text,ignore,no_run
//!     goto L2           =>      goto_w L2
//!
//!     if* L2            =>      ifnot* L1
//!                               goto_w L2
//! L1: ...                   L1: ...
//! ```
//!
//! ### Termination
//!
//! Widening a jump makes the code after it longer, which can push other jumps out of range. The
//! layout is therefore recomputed until no new jump needs widening. This always finishes: a jump
//! is never narrowed again once it has been widened, and every round of layout either widens at
//! least one more jump or stops. Switch instructions always have 32-bit offsets, but their padding
//! depends on where they land, which is why their width is recomputed from the current offset on
//! every round.

use super::BranchInstruction;
use crate::jvm::Error;
use std::collections::HashMap;
use std::hash::Hash;
use std::ops::RangeInclusive;

/// Range of relative jump offsets supported by `goto` and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<i64> =
    RangeInclusive::new(i16::MIN as i64, i16::MAX as i64);

/// Element of the code being laid out
pub enum LayoutElement<'a, Lbl> {
    Label(Lbl),

    /// Instruction whose width does not depend on where it is placed
    Fixed(usize),

    Branch(&'a BranchInstruction<Lbl>),
}

/// Offsets of every element and which branches must be written in their wide form
#[derive(Debug)]
pub struct Layout<Lbl> {
    /// Starting offset of every element
    pub offsets: Vec<usize>,

    /// Whether the element (which must be a branch) needs its wide encoding
    pub widened: Vec<bool>,

    pub label_offsets: HashMap<Lbl, usize>,

    /// Total length of the code
    pub code_length: usize,
}

/// Lay out the elements, widening jumps until every jump fits
///
/// Branches for which `is_live` returns `false` are never widened (they won't be written out).
/// The `small_jump_range` parameter should always be `SIGNED_16BIT_JUMP_RANGE` - it is a
/// parameter only for unit testing purposes.
pub fn layout<Lbl: Copy + Eq + Hash + std::fmt::Debug>(
    elements: &[LayoutElement<'_, Lbl>],
    is_live: impl Fn(usize) -> bool,
    small_jump_range: &RangeInclusive<i64>,
) -> Result<Layout<Lbl>, Error> {
    let mut widened = vec![false; elements.len()];
    loop {
        let mut offsets = Vec::with_capacity(elements.len());
        let mut label_offsets = HashMap::new();
        let mut offset = 0;
        for (element, is_wide) in elements.iter().zip(&widened) {
            offsets.push(offset);
            match element {
                LayoutElement::Label(label) => {
                    label_offsets.insert(*label, offset);
                }
                LayoutElement::Fixed(width) => offset += width,
                LayoutElement::Branch(branch) => offset += branch.width_at(offset, *is_wide),
            }
        }

        let mut changed = false;
        for (idx, element) in elements.iter().enumerate() {
            let branch = match element {
                LayoutElement::Branch(branch) => branch,
                _ => continue,
            };
            if widened[idx] || !is_live(idx) {
                continue;
            }
            if !matches!(branch, BranchInstruction::Goto(_)) && !branch.is_conditional() {
                continue;
            }
            for target in branch.jump_targets() {
                let target_offset = label_offsets.get(target).ok_or_else(|| {
                    Error::Malformed(format!("jump to undefined label {:?}", target))
                })?;
                let relative = *target_offset as i64 - offsets[idx] as i64;
                if !small_jump_range.contains(&relative) {
                    log::debug!("Widening jump at {} to {:?}", offsets[idx], target);
                    widened[idx] = true;
                    changed = true;
                }
            }
        }

        if !changed {
            return Ok(Layout {
                offsets,
                widened,
                label_offsets,
                code_length: offset,
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::OrdComparison;

    #[test]
    fn nothing_to_widen() {
        let goto = BranchInstruction::Goto(1);
        let elements = vec![
            LayoutElement::Branch(&goto),
            LayoutElement::Fixed(10),
            LayoutElement::Label(1),
            LayoutElement::Fixed(1),
        ];
        let layout = layout(&elements, |_| true, &SIGNED_16BIT_JUMP_RANGE).unwrap();
        assert_eq!(layout.offsets, vec![0, 3, 13, 13]);
        assert_eq!(layout.widened, vec![false; 4]);
        assert_eq!(layout.code_length, 14);
    }

    #[test]
    fn widening_cascades() {
        // The first jump only goes out of range once the second jump has been widened
        let far = BranchInstruction::If(OrdComparison::LT, 1);
        let near = BranchInstruction::Goto(2);
        let elements = vec![
            LayoutElement::Branch(&far),
            LayoutElement::Branch(&near),
            LayoutElement::Fixed(94),
            LayoutElement::Label(1),
            LayoutElement::Fixed(200),
            LayoutElement::Label(2),
        ];
        let range = RangeInclusive::new(-100, 100);
        let layout = layout(&elements, |_| true, &range).unwrap();
        assert!(layout.widened[1]);
        assert!(layout.widened[0]);
        assert_eq!(layout.label_offsets[&1], 8 + 5 + 94);
    }

    #[test]
    fn dead_branches_stay_narrow() {
        let goto = BranchInstruction::Goto(1);
        let elements = vec![
            LayoutElement::Branch(&goto),
            LayoutElement::Fixed(50),
            LayoutElement::Label(1),
        ];
        let range = RangeInclusive::new(-10, 10);
        let layout = layout(&elements, |_| false, &range).unwrap();
        assert_eq!(layout.widened, vec![false; 3]);
    }

    #[test]
    fn switch_padding_moves_with_layout() {
        let goto = BranchInstruction::Goto(1);
        let switch = BranchInstruction::LookupSwitch {
            default: 1,
            targets: vec![],
        };
        let elements = vec![
            LayoutElement::Branch(&goto),
            LayoutElement::Branch(&switch),
            LayoutElement::Fixed(30),
            LayoutElement::Label(1),
        ];
        let range = RangeInclusive::new(-20, 20);
        let layout = layout(&elements, |_| true, &range).unwrap();
        assert!(layout.widened[0]);

        // `goto_w` is 5 bytes, so the switch at offset 5 needs 2 bytes of padding
        assert_eq!(layout.offsets[1], 5);
        assert_eq!(layout.offsets[2], 5 + 1 + 2 + 8);
    }

    #[test]
    fn undefined_label() {
        let goto = BranchInstruction::Goto(7);
        let elements = vec![LayoutElement::Branch(&goto)];
        assert!(layout(&elements, |_| true, &SIGNED_16BIT_JUMP_RANGE).is_err());
    }
}
