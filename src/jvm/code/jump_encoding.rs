//! Lay out a method's code, widening jumps that don't fit in 16 bits
//!
//! Most jump instructions take a signed 16-bit relative offset. Since the distance of a jump
//! depends on the widths of everything between the jump and its target, and widths depend on
//! which jumps got widened (and on switch padding), the layout is computed as a fixed point:
//!
//!   1. compute every item's offset with the current choice of jump widths
//!   2. widen every short jump whose distance is outside the 16-bit range
//!   3. repeat until nothing new gets widened
//!
//! ### Termination
//!
//! A jump never goes back to being short once it is widened, so each iteration other than the
//! last widens at least one of the finitely many short jumps. Switch padding is recomputed from
//! scratch in every iteration (it may shrink as well as grow) but that cannot undo a widening.
//!
//! ### Rewriting
//!
//! `goto` and `jsr` have wide variants. Conditional jumps don't, so they get rewritten into the
//! inverted condition jumping over a `goto_w`:
//!
//! ```text,ignore,no_run
//!                           ifne L1         (offset +8)
//!     ifeq L2               goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```

use super::JumpKind;
use log::trace;
use std::ops::{RangeBounds, RangeInclusive};

/// Range of relative jump offsets supported by `goto`, `jsr`, and `if*` branch instructions
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<isize> =
    RangeInclusive::new(i16::MIN as isize, i16::MAX as isize);

/// Width of a short jump instruction
pub const SHORT_JUMP_WIDTH: usize = 3;

/// Width of `goto_w` and `jsr_w`
pub const WIDE_JUMP_WIDTH: usize = 5;

/// Width of a widened conditional (inverted short conditional followed by `goto_w`)
pub const WIDENED_CONDITIONAL_WIDTH: usize = SHORT_JUMP_WIDTH + WIDE_JUMP_WIDTH;

/// What the layout needs to know about each item of code
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LayoutItem {
    /// Item whose width never changes
    Fixed(usize),

    /// Jump to the item at index `target` (which may be one past the last item)
    Jump { kind: JumpKind, target: usize },

    /// `tableswitch` or `lookupswitch`, with the width of the tables following the padding
    Switch { table_width: usize },
}

/// Final positions of every item
#[derive(Clone, Debug)]
pub struct JumpLayout {
    /// Offset of every item, followed by the total length
    offsets: Vec<usize>,

    /// Which items are jumps that were widened
    widened: Vec<bool>,

    /// Number of layout passes needed to reach the fixed point
    pub iterations: usize,
}

impl JumpLayout {
    /// Byte offset of an item (the item count gives the code length)
    pub fn offset(&self, item: usize) -> usize {
        self.offsets[item]
    }

    pub fn code_length(&self) -> usize {
        self.offsets[self.offsets.len() - 1]
    }

    pub fn is_widened(&self, item: usize) -> bool {
        self.widened[item]
    }

    /// Padding after the opcode of the switch at this item
    pub fn padding(&self, item: usize) -> usize {
        switch_padding(self.offsets[item])
    }

    /// Signed distance from the start of one item to the start of another
    pub fn distance(&self, from_item: usize, to_item: usize) -> isize {
        self.offsets[to_item] as isize - self.offsets[from_item] as isize
    }
}

/// Bytes of padding needed after a switch opcode at this offset so that the tables are aligned
/// to a multiple of four bytes from the start of the code
pub fn switch_padding(opcode_offset: usize) -> usize {
    3 - opcode_offset % 4
}

fn item_width(item: &LayoutItem, widened: bool, offset: usize) -> usize {
    match item {
        LayoutItem::Fixed(width) => *width,
        LayoutItem::Jump {
            kind: JumpKind::Wide,
            ..
        } => WIDE_JUMP_WIDTH,
        LayoutItem::Jump { .. } if !widened => SHORT_JUMP_WIDTH,
        LayoutItem::Jump {
            kind: JumpKind::Conditional,
            ..
        } => WIDENED_CONDITIONAL_WIDTH,
        LayoutItem::Jump { .. } => WIDE_JUMP_WIDTH,
        LayoutItem::Switch { table_width } => 1 + switch_padding(offset) + table_width,
    }
}

fn compute_offsets(items: &[LayoutItem], widened: &[bool]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(items.len() + 1);
    let mut current_offset = 0;
    for (item, is_widened) in items.iter().zip(widened) {
        offsets.push(current_offset);
        current_offset += item_width(item, *is_widened, current_offset);
    }
    offsets.push(current_offset);
    offsets
}

/// Lay out the items, widening every jump whose distance falls outside `small_jump_range`
///
/// The `small_jump_range` parameter should always be [`SIGNED_16BIT_JUMP_RANGE`] outside of
/// unit tests.
pub fn encode_jumps(items: &[LayoutItem], small_jump_range: &impl RangeBounds<isize>) -> JumpLayout {
    let mut widened = vec![false; items.len()];
    let mut iterations = 0;
    loop {
        iterations += 1;
        let offsets = compute_offsets(items, &widened);

        let mut newly_widened = 0;
        for (idx, item) in items.iter().enumerate() {
            if let LayoutItem::Jump { kind, target } = item {
                if *kind == JumpKind::Wide || widened[idx] {
                    continue;
                }
                let distance = offsets[*target] as isize - offsets[idx] as isize;
                if !small_jump_range.contains(&distance) {
                    widened[idx] = true;
                    newly_widened += 1;
                }
            }
        }

        trace!(
            "jump layout pass {}: {} bytes, {} jumps widened",
            iterations,
            offsets[items.len()],
            newly_widened
        );

        if newly_widened == 0 {
            return JumpLayout {
                offsets,
                widened,
                iterations,
            };
        }
    }
}
