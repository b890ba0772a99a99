//! Maximum operand stack depth of a method
//!
//! The depth before every instruction is found by flowing depths forward from the entry point
//! and every exception handler. Where paths meet with different depths the larger one wins. That
//! is more lenient than the verifier (which wants them equal) but never underestimates.

use super::StackEffect;
use crate::jvm::Error;
use crate::util::Offset;

/// Where control can go after an instruction
///
/// Targets are indices of other instructions. An index one past the last instruction denotes the
/// end of the code and is ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the next instruction
    Next,

    /// Jump, possibly also continuing with the next instruction
    Jump { target: usize, falls_through: bool },

    /// `jsr`: the subroutine starts with the return address pushed, and execution resumes after
    /// the `jsr` once the subroutine returns
    Subroutine { target: usize },

    /// Multi-way jump
    Switch { targets: Vec<usize> },

    /// `return`, `athrow`, or `ret`
    Stop,
}

/// Stack-relevant summary of one instruction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackItem {
    pub effect: StackEffect,
    pub flow: Flow,
}

const MAX_STACK: usize = u16::MAX as usize;

/// Compute the maximum stack depth reached, given which instructions start exception handlers
pub fn compute_max_stack(
    items: &[StackItem],
    handlers: &[usize],
    method: &str,
) -> Result<u16, Error> {
    let mut depths: Vec<Option<usize>> = vec![None; items.len()];
    let mut worklist: Vec<usize> = vec![];
    let mut max_stack = 0;

    let overflow = |depth: usize| Error::MethodCodeMaxStackOverflow {
        method: method.to_owned(),
        max_stack: Offset(depth),
    };

    /// Record a depth for an instruction, queueing it if the depth grew
    fn enter(idx: usize, depth: usize, depths: &mut [Option<usize>], worklist: &mut Vec<usize>) {
        if let Some(current) = depths.get_mut(idx) {
            if current.map_or(true, |current| current < depth) {
                *current = Some(depth);
                worklist.push(idx);
            }
        }
    }

    enter(0, 0, &mut depths, &mut worklist);
    for handler in handlers {
        max_stack = max_stack.max(1);
        enter(*handler, 1, &mut depths, &mut worklist);
    }

    while let Some(idx) = worklist.pop() {
        let before = depths[idx].unwrap_or(0);
        let StackItem { effect, flow } = &items[idx];
        let after = before.saturating_sub(effect.pops) + effect.pushes;
        let peak = before.max(after);
        if peak > MAX_STACK {
            return Err(overflow(peak));
        }
        max_stack = max_stack.max(peak);

        match flow {
            Flow::Next => enter(idx + 1, after, &mut depths, &mut worklist),
            Flow::Jump {
                target,
                falls_through,
            } => {
                enter(*target, after, &mut depths, &mut worklist);
                if *falls_through {
                    enter(idx + 1, after, &mut depths, &mut worklist);
                }
            }
            Flow::Subroutine { target } => {
                if after + 1 > MAX_STACK {
                    return Err(overflow(after + 1));
                }
                max_stack = max_stack.max(after + 1);
                enter(*target, after + 1, &mut depths, &mut worklist);
                enter(idx + 1, after, &mut depths, &mut worklist);
            }
            Flow::Switch { targets } => {
                for target in targets {
                    enter(*target, after, &mut depths, &mut worklist);
                }
            }
            Flow::Stop => (),
        }
    }

    Ok(max_stack as u16)
}
