use super::exceptions::{ExceptionTableBuilder, PendingHandler};
use super::instructions::serialize_local;
use super::jump_encoding::{
    encode_jumps, switch_padding, JumpLayout, LayoutItem, SHORT_JUMP_WIDTH,
    SIGNED_16BIT_JUMP_RANGE, WIDENED_CONDITIONAL_WIDTH, WIDE_JUMP_WIDTH,
};
use super::max_stack::{compute_max_stack, Flow, StackItem};
use super::switch::{ResolvedSwitch, SwitchBuilder, SwitchHandle};
use super::{
    BranchInstruction, Instruction, JumpKind, Label, LabelPosition, LabelTable, LocalAccess,
    StackEffect,
};
use crate::jvm::class_file::{
    BytecodeArray, BytecodeIndex, Code, ConstantsPool, ConstantsWriter, LineNumber,
    LineNumberTable, Serialize,
};
use crate::jvm::{BinaryName, Error, MethodDescriptor};
use crate::util::{Offset, Width};
use byteorder::WriteBytesExt;
use log::debug;
use std::convert::TryFrom;
use std::ops::Range;

/// Largest code array a method can have
pub const MAX_CODE_LENGTH: usize = u16::MAX as usize;

/// Instruction stream of one method body
///
/// Straight-line instructions get encoded as soon as they are pushed (their encoding never
/// changes). Jumps and switches stay symbolic until [`CodeBuffer::finish`], since their widths
/// depend on where their targets end up. Until then, offsets reported in errors are provisional:
/// they assume that no jump needs widening.
///
/// The buffer also does the bookkeeping needed to size the method's frame: local variable widths
/// are checked as loads and stores go by, and the maximum stack depth is computed when the method
/// gets finished.
#[derive(Debug)]
pub struct CodeBuffer {
    /// Name of the method (for error messages)
    method: String,

    /// Encoded straight-line instructions
    bytes: Vec<u8>,

    /// Everything pushed so far, in order
    items: Vec<CodeItem>,

    labels: LabelTable,
    switches: SwitchBuilder,
    exceptions: ExceptionTableBuilder,
    locals: LocalSlots,

    /// Line numbers, keyed by the index of the item they start at
    line_numbers: Vec<(usize, u16)>,

    /// Offset of the end of the code, assuming every jump stays short
    provisional_offset: usize,
}

#[derive(Debug)]
enum CodeItem {
    /// Non-branching instruction, encoded into `bytes`
    Plain {
        bytes: Range<usize>,
        effect: StackEffect,
    },
    Branch(BranchInstruction<Label>),
    Switch(SwitchHandle),
}

/// Code item with every label replaced by the index of the item it points at
enum ResolvedItem {
    Plain {
        bytes: Range<usize>,
        effect: StackEffect,
    },
    Branch(BranchInstruction<usize>),
    Switch(ResolvedSwitch<usize>),
}

impl CodeBuffer {
    /// Empty method body, with locals for the parameters (and `this` unless the method is static)
    ///
    /// `serial` tells the methods of one class apart: labels and switches created for one method
    /// are rejected by the buffers of the others.
    pub fn new(
        method: String,
        serial: u32,
        descriptor: &MethodDescriptor,
        is_static: bool,
    ) -> CodeBuffer {
        let mut locals = LocalSlots::default();
        let mut slot = 0;
        if !is_static {
            locals.store(slot, 1);
            slot += 1;
        }
        for parameter in &descriptor.parameters {
            let width = parameter.width();
            locals.store(slot, width);
            slot += width;
        }
        CodeBuffer {
            method,
            bytes: vec![],
            items: vec![],
            labels: LabelTable::new(serial),
            switches: SwitchBuilder::new(serial),
            exceptions: ExceptionTableBuilder::new(),
            locals,
            line_numbers: vec![],
            provisional_offset: 0,
        }
    }

    pub fn method_name(&self) -> &str {
        &self.method
    }

    /// Offset of the next instruction, assuming no jump needs widening
    pub fn current_offset(&self) -> Offset {
        Offset(self.provisional_offset)
    }

    /// Append a non-branching instruction
    pub fn push_instruction(
        &mut self,
        insn: &Instruction,
        constants: &mut ConstantsPool,
    ) -> Result<(), Error> {
        if let Some(access) = insn.local_access() {
            self.access_local(access)?;
        }
        let resolved = insn.resolve(constants)?;

        let start = self.bytes.len();
        resolved.serialize(&mut self.bytes)?;
        let end = self.bytes.len();

        self.provisional_offset += end - start;
        self.items.push(CodeItem::Plain {
            bytes: start..end,
            effect: insn.stack_effect(),
        });
        Ok(())
    }

    /// Append a branch instruction
    pub fn push_branch(&mut self, insn: BranchInstruction<Label>) -> Result<(), Error> {
        if let Some(target) = insn.jump_target() {
            self.labels.check_known(target, &self.method)?;
        }
        if let BranchInstruction::Ret(slot) = insn {
            self.access_local(LocalAccess::Load { slot, width: 1 })?;
        }
        self.provisional_offset += match insn.jump_kind() {
            Some(JumpKind::Wide) => WIDE_JUMP_WIDTH,
            Some(_) => SHORT_JUMP_WIDTH,
            None => non_jump_width(&insn),
        };
        self.items.push(CodeItem::Branch(insn));
        Ok(())
    }

    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Bind a label to the current position
    pub fn mark_label(&mut self, label: Label) -> Result<(), Error> {
        let position = LabelPosition {
            item: self.items.len(),
            offset: Offset(self.provisional_offset),
        };
        self.labels.mark(label, position, &self.method)
    }

    /// Append a `tableswitch` over `low..=high`
    pub fn table_switch(&mut self, low: i32, high: i32) -> Result<SwitchHandle, Error> {
        let offset = Offset(self.provisional_offset);
        let handle = self.switches.table_switch(low, high, offset, &self.method)?;
        self.push_switch(handle);
        Ok(handle)
    }

    /// Append a `lookupswitch` with up to `case_count` cases
    pub fn lookup_switch(&mut self, case_count: usize) -> Result<SwitchHandle, Error> {
        let offset = Offset(self.provisional_offset);
        let handle = self.switches.lookup_switch(case_count, offset)?;
        self.push_switch(handle);
        Ok(handle)
    }

    fn push_switch(&mut self, handle: SwitchHandle) {
        self.provisional_offset += 1
            + switch_padding(self.provisional_offset)
            + self.switches.provisional_table_width(handle);
        self.items.push(CodeItem::Switch(handle));
    }

    /// Route a switch key to a label
    pub fn switch_case(
        &mut self,
        switch: SwitchHandle,
        value: i32,
        target: Label,
    ) -> Result<(), Error> {
        self.labels.check_known(target, &self.method)?;
        self.switches.add_case(switch, value, target, &self.method)
    }

    /// Route a switch key to the current position
    pub fn mark_switch_case(&mut self, switch: SwitchHandle, value: i32) -> Result<Label, Error> {
        let label = self.fresh_label();
        self.mark_label(label)?;
        self.switch_case(switch, value, label)?;
        Ok(label)
    }

    /// Route unmatched switch keys to a label
    pub fn switch_default(&mut self, switch: SwitchHandle, target: Label) -> Result<(), Error> {
        self.labels.check_known(target, &self.method)?;
        self.switches.set_default(switch, target, &self.method)
    }

    /// Route unmatched switch keys to the current position
    pub fn mark_switch_default(&mut self, switch: SwitchHandle) -> Result<Label, Error> {
        let label = self.fresh_label();
        self.mark_label(label)?;
        self.switch_default(switch, label)?;
        Ok(label)
    }

    /// Register an exception handler for `start..end`
    ///
    /// Handlers are matched in the order they are added. `None` catches everything.
    pub fn add_exception_handler(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        catch_type: Option<&BinaryName>,
        constants: &mut ConstantsPool,
    ) -> Result<(), Error> {
        for label in [start, end, handler] {
            self.labels.check_known(label, &self.method)?;
        }
        let catch_type = catch_type
            .map(|class| class.constant_index(constants))
            .transpose()?;
        self.exceptions.push(PendingHandler {
            start,
            end,
            handler,
            catch_type,
        });
        Ok(())
    }

    /// Attribute the code from here on to a source line
    pub fn line_number(&mut self, line: u16) {
        let item = self.items.len();
        match self.line_numbers.last_mut() {
            Some((last_item, last_line)) if *last_item == item => *last_line = line,
            _ => self.line_numbers.push((item, line)),
        }
    }

    fn access_local(&mut self, access: LocalAccess) -> Result<(), Error> {
        let (slot, width, is_load) = match access {
            LocalAccess::Load { slot, width } => (slot, width, true),
            LocalAccess::Store { slot, width } => (slot, width, false),
            LocalAccess::Increment { slot } => (slot, 1, true),
        };
        if is_load {
            if let Err(expected) = self.locals.check_load(slot as usize, width) {
                return Err(Error::LocalWidthMismatch {
                    method: self.method.clone(),
                    offset: Offset(self.provisional_offset),
                    slot,
                    expected,
                    found: width,
                });
            }
            self.locals.touch(slot as usize, width);
        } else {
            self.locals.store(slot as usize, width);
        }
        Ok(())
    }

    /// Lay out the code, resolve every label, and produce the `Code` attribute
    ///
    /// `max_locals_hint` is a lower bound for `max_locals` (the computed value is used if it is
    /// larger).
    pub fn finish(
        self,
        max_locals_hint: u16,
        constants: &mut ConstantsPool,
        emit_line_numbers: bool,
    ) -> Result<Code, Error> {
        self.labels.check_all_marked(&self.method)?;

        let items = self.resolve_items()?;
        let layout_items: Vec<LayoutItem> = items.iter().map(layout_item).collect();
        let layout = encode_jumps(&layout_items, &SIGNED_16BIT_JUMP_RANGE);

        let code_length = layout.code_length();
        if code_length > MAX_CODE_LENGTH {
            return Err(Error::MethodCodeOverflow {
                method: self.method,
                length: code_length,
            });
        }

        let mut code = Vec::with_capacity(code_length);
        for (idx, item) in items.iter().enumerate() {
            match item {
                ResolvedItem::Plain { bytes, .. } => {
                    code.extend_from_slice(&self.bytes[bytes.clone()])
                }
                ResolvedItem::Branch(insn) => {
                    self.serialize_branch(idx, insn, &layout, &mut code)?
                }
                ResolvedItem::Switch(switch) => switch.serialize(
                    layout.padding(idx),
                    |target| layout.distance(idx, target) as i32,
                    &mut code,
                )?,
            }
        }
        debug_assert_eq!(code.len(), code_length);

        let label_offset = |label: Label| layout.offset(self.labels.item(label));
        let exception_table = self.exceptions.resolve(label_offset, &self.method)?;

        let handlers: Vec<usize> = self
            .exceptions
            .iter()
            .map(|handler| self.labels.item(handler.handler))
            .collect();
        let stack_items: Vec<StackItem> = items.iter().map(stack_item).collect();
        let max_stack = compute_max_stack(&stack_items, &handlers, &self.method)?;

        let max_locals = self.locals.max_locals.max(max_locals_hint as usize);
        let max_locals = u16::try_from(max_locals).map_err(|_| Error::MethodCodeMaxLocalsOverflow {
            method: self.method.clone(),
            max_locals: Offset(max_locals),
        })?;

        let mut attributes = vec![];
        if emit_line_numbers && !self.line_numbers.is_empty() {
            let line_numbers: Vec<LineNumber> = self
                .line_numbers
                .iter()
                .filter(|(item, _)| *item < items.len())
                .map(|(item, line)| LineNumber {
                    start_pc: BytecodeIndex(layout.offset(*item) as u16),
                    line_number: *line,
                })
                .collect();
            if line_numbers.len() > u16::MAX as usize {
                return Err(Error::TooManyEntries("line numbers"));
            }
            if !line_numbers.is_empty() {
                attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
            }
        }

        debug!(
            "closed method '{}': {} bytes of code, max_stack = {}, max_locals = {}, {} layout passes",
            self.method, code_length, max_stack, max_locals, layout.iterations
        );

        Ok(Code {
            max_stack,
            max_locals,
            code_array: BytecodeArray(code),
            exception_table,
            attributes,
        })
    }

    /// Finalize switches and replace labels with item indices
    fn resolve_items(&self) -> Result<Vec<ResolvedItem>, Error> {
        let item_of = |label: Label| self.labels.item(label);
        self.items
            .iter()
            .map(|item| -> Result<ResolvedItem, Error> {
                Ok(match item {
                    CodeItem::Plain { bytes, effect } => ResolvedItem::Plain {
                        bytes: bytes.clone(),
                        effect: *effect,
                    },
                    CodeItem::Branch(insn) => ResolvedItem::Branch(insn.map_label(item_of)),
                    CodeItem::Switch(handle) => ResolvedItem::Switch(
                        self.switches
                            .resolve(*handle, &self.method)?
                            .map_labels(item_of),
                    ),
                })
            })
            .collect()
    }

    fn serialize_branch<W: WriteBytesExt>(
        &self,
        idx: usize,
        insn: &BranchInstruction<usize>,
        layout: &JumpLayout,
        writer: &mut W,
    ) -> Result<(), Error> {
        let target = match (insn, insn.jump_target()) {
            (BranchInstruction::Ret(slot), _) => {
                return Ok(serialize_local(*slot, None, insn.opcode(), writer)?)
            }
            (_, None) => return Ok(insn.opcode().serialize(writer)?),
            (_, Some(target)) => target,
        };

        let distance = layout.distance(idx, target);
        let wide_distance = |distance: isize| {
            i32::try_from(distance).map_err(|_| Error::BranchOffsetOverflow {
                method: self.method.clone(),
                offset: Offset(layout.offset(idx)),
                distance,
            })
        };

        match insn.jump_kind() {
            Some(JumpKind::Wide) => {
                insn.opcode().serialize(writer)?;
                wide_distance(distance)?.serialize(writer)?;
            }
            _ if !layout.is_widened(idx) => {
                insn.opcode().serialize(writer)?;
                (distance as i16).serialize(writer)?;
            }
            Some(JumpKind::Goto) => {
                BranchInstruction::GotoW(()).opcode().serialize(writer)?;
                wide_distance(distance)?.serialize(writer)?;
            }
            Some(JumpKind::Jsr) => {
                BranchInstruction::JsrW(()).opcode().serialize(writer)?;
                wide_distance(distance)?.serialize(writer)?;
            }
            _ => {
                insn.invert_condition().opcode().serialize(writer)?;
                (WIDENED_CONDITIONAL_WIDTH as i16).serialize(writer)?;
                BranchInstruction::GotoW(()).opcode().serialize(writer)?;
                wide_distance(distance - SHORT_JUMP_WIDTH as isize)?.serialize(writer)?;
            }
        }
        Ok(())
    }
}

/// Width of a branch instruction that does not jump
fn non_jump_width<Lbl>(insn: &BranchInstruction<Lbl>) -> usize {
    match insn {
        BranchInstruction::Ret(slot) if *slot > u8::MAX as u16 => 4,
        BranchInstruction::Ret(_) => 2,
        _ => 1,
    }
}

fn layout_item(item: &ResolvedItem) -> LayoutItem {
    match item {
        ResolvedItem::Plain { bytes, .. } => LayoutItem::Fixed(bytes.len()),
        ResolvedItem::Branch(insn) => match (insn.jump_kind(), insn.jump_target()) {
            (Some(kind), Some(target)) => LayoutItem::Jump { kind, target },
            _ => LayoutItem::Fixed(non_jump_width(insn)),
        },
        ResolvedItem::Switch(switch) => LayoutItem::Switch {
            table_width: switch.table_width(),
        },
    }
}

fn stack_item(item: &ResolvedItem) -> StackItem {
    match item {
        ResolvedItem::Plain { effect, .. } => StackItem {
            effect: *effect,
            flow: Flow::Next,
        },
        ResolvedItem::Branch(insn) => {
            let flow = match (insn.jump_kind(), insn.jump_target()) {
                (Some(JumpKind::Jsr), Some(target)) => Flow::Subroutine { target },
                (_, Some(target)) if matches!(insn, BranchInstruction::JsrW(_)) => {
                    Flow::Subroutine { target }
                }
                (_, Some(target)) => Flow::Jump {
                    target,
                    falls_through: insn.falls_through(),
                },
                (_, None) => Flow::Stop,
            };
            StackItem {
                effect: insn.stack_effect(),
                flow,
            }
        }
        ResolvedItem::Switch(switch) => StackItem {
            effect: StackEffect::new(1, 0),
            flow: Flow::Switch {
                targets: switch.targets(),
            },
        },
    }
}

/// What is known about a local variable slot
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum SlotState {
    /// Never stored to (or clobbered by an overlapping store)
    Unknown,

    /// Holds a 1-slot value
    Single,

    /// First slot of a 2-slot value
    WideLow,

    /// Second slot of a 2-slot value
    WideHigh,
}

/// Widths of the values most recently stored in each local slot, in emission order
#[derive(Debug, Default)]
struct LocalSlots {
    states: Vec<SlotState>,

    /// One past the highest slot touched
    max_locals: usize,
}

impl LocalSlots {
    fn state(&self, slot: usize) -> SlotState {
        self.states.get(slot).copied().unwrap_or(SlotState::Unknown)
    }

    fn set(&mut self, slot: usize, state: SlotState) {
        if self.states.len() <= slot {
            self.states.resize(slot + 1, SlotState::Unknown);
        }
        self.states[slot] = state;
    }

    fn touch(&mut self, slot: usize, width: usize) {
        self.max_locals = self.max_locals.max(slot + width);
    }

    /// Record a store, clobbering any wide value it overlaps
    fn store(&mut self, slot: usize, width: usize) {
        if self.state(slot) == SlotState::WideHigh {
            self.set(slot - 1, SlotState::Unknown);
        }
        let last = slot + width - 1;
        if self.state(last) == SlotState::WideLow {
            self.set(last + 1, SlotState::Unknown);
        }
        if width == 2 {
            self.set(slot, SlotState::WideLow);
            self.set(slot + 1, SlotState::WideHigh);
        } else {
            self.set(slot, SlotState::Single);
        }
        self.touch(slot, width);
    }

    /// Check a load against the last store, returning the stored width on a mismatch
    fn check_load(&self, slot: usize, width: usize) -> Result<(), usize> {
        match (self.state(slot), width) {
            (SlotState::Unknown, _) | (SlotState::Single, 1) | (SlotState::WideLow, 2) => Ok(()),
            (SlotState::Single, _) => Err(1),
            (SlotState::WideLow, _) | (SlotState::WideHigh, _) => Err(2),
        }
    }
}
