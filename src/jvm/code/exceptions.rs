use super::Label;
use crate::jvm::class_file::{BytecodeIndex, ClassConstantIndex, ExceptionHandler};
use crate::jvm::Error;
use crate::util::Offset;

/// Exception handler whose range and handler are still labels
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PendingHandler {
    pub start: Label,
    pub end: Label,
    pub handler: Label,

    /// `None` catches everything
    pub catch_type: Option<ClassConstantIndex>,
}

/// Exception table of one method
///
/// Entries stay in the order they were added, since the JVM picks the first matching entry.
/// Nested handlers therefore need to be added innermost first.
#[derive(Debug, Default)]
pub struct ExceptionTableBuilder {
    handlers: Vec<PendingHandler>,
}

impl ExceptionTableBuilder {
    pub fn new() -> ExceptionTableBuilder {
        ExceptionTableBuilder::default()
    }

    pub fn push(&mut self, handler: PendingHandler) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingHandler> {
        self.handlers.iter()
    }

    /// Turn every entry into its final form, given the final offset of each label
    ///
    /// Offsets must already be known to fit in the code array.
    pub fn resolve(
        &self,
        label_offset: impl Fn(Label) -> usize,
        method: &str,
    ) -> Result<Vec<ExceptionHandler>, Error> {
        if self.handlers.len() > u16::MAX as usize {
            return Err(Error::TooManyEntries("exception handlers"));
        }
        self.handlers
            .iter()
            .map(|pending| {
                let start = label_offset(pending.start);
                let end = label_offset(pending.end);
                if start >= end {
                    return Err(Error::EmptyExceptionRange {
                        method: method.to_owned(),
                        start: Offset(start),
                        end: Offset(end),
                    });
                }
                Ok(ExceptionHandler {
                    start_pc: BytecodeIndex(start as u16),
                    end_pc: BytecodeIndex(end as u16),
                    handler_pc: BytecodeIndex(label_offset(pending.handler) as u16),
                    catch_type: pending.catch_type,
                })
            })
            .collect()
    }
}
