use crate::jvm::Error;
use crate::util::Offset;
use std::fmt;

/// Opaque handle for a position in a method's code that may not be known yet
///
/// Labels remember which method of the class handed them out, so they cannot leak into another
/// method's code.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Label {
    method: u32,
    index: u32,
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("L{}", self.index))
    }
}

/// Where a label got marked
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LabelPosition {
    /// Index of the code item that follows the label (or the item count for the end of the code)
    pub item: usize,

    /// Byte offset at the time of marking, before any branch widening
    pub offset: Offset,
}

/// Tracks every label of one method
///
/// A label is unresolved from the moment it is handed out until it gets marked, and stays
/// resolved for the rest of the method. Marking a label twice is an error.
#[derive(Debug)]
pub struct LabelTable {
    /// Serial number of the method within its class
    method: u32,
    positions: Vec<Option<LabelPosition>>,
}

impl LabelTable {
    pub fn new(method: u32) -> LabelTable {
        LabelTable {
            method,
            positions: vec![],
        }
    }

    /// Get a fresh unresolved label
    pub fn fresh_label(&mut self) -> Label {
        let label = Label {
            method: self.method,
            index: self.positions.len() as u32,
        };
        self.positions.push(None);
        label
    }

    /// Index of a label handed out by this table
    fn slot(&self, label: Label) -> Option<usize> {
        let index = label.index as usize;
        if label.method == self.method && index < self.positions.len() {
            Some(index)
        } else {
            None
        }
    }

    /// Check the label was handed out by this table
    pub fn check_known(&self, label: Label, method: &str) -> Result<(), Error> {
        match self.slot(label) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownLabel {
                method: method.to_owned(),
                label,
            }),
        }
    }

    /// Resolve a label to a position
    pub fn mark(
        &mut self,
        label: Label,
        position: LabelPosition,
        method: &str,
    ) -> Result<(), Error> {
        let index = self.slot(label).ok_or_else(|| Error::UnknownLabel {
            method: method.to_owned(),
            label,
        })?;
        let slot = &mut self.positions[index];
        if slot.is_some() {
            return Err(Error::DuplicateLabel {
                method: method.to_owned(),
                label,
            });
        }
        *slot = Some(position);
        Ok(())
    }

    /// Position of a label, if it has been marked
    pub fn position(&self, label: Label) -> Option<LabelPosition> {
        self.slot(label).and_then(|index| self.positions[index])
    }

    /// Labels that were handed out but never marked
    pub fn unmarked(&self) -> Vec<Label> {
        self.positions
            .iter()
            .enumerate()
            .filter(|(_, position)| position.is_none())
            .map(|(index, _)| Label {
                method: self.method,
                index: index as u32,
            })
            .collect()
    }

    /// Error out if any label is unmarked
    pub fn check_all_marked(&self, method: &str) -> Result<(), Error> {
        let labels = self.unmarked();
        if labels.is_empty() {
            Ok(())
        } else {
            Err(Error::UnmarkedLabels {
                method: method.to_owned(),
                labels,
            })
        }
    }

    /// Resolved item index of a label
    ///
    /// Only meaningful after [`LabelTable::check_all_marked`] succeeded.
    pub fn item(&self, label: Label) -> usize {
        self.position(label).map_or(0, |position| position.item)
    }
}
