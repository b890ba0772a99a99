//! Multi-way branches (`tableswitch` and `lookupswitch`)
//!
//! The caller picks the form. A dense switch covers every value in `low..=high` and any slot left
//! unset routes to the default. A sparse switch holds an arbitrary set of keys, which get sorted
//! before serialization since the JVM binary searches them.

use super::Label;
use crate::jvm::class_file::Serialize;
use crate::jvm::Error;
use crate::util::Offset;
use byteorder::WriteBytesExt;
use std::fmt;

/// Opaque handle for a switch in a method
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct SwitchHandle {
    method: u32,
    index: u32,
}

impl fmt::Debug for SwitchHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("S{}", self.index))
    }
}

/// Most cases that fit in a method (the code array is at most 65535 bytes)
const MAX_TABLE_CASES: usize = (u16::MAX as usize - 16) / 4;
const MAX_LOOKUP_CASES: usize = (u16::MAX as usize - 16) / 8;

#[derive(Debug)]
enum SwitchTable {
    Dense {
        low: i32,
        targets: Vec<Option<Label>>,
    },
    Sparse {
        case_count: usize,
        cases: Vec<(i32, Label)>,
    },
}

#[derive(Debug)]
struct SwitchState {
    table: SwitchTable,
    default: Option<Label>,

    /// Offset of the switch instruction before any branch widening
    offset: Offset,
}

/// Switch with all of its targets known
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolvedSwitch<Lbl> {
    Table {
        default: Lbl,
        low: i32,
        targets: Vec<Lbl>,
    },

    /// Keys are in ascending order
    Lookup {
        default: Lbl,
        pairs: Vec<(i32, Lbl)>,
    },
}

impl<Lbl: Copy> ResolvedSwitch<Lbl> {
    /// Every jump target, starting with the default
    pub fn targets(&self) -> Vec<Lbl> {
        match self {
            ResolvedSwitch::Table {
                default, targets, ..
            } => std::iter::once(*default).chain(targets.iter().copied()).collect(),
            ResolvedSwitch::Lookup { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, lbl)| *lbl))
                .collect(),
        }
    }

    /// Change the representation of jump targets
    pub fn map_labels<Lbl2>(&self, f: impl Fn(Lbl) -> Lbl2) -> ResolvedSwitch<Lbl2> {
        match self {
            ResolvedSwitch::Table {
                default,
                low,
                targets,
            } => ResolvedSwitch::Table {
                default: f(*default),
                low: *low,
                targets: targets.iter().map(|target| f(*target)).collect(),
            },
            ResolvedSwitch::Lookup { default, pairs } => ResolvedSwitch::Lookup {
                default: f(*default),
                pairs: pairs.iter().map(|(key, target)| (*key, f(*target))).collect(),
            },
        }
    }

    /// Width of the switch after the opcode and alignment padding
    pub fn table_width(&self) -> usize {
        match self {
            ResolvedSwitch::Table { targets, .. } => 4 * (3 + targets.len()),
            ResolvedSwitch::Lookup { pairs, .. } => 8 * (1 + pairs.len()),
        }
    }

    /// Write out the switch, given how much padding it needs and the relative offset of each
    /// target
    pub fn serialize<W: WriteBytesExt>(
        &self,
        padding: usize,
        relative_offset: impl Fn(Lbl) -> i32,
        writer: &mut W,
    ) -> std::io::Result<()> {
        match self {
            ResolvedSwitch::Table {
                default,
                low,
                targets,
            } => {
                0xaau8.serialize(writer)?;
                writer.write_all(&[0u8; 3][..padding])?;
                relative_offset(*default).serialize(writer)?;
                low.serialize(writer)?;
                let high = *low as i64 + targets.len() as i64 - 1;
                (high as i32).serialize(writer)?;
                for target in targets {
                    relative_offset(*target).serialize(writer)?;
                }
            }
            ResolvedSwitch::Lookup { default, pairs } => {
                0xabu8.serialize(writer)?;
                writer.write_all(&[0u8; 3][..padding])?;
                relative_offset(*default).serialize(writer)?;
                (pairs.len() as i32).serialize(writer)?;
                for (key, target) in pairs {
                    key.serialize(writer)?;
                    relative_offset(*target).serialize(writer)?;
                }
            }
        }
        Ok(())
    }
}

/// Tracks every switch of one method while its cases are being filled in
#[derive(Debug)]
pub struct SwitchBuilder {
    /// Serial number of the method within its class
    method: u32,
    switches: Vec<SwitchState>,
}

impl SwitchBuilder {
    pub fn new(method: u32) -> SwitchBuilder {
        SwitchBuilder {
            method,
            switches: vec![],
        }
    }

    /// Start a dense switch over `low..=high`
    pub fn table_switch(
        &mut self,
        low: i32,
        high: i32,
        offset: Offset,
        method: &str,
    ) -> Result<SwitchHandle, Error> {
        if low > high {
            return Err(Error::InvalidSwitchBounds {
                method: method.to_owned(),
                low,
                high,
            });
        }
        let case_count = (high as i64 - low as i64 + 1) as usize;
        if case_count > MAX_TABLE_CASES {
            return Err(Error::TooManyEntries("tableswitch cases"));
        }
        Ok(self.push(
            SwitchTable::Dense {
                low,
                targets: vec![None; case_count],
            },
            offset,
        ))
    }

    /// Start a sparse switch with up to `case_count` cases
    pub fn lookup_switch(&mut self, case_count: usize, offset: Offset) -> Result<SwitchHandle, Error> {
        if case_count > MAX_LOOKUP_CASES {
            return Err(Error::TooManyEntries("lookupswitch cases"));
        }
        Ok(self.push(
            SwitchTable::Sparse {
                case_count,
                cases: Vec::with_capacity(case_count),
            },
            offset,
        ))
    }

    fn push(&mut self, table: SwitchTable, offset: Offset) -> SwitchHandle {
        let handle = SwitchHandle {
            method: self.method,
            index: self.switches.len() as u32,
        };
        self.switches.push(SwitchState {
            table,
            default: None,
            offset,
        });
        handle
    }

    fn get(&self, handle: SwitchHandle) -> Option<&SwitchState> {
        if handle.method == self.method {
            self.switches.get(handle.index as usize)
        } else {
            None
        }
    }

    fn get_mut(&mut self, handle: SwitchHandle, method: &str) -> Result<&mut SwitchState, Error> {
        let unknown = || Error::UnknownSwitch {
            method: method.to_owned(),
            switch: handle,
        };
        if handle.method != self.method {
            return Err(unknown());
        }
        self.switches
            .get_mut(handle.index as usize)
            .ok_or_else(unknown)
    }

    /// Check the handle belongs to this builder
    pub fn check_known(&self, handle: SwitchHandle, method: &str) -> Result<(), Error> {
        match self.get(handle) {
            Some(_) => Ok(()),
            None => Err(Error::UnknownSwitch {
                method: method.to_owned(),
                switch: handle,
            }),
        }
    }

    /// Route one key of the switch to a label
    pub fn add_case(
        &mut self,
        handle: SwitchHandle,
        value: i32,
        target: Label,
        method: &str,
    ) -> Result<(), Error> {
        let state = self.get_mut(handle, method)?;
        let offset = state.offset;
        let duplicate = || Error::DuplicateSwitchCase {
            method: method.to_owned(),
            offset,
            value,
        };
        match &mut state.table {
            SwitchTable::Dense { low, targets } => {
                let high = (*low as i64 + targets.len() as i64 - 1) as i32;
                if value < *low || value > high {
                    return Err(Error::SwitchCaseOutOfRange {
                        method: method.to_owned(),
                        offset,
                        value,
                        low: *low,
                        high,
                    });
                }
                let slot = &mut targets[(value as i64 - *low as i64) as usize];
                if slot.is_some() {
                    return Err(duplicate());
                }
                *slot = Some(target);
            }
            SwitchTable::Sparse { case_count, cases } => {
                if cases.iter().any(|(key, _)| *key == value) {
                    return Err(duplicate());
                }
                if cases.len() >= *case_count {
                    return Err(Error::SwitchCaseOverflow {
                        method: method.to_owned(),
                        offset,
                        case_count: *case_count,
                    });
                }
                cases.push((value, target));
            }
        }
        Ok(())
    }

    /// Route every unmatched key of the switch to a label
    pub fn set_default(
        &mut self,
        handle: SwitchHandle,
        target: Label,
        method: &str,
    ) -> Result<(), Error> {
        let state = self.get_mut(handle, method)?;
        if state.default.is_some() {
            return Err(Error::DuplicateSwitchDefault {
                method: method.to_owned(),
                offset: state.offset,
            });
        }
        state.default = Some(target);
        Ok(())
    }

    /// Width of the tables of a switch as they would be serialized right now
    ///
    /// Sparse switches count all of their declared cases.
    pub fn provisional_table_width(&self, handle: SwitchHandle) -> usize {
        match self.get(handle).map(|state| &state.table) {
            Some(SwitchTable::Dense { targets, .. }) => 4 * (3 + targets.len()),
            Some(SwitchTable::Sparse { case_count, .. }) => 8 * (1 + case_count),
            None => 0,
        }
    }

    /// Finalize a switch: dense slots left unset route to the default and sparse keys get sorted
    pub fn resolve(&self, handle: SwitchHandle, method: &str) -> Result<ResolvedSwitch<Label>, Error> {
        let state = self.get(handle).ok_or_else(|| Error::UnknownSwitch {
            method: method.to_owned(),
            switch: handle,
        })?;
        let default = state.default.ok_or_else(|| Error::SwitchDefaultUnset {
            method: method.to_owned(),
            offset: state.offset,
        })?;
        Ok(match &state.table {
            SwitchTable::Dense { low, targets } => ResolvedSwitch::Table {
                default,
                low: *low,
                targets: targets
                    .iter()
                    .map(|target| target.unwrap_or(default))
                    .collect(),
            },
            SwitchTable::Sparse { cases, .. } => {
                let mut pairs = cases.clone();
                pairs.sort_by_key(|(key, _)| *key);
                ResolvedSwitch::Lookup { default, pairs }
            }
        })
    }
}
