use super::class_file::Constant;
use super::code::{Label, SwitchHandle};
use crate::util::Offset;
use std::fmt;

/// Everything that can go wrong while assembling a class
///
/// Nothing here is transient: each variant is either a bug in the code generator driving the
/// assembler (see [`ErrorKind::CallerProtocol`]) or a limit of the class file format that the
/// generated code overran (see [`ErrorKind::FormatLimit`]). Method-level errors carry the name of
/// the method being assembled, and emission errors carry the offset of the offending emission
/// (measured before any branch widening).
#[derive(Debug)]
pub enum Error {
    ConstantPoolOverflow {
        constant: Constant,
        offset: usize,
    },
    MethodCodeOverflow {
        method: String,
        length: usize,
    },
    MethodCodeMaxStackOverflow {
        method: String,
        max_stack: Offset,
    },
    MethodCodeMaxLocalsOverflow {
        method: String,
        max_locals: Offset,
    },

    /// Jump distance could not be encoded, even in a wide instruction
    BranchOffsetOverflow {
        method: String,
        offset: Offset,
        distance: isize,
    },

    /// More fields, methods, interfaces, or table entries than fit in a `u16` count
    TooManyEntries(&'static str),

    /// Array type with more than 255 dimensions
    ArrayDimensionsOverflow(usize),

    /// String whose modified UTF-8 encoding is longer than 65535 bytes
    Utf8ConstantTooLong {
        length: usize,
    },

    /// The same label was marked twice
    DuplicateLabel {
        method: String,
        label: Label,
    },

    /// A label that was never acquired from this method
    UnknownLabel {
        method: String,
        label: Label,
    },

    /// The method was closed while some labels were acquired but never marked
    UnmarkedLabels {
        method: String,
        labels: Vec<Label>,
    },

    /// A switch handle that does not belong to this method
    UnknownSwitch {
        method: String,
        switch: SwitchHandle,
    },

    /// Dense switch case outside of the `low..=high` bounds it was created with
    SwitchCaseOutOfRange {
        method: String,
        offset: Offset,
        value: i32,
        low: i32,
        high: i32,
    },

    /// Same key given twice to one switch
    DuplicateSwitchCase {
        method: String,
        offset: Offset,
        value: i32,
    },

    /// More cases added to a sparse switch than it was declared with
    SwitchCaseOverflow {
        method: String,
        offset: Offset,
        case_count: usize,
    },

    /// Switch whose default target was never provided
    SwitchDefaultUnset {
        method: String,
        offset: Offset,
    },

    /// Switch whose default target was provided twice
    DuplicateSwitchDefault {
        method: String,
        offset: Offset,
    },

    /// Dense switch with `low > high`
    InvalidSwitchBounds {
        method: String,
        low: i32,
        high: i32,
    },

    /// A local was read with a different width than the one last written to it
    LocalWidthMismatch {
        method: String,
        offset: Offset,
        slot: u16,
        expected: usize,
        found: usize,
    },

    /// Exception handler range whose start is not strictly before its end
    EmptyExceptionRange {
        method: String,
        start: Offset,
        end: Offset,
    },

    BadDescriptor(String),
    BadName(String),

    /// Two fields (or two methods) with the same name and descriptor
    DuplicateMember {
        name: String,
        descriptor: String,
    },

    IoError(std::io::Error),
}

/// Broad classification of [`Error`]s
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The code generator misused the assembler API
    CallerProtocol,

    /// The generated class does not fit the limits of the class file format
    FormatLimit,

    /// Failure of the underlying writer
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConstantPoolOverflow { .. }
            | Error::MethodCodeOverflow { .. }
            | Error::MethodCodeMaxStackOverflow { .. }
            | Error::MethodCodeMaxLocalsOverflow { .. }
            | Error::BranchOffsetOverflow { .. }
            | Error::TooManyEntries(_)
            | Error::ArrayDimensionsOverflow(_)
            | Error::Utf8ConstantTooLong { .. } => ErrorKind::FormatLimit,

            Error::DuplicateLabel { .. }
            | Error::UnknownLabel { .. }
            | Error::UnmarkedLabels { .. }
            | Error::UnknownSwitch { .. }
            | Error::SwitchCaseOutOfRange { .. }
            | Error::DuplicateSwitchCase { .. }
            | Error::SwitchCaseOverflow { .. }
            | Error::SwitchDefaultUnset { .. }
            | Error::DuplicateSwitchDefault { .. }
            | Error::InvalidSwitchBounds { .. }
            | Error::LocalWidthMismatch { .. }
            | Error::EmptyExceptionRange { .. }
            | Error::BadDescriptor(_)
            | Error::BadName(_)
            | Error::DuplicateMember { .. } => ErrorKind::CallerProtocol,

            Error::IoError(_) => ErrorKind::Io,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool overflow at index {} while adding {:?}",
                offset, constant
            ),
            Error::MethodCodeOverflow { method, length } => write!(
                f,
                "method '{}' has {} bytes of code (limit is 65535)",
                method, length
            ),
            Error::MethodCodeMaxStackOverflow { method, max_stack } => write!(
                f,
                "method '{}' needs an operand stack of {} slots",
                method, max_stack.0
            ),
            Error::MethodCodeMaxLocalsOverflow { method, max_locals } => write!(
                f,
                "method '{}' needs {} local slots",
                method, max_locals.0
            ),
            Error::BranchOffsetOverflow {
                method,
                offset,
                distance,
            } => write!(
                f,
                "branch at offset {} in method '{}' jumps {} bytes",
                offset.0, method, distance
            ),
            Error::TooManyEntries(what) => write!(f, "too many {} for the class file format", what),
            Error::ArrayDimensionsOverflow(dims) => {
                write!(f, "array type has {} dimensions (limit is 255)", dims)
            }
            Error::Utf8ConstantTooLong { length } => write!(
                f,
                "utf8 constant encodes to {} bytes (limit is 65535)",
                length
            ),
            Error::DuplicateLabel { method, label } => {
                write!(f, "label {:?} marked twice in method '{}'", label, method)
            }
            Error::UnknownLabel { method, label } => {
                write!(f, "label {:?} does not belong to method '{}'", label, method)
            }
            Error::UnmarkedLabels { method, labels } => write!(
                f,
                "method '{}' closed with unmarked labels {:?}",
                method, labels
            ),
            Error::UnknownSwitch { method, switch } => write!(
                f,
                "switch {:?} does not belong to method '{}'",
                switch, method
            ),
            Error::SwitchCaseOutOfRange {
                method,
                offset,
                value,
                low,
                high,
            } => write!(
                f,
                "case {} is outside of {}..={} for switch at offset {} in method '{}'",
                value, low, high, offset.0, method
            ),
            Error::DuplicateSwitchCase {
                method,
                offset,
                value,
            } => write!(
                f,
                "case {} given twice for switch at offset {} in method '{}'",
                value, offset.0, method
            ),
            Error::SwitchCaseOverflow {
                method,
                offset,
                case_count,
            } => write!(
                f,
                "switch at offset {} in method '{}' was declared with {} cases",
                offset.0, method, case_count
            ),
            Error::SwitchDefaultUnset { method, offset } => write!(
                f,
                "switch at offset {} in method '{}' has no default",
                offset.0, method
            ),
            Error::DuplicateSwitchDefault { method, offset } => write!(
                f,
                "switch at offset {} in method '{}' was given two defaults",
                offset.0, method
            ),
            Error::InvalidSwitchBounds { method, low, high } => write!(
                f,
                "invalid dense switch bounds {}..={} in method '{}'",
                low, high, method
            ),
            Error::LocalWidthMismatch {
                method,
                offset,
                slot,
                expected,
                found,
            } if expected == found => write!(
                f,
                "local {} is the upper half of a wide value (offset {} in method '{}')",
                slot, offset.0, method
            ),
            Error::LocalWidthMismatch {
                method,
                offset,
                slot,
                expected,
                found,
            } => write!(
                f,
                "local {} used with width {} but holds a value of width {} (offset {} in method '{}')",
                slot, found, expected, offset.0, method
            ),
            Error::EmptyExceptionRange { method, start, end } => write!(
                f,
                "exception handler range {}..{} in method '{}' is empty",
                start.0, end.0, method
            ),
            Error::BadDescriptor(msg) => write!(f, "bad descriptor: {}", msg),
            Error::BadName(msg) => write!(f, "bad name: {}", msg),
            Error::DuplicateMember { name, descriptor } => {
                write!(f, "member '{}' '{}' declared twice", name, descriptor)
            }
            Error::IoError(err) => write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
