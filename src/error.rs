//! # Error Module
//!
//! Unified error type for parsing, definition, and evaluation.
//! Every failure is one of a fixed set of kinds; each kind has a stable
//! integer code that forms part of the embedding ABI, so hosts that only
//! see numbers can still resolve a description through [`strerror`].

use std::fmt;

// -----------------------------------------------------------------------------
// ERROR KIND — Stable Failure Codes
// -----------------------------------------------------------------------------

/// Classifies every failure the engine can report.
///
/// The first group is produced during expression parsing, the second by
/// namespace insertion, the third during bytecode evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // -- Parse errors --
    /// Open or close parenthesis without its counterpart.
    ParenthMismatch,
    /// Unary operator after a higher-precedence left-associative binary.
    LowPrecUnary,
    /// Wrong number of arguments given to a function.
    ArityMismatch,
    /// Comma outside a function argument list.
    BadComma,
    /// Function name not followed by a call.
    FuncNoCall,
    /// Operator is missing one of its operands.
    MissingValues,
    /// Two values in a row with no operator between.
    MissingOpers,
    /// Content left over after a complete expression.
    ExtraContent,

    // -- Insertion errors --
    /// Variable already has a definition.
    Redef,
    /// Definition would make a variable depend on itself.
    CircularDependency,

    // -- Evaluation errors --
    /// Block is not runnable: wrong stack height or no definition attached.
    IncompleteCode,
    /// Call consumed more values than the stack holds.
    MissingArgs,
    /// Instruction not recognized by the evaluator.
    UnknownInstr,
    /// More than one value left after execution.
    StackSurplus,
    /// No value left after execution.
    StackUnderflow,
}

impl ErrorKind {
    /// Returns the stable integer code for this kind.
    pub const fn code(self) -> i32 {
        match self {
            ErrorKind::MissingArgs => -1,
            ErrorKind::UnknownInstr => -2,
            ErrorKind::StackSurplus => -3,
            ErrorKind::StackUnderflow => -4,
            ErrorKind::IncompleteCode => -5,
            ErrorKind::ParenthMismatch => -16,
            ErrorKind::LowPrecUnary => -17,
            ErrorKind::ArityMismatch => -18,
            ErrorKind::BadComma => -19,
            ErrorKind::FuncNoCall => -20,
            ErrorKind::MissingValues => -26,
            ErrorKind::MissingOpers => -27,
            ErrorKind::ExtraContent => -32,
            ErrorKind::Redef => -64,
            ErrorKind::CircularDependency => -65,
        }
    }

    /// Resolves an integer code back to its kind, if it is one of ours.
    pub fn from_code(code: i32) -> Option<ErrorKind> {
        let kind = match code {
            -1 => ErrorKind::MissingArgs,
            -2 => ErrorKind::UnknownInstr,
            -3 => ErrorKind::StackSurplus,
            -4 => ErrorKind::StackUnderflow,
            -5 => ErrorKind::IncompleteCode,
            -16 => ErrorKind::ParenthMismatch,
            -17 => ErrorKind::LowPrecUnary,
            -18 => ErrorKind::ArityMismatch,
            -19 => ErrorKind::BadComma,
            -20 => ErrorKind::FuncNoCall,
            -26 => ErrorKind::MissingValues,
            -27 => ErrorKind::MissingOpers,
            -32 => ErrorKind::ExtraContent,
            -64 => ErrorKind::Redef,
            -65 => ErrorKind::CircularDependency,
            _ => return None,
        };
        Some(kind)
    }

    /// Short description of the failure.
    pub const fn describe(self) -> &'static str {
        match self {
            ErrorKind::ParenthMismatch => "missing open or close parenthesis",
            ErrorKind::LowPrecUnary => {
                "unary operator follows binary operator of higher precedence"
            }
            ErrorKind::ArityMismatch => "wrong number of arguments given to function",
            ErrorKind::BadComma => "comma in wrong location",
            ErrorKind::FuncNoCall => "function present but not called",
            ErrorKind::MissingValues => "operator is missing an argument",
            ErrorKind::MissingOpers => "multiple values without operator between",
            ErrorKind::ExtraContent => "content present after expression",
            ErrorKind::Redef => "variable already defined",
            ErrorKind::CircularDependency => "variable depends on itself",
            ErrorKind::IncompleteCode => "code block is not runnable",
            ErrorKind::MissingArgs => "not enough arguments for call",
            ErrorKind::UnknownInstr => "instruction not recognized",
            ErrorKind::StackSurplus => "values left on stack after execution",
            ErrorKind::StackUnderflow => "no value on stack after execution",
        }
    }

    /// Attaches a byte position, producing a full error.
    pub const fn at(self, pos: usize) -> ReckonError {
        ReckonError {
            kind: self,
            pos: Some(pos),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Resolves an ABI error code to a human-readable description.
pub fn strerror(code: i32) -> &'static str {
    match ErrorKind::from_code(code) {
        Some(kind) => kind.describe(),
        None if code == 0 => "success",
        None => "unknown error",
    }
}

// -----------------------------------------------------------------------------
// RECKON ERROR — Kind + Source Position
// -----------------------------------------------------------------------------

/// An engine failure, optionally located at a byte offset in the input.
///
/// Evaluation errors carry no position; parse errors record the offset at
/// which the parser gave up so callers can report a meaningful location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReckonError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Byte offset into the parsed text, when known.
    pub pos: Option<usize>,
}

impl ReckonError {
    /// Sets the position if none was recorded yet.
    pub fn or_at(mut self, pos: usize) -> Self {
        if self.pos.is_none() {
            self.pos = Some(pos);
        }
        self
    }
}

impl From<ErrorKind> for ReckonError {
    fn from(kind: ErrorKind) -> Self {
        Self { kind, pos: None }
    }
}

impl fmt::Display for ReckonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pos {
            Some(pos) => write!(f, "{} [byte {}]", self.kind, pos),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for ReckonError {}

/// Convenience alias used throughout the crate.
pub type ReckonResult<T> = std::result::Result<T, ReckonError>;
