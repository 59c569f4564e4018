//! # Yard Module
//!
//! Shunting-yard state for one expression parse. The yard keeps the
//! operator stack and the class of the last token; values never wait —
//! loads and displaced operators go straight into the target code block,
//! which serves as the value stack.
//!
//! ## Key Design
//! - A fixity operator's priority is `(prec << 1) | assoc_bit`, so a
//!   same-precedence left-associative operator on the stack outranks an
//!   incoming operator and is displaced, while a right-associative one
//!   stays put.
//! - Parentheses and commas sit on the stack as blockers that displacement
//!   never crosses.
//! - Every operation validates the token class that preceded it, which is
//!   where most parse errors are detected.

use crate::error::{ErrorKind, ReckonResult};
use crate::opcode::{CodeBlock, CodeRef, NativeFn};

// -----------------------------------------------------------------------------
// OPERATOR STACK ENTRIES
// -----------------------------------------------------------------------------

/// One entry on the operator stack.
enum OpEntry {
    /// Open parenthesis; blocks displacement.
    Parenthesis,
    /// Argument separator; blocks displacement, counted at close.
    Comma,
    /// Prefix or infix operator awaiting its operands.
    Fixity {
        priority: i32,
        arity: u8,
        func: NativeFn,
    },
    /// Builtin function waiting for its parenthesized arguments.
    FuncBuiltin { arity: u8, func: NativeFn },
    /// User-defined function waiting for its parenthesized arguments.
    FuncUser(CodeRef),
}

/// Class of the most recently accepted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Parenthesis,
    Comma,
    Fixity,
    FuncBuiltin,
    FuncUser,
    Value,
}

// -----------------------------------------------------------------------------
// YARD
// -----------------------------------------------------------------------------

/// Per-expression shunting state over a target block.
pub struct Yard<'c> {
    /// Block receiving emitted instructions.
    code: &'c mut CodeBlock,
    /// Operator stack, bottom to top in increasing priority.
    ops: Vec<OpEntry>,
    last: TokenClass,
    /// Fold all-constant calls while emitting.
    try_eval: bool,
}

impl<'c> Yard<'c> {
    /// Creates a yard emitting into `code`.
    pub fn new(code: &'c mut CodeBlock, try_eval: bool) -> Self {
        Self {
            code,
            ops: Vec::with_capacity(8),
            // An imaginary enclosing parenthesis makes a valid start.
            last: TokenClass::Parenthesis,
            try_eval,
        }
    }

    /// `true` when the last token formed a value.
    #[inline]
    pub fn was_last_value(&self) -> bool {
        self.last == TokenClass::Value
    }

    /// Rejects tokens that cannot follow a value or an uncalled function.
    fn check_value_ok(&self) -> ReckonResult<()> {
        match self.last {
            TokenClass::FuncBuiltin | TokenClass::FuncUser => {
                Err(ErrorKind::FuncNoCall.into())
            }
            TokenClass::Value => Err(ErrorKind::MissingOpers.into()),
            _ => Ok(()),
        }
    }

    /// Pops fixity operators with priority above `threshold`, applying each
    /// to the block. Stops at any parenthesis or comma.
    fn displace(&mut self, threshold: i32) -> ReckonResult<()> {
        while let Some(OpEntry::Fixity {
            priority,
            arity,
            func,
        }) = self.ops.last()
        {
            if *priority <= threshold {
                break;
            }
            let (arity, func) = (*arity, *func);
            self.ops.pop();
            self.code.call_func(arity, func, self.try_eval)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // GROUPING
    // -------------------------------------------------------------------------

    /// Opens a parenthesized group.
    pub fn open_parenth(&mut self) -> ReckonResult<()> {
        if self.last == TokenClass::Value {
            return Err(ErrorKind::MissingOpers.into());
        }
        self.ops.push(OpEntry::Parenthesis);
        self.last = TokenClass::Parenthesis;
        Ok(())
    }

    /// Separates arguments inside a group.
    pub fn put_comma(&mut self) -> ReckonResult<()> {
        if self.last != TokenClass::Value {
            return Err(ErrorKind::MissingValues.into());
        }
        self.displace(-1)?;
        self.ops.push(OpEntry::Comma);
        self.last = TokenClass::Comma;
        Ok(())
    }

    /// Closes a group, emitting a call when a function opened it.
    pub fn close_parenth(&mut self) -> ReckonResult<()> {
        if self.last != TokenClass::Value {
            return Err(ErrorKind::MissingValues.into());
        }
        self.displace(-1)?;

        // Commas popped here are the group's argument separators.
        let mut arity: usize = 1;
        while matches!(self.ops.last(), Some(OpEntry::Comma)) {
            self.ops.pop();
            arity += 1;
        }
        match self.ops.pop() {
            Some(OpEntry::Parenthesis) => {}
            _ => return Err(ErrorKind::ParenthMismatch.into()),
        }
        let arity = u8::try_from(arity).map_err(|_| ErrorKind::ArityMismatch)?;

        match self.ops.last() {
            Some(OpEntry::FuncUser(callee)) => {
                let callee = callee.clone();
                self.ops.pop();
                // A forward declaration takes its arity from this call site.
                if !callee.borrow_mut().set_arity(arity) {
                    return Err(ErrorKind::ArityMismatch.into());
                }
                self.code.call_code(&callee)?;
            }
            Some(OpEntry::FuncBuiltin { arity: expected, func }) => {
                let (expected, func) = (*expected, *func);
                self.ops.pop();
                if arity != expected {
                    return Err(ErrorKind::ArityMismatch.into());
                }
                self.code.call_func(expected, func, self.try_eval)?;
            }
            _ => {
                // A plain parenthesized value admits no commas.
                if arity != 1 {
                    return Err(ErrorKind::BadComma.into());
                }
            }
        }

        self.last = TokenClass::Value;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // OPERATORS
    // -------------------------------------------------------------------------

    /// Pushes a prefix operator.
    pub fn put_unary(&mut self, func: NativeFn, prec: u8) -> ReckonResult<()> {
        if self.last == TokenClass::Value {
            return Err(ErrorKind::MissingOpers.into());
        }
        if self.last == TokenClass::FuncBuiltin || self.last == TokenClass::FuncUser {
            return Err(ErrorKind::FuncNoCall.into());
        }
        // A pending left-associative binary of higher precedence would
        // claim our operand first.
        if self.last == TokenClass::Fixity {
            if let Some(OpEntry::Fixity {
                priority, arity: 2, ..
            }) = self.ops.last()
            {
                if priority & 1 == 1 && *priority > (prec as i32) << 1 {
                    return Err(ErrorKind::LowPrecUnary.into());
                }
            }
        }

        self.ops.push(OpEntry::Fixity {
            priority: ((prec as i32) << 1) | 1,
            arity: 1,
            func,
        });
        self.last = TokenClass::Fixity;
        Ok(())
    }

    /// Pushes an infix operator, displacing what outranks it.
    pub fn put_binary(&mut self, func: NativeFn, prec: u8, left_assoc: bool) -> ReckonResult<()> {
        if self.last != TokenClass::Value {
            return Err(ErrorKind::MissingValues.into());
        }
        self.displace((prec as i32) << 1)?;

        self.ops.push(OpEntry::Fixity {
            priority: ((prec as i32) << 1) | left_assoc as i32,
            arity: 2,
            func,
        });
        self.last = TokenClass::Fixity;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // CALLS AND LOADS
    // -------------------------------------------------------------------------

    /// Pushes a builtin function awaiting its argument group.
    pub fn func_call(&mut self, arity: u8, func: NativeFn) -> ReckonResult<()> {
        self.check_value_ok()?;
        self.ops.push(OpEntry::FuncBuiltin { arity, func });
        self.last = TokenClass::FuncBuiltin;
        Ok(())
    }

    /// Pushes a user function awaiting its argument group. A zero-arity
    /// block is a value, not a function — use [`Yard::load_var`].
    pub fn code_call(&mut self, callee: &CodeRef) -> ReckonResult<()> {
        self.check_value_ok()?;
        if callee.borrow().get_arity() == Some(0) {
            return Err(ErrorKind::ArityMismatch.into());
        }
        self.ops.push(OpEntry::FuncUser(callee.clone()));
        self.last = TokenClass::FuncUser;
        Ok(())
    }

    /// Emits a constant load.
    pub fn load_const(&mut self, value: crate::value::Value) -> ReckonResult<()> {
        self.check_value_ok()?;
        self.code.load_const(value)?;
        self.last = TokenClass::Value;
        Ok(())
    }

    /// Emits an argument load.
    pub fn load_arg(&mut self, idx: u16) -> ReckonResult<()> {
        self.check_value_ok()?;
        self.code.load_arg(idx)?;
        self.last = TokenClass::Value;
        Ok(())
    }

    /// Emits a zero-arity call, reading `callee` as a value. A forward
    /// declaration is fixed to arity 0 here.
    pub fn load_var(&mut self, callee: &CodeRef) -> ReckonResult<()> {
        self.check_value_ok()?;
        {
            let mut block = callee.borrow_mut();
            if !block.set_arity(0) {
                return Err(ErrorKind::FuncNoCall.into());
            }
        }
        self.code.call_code(callee)?;
        self.last = TokenClass::Value;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // FINISH
    // -------------------------------------------------------------------------

    /// Flushes the operator stack at end of expression. Anything left that
    /// displacement cannot remove is a structural error.
    pub fn clear(&mut self) -> ReckonResult<()> {
        self.displace(-1)?;
        match self.ops.last() {
            None => Ok(()),
            Some(OpEntry::Parenthesis) => Err(ErrorKind::ParenthMismatch.into()),
            Some(OpEntry::Comma) => Err(ErrorKind::BadComma.into()),
            Some(OpEntry::FuncBuiltin { .. }) | Some(OpEntry::FuncUser(_)) => {
                Err(ErrorKind::FuncNoCall.into())
            }
            Some(OpEntry::Fixity { .. }) => Err(ErrorKind::MissingValues.into()),
        }
    }
}
