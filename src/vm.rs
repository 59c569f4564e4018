//! # VM Module
//!
//! Stack-machine evaluator for code blocks. Execution walks the
//! instruction buffer over a single value stack: loads push clones,
//! calls consume the top `arity` values and leave one result.
//!
//! ## Key Design
//! - Cached results short-circuit before any execution.
//! - A block only runs when its virtual stack height is exactly 1.
//! - `CallCode` recurses with the top-arity slice as the callee's
//!   arguments; `CallFunc` applies a builtin in place.
//! - Constant blocks (arity 0) memoize their first outcome, value or
//!   error alike.

use crate::error::{ErrorKind, ReckonResult};
use crate::opcode::{CodeRef, Instruction};
use crate::value::Value;

// -----------------------------------------------------------------------------
// ENTRY POINT
// -----------------------------------------------------------------------------

/// Evaluates a block with the given arguments.
pub fn eval(code: &CodeRef, args: &[Value]) -> ReckonResult<Value> {
    let mut stack: Vec<Value> = Vec::with_capacity(8);
    eval_onto(code, args, &mut stack)?;
    stack.pop().ok_or_else(|| ErrorKind::StackUnderflow.into())
}

/// Evaluates a block, leaving its single result on `stack`.
fn eval_onto(code: &CodeRef, args: &[Value], stack: &mut Vec<Value>) -> ReckonResult<()> {
    {
        let block = code.borrow();
        if let Some(cached) = &block.cache {
            match cached {
                Ok(value) => {
                    stack.push(*value);
                    return Ok(());
                }
                Err(err) => return Err(*err),
            }
        }
        if block.height != 1 {
            return Err(ErrorKind::IncompleteCode.into());
        }
    }

    let start = stack.len();
    let outcome = run(code, args, stack).and_then(|()| {
        // One new value must remain above the caller's frame.
        if stack.len() > start + 1 {
            Err(ErrorKind::StackSurplus.into())
        } else if stack.len() <= start {
            Err(ErrorKind::StackUnderflow.into())
        } else {
            Ok(())
        }
    });

    // Constant blocks memoize their first outcome; argument-bearing blocks
    // never cache.
    if code.borrow().arity == Some(0) {
        let mut block = code.borrow_mut();
        block.cache = Some(match &outcome {
            Ok(()) => Ok(stack[stack.len() - 1]),
            Err(err) => Err(*err),
        });
    }

    if outcome.is_err() {
        stack.truncate(start);
    }
    outcome
}

// -----------------------------------------------------------------------------
// DISPATCH LOOP
// -----------------------------------------------------------------------------

/// Runs every instruction of `code` against `stack`.
fn run(code: &CodeRef, args: &[Value], stack: &mut Vec<Value>) -> ReckonResult<()> {
    let block = code.borrow();
    for instr in &block.instrs {
        match instr {
            Instruction::LoadConst(idx) => {
                stack.push(block.consts[*idx as usize]);
            }
            Instruction::LoadArg(idx) => {
                let value = args
                    .get(*idx as usize)
                    .copied()
                    .ok_or(ErrorKind::MissingArgs)?;
                stack.push(value);
            }
            Instruction::CallCode(callee, arity) => {
                let at = stack
                    .len()
                    .checked_sub(*arity as usize)
                    .ok_or(ErrorKind::MissingArgs)?;
                let call_args = stack.split_off(at);
                eval_onto(callee, &call_args, stack)?;
            }
            Instruction::CallFunc(func, arity) => {
                let at = stack
                    .len()
                    .checked_sub(*arity as usize)
                    .ok_or(ErrorKind::MissingArgs)?;
                let result = func(&stack[at..])?;
                stack.truncate(at);
                stack.push(result);
            }
        }
    }
    Ok(())
}
