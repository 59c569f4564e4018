//! # Opcode Module
//!
//! Stack-machine instruction set and the code block that owns it.
//! Instructions are encoded as a Rust enum for type safety; a block tracks
//! its constant pool, arity, and virtual stack height as instructions are
//! appended, so validity (height exactly 1) is known without re-scanning.
//!
//! ## Key Design
//! - Constant pool is append-only and deduplicated on value equality.
//! - Arity is set at most once; `None` marks a forward declaration.
//! - Blocks reference callee blocks through `Rc` handles — safe because
//!   definition-time cycle detection keeps the reference graph acyclic.
//! - A failed constant-fold leaves the block as a failure literal: the
//!   error is cached and further appends are refused.

use crate::error::{ErrorKind, ReckonError, ReckonResult};
use crate::value::Value;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// -----------------------------------------------------------------------------
// NATIVE FUNCTION TYPE
// -----------------------------------------------------------------------------

/// Signature for builtin operators, functions, and constants.
///
/// Receives exactly `arity` values. Arithmetic never fails — out-of-domain
/// results surface as infinity sentinels or NaN — but the contract allows
/// an error so a failing fold can poison its block.
pub type NativeFn = fn(&[Value]) -> ReckonResult<Value>;

/// Shared handle to a code block. Cheap to clone; identity (`Rc::ptr_eq`)
/// is the identity of the block.
pub type CodeRef = Rc<RefCell<CodeBlock>>;

// -----------------------------------------------------------------------------
// INSTRUCTION SET
// -----------------------------------------------------------------------------

/// A single stack-machine instruction.
///
/// Call instructions store the callee's arity so a block can be verified
/// without consulting the callee.
#[derive(Clone)]
pub enum Instruction {
    /// Push a clone of the constant at the given pool index.
    LoadConst(u16),
    /// Push a clone of the caller-supplied argument at the given index.
    LoadArg(u16),
    /// Run another block over the top `arity` values.
    CallCode(CodeRef, u8),
    /// Apply a builtin over the top `arity` values.
    CallFunc(NativeFn, u8),
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadConst(idx) => write!(f, "LoadConst({})", idx),
            Instruction::LoadArg(idx) => write!(f, "LoadArg({})", idx),
            Instruction::CallCode(_, arity) => write!(f, "CallCode(<block>, {})", arity),
            Instruction::CallFunc(_, arity) => write!(f, "CallFunc(<fn>, {})", arity),
        }
    }
}

// -----------------------------------------------------------------------------
// CODE BLOCK
// -----------------------------------------------------------------------------

/// An instruction buffer with its constant pool, arity, and height.
///
/// States: *empty* → *building* (appends tracked by height) → runnable when
/// the height is exactly 1. A block whose constant fold failed holds the
/// error in its cache and refuses further appends.
pub struct CodeBlock {
    pub(crate) instrs: Vec<Instruction>,
    pub(crate) consts: Vec<Value>,
    /// Number of arguments; `None` until fixed.
    pub(crate) arity: Option<u8>,
    /// Values left on the stack if the block ran now.
    pub(crate) height: usize,
    /// Memoized result for constant blocks, or the fold failure.
    pub(crate) cache: Option<ReckonResult<Value>>,
}

impl CodeBlock {
    /// Creates an empty block with unset arity.
    pub fn new() -> Self {
        Self {
            instrs: Vec::new(),
            consts: Vec::new(),
            arity: None,
            height: 0,
            cache: None,
        }
    }

    /// Creates an empty block taking `arity` arguments.
    pub fn with_arity(arity: u8) -> Self {
        Self {
            arity: Some(arity),
            ..Self::new()
        }
    }

    /// Wraps the block in a shared handle.
    pub fn into_ref(self) -> CodeRef {
        Rc::new(RefCell::new(self))
    }

    /// Current arity, or `None` for a forward declaration.
    #[inline]
    pub fn get_arity(&self) -> Option<u8> {
        self.arity
    }

    /// Virtual stack height after all appended instructions.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of instructions.
    #[inline]
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// `true` when no instructions have been appended.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Number of pooled constants.
    #[inline]
    pub fn const_count(&self) -> usize {
        self.consts.len()
    }

    /// The appended instruction sequence.
    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instrs
    }

    /// The failure a constant fold left behind, if the block is a failure
    /// literal.
    pub fn cached_error(&self) -> Option<ReckonError> {
        match &self.cache {
            Some(Err(err)) => Some(*err),
            _ => None,
        }
    }

    /// Fixes the arity. Only transitions from unset succeed; once set, the
    /// call reports whether `arity` agrees with the stored value. A new
    /// arity that would invalidate an existing `LoadArg` is rejected.
    pub fn set_arity(&mut self, arity: u8) -> bool {
        if let Some(current) = self.arity {
            return current == arity;
        }

        let max_arg = self
            .instrs
            .iter()
            .filter_map(|instr| match instr {
                Instruction::LoadArg(idx) => Some(*idx),
                _ => None,
            })
            .max();
        if let Some(max) = max_arg {
            if max >= arity as u16 {
                return false;
            }
        }

        self.arity = Some(arity);
        true
    }

    /// Clears instructions, pool, and cache. Arity is preserved so the
    /// block keeps its call signature across a reverted definition.
    pub fn reset(&mut self) {
        self.instrs.clear();
        self.consts.clear();
        self.cache = None;
        self.height = 0;
    }

    /// Distinct callee blocks referenced by `CallCode`, in first-occurrence
    /// order.
    pub fn dep_list(&self) -> Vec<CodeRef> {
        let mut deps: Vec<CodeRef> = Vec::new();
        for instr in &self.instrs {
            if let Instruction::CallCode(callee, _) = instr {
                if !deps.iter().any(|d| Rc::ptr_eq(d, callee)) {
                    deps.push(callee.clone());
                }
            }
        }
        deps
    }

    // -------------------------------------------------------------------------
    // APPEND OPERATIONS
    // -------------------------------------------------------------------------

    /// Rejects appends onto a failure literal; drops a stale value cache.
    fn pre_append(&mut self) -> ReckonResult<()> {
        match &self.cache {
            Some(Err(err)) => Err(*err),
            Some(Ok(_)) => {
                self.cache = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Appends a constant load, pooling the value unless an equal one is
    /// already present.
    pub fn load_const(&mut self, value: Value) -> ReckonResult<()> {
        self.pre_append()?;

        let idx = match self.consts.iter().position(|c| *c == value) {
            Some(idx) => idx,
            None => {
                self.consts.push(value);
                self.consts.len() - 1
            }
        };
        self.instrs.push(Instruction::LoadConst(idx as u16));
        self.height += 1;
        Ok(())
    }

    /// Appends an argument load. Fails when the arity is fixed and the
    /// index falls outside it.
    pub fn load_arg(&mut self, idx: u16) -> ReckonResult<()> {
        self.pre_append()?;

        if let Some(arity) = self.arity {
            if idx >= arity as u16 {
                return Err(ErrorKind::MissingArgs.into());
            }
        }
        self.instrs.push(Instruction::LoadArg(idx));
        self.height += 1;
        Ok(())
    }

    /// Appends a call to another block, whose arity must already be known.
    pub fn call_code(&mut self, callee: &CodeRef) -> ReckonResult<()> {
        self.pre_append()?;

        let arity = match callee.borrow().arity {
            Some(arity) => arity,
            None => return Err(ErrorKind::IncompleteCode.into()),
        };
        if self.height < arity as usize {
            return Err(ErrorKind::MissingValues.into());
        }

        self.instrs.push(Instruction::CallCode(callee.clone(), arity));
        self.height = self.height - arity as usize + 1;
        Ok(())
    }

    /// Appends a builtin call over the top `arity` values.
    ///
    /// With `try_eval` set and every consumed instruction a constant load,
    /// the call runs now instead: the constants are popped from the pool
    /// and the result is appended as a new constant — or, if the builtin
    /// fails, the block becomes a failure literal holding that error.
    pub fn call_func(&mut self, arity: u8, func: NativeFn, try_eval: bool) -> ReckonResult<()> {
        self.pre_append()?;

        if self.height < arity as usize {
            return Err(ErrorKind::MissingValues.into());
        }

        let foldable = try_eval
            && self.instrs[self.instrs.len() - arity as usize..]
                .iter()
                .all(|instr| matches!(instr, Instruction::LoadConst(_)));
        if foldable {
            let mut args = vec![Value::ZERO; arity as usize];
            for slot in args.iter_mut().rev() {
                *slot = self.pop_const_load();
            }
            self.height -= arity as usize;

            match func(&args) {
                Ok(result) => return self.load_const(result),
                Err(err) => {
                    self.cache = Some(Err(err));
                    return Ok(());
                }
            }
        }

        self.instrs.push(Instruction::CallFunc(func, arity));
        self.height = self.height - arity as usize + 1;
        Ok(())
    }

    /// Removes a trailing constant load and returns its value, dropping the
    /// pool entry when no other instruction references it. Callers ensure
    /// the last instruction is a `LoadConst`.
    fn pop_const_load(&mut self) -> Value {
        let idx = match self.instrs.pop() {
            Some(Instruction::LoadConst(idx)) => idx as usize,
            _ => unreachable!("pop_const_load on a non-constant instruction"),
        };

        let in_use = self.instrs.iter().any(|instr| {
            matches!(instr, Instruction::LoadConst(other) if *other as usize == idx)
        });
        if !in_use && idx + 1 == self.consts.len() {
            return self.consts.pop().unwrap_or(Value::ZERO);
        }
        self.consts[idx]
    }
}

impl Default for CodeBlock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeBlock")
            .field("instrs", &self.instrs.len())
            .field("consts", &self.consts.len())
            .field("arity", &self.arity)
            .field("height", &self.height)
            .finish()
    }
}
