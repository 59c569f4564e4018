//! # Namespace Module
//!
//! Named variables and user functions, with forward references, dependency
//! tracking, and definition-time cycle detection. A variable exists from
//! its first mention: referencing an undefined name during parsing creates
//! an empty entry, and attaching a definition later fills the same block,
//! so every call site stays valid.
//!
//! ## Key Design
//! - Lookup probes an insertion-ordered list by (precomputed 32-bit hash,
//!   length, bytes).
//! - `define` parses an optional `name(arg, ...):` label, then an
//!   expression; cycle detection runs before the block is attached, so a
//!   rejected definition leaves the namespace exactly as it was.
//! - Cycle detection is a breadth-first walk over cached dependency lists;
//!   the reverse spanning tree lives in a transient map and the detected
//!   chain is kept for diagnostics.

use crate::builtin::Registry;
use crate::error::{ErrorKind, ReckonError, ReckonResult};
use crate::opcode::{CodeBlock, CodeRef};
use crate::parser;
use crate::value::Value;
use crate::vm;

use rustc_hash::{FxHashMap, FxHasher};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::hash::Hasher;
use std::io;
use std::rc::Rc;

// -----------------------------------------------------------------------------
// VARIABLE
// -----------------------------------------------------------------------------

/// A named entry: a zero-arity value or a user-defined function.
#[derive(Debug)]
pub struct Variable {
    /// Stable name; empty for anonymous expressions.
    name: String,
    /// Precomputed hash of the name.
    hash: u32,
    /// The implementation block. Shared with every call site.
    code: CodeRef,
    /// Whether a definition has been attached.
    has_impl: Cell<bool>,
    /// Variables this one's block calls, fixed at attach time.
    deps: RefCell<Vec<VarRef>>,
}

/// Shared handle to a variable; `Rc::ptr_eq` is variable identity.
pub type VarRef = Rc<Variable>;

impl Variable {
    fn create(name: &str) -> VarRef {
        Rc::new(Variable {
            name: name.to_string(),
            hash: hash32(name),
            code: CodeBlock::new().into_ref(),
            has_impl: Cell::new(false),
            deps: RefCell::new(Vec::new()),
        })
    }

    /// The variable's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` once a definition has been attached.
    pub fn is_defined(&self) -> bool {
        self.has_impl.get()
    }

    /// Number of arguments, or `None` while only forward-declared.
    pub fn arity(&self) -> Option<u8> {
        self.code.borrow().get_arity()
    }

    /// The implementation block.
    pub(crate) fn code(&self) -> &CodeRef {
        &self.code
    }

    /// Evaluates the variable as a value.
    ///
    /// Only legal for implemented, zero-arity variables: an unimplemented
    /// one reports `IncompleteCode` and a function reports `MissingArgs`.
    /// The block's own cache memoizes the result.
    pub fn value(&self) -> ReckonResult<Value> {
        if !self.has_impl.get() {
            return Err(ErrorKind::IncompleteCode.into());
        }
        if self.code.borrow().get_arity() != Some(0) {
            return Err(ErrorKind::MissingArgs.into());
        }
        vm::eval(&self.code, &[])
    }

    /// Writes the printed value, or `ERR <code>` on failure.
    pub fn print(&self, out: &mut dyn io::Write) -> io::Result<()> {
        match self.value() {
            Ok(value) => write!(out, "{}", value),
            Err(err) => write!(out, "ERR {}", err.kind.code()),
        }
    }
}

fn hash32(name: &str) -> u32 {
    let mut hasher = FxHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish() as u32
}

// -----------------------------------------------------------------------------
// NAMESPACE
// -----------------------------------------------------------------------------

/// Container of variables plus the builtin registry and diagnostics of the
/// last failed insertion.
pub struct Namespace {
    /// Insertion-ordered variables, anonymous entries included.
    vars: Vec<VarRef>,
    registry: Registry,
    /// Fold constant subexpressions while parsing.
    eval_on_parse: bool,
    /// Variable whose redefinition was last refused.
    redef: Option<VarRef>,
    /// Last detected dependency cycle, root first and root again last.
    cycle: Vec<VarRef>,
}

impl Namespace {
    /// Creates an empty namespace. `eval_on_parse` folds all-constant
    /// calls at parse time; results are identical either way.
    pub fn new(eval_on_parse: bool) -> Self {
        Self {
            vars: Vec::new(),
            registry: Registry::new(),
            eval_on_parse,
            redef: None,
            cycle: Vec::new(),
        }
    }

    /// Whether constant folding during parsing is enabled.
    pub fn eval_on_parse(&self) -> bool {
        self.eval_on_parse
    }

    /// The operator registry shared by every parse.
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Looks up a variable by name.
    pub fn get(&self, name: &str) -> Option<VarRef> {
        if name.is_empty() {
            return None;
        }
        let hash = hash32(name);
        self.vars
            .iter()
            .find(|v| v.hash == hash && v.name.len() == name.len() && v.name == name)
            .cloned()
    }

    /// Returns the variable with this name, creating an empty forward
    /// declaration if none exists.
    pub fn put(&mut self, name: &str) -> VarRef {
        match self.get(name) {
            Some(var) => var,
            None => self.place(name),
        }
    }

    /// Unconditionally appends a new variable.
    fn place(&mut self, name: &str) -> VarRef {
        let var = Variable::create(name);
        self.vars.push(var.clone());
        var
    }

    // -------------------------------------------------------------------------
    // DEFINE
    // -------------------------------------------------------------------------

    /// Parses `[name[(arg, ...)]:] expression` and binds it.
    ///
    /// Returns the number of bytes consumed together with the defined
    /// variable or the failure. Without a label the expression becomes an
    /// anonymous variable, unreachable by name but evaluable through the
    /// returned handle.
    pub fn define(&mut self, text: &str) -> (usize, ReckonResult<VarRef>) {
        let label = parse_label(text);
        let (name, params, expr_start): (Option<&str>, &[&str], usize) = match &label {
            Some(lbl) => (Some(lbl.name), lbl.params.as_slice(), lbl.expr_start),
            None => (None, &[], 0),
        };

        let mut scratch = CodeBlock::with_arity(params.len() as u8);
        let consumed = match parser::parse_expr(&text[expr_start..], self, params, &mut scratch) {
            Ok(consumed) => consumed,
            Err(err) => {
                let err = ReckonError {
                    kind: err.kind,
                    pos: err.pos.map(|p| p + expr_start),
                };
                return (err.pos.unwrap_or(expr_start), Err(err));
            }
        };
        let end = expr_start + consumed;

        let name = match name {
            Some(name) => name,
            None => {
                // Anonymous: nothing can reference it, so no cycle check.
                let deps = self.resolve_deps(&scratch);
                let var = self.place("");
                *var.code.borrow_mut() = scratch;
                var.has_impl.set(true);
                *var.deps.borrow_mut() = deps;
                return (end, Ok(var));
            }
        };

        // The label may already exist: defined earlier (redefinition),
        // or created as a forward reference — possibly while parsing this
        // very expression.
        let var = self.put(name);
        if var.has_impl.get() {
            self.redef = Some(var.clone());
            return (end, Err(ErrorKind::Redef.into()));
        }

        let parsed_arity = params.len() as u8;
        if let Some(existing) = var.code.borrow().get_arity() {
            if existing != parsed_arity {
                return (end, Err(ErrorKind::ArityMismatch.into()));
            }
        }

        // Checked before attachment, so a rejected definition leaves the
        // namespace untouched.
        let deps = self.resolve_deps(&scratch);
        if self.find_cycle(&deps, &var) {
            return (end, Err(ErrorKind::CircularDependency.into()));
        }

        // Attach in place: call sites referencing this block stay valid.
        *var.code.borrow_mut() = scratch;
        var.has_impl.set(true);
        *var.deps.borrow_mut() = deps;
        (end, Ok(var))
    }

    /// Maps a block's callee list back to the owning variables.
    fn resolve_deps(&self, block: &CodeBlock) -> Vec<VarRef> {
        block
            .dep_list()
            .into_iter()
            .filter_map(|dep| {
                self.vars
                    .iter()
                    .find(|v| Rc::ptr_eq(&v.code, &dep))
                    .cloned()
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // CYCLE DETECTION
    // -------------------------------------------------------------------------

    /// Breadth-first search from `deps` for a path back to `target`.
    ///
    /// `used_by` records, for each variable first reached, the variable it
    /// was reached through; following it from `target` reconstructs the
    /// offending chain, which is stored for [`Namespace::format_cycle`].
    fn find_cycle(&mut self, deps: &[VarRef], target: &VarRef) -> bool {
        self.cycle.clear();

        let mut used_by: FxHashMap<*const Variable, VarRef> = FxHashMap::default();
        let mut queue: VecDeque<VarRef> = VecDeque::new();
        for dep in deps {
            if !used_by.contains_key(&Rc::as_ptr(dep)) {
                used_by.insert(Rc::as_ptr(dep), target.clone());
                queue.push_back(dep.clone());
            }
        }

        while let Some(var) = queue.pop_front() {
            if Rc::ptr_eq(&var, target) {
                let mut chain = vec![target.clone()];
                let mut cursor = used_by[&Rc::as_ptr(target)].clone();
                while !Rc::ptr_eq(&cursor, target) {
                    let next = used_by[&Rc::as_ptr(&cursor)].clone();
                    chain.push(cursor);
                    cursor = next;
                }
                chain.push(target.clone());
                self.cycle = chain;
                return true;
            }

            for dep in var.deps.borrow().iter() {
                if !used_by.contains_key(&Rc::as_ptr(dep)) {
                    used_by.insert(Rc::as_ptr(dep), var.clone());
                    queue.push_back(dep.clone());
                }
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // DIAGNOSTICS
    // -------------------------------------------------------------------------

    /// Appends the last detected cycle as `root <- ... <- root`.
    /// Returns the number of bytes written.
    pub fn format_cycle(&self, buf: &mut String) -> usize {
        let start = buf.len();
        for (i, var) in self.cycle.iter().enumerate() {
            if i > 0 {
                buf.push_str(" <- ");
            }
            buf.push_str(var.name());
        }
        buf.len() - start
    }

    /// Appends the name whose redefinition was last refused.
    /// Returns the number of bytes written.
    pub fn format_redef(&self, buf: &mut String) -> usize {
        let start = buf.len();
        if let Some(var) = &self.redef {
            buf.push_str(var.name());
        }
        buf.len() - start
    }
}

// -----------------------------------------------------------------------------
// LABEL PARSING
// -----------------------------------------------------------------------------

/// A recognized `name[(arg, ...)]:` prefix.
struct Label<'s> {
    name: &'s str,
    params: Vec<&'s str>,
    /// Offset just past the colon.
    expr_start: usize,
}

#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn skip_blank(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_blank(bytes[pos]) {
        pos += 1;
    }
    pos
}

fn scan_word(bytes: &[u8], pos: usize) -> usize {
    if pos >= bytes.len() || !(bytes[pos].is_ascii_alphabetic() || bytes[pos] == b'_') {
        return pos;
    }
    let mut end = pos + 1;
    while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
        end += 1;
    }
    end
}

/// Tries to read a definition label. Anything that does not end in a colon
/// is not a label and the whole text is an anonymous expression.
fn parse_label(text: &str) -> Option<Label<'_>> {
    let bytes = text.as_bytes();

    let name_start = skip_blank(bytes, 0);
    let name_end = scan_word(bytes, name_start);
    if name_end == name_start {
        return None;
    }
    let name = &text[name_start..name_end];

    let mut params = Vec::new();
    let mut pos = skip_blank(bytes, name_end);

    if pos < bytes.len() && bytes[pos] == b'(' {
        pos += 1;
        loop {
            pos = skip_blank(bytes, pos);
            if pos < bytes.len() && bytes[pos] == b')' && params.is_empty() {
                pos += 1;
                break;
            }
            let end = scan_word(bytes, pos);
            if end == pos {
                return None;
            }
            params.push(&text[pos..end]);
            pos = skip_blank(bytes, end);
            match bytes.get(pos) {
                Some(b',') => pos += 1,
                Some(b')') => {
                    pos += 1;
                    break;
                }
                _ => return None,
            }
        }
        pos = skip_blank(bytes, pos);
    }

    if pos < bytes.len() && bytes[pos] == b':' {
        Some(Label {
            name,
            params,
            expr_start: pos + 1,
        })
    } else {
        None
    }
}
