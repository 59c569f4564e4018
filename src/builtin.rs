//! # Builtin Module
//!
//! The fixed vocabulary of the expression language: symbolic operators
//! with precedence and associativity, and alphanumeric builtins (functions
//! and constants). The registry builds both operator prefix-trees up front
//! — prefix and infix live in separate trees so `-` resolves to negation
//! before a value and subtraction after one.

use crate::error::ReckonResult;
use crate::opcode::NativeFn;
use crate::ptree::PrefixTree;
use crate::value::Value;

use std::f64::consts;

// -----------------------------------------------------------------------------
// OPERATOR TABLE
// -----------------------------------------------------------------------------

/// A symbolic operator.
pub struct OperInfo {
    /// Token as written in source.
    pub symbol: &'static str,
    /// Binding strength, 0..=127.
    pub prec: u8,
    pub left_assoc: bool,
    /// Prefix rather than infix.
    pub unary: bool,
    pub func: NativeFn,
}

/// Every recognized operator. Prefix minus binds tighter than any infix
/// operator except `^`, so `-x^2` reads as `(-x)^2`.
pub static OPERATORS: &[OperInfo] = &[
    OperInfo { symbol: "-", prec: 100, left_assoc: true, unary: true, func: oper_neg },
    OperInfo { symbol: "+", prec: 64, left_assoc: true, unary: false, func: oper_add },
    OperInfo { symbol: "-", prec: 64, left_assoc: true, unary: false, func: oper_sub },
    OperInfo { symbol: "*", prec: 96, left_assoc: true, unary: false, func: oper_mul },
    OperInfo { symbol: "/", prec: 96, left_assoc: true, unary: false, func: oper_div },
    OperInfo { symbol: "//", prec: 96, left_assoc: true, unary: false, func: oper_flrdiv },
    OperInfo { symbol: "%", prec: 96, left_assoc: true, unary: false, func: oper_mod },
    OperInfo { symbol: "^", prec: 112, left_assoc: false, unary: false, func: oper_pow },
];

// -----------------------------------------------------------------------------
// NAMED BUILTIN TABLE
// -----------------------------------------------------------------------------

/// An alphanumeric builtin; arity 0 marks a constant.
pub struct NamedInfo {
    pub name: &'static str,
    pub arity: u8,
    pub func: NativeFn,
}

/// Named functions and constants.
pub static NAMED: &[NamedInfo] = &[
    NamedInfo { name: "abs", arity: 1, func: named_abs },
    NamedInfo { name: "floor", arity: 1, func: named_floor },
    NamedInfo { name: "ceil", arity: 1, func: named_ceil },
    NamedInfo { name: "sqrt", arity: 1, func: named_sqrt },
    NamedInfo { name: "log", arity: 2, func: named_log },
    NamedInfo { name: "ln", arity: 1, func: named_ln },
    NamedInfo { name: "sin", arity: 1, func: named_sin },
    NamedInfo { name: "cos", arity: 1, func: named_cos },
    NamedInfo { name: "tan", arity: 1, func: named_tan },
    NamedInfo { name: "pi", arity: 0, func: named_pi },
    NamedInfo { name: "e", arity: 0, func: named_e },
];

/// Finds a named builtin by exact name.
pub fn lookup_named(name: &str) -> Option<&'static NamedInfo> {
    NAMED.iter().find(|info| info.name == name)
}

// -----------------------------------------------------------------------------
// REGISTRY — Operator Trees
// -----------------------------------------------------------------------------

/// Operator lookup tables, built once from the static registry.
pub struct Registry {
    prefix: PrefixTree<&'static OperInfo>,
    infix: PrefixTree<&'static OperInfo>,
}

impl Registry {
    /// Builds both operator trees.
    pub fn new() -> Self {
        let mut prefix = PrefixTree::new();
        let mut infix = PrefixTree::new();
        for info in OPERATORS {
            if info.unary {
                prefix.insert(info.symbol, info);
            } else {
                infix.insert(info.symbol, info);
            }
        }
        Self { prefix, infix }
    }

    /// Longest operator match at the start of `input`, against the prefix
    /// or infix tree depending on position.
    pub fn match_oper(&self, input: &str, unary: bool) -> Option<(&'static OperInfo, usize)> {
        let tree = if unary { &self.prefix } else { &self.infix };
        tree.longest_match(input).map(|(info, len)| (*info, len))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// -----------------------------------------------------------------------------
// OPERATOR IMPLEMENTATIONS
// -----------------------------------------------------------------------------

fn oper_neg(args: &[Value]) -> ReckonResult<Value> {
    Ok(-args[0])
}

fn oper_add(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0] + args[1])
}

fn oper_sub(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0] - args[1])
}

fn oper_mul(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0] * args[1])
}

fn oper_div(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0] / args[1])
}

fn oper_flrdiv(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].floor_div(args[1]))
}

fn oper_mod(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0] % args[1])
}

fn oper_pow(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].pow(args[1]))
}

// -----------------------------------------------------------------------------
// NAMED IMPLEMENTATIONS
// -----------------------------------------------------------------------------

fn named_abs(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].abs())
}

fn named_floor(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].floor())
}

fn named_ceil(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].ceil())
}

fn named_sqrt(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].sqrt())
}

fn named_log(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].log(args[1]))
}

fn named_ln(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].ln())
}

fn named_sin(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].sin())
}

fn named_cos(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].cos())
}

fn named_tan(args: &[Value]) -> ReckonResult<Value> {
    Ok(args[0].tan())
}

fn named_pi(_args: &[Value]) -> ReckonResult<Value> {
    Ok(Value::real(consts::PI))
}

fn named_e(_args: &[Value]) -> ReckonResult<Value> {
    Ok(Value::real(consts::E))
}
