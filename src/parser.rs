//! # Parser Module
//!
//! Tokenizer and driver for a single expression. Each token becomes one
//! yard operation; the yard emits instructions into the target block as it
//! goes, so there is no token vector and no syntax tree. Parsing consumes
//! as much of the input as it can and reports the byte offset at which it
//! stopped — on success so callers can resume after the expression, on
//! failure so they can point at the offending token.
//!
//! Token order per iteration: grouping characters, symbolic operators
//! (prefix or infix tree chosen by position), numeric literals, then words
//! (argument, builtin, or variable).

use crate::error::{ErrorKind, ReckonResult};
use crate::namespace::Namespace;
use crate::opcode::CodeBlock;
use crate::value::Value;
use crate::yard::Yard;

// -----------------------------------------------------------------------------
// CHARACTER CLASSES
// -----------------------------------------------------------------------------

#[inline]
fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

#[inline]
fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Blank characters never end an expression.
#[inline]
fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// Inside parentheses every whitespace character is skippable, newlines
/// and vertical whitespace included.
#[inline]
fn is_any_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

/// Skips whitespace according to the current parenthesis depth. At depth
/// zero a newline is left in place — it ends the expression.
fn skip_space(bytes: &[u8], mut pos: usize, depth: usize) -> usize {
    while pos < bytes.len() {
        let b = bytes[pos];
        let skip = if depth > 0 { is_any_space(b) } else { is_blank(b) };
        if !skip {
            break;
        }
        pos += 1;
    }
    pos
}

// -----------------------------------------------------------------------------
// EXPRESSION PARSING
// -----------------------------------------------------------------------------

/// Parses one expression from the start of `src` into `code`.
///
/// `params` are the argument names of the definition under construction;
/// they shadow builtins and variables. Variables referenced before any
/// definition are created in the namespace on the spot, which is what lets
/// the dependency graph observe forward references immediately.
///
/// Returns the number of bytes consumed.
pub fn parse_expr(
    src: &str,
    ns: &mut Namespace,
    params: &[&str],
    code: &mut CodeBlock,
) -> ReckonResult<usize> {
    let bytes = src.as_bytes();
    let try_eval = ns.eval_on_parse();
    let mut yard = Yard::new(code, try_eval);
    let mut depth: usize = 0;
    let mut pos = 0;

    while pos < bytes.len() {
        pos = skip_space(bytes, pos, depth);
        if pos >= bytes.len() {
            break;
        }
        let tok = pos;
        let b = bytes[pos];

        // Newline terminates the outer expression.
        if depth == 0 && b == b'\n' {
            break;
        }

        // -- Grouping --
        if b == b'(' {
            pos += 1;
            depth += 1;
            yard.open_parenth().map_err(|e| e.or_at(tok))?;
            continue;
        }
        if b == b',' {
            if depth == 0 {
                return Err(ErrorKind::BadComma.at(tok));
            }
            pos += 1;
            yard.put_comma().map_err(|e| e.or_at(tok))?;
            continue;
        }
        if b == b')' {
            pos += 1;
            depth = depth.saturating_sub(1);
            yard.close_parenth().map_err(|e| e.or_at(tok))?;
            continue;
        }

        // -- Symbolic operator: tree chosen by position --
        let want_unary = !yard.was_last_value();
        if let Some((info, len)) = ns.registry().match_oper(&src[pos..], want_unary) {
            if info.unary {
                yard.put_unary(info.func, info.prec)
            } else {
                yard.put_binary(info.func, info.prec, info.left_assoc)
            }
            .map_err(|e| e.or_at(tok))?;
            pos += len;
            continue;
        }

        // -- Numeric literal --
        if let Some((value, len)) = Value::parse(&src[pos..]) {
            yard.load_const(value).map_err(|e| e.or_at(tok))?;
            pos += len;
            continue;
        }

        // -- Word: argument, builtin, or variable --
        if is_word_start(b) {
            let mut end = pos + 1;
            while end < bytes.len() && is_word_char(bytes[end]) {
                end += 1;
            }
            let word = &src[pos..end];

            if let Some(idx) = params.iter().position(|p| *p == word) {
                yard.load_arg(idx as u16).map_err(|e| e.or_at(tok))?;
                pos = end;
                continue;
            }

            if let Some(info) = crate::builtin::lookup_named(word) {
                if info.arity == 0 {
                    // Constants load their evaluated value directly.
                    let value = (info.func)(&[]).map_err(|e| e.or_at(tok))?;
                    yard.load_const(value).map_err(|e| e.or_at(tok))?;
                } else {
                    yard.func_call(info.arity, info.func).map_err(|e| e.or_at(tok))?;
                }
                pos = end;
                continue;
            }

            // Variable reference; created now if unseen. A following `(`
            // makes it a user function call.
            let var = ns.put(word);
            let ahead = skip_space(bytes, end, depth);
            let called = ahead < bytes.len() && bytes[ahead] == b'(';
            if called {
                yard.code_call(var.code()).map_err(|e| e.or_at(tok))?;
            } else {
                yard.load_var(var.code()).map_err(|e| e.or_at(tok))?;
            }
            pos = end;
            continue;
        }

        // Unrecognized token: stop parsing here.
        break;
    }

    yard.clear().map_err(|e| e.or_at(pos))?;

    // A block that already failed its constant fold is a complete failure
    // literal; its height no longer matters.
    if code.cached_error().is_some() {
        return Ok(pos);
    }
    match code.height() {
        1 => Ok(pos),
        0 => Err(ErrorKind::MissingValues.at(pos)),
        _ => Err(ErrorKind::MissingOpers.at(pos)),
    }
}
