//! # Tests Module
//!
//! Unit and integration tests for the whole engine: scalar arithmetic and
//! its promotion rules, the operator trees, code block construction and
//! evaluation, shunting-yard parsing with its error codes, namespace
//! definition with forward references and cycle detection, and the
//! document rewriting pass.

#[cfg(test)]
mod tests {
    use crate::builtin::Registry;
    use crate::document::Document;
    use crate::error::{strerror, ErrorKind, ReckonResult};
    use crate::namespace::{Namespace, VarRef};
    use crate::opcode::{CodeBlock, Instruction};
    use crate::ptree::PrefixTree;
    use crate::value::Value;
    use crate::vm;
    use crate::yard::Yard;

    // =========================================================================
    // HELPERS
    // =========================================================================

    /// Defines `text`, panicking on failure.
    fn def(ns: &mut Namespace, text: &str) -> VarRef {
        let (_, result) = ns.define(text);
        match result {
            Ok(var) => var,
            Err(err) => panic!("definition of {:?} failed: {}", text, err),
        }
    }

    /// Defines `text` and expects a failure of the given kind.
    fn def_err(ns: &mut Namespace, text: &str) -> ErrorKind {
        let (_, result) = ns.define(text);
        match result {
            Ok(var) => panic!("definition of {:?} succeeded as '{}'", text, var.name()),
            Err(err) => err.kind,
        }
    }

    /// Defines an anonymous expression and evaluates it.
    fn eval(ns: &mut Namespace, expr: &str) -> Value {
        let var = def(ns, expr);
        match var.value() {
            Ok(value) => value,
            Err(err) => panic!("evaluation of {:?} failed: {}", expr, err),
        }
    }

    fn assert_close(value: Value, expected: f64, tol: f64) {
        let got = value.to_f64();
        assert!(
            (got - expected).abs() < tol,
            "expected {} within {}, got {}",
            expected,
            tol,
            got
        );
    }

    fn ratio(num: i64, den: i64) -> Value {
        Value::ratio(num, den)
    }

    fn int(n: i64) -> Value {
        Value::int(n)
    }

    fn real(x: f64) -> Value {
        Value::real(x)
    }

    // =========================================================================
    // VALUE — CONSTRUCTION AND NORMALIZATION
    // =========================================================================

    #[test]
    fn value_normalizes_by_gcd() {
        assert_eq!(ratio(2, 4), ratio(1, 2));
        assert_eq!(ratio(-2, -4), ratio(1, 2));
        assert_eq!(ratio(3, -6), ratio(-1, 2));
        assert_eq!(ratio(0, 17), int(0));
    }

    #[test]
    fn value_division_by_zero_is_signed_sentinel() {
        assert_eq!(int(1) / int(0), Value::Ratio { num: 1, den: 0 });
        assert_eq!(int(-3) / int(0), Value::Ratio { num: -1, den: 0 });
        assert_eq!(ratio(1, 0).to_f64(), f64::INFINITY);
        assert_eq!(ratio(-1, 0).to_f64(), f64::NEG_INFINITY);
    }

    #[test]
    fn value_promotion_rules() {
        assert!(!(int(1) + int(2)).is_real());
        assert!((int(1) + real(2.0)).is_real());
        assert!((real(1.0) * int(2)).is_real());
        assert!(int(9).sqrt().is_real());
        assert!(ratio(1, 3).sin().is_real());
        assert!(ratio(1, 3).ln().is_real());
    }

    #[test]
    fn value_rational_arithmetic_is_exact() {
        assert_eq!(ratio(1, 3) + ratio(1, 6), ratio(1, 2));
        assert_eq!(ratio(1, 2) - ratio(1, 3), ratio(1, 6));
        assert_eq!(ratio(2, 3) * ratio(3, 4), ratio(1, 2));
        assert_eq!(ratio(1, 2) / ratio(1, 4), int(2));
        assert_eq!(-int(5), int(-5));
    }

    #[test]
    fn value_floor_division_yields_integers() {
        assert_eq!(int(7).floor_div(int(2)), int(3));
        assert_eq!(int(-7).floor_div(int(2)), int(-4));
        assert_eq!(ratio(7, 2).floor_div(ratio(1, 3)), int(10));
        let from_reals = real(7.5).floor_div(real(2.0));
        assert_eq!(from_reals, int(3));
    }

    #[test]
    fn value_rational_modulo_takes_divisor_sign() {
        assert_eq!(int(7) % int(3), int(1));
        assert_eq!(int(-7) % int(3), int(2));
        assert_eq!(int(7) % int(-3), int(-2));
        assert_eq!(ratio(7, 2) % int(1), ratio(1, 2));
    }

    #[test]
    fn value_real_modulo_keeps_fmod_semantics() {
        let r = real(-7.0) % real(3.0);
        assert_close(r, -1.0, 1e-12);
        assert!(r.is_real());
    }

    #[test]
    fn value_integer_powers_stay_rational() {
        assert_eq!(int(2).pow(int(10)), int(1024));
        assert_eq!(int(2).pow(int(-2)), ratio(1, 4));
        assert_eq!(ratio(2, 3).pow(int(3)), ratio(8, 27));
        assert_eq!(int(0).pow(int(0)), int(1));
        assert_eq!(int(0).pow(int(-1)), Value::Ratio { num: 1, den: 0 });
    }

    #[test]
    fn value_fractional_powers_demote_to_real() {
        let v = int(2).pow(ratio(1, 2));
        assert!(v.is_real());
        assert_close(v, std::f64::consts::SQRT_2, 1e-12);
    }

    #[test]
    fn value_named_operations() {
        assert_eq!(int(-3).abs(), int(3));
        assert_eq!(real(2.7).floor(), int(2));
        assert_eq!(ratio(5, 2).floor(), int(2));
        assert_eq!(ratio(5, 2).ceil(), int(3));
        assert_eq!(ratio(-5, 2).floor(), int(-3));
        assert_eq!(int(9).sqrt(), real(3.0));
        assert_close(int(8).log(int(2)), 3.0, 1e-9);
        assert_close(real(std::f64::consts::E).ln(), 1.0, 1e-12);
        assert_close(int(0).sin(), 0.0, 1e-12);
        assert_close(int(0).cos(), 1.0, 1e-12);
    }

    #[test]
    fn value_infinity_propagation() {
        let inf = int(1) / int(0);
        assert_eq!(inf + int(5), Value::Ratio { num: 1, den: 0 });
        assert_eq!(inf * int(-2), Value::Ratio { num: -1, den: 0 });
        assert_eq!(inf.pow(int(2)), Value::Ratio { num: 1, den: 0 });
        assert_eq!((-inf).pow(int(3)), Value::Ratio { num: -1, den: 0 });
        // A reciprocal of infinity collapses to zero.
        assert_eq!(inf.pow(int(-1)), int(0));
        // Modulo with an infinite or zero divisor goes through fmod.
        assert_eq!(int(5) % inf, real(5.0));
        let nan = int(5) % int(0);
        assert!(nan.is_real() && nan.to_f64().is_nan());
    }

    // =========================================================================
    // VALUE — PARSING AND PRINTING
    // =========================================================================

    #[test]
    fn value_parse_prefers_longer_match() {
        assert_eq!(Value::parse("42"), Some((int(42), 2)));
        assert_eq!(Value::parse("3.14"), Some((real(3.14), 4)));
        // "3.0" matches longer as a real than as the integer "3".
        assert_eq!(Value::parse("3.0"), Some((real(3.0), 3)));
        assert_eq!(Value::parse("1e3"), Some((real(1000.0), 3)));
        assert_eq!(Value::parse(".5"), Some((real(0.5), 2)));
        assert_eq!(Value::parse("-7"), Some((int(-7), 2)));
    }

    #[test]
    fn value_parse_stops_at_incomplete_suffixes() {
        // A bare exponent marker is not part of the literal.
        assert_eq!(Value::parse("5e"), Some((int(5), 1)));
        // A dot without digits stays unconsumed.
        assert_eq!(Value::parse("3."), Some((int(3), 1)));
        assert_eq!(Value::parse("abc"), None);
        assert_eq!(Value::parse("+"), None);
    }

    #[test]
    fn value_printing() {
        assert_eq!(int(5).to_string(), "5");
        assert_eq!(ratio(1, 2).to_string(), "1 / 2");
        assert_eq!(ratio(-1, 2).to_string(), "-1 / 2");
        assert_eq!((int(1) / int(0)).to_string(), "1 / 0");
        assert_eq!(real(2.5).to_string(), "2.5");
        assert_eq!(real(1000.0).to_string(), "1000.0");
    }

    #[test]
    fn value_print_parse_round_trip() {
        let literals = ["42", "-17", "3.14", "3.0", "0.5", "1e3", "123456789", "2.5e-3"];
        for lit in literals {
            let (value, len) = Value::parse(lit).expect("literal should parse");
            assert_eq!(len, lit.len());
            let printed = value.to_string();
            let (reparsed, len) = Value::parse(&printed).expect("printed form should parse");
            assert_eq!(len, printed.len(), "partial re-parse of {:?}", printed);
            assert_eq!(reparsed, value, "round trip of {:?} via {:?}", lit, printed);
        }
    }

    #[test]
    fn value_algebraic_laws() {
        let samples = [ratio(1, 3), ratio(-7, 2), int(4), ratio(22, 7)];
        for a in samples {
            for b in samples {
                assert_eq!(a + b, b + a);
                assert_eq!(a * b, b * a);
                for c in samples {
                    assert_eq!((a + b) + c, a + (b + c));
                    assert_eq!(a * (b + c), a * b + a * c);
                }
            }
            assert_eq!(a - a, int(0));
        }
    }

    // =========================================================================
    // PREFIX TREE
    // =========================================================================

    #[test]
    fn ptree_longest_match_wins() {
        let mut tree = PrefixTree::new();
        tree.insert("/", 1);
        tree.insert("//", 2);
        assert_eq!(tree.longest_match("//x"), Some((&2, 2)));
        assert_eq!(tree.longest_match("/x"), Some((&1, 1)));
        assert_eq!(tree.longest_match("x"), None);
        assert_eq!(tree.longest_match(""), None);
    }

    #[test]
    fn ptree_prefix_without_payload_is_no_match() {
        let mut tree = PrefixTree::new();
        tree.insert("ab", 1);
        tree.insert("abc", 2);
        assert_eq!(tree.longest_match("abcd"), Some((&2, 3)));
        assert_eq!(tree.longest_match("abx"), Some((&1, 2)));
        assert_eq!(tree.longest_match("a"), None);
    }

    #[test]
    fn registry_separates_prefix_and_infix() {
        let registry = Registry::new();

        let (neg, len) = registry.match_oper("-", true).expect("prefix minus");
        assert_eq!((neg.prec, neg.unary, len), (100, true, 1));

        let (sub, len) = registry.match_oper("-", false).expect("infix minus");
        assert_eq!((sub.prec, sub.unary, len), (64, false, 1));

        let (flrdiv, len) = registry.match_oper("//", false).expect("floor division");
        assert_eq!((flrdiv.prec, len), (96, 2));

        let (pow, _) = registry.match_oper("^", false).expect("power");
        assert_eq!((pow.prec, pow.left_assoc), (112, false));

        assert!(registry.match_oper("=", false).is_none());
        assert!(registry.match_oper("+", true).is_none());
    }

    // =========================================================================
    // CODE BLOCK
    // =========================================================================

    fn fn_add(args: &[Value]) -> ReckonResult<Value> {
        Ok(args[0] + args[1])
    }

    fn fn_first(args: &[Value]) -> ReckonResult<Value> {
        Ok(args[0])
    }

    fn fn_fail(_args: &[Value]) -> ReckonResult<Value> {
        Err(ErrorKind::MissingArgs.into())
    }

    #[test]
    fn block_pools_equal_constants_once() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(2)).unwrap();
        code.load_const(int(2)).unwrap();
        assert_eq!(code.len(), 2);
        assert_eq!(code.const_count(), 1);
        assert_eq!(code.height(), 2);
        // The exact rational 2 and the real 2.0 are distinct pool entries.
        code.load_const(real(2.0)).unwrap();
        assert_eq!(code.const_count(), 2);
    }

    #[test]
    fn block_tracks_height_through_calls() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(2)).unwrap();
        code.load_const(int(3)).unwrap();
        code.call_func(2, fn_add, false).unwrap();
        assert_eq!(code.height(), 1);
        assert_eq!(vm::eval(&code.into_ref(), &[]).unwrap(), int(5));
    }

    #[test]
    fn block_try_eval_folds_constants() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(2)).unwrap();
        code.load_const(int(3)).unwrap();
        code.call_func(2, fn_add, true).unwrap();
        // The call happened at append time; only one constant load remains.
        assert_eq!(code.len(), 1);
        assert_eq!(code.const_count(), 1);
        assert_eq!(code.height(), 1);
        assert_eq!(vm::eval(&code.into_ref(), &[]).unwrap(), int(5));
    }

    #[test]
    fn block_try_eval_pops_pool_entries() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(2)).unwrap();
        code.load_const(int(2)).unwrap();
        code.call_func(2, fn_add, true).unwrap();
        assert_eq!(code.const_count(), 1);
        assert_eq!(vm::eval(&code.into_ref(), &[]).unwrap(), int(4));
    }

    #[test]
    fn block_try_eval_failure_becomes_failure_literal() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(1)).unwrap();
        code.call_func(1, fn_fail, true).unwrap();
        assert_eq!(code.cached_error().map(|e| e.kind), Some(ErrorKind::MissingArgs));
        // Appends are refused and evaluation reports the cached failure.
        assert!(code.load_const(int(1)).is_err());
        let err = vm::eval(&code.into_ref(), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingArgs);
    }

    #[test]
    fn block_arity_is_set_once() {
        let mut code = CodeBlock::new();
        assert_eq!(code.get_arity(), None);
        assert!(code.set_arity(2));
        assert!(code.set_arity(2));
        assert!(!code.set_arity(3));
        assert_eq!(code.get_arity(), Some(2));
    }

    #[test]
    fn block_arity_respects_existing_arg_loads() {
        let mut code = CodeBlock::new();
        code.load_arg(1).unwrap();
        assert!(!code.set_arity(1));
        assert!(code.set_arity(2));
    }

    #[test]
    fn block_arg_load_checked_against_arity() {
        let mut code = CodeBlock::with_arity(1);
        code.load_arg(0).unwrap();
        assert!(code.load_arg(1).is_err());
    }

    #[test]
    fn block_call_requires_operands() {
        let mut code = CodeBlock::with_arity(0);
        code.load_const(int(1)).unwrap();
        let err = code.call_func(2, fn_add, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingValues);
    }

    #[test]
    fn block_invalid_height_refuses_to_run() {
        let code = CodeBlock::with_arity(0);
        let err = vm::eval(&code.into_ref(), &[]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompleteCode);
    }

    #[test]
    fn block_dep_list_in_first_occurrence_order() {
        let b = CodeBlock::with_arity(0).into_ref();
        let c = CodeBlock::with_arity(0).into_ref();
        let mut code = CodeBlock::with_arity(0);
        code.call_code(&b).unwrap();
        code.call_code(&c).unwrap();
        code.call_code(&b).unwrap();
        let deps = code.dep_list();
        assert_eq!(deps.len(), 2);
        assert!(std::rc::Rc::ptr_eq(&deps[0], &b));
        assert!(std::rc::Rc::ptr_eq(&deps[1], &c));
    }

    #[test]
    fn block_reset_keeps_arity() {
        let mut code = CodeBlock::with_arity(2);
        code.load_arg(0).unwrap();
        code.reset();
        assert_eq!(code.get_arity(), Some(2));
        assert_eq!(code.height(), 0);
        assert!(code.is_empty());
    }

    #[test]
    fn block_constant_blocks_memoize() {
        let code = {
            let mut block = CodeBlock::with_arity(0);
            block.load_const(int(21)).unwrap();
            block.load_const(int(21)).unwrap();
            block.call_func(2, fn_add, false).unwrap();
            block.into_ref()
        };
        assert_eq!(vm::eval(&code, &[]).unwrap(), int(42));
        assert!(code.borrow().cached_error().is_none());
        // A second evaluation serves the cache.
        assert_eq!(vm::eval(&code, &[]).unwrap(), int(42));
    }

    #[test]
    fn block_argument_passing() {
        // f(a, b) = a + b, called as f(40, 2).
        let callee = {
            let mut block = CodeBlock::with_arity(2);
            block.load_arg(0).unwrap();
            block.load_arg(1).unwrap();
            block.call_func(2, fn_add, false).unwrap();
            block.into_ref()
        };
        let mut outer = CodeBlock::with_arity(0);
        outer.load_const(int(40)).unwrap();
        outer.load_const(int(2)).unwrap();
        outer.call_code(&callee).unwrap();
        assert_eq!(vm::eval(&outer.into_ref(), &[]).unwrap(), int(42));
    }

    #[test]
    fn recomputed_height_matches_tracked_height() {
        let mut ns = Namespace::new(false);
        def(&mut ns, "a: 1 + 2 * 3");
        def(&mut ns, "f(x, y): x^2 - y / (x + 1)");
        def(&mut ns, "b: f(a, 4) % 5");
        for name in ["a", "f", "b"] {
            let var = ns.get(name).expect("defined above");
            let block = var.code().borrow();
            let mut height: i64 = 0;
            for instr in block.instructions() {
                match instr {
                    Instruction::LoadConst(_) | Instruction::LoadArg(_) => height += 1,
                    Instruction::CallCode(_, arity) | Instruction::CallFunc(_, arity) => {
                        height -= *arity as i64 - 1
                    }
                }
            }
            assert_eq!(height, 1, "recomputed height of '{}'", name);
            assert_eq!(block.height(), 1);
        }
    }

    // =========================================================================
    // YARD
    // =========================================================================

    #[test]
    fn yard_rejects_low_precedence_unary() {
        let mut code = CodeBlock::with_arity(0);
        let mut yard = Yard::new(&mut code, false);
        yard.load_const(int(1)).unwrap();
        yard.put_binary(fn_add, 110, true).unwrap();
        let err = yard.put_unary(fn_first, 100).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LowPrecUnary);
    }

    #[test]
    fn yard_allows_unary_after_right_associative_binary() {
        let mut code = CodeBlock::with_arity(0);
        let mut yard = Yard::new(&mut code, false);
        yard.load_const(int(1)).unwrap();
        yard.put_binary(fn_add, 110, false).unwrap();
        yard.put_unary(fn_first, 100).unwrap();
        yard.load_const(int(2)).unwrap();
        yard.clear().unwrap();
        assert_eq!(code.height(), 1);
    }

    #[test]
    fn yard_comma_needs_enclosing_function() {
        let mut ns = Namespace::new(true);
        assert_eq!(def_err(&mut ns, "(1, 2)"), ErrorKind::BadComma);
        assert_eq!(def_err(&mut ns, "1, 2"), ErrorKind::BadComma);
    }

    // =========================================================================
    // PARSER — EXPRESSIONS AND ERRORS
    // =========================================================================

    #[test]
    fn parser_precedence_and_associativity() {
        let mut ns = Namespace::new(true);
        assert_eq!(eval(&mut ns, "2 + 3 * 4"), int(14));
        assert_eq!(eval(&mut ns, "2 * 3 ^ 2"), int(18));
        assert_eq!(eval(&mut ns, "2 ^ 3 ^ 2"), int(512));
        assert_eq!(eval(&mut ns, "10 - 4 - 3"), int(3));
        assert_eq!(eval(&mut ns, "7 // 2"), int(3));
        assert_eq!(eval(&mut ns, "7 % 3"), int(1));
        assert_eq!(eval(&mut ns, "(2 + 3) * 4"), int(20));
    }

    #[test]
    fn parser_unary_minus() {
        let mut ns = Namespace::new(true);
        assert_eq!(eval(&mut ns, "-3 + 5"), int(2));
        assert_eq!(eval(&mut ns, "--5"), int(5));
        assert_eq!(eval(&mut ns, "2 * -3"), int(-6));
        assert_eq!(eval(&mut ns, "2 ^ -2"), ratio(1, 4));
        // `^` binds tighter than prefix minus.
        assert_eq!(eval(&mut ns, "-2 ^ 2"), int(-4));
        assert_eq!(eval(&mut ns, "(-2) ^ 2"), int(4));
    }

    #[test]
    fn parser_builtins_and_constants() {
        let mut ns = Namespace::new(true);
        assert_close(eval(&mut ns, "pi"), std::f64::consts::PI, 1e-12);
        assert_close(eval(&mut ns, "2 * e"), 2.0 * std::f64::consts::E, 1e-12);
        assert_eq!(eval(&mut ns, "abs(1 - 4)"), int(3));
        assert_eq!(eval(&mut ns, "floor(7 / 2)"), int(3));
        assert_eq!(eval(&mut ns, "ceil(7 / 2)"), int(4));
        assert_close(eval(&mut ns, "sqrt(2)"), std::f64::consts::SQRT_2, 1e-12);
        assert_close(eval(&mut ns, "log(8, 2)"), 3.0, 1e-9);
        assert_close(eval(&mut ns, "sin(pi / 2)"), 1.0, 1e-12);
        assert_close(eval(&mut ns, "tan(0)"), 0.0, 1e-12);
    }

    #[test]
    fn parser_missing_values() {
        let mut ns = Namespace::new(true);
        assert_eq!(def_err(&mut ns, "x + y - + * z\t"), ErrorKind::MissingValues);
    }

    #[test]
    fn parser_missing_operators() {
        let mut ns = Namespace::new(true);
        assert_eq!(def_err(&mut ns, "x * y - (x y)"), ErrorKind::MissingOpers);
        assert_eq!(def_err(&mut ns, "1 2"), ErrorKind::MissingOpers);
    }

    #[test]
    fn parser_parenthesis_mismatch() {
        let mut ns = Namespace::new(true);
        assert_eq!(
            def_err(&mut ns, "((x * y - z) + x * z"),
            ErrorKind::ParenthMismatch
        );
        assert_eq!(
            def_err(&mut ns, "(x * y - z % 6)) / 7.0 "),
            ErrorKind::ParenthMismatch
        );
    }

    #[test]
    fn parser_function_errors() {
        let mut ns = Namespace::new(true);
        assert_eq!(def_err(&mut ns, "sqrt + 1"), ErrorKind::FuncNoCall);
        assert_eq!(def_err(&mut ns, "sqrt - 1"), ErrorKind::FuncNoCall);
        assert_eq!(def_err(&mut ns, "sqrt(2, 3)"), ErrorKind::ArityMismatch);
        assert_eq!(def_err(&mut ns, "log(2)"), ErrorKind::ArityMismatch);
        assert_eq!(def_err(&mut ns, "sqrt()"), ErrorKind::MissingValues);
    }

    #[test]
    fn parser_value_call_is_rejected() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x: 3");
        assert_eq!(def_err(&mut ns, "q: x(1)"), ErrorKind::ArityMismatch);
        assert_eq!(def_err(&mut ns, "pi(1)"), ErrorKind::MissingOpers);
    }

    #[test]
    fn parser_error_carries_position() {
        let mut ns = Namespace::new(true);
        let (_, result) = ns.define("x + y - + * z");
        let err = result.unwrap_err();
        // Parsing gives up at the stray '+'.
        assert_eq!(err.pos, Some(8));
    }

    #[test]
    fn parser_newline_ends_outer_expression() {
        let mut ns = Namespace::new(true);
        let (consumed, result) = ns.define("1 + 2\n3 + 4");
        assert!(result.is_ok());
        assert_eq!(consumed, 5);
        // Inside parentheses a newline is plain whitespace.
        assert_eq!(eval(&mut ns, "(1 +\n 2) * 3"), int(9));
    }

    #[test]
    fn parser_stops_at_unknown_content() {
        let mut ns = Namespace::new(true);
        let (consumed, result) = ns.define("x: 5 = rest");
        assert!(result.is_ok());
        assert_eq!(consumed, 5);
        assert_eq!(ns.get("x").expect("defined").value().unwrap(), int(5));
    }

    #[test]
    fn parser_constant_folding_equivalence() {
        let exprs = [
            "3 * (1 + 2)^2 - sqrt(16)",
            "2.897 * 10^2",
            "1/3 + 1/6",
            "-(4 // 3) + 2 ^ -1",
        ];
        for expr in exprs {
            let mut folding = Namespace::new(true);
            let mut plain = Namespace::new(false);
            let a = eval(&mut folding, expr);
            let b = eval(&mut plain, expr);
            assert_eq!(a, b, "fold equivalence of {:?}", expr);
        }
    }

    #[test]
    fn parser_folding_collapses_to_single_constant() {
        let mut ns = Namespace::new(true);
        let var = def(&mut ns, "q: 2.897 * 10^2");
        let block = var.code().borrow();
        assert_eq!(block.len(), 1);
        assert_eq!(block.const_count(), 1);
    }

    #[test]
    fn parser_pool_dedup_within_expression() {
        let mut ns = Namespace::new(false);
        let var = def(&mut ns, "q: 2 + 2 * 2 - 2 / 2");
        assert_eq!(var.code().borrow().const_count(), 1);
        assert_eq!(var.value().unwrap(), int(5));
    }

    // =========================================================================
    // NAMESPACE — DEFINITIONS
    // =========================================================================

    #[test]
    fn namespace_define_then_lookup() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x: 6 * 7");
        let var = ns.get("x").expect("x should exist");
        assert_eq!(var.name(), "x");
        assert_eq!(var.value().unwrap(), int(42));
    }

    #[test]
    fn namespace_anonymous_definitions_are_unnamed() {
        let mut ns = Namespace::new(true);
        let var = def(&mut ns, "2 + 3");
        assert_eq!(var.name(), "");
        assert_eq!(var.value().unwrap(), int(5));
        assert!(ns.get("").is_none());
    }

    #[test]
    fn namespace_forward_references_resolve() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "y: x + 1");
        let x = ns.get("x").expect("forward reference creates x");
        assert!(!x.is_defined());
        // Filling a forward declaration is not a redefinition...
        def(&mut ns, "x: 41");
        assert_eq!(ns.get("y").unwrap().value().unwrap(), int(42));
        // ...but a second definition is.
        assert_eq!(def_err(&mut ns, "x: 0"), ErrorKind::Redef);
    }

    #[test]
    fn namespace_function_results_are_not_memoized() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "f(x): x * 2");
        // Two call sites with different arguments get different results.
        assert_eq!(eval(&mut ns, "f(3)"), int(6));
        assert_eq!(eval(&mut ns, "f(4)"), int(8));
    }

    #[test]
    fn namespace_define_consumes_multiline_parentheses() {
        let mut ns = Namespace::new(true);
        let text = "w : ( 1 \n+\n 2) / 4";
        let (consumed, result) = ns.define(text);
        assert!(result.is_ok());
        assert_eq!(consumed, text.len());
        assert_eq!(ns.get("w").unwrap().value().unwrap(), ratio(3, 4));
    }

    #[test]
    fn namespace_undefined_variable_fails_to_evaluate() {
        let mut ns = Namespace::new(true);
        let u = ns.put("u");
        let err = u.value().unwrap_err();
        assert_eq!(err.kind, ErrorKind::IncompleteCode);
    }

    #[test]
    fn namespace_function_is_not_a_value() {
        let mut ns = Namespace::new(true);
        let f = def(&mut ns, "f(x): x + 1");
        assert_eq!(f.arity(), Some(1));
        assert_eq!(f.value().unwrap_err().kind, ErrorKind::MissingArgs);
    }

    #[test]
    fn namespace_redefinition_is_rejected() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x: 1");
        assert_eq!(def_err(&mut ns, "x: 2"), ErrorKind::Redef);
        // The original binding survives.
        assert_eq!(ns.get("x").unwrap().value().unwrap(), int(1));
        let mut buf = String::new();
        assert_eq!(ns.format_redef(&mut buf), 1);
        assert_eq!(buf, "x");
    }

    #[test]
    fn namespace_arity_fixed_by_forward_call() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "g: h(1, 2)");
        assert_eq!(ns.get("h").unwrap().arity(), Some(2));
        // A definition with a different argument count is rejected.
        assert_eq!(def_err(&mut ns, "h(q): q"), ErrorKind::ArityMismatch);
        def(&mut ns, "h(q, w): q + w");
        assert_eq!(ns.get("g").unwrap().value().unwrap(), int(3));
    }

    #[test]
    fn namespace_call_arity_checked_against_definition() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "f(a): a + 1");
        assert_eq!(def_err(&mut ns, "q: f(1, 2)"), ErrorKind::ArityMismatch);
    }

    #[test]
    fn namespace_user_function_evaluation() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "f(x): x^3 - sqrt(x)");
        def(&mut ns, "q: f(9)");
        assert_eq!(ns.get("q").unwrap().value().unwrap(), real(726.0));
    }

    #[test]
    fn namespace_variable_print() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x: 1 / 2");
        let mut out = Vec::new();
        ns.get("x").unwrap().print(&mut out).unwrap();
        assert_eq!(out, b"1 / 2");

        let u = ns.put("u");
        out.clear();
        u.print(&mut out).unwrap();
        assert_eq!(out, b"ERR -5");

        let f = def(&mut ns, "f(x): x");
        out.clear();
        f.print(&mut out).unwrap();
        assert_eq!(out, b"ERR -1");
    }

    // =========================================================================
    // NAMESPACE — CYCLE DETECTION
    // =========================================================================

    /// The forward-referenced graph from which three different cycles are
    /// attempted below.
    fn cycle_fixture() -> Namespace {
        let mut ns = Namespace::new(true);
        def(&mut ns, "xruje : yjug*yjug^-_5_*yjug+2");
        def(&mut ns, "__er34:3*xruje + ler*6");
        def(&mut ns, "gt56y : __er34 * yjug*4");
        def(&mut ns, "yjug : 23*9+two+7/6//3.65^7*8");
        def(&mut ns, "__23 : ( 1 \n+\n HEllo) / 34.56");
        def(&mut ns, "HEllo: __er34 + gt56y");
        ns
    }

    fn assert_cycle(ns: &mut Namespace, text: &str, chain: &str) {
        assert_eq!(def_err(ns, text), ErrorKind::CircularDependency);
        let mut buf = String::new();
        let written = ns.format_cycle(&mut buf);
        assert_eq!(buf, chain);
        assert_eq!(written, chain.len());
    }

    #[test]
    fn namespace_direct_self_reference_is_a_cycle() {
        let mut ns = Namespace::new(true);
        assert_cycle(&mut ns, "x: x + 1", "x <- x");
        // The attempted definition is reverted.
        assert!(!ns.get("x").unwrap().is_defined());
    }

    #[test]
    fn namespace_cycle_chain_is_reported() {
        let mut ns = cycle_fixture();
        assert_cycle(
            &mut ns,
            "_5_:23//__23",
            "_5_ <- xruje <- __er34 <- HEllo <- __23 <- _5_",
        );
    }

    #[test]
    fn namespace_short_cycle_chain() {
        let mut ns = cycle_fixture();
        assert_cycle(&mut ns, "ler:__er34-73", "ler <- __er34 <- ler");
    }

    #[test]
    fn namespace_cycle_through_nested_parens() {
        let mut ns = cycle_fixture();
        assert_cycle(
            &mut ns,
            "two:(1+(2*(HEllo%4)+3)/4)//5",
            "two <- yjug <- gt56y <- HEllo <- two",
        );
    }

    #[test]
    fn namespace_rejected_cycle_leaves_state_intact() {
        let mut ns = cycle_fixture();
        assert_cycle(
            &mut ns,
            "_5_:23//__23",
            "_5_ <- xruje <- __er34 <- HEllo <- __23 <- _5_",
        );
        let five = ns.get("_5_").expect("forward declaration survives");
        assert!(!five.is_defined());
        // A harmless definition for the same name is still accepted.
        def(&mut ns, "_5_: 23");
        assert_eq!(ns.get("_5_").unwrap().value().unwrap(), int(23));
    }

    // =========================================================================
    // END-TO-END SCENARIOS
    // =========================================================================

    #[test]
    fn scenario_mixed_arithmetic() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x :  \t-3.67");
        def(&mut ns, "y :1/ (x\n- z)");
        def(&mut ns, "z:1 /5.678- 2");
        let value = eval(&mut ns, "(-x)^-(y+z) * x % y / (z // 0.03)");
        assert_close(value, 0.0069547480181, 1e-5);
    }

    #[test]
    fn scenario_floor_division_chain() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x:5.32 * y");
        def(&mut ns, "foo_bar :y^3 - y^2-23");
        def(&mut ns, "y :  2.897 * 10^2");
        let value = eval(&mut ns, "x *(foo_bar*x//y)//  -0.654");
        assert!(matches!(value, Value::Ratio { den: 1, .. }));
        assert_close(value, -303764747679.0, 1.0);
    }

    #[test]
    fn scenario_mixed_arithmetic_with_rough_whitespace() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "x :  \t-3.67");
        def(&mut ns, "y :1/ (x\n- z)");
        def(&mut ns, "z:1 /5.678- 2");
        let value = eval(&mut ns, "(- \n x) ^-(y\n+z)*   x %\ty \t/ (z// 0.03)");
        assert_close(value, 0.0069547480181, 1e-5);
    }

    #[test]
    fn scenario_builtins_in_dependencies() {
        let mut ns = Namespace::new(true);
        def(&mut ns, "xray:sin(ln(3.45 * pi) - stuff / beta)");
        def(&mut ns, "beta: 2 - abs(2 + stuff )^-2");
        def(&mut ns, "stuff :-4.356 * pi * log(e + 1, e - 1)");
        let value = eval(&mut ns, "xray*beta + beta*stuff -stuff*xray");
        assert_close(value, -61.39002848156, 1e-5);
    }

    // =========================================================================
    // ERROR CODES
    // =========================================================================

    #[test]
    fn error_codes_round_trip() {
        let kinds = [
            ErrorKind::ParenthMismatch,
            ErrorKind::LowPrecUnary,
            ErrorKind::ArityMismatch,
            ErrorKind::BadComma,
            ErrorKind::FuncNoCall,
            ErrorKind::MissingValues,
            ErrorKind::MissingOpers,
            ErrorKind::ExtraContent,
            ErrorKind::Redef,
            ErrorKind::CircularDependency,
            ErrorKind::IncompleteCode,
            ErrorKind::MissingArgs,
            ErrorKind::UnknownInstr,
            ErrorKind::StackSurplus,
            ErrorKind::StackUnderflow,
        ];
        for kind in kinds {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
            assert_eq!(strerror(kind.code()), kind.describe());
        }
        assert_eq!(ErrorKind::CircularDependency.code(), -65);
        assert_eq!(ErrorKind::IncompleteCode.code(), -5);
        assert_eq!(strerror(0), "success");
        assert_eq!(strerror(12345), "unknown error");

        // Codes and descriptions are pairwise distinct.
        for a in kinds {
            for b in kinds {
                if a != b {
                    assert_ne!(a.code(), b.code());
                    assert_ne!(a.describe(), b.describe());
                }
            }
        }
    }

    // =========================================================================
    // DOCUMENT
    // =========================================================================

    #[test]
    fn document_rewrites_print_sections() {
        let src = "# doc\nx: 4 + 1\ny: x * 2 = stale\nsum: x + y = 0 # keep\n";
        let mut ns = Namespace::new(true);
        let (doc, errors) = Document::parse(src, &mut ns);
        assert!(errors.is_empty(), "unexpected: {}", errors[0]);

        let mut out = Vec::new();
        let failures = doc.render(&mut out).unwrap();
        assert_eq!(failures, 0);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "# doc\nx: 4 + 1\ny: x * 2 = 10 \nsum: x + y = 15 # keep\n"
        );
    }

    #[test]
    fn document_reports_line_numbers_and_recovers() {
        let src = "a: 1 +\nb: 2\nc: b@\n";
        let mut ns = Namespace::new(true);
        let (_, errors) = Document::parse(src, &mut ns);
        assert_eq!(errors.len(), 2);
        assert_eq!(
            (errors[0].line, errors[0].error.kind),
            (1, ErrorKind::MissingValues)
        );
        assert_eq!(
            (errors[1].line, errors[1].error.kind),
            (3, ErrorKind::ExtraContent)
        );
        // The healthy line in between still defined.
        assert_eq!(ns.get("b").unwrap().value().unwrap(), int(2));
    }

    #[test]
    fn document_reports_redefinition_detail() {
        let src = "x: 1\nx: 2\n";
        let mut ns = Namespace::new(true);
        let (_, errors) = Document::parse(src, &mut ns);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].line, 2);
        assert_eq!(errors[0].error.kind, ErrorKind::Redef);
        assert_eq!(errors[0].detail.as_deref(), Some("x"));
        assert!(errors[0].to_string().contains("redefinition of \"x\""));
    }

    #[test]
    fn document_forward_references_across_lines() {
        let src = "y: x * x =\nx: 1 + 2\n";
        let mut ns = Namespace::new(true);
        let (doc, errors) = Document::parse(src, &mut ns);
        assert!(errors.is_empty());
        let mut out = Vec::new();
        assert_eq!(doc.render(&mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "y: x * x = 9 \nx: 1 + 2\n");
    }

    #[test]
    fn document_unresolved_forward_reference_prints_error() {
        let src = "y: x + 1 =\n";
        let mut ns = Namespace::new(true);
        let (doc, errors) = Document::parse(src, &mut ns);
        assert!(errors.is_empty());
        let mut out = Vec::new();
        let failures = doc.render(&mut out).unwrap();
        assert_eq!(failures, 1);
        // IncompleteCode surfaces inline as its ABI code.
        assert_eq!(String::from_utf8(out).unwrap(), "y: x + 1 = ERR -5 \n");
    }

    #[test]
    fn document_definition_spanning_lines() {
        let src = "s: (1 +\n 2) = 99\n";
        let mut ns = Namespace::new(true);
        let (doc, errors) = Document::parse(src, &mut ns);
        assert!(errors.is_empty());
        let mut out = Vec::new();
        assert_eq!(doc.render(&mut out).unwrap(), 0);
        assert_eq!(String::from_utf8(out).unwrap(), "s: (1 +\n 2) = 3 \n");
    }

    #[test]
    fn document_without_trailing_newline() {
        let src = "x: 1 =";
        let mut ns = Namespace::new(true);
        let (doc, errors) = Document::parse(src, &mut ns);
        assert!(errors.is_empty());
        let mut out = Vec::new();
        doc.render(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x: 1 = 1 ");
    }
}
