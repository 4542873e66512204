//! Property-based tests for the Mug front end
//!
//! These tests use proptest to verify invariants across many randomly
//! generated inputs, catching edge cases that hand-written tests might miss.

use mugc::ast::{BinaryOp, Expr, Literal, Statement};
use mugc::frontend::lexer::{self, Lexer, TokenKind};
use mugc::frontend::parser;
use proptest::prelude::*;

fn keyword_free_ident() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,8}".prop_filter("Not a keyword or boolean", |s| {
        lexer::keyword_kind(s).is_none() && s != "true" && s != "false" && s != "_"
    })
}

/// The single expression returned by `func f() { return <source>; }`.
fn returned(source: &str) -> Expr {
    let unit = parser::parse_source(&format!("func f() {{ return {}; }}", source), "prop").expect("parse failed");
    let mugc::ast::Member::Function(decl) = &unit.members[0].node else {
        panic!("expected a function");
    };
    match &decl.body.as_ref().expect("body")[0].node {
        Statement::Return(Some(value)) => value.node.clone(),
        other => panic!("expected a return, got {:?}", other),
    }
}

// =============================================================================
// Lexer Properties
// =============================================================================

proptest! {
    /// Property: digit runs lex as one integer constant carrying the digits
    #[test]
    fn digit_runs_are_integers(n in 0u64..1_000_000_000_000) {
        let tokens = lexer::lex(&n.to_string()).expect("lex failed");
        prop_assert_eq!(tokens.len(), 2);
        prop_assert_eq!(tokens[0].kind, TokenKind::ConstantDigit);
        prop_assert_eq!(&tokens[0].value, &n.to_string());
        prop_assert_eq!(tokens[1].kind, TokenKind::Eof);
    }

    /// Property: a fractional part or an `f` suffix makes the constant a float
    #[test]
    fn fractions_and_suffixes_are_floats(whole in 0u32..100_000, frac in 0u32..100_000, suffix in any::<bool>()) {
        let source = if suffix { format!("{}f", whole) } else { format!("{}.{}", whole, frac) };
        let tokens = lexer::lex(&source).expect("lex failed");
        prop_assert_eq!(tokens[0].kind, TokenKind::ConstantFloatDigit);
        prop_assert_eq!(tokens.len(), 2);
    }

    /// Property: `a..b` between integers is a range, never a float
    #[test]
    fn integer_ranges_stay_integers(a in 0u32..1000, b in 0u32..1000) {
        let tokens = lexer::lex(&format!("{}..{}", a, b)).expect("lex failed");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        prop_assert_eq!(
            kinds,
            vec![TokenKind::ConstantDigit, TokenKind::RangeDots, TokenKind::ConstantDigit, TokenKind::Eof]
        );
    }

    /// Property: resetting a lexer reproduces the same token stream
    #[test]
    fn reset_is_deterministic(idents in prop::collection::vec(keyword_free_ident(), 1..8), n in 0i32..1000) {
        let source = format!("func {}() {{ var x = {}; }}", idents.join("_"), n);
        let mut lexer = Lexer::new(&source);
        let first = lexer.tokenize().expect("lex failed");
        lexer.reset();
        let second = lexer.tokenize().expect("lex failed");
        prop_assert_eq!(first, second);
    }

    /// Property: identifiers that are not keywords lex as identifiers
    #[test]
    fn identifiers_survive_lexing(ident in keyword_free_ident()) {
        let tokens = lexer::lex(&format!("{} = {};", ident, ident)).expect("lex failed");
        prop_assert_eq!(tokens[0].kind, TokenKind::Identifier);
        prop_assert_eq!(&tokens[0].value, &ident);
        prop_assert_eq!(tokens[2].kind, TokenKind::Identifier);
    }
}

// =============================================================================
// Parser Properties
// =============================================================================

fn arithmetic_op() -> impl Strategy<Value = (&'static str, BinaryOp)> {
    prop_oneof![
        Just(("+", BinaryOp::Add)),
        Just(("-", BinaryOp::Sub)),
        Just(("*", BinaryOp::Mul)),
        Just(("/", BinaryOp::Div)),
    ]
}

fn is_multiplicative(op: BinaryOp) -> bool {
    matches!(op, BinaryOp::Mul | BinaryOp::Div)
}

proptest! {
    /// Property: in `a x b y c` the tighter operator ends up deeper in the tree
    #[test]
    fn precedence_places_tighter_operator_deeper(
        (x_src, x) in arithmetic_op(),
        (y_src, y) in arithmetic_op(),
        a in 0i64..100, b in 0i64..100, c in 0i64..100,
    ) {
        let expr = returned(&format!("{} {} {} {} {}", a, x_src, b, y_src, c));
        let Expr::Binary(root, left, right) = expr else {
            panic!("expected a binary expression");
        };
        if is_multiplicative(y) && !is_multiplicative(x) {
            // a + (b * c)
            prop_assert_eq!(root.node, x);
            prop_assert_eq!(&left.node, &Expr::Literal(Literal::Int(a)));
            let is_nested_y = matches!(&right.node, Expr::Binary(inner, ..) if inner.node == y);
            prop_assert!(is_nested_y);
        } else {
            // (a x b) y c: left associative within a tier
            prop_assert_eq!(root.node, y);
            let is_nested_x = matches!(&left.node, Expr::Binary(inner, ..) if inner.node == x);
            prop_assert!(is_nested_x);
            prop_assert_eq!(&right.node, &Expr::Literal(Literal::Int(c)));
        }
    }

    /// Property: comparisons always bind looser than arithmetic
    #[test]
    fn comparisons_bind_looser_than_arithmetic((op_src, op) in arithmetic_op(), a in 0i64..100, b in 0i64..100) {
        let expr = returned(&format!("x == {} {} {}", a, op_src, b));
        let Expr::Binary(root, left, right) = expr else {
            panic!("expected a binary expression");
        };
        prop_assert_eq!(root.node, BinaryOp::Eq);
        prop_assert_eq!(&left.node, &Expr::Identifier("x".to_string()));
        let is_arith = matches!(&right.node, Expr::Binary(inner, ..) if inner.node == op);
        prop_assert!(is_arith);
    }

    /// Property: parsing is a pure function of the source text
    #[test]
    fn parsing_is_deterministic(name in keyword_free_ident(), n in 0i64..1_000_000) {
        let source = format!("func {}(): i64 {{ var v = {} as i64; return v * v; }}", name, n);
        let first = parser::parse_source(&source, "prop").expect("parse failed");
        let second = parser::parse_source(&source, "prop").expect("parse failed");
        prop_assert_eq!(first, second);
    }
}
