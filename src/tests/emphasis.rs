use pretty_assertions::assert_eq;
use typed_arena::Arena;

use super::*;
use crate::nodes::{NodeValue, TextOpts};

#[test]
fn single_star_italic() {
    let arena = Arena::new();
    let doc = parse(&arena, "a *b* c\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    assert_eq!(text_of(inlines[0]), "a ");
    assert_eq!(inlines[0].data.borrow().opts, TextOpts::NONE);

    let b = inlines[1].data.borrow();
    assert_eq!(b.value, NodeValue::Text("b".to_string()));
    assert_eq!(b.opts, TextOpts::ITALIC);
    assert_eq!(b.open_styles.len(), 1);
    assert_eq!(b.open_styles[0].opts, TextOpts::ITALIC);
    assert_eq!(b.open_styles[0].span, sp(2, 0, 2, 0));
    assert_eq!(b.close_styles[0].span, sp(4, 0, 4, 0));
    assert_eq!(b.span, sp(3, 0, 3, 0));
}

#[test]
fn double_star_bold() {
    let arena = Arena::new();
    let doc = parse(&arena, "**bold**\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    let ast = inlines[0].data.borrow();
    assert_eq!(ast.opts, TextOpts::BOLD);
    assert_eq!(ast.open_styles[0].span, sp(0, 0, 1, 0));
    assert_eq!(ast.close_styles[0].span, sp(6, 0, 7, 0));
}

#[test]
fn triple_star_nests_bold_in_italic() {
    // Boundary case 9: ***foo*** pairs as the bold-of-italic nesting.
    let arena = Arena::new();
    let doc = parse(&arena, "***foo***\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    let ast = inlines[0].data.borrow();
    assert_eq!(ast.value, NodeValue::Text("foo".to_string()));
    assert!(ast.opts.contains(TextOpts::BOLD));
    assert!(ast.opts.contains(TextOpts::ITALIC));

    // The bold pair consumes the inner delimiters, the italic pair the
    // outer ones; positions record the nesting.
    assert_eq!(ast.open_styles.len(), 2);
    assert_eq!(ast.open_styles[0].opts, TextOpts::BOLD);
    assert_eq!(ast.open_styles[0].span, sp(1, 0, 2, 0));
    assert_eq!(ast.open_styles[1].opts, TextOpts::ITALIC);
    assert_eq!(ast.open_styles[1].span, sp(0, 0, 0, 0));
    assert_eq!(ast.close_styles[0].span, sp(6, 0, 7, 0));
    assert_eq!(ast.close_styles[1].span, sp(8, 0, 8, 0));
}

#[test]
fn rule_of_three_blocks_odd_pairing() {
    let arena = Arena::new();
    let doc = parse(&arena, "*abc**def*\n");

    let inlines = children(body(&doc)[0]);
    // The length-2 run cannot pair with either single: it stays literal
    // inside one italic region, and full optimization folds the covered
    // runs back together.
    assert_eq!(inlines.len(), 1);
    let ast = inlines[0].data.borrow();
    assert_eq!(ast.value, NodeValue::Text("abc**def".to_string()));
    assert_eq!(ast.opts, TextOpts::ITALIC);
    assert_eq!(ast.open_styles[0].span, sp(0, 0, 0, 0));
    assert_eq!(ast.close_styles[0].span, sp(9, 0, 9, 0));
}

#[test]
fn unbalanced_double_single() {
    let arena = Arena::new();
    let doc = parse(&arena, "**foo*\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 2);
    assert_eq!(text_of(inlines[0]), "*");
    assert_eq!(inlines[0].data.borrow().opts, TextOpts::NONE);
    let foo = inlines[1].data.borrow();
    assert_eq!(foo.opts, TextOpts::ITALIC);
    assert_eq!(foo.open_styles[0].span, sp(1, 0, 1, 0));
}

#[test]
fn intraword_underscore_is_literal() {
    let arena = Arena::new();
    let doc = parse(&arena, "foo_bar_baz\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "foo_bar_baz");
    assert_eq!(inlines[0].data.borrow().opts, TextOpts::NONE);
}

#[test]
fn intraword_star_still_works() {
    let arena = Arena::new();
    let doc = parse(&arena, "foo*bar*baz\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    assert_eq!(inlines[1].data.borrow().opts, TextOpts::ITALIC);
}

#[test]
fn strikethrough_requires_matching_lengths() {
    let arena = Arena::new();
    let doc = parse(&arena, "~~gone~~ and ~one~ but ~~not~\n");

    let inlines = children(body(&doc)[0]);

    let gone = inlines[0].data.borrow();
    assert_eq!(gone.value, NodeValue::Text("gone".to_string()));
    assert_eq!(gone.opts, TextOpts::STRIKETHROUGH);
    assert_eq!(gone.open_styles[0].span, sp(0, 0, 1, 0));

    let one = inlines[2].data.borrow();
    assert_eq!(one.value, NodeValue::Text("one".to_string()));
    assert_eq!(one.opts, TextOpts::STRIKETHROUGH);

    // ~~not~ cannot pair: lengths differ.
    let tail: String = inlines[3..].iter().map(|n| text_of(n)).collect();
    assert_eq!(tail, " but ~~not~");
}

#[test]
fn emphasis_across_lines() {
    let arena = Arena::new();
    let doc = parse(&arena, "*foo\nbar*\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 2);
    let foo = inlines[0].data.borrow();
    let bar = inlines[1].data.borrow();
    assert_eq!(foo.opts, TextOpts::ITALIC);
    assert_eq!(bar.opts, TextOpts::ITALIC);
    assert_eq!(foo.open_styles[0].span, sp(0, 0, 0, 0));
    assert!(foo.close_styles.is_empty());
    assert_eq!(bar.close_styles[0].span, sp(3, 1, 3, 1));
}

#[test]
fn unmatched_runs_stay_literal() {
    let arena = Arena::new();
    let doc = parse(&arena, "a ** b\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "a ** b");
}
