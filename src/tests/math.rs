use pretty_assertions::assert_eq;
use typed_arena::Arena;

use super::*;
use crate::nodes::NodeValue;

#[test]
fn inline_math() {
    let arena = Arena::new();
    let doc = parse(&arena, "sum $a+b$ done\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    match inlines[1].data.borrow().value {
        NodeValue::Math(ref nm) => {
            assert_eq!(nm.literal, "a+b");
            assert!(nm.inline);
            assert_eq!(nm.start_delim, sp(4, 0, 4, 0));
            assert_eq!(nm.end_delim, sp(8, 0, 8, 0));
        }
        ref v => panic!("expected math, got {:?}", v),
    }
    assert_eq!(span_of(inlines[1]), sp(4, 0, 8, 0));
}

#[test]
fn display_math_needs_equal_runs() {
    let arena = Arena::new();
    let doc = parse(&arena, "$$x^2$$\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Math(ref nm) => {
            assert_eq!(nm.literal, "x^2");
            assert_eq!(nm.start_delim, sp(0, 0, 1, 0));
        }
        ref v => panic!("expected math, got {:?}", v),
    };
}

#[test]
fn latex_in_tick_convention_strips_backticks() {
    let arena = Arena::new();
    let doc = parse(&arena, "$`E=mc^2`$\n");

    let inlines = children(body(&doc)[0]);
    match inlines[0].data.borrow().value {
        NodeValue::Math(ref nm) => assert_eq!(nm.literal, "E=mc^2"),
        ref v => panic!("expected math, got {:?}", v),
    };
}

#[test]
fn unmatched_dollar_is_text() {
    let arena = Arena::new();
    let doc = parse(&arena, "costs $5 total\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "costs $5 total");
}

#[test]
fn math_fenced_block() {
    let arena = Arena::new();
    let doc = parse(&arena, "```math\n\\int_0^1 x\n```\n");

    let body = body(&doc);
    assert_eq!(body.len(), 1);
    match body[0].data.borrow().value {
        NodeValue::Math(ref nm) => {
            assert_eq!(nm.literal, "\\int_0^1 x");
            assert!(!nm.inline);
            assert_eq!(nm.start_delim, sp(0, 0, 2, 0));
            assert_eq!(nm.end_delim, sp(0, 2, 2, 2));
        }
        ref v => panic!("expected math block, got {:?}", v),
    };
}

#[test]
fn code_span_exact_run_lengths() {
    // S3 of the end-to-end suite.
    let arena = Arena::new();
    let doc = parse(&arena, "``Use this `code`\nin the code\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    assert_eq!(text_of(inlines[0]), "``Use this ");
    assert_eq!(span_of(inlines[0]), sp(0, 0, 10, 0));

    match inlines[1].data.borrow().value {
        NodeValue::Code(ref nc) => {
            assert_eq!(nc.literal, "code");
            assert!(nc.inline);
            assert_eq!(nc.start_delim, sp(11, 0, 11, 0));
            assert_eq!(nc.end_delim, sp(16, 0, 16, 0));
        }
        ref v => panic!("expected code, got {:?}", v),
    }

    assert_eq!(text_of(inlines[2]), "in the code");
    assert_eq!(span_of(inlines[2]), sp(0, 1, 10, 1));
}

#[test]
fn code_span_strips_one_padding_space() {
    let arena = Arena::new();
    let doc = parse(&arena, "` foo `\n");

    let inlines = children(body(&doc)[0]);
    match inlines[0].data.borrow().value {
        NodeValue::Code(ref nc) => assert_eq!(nc.literal, "foo"),
        ref v => panic!("expected code, got {:?}", v),
    };
}

#[test]
fn code_span_across_lines_joins_with_space() {
    let arena = Arena::new();
    let doc = parse(&arena, "`two\nlines`\n");

    let inlines = children(body(&doc)[0]);
    match inlines[0].data.borrow().value {
        NodeValue::Code(ref nc) => assert_eq!(nc.literal, "two lines"),
        ref v => panic!("expected code, got {:?}", v),
    };
}

#[test]
fn no_inline_processing_inside_code() {
    let arena = Arena::new();
    let doc = parse(&arena, "`**not bold** \\*`\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Code(ref nc) => assert_eq!(nc.literal, "**not bold** \\*"),
        ref v => panic!("expected code, got {:?}", v),
    };
}
