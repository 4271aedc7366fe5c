use pretty_assertions::assert_eq;
use typed_arena::Arena;

use super::*;
use crate::nodes::{NodeValue, TextOpts};

#[test]
fn inline_link() {
    let arena = Arena::new();
    let doc = parse(&arena, "see [docs](https://example.com \"the title\") now\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 3);
    assert_eq!(text_of(inlines[0]), "see ");

    let link = inlines[1];
    match link.data.borrow().value {
        NodeValue::Link(ref nl) => {
            assert_eq!(nl.url, "https://example.com");
            assert_eq!(nl.text, "docs");
            assert_eq!(nl.text_pos, sp(5, 0, 8, 0));
            assert_eq!(nl.url_pos, sp(11, 0, 29, 0));
        }
        ref v => panic!("expected link, got {:?}", v),
    }

    let descr = children(link);
    assert_eq!(descr.len(), 1);
    assert_eq!(text_of(descr[0]), "docs");
}

#[test]
fn bold_link_carries_style_delims() {
    // S1 of the end-to-end suite.
    let arena = Arena::new();
    let doc = parse(&arena, "**[Google](https://www.google.com)**\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);

    let ast = inlines[0].data.borrow();
    match ast.value {
        NodeValue::Link(ref nl) => {
            assert_eq!(nl.url, "https://www.google.com");
            assert_eq!(nl.text, "Google");
        }
        ref v => panic!("expected link, got {:?}", v),
    }
    assert_eq!(ast.opts, TextOpts::BOLD);
    assert_eq!(ast.open_styles.len(), 1);
    assert_eq!(ast.open_styles[0].opts, TextOpts::BOLD);
    assert_eq!(ast.open_styles[0].span, sp(0, 0, 1, 0));
    assert_eq!(ast.close_styles[0].span, sp(34, 0, 35, 0));

    let descr: Vec<_> = inlines[0].children().collect();
    assert_eq!(text_of(descr[0]), "Google");
    assert_eq!(span_of(descr[0]), sp(3, 0, 8, 0));
}

#[test]
fn image() {
    let arena = Arena::new();
    let doc = parse(&arena, "![alt text](img.png)\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Image(ref nl) => {
            assert_eq!(nl.url, "img.png");
            assert_eq!(nl.text, "alt text");
        }
        ref v => panic!("expected image, got {:?}", v),
    }
    assert_eq!(span_of(inlines[0]), sp(0, 0, 19, 0));
}

#[test]
fn image_inside_link() {
    let arena = Arena::new();
    let doc = parse(&arena, "[![alt](img.png)](https://a.b)\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert!(matches!(inlines[0].data.borrow().value, NodeValue::Link(..)));

    let descr = children(inlines[0]);
    assert_eq!(descr.len(), 1);
    assert!(matches!(descr[0].data.borrow().value, NodeValue::Image(..)));
}

#[test]
fn reference_collapsed_and_shortcut_forms() {
    let arena = Arena::new();
    let doc = parse(
        &arena,
        "[full][lab] then [lab][] then [lab]\n\n[lab]: /url\n",
    );

    let inlines = children(body(&doc)[0]);
    let links: Vec<_> = inlines
        .iter()
        .filter(|n| matches!(n.data.borrow().value, NodeValue::Link(..)))
        .collect();
    assert_eq!(links.len(), 3);
    for link in links {
        match link.data.borrow().value {
            NodeValue::Link(ref nl) => assert_eq!(nl.url, "/url"),
            _ => unreachable!(),
        }
    }
}

#[test]
fn definition_anywhere_resolves_everywhere() {
    // The reference store is filled before inlines run, so a definition
    // after the use still resolves.
    let arena = Arena::new();
    let doc = parse(&arena, "[early]\n\nlots of text\n\n[early]: /late\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Link(ref nl) => assert_eq!(nl.url, "/late"),
        ref v => panic!("expected link, got {:?}", v),
    }

    assert!(doc.labeled_links.contains_key("early/"));
    match doc.labeled_links["early/"].data.borrow().value {
        NodeValue::Link(ref nl) => assert_eq!(nl.url, "/late"),
        _ => unreachable!(),
    };
}

#[test]
fn first_definition_wins() {
    let arena = Arena::new();
    let doc = parse(&arena, "[x]: /one\n\n[x]: /two\n\n[x]\n");

    match doc.labeled_links["x/"].data.borrow().value {
        NodeValue::Link(ref nl) => assert_eq!(nl.url, "/one"),
        _ => unreachable!(),
    };
}

#[test]
fn unresolved_reference_stays_literal() {
    let arena = Arena::new();
    let doc = parse(&arena, "[text][missing] end\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "[text][missing] end");
}

#[test]
fn no_links_inside_links() {
    let arena = Arena::new();
    let doc = parse(&arena, "[a [b](/inner) c](/outer)\n");

    let inlines = children(body(&doc)[0]);
    // The inner link wins; the outer brackets demote to text.
    let mut found_inner = false;
    for node in &inlines {
        if let NodeValue::Link(ref nl) = node.data.borrow().value {
            assert_eq!(nl.url, "/inner");
            found_inner = true;
        }
    }
    assert!(found_inner);
    assert_eq!(text_of(inlines[0]), "[a ");
}

#[test]
fn uri_autolink() {
    let arena = Arena::new();
    let doc = parse(&arena, "<https://example.com/x>\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Link(ref nl) => {
            assert_eq!(nl.url, "https://example.com/x");
            assert_eq!(nl.text, "https://example.com/x");
        }
        ref v => panic!("expected link, got {:?}", v),
    }
    assert_eq!(span_of(inlines[0]), sp(0, 0, 22, 0));
}

#[test]
fn email_autolink_gets_mailto() {
    let arena = Arena::new();
    let doc = parse(&arena, "<user@example.com>\n");

    let inlines = children(body(&doc)[0]);
    match inlines[0].data.borrow().value {
        NodeValue::Link(ref nl) => assert_eq!(nl.url, "mailto:user@example.com"),
        ref v => panic!("expected link, got {:?}", v),
    };
}

#[test]
fn bare_angle_text_is_not_an_autolink() {
    let arena = Arena::new();
    let doc = parse(&arena, "a < b and <not a link\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    assert_eq!(text_of(inlines[0]), "a < b and <not a link");
}

#[test]
fn inline_raw_html_tag() {
    let arena = Arena::new();
    let doc = parse(&arena, "before <b class=\"x\">mid</b> after\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 5);
    match inlines[1].data.borrow().value {
        NodeValue::RawHtml(ref nh) => {
            assert_eq!(nh.literal, "<b class=\"x\">");
            assert!(!nh.free_tag);
        }
        ref v => panic!("expected raw html, got {:?}", v),
    }
    match inlines[3].data.borrow().value {
        NodeValue::RawHtml(ref nh) => assert_eq!(nh.literal, "</b>"),
        ref v => panic!("expected raw html, got {:?}", v),
    };
}

#[test]
fn code_span_shields_brackets() {
    let arena = Arena::new();
    let doc = parse(&arena, "[`a]`](/url)\n");

    let inlines = children(body(&doc)[0]);
    assert_eq!(inlines.len(), 1);
    match inlines[0].data.borrow().value {
        NodeValue::Link(ref nl) => assert_eq!(nl.url, "/url"),
        ref v => panic!("expected link, got {:?}", v),
    }
    let descr = children(inlines[0]);
    assert!(matches!(descr[0].data.borrow().value, NodeValue::Code(..)));
}
