use typed_arena::Arena;

use super::*;
use crate::nodes::NodeValue;

const INPUT: &str = "# Title {#top}\n\n\
                     Some **bold** [link](https://a.b) text[^n].\n\n\
                     - item one\n- item two\n\n\
                     [ref]: /stored\n\n\
                     [^n]: note body\n";

#[test]
fn clone_matches_the_original() {
    let arena = Arena::new();
    let doc = parse(&arena, INPUT);

    let arena2 = Arena::new();
    let copy = doc.clone_in(&arena2);

    assert!(doc.same_structure(&copy));
    assert_sane_positions(&copy);
}

#[test]
fn clone_maps_point_into_the_clone() {
    let arena = Arena::new();
    let doc = parse(&arena, INPUT);

    let arena2 = Arena::new();
    let copy = doc.clone_in(&arena2);

    let heading = copy.labeled_headings["#top/"];
    assert!(matches!(heading.data.borrow().value, NodeValue::Heading(..)));

    // The map value is the very node that sits in the cloned tree.
    let in_tree = copy
        .root
        .descendants()
        .find(|n| matches!(n.data.borrow().value, NodeValue::Heading(..)))
        .unwrap();
    assert!(heading.same_node(in_tree));

    assert!(copy.footnotes.contains_key("#^n/"));
    assert!(copy.labeled_links.contains_key("ref/"));
}

#[test]
fn mutating_the_clone_leaves_the_original_alone() {
    let arena = Arena::new();
    let doc = parse(&arena, INPUT);

    let arena2 = Arena::new();
    let copy = doc.clone_in(&arena2);

    let victim = copy
        .root
        .descendants()
        .find(|n| matches!(n.data.borrow().value, NodeValue::Text(..)))
        .unwrap();
    *victim.data.borrow_mut().value.text_mut().unwrap() = "hijacked".to_string();

    assert!(!doc.same_structure(&copy));

    let originals: Vec<String> = doc
        .root
        .descendants()
        .filter_map(|n| n.data.borrow().value.text().cloned())
        .collect();
    assert!(!originals.iter().any(|t| t == "hijacked"));
}

#[test]
fn positions_are_sane_on_assorted_input() {
    let arena = Arena::new();
    let doc = parse(
        &arena,
        "para one\n\n> quote\n> more\n\n- a\n  - b\n\n```rust\ncode\n```\n\na|b\n-|-\n1|2\n",
    );
    assert_sane_positions(&doc);
}

#[test]
fn labeled_link_values_are_links() {
    let arena = Arena::new();
    let doc = parse(&arena, "[lab]: /url\n");

    assert_eq!(doc.labeled_links.len(), 1);
    let def = doc.labeled_links["lab/"];
    match def.data.borrow().value {
        NodeValue::Link(ref nl) => {
            assert_eq!(nl.url, "/url");
            assert_eq!(nl.text, "lab");
        }
        ref v => panic!("expected link, got {:?}", v),
    };
}
