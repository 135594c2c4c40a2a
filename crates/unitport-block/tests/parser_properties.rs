//! Structural properties of the block parser over generated input.

use proptest::prelude::*;
use unitport_block::{parse, IssueKind};

/// Generate a well-nested definition file: `blocks` top-level blocks, each with
/// a few fields and optionally nested sub-blocks.
fn nested_text(blocks: &[(u8, u8)]) -> String {
    let mut out = String::new();
    for (i, (fields, subs)) in blocks.iter().enumerate() {
        out.push_str(&format!("Object Unit{i}\n"));
        for f in 0..*fields {
            out.push_str(&format!("  Field{f} = {f}\n"));
        }
        for s in 0..*subs {
            out.push_str(&format!("  Turret Slot{s}\n    Rate = 1\n  End\n"));
        }
        out.push_str("End\n\n");
    }
    out
}

proptest! {
    #[test]
    fn prop_balanced_input_has_no_issues(
        blocks in proptest::collection::vec((0u8..5, 0u8..3), 0..8)
    ) {
        let text = nested_text(&blocks);
        let outcome = parse(&text);

        prop_assert!(outcome.issues.is_empty());
        prop_assert_eq!(outcome.blocks.len(), blocks.len());
        for (block, (fields, subs)) in outcome.blocks.iter().zip(&blocks) {
            prop_assert!(block.closed);
            prop_assert_eq!(block.fields.len(), *fields as usize);
            prop_assert_eq!(block.sub_blocks, *subs as usize);
        }
    }

    #[test]
    fn prop_missing_end_iff_open_at_eof(
        blocks in proptest::collection::vec((0u8..4, 0u8..3), 1..6),
        cut in 1usize..4
    ) {
        let text = nested_text(&blocks);
        // Drop trailing `End` lines to leave blocks open.
        let mut lines: Vec<&str> = text.lines().collect();
        while lines.last().map_or(false, |l| l.trim().is_empty()) {
            lines.pop();
        }
        let mut removed = 0;
        while removed < cut && lines.last().map_or(false, |l| l.trim() == "End") {
            lines.pop();
            removed += 1;
        }
        let truncated = lines.join("\n");
        let outcome = parse(&truncated);

        let missing = outcome
            .issues
            .iter()
            .filter(|i| i.kind == IssueKind::MissingEnd)
            .count();
        prop_assert_eq!(missing, usize::from(removed > 0));
        prop_assert_eq!(outcome.blocks.len(), blocks.len());
    }

    #[test]
    fn prop_parser_never_panics(text in "[A-Za-z=; \n]{0,200}") {
        let _ = parse(&text);
    }
}

#[test]
fn every_block_closed_exactly_once() {
    let text = "Object A\nEnd\nWeapon B\n  WeaponSet\n  End\nEnd\nEnd\n";
    let outcome = parse(text);

    assert_eq!(outcome.blocks.len(), 2);
    assert!(outcome.blocks.iter().all(|b| b.closed));
    assert_eq!(outcome.issues.len(), 1);
    assert_eq!(outcome.issues[0].kind, IssueKind::ExtraEnd);
    assert_eq!(outcome.issues[0].line, 7);
}
