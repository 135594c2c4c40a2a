//! Merge properties over generated blocks.

use proptest::prelude::*;
use unitport_block::{parse, Block, BlockParser};
use unitport_merge::{FieldStatus, MergeEngine, MergeStrategy};

fn arb_block() -> impl Strategy<Value = Block> {
    let key = prop::sample::select(vec![
        "BuildCost",
        "BuildTime",
        "MaxHealth",
        "KindOf",
        "Side",
        "VisionRange",
    ]);
    let value = prop_oneof![
        (0u32..5000).prop_map(|n| n.to_string()),
        "[A-Z][A-Z_]{1,8}".prop_map(String::from),
    ];
    prop::collection::vec((key, value), 0..10).prop_map(|fields| {
        fields
            .into_iter()
            .fold(Block::new("Object", "Unit"), |b, (k, v)| b.with_field(k, v))
    })
}

fn strategy() -> impl Strategy<Value = MergeStrategy> {
    prop::sample::select(MergeStrategy::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_merging_with_itself_modifies_nothing(block in arb_block(), strategy in strategy()) {
        let merged = MergeEngine::default().merge(&block, &block.clone(), strategy);

        prop_assert_eq!(merged.report.count(FieldStatus::Modified), 0);
        prop_assert_eq!(merged.report.count(FieldStatus::Union), 0);
        prop_assert!(merged
            .report
            .fields
            .iter()
            .all(|f| f.status == FieldStatus::Identical));
    }

    #[test]
    fn prop_merge_is_deterministic(a in arb_block(), b in arb_block(), strategy in strategy()) {
        let engine = MergeEngine::default();
        let first = engine.merge(&a, &b, strategy);
        let second = engine.merge(&a, &b, strategy);
        prop_assert_eq!(first.text, second.text);
    }

    #[test]
    fn prop_rendered_merge_reparses_to_merged_fields(a in arb_block(), b in arb_block(), strategy in strategy()) {
        let merged = MergeEngine::default().merge(&a, &b, strategy);
        let reparsed = parse(&merged.text);

        prop_assert!(reparsed.issues.is_empty());
        let fields: Vec<_> = reparsed.blocks[0]
            .fields
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect();
        let expected: Vec<_> = merged
            .block
            .fields
            .iter()
            .map(|f| (f.key.clone(), f.value.clone()))
            .collect();
        prop_assert_eq!(fields, expected);
    }
}

#[test]
fn smart_numeric_rule_examples() {
    let incoming = Block::new("Object", "Tank")
        .with_field("BuildCost", "1000")
        .with_field("MaxHealth", "500");
    let existing = Block::new("Object", "Tank")
        .with_field("BuildCost", "800")
        .with_field("MaxHealth", "300");

    let merged = MergeEngine::default().merge(&existing, &incoming, MergeStrategy::Smart);

    assert_eq!(merged.block.first_value("BuildCost"), Some("800"));
    assert_eq!(merged.block.first_value("MaxHealth"), Some("500"));
}

#[test]
fn merge_files_round_trips_through_parser() {
    let existing = "Object Tank\n  BuildCost = 800\n  KindOf = VEHICLE\nEnd\n";
    let incoming = "Object Tank\n  BuildCost = 1000\n  KindOf = VEHICLE\n  KindOf = CAN_ATTACK\nEnd\n";
    let result = MergeEngine::default()
        .merge_files(&BlockParser::default(), existing, incoming, MergeStrategy::Smart)
        .unwrap();

    let block = parse(&result.text).blocks.remove(0);
    assert_eq!(block.first_value("BuildCost"), Some("800"));
    assert_eq!(block.field_values("KindOf"), vec!["VEHICLE", "CAN_ATTACK"]);
}
