//! Resolver behavior against in-memory indexes.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::BTreeMap;
use unitport_graph::{
    DependencyGraph, DependencyResolver, MemoryIndex, NodeId, NodeKind, NodeStatus, NoopSink, ProgressEvent,
    RecordingSink, ResolverConfig,
};
use unitport_block::ParserVocabulary;
use unitport_graph::ReferenceTable;

fn statuses(graph: &DependencyGraph) -> BTreeMap<String, NodeStatus> {
    graph.nodes().map(|n| (n.id.to_string(), n.status)).collect()
}

fn chain_index() -> MemoryIndex {
    MemoryIndex::new()
        .with_file(
            "Data/INI/Object/Root.ini",
            "Object RootUnit\n  Weapon = PRIMARY WeaponA\nEnd\n",
        )
        .with_file(
            "Data/INI/Weapon.ini",
            "Weapon WeaponA\n  ProjectileObject = ProjectileB\nEnd\n",
        )
        .with_file(
            "Data/INI/Object/Projectiles.ini",
            "Object ProjectileB\n  ProjectileDetonationFX = FXListC\nEnd\n",
        )
        .with_file("Data/INI/FXList.ini", "FXList FXListC\nEnd\n")
}

#[tokio::test]
async fn end_to_end_chain_is_fully_found() {
    let graph = DependencyResolver::default()
        .resolve("RootUnit", &chain_index(), &NoopSink)
        .await;

    assert_eq!(graph.max_depth(), 3);
    assert_eq!(graph.found_count(), 4);
    assert_eq!(graph.missing_count(), 0);
    assert_eq!(graph.completion(), 100.0);

    let fx = graph.find_by_name("FXListC").unwrap();
    assert_eq!(fx.kind, NodeKind::FxList);
    assert_eq!(fx.depth, 3);

    let files = graph.files();
    let paths: Vec<_> = files.iter().map(|f| f.location.relative_path()).collect();
    assert_eq!(
        paths,
        vec![
            "Data/INI/Object/Root.ini",
            "Data/INI/Weapon.ini",
            "Data/INI/Object/Projectiles.ini",
            "Data/INI/FXList.ini",
        ]
    );
}

#[tokio::test]
async fn two_node_cycle_terminates_with_invalid_back_reference() {
    let index = MemoryIndex::new()
        .with_file("a.ini", "Object UnitA\n  Weapon = GunB\nEnd\n")
        .with_file("b.ini", "Weapon GunB\n  ProjectileObject = UnitA\nEnd\n");

    let graph = DependencyResolver::default().resolve("UnitA", &index, &NoopSink).await;

    let invalid: Vec<_> = graph.invalid().collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].name, "UnitA");
    assert_eq!(invalid[0].id.as_str(), "Object/UnitA#cycle@Weapon/GunB");
    assert!(invalid[0].reason.is_some());

    let gun = graph.get(&NodeId::new(NodeKind::Weapon, "GunB")).unwrap();
    assert_eq!(gun.status, NodeStatus::NotVerified);
    assert_eq!(graph.root_node().unwrap().status, NodeStatus::NotVerified);
}

#[tokio::test]
async fn self_reference_is_a_cycle() {
    let index = MemoryIndex::new().with_file("a.ini", "Object Loop\n  ProjectileObject = Loop\nEnd\n");

    let graph = DependencyResolver::default().resolve("Loop", &index, &NoopSink).await;

    assert_eq!(graph.len(), 2);
    assert_eq!(graph.invalid().count(), 1);
}

#[tokio::test]
async fn resolution_is_idempotent() {
    let index = MemoryIndex::new()
        .with_file("a.ini", "Object UnitA\n  Weapon = GunB\n  Armor = PlateC\nEnd\n")
        .with_file("b.ini", "Weapon GunB\n  ProjectileObject = UnitA\n  FireFX = Missing\nEnd\n")
        .with_file("c.ini", "Armor PlateC\nEnd\n");

    let first = DependencyResolver::default().resolve("UnitA", &index, &NoopSink).await;
    let second = DependencyResolver::default().resolve("UnitA", &index, &NoopSink).await;

    assert_eq!(statuses(&first), statuses(&second));
    assert_eq!(first.missing_count(), 1);
}

#[tokio::test]
async fn depth_bound_marks_invalid_instead_of_recursing() {
    let mut index = MemoryIndex::new();
    for i in 0..5 {
        index.insert_file(
            unitport_graph::NodeLocation::loose(format!("o{i}.ini")),
            &format!("Object O{i}\n  ProjectileObject = O{}\nEnd\n", i + 1),
        );
    }

    let resolver = DependencyResolver::new(
        ResolverConfig::default().with_max_depth(2),
        ReferenceTable::default(),
        ParserVocabulary::default(),
    );
    let graph = resolver.resolve("O0", &index, &NoopSink).await;

    let invalid: Vec<_> = graph.invalid().collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].name, "O3");
    assert!(invalid[0].id.as_str().contains("#depth@"));
    assert_eq!(graph.max_depth(), 3);
}

#[tokio::test]
async fn depth_bound_uses_the_shortest_path_to_each_definition() {
    // ProjB sits at depth 1 directly under the root and at depth 2 through GunA,
    // which is walked first.
    let index = MemoryIndex::new()
        .with_file(
            "Data/INI/Object/Root.ini",
            "Object Root\n  Weapon = PRIMARY GunA\n  ProjectileObject = ProjB\nEnd\n",
        )
        .with_file("Data/INI/Weapon.ini", "Weapon GunA\n  ProjectileObject = ProjB\nEnd\n")
        .with_file(
            "Data/INI/Object/Projectiles.ini",
            "Object ProjB\n  ProjectileDetonationFX = FxC\nEnd\n",
        )
        .with_file("Data/INI/FXList.ini", "FXList FxC\nEnd\n");

    let resolver = DependencyResolver::new(
        ResolverConfig::default().with_max_depth(2),
        ReferenceTable::default(),
        ParserVocabulary::default(),
    );
    let graph = resolver.resolve("Root", &index, &NoopSink).await;

    assert_eq!(graph.invalid().count(), 0);
    assert_eq!(graph.found_count(), 4);
    assert_eq!(graph.find_by_name("FxC").unwrap().depth, 2);
    assert_eq!(graph.find_by_name("Root").unwrap().status, NodeStatus::Found);
}

#[tokio::test]
async fn unindexed_assets_are_not_verified_but_missing_definitions_are_missing() {
    let index = MemoryIndex::new()
        .with_file(
            "tank.ini",
            "Object Tank\n  Model = AVTank\n  Weapon = GhostGun\nEnd\n",
        );

    let graph = DependencyResolver::default().resolve("Tank", &index, &NoopSink).await;

    assert_eq!(graph.find_by_name("AVTank").unwrap().status, NodeStatus::NotVerified);
    assert_eq!(graph.find_by_name("GhostGun").unwrap().status, NodeStatus::Missing);
    assert_eq!(graph.missing_count(), 1);
    assert!(graph.completion() < 100.0);
}

#[tokio::test]
async fn indexed_assets_are_found() {
    let index = MemoryIndex::new()
        .with_file("tank.ini", "Object Tank\n  Model = AVTank\nEnd\n")
        .with_asset("AVTank", NodeKind::Model, "Art/W3D/AVTank.w3d", &[1, 2, 3, 4]);

    let graph = DependencyResolver::default().resolve("Tank", &index, &NoopSink).await;

    let model = graph.find_by_name("AVTank").unwrap();
    assert_eq!(model.status, NodeStatus::Found);
    assert_eq!(model.size, Some(4));
    assert_eq!(graph.found_count(), 2);
}

#[tokio::test]
async fn wide_fan_out_resolves_every_child() {
    let mut root = String::from("Object Hub\n");
    let mut index = MemoryIndex::new();
    for i in 0..12 {
        root.push_str(&format!("  Weapon{i} = Gun{i}\n"));
        index.insert_file(
            unitport_graph::NodeLocation::loose(format!("gun{i}.ini")),
            &format!("Weapon Gun{i}\nEnd\n"),
        );
    }
    root.push_str("End\n");
    index.insert_file(unitport_graph::NodeLocation::loose("hub.ini"), &root);

    let resolver = DependencyResolver::new(
        ResolverConfig::default().with_fan_out(2),
        ReferenceTable::default(),
        ParserVocabulary::default(),
    );
    let sink = RecordingSink::new();
    let graph = resolver.resolve("Hub", &index, &sink).await;

    assert_eq!(graph.found_count(), 13);
    assert_eq!(
        sink.count(|e| matches!(e, ProgressEvent::DefinitionFetched { .. })),
        13
    );
}

#[tokio::test]
async fn changed_index_is_not_served_from_cache() {
    let resolver = DependencyResolver::default();
    let mut index = chain_index();
    let before = resolver.resolve("RootUnit", &index, &NoopSink).await;

    index.remove("FXListC");
    let after = resolver.resolve("RootUnit", &index, &NoopSink).await;

    assert_eq!(before.missing_count(), 0);
    assert_eq!(after.missing_count(), 1);
}

proptest! {
    #[test]
    fn prop_arbitrary_reference_graphs_terminate(
        size in 1usize..8,
        edges in proptest::collection::vec((0usize..8, 0usize..8), 0..20),
    ) {
        let mut bodies = vec![String::new(); size];
        for (from, to) in edges {
            if from < size {
                bodies[from].push_str(&format!("  ProjectileObject = N{to}\n"));
            }
        }
        let mut index = MemoryIndex::new();
        for (i, body) in bodies.iter().enumerate() {
            index.insert_file(
                unitport_graph::NodeLocation::loose(format!("n{i}.ini")),
                &format!("Object N{i}\n{body}End\n"),
            );
        }

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (first, second) = runtime.block_on(async {
            let a = DependencyResolver::default().resolve("N0", &index, &NoopSink).await;
            let b = DependencyResolver::default().resolve("N0", &index, &NoopSink).await;
            (a, b)
        });

        prop_assert_eq!(statuses(&first), statuses(&second));
        prop_assert!(first.completion() >= 0.0 && first.completion() <= 100.0);
        prop_assert!(first.root_node().is_some());
        for node in first.nodes() {
            if node.status == NodeStatus::Found {
                prop_assert!(first.children(&node.id).all(|c| c.status == NodeStatus::Found));
            }
        }
    }
}
