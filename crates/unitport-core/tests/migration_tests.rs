//! End-to-end migrations between throwaway installations.

use pretty_assertions::assert_eq;
use unitport_conflict::{ConflictKind, Decisions, ResolutionAction};
use unitport_core::{MigrationError, MigrationRequest, Migrator, UnitportConfig};
use unitport_graph::{NoopSink, ProgressEvent, RecordingSink};
use unitport_merge::MergeStrategy;
use unitport_test_utils::{Installation, TANK_PATH, WEAPON_PATH};
use unitport_transfer::MigrationState;

#[tokio::test]
async fn analysis_of_a_clean_target_finds_the_whole_closure() {
    let source = Installation::tank_source();
    let target = Installation::new();

    let analysis = Migrator::default()
        .analyze(source.root(), "Tank", target.root(), &NoopSink)
        .await
        .unwrap();

    assert_eq!(analysis.graph.len(), 6);
    assert_eq!(analysis.graph.found_count(), 6);
    assert_eq!(analysis.graph.max_depth(), 3);
    assert!(analysis.conflicts.is_clean());
    assert!(analysis.source_issues.is_empty());
    assert!(target.snapshot().is_empty());
}

#[tokio::test]
async fn packed_source_resolves_like_loose_files() {
    let source = Installation::tank_source_packed("TankMod.big");
    let target = Installation::new();

    let analysis = Migrator::default()
        .analyze(source.root(), "Tank", target.root(), &NoopSink)
        .await
        .unwrap();

    assert_eq!(analysis.graph.found_count(), 6);
    let tank = analysis.graph.find_by_name("Tank").unwrap();
    assert!(tank.location.as_ref().unwrap().is_container_entry());
}

#[tokio::test]
async fn migration_copies_the_closure_and_rolls_back_cleanly() {
    let source = Installation::tank_source();
    let target = Installation::new();
    let migrator = Migrator::default();
    let sink = RecordingSink::new();

    let report = migrator
        .migrate(&MigrationRequest::new(source.root(), "Tank", target.root()), &sink)
        .await
        .unwrap();

    assert_eq!(report.state, MigrationState::Succeeded);
    assert_eq!(report.transfer.created, 6);
    assert_eq!(target.snapshot(), source.snapshot());
    assert!(target.temp_artifacts().is_empty());
    assert_eq!(sink.count(|e| matches!(e, ProgressEvent::FileTransferred { .. })), 6);
    assert_eq!(
        sink.count(|e| matches!(e, ProgressEvent::Stage { name } if name == "resolve")),
        1
    );

    let history = migrator.history(target.root()).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, report.migration_id);

    let outcome = migrator
        .rollback(target.root(), &report.migration_id, &NoopSink)
        .await
        .unwrap();
    assert_eq!(outcome.operations, 6);
    assert!(target.snapshot().is_empty());

    let again = migrator
        .rollback(target.root(), &report.migration_id, &NoopSink)
        .await
        .unwrap_err();
    assert!(again.is_user_error());
}

#[tokio::test]
async fn duplicate_definitions_are_renamed_with_their_references() {
    let source = Installation::tank_source();
    let target = Installation::new().with_file("Data/INI/Base.ini", "Weapon TankGun\n  PrimaryDamage = 5\nEnd\n");

    let report = Migrator::default()
        .migrate(&MigrationRequest::new(source.root(), "Tank", target.root()), &NoopSink)
        .await
        .unwrap();

    assert_eq!(report.conflicts.get(&ConflictKind::Duplicate), Some(&1));
    assert_eq!(report.renames.get("TankGun").map(String::as_str), Some("ZH_TankGun"));
    assert!(target.read(TANK_PATH).contains("Weapon = PRIMARY ZH_TankGun"));
    assert!(target.read(WEAPON_PATH).starts_with("Weapon ZH_TankGun\n"));
    assert_eq!(
        target.read("Data/INI/Base.ini"),
        "Weapon TankGun\n  PrimaryDamage = 5\nEnd\n"
    );
}

#[tokio::test]
async fn overwrite_and_merge_apply_the_smart_numeric_rules() {
    let source = Installation::tank_source();
    let target =
        Installation::new().with_file(TANK_PATH, "Object Tank\n  BuildCost = 1000\n  MaxHealth = 500\nEnd\n");

    let decisions = Decisions::new().with_choice("name:Tank", ResolutionAction::Overwrite);
    let request = MigrationRequest::new(source.root(), "Tank", target.root()).with_decisions(decisions);
    let report = Migrator::default().migrate(&request, &NoopSink).await.unwrap();

    assert_eq!(report.merges.len(), 1);
    assert_eq!(report.transfer.merged, 1);
    let merged = target.read(TANK_PATH);
    assert!(merged.contains("BuildCost = 800"), "{merged}");
    assert!(merged.contains("MaxHealth = 500"), "{merged}");

    // The backup is the pre-migration file.
    let entry = &Migrator::default().history(target.root()).await.unwrap()[0];
    let backup = entry.operations.iter().find_map(|o| o.backup.clone()).unwrap();
    assert_eq!(
        std::fs::read_to_string(target.root().join(backup)).unwrap(),
        "Object Tank\n  BuildCost = 1000\n  MaxHealth = 500\nEnd\n"
    );
}

#[tokio::test]
async fn differently_cased_target_file_is_merged_in_place() {
    let source = Installation::tank_source();
    let original = "Weapon OtherGun\n  PrimaryDamage = 5\nEnd\n";
    let target = Installation::new().with_file("data/ini/weapon.ini", original);

    let migrator = Migrator::default();
    let report = migrator
        .migrate(&MigrationRequest::new(source.root(), "Tank", target.root()), &NoopSink)
        .await
        .unwrap();

    assert_eq!(report.conflicts.get(&ConflictKind::FileOverwrite), Some(&1));
    assert_eq!(report.transfer.merged, 1);
    let merged = target.read("data/ini/weapon.ini");
    assert!(merged.starts_with("Weapon OtherGun\n"), "{merged}");
    assert!(merged.contains("Weapon TankGun"), "{merged}");
    assert!(!target.snapshot().contains_key(WEAPON_PATH));

    migrator
        .rollback(target.root(), &report.migration_id, &NoopSink)
        .await
        .unwrap();
    assert_eq!(target.read("data/ini/weapon.ini"), original);
}

#[tokio::test]
async fn differently_cased_target_file_is_backed_up_on_overwrite() {
    let source = Installation::tank_source();
    let original = "Weapon OtherGun\nEnd\n";
    let target = Installation::new().with_file("data/ini/weapon.ini", original);

    let decisions = Decisions::new().with_choice("file:Data/INI/Weapon.ini", ResolutionAction::Overwrite);
    let request = MigrationRequest::new(source.root(), "Tank", target.root()).with_decisions(decisions);
    let report = Migrator::default().migrate(&request, &NoopSink).await.unwrap();

    assert_eq!(report.transfer.replaced, 1);
    assert!(target.read("data/ini/weapon.ini").starts_with("Weapon TankGun\n"));
    assert!(!target.snapshot().contains_key(WEAPON_PATH));

    let entry = &Migrator::default().history(target.root()).await.unwrap()[0];
    let backup = entry.operations.iter().find_map(|o| o.backup.clone()).unwrap();
    assert_eq!(std::fs::read_to_string(target.root().join(backup)).unwrap(), original);
}

#[tokio::test]
async fn strategy_override_changes_the_merge() {
    let source = Installation::tank_source();
    let target =
        Installation::new().with_file(TANK_PATH, "Object Tank\n  BuildCost = 1000\n  MaxHealth = 500\nEnd\n");

    let request = MigrationRequest::new(source.root(), "Tank", target.root())
        .with_decisions(Decisions::new().with_choice("name:Tank", ResolutionAction::Overwrite))
        .with_strategy(MergeStrategy::SourceWins);
    Migrator::default().migrate(&request, &NoopSink).await.unwrap();

    let merged = target.read(TANK_PATH);
    assert!(merged.contains("BuildCost = 800"), "{merged}");
    assert!(merged.contains("MaxHealth = 300"), "{merged}");
}

#[tokio::test]
async fn unknown_unit_fails_before_touching_the_target() {
    let source = Installation::tank_source();
    let target = Installation::new();

    let err = Migrator::default()
        .migrate(&MigrationRequest::new(source.root(), "Nothing", target.root()), &NoopSink)
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::UnitNotFound(ref unit) if unit == "Nothing"));
    assert!(err.destination_intact());
    assert!(!target.path(".unitport").exists());
}

#[tokio::test]
async fn explicit_choice_is_required_for_unsupported_actions() {
    let source = Installation::tank_source();
    let target = Installation::new().with_file("Data/INI/Base.ini", "Weapon TankGun\nEnd\n");

    // Duplicates offer rename, overwrite and skip, not merge.
    let request = MigrationRequest::new(source.root(), "Tank", target.root())
        .with_decisions(Decisions::new().with_choice("name:TankGun", ResolutionAction::Merge));
    let err = Migrator::default().migrate(&request, &NoopSink).await.unwrap_err();

    assert!(err.is_user_error());
    assert!(!target.exists(TANK_PATH));
}

#[tokio::test]
async fn custom_journal_directory_is_used() {
    let source = Installation::tank_source();
    let target = Installation::new();
    let migrator = Migrator::new(UnitportConfig::new().with_journal_dir(".porting"));

    let report = migrator
        .migrate(&MigrationRequest::new(source.root(), "Tank", target.root()), &NoopSink)
        .await
        .unwrap();

    assert!(target
        .path(&format!(".porting/journal/{}.json", report.migration_id))
        .exists());
    let recovery = migrator.recover(target.root(), &NoopSink).await.unwrap();
    assert!(recovery.recovered.is_empty());
}
