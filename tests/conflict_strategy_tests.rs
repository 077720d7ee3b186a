//! Filesystem conflict handling between competing packages

mod common;

use agentpack::ledger::OwnershipLedger;
use agentpack::manifest::DependencyDecl;
use agentpack::options::ConflictStrategy;
use agentpack::{Engine, RunOptions};

use common::TestWorkspace;

fn install(ws: &TestWorkspace, decls: &[DependencyDecl], strategy: ConflictStrategy) -> bool {
    let mut engine = Engine::new(&ws.path);
    let options = RunOptions {
        conflict_strategy: strategy,
        ..RunOptions::default()
    };
    engine.run(decls, &options).success
}

#[test]
fn test_second_package_is_namespaced_first_untouched() {
    let ws = TestWorkspace::new();
    ws.create_pack("packs/p", &[("rules/a.md", "# from p")]);
    ws.create_pack("packs/q", &[("rules/a.md", "# from q")]);

    assert!(install(
        &ws,
        &[DependencyDecl::local("p", "./packs/p")],
        ConflictStrategy::Namespace,
    ));
    let ledger_before = ws.read_file("agentpack.lock.json");

    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Namespace,
    ));

    // Q lands under its slug; P's file and ledger entry are untouched
    assert_eq!(ws.read_file("rules/a.md"), "# from p");
    assert_eq!(ws.read_file("rules/q/a.md"), "# from q");

    let ledger = OwnershipLedger::load(&ws.path).expect("ledger");
    assert_eq!(ledger.owner_of("rules/a.md"), Some("p"));
    assert_eq!(ledger.owner_of("rules/q/a.md"), Some("q"));

    let p_entry_before: serde_json::Value =
        serde_json::from_str(&ledger_before).expect("ledger json");
    let p_now = ledger.entry("p").expect("p entry");
    assert_eq!(
        p_entry_before["packages"]["p"]["files"]["rules/a.md"][0],
        "rules/a.md"
    );
    assert!(p_now.owns("rules/a.md"));
}

#[test]
fn test_bulk_namespacing_covers_whole_batch() {
    let ws = TestWorkspace::new();
    ws.create_pack("packs/p", &[("rules/a.md", "# from p")]);
    ws.create_pack(
        "packs/q",
        &[
            ("rules/a.md", "# from q"),
            ("rules/b.md", "# only q"),
            ("mcp.json", "{\"servers\":{}}"),
        ],
    );

    assert!(install(
        &ws,
        &[DependencyDecl::local("p", "./packs/p")],
        ConflictStrategy::Namespace,
    ));
    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Namespace,
    ));

    // Conflicting and non-conflicting targets namespaced identically
    assert!(ws.file_exists("rules/q/a.md"));
    assert!(ws.file_exists("rules/q/b.md"));
    assert!(!ws.file_exists("rules/b.md"));
    // The merge target is never namespaced
    assert!(ws.file_exists("mcp.json"));
    assert!(!ws.file_exists("q/mcp.json"));
}

#[test]
fn test_skip_leaves_existing_file() {
    let ws = TestWorkspace::new();
    ws.create_pack("packs/p", &[("rules/a.md", "# from p")]);
    ws.create_pack("packs/q", &[("rules/a.md", "# from q"), ("rules/b.md", "# b")]);

    assert!(install(
        &ws,
        &[DependencyDecl::local("p", "./packs/p")],
        ConflictStrategy::Skip,
    ));
    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Skip,
    ));

    assert_eq!(ws.read_file("rules/a.md"), "# from p");
    assert_eq!(ws.read_file("rules/b.md"), "# b");
    assert!(!ws.file_exists("rules/q/a.md"));
}

#[test]
fn test_overwrite_wins_canonical_path() {
    let ws = TestWorkspace::new();
    ws.create_pack("packs/p", &[("rules/a.md", "# from p")]);
    ws.create_pack("packs/q", &[("rules/a.md", "# from q")]);

    assert!(install(
        &ws,
        &[DependencyDecl::local("p", "./packs/p")],
        ConflictStrategy::Overwrite,
    ));
    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Overwrite,
    ));

    assert_eq!(ws.read_file("rules/a.md"), "# from q");
}

#[test]
fn test_user_authored_file_is_a_conflict() {
    let ws = TestWorkspace::new();
    // User file on disk, no ledger entry
    ws.write_file("rules/a.md", "# hand written");
    ws.create_pack("packs/q", &[("rules/a.md", "# from q")]);

    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Namespace,
    ));

    assert_eq!(ws.read_file("rules/a.md"), "# hand written");
    assert_eq!(ws.read_file("rules/q/a.md"), "# from q");
}

#[test]
fn test_ask_without_port_degrades_to_skip() {
    let ws = TestWorkspace::new();
    ws.create_pack("packs/p", &[("rules/a.md", "# from p")]);
    ws.create_pack("packs/q", &[("rules/a.md", "# from q")]);

    assert!(install(
        &ws,
        &[DependencyDecl::local("p", "./packs/p")],
        ConflictStrategy::Ask,
    ));
    assert!(install(
        &ws,
        &[DependencyDecl::local("q", "./packs/q")],
        ConflictStrategy::Ask,
    ));

    assert_eq!(ws.read_file("rules/a.md"), "# from p");
    assert!(!ws.file_exists("rules/q/a.md"));
}
