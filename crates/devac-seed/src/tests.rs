//! Unit tests for seed storage semantics

use std::collections::HashSet;

use devac_core::{
    Edge, EdgeType, ExternalRef, Node, NodeKind, ParseResult, compute_content_hash,
};
use tempfile::TempDir;

use crate::layout;
use crate::reader::SeedReader;
use crate::writer::{SeedWriter, WriteOptions};

fn node(name: &str, file: &str) -> Node {
    Node {
        entity_id: format!("repo:pkg:function:{name}"),
        name: name.to_string(),
        qualified_name: name.to_string(),
        kind: NodeKind::Function,
        file_path: file.to_string(),
        start_line: 1,
        end_line: 3,
        source_file_hash: compute_content_hash(file.as_bytes()),
        ..Default::default()
    }
}

fn edge(source: &str, target: &str, file: &str) -> Edge {
    Edge {
        source_entity_id: source.to_string(),
        target_entity_id: target.to_string(),
        edge_type: EdgeType::Calls,
        source_file_path: file.to_string(),
        source_line: 2,
        ..Default::default()
    }
}

fn ext_ref(source: &str, module: &str, symbol: &str, file: &str) -> ExternalRef {
    ExternalRef {
        source_entity_id: source.to_string(),
        source_file_path: file.to_string(),
        source_line: 1,
        module_specifier: module.to_string(),
        imported_symbol: symbol.to_string(),
        target_entity_id: format!("unresolved:{symbol}"),
        ..Default::default()
    }
}

fn result_for(file: &str, nodes: Vec<Node>, edges: Vec<Edge>, refs: Vec<ExternalRef>) -> ParseResult {
    ParseResult {
        nodes,
        edges,
        external_refs: refs,
        source_file_hash: compute_content_hash(file.as_bytes()),
        file_path: file.to_string(),
        parse_time_ms: 1,
        warnings: Vec::new(),
    }
}

#[test]
fn write_then_read_round_trips() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let result = result_for(
        "src/a.ts",
        vec![node("helper", "src/a.ts"), node("formatName", "src/a.ts")],
        vec![edge("repo:pkg:function:helper", "unresolved:x", "src/a.ts")],
        vec![ext_ref("repo:pkg:function:helper", "./b", "b", "src/a.ts")],
    );
    let report = writer.write_file(&result, &WriteOptions::default()).unwrap();
    assert_eq!(report.nodes_written, 2);

    let nodes = reader.nodes(None).unwrap();
    let names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, HashSet::from(["helper", "formatName"]));
    // Rows come back on the base branch with the write's timestamp applied.
    assert!(nodes.iter().all(|n| n.branch == "base" && !n.is_deleted));
    assert!(nodes.iter().all(|n| !n.updated_at.is_empty()));

    assert_eq!(reader.edges(None).unwrap().len(), 1);
    assert_eq!(reader.external_refs(None).unwrap().len(), 1);
    assert!(layout::meta_path(writer.seed_dir()).exists());
}

#[test]
fn update_preserves_unrelated_files() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let a = result_for("src/a.ts", vec![node("fromA", "src/a.ts")], vec![], vec![]);
    let b = result_for("src/b.ts", vec![node("fromB", "src/b.ts")], vec![], vec![]);
    writer.write_file(&a, &WriteOptions::default()).unwrap();
    writer.write_file(&b, &WriteOptions::default()).unwrap();

    // Rewrite a.ts with different content; b.ts rows must survive.
    let a2 = result_for("src/a.ts", vec![node("fromA2", "src/a.ts")], vec![], vec![]);
    writer
        .update_file(&["src/a.ts".to_string()], &a2, &WriteOptions::default())
        .unwrap();

    let names: HashSet<String> = reader
        .nodes(None)
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert_eq!(names, HashSet::from(["fromA2".to_string(), "fromB".to_string()]));
}

#[test]
fn delete_on_base_removes_all_three_relations() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let a = result_for(
        "src/a.ts",
        vec![node("helper", "src/a.ts")],
        vec![edge("repo:pkg:function:helper", "unresolved:x", "src/a.ts")],
        vec![ext_ref("repo:pkg:function:helper", "./x", "x", "src/a.ts")],
    );
    let b = result_for("src/b.ts", vec![node("fromB", "src/b.ts")], vec![], vec![]);
    writer.write_file(&a, &WriteOptions::default()).unwrap();
    writer.write_file(&b, &WriteOptions::default()).unwrap();

    let report = writer
        .delete_file(&["src/a.ts".to_string()], &WriteOptions::default())
        .unwrap();
    assert_eq!(report.nodes_affected, 1);
    assert_eq!(report.edges_affected, 1);
    assert_eq!(report.external_refs_affected, 1);

    assert!(reader.nodes(None).unwrap().iter().all(|n| n.file_path != "src/a.ts"));
    assert!(reader.edges(None).unwrap().is_empty());
    assert!(reader.external_refs(None).unwrap().is_empty());
    // The base partition never carries tombstones.
    assert!(reader.nodes(None).unwrap().iter().all(|n| !n.is_deleted));
}

#[test]
fn delete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let a = result_for("src/a.ts", vec![node("helper", "src/a.ts")], vec![], vec![]);
    writer.write_file(&a, &WriteOptions::default()).unwrap();

    writer
        .delete_file(&["src/a.ts".to_string()], &WriteOptions::default())
        .unwrap();
    let second = writer
        .delete_file(&["src/a.ts".to_string()], &WriteOptions::default())
        .unwrap();
    assert_eq!(second.nodes_affected, 0);
    assert!(reader.nodes(None).unwrap().is_empty());
}

#[test]
fn update_equals_delete_then_write() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let writer_a = SeedWriter::new(dir_a.path());
    let writer_b = SeedWriter::new(dir_b.path());

    let v1 = result_for("src/a.ts", vec![node("old", "src/a.ts")], vec![], vec![]);
    let v2 = result_for("src/a.ts", vec![node("new", "src/a.ts")], vec![], vec![]);

    writer_a.write_file(&v1, &WriteOptions::default()).unwrap();
    writer_a
        .update_file(&["src/a.ts".to_string()], &v2, &WriteOptions::default())
        .unwrap();

    writer_b.write_file(&v1, &WriteOptions::default()).unwrap();
    writer_b
        .delete_file(&["src/a.ts".to_string()], &WriteOptions::default())
        .unwrap();
    writer_b.write_file(&v2, &WriteOptions::default()).unwrap();

    let names = |dir: &TempDir| -> Vec<String> {
        let mut names: Vec<String> = SeedReader::new(dir.path())
            .nodes(None)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        names.sort();
        names
    };
    assert_eq!(names(&dir_a), names(&dir_b));
    assert_eq!(names(&dir_a), vec!["new".to_string()]);
}

#[test]
fn branch_update_leaves_base_untouched() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let base = result_for("src/a.ts", vec![node("stable", "src/a.ts")], vec![], vec![]);
    writer.write_file(&base, &WriteOptions::default()).unwrap();

    let feature = result_for("src/a.ts", vec![node("experimental", "src/a.ts")], vec![], vec![]);
    writer
        .update_file(
            &["src/a.ts".to_string()],
            &feature,
            &WriteOptions::branch("feature-x"),
        )
        .unwrap();

    // Base view unchanged.
    let base_names: Vec<String> = reader.nodes(None).unwrap().into_iter().map(|n| n.name).collect();
    assert_eq!(base_names, vec!["stable".to_string()]);

    // Branch view sees the branch rows plus unshadowed base rows; here the
    // branch node has a different entity key, so both appear.
    let branch_names: HashSet<String> = reader
        .nodes(Some("feature-x"))
        .unwrap()
        .into_iter()
        .map(|n| n.name)
        .collect();
    assert!(branch_names.contains("experimental"));
}

#[test]
fn branch_delete_tombstones_shadow_base() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let reader = SeedReader::new(dir.path());

    let base = result_for(
        "src/a.ts",
        vec![node("helper", "src/a.ts")],
        vec![edge("repo:pkg:function:helper", "unresolved:x", "src/a.ts")],
        vec![],
    );
    writer.write_file(&base, &WriteOptions::default()).unwrap();

    let report = writer
        .delete_file(&["src/a.ts".to_string()], &WriteOptions::branch("feature-x"))
        .unwrap();
    assert_eq!(report.nodes_affected, 1);

    // Base still has the row; the branch view hides it.
    assert_eq!(reader.nodes(None).unwrap().len(), 1);
    assert!(reader.nodes(Some("feature-x")).unwrap().is_empty());
    assert!(reader.edges(Some("feature-x")).unwrap().is_empty());

    // The tombstone itself is on disk in the branch partition.
    let branch_rows: Vec<Node> = crate::reader::load_partition(&layout::partition_dir(
        writer.seed_dir(),
        "feature-x",
    ))
    .unwrap();
    assert!(branch_rows.iter().any(|n| n.is_deleted));
}

#[test]
fn missing_seed_reads_as_empty() {
    let dir = TempDir::new().unwrap();
    let reader = SeedReader::new(dir.path());
    assert!(!reader.exists());
    assert!(reader.nodes(None).unwrap().is_empty());
    assert!(reader.edges(Some("anything")).unwrap().is_empty());
}

#[test]
fn incompatible_schema_is_refused() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let result = result_for("src/a.ts", vec![node("x", "src/a.ts")], vec![], vec![]);
    writer.write_file(&result, &WriteOptions::default()).unwrap();

    std::fs::write(
        layout::meta_path(writer.seed_dir()),
        br#"{ "schemaVersion": "99.0.0" }"#,
    )
    .unwrap();

    let reader = SeedReader::new(dir.path());
    assert!(matches!(
        reader.nodes(None),
        Err(crate::SeedError::SchemaIncompatible { .. })
    ));
    assert!(matches!(
        writer.write_file(&result, &WriteOptions::default()),
        Err(crate::SeedError::SchemaIncompatible { .. })
    ));
}

#[test]
fn no_temp_files_survive_a_write() {
    let dir = TempDir::new().unwrap();
    let writer = SeedWriter::new(dir.path());
    let result = result_for("src/a.ts", vec![node("x", "src/a.ts")], vec![], vec![]);
    writer.write_file(&result, &WriteOptions::default()).unwrap();

    let tmp = layout::tmp_dir(writer.seed_dir());
    let leftovers: Vec<_> = std::fs::read_dir(tmp).unwrap().collect();
    assert!(leftovers.is_empty());
}
