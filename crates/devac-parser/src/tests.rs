//! Unit tests for the TypeScript/JavaScript parser

use std::path::Path;

use devac_core::{EdgeType, ImportStyle, LanguageParser, NodeKind, ParserContext};

use crate::registry::ParserRegistry;
use crate::typescript::{JavaScriptParser, TypeScriptParser};

fn ctx() -> ParserContext {
    ParserContext::new("repo", "pkg")
}

fn parse(source: &str, path: &str) -> devac_core::ParseResult {
    TypeScriptParser
        .parse_content(source, path, &ctx())
        .expect("parse should not fail")
}

#[test]
fn extracts_functions_and_variables() {
    let source = r#"
function helper(): string { return "helper"; }
function formatName(n) { return n.toUpperCase(); }
const CONSTANT = 42;
"#;
    let result = parse(source, "src/util.ts");

    let functions: Vec<&str> = result
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Function)
        .map(|n| n.name.as_str())
        .collect();
    assert!(functions.contains(&"helper"));
    assert!(functions.contains(&"formatName"));

    let variables: Vec<&str> = result
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Variable)
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(variables, vec!["CONSTANT"]);
    assert!(result.warnings.is_empty());
}

#[test]
fn every_node_shares_the_file_hash() {
    let result = parse("function a() {}\nclass B { m() {} }\n", "src/x.ts");
    assert!(!result.source_file_hash.is_empty());
    for node in &result.nodes {
        assert_eq!(node.source_file_hash, result.source_file_hash);
    }
    for edge in &result.edges {
        assert_eq!(edge.source_file_hash, result.source_file_hash);
    }
}

#[test]
fn contained_entities_get_contains_edges() {
    let source = r#"
class DataService {
    process(d) { return d; }
    count: number = 0;
}
"#;
    let result = parse(source, "src/service.ts");

    let class = result
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Class && n.name == "DataService")
        .expect("class node");
    let method = result
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Method && n.name == "process")
        .expect("method node");
    let property = result
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Property && n.name == "count")
        .expect("property node");

    for target in [&method.entity_id, &property.entity_id] {
        assert!(
            result.edges.iter().any(|e| {
                e.edge_type == EdgeType::Contains
                    && e.source_entity_id == class.entity_id
                    && &e.target_entity_id == target
            }),
            "missing CONTAINS edge to {target}"
        );
    }
    assert_eq!(method.qualified_name, "DataService.process");
}

#[test]
fn calls_resolve_within_the_file() {
    let source = r#"
function helper() { return "h"; }
function formatName(n) { return n; }
function processData(input) { return formatName(helper() + input); }
class DataService {
    process(d) { return processData(d); }
}
"#;
    let result = parse(source, "src/b.ts");

    let id_of = |name: &str| {
        result
            .nodes
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.entity_id.clone())
            .unwrap()
    };
    let calls: Vec<(String, String)> = result
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Calls)
        .map(|e| (e.source_entity_id.clone(), e.target_entity_id.clone()))
        .collect();

    assert!(calls.contains(&(id_of("processData"), id_of("helper"))));
    assert!(calls.contains(&(id_of("processData"), id_of("formatName"))));
    assert!(calls.contains(&(id_of("process"), id_of("processData"))));
}

#[test]
fn unresolved_calls_use_the_sentinel() {
    let result = parse("function go() { missing(); }\n", "src/go.ts");
    let call = result
        .edges
        .iter()
        .find(|e| e.edge_type == EdgeType::Calls)
        .expect("call edge");
    assert_eq!(call.target_entity_id, "unresolved:missing");
}

#[test]
fn imports_emit_refs_and_edges() {
    let source = r#"
import Default from "./a";
import { helper, formatName as fmt } from "./util";
import * as ns from "./ns";
import type { OnlyType } from "./types";
import "./side-effect";
"#;
    let result = parse(source, "src/imports.ts");

    assert_eq!(result.external_refs.len(), 6);
    let by_symbol = |s: &str| {
        result
            .external_refs
            .iter()
            .find(|r| r.imported_symbol == s)
            .unwrap()
    };
    assert_eq!(by_symbol("Default").import_style, ImportStyle::Default);
    assert_eq!(by_symbol("helper").import_style, ImportStyle::Named);
    let aliased = by_symbol("formatName");
    assert_eq!(aliased.import_style, ImportStyle::Alias);
    assert_eq!(aliased.local_alias.as_deref(), Some("fmt"));
    assert_eq!(by_symbol("*").import_style, ImportStyle::Namespace);
    assert!(by_symbol("OnlyType").is_type_only);
    let side_effect = result
        .external_refs
        .iter()
        .find(|r| r.import_style == ImportStyle::SideEffect)
        .unwrap();
    assert_eq!(side_effect.module_specifier, "./side-effect");

    let import_edges = result
        .edges
        .iter()
        .filter(|e| e.edge_type == EdgeType::Imports)
        .count();
    assert_eq!(import_edges, 6);
}

#[test]
fn heritage_edges_are_emitted() {
    let source = r#"
interface Writeable { write(data: string): void; }
class Base {}
class Derived extends Base implements Writeable {
    write(data: string): void {}
}
"#;
    let result = parse(source, "src/h.ts");

    let id_of = |name: &str| {
        result
            .nodes
            .iter()
            .find(|n| n.name == name)
            .map(|n| n.entity_id.clone())
            .unwrap()
    };
    assert!(result.edges.iter().any(|e| {
        e.edge_type == EdgeType::Extends
            && e.source_entity_id == id_of("Derived")
            && e.target_entity_id == id_of("Base")
    }));
    assert!(result.edges.iter().any(|e| {
        e.edge_type == EdgeType::Implements
            && e.source_entity_id == id_of("Derived")
            && e.target_entity_id == id_of("Writeable")
    }));
}

#[test]
fn enums_and_members() {
    let result = parse("enum Color { Red, Green = 2 }\n", "src/color.ts");
    let e = result
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Enum)
        .expect("enum node");
    let members: Vec<&str> = result
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::EnumMember)
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(members, vec!["Red", "Green"]);
    for m in result.nodes.iter().filter(|n| n.kind == NodeKind::EnumMember) {
        assert!(result.edges.iter().any(|edge| {
            edge.edge_type == EdgeType::Contains
                && edge.source_entity_id == e.entity_id
                && edge.target_entity_id == m.entity_id
        }));
    }
}

#[test]
fn arrow_function_consts_are_functions() {
    let result = parse("export const fetchData = async (url) => { return url; };\n", "src/f.ts");
    let f = result
        .nodes
        .iter()
        .find(|n| n.name == "fetchData")
        .expect("fetchData node");
    assert_eq!(f.kind, NodeKind::Function);
    assert!(f.is_async);
    assert!(f.is_exported);
}

#[test]
fn empty_and_comment_only_files_parse_cleanly() {
    for source in ["", "// just a comment\n/* and another */\n"] {
        let result = parse(source, "src/empty.ts");
        // Only the file-level module node, nothing else.
        assert_eq!(result.nodes.iter().filter(|n| n.kind != NodeKind::Module).count(), 0);
        assert!(result.edges.is_empty());
        assert!(result.external_refs.is_empty());
        assert!(result.warnings.is_empty());
    }
}

#[test]
fn syntax_errors_yield_warnings_not_failures() {
    let result = parse("function broken( { this is not typescript", "src/broken.ts");
    assert!(!result.warnings.is_empty());
}

#[test]
fn entity_ids_are_stable_across_parses() {
    let source = "function helper() {}\n";
    let a = parse(source, "src/util.ts");
    let b = parse(source, "src/util.ts");
    let find = |r: &devac_core::ParseResult| {
        r.nodes
            .iter()
            .find(|n| n.name == "helper")
            .map(|n| n.entity_id.clone())
            .unwrap()
    };
    assert_eq!(find(&a), find(&b));
}

#[test]
fn registry_routes_by_extension() {
    let registry = ParserRegistry::with_defaults();
    assert_eq!(
        registry.for_path(Path::new("a.ts")).unwrap().language(),
        "typescript"
    );
    assert_eq!(
        registry.for_path(Path::new("a.mjs")).unwrap().language(),
        "javascript"
    );
    assert!(registry.for_path(Path::new("a.py")).is_none());
    // Type declaration files carry no structural content.
    assert!(registry.for_path(Path::new("lib.d.ts")).is_none());
}

#[test]
fn javascript_parser_handles_plain_js() {
    let result = JavaScriptParser
        .parse_content("function f() { g(); }\nfunction g() {}\n", "src/a.js", &ctx())
        .unwrap();
    assert_eq!(
        result
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Function)
            .count(),
        2
    );
    assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Calls));
}

#[test]
fn decorated_class_records_decorators() {
    let source = r#"
function Injectable() { return (t) => t; }
@Injectable()
class Service {}
"#;
    let result = parse(source, "src/s.ts");
    let class = result
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Class)
        .expect("class node");
    assert_eq!(class.decorators, vec!["Injectable"]);
    assert!(result.edges.iter().any(|e| e.edge_type == EdgeType::Decorates));
}
