//! SQL query layer over the package seeds
//!
//! Overlay-applied rows are materialized into an in-memory SQLite database:
//! one `nodes_<pkg>` / `edges_<pkg>` / `external_refs_<pkg>` table set per
//! package, `*_all` union views across every package in scope, and
//! unqualified `nodes` / `edges` / `external_refs` views bound to the
//! primary package of the query context (the union when none is named).
//!
//! The `table@package` rewrite is deliberately syntactic: a conservative
//! regex over the three fixed relation tokens, not a SQL parser.

use std::collections::HashMap;
use std::time::Instant;

use devac_core::{Edge, ExternalRef, Node};
use regex::Regex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::HubError;

pub const RELATIONS: &[&str] = &["nodes", "edges", "external_refs"];

/// Overlay-applied rows of one package, ready for materialization.
#[derive(Debug, Default, Clone)]
pub struct PackageRows {
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub external_refs: Vec<ExternalRef>,
}

#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub time_ms: u64,
    pub views_created: Vec<String>,
    pub warnings: Vec<String>,
}

/// SQL-safe table suffix for a package name.
pub fn sanitize_package_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Expand `nodes@pkg` / `edges@*` forms into concrete table names.
/// Unknown packages are an input error, not a silent empty result.
pub fn rewrite_package_refs(sql: &str, known: &[String]) -> Result<String, HubError> {
    let pattern = Regex::new(r"\b(nodes|edges|external_refs)@([A-Za-z0-9_.\-]+|\*)")
        .expect("static regex");
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for caps in pattern.captures_iter(sql) {
        let whole = caps.get(0).expect("capture 0");
        let relation = &caps[1];
        let package = &caps[2];
        out.push_str(&sql[last..whole.start()]);
        if package == "*" {
            out.push_str(&format!("{relation}_all"));
        } else if known.iter().any(|k| k == package) {
            out.push_str(&format!("{relation}_{}", sanitize_package_name(package)));
        } else {
            return Err(HubError::Input(format!("unknown package @{package}")));
        }
        last = whole.end();
    }
    out.push_str(&sql[last..]);
    Ok(out)
}

/// An in-memory SQLite database holding the materialized views for one
/// query context.
pub struct QueryEngine {
    conn: Connection,
    views_created: Vec<String>,
}

impl QueryEngine {
    /// Materialize `packages` and bind views. `primary` selects the package
    /// behind the unqualified relation names; `None` binds them to the
    /// cross-package union.
    pub fn build(packages: &[PackageRows], primary: Option<&str>) -> Result<Self, HubError> {
        let conn = Connection::open_in_memory()?;
        let mut views_created = Vec::new();

        for pkg in packages {
            let suffix = sanitize_package_name(&pkg.name);
            create_node_table(&conn, &format!("nodes_{suffix}"), &pkg.nodes)?;
            create_edge_table(&conn, &format!("edges_{suffix}"), &pkg.edges)?;
            create_ref_table(&conn, &format!("external_refs_{suffix}"), &pkg.external_refs)?;
            for relation in RELATIONS {
                views_created.push(format!("{relation}_{suffix}"));
            }
        }

        // Union views across every package in scope.
        for relation in RELATIONS {
            let union = if packages.is_empty() {
                // Keep the views well-defined even with nothing registered.
                match *relation {
                    "nodes" => {
                        create_node_table(&conn, "nodes_all", &[])?;
                        None
                    }
                    "edges" => {
                        create_edge_table(&conn, "edges_all", &[])?;
                        None
                    }
                    _ => {
                        create_ref_table(&conn, "external_refs_all", &[])?;
                        None
                    }
                }
            } else {
                let selects: Vec<String> = packages
                    .iter()
                    .map(|p| {
                        format!(
                            "SELECT * FROM {relation}_{}",
                            sanitize_package_name(&p.name)
                        )
                    })
                    .collect();
                Some(format!(
                    "CREATE VIEW {relation}_all AS {}",
                    selects.join(" UNION ALL ")
                ))
            };
            if let Some(ddl) = union {
                conn.execute_batch(&ddl)?;
            }
            views_created.push(format!("{relation}_all"));
        }

        // Unqualified views resolve against the primary package.
        let primary_suffix = primary
            .map(sanitize_package_name)
            .filter(|s| packages.iter().any(|p| sanitize_package_name(&p.name) == *s));
        for relation in RELATIONS {
            let target = match &primary_suffix {
                Some(suffix) => format!("{relation}_{suffix}"),
                None => format!("{relation}_all"),
            };
            conn.execute_batch(&format!("CREATE VIEW {relation} AS SELECT * FROM {target}"))?;
            views_created.push(relation.to_string());
        }

        Ok(QueryEngine {
            conn,
            views_created,
        })
    }

    /// Execute one read-only statement and shape the rows as JSON objects.
    pub fn run(&self, sql: &str) -> Result<QueryOutput, HubError> {
        let started = Instant::now();
        let mut stmt = self.conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(HubError::Input(
                "only read-only queries may run against the seed views".to_string(),
            ));
        }
        let column_names: Vec<String> =
            stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = Vec::new();
        let mut raw = stmt.query([])?;
        while let Some(row) = raw.next()? {
            let mut object = Map::with_capacity(column_names.len());
            for (i, name) in column_names.iter().enumerate() {
                object.insert(name.clone(), value_to_json(row.get_ref(i)?));
            }
            rows.push(object);
        }

        let row_count = rows.len();
        debug!("query returned {row_count} rows in {:?}", started.elapsed());
        Ok(QueryOutput {
            rows,
            row_count,
            time_ms: started.elapsed().as_millis() as u64,
            views_created: self.views_created.clone(),
            warnings: Vec::new(),
        })
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(devac_core::compute_content_hash(b)),
    }
}

fn json_text(map: &HashMap<String, Value>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn json_list(list: &[String]) -> String {
    serde_json::to_string(list).unwrap_or_else(|_| "[]".to_string())
}

fn create_node_table(conn: &Connection, table: &str, rows: &[Node]) -> Result<(), HubError> {
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            entity_id TEXT NOT NULL,
            name TEXT NOT NULL,
            qualified_name TEXT NOT NULL,
            kind TEXT NOT NULL,
            file_path TEXT NOT NULL,
            start_line INTEGER,
            end_line INTEGER,
            start_column INTEGER,
            end_column INTEGER,
            is_exported INTEGER,
            is_default_export INTEGER,
            is_async INTEGER,
            is_generator INTEGER,
            is_static INTEGER,
            is_abstract INTEGER,
            visibility TEXT,
            type_signature TEXT,
            type_parameters TEXT,
            decorators TEXT,
            documentation TEXT,
            properties TEXT,
            source_file_hash TEXT,
            branch TEXT,
            is_deleted INTEGER,
            updated_at TEXT
        )"
    ))?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)"
    ))?;
    for n in rows {
        stmt.execute(rusqlite::params![
            n.entity_id,
            n.name,
            n.qualified_name,
            n.kind.as_str(),
            n.file_path,
            n.start_line,
            n.end_line,
            n.start_column,
            n.end_column,
            n.is_exported,
            n.is_default_export,
            n.is_async,
            n.is_generator,
            n.is_static,
            n.is_abstract,
            n.visibility.as_str(),
            n.type_signature,
            json_list(&n.type_parameters),
            json_list(&n.decorators),
            n.documentation,
            json_text(&n.properties),
            n.source_file_hash,
            n.branch,
            n.is_deleted,
            n.updated_at,
        ])?;
    }
    Ok(())
}

fn create_edge_table(conn: &Connection, table: &str, rows: &[Edge]) -> Result<(), HubError> {
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            source_entity_id TEXT NOT NULL,
            target_entity_id TEXT NOT NULL,
            edge_type TEXT NOT NULL,
            source_file_path TEXT NOT NULL,
            source_line INTEGER,
            source_column INTEGER,
            properties TEXT,
            source_file_hash TEXT,
            branch TEXT,
            is_deleted INTEGER,
            updated_at TEXT
        )"
    ))?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)"
    ))?;
    for e in rows {
        stmt.execute(rusqlite::params![
            e.source_entity_id,
            e.target_entity_id,
            e.edge_type.as_str(),
            e.source_file_path,
            e.source_line,
            e.source_column,
            json_text(&e.properties),
            e.source_file_hash,
            e.branch,
            e.is_deleted,
            e.updated_at,
        ])?;
    }
    Ok(())
}

fn create_ref_table(conn: &Connection, table: &str, rows: &[ExternalRef]) -> Result<(), HubError> {
    conn.execute_batch(&format!(
        "CREATE TABLE {table} (
            source_entity_id TEXT NOT NULL,
            source_file_path TEXT NOT NULL,
            source_line INTEGER,
            source_column INTEGER,
            module_specifier TEXT NOT NULL,
            imported_symbol TEXT NOT NULL,
            local_alias TEXT,
            import_style TEXT,
            is_type_only INTEGER,
            target_entity_id TEXT,
            is_resolved INTEGER,
            is_reexport INTEGER,
            export_alias TEXT,
            source_file_hash TEXT,
            branch TEXT,
            is_deleted INTEGER,
            updated_at TEXT
        )"
    ))?;
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {table} VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
    ))?;
    for r in rows {
        stmt.execute(rusqlite::params![
            r.source_entity_id,
            r.source_file_path,
            r.source_line,
            r.source_column,
            r.module_specifier,
            r.imported_symbol,
            r.local_alias,
            r.import_style.as_str(),
            r.is_type_only,
            r.target_entity_id,
            r.is_resolved,
            r.is_reexport,
            r.export_alias,
            r.source_file_hash,
            r.branch,
            r.is_deleted,
            r.updated_at,
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use devac_core::NodeKind;

    fn pkg(name: &str, node_names: &[&str]) -> PackageRows {
        PackageRows {
            name: name.to_string(),
            nodes: node_names
                .iter()
                .map(|n| Node {
                    entity_id: format!("repo:{name}:function:{n}"),
                    name: n.to_string(),
                    qualified_name: n.to_string(),
                    kind: NodeKind::Function,
                    file_path: "src/a.ts".to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn rewrite_expands_known_packages() {
        let known = vec!["app".to_string(), "lib".to_string()];
        let sql = "SELECT * FROM nodes@app JOIN edges@lib ON 1=1";
        let rewritten = rewrite_package_refs(sql, &known).unwrap();
        assert_eq!(
            rewritten,
            "SELECT * FROM nodes_app JOIN edges_lib ON 1=1"
        );
    }

    #[test]
    fn rewrite_star_expands_to_union() {
        let rewritten =
            rewrite_package_refs("SELECT count(*) FROM external_refs@*", &[]).unwrap();
        assert_eq!(rewritten, "SELECT count(*) FROM external_refs_all");
    }

    #[test]
    fn rewrite_rejects_unknown_package() {
        let err = rewrite_package_refs("SELECT * FROM nodes@ghost", &[]).unwrap_err();
        assert!(matches!(err, HubError::Input(_)));
    }

    #[test]
    fn rewrite_leaves_plain_sql_alone() {
        let sql = "SELECT name FROM nodes WHERE kind = 'function'";
        assert_eq!(rewrite_package_refs(sql, &[]).unwrap(), sql);
    }

    #[test]
    fn rewrite_sanitizes_hyphenated_names() {
        let known = vec!["my-app".to_string()];
        let rewritten = rewrite_package_refs("SELECT * FROM nodes@my-app", &known).unwrap();
        assert_eq!(rewritten, "SELECT * FROM nodes_my_app");
    }

    #[test]
    fn unqualified_views_bind_to_primary() {
        let engine =
            QueryEngine::build(&[pkg("app", &["a1"]), pkg("lib", &["l1", "l2"])], Some("lib"))
                .unwrap();
        let out = engine.run("SELECT count(*) AS n FROM nodes").unwrap();
        assert_eq!(out.rows[0]["n"], serde_json::json!(2));

        let all = engine.run("SELECT count(*) AS n FROM nodes_all").unwrap();
        assert_eq!(all.rows[0]["n"], serde_json::json!(3));
    }

    #[test]
    fn no_packages_still_answers_scalar_queries() {
        let engine = QueryEngine::build(&[], None).unwrap();
        let out = engine.run("SELECT 1 AS test").unwrap();
        assert_eq!(out.rows, vec![Map::from_iter([(
            "test".to_string(),
            Value::from(1)
        )])]);
        assert_eq!(engine.run("SELECT count(*) AS n FROM nodes").unwrap().rows[0]["n"], serde_json::json!(0));
    }

    #[test]
    fn mutating_sql_is_refused() {
        let engine = QueryEngine::build(&[pkg("app", &["a1"])], None).unwrap();
        let err = engine.run("DELETE FROM nodes_app").unwrap_err();
        assert!(matches!(err, HubError::Input(_)));
    }

    #[test]
    fn kind_filter_matches_stored_labels() {
        let engine = QueryEngine::build(&[pkg("app", &["helper", "formatName"])], None).unwrap();
        let out = engine
            .run("SELECT name FROM nodes WHERE kind = 'function' ORDER BY name")
            .unwrap();
        let names: Vec<&str> = out.rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["formatName", "helper"]);
    }
}
