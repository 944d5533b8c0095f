//! Fixed column schemas for the three relations
//!
//! Column order and names are stable across a schema major version.
//! List-valued fields and open maps are stored as JSON text columns.

use std::collections::HashMap;

use devac_core::{Edge, EdgeType, ExternalRef, ImportStyle, Node, NodeKind, Visibility};

use crate::columnar::{ColumnData, ColumnDesc, ColumnKind, ColumnTable};
use crate::error::SeedError;

/// A row type persisted as one relation of the seed.
pub trait Relation: Sized + Clone {
    /// Logical relation name, also the SQL view name.
    const NAME: &'static str;
    /// File name inside a partition directory.
    const FILE: &'static str;

    fn schema() -> Vec<ColumnDesc>;
    fn to_columns(rows: &[Self]) -> Vec<(ColumnDesc, ColumnData)>;
    fn from_table(table: &ColumnTable) -> Result<Vec<Self>, SeedError>;

    /// The source-file column this row is keyed by for incremental updates.
    fn file_path_of(&self) -> &str;
    /// String key for branch-over-base shadowing.
    fn overlay_key(&self) -> String;
    fn is_deleted(&self) -> bool;
    fn mark_deleted(&mut self);
    fn set_branch(&mut self, branch: &str);
    fn set_updated_at(&mut self, ts: &str);
}

fn json_vec(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

fn parse_json_vec(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

fn json_map(map: &HashMap<String, serde_json::Value>) -> String {
    serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn parse_json_map(text: &str) -> HashMap<String, serde_json::Value> {
    serde_json::from_str(text).unwrap_or_default()
}

impl Relation for Node {
    const NAME: &'static str = "nodes";
    const FILE: &'static str = "nodes.col";

    fn schema() -> Vec<ColumnDesc> {
        use ColumnKind::*;
        vec![
            ColumnDesc::new("entity_id", Text, true),
            ColumnDesc::new("name", Text, true),
            ColumnDesc::new("qualified_name", Text, true),
            ColumnDesc::new("kind", Text, true),
            ColumnDesc::new("file_path", Text, true),
            ColumnDesc::new("start_line", U32, false),
            ColumnDesc::new("end_line", U32, false),
            ColumnDesc::new("start_column", U32, false),
            ColumnDesc::new("end_column", U32, false),
            ColumnDesc::new("is_exported", Bool, false),
            ColumnDesc::new("is_default_export", Bool, false),
            ColumnDesc::new("is_async", Bool, false),
            ColumnDesc::new("is_generator", Bool, false),
            ColumnDesc::new("is_static", Bool, false),
            ColumnDesc::new("is_abstract", Bool, false),
            ColumnDesc::new("visibility", Text, false),
            ColumnDesc::new("type_signature", OptText, false),
            ColumnDesc::new("type_parameters", Text, false),
            ColumnDesc::new("decorators", Text, false),
            ColumnDesc::new("documentation", OptText, false),
            ColumnDesc::new("properties", Text, false),
            ColumnDesc::new("source_file_hash", Text, true),
            ColumnDesc::new("branch", Text, true),
            ColumnDesc::new("is_deleted", Bool, true),
            ColumnDesc::new("updated_at", Text, false),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<(ColumnDesc, ColumnData)> {
        let schema = Self::schema();
        let mut out = Vec::with_capacity(schema.len());
        for desc in schema {
            let data = match desc.name.as_str() {
                "entity_id" => ColumnData::Text(rows.iter().map(|r| r.entity_id.clone()).collect()),
                "name" => ColumnData::Text(rows.iter().map(|r| r.name.clone()).collect()),
                "qualified_name" => {
                    ColumnData::Text(rows.iter().map(|r| r.qualified_name.clone()).collect())
                }
                "kind" => {
                    ColumnData::Text(rows.iter().map(|r| r.kind.as_str().to_string()).collect())
                }
                "file_path" => ColumnData::Text(rows.iter().map(|r| r.file_path.clone()).collect()),
                "start_line" => ColumnData::U32(rows.iter().map(|r| r.start_line).collect()),
                "end_line" => ColumnData::U32(rows.iter().map(|r| r.end_line).collect()),
                "start_column" => ColumnData::U32(rows.iter().map(|r| r.start_column).collect()),
                "end_column" => ColumnData::U32(rows.iter().map(|r| r.end_column).collect()),
                "is_exported" => ColumnData::Bool(rows.iter().map(|r| r.is_exported).collect()),
                "is_default_export" => {
                    ColumnData::Bool(rows.iter().map(|r| r.is_default_export).collect())
                }
                "is_async" => ColumnData::Bool(rows.iter().map(|r| r.is_async).collect()),
                "is_generator" => ColumnData::Bool(rows.iter().map(|r| r.is_generator).collect()),
                "is_static" => ColumnData::Bool(rows.iter().map(|r| r.is_static).collect()),
                "is_abstract" => ColumnData::Bool(rows.iter().map(|r| r.is_abstract).collect()),
                "visibility" => ColumnData::Text(
                    rows.iter().map(|r| r.visibility.as_str().to_string()).collect(),
                ),
                "type_signature" => {
                    ColumnData::OptText(rows.iter().map(|r| r.type_signature.clone()).collect())
                }
                "type_parameters" => {
                    ColumnData::Text(rows.iter().map(|r| json_vec(&r.type_parameters)).collect())
                }
                "decorators" => {
                    ColumnData::Text(rows.iter().map(|r| json_vec(&r.decorators)).collect())
                }
                "documentation" => {
                    ColumnData::OptText(rows.iter().map(|r| r.documentation.clone()).collect())
                }
                "properties" => {
                    ColumnData::Text(rows.iter().map(|r| json_map(&r.properties)).collect())
                }
                "source_file_hash" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_file_hash.clone()).collect())
                }
                "branch" => ColumnData::Text(rows.iter().map(|r| r.branch.clone()).collect()),
                "is_deleted" => ColumnData::Bool(rows.iter().map(|r| r.is_deleted).collect()),
                "updated_at" => ColumnData::Text(rows.iter().map(|r| r.updated_at.clone()).collect()),
                other => unreachable!("unmapped node column {other}"),
            };
            out.push((desc, data));
        }
        out
    }

    fn from_table(table: &ColumnTable) -> Result<Vec<Self>, SeedError> {
        let mut rows = Vec::with_capacity(table.row_count);
        for i in 0..table.row_count {
            rows.push(Node {
                entity_id: table.text("entity_id", i),
                name: table.text("name", i),
                qualified_name: table.text("qualified_name", i),
                kind: NodeKind::parse(&table.text("kind", i)),
                file_path: table.text("file_path", i),
                start_line: table.u32("start_line", i),
                end_line: table.u32("end_line", i),
                start_column: table.u32("start_column", i),
                end_column: table.u32("end_column", i),
                is_exported: table.bool("is_exported", i),
                is_default_export: table.bool("is_default_export", i),
                is_async: table.bool("is_async", i),
                is_generator: table.bool("is_generator", i),
                is_static: table.bool("is_static", i),
                is_abstract: table.bool("is_abstract", i),
                visibility: Visibility::parse(&table.text("visibility", i)),
                type_signature: table.opt_text("type_signature", i),
                type_parameters: parse_json_vec(&table.text("type_parameters", i)),
                decorators: parse_json_vec(&table.text("decorators", i)),
                documentation: table.opt_text("documentation", i),
                properties: parse_json_map(&table.text("properties", i)),
                source_file_hash: table.text("source_file_hash", i),
                branch: table.text("branch", i),
                is_deleted: table.bool("is_deleted", i),
                updated_at: table.text("updated_at", i),
            });
        }
        Ok(rows)
    }

    fn file_path_of(&self) -> &str {
        &self.file_path
    }

    fn overlay_key(&self) -> String {
        self.entity_id.clone()
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    fn set_branch(&mut self, branch: &str) {
        self.branch = branch.to_string();
    }

    fn set_updated_at(&mut self, ts: &str) {
        self.updated_at = ts.to_string();
    }
}

impl Relation for Edge {
    const NAME: &'static str = "edges";
    const FILE: &'static str = "edges.col";

    fn schema() -> Vec<ColumnDesc> {
        use ColumnKind::*;
        vec![
            ColumnDesc::new("source_entity_id", Text, true),
            ColumnDesc::new("target_entity_id", Text, true),
            ColumnDesc::new("edge_type", Text, true),
            ColumnDesc::new("source_file_path", Text, true),
            ColumnDesc::new("source_line", U32, false),
            ColumnDesc::new("source_column", U32, false),
            ColumnDesc::new("properties", Text, false),
            ColumnDesc::new("source_file_hash", Text, true),
            ColumnDesc::new("branch", Text, true),
            ColumnDesc::new("is_deleted", Bool, true),
            ColumnDesc::new("updated_at", Text, false),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<(ColumnDesc, ColumnData)> {
        let schema = Self::schema();
        let mut out = Vec::with_capacity(schema.len());
        for desc in schema {
            let data = match desc.name.as_str() {
                "source_entity_id" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_entity_id.clone()).collect())
                }
                "target_entity_id" => {
                    ColumnData::Text(rows.iter().map(|r| r.target_entity_id.clone()).collect())
                }
                "edge_type" => ColumnData::Text(
                    rows.iter().map(|r| r.edge_type.as_str().to_string()).collect(),
                ),
                "source_file_path" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_file_path.clone()).collect())
                }
                "source_line" => ColumnData::U32(rows.iter().map(|r| r.source_line).collect()),
                "source_column" => ColumnData::U32(rows.iter().map(|r| r.source_column).collect()),
                "properties" => {
                    ColumnData::Text(rows.iter().map(|r| json_map(&r.properties)).collect())
                }
                "source_file_hash" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_file_hash.clone()).collect())
                }
                "branch" => ColumnData::Text(rows.iter().map(|r| r.branch.clone()).collect()),
                "is_deleted" => ColumnData::Bool(rows.iter().map(|r| r.is_deleted).collect()),
                "updated_at" => ColumnData::Text(rows.iter().map(|r| r.updated_at.clone()).collect()),
                other => unreachable!("unmapped edge column {other}"),
            };
            out.push((desc, data));
        }
        out
    }

    fn from_table(table: &ColumnTable) -> Result<Vec<Self>, SeedError> {
        let mut rows = Vec::with_capacity(table.row_count);
        for i in 0..table.row_count {
            rows.push(Edge {
                source_entity_id: table.text("source_entity_id", i),
                target_entity_id: table.text("target_entity_id", i),
                edge_type: EdgeType::parse(&table.text("edge_type", i))
                    .unwrap_or(EdgeType::References),
                source_file_path: table.text("source_file_path", i),
                source_line: table.u32("source_line", i),
                source_column: table.u32("source_column", i),
                properties: parse_json_map(&table.text("properties", i)),
                source_file_hash: table.text("source_file_hash", i),
                branch: table.text("branch", i),
                is_deleted: table.bool("is_deleted", i),
                updated_at: table.text("updated_at", i),
            });
        }
        Ok(rows)
    }

    fn file_path_of(&self) -> &str {
        &self.source_file_path
    }

    fn overlay_key(&self) -> String {
        format!(
            "{}\u{1}{}\u{1}{}\u{1}{}\u{1}{}",
            self.source_entity_id,
            self.target_entity_id,
            self.edge_type.as_str(),
            self.source_file_path,
            self.source_line
        )
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    fn set_branch(&mut self, branch: &str) {
        self.branch = branch.to_string();
    }

    fn set_updated_at(&mut self, ts: &str) {
        self.updated_at = ts.to_string();
    }
}

impl Relation for ExternalRef {
    const NAME: &'static str = "external_refs";
    const FILE: &'static str = "external_refs.col";

    fn schema() -> Vec<ColumnDesc> {
        use ColumnKind::*;
        vec![
            ColumnDesc::new("source_entity_id", Text, true),
            ColumnDesc::new("source_file_path", Text, true),
            ColumnDesc::new("source_line", U32, false),
            ColumnDesc::new("source_column", U32, false),
            ColumnDesc::new("module_specifier", Text, true),
            ColumnDesc::new("imported_symbol", Text, true),
            ColumnDesc::new("local_alias", OptText, false),
            ColumnDesc::new("import_style", Text, false),
            ColumnDesc::new("is_type_only", Bool, false),
            ColumnDesc::new("target_entity_id", Text, true),
            ColumnDesc::new("is_resolved", Bool, false),
            ColumnDesc::new("is_reexport", Bool, false),
            ColumnDesc::new("export_alias", OptText, false),
            ColumnDesc::new("source_file_hash", Text, true),
            ColumnDesc::new("branch", Text, true),
            ColumnDesc::new("is_deleted", Bool, true),
            ColumnDesc::new("updated_at", Text, false),
        ]
    }

    fn to_columns(rows: &[Self]) -> Vec<(ColumnDesc, ColumnData)> {
        let schema = Self::schema();
        let mut out = Vec::with_capacity(schema.len());
        for desc in schema {
            let data = match desc.name.as_str() {
                "source_entity_id" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_entity_id.clone()).collect())
                }
                "source_file_path" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_file_path.clone()).collect())
                }
                "source_line" => ColumnData::U32(rows.iter().map(|r| r.source_line).collect()),
                "source_column" => ColumnData::U32(rows.iter().map(|r| r.source_column).collect()),
                "module_specifier" => {
                    ColumnData::Text(rows.iter().map(|r| r.module_specifier.clone()).collect())
                }
                "imported_symbol" => {
                    ColumnData::Text(rows.iter().map(|r| r.imported_symbol.clone()).collect())
                }
                "local_alias" => {
                    ColumnData::OptText(rows.iter().map(|r| r.local_alias.clone()).collect())
                }
                "import_style" => ColumnData::Text(
                    rows.iter().map(|r| r.import_style.as_str().to_string()).collect(),
                ),
                "is_type_only" => ColumnData::Bool(rows.iter().map(|r| r.is_type_only).collect()),
                "target_entity_id" => {
                    ColumnData::Text(rows.iter().map(|r| r.target_entity_id.clone()).collect())
                }
                "is_resolved" => ColumnData::Bool(rows.iter().map(|r| r.is_resolved).collect()),
                "is_reexport" => ColumnData::Bool(rows.iter().map(|r| r.is_reexport).collect()),
                "export_alias" => {
                    ColumnData::OptText(rows.iter().map(|r| r.export_alias.clone()).collect())
                }
                "source_file_hash" => {
                    ColumnData::Text(rows.iter().map(|r| r.source_file_hash.clone()).collect())
                }
                "branch" => ColumnData::Text(rows.iter().map(|r| r.branch.clone()).collect()),
                "is_deleted" => ColumnData::Bool(rows.iter().map(|r| r.is_deleted).collect()),
                "updated_at" => ColumnData::Text(rows.iter().map(|r| r.updated_at.clone()).collect()),
                other => unreachable!("unmapped external_ref column {other}"),
            };
            out.push((desc, data));
        }
        out
    }

    fn from_table(table: &ColumnTable) -> Result<Vec<Self>, SeedError> {
        let mut rows = Vec::with_capacity(table.row_count);
        for i in 0..table.row_count {
            rows.push(ExternalRef {
                source_entity_id: table.text("source_entity_id", i),
                source_file_path: table.text("source_file_path", i),
                source_line: table.u32("source_line", i),
                source_column: table.u32("source_column", i),
                module_specifier: table.text("module_specifier", i),
                imported_symbol: table.text("imported_symbol", i),
                local_alias: table.opt_text("local_alias", i),
                import_style: ImportStyle::parse(&table.text("import_style", i)),
                is_type_only: table.bool("is_type_only", i),
                target_entity_id: table.text("target_entity_id", i),
                is_resolved: table.bool("is_resolved", i),
                is_reexport: table.bool("is_reexport", i),
                export_alias: table.opt_text("export_alias", i),
                source_file_hash: table.text("source_file_hash", i),
                branch: table.text("branch", i),
                is_deleted: table.bool("is_deleted", i),
                updated_at: table.text("updated_at", i),
            });
        }
        Ok(rows)
    }

    fn file_path_of(&self) -> &str {
        &self.source_file_path
    }

    fn overlay_key(&self) -> String {
        format!(
            "{}\u{1}{}\u{1}{}\u{1}{}\u{1}{}",
            self.source_entity_id,
            self.source_line,
            self.source_column,
            self.module_specifier,
            self.imported_symbol
        )
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn mark_deleted(&mut self) {
        self.is_deleted = true;
    }

    fn set_branch(&mut self, branch: &str) {
        self.branch = branch.to_string();
    }

    fn set_updated_at(&mut self, ts: &str) {
        self.updated_at = ts.to_string();
    }
}
