//! Core data structures for the code property graph

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Discriminates what kind of declared symbol a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Namespace,
    Class,
    Interface,
    Enum,
    EnumMember,
    Function,
    Method,
    Property,
    Variable,
    Parameter,
    Type,
    Module,
    Decorator,
    JsxComponent,
    HtmlElement,
    Unknown,
}

impl NodeKind {
    /// Stable snake_case label, used in entity IDs and SQL rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Namespace => "namespace",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Enum => "enum",
            NodeKind::EnumMember => "enum_member",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Property => "property",
            NodeKind::Variable => "variable",
            NodeKind::Parameter => "parameter",
            NodeKind::Type => "type",
            NodeKind::Module => "module",
            NodeKind::Decorator => "decorator",
            NodeKind::JsxComponent => "jsx_component",
            NodeKind::HtmlElement => "html_element",
            NodeKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "namespace" => NodeKind::Namespace,
            "class" => NodeKind::Class,
            "interface" => NodeKind::Interface,
            "enum" => NodeKind::Enum,
            "enum_member" => NodeKind::EnumMember,
            "function" => NodeKind::Function,
            "method" => NodeKind::Method,
            "property" => NodeKind::Property,
            "variable" => NodeKind::Variable,
            "parameter" => NodeKind::Parameter,
            "type" => NodeKind::Type,
            "module" => NodeKind::Module,
            "decorator" => NodeKind::Decorator,
            "jsx_component" => NodeKind::JsxComponent,
            "html_element" => NodeKind::HtmlElement,
            _ => NodeKind::Unknown,
        }
    }
}

impl Default for NodeKind {
    fn default() -> Self {
        NodeKind::Unknown
    }
}

/// Symbol visibility as declared in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
            Visibility::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "protected" => Visibility::Protected,
            "private" => Visibility::Private,
            "internal" => Visibility::Internal,
            _ => Visibility::Public,
        }
    }
}

/// The default branch partition name.
pub const BASE_BRANCH: &str = "base";

/// A declared symbol in the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Globally stable identifier (see `ids`).
    pub entity_id: String,
    pub name: String,
    pub qualified_name: String,
    pub kind: NodeKind,

    /// Package-relative, forward-slashed path.
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,

    pub is_exported: bool,
    pub is_default_export: bool,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub visibility: Visibility,

    pub type_signature: Option<String>,
    pub type_parameters: Vec<String>,
    pub decorators: Vec<String>,
    pub documentation: Option<String>,

    /// Open kind-specific attributes (isStruct, isRecord, htmlElement, ...).
    /// Stored as a single JSON column on disk.
    pub properties: HashMap<String, serde_json::Value>,

    pub source_file_hash: String,
    pub branch: String,
    pub is_deleted: bool,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
}

impl Default for Node {
    fn default() -> Self {
        Node {
            entity_id: String::new(),
            name: String::new(),
            qualified_name: String::new(),
            kind: NodeKind::Unknown,
            file_path: String::new(),
            start_line: 0,
            end_line: 0,
            start_column: 0,
            end_column: 0,
            is_exported: false,
            is_default_export: false,
            is_async: false,
            is_generator: false,
            is_static: false,
            is_abstract: false,
            visibility: Visibility::Public,
            type_signature: None,
            type_parameters: Vec::new(),
            decorators: Vec::new(),
            documentation: None,
            properties: HashMap::new(),
            source_file_hash: String::new(),
            branch: BASE_BRANCH.to_string(),
            is_deleted: false,
            updated_at: String::new(),
        }
    }
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "CALLS")]
    Calls,
    #[serde(rename = "EXTENDS")]
    Extends,
    #[serde(rename = "IMPLEMENTS")]
    Implements,
    #[serde(rename = "DECORATES")]
    Decorates,
    #[serde(rename = "RENDERS")]
    Renders,
    #[serde(rename = "INSTANTIATES")]
    Instantiates,
    #[serde(rename = "PASSES_PROPS")]
    PassesProps,
    #[serde(rename = "IMPORTS")]
    Imports,
    #[serde(rename = "REFERENCES")]
    References,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Contains => "CONTAINS",
            EdgeType::Calls => "CALLS",
            EdgeType::Extends => "EXTENDS",
            EdgeType::Implements => "IMPLEMENTS",
            EdgeType::Decorates => "DECORATES",
            EdgeType::Renders => "RENDERS",
            EdgeType::Instantiates => "INSTANTIATES",
            EdgeType::PassesProps => "PASSES_PROPS",
            EdgeType::Imports => "IMPORTS",
            EdgeType::References => "REFERENCES",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONTAINS" => Some(EdgeType::Contains),
            "CALLS" => Some(EdgeType::Calls),
            "EXTENDS" => Some(EdgeType::Extends),
            "IMPLEMENTS" => Some(EdgeType::Implements),
            "DECORATES" => Some(EdgeType::Decorates),
            "RENDERS" => Some(EdgeType::Renders),
            "INSTANTIATES" => Some(EdgeType::Instantiates),
            "PASSES_PROPS" => Some(EdgeType::PassesProps),
            "IMPORTS" => Some(EdgeType::Imports),
            "REFERENCES" => Some(EdgeType::References),
            _ => None,
        }
    }
}

/// A directed relation between two entities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub source_entity_id: String,
    pub target_entity_id: String,
    pub edge_type: EdgeType,

    /// Where the call/reference is expressed in source.
    pub source_file_path: String,
    pub source_line: u32,
    pub source_column: u32,

    pub properties: HashMap<String, serde_json::Value>,

    pub source_file_hash: String,
    pub branch: String,
    pub is_deleted: bool,
    pub updated_at: String,
}

impl Default for Edge {
    fn default() -> Self {
        Edge {
            source_entity_id: String::new(),
            target_entity_id: String::new(),
            edge_type: EdgeType::References,
            source_file_path: String::new(),
            source_line: 0,
            source_column: 0,
            properties: HashMap::new(),
            source_file_hash: String::new(),
            branch: BASE_BRANCH.to_string(),
            is_deleted: false,
            updated_at: String::new(),
        }
    }
}

impl Edge {
    /// Natural key used for branch-over-base shadowing.
    pub fn overlay_key(&self) -> (String, String, EdgeType, String, u32) {
        (
            self.source_entity_id.clone(),
            self.target_entity_id.clone(),
            self.edge_type,
            self.source_file_path.clone(),
            self.source_line,
        )
    }
}

/// How an imported symbol was brought into scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ImportStyle {
    Default,
    #[default]
    Named,
    Namespace,
    SideEffect,
    Static,
    Alias,
    Global,
}

impl ImportStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStyle::Default => "default",
            ImportStyle::Named => "named",
            ImportStyle::Namespace => "namespace",
            ImportStyle::SideEffect => "side-effect",
            ImportStyle::Static => "static",
            ImportStyle::Alias => "alias",
            ImportStyle::Global => "global",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "default" => ImportStyle::Default,
            "namespace" => ImportStyle::Namespace,
            "side-effect" => ImportStyle::SideEffect,
            "static" => ImportStyle::Static,
            "alias" => ImportStyle::Alias,
            "global" => ImportStyle::Global,
            _ => ImportStyle::Named,
        }
    }
}

/// An unresolved or cross-module reference captured at parse time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalRef {
    pub source_entity_id: String,
    pub source_file_path: String,
    pub source_line: u32,
    pub source_column: u32,

    pub module_specifier: String,
    pub imported_symbol: String,
    pub local_alias: Option<String>,
    pub import_style: ImportStyle,
    pub is_type_only: bool,

    /// `unresolved:<name>` until a semantic resolver runs.
    pub target_entity_id: String,
    pub is_resolved: bool,
    pub is_reexport: bool,
    pub export_alias: Option<String>,

    pub source_file_hash: String,
    pub branch: String,
    pub is_deleted: bool,
    pub updated_at: String,
}

impl Default for ExternalRef {
    fn default() -> Self {
        ExternalRef {
            source_entity_id: String::new(),
            source_file_path: String::new(),
            source_line: 0,
            source_column: 0,
            module_specifier: String::new(),
            imported_symbol: String::new(),
            local_alias: None,
            import_style: ImportStyle::Named,
            is_type_only: false,
            target_entity_id: String::new(),
            is_resolved: false,
            is_reexport: false,
            export_alias: None,
            source_file_hash: String::new(),
            branch: BASE_BRANCH.to_string(),
            is_deleted: false,
            updated_at: String::new(),
        }
    }
}

impl ExternalRef {
    /// Natural key used for branch-over-base shadowing.
    pub fn overlay_key(&self) -> (String, u32, u32, String, String) {
        (
            self.source_entity_id.clone(),
            self.source_line,
            self.source_column,
            self.module_specifier.clone(),
            self.imported_symbol.clone(),
        )
    }
}

/// Current wall-clock time as the RFC 3339 string stored in `updated_at`.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
