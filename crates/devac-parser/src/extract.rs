//! AST walk that turns a tree-sitter parse into graph rows
//!
//! Two passes: the walk collects nodes and unresolved relationship sites,
//! then call/extends/instantiates targets are resolved against the symbols
//! declared in the same file. Anything that cannot be resolved locally gets
//! the `unresolved:<name>` sentinel.

use std::collections::HashMap;

use devac_core::{
    Edge, EdgeType, ExternalRef, ImportStyle, Node, NodeKind, ParseResult, ParserContext,
    Visibility, generate_entity_id, now_timestamp, unresolved,
};
use tree_sitter::Node as TsNode;

/// A relationship site recorded during the walk, resolved afterwards.
struct PendingEdge {
    /// Entity already known by ID. The target, except for DECORATES where
    /// the named side is the decorator acting as the source.
    fixed_entity_id: String,
    named: String,
    named_is_source: bool,
    edge_type: EdgeType,
    line: u32,
    column: u32,
    properties: HashMap<String, serde_json::Value>,
}

struct Scope {
    entity_id: String,
    qualified_name: String,
    kind: NodeKind,
}

pub struct Extractor<'a> {
    source: &'a [u8],
    file_path: String,
    file_hash: String,
    updated_at: String,
    ctx: &'a ParserContext,

    nodes: Vec<Node>,
    edges: Vec<Edge>,
    refs: Vec<ExternalRef>,
    warnings: Vec<String>,

    /// Simple name → entity_id of same-file declarations, first wins.
    declared: HashMap<String, String>,
    pending: Vec<PendingEdge>,
    scopes: Vec<Scope>,
}

impl<'a> Extractor<'a> {
    pub fn run(
        root: TsNode<'_>,
        source: &'a [u8],
        file_path: &str,
        file_hash: &str,
        ctx: &'a ParserContext,
    ) -> ParseResult {
        let mut ex = Extractor {
            source,
            file_path: file_path.to_string(),
            file_hash: file_hash.to_string(),
            updated_at: now_timestamp(),
            ctx,
            nodes: Vec::new(),
            edges: Vec::new(),
            refs: Vec::new(),
            warnings: Vec::new(),
            declared: HashMap::new(),
            pending: Vec::new(),
            scopes: Vec::new(),
        };

        if root.has_error() {
            ex.collect_error_warnings(root);
        }

        // File-level module node roots the containment tree.
        let module_name = module_name_of(file_path);
        let module_id = ex.make_node(|n| {
            n.kind = NodeKind::Module;
            n.name = module_name.clone();
            n.qualified_name = module_name.clone();
            n.start_line = 1;
            n.end_line = (root.end_position().row as u32).max(1);
        });
        ex.scopes.push(Scope {
            entity_id: module_id,
            qualified_name: module_name,
            kind: NodeKind::Module,
        });

        ex.visit_children(root, false, false);
        ex.resolve_pending();

        ParseResult {
            nodes: ex.nodes,
            edges: ex.edges,
            external_refs: ex.refs,
            source_file_hash: ex.file_hash,
            file_path: ex.file_path,
            parse_time_ms: 0,
            warnings: ex.warnings,
        }
    }

    // ── Row construction ────────────────────────────────────

    fn make_node(&mut self, fill: impl FnOnce(&mut Node)) -> String {
        let mut node = Node {
            file_path: self.file_path.clone(),
            source_file_hash: self.file_hash.clone(),
            updated_at: self.updated_at.clone(),
            ..Default::default()
        };
        fill(&mut node);
        node.entity_id = generate_entity_id(
            &self.ctx.repo,
            &self.ctx.package,
            node.kind,
            &self.file_path,
            &node.qualified_name,
        );
        let id = node.entity_id.clone();
        self.declared.entry(node.name.clone()).or_insert_with(|| id.clone());
        self.nodes.push(node);
        id
    }

    fn make_edge(
        &mut self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        line: u32,
        column: u32,
        properties: HashMap<String, serde_json::Value>,
    ) {
        self.edges.push(Edge {
            source_entity_id: source.to_string(),
            target_entity_id: target.to_string(),
            edge_type,
            source_file_path: self.file_path.clone(),
            source_line: line,
            source_column: column,
            properties,
            source_file_hash: self.file_hash.clone(),
            updated_at: self.updated_at.clone(),
            ..Default::default()
        });
    }

    fn contains(&mut self, parent: &str, child: &str, line: u32) {
        self.make_edge(parent, child, EdgeType::Contains, line, 0, HashMap::new());
    }

    fn defer(&mut self, source: &str, target_name: &str, edge_type: EdgeType, ts: TsNode<'_>) {
        self.pending.push(PendingEdge {
            fixed_entity_id: source.to_string(),
            named: target_name.to_string(),
            named_is_source: false,
            edge_type,
            line: line_of(ts),
            column: col_of(ts),
            properties: HashMap::new(),
        });
    }

    fn resolve_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for p in pending {
            let resolved = self
                .declared
                .get(&p.named)
                .cloned()
                .unwrap_or_else(|| unresolved(&p.named));
            let (source, target) = if p.named_is_source {
                (resolved, p.fixed_entity_id)
            } else {
                (p.fixed_entity_id, resolved)
            };
            self.make_edge(&source, &target, p.edge_type, p.line, p.column, p.properties);
        }
    }

    fn collect_error_warnings(&mut self, root: TsNode<'_>) {
        let mut cursor = root.walk();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if node.kind() == "ERROR" || node.is_missing() {
                self.warnings.push(format!(
                    "syntax error at {}:{}",
                    line_of(node),
                    col_of(node) + 1
                ));
                if self.warnings.len() >= 20 {
                    self.warnings.push("further syntax errors suppressed".to_string());
                    return;
                }
                continue;
            }
            if node.has_error() {
                for child in node.children(&mut cursor) {
                    stack.push(child);
                }
            }
        }
        if self.warnings.is_empty() {
            // has_error() without a visible ERROR node still means the parse
            // was not clean.
            self.warnings.push("syntax error".to_string());
        }
    }

    // ── Scope helpers ───────────────────────────────────────

    fn current_scope_id(&self) -> String {
        self.scopes.last().map(|s| s.entity_id.clone()).unwrap_or_default()
    }

    fn qualify(&self, name: &str) -> String {
        match self.scopes.last() {
            Some(s) if s.kind != NodeKind::Module => format!("{}.{}", s.qualified_name, name),
            _ => name.to_string(),
        }
    }

    /// Innermost enclosing callable, falling back to the module node.
    fn enclosing_callable(&self) -> String {
        self.scopes
            .iter()
            .rev()
            .find(|s| {
                matches!(
                    s.kind,
                    NodeKind::Function | NodeKind::Method | NodeKind::Module
                )
            })
            .map(|s| s.entity_id.clone())
            .unwrap_or_default()
    }

    // ── The walk ────────────────────────────────────────────

    fn visit_children(&mut self, node: TsNode<'_>, exported: bool, default_export: bool) {
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.children(&mut cursor).collect();
        for child in children {
            self.visit(child, exported, default_export);
        }
    }

    fn visit(&mut self, node: TsNode<'_>, exported: bool, default_export: bool) {
        match node.kind() {
            "export_statement" => self.visit_export(node),
            "import_statement" => self.visit_import(node),
            "function_declaration" | "generator_function_declaration" => {
                self.visit_function(node, exported, default_export);
            }
            "class_declaration" | "abstract_class_declaration" => {
                self.visit_class(node, exported, default_export);
            }
            "interface_declaration" => self.visit_interface(node, exported),
            "enum_declaration" => self.visit_enum(node, exported),
            "type_alias_declaration" => self.visit_type_alias(node, exported),
            "internal_module" | "module" => self.visit_namespace(node, exported),
            "lexical_declaration" | "variable_declaration" => {
                self.visit_variable_statement(node, exported);
            }
            "call_expression" => {
                self.visit_call(node);
                self.visit_children(node, false, false);
            }
            "new_expression" => {
                self.visit_new(node);
                self.visit_children(node, false, false);
            }
            "jsx_element" | "jsx_self_closing_element" => {
                self.visit_jsx(node);
                self.visit_children(node, false, false);
            }
            "comment" => {}
            _ => self.visit_children(node, false, false),
        }
    }

    fn visit_export(&mut self, node: TsNode<'_>) {
        let is_default = any_child_kind(node, "default");
        let source_module = node
            .child_by_field_name("source")
            .map(|s| string_literal_value(s, self.source));

        // `export { a, b as c } [from "mod"]`
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "export_clause" {
                let mut inner = child.walk();
                for spec in child.named_children(&mut inner) {
                    if spec.kind() != "export_specifier" {
                        continue;
                    }
                    let name = field_text(spec, "name", self.source);
                    let alias = spec
                        .child_by_field_name("alias")
                        .map(|a| text(a, self.source).to_string());
                    if let Some(module) = &source_module {
                        // Re-export from another module.
                        let source_id = self.current_scope_id();
                        self.refs.push(ExternalRef {
                            source_entity_id: source_id,
                            source_file_path: self.file_path.clone(),
                            source_line: line_of(spec),
                            source_column: col_of(spec),
                            module_specifier: module.clone(),
                            imported_symbol: name.clone(),
                            local_alias: alias.clone(),
                            import_style: ImportStyle::Named,
                            target_entity_id: unresolved(&name),
                            is_reexport: true,
                            export_alias: alias,
                            source_file_hash: self.file_hash.clone(),
                            updated_at: self.updated_at.clone(),
                            ..Default::default()
                        });
                    }
                }
            }
        }

        // `export <declaration>` / `export default <declaration>`
        if let Some(decl) = node.child_by_field_name("declaration") {
            self.visit(decl, true, is_default);
        } else {
            // `export default <expression>` — walk for calls/JSX inside.
            if let Some(value) = node.child_by_field_name("value") {
                self.visit(value, false, false);
            }
        }
    }

    fn visit_import(&mut self, node: TsNode<'_>) {
        let module = match node.child_by_field_name("source") {
            Some(s) => string_literal_value(s, self.source),
            None => return,
        };
        let is_type_only = any_child_kind(node, "type");
        let source_id = self.current_scope_id();
        let line = line_of(node);
        let col = col_of(node);

        let mut found_clause = false;
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() != "import_clause" {
                continue;
            }
            found_clause = true;
            let mut inner = child.walk();
            for part in child.named_children(&mut inner) {
                match part.kind() {
                    "identifier" => {
                        // `import Foo from "mod"`
                        let name = text(part, self.source).to_string();
                        self.push_import_ref(
                            &source_id,
                            &module,
                            &name,
                            None,
                            ImportStyle::Default,
                            is_type_only,
                            line_of(part),
                            col_of(part),
                        );
                    }
                    "namespace_import" => {
                        // `import * as ns from "mod"`
                        let alias = part
                            .named_child(0)
                            .map(|n| text(n, self.source).to_string())
                            .unwrap_or_default();
                        self.push_import_ref(
                            &source_id,
                            &module,
                            "*",
                            Some(alias),
                            ImportStyle::Namespace,
                            is_type_only,
                            line_of(part),
                            col_of(part),
                        );
                    }
                    "named_imports" => {
                        let mut specs = part.walk();
                        for spec in part.named_children(&mut specs) {
                            if spec.kind() != "import_specifier" {
                                continue;
                            }
                            let name = field_text(spec, "name", self.source);
                            let alias = spec
                                .child_by_field_name("alias")
                                .map(|a| text(a, self.source).to_string());
                            let type_only = is_type_only || any_child_kind(spec, "type");
                            let style = if alias.is_some() {
                                ImportStyle::Alias
                            } else {
                                ImportStyle::Named
                            };
                            self.push_import_ref(
                                &source_id,
                                &module,
                                &name,
                                alias,
                                style,
                                type_only,
                                line_of(spec),
                                col_of(spec),
                            );
                        }
                    }
                    _ => {}
                }
            }
        }

        if !found_clause {
            // `import "./styles.css"` — side effect only.
            self.push_import_ref(
                &source_id,
                &module,
                "",
                None,
                ImportStyle::SideEffect,
                false,
                line,
                col,
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push_import_ref(
        &mut self,
        source_id: &str,
        module: &str,
        symbol: &str,
        alias: Option<String>,
        style: ImportStyle,
        is_type_only: bool,
        line: u32,
        col: u32,
    ) {
        let target = if symbol.is_empty() {
            unresolved(module)
        } else {
            unresolved(symbol)
        };
        self.refs.push(ExternalRef {
            source_entity_id: source_id.to_string(),
            source_file_path: self.file_path.clone(),
            source_line: line,
            source_column: col,
            module_specifier: module.to_string(),
            imported_symbol: symbol.to_string(),
            local_alias: alias,
            import_style: style,
            is_type_only,
            target_entity_id: target.clone(),
            source_file_hash: self.file_hash.clone(),
            updated_at: self.updated_at.clone(),
            ..Default::default()
        });
        let source_owned = source_id.to_string();
        self.make_edge(&source_owned, &target, EdgeType::Imports, line, col, HashMap::new());
    }

    fn visit_function(&mut self, node: TsNode<'_>, exported: bool, default_export: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            self.visit_children(node, false, false);
            return;
        }
        let is_generator = node.kind() == "generator_function_declaration";
        let id = self.emit_callable(
            node,
            &name,
            NodeKind::Function,
            exported,
            default_export,
            is_generator,
        );
        self.emit_parameters(node, &id);
        self.walk_body_in_scope(node, id, name, NodeKind::Function);
    }

    fn emit_callable(
        &mut self,
        node: TsNode<'_>,
        name: &str,
        kind: NodeKind,
        exported: bool,
        default_export: bool,
        is_generator: bool,
    ) -> String {
        let qualified = self.qualify(name);
        let parent = self.current_scope_id();
        let doc = self.doc_comment_for(node);
        let signature = callable_signature(node, self.source);
        let type_params = type_parameter_list(node, self.source);
        let is_async = any_child_kind(node, "async");
        let id = self.make_node(|n| {
            n.kind = kind;
            n.name = name.to_string();
            n.qualified_name = qualified;
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
            n.is_default_export = default_export;
            n.is_async = is_async;
            n.is_generator = is_generator;
            n.type_signature = signature;
            n.type_parameters = type_params;
            n.documentation = doc;
        });
        self.contains(&parent, &id, line_of(node));
        id
    }

    fn emit_parameters(&mut self, node: TsNode<'_>, owner_id: &str) {
        let Some(params) = node.child_by_field_name("parameters") else {
            return;
        };
        let owner = owner_id.to_string();
        let mut cursor = params.walk();
        let children: Vec<TsNode<'_>> = params.named_children(&mut cursor).collect();
        for param in children {
            let pattern = param
                .child_by_field_name("pattern")
                .or_else(|| if param.kind() == "identifier" { Some(param) } else { None });
            let Some(pattern) = pattern else { continue };
            if pattern.kind() != "identifier" {
                // Destructuring patterns are skipped rather than guessed at.
                continue;
            }
            let name = text(pattern, self.source).to_string();
            let qualified = format!("{}.{}", self.qualify_owner(&owner), name);
            let ty = param
                .child_by_field_name("type")
                .map(|t| type_annotation_text(t, self.source));
            let id = self.make_node(|n| {
                n.kind = NodeKind::Parameter;
                n.name = name;
                n.qualified_name = qualified;
                n.start_line = line_of(param);
                n.end_line = line_of(param);
                n.start_column = col_of(param);
                n.end_column = param.end_position().column as u32;
                n.type_signature = ty;
            });
            self.contains(&owner, &id, line_of(param));
        }
    }

    /// Qualified name of the scope that owns `owner_id`; parameters hang off
    /// the callable they belong to.
    fn qualify_owner(&self, owner_id: &str) -> String {
        self.nodes
            .iter()
            .rev()
            .find(|n| n.entity_id == owner_id)
            .map(|n| n.qualified_name.clone())
            .unwrap_or_default()
    }

    fn walk_body_in_scope(
        &mut self,
        node: TsNode<'_>,
        entity_id: String,
        name: String,
        kind: NodeKind,
    ) {
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let qualified = self.qualify(&name);
        self.scopes.push(Scope {
            entity_id,
            qualified_name: qualified,
            kind,
        });
        self.visit_children(body, false, false);
        self.scopes.pop();
    }

    fn visit_class(&mut self, node: TsNode<'_>, exported: bool, default_export: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let doc = self.doc_comment_for(node);
        let decorators = self.decorators_for(node);
        let is_abstract = node.kind() == "abstract_class_declaration";
        let type_params = type_parameter_list(node, self.source);
        let id = self.make_node(|n| {
            n.kind = NodeKind::Class;
            n.name = name.clone();
            n.qualified_name = qualified.clone();
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
            n.is_default_export = default_export;
            n.is_abstract = is_abstract;
            n.type_parameters = type_params;
            n.decorators = decorators.clone();
            n.documentation = doc;
        });
        self.contains(&parent, &id, line_of(node));
        self.emit_decorates(&decorators, &id, node);
        self.emit_heritage(node, &id);

        // Class body: methods and fields.
        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        self.scopes.push(Scope {
            entity_id: id,
            qualified_name: qualified,
            kind: NodeKind::Class,
        });
        let mut cursor = body.walk();
        let members: Vec<TsNode<'_>> = body.named_children(&mut cursor).collect();
        for member in members {
            match member.kind() {
                "method_definition" | "abstract_method_signature" => {
                    self.visit_method(member);
                }
                "public_field_definition" | "field_definition" | "property_signature" => {
                    self.visit_field(member);
                }
                _ => {}
            }
        }
        self.scopes.pop();
    }

    fn emit_heritage(&mut self, node: TsNode<'_>, class_id: &str) {
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.children(&mut cursor).collect();
        for child in children {
            if child.kind() != "class_heritage" {
                continue;
            }
            let mut inner = child.walk();
            let clauses: Vec<TsNode<'_>> = child.children(&mut inner).collect();
            for clause in clauses {
                match clause.kind() {
                    "extends_clause" => {
                        let mut c = clause.walk();
                        let named: Vec<TsNode<'_>> = clause.named_children(&mut c).collect();
                        for target in named {
                            if matches!(target.kind(), "identifier" | "member_expression") {
                                let name = rightmost_name(target, self.source);
                                self.defer(class_id, &name, EdgeType::Extends, clause);
                            }
                        }
                    }
                    "implements_clause" => {
                        let mut c = clause.walk();
                        let named: Vec<TsNode<'_>> = clause.named_children(&mut c).collect();
                        for target in named {
                            let name = rightmost_name(target, self.source);
                            if !name.is_empty() {
                                self.defer(class_id, &name, EdgeType::Implements, clause);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn visit_method(&mut self, node: TsNode<'_>) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let doc = self.doc_comment_for(node);
        let decorators = self.decorators_for(node);
        let signature = callable_signature(node, self.source);
        let is_async = any_child_kind(node, "async");
        let is_static = any_child_kind(node, "static");
        let is_abstract = node.kind() == "abstract_method_signature";
        let visibility = accessibility_of(node, self.source);
        let is_constructor = name == "constructor";
        let id = self.make_node(|n| {
            n.kind = NodeKind::Method;
            n.name = name.clone();
            n.qualified_name = qualified;
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_async = is_async;
            n.is_static = is_static;
            n.is_abstract = is_abstract;
            n.visibility = visibility;
            n.type_signature = signature;
            n.decorators = decorators.clone();
            n.documentation = doc;
            if is_constructor {
                n.properties.insert("isConstructor".to_string(), serde_json::Value::Bool(true));
            }
        });
        self.contains(&parent, &id, line_of(node));
        self.emit_decorates(&decorators, &id, node);
        self.emit_parameters(node, &id);
        self.walk_body_in_scope(node, id, name, NodeKind::Method);
    }

    fn visit_field(&mut self, node: TsNode<'_>) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let decorators = self.decorators_for(node);
        let is_static = any_child_kind(node, "static");
        let visibility = accessibility_of(node, self.source);
        let ty = node
            .child_by_field_name("type")
            .map(|t| type_annotation_text(t, self.source));
        let id = self.make_node(|n| {
            n.kind = NodeKind::Property;
            n.name = name;
            n.qualified_name = qualified;
            n.start_line = line_of(node);
            n.end_line = line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_static = is_static;
            n.visibility = visibility;
            n.type_signature = ty;
            n.decorators = decorators.clone();
        });
        self.contains(&parent, &id, line_of(node));
        self.emit_decorates(&decorators, &id, node);

        // Arrow-function fields still contain calls worth walking.
        if let Some(value) = node.child_by_field_name("value") {
            self.visit(value, false, false);
        }
    }

    fn visit_interface(&mut self, node: TsNode<'_>, exported: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let doc = self.doc_comment_for(node);
        let type_params = type_parameter_list(node, self.source);
        let id = self.make_node(|n| {
            n.kind = NodeKind::Interface;
            n.name = name.clone();
            n.qualified_name = qualified.clone();
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
            n.type_parameters = type_params;
            n.documentation = doc;
        });
        self.contains(&parent, &id, line_of(node));

        // `interface A extends B`
        let mut cursor = node.walk();
        let children: Vec<TsNode<'_>> = node.children(&mut cursor).collect();
        for child in children {
            if child.kind() == "extends_type_clause" || child.kind() == "extends_clause" {
                let mut inner = child.walk();
                let named: Vec<TsNode<'_>> = child.named_children(&mut inner).collect();
                for target in named {
                    let name = rightmost_name(target, self.source);
                    if !name.is_empty() {
                        self.defer(&id, &name, EdgeType::Extends, child);
                    }
                }
            }
        }

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        self.scopes.push(Scope {
            entity_id: id,
            qualified_name: qualified,
            kind: NodeKind::Interface,
        });
        let mut body_cursor = body.walk();
        let members: Vec<TsNode<'_>> = body.named_children(&mut body_cursor).collect();
        for member in members {
            match member.kind() {
                "property_signature" => self.visit_field(member),
                "method_signature" => {
                    let mname = field_text(member, "name", self.source);
                    if mname.is_empty() {
                        continue;
                    }
                    let mqualified = self.qualify(&mname);
                    let mparent = self.current_scope_id();
                    let signature = callable_signature(member, self.source);
                    let mid = self.make_node(|n| {
                        n.kind = NodeKind::Method;
                        n.name = mname;
                        n.qualified_name = mqualified;
                        n.start_line = line_of(member);
                        n.end_line = end_line_of(member);
                        n.start_column = col_of(member);
                        n.end_column = member.end_position().column as u32;
                        n.type_signature = signature;
                    });
                    self.contains(&mparent, &mid, line_of(member));
                }
                _ => {}
            }
        }
        self.scopes.pop();
    }

    fn visit_enum(&mut self, node: TsNode<'_>, exported: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let id = self.make_node(|n| {
            n.kind = NodeKind::Enum;
            n.name = name.clone();
            n.qualified_name = qualified.clone();
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
        });
        self.contains(&parent, &id, line_of(node));

        let Some(body) = node.child_by_field_name("body") else {
            return;
        };
        let mut cursor = body.walk();
        let members: Vec<TsNode<'_>> = body.named_children(&mut cursor).collect();
        for member in members {
            let member_name = match member.kind() {
                "enum_assignment" => field_text(member, "name", self.source),
                "property_identifier" => text(member, self.source).to_string(),
                _ => continue,
            };
            if member_name.is_empty() {
                continue;
            }
            let mqualified = format!("{qualified}.{member_name}");
            let mid = self.make_node(|n| {
                n.kind = NodeKind::EnumMember;
                n.name = member_name;
                n.qualified_name = mqualified;
                n.start_line = line_of(member);
                n.end_line = line_of(member);
                n.start_column = col_of(member);
                n.end_column = member.end_position().column as u32;
            });
            self.contains(&id, &mid, line_of(member));
        }
    }

    fn visit_type_alias(&mut self, node: TsNode<'_>, exported: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let type_params = type_parameter_list(node, self.source);
        let value = node
            .child_by_field_name("value")
            .map(|v| text(v, self.source).to_string());
        let id = self.make_node(|n| {
            n.kind = NodeKind::Type;
            n.name = name;
            n.qualified_name = qualified;
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
            n.type_parameters = type_params;
            n.type_signature = value;
        });
        self.contains(&parent, &id, line_of(node));
    }

    fn visit_namespace(&mut self, node: TsNode<'_>, exported: bool) {
        let name = field_text(node, "name", self.source);
        if name.is_empty() {
            self.visit_children(node, false, false);
            return;
        }
        let qualified = self.qualify(&name);
        let parent = self.current_scope_id();
        let id = self.make_node(|n| {
            n.kind = NodeKind::Namespace;
            n.name = name.clone();
            n.qualified_name = qualified.clone();
            n.start_line = line_of(node);
            n.end_line = end_line_of(node);
            n.start_column = col_of(node);
            n.end_column = node.end_position().column as u32;
            n.is_exported = exported;
        });
        self.contains(&parent, &id, line_of(node));
        self.walk_body_in_scope(node, id, name, NodeKind::Namespace);
    }

    fn visit_variable_statement(&mut self, node: TsNode<'_>, exported: bool) {
        let mut cursor = node.walk();
        let declarators: Vec<TsNode<'_>> = node.named_children(&mut cursor).collect();
        for declarator in declarators {
            if declarator.kind() != "variable_declarator" {
                continue;
            }
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                // Destructuring declarations are skipped.
                continue;
            }
            let name = text(name_node, self.source).to_string();
            let value = declarator.child_by_field_name("value");

            // `const f = () => {}` declares a function, not a variable.
            let is_function_value = value
                .map(|v| {
                    matches!(
                        v.kind(),
                        "arrow_function" | "function_expression" | "function"
                            | "generator_function"
                    )
                })
                .unwrap_or(false);

            if is_function_value {
                let value = value.unwrap();
                let qualified = self.qualify(&name);
                let parent = self.current_scope_id();
                let doc = self.doc_comment_for(node);
                let is_async = any_child_kind(value, "async");
                let is_generator = value.kind() == "generator_function";
                let signature = callable_signature(value, self.source);
                let id = self.make_node(|n| {
                    n.kind = NodeKind::Function;
                    n.name = name.clone();
                    n.qualified_name = qualified;
                    n.start_line = line_of(declarator);
                    n.end_line = end_line_of(declarator);
                    n.start_column = col_of(declarator);
                    n.end_column = declarator.end_position().column as u32;
                    n.is_exported = exported;
                    n.is_async = is_async;
                    n.is_generator = is_generator;
                    n.type_signature = signature;
                    n.documentation = doc;
                });
                self.contains(&parent, &id, line_of(declarator));
                self.walk_body_in_scope(value, id, name, NodeKind::Function);
                continue;
            }

            let ty = declarator
                .child_by_field_name("type")
                .map(|t| type_annotation_text(t, self.source));
            let qualified = self.qualify(&name);
            let parent = self.current_scope_id();
            let id = self.make_node(|n| {
                n.kind = NodeKind::Variable;
                n.name = name;
                n.qualified_name = qualified;
                n.start_line = line_of(declarator);
                n.end_line = line_of(declarator);
                n.start_column = col_of(declarator);
                n.end_column = declarator.end_position().column as u32;
                n.is_exported = exported;
                n.type_signature = ty;
            });
            self.contains(&parent, &id, line_of(declarator));

            // Initializers may contain calls or JSX.
            if let Some(value) = value {
                self.visit(value, false, false);
            }
        }
    }

    fn visit_call(&mut self, node: TsNode<'_>) {
        let Some(callee) = node.child_by_field_name("function") else {
            return;
        };
        let name = match callee.kind() {
            "identifier" => text(callee, self.source).to_string(),
            "member_expression" => field_text(callee, "property", self.source),
            _ => return,
        };
        if name.is_empty() {
            return;
        }
        let caller = self.enclosing_callable();
        self.defer(&caller, &name, EdgeType::Calls, node);
    }

    fn visit_new(&mut self, node: TsNode<'_>) {
        let Some(ctor) = node.child_by_field_name("constructor") else {
            return;
        };
        let name = match ctor.kind() {
            "identifier" => text(ctor, self.source).to_string(),
            "member_expression" => field_text(ctor, "property", self.source),
            _ => return,
        };
        if name.is_empty() {
            return;
        }
        let caller = self.enclosing_callable();
        self.defer(&caller, &name, EdgeType::Instantiates, node);
    }

    fn visit_jsx(&mut self, node: TsNode<'_>) {
        let opening = if node.kind() == "jsx_self_closing_element" {
            node
        } else {
            match named_child_of_kind(node, "jsx_opening_element") {
                Some(o) => o,
                None => return,
            }
        };
        let name = field_text(opening, "name", self.source);
        // Lowercase tags are plain HTML; only component renders become edges.
        let Some(first) = name.chars().next() else {
            return;
        };
        if !first.is_uppercase() {
            return;
        }

        let mut props: Vec<String> = Vec::new();
        let mut has_spread = false;
        let mut cursor = opening.walk();
        for attr in opening.named_children(&mut cursor) {
            match attr.kind() {
                "jsx_attribute" => {
                    if let Some(attr_name) = attr.named_child(0) {
                        props.push(text(attr_name, self.source).to_string());
                    }
                }
                "jsx_expression" => {
                    has_spread = true;
                }
                _ => {}
            }
        }

        let renderer = self.enclosing_callable();
        self.defer(&renderer, &name, EdgeType::Renders, opening);
        if !props.is_empty() || has_spread {
            let mut properties = HashMap::new();
            properties.insert(
                "props".to_string(),
                serde_json::Value::Array(
                    props.iter().cloned().map(serde_json::Value::String).collect(),
                ),
            );
            properties.insert(
                "propCount".to_string(),
                serde_json::Value::from(props.len() as u64),
            );
            properties.insert("hasSpreadProps".to_string(), serde_json::Value::Bool(has_spread));
            self.pending.push(PendingEdge {
                fixed_entity_id: renderer,
                named: name,
                named_is_source: false,
                edge_type: EdgeType::PassesProps,
                line: line_of(opening),
                column: col_of(opening),
                properties,
            });
        }
    }

    // ── Decorators and docs ─────────────────────────────────

    fn decorators_for(&self, node: TsNode<'_>) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            if child.kind() == "decorator" {
                out.push(decorator_name(child, self.source));
            }
        }
        // Decorators on an exported class hang off the export_statement's
        // sibling position in some grammar versions.
        if out.is_empty() {
            let mut prev = node.prev_sibling();
            while let Some(p) = prev {
                if p.kind() == "decorator" {
                    out.insert(0, decorator_name(p, self.source));
                    prev = p.prev_sibling();
                } else {
                    break;
                }
            }
        }
        out
    }

    fn emit_decorates(&mut self, decorators: &[String], target_id: &str, node: TsNode<'_>) {
        for name in decorators {
            self.pending.push(PendingEdge {
                fixed_entity_id: target_id.to_string(),
                named: name.clone(),
                named_is_source: true,
                edge_type: EdgeType::Decorates,
                line: line_of(node),
                column: col_of(node),
                properties: HashMap::new(),
            });
        }
    }

    fn doc_comment_for(&self, node: TsNode<'_>) -> Option<String> {
        let mut prev = node.prev_sibling()?;
        // Skip decorators between the doc comment and the declaration.
        while prev.kind() == "decorator" {
            prev = prev.prev_sibling()?;
        }
        if prev.kind() != "comment" {
            return None;
        }
        let raw = text(prev, self.source);
        if !raw.starts_with("/**") {
            return None;
        }
        let body = raw
            .trim_start_matches("/**")
            .trim_end_matches("*/")
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if body.is_empty() { None } else { Some(body) }
    }
}

// ── Free helpers ────────────────────────────────────────────

fn text<'a>(node: TsNode<'_>, source: &'a [u8]) -> &'a str {
    node.utf8_text(source).unwrap_or("")
}

fn field_text(node: TsNode<'_>, field: &str, source: &[u8]) -> String {
    node.child_by_field_name(field)
        .map(|n| text(n, source).to_string())
        .unwrap_or_default()
}

fn line_of(node: TsNode<'_>) -> u32 {
    node.start_position().row as u32 + 1
}

fn end_line_of(node: TsNode<'_>) -> u32 {
    node.end_position().row as u32 + 1
}

fn col_of(node: TsNode<'_>) -> u32 {
    node.start_position().column as u32
}

fn any_child_kind(node: TsNode<'_>, kind: &str) -> bool {
    let mut cursor = node.walk();
    node.children(&mut cursor).any(|c| c.kind() == kind)
}

fn named_child_of_kind<'t>(node: TsNode<'t>, kind: &str) -> Option<TsNode<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).find(|c| c.kind() == kind)
}

fn string_literal_value(node: TsNode<'_>, source: &[u8]) -> String {
    text(node, source).trim_matches(['"', '\'', '`']).to_string()
}

/// `Foo.Bar` → `Bar`; identifiers pass through.
fn rightmost_name(node: TsNode<'_>, source: &[u8]) -> String {
    match node.kind() {
        "member_expression" => field_text(node, "property", source),
        "nested_type_identifier" => node
            .named_child(node.named_child_count().saturating_sub(1))
            .map(|n| text(n, source).to_string())
            .unwrap_or_default(),
        "generic_type" => node
            .named_child(0)
            .map(|n| rightmost_name(n, source))
            .unwrap_or_default(),
        _ => text(node, source).to_string(),
    }
}

/// `public` / `protected` / `private` modifier on a class member.
fn accessibility_of(node: TsNode<'_>, source: &[u8]) -> Visibility {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "accessibility_modifier" {
            return Visibility::parse(text(child, source));
        }
    }
    Visibility::Public
}

fn decorator_name(node: TsNode<'_>, source: &[u8]) -> String {
    let inner = match node.named_child(0) {
        Some(n) => n,
        None => return String::new(),
    };
    match inner.kind() {
        "call_expression" => inner
            .child_by_field_name("function")
            .map(|f| text(f, source).to_string())
            .unwrap_or_default(),
        _ => text(inner, source).to_string(),
    }
}

fn callable_signature(node: TsNode<'_>, source: &[u8]) -> Option<String> {
    let params = node
        .child_by_field_name("parameters")
        .map(|p| text(p, source).to_string())?;
    let ret = node
        .child_by_field_name("return_type")
        .map(|r| type_annotation_text(r, source))
        .unwrap_or_default();
    if ret.is_empty() {
        Some(params)
    } else {
        Some(format!("{params}: {ret}"))
    }
}

fn type_annotation_text(node: TsNode<'_>, source: &[u8]) -> String {
    // A type_annotation is `: T`; strip the leading colon.
    text(node, source).trim_start_matches(':').trim().to_string()
}

fn type_parameter_list(node: TsNode<'_>, source: &[u8]) -> Vec<String> {
    let Some(tp) = node.child_by_field_name("type_parameters") else {
        return Vec::new();
    };
    let mut cursor = tp.walk();
    tp.named_children(&mut cursor)
        .map(|c| text(c, source).to_string())
        .collect()
}

fn module_name_of(file_path: &str) -> String {
    let no_ext = file_path
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_path);
    no_ext.to_string()
}
