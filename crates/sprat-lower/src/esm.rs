//! ESM to injected-scope lowering.
//!
//! Rewrites `import`/`export` declarations so the module body runs as
//! `function (require, module, exports) { ... }`:
//!
//! ```javascript
//! // Before
//! import { add } from './math';
//! export function twice(x) { return add(x, x); }
//!
//! // After
//! Object.defineProperty(exports, "__esModule", { value: true });
//! exports.twice = twice;
//! const __sprat_import_0 = require("./math");
//! function twice(x) { return (0, __sprat_import_0.add)(x, x); }
//! ```
//!
//! Imported bindings become member reads on the required exports object so
//! they stay live across circular imports. Exported `let` and `var` bindings
//! are published as getters so later assignments reach importers.

use std::collections::{HashMap, HashSet};

use swc_common::{DUMMY_SP, FileName, SourceMap, sync::Lrc};
use swc_ecma_ast::*;
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, lexer::Lexer};
use swc_ecma_visit::{VisitMut, VisitMutWith};

use crate::parse::wtf8_to_string;

const IMPORT_PREFIX: &str = "__sprat_import_";
const DEFAULT_LOCAL: &str = "__sprat_default";

/// Replacement for a reference to an imported binding.
struct ImportBinding {
    code: String,
    expr: Box<Expr>,
    /// Callee form, detached from the exports object so `this` is undefined
    call: Box<Expr>,
}

#[derive(Default)]
pub(crate) struct EsmLowering {
    bindings: HashMap<Id, ImportBinding>,
    next_namespace: usize,
    pub(crate) errors: Vec<String>,
}

/// Output sections, concatenated in this order.
#[derive(Default)]
struct Sections {
    /// `__esModule` marker and hoisted function exports
    prologue: Vec<ModuleItem>,
    /// `require` calls, in source order
    requires: Vec<ModuleItem>,
    /// re-export getters, after every namespace exists
    reexports: Vec<ModuleItem>,
    body: Vec<ModuleItem>,
    /// assignments from local `export { ... }` lists
    epilogue: Vec<ModuleItem>,
}

impl EsmLowering {
    fn namespace(&mut self) -> String {
        let name = format!("{}{}", IMPORT_PREFIX, self.next_namespace);
        self.next_namespace += 1;
        name
    }

    fn bind(&mut self, local: &Ident, code: String) {
        let parsed = parse_expr(&code).and_then(|expr| {
            let call = if matches!(*expr, Expr::Member(_)) {
                parse_expr(&format!("(0, {})", code))?
            } else {
                expr.clone()
            };
            Ok((expr, call))
        });
        match parsed {
            Ok((expr, call)) => {
                self.bindings
                    .insert(local.to_id(), ImportBinding { code, expr, call });
            }
            Err(e) => self.errors.push(e),
        }
    }

    fn stmt(&mut self, code: &str) -> ModuleItem {
        match parse_expr(code) {
            Ok(expr) => ModuleItem::Stmt(Stmt::Expr(ExprStmt {
                span: DUMMY_SP,
                expr,
            })),
            Err(e) => {
                self.errors.push(e);
                ModuleItem::Stmt(Stmt::Empty(EmptyStmt { span: DUMMY_SP }))
            }
        }
    }

    fn const_stmt(&mut self, name: &str, value: &str) -> ModuleItem {
        match parse_expr(value) {
            Ok(init) => ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(var_decl(name, init))))),
            Err(e) => {
                self.errors.push(e);
                ModuleItem::Stmt(Stmt::Empty(EmptyStmt { span: DUMMY_SP }))
            }
        }
    }

    fn require(&mut self, src: &Str, sections: &mut Sections) -> String {
        let namespace = self.namespace();
        let call = format!("require({})", quote(&wtf8_to_string(src)));
        let item = self.const_stmt(&namespace, &call);
        sections.requires.push(item);
        namespace
    }

    fn lower_import(&mut self, import: &ImportDecl, sections: &mut Sections) {
        if import.type_only {
            return;
        }

        if import.specifiers.is_empty() {
            let call = format!("require({})", quote(&wtf8_to_string(&import.src)));
            let item = self.stmt(&call);
            sections.requires.push(item);
            return;
        }

        let namespace = self.require(&import.src, sections);
        for specifier in &import.specifiers {
            match specifier {
                ImportSpecifier::Default(default) => {
                    let code = format!(
                        "({ns}.__esModule ? {ns}.default : {ns})",
                        ns = namespace
                    );
                    self.bind(&default.local, code);
                }
                ImportSpecifier::Named(named) => {
                    if named.is_type_only {
                        continue;
                    }
                    let imported = named
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| named.local.sym.as_str().to_string());
                    self.bind(&named.local, member(&namespace, &imported));
                }
                ImportSpecifier::Namespace(ns) => {
                    self.bind(&ns.local, namespace.clone());
                }
            }
        }
    }

    fn lower_export_decl(&mut self, export: ExportDecl, sections: &mut Sections) {
        let mut names = Vec::new();
        let mut live = false;
        match &export.decl {
            Decl::Fn(fn_decl) => {
                let name = fn_decl.ident.sym.as_str().to_string();
                let item = self.stmt(&format!("{} = {}", member("exports", &name), name));
                sections.prologue.push(item);
            }
            Decl::Var(var) => {
                live = var.kind != VarDeclKind::Const;
                for decl in &var.decls {
                    collect_pattern_names(&decl.name, &mut names);
                }
            }
            Decl::Class(class_decl) => names.push(class_decl.ident.sym.as_str().to_string()),
            _ => {}
        }

        sections.body.push(ModuleItem::Stmt(Stmt::Decl(export.decl)));
        for name in names {
            let code = if live {
                getter("exports", &name, &name)
            } else {
                format!("{} = {}", member("exports", &name), name)
            };
            let item = self.stmt(&code);
            sections.body.push(item);
        }
    }

    fn lower_export_default_expr(&mut self, export: ExportDefaultExpr, sections: &mut Sections) {
        sections.body.push(ModuleItem::Stmt(Stmt::Decl(Decl::Var(Box::new(
            var_decl(DEFAULT_LOCAL, export.expr),
        )))));
        let item = self.stmt(&format!("exports.default = {}", DEFAULT_LOCAL));
        sections.body.push(item);
    }

    fn lower_export_default_decl(&mut self, export: ExportDefaultDecl, sections: &mut Sections) {
        match export.decl {
            DefaultDecl::Fn(fn_expr) => {
                let ident = fn_expr.ident.unwrap_or_else(|| local_ident(DEFAULT_LOCAL));
                let item = self.stmt(&format!("exports.default = {}", ident.sym.as_str()));
                sections.prologue.push(item);
                sections.body.push(ModuleItem::Stmt(Stmt::Decl(Decl::Fn(FnDecl {
                    ident,
                    declare: false,
                    function: fn_expr.function,
                }))));
            }
            DefaultDecl::Class(class_expr) => {
                let ident = class_expr
                    .ident
                    .unwrap_or_else(|| local_ident(DEFAULT_LOCAL));
                let name = ident.sym.as_str().to_string();
                sections.body.push(ModuleItem::Stmt(Stmt::Decl(Decl::Class(ClassDecl {
                    ident,
                    declare: false,
                    class: class_expr.class,
                }))));
                let item = self.stmt(&format!("exports.default = {}", name));
                sections.body.push(item);
            }
            DefaultDecl::TsInterfaceDecl(_) => {}
        }
    }

    fn lower_export_named(
        &mut self,
        export: &NamedExport,
        top_level: &TopLevel,
        sections: &mut Sections,
    ) {
        if export.type_only {
            return;
        }

        let Some(src) = &export.src else {
            for specifier in &export.specifiers {
                let ExportSpecifier::Named(named) = specifier else {
                    continue;
                };
                if named.is_type_only {
                    continue;
                }
                let orig = export_name(&named.orig);
                let exported = named
                    .exported
                    .as_ref()
                    .map(export_name)
                    .unwrap_or_else(|| orig.clone());

                let ModuleExportName::Ident(local) = &named.orig else {
                    continue;
                };
                let id = local.to_id();
                if let Some(binding) = self.bindings.get(&id) {
                    let code = getter("exports", &exported, &binding.code);
                    let item = self.stmt(&code);
                    sections.reexports.push(item);
                } else if top_level.mutable.contains(&id) {
                    let item = self.stmt(&getter("exports", &exported, &orig));
                    sections.epilogue.push(item);
                } else {
                    let item = self.stmt(&format!("{} = {}", member("exports", &exported), orig));
                    if top_level.functions.contains(&id) {
                        sections.prologue.push(item);
                    } else {
                        sections.epilogue.push(item);
                    }
                }
            }
            return;
        };

        let namespace = self.require(src, sections);
        for specifier in &export.specifiers {
            let code = match specifier {
                ExportSpecifier::Named(named) => {
                    if named.is_type_only {
                        continue;
                    }
                    let orig = export_name(&named.orig);
                    let exported = named
                        .exported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| orig.clone());
                    getter("exports", &exported, &member(&namespace, &orig))
                }
                ExportSpecifier::Namespace(ns) => {
                    format!("{} = {}", member("exports", &export_name(&ns.name)), namespace)
                }
                ExportSpecifier::Default(default) => getter(
                    "exports",
                    default.exported.sym.as_str(),
                    &member(&namespace, "default"),
                ),
            };
            let item = self.stmt(&code);
            sections.reexports.push(item);
        }
    }

    fn lower_export_all(&mut self, export: &ExportAll, sections: &mut Sections) {
        if export.type_only {
            return;
        }
        let namespace = self.require(&export.src, sections);
        let code = format!(
            r#"Object.keys({ns}).forEach(function (key) {{
    if (key === "default" || key === "__esModule" || Object.prototype.hasOwnProperty.call(exports, key)) return;
    Object.defineProperty(exports, key, {{ enumerable: true, get: function () {{ return {ns}[key]; }} }});
}})"#,
            ns = namespace
        );
        let item = self.stmt(&code);
        sections.reexports.push(item);
    }
}

impl VisitMut for EsmLowering {
    fn visit_mut_module(&mut self, module: &mut Module) {
        let items = std::mem::take(&mut module.body);
        if !items.iter().any(|item| matches!(item, ModuleItem::ModuleDecl(_))) {
            module.body = items;
            module.visit_mut_children_with(self);
            return;
        }

        let top_level = TopLevel::collect(&items);
        let mut sections = Sections::default();
        let marker = self.stmt(r#"Object.defineProperty(exports, "__esModule", { value: true })"#);
        sections.prologue.push(marker);

        for item in items {
            match item {
                ModuleItem::ModuleDecl(ModuleDecl::Import(import)) => {
                    self.lower_import(&import, &mut sections);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => {
                    self.lower_export_decl(export, &mut sections);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultExpr(export)) => {
                    self.lower_export_default_expr(export, &mut sections);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportDefaultDecl(export)) => {
                    self.lower_export_default_decl(export, &mut sections);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)) => {
                    self.lower_export_named(&export, &top_level, &mut sections);
                }
                ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)) => {
                    self.lower_export_all(&export, &mut sections);
                }
                other => sections.body.push(other),
            }
        }

        let Sections {
            prologue,
            requires,
            reexports,
            body,
            epilogue,
        } = sections;
        module.body = prologue
            .into_iter()
            .chain(requires)
            .chain(reexports)
            .chain(body)
            .chain(epilogue)
            .collect();

        module.visit_mut_children_with(self);
    }

    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        let replacement = match expr {
            Expr::Ident(ident) => self
                .bindings
                .get(&ident.to_id())
                .map(|binding| binding.expr.clone()),
            _ => None,
        };
        if let Some(replacement) = replacement {
            *expr = *replacement;
            return;
        }
        expr.visit_mut_children_with(self);
    }

    fn visit_mut_callee(&mut self, callee: &mut Callee) {
        if let Callee::Expr(expr) = callee
            && let Expr::Ident(ident) = &**expr
            && let Some(binding) = self.bindings.get(&ident.to_id())
        {
            *expr = binding.call.clone();
            return;
        }
        callee.visit_mut_children_with(self);
    }

    fn visit_mut_tagged_tpl(&mut self, tpl: &mut TaggedTpl) {
        if let Expr::Ident(ident) = &*tpl.tag
            && let Some(binding) = self.bindings.get(&ident.to_id())
        {
            tpl.tag = binding.call.clone();
            tpl.tpl.visit_mut_with(self);
            return;
        }
        tpl.visit_mut_children_with(self);
    }

    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        let replacement = match prop {
            Prop::Shorthand(ident) => self.bindings.get(&ident.to_id()).map(|binding| {
                (
                    IdentName::new(ident.sym.clone(), ident.span),
                    binding.expr.clone(),
                )
            }),
            _ => None,
        };
        if let Some((key, value)) = replacement {
            *prop = Prop::KeyValue(KeyValueProp {
                key: PropName::Ident(key),
                value,
            });
            return;
        }
        prop.visit_mut_children_with(self);
    }
}

/// Top-level declarations, exported or not, that change how a local
/// `export { ... }` list is lowered.
#[derive(Default)]
struct TopLevel {
    /// function declarations, whose exports are hoisted
    functions: HashSet<Id>,
    /// `let`/`var` bindings, exported through getters
    mutable: HashSet<Id>,
}

impl TopLevel {
    fn collect(items: &[ModuleItem]) -> Self {
        let mut top_level = Self::default();
        for item in items {
            let decl = match item {
                ModuleItem::Stmt(Stmt::Decl(decl)) => decl,
                ModuleItem::ModuleDecl(ModuleDecl::ExportDecl(export)) => &export.decl,
                _ => continue,
            };
            match decl {
                Decl::Fn(fn_decl) => {
                    top_level.functions.insert(fn_decl.ident.to_id());
                }
                Decl::Var(var) if var.kind != VarDeclKind::Const => {
                    for decl in &var.decls {
                        collect_pattern_ids(&decl.name, &mut top_level.mutable);
                    }
                }
                _ => {}
            }
        }
        top_level
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(id) => id.sym.as_str().to_string(),
        ModuleExportName::Str(s) => wtf8_to_string(s),
    }
}

/// Collect all bound names from a pattern (handles destructuring)
fn collect_pattern_names(pat: &Pat, names: &mut Vec<String>) {
    match pat {
        Pat::Ident(ident) => names.push(ident.sym.as_str().to_string()),
        Pat::Object(obj) => {
            for prop in &obj.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => collect_pattern_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => {
                        names.push(assign.key.sym.as_str().to_string())
                    }
                    ObjectPatProp::Rest(rest) => collect_pattern_names(&rest.arg, names),
                }
            }
        }
        Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                collect_pattern_names(elem, names);
            }
        }
        Pat::Rest(rest) => collect_pattern_names(&rest.arg, names),
        Pat::Assign(assign) => collect_pattern_names(&assign.left, names),
        _ => {}
    }
}

fn collect_pattern_ids(pat: &Pat, ids: &mut HashSet<Id>) {
    match pat {
        Pat::Ident(ident) => {
            ids.insert(ident.id.to_id());
        }
        Pat::Object(obj) => {
            for prop in &obj.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => collect_pattern_ids(&kv.value, ids),
                    ObjectPatProp::Assign(assign) => {
                        ids.insert(assign.key.id.to_id());
                    }
                    ObjectPatProp::Rest(rest) => collect_pattern_ids(&rest.arg, ids),
                }
            }
        }
        Pat::Array(arr) => {
            for elem in arr.elems.iter().flatten() {
                collect_pattern_ids(elem, ids);
            }
        }
        Pat::Rest(rest) => collect_pattern_ids(&rest.arg, ids),
        Pat::Assign(assign) => collect_pattern_ids(&assign.left, ids),
        _ => {}
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// `object.name`, or `object["name"]` when `name` is not an identifier.
fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, quote(name))
    }
}

fn getter(object: &str, name: &str, value: &str) -> String {
    format!(
        "Object.defineProperty({}, {}, {{ enumerable: true, get: function () {{ return {}; }} }})",
        object,
        quote(name),
        value
    )
}

fn local_ident(name: &str) -> Ident {
    Ident::new(name.into(), DUMMY_SP, Default::default())
}

fn var_decl(name: &str, init: Box<Expr>) -> VarDecl {
    VarDecl {
        span: DUMMY_SP,
        kind: VarDeclKind::Const,
        declare: false,
        decls: vec![VarDeclarator {
            span: DUMMY_SP,
            name: Pat::Ident(BindingIdent {
                id: local_ident(name),
                type_ann: None,
            }),
            init: Some(init),
            definite: false,
        }],
        ctxt: Default::default(),
    }
}

/// Parse a generated expression snippet.
fn parse_expr(code: &str) -> Result<Box<Expr>, String> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(Lrc::new(FileName::Anon), code.to_string());

    let lexer = Lexer::new(
        Syntax::Es(EsSyntax::default()),
        EsVersion::Es2022,
        StringInput::from(&*fm),
        None,
    );

    let mut parser = Parser::new_from(lexer);
    parser
        .parse_expr()
        .map_err(|e| format!("Failed to parse generated code `{}`: {:?}", code, e.kind()))
}
