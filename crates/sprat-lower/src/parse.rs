//! Source parsing and static import extraction.

use swc_common::{FileName, SourceMap, Span, Spanned, sync::Lrc};
use swc_ecma_ast::{EsVersion, Module, ModuleDecl, ModuleItem};
use swc_ecma_parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax, lexer::Lexer};

use crate::error::ParseError;

/// Source language of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    JavaScript,
    TypeScript,
}

impl Dialect {
    fn syntax(self) -> Syntax {
        match self {
            Dialect::JavaScript => Syntax::Es(EsSyntax {
                jsx: false,
                ..Default::default()
            }),
            Dialect::TypeScript => Syntax::Typescript(TsSyntax {
                tsx: false,
                decorators: true,
                ..Default::default()
            }),
        }
    }
}

/// A parsed module together with the source map its spans point into.
pub struct ParsedModule {
    pub(crate) cm: Lrc<SourceMap>,
    pub module: Module,
    pub dialect: Dialect,
}

impl std::fmt::Debug for ParsedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedModule")
            .field("dialect", &self.dialect)
            .field("items", &self.module.body.len())
            .finish()
    }
}

/// Parse `source` as an ES module.
///
/// Errors the parser recovers from are still reported: a module that only
/// parses with recovery is malformed.
pub fn parse_module(
    source: &str,
    filename: &str,
    dialect: Dialect,
) -> Result<ParsedModule, ParseError> {
    let cm: Lrc<SourceMap> = Default::default();
    let fm = cm.new_source_file(
        Lrc::new(FileName::Custom(filename.to_string())),
        source.to_string(),
    );

    let lexer = Lexer::new(
        dialect.syntax(),
        EsVersion::EsNext,
        StringInput::from(&*fm),
        None,
    );
    let mut parser = Parser::new_from(lexer);

    let result = parser.parse_module();
    let recovered = parser.take_errors();

    let module = result.map_err(|e| located(&cm, e.span(), &e.kind().msg()))?;
    if let Some(e) = recovered.first() {
        return Err(located(&cm, e.span(), &e.kind().msg()));
    }

    Ok(ParsedModule {
        cm,
        module,
        dialect,
    })
}

fn located(cm: &SourceMap, span: Span, message: &str) -> ParseError {
    let loc = cm.lookup_char_pos(span.lo);
    ParseError::new(message, loc.line, loc.col.0 + 1)
}

/// Static import specifiers of a module, in source order.
///
/// Only top-level declarations count: `import ... from`, bare `import`,
/// `export ... from` and `export * from`. Type-only forms are skipped since
/// they vanish when types are stripped. Repeated specifiers are kept.
pub fn import_specifiers(module: &Module) -> Vec<String> {
    let mut specifiers = Vec::new();

    for item in &module.body {
        match item {
            ModuleItem::ModuleDecl(ModuleDecl::Import(import)) if !import.type_only => {
                specifiers.push(wtf8_to_string(&import.src));
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportNamed(export)) if !export.type_only => {
                if let Some(src) = &export.src {
                    specifiers.push(wtf8_to_string(src));
                }
            }
            ModuleItem::ModuleDecl(ModuleDecl::ExportAll(export)) if !export.type_only => {
                specifiers.push(wtf8_to_string(&export.src));
            }
            _ => {}
        }
    }

    specifiers
}

/// String value of a string literal.
pub(crate) fn wtf8_to_string(value: &swc_ecma_ast::Str) -> String {
    value.value.as_str().unwrap_or_default().to_string()
}
