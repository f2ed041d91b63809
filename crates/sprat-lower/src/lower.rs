//! Lowering of parsed modules into loader-ready function bodies.
//!
//! The pipeline mirrors a transpile pass:
//! `resolver` (scope marks) → `strip` (TypeScript only) → ESM lowering →
//! `fixer` → code generation.

use swc_common::{GLOBALS, Globals, Mark};
use swc_ecma_ast::{EsVersion, Program};
use swc_ecma_codegen::{Config as CodegenConfig, Emitter, text_writer::JsWriter};
use swc_ecma_transforms_base::{fixer::fixer, resolver};
use swc_ecma_transforms_typescript::strip;
use swc_ecma_visit::VisitMutWith;

use crate::error::LowerError;
use crate::esm::EsmLowering;
use crate::parse::{Dialect, ParsedModule};

/// Code generation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowerOptions {
    /// ECMAScript version the generated code is printed for. Default: ES2020.
    pub target: EsVersion,
    /// Strip insignificant whitespace. Default: false.
    pub minify: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            target: EsVersion::Es2020,
            minify: false,
        }
    }
}

/// Parse a target name such as `es2020` or `esnext`.
pub fn parse_target(name: &str) -> Option<EsVersion> {
    let version = match name.to_ascii_lowercase().as_str() {
        "es3" => EsVersion::Es3,
        "es5" => EsVersion::Es5,
        "es2015" | "es6" => EsVersion::Es2015,
        "es2016" => EsVersion::Es2016,
        "es2017" => EsVersion::Es2017,
        "es2018" => EsVersion::Es2018,
        "es2019" => EsVersion::Es2019,
        "es2020" => EsVersion::Es2020,
        "es2021" => EsVersion::Es2021,
        "es2022" => EsVersion::Es2022,
        "esnext" => EsVersion::EsNext,
        _ => return None,
    };
    Some(version)
}

/// Lower a parsed module into code for the runtime loader.
///
/// The result expects `require`, `module` and `exports` to be in scope and
/// contains no `import`/`export` syntax.
pub fn lower(parsed: ParsedModule, options: &LowerOptions) -> Result<String, LowerError> {
    let ParsedModule {
        cm,
        module,
        dialect,
    } = parsed;

    let is_typescript = dialect == Dialect::TypeScript;
    let mut program = Program::Module(module);
    let mut lowering = EsmLowering::default();

    GLOBALS.set(&Globals::default(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        program.visit_mut_with(&mut resolver(unresolved_mark, top_level_mark, is_typescript));
        if is_typescript {
            program.mutate(&mut strip(unresolved_mark, top_level_mark));
        }
        program.visit_mut_with(&mut lowering);
        program.visit_mut_with(&mut fixer(None));
    });

    if let Some(message) = lowering.errors.into_iter().next() {
        return Err(LowerError::Transform(message));
    }

    let module = match program {
        Program::Module(m) => m,
        Program::Script(_) => {
            return Err(LowerError::Transform(
                "Expected module, got script".to_string(),
            ));
        }
    };

    let mut buf = vec![];
    {
        let writer = JsWriter::new(cm.clone(), "\n", &mut buf, None);

        let codegen_config = CodegenConfig::default()
            .with_target(options.target)
            .with_ascii_only(false)
            .with_minify(options.minify)
            .with_omit_last_semi(false);

        let mut emitter = Emitter {
            cfg: codegen_config,
            cm: cm.clone(),
            comments: None,
            wr: writer,
        };

        emitter
            .emit_module(&module)
            .map_err(|e| LowerError::Codegen(format!("Failed to emit code: {}", e)))?;
    }

    String::from_utf8(buf)
        .map_err(|e| LowerError::Codegen(format!("Invalid UTF-8 output: {}", e)))
}
