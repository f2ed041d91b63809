//! sprat-lower - parsing and lowering of ES modules for the sprat bundler.
//!
//! This crate turns one source file into the pieces the bundler needs:
//!
//! - the ordered list of static import specifiers ([`import_specifiers`])
//! - a function body that runs under an injected `require` / `module` /
//!   `exports` scope ([`lower`])
//!
//! TypeScript sources are stripped of types with SWC on the way through.
//!
//! # Example
//!
//! ```no_run
//! use sprat_lower::{Dialect, LowerOptions, import_specifiers, lower, parse_module};
//!
//! let parsed = parse_module("import { x } from './x';", "main.js", Dialect::JavaScript)?;
//! assert_eq!(import_specifiers(&parsed.module), vec!["./x".to_string()]);
//!
//! let code = lower(parsed, &LowerOptions::default())?;
//! assert!(code.contains("require(\"./x\")"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod esm;
pub mod error;
pub mod json;
pub mod lower;
pub mod parse;

pub use error::{LowerError, ParseError};
pub use json::lower_json;
pub use lower::{LowerOptions, lower, parse_target};
pub use parse::{Dialect, ParsedModule, import_specifiers, parse_module};

pub use swc_ecma_ast::EsVersion;
