//! JSON modules.

use crate::error::ParseError;

/// Lower a JSON document into a module body that exports its value.
///
/// The document is validated but emitted as written, so key order and
/// number formatting survive.
pub fn lower_json(source: &str) -> Result<String, ParseError> {
    let source = source.trim();
    serde_json::from_str::<serde_json::Value>(source)
        .map_err(|e| ParseError::new(format!("Invalid JSON: {}", e), e.line(), e.column()))?;
    Ok(format!("module.exports = {};", source))
}
