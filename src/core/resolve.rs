//! Argument resolution: variable substitution for parsed arguments.

use super::ast::{Argument, PartKind};
use super::error::ReferenceError;
use super::store::VariableStore;

/// Arguments after substitution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedArgs {
    pub values: Vec<String>,
    /// No argument referenced a variable, so the values can't change
    /// between runs of the same query.
    pub constant: bool,
}

/// Resolve one argument into `(is_constant, value)`.
///
/// Fails on the first reference to a variable that doesn't exist.
pub fn resolve_argument(arg: &Argument, store: &VariableStore) -> Result<(bool, String), ReferenceError> {
    let mut constant = true;
    let mut value = String::new();
    for part in &arg.parts {
        match part.kind {
            PartKind::Literal => value.push_str(&part.text),
            PartKind::Reference => {
                let resolved = store
                    .get_string(&part.text)
                    .ok_or_else(|| ReferenceError::undefined(&part.text, part.offset))?;
                value.push_str(&resolved);
                constant = false;
            }
        }
    }
    Ok((constant, value))
}

/// Resolve every argument of an invocation.
pub fn resolve_arguments(args: &[Argument], store: &VariableStore) -> Result<ResolvedArgs, ReferenceError> {
    let mut resolved = ResolvedArgs {
        values: Vec::with_capacity(args.len()),
        constant: true,
    };
    for arg in args {
        let (constant, value) = resolve_argument(arg, store)?;
        resolved.constant &= constant;
        resolved.values.push(value);
    }
    Ok(resolved)
}
