//! Parameter sweeps over loader configuration fields.
//!
//! A sweep turns one sub-experiment into several variants, each assigning a
//! value to every swept field. `Grid` takes the cartesian product of the
//! value lists with the first field varying slowest; `Linear` pairs the lists
//! index by index.

use serde_json::Value;

use crate::domain::{SweepOption, SweepType};
use crate::error::{LoaderError, Result};

/// Field assignments of one sweep variant, in sweep declaration order.
pub type Assignment = Vec<(String, Value)>;

/// Check that `options` can be expanded with `kind`.
pub fn validate(options: &[SweepOption], kind: SweepType) -> Result<()> {
    for option in options {
        option.validate()?;
        for value in &option.values {
            value_text(value)?;
        }
    }
    if kind == SweepType::Linear {
        if let Some(first) = options.first() {
            if let Some(odd) = options.iter().find(|o| o.values.len() != first.values.len()) {
                return Err(LoaderError::config(format!(
                    "linear sweep needs equally long value lists: {} has {}, {} has {}",
                    first.field,
                    first.values.len(),
                    odd.field,
                    odd.values.len()
                )));
            }
        }
    }
    Ok(())
}

/// All variants of a sweep. An empty sweep yields a single empty assignment.
pub fn variants(options: &[SweepOption], kind: SweepType) -> Result<Vec<Assignment>> {
    validate(options, kind)?;
    if options.is_empty() {
        return Ok(vec![Vec::new()]);
    }

    let variants = match kind {
        SweepType::Grid => {
            let mut product: Vec<Assignment> = vec![Vec::new()];
            for option in options {
                product = product
                    .into_iter()
                    .flat_map(|prefix| {
                        option.values.iter().map(move |value| {
                            let mut next = prefix.clone();
                            next.push((option.field.clone(), value.clone()));
                            next
                        })
                    })
                    .collect();
            }
            product
        }
        SweepType::Linear => {
            let len = options[0].values.len();
            (0..len)
                .map(|i| {
                    options
                        .iter()
                        .map(|o| (o.field.clone(), o.values[i].clone()))
                        .collect()
                })
                .collect()
        }
    };
    Ok(variants)
}

/// Name suffix identifying a variant: `_<Field>_<value>` per field.
pub fn suffix(assignment: &[(String, Value)]) -> Result<String> {
    let mut out = String::new();
    for (field, value) in assignment {
        out.push('_');
        out.push_str(field);
        out.push('_');
        out.push_str(&value_text(value)?);
    }
    Ok(out)
}

/// Text form of a scalar JSON value as used in paths and names.
///
/// Strings are used verbatim, numbers and booleans by their JSON text.
pub fn value_text(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(LoaderError::config(format!(
            "value {} cannot be used in a path or name",
            other
        ))),
    }
}
