//! Conversion of tiered packaging quantities into a single unit total.
//!
//! A worker may report any mix of singles (units, cases), pick-face
//! (layers, cases) and bulk (pallets, layers, cases). Every quantity is
//! converted to units through the product's packaging ratios and summed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{PackagingRatios, TierQuantities};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QuantityError {
    #[error("{0} must not be negative")]
    Negative(String),

    #[error("{0} must be a finite number")]
    NonFinite(String),

    #[error("{0} must be a whole number")]
    Fractional(String),

    #[error("{0} is not a number: {1}")]
    Malformed(String, String),

    #[error("unknown quantity field: {0}")]
    UnknownField(String),

    #[error("quantity total overflows")]
    Overflow,
}

/// Total units for `quantities` under `ratios`.
pub fn normalize(
    quantities: &TierQuantities,
    ratios: &PackagingRatios,
) -> Result<i64, QuantityError> {
    for (field, value) in TierQuantities::FIELDS.iter().zip(quantities.values()) {
        if value < 0 {
            return Err(QuantityError::Negative(field.to_string()));
        }
    }

    // Ratios built through PackagingRatios::new are already >= 1; snapshots
    // read back from storage get the same treatment.
    let per_case = ratios.units_per_case.max(1);
    let per_layer = mul(per_case, ratios.cases_per_layer.max(1))?;
    let per_pallet = mul(per_layer, ratios.layers_per_pallet.max(1))?;

    let singles = add(
        quantities.singles_units,
        mul(quantities.singles_cases, per_case)?,
    )?;
    let pick_face = add(
        mul(quantities.pick_face_layers, per_layer)?,
        mul(quantities.pick_face_cases, per_case)?,
    )?;
    let bulk = add(
        add(
            mul(quantities.bulk_pallets, per_pallet)?,
            mul(quantities.bulk_layers, per_layer)?,
        )?,
        mul(quantities.bulk_cases, per_case)?,
    )?;

    add(add(singles, pick_face)?, bulk)
}

fn mul(a: i64, b: i64) -> Result<i64, QuantityError> {
    a.checked_mul(b).ok_or(QuantityError::Overflow)
}

fn add(a: i64, b: i64) -> Result<i64, QuantityError> {
    a.checked_add(b).ok_or(QuantityError::Overflow)
}

/// A quantity as it arrives on the wire: a JSON integer, a JSON number, or
/// text from a form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawQuantity {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl RawQuantity {
    /// Resolve to a non-negative whole number. Blank text counts as zero.
    /// Integral decimals such as `"3.0"` are accepted; fractions are not.
    pub fn resolve(&self, field: &str) -> Result<i64, QuantityError> {
        let value = match self {
            RawQuantity::Integer(v) => *v,
            RawQuantity::Number(v) => whole_number(field, *v)?,
            RawQuantity::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(0);
                }
                match text.parse::<i64>() {
                    Ok(v) => v,
                    Err(_) => {
                        let parsed = text.parse::<f64>().map_err(|_| {
                            QuantityError::Malformed(field.to_string(), text.to_string())
                        })?;
                        whole_number(field, parsed)?
                    }
                }
            }
        };

        if value < 0 {
            return Err(QuantityError::Negative(field.to_string()));
        }
        Ok(value)
    }
}

fn whole_number(field: &str, value: f64) -> Result<i64, QuantityError> {
    if !value.is_finite() {
        return Err(QuantityError::NonFinite(field.to_string()));
    }
    if value.fract() != 0.0 {
        return Err(QuantityError::Fractional(field.to_string()));
    }
    if value < i64::MIN as f64 || value > i64::MAX as f64 {
        return Err(QuantityError::Overflow);
    }
    Ok(value as i64)
}

/// Build tier quantities from named raw values. Unknown names are rejected.
pub fn quantities_from_raw<'a, I>(raw: I) -> Result<TierQuantities, QuantityError>
where
    I: IntoIterator<Item = (&'a str, &'a RawQuantity)>,
{
    let mut quantities = TierQuantities::default();
    for (field, value) in raw {
        let resolved = value.resolve(field)?;
        let slot = quantities
            .field_mut(field)
            .ok_or_else(|| QuantityError::UnknownField(field.to_string()))?;
        *slot = resolved;
    }
    Ok(quantities)
}
