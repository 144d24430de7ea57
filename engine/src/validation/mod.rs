//! JSON Schema validation.
//!
//! Reconciliation configurations are checked against an embedded JSON
//! Schema (draft 7) before they are deserialized, so a typo in a field
//! name or a zero unit factor is reported up front instead of surfacing
//! halfway through a batch.
//!
//! # Embedded Schemas
//!
//! - `schemas/reconcile-config.json`

use once_cell::sync::Lazy;
use serde_json::Value;

static RECONCILE_CONFIG_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/reconcile-config.json")).expect("Invalid embedded schema")
});

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with one message per violation
///
/// # Example
/// ```
/// use serde_json::json;
/// use icasa::validation::validate;
///
/// let schema = json!({
///     "type": "object",
///     "required": ["name"],
///     "properties": {
///         "name": { "type": "string" }
///     }
/// });
///
/// assert!(validate(&schema, &json!({ "name": "PHTD" })).is_ok());
/// assert!(validate(&schema, &json!({ "unit": "cm" })).is_err());
/// ```
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("Invalid schema: {}", e)])?;

    let errors: Vec<String> = validator
        .iter_errors(data)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick true/false check.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validate against the reconciliation configuration schema.
pub fn validate_reconcile_config(data: &Value) -> Result<(), Vec<String>> {
    validate(&RECONCILE_CONFIG_SCHEMA, data)
}

/// Quick check against the reconciliation configuration schema.
pub fn is_valid_reconcile_config(data: &Value) -> bool {
    is_valid(&RECONCILE_CONFIG_SCHEMA, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_config() {
        let config = json!({
            "overwrite": true,
            "key_fields": { "entity_id": "TRTNO", "level": null },
            "key_strategy": "time",
            "value_fields": ["PHTD"],
            "aggregation_function": "max",
            "unit_factors": { "PHTD": 100 },
            "field_map": [["height_cm", "PHTD"]]
        });
        assert!(is_valid_reconcile_config(&config));
        assert!(validate_reconcile_config(&json!({})).is_ok());
    }

    #[test]
    fn test_unknown_property_rejected() {
        let errors = validate_reconcile_config(&json!({ "overwrit": true })).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_bad_values_reported() {
        let config = json!({
            "aggregation_function": "median",
            "unit_factors": { "PHTD": 0 },
            "field_map": [["only-one"]]
        });
        let errors = validate_reconcile_config(&config).unwrap_err();
        assert!(errors.len() >= 3);
        assert!(errors.iter().any(|e| e.contains("median")));
    }

    #[test]
    fn test_time_sum_rejected() {
        assert!(!is_valid_reconcile_config(&json!({ "time_aggregation": "sum" })));
        assert!(is_valid_reconcile_config(&json!({ "time_aggregation": null })));
    }

    #[test]
    fn test_generic_validate() {
        let schema = json!({ "type": "object", "required": ["name"] });
        assert!(validate(&schema, &json!({ "name": "x" })).is_ok());
        assert!(!is_valid(&schema, &json!({})));
    }
}
