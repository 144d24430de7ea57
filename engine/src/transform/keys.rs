//! Identity key resolution.
//!
//! Rows are aligned on the entity id plus the longest run of further key
//! fields, taken in priority order, that both tables carry:
//!
//! ```text
//! level strategy:  entity_id → date → level → replicate
//! time strategy:   entity_id → date → time  → replicate
//! ```
//!
//! A gap ends the run: with `[TRTNO, DATE, RP]` available under the level
//! strategy and no level column, the key is `[TRTNO, DATE]`.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Which optional field follows the date in the key priority order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    #[default]
    Level,
    Time,
}

/// Names of the identity columns in the canonical (template) schema.
///
/// Optional fields set to `None` are not candidates at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFields {
    pub entity_id: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub level: Option<String>,
    pub replicate: Option<String>,
}

impl Default for KeyFields {
    /// Treatment-number layout of ICASA measurement sheets.
    fn default() -> Self {
        Self {
            entity_id: "TRTNO".to_string(),
            date: Some("DATE".to_string()),
            time: Some("TIME".to_string()),
            level: None,
            replicate: Some("RP".to_string()),
        }
    }
}

impl KeyFields {
    /// Layout used for observation-database exports: sampling location,
    /// date and time of measurement.
    pub fn observation_defaults() -> Self {
        Self {
            entity_id: "sampling_location_number".to_string(),
            date: Some("date_of_measurement".to_string()),
            time: Some("time_of_measurement".to_string()),
            level: None,
            replicate: None,
        }
    }

    /// Candidate key fields in priority order, entity id first.
    pub fn candidates(&self, strategy: KeyStrategy) -> Vec<String> {
        let third = match strategy {
            KeyStrategy::Level => &self.level,
            KeyStrategy::Time => &self.time,
        };
        std::iter::once(Some(&self.entity_id))
            .chain([self.date.as_ref(), third.as_ref(), self.replicate.as_ref()])
            .flatten()
            .cloned()
            .collect()
    }

    /// Every configured identity column, regardless of strategy.
    pub fn all(&self) -> Vec<&str> {
        std::iter::once(Some(self.entity_id.as_str()))
            .chain([
                self.date.as_deref(),
                self.time.as_deref(),
                self.level.as_deref(),
                self.replicate.as_deref(),
            ])
            .flatten()
            .collect()
    }
}

/// Resolve the merge key from the fields both tables share.
///
/// `candidates[0]` is the entity id and must be available. The key is the
/// entity id followed by the longest fully-available prefix of the remaining
/// candidates, so it is never empty on success.
pub fn resolve_key<S: AsRef<str>>(available: &[String], candidates: &[S]) -> EngineResult<Vec<String>> {
    let is_available = |name: &str| available.iter().any(|a| a == name);

    let Some((entity, rest)) = candidates.split_first() else {
        return Err(EngineError::NoIdentityField("<none configured>".to_string()));
    };
    if !is_available(entity.as_ref()) {
        return Err(EngineError::NoIdentityField(entity.as_ref().to_string()));
    }

    let key = std::iter::once(entity)
        .chain(rest.iter().take_while(|c| is_available(c.as_ref())))
        .map(|c| c.as_ref().to_string())
        .collect();
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_key() {
        let key = resolve_key(
            &fields(&["PHTD", "RP", "DATE", "TRTNO", "LEVEL"]),
            &["TRTNO", "DATE", "LEVEL", "RP"],
        )
        .unwrap();
        assert_eq!(key, vec!["TRTNO", "DATE", "LEVEL", "RP"]);
    }

    #[test]
    fn test_gap_ends_prefix() {
        let key = resolve_key(&fields(&["TRTNO", "DATE", "RP"]), &["TRTNO", "DATE", "LEVEL", "RP"]).unwrap();
        assert_eq!(key, vec!["TRTNO", "DATE"]);
    }

    #[test]
    fn test_degenerates_to_entity() {
        let key = resolve_key(&fields(&["TRTNO", "PHTD"]), &["TRTNO", "DATE", "TIME", "RP"]).unwrap();
        assert_eq!(key, vec!["TRTNO"]);

        // Replicate alone does not extend the key past a missing date
        let key = resolve_key(&fields(&["TRTNO", "RP"]), &["TRTNO", "DATE", "TIME", "RP"]).unwrap();
        assert_eq!(key, vec!["TRTNO"]);
    }

    #[test]
    fn test_missing_entity_id() {
        let err = resolve_key(&fields(&["DATE", "RP"]), &["TRTNO", "DATE", "RP"]).unwrap_err();
        assert_eq!(err, EngineError::NoIdentityField("TRTNO".to_string()));

        let none: [&str; 0] = [];
        assert!(matches!(
            resolve_key(&fields(&["TRTNO"]), &none),
            Err(EngineError::NoIdentityField(_))
        ));
    }

    #[test]
    fn test_candidates_by_strategy() {
        let mut kf = KeyFields::default();
        kf.level = Some("SLLB".to_string());
        assert_eq!(kf.candidates(KeyStrategy::Level), vec!["TRTNO", "DATE", "SLLB", "RP"]);
        assert_eq!(kf.candidates(KeyStrategy::Time), vec!["TRTNO", "DATE", "TIME", "RP"]);

        // Unconfigured fields are skipped, not treated as gaps
        kf.level = None;
        assert_eq!(kf.candidates(KeyStrategy::Level), vec!["TRTNO", "DATE", "RP"]);
    }

    #[test]
    fn test_key_fields_partial_json() {
        let kf: KeyFields = serde_json::from_str(r#"{"entity_id": "weather_station_id"}"#).unwrap();
        assert_eq!(kf.entity_id, "weather_station_id");
        assert_eq!(kf.date.as_deref(), Some("DATE"));
    }
}
