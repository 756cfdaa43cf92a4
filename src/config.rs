//! Engine configuration: the roll budget and how each denomination is fulfilled.

use crate::common::Denomination;
use crate::error::RResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The name of the built-in pseudo-random fulfillment method.
pub const RANDOM_METHOD: &str = "random";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiceConfig {
    /// Upper bound on dice drawn during one evaluation.
    pub max_rolls: Option<usize>,
    pub fulfillment: FulfillmentConfig,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            max_rolls: Some(1000),
            fulfillment: FulfillmentConfig::default(),
        }
    }
}

impl DiceConfig {
    pub fn from_json(s: &str) -> RResult<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FulfillmentConfig {
    /// Method used for any denomination missing from `dice`.
    pub default_method: String,
    pub methods: BTreeMap<String, MethodConfig>,
    /// Denomination (`"d20"`, `"dc"`, `"df"`) to method name.
    pub dice: BTreeMap<String, String>,
}

impl Default for FulfillmentConfig {
    fn default() -> Self {
        let mut methods = BTreeMap::new();
        methods.insert(
            RANDOM_METHOD.to_string(),
            MethodConfig {
                label: "Pseudo-random number generator".to_string(),
                interactive: false,
            },
        );
        Self {
            default_method: RANDOM_METHOD.to_string(),
            methods,
            dice: BTreeMap::new(),
        }
    }
}

impl FulfillmentConfig {
    /// Route a denomination to a method, registering the method if needed.
    pub fn assign(&mut self, denomination: Denomination, method: &str, interactive: bool) {
        self.methods
            .entry(method.to_string())
            .or_insert_with(|| MethodConfig {
                label: method.to_string(),
                interactive,
            });
        self.dice.insert(denomination.to_string(), method.to_string());
    }

    pub fn method_for(&self, denomination: &Denomination) -> &str {
        self.dice
            .get(&denomination.to_string())
            .map(String::as_str)
            .unwrap_or(&self.default_method)
    }

    /// The external method for a denomination, if results must come from outside.
    pub fn external_method(&self, denomination: &Denomination) -> Option<&str> {
        let method = self.method_for(denomination);
        match self.methods.get(method) {
            Some(m) if m.interactive => Some(method),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    pub label: String,
    /// Results for this method are supplied by an external actor.
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_internal() {
        let config = DiceConfig::default();
        assert_eq!(config.max_rolls, Some(1000));
        assert_eq!(config.fulfillment.method_for(&Denomination::Die(20)), RANDOM_METHOD);
        assert_eq!(config.fulfillment.external_method(&Denomination::Die(20)), None);
    }

    #[test]
    fn test_from_json() {
        let config = DiceConfig::from_json(
            r#"{
                "fulfillment": {
                    "methods": { "manual": { "label": "Physical dice", "interactive": true } },
                    "dice": { "d20": "manual" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_rolls, Some(1000));
        assert_eq!(config.fulfillment.default_method, RANDOM_METHOD);
        assert_eq!(config.fulfillment.external_method(&Denomination::Die(20)), Some("manual"));
        assert_eq!(config.fulfillment.external_method(&Denomination::Die(6)), None);
    }

    #[test]
    fn test_assign() {
        let mut config = FulfillmentConfig::default();
        config.assign(Denomination::Fate, "manual", true);
        assert_eq!(config.external_method(&Denomination::Fate), Some("manual"));
        assert!(DiceConfig::from_json("{ \"max_rolls\": \"many\" }").is_err());
    }
}
