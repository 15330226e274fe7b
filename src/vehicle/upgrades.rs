use serde::{Deserialize, Serialize};

/// Discrete shop purchase, e.g. `{"type": "engine", "value": 1.2}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum UpgradeEvent {
    /// Multiplies base engine power.
    Engine(f32),
    Turbo(bool),
    /// Multiplies grip.
    Tires(f32),
    Suspension(bool),
    Brakes(bool),
    /// Cosmetic; only recorded.
    Exhaust(bool),
}

/// Unlock flags granted by upgrades.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unlocks {
    pub turbo: bool,
    pub suspension: bool,
    pub brakes: bool,
    pub exhaust: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_events() {
        let e: UpgradeEvent = serde_json::from_str(r#"{"type":"engine","value":1.2}"#).unwrap();
        assert_eq!(e, UpgradeEvent::Engine(1.2));
        let e: UpgradeEvent = serde_json::from_str(r#"{"type":"turbo","value":true}"#).unwrap();
        assert_eq!(e, UpgradeEvent::Turbo(true));
        assert!(serde_json::from_str::<UpgradeEvent>(r#"{"type":"wings","value":1}"#).is_err());
    }
}
