//! Weather classifier and what each condition means for grip, the mirror
//! overlays and the headlights.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    #[default]
    Clear,
    Rain,
    Fog,
    Night,
    Storm,
}

/// Derived effects of a weather condition. Intensities are 0..1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherEffects {
    pub grip: f32,
    pub mirror_fog: f32,
    pub mirror_rain: f32,
    pub mirror_glare: f32,
    pub headlights: bool,
}

impl Weather {
    pub const ALL: [Weather; 5] = [
        Weather::Clear,
        Weather::Rain,
        Weather::Fog,
        Weather::Night,
        Weather::Storm,
    ];

    pub fn effects(self) -> WeatherEffects {
        let (grip, mirror_fog, mirror_rain, mirror_glare, headlights) = match self {
            Weather::Clear => (1.0, 0.0, 0.0, 0.4, false),
            Weather::Rain => (0.65, 0.2, 0.6, 0.0, false),
            Weather::Fog => (0.8, 0.8, 0.0, 0.0, true),
            Weather::Night => (0.95, 0.0, 0.0, 0.0, true),
            Weather::Storm => (0.5, 0.4, 1.0, 0.0, true),
        };
        WeatherEffects {
            grip,
            mirror_fog,
            mirror_rain,
            mirror_glare,
            headlights,
        }
    }

    pub fn grip(self) -> f32 {
        self.effects().grip
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Weather::Clear => "clear",
            Weather::Rain => "rain",
            Weather::Fog => "fog",
            Weather::Night => "night",
            Weather::Storm => "storm",
        }
    }
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown weather {0:?}")]
pub struct UnknownWeather(pub String);

impl FromStr for Weather {
    type Err = UnknownWeather;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Weather::ALL
            .into_iter()
            .find(|w| w.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownWeather(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grip_stays_in_documented_band() {
        for w in Weather::ALL {
            let g = w.grip();
            assert!((0.4..=1.0).contains(&g), "{w}: {g}");
        }
        assert_eq!(Weather::Clear.grip(), 1.0);
        assert_eq!(Weather::Storm.grip(), 0.5);
    }

    #[test]
    fn dark_or_murky_weather_turns_on_headlights() {
        assert!(!Weather::Clear.effects().headlights);
        assert!(!Weather::Rain.effects().headlights);
        assert!(Weather::Fog.effects().headlights);
        assert!(Weather::Night.effects().headlights);
        assert!(Weather::Storm.effects().headlights);
    }

    #[test]
    fn parses_names() {
        assert_eq!("Storm".parse::<Weather>(), Ok(Weather::Storm));
        assert_eq!(" fog ".parse::<Weather>(), Ok(Weather::Fog));
        assert!("hail".parse::<Weather>().is_err());
        let w: Weather = serde_json::from_str("\"night\"").unwrap();
        assert_eq!(w, Weather::Night);
    }
}
