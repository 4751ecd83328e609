//! Loader verbosity levels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Verbosity passed to the loader with `--verbosity=<level>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Info,
    Debug,
    Trace,
}

impl Verbosity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
            Verbosity::Trace => "trace",
        }
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verbosity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Verbosity::Info),
            "debug" => Ok(Verbosity::Debug),
            "trace" => Ok(Verbosity::Trace),
            other => Err(format!(
                "invalid verbosity '{}', choose from [info, debug, trace]",
                other
            )),
        }
    }
}

/// Deserialize an optional verbosity, treating `""` like an absent field.
pub(crate) fn optional<'de, D>(deserializer: D) -> Result<Option<Verbosity>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!("DEBUG".parse::<Verbosity>().unwrap(), Verbosity::Debug);
        assert_eq!(" trace ".parse::<Verbosity>().unwrap(), Verbosity::Trace);
        assert!("loud".parse::<Verbosity>().is_err());
    }

    #[test]
    fn test_display_matches_flag_value() {
        assert_eq!(Verbosity::Info.to_string(), "info");
        assert_eq!(Verbosity::Debug.to_string(), "debug");
    }

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "optional")]
        level: Option<Verbosity>,
    }

    #[test]
    fn test_optional_treats_empty_as_none() {
        let h: Holder = serde_json::from_str(r#"{"level": ""}"#).unwrap();
        assert!(h.level.is_none());
        let h: Holder = serde_json::from_str(r#"{}"#).unwrap();
        assert!(h.level.is_none());
        let h: Holder = serde_json::from_str(r#"{"level": "debug"}"#).unwrap();
        assert_eq!(h.level, Some(Verbosity::Debug));
        assert!(serde_json::from_str::<Holder>(r#"{"level": "loud"}"#).is_err());
    }
}
