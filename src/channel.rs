//! Content verticals and their fixed profiles.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::YtAutoError;

/// A content vertical with its own pipeline and upload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Horror,
    Facts,
    Finance,
}

impl ChannelType {
    pub const ALL: [ChannelType; 3] = [ChannelType::Horror, ChannelType::Facts, ChannelType::Finance];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Horror => "horror",
            ChannelType::Facts => "facts",
            ChannelType::Finance => "finance",
        }
    }

    /// Name shown on the YouTube channel.
    pub fn display_name(&self) -> &'static str {
        match self {
            ChannelType::Horror => "Dark Tales",
            ChannelType::Facts => "Mind Blown Facts",
            ChannelType::Finance => "Wealth Insights",
        }
    }

    /// Default daily slot. Slots are spread across the day so the heavy
    /// encoding work of different channels does not overlap.
    pub fn default_slot(&self) -> NaiveTime {
        let hour = match self {
            ChannelType::Horror => 9,
            ChannelType::Facts => 12,
            ChannelType::Finance => 15,
        };
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = YtAutoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "horror" => Ok(ChannelType::Horror),
            "facts" => Ok(ChannelType::Facts),
            "finance" => Ok(ChannelType::Finance),
            _ => Err(YtAutoError::UnknownChannel(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("Horror".parse::<ChannelType>().unwrap(), ChannelType::Horror);
        assert_eq!(" finance ".parse::<ChannelType>().unwrap(), ChannelType::Finance);
        assert!("cooking".parse::<ChannelType>().is_err());
    }

    #[test]
    fn display_matches_serde_name() {
        for channel in ChannelType::ALL {
            let json = serde_json::to_string(&channel).unwrap();
            assert_eq!(json, format!("\"{channel}\""));
        }
    }

    #[test]
    fn default_slots_are_spread_across_the_day() {
        assert_eq!(ChannelType::Horror.default_slot().to_string(), "09:00:00");
        assert_eq!(ChannelType::Facts.default_slot().to_string(), "12:00:00");
        assert_eq!(ChannelType::Finance.default_slot().to_string(), "15:00:00");
    }
}
