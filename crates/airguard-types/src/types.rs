//! Core domain types shared by the store and the service.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// How long the device keeps its relay in the commanded state.
///
/// The wire spelling (`10min`, `30min`, `1hr`) is what the device firmware
/// understands, so it is used for serialization, storage and display alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OperationDuration {
    /// Ten minutes. Used whenever a command does not name a duration.
    #[default]
    #[cfg_attr(feature = "serde", serde(rename = "10min"))]
    TenMinutes,
    /// Thirty minutes.
    #[cfg_attr(feature = "serde", serde(rename = "30min"))]
    ThirtyMinutes,
    /// One hour.
    #[cfg_attr(feature = "serde", serde(rename = "1hr"))]
    OneHour,
}

impl OperationDuration {
    /// All durations, shortest first.
    pub const ALL: [OperationDuration; 3] = [
        OperationDuration::TenMinutes,
        OperationDuration::ThirtyMinutes,
        OperationDuration::OneHour,
    ];

    /// The wire spelling of this duration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationDuration::TenMinutes => "10min",
            OperationDuration::ThirtyMinutes => "30min",
            OperationDuration::OneHour => "1hr",
        }
    }

    /// The duration as a [`Duration`].
    #[must_use]
    pub fn as_duration(&self) -> Duration {
        match self {
            OperationDuration::TenMinutes => Duration::from_secs(10 * 60),
            OperationDuration::ThirtyMinutes => Duration::from_secs(30 * 60),
            OperationDuration::OneHour => Duration::from_secs(60 * 60),
        }
    }
}

impl FromStr for OperationDuration {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "10min" => Ok(OperationDuration::TenMinutes),
            "30min" => Ok(OperationDuration::ThirtyMinutes),
            "1hr" => Ok(OperationDuration::OneHour),
            other => Err(ParseError::invalid(
                "operation duration",
                other,
                "10min, 30min, 1hr",
            )),
        }
    }
}

impl fmt::Display for OperationDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Air quality classification attached to readings and summaries.
///
/// # Examples
///
/// ```
/// use airguard_types::AirQuality;
///
/// assert_eq!(AirQuality::classify(31.0, 40.0), AirQuality::Bad);
/// assert_eq!(AirQuality::classify(25.0, 65.0), AirQuality::Fair);
/// assert_eq!(AirQuality::classify(30.0, 60.0), AirQuality::Good);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AirQuality {
    Good,
    Fair,
    Bad,
}

/// Mean temperature (Celsius) above which a window is classified [`AirQuality::Bad`].
pub const BAD_TEMPERATURE_THRESHOLD: f64 = 30.0;

/// Mean relative humidity (percent) above which a window is classified [`AirQuality::Fair`].
pub const FAIR_HUMIDITY_THRESHOLD: f64 = 60.0;

impl AirQuality {
    /// Classify a window from its mean temperature and mean humidity.
    ///
    /// Temperature is checked before humidity, and both comparisons are
    /// strict. The VOC index does not take part in the classification.
    #[must_use]
    pub fn classify(mean_temperature: f64, mean_humidity: f64) -> Self {
        if mean_temperature > BAD_TEMPERATURE_THRESHOLD {
            AirQuality::Bad
        } else if mean_humidity > FAIR_HUMIDITY_THRESHOLD {
            AirQuality::Fair
        } else {
            AirQuality::Good
        }
    }

    /// The stored spelling of this classification.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AirQuality::Good => "Good",
            AirQuality::Fair => "Fair",
            AirQuality::Bad => "Bad",
        }
    }
}

impl FromStr for AirQuality {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "Good" => Ok(AirQuality::Good),
            "Fair" => Ok(AirQuality::Fair),
            "Bad" => Ok(AirQuality::Bad),
            other => Err(ParseError::invalid("air quality", other, "Good, Fair, Bad")),
        }
    }
}

impl fmt::Display for AirQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The trailing window a summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SummaryKind {
    /// The last 60 minutes.
    Hourly,
    /// The last 24 hours.
    Daily,
}

impl SummaryKind {
    /// Length of the trailing window, measured back from the moment of computation.
    #[must_use]
    pub fn window(&self) -> Duration {
        match self {
            SummaryKind::Hourly => Duration::from_secs(60 * 60),
            SummaryKind::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryKind::Hourly => "hourly",
            SummaryKind::Daily => "daily",
        }
    }
}

impl FromStr for SummaryKind {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "hourly" => Ok(SummaryKind::Hourly),
            "daily" => Ok(SummaryKind::Daily),
            other => Err(ParseError::invalid("summary kind", other, "hourly, daily")),
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an authenticated account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> ParseResult<Self> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(ParseError::invalid("role", other, "user, admin")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("user"),
            Role::Admin => f.write_str("admin"),
        }
    }
}
