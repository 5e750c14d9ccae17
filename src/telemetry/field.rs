use std::{fmt, str::FromStr};

use anyhow::{Error, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Date,
    Aq,
    H2s,
    Humidity,
    Temperature,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Date,
        Field::Aq,
        Field::H2s,
        Field::Humidity,
        Field::Temperature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Aq => "aq",
            Field::H2s => "h2s",
            Field::Humidity => "humidity",
            Field::Temperature => "temperature",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date" => Ok(Field::Date),
            "aq" => Ok(Field::Aq),
            "h2s" => Ok(Field::H2s),
            "humidity" => Ok(Field::Humidity),
            "temperature" => Ok(Field::Temperature),
            _ => bail!("unknown field: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    Aq,
    H2s,
    Humidity,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 4] = [
        Metric::Aq,
        Metric::H2s,
        Metric::Humidity,
        Metric::Temperature,
    ];

    pub fn topic_suffix(&self) -> &'static str {
        self.field().as_str()
    }

    pub fn field(&self) -> Field {
        match self {
            Metric::Aq => Field::Aq,
            Metric::H2s => Field::H2s,
            Metric::Humidity => Field::Humidity,
            Metric::Temperature => Field::Temperature,
        }
    }

    /// Suffix of the push event name. Dashboards listen for air quality
    /// under `pH`.
    pub fn event_suffix(&self) -> &'static str {
        match self {
            Metric::Aq => "pH",
            Metric::H2s => "h2s",
            Metric::Humidity => "humidity",
            Metric::Temperature => "temperature",
        }
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aq" => Ok(Metric::Aq),
            "h2s" => Ok(Metric::H2s),
            "humidity" => Ok(Metric::Humidity),
            "temperature" => Ok(Metric::Temperature),
            _ => bail!("unknown metric: {}", s),
        }
    }
}
