use std::fmt;

/// One stable upstream resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    NextRace,
    LastRaceResults,
    DriverStandings,
    ConstructorStandings { season: String },
}

impl Endpoint {
    /// Path below the API base URL, without the `.json` suffix.
    pub fn path(&self) -> String {
        match self {
            Endpoint::NextRace => "current/next".to_string(),
            Endpoint::LastRaceResults => "current/last/results".to_string(),
            Endpoint::DriverStandings => "current/driverStandings".to_string(),
            Endpoint::ConstructorStandings { season } => format!("{}/constructorStandings", season),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}
