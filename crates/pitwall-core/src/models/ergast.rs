//! Wire types for the `MRData` envelope returned by the results API.
//!
//! Only the fields the display models need are declared; everything else in
//! the payload is ignored.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(rename = "MRData")]
    pub mr_data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RaceTableData {
    #[serde(rename = "RaceTable")]
    pub race_table: RaceTable,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RaceTable {
    #[serde(rename = "Races", default)]
    pub races: Vec<Race>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Race {
    pub season: Option<String>,
    pub round: Option<String>,
    #[serde(rename = "raceName")]
    pub race_name: String,
    #[serde(rename = "Circuit")]
    pub circuit: Circuit,
    pub date: String,
    pub time: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "Results", default)]
    pub results: Vec<RaceResult>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Circuit {
    #[serde(rename = "circuitName")]
    pub circuit_name: String,
    #[serde(rename = "Location")]
    pub location: Location,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Location {
    pub locality: String,
    pub country: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RaceResult {
    pub position: String,
    #[serde(rename = "Driver")]
    pub driver: Driver,
    #[serde(rename = "Constructor")]
    pub constructor: Constructor,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Driver {
    #[serde(rename = "givenName")]
    pub given_name: String,
    #[serde(rename = "familyName")]
    pub family_name: String,
    pub nationality: Option<String>,
    #[serde(rename = "permanentNumber")]
    pub permanent_number: Option<String>,
    pub code: Option<String>,
}

impl Driver {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.given_name, self.family_name)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Constructor {
    #[serde(rename = "constructorId")]
    pub constructor_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingsTableData {
    #[serde(rename = "StandingsTable")]
    pub standings_table: StandingsTable,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingsTable {
    #[serde(rename = "StandingsLists", default)]
    pub standings_lists: Vec<StandingsList>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StandingsList {
    #[serde(rename = "DriverStandings", default)]
    pub driver_standings: Vec<DriverStandingEntry>,
    #[serde(rename = "ConstructorStandings", default)]
    pub constructor_standings: Vec<ConstructorStandingEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DriverStandingEntry {
    // Absent for drivers without a classified position
    pub position: Option<String>,
    pub points: String,
    #[serde(rename = "Driver")]
    pub driver: Driver,
    #[serde(rename = "Constructors", default)]
    pub constructors: Vec<Constructor>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConstructorStandingEntry {
    pub position: Option<String>,
    pub points: String,
    pub wins: String,
    #[serde(rename = "Constructor")]
    pub constructor: Constructor,
}

/// Parse an API position string; anything non-numeric is unclassified.
pub(crate) fn parse_position(position: Option<&str>) -> Option<u32> {
    position.and_then(|p| p.trim().parse().ok())
}
