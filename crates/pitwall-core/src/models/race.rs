use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ergast::{Envelope, Race, RaceTableData};

/// Number of finishers shown on the podium card
pub const PODIUM_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRace {
    pub season: Option<String>,
    pub round: Option<String>,
    pub name: String,
    pub circuit: String,
    pub date: String,
    pub time: Option<String>,
    pub url: Option<String>,
    /// "Locality, Country"
    pub location: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodiumEntry {
    pub position: u32,
    pub name: String,
    pub number: Option<String>,
    pub team: String,
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastRace {
    pub name: String,
    pub circuit: String,
    pub date: String,
    pub location: String,
    pub podium: Vec<PodiumEntry>,
}

fn first_race(payload: &Value) -> Result<Race> {
    let envelope = Envelope::<RaceTableData>::deserialize(payload)
        .context("Unexpected race table structure")?;
    envelope
        .mr_data
        .race_table
        .races
        .into_iter()
        .next()
        .context("Race table is empty")
}

/// Date of the first race in a race-table payload, without full parsing.
pub fn first_race_date(payload: &Value) -> Option<&str> {
    payload
        .pointer("/MRData/RaceTable/Races/0/date")
        .and_then(Value::as_str)
}

impl NextRace {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let race = first_race(payload)?;
        let location = format!("{}, {}", race.circuit.location.locality, race.circuit.location.country);
        Ok(Self {
            season: race.season,
            round: race.round,
            name: race.race_name,
            circuit: race.circuit.circuit_name,
            date: race.date,
            time: race.time,
            url: race.url,
            location,
        })
    }
}

impl LastRace {
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let race = first_race(payload)?;

        let podium = race
            .results
            .iter()
            .take(PODIUM_SIZE)
            .map(|result| -> Result<PodiumEntry> {
                let position: u32 = result
                    .position
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid podium position {:?}", result.position))?;
                Ok(PodiumEntry {
                    position,
                    name: result.driver.full_name(),
                    number: result.driver.permanent_number.clone(),
                    team: result.constructor.name.clone(),
                    code: result.driver.code.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: race.race_name,
            circuit: race.circuit.circuit_name,
            date: race.date,
            location: race.circuit.location.locality,
            podium,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures;
    use serde_json::json;

    #[test]
    fn test_next_race_from_payload() {
        let race = NextRace::from_payload(&fixtures::next_race("2024-05-26")).expect("should shape");
        assert_eq!(race.name, "Monaco Grand Prix");
        assert_eq!(race.circuit, "Circuit de Monaco");
        assert_eq!(race.date, "2024-05-26");
        assert_eq!(race.time.as_deref(), Some("13:00:00Z"));
        assert_eq!(race.location, "Monte-Carlo, Monaco");
        assert_eq!(race.round.as_deref(), Some("8"));
    }

    #[test]
    fn test_last_race_keeps_top_three_only() {
        let race = LastRace::from_payload(&fixtures::last_race()).expect("should shape");
        assert_eq!(race.name, "Emilia Romagna Grand Prix");
        assert_eq!(race.location, "Imola");
        assert_eq!(race.podium.len(), 3);
        assert_eq!(race.podium[0].name, "Max Verstappen");
        assert_eq!(race.podium[0].code.as_deref(), Some("VER"));
        assert_eq!(race.podium[1].team, "McLaren");
        assert_eq!(race.podium[2].position, 3);
        assert_eq!(race.podium[0].number.as_deref(), Some("33"));
    }

    #[test]
    fn test_empty_race_table_is_an_error() {
        let payload = json!({"MRData": {"RaceTable": {"Races": []}}});
        assert!(NextRace::from_payload(&payload).is_err());
        assert!(LastRace::from_payload(&payload).is_err());
    }

    #[test]
    fn test_wrong_shape_is_an_error() {
        assert!(NextRace::from_payload(&json!({"unexpected": true})).is_err());
        assert!(NextRace::from_payload(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_first_race_date() {
        assert_eq!(first_race_date(&fixtures::next_race("2024-06-09")), Some("2024-06-09"));
        assert_eq!(first_race_date(&json!({"MRData": {}})), None);
    }
}
