use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ergast::{parse_position, Envelope, StandingsList, StandingsTableData};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRef {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverStanding {
    /// `None` for unclassified drivers, which sort last
    pub position: Option<u32>,
    pub name: String,
    pub nationality: Option<String>,
    pub team: Option<TeamRef>,
    pub points: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorStanding {
    pub position: Option<u32>,
    pub constructor: String,
    pub wins: String,
    pub points: String,
}

pub fn position_display(position: Option<u32>) -> String {
    position.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string())
}

fn first_standings_list(payload: &Value) -> Result<StandingsList> {
    let envelope = Envelope::<StandingsTableData>::deserialize(payload)
        .context("Unexpected standings table structure")?;
    envelope
        .mr_data
        .standings_table
        .standings_lists
        .into_iter()
        .next()
        .context("Standings table is empty")
}

/// Ascending by position, unclassified entries last.
fn sort_key(position: Option<u32>) -> (bool, u32) {
    (position.is_none(), position.unwrap_or(u32::MAX))
}

impl DriverStanding {
    pub fn list_from_payload(payload: &Value) -> Result<Vec<Self>> {
        let list = first_standings_list(payload)?;
        let mut standings: Vec<Self> = list
            .driver_standings
            .into_iter()
            .map(|entry| Self {
                position: parse_position(entry.position.as_deref()),
                name: entry.driver.full_name(),
                nationality: entry.driver.nationality,
                team: entry.constructors.into_iter().next().map(|c| TeamRef {
                    name: c.name,
                    id: c.constructor_id,
                }),
                points: entry.points,
            })
            .collect();
        standings.sort_by_key(|s| sort_key(s.position));
        Ok(standings)
    }

    pub fn team_name(&self) -> &str {
        self.team.as_ref().map(|t| t.name.as_str()).unwrap_or("-")
    }
}

impl ConstructorStanding {
    pub fn list_from_payload(payload: &Value) -> Result<Vec<Self>> {
        let list = first_standings_list(payload)?;
        let mut standings: Vec<Self> = list
            .constructor_standings
            .into_iter()
            .map(|entry| Self {
                position: parse_position(entry.position.as_deref()),
                constructor: entry.constructor.name,
                wins: entry.wins,
                points: entry.points,
            })
            .collect();
        standings.sort_by_key(|s| sort_key(s.position));
        Ok(standings)
    }
}
