//! Display models for race and championship data.
//!
//! Raw payloads stay opaque to the cache. These types are the shaped,
//! display-ready view built from a payload on the way out:
//!
//! - `NextRace`: the upcoming race card
//! - `LastRace`, `PodiumEntry`: the previous race and its top three
//! - `DriverStanding`, `ConstructorStanding`: championship tables, sorted by position

mod ergast;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod race;
pub mod standings;

pub use race::{first_race_date, LastRace, NextRace, PodiumEntry, PODIUM_SIZE};
pub use standings::{position_display, ConstructorStanding, DriverStanding, TeamRef};
