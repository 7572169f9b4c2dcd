//! Trimmed API payloads shared by tests.

use serde_json::{json, Value};

fn driver(given: &str, family: &str, code: &str, number: &str, nationality: &str) -> Value {
    json!({
        "driverId": family.to_lowercase(),
        "permanentNumber": number,
        "code": code,
        "givenName": given,
        "familyName": family,
        "nationality": nationality
    })
}

fn constructor(id: &str, name: &str) -> Value {
    json!({"constructorId": id, "name": name, "nationality": "Unknown"})
}

pub(crate) fn next_race(date: &str) -> Value {
    json!({
        "MRData": {
            "series": "f1",
            "RaceTable": {
                "season": "2024",
                "round": "8",
                "Races": [{
                    "season": "2024",
                    "round": "8",
                    "url": "https://en.wikipedia.org/wiki/2024_Monaco_Grand_Prix",
                    "raceName": "Monaco Grand Prix",
                    "Circuit": {
                        "circuitId": "monaco",
                        "circuitName": "Circuit de Monaco",
                        "Location": {"lat": "43.7347", "long": "7.42056", "locality": "Monte-Carlo", "country": "Monaco"}
                    },
                    "date": date,
                    "time": "13:00:00Z"
                }]
            }
        }
    })
}

pub(crate) fn last_race() -> Value {
    let result = |position: &str, driver: Value, team: Value| {
        json!({"number": "1", "position": position, "points": "25", "Driver": driver, "Constructor": team})
    };
    json!({
        "MRData": {
            "RaceTable": {
                "season": "2024",
                "round": "7",
                "Races": [{
                    "season": "2024",
                    "round": "7",
                    "raceName": "Emilia Romagna Grand Prix",
                    "Circuit": {
                        "circuitId": "imola",
                        "circuitName": "Autodromo Enzo e Dino Ferrari",
                        "Location": {"locality": "Imola", "country": "Italy"}
                    },
                    "date": "2024-05-19",
                    "time": "13:00:00Z",
                    "Results": [
                        result("1", driver("Max", "Verstappen", "VER", "33", "Dutch"), constructor("red_bull", "Red Bull")),
                        result("2", driver("Lando", "Norris", "NOR", "4", "British"), constructor("mclaren", "McLaren")),
                        result("3", driver("Charles", "Leclerc", "LEC", "16", "Monegasque"), constructor("ferrari", "Ferrari")),
                        result("4", driver("Oscar", "Piastri", "PIA", "81", "Australian"), constructor("mclaren", "McLaren"))
                    ]
                }]
            }
        }
    })
}

pub(crate) fn driver_standings() -> Value {
    json!({
        "MRData": {
            "StandingsTable": {
                "season": "2024",
                "StandingsLists": [{
                    "season": "2024",
                    "round": "7",
                    "DriverStandings": [
                        {
                            "position": "2", "positionText": "2", "points": "113", "wins": "1",
                            "Driver": driver("Charles", "Leclerc", "LEC", "16", "Monegasque"),
                            "Constructors": [constructor("ferrari", "Ferrari")]
                        },
                        {
                            "positionText": "-", "points": "0", "wins": "0",
                            "Driver": driver("Oliver", "Bearman", "BEA", "87", "British"),
                            "Constructors": []
                        },
                        {
                            "position": "10", "positionText": "10", "points": "15", "wins": "0",
                            "Driver": driver("Yuki", "Tsunoda", "TSU", "22", "Japanese"),
                            "Constructors": [constructor("rb", "RB F1 Team")]
                        },
                        {
                            "position": "1", "positionText": "1", "points": "169", "wins": "5",
                            "Driver": driver("Max", "Verstappen", "VER", "33", "Dutch"),
                            "Constructors": [constructor("red_bull", "Red Bull")]
                        }
                    ]
                }]
            }
        }
    })
}

pub(crate) fn constructor_standings() -> Value {
    json!({
        "MRData": {
            "StandingsTable": {
                "season": "2024",
                "StandingsLists": [{
                    "ConstructorStandings": [
                        {"position": "3", "points": "124", "wins": "1", "Constructor": constructor("mclaren", "McLaren")},
                        {"position": "1", "points": "241", "wins": "5", "Constructor": constructor("red_bull", "Red Bull")},
                        {"position": "2", "points": "212", "wins": "2", "Constructor": constructor("ferrari", "Ferrari")}
                    ]
                }]
            }
        }
    })
}
