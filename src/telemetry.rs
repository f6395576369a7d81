//! Personnel telemetry wire types.
//!
//! The roster is replaced wholesale on each poll; no per-record diffing or
//! history is retained.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoldierStatus {
    #[default]
    Ok,
    Warn,
    Critical,
    /// Any status string this build does not know. Never alerts.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Soldier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub heart_rate: u32,
    /// `[lat, lon]`
    pub gps: [f64; 2],
    pub status: SoldierStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub soldiers: Vec<Soldier>,
}

impl Roster {
    pub fn any_critical(&self) -> bool {
        self.soldiers
            .iter()
            .any(|soldier| soldier.status == SoldierStatus::Critical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roster() {
        let json = r#"{
            "soldiers": [
                {"id": "S1", "name": "Alpha", "heart_rate": 72, "gps": [28.6129, 77.2295], "status": "ok"},
                {"id": "S2", "heart_rate": 131, "gps": [28.6130, 77.2296], "status": "critical"},
                {"id": "S3", "heart_rate": 88, "gps": [28.6131, 77.2297], "status": "resting"}
            ]
        }"#;

        let roster: Roster = serde_json::from_str(json).unwrap();
        assert_eq!(roster.soldiers.len(), 3);
        assert_eq!(roster.soldiers[0].status, SoldierStatus::Ok);
        assert_eq!(roster.soldiers[0].name.as_deref(), Some("Alpha"));
        assert_eq!(roster.soldiers[1].status, SoldierStatus::Critical);
        assert_eq!(roster.soldiers[2].status, SoldierStatus::Unknown);
        assert!(roster.any_critical());
    }

    #[test]
    fn quiet_roster_is_not_critical() {
        let roster = Roster {
            soldiers: vec![Soldier {
                id: "S1".to_string(),
                name: None,
                heart_rate: 70,
                gps: [0.0, 0.0],
                status: SoldierStatus::Warn,
            }],
        };
        assert!(!roster.any_critical());
        assert!(!Roster::default().any_critical());
    }
}
