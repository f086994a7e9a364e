use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// one badge read, as framed by the reader firmware
///
/// example line:
/// {"cyberdeck_game_name":"Splash","cyberdeck_game_score":"11","cyberdeck_game_crc":"12345678","cyberdeck_device_id":"4A02C58C","rename_player":false}
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    #[serde(rename = "cyberdeck_device_id")]
    pub device_id: String,
    #[serde(rename = "cyberdeck_game_name")]
    pub game_name: String,
    #[serde(rename = "cyberdeck_game_score")]
    pub score: String,
    #[serde(rename = "cyberdeck_game_crc")]
    pub crc: String,
    /// badge asked to drop its registered nickname before the lookup
    #[serde(rename = "rename_player", alias = "rename_user", default)]
    pub rename_requested: bool,
}

/// nickname relayed back by the display after the user typed it
///
/// the display reuses the scan field names; the nickname travels in
/// `cyberdeck_game_name`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct NameSubmission {
    #[serde(rename = "cyberdeck_device_id", default)]
    pub device_id: Option<String>,
    #[serde(rename = "cyberdeck_game_name", default)]
    pub nickname: String,
    #[serde(rename = "cyberdeck_game_score", default)]
    pub score: Option<String>,
    #[serde(rename = "cyberdeck_game_crc", default)]
    pub crc: Option<String>,
}

/// the single live badge flow
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub device_id: String,
    pub game_name: String,
    pub candidate_name: Option<String>,
    pub score: String,
    pub crc: String,
    /// true while a nickname submission would be accepted
    pub awaiting_name: bool,
}

impl From<&ScanRecord> for Session {
    fn from(scan: &ScanRecord) -> Self {
        Self {
            device_id: scan.device_id.clone(),
            game_name: scan.game_name.clone(),
            candidate_name: None,
            score: scan.score.clone(),
            crc: scan.crc.clone(),
            awaiting_name: false,
        }
    }
}

/// where the controller is in a badge flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Lookup,
    NeedsName,
    WelcomeBack,
}

/// decode a JSON value that may carry its payload as an embedded JSON string
///
/// `"{\"res\":200}"` and `{"res":200}` both decode to the same `T`.
pub fn decode_embedded<T: DeserializeOwned>(value: serde_json::Value) -> serde_json::Result<T> {
    match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner),
        other => serde_json::from_value(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, Debug, PartialEq)]
    struct Res {
        res: u16,
    }

    #[test]
    fn embedded_string_and_plain_object_decode_alike() {
        let doubled = serde_json::json!("{\"res\":404}");
        let plain = serde_json::json!({"res": 404});
        assert_eq!(decode_embedded::<Res>(doubled).unwrap(), Res { res: 404 });
        assert_eq!(decode_embedded::<Res>(plain).unwrap(), Res { res: 404 });
    }

    #[test]
    fn embedded_garbage_is_an_error() {
        assert!(decode_embedded::<Res>(serde_json::json!("not json")).is_err());
        assert!(decode_embedded::<Res>(serde_json::json!(42)).is_err());
    }

    #[test]
    fn name_submission_tolerates_missing_fields() {
        let sub: NameSubmission =
            serde_json::from_str(r#"{"cyberdeck_game_name":"X"}"#).unwrap();
        assert_eq!(sub.nickname, "X");
        assert_eq!(sub.device_id, None);
    }

    #[test]
    fn session_starts_without_a_name() {
        let scan = ScanRecord {
            device_id: "AA".into(),
            game_name: "Splash".into(),
            score: "11".into(),
            crc: "1234".into(),
            rename_requested: true,
        };
        let session = Session::from(&scan);
        assert_eq!(session.device_id, "AA");
        assert_eq!(session.candidate_name, None);
        assert!(!session.awaiting_name);
    }
}
