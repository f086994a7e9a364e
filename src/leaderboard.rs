//! ==============================================================================
//! leaderboard.rs - remote high score service client
//! ==============================================================================
//!
//! purpose:
//!     wraps the four calls the kiosk makes against the leaderboard service:
//!     uniqueness check, lookup, upsert and delete. each is one POST with a
//!     JSON body.
//!
//! wire contract:
//!     the service answers with a JSON *string* whose content is the JSON
//!     result object, e.g. the body `"{\"res\":404}"`. responses are decoded
//!     twice. a body that is already an object is accepted as well.
//!
//! relationships:
//!     - used by: controller.rs (through the `Leaderboard` trait)
//!     - configured by: config.rs (LeaderboardConfig)
//!
//! ==============================================================================

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::LeaderboardConfig;
use crate::domain::decode_embedded;

/// lookup sentinel for a device with no registered nickname
pub const UNREGISTERED_NICK: &str = "none";

#[derive(Debug, thiserror::Error)]
pub enum LeaderboardError {
    #[error("request to leaderboard failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("leaderboard returned HTTP {status} for {path}")]
    Status { path: &'static str, status: u16 },
    #[error("undecodable leaderboard response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("leaderboard {op} answered with unexpected code {code}")]
    UnexpectedCode { op: &'static str, code: u16 },
}

/// result of a nickname uniqueness check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameAvailability {
    Taken,
    Available,
}

/// full replacement record sent on upsert
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeaderboardRecord {
    pub id: String,
    pub nick: String,
    pub game: String,
    pub score: String,
    pub crc: String,
}

/// the remote operations the session controller depends on
pub trait Leaderboard: Send + Sync + 'static {
    fn check_unique(
        &self,
        id: &str,
        nick: &str,
    ) -> impl Future<Output = Result<NameAvailability, LeaderboardError>> + Send;

    /// registered nickname for a device, `None` when unregistered
    fn lookup(
        &self,
        id: &str,
        score: &str,
    ) -> impl Future<Output = Result<Option<String>, LeaderboardError>> + Send;

    fn upsert(
        &self,
        record: &LeaderboardRecord,
    ) -> impl Future<Output = Result<(), LeaderboardError>> + Send;

    /// `Ok(false)` when the service declined to delete
    fn remove(&self, id: &str) -> impl Future<Output = Result<bool, LeaderboardError>> + Send;
}

#[derive(Deserialize)]
struct CodeReply {
    res: u16,
}

#[derive(Deserialize)]
struct NickReply {
    nick: String,
}

#[derive(Serialize)]
struct UniqueRequest<'a> {
    id: &'a str,
    nick: &'a str,
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    id: &'a str,
    score: &'a str,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    id: &'a str,
}

/// reqwest-backed client for the leaderboard service
#[derive(Clone, Debug)]
pub struct HttpLeaderboard {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLeaderboard {
    pub fn new(config: &LeaderboardConfig) -> Result<Self, LeaderboardError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post<B, T>(&self, path: &'static str, body: &B) -> Result<T, LeaderboardError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(LeaderboardError::Status {
                path,
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        let envelope: serde_json::Value = serde_json::from_str(&text)?;
        let reply = decode_embedded(envelope)?;
        Ok(reply)
    }
}

impl Leaderboard for HttpLeaderboard {
    async fn check_unique(&self, id: &str, nick: &str) -> Result<NameAvailability, LeaderboardError> {
        let reply: CodeReply = self.post("/user/unique", &UniqueRequest { id, nick }).await?;
        match reply.res {
            200 => Ok(NameAvailability::Taken),
            404 => Ok(NameAvailability::Available),
            code => Err(LeaderboardError::UnexpectedCode { op: "unique", code }),
        }
    }

    async fn lookup(&self, id: &str, score: &str) -> Result<Option<String>, LeaderboardError> {
        let reply: NickReply = self.post("/user/get", &LookupRequest { id, score }).await?;
        if reply.nick == UNREGISTERED_NICK {
            Ok(None)
        } else {
            Ok(Some(reply.nick))
        }
    }

    async fn upsert(&self, record: &LeaderboardRecord) -> Result<(), LeaderboardError> {
        let reply: CodeReply = self.post("/user/put", record).await?;
        match reply.res {
            200 => Ok(()),
            code => Err(LeaderboardError::UnexpectedCode { op: "put", code }),
        }
    }

    async fn remove(&self, id: &str) -> Result<bool, LeaderboardError> {
        let reply: CodeReply = self.post("/user/delete", &DeleteRequest { id }).await?;
        match reply.res {
            200 => Ok(true),
            500 => Ok(false),
            code => Err(LeaderboardError::UnexpectedCode { op: "delete", code }),
        }
    }
}
