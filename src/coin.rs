//! Typed token entity and its lifecycle (spec.md §3, §4.2).

use serde::{Deserialize, Serialize};

/// Coin lifecycle state. Trajectory is monotone along `Run < Blocked < {Expired, Paid}`;
/// un-binding returns `Blocked -> Run` only when the parent cooperation ring is dissolved
/// before its fractal ring is accepted (`InformFractalRing`'s unwind path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Status {
    Run,
    Blocked,
    Expired,
    Paid,
}

impl From<Status> for u8 {
    fn from(value: Status) -> Self {
        match value {
            Status::Run => 0,
            Status::Blocked => 1,
            Status::Expired => 2,
            Status::Paid => 3,
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Status::Run),
            1 => Ok(Status::Blocked),
            2 => Ok(Status::Expired),
            3 => Ok(Status::Paid),
            other => Err(format!("invalid coin status {other}")),
        }
    }
}

/// A typed token owned by a trader. Identity is the signature of `"<owner>-<type>"`
/// under the owner's private key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: String,
    pub amount: f64,
    pub status: Status,
    #[serde(rename = "type")]
    pub coin_type: u32,
    pub next: String,
    pub prev: String,
    pub owner: String,
    #[serde(skip)]
    pub cooperation_id: String,
}

impl Coin {
    /// A coin not yet bound into any cooperation ring.
    pub fn is_unused(&self) -> bool {
        self.next.is_empty() && self.prev.is_empty()
    }
}
