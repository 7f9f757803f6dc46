//! File-backed membership source.
//!
//! ```toml
//! [[participants]]
//! id = 0
//! identity = "5F3sa2TJ..."
//! endpoint = "http://10.0.0.4:8091/forecast"
//! eligible = true   # optional
//! ```

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use common::{Error, Participant, ParticipantId, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::traits::MembershipSource;

#[derive(Debug, Deserialize)]
struct RosterDoc {
    #[serde(default)]
    participants: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
struct RosterEntry {
    id: ParticipantId,
    identity: String,
    #[serde(default)]
    endpoint: String,
    #[serde(default = "default_eligible")]
    eligible: bool,
}

fn default_eligible() -> bool {
    true
}

/// Parse roster TOML into eligible participants, in file order. A repeated
/// id keeps its first entry.
pub fn parse_roster(raw: &str) -> Result<Vec<Participant>> {
    let doc: RosterDoc =
        toml::from_str(raw).map_err(|e| Error::Membership(format!("invalid roster: {}", e)))?;

    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(doc.participants.len());
    for entry in doc.participants {
        if !seen.insert(entry.id) {
            warn!("Roster lists participant {} more than once; keeping the first", entry.id);
            continue;
        }
        if !entry.eligible {
            debug!("Participant {} marked ineligible", entry.id);
            continue;
        }
        out.push(Participant {
            id: entry.id,
            identity: entry.identity,
            endpoint: entry.endpoint,
        });
    }
    Ok(out)
}

/// Roster re-read from disk on every call.
#[derive(Debug, Clone)]
pub struct RosterFile {
    path: PathBuf,
}

impl RosterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MembershipSource for RosterFile {
    async fn eligible(&self) -> Result<Vec<Participant>> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::Membership(format!("cannot read roster {}: {}", self.path.display(), e))
        })?;
        parse_roster(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROSTER: &str = r#"
        [[participants]]
        id = 3
        identity = "hk-3"
        endpoint = "http://127.0.0.1:8091/forecast"

        [[participants]]
        id = 1
        identity = "hk-1"
        eligible = false

        [[participants]]
        id = 0
        identity = "hk-0"

        [[participants]]
        id = 3
        identity = "dup"
    "#;

    #[test]
    fn keeps_file_order_and_filters() {
        let ps = parse_roster(ROSTER).unwrap();
        let ids: Vec<_> = ps.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 0]);
        assert_eq!(ps[0].identity, "hk-3");
        assert_eq!(ps[1].endpoint, "");
    }

    #[test]
    fn garbage_is_a_membership_error() {
        assert!(matches!(parse_roster("participants = 4"), Err(Error::Membership(_))));
        assert!(parse_roster("").unwrap().is_empty());
    }

    #[tokio::test]
    async fn reads_from_disk_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.toml");
        std::fs::write(&path, ROSTER).unwrap();

        let roster = RosterFile::new(&path);
        assert_eq!(roster.eligible().await.unwrap().len(), 2);

        std::fs::write(&path, "[[participants]]\nid = 9\nidentity = \"x\"\n").unwrap();
        let ps = roster.eligible().await.unwrap();
        assert_eq!(ps.len(), 1);
        assert_eq!(ps[0].id, 9);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let roster = RosterFile::new(dir.path().join("nope.toml"));
        assert!(roster.eligible().await.is_err());
    }
}
