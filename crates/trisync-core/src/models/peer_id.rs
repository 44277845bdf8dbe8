//! Peer identity

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// One of the three databases participating in synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerId {
    /// The MySQL peer
    #[serde(rename = "MYSQL")]
    Mysql,
    /// The Postgres peer
    #[serde(rename = "POSTGRES")]
    Postgres,
    /// The SQL Server peer
    #[serde(rename = "SQLSERVER")]
    SqlServer,
}

impl PeerId {
    /// All peers, in the engine's fixed iteration order
    pub const ALL: [Self; 3] = [Self::Mysql, Self::Postgres, Self::SqlServer];

    /// Peers whose change logs are consumed, in pass order
    pub const SOURCES: [Self; 2] = [Self::Mysql, Self::Postgres];

    /// Wire code stored in change-log and conflict rows
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mysql => "MYSQL",
            Self::Postgres => "POSTGRES",
            Self::SqlServer => "SQLSERVER",
        }
    }

    /// The two peers other than this one, in fixed order
    #[must_use]
    pub const fn others(self) -> [Self; 2] {
        match self {
            Self::Mysql => [Self::Postgres, Self::SqlServer],
            Self::Postgres => [Self::Mysql, Self::SqlServer],
            Self::SqlServer => [Self::Mysql, Self::Postgres],
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MYSQL" => Ok(Self::Mysql),
            "POSTGRES" => Ok(Self::Postgres),
            "SQLSERVER" => Ok(Self::SqlServer),
            _ => Err(Error::UnknownPeer(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_round_trip() {
        for peer in PeerId::ALL {
            let parsed: PeerId = peer.as_str().parse().unwrap();
            assert_eq!(peer, parsed);
        }
    }

    #[test]
    fn test_peer_id_parse_is_case_insensitive() {
        assert_eq!("mysql".parse::<PeerId>().unwrap(), PeerId::Mysql);
        assert_eq!(" Postgres ".parse::<PeerId>().unwrap(), PeerId::Postgres);
    }

    #[test]
    fn test_peer_id_parse_rejects_unknown() {
        assert!(matches!(
            "ORACLE".parse::<PeerId>(),
            Err(Error::UnknownPeer(_))
        ));
    }

    #[test]
    fn test_others_excludes_self() {
        for peer in PeerId::ALL {
            let others = peer.others();
            assert_eq!(others.len(), 2);
            assert!(!others.contains(&peer));
        }
    }

    #[test]
    fn test_serde_uses_wire_codes() {
        let json = serde_json::to_string(&PeerId::SqlServer).unwrap();
        assert_eq!(json, "\"SQLSERVER\"");
    }
}
