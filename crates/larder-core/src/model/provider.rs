//! Upstream data providers and their physical hot-store tables.
//!
//! Each provider writes its raw records into its own table and has its own
//! pre-computed aggregate table. The mapping is a constant table indexed by
//! [`Provider`]; nothing dispatches on table names at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A source of raw operational records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Point-of-sale sales data.
    Bork,
    /// Labor and scheduling data, split into API endpoints.
    Eitje,
}

/// Physical table names backing one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderTables {
    /// Raw records eligible for archival.
    pub raw: &'static str,
    /// Derived aggregates; read-only for the archiver.
    pub aggregated: &'static str,
    /// Whether the endpoint is part of the partition key.
    pub partition_by_endpoint: bool,
}

const BORK_TABLES: ProviderTables = ProviderTables {
    raw: "bork_raw_data",
    aggregated: "bork_sales_aggregated",
    partition_by_endpoint: false,
};

const EITJE_TABLES: ProviderTables = ProviderTables {
    raw: "eitje_raw_data",
    aggregated: "eitje_labor_aggregated",
    partition_by_endpoint: true,
};

impl Provider {
    /// Every provider, in the order a full run visits them.
    pub const ALL: [Self; 2] = [Self::Bork, Self::Eitje];

    /// Stable lowercase name used in file names, JSON, and CLI flags.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bork => "bork",
            Self::Eitje => "eitje",
        }
    }

    /// Hot-store tables for this provider.
    #[must_use]
    pub const fn tables(self) -> &'static ProviderTables {
        match self {
            Self::Bork => &BORK_TABLES,
            Self::Eitje => &EITJE_TABLES,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bork" => Ok(Self::Bork),
            "eitje" => Ok(Self::Eitje),
            other => Err(format!("unknown provider '{other}' (expected bork or eitje)")),
        }
    }
}

/// Which providers a run should cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    Bork,
    Eitje,
    #[default]
    All,
}

impl ProviderSelection {
    /// Expand the selection into concrete providers.
    #[must_use]
    pub fn providers(self) -> &'static [Provider] {
        match self {
            Self::Bork => &Provider::ALL[..1],
            Self::Eitje => &Provider::ALL[1..],
            Self::All => &Provider::ALL,
        }
    }
}

impl FromStr for ProviderSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            other => match other.parse::<Provider>() {
                Ok(Provider::Bork) => Ok(Self::Bork),
                Ok(Provider::Eitje) => Ok(Self::Eitje),
                Err(_) => Err(format!(
                    "unknown provider '{other}' (expected bork, eitje, or all)"
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Provider, ProviderSelection};

    #[test]
    fn tables_are_distinct_per_provider() {
        let bork = Provider::Bork.tables();
        let eitje = Provider::Eitje.tables();
        assert_ne!(bork.raw, eitje.raw);
        assert_ne!(bork.aggregated, eitje.aggregated);
        assert!(!bork.partition_by_endpoint);
        assert!(eitje.partition_by_endpoint);
    }

    #[test]
    fn selection_expands_in_run_order() {
        assert_eq!(ProviderSelection::All.providers(), &[Provider::Bork, Provider::Eitje]);
        assert_eq!(ProviderSelection::Bork.providers(), &[Provider::Bork]);
        assert_eq!(ProviderSelection::Eitje.providers(), &[Provider::Eitje]);
    }

    #[test]
    fn parsing_is_case_insensitive() {
        assert_eq!("BORK".parse::<Provider>(), Ok(Provider::Bork));
        assert_eq!(" all ".parse::<ProviderSelection>(), Ok(ProviderSelection::All));
        assert_eq!("eitje".parse::<ProviderSelection>(), Ok(ProviderSelection::Eitje));
        assert!("toast".parse::<ProviderSelection>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Provider::Eitje).unwrap(), "\"eitje\"");
    }
}
