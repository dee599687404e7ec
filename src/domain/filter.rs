use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

/// Which remote collection a query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    All,
    Completed,
}

impl QueryKind {
    pub const ALL: [QueryKind; 2] = [QueryKind::All, QueryKind::Completed];

    /// Default message used when this collection fails to load.
    pub fn load_failure_message(self) -> &'static str {
        match self {
            QueryKind::All => "Failed to load tasks",
            QueryKind::Completed => "Failed to load completed tasks",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryKind::All => write!(f, "all"),
            QueryKind::Completed => write!(f, "completed"),
        }
    }
}

/// The task subset currently displayed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    #[default]
    All,
    Completed,
    Incomplete,
}

impl Filter {
    pub const CYCLE: [Filter; 3] = [Filter::All, Filter::Incomplete, Filter::Completed];

    /// `Incomplete` is derived client-side from the `all` collection.
    pub fn query_kind(self) -> QueryKind {
        match self {
            Filter::All | Filter::Incomplete => QueryKind::All,
            Filter::Completed => QueryKind::Completed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Filter::All => "All Tasks",
            Filter::Completed => "Completed Only",
            Filter::Incomplete => "Incomplete Only",
        }
    }

    pub fn next(self) -> Filter {
        let index = Self::CYCLE.iter().position(|f| *f == self).unwrap_or(0);
        Self::CYCLE[(index + 1) % Self::CYCLE.len()]
    }

    pub fn previous(self) -> Filter {
        let index = Self::CYCLE.iter().position(|f| *f == self).unwrap_or(0);
        Self::CYCLE[(index + Self::CYCLE.len() - 1) % Self::CYCLE.len()]
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "all"),
            Filter::Completed => write!(f, "completed"),
            Filter::Incomplete => write!(f, "incomplete"),
        }
    }
}

impl FromStr for Filter {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Filter::All),
            "completed" | "done" => Ok(Filter::Completed),
            "incomplete" | "active" | "open" => Ok(Filter::Incomplete),
            other => Err(DomainError::UnknownFilter(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_reads_all_collection() {
        assert_eq!(Filter::All.query_kind(), QueryKind::All);
        assert_eq!(Filter::Incomplete.query_kind(), QueryKind::All);
        assert_eq!(Filter::Completed.query_kind(), QueryKind::Completed);
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!("all".parse::<Filter>().unwrap(), Filter::All);
        assert_eq!(" Completed ".parse::<Filter>().unwrap(), Filter::Completed);
        assert_eq!("active".parse::<Filter>().unwrap(), Filter::Incomplete);
        assert!("someday".parse::<Filter>().is_err());
    }

    #[test]
    fn test_filter_cycle_visits_every_filter() {
        let mut filter = Filter::default();
        let mut seen = vec![filter];
        for _ in 0..2 {
            filter = filter.next();
            seen.push(filter);
        }
        assert_eq!(filter.next(), Filter::All);
        assert_eq!(Filter::All.previous(), filter);
        assert!(seen.contains(&Filter::Completed));
        assert!(seen.contains(&Filter::Incomplete));
    }
}
