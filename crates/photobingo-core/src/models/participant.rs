use serde::{Deserialize, Serialize};

/// A named contributor. Identity is the exact, case-sensitive name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Participant {
    pub name: String,
}

impl Participant {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Build a roster from raw names, dropping blanks and duplicates while
    /// keeping first-seen order.
    pub fn roster<I, S>(names: I) -> Vec<Participant>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = std::collections::HashSet::new();
        names
            .into_iter()
            .map(Into::into)
            .filter(|name| !name.trim().is_empty())
            .filter(|name| seen.insert(name.clone()))
            .map(Participant::new)
            .collect()
    }
}

impl std::fmt::Display for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_drops_blanks_and_duplicates() {
        let roster = Participant::roster(["Ana", "", "Ben", "Ana", "  ", "ana"]);
        let names: Vec<_> = roster.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Ben", "ana"]);
    }
}
