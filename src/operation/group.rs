//! Group scoping for selective execution.

use std::collections::BTreeSet;

/// Selects which assemble operations run in a call, by their groups.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GroupFilter {
    /// Unscoped: every operation runs.
    #[default]
    All,
    /// Operations belonging to at least one of the groups run.
    /// An empty set matches nothing.
    AnyOf(BTreeSet<String>),
    /// Operations belonging to every one of the groups run.
    AllOf(BTreeSet<String>),
    /// Operations belonging to none of the groups run.
    NoneOf(BTreeSet<String>),
}

impl GroupFilter {
    pub fn any_of<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(groups.into_iter().map(Into::into).collect())
    }

    pub fn all_of<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllOf(groups.into_iter().map(Into::into).collect())
    }

    pub fn none_of<I, S>(groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::NoneOf(groups.into_iter().map(Into::into).collect())
    }

    /// Returns true if an operation tagged with `groups` should run.
    #[must_use]
    pub fn matches(&self, groups: &BTreeSet<String>) -> bool {
        match self {
            Self::All => true,
            Self::AnyOf(wanted) => wanted.iter().any(|g| groups.contains(g)),
            Self::AllOf(wanted) => wanted.iter().all(|g| groups.contains(g)),
            Self::NoneOf(excluded) => excluded.iter().all(|g| !groups.contains(g)),
        }
    }
}
