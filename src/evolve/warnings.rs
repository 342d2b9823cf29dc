use serde::Serialize;

use crate::repo::Repo;

/// Number of troubled changesets of each kind.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TroubleSummary {
    /// Unstable changesets.
    pub unstable: usize,
    /// Bumped changesets.
    pub bumped: usize,
    /// Divergent changesets.
    pub divergent: usize,
}

impl TroubleSummary {
    /// Counts the current troubles of `repo`.
    pub fn measure(repo: &Repo) -> Self {
        let troubles = repo.troubles();
        Self {
            unstable: troubles.unstable.len(),
            bumped: troubles.bumped.len(),
            divergent: troubles.divergent.len(),
        }
    }

    /// Whether nothing is troubled.
    pub fn is_clean(&self) -> bool {
        self.unstable == 0 && self.bumped == 0 && self.divergent == 0
    }

    /// One line per non-zero count, e.g. `unstable: 2 changesets`.
    pub fn lines(&self) -> Vec<String> {
        self.counts()
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .map(|(kind, count)| format!("{kind}: {count} changesets"))
            .collect()
    }

    fn counts(&self) -> [(&'static str, usize); 3] {
        [
            ("unstable", self.unstable),
            ("bumped", self.bumped),
            ("divergent", self.divergent),
        ]
    }
}

/// Troubles introduced by one command.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TroubleDelta {
    before: TroubleSummary,
    after: TroubleSummary,
}

impl TroubleDelta {
    /// Compares counts taken before and after a command.
    pub fn measure(before: TroubleSummary, after: TroubleSummary) -> Self {
        Self { before, after }
    }

    /// Warnings for every kind whose count grew, e.g. `1 new unstable changesets`.
    pub fn warnings(&self) -> Vec<String> {
        self.before
            .counts()
            .into_iter()
            .zip(self.after.counts())
            .filter(|((_, before), (_, after))| after > before)
            .map(|((kind, before), (_, after))| format!("{} new {kind} changesets", after - before))
            .collect()
    }
}
