use std::fs;

use serde::Serialize;

use crate::evolve::TroubleSummary;
use crate::obsolete::MarkerFlags;
use crate::repo::Repo;
use crate::types::Phase;

#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub changesets: ChangesetStatsSection,
    pub markers: MarkerStatsSection,
    pub troubles: TroubleStatsSection,
    pub filesystem: Option<FilesystemStats>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangesetStatsSection {
    pub total: usize,
    pub public: usize,
    pub draft: usize,
    pub secret: usize,
    pub heads: usize,
    pub bookmarks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarkerStatsSection {
    pub enabled: bool,
    pub total: usize,
    pub prunes: usize,
    pub splits: usize,
    pub bumped_fixes: usize,
    pub repaired: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TroubleStatsSection {
    pub obsolete: usize,
    pub suspended: usize,
    pub extinct: usize,
    pub unstable: usize,
    pub bumped: usize,
    pub divergent: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesystemStats {
    pub repo_path: String,
    pub obsstore_size_bytes: u64,
    pub changesets_size_bytes: u64,
}

pub fn stats(repo: &Repo) -> StatsReport {
    let graph = repo.graph();
    let mut phases = [0usize; 3];
    for cs in graph.iter() {
        let slot = match graph.phase(cs.id) {
            Ok(Phase::Public) => 0,
            Ok(Phase::Draft) => 1,
            _ => 2,
        };
        phases[slot] += 1;
    }
    let changesets = ChangesetStatsSection {
        total: graph.len(),
        public: phases[0],
        draft: phases[1],
        secret: phases[2],
        heads: graph.heads().len(),
        bookmarks: repo.bookmarks().len(),
    };

    let store = repo.store();
    let markers = MarkerStatsSection {
        enabled: store.is_enabled(),
        total: store.len(),
        prunes: store.iter().filter(|m| m.is_prune()).count(),
        splits: store.iter().filter(|m| m.successors.len() > 1).count(),
        bumped_fixes: store
            .iter()
            .filter(|m| m.flags.intersects(MarkerFlags::BUMPED_FIX))
            .count(),
        repaired: store.repaired(),
    };

    let sets = repo.troubles();
    let summary = TroubleSummary::measure(repo);
    let troubles = TroubleStatsSection {
        obsolete: sets.obsolete.len(),
        suspended: sets.suspended.len(),
        extinct: sets.extinct.len(),
        unstable: summary.unstable,
        bumped: summary.bumped,
        divergent: summary.divergent,
    };

    let filesystem = repo.dir().map(|dir| {
        let size = |name: &str| fs::metadata(dir.join(name)).map(|m| m.len()).unwrap_or(0);
        FilesystemStats {
            repo_path: dir.display().to_string(),
            obsstore_size_bytes: size("obsstore"),
            changesets_size_bytes: size("changesets.json"),
        }
    });

    StatsReport {
        changesets,
        markers,
        troubles,
        filesystem,
    }
}
