use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::info;

use crate::repo::Repo;
use crate::types::{NodeId, Phase};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Expected situation worth knowing about (markers on unknown changesets).
    Info,
    /// Legal but suspicious state.
    Warning,
    /// Inconsistent marker data.
    Error,
}

/// Represents a single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Human-readable description of the issue.
    pub message: String,
}

/// Totals gathered while scanning the marker store.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Markers scanned.
    pub markers: u64,
    /// Markers whose precursor is not a local changeset.
    pub unknown_precursors: u64,
    /// Successor references to changesets that are not local.
    pub unknown_successors: u64,
    /// Legacy markers repaired while loading.
    pub repaired: u64,
    /// Public changesets that are precursors of a marker.
    pub obsolete_public: u64,
    /// Changesets taking part in a marker cycle.
    pub cycle_members: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether no warning or error was found.
    pub success: bool,
    /// Issues discovered, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Statistics about the markers examined.
    pub counts: VerifyCounts,
}

/// Checks the marker store against the changeset graph.
///
/// Markers mentioning changesets this repository never saw are normal
/// (markers travel further than changesets) and only reported as
/// information. Repaired legacy markers, public precursors and marker
/// cycles are warnings; a marker listing its own precursor as successor
/// is an error.
pub fn verify(repo: &Repo) -> VerifyReport {
    let graph = repo.graph();
    let store = repo.store();
    let mut findings = Vec::new();
    let mut counts = VerifyCounts {
        repaired: store.repaired() as u64,
        ..VerifyCounts::default()
    };
    if store.repaired() > 0 {
        push(
            &mut findings,
            VerifySeverity::Warning,
            format!("{} legacy markers carried a null successor", store.repaired()),
        );
    }

    let mut edges: FxHashMap<NodeId, Vec<NodeId>> = FxHashMap::default();
    let mut public_precursors: FxHashSet<NodeId> = FxHashSet::default();
    for marker in store.iter() {
        counts.markers += 1;
        if !graph.contains(marker.precursor) {
            counts.unknown_precursors += 1;
            push(
                &mut findings,
                VerifySeverity::Info,
                format!("marker precursor {} is not a local changeset", marker.precursor),
            );
        } else if graph.phase(marker.precursor).ok() == Some(Phase::Public)
            && public_precursors.insert(marker.precursor)
        {
            counts.obsolete_public += 1;
            push(
                &mut findings,
                VerifySeverity::Warning,
                format!("public changeset {} is the precursor of a marker", marker.precursor),
            );
        }
        for succ in &marker.successors {
            if *succ == marker.precursor {
                push(
                    &mut findings,
                    VerifySeverity::Error,
                    format!("marker on {} lists itself as successor", marker.precursor),
                );
                continue;
            }
            if !graph.contains(*succ) {
                counts.unknown_successors += 1;
                push(
                    &mut findings,
                    VerifySeverity::Info,
                    format!("marker successor {succ} is not a local changeset"),
                );
            }
            edges.entry(marker.precursor).or_default().push(*succ);
        }
    }

    let cyclic = cycle_members(&edges);
    counts.cycle_members = cyclic.len() as u64;
    if !cyclic.is_empty() {
        let mut sample: Vec<NodeId> = cyclic.into_iter().collect();
        sample.sort();
        push(
            &mut findings,
            VerifySeverity::Warning,
            format!(
                "marker cycle through {} changesets (first {})",
                sample.len(),
                sample[0]
            ),
        );
    }

    let success = findings
        .iter()
        .all(|f| f.severity == VerifySeverity::Info);
    info!(
        markers = counts.markers,
        findings = findings.len(),
        success,
        "admin.verify.completed"
    );
    VerifyReport {
        success,
        findings,
        counts,
    }
}

/// Nodes that can reach themselves through precursor → successor edges.
fn cycle_members(edges: &FxHashMap<NodeId, Vec<NodeId>>) -> FxHashSet<NodeId> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Active,
        Done,
    }
    let mut marks: FxHashMap<NodeId, Mark> = FxHashMap::default();
    let mut cyclic = FxHashSet::default();
    let mut starts: Vec<NodeId> = edges.keys().copied().collect();
    starts.sort();
    for start in starts {
        if marks.contains_key(&start) {
            continue;
        }
        let mut path: Vec<NodeId> = vec![start];
        let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Active);
        while let Some((node, idx)) = stack.last_mut() {
            let next = edges.get(&*node).and_then(|succs| succs.get(*idx)).copied();
            *idx += 1;
            match next {
                Some(succ) => match marks.get(&succ) {
                    Some(Mark::Active) => {
                        if let Some(pos) = path.iter().position(|n| *n == succ) {
                            cyclic.extend(path[pos..].iter().copied());
                        }
                    }
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(succ, Mark::Active);
                        path.push(succ);
                        stack.push((succ, 0));
                    }
                },
                None => {
                    let node = *node;
                    marks.insert(node, Mark::Done);
                    path.pop();
                    stack.pop();
                }
            }
        }
    }
    cyclic
}

fn push(findings: &mut Vec<VerifyFinding>, severity: VerifySeverity, message: impl Into<String>) {
    if findings.len() < MAX_FINDINGS {
        findings.push(VerifyFinding {
            severity,
            message: message.into(),
        });
    }
}
