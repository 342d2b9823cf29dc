use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::evolve::plan::{EvolveReporter, FixPlan, FixRecord};
use crate::evolve::{bumped, divergent, unstable};
use crate::obsolete::TroubleKind;
use crate::repo::Repo;
use crate::rewrite::{conclude_relocation, Relocation};
use crate::storage::EvolveKind;
use crate::types::{EvolveError, NodeId, Result};

/// Which troubled changesets `evolve` may pick.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolveMode {
    /// One fix, only for changesets near the working position.
    #[default]
    Nearest,
    /// One fix, anywhere in the repository.
    Any,
    /// Fix everything, one changeset after another.
    All,
}

/// Knobs of one `evolve` run.
#[derive(Clone, Debug, Default)]
pub struct EvolveOptions {
    /// Selection mode.
    pub mode: EvolveMode,
    /// Describe the next fix without writing anything.
    pub dry_run: bool,
    /// Finish an interrupted relocation.
    pub continue_: bool,
}

/// Process-level outcome of `evolve`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Something was fixed, planned or updated.
    Ok = 0,
    /// Nothing is troubled.
    NothingToDo = 1,
    /// Troubles exist but the user has to choose what to do.
    NeedsUserChoice = 2,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// What an `evolve` run did.
#[derive(Clone, Debug, Serialize)]
pub struct EvolveReport {
    /// Exit status.
    pub status: ExitStatus,
    /// Fixes selected (only populated by dry runs).
    pub plans: Vec<FixPlan>,
    /// Fixes completed, in order.
    pub fixes: Vec<FixRecord>,
    /// Where the working copy moved when nothing needed fixing.
    pub updated_to: Option<NodeId>,
    /// Explanation when nothing was done.
    pub message: Option<String>,
    /// Changesets the user has to choose between.
    pub candidates: Vec<NodeId>,
}

impl EvolveReport {
    fn new(status: ExitStatus) -> Self {
        Self {
            status,
            plans: Vec::new(),
            fixes: Vec::new(),
            updated_to: None,
            message: None,
            candidates: Vec::new(),
        }
    }

    fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Stabilizes troubled changesets.
///
/// Picks the next troubled changeset (see [`pick_next`]), plans its fix and
/// applies it. In [`EvolveMode::All`] this repeats until nothing is left;
/// the first failing fix aborts the run with its error. When nothing can
/// be picked and the working parent is obsolete, the working copy moves to
/// its single successor.
pub fn evolve(
    repo: &mut Repo,
    opts: &EvolveOptions,
    reporter: &mut dyn EvolveReporter,
) -> Result<EvolveReport> {
    if opts.continue_ {
        if opts.mode != EvolveMode::Nearest {
            return Err(EvolveError::InvalidArgument(
                "cannot combine --continue with --any or --all".into(),
            ));
        }
        return continue_evolve(repo, reporter);
    }
    if let Some(state) = repo.evolve_state() {
        return Err(EvolveError::InvalidArgument(format!(
            "an evolution of {} is interrupted; run 'evolve evolve --continue'",
            state.source
        )));
    }

    let any = opts.mode != EvolveMode::Nearest;
    let Some(mut node) = pick_next(repo, any) else {
        return idle(repo, opts.dry_run);
    };

    let mut report = EvolveReport::new(ExitStatus::Ok);
    let mut attempted: FxHashSet<NodeId> = FxHashSet::default();
    loop {
        if !attempted.insert(node) {
            return Err(EvolveError::InvalidArgument(format!(
                "evolve made no progress on {node}"
            )));
        }
        let plan = plan_fix(repo, node)?;
        debug!(plan = %plan, "evolve.pick.selected");
        reporter.planned(&plan);
        if opts.dry_run {
            report.plans.push(plan);
            return Ok(report);
        }
        let record = apply(repo, &plan)?;
        reporter.fixed(&record);
        report.fixes.push(record);
        reporter.progress(report.fixes.len(), repo.troubled().len());
        if opts.mode != EvolveMode::All {
            break;
        }
        match pick_next(repo, true) {
            Some(next) => node = next,
            None => break,
        }
    }
    info!(fixes = report.fixes.len(), "evolve.run.completed");
    Ok(report)
}

/// Chooses the next changeset to stabilize.
///
/// Preference order: an unstable changeset that can be stabilized near the
/// working position, then the working parent itself if divergent, then
/// (when `any` is set) the lowest-revision unstable, bumped and divergent
/// changeset, in that order.
pub fn pick_next(repo: &Repo, any: bool) -> Option<NodeId> {
    if let Some(wdp) = repo.working_parent() {
        if let Some(node) = stabilizable_unstable(repo, wdp) {
            return Some(node);
        }
        if repo.troubles().divergent.contains(&wdp) {
            return Some(wdp);
        }
    }
    if !any {
        return None;
    }
    [repo.unstable(), repo.bumped(), repo.divergent()]
        .into_iter()
        .find_map(|nodes| nodes.first().copied())
}

/// An unstable child of `start`, of one of its descendants, or of one of
/// their precursors.
///
/// Only children of obsolete changesets qualify: an unstable changeset
/// under a living parent has to wait for that parent to be stabilized.
/// Candidates are visited in revision order so ties resolve to the oldest
/// changeset.
fn stabilizable_unstable(repo: &Repo, start: NodeId) -> Option<NodeId> {
    let troubles = repo.troubles();
    let graph = repo.graph();
    let mut order = vec![start];
    order.extend(repo.all_precursors(&[start]));
    let descendants = graph.descendants([start]);
    for node in graph.sort_by_rev(descendants) {
        if node == start {
            continue;
        }
        order.push(node);
        order.extend(repo.all_precursors(&[node]));
    }

    order
        .into_iter()
        .filter(|ctx| troubles.obsolete.contains(ctx))
        .filter_map(|ctx| graph.children(ctx).ok())
        .flat_map(|children| graph.sort_by_rev(children))
        .find(|child| troubles.unstable.contains(child))
}

/// Plans the fix for one troubled changeset.
pub fn plan_fix(repo: &Repo, node: NodeId) -> Result<FixPlan> {
    let kinds = repo.classify(node);
    if kinds.contains(&TroubleKind::Unstable) {
        unstable::plan(repo, node)
    } else if kinds.contains(&TroubleKind::Bumped) {
        bumped::plan(repo, node)
    } else if kinds.contains(&TroubleKind::Divergent) {
        divergent::plan(repo, node)
    } else {
        Err(EvolveError::InvalidArgument(format!("{node} is not troubled")))
    }
}

/// Applies a previously computed plan.
pub fn apply(repo: &mut Repo, plan: &FixPlan) -> Result<FixRecord> {
    match *plan {
        FixPlan::Relocate { node, onto } => unstable::solve(repo, node, onto),
        FixPlan::Recreate {
            node,
            precursor,
            rebase_first,
        } => bumped::solve(repo, node, precursor, rebase_first),
        FixPlan::Merge { node, other, base } => divergent::solve(repo, node, other, base),
    }
}

fn idle(repo: &mut Repo, dry_run: bool) -> Result<EvolveReport> {
    if let Some(wdp) = repo.working_parent().filter(|wdp| repo.is_obsolete(*wdp)) {
        let successors = repo
            .graph()
            .sort_by_rev(repo.successor_sets(wdp).into_iter().flatten());
        return match successors.as_slice() {
            [] => Ok(EvolveReport::new(ExitStatus::NeedsUserChoice)
                .with_message("parent is obsolete without successors; likely killed")),
            [target] => {
                let target = *target;
                if !dry_run {
                    repo.transaction("evolve-update", |repo| repo.set_working_parents(&[target]))?;
                    info!(from = %wdp, to = %target, "evolve.update.successor");
                }
                let mut report = EvolveReport::new(ExitStatus::Ok);
                report.updated_to = Some(target);
                Ok(report)
            }
            _ => {
                let mut report = EvolveReport::new(ExitStatus::NeedsUserChoice)
                    .with_message("parent is obsolete with multiple successors");
                report.candidates = successors;
                Ok(report)
            }
        };
    }
    let troubled = repo.troubled().len();
    if troubled > 0 {
        Ok(EvolveReport::new(ExitStatus::NeedsUserChoice).with_message(format!(
            "nothing to evolve here ({troubled} troubled changesets, do you want --any ?)"
        )))
    } else {
        Ok(EvolveReport::new(ExitStatus::NothingToDo).with_message("no troubled changesets"))
    }
}

fn continue_evolve(repo: &mut Repo, reporter: &mut dyn EvolveReporter) -> Result<EvolveReport> {
    let state = repo
        .evolve_state()
        .cloned()
        .ok_or(EvolveError::NoEvolveInProgress)?;
    if !state.is_resolved() {
        return Err(EvolveError::MergeConflict {
            node: state.source,
            paths: state.unresolved.keys().cloned().collect(),
            resumable: true,
        });
    }
    let outcome = repo.transaction("evolve-continue", |repo| {
        let outcome = conclude_relocation(repo, state.source, state.destination, &state.merged)?;
        repo.set_evolve_state(None);
        Ok(outcome)
    })?;
    let record = FixRecord {
        kind: match state.kind {
            EvolveKind::Unstable => TroubleKind::Unstable,
            EvolveKind::Bumped => TroubleKind::Bumped,
        },
        node: state.source,
        result: match outcome {
            Relocation::Moved(new) => Some(new),
            _ => None,
        },
    };
    info!(node = %state.source, result = ?record.result, "evolve.continue.completed");
    reporter.fixed(&record);
    let mut report = EvolveReport::new(ExitStatus::Ok);
    report.fixes.push(record);
    Ok(report)
}
