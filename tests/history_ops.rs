#![allow(missing_docs)]
#![allow(clippy::uninlined_format_args)]

use std::collections::BTreeMap;

use evolve::admin::{stats, verify, VerifySeverity};
use evolve::evolve::{
    amend, fold, next, previous, touch, ExitStatus, PublishPush, Push, PushHint, TroubleDelta,
    TroubleSummary, PUSH_HINT,
};
use evolve::rewrite::CommitOptions;
use evolve::storage::FileEntry;
use evolve::{
    CommitRequest, EvolveError, NodeId, Phase, Relation, Repo, RepoOptions, Timestamp,
};

fn repo() -> Repo {
    Repo::in_memory(RepoOptions::default().username("tester"))
}

fn commit(repo: &mut Repo, message: &str, path: &str, data: &str) -> NodeId {
    repo.commit(
        CommitRequest::new(message)
            .write(path, data)
            .date(Timestamp::new(3_000, 0)),
    )
    .unwrap()
}

/// base -> c1 -> c2 -> c3, working copy on c3.
fn stack() -> (Repo, [NodeId; 4]) {
    let mut repo = repo();
    let base = commit(&mut repo, "base", "a", "0");
    let c1 = commit(&mut repo, "c1", "a", "1");
    let c2 = commit(&mut repo, "c2", "b", "1");
    let c3 = commit(&mut repo, "c3", "c", "1");
    (repo, [base, c1, c2, c3])
}

// ---- amend -----------------------------------------------------------------

#[test]
fn amend_leaves_descendants_unstable() {
    let (mut repo, [_, c1, c2, _]) = stack();
    repo.update(c1, None).unwrap();
    let before = TroubleSummary::measure(&repo);
    let files = BTreeMap::from([("a".to_string(), Some(FileEntry::new("2")))]);
    let new = amend(&mut repo, files, &CommitOptions::message("c1 v2")).unwrap();
    let after = TroubleSummary::measure(&repo);

    assert_eq!(repo.changeset(new).unwrap().message, "c1 v2");
    assert!(repo.is_obsolete(c1));
    assert_eq!(repo.unstable().first(), Some(&c2));
    assert_eq!(
        TroubleDelta::measure(before, after).warnings(),
        vec!["2 new unstable changesets".to_string()]
    );
    assert_eq!(after.lines(), vec!["unstable: 2 changesets".to_string()]);
}

#[test]
fn amend_without_changes_is_a_no_op() {
    let (mut repo, [.., c3]) = stack();
    let node = amend(&mut repo, BTreeMap::new(), &CommitOptions::default()).unwrap();
    assert_eq!(node, c3);
    assert!(repo.store().is_empty());
}

#[test]
fn amend_removes_files_and_refuses_public_parents() {
    let (mut repo, [base, .., c3]) = stack();
    let files = BTreeMap::from([("c".to_string(), None)]);
    let new = amend(&mut repo, files, &CommitOptions::default()).unwrap();
    assert!(!repo.changeset(new).unwrap().manifest.contains("c"));
    assert_eq!(repo.successors(&[c3]), vec![new]);

    repo.update(base, None).unwrap();
    repo.advance_boundary(Phase::Public, &[base]);
    let files = BTreeMap::from([("a".to_string(), Some(FileEntry::new("x")))]);
    assert!(matches!(
        amend(&mut repo, files, &CommitOptions::default()),
        Err(EvolveError::ImmutableChangeset {
            action: "amend",
            ..
        })
    ));

    let mut empty = Repo::in_memory(RepoOptions::default());
    assert!(matches!(
        amend(&mut empty, BTreeMap::new(), &CommitOptions::default()),
        Err(EvolveError::InvalidArgument(_))
    ));
}

// ---- fold ------------------------------------------------------------------

#[test]
fn fold_squashes_a_linear_range() {
    let (mut repo, [base, c1, c2, c3]) = stack();
    repo.set_bookmark("topic", c3).unwrap();
    let new = fold(&mut repo, &[c3, c1, c2]).unwrap();

    let cs = repo.changeset(new).unwrap();
    assert_eq!(cs.parents, vec![base]);
    assert_eq!(cs.message, "c1\n\n***\n\nc2\n\n***\n\nc3");
    assert_eq!(cs.files, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    for old in [c1, c2, c3] {
        assert!(repo.is_obsolete(old));
        assert_eq!(repo.successor_sets(old), vec![vec![new]]);
    }
    assert_eq!(repo.working_parent(), Some(new));
    assert_eq!(repo.bookmarks().get("topic"), Some(new));
    assert!(repo.troubled().is_empty());
}

#[test]
fn fold_takes_the_least_public_phase() {
    let (mut repo, [_, c1, c2, _]) = stack();
    repo.retract_boundary(Phase::Secret, &[c2]);
    let new = fold(&mut repo, &[c1, c2]).unwrap();
    assert_eq!(repo.phase(new).unwrap(), Phase::Secret);
}

#[test]
fn fold_rejects_bad_ranges() {
    let (mut repo, [base, c1, _, c3]) = stack();
    assert!(matches!(
        fold(&mut repo, &[c1]),
        Err(EvolveError::InvalidArgument(_))
    ));
    repo.update(base, None).unwrap();
    let side = commit(&mut repo, "side", "s", "1");
    let err = fold(&mut repo, &[c1, side]).unwrap_err();
    assert!(err.to_string().contains("multiple roots"));
    assert!(matches!(
        fold(&mut repo, &[c1, c3]),
        Err(EvolveError::InvalidArgument(_))
    ));

    repo.advance_boundary(Phase::Public, &[c1]);
    assert!(matches!(
        fold(&mut repo, &[base, c1]),
        Err(EvolveError::ImmutableChangeset { action: "fold", .. })
    ));
    assert!(repo.store().is_empty());
}

// ---- touch -----------------------------------------------------------------

#[test]
fn touch_gives_a_new_identity() {
    let (mut repo, [_, c1, c2, c3]) = stack();
    let touched = touch(&mut repo, &[c1], false).unwrap();
    assert_eq!(touched.len(), 1);
    let new = touched[0];
    assert_ne!(new, c1);
    let cs = repo.changeset(new).unwrap();
    assert_eq!(cs.manifest, repo.changeset(c1).unwrap().manifest);
    assert!(cs.extra.contains_key("__touch-noise__"));
    assert_eq!(repo.successor_sets(c1), vec![vec![new]]);
    assert_eq!(repo.unstable(), vec![c2, c3]);
}

#[test]
fn touching_a_stack_keeps_it_connected() {
    let (mut repo, [_, c1, c2, c3]) = stack();
    let touched = touch(&mut repo, &[c3, c2, c1], false).unwrap();
    assert_eq!(touched.len(), 3);
    assert_eq!(repo.changeset(touched[1]).unwrap().parents, vec![touched[0]]);
    assert_eq!(repo.changeset(touched[2]).unwrap().parents, vec![touched[1]]);
    assert_eq!(repo.working_parent(), Some(touched[2]));
    assert!(repo.troubled().is_empty());
}

#[test]
fn duplicate_touch_records_no_marker() {
    let (mut repo, [base, ..]) = stack();
    repo.advance_boundary(Phase::Public, &[base]);
    assert!(matches!(
        touch(&mut repo, &[base], false),
        Err(EvolveError::ImmutableChangeset { action: "touch", .. })
    ));
    let copies = touch(&mut repo, &[base], true).unwrap();
    assert!(repo.store().is_empty());
    assert_eq!(repo.phase(copies[0]).unwrap(), Phase::Draft);
    assert!(matches!(
        touch(&mut repo, &[], false),
        Err(EvolveError::InvalidArgument(_))
    ));
}

// ---- navigation ------------------------------------------------------------

#[test]
fn previous_and_next_walk_the_stack() {
    let (mut repo, [base, c1, c2, c3]) = stack();
    let nav = previous(&mut repo).unwrap();
    assert_eq!(nav.status, ExitStatus::Ok);
    assert_eq!(nav.moved_to, Some(c2));
    previous(&mut repo).unwrap();
    previous(&mut repo).unwrap();
    assert_eq!(repo.working_parent(), Some(base));
    let stuck = previous(&mut repo).unwrap();
    assert_eq!(stuck.status, ExitStatus::NothingToDo);
    assert_eq!(repo.working_parent(), Some(base));

    assert_eq!(next(&mut repo).unwrap().moved_to, Some(c1));
    repo.update(c3, None).unwrap();
    assert_eq!(next(&mut repo).unwrap().status, ExitStatus::NothingToDo);
}

#[test]
fn next_skips_obsolete_children_and_asks_on_forks() {
    let (mut repo, [base, c1, ..]) = stack();
    repo.update(base, None).unwrap();
    let side = commit(&mut repo, "side", "s", "1");
    repo.update(base, None).unwrap();

    let fork = next(&mut repo).unwrap();
    assert_eq!(fork.status, ExitStatus::NeedsUserChoice);
    assert_eq!(fork.candidates, vec![c1, side]);
    assert_eq!(repo.working_parent(), Some(base));

    repo.create_markers(vec![Relation::prune(side)]).unwrap();
    assert_eq!(next(&mut repo).unwrap().moved_to, Some(c1));
}

#[test]
fn navigation_carries_the_active_bookmark() {
    let (mut repo, [_, c1, c2, _]) = stack();
    repo.set_bookmark("work", c1).unwrap();
    repo.update(c1, Some("work")).unwrap();
    next(&mut repo).unwrap();
    assert_eq!(repo.bookmarks().get("work"), Some(c2));
    assert_eq!(repo.bookmarks().active(), Some("work"));
}

// ---- push ------------------------------------------------------------------

#[test]
fn push_publishes_a_clean_stack() {
    let (mut repo, [base, .., c3]) = stack();
    let report = PublishPush.push(&mut repo, &[c3], false).unwrap();
    assert_eq!(report.published, 4);
    assert_eq!(repo.phase(base).unwrap(), Phase::Public);
    assert_eq!(repo.phase(c3).unwrap(), Phase::Public);
}

#[test]
fn push_refuses_troubled_history_unless_forced() {
    let (mut repo, [_, c1, c2, c3]) = stack();
    repo.create_markers(vec![Relation::prune(c2)]).unwrap();

    let err = PublishPush.push(&mut repo, &[c3], false).unwrap_err();
    assert!(matches!(
        err,
        EvolveError::PushRejected {
            reason: "obsolete",
            hint: None,
            ..
        }
    ));
    let hinted = PushHint::new(PublishPush)
        .push(&mut repo, &[c3], false)
        .unwrap_err();
    assert_eq!(hinted.hint().as_deref(), Some(PUSH_HINT));
    assert_eq!(repo.phase(c1).unwrap(), Phase::Draft);

    let report = PushHint::new(PublishPush)
        .push(&mut repo, &[c1], false)
        .unwrap();
    assert_eq!(report.published, 2);

    let forced = PublishPush.push(&mut repo, &[c3], true).unwrap();
    assert_eq!(forced.published, 2);
}

// ---- admin -----------------------------------------------------------------

#[test]
fn verify_accepts_a_healthy_repository() {
    let (mut repo, [_, c1, ..]) = stack();
    repo.create_markers(vec![Relation::prune(c1)]).unwrap();
    let report = verify(&repo);
    assert!(report.success);
    assert_eq!(report.counts.markers, 1);
    assert!(report.findings.is_empty());
}

#[test]
fn verify_flags_cycles_and_public_precursors() {
    let (mut repo, [_, c1, c2, c3]) = stack();
    repo.create_markers(vec![Relation::new(c2, [c3])]).unwrap();
    repo.create_markers(vec![Relation::new(c3, [c2])]).unwrap();
    repo.create_markers(vec![Relation::prune(c1)]).unwrap();
    repo.advance_boundary(Phase::Public, &[c1]);

    let report = verify(&repo);
    assert!(!report.success);
    assert_eq!(report.counts.cycle_members, 2);
    assert_eq!(report.counts.obsolete_public, 1);
    assert!(report
        .findings
        .iter()
        .all(|f| f.severity == VerifySeverity::Warning));
}

#[test]
fn stats_count_phases_markers_and_troubles() {
    let (mut repo, [base, c1, c2, c3]) = stack();
    repo.advance_boundary(Phase::Public, &[base]);
    repo.retract_boundary(Phase::Secret, &[c3]);
    repo.set_bookmark("topic", c3).unwrap();
    repo.create_markers(vec![Relation::prune(c1)]).unwrap();
    repo.update(base, None).unwrap();
    let split_a = commit(&mut repo, "split a", "x", "1");
    let split_b = commit(&mut repo, "split b", "y", "1");
    repo.create_markers(vec![Relation::new(c2, [split_a, split_b])])
        .unwrap();

    let report = stats(&repo);
    assert_eq!(report.changesets.total, 6);
    assert_eq!(report.changesets.public, 1);
    assert_eq!(report.changesets.draft, 4);
    assert_eq!(report.changesets.secret, 1);
    assert_eq!(report.changesets.bookmarks, 1);
    assert_eq!(report.changesets.heads, 2);
    assert_eq!(report.markers.total, 2);
    assert_eq!(report.markers.prunes, 1);
    assert_eq!(report.markers.splits, 1);
    assert_eq!(report.troubles.obsolete, 2);
    assert_eq!(report.troubles.suspended, 2);
    assert_eq!(report.troubles.unstable, 1);
    assert!(report.filesystem.is_none());
}
