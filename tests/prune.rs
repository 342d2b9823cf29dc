#![allow(missing_docs)]

use evolve::evolve::{prune, PruneOptions};
use evolve::{CommitRequest, EvolveError, NodeId, Phase, Repo, RepoOptions, Timestamp};

fn repo() -> Repo {
    Repo::in_memory(RepoOptions::default().username("tester"))
}

fn commit(repo: &mut Repo, message: &str, path: &str, data: &str) -> NodeId {
    repo.commit(
        CommitRequest::new(message)
            .write(path, data)
            .date(Timestamp::new(2_000, 0)),
    )
    .unwrap()
}

/// base -> c1 -> c2, working copy on c2.
fn stack() -> (Repo, NodeId, NodeId, NodeId) {
    let mut repo = repo();
    let base = commit(&mut repo, "base", "a", "0");
    let c1 = commit(&mut repo, "c1", "a", "1");
    let c2 = commit(&mut repo, "c2", "b", "1");
    (repo, base, c1, c2)
}

#[test]
fn pruning_the_working_parent_moves_to_a_living_ancestor() {
    let (mut repo, base, c1, c2) = stack();
    let report = prune(&mut repo, &[c1, c2], &PruneOptions::default()).unwrap();
    assert_eq!(report.pruned, vec![c1, c2]);
    assert_eq!(report.count(), 2);
    assert_eq!(report.markers, 2);
    assert_eq!(report.moved_to, Some(base));
    assert_eq!(repo.working_parent(), Some(base));
    assert_eq!(repo.extinct(), vec![c1, c2]);
    assert!(repo.troubled().is_empty());
}

#[test]
fn pruning_a_middle_changeset_leaves_descendants_unstable() {
    let (mut repo, _, c1, c2) = stack();
    let report = prune(&mut repo, &[c1], &PruneOptions::default()).unwrap();
    assert_eq!(report.moved_to, None);
    assert_eq!(repo.working_parent(), Some(c2));
    assert_eq!(repo.unstable(), vec![c2]);
    assert!(repo.successor_sets(c1).is_empty());
}

#[test]
fn single_successor_replaces_the_working_parent() {
    let (mut repo, base, c1, _) = stack();
    repo.update(base, None).unwrap();
    let replacement = commit(&mut repo, "replacement", "a", "9");
    repo.update(c1, None).unwrap();
    let opts = PruneOptions {
        successors: vec![replacement],
        ..PruneOptions::default()
    };
    let report = prune(&mut repo, &[c1], &opts).unwrap();
    assert_eq!(report.moved_to, Some(replacement));
    assert_eq!(repo.successor_sets(c1), vec![vec![replacement]]);
}

#[test]
fn one_precursor_may_split_into_several_successors() {
    let (mut repo, base, c1, _) = stack();
    repo.update(base, None).unwrap();
    let p1 = commit(&mut repo, "part one", "a", "1");
    let p2 = commit(&mut repo, "part two", "c", "1");
    let opts = PruneOptions {
        successors: vec![p2, p1],
        ..PruneOptions::default()
    };
    let report = prune(&mut repo, &[c1], &opts).unwrap();
    assert_eq!(report.markers, 1);
    let marker = repo.store().successors_of(c1).next().unwrap();
    assert_eq!(marker.successors, vec![p1, p2]);
}

#[test]
fn several_successors_for_several_precursors_need_biject() {
    let (mut repo, base, c1, c2) = stack();
    repo.update(base, None).unwrap();
    let s1 = commit(&mut repo, "s1", "x", "1");
    let s2 = commit(&mut repo, "s2", "y", "1");
    let fan_out = PruneOptions {
        successors: vec![s1, s2],
        ..PruneOptions::default()
    };
    assert!(matches!(
        prune(&mut repo, &[c1, c2], &fan_out),
        Err(EvolveError::PruneFanOut)
    ));
    assert!(repo.store().is_empty());

    let biject = PruneOptions {
        successors: vec![s1, s2],
        bijective: true,
        ..PruneOptions::default()
    };
    let report = prune(&mut repo, &[c2, c1], &biject).unwrap();
    assert_eq!(report.markers, 2);
    assert_eq!(repo.successors(&[c1]), vec![s1]);
    assert_eq!(repo.successors(&[c2]), vec![s2]);
}

#[test]
fn biject_requires_matching_lengths() {
    let (mut repo, base, c1, c2) = stack();
    repo.update(base, None).unwrap();
    let s1 = commit(&mut repo, "s1", "x", "1");
    let opts = PruneOptions {
        successors: vec![s1],
        bijective: true,
        ..PruneOptions::default()
    };
    assert!(matches!(
        prune(&mut repo, &[c1, c2], &opts),
        Err(EvolveError::PruneArity {
            precursors: 2,
            successors: 1
        })
    ));
}

#[test]
fn public_changesets_cannot_be_pruned() {
    let (mut repo, base, c1, c2) = stack();
    repo.advance_boundary(Phase::Public, &[c1]);
    let err = prune(&mut repo, &[c2, c1], &PruneOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        EvolveError::ImmutableChangeset {
            action: "prune",
            ..
        }
    ));
    assert!(err.hint().is_some());
    assert!(repo.store().is_empty());
    assert_eq!(repo.phase(base).unwrap(), Phase::Public);
}

#[test]
fn unknown_successor_is_refused() {
    let (mut repo, _, c1, _) = stack();
    let opts = PruneOptions {
        successors: vec![NodeId([7; 20])],
        ..PruneOptions::default()
    };
    assert!(matches!(
        prune(&mut repo, &[c1], &opts),
        Err(EvolveError::UnknownNode(_))
    ));
}

#[test]
fn nothing_to_prune_is_an_error() {
    let (mut repo, ..) = stack();
    assert!(matches!(
        prune(&mut repo, &[], &PruneOptions::default()),
        Err(EvolveError::NothingToPrune)
    ));
}

#[test]
fn bookmarks_on_pruned_changesets_move_back() {
    let (mut repo, _, c1, c2) = stack();
    repo.set_bookmark("topic", c2).unwrap();
    prune(&mut repo, &[c2], &PruneOptions::default()).unwrap();
    assert_eq!(repo.bookmarks().get("topic"), Some(c1));
}

#[test]
fn bookmark_prune_takes_only_what_the_bookmark_owns() {
    let mut repo = repo();
    let base = commit(&mut repo, "base", "a", "0");
    repo.advance_boundary(Phase::Public, &[base]);
    let f1 = commit(&mut repo, "f1", "f", "1");
    let f2 = commit(&mut repo, "f2", "f", "2");
    repo.set_bookmark("feature", f2).unwrap();
    repo.update(base, None).unwrap();
    let other = commit(&mut repo, "other", "o", "1");

    let opts = PruneOptions {
        bookmark: Some("feature".into()),
        ..PruneOptions::default()
    };
    let report = prune(&mut repo, &[], &opts).unwrap();
    assert_eq!(report.pruned, vec![f1, f2]);
    assert_eq!(report.deleted_bookmark.as_deref(), Some("feature"));
    assert!(repo.bookmarks().get("feature").is_none());
    assert!(!repo.is_obsolete(other));
    assert!(!repo.is_obsolete(base));
    assert_eq!(repo.working_parent(), Some(other));
}

#[test]
fn shared_bookmark_is_only_deleted() {
    let (mut repo, _, _, c2) = stack();
    repo.set_bookmark("one", c2).unwrap();
    repo.set_bookmark("two", c2).unwrap();
    let opts = PruneOptions {
        bookmark: Some("one".into()),
        ..PruneOptions::default()
    };
    let report = prune(&mut repo, &[], &opts).unwrap();
    assert!(report.pruned.is_empty());
    assert_eq!(report.deleted_bookmark.as_deref(), Some("one"));
    assert_eq!(repo.bookmarks().get("two"), Some(c2));
    assert!(repo.store().is_empty());
}

#[test]
fn missing_bookmark_is_reported() {
    let (mut repo, ..) = stack();
    let opts = PruneOptions {
        bookmark: Some("ghost".into()),
        ..PruneOptions::default()
    };
    assert!(matches!(
        prune(&mut repo, &[], &opts),
        Err(EvolveError::InvalidArgument(_))
    ));
}
