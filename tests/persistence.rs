#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fs;

use evolve::admin::{stats, verify, VerifySeverity};
use evolve::evolve::{amend, evolve, EvolveOptions, NoopReporter};
use evolve::obsolete::codec::encode_file;
use evolve::rewrite::CommitOptions;
use evolve::storage::{EvolveKind, FileEntry, Resolution};
use evolve::{
    CommitRequest, EvolveError, Marker, NodeId, Phase, Relation, Repo, RepoOptions, Timestamp,
};
use tempfile::tempdir;

fn options() -> RepoOptions {
    RepoOptions::default().username("tester")
}

fn commit(repo: &mut Repo, message: &str, path: &str, data: &str) -> NodeId {
    repo.commit(
        CommitRequest::new(message)
            .write(path, data)
            .date(Timestamp::new(5_000, 0)),
    )
    .unwrap()
}

#[test]
fn init_then_open_round_trips_the_repository() {
    let dir = tempdir().unwrap();
    let (base, c1) = {
        let mut repo = Repo::init(dir.path(), options()).unwrap();
        let base = commit(&mut repo, "base", "a", "0");
        let c1 = commit(&mut repo, "c1", "a", "1");
        repo.transaction("setup", |repo| {
            repo.set_bookmark("topic", c1)?;
            repo.advance_boundary(Phase::Public, &[base]);
            Ok(())
        })
        .unwrap();
        (base, c1)
    };
    for name in ["changesets.json", "bookmarks.json", "workstate.json", "obsstore"] {
        assert!(dir.path().join(".evolve").join(name).exists(), "{name}");
    }

    let repo = Repo::open_with(dir.path(), options()).unwrap();
    assert_eq!(repo.graph().len(), 2);
    assert_eq!(repo.working_parent(), Some(c1));
    assert_eq!(repo.bookmarks().get("topic"), Some(c1));
    assert_eq!(repo.phase(base).unwrap(), Phase::Public);
    assert_eq!(repo.phase(c1).unwrap(), Phase::Draft);
    assert_eq!(repo.changeset(c1).unwrap().user, "tester");
}

#[test]
fn markers_are_appended_and_reloaded() {
    let dir = tempdir().unwrap();
    let (c1, c2) = {
        let mut repo = Repo::init(dir.path(), options()).unwrap();
        commit(&mut repo, "base", "a", "0");
        let c1 = commit(&mut repo, "c1", "a", "1");
        let c2 = commit(&mut repo, "c2", "b", "1");
        repo.create_markers(vec![Relation::prune(c1)]).unwrap();
        (c1, c2)
    };
    let size_after_first = fs::metadata(dir.path().join(".evolve/obsstore"))
        .unwrap()
        .len();
    {
        let mut repo = Repo::open_with(dir.path(), options()).unwrap();
        assert_eq!(repo.store().len(), 1);
        repo.create_markers(vec![Relation::prune(c2)]).unwrap();
    }
    let size_after_second = fs::metadata(dir.path().join(".evolve/obsstore"))
        .unwrap()
        .len();
    assert!(size_after_second > size_after_first);

    let repo = Repo::open_with(dir.path(), options()).unwrap();
    assert_eq!(repo.store().len(), 2);
    assert_eq!(repo.extinct(), vec![c1, c2]);
    let marker = repo.store().successors_of(c1).next().unwrap();
    assert_eq!(marker.metadata.get("user").map(String::as_str), Some("tester"));
}

#[test]
fn interrupted_evolution_survives_a_reopen() {
    let dir = tempdir().unwrap();
    let (c2, amended) = {
        let mut repo = Repo::init(dir.path(), options()).unwrap();
        commit(&mut repo, "base", "a", "0");
        let c1 = commit(&mut repo, "c1", "a", "1");
        let c2 = commit(&mut repo, "c2", "a", "5");
        repo.update(c1, None).unwrap();
        let files = BTreeMap::from([("a".to_string(), Some(FileEntry::new("2")))]);
        let amended = amend(&mut repo, files, &CommitOptions::default()).unwrap();
        let err = evolve(&mut repo, &EvolveOptions::default(), &mut NoopReporter).unwrap_err();
        assert!(matches!(
            err,
            EvolveError::MergeConflict {
                resumable: true,
                ..
            }
        ));
        (c2, amended)
    };
    assert!(dir.path().join(".evolve/evolvestate.json").exists());

    {
        let mut repo = Repo::open_with(dir.path(), options()).unwrap();
        let state = repo.evolve_state().cloned().unwrap();
        assert_eq!(state.kind, EvolveKind::Unstable);
        assert_eq!(state.source, c2);
        assert_eq!(state.destination, amended);
        assert_eq!(repo.working_parent(), Some(amended));
        repo.resolve_path("a", Resolution::Other).unwrap();
    }

    let mut repo = Repo::open_with(dir.path(), options()).unwrap();
    assert!(repo.evolve_state().unwrap().is_resolved());
    let resume = EvolveOptions {
        continue_: true,
        ..EvolveOptions::default()
    };
    let report = evolve(&mut repo, &resume, &mut NoopReporter).unwrap();
    assert_eq!(report.fixes.len(), 1);
    assert!(repo.evolve_state().is_none());
    assert!(!dir.path().join(".evolve/evolvestate.json").exists());
    assert!(repo.troubled().is_empty());
}

#[test]
fn failed_transactions_leave_the_files_untouched() {
    let dir = tempdir().unwrap();
    let mut repo = Repo::init(dir.path(), options()).unwrap();
    let base = commit(&mut repo, "base", "a", "0");
    let before = fs::read(dir.path().join(".evolve/changesets.json")).unwrap();

    let err = repo
        .transaction("doomed", |repo| {
            repo.commit(CommitRequest::new("lost").write("b", "1"))?;
            Err::<(), _>(EvolveError::InvalidArgument("abort".into()))
        })
        .unwrap_err();
    assert!(matches!(err, EvolveError::InvalidArgument(_)));
    assert_eq!(repo.graph().len(), 1);
    assert_eq!(repo.working_parent(), Some(base));
    assert_eq!(
        fs::read(dir.path().join(".evolve/changesets.json")).unwrap(),
        before
    );
}

#[test]
fn init_refuses_an_existing_repository() {
    let dir = tempdir().unwrap();
    Repo::init(dir.path(), options()).unwrap();
    assert!(matches!(
        Repo::init(dir.path(), options()),
        Err(EvolveError::InvalidArgument(_))
    ));
    let empty = tempdir().unwrap();
    assert!(matches!(
        Repo::open(empty.path()),
        Err(EvolveError::InvalidArgument(_))
    ));
}

#[test]
fn corrupted_obsstore_is_reported_on_open() {
    let dir = tempdir().unwrap();
    {
        let mut repo = Repo::init(dir.path(), options()).unwrap();
        commit(&mut repo, "base", "a", "0");
        let c1 = commit(&mut repo, "c1", "a", "1");
        repo.create_markers(vec![Relation::prune(c1)]).unwrap();
    }
    let path = dir.path().join(".evolve/obsstore");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes).unwrap();

    assert!(matches!(
        Repo::open_with(dir.path(), options()),
        Err(EvolveError::Corruption(_))
    ));
}

#[test]
fn legacy_markers_are_repaired_and_reported() {
    let dir = tempdir().unwrap();
    let c1 = {
        let mut repo = Repo::init(dir.path(), options()).unwrap();
        commit(&mut repo, "base", "a", "0");
        commit(&mut repo, "c1", "a", "1")
    };
    let ghost = NodeId([0x5a; 20]);
    let legacy = Marker::new(c1, vec![NodeId::NULL]);
    let foreign = Marker::new(ghost, vec![NodeId([0x5b; 20])]);
    fs::write(
        dir.path().join(".evolve/obsstore"),
        encode_file([&legacy, &foreign]),
    )
    .unwrap();

    let repo = Repo::open_with(dir.path(), options()).unwrap();
    assert_eq!(repo.store().repaired(), 1);
    assert!(repo.successor_sets(c1).is_empty());
    assert_eq!(repo.extinct(), vec![c1]);

    let report = verify(&repo);
    assert!(!report.success);
    assert_eq!(report.counts.repaired, 1);
    assert_eq!(report.counts.unknown_precursors, 1);
    assert_eq!(report.counts.unknown_successors, 1);
    let infos = report
        .findings
        .iter()
        .filter(|f| f.severity == VerifySeverity::Info)
        .count();
    assert_eq!(infos, 2);
}

#[test]
fn config_file_controls_the_repository_options() {
    let dir = tempdir().unwrap();
    Repo::init(dir.path(), options()).unwrap();
    fs::write(
        dir.path().join(".evolve/config.toml"),
        "[ui]\nusername = \"configured\"\n\n[obsolescence]\nenabled = false\n",
    )
    .unwrap();

    let mut repo = Repo::open(dir.path()).unwrap();
    assert_eq!(repo.username(), "configured");
    let node = repo
        .commit(CommitRequest::new("by config").write("a", "1"))
        .unwrap();
    assert_eq!(repo.changeset(node).unwrap().user, "configured");
    assert!(matches!(
        repo.create_markers(vec![Relation::prune(node)]),
        Err(EvolveError::ObsolescenceDisabled)
    ));
}

#[test]
fn stats_include_file_sizes_on_disk() {
    let dir = tempdir().unwrap();
    let mut repo = Repo::init(dir.path(), options()).unwrap();
    commit(&mut repo, "base", "a", "0");
    let c1 = commit(&mut repo, "c1", "a", "1");
    repo.create_markers(vec![Relation::prune(c1)]).unwrap();

    let report = stats(&repo);
    let fs_stats = report.filesystem.expect("on-disk repository");
    assert!(fs_stats.obsstore_size_bytes > 0);
    assert!(fs_stats.changesets_size_bytes > 0);
    assert!(fs_stats.repo_path.ends_with(".evolve"));
}
