#![forbid(unsafe_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use evolve::obsolete::{SuccessorSetCache, Traversal};
use evolve::{CommitRequest, Marker, MarkerFlags, NodeId, ObsStore, Repo, RepoOptions, Timestamp};

const CHAIN_LENGTHS: [usize; 3] = [64, 512, 2_048];
const FAN_OUTS: [usize; 3] = [4, 32, 256];

/// `count` changesets committed side by side on one base.
fn siblings(count: usize) -> (Repo, Vec<NodeId>) {
    let mut repo = Repo::in_memory(RepoOptions::default().username("bench"));
    let base = repo
        .commit(
            CommitRequest::new("base")
                .write("base", "0")
                .date(Timestamp::new(0, 0)),
        )
        .expect("base");
    let nodes = (0..count)
        .map(|i| {
            repo.update(base, None).expect("update");
            repo.commit(
                CommitRequest::new(format!("sibling {i}"))
                    .write("f", i.to_string())
                    .date(Timestamp::new(0, 0)),
            )
            .expect("commit")
        })
        .collect();
    (repo, nodes)
}

fn deep_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("successor_sets/chain");
    for len in CHAIN_LENGTHS {
        let (repo, nodes) = siblings(len);
        let markers = nodes
            .windows(2)
            .map(|pair| Marker::new(pair[0], vec![pair[1]]))
            .collect();
        let store = ObsStore::from_markers(true, markers);
        let traversal = Traversal::new(&store, repo.graph());
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("from_root", len), &nodes[0], |b, root| {
            b.iter(|| black_box(traversal.successor_sets(*root)));
        });
        group.bench_with_input(BenchmarkId::new("every_node_cached", len), &nodes, |b, nodes| {
            b.iter(|| {
                let mut cache = SuccessorSetCache::default();
                for node in nodes {
                    black_box(traversal.successor_sets_cached(*node, &mut cache));
                }
            });
        });
        group.bench_with_input(BenchmarkId::new("all_precursors", len), &nodes, |b, nodes| {
            let tip = nodes[nodes.len() - 1];
            b.iter(|| black_box(traversal.all_precursors([tip], MarkerFlags::NONE)));
        });
    }
    group.finish();
}

fn wide_divergence(c: &mut Criterion) {
    let mut group = c.benchmark_group("successor_sets/divergence");
    for width in FAN_OUTS {
        let (repo, nodes) = siblings(width + 1);
        let root = nodes[0];
        let markers = nodes[1..]
            .iter()
            .map(|succ| Marker::new(root, vec![*succ]))
            .collect();
        let store = ObsStore::from_markers(true, markers);
        let traversal = Traversal::new(&store, repo.graph());
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("competing", width), &root, |b, root| {
            b.iter(|| black_box(traversal.successor_sets(*root)));
        });
    }
    group.finish();
}

criterion_group!(benches, deep_chain, wide_divergence);
criterion_main!(benches);
