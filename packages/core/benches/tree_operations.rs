//! Performance benchmarks for tree operations
//!
//! Run with: `cargo bench -p foldertree-core`
//!
//! These benchmarks measure the critical paths:
//! - Insert into a populated tree (two range shifts plus one insert)
//! - Move of a mid-sized subtree (five range shifts)
//! - Path resolution at depth
//! - Full integrity scan

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use foldertree_core::db::InMemoryStore;
use foldertree_core::models::{NewNode, Node};
use foldertree_core::{PathResolver, TreeConfig, TreeService};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Setup a tree with `folders` top-level folders of `files` leaves each
async fn setup_tree(folders: usize, files: usize) -> (Arc<TreeService>, Node) {
    let tree = Arc::new(
        TreeService::new(Arc::new(InMemoryStore::new()), TreeConfig::default())
            .await
            .unwrap(),
    );
    let root = tree.ensure_root().await.unwrap();

    for f in 0..folders {
        let folder = tree
            .insert_node(&root, NewNode::new(format!("folder-{}", f)))
            .await
            .unwrap();
        for i in 0..files {
            tree.insert_node(&folder, NewNode::new(format!("file-{}", i)))
                .await
                .unwrap();
        }
    }

    (tree, root)
}

/// Setup a single chain `root/d0/d1/.../d{depth-1}`
async fn setup_chain(depth: usize) -> Arc<TreeService> {
    let tree = Arc::new(
        TreeService::new(Arc::new(InMemoryStore::new()), TreeConfig::default())
            .await
            .unwrap(),
    );
    let mut current = tree.ensure_root().await.unwrap();
    for d in 0..depth {
        current = tree
            .insert_node(&current, NewNode::new(format!("d{}", d)))
            .await
            .unwrap();
    }
    tree
}

fn bench_insert(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (tree, root) = rt.block_on(setup_tree(20, 20));
    let mut counter = 0usize;

    c.bench_function("insert_into_420_node_tree", |b| {
        b.iter(|| {
            counter += 1;
            rt.block_on(async {
                black_box(
                    tree.insert_node(&root, NewNode::new(format!("bench-{}", counter)))
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

fn bench_move(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (tree, root) = rt.block_on(setup_tree(20, 20));
    let children = rt.block_on(tree.get_children(&root.id)).unwrap();
    let first = children[0].id.clone();
    let last = children[children.len() - 1].id.clone();
    let mut flip = false;

    c.bench_function("move_21_node_subtree", |b| {
        b.iter(|| {
            // Alternate so the tree shape stays bounded
            flip = !flip;
            let (node, parent) = if flip {
                (&first, &last)
            } else {
                (&first, &root.id)
            };
            rt.block_on(async { black_box(tree.move_node(node, parent).await.unwrap()) })
        })
    });
}

fn bench_path_resolution(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let tree = rt.block_on(setup_chain(16));
    let resolver = PathResolver::new(tree);
    let path = format!(
        "root/{}",
        (0..16).map(|d| format!("d{}", d)).collect::<Vec<_>>().join("/")
    );

    c.bench_function("resolve_path_depth_16", |b| {
        b.iter(|| rt.block_on(async { black_box(resolver.get_node_by_path(&path).await.unwrap()) }))
    });
}

fn bench_verify(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (tree, _root) = rt.block_on(setup_tree(50, 20));

    c.bench_function("verify_1051_nodes", |b| {
        b.iter(|| rt.block_on(async { black_box(tree.verify_integrity().await.unwrap()) }))
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_move,
    bench_path_resolution,
    bench_verify
);
criterion_main!(benches);
