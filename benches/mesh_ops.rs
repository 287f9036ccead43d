//! Benchmarks for mesh operations.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nalgebra::Point3;
use polykernel::prelude::*;

fn grid(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut faces = Vec::with_capacity(n * n * 2);

    for j in 0..=n {
        for i in 0..=n {
            // Slight bulge so the BSP planes are not all coplanar
            let (x, y) = (i as f64, j as f64);
            vertices.push(Point3::new(x, y, (x * 0.3).sin() + (y * 0.2).cos()));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;

            faces.push([v00, v10, v11]);
            faces.push([v00, v11, v01]);
        }
    }

    (vertices, faces)
}

fn create_grid_mesh(n: usize) -> Mesh {
    let (vertices, faces) = grid(n);
    build_from_polygons(&vertices, &faces).unwrap()
}

/// Three fresh vertices per triangle, as an STL loader would produce.
fn create_grid_soup(n: usize) -> Mesh {
    let (vertices, faces) = grid(n);
    let mut mesh = Mesh::with_capacity(faces.len() * 3, faces.len());
    for tri in &faces {
        let corners: Vec<_> = tri
            .iter()
            .map(|&i| {
                mesh.create_vertex(
                    vertices[i],
                    CreateOption::CreateNew,
                    SortOption::WillSortLater,
                    0.0,
                )
                .unwrap()
            })
            .collect();
        mesh.create_face(&corners, CreateOption::CreateNew).unwrap();
    }
    mesh
}

fn bench_mesh_construction(c: &mut Criterion) {
    let (vertices, faces) = grid(10);

    c.bench_function("build_grid_10x10", |b| {
        b.iter(|| {
            let mesh: Mesh = build_from_polygons(&vertices, &faces).unwrap();
            mesh
        });
    });
}

fn bench_clean(c: &mut Criterion) {
    let soup = create_grid_soup(30);

    c.bench_function("clean_and_merge_grid_30x30", |b| {
        b.iter(|| {
            let mut mesh = soup.clone();
            clean_and_merge(
                &mut mesh,
                &CleanOptions::default(),
                &CancellationToken::new(),
                &Progress::none(),
            )
            .unwrap()
        });
    });
}

/// Merge time should grow roughly linearly with the number of soup vertices.
fn bench_clean_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("clean_and_merge");
    group.sample_size(10);
    for n in [25, 50, 100, 200] {
        let soup = create_grid_soup(n);
        group.throughput(Throughput::Elements(soup.num_vertices() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &soup, |b, soup| {
            b.iter(|| {
                let mut mesh = soup.clone();
                clean_and_merge(
                    &mut mesh,
                    &CleanOptions::default(),
                    &CancellationToken::new(),
                    &Progress::none(),
                )
                .unwrap()
            });
        });
    }
    group.finish();
}

fn bench_edits(c: &mut Criterion) {
    let mesh = create_grid_mesh(20);

    c.bench_function("split_every_edge_grid_20x20", |b| {
        b.iter(|| {
            let mut mesh = mesh.clone();
            let edges: Vec<_> = mesh.mesh_edge_ids().collect();
            for e in edges {
                mesh.split_mesh_edge(e, None).unwrap();
            }
            mesh
        });
    });
}

fn bench_bsp(c: &mut Criterion) {
    let mesh = create_grid_mesh(30);

    c.bench_function("bsp_build_grid_30x30", |b| {
        b.iter(|| BspTree::build(&mesh, &BspOptions::default()).unwrap());
    });

    let tree = BspTree::build(&mesh, &BspOptions::default()).unwrap();
    let eye = Point3::new(15.0, -10.0, 20.0);
    c.bench_function("bsp_visibility_order_grid_30x30", |b| {
        b.iter(|| tree.visibility_order_from_eye(&eye));
    });
}

criterion_group!(
    benches,
    bench_mesh_construction,
    bench_clean,
    bench_clean_scaling,
    bench_edits,
    bench_bsp
);
criterion_main!(benches);
