use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use glam::{Affine3A, Vec3};

use myth_batch::consolidation::{ConsolidationConfig, Consolidator};
use myth_batch::render_data::{PrimPath, PrimitiveRenderData, RenderDataStore};
use myth_batch::resources::ColorMaterialCache;
use myth_batch::utils::TimeCode;

const PRIMS: usize = 2_000;
const GRID: usize = 16;

fn grid_prim(index: usize) -> PrimitiveRenderData {
    let mut points = Vec::with_capacity(GRID * GRID);
    for y in 0..GRID {
        for x in 0..GRID {
            points.push(Vec3::new(x as f32, y as f32, 0.0));
        }
    }
    let mut indices = Vec::new();
    for y in 0..GRID - 1 {
        for x in 0..GRID - 1 {
            let i = (y * GRID + x) as u32;
            let g = GRID as u32;
            indices.push([i, i + 1, i + g]);
            indices.push([i + 1, i + g + 1, i + g]);
        }
    }

    let mut prim = PrimitiveRenderData::new(format!("/World/Grid{index}"));
    prim.set_transform(Affine3A::from_translation(Vec3::new(index as f32 * 20.0, 0.0, 0.0)));
    prim.set_normals(vec![Vec3::Z; points.len()]);
    prim.set_points(points);
    let material = if index % 4 == 0 { "/materials/red" } else { "/materials/grey" };
    prim.add_subset(material, indices, Vec::new());
    prim.set_display_color(if index % 4 == 0 { Vec3::X } else { Vec3::splat(0.7) });
    prim
}

fn scene() -> RenderDataStore {
    let mut store = RenderDataStore::new();
    for i in 0..PRIMS {
        store.insert(grid_prim(i));
    }
    store
}

fn consolidator() -> Consolidator {
    let mut consolidator = Consolidator::new(Arc::new(ColorMaterialCache::new()));
    consolidator.set_config(ConsolidationConfig::dynamic(1_000_000, 50_000, 10_000));
    consolidator
}

fn bench_consolidation(c: &mut Criterion) {
    let wire = ColorMaterialCache::new().get(Vec3::splat(0.5), false);
    let mut group = c.benchmark_group("Consolidation");

    group.bench_function("Build (2k prims)", |b| {
        b.iter_batched(
            || (scene(), consolidator()),
            |(mut store, mut consolidator)| {
                let visible = store.visible_keys();
                black_box(consolidator.build_consolidation(&mut store, &visible, TimeCode::new(0.0), &wire));
            },
            BatchSize::LargeInput,
        );
    });

    let mut store = scene();
    let mut consolidator = consolidator();
    let visible = store.visible_keys();
    consolidator.build_consolidation(&mut store, &visible, TimeCode::new(0.0), &wire);
    let moved: Vec<Vec3> = store
        .by_path(&PrimPath::new("/World/Grid1"))
        .map(|prim| prim.points.iter().map(|p| *p + Vec3::Z).collect())
        .unwrap_or_default();

    group.bench_function("Patch (1 dirty prim)", |b| {
        b.iter(|| {
            if let Some(prim) = store.by_path_mut(&PrimPath::new("/World/Grid1")) {
                prim.set_points(moved.clone());
            }
            consolidator.update_consolidation(&mut store, &visible, TimeCode::new(0.0), TimeCode::new(0.0));
            for (_, prim) in store.iter_mut() {
                for subset in &mut prim.subsets {
                    myth_batch::resources::clear_dirty_bits(&mut subset.dirty_bits);
                }
            }
            black_box(consolidator.get_consolidation(TimeCode::new(0.0)));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_consolidation);
criterion_main!(benches);
