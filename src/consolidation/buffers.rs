//! Merged buffer construction and patching.
//!
//! Destination ranges are computed up front and proven disjoint, then filled
//! in parallel with rayon. Each primitive gets one vertex range per instance,
//! shared by all of its subsets in the cell.

use glam::{Affine3A, Vec3};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::consolidation::input::{Cell, Input};
use crate::consolidation::output::Mapping;
use crate::errors::{BatchError, Result};
use crate::render_data::PrimPath;
use crate::resources::buffer::VertexBuffer;
use crate::resources::change_tracker::{DirtyBits, check_dirty};
use crate::resources::geometry::{VERTEX_USAGE, VertexStream};

/// The four merged vertex streams, indexed by [`VertexStream`].
pub type MergedStreams = [VertexBuffer; VertexStream::COUNT];

/// Normals whose squared length is within this of 1 are left alone.
const UNIT_LENGTH_TOLERANCE: f32 = 1e-6;

/// Assigns vertex ranges: one per instance, per distinct primitive, in order
/// of first appearance. Returns the mappings and the total vertex count.
pub fn layout_cell(cell: &Cell) -> (FxHashMap<PrimPath, Mapping>, usize) {
    let mut mappings = FxHashMap::default();
    let mut base = 0;
    for input in &cell.inputs {
        if mappings.contains_key(&input.prim_path) {
            continue;
        }
        let vertex_count = input.vertex_count();
        let offsets: SmallVec<[usize; 4]> = (0..input.num_instances()).map(|k| base + k * vertex_count).collect();
        base += vertex_count * input.num_instances();
        mappings.insert(
            input.prim_path.clone(),
            Mapping {
                prim_path: input.prim_path.clone(),
                offsets,
                vertex_count,
                instance_start: input.instance_start,
                multipart_index: input.multipart_index,
            },
        );
    }
    (mappings, base)
}

/// Builds the merged triangle (or line) index list of a cell.
pub fn build_index_buffer(cell: &Cell, mappings: &FxHashMap<PrimPath, Mapping>, wireframe: bool) -> Vec<u32> {
    let jobs: Vec<(&Input, &Mapping)> = cell
        .inputs
        .iter()
        .filter_map(|input| {
            let mapping = mappings.get(&input.prim_path)?;
            mapping.covers(input).then_some((input, mapping))
        })
        .collect();
    let total: usize = jobs
        .iter()
        .map(|(input, _)| input.index_len(wireframe) * input.num_instances())
        .sum();

    let mut data = vec![0u32; total];
    let mut chunks = Vec::with_capacity(jobs.len());
    let mut rest: &mut [u32] = &mut data;
    for (input, _) in &jobs {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(input.index_len(wireframe) * input.num_instances());
        chunks.push(head);
        rest = tail;
    }

    jobs.into_par_iter()
        .zip(chunks)
        .for_each(|((input, mapping), dest)| fill_indices(input, mapping, wireframe, dest));
    data
}

fn fill_indices(input: &Input, mapping: &Mapping, wireframe: bool, dest: &mut [u32]) {
    let local: &[u32] = if wireframe {
        input.wire_indices.as_slice()
    } else {
        bytemuck::cast_slice(input.indices.as_slice())
    };
    if local.is_empty() {
        return;
    }
    for (chunk, offset) in dest.chunks_mut(local.len()).zip(&mapping.offsets) {
        let base = *offset as u32;
        for (d, s) in chunk.iter_mut().zip(local) {
            *d = s + base;
        }
    }
}

/// Allocates the merged vertex streams of a cell and fills them.
///
/// Returns the streams, the per-primitive mappings and whether any contained
/// instance is selected.
pub fn build_vertex_buffers(cell: &Cell, label: &str) -> (MergedStreams, FxHashMap<PrimPath, Mapping>, bool) {
    let (mappings, vertex_count) = layout_cell(cell);
    let streams = VertexStream::ALL
        .map(|s| VertexBuffer::zeroed(vertex_count, VERTEX_USAGE, Some(&format!("{label}:{}", s.label()))));
    let has_selection = update_vertex_buffers(&streams, &cell.inputs, &mappings, true).unwrap_or(false);
    (streams, mappings, has_selection)
}

/// One instance of one primitive, copied into `offset..offset + len`.
#[derive(Clone, Copy)]
struct FillJob<'a> {
    input: &'a Input,
    transform: Affine3A,
    selected: bool,
    offset: usize,
}

impl FillJob<'_> {
    fn len(&self) -> usize {
        self.input.vertex_count()
    }
}

/// Writes the inputs' vertex data into merged streams.
///
/// Inputs are deduplicated per primitive (the first one wins, dirty bits are
/// merged); subsets of one primitive share its vertex range. With `full`
/// every stream is rewritten, otherwise only streams dirty on at least one
/// input, and only for the dirty inputs. Returns the batch selection state
/// when the selection stream was written.
pub fn update_vertex_buffers(
    streams: &MergedStreams,
    inputs: &[Input],
    mappings: &FxHashMap<PrimPath, Mapping>,
    full: bool,
) -> Option<bool> {
    let mut unique: Vec<(&Input, &Mapping, DirtyBits)> = Vec::new();
    let mut seen: FxHashMap<&PrimPath, usize> = FxHashMap::default();
    for input in inputs {
        let Some(mapping) = mappings.get(&input.prim_path) else {
            log::trace!("'{}' is not part of this batch", input.prim_path);
            continue;
        };
        if !mapping.covers(input) {
            continue;
        }
        if let Some(&slot) = seen.get(&input.prim_path) {
            unique[slot].2 |= input.dirty_bits;
            continue;
        }
        if input.vertex_count() != mapping.vertex_count {
            log::warn!(
                "'{}' has {} vertices, its batch range holds {}",
                input.prim_path,
                input.vertex_count(),
                mapping.vertex_count
            );
            continue;
        }
        seen.insert(&input.prim_path, unique.len());
        unique.push((input, mapping, input.dirty_bits));
    }

    let selection_dirty = DirtyBits::SELECTION_HIGHLIGHT;
    let passes = [
        (VertexStream::Points, DirtyBits::POINTS | DirtyBits::TRANSFORMS),
        (VertexStream::Normals, DirtyBits::NORMALS | DirtyBits::TRANSFORMS),
        (VertexStream::Selection, selection_dirty),
        (VertexStream::Uvs, DirtyBits::UVS),
    ];

    let mut selection_written = false;
    for (stream, flag) in passes {
        let jobs: Vec<FillJob<'_>> = unique
            .iter()
            .filter(|(_, _, bits)| full || check_dirty(*bits, flag))
            .flat_map(|&(input, mapping, _)| {
                mapping.offsets.iter().enumerate().map(move |(k, &offset)| FillJob {
                    input,
                    transform: input.transforms[k],
                    selected: input.selection.get(k).copied().unwrap_or(false),
                    offset,
                })
            })
            .collect();
        if jobs.is_empty() {
            continue;
        }

        match fill_stream(&streams[stream.index()], stream, jobs) {
            Ok(()) => selection_written |= stream == VertexStream::Selection,
            Err(e) => log::warn!("Merged stream '{}' not patched: {e}", stream.label()),
        }
    }

    selection_written.then(|| unique.iter().any(|(input, _, _)| input.has_selection()))
}

fn fill_stream(buffer: &VertexBuffer, stream: VertexStream, mut jobs: Vec<FillJob<'_>>) -> Result<()> {
    jobs.sort_unstable_by_key(|job| job.offset);
    let start = jobs.first().map_or(0, |job| job.offset);
    let end = jobs.iter().map(|job| job.offset + job.len()).max().unwrap_or(start);

    buffer.with_range_mut(start..end, |span| {
        let slices = split_disjoint(span, start, &jobs)?;
        jobs.par_iter().zip(slices).for_each(|(job, dest)| fill_vertices(job, stream, dest));
        Ok(())
    })?
}

/// Cuts `span` (starting at element `span_start`) into one slice per job.
/// `jobs` must be sorted by offset.
fn split_disjoint<'s>(span: &'s mut [Vec3], span_start: usize, jobs: &[FillJob<'_>]) -> Result<Vec<&'s mut [Vec3]>> {
    let mut slices = Vec::with_capacity(jobs.len());
    let mut rest = span;
    let mut cursor = span_start;
    for job in jobs {
        if job.offset < cursor {
            return Err(BatchError::OverlappingRanges { start: job.offset });
        }
        let (_, tail) = std::mem::take(&mut rest).split_at_mut(job.offset - cursor);
        let (dest, tail) = tail.split_at_mut(job.len());
        slices.push(dest);
        rest = tail;
        cursor = job.offset + job.len();
    }
    Ok(slices)
}

fn fill_vertices(job: &FillJob<'_>, stream: VertexStream, dest: &mut [Vec3]) {
    let input = job.input;
    match stream {
        VertexStream::Points => {
            let transform = job.transform;
            dest.par_iter_mut()
                .zip(input.points.par_iter())
                .for_each(|(d, p)| *d = transform.transform_point3(*p));
        }
        VertexStream::Normals => {
            let transform = job.transform;
            dest.par_iter_mut().zip(input.normals.par_iter()).for_each(|(d, n)| {
                let normal = transform.transform_vector3(*n);
                let len_sq = normal.length_squared();
                *d = if len_sq != 0.0 && (len_sq - 1.0).abs() > UNIT_LENGTH_TOLERANCE {
                    normal / len_sq.sqrt()
                } else {
                    normal
                };
            });
        }
        VertexStream::Selection => {
            dest.fill(if job.selected { Vec3::ONE } else { Vec3::ZERO });
        }
        VertexStream::Uvs => {
            let n = dest.len().min(input.uvs.len());
            dest[..n].copy_from_slice(&input.uvs[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::render_data::RenderDataKey;

    fn input(path: &str, vertices: usize) -> Input {
        Input {
            key: RenderDataKey::default(),
            prim_path: PrimPath::new(path),
            subset_index: 0,
            indices: Arc::new(vec![[0, 1, 2]]),
            wire_indices: Arc::new(vec![0, 1, 1, 2]),
            points: Arc::new(vec![Vec3::X; vertices]),
            normals: Arc::new(vec![Vec3::Z; vertices]),
            uvs: Arc::default(),
            transforms: vec![Affine3A::IDENTITY],
            selection: vec![false],
            instance_start: 0,
            multipart_index: None,
            dirty_bits: DirtyBits::CLEAN,
        }
    }

    #[test]
    fn disjoint_jobs_split_around_gaps() {
        let a = input("/a", 2);
        let b = input("/b", 3);
        let jobs = [
            FillJob { input: &a, transform: Affine3A::IDENTITY, selected: false, offset: 10 },
            FillJob { input: &b, transform: Affine3A::IDENTITY, selected: false, offset: 14 },
        ];
        let mut span = vec![Vec3::ZERO; 7];
        let slices = split_disjoint(&mut span, 10, &jobs).unwrap();
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].len(), 2);
        assert_eq!(slices[1].len(), 3);
    }

    #[test]
    fn overlapping_jobs_are_rejected() {
        let a = input("/a", 4);
        let jobs = [
            FillJob { input: &a, transform: Affine3A::IDENTITY, selected: false, offset: 0 },
            FillJob { input: &a, transform: Affine3A::IDENTITY, selected: false, offset: 2 },
        ];
        let mut span = vec![Vec3::ZERO; 6];
        let err = split_disjoint(&mut span, 0, &jobs).unwrap_err();
        assert_eq!(err, BatchError::OverlappingRanges { start: 2 });
    }

    #[test]
    fn subsets_of_one_primitive_share_a_vertex_range() {
        let material = crate::resources::material::MaterialRef::new(
            crate::resources::material::Material::from_display_color(Vec3::ONE, false),
        );
        let mut cell = Cell::new(material, input("/a", 3));
        let mut second = input("/a", 3);
        second.subset_index = 1;
        cell.push(second);
        cell.push(input("/b", 3));

        let (mappings, vertex_count) = layout_cell(&cell);
        assert_eq!(vertex_count, 6);
        assert_eq!(mappings[&PrimPath::new("/b")].offsets.as_slice(), &[3]);

        let indices = build_index_buffer(&cell, &mappings, false);
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 3, 4, 5]);
    }
}
