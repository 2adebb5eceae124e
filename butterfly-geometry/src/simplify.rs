//! Line simplification: Douglas-Peucker and Visvalingam-Whyatt.
//!
//! Both return the indices of the retained vertices, in input order, always
//! including the first and last vertex.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::kernel::{segment_intersection, triangle_area, Vec2};

/// Douglas-Peucker with an explicit work stack.
///
/// A span is split at its first farthest vertex whenever that distance
/// exceeds `epsilon` less a rounding band.
pub fn douglas_peucker(points: &[Vec2], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 {
        return (0..n).collect();
    }

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;

    let mut spans = vec![(0, n - 1)];
    while let Some((start, end)) = spans.pop() {
        let mut index = start;
        let mut max = 0.0;
        for i in start + 1..end {
            let dist = points[i].perpendicular_distance(points[start], points[end]);
            if dist > max {
                index = i;
                max = dist;
            }
        }
        if index > start && max > epsilon - f64::EPSILON {
            keep[index] = true;
            spans.push((start, index));
            spans.push((index, end));
        }
    }

    (0..n).filter(|&i| keep[i]).collect()
}

/// Number of vertices Visvalingam-Whyatt retains for a line of `size`
/// vertices at retention fraction `pct`. Lines under 5 vertices are kept whole.
pub fn vw_keep(size: usize, pct: f64) -> usize {
    if size < 5 {
        size
    } else {
        ((size as f64 * pct).floor() as usize).clamp(2, size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    area: f64,
    index: usize,
    generation: u32,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    // BinaryHeap is a max-heap: smallest area first, then lowest index.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .area
            .total_cmp(&self.area)
            .then_with(|| other.index.cmp(&self.index))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Chain<'a> {
    points: &'a [Vec2],
    prev: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
}

impl Chain<'_> {
    /// Triangle area of `i` with its live neighbours, less the overlap with
    /// the following vertex's triangle where the two shortcut chords cross.
    fn effective_area(&self, i: usize) -> Option<f64> {
        let p = self.prev[i]?;
        let n = self.next[i]?;
        let pts = self.points;
        let mut area = triangle_area(pts[p], pts[i], pts[n]);

        if let Some(nn) = self.next[n] {
            if let Some(cross) = segment_intersection(pts[p], pts[n], pts[i], pts[nn]) {
                area -= triangle_area(pts[i], cross, pts[n]);
            }
        }
        Some(area.max(0.0))
    }
}

/// Visvalingam-Whyatt reducing the line to `keep` vertices.
///
/// After each removal the areas of every vertex whose neighbourhood changed
/// are recomputed before the next selection.
pub fn visvalingam_whyatt(points: &[Vec2], keep: usize) -> Vec<usize> {
    let n = points.len();
    let keep = keep.max(2);
    if n < 5 || n <= keep {
        return (0..n).collect();
    }

    let mut chain = Chain {
        points,
        prev: (0..n).map(|i| i.checked_sub(1)).collect(),
        next: (0..n).map(|i| (i + 1 < n).then_some(i + 1)).collect(),
    };
    let mut generation = vec![0u32; n];
    let mut heap = BinaryHeap::with_capacity(n);
    for i in 1..n - 1 {
        if let Some(area) = chain.effective_area(i) {
            heap.push(Candidate { area, index: i, generation: 0 });
        }
    }

    let mut alive = n;
    let mut removed = vec![false; n];
    while alive > keep {
        let Some(top) = heap.pop() else { break };
        if removed[top.index] || top.generation != generation[top.index] {
            continue;
        }
        let i = top.index;
        let (Some(p), Some(nx)) = (chain.prev[i], chain.next[i]) else {
            continue;
        };
        removed[i] = true;
        alive -= 1;
        chain.next[p] = Some(nx);
        chain.prev[nx] = Some(p);

        let mut touched = vec![p, nx];
        if let Some(pp) = chain.prev[p] {
            touched.push(pp);
        }
        for t in touched {
            if let Some(area) = chain.effective_area(t) {
                generation[t] += 1;
                heap.push(Candidate { area, index: t, generation: generation[t] });
            }
        }
    }

    (0..n).filter(|&i| !removed[i]).collect()
}
