//! Greedy merging of neighbouring small polygons.
//!
//! Each closed ring is summarised by its four extreme vertices. The relative
//! placement of the two summaries picks which extremes face each other; when
//! the facing gap is small enough the rings are spliced at those extremes.

use crate::kernel::Vertex;

const MIN_LAT: usize = 0;
const MAX_LAT: usize = 1;
const MIN_LON: usize = 2;
const MAX_LON: usize = 3;

/// Where the second polygon lies relative to the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    UpperLeft,
    UpperRight,
    LowerLeft,
    LowerRight,
    Up,
    Down,
    Left,
    Right,
    /// Bounding extents overlap on both axes; never merged.
    Overlapping,
}

/// Indices of min lat, max lat, min lon, max lon. Ties go to the last vertex.
fn extrema<T: Vertex>(ring: &[T]) -> [usize; 4] {
    let mut idx = [0; 4];
    for (j, v) in ring.iter().enumerate() {
        if v.lat() <= ring[idx[MIN_LAT]].lat() {
            idx[MIN_LAT] = j;
        }
        if v.lat() >= ring[idx[MAX_LAT]].lat() {
            idx[MAX_LAT] = j;
        }
        if v.lon() <= ring[idx[MIN_LON]].lon() {
            idx[MIN_LON] = j;
        }
        if v.lon() >= ring[idx[MAX_LON]].lon() {
            idx[MAX_LON] = j;
        }
    }
    idx
}

pub fn placement<T: Vertex>(one: &[T], two: &[T]) -> Placement {
    let (e1, e2) = (extrema(one), extrema(two));
    placement_of(one, &e1, two, &e2)
}

fn placement_of<T: Vertex>(one: &[T], e1: &[usize; 4], two: &[T], e2: &[usize; 4]) -> Placement {
    let above = two[e2[MIN_LAT]].lat() >= one[e1[MAX_LAT]].lat();
    let below = two[e2[MAX_LAT]].lat() <= one[e1[MIN_LAT]].lat();
    let left = two[e2[MAX_LON]].lon() <= one[e1[MIN_LON]].lon();
    let right = two[e2[MIN_LON]].lon() >= one[e1[MAX_LON]].lon();

    match (above, below, left, right) {
        (true, _, true, _) => Placement::UpperLeft,
        (true, _, _, true) => Placement::UpperRight,
        (_, true, true, _) => Placement::LowerLeft,
        (_, true, _, true) => Placement::LowerRight,
        (true, ..) => Placement::Up,
        (_, true, ..) => Placement::Down,
        (_, _, true, _) => Placement::Left,
        (.., true) => Placement::Right,
        _ => Placement::Overlapping,
    }
}

/// Facing pair of extremes for a diagonal placement; `east` tells which way
/// the first ring's splice vertex moves when the pair coincides.
#[derive(Clone, Copy)]
struct Facing {
    one: usize,
    two: usize,
    east: bool,
}

fn open_ring<T: Vertex>(ring: &[T]) -> &[T] {
    match (ring.first(), ring.last()) {
        (Some(a), Some(b)) if ring.len() > 1 && a.pos() == b.pos() => &ring[..ring.len() - 1],
        _ => ring,
    }
}

/// Splice two closed rings into one when they are at most `threshold` apart.
///
/// Returns `None` when the rings overlap, are too far apart, or the splice
/// degenerates.
pub fn try_merge<T: Vertex>(one: &[T], two: &[T], threshold: f64) -> Option<Vec<T>> {
    let a = open_ring(one);
    let b = open_ring(two);
    if a.len() < 3 || b.len() < 3 {
        return None;
    }
    let mut e1 = extrema(a);
    let mut e2 = extrema(b);
    let gap = |i: usize, k: usize| a[i].pos().distance(b[k].pos());

    // (from, to) walked on the first ring, then (from, to) on the second
    let splice = match placement_of(a, &e1, b, &e2) {
        Placement::Overlapping => return None,
        Placement::Up => {
            (gap(e1[MAX_LAT], e2[MIN_LAT]) <= threshold)
                .then_some([MAX_LON, MIN_LON, MIN_LON, MAX_LON])?
        }
        Placement::Down => {
            (gap(e1[MIN_LAT], e2[MAX_LAT]) <= threshold)
                .then_some([MIN_LON, MAX_LON, MAX_LON, MIN_LON])?
        }
        Placement::Left => {
            (gap(e1[MIN_LON], e2[MAX_LON]) <= threshold)
                .then_some([MAX_LAT, MIN_LAT, MIN_LAT, MAX_LAT])?
        }
        Placement::Right => {
            (gap(e1[MAX_LON], e2[MIN_LON]) <= threshold)
                .then_some([MIN_LAT, MAX_LAT, MAX_LAT, MIN_LAT])?
        }
        diagonal => {
            let (first, second, order) = match diagonal {
                Placement::UpperLeft => (
                    Facing { one: MAX_LAT, two: MAX_LON, east: true },
                    Facing { one: MIN_LON, two: MIN_LAT, east: false },
                    [MAX_LAT, MIN_LON, MIN_LAT, MAX_LON],
                ),
                Placement::UpperRight => (
                    Facing { one: MAX_LAT, two: MIN_LON, east: false },
                    Facing { one: MAX_LON, two: MIN_LAT, east: true },
                    [MAX_LON, MAX_LAT, MIN_LON, MIN_LAT],
                ),
                Placement::LowerLeft => (
                    Facing { one: MIN_LON, two: MAX_LAT, east: false },
                    Facing { one: MIN_LAT, two: MAX_LON, east: true },
                    [MIN_LON, MIN_LAT, MAX_LON, MAX_LAT],
                ),
                _ => (
                    Facing { one: MAX_LON, two: MAX_LAT, east: true },
                    Facing { one: MIN_LAT, two: MIN_LON, east: false },
                    [MIN_LAT, MAX_LON, MAX_LAT, MIN_LON],
                ),
            };
            if gap(e1[first.one], e2[first.two]) > threshold
                && gap(e1[second.one], e2[second.two]) > threshold
            {
                return None;
            }
            for facing in [first, second] {
                if a[e1[facing.one]].pos() == b[e2[facing.two]].pos() {
                    step_apart(a, &mut e1[facing.one], b, &mut e2[facing.two], facing.east);
                    break;
                }
            }
            order
        }
    };

    let mut merged = Vec::with_capacity(a.len() + b.len() + 1);
    walk(a, e1[splice[0]], e1[splice[1]], &mut merged);
    walk(b, e2[splice[2]], e2[splice[3]], &mut merged);
    merged.push(merged[0].clone());
    crate::clip::dedup_positions(&mut merged);

    (merged.len() >= 4).then_some(merged)
}

/// Move a shared splice vertex off the contact point: the first ring steps
/// to the neighbour further east (or west), the second ring the other way
/// round its own ring.
fn step_apart<T: Vertex>(a: &[T], i: &mut usize, b: &[T], k: &mut usize, east: bool) {
    let (m, n) = (a.len(), b.len());
    let prev = (*i + m - 1) % m;
    let next = (*i + 1) % m;
    let take_prev = if east {
        a[prev].lon() > a[next].lon()
    } else {
        a[prev].lon() < a[next].lon()
    };
    if take_prev {
        *i = prev;
        *k = (*k + 1) % n;
    } else {
        *i = next;
        *k = (*k + n - 1) % n;
    }
}

/// Push `ring[from..=to]` walking forward with wrap-around; `from == to`
/// walks the full ring back to the start.
fn walk<T: Vertex>(ring: &[T], from: usize, to: usize, out: &mut Vec<T>) {
    let n = ring.len();
    let mut i = from;
    out.push(ring[i].clone());
    loop {
        i = (i + 1) % n;
        out.push(ring[i].clone());
        if i == to {
            break;
        }
    }
}
