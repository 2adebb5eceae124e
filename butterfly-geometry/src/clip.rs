//! Splitting ways at tile borders.

use butterfly_common::Result;

use crate::kernel::{BBox, Vertex};

/// Result of clipping one way against one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct Clipped<T> {
    /// Geometry retained in the tile, empty if nothing valid is left.
    pub inside: Vec<T>,
    /// Pieces to be placed on their own.
    pub fragments: Vec<Vec<T>>,
}

struct Run {
    inside: bool,
    members: Vec<usize>,
}

/// Clip `vertices` against `tile`.
///
/// The vertex sequence is cut into maximal runs of inside and outside
/// vertices; each transition gets a synthetic vertex on the tile border.
/// For closed rings (`closed`, first == last) the inside runs are joined into
/// one re-closed ring and every outside run becomes its own closed ring. For
/// lines the first inside run is retained and every other run becomes a
/// fragment. Degenerate pieces are dropped.
pub fn clip<T: Vertex>(vertices: &[T], tile: &BBox, closed: bool) -> Result<Clipped<T>> {
    let ring = if closed && vertices.len() > 1 {
        &vertices[..vertices.len() - 1]
    } else {
        vertices
    };
    let flags: Vec<bool> = ring.iter().map(|v| tile.contains(v.pos())).collect();

    if flags.iter().all(|&f| f) {
        return Ok(Clipped {
            inside: vertices.to_vec(),
            fragments: Vec::new(),
        });
    }
    if flags.iter().all(|&f| !f) {
        return Ok(Clipped {
            inside: Vec::new(),
            fragments: vec![vertices.to_vec()],
        });
    }

    // rings start on a transition so no run wraps around the end
    let m = ring.len();
    let start = if closed {
        (0..m).find(|&k| flags[k] != flags[(k + m - 1) % m]).unwrap_or(0)
    } else {
        0
    };

    let mut runs: Vec<Run> = Vec::new();
    for k in 0..m {
        let i = (start + k) % m;
        match runs.last_mut() {
            Some(run) if run.inside == flags[i] => run.members.push(i),
            _ => runs.push(Run {
                inside: flags[i],
                members: vec![i],
            }),
        }
    }

    let crossing = |a: usize, b: usize| -> Result<T> {
        let (inside, outside) = if flags[a] { (a, b) } else { (b, a) };
        let at = tile.border_crossing(ring[inside].pos(), ring[outside].pos())?;
        Ok(T::synthetic(at.y, at.x))
    };

    let count = runs.len();
    let mut pieces = Vec::with_capacity(count);
    for (k, run) in runs.iter().enumerate() {
        let prev = match k {
            0 if closed => Some(count - 1),
            0 => None,
            _ => Some(k - 1),
        };
        let next = if k + 1 < count {
            Some(k + 1)
        } else if closed {
            Some(0)
        } else {
            None
        };

        let first = run.members[0];
        let last = run.members[run.members.len() - 1];
        let mut piece = Vec::with_capacity(run.members.len() + 3);
        if let Some(p) = prev {
            let before = runs[p].members[runs[p].members.len() - 1];
            piece.push(crossing(before, first)?);
        }
        piece.extend(run.members.iter().map(|&i| ring[i].clone()));
        if let Some(n) = next {
            piece.push(crossing(last, runs[n].members[0])?);
        }
        pieces.push((run.inside, piece));
    }

    let mut clipped = Clipped {
        inside: Vec::new(),
        fragments: Vec::new(),
    };
    if closed {
        for (inside, piece) in pieces {
            if inside {
                clipped.inside.extend(piece);
            } else {
                push_valid(&mut clipped.fragments, close(piece), true);
            }
        }
        clipped.inside = valid_or_empty(close(std::mem::take(&mut clipped.inside)), true);
    } else {
        let mut retained = false;
        for (inside, piece) in pieces {
            if inside && !retained {
                retained = true;
                clipped.inside = valid_or_empty(piece, false);
            } else {
                push_valid(&mut clipped.fragments, piece, false);
            }
        }
    }
    Ok(clipped)
}

fn close<T: Vertex>(mut ring: Vec<T>) -> Vec<T> {
    if let Some(first) = ring.first().cloned() {
        ring.push(first);
    }
    ring
}

/// Drop consecutive vertices at the same position.
pub fn dedup_positions<T: Vertex>(vertices: &mut Vec<T>) {
    vertices.dedup_by(|b, a| a.pos() == b.pos());
}

fn valid_or_empty<T: Vertex>(mut piece: Vec<T>, closed: bool) -> Vec<T> {
    dedup_positions(&mut piece);
    let min = if closed { 4 } else { 2 };
    if piece.len() >= min {
        piece
    } else {
        Vec::new()
    }
}

fn push_valid<T: Vertex>(into: &mut Vec<Vec<T>>, piece: Vec<T>, closed: bool) {
    let piece = valid_or_empty(piece, closed);
    if !piece.is_empty() {
        into.push(piece);
    }
}
