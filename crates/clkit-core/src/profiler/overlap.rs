//! Pairwise overlap of event intervals, grouped by event name.

use crate::error::{ClError, Result};

/// Upper-triangular matrix of overlap durations between name ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct OverlapMatrix {
    n: usize,
    cells: Vec<u64>,
}

impl OverlapMatrix {
    pub(crate) fn get(&self, a: usize, b: usize) -> u64 {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        if a == b || b >= self.n { 0 } else { self.cells[a * self.n + b] }
    }

    /// Non-zero entries as `(a, b, duration)` with `a < b`.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (usize, usize, u64)> + '_ {
        (0..self.n).flat_map(move |a| (a + 1..self.n).map(move |b| (a, b, self.cells[a * self.n + b]))).filter(|e| e.2 > 0)
    }

    pub(crate) fn total(&self) -> Result<u64> {
        self.entries()
            .try_fold(0u64, |acc, (_, _, d)| acc.checked_add(d))
            .ok_or_else(|| ClError::Overflow("total overlap time".into()))
    }
}

/// Sweep over `(name_id, start, end)` intervals. Ties at the same instant
/// close before they open, then go by name id. Empty intervals are ignored.
pub(crate) fn compute(n_names: usize, intervals: impl IntoIterator<Item = (usize, u64, u64)>) -> Result<OverlapMatrix> {
    // (time, 0 = close / 1 = open, name id)
    let mut points: Vec<(u64, u8, usize)> = Vec::new();
    for (id, start, end) in intervals {
        if end > start {
            points.push((start, 1, id));
            points.push((end, 0, id));
        }
    }
    points.sort_unstable();

    let mut m = OverlapMatrix { n: n_names, cells: vec![0; n_names * n_names] };
    let mut open_count = vec![0usize; n_names];
    let mut open: Vec<usize> = Vec::new();
    let mut prev = points.first().map_or(0, |p| p.0);

    for (time, kind, id) in points {
        let delta = time - prev;
        if delta > 0 && open.len() > 1 {
            for (i, &a) in open.iter().enumerate() {
                for &b in &open[i + 1..] {
                    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
                    let cell = &mut m.cells[lo * n_names + hi];
                    *cell = cell.checked_add(delta).ok_or_else(|| ClError::Overflow("overlap accumulator".into()))?;
                }
            }
        }
        prev = time;
        if kind == 1 {
            open_count[id] += 1;
            if open_count[id] == 1 {
                open.push(id);
            }
        } else {
            open_count[id] -= 1;
            if open_count[id] == 0 {
                open.retain(|&x| x != id);
            }
        }
    }
    Ok(m)
}
