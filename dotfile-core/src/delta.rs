//! Line-level deltas between two versions of a file
//!
//! Two products share one line alignment (linear-space Myers LCS):
//! - [`Patch`]: the binary edit script stored (compressed) in every non-initial commit
//! - [`FileDiff`]: a human-readable diff for presentation only

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Unchanged lines shown around a change in [`FileDiff`]'s rendering
const CONTEXT_LINES: usize = 3;

/// A run of aligned lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOp {
    Equal { old: usize, new: usize, len: usize },
    Delete { old: usize, len: usize },
    Insert { new: usize, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Equal,
    Delete,
    Insert,
}

/// Split content into lines, keeping each line's terminator
pub fn split_lines(content: &[u8]) -> Vec<&[u8]> {
    content.split_inclusive(|b| *b == b'\n').collect()
}

/// Align two line sequences into runs of equal, deleted and inserted lines
pub fn line_ops(old: &[&[u8]], new: &[&[u8]]) -> Vec<LineOp> {
    coalesce(&deletes_first(&myers(old, new)))
}

/// Within each run of changed lines, list every deletion before the insertions
fn deletes_first(steps: &[Step]) -> Vec<Step> {
    let mut out = Vec::with_capacity(steps.len());
    let (mut deletes, mut inserts) = (0, 0);
    for step in steps {
        match step {
            Step::Delete => deletes += 1,
            Step::Insert => inserts += 1,
            Step::Equal => {
                out.extend(std::iter::repeat_n(Step::Delete, deletes));
                out.extend(std::iter::repeat_n(Step::Insert, inserts));
                (deletes, inserts) = (0, 0);
                out.push(Step::Equal);
            }
        }
    }
    out.extend(std::iter::repeat_n(Step::Delete, deletes));
    out.extend(std::iter::repeat_n(Step::Insert, inserts));
    out
}

/// Linear-space Myers: split at the middle snake and recurse on both halves
fn myers(a: &[&[u8]], b: &[&[u8]]) -> Vec<Step> {
    let max_d = max_d(a.len(), b.len());
    let mut vf = V::new(max_d);
    let mut vb = V::new(max_d);
    let mut steps = Vec::with_capacity(a.len() + b.len());
    conquer(a, b, &mut vf, &mut vb, &mut steps);
    steps
}

fn max_d(n: usize, m: usize) -> usize {
    (n + m + 1) / 2 + 1
}

/// Furthest reaching x per diagonal k, indexed by signed k
struct V {
    offset: isize,
    v: Vec<usize>,
}

impl V {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            v: vec![0; 2 * max_d],
        }
    }
}

impl Index<isize> for V {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.v[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for V {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.v[(k + self.offset) as usize]
    }
}

fn common_prefix(a: &[&[u8]], b: &[&[u8]]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[&[u8]], b: &[&[u8]]) -> usize {
    a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count()
}

fn conquer(a: &[&[u8]], b: &[&[u8]], vf: &mut V, vb: &mut V, steps: &mut Vec<Step>) {
    let prefix = common_prefix(a, b);
    steps.extend(std::iter::repeat_n(Step::Equal, prefix));
    let (a, b) = (&a[prefix..], &b[prefix..]);
    let suffix = common_suffix(a, b);
    let (a, b) = (&a[..a.len() - suffix], &b[..b.len() - suffix]);

    if a.is_empty() {
        steps.extend(std::iter::repeat_n(Step::Insert, b.len()));
    } else if b.is_empty() {
        steps.extend(std::iter::repeat_n(Step::Delete, a.len()));
    } else if let Some((x, y)) = middle_snake(a, b, vf, vb) {
        conquer(&a[..x], &b[..y], vf, vb, steps);
        conquer(&a[x..], &b[y..], vf, vb, steps);
    } else {
        steps.extend(std::iter::repeat_n(Step::Delete, a.len()));
        steps.extend(std::iter::repeat_n(Step::Insert, b.len()));
    }

    steps.extend(std::iter::repeat_n(Step::Equal, suffix));
}

/// Point where the forward and backward searches meet, relative to `a` and `b`
fn middle_snake(a: &[&[u8]], b: &[&[u8]], vf: &mut V, vb: &mut V) -> Option<(usize, usize)> {
    let n = a.len();
    let m = b.len();
    let delta = n as isize - m as isize;
    let odd = (delta & 1) == 1;
    vf[1] = 0;
    vb[1] = 0;

    for d in 0..max_d(n, m) as isize {
        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vf[k - 1] < vf[k + 1]) {
                vf[k + 1]
            } else {
                vf[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix(&a[x..], &b[y..]);
            }
            vf[k] = x;
            if odd && (k - delta).abs() < d && vf[k] + vb[-(k - delta)] >= n {
                return Some((x0, y0));
            }
            k -= 2;
        }

        let mut k = d;
        while k >= -d {
            let mut x = if k == -d || (k != d && vb[k - 1] < vb[k + 1]) {
                vb[k + 1]
            } else {
                vb[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let advance = common_suffix(&a[..n - x], &b[..m - y]);
                x += advance;
                y += advance;
            }
            vb[k] = x;
            if !odd && (k - delta).abs() <= d && vb[k] + vf[-(k - delta)] >= n {
                return Some((n - x, m - y));
            }
            k -= 2;
        }
    }
    None
}

fn coalesce(steps: &[Step]) -> Vec<LineOp> {
    let mut ops: Vec<LineOp> = Vec::new();
    let (mut old, mut new) = (0usize, 0usize);
    for step in steps {
        match (step, ops.last_mut()) {
            (Step::Equal, Some(LineOp::Equal { len, .. }))
            | (Step::Delete, Some(LineOp::Delete { len, .. }))
            | (Step::Insert, Some(LineOp::Insert { len, .. })) => *len += 1,
            (Step::Equal, _) => ops.push(LineOp::Equal { old, new, len: 1 }),
            (Step::Delete, _) => ops.push(LineOp::Delete { old, len: 1 }),
            (Step::Insert, _) => ops.push(LineOp::Insert { new, len: 1 }),
        }
        match step {
            Step::Equal => {
                old += 1;
                new += 1;
            }
            Step::Delete => old += 1,
            Step::Insert => new += 1,
        }
    }
    ops
}

/// Errors applying a [`Patch`] to a base it was not computed from
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("base is {actual} bytes, patch expects {expected}")]
    BaseLength { expected: u64, actual: u64 },

    #[error("copy of {len} bytes at {start} exceeds base of {base_len} bytes")]
    OutOfRange { start: u64, len: u64, base_len: u64 },
}

/// One instruction of a [`Patch`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOp {
    /// Copy a byte range of the base
    Copy { start: u64, len: u64 },
    /// Emit new bytes
    Insert(Vec<u8>),
}

/// Binary edit script turning one version's content into the next
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub base_len: u64,
    pub ops: Vec<PatchOp>,
}

impl Patch {
    /// Compute the patch transforming `old` into `new`
    pub fn compute(old: &[u8], new: &[u8]) -> Self {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);

        let mut old_offsets = Vec::with_capacity(old_lines.len() + 1);
        let mut pos = 0u64;
        old_offsets.push(pos);
        for line in &old_lines {
            pos += line.len() as u64;
            old_offsets.push(pos);
        }

        let mut ops: Vec<PatchOp> = Vec::new();
        for op in line_ops(&old_lines, &new_lines) {
            match op {
                LineOp::Equal { old, len, .. } => {
                    let start = old_offsets[old];
                    let end = old_offsets[old + len];
                    ops.push(PatchOp::Copy {
                        start,
                        len: end - start,
                    });
                }
                LineOp::Insert { new, len } => {
                    let bytes = new_lines[new..new + len].concat();
                    match ops.last_mut() {
                        Some(PatchOp::Insert(prev)) => prev.extend_from_slice(&bytes),
                        _ => ops.push(PatchOp::Insert(bytes)),
                    }
                }
                LineOp::Delete { .. } => {}
            }
        }

        Self {
            base_len: old.len() as u64,
            ops,
        }
    }

    /// Apply this patch to `base`
    pub fn apply(&self, base: &[u8]) -> Result<Vec<u8>, PatchError> {
        let base_len = base.len() as u64;
        if base_len != self.base_len {
            return Err(PatchError::BaseLength {
                expected: self.base_len,
                actual: base_len,
            });
        }

        let mut out = Vec::with_capacity(base.len());
        for op in &self.ops {
            match op {
                PatchOp::Copy { start, len } => {
                    let end = start
                        .checked_add(*len)
                        .filter(|end| *end <= base_len)
                        .ok_or(PatchError::OutOfRange {
                            start: *start,
                            len: *len,
                            base_len,
                        })?;
                    out.extend_from_slice(&base[*start as usize..end as usize]);
                }
                PatchOp::Insert(bytes) => out.extend_from_slice(bytes),
            }
        }
        Ok(out)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

/// Kind of a [`DiffChunk`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    Unchanged,
    Added,
    Removed,
}

/// A contiguous run of lines with the same kind. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffChunk {
    pub kind: ChunkKind,
    pub old_start: usize,
    pub new_start: usize,
    pub lines: Vec<String>,
}

/// Human-readable line diff between two contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub chunks: Vec<DiffChunk>,
}

impl FileDiff {
    pub fn compute(old: &[u8], new: &[u8]) -> Self {
        let old_lines = split_lines(old);
        let new_lines = split_lines(new);
        let text = |lines: &[&[u8]]| -> Vec<String> {
            lines
                .iter()
                .map(|l| {
                    let l = l.strip_suffix(b"\n").unwrap_or(l);
                    String::from_utf8_lossy(l).into_owned()
                })
                .collect()
        };

        let mut chunks = Vec::new();
        let (mut old_pos, mut new_pos) = (0usize, 0usize);
        for op in line_ops(&old_lines, &new_lines) {
            let chunk = match op {
                LineOp::Equal { old, new, len } => DiffChunk {
                    kind: ChunkKind::Unchanged,
                    old_start: old + 1,
                    new_start: new + 1,
                    lines: text(&old_lines[old..old + len]),
                },
                LineOp::Delete { old, len } => DiffChunk {
                    kind: ChunkKind::Removed,
                    old_start: old + 1,
                    new_start: new_pos + 1,
                    lines: text(&old_lines[old..old + len]),
                },
                LineOp::Insert { new, len } => DiffChunk {
                    kind: ChunkKind::Added,
                    old_start: old_pos + 1,
                    new_start: new + 1,
                    lines: text(&new_lines[new..new + len]),
                },
            };
            match op {
                LineOp::Equal { len, .. } => {
                    old_pos += len;
                    new_pos += len;
                }
                LineOp::Delete { len, .. } => old_pos += len,
                LineOp::Insert { len, .. } => new_pos += len,
            }
            chunks.push(chunk);
        }
        Self { chunks }
    }

    /// True when both sides have the same lines
    pub fn is_unchanged(&self) -> bool {
        self.chunks.iter().all(|c| c.kind == ChunkKind::Unchanged)
    }

    pub fn added_lines(&self) -> impl Iterator<Item = &str> {
        self.lines_of(ChunkKind::Added)
    }

    pub fn removed_lines(&self) -> impl Iterator<Item = &str> {
        self.lines_of(ChunkKind::Removed)
    }

    fn lines_of(&self, kind: ChunkKind) -> impl Iterator<Item = &str> {
        self.chunks
            .iter()
            .filter(move |c| c.kind == kind)
            .flat_map(|c| c.lines.iter().map(String::as_str))
    }
}

impl fmt::Display for FileDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self.chunks.len().saturating_sub(1);
        for (i, chunk) in self.chunks.iter().enumerate() {
            match chunk.kind {
                ChunkKind::Added => {
                    for line in &chunk.lines {
                        writeln!(f, "+{}", line)?;
                    }
                }
                ChunkKind::Removed => {
                    for line in &chunk.lines {
                        writeln!(f, "-{}", line)?;
                    }
                }
                ChunkKind::Unchanged => {
                    let head = if i == 0 { 0 } else { CONTEXT_LINES };
                    let tail = if i == last { 0 } else { CONTEXT_LINES };
                    if chunk.lines.len() <= head + tail {
                        for line in &chunk.lines {
                            writeln!(f, " {}", line)?;
                        }
                        continue;
                    }
                    for line in &chunk.lines[..head] {
                        writeln!(f, " {}", line)?;
                    }
                    let skip_to = chunk.lines.len() - tail;
                    if i != last {
                        writeln!(
                            f,
                            "@@ -{} +{} @@",
                            chunk.old_start + skip_to,
                            chunk.new_start + skip_to
                        )?;
                    }
                    for line in &chunk.lines[skip_to..] {
                        writeln!(f, " {}", line)?;
                    }
                }
            }
        }
        Ok(())
    }
}
