//! Per-position read depth bucketed by match class and strand.

use crate::error::{try_zeroed, Error, Result};
use crate::mapping::MappingClass;
use crate::request::DesiredData;
use serde::{Deserialize, Serialize};

/// Forward/reverse counts for the three inclusive match classes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassCounts {
    pub perfect_fwd: Vec<u32>,
    pub perfect_rev: Vec<u32>,
    pub best_fwd: Vec<u32>,
    pub best_rev: Vec<u32>,
    pub common_fwd: Vec<u32>,
    pub common_rev: Vec<u32>,
}

impl ClassCounts {
    pub fn zeroed(len: usize) -> Result<Self> {
        Ok(Self {
            perfect_fwd: try_zeroed(len)?,
            perfect_rev: try_zeroed(len)?,
            best_fwd: try_zeroed(len)?,
            best_rev: try_zeroed(len)?,
            common_fwd: try_zeroed(len)?,
            common_rev: try_zeroed(len)?,
        })
    }

    pub fn len(&self) -> usize {
        self.common_fwd.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add `count` at `idx`, saturating at `u32::MAX`. A perfect match also
    /// counts as best and common match, a best match also counts as common match.
    pub fn add(&mut self, idx: usize, class: MappingClass, is_forward: bool, count: u32) {
        let (perfect, best, common) = if is_forward {
            (&mut self.perfect_fwd, &mut self.best_fwd, &mut self.common_fwd)
        } else {
            (&mut self.perfect_rev, &mut self.best_rev, &mut self.common_rev)
        };
        if class == MappingClass::Perfect {
            perfect[idx] = perfect[idx].saturating_add(count);
        }
        if class <= MappingClass::BestMatch {
            best[idx] = best[idx].saturating_add(count);
        }
        common[idx] = common[idx].saturating_add(count);
    }

    pub fn total(&self, idx: usize) -> u32 {
        self.common_fwd[idx].saturating_add(self.common_rev[idx])
    }

    fn arrays(&self) -> [&Vec<u32>; 6] {
        [
            &self.perfect_fwd,
            &self.perfect_rev,
            &self.best_fwd,
            &self.best_rev,
            &self.common_fwd,
            &self.common_rev,
        ]
    }

    /// Per-position `|a - b|` on every array.
    pub fn absolute_difference(a: &ClassCounts, b: &ClassCounts) -> Result<ClassCounts> {
        if a.len() != b.len() {
            return Err(Error::MismatchedLengths {
                left: a.len(),
                right: b.len(),
            });
        }
        let diff = |x: &Vec<u32>, y: &Vec<u32>| -> Vec<u32> {
            x.iter().zip(y).map(|(&x, &y)| x.abs_diff(y)).collect()
        };
        let [a0, a1, a2, a3, a4, a5] = a.arrays();
        let [b0, b1, b2, b3, b4, b5] = b.arrays();
        Ok(ClassCounts {
            perfect_fwd: diff(a0, b0),
            perfect_rev: diff(a1, b1),
            best_fwd: diff(a2, b2),
            best_rev: diff(a3, b3),
            common_fwd: diff(a4, b4),
            common_rev: diff(a5, b5),
        })
    }

    /// Copy `len` positions of `src` starting at `src_offset` to `dst_offset`.
    pub fn copy_range(&mut self, dst_offset: usize, src: &ClassCounts, src_offset: usize, len: usize) {
        let copy = |dst: &mut Vec<u32>, values: &Vec<u32>| {
            dst[dst_offset..dst_offset + len].copy_from_slice(&values[src_offset..src_offset + len]);
        };
        copy(&mut self.perfect_fwd, &src.perfect_fwd);
        copy(&mut self.perfect_rev, &src.perfect_rev);
        copy(&mut self.best_fwd, &src.best_fwd);
        copy(&mut self.best_rev, &src.best_rev);
        copy(&mut self.common_fwd, &src.common_fwd);
        copy(&mut self.common_rev, &src.common_rev);
    }

    /// Copy of `len` positions starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<ClassCounts> {
        let end = offset + len;
        if end > self.len() {
            return Err(Error::MismatchedLengths {
                left: end,
                right: self.len(),
            });
        }
        let copy = |values: &Vec<u32>| -> Result<Vec<u32>> {
            let mut out = Vec::new();
            out.try_reserve_exact(len)?;
            out.extend_from_slice(&values[offset..end]);
            Ok(out)
        };
        Ok(ClassCounts {
            perfect_fwd: copy(&self.perfect_fwd)?,
            perfect_rev: copy(&self.perfect_rev)?,
            best_fwd: copy(&self.best_fwd)?,
            best_rev: copy(&self.best_rev)?,
            common_fwd: copy(&self.common_fwd)?,
            common_rev: copy(&self.common_rev)?,
        })
    }
}

/// Raw counts of both tracks of a two-track coverage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoTrackCounts {
    pub track1: ClassCounts,
    pub track2: ClassCounts,
}

/// Coverage of the inclusive interval `[left_bound, right_bound]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    left_bound: i64,
    right_bound: i64,
    counts: ClassCounts,
    two_tracks: Option<TwoTrackCounts>,
}

impl Coverage {
    pub fn new(left_bound: i64, right_bound: i64) -> Result<Self> {
        if left_bound > right_bound {
            return Err(Error::InvalidInterval {
                from: left_bound,
                to: right_bound,
            });
        }
        let width = (right_bound - left_bound + 1) as usize;
        Ok(Self {
            left_bound,
            right_bound,
            counts: ClassCounts::zeroed(width)?,
            two_tracks: None,
        })
    }

    pub fn from_counts(left_bound: i64, right_bound: i64, counts: ClassCounts) -> Result<Self> {
        if left_bound > right_bound {
            return Err(Error::InvalidInterval {
                from: left_bound,
                to: right_bound,
            });
        }
        let width = (right_bound - left_bound + 1) as usize;
        if counts.len() != width {
            return Err(Error::MismatchedLengths {
                left: counts.len(),
                right: width,
            });
        }
        Ok(Self {
            left_bound,
            right_bound,
            counts,
            two_tracks: None,
        })
    }

    /// Combine two coverages of the same interval. The combined counts are the
    /// per-position absolute difference of the two tracks, the raw counts are kept.
    pub fn two_track(track1: Coverage, track2: Coverage) -> Result<Self> {
        if track1.left_bound != track2.left_bound || track1.right_bound != track2.right_bound {
            return Err(Error::MismatchedLengths {
                left: track1.width(),
                right: track2.width(),
            });
        }
        let counts = ClassCounts::absolute_difference(&track1.counts, &track2.counts)?;
        Ok(Self {
            left_bound: track1.left_bound,
            right_bound: track1.right_bound,
            counts,
            two_tracks: Some(TwoTrackCounts {
                track1: track1.counts,
                track2: track2.counts,
            }),
        })
    }

    pub fn left_bound(&self) -> i64 {
        self.left_bound
    }

    pub fn right_bound(&self) -> i64 {
        self.right_bound
    }

    pub fn width(&self) -> usize {
        self.counts.len()
    }

    pub fn counts(&self) -> &ClassCounts {
        &self.counts
    }

    pub fn two_tracks(&self) -> Option<&TwoTrackCounts> {
        self.two_tracks.as_ref()
    }

    pub fn is_two_track(&self) -> bool {
        self.two_tracks.is_some()
    }

    pub fn covers_bounds(&self, from: i64, to: i64) -> bool {
        self.left_bound <= from && to <= self.right_bound
    }

    pub fn index_of(&self, position: i64) -> Option<usize> {
        if position < self.left_bound || position > self.right_bound {
            None
        } else {
            Some((position - self.left_bound) as usize)
        }
    }

    /// Add `count` at `position`; positions outside the interval are ignored.
    pub fn add(&mut self, position: i64, class: MappingClass, is_forward: bool, count: u32) {
        if let Some(idx) = self.index_of(position) {
            self.counts.add(idx, class, is_forward, count);
        }
    }

    /// Add `count` to every position of `[from, to]` inside the interval.
    pub fn add_range(&mut self, from: i64, to: i64, class: MappingClass, is_forward: bool, count: u32) {
        let from = from.max(self.left_bound);
        let to = to.min(self.right_bound);
        for position in from..=to {
            let idx = (position - self.left_bound) as usize;
            self.counts.add(idx, class, is_forward, count);
        }
    }

    pub fn total_at(&self, position: i64) -> Option<u32> {
        self.index_of(position).map(|idx| self.counts.total(idx))
    }

    /// Coverage restricted to `[from, to]`, which must lie within the interval.
    pub fn sub_coverage(&self, from: i64, to: i64) -> Result<Coverage> {
        if from > to || !self.covers_bounds(from, to) {
            return Err(Error::InvalidInterval { from, to });
        }
        let offset = (from - self.left_bound) as usize;
        let len = (to - from + 1) as usize;
        let two_tracks = match &self.two_tracks {
            Some(tracks) => Some(TwoTrackCounts {
                track1: tracks.track1.slice(offset, len)?,
                track2: tracks.track2.slice(offset, len)?,
            }),
            None => None,
        };
        Ok(Coverage {
            left_bound: from,
            right_bound: to,
            counts: self.counts.slice(offset, len)?,
            two_tracks,
        })
    }

    /// View of the coverage matching the desired data of a request. For two-track
    /// coverages `Track1`/`Track2` select the raw counts of one track.
    pub fn select(&self, desired: DesiredData) -> Coverage {
        let track_counts = match (&self.two_tracks, desired) {
            (Some(tracks), DesiredData::Track1) => Some(&tracks.track1),
            (Some(tracks), DesiredData::Track2) => Some(&tracks.track2),
            _ => None,
        };
        match track_counts {
            Some(counts) => Coverage {
                left_bound: self.left_bound,
                right_bound: self.right_bound,
                counts: counts.clone(),
                two_tracks: None,
            },
            None => self.clone(),
        }
    }
}
