//! Interval queries and the callback contract of the request workers.

use crate::coverage::Coverage;
use crate::error::{Error, Result};
use crate::mapping::{Mapping, ReducedMapping};
use std::fmt;
use std::sync::Arc;

/// Kind of data a request asks for. Workers dispatch on this with `match`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DesiredData {
    #[default]
    Normal,
    MappingsWithDiffs,
    MappingsWithoutDiffs,
    ReducedMappings,
    ReadStarts,
    /// Raw counts of the first track of a two-track coverage worker
    Track1,
    /// Raw counts of the second track of a two-track coverage worker
    Track2,
}

/// Read-class filter applied to every mapping or alignment record a worker returns.
///
/// The classes are independently toggled and combined with an inclusive OR, so a
/// perfect match that is also the best mapping passes when either flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadClassParams {
    pub use_perfect_match: bool,
    pub use_best_match: bool,
    pub use_common_match: bool,
    pub use_only_unique_reads: bool,
}

impl Default for ReadClassParams {
    fn default() -> Self {
        Self {
            use_perfect_match: true,
            use_best_match: true,
            use_common_match: true,
            use_only_unique_reads: false,
        }
    }
}

impl ReadClassParams {
    pub fn new(perfect: bool, best: bool, common: bool, only_unique: bool) -> Self {
        Self {
            use_perfect_match: perfect,
            use_best_match: best,
            use_common_match: common,
            use_only_unique_reads: only_unique,
        }
    }

    pub fn accepts(&self, num_errors: u32, is_best_mapping: bool, mapping_count: u32) -> bool {
        let class_ok = (self.use_perfect_match && num_errors == 0)
            || (self.use_best_match && is_best_mapping)
            || (self.use_common_match && !is_best_mapping);
        class_ok && (!self.use_only_unique_reads || mapping_count == 1)
    }
}

/// Payload handed to a request's sender.
#[derive(Debug, Clone)]
pub enum RequestData {
    Coverage {
        coverage: Arc<Coverage>,
        from: i64,
        to: i64,
        desired: DesiredData,
    },
    Mappings {
        mappings: Vec<Mapping>,
        from: i64,
        to: i64,
        desired: DesiredData,
    },
    ReducedMappings {
        mappings: Vec<ReducedMapping>,
        from: i64,
        to: i64,
    },
}

impl RequestData {
    pub fn bounds(&self) -> (i64, i64) {
        match self {
            RequestData::Coverage { from, to, .. }
            | RequestData::Mappings { from, to, .. }
            | RequestData::ReducedMappings { from, to, .. } => (*from, *to),
        }
    }
}

/// Receiver of worker results.
pub trait ThreadListener: Send + Sync {
    /// Called at most once per executed request.
    fn receive_data(&self, data: RequestData);

    /// Called when executing a request failed. Viewport listeners usually ignore
    /// this, the next scroll re-requests the data anyway.
    fn receive_failure(&self, _error: &Error) {}
}

/// Immutable genomic interval query.
///
/// Coordinates are 1-based and inclusive. For mapping-id sweeps of store-backed
/// tracks the bounds are mapping ids instead of positions.
#[derive(Clone)]
pub struct IntervalRequest {
    visible_from: i64,
    visible_to: i64,
    total_from: i64,
    total_to: i64,
    sender: Arc<dyn ThreadListener>,
    desired: DesiredData,
    read_classes: ReadClassParams,
}

impl IntervalRequest {
    /// Request for exactly the visible interval with `DesiredData::Normal`.
    pub fn new(
        from: i64,
        to: i64,
        sender: Arc<dyn ThreadListener>,
        read_classes: ReadClassParams,
    ) -> Self {
        Self::with_desired(from, to, sender, DesiredData::Normal, read_classes)
    }

    pub fn with_desired(
        from: i64,
        to: i64,
        sender: Arc<dyn ThreadListener>,
        desired: DesiredData,
        read_classes: ReadClassParams,
    ) -> Self {
        Self::with_preload(from, to, from, to, sender, desired, read_classes)
    }

    pub fn with_preload(
        visible_from: i64,
        visible_to: i64,
        total_from: i64,
        total_to: i64,
        sender: Arc<dyn ThreadListener>,
        desired: DesiredData,
        read_classes: ReadClassParams,
    ) -> Self {
        Self {
            visible_from,
            visible_to,
            total_from,
            total_to,
            sender,
            desired,
            read_classes,
        }
    }

    /// Checked variant of [`IntervalRequest::with_preload`].
    pub fn try_new(
        visible_from: i64,
        visible_to: i64,
        total_from: i64,
        total_to: i64,
        sender: Arc<dyn ThreadListener>,
        desired: DesiredData,
        read_classes: ReadClassParams,
    ) -> Result<Self> {
        if visible_from > visible_to {
            return Err(Error::InvalidInterval {
                from: visible_from,
                to: visible_to,
            });
        }
        if total_from > visible_from || total_to < visible_to {
            return Err(Error::InvalidInterval {
                from: total_from,
                to: total_to,
            });
        }
        Ok(Self::with_preload(
            visible_from,
            visible_to,
            total_from,
            total_to,
            sender,
            desired,
            read_classes,
        ))
    }

    pub fn from(&self) -> i64 {
        self.visible_from
    }

    pub fn to(&self) -> i64 {
        self.visible_to
    }

    pub fn total_from(&self) -> i64 {
        self.total_from
    }

    pub fn total_to(&self) -> i64 {
        self.total_to
    }

    pub fn desired(&self) -> DesiredData {
        self.desired
    }

    pub fn read_classes(&self) -> &ReadClassParams {
        &self.read_classes
    }

    pub fn sender(&self) -> &Arc<dyn ThreadListener> {
        &self.sender
    }

    pub fn center(&self) -> i64 {
        (self.visible_from + self.visible_to) / 2
    }

    /// Staleness test: centers may differ by one to tolerate rounding.
    pub fn is_near(&self, other: &IntervalRequest) -> bool {
        (self.center() - other.center()).abs() <= 1
    }
}

impl PartialEq for IntervalRequest {
    fn eq(&self, other: &Self) -> bool {
        self.visible_from == other.visible_from
            && self.visible_to == other.visible_to
            && self.total_from == other.total_from
            && self.total_to == other.total_to
            && self.desired == other.desired
            && self.read_classes == other.read_classes
    }
}

impl fmt::Debug for IntervalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntervalRequest")
            .field("visible", &(self.visible_from, self.visible_to))
            .field("total", &(self.total_from, self.total_to))
            .field("desired", &self.desired)
            .field("read_classes", &self.read_classes)
            .finish()
    }
}
