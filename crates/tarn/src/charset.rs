//! Sets of input symbols stored as ordered, disjoint code point ranges.
//!
//! Symbol alphabets span the whole code point space but are sparse, so a
//! range representation keeps storage compact and makes the set algebra
//! needed for alphabet refinement a linear merge of sorted sequences.

/// One past the largest code point.
pub const SYMBOL_LIMIT: u32 = 0x11_0000;

/// A half-open range `[lo, hi)` of code points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolRange {
    pub lo: u32,
    pub hi: u32,
}

impl SymbolRange {
    pub fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    pub fn single(symbol: u32) -> Self {
        Self {
            lo: symbol,
            hi: symbol + 1,
        }
    }

    pub fn all() -> Self {
        Self {
            lo: 0,
            hi: SYMBOL_LIMIT,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }

    pub fn contains(&self, symbol: u32) -> bool {
        self.lo <= symbol && symbol < self.hi
    }
}

/// A canonical set of symbol ranges: strictly ordered, non-overlapping and
/// non-adjacent. Every operation restores the invariant before returning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RangeSet {
    ranges: Vec<SymbolRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(symbol: u32) -> Self {
        Self::from(SymbolRange::single(symbol))
    }

    pub fn all() -> Self {
        Self::from(SymbolRange::all())
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn ranges(&self) -> &[SymbolRange] {
        &self.ranges
    }

    /// The smallest symbol in the set; `None` when empty.
    pub fn first_symbol(&self) -> Option<u32> {
        self.ranges.first().map(|r| r.lo)
    }

    pub fn insert(&mut self, range: SymbolRange) {
        if range.is_empty() {
            return;
        }
        // Anything whose upper end reaches the new range (including exact
        // adjacency) must be folded into it.
        let start = self.ranges.partition_point(|r| r.hi < range.lo);
        let end = self.ranges.partition_point(|r| r.lo <= range.hi);
        if start == end {
            self.ranges.insert(start, range);
            return;
        }
        let merged = SymbolRange {
            lo: range.lo.min(self.ranges[start].lo),
            hi: range.hi.max(self.ranges[end - 1].hi),
        };
        self.ranges.splice(start..end, Some(merged));
    }

    pub fn remove(&mut self, range: SymbolRange) {
        if range.is_empty() {
            return;
        }
        let start = self.ranges.partition_point(|r| r.hi <= range.lo);
        let end = self.ranges.partition_point(|r| r.lo < range.hi);
        if start == end {
            return;
        }
        let first = self.ranges[start];
        let last = self.ranges[end - 1];
        let mut keep = Vec::with_capacity(2);
        if first.lo < range.lo {
            keep.push(SymbolRange {
                lo: first.lo,
                hi: range.lo,
            });
        }
        if last.hi > range.hi {
            keep.push(SymbolRange {
                lo: range.hi,
                hi: last.hi,
            });
        }
        self.ranges.splice(start..end, keep);
    }

    /// Binary search on range starts.
    pub fn contains(&self, symbol: u32) -> bool {
        let idx = self.ranges.partition_point(|r| r.lo <= symbol);
        idx > 0 && self.ranges[idx - 1].contains(symbol)
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = Vec::with_capacity(self.ranges.len() + other.ranges.len());
        let (mut a, mut b) = (self.ranges.iter().peekable(), other.ranges.iter().peekable());
        let mut pending: Option<SymbolRange> = None;
        loop {
            let next = match (a.peek(), b.peek()) {
                (Some(&&ra), Some(&&rb)) => {
                    if ra.lo <= rb.lo {
                        a.next();
                        ra
                    } else {
                        b.next();
                        rb
                    }
                }
                (Some(&&ra), None) => {
                    a.next();
                    ra
                }
                (None, Some(&&rb)) => {
                    b.next();
                    rb
                }
                (None, None) => break,
            };
            match pending {
                Some(ref mut current) if next.lo <= current.hi => {
                    current.hi = current.hi.max(next.hi);
                }
                Some(current) => {
                    out.push(current);
                    pending = Some(next);
                }
                None => pending = Some(next),
            }
        }
        out.extend(pending);
        Self { ranges: out }
    }

    pub fn intersect(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (ra, rb) = (self.ranges[i], other.ranges[j]);
            let lo = ra.lo.max(rb.lo);
            let hi = ra.hi.min(rb.hi);
            if lo < hi {
                out.push(SymbolRange { lo, hi });
            }
            if ra.hi <= rb.hi {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self { ranges: out }
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut out = Vec::new();
        let mut j = 0;
        for &range in &self.ranges {
            let mut lo = range.lo;
            while j < other.ranges.len() && other.ranges[j].hi <= lo {
                j += 1;
            }
            let mut k = j;
            while k < other.ranges.len() && other.ranges[k].lo < range.hi {
                let cut = other.ranges[k];
                if cut.lo > lo {
                    out.push(SymbolRange {
                        lo,
                        hi: cut.lo.min(range.hi),
                    });
                }
                lo = lo.max(cut.hi);
                if lo >= range.hi {
                    break;
                }
                k += 1;
            }
            if lo < range.hi {
                out.push(SymbolRange { lo, hi: range.hi });
            }
        }
        Self { ranges: out }
    }

    /// All symbols, in order. Only sensible for small sets (tests).
    pub fn symbols(&self) -> impl Iterator<Item = u32> + '_ {
        self.ranges.iter().flat_map(|r| r.lo..r.hi)
    }
}

impl From<SymbolRange> for RangeSet {
    fn from(range: SymbolRange) -> Self {
        let mut set = Self::new();
        set.insert(range);
        set
    }
}

impl FromIterator<SymbolRange> for RangeSet {
    fn from_iter<I: IntoIterator<Item = SymbolRange>>(iter: I) -> Self {
        let mut set = Self::new();
        for range in iter {
            set.insert(range);
        }
        set
    }
}
