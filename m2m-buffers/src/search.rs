use crate::error::SearchError;
use smallvec::SmallVec;

/// A single match reported by [`MultiStringSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    /// Index of the matched needle in add order.
    pub needle: usize,
    /// Absolute offset of the match within the scanned window.
    pub offset: usize,
    /// Length of the matched needle.
    pub length: usize,
}

/// Scans a streaming window for several fixed needles in a single pass.
///
/// All needles are considered concurrently; the scan reports the earliest
/// match, breaking ties at the same offset in favor of the longest needle so
/// that compound terminators (CRLF) win over their one-byte constituents.
/// [`MultiStringSearch::unresolved_tail`] tells a streaming caller how many
/// trailing bytes might still become a match once more data arrives, so they
/// can be held back rather than forwarded.
#[derive(Debug, Default)]
pub struct MultiStringSearch {
    needles: SmallVec<[Vec<u8>; 4]>,
    max_needles: usize,
}

impl MultiStringSearch {
    pub fn new(max_needles: usize) -> Self {
        Self {
            needles: SmallVec::new(),
            max_needles,
        }
    }

    /// Registers a needle and returns its index. Empty needles and table
    /// overflow are invalid arguments.
    pub fn add_needle(&mut self, needle: &[u8]) -> Result<usize, SearchError> {
        if needle.is_empty() {
            return Err(SearchError::EmptyNeedle);
        }
        if self.needles.len() >= self.max_needles {
            return Err(SearchError::TableFull);
        }
        self.needles.push(needle.to_vec());
        Ok(self.needles.len() - 1)
    }

    pub fn needle_count(&self) -> usize {
        self.needles.len()
    }

    pub fn needle(&self, i: usize) -> Option<&[u8]> {
        self.needles.get(i).map(|n| n.as_slice())
    }

    pub fn clear(&mut self) {
        self.needles.clear();
    }

    /// Earliest match across all needles at or after `from`. At equal
    /// offsets the longest needle wins.
    pub fn find_from(&self, hay: &[u8], from: usize) -> Option<SearchHit> {
        let mut best: Option<SearchHit> = None;
        for (idx, needle) in self.needles.iter().enumerate() {
            if needle.len() > hay.len() {
                continue;
            }
            let mut pos = from;
            while pos + needle.len() <= hay.len() {
                if &hay[pos..pos + needle.len()] == needle.as_slice() {
                    let better = match best {
                        None => true,
                        Some(b) => {
                            pos < b.offset || (pos == b.offset && needle.len() > b.length)
                        }
                    };
                    if better {
                        best = Some(SearchHit {
                            needle: idx,
                            offset: pos,
                            length: needle.len(),
                        });
                    }
                    break;
                }
                pos += 1;
                // No point scanning past an already-found earlier match.
                if let Some(b) = best {
                    if pos > b.offset {
                        break;
                    }
                }
            }
        }
        best
    }

    /// Number of bytes at the end of `hay` that form a proper prefix of at
    /// least one needle. Those bytes cannot be classified until more data
    /// arrives.
    pub fn unresolved_tail(&self, hay: &[u8]) -> usize {
        let longest = self.needles.iter().map(|n| n.len()).max().unwrap_or(0);
        if longest < 2 {
            return 0;
        }
        let max_k = (longest - 1).min(hay.len());
        for k in (1..=max_k).rev() {
            let tail = &hay[hay.len() - k..];
            for needle in &self.needles {
                if needle.len() > k && &needle[..k] == tail {
                    return k;
                }
            }
        }
        0
    }
}
