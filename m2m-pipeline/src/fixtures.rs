//! Instrumented endpoints for exercising pipelines under controlled
//! chunking and back-pressure. These are real sinks/sources, shipped in the
//! library so downstream crates can reuse them in their own test rigs.

use crate::{BufferAccepter, PushResult};
use m2m_buffers::BufferChain;

/// Records how a pipeline treats its offerings: call counts, claim
/// categories, captured bytes, and optional structural expectations.
#[derive(Debug, Default)]
pub struct TestSink {
    capture: BufferChain,
    /// Per-push acceptance budget; `None` is unlimited.
    per_push_limit: Option<usize>,
    reject_all: bool,
    pushes: u64,
    fulls: u64,
    partials: u64,
    rejects: u64,
    /// When set, every claimed push must end with these bytes.
    expected_break: Option<Vec<u8>>,
    break_violations: u64,
    /// When set, the total captured length must land exactly here.
    expected_total: Option<usize>,
}

impl TestSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits how many bytes each individual push may claim.
    pub fn with_push_limit(mut self, limit: usize) -> Self {
        self.per_push_limit = Some(limit);
        self
    }

    /// Requires every claimed push to end with `terminator` (the call-break
    /// expectation used against line codecs).
    pub fn expecting_break(mut self, terminator: &[u8]) -> Self {
        self.expected_break = Some(terminator.to_vec());
        self
    }

    /// Declares how many bytes the whole run is expected to deliver.
    pub fn expecting_total(mut self, total: usize) -> Self {
        self.expected_total = Some(total);
        self
    }

    /// True when the declared total-length expectation is currently met.
    pub fn expectation_met(&self) -> bool {
        self.break_violations == 0
            && self
                .expected_total
                .map(|t| t == self.capture.len())
                .unwrap_or(true)
    }

    pub fn set_reject_all(&mut self, reject: bool) {
        self.reject_all = reject;
    }

    pub fn pushes(&self) -> u64 {
        self.pushes
    }

    pub fn fulls(&self) -> u64 {
        self.fulls
    }

    pub fn partials(&self) -> u64 {
        self.partials
    }

    pub fn rejects(&self) -> u64 {
        self.rejects
    }

    pub fn break_violations(&self) -> u64 {
        self.break_violations
    }

    pub fn captured_len(&self) -> usize {
        self.capture.len()
    }

    pub fn take_captured(&mut self) -> BufferChain {
        std::mem::take(&mut self.capture)
    }

    pub fn captured(&self) -> &BufferChain {
        &self.capture
    }
}

impl BufferAccepter for TestSink {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        self.pushes += 1;
        let offered = chain.len();
        if offered == 0 {
            self.fulls += 1;
            return PushResult::Full;
        }
        if self.reject_all {
            self.rejects += 1;
            return PushResult::Reject;
        }
        let take = self.per_push_limit.unwrap_or(usize::MAX).min(offered);
        if take == 0 {
            self.rejects += 1;
            return PushResult::Reject;
        }
        let mut claimed = BufferChain::new();
        claimed.concat_handoff_limit(chain, take);
        if let Some(term) = &self.expected_break {
            let len = claimed.len();
            let mut tail = vec![0u8; term.len().min(len)];
            claimed.copy_window(len - tail.len(), &mut tail);
            if tail != *term {
                self.break_violations += 1;
            }
        }
        self.capture.concat_handoff(&mut claimed);
        if take == offered {
            self.fulls += 1;
            PushResult::Full
        } else {
            self.partials += 1;
            PushResult::Partial
        }
    }

    fn buffer_available(&self) -> usize {
        if self.reject_all {
            0
        } else {
            self.per_push_limit.unwrap_or(usize::MAX)
        }
    }
}

/// Offers a prepared corpus downstream in caller-controlled chunk sizes,
/// tracking what was accepted.
#[derive(Debug, Default)]
pub struct TestSource {
    backlog: BufferChain,
    pushed: u64,
    accepted_bytes: u64,
}

impl TestSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes to be offered.
    pub fn feed(&mut self, data: &[u8]) {
        self.backlog.append(data);
    }

    pub fn remaining(&self) -> usize {
        self.backlog.len()
    }

    pub fn pushes_made(&self) -> u64 {
        self.pushed
    }

    pub fn bytes_accepted(&self) -> u64 {
        self.accepted_bytes
    }

    /// Offers one chunk of at most `chunk` bytes to `sink`. Returns the
    /// claim category the sink reported.
    pub fn drive_once(&mut self, sink: &mut dyn BufferAccepter, chunk: usize) -> PushResult {
        let mut offering = BufferChain::new();
        offering.concat_handoff_limit(&mut self.backlog, chunk.max(1));
        let before = offering.len();
        let result = sink.push_buffer(&mut offering);
        self.pushed += 1;
        self.accepted_bytes += (before - offering.len()) as u64;
        // Whatever was not claimed goes back to the head of the backlog.
        self.backlog.prepend_handoff(&mut offering);
        result
    }

    /// Drives the whole backlog through `sink` in `chunk`-byte offerings.
    /// Stops early if the sink stops making progress. Returns the number of
    /// bytes accepted.
    pub fn drive_to_completion(&mut self, sink: &mut dyn BufferAccepter, chunk: usize) -> u64 {
        let start = self.accepted_bytes;
        let mut stalls = 0;
        while !self.backlog.is_empty() && stalls < 2 {
            let before = self.backlog.len();
            let _ = self.drive_once(sink, chunk);
            if self.backlog.len() == before {
                stalls += 1;
            } else {
                stalls = 0;
            }
        }
        self.accepted_bytes - start
    }
}
