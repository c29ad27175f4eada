use crate::{BufferAccepter, PushResult};
use m2m_buffers::{BufferChain, MultiStringSearch};
use smallvec::SmallVec;

/// A line terminator style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTerm {
    None,
    Cr,
    Lf,
    CrLf,
}

impl LineTerm {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            LineTerm::None => b"",
            LineTerm::Cr => b"\r",
            LineTerm::Lf => b"\n",
            LineTerm::CrLf => b"\r\n",
        }
    }
}

/// Stream-aligned line-terminator normalization.
///
/// Every occurrence of a terminator in the replacement set becomes the
/// target terminator; no other bytes are touched. A CR immediately followed
/// by LF counts as one terminator when both are flagged, so `"\r\n"` maps to
/// a single target rather than two.
///
/// Byte classification is chunking-independent: a trailing byte that might
/// begin a longer terminator (a lone CR when CRLF is in play) is held until
/// the next push or [`LineEndingCodec::flush`] resolves it. With
/// `hold_until_break` set, everything after the most recent complete
/// terminator is held as well, so each downstream push ends exactly at a
/// line break.
#[derive(Debug)]
pub struct LineEndingCodec<D: BufferAccepter> {
    downstream: D,
    target: LineTerm,
    search: MultiStringSearch,
    hold_until_break: bool,
    /// Raw input bytes held back pending classification.
    tail: Vec<u8>,
    /// Transformed output the downstream has not yet accepted.
    pending_out: BufferChain,
    breaks: u64,
}

impl<D: BufferAccepter> LineEndingCodec<D> {
    pub fn new(downstream: D, target: LineTerm) -> Self {
        Self {
            downstream,
            target,
            search: MultiStringSearch::new(4),
            hold_until_break: false,
            tail: Vec::new(),
            pending_out: BufferChain::new(),
            breaks: 0,
        }
    }

    /// Selects which terminators get replaced. Flagging both CR and LF also
    /// arms the compound CRLF needle so paired terminators collapse to one.
    pub fn set_replacements(&mut self, terms: &[LineTerm]) {
        self.search.clear();
        let mut needles: SmallVec<[&'static [u8]; 4]> = SmallVec::new();
        let has = |t: LineTerm| terms.contains(&t);
        if has(LineTerm::CrLf) || (has(LineTerm::Cr) && has(LineTerm::Lf)) {
            needles.push(b"\r\n");
        }
        if has(LineTerm::Cr) {
            needles.push(b"\r");
        }
        if has(LineTerm::Lf) {
            needles.push(b"\n");
        }
        for n in needles {
            let _ = self.search.add_needle(n);
        }
    }

    pub fn set_hold_until_break(&mut self, hold: bool) {
        self.hold_until_break = hold;
    }

    /// Terminators emitted so far.
    pub fn breaks_emitted(&self) -> u64 {
        self.breaks
    }

    /// Bytes currently held back.
    pub fn held_len(&self) -> usize {
        self.tail.len() + self.pending_out.len()
    }

    pub fn downstream(&self) -> &D {
        &self.downstream
    }

    pub fn downstream_mut(&mut self) -> &mut D {
        &mut self.downstream
    }

    pub fn into_inner(self) -> D {
        self.downstream
    }

    /// Treats the held fragment as end-of-stream: transforms and forwards
    /// it regardless of hold mode. Returns true when nothing remains queued.
    pub fn flush(&mut self) -> bool {
        let data = std::mem::take(&mut self.tail);
        let mut out = Vec::new();
        self.transform(&data, data.len(), &mut out);
        self.pending_out.append_vec(out);
        self.drain_pending();
        self.held_len() == 0
    }

    /// Replaces every complete match inside `data[..window]`, appending the
    /// rewritten bytes to `out`. Returns the input index just past the last
    /// match along with the output length at that point.
    fn transform(&mut self, data: &[u8], window: usize, out: &mut Vec<u8>) -> (usize, usize) {
        let mut i = 0;
        let mut last_break = (0usize, 0usize);
        while let Some(hit) = self.search.find_from(&data[..window], i) {
            out.extend_from_slice(&data[i..hit.offset]);
            out.extend_from_slice(self.target.bytes());
            i = hit.offset + hit.length;
            self.breaks += 1;
            last_break = (i, out.len());
        }
        out.extend_from_slice(&data[i..window]);
        last_break
    }

    fn drain_pending(&mut self) {
        if !self.pending_out.is_empty() {
            let _ = self.downstream.push_buffer(&mut self.pending_out);
        }
    }
}

impl<D: BufferAccepter> BufferAccepter for LineEndingCodec<D> {
    fn push_buffer(&mut self, chain: &mut BufferChain) -> PushResult {
        self.drain_pending();
        if !self.pending_out.is_empty() {
            return PushResult::Reject;
        }
        let offered = chain.len();
        if offered == 0 {
            return PushResult::Full;
        }

        let mut data = std::mem::take(&mut self.tail);
        data.extend(chain.take_front(offered));

        if self.search.needle_count() == 0 {
            // No replacements configured: identity transform.
            self.pending_out.append_vec(data);
            self.drain_pending();
            return PushResult::Full;
        }

        // Trailing bytes that might begin a longer terminator stay held so
        // classification does not depend on where pushes were chunked.
        let window = data.len() - self.search.unresolved_tail(&data);
        let mut out = Vec::with_capacity(data.len());
        let (last_in, last_out) = self.transform(&data, window, &mut out);

        if self.hold_until_break {
            out.truncate(last_out);
            self.tail = data[last_in..].to_vec();
        } else {
            self.tail = data[window..].to_vec();
        }
        self.pending_out.append_vec(out);
        self.drain_pending();
        PushResult::Full
    }

    fn buffer_available(&self) -> usize {
        if !self.pending_out.is_empty() {
            return 0;
        }
        let avail = self.downstream.buffer_available();
        // The target may be wider than a replaced terminator, so halve the
        // advertisement when expansion is possible.
        let expands = self.target.bytes().len() > 1 && self.search.needle_count() > 0;
        if expands {
            avail / 2
        } else {
            avail
        }
    }
}
