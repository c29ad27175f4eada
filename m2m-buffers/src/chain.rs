use crate::error::BufferError;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;

/// One element of a [`BufferChain`]. Static literals are borrowed rather
/// than copied; everything else is owned.
type Segment = Cow<'static, [u8]>;

/// A mutable byte string stored as an ordered list of segments.
///
/// Structure-preserving operations (`append`, `prepend`, `concat_handoff`)
/// never merge segments; [`BufferChain::collapse`] is the only operation that
/// does. This makes the chain cheap to assemble from many small writes and
/// cheap to carve apart again, at the cost of an explicit collapse step when
/// a contiguous view is needed.
///
/// Invariants:
/// - `len()` equals the sum of segment lengths.
/// - No zero-length segment is ever stored, so `count()` is the number of
///   segments and is zero exactly when the chain is strictly empty.
#[derive(Default, Clone)]
pub struct BufferChain {
    segs: VecDeque<Segment>,
}

impl BufferChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total byte length, summed over segments.
    pub fn len(&self) -> usize {
        self.segs.iter().map(|s| s.len()).sum()
    }

    /// Number of segments. One segment means the chain is collapsed.
    pub fn count(&self) -> usize {
        self.segs.len()
    }

    /// Strict emptiness: true only when the chain holds zero bytes.
    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    /// Lax emptiness: true when every byte is a NUL terminator (and for a
    /// strictly empty chain).
    pub fn is_empty_lax(&self) -> bool {
        self.segs.iter().all(|s| s.iter().all(|&b| b == 0))
    }

    /// Releases all owned memory and resets the chain to strictly empty.
    pub fn clear(&mut self) {
        self.segs.clear();
        self.segs.shrink_to_fit();
    }

    /// Appends a copy of `bytes` as a new tail segment.
    pub fn append(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.segs.push_back(Cow::Owned(bytes.to_vec()));
        }
    }

    /// Appends a static byte literal without copying it.
    pub fn append_static(&mut self, bytes: &'static [u8]) {
        if !bytes.is_empty() {
            self.segs.push_back(Cow::Borrowed(bytes));
        }
    }

    /// Appends an owned byte vector as a new tail segment without copying.
    pub fn append_vec(&mut self, bytes: Vec<u8>) {
        if !bytes.is_empty() {
            self.segs.push_back(Cow::Owned(bytes));
        }
    }

    pub fn append_str(&mut self, s: &str) {
        self.append(s.as_bytes());
    }

    pub fn append_byte(&mut self, b: u8) {
        self.segs.push_back(Cow::Owned(vec![b]));
    }

    /// Prepends a copy of `bytes` as a new head segment.
    pub fn prepend(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.segs.push_front(Cow::Owned(bytes.to_vec()));
        }
    }

    /// Prepends a static byte literal without copying it.
    pub fn prepend_static(&mut self, bytes: &'static [u8]) {
        if !bytes.is_empty() {
            self.segs.push_front(Cow::Borrowed(bytes));
        }
    }

    /// Moves every segment out of `other` onto this chain's tail. `other` is
    /// strictly empty afterward. No bytes are copied.
    pub fn concat_handoff(&mut self, other: &mut BufferChain) {
        self.segs.append(&mut other.segs);
    }

    /// Moves every segment out of `other` onto this chain's head.
    pub fn prepend_handoff(&mut self, other: &mut BufferChain) {
        while let Some(seg) = other.segs.pop_back() {
            self.segs.push_front(seg);
        }
    }

    /// Moves exactly `min(limit, other.len())` bytes from the head of `other`
    /// onto this chain's tail, splitting at most one segment on a byte
    /// boundary. Returns the number of bytes moved.
    pub fn concat_handoff_limit(&mut self, other: &mut BufferChain, limit: usize) -> usize {
        let mut moved = 0;
        while moved < limit {
            let seg = match other.segs.pop_front() {
                Some(s) => s,
                None => break,
            };
            let want = limit - moved;
            if seg.len() <= want {
                moved += seg.len();
                self.segs.push_back(seg);
            } else {
                let (head, rest): (Segment, Segment) = match seg {
                    Cow::Borrowed(b) => (Cow::Borrowed(&b[..want]), Cow::Borrowed(&b[want..])),
                    Cow::Owned(mut v) => {
                        let tail = v.split_off(want);
                        (Cow::Owned(v), Cow::Owned(tail))
                    }
                };
                self.segs.push_back(head);
                other.segs.push_front(rest);
                moved += want;
                break;
            }
        }
        moved
    }

    /// Collapses the chain into a single segment and returns the contiguous
    /// bytes. Idempotent; an empty chain yields an empty slice.
    pub fn collapse(&mut self) -> &[u8] {
        if self.segs.len() > 1 {
            let mut buf = Vec::with_capacity(self.len());
            for seg in self.segs.drain(..) {
                buf.extend_from_slice(&seg);
            }
            self.segs.push_back(Cow::Owned(buf));
        }
        self.segs.front().map(|s| s.as_ref()).unwrap_or(&[])
    }

    /// Consumes the chain, returning its bytes as one contiguous vector.
    pub fn into_bytes(mut self) -> Vec<u8> {
        if self.segs.len() == 1 {
            return match self.segs.pop_back().unwrap() {
                Cow::Owned(v) => v,
                Cow::Borrowed(b) => b.to_vec(),
            };
        }
        let mut buf = Vec::with_capacity(self.len());
        for seg in self.segs.drain(..) {
            buf.extend_from_slice(&seg);
        }
        buf
    }

    /// Consumes the chain, returning its bytes as a string. Non-UTF8 byte
    /// runs are replaced.
    pub fn into_string(self) -> String {
        match String::from_utf8(self.into_bytes()) {
            Ok(s) => s,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }

    /// Removes and returns up to `n` bytes from the head of the chain.
    pub fn take_front(&mut self, n: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n.min(self.len()));
        while out.len() < n {
            let seg = match self.segs.pop_front() {
                Some(s) => s,
                None => break,
            };
            let want = n - out.len();
            if seg.len() <= want {
                out.extend_from_slice(&seg);
            } else {
                out.extend_from_slice(&seg[..want]);
                let rest: Segment = match seg {
                    Cow::Borrowed(b) => Cow::Borrowed(&b[want..]),
                    Cow::Owned(mut v) => {
                        v.drain(..want);
                        Cow::Owned(v)
                    }
                };
                self.segs.push_front(rest);
            }
        }
        out
    }

    /// The byte at absolute offset `i`, or zero when out of range.
    pub fn byte_at(&self, i: usize) -> u8 {
        self.get_byte(i).unwrap_or(0)
    }

    fn get_byte(&self, i: usize) -> Option<u8> {
        let mut base = 0;
        for seg in &self.segs {
            if i < base + seg.len() {
                return Some(seg[i - base]);
            }
            base += seg.len();
        }
        None
    }

    /// Borrow of segment `i` (tokens, after a `split`).
    pub fn position(&self, i: usize) -> Option<&[u8]> {
        self.segs.get(i).map(|s| s.as_ref())
    }

    /// Segment `i` with leading and trailing ASCII whitespace removed.
    pub fn position_trimmed(&self, i: usize) -> Option<&[u8]> {
        self.position(i).map(trim_ascii)
    }

    /// Segment `i` parsed as a signed decimal integer after trimming.
    /// Non-numeric input yields zero, matching permissive `atoi` reads.
    pub fn position_as_int(&self, i: usize) -> Option<i64> {
        self.position_trimmed(i).map(parse_int_prefix)
    }

    /// Drops segment `i` from the chain. Returns false when out of range.
    pub fn drop_position(&mut self, i: usize) -> bool {
        if i < self.segs.len() {
            self.segs.remove(i);
            true
        } else {
            false
        }
    }

    /// Repartitions the chain into segments of at most `n` bytes. Total
    /// length is preserved. A zero chunk size is an invalid argument.
    pub fn chunk(&mut self, n: usize) -> Result<usize, BufferError> {
        if n == 0 {
            return Err(BufferError::InvalidArgument);
        }
        if self.is_empty() {
            return Ok(0);
        }
        let bytes = {
            self.collapse();
            match self.segs.pop_back().unwrap() {
                Cow::Owned(v) => v,
                Cow::Borrowed(b) => b.to_vec(),
            }
        };
        for piece in bytes.chunks(n) {
            self.segs.push_back(Cow::Owned(piece.to_vec()));
        }
        Ok(self.segs.len())
    }

    /// Splits the collapsed content into tokens at any byte in `delims`,
    /// dropping empty tokens. Afterward each token is one segment. Returns
    /// the token count.
    pub fn split(&mut self, delims: &[u8]) -> usize {
        if delims.is_empty() {
            return self.count();
        }
        self.collapse();
        let bytes = match self.segs.pop_back() {
            Some(Cow::Owned(v)) => v,
            Some(Cow::Borrowed(b)) => b.to_vec(),
            None => return 0,
        };
        for tok in bytes
            .split(|b| delims.contains(b))
            .filter(|t| !t.is_empty())
        {
            self.segs.push_back(Cow::Owned(tok.to_vec()));
        }
        self.segs.len()
    }

    /// Joins all segments into one, inserting the byte-literal `delim`
    /// between adjacent segments. Returns the prior segment count.
    pub fn implode(&mut self, delim: &[u8]) -> usize {
        let prior = self.segs.len();
        if prior <= 1 {
            return prior;
        }
        let mut buf = Vec::with_capacity(self.len() + delim.len() * (prior - 1));
        for (i, seg) in self.segs.drain(..).enumerate() {
            if i > 0 {
                buf.extend_from_slice(delim);
            }
            buf.extend_from_slice(&seg);
        }
        self.segs.push_back(Cow::Owned(buf));
        prior
    }

    /// Replaces every non-overlapping occurrence of `needle` with
    /// `replacement`, scanning once left-to-right. Returns the replacement
    /// count. An empty needle replaces nothing.
    pub fn replace(&mut self, needle: &[u8], replacement: &[u8]) -> usize {
        if needle.is_empty() || self.len() < needle.len() {
            return 0;
        }
        self.collapse();
        let bytes = match self.segs.pop_back() {
            Some(Cow::Owned(v)) => v,
            Some(Cow::Borrowed(b)) => b.to_vec(),
            None => return 0,
        };
        let mut out = Vec::with_capacity(bytes.len());
        let mut hits = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes.len() - i >= needle.len() && &bytes[i..i + needle.len()] == needle {
                out.extend_from_slice(replacement);
                i += needle.len();
                hits += 1;
            } else {
                out.push(bytes[i]);
                i += 1;
            }
        }
        if !out.is_empty() {
            self.segs.push_back(Cow::Owned(out));
        }
        hits
    }

    /// Index of the first occurrence of `needle` at or after `from`.
    pub fn locate(&self, needle: &[u8], from: usize) -> Option<usize> {
        if needle.is_empty() {
            return None;
        }
        let total = self.len();
        if total < needle.len() {
            return None;
        }
        let mut pos = from;
        'outer: while pos + needle.len() <= total {
            for (j, &nb) in needle.iter().enumerate() {
                if self.get_byte(pos + j) != Some(nb) {
                    pos += 1;
                    continue 'outer;
                }
            }
            return Some(pos);
        }
        None
    }

    /// Deep-copies a window of the chain into `dst`, starting at absolute
    /// offset `offset`. Returns the number of bytes copied. The source is
    /// unchanged, including its segmentation.
    pub fn copy_window(&self, offset: usize, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        let mut base = 0;
        for seg in &self.segs {
            let seg_end = base + seg.len();
            if seg_end > offset {
                let start_in_seg = offset.saturating_sub(base).min(seg.len());
                let avail = seg.len() - start_in_seg;
                let want = (dst.len() - copied).min(avail);
                dst[copied..copied + want]
                    .copy_from_slice(&seg[start_in_seg..start_in_seg + want]);
                copied += want;
                if copied == dst.len() {
                    break;
                }
            }
            base = seg_end;
        }
        copied
    }

    /// Deep-copies `len` bytes starting at `offset` into a fresh chain.
    pub fn copy_range(&self, offset: usize, len: usize) -> BufferChain {
        let mut dst = vec![0u8; len.min(self.len().saturating_sub(offset))];
        let n = self.copy_window(offset, &mut dst);
        dst.truncate(n);
        let mut out = BufferChain::new();
        out.append_vec(dst);
        out
    }

    /// Discards the first `n` bytes. Out-of-range requests leave the chain
    /// unchanged; `n == len()` empties it.
    pub fn cull_head(&mut self, n: usize) {
        if n > self.len() {
            return;
        }
        let _ = self.take_front(n);
    }

    /// Retains only the window `[offset, offset + length)`. An out-of-range
    /// window leaves the chain unchanged.
    pub fn cull_window(&mut self, offset: usize, length: usize) {
        match offset.checked_add(length) {
            Some(end) if end <= self.len() => {
                let _ = self.take_front(offset);
                self.truncate(length);
            }
            _ => {}
        }
    }

    /// Drops bytes from the tail until at most `n` remain.
    pub fn truncate(&mut self, n: usize) {
        let mut kept = 0;
        let mut idx = 0;
        while idx < self.segs.len() {
            let seg_len = self.segs[idx].len();
            if kept + seg_len <= n {
                kept += seg_len;
                idx += 1;
            } else {
                let keep_in_seg = n - kept;
                if keep_in_seg == 0 {
                    self.segs.truncate(idx);
                } else {
                    let seg = std::mem::replace(&mut self.segs[idx], Cow::Borrowed(&[][..]));
                    self.segs[idx] = match seg {
                        Cow::Borrowed(b) => Cow::Borrowed(&b[..keep_in_seg]),
                        Cow::Owned(mut v) => {
                            v.truncate(keep_in_seg);
                            Cow::Owned(v)
                        }
                    };
                    self.segs.truncate(idx + 1);
                }
                return;
            }
        }
    }

    /// True when the chain's first `min(other.len(), len())` bytes equal the
    /// same prefix of `other`.
    pub fn prefix_matches(&self, other: &[u8]) -> bool {
        let n = other.len().min(self.len());
        for (i, &b) in other[..n].iter().enumerate() {
            if self.get_byte(i) != Some(b) {
                return false;
            }
        }
        true
    }

    /// In-place ASCII upper-casing across all segments.
    pub fn to_upper(&mut self) {
        for seg in self.segs.iter_mut() {
            seg.to_mut().make_ascii_uppercase();
        }
    }

    /// In-place ASCII lower-casing across all segments.
    pub fn to_lower(&mut self) {
        for seg in self.segs.iter_mut() {
            seg.to_mut().make_ascii_lowercase();
        }
    }

    /// Iterates the chain's bytes without changing its structure.
    pub fn bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.segs.iter().flat_map(|s| s.iter().copied())
    }

    /// Hex/ASCII inspection dump of the whole chain, rendered lazily
    /// through `fmt::Display`: `format!("{}", chain.to_hex_dump())` or
    /// `write!(out, "{}", chain.to_hex_dump())`.
    pub fn to_hex_dump(&self) -> HexDump<'_> {
        self.to_hex_dump_indented("")
    }

    /// Like [`BufferChain::to_hex_dump`], with each row prefixed by
    /// `indent`.
    pub fn to_hex_dump_indented<'a>(&'a self, indent: &'a str) -> HexDump<'a> {
        HexDump {
            chain: self,
            indent,
        }
    }
}

/// `fmt::Display` adapter over a chain producing rows of sixteen hex
/// columns with an ASCII gutter. Obtained from [`BufferChain::to_hex_dump`].
#[derive(Clone, Copy)]
pub struct HexDump<'a> {
    chain: &'a BufferChain,
    indent: &'a str,
}

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chain.is_empty() {
            return writeln!(f, "{}(empty)", self.indent);
        }
        let mut row = [0u8; 16];
        let mut fill = 0;
        let mut offset = 0;
        for b in self.chain.bytes() {
            row[fill] = b;
            fill += 1;
            if fill == row.len() {
                write_hex_row(f, self.indent, offset, &row)?;
                offset += row.len();
                fill = 0;
            }
        }
        if fill > 0 {
            write_hex_row(f, self.indent, offset, &row[..fill])?;
        }
        Ok(())
    }
}

fn write_hex_row(
    out: &mut dyn fmt::Write,
    indent: &str,
    offset: usize,
    chunk: &[u8],
) -> fmt::Result {
    write!(out, "{indent}{offset:04x}: ")?;
    for i in 0..16 {
        match chunk.get(i) {
            Some(b) => write!(out, "{b:02x} ")?,
            None => out.write_str("   ")?,
        }
    }
    out.write_str(" ")?;
    for &b in chunk {
        let printable = if (0x20..0x7f).contains(&b) {
            b as char
        } else {
            '.'
        };
        write!(out, "{printable}")?;
    }
    out.write_str("\n")
}

impl fmt::Write for BufferChain {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.append_str(s);
        Ok(())
    }
}

impl fmt::Display for BufferChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.segs {
            f.write_str(&String::from_utf8_lossy(seg))?;
        }
        Ok(())
    }
}

impl fmt::Debug for BufferChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BufferChain[{} segs, {} bytes]", self.count(), self.len())
    }
}

impl From<&str> for BufferChain {
    fn from(s: &str) -> Self {
        let mut c = BufferChain::new();
        c.append_str(s);
        c
    }
}

impl From<&[u8]> for BufferChain {
    fn from(b: &[u8]) -> Self {
        let mut c = BufferChain::new();
        c.append(b);
        c
    }
}

impl From<Vec<u8>> for BufferChain {
    fn from(v: Vec<u8>) -> Self {
        let mut c = BufferChain::new();
        c.append_vec(v);
        c
    }
}

impl From<String> for BufferChain {
    fn from(s: String) -> Self {
        let mut c = BufferChain::new();
        c.append_vec(s.into_bytes());
        c
    }
}

impl PartialEq for BufferChain {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.bytes().eq(other.bytes())
    }
}
impl Eq for BufferChain {}

fn trim_ascii(mut b: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = b {
        if first.is_ascii_whitespace() {
            b = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = b {
        if last.is_ascii_whitespace() {
            b = rest;
        } else {
            break;
        }
    }
    b
}

fn parse_int_prefix(b: &[u8]) -> i64 {
    let mut val: i64 = 0;
    let mut idx = 0;
    let neg = b.first() == Some(&b'-');
    if neg || b.first() == Some(&b'+') {
        idx = 1;
    }
    while idx < b.len() && b[idx].is_ascii_digit() {
        val = val
            .saturating_mul(10)
            .saturating_add((b[idx] - b'0') as i64);
        idx += 1;
    }
    if neg {
        -val
    } else {
        val
    }
}

/// Case-insensitive ASCII substring search. Empty inputs never match.
pub fn find_ignore_ascii_case(hay: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || hay.len() < needle.len() {
        return None;
    }
    (0..=hay.len() - needle.len())
        .find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Renders `bytes` into `out` as rows of sixteen hex columns with an ASCII
/// gutter, each row prefixed by `indent`.
pub fn hex_dump_into(out: &mut BufferChain, bytes: &[u8], indent: &str) {
    use fmt::Write as _;
    if bytes.is_empty() {
        let _ = writeln!(out, "{indent}(empty)");
        return;
    }
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write_hex_row(out, indent, row * 16, chunk);
    }
}
