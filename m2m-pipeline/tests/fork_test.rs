//! Composition tests: a fork feeding two independent transform chains must
//! keep both sides byte-identical under back-pressure.

use m2m_buffers::BufferChain;
use m2m_pipeline::{
    Base64Encoder, BufferAccepter, BufferFork, CaptureSink, PushResult, TestSink, TestSource,
};

#[test]
fn fork_feeds_a_codec_and_a_tap_identically() {
    // Left: raw capture tap. Right: Base64 encode then capture.
    let tap = CaptureSink::unbounded();
    let encoder = Base64Encoder::new(CaptureSink::unbounded());
    let mut fork = BufferFork::new(tap, encoder);

    let payload: Vec<u8> = (0u8..=119).collect();
    let mut source = TestSource::new();
    source.feed(&payload);
    source.drive_to_completion(&mut fork, 10);

    let (mut tap, mut encoder) = fork.into_parts();
    encoder.finish().unwrap();
    assert_eq!(tap.take().into_bytes(), payload);
    let encoded = encoder.into_inner().take().into_bytes();
    assert_eq!(encoded.len(), payload.len().div_ceil(3) * 4);
}

#[test]
fn fork_excess_stays_with_the_caller() {
    let mut fork = BufferFork::new(
        TestSink::new().with_push_limit(3),
        CaptureSink::unbounded(),
    );
    let mut chain = BufferChain::from("abcdefgh");
    // Each push moves exactly the constrained side's budget.
    assert_eq!(fork.push_buffer(&mut chain), PushResult::Partial);
    assert_eq!(chain.len(), 5);
    assert_eq!(fork.push_buffer(&mut chain), PushResult::Partial);
    assert_eq!(chain.len(), 2);
    assert_eq!(fork.push_buffer(&mut chain), PushResult::Full);
    assert!(chain.is_empty());
    let (mut limited, mut open) = fork.into_parts();
    assert_eq!(limited.take_captured().into_bytes(), open.take().into_bytes());
}

#[test]
fn forked_test_sinks_agree_on_expectations() {
    let mut fork = BufferFork::new(
        TestSink::new().expecting_total(6),
        TestSink::new().expecting_total(6),
    );
    let mut chain = BufferChain::from("sixsix");
    assert_eq!(fork.push_buffer(&mut chain), PushResult::Full);
    assert!(fork.left().expectation_met());
    assert!(fork.right().expectation_met());
}
