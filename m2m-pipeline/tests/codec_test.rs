use m2m_buffers::BufferChain;
use m2m_pipeline::{
    Base64Decoder, Base64Encoder, BufferAccepter, CaptureSink, LineEndingCodec, LineTerm,
    PushResult, TestSink, TestSource,
};
use proptest::prelude::*;

#[test]
fn base64_round_trips_every_byte_value() {
    let decoder = Base64Decoder::new(CaptureSink::unbounded());
    let mut encoder = Base64Encoder::new(decoder);

    let original: Vec<u8> = (0u8..=255).collect();
    let mut chain = BufferChain::new();
    chain.append(&original);
    assert_eq!(encoder.push_buffer(&mut chain), PushResult::Full);
    encoder.finish().unwrap();
    encoder.downstream_mut().finish().unwrap();

    let mut sink = encoder.into_inner().into_inner();
    assert_eq!(sink.take().into_bytes(), original);
}

#[test]
fn base64_survives_chunked_delivery() {
    let original: Vec<u8> = (0u8..=255).cycle().take(700).collect();
    for chunk in [1usize, 2, 3, 4, 5, 7, 64] {
        let decoder = Base64Decoder::new(CaptureSink::unbounded());
        let mut encoder = Base64Encoder::new(decoder);
        let mut source = TestSource::new();
        source.feed(&original);
        source.drive_to_completion(&mut encoder, chunk);
        encoder.finish().unwrap();
        encoder.downstream_mut().finish().unwrap();
        let mut sink = encoder.into_inner().into_inner();
        assert_eq!(sink.take().into_bytes(), original, "chunk size {chunk}");
    }
}

#[test]
fn line_codec_end_to_end_against_instrumented_sink() {
    let sink = TestSink::new().expecting_break(b"\r\n");
    let mut codec = LineEndingCodec::new(sink, LineTerm::CrLf);
    codec.set_replacements(&[LineTerm::Cr, LineTerm::Lf]);
    codec.set_hold_until_break(true);

    let mut source = TestSource::new();
    source.feed(b"alpha\nbravo\r\ncharlie\rdelta\n");
    while source.remaining() > 0 {
        let _ = source.drive_once(&mut codec, 6);
    }
    assert!(codec.flush());

    let mut sink = codec.into_inner();
    assert_eq!(sink.break_violations(), 0);
    assert_eq!(
        sink.take_captured().into_bytes(),
        b"alpha\r\nbravo\r\ncharlie\r\ndelta\r\n"
    );
}

#[test]
fn pipeline_respects_downstream_backpressure() {
    // A tight downstream forces the encoder to claim prefixes only.
    let mut encoder = Base64Encoder::new(CaptureSink::new(16));
    let mut chain = BufferChain::new();
    chain.append(&[0x55u8; 100]);
    let first = encoder.push_buffer(&mut chain);
    assert_eq!(first, PushResult::Partial);
    assert_eq!(chain.len(), 100 - 12);
    // The downstream is saturated now; nothing further can be claimed.
    assert_eq!(encoder.buffer_available(), 0);
    assert_eq!(encoder.push_buffer(&mut chain), PushResult::Reject);
    assert_eq!(encoder.downstream().len(), 16);
}

proptest! {
    #[test]
    fn base64_round_trip_law(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let decoder = Base64Decoder::new(CaptureSink::unbounded());
        let mut encoder = Base64Encoder::new(decoder);
        let mut chain = BufferChain::new();
        chain.append(&data);
        encoder.push_buffer(&mut chain);
        encoder.finish().unwrap();
        encoder.downstream_mut().finish().unwrap();
        let mut sink = encoder.into_inner().into_inner();
        prop_assert_eq!(sink.take().into_bytes(), data);
    }

    #[test]
    fn line_codec_only_touches_flagged_terminators(
        pieces in proptest::collection::vec("[a-z]{0,6}", 1..6),
    ) {
        let body = pieces.join("\n");
        let mut codec = LineEndingCodec::new(CaptureSink::unbounded(), LineTerm::CrLf);
        codec.set_replacements(&[LineTerm::Lf]);
        let mut chain = BufferChain::from(body.as_str());
        codec.push_buffer(&mut chain);
        codec.flush();
        let expect = body.replace('\n', "\r\n");
        let mut sink = codec.into_inner();
        prop_assert_eq!(sink.take().into_bytes(), expect.into_bytes());
    }
}
