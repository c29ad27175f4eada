use m2m_buffers::RingBuffer;
use rand::{Rng, SeedableRng};

#[test]
fn fill_and_drain_preserves_sequence() {
    const CAP: usize = 48;
    let mut rng = rand::rngs::StdRng::seed_from_u64(0xC3);
    let values: Vec<i16> = (0..CAP).map(|_| rng.gen()).collect();

    let mut ring: RingBuffer<i16> = RingBuffer::new(CAP);
    assert_eq!(ring.insert_from(&values), CAP);
    assert_eq!(ring.vacancy(), 0);
    assert_eq!(ring.count(), CAP);

    let mut drained = Vec::new();
    assert_eq!(ring.get_into(&mut drained, CAP), Ok(CAP));
    assert_eq!(drained, values);
    assert!(ring.is_empty());
}

#[test]
fn get_after_single_insert_returns_it() {
    let mut ring: RingBuffer<u32> = RingBuffer::new(4);
    ring.insert(0xDEAD).unwrap();
    assert_eq!(ring.get(), Some(0xDEAD));
    assert_eq!(ring.get(), None);
}

#[test]
fn partial_bulk_insert_reports_acceptance() {
    let mut ring: RingBuffer<u8> = RingBuffer::new(3);
    assert_eq!(ring.insert_from(&[1, 2, 3, 4, 5]), 3);
    assert_eq!(ring.count(), 3);
    let mut out = Vec::new();
    ring.get_into(&mut out, 3).unwrap();
    assert_eq!(out, vec![1, 2, 3]);
}

#[test]
fn invariant_holds_through_mixed_traffic() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(9);
    let mut ring: RingBuffer<u16> = RingBuffer::new(17);
    for _ in 0..500 {
        if rng.gen_bool(0.6) {
            let _ = ring.insert(rng.gen());
        } else {
            let _ = ring.get();
        }
        assert_eq!(ring.count() + ring.vacancy(), ring.capacity());
    }
}
