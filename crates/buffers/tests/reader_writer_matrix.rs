//! Writer/Reader roundtrip matrix for the buffers crate.

use proptest::prelude::*;
use qpdata_buffers::{BufferError, Reader, Writer};

#[test]
fn roundtrip_fixed_width_matrix() {
    let mut w = Writer::new();
    w.u8(0xff);
    w.i8(i8::MIN);
    w.u16(u16::MAX);
    w.i16(-1000);
    w.u32(0xdead_beef);
    w.i32(i32::MIN);
    w.u64(u64::MAX);
    w.i64(-42);
    w.f32(1.5);
    w.f64(-0.25);
    let data = w.flush();
    let mut r = Reader::new(&data);
    assert_eq!(r.u8().unwrap(), 0xff);
    assert_eq!(r.i8().unwrap(), i8::MIN);
    assert_eq!(r.u16().unwrap(), u16::MAX);
    assert_eq!(r.i16().unwrap(), -1000);
    assert_eq!(r.u32().unwrap(), 0xdead_beef);
    assert_eq!(r.i32().unwrap(), i32::MIN);
    assert_eq!(r.u64().unwrap(), u64::MAX);
    assert_eq!(r.i64().unwrap(), -42);
    assert_eq!(r.f32().unwrap(), 1.5);
    assert_eq!(r.f64().unwrap(), -0.25);
    assert!(r.is_empty());
}

#[test]
fn every_truncation_is_reported_not_panicked() {
    let mut w = Writer::new();
    w.i64(7);
    let data = w.flush();
    for cut in 0..data.len() {
        let mut r = Reader::new(&data[..cut]);
        match r.i64() {
            Err(BufferError::EndOfBuffer {
                offset,
                needed,
                available,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(needed, 8);
                assert_eq!(available, cut);
            }
            other => panic!("expected end of buffer, got {other:?}"),
        }
    }
}

proptest! {
    #[test]
    fn f64_values_survive_roundtrip(v in any::<f64>()) {
        let mut w = Writer::new();
        w.f64(v);
        let data = w.flush();
        let back = Reader::new(&data).f64().unwrap();
        prop_assert_eq!(back.to_bits(), v.to_bits());
    }

    #[test]
    fn buf_reads_exactly_what_was_written(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let mut w = Writer::new();
        w.u32(bytes.len() as u32);
        w.buf(&bytes);
        let data = w.flush();
        let mut r = Reader::new(&data);
        let len = r.u32().unwrap() as usize;
        prop_assert_eq!(r.buf(len).unwrap(), bytes.as_slice());
        prop_assert!(r.is_empty());
    }
}
