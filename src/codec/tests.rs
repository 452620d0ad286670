use std::cmp::Ordering;

use crate::codec::{CodecError, Decode, Encode, cmp16, sort_key16};

#[test]
fn test_integer_roundtrip_little_endian() {
    let mut buf = Vec::new();
    0xABu8.encode_to(&mut buf);
    0x1234u16.encode_to(&mut buf);
    0xDEADBEEFu32.encode_to(&mut buf);
    0x0102030405060708u64.encode_to(&mut buf);

    assert_eq!(buf[0], 0xAB);
    assert_eq!(&buf[1..3], &[0x34, 0x12]);
    assert_eq!(&buf[3..7], &[0xEF, 0xBE, 0xAD, 0xDE]);

    let mut off = 0;
    let (a, n) = u8::decode_from(&buf[off..]).unwrap();
    off += n;
    let (b, n) = u16::decode_from(&buf[off..]).unwrap();
    off += n;
    let (c, n) = u32::decode_from(&buf[off..]).unwrap();
    off += n;
    let (d, n) = u64::decode_from(&buf[off..]).unwrap();
    off += n;

    assert_eq!((a, b, c, d), (0xAB, 0x1234, 0xDEADBEEF, 0x0102030405060708));
    assert_eq!(off, buf.len());
}

#[test]
fn test_fixed_array_roundtrip() {
    let arr: [u8; 16] = *b"0123456789abcdef";
    let mut buf = Vec::new();
    arr.encode_to(&mut buf);
    assert_eq!(buf.len(), 16);

    let (decoded, n) = <[u8; 16]>::decode_from(&buf).unwrap();
    assert_eq!(decoded, arr);
    assert_eq!(n, 16);
}

#[test]
fn test_decode_truncated_buffer() {
    let err = u64::decode_from(&[1, 2, 3]).unwrap_err();
    match err {
        CodecError::UnexpectedEof { needed, available } => {
            assert_eq!(needed, 8);
            assert_eq!(available, 3);
        }
        other => panic!("expected UnexpectedEof, got {other:?}"),
    }
}

#[test]
fn test_sort_key16_is_deterministic() {
    let a1 = sort_key16(b"hello");
    let a2 = sort_key16(b"hello");
    assert_eq!(a1, a2);
    assert_ne!(a1, sort_key16(b"hellp"));
}

#[test]
fn test_sort_key16_of_empty_key() {
    // The empty key has a well-defined token too.
    let t = sort_key16(b"");
    assert_eq!(t, sort_key16(b""));
    assert_ne!(t, sort_key16(b"\0"));
}

#[test]
fn test_cmp16_is_lexicographic() {
    let mut lo = [0u8; 16];
    let mut hi = [0u8; 16];
    hi[0] = 1;
    assert_eq!(cmp16(&lo, &hi), Ordering::Less);
    assert_eq!(cmp16(&hi, &lo), Ordering::Greater);
    assert_eq!(cmp16(&lo, &lo), Ordering::Equal);

    // Later bytes only break ties of earlier ones.
    lo[15] = 0xFF;
    assert_eq!(cmp16(&lo, &hi), Ordering::Less);
}
