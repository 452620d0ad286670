use crate::layout::BLOCK_SIZE;
use crate::manifest::{
    MANIFEST_CAP, MANIFEST_VERSION, ManifestEntry, ManifestError, ManifestPage, decode_page,
    encode_page,
};

fn entry(i: u64) -> ManifestEntry {
    ManifestEntry {
        level: 0,
        meta_off: 0x10_0000 + i * 0x3000,
        meta_len: 0x3000,
        min_prefix: [i as u8; 16],
        max_prefix: [i as u8 + 1; 16],
    }
}

#[test]
fn test_cap_is_85() {
    assert_eq!(MANIFEST_CAP, 85);
}

#[test]
fn test_zero_filled_page_decodes_empty() {
    let page = decode_page(&vec![0u8; BLOCK_SIZE]).unwrap();
    assert_eq!(page, ManifestPage::empty());
    assert!(page.entries.is_empty());
}

#[test]
fn test_roundtrip_with_entries() {
    let page = ManifestPage {
        version: MANIFEST_VERSION,
        epoch: 7,
        entries: (0..3).map(entry).collect(),
    };

    let buf = encode_page(&page).unwrap();
    assert_eq!(buf.len(), BLOCK_SIZE);
    assert_eq!(decode_page(&buf).unwrap(), page);
}

#[test]
fn test_roundtrip_at_capacity() {
    let page = ManifestPage {
        version: MANIFEST_VERSION,
        epoch: 1,
        entries: (0..MANIFEST_CAP as u64).map(entry).collect(),
    };

    let buf = encode_page(&page).unwrap();
    let decoded = decode_page(&buf).unwrap();
    assert_eq!(decoded.entries.len(), MANIFEST_CAP);
    assert_eq!(decoded, page);
}

#[test]
fn test_encode_rejects_overfull_page() {
    let page = ManifestPage {
        version: MANIFEST_VERSION,
        epoch: 1,
        entries: (0..MANIFEST_CAP as u64 + 1).map(entry).collect(),
    };

    let err = encode_page(&page).unwrap_err();
    assert!(matches!(err, ManifestError::TooManyEntries(86)));
}

#[test]
fn test_decode_rejects_wrong_buffer_size() {
    let err = decode_page(&vec![0u8; BLOCK_SIZE - 1]).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidPageSize(4095)));

    let err = decode_page(&vec![0u8; 2 * BLOCK_SIZE]).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidPageSize(8192)));
}

#[test]
fn test_decode_rejects_count_beyond_cap() {
    let page = ManifestPage {
        version: MANIFEST_VERSION,
        epoch: 1,
        entries: Vec::new(),
    };
    let mut buf = encode_page(&page).unwrap();
    // Forge the count field (offset 12) past the capacity.
    buf[12..14].copy_from_slice(&200u16.to_le_bytes());

    let err = decode_page(&buf).unwrap_err();
    assert!(matches!(err, ManifestError::CountExceedsCap(200)));
}

#[test]
fn test_entry_constructor_validates_prefix_length() {
    let err = ManifestEntry::new(0, 0, 0, &[0u8; 15], &[0u8; 16]).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidPrefixSize(15)));

    let err = ManifestEntry::new(0, 0, 0, &[0u8; 16], &[0u8; 17]).unwrap_err();
    assert!(matches!(err, ManifestError::InvalidPrefixSize(17)));

    assert!(ManifestEntry::new(0, 0, 0, &[0u8; 16], &[0u8; 16]).is_ok());
}

#[test]
fn test_empty_page_with_nonzero_version_roundtrips() {
    // A formatted-but-empty manifest is distinct from the all-zero page.
    let page = ManifestPage {
        version: MANIFEST_VERSION,
        epoch: 1,
        entries: Vec::new(),
    };
    let decoded = decode_page(&encode_page(&page).unwrap()).unwrap();
    assert_eq!(decoded, page);
}
