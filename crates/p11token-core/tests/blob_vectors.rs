//! Attribute blob codec vector tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use p11token_core::abi::blob::{decode_object, decode_records};
use p11token_core::AttributeSet;

use vector_loader::load;

#[test]
fn blob_vectors() {
    let files = [
        "blob_empty.json",
        "blob_two_records.json",
        "blob_trailing_bytes.json",
        "blob_head_truncated.json",
        "blob_region_overrun.json",
        "blob_record_header_overrun.json",
        "blob_value_overrun.json",
        "blob_count_mismatch.json",
    ];

    for f in files {
        let v = load(f);
        let raw = v.blob.decode();
        let res = decode_records(&raw);

        if let Some(err) = v.expect_error {
            let e = res.expect_err("expected error");
            assert_eq!(e.rv().as_str(), err.code, "vector={}", v.description);
            continue;
        }

        let records = res.expect("expected ok records");
        let ex = v.expect.expect("missing expect block");
        let (head, _) = decode_object(&raw).unwrap();

        assert_eq!(records.len() as u64, ex["count"].as_u64().unwrap(), "vector={}", v.description);
        assert_eq!(head.attrs_size as u64, ex["attrs_size"].as_u64().unwrap(), "vector={}", v.description);

        let ids: Vec<u64> = records.iter().map(|r| r.id as u64).collect();
        let want: Vec<u64> = ex["ids"].as_array().unwrap().iter().map(|i| i.as_u64().unwrap()).collect();
        assert_eq!(ids, want, "vector={}", v.description);

        let set = AttributeSet::from_bytes(&raw).unwrap();
        assert_eq!(set.attrs_size() as u64, ex["attrs_size"].as_u64().unwrap(), "vector={}", v.description);
    }
}
