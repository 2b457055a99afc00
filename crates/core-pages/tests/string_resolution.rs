//! Resolver behavior over regular pages, long-string chains, and
//! malformed references.

use core_pages::write::{varchar_column, MAX_INLINE_STRING};
use core_pages::{ColumnarTable, PageError, RefFlags, StringRef, StringResolver};

fn table_of(values: &[Option<&str>]) -> ColumnarTable {
    let col = varchar_column(values);
    let rows = col.row_count();
    ColumnarTable::new(rows, vec![col])
}

#[test]
fn regular_page_offsets_index_non_null_strings() {
    let tables = vec![table_of(&[Some("ab"), None, Some("cde"), Some("")])];
    let resolver = StringResolver::new(&tables);
    let mut scratch = Vec::new();

    let get = |offset: u32, scratch: &mut Vec<u8>| -> Vec<u8> {
        let r = StringRef::pack(0, 0, 0, offset, RefFlags::empty());
        resolver.resolve(r, scratch).unwrap().to_vec()
    };

    assert_eq!(get(0, &mut scratch), b"ab");
    assert_eq!(get(1, &mut scratch), b"cde");
    assert_eq!(get(2, &mut scratch), b"");
}

#[test]
fn long_chain_concatenates_fragments_in_order() {
    let body: String = (0..(MAX_INLINE_STRING * 2 + 77))
        .map(|i| (b'a' + (i % 26) as u8) as char)
        .collect();
    let tables = vec![table_of(&[Some("pre"), Some(&body), Some("post")])];
    let resolver = StringResolver::new(&tables);
    let mut scratch = Vec::new();

    // Page 0: "pre"; pages 1..: the long chain; then "post".
    let r = StringRef::pack(0, 0, 1, 0, RefFlags::LONG);
    let resolved = resolver.resolve(r, &mut scratch).unwrap();
    assert_eq!(resolved, body.as_bytes());

    // "post" lands on the first regular page after the chain.
    let last_page = (tables[0].columns[0].pages.len() - 1) as u32;
    let r = StringRef::pack(0, 0, last_page, 0, RefFlags::empty());
    let mut scratch2 = Vec::new();
    assert_eq!(resolver.resolve(r, &mut scratch2).unwrap(), b"post");
}

#[test]
fn malformed_references_are_rejected() {
    let tables = vec![table_of(&[Some("x")])];
    let resolver = StringResolver::new(&tables);
    let mut scratch = Vec::new();

    let cases = [
        StringRef::null(),
        StringRef::pack(9, 0, 0, 0, RefFlags::empty()),
        StringRef::pack(0, 9, 0, 0, RefFlags::empty()),
        StringRef::pack(0, 0, 9, 0, RefFlags::empty()),
        StringRef::pack(0, 0, 0, 9, RefFlags::empty()),
    ];
    for r in cases {
        match resolver.resolve(r, &mut scratch) {
            Err(PageError::BadReference { raw, .. }) => assert_eq!(raw, r.raw()),
            other => panic!("expected BadReference, got {other:?}"),
        }
    }
}

#[test]
fn continuation_page_reference_is_rejected() {
    let body = "y".repeat(MAX_INLINE_STRING + 100);
    let tables = vec![table_of(&[Some(&body)])];
    let resolver = StringResolver::new(&tables);
    let mut scratch = Vec::new();

    // Page 0 is the starter, page 1 the continuation.
    let r = StringRef::pack(0, 0, 1, 0, RefFlags::empty());
    assert!(matches!(
        resolver.resolve(r, &mut scratch),
        Err(PageError::BadReference { .. })
    ));
}
