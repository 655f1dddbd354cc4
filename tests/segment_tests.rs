//! Integration tests for segment creation and client attachment.
//!
//! These tests map the same OS shared-memory object twice in one process
//! (producer-side segment plus client attachment), which exercises the
//! same code paths as two cooperating processes. Object names carry the
//! process id so parallel test runs cannot collide.

use shmpool::prelude::*;

fn unique_name(tag: &str) -> String {
    format!("shmpool-test-{}-{}", tag, std::process::id())
}

// ============================================================================
// Producer / consumer round-trips
// ============================================================================

#[test]
fn test_producer_write_visible_to_consumer() {
    let name = unique_name("roundtrip");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 64).unwrap();

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadOnly, 64).unwrap();

    segment.write(b"hello, shared world").unwrap();

    let mut buf = [0u8; 19];
    client.read(handle, &mut buf).unwrap();
    assert_eq!(&buf, b"hello, shared world");

    client.detach(handle).unwrap();
    segment.destroy().unwrap();
}

#[test]
fn test_consumer_write_visible_to_producer() {
    let name = unique_name("clientwrite");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 32).unwrap();

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadWrite, 32).unwrap();

    client.write(handle, b"from the client").unwrap();

    let mut buf = [0u8; 15];
    segment.read(&mut buf).unwrap();
    assert_eq!(&buf, b"from the client");

    client.detach(handle).unwrap();
    segment.destroy().unwrap();
}

#[test]
fn test_read_beyond_region_fails_without_copy() {
    let name = unique_name("overread");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 8).unwrap();
    segment.write(b"12345678").unwrap();

    let mut buf = [0xffu8; 9];
    let err = segment.read(&mut buf).unwrap_err();
    assert!(matches!(err, Error::ExceedsBlock { requested: 9, block: 8 }));
    assert_eq!(buf, [0xffu8; 9]);

    segment.destroy().unwrap();
}

// ============================================================================
// Naming and duplicates
// ============================================================================

#[test]
fn test_attach_rejects_duplicate_normalized_name() {
    let name = unique_name("dup");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    let mut client = SegmentClient::new();
    client.attach(&name, AccessMode::ReadOnly, 16).unwrap();

    // The same object under its slash-prefixed spelling is still a
    // duplicate: normalization happens before the check.
    let err = client
        .attach(&format!("/{name}"), AccessMode::ReadOnly, 16)
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateAttachment(_)));

    segment.destroy().unwrap();
}

#[test]
fn test_name_normalization_matches_producer() {
    // Created without a slash, attached with one.
    let name = unique_name("slash");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();
    assert_eq!(segment.name(), format!("/{name}"));

    let mut client = SegmentClient::new();
    let handle = client.attach(&format!("/{name}"), AccessMode::ReadOnly, 16).unwrap();

    segment.write(b"normalized").unwrap();
    let mut buf = [0u8; 10];
    client.read(handle, &mut buf).unwrap();
    assert_eq!(&buf, b"normalized");

    segment.destroy().unwrap();
}

#[test]
fn test_create_rejects_existing_name() {
    let name = unique_name("exists");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    let err = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap_err();
    assert!(matches!(err, Error::SegmentExists(_)));

    segment.destroy().unwrap();
}

#[test]
fn test_create_rejects_empty_name_and_zero_size() {
    assert!(matches!(
        Segment::create("", AccessMode::ReadWrite, 16),
        Err(Error::EmptyName)
    ));
    assert!(matches!(
        Segment::create(&unique_name("zero"), AccessMode::ReadWrite, 0),
        Err(Error::ZeroSize)
    ));
}

#[test]
fn test_attach_to_missing_object_fails() {
    let mut client = SegmentClient::new();
    let err = client
        .attach(&unique_name("missing"), AccessMode::ReadOnly, 16)
        .unwrap_err();
    assert!(matches!(err, Error::System(_)));
    assert!(client.is_empty());
}

// ============================================================================
// Access control
// ============================================================================

#[test]
fn test_write_rejected_on_readonly_attachment() {
    let name = unique_name("readonly");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadOnly, 16).unwrap();

    let err = client.write(handle, b"nope").unwrap_err();
    assert!(matches!(err, Error::NotWritable(_)));

    segment.destroy().unwrap();
}

#[test]
fn test_read_rejected_on_no_access_attachment() {
    let name = unique_name("noaccess");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::None, 16).unwrap();

    let mut buf = [0u8; 4];
    assert!(matches!(
        client.read(handle, &mut buf),
        Err(Error::NotReadable(_))
    ));
    assert!(matches!(
        client.write(handle, b"nope"),
        Err(Error::NotWritable(_))
    ));

    segment.destroy().unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_destroy_twice_fails() {
    let name = unique_name("destroy");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    segment.destroy().unwrap();
    assert!(!segment.is_active());

    assert!(matches!(segment.destroy(), Err(Error::Uninitialized)));
    assert!(matches!(
        segment.read(&mut [0u8; 4]),
        Err(Error::Uninitialized)
    ));
    assert!(matches!(segment.write(b"late"), Err(Error::Uninitialized)));
}

#[test]
fn test_detach_twice_fails() {
    let name = unique_name("detach");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadOnly, 16).unwrap();

    client.detach(handle).unwrap();
    assert!(matches!(
        client.detach(handle),
        Err(Error::UnknownAttachment(_))
    ));

    segment.destroy().unwrap();
}

#[test]
fn test_handles_are_sequential_per_client() {
    let name_a = unique_name("seq-a");
    let name_b = unique_name("seq-b");
    let mut seg_a = Segment::create(&name_a, AccessMode::ReadWrite, 16).unwrap();
    let mut seg_b = Segment::create(&name_b, AccessMode::ReadWrite, 16).unwrap();

    let mut client = SegmentClient::new();
    let a = client.attach(&name_a, AccessMode::ReadOnly, 16).unwrap();
    let b = client.attach(&name_b, AccessMode::ReadOnly, 16).unwrap();
    assert_eq!(a.into_raw(), 0);
    assert_eq!(b.into_raw(), 1);

    // Detaching does not recycle handles.
    client.detach(a).unwrap();
    client.detach(b).unwrap();
    let c = client.attach(&name_a, AccessMode::ReadOnly, 16).unwrap();
    assert_eq!(c.into_raw(), 2);

    seg_a.destroy().unwrap();
    seg_b.destroy().unwrap();
}

#[test]
fn test_client_drop_releases_attachments() {
    let name = unique_name("clientdrop");
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();

    {
        let mut client = SegmentClient::new();
        client.attach(&name, AccessMode::ReadOnly, 16).unwrap();
        assert_eq!(client.attachment_count(), 1);
        // Dropped here with the attachment still live.
    }

    // The object survives client teardown (attachments never unlink) and
    // can be attached again.
    let mut client = SegmentClient::new();
    let handle = client.attach(&name, AccessMode::ReadOnly, 16).unwrap();
    client.detach(handle).unwrap();

    segment.destroy().unwrap();
}

#[test]
fn test_segment_drop_removes_object() {
    let name = unique_name("segdrop");
    {
        let _segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();
        // Dropped here without an explicit destroy.
    }

    // The name was unlinked, so a fresh create succeeds.
    let mut segment = Segment::create(&name, AccessMode::ReadWrite, 16).unwrap();
    segment.destroy().unwrap();
}
