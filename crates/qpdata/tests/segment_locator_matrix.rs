use proptest::prelude::*;
use qpdata::{
    decode_container, printable_strings, ContainerError, ContainerOptions, FormatError,
    LocatorConfig, ProtocolError, SegmentLocator,
};
use qpdata_object_stream::testing::{ClassSpec, StreamBuilder};

const JSON: &str = r#"{"dataVersion":3,"qupathVersion":"0.5.1","server":{"metadata":{"name":"slide.svs","width":4096}}}"#;

fn write_utf(text: &str) -> Vec<u8> {
    let mut out = (text.len() as u16).to_be_bytes().to_vec();
    out.extend_from_slice(text.as_bytes());
    out
}

fn annotation(b: &mut StreamBuilder, class: &str) {
    b.begin_object(
        ClassSpec::new("qupath.lib.objects.PathAnnotationObject")
            .object_field("pathClass", "Ljava/lang/String;"),
    );
    b.string(class);
}

/// Layout written by the producer: everything inside one object stream.
fn stream_container(json: Option<&str>) -> Vec<u8> {
    let mut b = StreamBuilder::new();
    b.block(&write_utf("Data file version 3"));
    if let Some(json) = json {
        b.string(json);
    }
    annotation(&mut b, "Tumor");
    b.finish()
}

/// Header and JSON as plain bytes, followed by stream contents without a
/// preamble.
fn headless_container(json: &str) -> Vec<u8> {
    let mut out = b"Data file version 3".to_vec();
    out.push(0x74);
    out.extend_from_slice(json.as_bytes());
    let mut b = StreamBuilder::headless();
    annotation(&mut b, "Stroma");
    out.extend_from_slice(&b.finish());
    out
}

#[test]
fn producer_layout_is_split_into_three_segments() {
    let buf = stream_container(Some(JSON));
    let segments = SegmentLocator::new().locate(&buf);

    assert_eq!(segments.version_text.as_deref(), Some("3"));
    assert_eq!(segments.json_text.as_deref(), Some(JSON));
    let range = segments.json_range.clone().unwrap();
    assert_eq!(&buf[range], JSON.as_bytes());
    let stream = segments.stream.as_ref().unwrap();
    assert_eq!(stream.range, 0..buf.len());
    assert!(stream.has_preamble);
    assert!(segments.issues.is_empty(), "{:?}", segments.issues);

    let metadata = segments.metadata().unwrap();
    assert_eq!(metadata["qupathVersion"], "0.5.1");
}

#[test]
fn producer_layout_decodes_end_to_end() {
    let buf = stream_container(Some(JSON));
    let out = decode_container(&buf, &ContainerOptions::default());

    assert!(out.is_ok(), "{:?}", out.error);
    assert_eq!(out.metadata.as_ref().unwrap()["dataVersion"], 3);
    let graph = out.graph.as_ref().unwrap();
    assert_eq!(graph.roots.len(), 3);
    let walk = out.walk.as_ref().unwrap();
    assert_eq!(walk.records.len(), 1);
    assert_eq!(walk.records[0].classification_path, vec!["Tumor"]);
    assert!(out.diagnostics.is_empty());
}

#[test]
fn missing_json_does_not_block_stream_decoding() {
    let buf = stream_container(None);
    let segments = SegmentLocator::new().locate(&buf);
    assert_eq!(segments.json_text, None);
    assert_eq!(segments.issues, vec![FormatError::MissingJsonBlock]);
    assert_eq!(segments.version_text.as_deref(), Some("3"));

    let out = decode_container(&buf, &ContainerOptions::default());
    assert!(out.is_ok(), "{:?}", out.error);
    assert!(out.metadata.is_none());
    assert_eq!(out.walk.unwrap().records.len(), 1);
}

#[test]
fn headless_stream_starts_after_json() {
    let buf = headless_container(JSON);
    let segments = SegmentLocator::new().locate(&buf);
    assert_eq!(segments.version_text.as_deref(), Some("3"));
    assert_eq!(segments.json_text.as_deref(), Some(JSON));
    let stream = segments.stream.as_ref().unwrap();
    assert!(!stream.has_preamble);
    assert_eq!(stream.range.start, 20 + JSON.len());
    assert!(stream.bytes(&buf).starts_with(b"sr"));

    let out = decode_container(&buf, &ContainerOptions::default());
    assert!(out.is_ok(), "{:?}", out.error);
    let walk = out.walk.unwrap();
    assert_eq!(walk.records.len(), 1);
    assert_eq!(walk.records[0].classification_path, vec!["Stroma"]);
}

#[test]
fn json_boundary_inside_a_string_falls_back_to_brace_matching() {
    let json = r#"{"dataVersion":3,"note":"odd }sr text"}"#;
    let buf = headless_container(json);
    let segments = SegmentLocator::new().locate(&buf);
    assert_eq!(segments.json_text.as_deref(), Some(json));
    assert_eq!(segments.metadata().unwrap()["note"], "odd }sr text");
}

#[test]
fn malformed_json_is_recorded_and_skipped() {
    let json = r#"{"dataVersion":3,"broken": }"#;
    let buf = headless_container(json);
    let segments = SegmentLocator::new().locate(&buf);
    assert_eq!(segments.json_text, None);
    // No JSON end to anchor on and no magic: the stream is not found either.
    assert!(segments.stream.is_none());
    assert!(matches!(
        segments.issues.as_slice(),
        [
            FormatError::InvalidJson { offset: 20, .. },
            FormatError::MissingStreamMarker
        ]
    ));
}

#[test]
fn truncated_stream_keeps_metadata() {
    let mut buf = b"Data file version 3".to_vec();
    buf.push(0x74);
    buf.extend_from_slice(JSON.as_bytes());
    buf.extend_from_slice(&[0xac, 0xed, 0x00, 0x05]);

    let out = decode_container(&buf, &ContainerOptions::default());
    assert!(out.metadata.is_some());
    assert!(out.graph.is_none());
    assert!(matches!(
        out.error,
        Some(ContainerError::Protocol(ProtocolError::Desync { offset: 4, .. }))
    ));
}

#[test]
fn container_without_stream_is_a_format_error() {
    let mut buf = b"Data file version 3".to_vec();
    buf.push(0x74);
    buf.extend_from_slice(JSON.as_bytes());

    let out = decode_container(&buf, &ContainerOptions::default());
    assert!(out.metadata.is_some());
    assert!(matches!(
        out.error,
        Some(ContainerError::Format(FormatError::MissingStreamMarker))
    ));
}

#[test]
fn custom_markers_are_honored() {
    let config = LocatorConfig {
        version_prefix: b"Format".to_vec(),
        json_key: b"{\"kind\"".to_vec(),
        ..LocatorConfig::default()
    };
    let mut buf = b"Format 7".to_vec();
    buf.push(0x74);
    buf.extend_from_slice(br#"{"kind":"x"}"#);
    let segments = SegmentLocator::with_config(config).locate(&buf);
    assert_eq!(segments.version_text.as_deref(), Some("7"));
    assert_eq!(segments.json_text.as_deref(), Some(r#"{"kind":"x"}"#));
}

#[test]
fn printable_runs_are_collected_in_order() {
    let buf = b"\x00\x01qupath.lib.objects\xff\xfeab\x00PathAnnotationObject\x00";
    assert_eq!(
        printable_strings(buf, 10, 30),
        vec!["qupath.lib.objects", "PathAnnotationObject"]
    );
    assert_eq!(printable_strings(buf, 10, 1).len(), 1);
    assert!(printable_strings(b"short", 10, 30).is_empty());
}

proptest! {
    #[test]
    fn arbitrary_container_bytes_never_panic(
        tail in proptest::collection::vec(any::<u8>(), 0..512),
        with_header in any::<bool>(),
        with_magic in any::<bool>(),
    ) {
        let mut buf = Vec::new();
        if with_header {
            buf.extend_from_slice(b"Data file version 3");
            buf.push(0x74);
        }
        if with_magic {
            buf.extend_from_slice(&[0xac, 0xed, 0x00, 0x05]);
        }
        buf.extend_from_slice(&tail);

        let segments = SegmentLocator::new().locate(&buf);
        if let Some(range) = segments.json_range.clone() {
            prop_assert!(range.end <= buf.len());
            prop_assert!(segments.metadata().is_some());
        }
        if let Some(stream) = &segments.stream {
            prop_assert!(stream.range.end <= buf.len());
        }
        let out = decode_container(&buf, &ContainerOptions::default());
        prop_assert_eq!(out.graph.is_some(), out.walk.is_some());
    }
}
