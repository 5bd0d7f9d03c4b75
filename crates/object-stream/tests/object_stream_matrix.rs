use proptest::prelude::*;
use qpdata_object_stream::constants::*;
use qpdata_object_stream::testing::{ClassRef, ClassSpec, StreamBuilder};
use qpdata_object_stream::{
    decode_stream, graph_to_json, CancelToken, DecodeLimits, GenericValue, LimitKind,
    ObjectStreamDecoder, Primitive, ProtocolError,
};

fn link_class() -> ClassSpec {
    ClassSpec::new("demo.Link").object_field("other", "Ljava/lang/Object;")
}

#[test]
fn mutual_references_are_cross_linked() {
    let mut b = StreamBuilder::new();
    // desc 0x7e0000, type name 0x7e0001
    let a = b.begin_object(link_class());
    let _b = b.begin_object(ClassRef::Handle(0x7e_0000));
    b.reference(a);
    let graph = decode_stream(&b.finish()).unwrap();

    let root = graph.root().unwrap().clone();
    let obj_a = graph.as_object(&root).unwrap();
    let value_b = obj_a.field("other").unwrap().clone();
    let obj_b = graph.as_object(&value_b).unwrap();
    assert_eq!(obj_b.field("other"), Some(&root));
    assert_eq!(obj_a.class_name(), "demo.Link");
    assert_eq!(obj_b.class_name(), "demo.Link");
    assert_eq!(graph.len(), 2);
    assert!(graph.diagnostics.is_empty());
}

#[test]
fn truncated_after_preamble_desyncs_at_buffer_end() {
    let err = decode_stream(&STREAM_PREAMBLE).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { offset: 4, .. }), "{err:?}");

    let err = decode_stream(&[0xac, 0xed]).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { offset: 2, .. }), "{err:?}");
}

#[test]
fn preamble_mismatch_is_bad_magic() {
    assert_eq!(
        decode_stream(&[0xca, 0xfe, 0xba, 0xbe]).unwrap_err(),
        ProtocolError::BadMagic {
            magic: 0xcafe,
            version: 0xbabe
        }
    );
    assert_eq!(
        decode_stream(&[0xac, 0xed, 0x00, 0x06, 0x70]).unwrap_err(),
        ProtocolError::BadMagic {
            magic: 0xaced,
            version: 6
        }
    );
}

#[test]
fn string_length_past_end_desyncs() {
    let mut b = StreamBuilder::new();
    b.raw(&[TC_STRING, 0x00, 0x10, b'a']);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { offset: 7, .. }), "{err:?}");

    let mut b = StreamBuilder::new();
    b.raw(&[TC_LONGSTRING]);
    b.long(1 << 40);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { offset: 5, .. }), "{err:?}");
}

#[test]
fn array_length_past_end_desyncs_before_allocation() {
    let mut b = StreamBuilder::new();
    b.begin_array(ClassSpec::array("[I"), 1_000_000);
    b.int(1).int(2);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { .. }), "{err:?}");

    let mut b = StreamBuilder::new();
    b.begin_array(ClassSpec::array("[I"), -1);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { .. }), "{err:?}");
}

#[test]
fn empty_string_and_empty_array() {
    let mut b = StreamBuilder::new();
    b.begin_object(
        ClassSpec::new("demo.Empty")
            .object_field("s", "Ljava/lang/String;")
            .object_field("a", "[I"),
    );
    b.string("");
    b.int_array(ClassSpec::array("[I"), &[]);
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(graph.root().unwrap()).unwrap();
    assert_eq!(obj.field("s"), Some(&GenericValue::String("".into())));
    let arr = graph.as_array(obj.field("a").unwrap()).unwrap();
    assert!(arr.elements.is_empty());
    assert_eq!(arr.component_type_name.as_ref(), "int");
}

#[test]
fn reset_restarts_handle_numbering() {
    let mut b = StreamBuilder::new();
    let first = b.string("a");
    b.reset();
    let second = b.string("b");
    assert_eq!(first, second);
    b.reference(second);
    let graph = decode_stream(&b.finish()).unwrap();
    assert_eq!(graph.resets, 1);
    assert_eq!(
        graph.roots,
        vec![
            GenericValue::String("a".into()),
            GenericValue::String("b".into()),
            GenericValue::String("b".into()),
        ]
    );
}

#[test]
fn reset_inside_object_is_rejected() {
    let mut b = StreamBuilder::new();
    b.begin_object(link_class());
    let offset = b.len();
    b.raw(&[TC_RESET]);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert_eq!(err, ProtocolError::UnexpectedReset { offset, depth: 1 });
}

#[test]
fn reference_to_handle_dropped_by_reset_is_soft() {
    let mut b = StreamBuilder::new();
    b.string("gone");
    b.reset();
    b.begin_object(link_class());
    b.reference(0x7e_0005);
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(&graph.roots[1]).unwrap();
    assert!(obj.partial);
    assert_eq!(obj.field("other"), Some(&GenericValue::Null));
    assert_eq!(graph.diagnostics.len(), 1);
}

#[test]
fn decoding_is_deterministic() {
    let mut b = StreamBuilder::new();
    let a = b.begin_object(link_class());
    b.begin_object(ClassRef::Handle(0x7e_0000));
    b.reference(a);
    b.string("trailer");
    let bytes = b.finish();
    let first = graph_to_json(&decode_stream(&bytes).unwrap());
    let second = graph_to_json(&decode_stream(&bytes).unwrap());
    assert_eq!(first, second);
}

/// A chain of `depth` objects, each holding the next in its only field.
fn node_chain(depth: usize) -> Vec<u8> {
    let mut b = StreamBuilder::new();
    for i in 0..depth {
        let class: ClassRef = if i == 0 {
            ClassSpec::new("demo.Node")
                .object_field("next", "Ljava/lang/Object;")
                .into()
        } else {
            ClassRef::Handle(0x7e_0000)
        };
        b.begin_object(class);
    }
    b.null();
    b.finish()
}

fn decode_on_2mib_thread(bytes: Vec<u8>) -> Result<usize, ProtocolError> {
    std::thread::Builder::new()
        .stack_size(2 << 20)
        .spawn(move || decode_stream(&bytes).map(|graph| graph.len()))
        .unwrap()
        .join()
        .unwrap()
}

#[test]
fn default_depth_limit_fits_a_small_thread_stack() {
    let depth = DecodeLimits::default().depth;
    assert_eq!(decode_on_2mib_thread(node_chain(depth)), Ok(depth));

    for deeper in [depth + 1, 5000] {
        let err = decode_on_2mib_thread(node_chain(deeper)).unwrap_err();
        assert!(
            matches!(
                err,
                ProtocolError::ResourceLimitExceeded {
                    limit: LimitKind::Depth,
                    ..
                }
            ),
            "{deeper}: {err:?}"
        );
    }
}

#[test]
fn depth_limit_stops_deep_nesting() {
    let mut b = StreamBuilder::new();
    for i in 0..10 {
        let class: ClassRef = if i == 0 {
            ClassSpec::array("[Ljava.lang.Object;").into()
        } else {
            ClassRef::Handle(0x7e_0000)
        };
        b.begin_array(class, 1);
    }
    b.null();
    let bytes = b.finish();

    assert!(decode_stream(&bytes).is_ok());
    let err = ObjectStreamDecoder::new()
        .with_limits(DecodeLimits::default().max_depth(3))
        .decode(&bytes)
        .unwrap_err();
    assert!(
        matches!(
            err,
            ProtocolError::ResourceLimitExceeded {
                limit: LimitKind::Depth,
                ..
            }
        ),
        "{err:?}"
    );
}

#[test]
fn handle_step_and_byte_limits() {
    let mut b = StreamBuilder::new();
    b.string("a");
    b.string("b");
    b.string("c");
    let bytes = b.finish();

    let limited = |limits: DecodeLimits| {
        ObjectStreamDecoder::new()
            .with_limits(limits)
            .decode(&bytes)
            .unwrap_err()
    };
    assert!(matches!(
        limited(DecodeLimits::default().max_handles(2)),
        ProtocolError::ResourceLimitExceeded {
            limit: LimitKind::Handles,
            ..
        }
    ));
    assert!(matches!(
        limited(DecodeLimits::default().max_steps(2)),
        ProtocolError::ResourceLimitExceeded {
            limit: LimitKind::Steps,
            ..
        }
    ));
    assert!(matches!(
        limited(DecodeLimits::default().max_bytes(3)),
        ProtocolError::ResourceLimitExceeded {
            limit: LimitKind::Bytes,
            ..
        }
    ));
}

#[test]
fn cancelled_token_stops_at_first_dispatch() {
    let token = CancelToken::new();
    token.cancel();
    let err = ObjectStreamDecoder::new()
        .with_cancel_token(token)
        .decode(&[0xac, 0xed, 0x00, 0x05, TC_NULL])
        .unwrap_err();
    assert_eq!(err, ProtocolError::Cancelled { offset: 4 });
}

#[test]
fn enum_constants_and_back_references() {
    let mut b = StreamBuilder::new();
    let red = b.enum_constant(ClassSpec::enumeration("demo.Color"), "RED");
    b.reference(red);
    b.enum_constant(
        ClassSpec::new("demo.Op$1")
            .flags(SC_SERIALIZABLE | SC_ENUM)
            .extends(ClassSpec::enumeration("demo.Op")),
        "PLUS",
    );
    let graph = decode_stream(&b.finish()).unwrap();
    let expected = GenericValue::Enum {
        class_name: "demo.Color".into(),
        constant: "RED".into(),
    };
    assert_eq!(graph.roots[0], expected);
    assert_eq!(graph.roots[1], expected);
    assert_eq!(
        graph.roots[2],
        GenericValue::Enum {
            class_name: "demo.Op".into(),
            constant: "PLUS".into(),
        }
    );
    assert!(graph.diagnostics.is_empty());
}

#[test]
fn proxy_class_objects() {
    let mut b = StreamBuilder::new();
    b.begin_object(ClassRef::Proxy(vec!["demo.Api".into(), "demo.Other".into()]));
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(graph.root().unwrap()).unwrap();
    assert_eq!(obj.class_name(), "$Proxy(demo.Api, demo.Other)");
    assert!(obj.levels[0].descriptor.is_proxy());
}

#[test]
fn externalizable_with_block_data() {
    let mut b = StreamBuilder::new();
    b.begin_object(ClassSpec::new("demo.Ext").flags(SC_EXTERNALIZABLE | SC_BLOCK_DATA));
    b.block(&[9, 8, 7]);
    b.string("inner");
    b.end_block();
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(graph.root().unwrap()).unwrap();
    assert_eq!(obj.extra_data(), vec![9, 8, 7]);
    assert_eq!(obj.extra_values().count(), 1);

    let mut b = StreamBuilder::new();
    b.begin_object(ClassSpec::new("demo.OldExt").flags(SC_EXTERNALIZABLE));
    b.raw(&[1, 2, 3]);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Unsupported { .. }), "{err:?}");
}

#[test]
fn top_level_block_data_is_a_root() {
    let mut b = StreamBuilder::new();
    b.block(&[1, 2]);
    b.null();
    let graph = decode_stream(&b.finish()).unwrap();
    assert_eq!(graph.roots[0], GenericValue::BlockData(vec![1, 2]));
    assert_eq!(graph.root(), Some(&GenericValue::Null));
}

#[test]
fn exceptions_top_level_and_nested() {
    let mut b = StreamBuilder::new();
    b.begin_exception();
    b.begin_object(ClassSpec::new("java.io.NotSerializableException"));
    b.end_exception();
    b.string("after");
    let graph = decode_stream(&b.finish()).unwrap();
    assert!(matches!(graph.roots[0], GenericValue::Exception(_)));
    let exc = graph.as_object(&graph.roots[0]).unwrap();
    assert_eq!(exc.class_name(), "java.io.NotSerializableException");
    assert_eq!(graph.roots[1], GenericValue::String("after".into()));
    assert_eq!(graph.diagnostics.len(), 1);

    let mut b = StreamBuilder::new();
    b.begin_object(link_class());
    let offset = b.len();
    b.raw(&[TC_EXCEPTION]);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert_eq!(err, ProtocolError::WriteAborted { offset });
}

#[test]
fn long_string_and_class_object() {
    let mut b = StreamBuilder::new();
    b.long_string("hello");
    b.class_object(ClassSpec::new("demo.Kind"));
    let graph = decode_stream(&b.finish()).unwrap();
    assert_eq!(graph.roots[0], GenericValue::String("hello".into()));
    match &graph.roots[1] {
        GenericValue::Class(desc) => assert_eq!(desc.name.as_ref(), "demo.Kind"),
        other => panic!("expected class, got {other:?}"),
    }
}

#[test]
fn invalid_text_is_replaced_with_a_diagnostic() {
    let mut b = StreamBuilder::new();
    b.raw(&[TC_STRING, 0x00, 0x02, 0xff, b'a']);
    let graph = decode_stream(&b.finish()).unwrap();
    assert_eq!(graph.root(), Some(&GenericValue::String("\u{FFFD}a".into())));
    assert_eq!(graph.diagnostics.len(), 1);
    assert_eq!(graph.diagnostics[0].handle, None);
}

#[test]
fn array_field_holding_a_string_is_flagged() {
    let mut b = StreamBuilder::new();
    b.begin_object(ClassSpec::new("demo.Odd").object_field("xs", "[D"));
    b.string("not an array");
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(graph.root().unwrap()).unwrap();
    assert!(obj.partial);
    assert_eq!(obj.field("xs"), Some(&GenericValue::String("not an array".into())));
}

#[test]
fn unknown_tag_desyncs() {
    let mut b = StreamBuilder::new();
    b.raw(&[0x6f]);
    let err = decode_stream(&b.finish()).unwrap_err();
    assert!(matches!(err, ProtocolError::Desync { offset: 4, .. }), "{err:?}");
}

#[test]
fn headless_streams() {
    let mut b = StreamBuilder::headless();
    b.string("x");
    let bytes = b.finish();
    let graph = ObjectStreamDecoder::new().decode_headless(&bytes).unwrap();
    assert_eq!(graph.root(), Some(&GenericValue::String("x".into())));
    assert!(matches!(
        decode_stream(&bytes),
        Err(ProtocolError::BadMagic { .. })
    ));
}

#[test]
fn inherited_fields_are_read_super_first() {
    let base = ClassSpec::new("demo.Base").field(b'I', "id");
    let mut b = StreamBuilder::new();
    b.begin_object(
        ClassSpec::new("demo.Derived")
            .field(b'D', "weight")
            .extends(base),
    );
    b.int(42).double(0.5);
    let graph = decode_stream(&b.finish()).unwrap();
    let obj = graph.as_object(graph.root().unwrap()).unwrap();
    let chain: Vec<_> = obj.class_chain().map(|d| d.name.to_string()).collect();
    assert_eq!(chain, ["demo.Base", "demo.Derived"]);
    assert_eq!(obj.field("id"), Some(&GenericValue::Primitive(Primitive::Int(42))));
    assert_eq!(
        obj.field("weight"),
        Some(&GenericValue::Primitive(Primitive::Double(0.5)))
    );
}

#[test]
fn graph_json_uses_node_references() {
    let mut b = StreamBuilder::new();
    let node = b.begin_object(link_class());
    b.reference(node);
    b.block(&[0xff]);
    let json = graph_to_json(&decode_stream(&b.finish()).unwrap());
    assert_eq!(json["roots"][0], serde_json::json!({ "$ref": 0 }));
    assert_eq!(
        json["nodes"][0]["levels"][0]["fields"]["other"],
        serde_json::json!({ "$ref": 0 })
    );
    assert_eq!(json["roots"][1], serde_json::json!({ "$block": "/w==" }));
}

fn primitives_class() -> ClassSpec {
    ClassSpec::new("demo.AllPrimitives")
        .field(b'B', "b")
        .field(b'C', "c")
        .field(b'D', "d")
        .field(b'F', "f")
        .field(b'I', "i")
        .field(b'J', "j")
        .field(b'S', "s")
        .field(b'Z', "z")
}

proptest! {
    #[test]
    fn primitive_fields_decode_to_written_values(
        byte in any::<i8>(),
        ch in any::<u16>(),
        d in any::<f64>(),
        f in any::<f32>(),
        i in any::<i32>(),
        j in any::<i64>(),
        s in any::<i16>(),
        z in any::<bool>(),
    ) {
        let mut b = StreamBuilder::new();
        b.begin_object(primitives_class());
        b.byte(byte).char(ch).double(d).float(f).int(i).long(j).short(s).boolean(z);
        let graph = decode_stream(&b.finish()).unwrap();
        let obj = graph.as_object(graph.root().unwrap()).unwrap();
        let field = |name: &str| match obj.field(name) {
            Some(GenericValue::Primitive(p)) => *p,
            other => panic!("{name}: {other:?}"),
        };
        prop_assert_eq!(field("b"), Primitive::Byte(byte));
        prop_assert_eq!(field("c"), Primitive::Char(ch));
        match field("d") {
            Primitive::Double(v) => prop_assert_eq!(v.to_bits(), d.to_bits()),
            other => prop_assert!(false, "d: {:?}", other),
        }
        match field("f") {
            Primitive::Float(v) => prop_assert_eq!(v.to_bits(), f.to_bits()),
            other => prop_assert!(false, "f: {:?}", other),
        }
        prop_assert_eq!(field("i"), Primitive::Int(i));
        prop_assert_eq!(field("j"), Primitive::Long(j));
        prop_assert_eq!(field("s"), Primitive::Short(s));
        prop_assert_eq!(field("z"), Primitive::Boolean(z));
    }

    #[test]
    fn arbitrary_bytes_never_panic(tail in proptest::collection::vec(any::<u8>(), 0..256)) {
        let mut bytes = STREAM_PREAMBLE.to_vec();
        bytes.extend_from_slice(&tail);
        let _ = ObjectStreamDecoder::new()
            .with_limits(DecodeLimits::default().max_depth(64))
            .decode(&bytes);
    }

    #[test]
    fn strings_survive_modified_utf8(text in "\\PC{0,40}") {
        let mut b = StreamBuilder::new();
        b.string(&text);
        let graph = decode_stream(&b.finish()).unwrap();
        let expected = GenericValue::String(text.as_str().into());
        prop_assert_eq!(graph.root(), Some(&expected));
        prop_assert!(graph.diagnostics.is_empty());
    }
}
