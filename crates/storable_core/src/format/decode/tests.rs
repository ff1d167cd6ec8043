use storable_testkit::{BIG32_2_7, Image};

use crate::format::{
	ClassName, DecodeOptions, EncodeOptions, Framing, Graph, HookKind, Immortal, IntWidth, Layout, NodeId, StorableError, TieKind, Value, freeze_with, hook_flags, key_flags, thaw,
	thaw_with,
};

fn root(graph: &Graph) -> &Value {
	graph.node(graph.root().expect("root set")).expect("root node")
}

fn seq(graph: &Graph, id: NodeId) -> Vec<NodeId> {
	match graph.node(id).expect("node") {
		Value::Sequence(items) => items.clone(),
		other => panic!("expected sequence, got {}", other.kind()),
	}
}

/// Encode a decoded image again with its own header.
fn refreeze(bytes: &[u8]) -> Vec<u8> {
	let thawed = thaw_with(bytes, &DecodeOptions::default()).expect("thaw");
	freeze_with(&thawed.graph, &EncodeOptions::for_header(&thawed.header, thawed.framing)).expect("refreeze")
}

fn blessed_class(graph: &Graph, id: NodeId) -> &str {
	match graph.node(id).expect("node") {
		Value::Blessed { class, .. } => std::str::from_utf8(class.as_bytes()).expect("utf-8 class"),
		other => panic!("expected blessed, got {}", other.kind()),
	}
}

#[test]
fn decodes_network_array_of_small_ints() {
	let bytes = Image::network().tag(0x02).be32(2).tag(0x08).u8(0x81).tag(0x08).u8(0x82).finish();
	let graph = thaw(&bytes).expect("thaw");

	let items = seq(&graph, graph.root().expect("root"));
	assert_eq!(graph.node(items[0]).expect("first"), &Value::Integer(1));
	assert_eq!(graph.node(items[1]).expect("second"), &Value::Integer(2));
}

#[test]
fn decodes_native_integer_and_double() {
	let big = Image::x86_64().tag(0x06).raw(&5_000_000_000_i64.to_le_bytes()).finish();
	assert_eq!(root(&thaw(&big).expect("thaw integer")), &Value::Integer(5_000_000_000));

	let double = Image::x86_64().tag(0x07).raw(&1.5_f64.to_le_bytes()).finish();
	assert_eq!(root(&thaw(&double).expect("thaw double")), &Value::Double(1.5));
}

#[test]
fn network_doubles_stay_in_host_order() {
	let bytes = Image::network().tag(0x07).raw(&(-2.25_f64).to_ne_bytes()).finish();
	assert_eq!(root(&thaw(&bytes).expect("thaw")), &Value::Double(-2.25));
}

#[test]
fn decodes_big_endian_native_image() {
	let bytes = Image::with_header(&BIG32_2_7)
		.tag(0x02)
		.be32(2)
		.tag(0x06)
		.be32(-70_000)
		.tag(0x01)
		.long_be(b"big")
		.finish();
	let thawed = thaw_with(&bytes, &DecodeOptions::default()).expect("thaw");
	let Layout::Native(native) = thawed.header.layout else {
		panic!("expected native layout");
	};
	assert_eq!(native.byteorder.width, IntWidth::W32);
	assert_eq!(thawed.header.minor, 7);

	let items = seq(&thawed.graph, thawed.graph.root().expect("root"));
	assert_eq!(thawed.graph.node(items[0]).expect("int"), &Value::Integer(-70_000));
	assert_eq!(thawed.graph.node(items[1]).expect("string"), &Value::ByteString(b"big".to_vec()));
}

#[test]
fn detects_file_framing() {
	let bytes = Image::network().tag(0x08).u8(0x85).framed().finish();
	let thawed = thaw_with(&bytes, &DecodeOptions::default()).expect("thaw framed");
	assert_eq!(thawed.framing, Framing::File);
	assert_eq!(root(&thawed.graph), &Value::Integer(5));
}

#[test]
fn utf8_strings_become_text() {
	let bytes = Image::network().tag(0x17).short("é".as_bytes()).finish();
	assert_eq!(root(&thaw(&bytes).expect("thaw")), &Value::TextString("é".as_bytes().to_vec()));
}

#[test]
fn immortals_decode_by_kind() {
	for (tag, expected) in [(0x0e, Immortal::Undef), (0x0f, Immortal::Yes), (0x10, Immortal::No), (0x1f, Immortal::UndefElem)] {
		let bytes = Image::network().tag(tag).finish();
		assert_eq!(root(&thaw(&bytes).expect("thaw")), &Value::Immortal(expected));
	}
}

#[test]
fn self_referencing_array_is_cyclic() {
	let bytes = Image::network().tag(0x02).be32(1).tag(0x04).tag(0x00).be32(0).finish();
	let graph = thaw(&bytes).expect("thaw");

	let array = graph.root().expect("root");
	let items = seq(&graph, array);
	assert_eq!(graph.node(items[0]).expect("ref"), &Value::Reference(array));
}

#[test]
fn blessed_value_shares_index_with_wrapper() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x11)
		.short(b"Foo")
		.tag(0x02)
		.be32(0)
		.tag(0x00)
		.be32(1)
		.finish();
	let graph = thaw(&bytes).expect("thaw");

	let items = seq(&graph, graph.root().expect("root"));
	assert_eq!(items[0], items[1]);
	let Value::Blessed { class, inner } = graph.node(items[0]).expect("blessed") else {
		panic!("expected blessed node");
	};
	assert_eq!(class, &ClassName::from("Foo"));
	assert_eq!(graph.node(*inner).expect("inner"), &Value::Sequence(Vec::new()));
}

#[test]
fn indexed_bless_reuses_class_table() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x11)
		.short(b"Foo")
		.tag(0x03)
		.be32(0)
		.tag(0x12)
		.u8(0)
		.tag(0x03)
		.be32(0)
		.finish();
	let graph = thaw(&bytes).expect("thaw");

	let items = seq(&graph, graph.root().expect("root"));
	assert_ne!(items[0], items[1]);
	for item in items {
		assert!(matches!(graph.node(item).expect("item"), Value::Blessed { class, .. } if class.as_bytes() == b"Foo"));
	}
}

#[test]
fn unknown_class_index_is_rejected() {
	let bytes = Image::network().tag(0x12).u8(3).tag(0x05).finish();
	let err = thaw(&bytes).expect_err("no classes declared");
	assert!(matches!(err, StorableError::InvalidClassIndex { index: 3, at: 3, known: 0 }));
}

#[test]
fn back_reference_while_bless_pending_is_rejected() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x03)
		.be32(0)
		.tag(0x11)
		.short(b"Foo")
		.tag(0x00)
		.be32(1)
		.finish();
	let err = thaw(&bytes).expect_err("object after bless");
	assert!(matches!(err, StorableError::UnexpectedTag { tag: "OBJECT", .. }));
}

#[test]
fn dangling_back_reference_is_rejected() {
	let bytes = Image::network().tag(0x04).tag(0x00).be32(7).finish();
	let err = thaw(&bytes).expect_err("index 7 unseen");
	assert!(matches!(err, StorableError::InvalidBackReference { index: 7, at: 3, seen: 1 }));
}

#[test]
fn flagged_hash_keeps_flags_and_sv_keys() {
	let bytes = Image::network()
		.tag(0x19)
		.u8(0x01)
		.be32(2)
		.tag(0x08)
		.u8(0x81)
		.u8(key_flags::UTF8 | key_flags::LOCKED)
		.long_be("ü".as_bytes())
		.tag(0x08)
		.u8(0x82)
		.u8(key_flags::IS_SV)
		.tag(0x0a)
		.short(b"k")
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let Value::Mapping(map) = root(&graph) else {
		panic!("expected mapping");
	};
	assert_eq!(map.hash_flags, Some(0x01));
	assert_eq!(map.entries[0].key, "ü".as_bytes());
	assert_eq!(map.entries[0].flags, key_flags::UTF8 | key_flags::LOCKED);
	assert_eq!(map.entries[1].key, b"k");
	assert_eq!(graph.node(map.get(b"k").expect("k present")).expect("value"), &Value::Integer(2));
}

#[test]
fn sv_key_consumes_an_object_index() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x19)
		.u8(0)
		.be32(1)
		.tag(0x05)
		.u8(key_flags::IS_SV)
		.tag(0x0a)
		.short(b"k")
		.tag(0x00)
		.be32(3)
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let items = seq(&graph, graph.root().expect("root"));
	assert_eq!(graph.node(items[1]).expect("key scalar"), &Value::ByteString(b"k".to_vec()));
}

#[test]
fn duplicate_hash_keys_are_rejected() {
	let bytes = Image::network()
		.tag(0x03)
		.be32(2)
		.tag(0x05)
		.long_be(b"a")
		.tag(0x05)
		.long_be(b"a")
		.finish();
	let err = thaw(&bytes).expect_err("duplicate key");
	assert!(matches!(err, StorableError::DuplicateMappingKey { ref key, at: 14 } if key == "a"));
}

#[test]
fn decodes_hook_with_class_by_name() {
	let bytes = Image::network().tag(0x13).u8(hook_flags::TYPE_HASH).short(b"Foo").short(b"ab").finish();
	let graph = thaw(&bytes).expect("thaw");
	let Value::Hook(hook) = root(&graph) else {
		panic!("expected hook");
	};
	assert_eq!(hook.class, ClassName::from("Foo"));
	assert_eq!(hook.kind, HookKind::Hash);
	assert_eq!(hook.frozen, b"ab");
	assert!(hook.refs.is_empty());
}

#[test]
fn hook_class_index_follows_bless_table() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x11)
		.short(b"Foo")
		.tag(0x03)
		.be32(0)
		.tag(0x13)
		.u8(hook_flags::TYPE_HASH | hook_flags::IDX_CLASSNAME)
		.u8(0)
		.short(b"x")
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let items = seq(&graph, graph.root().expect("root"));
	assert!(matches!(graph.node(items[1]).expect("hook"), Value::Hook(hook) if hook.class.as_bytes() == b"Foo"));
}

#[test]
fn hook_list_resolves_earlier_objects() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x02)
		.be32(0)
		.tag(0x13)
		.u8(hook_flags::HAS_LIST | hook_flags::TYPE_HASH)
		.short(b"Foo")
		.u8(0)
		.u8(1)
		.be32(1)
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let items = seq(&graph, graph.root().expect("root"));
	let Value::Hook(hook) = graph.node(items[1]).expect("hook") else {
		panic!("expected hook");
	};
	assert_eq!(hook.refs, vec![items[0]]);
}

#[test]
fn hook_recursion_stores_objects_before_flags() {
	let bytes = Image::network()
		.tag(0x13)
		.u8(hook_flags::NEED_RECURSE | hook_flags::TYPE_HASH)
		.tag(0x08)
		.u8(0x85)
		.u8(hook_flags::HAS_LIST | hook_flags::TYPE_HASH)
		.short(b"Foo")
		.u8(0)
		.u8(1)
		.be32(1)
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let Value::Hook(hook) = root(&graph) else {
		panic!("expected hook");
	};
	assert_eq!(hook.refs.len(), 1);
	assert_eq!(graph.node(hook.refs[0]).expect("recursed"), &Value::Integer(5));
}

#[test]
fn tied_hook_reads_tie_object() {
	let bytes = Image::network()
		.tag(0x13)
		.u8(hook_flags::TYPE_EXTRA)
		.u8(hook_flags::EXTRA_TIED_ARRAY)
		.short(b"Foo")
		.u8(0)
		.tag(0x03)
		.be32(0)
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let Value::Hook(hook) = root(&graph) else {
		panic!("expected hook");
	};
	assert_eq!(hook.kind, HookKind::TiedArray);
	let tied = hook.tied.expect("tie object");
	assert!(matches!(graph.node(tied).expect("tie"), Value::Mapping(_)));
}

#[test]
fn code_source_consumes_two_indices() {
	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x1a)
		.tag(0x0a)
		.short(b"sub { 1 }")
		.tag(0x00)
		.be32(1)
		.finish();
	let graph = thaw(&bytes).expect("thaw");
	let items = seq(&graph, graph.root().expect("root"));
	assert_eq!(items[0], items[1]);
	assert!(matches!(graph.node(items[0]).expect("code"), Value::CodeRef(Some(src)) if src.text == b"sub { 1 }"));

	let bytes = Image::network()
		.tag(0x02)
		.be32(2)
		.tag(0x1a)
		.tag(0x0a)
		.short(b"sub { 1 }")
		.tag(0x00)
		.be32(2)
		.finish();
	let err = thaw(&bytes).expect_err("source text is not addressable");
	assert!(matches!(err, StorableError::InvalidBackReference { index: 2, .. }));
}

#[test]
fn decodes_vstring_regexp_and_tied_elements() {
	let vstring = Image::network().tag(0x1d).short(b"v1.2").tag(0x0a).short(&[1, 2]).finish();
	assert_eq!(
		root(&thaw(&vstring).expect("vstring")),
		&Value::VString {
			magic: b"v1.2".to_vec(),
			string: vec![1, 2],
			utf8: false,
		}
	);

	let regexp = Image::network().tag(0x20).u8(0).short(b"a.b").short(b"i").finish();
	assert_eq!(
		root(&thaw(&regexp).expect("regexp")),
		&Value::Regexp {
			pattern: b"a.b".to_vec(),
			flags: b"i".to_vec(),
		}
	);

	let tied_idx = Image::network().tag(0x16).tag(0x02).be32(0).be32(3).finish();
	assert!(matches!(
		root(&thaw(&tied_idx).expect("tied idx")),
		Value::Tied {
			kind: TieKind::Index(3),
			..
		}
	));

	let tied_key = Image::network().tag(0x15).tag(0x03).be32(0).tag(0x0a).short(b"k").finish();
	let graph = thaw(&tied_key).expect("tied key");
	let Value::Tied { kind: TieKind::Key(key), .. } = root(&graph) else {
		panic!("expected tied key");
	};
	assert_eq!(graph.node(*key).expect("key"), &Value::ByteString(b"k".to_vec()));
}

#[test]
fn weak_and_overloaded_references_round_trip() {
	let weak = Image::network().tag(0x1b).tag(0x02).be32(0).finish();
	let graph = thaw(&weak).expect("weakref");
	let Value::WeakReference(target) = root(&graph) else {
		panic!("expected weak reference");
	};
	assert_eq!(graph.node(*target).expect("target"), &Value::Sequence(Vec::new()));
	assert_eq!(refreeze(&weak), weak);

	let overload = Image::network().tag(0x14).tag(0x11).short(b"Num").tag(0x03).be32(0).finish();
	let graph = thaw(&overload).expect("overload");
	let Value::Overloaded(target) = root(&graph) else {
		panic!("expected overloaded reference");
	};
	assert_eq!(blessed_class(&graph, *target), "Num");
	assert_eq!(refreeze(&overload), overload);

	let weak_overload = Image::network().tag(0x1c).tag(0x11).short(b"Num").tag(0x0a).short(b"7").finish();
	let graph = thaw(&weak_overload).expect("weak overload");
	let Value::WeakOverloaded(target) = root(&graph) else {
		panic!("expected weak overloaded reference");
	};
	assert_eq!(blessed_class(&graph, *target), "Num");
	assert_eq!(refreeze(&weak_overload), weak_overload);
}

#[test]
fn tied_containers_round_trip() {
	let cases = [
		(0x0b, TieKind::Array, b"Tie::StdArray".as_slice()),
		(0x0c, TieKind::Hash, b"Tie::StdHash".as_slice()),
		(0x0d, TieKind::Scalar, b"Tie::StdScalar".as_slice()),
	];
	for (tag, expected, class) in cases {
		// The tie object is a reference to the blessed implementation.
		let bytes = Image::network().tag(tag).tag(0x04).tag(0x11).short(class).tag(0x02).be32(0).finish();
		let graph = thaw(&bytes).expect("tied container");
		let Value::Tied { kind, object } = root(&graph) else {
			panic!("expected tied value for tag {tag:#x}");
		};
		assert_eq!(*kind, expected);
		let Value::Reference(blessed) = graph.node(*object).expect("tie object") else {
			panic!("expected reference tie object");
		};
		assert_eq!(blessed_class(&graph, *blessed).as_bytes(), class);
		assert_eq!(refreeze(&bytes), bytes, "tag {tag:#x}");
	}
}

#[test]
fn long_utf8_and_vstring_forms_round_trip() {
	let text = "\u{e9}".repeat(150);
	let bytes = Image::network().tag(0x18).long_be(text.as_bytes()).finish();
	assert_eq!(root(&thaw(&bytes).expect("lutf8str")), &Value::TextString(text.into_bytes()));
	assert_eq!(refreeze(&bytes), bytes);

	let mut magic = b"v1".to_vec();
	magic.extend(b".0".repeat(150));
	let bytes = Image::network().tag(0x1e).long_be(&magic).tag(0x0a).short(&[1, 0]).finish();
	assert_eq!(
		root(&thaw(&bytes).expect("lvstring")),
		&Value::VString {
			magic,
			string: vec![1, 0],
			utf8: false,
		}
	);
	assert_eq!(refreeze(&bytes), bytes);
}

#[test]
fn trailing_bytes_are_rejected() {
	let bytes = Image::network().tag(0x08).u8(0x81).u8(0xff).finish();
	let err = thaw(&bytes).expect_err("one byte too many");
	assert!(matches!(err, StorableError::TrailingBytes { at: 4, rem: 1 }));
}

#[test]
fn decodes_large_object_array() {
	let bytes = Image::network().tag(0x21).tag(0x02).raw(&1_u64.to_be_bytes()).tag(0x08).u8(0x81).finish();
	let graph = thaw(&bytes).expect("thaw");
	let items = seq(&graph, graph.root().expect("root"));
	assert_eq!(graph.node(items[0]).expect("item"), &Value::Integer(1));
}

#[test]
fn tags_newer_than_minor_are_unknown() {
	let bytes = Image::with_header(&[0x05, 0x09]).tag(0x20).u8(0).short(b"x").short(b"").finish();
	let err = thaw(&bytes).expect_err("regexp needs 2.10");
	assert!(matches!(err, StorableError::UnknownTag { tag: 0x20, at: 2, minor: 9 }));

	let err = thaw(&Image::network().tag(0x22).finish()).expect_err("boolean tags are not catalogued");
	assert!(matches!(err, StorableError::UnknownTag { tag: 0x22, .. }));
}

#[test]
fn truncated_body_reports_offset() {
	let bytes = Image::network().tag(0x02).be32(2).tag(0x08).u8(0x81).finish();
	let err = thaw(&bytes).expect_err("second element missing");
	assert!(matches!(err, StorableError::Truncated { at: 9, need: 1, rem: 0 }));
}

#[test]
fn limits_are_enforced() {
	let opt = DecodeOptions { max_length: 4, max_depth: 3 };

	let long = Image::network().tag(0x01).long_be(b"hello").finish();
	let err = thaw_with(&long, &opt).expect_err("length above ceiling");
	assert!(matches!(err, StorableError::LengthOutOfRange { len: 5, at: 3, max: 4 }));

	let deep = Image::network().tag(0x04).tag(0x04).tag(0x04).tag(0x05).finish();
	let err = thaw_with(&deep, &opt).expect_err("too deep");
	assert!(matches!(err, StorableError::DepthExceeded { max_depth: 3 }));

	let negative = Image::network().tag(0x02).be32(-1).finish();
	assert!(matches!(thaw(&negative), Err(StorableError::LengthOutOfRange { len: -1, .. })));
}
