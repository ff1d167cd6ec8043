use crate::format::{ByteOrder, Cursor, Endianness, Framing, Header, IntWidth, Layout, MAX_MINOR, NativeLayout, StorableError, Writer};

fn x86_64_header(minor: u8) -> Vec<u8> {
	let mut bytes = vec![0x04, minor, 8];
	bytes.extend_from_slice(b"12345678");
	bytes.extend_from_slice(&[4, 8, 8, 8]);
	bytes
}

#[test]
fn parses_network_memory_header() {
	let bytes = [0x05, 0x07, 0xaa];
	let mut cursor = Cursor::new(&bytes);
	let header = Header::parse(&mut cursor, Framing::Memory).expect("header parses");
	assert_eq!(header.major, 2);
	assert_eq!(header.minor, 7);
	assert!(header.is_network());
	assert_eq!(header.endianness(), Endianness::Big);
	assert_eq!(cursor.pos(), 2);
}

#[test]
fn parses_native_x86_64_header() {
	let bytes = x86_64_header(9);
	let mut cursor = Cursor::new(&bytes);
	let header = Header::parse(&mut cursor, Framing::Memory).expect("header parses");
	assert_eq!(header.layout, Layout::Native(NativeLayout::X86_64_LINUX));
	assert_eq!(header.int_width(), IntWidth::W64);
	assert_eq!(header.endianness(), Endianness::Little);
	assert_eq!(cursor.remaining(), 0);
}

#[test]
fn parses_big_endian_32bit_file_header() {
	let mut bytes = b"pst0".to_vec();
	bytes.extend_from_slice(&[0x04, 0x06, 4]);
	bytes.extend_from_slice(b"4321");
	bytes.extend_from_slice(&[4, 4, 4, 8]);
	let mut cursor = Cursor::new(&bytes);
	let header = Header::parse(&mut cursor, Framing::File).expect("sun4 header parses");
	assert_eq!(header.layout, Layout::Native(NativeLayout::SUN4_SOLARIS));
	assert_eq!(header.int_width(), IntWidth::W32);
	assert_eq!(header.endianness(), Endianness::Big);
}

#[test]
fn old_minor_has_no_nv_size() {
	let mut bytes = vec![0x04, 0x01, 4];
	bytes.extend_from_slice(b"1234");
	bytes.extend_from_slice(&[4, 4, 4]);
	let mut cursor = Cursor::new(&bytes);
	let header = Header::parse(&mut cursor, Framing::Memory).expect("2.1 header parses");
	assert_eq!(header.minor, 1);
	assert_eq!(cursor.remaining(), 0);
}

#[test]
fn rejects_missing_magic() {
	let err = Header::parse(&mut Cursor::new(b"pstX\x05\x07"), Framing::File).expect_err("bad magic");
	assert!(matches!(err, StorableError::BadMagic { magic } if magic == *b"pstX"));

	let err = Header::parse(&mut Cursor::new(b"ps"), Framing::File).expect_err("short magic");
	assert!(matches!(err, StorableError::BadMagic { .. }));
}

#[test]
fn rejects_newer_minor_and_other_majors() {
	let err = Header::parse(&mut Cursor::new(&[0x05, MAX_MINOR + 1]), Framing::Memory).expect_err("too new");
	assert!(matches!(err, StorableError::UnsupportedVersion { major: 2, .. }));

	let err = Header::parse(&mut Cursor::new(b"pst0\x07\x00"), Framing::File).expect_err("major 3");
	assert!(matches!(err, StorableError::UnsupportedVersion { major: 3, .. }));
}

#[test]
fn unframed_foreign_bytes_are_not_an_image() {
	let err = Header::parse(&mut Cursor::new(b"hello world"), Framing::Memory).expect_err("text");
	assert!(matches!(err, StorableError::BadMagic { magic } if magic == *b"hell"));

	let err = Header::parse(&mut Cursor::new(&[0x07]), Framing::Memory).expect_err("major 3 without magic");
	assert!(matches!(err, StorableError::BadMagic { magic } if magic == [0x07, 0, 0, 0]));
}

#[test]
fn rejects_unknown_byteorder_and_nv_size() {
	let mut bytes = vec![0x04, 0x07, 4];
	bytes.extend_from_slice(b"3412");
	bytes.extend_from_slice(&[4, 4, 4, 8]);
	let err = Header::parse(&mut Cursor::new(&bytes), Framing::Memory).expect_err("pdp order");
	assert!(matches!(err, StorableError::UnsupportedArchitecture { .. }));

	let mut bytes = x86_64_header(7);
	*bytes.last_mut().expect("nv byte") = 16;
	let err = Header::parse(&mut Cursor::new(&bytes), Framing::Memory).expect_err("long double");
	assert!(matches!(err, StorableError::UnsupportedArchitecture { .. }));
}

#[test]
fn truncated_header_is_reported() {
	let bytes = x86_64_header(7);
	let err = Header::parse(&mut Cursor::new(&bytes[..6]), Framing::Memory).expect_err("cut in byteorder");
	assert!(matches!(err, StorableError::Truncated { .. }));
}

#[test]
fn write_reproduces_parsed_bytes() {
	let mut file = b"pst0".to_vec();
	file.extend_from_slice(&x86_64_header(11));
	let header = Header::parse(&mut Cursor::new(&file), Framing::File).expect("parses");
	let mut writer = Writer::new();
	header.write(&mut writer, Framing::File);
	assert_eq!(writer.into_bytes(), file);

	let mut writer = Writer::new();
	Header::new(7, Layout::Network).write(&mut writer, Framing::Memory);
	assert_eq!(writer.into_bytes(), vec![0x05, 0x07]);
}

#[test]
fn byteorder_strings_match_perl() {
	let order = ByteOrder {
		width: IntWidth::W64,
		endianness: Endianness::Big,
	};
	assert_eq!(order.as_bytes(), b"87654321");
	assert_eq!(Framing::detect(b"pst0\x04"), Framing::File);
	assert_eq!(Framing::detect(&[0x04, 0x07]), Framing::Memory);
}
