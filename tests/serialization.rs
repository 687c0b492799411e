use flate2::read::ZlibDecoder;
use objectproperty::{
    error::{EncodingError, Error, FileError, TypeError},
    pclass::{PropertyObject, TypeSystem, Value, WizardHashCalculator},
    serialization::{
        BinarySerializer, BinarySerializerFlags, FileMode, JsonSerializer, SerializedFile,
        XmlSerializer,
    },
};
use pretty_assertions::assert_eq;
use std::io::Read;
use test_log::test;

const SAMPLE_DIR: &str = "test_resources/samples/";

const TEST_OBJECT: &str = "class TestObject";
const TEST_STRING: &str = "This is a test value";
const TEST_WSTRING: &str = "\u{1d57}\u{2b0}\u{2071}\u{2e2}\u{20}\u{2071}\u{2e2}\u{20}\u{1d43}\u{20}\
                            \u{1d57}\u{1d49}\u{2e2}\u{1d57}\u{20}\u{1d5b}\u{1d43}\u{2e1}\u{1d58}\u{1d49}";

fn sample(name: &str) -> Vec<u8> {
    std::fs::read(format!("{SAMPLE_DIR}{name}")).unwrap()
}

fn type_system() -> TypeSystem {
    let mut types = TypeSystem::new(Box::new(WizardHashCalculator));
    types
        .define_class(TEST_OBJECT)
        .property("m_int4", "bi4")
        .property("m_int8", "char")
        .property("m_int16", "short")
        .property("m_int24", "s24")
        .property("m_int32", "int")
        .property("m_int64", "long")
        .property("m_uint4", "bui4")
        .property("m_uint8", "unsigned char")
        .property("m_uint16", "unsigned short")
        .property("m_uint24", "u24")
        .property("m_uint32", "unsigned int")
        .property("m_uint64", "unsigned long")
        .property("m_string", "std::string")
        .property("m_wstring", "std::wstring")
        .property("m_float32", "float")
        .property("m_float64", "double")
        .pointer("m_int_ptr", "int")
        .array("m_int_array", "int", 5)
        .pointer_array("m_int_ptr_array", "int", 5)
        .vector("m_int_vector", "int")
        .pointer_vector("m_int_ptr_vector", "int")
        .register()
        .unwrap();
    types
}

fn test_object(types: &TypeSystem) -> PropertyObject {
    let mut instance = types.instantiate(TEST_OBJECT).unwrap();

    instance.set("m_int4", -6).unwrap();
    instance.set("m_int8", 0x01).unwrap();
    instance.set("m_int16", 0x0203).unwrap();
    instance.set("m_int24", 0x0405_06).unwrap();
    instance.set("m_int32", 0x0708_090A).unwrap();
    instance.set("m_int64", 0x0B0C_0D0E_0F10_1112_i64).unwrap();

    instance.set("m_uint4", 5u8).unwrap();
    instance.set("m_uint8", 0x01_u8).unwrap();
    instance.set("m_uint16", 0x0203_u16).unwrap();
    instance.set("m_uint24", 0x0405_06_u32).unwrap();
    instance.set("m_uint32", 0x0708_090A_u32).unwrap();
    instance.set("m_uint64", 0x0B0C_0D0E_0F10_1112_u64).unwrap();

    instance.set("m_string", TEST_STRING).unwrap();
    instance.set("m_wstring", TEST_WSTRING).unwrap();

    instance.set("m_float32", 3.141_592_7_f32).unwrap();
    instance.set("m_float64", std::f64::consts::PI).unwrap();

    instance.set("m_int_ptr", 52).unwrap();

    instance
        .set_all("m_int_array", (0..5).map(Value::from))
        .unwrap();
    instance
        .set_all("m_int_ptr_array", (0..5).map(Value::from))
        .unwrap();
    instance
        .set_all("m_int_vector", (0..100).map(Value::from))
        .unwrap();
    instance
        .set_all("m_int_ptr_vector", (0..100).map(Value::from))
        .unwrap();

    instance
}

#[test]
fn binary_serialization_matches_samples() {
    let types = type_system();
    let object = test_object(&types);

    for (name, is_file, flags) in [
        ("regular.bin", false, BinarySerializerFlags::NONE),
        (
            "file.bin",
            true,
            BinarySerializerFlags::WRITE_SERIALIZER_FLAGS,
        ),
    ] {
        let serializer = BinarySerializer::new(&types, is_file, flags);
        let bytes = serializer.serialize(&object).unwrap();
        assert_eq!(bytes, sample(name), "mismatch for {name}");
    }
}

#[test]
fn binary_deserialization_matches_samples() {
    let types = type_system();
    let expected = test_object(&types);

    for (name, is_file, flags) in [
        ("regular.bin", false, BinarySerializerFlags::NONE),
        (
            "file.bin",
            true,
            BinarySerializerFlags::WRITE_SERIALIZER_FLAGS,
        ),
        ("regular_compressed.bin", false, BinarySerializerFlags::COMPRESSED),
        (
            "file_compressed.bin",
            true,
            BinarySerializerFlags::from_bits_truncate(9),
        ),
    ] {
        let serializer = BinarySerializer::new(&types, is_file, flags);
        let decoded = serializer.deserialize(&sample(name)).unwrap();
        assert_eq!(decoded, expected, "mismatch for {name}");
    }
}

#[test]
fn compressed_regular_envelope() {
    let types = type_system();
    let object = test_object(&types);

    let plain = BinarySerializer::new(&types, false, BinarySerializerFlags::NONE)
        .serialize(&object)
        .unwrap();
    let compressed = BinarySerializer::new(&types, false, BinarySerializerFlags::COMPRESSED)
        .serialize(&object)
        .unwrap();

    // The envelope starts with the little-endian uncompressed size; inflating
    // the remainder yields the exact uncompressed body.
    let size = u32::from_le_bytes(compressed[..4].try_into().unwrap()) as usize;
    assert_eq!(size, plain.len());

    let mut inflated = Vec::new();
    ZlibDecoder::new(&compressed[4..])
        .read_to_end(&mut inflated)
        .unwrap();
    assert_eq!(inflated, plain);
}

#[test]
fn corrupt_compressed_envelope() {
    let types = type_system();
    let serializer = BinarySerializer::new(&types, false, BinarySerializerFlags::COMPRESSED);
    let err = serializer.deserialize(&[5, 0, 0, 0, 0xAA, 0xBB, 0xCC]).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::DecompressFailed(_))
    ));
}

#[test]
fn binary_round_trips() {
    let types = type_system();
    let object = test_object(&types);

    for (is_file, flags) in [
        (false, BinarySerializerFlags::NONE),
        (true, BinarySerializerFlags::WRITE_SERIALIZER_FLAGS),
        (false, BinarySerializerFlags::COMPRESSED),
        (true, BinarySerializerFlags::from_bits_truncate(9)),
    ] {
        let serializer = BinarySerializer::new(&types, is_file, flags);
        let bytes = serializer.serialize(&object).unwrap();
        let decoded = serializer.deserialize(&bytes).unwrap();
        assert_eq!(decoded, object, "round trip failed for {flags:?}");
    }
}

#[test]
fn json_serialization_matches_samples() {
    let types = type_system();
    let object = test_object(&types);

    let regular = JsonSerializer::new(&types, false).save(&object).unwrap();
    assert_eq!(regular.as_bytes(), sample("regular.json").as_slice());

    let file = JsonSerializer::new(&types, true).save(&object).unwrap();
    assert_eq!(file.as_bytes(), sample("file.json").as_slice());
}

#[test]
fn json_round_trips() {
    let types = type_system();
    let object = test_object(&types);

    for is_file in [false, true] {
        let serializer = JsonSerializer::new(&types, is_file);
        let text = serializer.save(&object).unwrap();
        let decoded = serializer.load(&text).unwrap();
        assert_eq!(decoded, object, "round trip failed for is_file={is_file}");
    }
}

#[test]
fn xml_round_trips() {
    let types = type_system();
    let object = test_object(&types);

    for is_file in [false, true] {
        let serializer = XmlSerializer::new(&types, is_file);
        let text = serializer.save(&object).unwrap();
        let decoded = serializer.load(&text).unwrap();
        assert_eq!(decoded, object, "round trip failed for is_file={is_file}");
    }
}

#[test]
fn xml_shape() {
    let types = type_system();
    let object = test_object(&types);

    let regular = XmlSerializer::new(&types, false).save(&object).unwrap();
    assert!(regular.starts_with(r#"<Class name="class TestObject">"#));

    let file = XmlSerializer::new(&types, true).save(&object).unwrap();
    assert!(file.starts_with("<Objects>"));
    assert!(file.ends_with("</Objects>"));
}

#[test]
fn primitive_boundary_values_round_trip() {
    let mut types = TypeSystem::new(Box::new(WizardHashCalculator));
    types
        .define_class("class Boundaries")
        .property("m_byt", "char")
        .property("m_ubyt", "unsigned char")
        .property("m_shrt", "short")
        .property("m_ushrt", "unsigned short")
        .property("m_int", "int")
        .property("m_uint", "unsigned int")
        .property("m_gid", "gid")
        .register()
        .unwrap();

    let mut object = types.instantiate("class Boundaries").unwrap();
    object.set("m_byt", -127).unwrap();
    object.set("m_ubyt", 255u8).unwrap();
    object.set("m_shrt", -32768).unwrap();
    object.set("m_ushrt", 65535u16).unwrap();
    object.set("m_int", -2_147_483_648).unwrap();
    object.set("m_uint", 4_294_967_295_u32).unwrap();
    object
        .set("m_gid", Value::Gid(0x8899_AABB_CCDD_EEFF))
        .unwrap();

    for is_file in [false, true] {
        let serializer = BinarySerializer::new(&types, is_file, BinarySerializerFlags::NONE);
        let decoded = serializer
            .deserialize(&serializer.serialize(&object).unwrap())
            .unwrap();
        assert_eq!(decoded, object);

        let serializer = JsonSerializer::new(&types, is_file);
        let decoded = serializer.load(&serializer.save(&object).unwrap()).unwrap();
        assert_eq!(decoded, object);

        let serializer = XmlSerializer::new(&types, is_file);
        let decoded = serializer.load(&serializer.save(&object).unwrap()).unwrap();
        assert_eq!(decoded, object);
    }
}

fn graph_type_system() -> TypeSystem {
    let mut types = TypeSystem::new(Box::new(WizardHashCalculator));
    types
        .define_enum("enum Rarity")
        .element("COMMON", 0)
        .element("RARE", 1)
        .element("EPIC", 2)
        .register()
        .unwrap();
    types
        .define_class("class Item")
        .property("m_name", "std::string")
        .property("m_rarity", "enum Rarity")
        .register()
        .unwrap();
    types
        .define_class("class EnchantedItem")
        .base("class Item")
        .property("m_charges", "int")
        .register()
        .unwrap();
    types
        .define_class("class Inventory")
        .property("m_gold", "unsigned int")
        .pointer("m_held", "class Item")
        .pointer("m_empty_slot", "class Item")
        .pointer_vector("m_backpack", "class Item")
        .register()
        .unwrap();
    types
}

fn inventory(types: &TypeSystem) -> PropertyObject {
    let mut held = types.instantiate("class EnchantedItem").unwrap();
    held.set("m_name", "wand").unwrap();
    held.set("m_rarity", Value::Enum(2)).unwrap();
    held.set("m_charges", 11).unwrap();

    let mut spare = types.instantiate("class Item").unwrap();
    spare.set("m_name", "rope").unwrap();
    spare.set("m_rarity", Value::Enum(0)).unwrap();

    let mut inventory = types.instantiate("class Inventory").unwrap();
    inventory.set("m_gold", 250u32).unwrap();
    inventory.set("m_held", held).unwrap();
    inventory
        .set_all("m_backpack", [Value::from(spare), Value::Null])
        .unwrap();
    inventory
}

#[test]
fn polymorphic_graph_round_trips() {
    let types = graph_type_system();
    let object = inventory(&types);

    for (is_file, flags) in [
        (false, BinarySerializerFlags::NONE),
        (true, BinarySerializerFlags::WRITE_SERIALIZER_FLAGS),
    ] {
        let serializer = BinarySerializer::new(&types, is_file, flags);
        let decoded = serializer
            .deserialize(&serializer.serialize(&object).unwrap())
            .unwrap();
        assert_eq!(decoded, object);

        // The held item decodes back as its concrete subclass.
        let held = decoded.get("m_held").unwrap().as_object().unwrap();
        assert_eq!(held.class().name(), "class EnchantedItem");
        assert!(decoded.is_null("m_empty_slot").unwrap());
    }

    for is_file in [false, true] {
        let serializer = JsonSerializer::new(&types, is_file);
        let decoded = serializer.load(&serializer.save(&object).unwrap()).unwrap();
        assert_eq!(decoded, object);

        let serializer = XmlSerializer::new(&types, is_file);
        let decoded = serializer.load(&serializer.save(&object).unwrap()).unwrap();
        assert_eq!(decoded, object);
    }
}

#[test]
fn enum_emission_divergence() {
    let types = graph_type_system();
    let mut item = types.instantiate("class Item").unwrap();
    item.set("m_name", "ring").unwrap();
    item.set("m_rarity", Value::Enum(1)).unwrap();

    // Regular JSON emits the integer, file JSON and XML emit the name.
    let regular = JsonSerializer::new(&types, false).save(&item).unwrap();
    assert!(regular.contains(r#""m_rarity":1"#));

    let file = JsonSerializer::new(&types, true).save(&item).unwrap();
    assert!(file.contains(r#""m_rarity": "RARE""#));

    let xml = XmlSerializer::new(&types, false).save(&item).unwrap();
    assert!(xml.contains("<m_rarity>RARE</m_rarity>"));
}

#[test]
fn unknown_enum_value_is_strict_by_default() {
    let types = graph_type_system();
    let mut item = types.instantiate("class Item").unwrap();
    item.set("m_name", "ring").unwrap();
    item.set("m_rarity", Value::Enum(1)).unwrap();

    let serializer = BinarySerializer::new(&types, false, BinarySerializerFlags::NONE);
    let mut bytes = serializer.serialize(&item).unwrap();

    // The enum value sits in the last four bytes; corrupt it.
    let len = bytes.len();
    bytes[len - 4..].copy_from_slice(&9u32.to_le_bytes());

    let err = serializer.deserialize(&bytes).unwrap_err();
    assert!(matches!(
        err,
        Error::Encoding(EncodingError::UnknownTag { .. })
    ));

    let lenient = BinarySerializer::new(&types, false, BinarySerializerFlags::NONE).lenient();
    let decoded = lenient.deserialize(&bytes).unwrap();
    assert_eq!(decoded.get("m_rarity").unwrap(), &Value::Enum(9));
}

#[test]
fn unknown_class_hash_in_file_mode() {
    // A writer that knows more classes than the reader.
    let writer_types = graph_type_system();
    let object = inventory(&writer_types);

    let mut reader_types = TypeSystem::new(Box::new(WizardHashCalculator));
    reader_types
        .define_enum("enum Rarity")
        .element("COMMON", 0)
        .element("RARE", 1)
        .element("EPIC", 2)
        .register()
        .unwrap();
    reader_types
        .define_class("class Item")
        .property("m_name", "std::string")
        .property("m_rarity", "enum Rarity")
        .register()
        .unwrap();
    reader_types
        .define_class("class Inventory")
        .property("m_gold", "unsigned int")
        .pointer("m_held", "class Item")
        .pointer("m_empty_slot", "class Item")
        .pointer_vector("m_backpack", "class Item")
        .register()
        .unwrap();

    let flags = BinarySerializerFlags::WRITE_SERIALIZER_FLAGS;
    let bytes = BinarySerializer::new(&writer_types, true, flags)
        .serialize(&object)
        .unwrap();

    // Strict mode surfaces the unknown hash.
    let err = BinarySerializer::new(&reader_types, true, flags)
        .deserialize(&bytes)
        .unwrap_err();
    assert!(matches!(err, Error::Type(TypeError::UnknownHash(_))));

    // Lenient mode skips the frame and leaves the slot null.
    let decoded = BinarySerializer::new(&reader_types, true, flags)
        .lenient()
        .deserialize(&bytes)
        .unwrap();
    assert!(decoded.is_null("m_held").unwrap());
    assert_eq!(decoded.get("m_gold").unwrap(), &Value::Unsigned(250));
    assert_eq!(decoded.len("m_backpack").unwrap(), 2);
    assert_eq!(
        decoded
            .get_at("m_backpack", 0)
            .unwrap()
            .as_object()
            .unwrap()
            .get("m_name")
            .unwrap(),
        &Value::Str("rope".to_owned())
    );
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("objectproperty-{}-{name}", std::process::id()))
}

#[test]
fn serialized_file_binary() {
    let types = graph_type_system();
    let object = inventory(&types);
    let path = temp_path("inventory.bin");

    let mut file = SerializedFile::open(&path, FileMode::Write).unwrap();
    file.write_binary(&types, &object, BinarySerializerFlags::NONE)
        .unwrap();
    drop(file);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..4], b"BINd");

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    assert_eq!(file.read(&types).unwrap(), object);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn serialized_file_json() {
    let types = graph_type_system();
    let object = inventory(&types);
    let path = temp_path("inventory.json");

    let mut file = SerializedFile::open(&path, FileMode::Write).unwrap();
    file.write_json(&types, &object).unwrap();
    drop(file);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..5], b"JSON\n");

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    assert_eq!(file.read(&types).unwrap(), object);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn serialized_file_xml() {
    let types = graph_type_system();
    let object = inventory(&types);
    let path = temp_path("inventory.xml");

    let mut file = SerializedFile::open(&path, FileMode::Write).unwrap();
    file.write_xml(&types, &object).unwrap();
    drop(file);

    let raw = std::fs::read(&path).unwrap();
    assert!(raw.starts_with(br#"<?xml version="1.0" encoding="UTF-8"?>"#));

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    assert_eq!(file.read(&types).unwrap(), object);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn serialized_file_newline_substitution() {
    let types = graph_type_system();
    let object = inventory(&types);
    let path = temp_path("inventory-crlf.json");

    let mut file = SerializedFile::open(&path, FileMode::Write)
        .unwrap()
        .with_newline(b"\r\n");
    file.write_json(&types, &object).unwrap();
    drop(file);

    let raw = std::fs::read(&path).unwrap();
    assert_eq!(&raw[..6], b"JSON\r\n");
    // Every separator is the configured two-byte sequence; no bare LF is left.
    assert!(!raw
        .iter()
        .enumerate()
        .any(|(i, b)| *b == b'\n' && (i == 0 || raw[i - 1] != b'\r')));

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    assert_eq!(file.read(&types).unwrap(), object);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn serialized_file_short_header() {
    let types = graph_type_system();
    let path = temp_path("short.bin");
    std::fs::write(&path, b"BI").unwrap();

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    let err = file.read(&types).unwrap_err();
    assert!(matches!(err, Error::File(FileError::ShortHeader)));
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn serialized_file_bad_mode() {
    let types = graph_type_system();
    let object = inventory(&types);
    let path = temp_path("badmode.bin");

    let mut file = SerializedFile::open(&path, FileMode::Write).unwrap();
    file.write_binary(&types, &object, BinarySerializerFlags::NONE)
        .unwrap();
    let err = file.read(&types).unwrap_err();
    assert!(matches!(err, Error::File(FileError::BadMode(_))));
    drop(file);

    let mut file = SerializedFile::open(&path, FileMode::Read).unwrap();
    let err = file
        .write_binary(&types, &object, BinarySerializerFlags::NONE)
        .unwrap_err();
    assert!(matches!(err, Error::File(FileError::BadMode(_))));
    std::fs::remove_file(&path).unwrap();
}
