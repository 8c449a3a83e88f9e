use super::*;

const CONTEXT: FieldContext<'static> = FieldContext {
    kind: "test::Kind",
    field: "value",
};

fn roundtrip(value: Value) -> Value {
    let mut writer = WireWriter::new();
    encode_value(&mut writer, &value).expect("encode value");
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(&bytes);
    let decoded = decode_value(&mut reader, 1024, CONTEXT).expect("decode value");
    assert_eq!(reader.remaining(), 0, "value must consume its bytes exactly");
    decoded
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Team {
    #[default]
    Red,
    Blue,
}

impl ScriptEnum for Team {
    fn to_discriminant(self) -> i64 {
        self as i64
    }

    fn from_discriminant(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Red),
            1 => Some(Self::Blue),
            _ => None,
        }
    }
}

#[test]
fn mixed_values_survive_the_codec() {
    assert_eq!(roundtrip(Value::I32(-7)), Value::I32(-7));
    assert_eq!(roundtrip(Value::Str("héllo".into())), Value::Str("héllo".into()));
    assert_eq!(
        roundtrip(Value::Vec3([1.0, -2.5, 3.25])),
        Value::Vec3([1.0, -2.5, 3.25])
    );
    assert_eq!(roundtrip(Value::Bytes(vec![0, 255, 7])), Value::Bytes(vec![0, 255, 7]));
}

#[test]
fn enums_use_discriminants() {
    assert_eq!(Team::Blue.to_value(), Value::Enum(1));
    assert_eq!(Team::from_value(Value::Enum(0)), Some(Team::Red));
    assert_eq!(Team::from_value(Value::Enum(9)), None);
    assert_eq!(Team::from_value(Value::I64(1)), None);
}

#[test]
fn narrow_integers_reject_out_of_range_values() {
    assert_eq!(u8::from_value(Value::U32(300)), None);
    assert_eq!(i16::from_value(Value::I32(-12)), Some(-12));
    assert_eq!(u8::TYPE, ScalarType::U32);
}

#[test]
fn unknown_scalar_tag_names_the_field() {
    let bytes = [0xEE, 0, 0];
    let mut reader = WireReader::new(&bytes);
    let err = decode_value(&mut reader, 1024, CONTEXT).expect_err("unknown tag");
    assert_eq!(
        err,
        GraphError::UnsupportedValue {
            kind: "test::Kind".into(),
            field: "value".into(),
            detail: "unknown scalar type tag 238".into(),
        }
    );
}

#[test]
fn oversized_strings_hit_the_blob_limit() {
    let mut writer = WireWriter::new();
    encode_value(&mut writer, &Value::Str("x".repeat(64))).expect("encode");
    let bytes = writer.into_inner();
    let mut reader = WireReader::new(&bytes);
    let err = decode_value(&mut reader, 16, CONTEXT).expect_err("limit");
    assert!(matches!(err, GraphError::ResourceLimit(_)));
}

#[test]
fn truncated_input_is_corrupt() {
    let bytes = [ScalarType::U64.tag(), 1, 2];
    let mut reader = WireReader::new(&bytes);
    let err = decode_value(&mut reader, 1024, CONTEXT).expect_err("truncated");
    assert!(matches!(err, GraphError::CorruptStream(_)));
}
