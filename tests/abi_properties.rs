//! Property-based tests for flattening, layout and lower/lift round trips.

use proptest::prelude::*;
use wit_canon::abi::{CanonicalAbi, CoreType, LinearMemory, MAX_FLAT_PARAMS, align_to};
use wit_canon::marshal::Value;
use wit_canon::model::{EnumType, FlagsType, Type, TypeArena, TypeId, TypeName};

/// One arena holding a type of every supported kind.
struct Kinds {
    types: TypeArena,
    bool: TypeId,
    u8: TypeId,
    u16: TypeId,
    u32: TypeId,
    u64: TypeId,
    s8: TypeId,
    s16: TypeId,
    s32: TypeId,
    s64: TypeId,
    f32: TypeId,
    f64: TypeId,
    char: TypeId,
    string: TypeId,
    bytes: TypeId,
    words: TypeId,
    point: TypeId,
    pair: TypeId,
    maybe: TypeId,
    outcome: TypeId,
    shape: TypeId,
    color: TypeId,
    perms: TypeId,
}

fn kinds() -> Kinds {
    let mut types = TypeArena::new();
    let bool = types.alloc(Type::Bool);
    let u8 = types.alloc(Type::U8);
    let u16 = types.alloc(Type::U16);
    let u32 = types.alloc(Type::U32);
    let u64 = types.alloc(Type::U64);
    let s8 = types.alloc(Type::S8);
    let s16 = types.alloc(Type::S16);
    let s32 = types.alloc(Type::S32);
    let s64 = types.alloc(Type::S64);
    let f32 = types.alloc(Type::F32);
    let f64 = types.alloc(Type::F64);
    let char = types.alloc(Type::Char);
    let string = types.alloc(Type::String);
    let bytes = types.list(u8);
    let words = types.list(string);
    let point = types.record("point", [("x", s32), ("y", f64)]);
    let pair = types.tuple(vec![u8, string]);
    let maybe = types.option(s32);
    let outcome = types.result(Some(s32), Some(string));
    let shape = types.variant(
        "shape",
        [("circle", Some(f32)), ("square", Some(u64)), ("empty", None)],
    );
    let color = types.alloc(Type::Enum(EnumType {
        name: TypeName::local("color"),
        cases: vec!["red".into(), "green".into(), "blue".into()],
    }));
    let perms = types.alloc(Type::Flags(FlagsType {
        name: TypeName::local("perms"),
        flags: vec!["read".into(), "write".into(), "exec".into()],
    }));
    Kinds {
        types,
        bool,
        u8,
        u16,
        u32,
        u64,
        s8,
        s16,
        s32,
        s64,
        f32,
        f64,
        char,
        string,
        bytes,
        words,
        point,
        pair,
        maybe,
        outcome,
        shape,
        color,
        perms,
    }
}

/// Lower and lift `value` both flat and through memory, checking that every
/// block is freed exactly once.
fn assert_round_trip(types: &TypeArena, ty: TypeId, value: &Value) {
    let abi = CanonicalAbi::new(types);
    let mut memory = LinearMemory::new();

    let flat = abi.lower_flat(value, ty, &mut memory).unwrap();
    assert_eq!(flat.len(), abi.flat_count(ty).unwrap());
    let kinds: Vec<CoreType> = flat.iter().map(|v| v.core_type()).collect();
    assert_eq!(kinds, abi.flatten(ty).unwrap());
    assert_eq!(&abi.lift_flat(ty, &flat, &memory).unwrap(), value);
    abi.free_flat(ty, &flat, &mut memory).unwrap();
    assert!(memory.live_allocations().is_empty());

    let layout = abi.layout(ty).unwrap();
    let ptr = memory.alloc(layout.size, layout.align);
    assert_eq!(ptr as usize % layout.align, 0);
    abi.store(value, ty, &mut memory, ptr).unwrap();
    assert_eq!(&abi.load(ty, &memory, ptr).unwrap(), value);
    abi.free_stored(ty, &mut memory, ptr).unwrap();
    memory.free(ptr, layout.size, layout.align).unwrap();

    let stats = memory.stats();
    assert!(memory.live_allocations().is_empty());
    assert_eq!(stats.allocations, stats.frees);
    assert_eq!(stats.live_bytes(), 0);
}

// =============================================================================
// Alignment
// =============================================================================

proptest! {
    #[test]
    fn align_to_is_smallest_multiple(value in 0usize..1 << 20, shift in 0u32..4) {
        let align = 1usize << shift;
        let aligned = align_to(value, align);
        prop_assert_eq!(aligned % align, 0);
        prop_assert!(aligned >= value);
        prop_assert!(aligned - value < align);
        prop_assert_eq!(align_to(aligned, align), aligned);
    }

    #[test]
    fn record_fields_are_aligned(fields in prop::collection::vec(0usize..6, 0..12)) {
        let mut types = TypeArena::new();
        let palette = [Type::U8, Type::U16, Type::U32, Type::U64, Type::String, Type::Bool];
        let ids: Vec<TypeId> = fields
            .iter()
            .map(|i| types.alloc(palette.get(*i).unwrap().clone()))
            .collect();
        let abi = CanonicalAbi::new(&types);
        let layout = abi.record_layout(&ids).unwrap();
        let offsets = abi.field_offsets(&ids).unwrap();

        prop_assert_eq!(layout.size % layout.align, 0);
        let mut end = 0;
        for (id, offset) in ids.iter().zip(&offsets) {
            let field = abi.layout(*id).unwrap();
            prop_assert_eq!(offset % field.align, 0);
            prop_assert!(*offset >= end);
            prop_assert!(field.align <= layout.align);
            end = offset + field.size;
        }
        prop_assert!(end <= layout.size);
    }

    #[test]
    fn spill_iff_more_than_sixteen_words(count in 0usize..40) {
        let mut types = TypeArena::new();
        let s32 = types.alloc(Type::S32);
        let params: Vec<(&str, TypeId)> = (0..count).map(|_| ("p", s32)).collect();
        let func = types.function(params, vec![]);
        let sig = CanonicalAbi::new(&types).function_abi(func).unwrap();

        prop_assert_eq!(sig.spill_params, count > MAX_FLAT_PARAMS);
        let expected_core = if count > MAX_FLAT_PARAMS { 1 } else { count };
        prop_assert_eq!(sig.core_params.len(), expected_core);
        prop_assert_eq!(sig.param_area.is_some(), sig.spill_params);
    }
}

// =============================================================================
// Round trips
// =============================================================================

proptest! {
    #[test]
    fn roundtrip_integers(
        a in any::<u8>(), b in any::<u16>(), c in any::<u32>(), d in any::<u64>(),
        e in any::<i8>(), f in any::<i16>(), g in any::<i32>(), h in any::<i64>(),
    ) {
        let k = kinds();
        assert_round_trip(&k.types, k.u8, &Value::U8(a));
        assert_round_trip(&k.types, k.u16, &Value::U16(b));
        assert_round_trip(&k.types, k.u32, &Value::U32(c));
        assert_round_trip(&k.types, k.u64, &Value::U64(d));
        assert_round_trip(&k.types, k.s8, &Value::S8(e));
        assert_round_trip(&k.types, k.s16, &Value::S16(f));
        assert_round_trip(&k.types, k.s32, &Value::S32(g));
        assert_round_trip(&k.types, k.s64, &Value::S64(h));
    }

    #[test]
    fn roundtrip_floats_chars_bools(
        x in prop::num::f32::NORMAL, y in prop::num::f64::NORMAL,
        ch in any::<char>(), flag in any::<bool>(),
    ) {
        let k = kinds();
        assert_round_trip(&k.types, k.f32, &Value::F32(x));
        assert_round_trip(&k.types, k.f64, &Value::F64(y));
        assert_round_trip(&k.types, k.char, &Value::Char(ch));
        assert_round_trip(&k.types, k.bool, &Value::Bool(flag));
    }

    #[test]
    fn roundtrip_strings_and_lists(
        s in any::<String>(),
        bytes in prop::collection::vec(any::<u8>(), 0..64),
        words in prop::collection::vec(any::<String>(), 0..8),
    ) {
        let k = kinds();
        assert_round_trip(&k.types, k.string, &Value::String(s.clone()));
        assert_round_trip(&k.types, k.bytes, &Value::List(bytes.into_iter().map(Value::U8).collect()));
        assert_round_trip(&k.types, k.words, &Value::List(words.into_iter().map(Value::String).collect()));
        assert_round_trip(&k.types, k.pair, &Value::Tuple(vec![Value::U8(7), Value::String(s)]));
    }

    #[test]
    fn roundtrip_records_and_options(x in any::<i32>(), y in prop::num::f64::NORMAL, present in any::<bool>()) {
        let k = kinds();
        let point = Value::record([("x", Value::S32(x)), ("y", Value::F64(y))]);
        assert_round_trip(&k.types, k.point, &point);
        let maybe = if present { Value::some(Value::S32(x)) } else { Value::none() };
        assert_round_trip(&k.types, k.maybe, &maybe);
    }

    #[test]
    fn roundtrip_results_and_variants(n in any::<i32>(), msg in any::<String>(), r in prop::num::f32::NORMAL, side in any::<u64>()) {
        let k = kinds();
        assert_round_trip(&k.types, k.outcome, &Value::ok(Some(Value::S32(n))));
        assert_round_trip(&k.types, k.outcome, &Value::err(Some(Value::String(msg))));
        assert_round_trip(&k.types, k.shape, &Value::variant("circle", Some(Value::F32(r))));
        assert_round_trip(&k.types, k.shape, &Value::variant("square", Some(Value::U64(side))));
        assert_round_trip(&k.types, k.shape, &Value::variant("empty", None));
    }

    #[test]
    fn roundtrip_enums_and_flags(case in 0usize..3, mask in 0u8..8) {
        let k = kinds();
        let cases = ["red", "green", "blue"];
        assert_round_trip(&k.types, k.color, &Value::Enum(cases.get(case).unwrap().to_string()));
        let set: Vec<String> = ["read", "write", "exec"]
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, name)| name.to_string())
            .collect();
        assert_round_trip(&k.types, k.perms, &Value::Flags(set));
    }
}

// =============================================================================
// Fixed cases
// =============================================================================

#[test]
fn test_flatten_examples() {
    let k = kinds();
    let abi = CanonicalAbi::new(&k.types);
    assert_eq!(abi.flatten(k.point).unwrap(), vec![CoreType::I32, CoreType::F64]);
    assert_eq!(abi.flatten(k.string).unwrap(), vec![CoreType::I32, CoreType::I32]);
    assert_eq!(abi.flatten(k.bytes).unwrap(), vec![CoreType::I32, CoreType::I32]);
    assert_eq!(abi.flatten(k.words).unwrap(), vec![CoreType::I32, CoreType::I32]);
    assert_eq!(abi.flatten(k.outcome).unwrap(), vec![CoreType::I32; 3]);
    assert_eq!(abi.flatten(k.maybe).unwrap(), vec![CoreType::I32, CoreType::I32]);
    // f32 and u64 share one slot, joined to i64.
    assert_eq!(abi.flatten(k.shape).unwrap(), vec![CoreType::I32, CoreType::I64]);
    assert_eq!(abi.memory_size(k.string).unwrap(), 8);
    assert_eq!(abi.memory_align(k.string).unwrap(), 4);
}

#[test]
fn test_payload_offset_follows_payload_alignment() {
    let k = kinds();
    let abi = CanonicalAbi::new(&k.types);
    let shape = abi.variant_layout(k.shape).unwrap();
    assert_eq!(shape.discriminant_size, 4);
    assert_eq!(shape.payload_offset, 8);
    assert_eq!((shape.size, shape.align), (16, 8));

    let maybe = abi.variant_layout(k.maybe).unwrap();
    assert_eq!(maybe.discriminant_size, 1);
    assert_eq!(maybe.payload_offset, 4);
    assert_eq!((maybe.size, maybe.align), (8, 4));
}

#[test]
fn test_return_pointer_threshold() {
    let mut types = TypeArena::new();
    let s32 = types.alloc(Type::S32);
    let pair = types.record("pair", [("a", s32), ("b", s32)]);
    let one = types.function(vec![], vec![s32]);
    let two = types.function(vec![], vec![pair]);

    let abi = CanonicalAbi::new(&types);
    let one = abi.function_abi(one).unwrap();
    assert!(!one.ret_ptr);
    assert_eq!(one.core_results, vec![CoreType::I32]);

    let two = abi.function_abi(two).unwrap();
    assert!(two.ret_ptr);
    assert!(two.core_results.is_empty());
    assert_eq!(two.core_params, vec![CoreType::I32]);
}

#[test]
fn test_boundary_values_round_trip() {
    let k = kinds();
    assert_round_trip(&k.types, k.string, &Value::String(String::new()));
    assert_round_trip(&k.types, k.bytes, &Value::List(vec![]));
    assert_round_trip(&k.types, k.words, &Value::List(vec![Value::String(String::new())]));
    assert_round_trip(&k.types, k.maybe, &Value::none());
    assert_round_trip(&k.types, k.s64, &Value::S64(i64::MIN));
    assert_round_trip(&k.types, k.u64, &Value::U64(u64::MAX));
    assert_round_trip(&k.types, k.s8, &Value::S8(i8::MIN));
    assert_round_trip(&k.types, k.char, &Value::Char(char::MAX));
    assert_round_trip(&k.types, k.perms, &Value::Flags(vec![]));
}
