//! Cross-check sizes and alignments against `wit-parser`'s `SizeAlign` for
//! the shapes where both layouts agree.

use std::collections::HashMap;

use wit_canon::abi::CanonicalAbi;
use wit_canon::model::{FlagsType, Type, TypeArena, TypeId, TypeName};
use wit_parser::{Resolve, SizeAlign};

/// Size and alignment of every named type in `wit`, as wit-parser sees them.
fn reference_layouts(wit: &str) -> HashMap<String, (usize, usize)> {
    let mut resolve = Resolve::new();
    resolve.push_str("reference.wit", wit).unwrap();
    let mut sizes = SizeAlign::default();
    sizes.fill(&resolve);
    resolve
        .types
        .iter()
        .filter_map(|(id, def)| {
            let name = def.name.clone()?;
            let ty = wit_parser::Type::Id(id);
            Some((
                name,
                (
                    sizes.size(&ty).size_wasm32(),
                    sizes.align(&ty).align_wasm32(),
                ),
            ))
        })
        .collect()
}

fn assert_matches(
    reference: &HashMap<String, (usize, usize)>,
    types: &TypeArena,
    cases: &[(&str, TypeId)],
) {
    let abi = CanonicalAbi::new(types);
    for (name, id) in cases {
        let expected = *reference
            .get(*name)
            .unwrap_or_else(|| panic!("wit-parser has no type '{name}'"));
        let layout = abi.layout(*id).unwrap();
        assert_eq!(
            (layout.size, layout.align),
            expected,
            "layout of '{name}' differs from wit-parser"
        );
    }
}

#[test]
fn test_records_tuples_and_lists() {
    let reference = reference_layouts(
        r#"
package ref:layouts;
interface shapes {
    record point { x: s32, y: f64 }
    record header { tag: u8, %flags: u16, id: u64, name: string }
    record nested { head: header, points: list<point>, ratio: f32 }
    type pair = tuple<u8, string, u16>;
    type blob = list<u8>;
    type names = list<string>;
    type small = tuple<bool, u8, char>;
}
"#,
    );

    let mut types = TypeArena::new();
    let bool = types.alloc(Type::Bool);
    let u8 = types.alloc(Type::U8);
    let u16 = types.alloc(Type::U16);
    let u64 = types.alloc(Type::U64);
    let s32 = types.alloc(Type::S32);
    let f32 = types.alloc(Type::F32);
    let f64 = types.alloc(Type::F64);
    let char = types.alloc(Type::Char);
    let string = types.alloc(Type::String);
    let point = types.record("point", [("x", s32), ("y", f64)]);
    let header = types.record(
        "header",
        [("tag", u8), ("flags", u16), ("id", u64), ("name", string)],
    );
    let points = types.list(point);
    let nested = types.record(
        "nested",
        [("head", header), ("points", points), ("ratio", f32)],
    );
    let pair = types.tuple(vec![u8, string, u16]);
    let blob = types.list(u8);
    let names = types.list(string);
    let small = types.tuple(vec![bool, u8, char]);

    assert_matches(
        &reference,
        &types,
        &[
            ("point", point),
            ("header", header),
            ("nested", nested),
            ("pair", pair),
            ("blob", blob),
            ("names", names),
            ("small", small),
        ],
    );
}

#[test]
fn test_options_and_wide_payload_variants() {
    let reference = reference_layouts(
        r#"
package ref:layouts;
interface cases {
    type maybe-byte = option<u8>;
    type maybe-text = option<string>;
    type maybe-wide = option<u64>;
    type outcome = result<u64, string>;
    variant event { tick(u64), message(string), quit }
    record envelope { seq: u32, body: event }
}
"#,
    );

    let mut types = TypeArena::new();
    let u8 = types.alloc(Type::U8);
    let u32 = types.alloc(Type::U32);
    let u64 = types.alloc(Type::U64);
    let string = types.alloc(Type::String);
    let maybe_byte = types.option(u8);
    let maybe_text = types.option(string);
    let maybe_wide = types.option(u64);
    let outcome = types.result(Some(u64), Some(string));
    let event = types.variant(
        "event",
        [("tick", Some(u64)), ("message", Some(string)), ("quit", None)],
    );
    let envelope = types.record("envelope", [("seq", u32), ("body", event)]);

    assert_matches(
        &reference,
        &types,
        &[
            ("maybe-byte", maybe_byte),
            ("maybe-text", maybe_text),
            ("maybe-wide", maybe_wide),
            ("outcome", outcome),
            ("event", event),
            ("envelope", envelope),
        ],
    );
}

#[test]
fn test_word_sized_flags() {
    let names: Vec<String> = (0..20).map(|i| format!("f{i}")).collect();
    let reference = reference_layouts(&format!(
        "package ref:layouts;\ninterface bits {{ flags perms {{ {} }} }}\n",
        names.join(", ")
    ));

    let mut types = TypeArena::new();
    let perms = types.alloc(Type::Flags(FlagsType {
        name: TypeName::local("perms"),
        flags: names,
    }));
    assert_matches(&reference, &types, &[("perms", perms)]);
}

#[test]
fn test_narrow_discriminants_are_widened() {
    let reference = reference_layouts(
        r#"
package ref:layouts;
interface narrow {
    type small = result<u8, u8>;
}
"#,
    );

    let mut types = TypeArena::new();
    let u8 = types.alloc(Type::U8);
    let small = types.result(Some(u8), Some(u8));
    let abi = CanonicalAbi::new(&types);

    // wit-parser packs the discriminant into one byte; here it takes a word.
    assert_eq!(reference.get("small"), Some(&(2, 1)));
    let layout = abi.variant_layout(small).unwrap();
    assert_eq!(layout.discriminant_size, 4);
    assert_eq!((layout.size, layout.align), (8, 4));
}
