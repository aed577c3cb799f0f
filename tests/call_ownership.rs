//! Simulated calls across the boundary: every allocation is freed exactly
//! once, failed calls leave nothing behind, and owned handles move.

use wit_canon::abi::{CanonicalAbi, CanonicalAbiError, LinearMemory};
use wit_canon::marshal::{CallFrame, HandleTable, Value, WasmVal};
use wit_canon::model::{ResourceType, Type, TypeArena, TypeName};

fn assert_clean(memory: &LinearMemory) {
    let stats = memory.stats();
    assert!(
        memory.live_allocations().is_empty(),
        "leaked: {:?}",
        memory.live_allocations()
    );
    assert_eq!(stats.allocations, stats.frees);
    assert_eq!(stats.live_bytes(), 0);
}

#[test]
fn test_string_in_string_out() {
    let mut types = TypeArena::new();
    let string = types.alloc(Type::String);
    let greet = types.function(vec![("name", string)], vec![string]);

    let abi = CanonicalAbi::new(&types);
    let sig = abi.function_abi(greet).unwrap();
    assert!(sig.needs_post_return);

    let mut memory = LinearMemory::new();
    let outcome = CallFrame::new(abi, &mut memory)
        .call(&sig, &[Value::String("world".into())], |params| {
            let [Value::String(name)] = params.as_slice() else {
                panic!("unexpected params {params:?}");
            };
            Ok(vec![Value::String(format!("hello {name}"))])
        })
        .unwrap();

    assert_eq!(outcome.results, vec![Value::String("hello world".into())]);
    assert!(outcome.moved_to_callee.is_empty());
    // A string result is two words, so it comes back through a return
    // area. The argument block is freed by the callee; the result block and
    // the return area by post-return.
    assert!(sig.ret_ptr);
    assert_eq!(memory.stats().allocations, 3);
    assert_clean(&memory);
}

#[test]
fn test_steps_free_each_block_once() {
    let mut types = TypeArena::new();
    let string = types.alloc(Type::String);
    let words = types.list(string);
    let join = types.function(vec![("words", words)], vec![string]);

    let abi = CanonicalAbi::new(&types);
    let sig = abi.function_abi(join).unwrap();
    let args = [Value::List(vec![
        Value::String("a".into()),
        Value::String(String::new()),
        Value::String("ccc".into()),
    ])];

    let mut memory = LinearMemory::new();
    let mut frame = CallFrame::new(abi, &mut memory);
    let call = frame.lower_params(&sig, &args).unwrap();
    // List block, two non-empty string blocks and the return area.
    let return_area = call.return_area.unwrap();
    assert_eq!(frame.memory().live_allocations().len(), 4);

    let params = frame.lift_params(&sig, &call.core_args).unwrap();
    assert_eq!(params, args.to_vec());
    let live: Vec<u32> = frame
        .memory()
        .live_allocations()
        .into_iter()
        .map(|(ptr, _)| ptr)
        .collect();
    assert_eq!(live, vec![return_area]);

    let core = frame
        .lower_results(&sig, &call, &[Value::String("a,,ccc".into())])
        .unwrap();
    assert!(core.is_empty());
    let results = frame.lift_results(&sig, &call, &core).unwrap();
    assert_eq!(results, vec![Value::String("a,,ccc".into())]);
    // Return area plus the result string, both owned by post-return.
    assert_eq!(frame.memory().live_allocations().len(), 2);

    frame.post_return(&sig, &call, &core).unwrap();
    assert_clean(&memory);

    // A second post-return would free the result string again.
    let err = CallFrame::new(CanonicalAbi::new(&types), &mut memory)
        .post_return(&sig, &call, &core)
        .unwrap_err();
    assert!(matches!(err, CanonicalAbiError::DoubleFree(_)));
}

#[test]
fn test_spilled_params_and_return_area() {
    let mut types = TypeArena::new();
    let u64 = types.alloc(Type::U64);
    let string = types.alloc(Type::String);
    let params: Vec<(&str, _)> = (0..17).map(|_| ("w", u64)).chain([("s", string)]).collect();
    let pair = types.tuple(vec![string, u64]);
    let func = types.function(params, vec![pair]);

    let abi = CanonicalAbi::new(&types);
    let sig = abi.function_abi(func).unwrap();
    assert!(sig.spill_params);
    assert!(sig.ret_ptr);
    // Parameter area pointer and return area pointer.
    assert_eq!(sig.core_params.len(), 2);

    let mut args: Vec<Value> = (0..17).map(Value::U64).collect();
    args.push(Value::String("spilled".into()));

    let mut memory = LinearMemory::new();
    let outcome = CallFrame::new(abi, &mut memory)
        .call(&sig, &args, |params| {
            assert_eq!(params.len(), 18);
            let total = params
                .iter()
                .filter_map(|p| match p {
                    Value::U64(n) => Some(*n),
                    _ => None,
                })
                .sum();
            Ok(vec![Value::Tuple(vec![
                Value::String("sum".into()),
                Value::U64(total),
            ])])
        })
        .unwrap();

    assert_eq!(
        outcome.results,
        vec![Value::Tuple(vec![Value::String("sum".into()), Value::U64(136)])]
    );
    // Parameter area, argument string, return area and result string.
    assert_eq!(memory.stats().allocations, 4);
    assert_clean(&memory);
}

#[test]
fn test_failed_call_releases_everything() {
    let mut types = TypeArena::new();
    let string = types.alloc(Type::String);
    let words = types.list(string);
    let func = types.function(vec![("words", words)], vec![words]);

    let abi = CanonicalAbi::new(&types);
    let sig = abi.function_abi(func).unwrap();
    let args = [Value::List(vec![Value::String("x".into())])];

    // The callee answers with a value of the wrong shape.
    let mut memory = LinearMemory::new();
    let err = CallFrame::new(abi, &mut memory)
        .call(&sig, &args, |_| {
            Ok(vec![Value::List(vec![
                Value::String("ok".into()),
                Value::U32(3),
            ])])
        })
        .unwrap_err();
    assert!(matches!(err, CanonicalAbiError::TypeMismatch { .. }));
    assert!(memory.live_allocations().is_empty());

    // The callee itself fails.
    let mut memory = LinearMemory::new();
    let err = CallFrame::new(abi, &mut memory)
        .call(&sig, &args, |_| Err(CanonicalAbiError::HandleNotFound(9)))
        .unwrap_err();
    assert!(matches!(err, CanonicalAbiError::HandleNotFound(9)));
    assert!(memory.live_allocations().is_empty());

    // Wrong argument count is rejected before anything is allocated.
    let mut memory = LinearMemory::new();
    let err = CallFrame::new(abi, &mut memory)
        .call(&sig, &[], |_| Ok(vec![]))
        .unwrap_err();
    assert!(matches!(err, CanonicalAbiError::TypeMismatch { .. }));
    assert_eq!(memory.stats().allocations, 0);
}

#[test]
fn test_owned_handles_move_borrowed_do_not() {
    let mut types = TypeArena::new();
    let file = types.alloc(Type::Resource(ResourceType {
        name: TypeName::local("file"),
        constructors: vec![],
        methods: vec![],
        statics: vec![],
        drop: None,
    }));
    let borrowed = types.alloc(Type::Borrow(file));
    let string = types.alloc(Type::String);
    let maybe = types.option(file);
    // rename(from: borrow<file>, to: own<file>, name: string) -> option<own<file>>
    let rename = types.function(
        vec![("from", borrowed), ("to", file), ("name", string)],
        vec![maybe],
    );

    let abi = CanonicalAbi::new(&types);
    let sig = abi.function_abi(rename).unwrap();
    assert!(sig.params_transfer_handles);
    assert!(sig.results_transfer_handles);

    let mut table: HandleTable<String> = HandleTable::new();
    let source = table.insert("a.txt".to_string());
    let target = table.insert("b.txt".to_string());
    assert_eq!((source, target), (1, 2));

    let mut memory = LinearMemory::new();
    let outcome = CallFrame::new(abi, &mut memory)
        .call(
            &sig,
            &[
                Value::Borrow(source),
                Value::Own(target),
                Value::String("c.txt".into()),
            ],
            |params| {
                let [Value::Borrow(from), Value::Own(to), Value::String(name)] = params.as_slice()
                else {
                    panic!("unexpected params {params:?}");
                };
                assert_eq!(table.get(*from).unwrap(), "a.txt");
                let old = table.drop(*to).unwrap();
                assert_eq!(old, "b.txt");
                let created = table.insert(name.clone());
                Ok(vec![Value::some(Value::Own(created))])
            },
        )
        .unwrap();

    assert_eq!(outcome.moved_to_callee, vec![2]);
    assert_eq!(outcome.moved_to_caller, vec![3]);
    assert_eq!(outcome.results, vec![Value::some(Value::Own(3))]);
    assert!(table.contains(source));
    assert!(!table.contains(target));
    assert!(matches!(
        table.get(target),
        Err(CanonicalAbiError::HandleNotFound(2))
    ));
    assert_eq!(table.len(), 2);
    assert_clean(&memory);
}

#[test]
fn test_handles_lower_to_single_word() {
    let mut types = TypeArena::new();
    let file = types.alloc(Type::Resource(ResourceType {
        name: TypeName::local("file"),
        constructors: vec![],
        methods: vec![],
        statics: vec![],
        drop: None,
    }));
    let borrowed = types.alloc(Type::Borrow(file));

    let abi = CanonicalAbi::new(&types);
    let mut memory = LinearMemory::new();
    let own = abi.lower_flat(&Value::Own(7), file, &mut memory).unwrap();
    assert_eq!(own, vec![WasmVal::I32(7)]);
    let borrow = abi
        .lower_flat(&Value::Borrow(7), borrowed, &mut memory)
        .unwrap();
    assert_eq!(borrow, vec![WasmVal::I32(7)]);
    assert_eq!(abi.lift_flat(file, &own, &memory).unwrap(), Value::Own(7));
    assert_eq!(memory.stats().allocations, 0);
}
