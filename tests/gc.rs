mod common;

use actionvm::bytecode::Opcode;
use actionvm::{Context, Value};
use common::{run_in, Actions};

#[test]
fn unreferenced_script_objects_are_reclaimed() {
    let mut ctx = Context::new();
    let baseline = ctx.heap.live_count();

    let script = Actions::new()
        .push_str("tmp")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable);
    run_in(&mut ctx, script);
    assert!(ctx.heap.live_count() > baseline);

    // Rooted through the global object: survives
    ctx.collect_garbage();
    let script = Actions::new().push_str("tmp").op(Opcode::GetVariable).ret();
    assert!(run_in(&mut ctx, script).is_object());

    // Dropping the last reference makes it collectable
    let script = Actions::new().push_str("tmp").op(Opcode::Delete2).ret();
    assert_eq!(run_in(&mut ctx, script), Value::Bool(true));
    assert!(ctx.collect_garbage() >= 1);
    assert_eq!(ctx.heap.live_count(), baseline);
}

#[test]
fn proto_cycles_are_reclaimed_once_unrooted() {
    let mut ctx = Context::new();
    let baseline = ctx.heap.live_count();

    // a and b point at each other through __proto__
    let script = Actions::new()
        .push_str("a")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable)
        .push_str("b")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable)
        .push_str("a")
        .op(Opcode::GetVariable)
        .push_str("__proto__")
        .push_str("b")
        .op(Opcode::GetVariable)
        .op(Opcode::SetMember)
        .push_str("b")
        .op(Opcode::GetVariable)
        .push_str("__proto__")
        .push_str("a")
        .op(Opcode::GetVariable)
        .op(Opcode::SetMember)
        .push_str("a")
        .op(Opcode::Delete2)
        .op(Opcode::Pop)
        .push_str("b")
        .op(Opcode::Delete2)
        .op(Opcode::Pop);
    run_in(&mut ctx, script);

    assert_eq!(ctx.collect_garbage(), 2);
    assert_eq!(ctx.heap.live_count(), baseline);
}

#[test]
fn functions_root_their_captured_environment() {
    let mut ctx = Context::new();

    // g captures the local o; only g stays referenced
    let script = Actions::new()
        .define_function(
            "mk",
            &[],
            Actions::new()
                .push_str("o")
                .push_i32(0)
                .op(Opcode::InitObject)
                .op(Opcode::DefineLocal)
                .define_function("", &[], Actions::new().push_str("o").op(Opcode::GetVariable).ret())
                .ret(),
        )
        .push_str("g")
        .push_i32(0)
        .push_str("mk")
        .op(Opcode::CallFunction)
        .op(Opcode::SetVariable);
    run_in(&mut ctx, script);
    ctx.collect_garbage();

    // The captured object is still reachable through the closure
    let script = Actions::new()
        .push_i32(0)
        .push_str("g")
        .op(Opcode::CallFunction)
        .ret();
    assert!(run_in(&mut ctx, script).is_object());
}
