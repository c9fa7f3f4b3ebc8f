mod common;

use actionvm::bytecode::Opcode;
use actionvm::{Context, FunctionFlags, Value};
use common::{run, run_in, Actions};

#[test]
fn named_parameters_bind_in_order_and_missing_ones_are_undefined() {
    let mut ctx = Context::new();
    let script = Actions::new()
        .define_function(
            "first",
            &["x", "y"],
            Actions::new().push_str("x").op(Opcode::GetVariable).ret(),
        )
        .define_function(
            "second",
            &["x", "y"],
            Actions::new().push_str("y").op(Opcode::GetVariable).ret(),
        )
        .push_f64(10.0)
        .push_i32(1)
        .push_str("first")
        .op(Opcode::CallFunction)
        .ret();
    assert_eq!(run_in(&mut ctx, script), Value::Number(10.0));

    let script = Actions::new()
        .push_f64(10.0)
        .push_i32(1)
        .push_str("second")
        .op(Opcode::CallFunction)
        .ret();
    assert_eq!(run_in(&mut ctx, script), Value::Undefined);
}

#[test]
fn excess_arguments_are_discarded() {
    let result = run(Actions::new()
        .define_function(
            "f",
            &["x"],
            Actions::new().push_str("x").op(Opcode::GetVariable).ret(),
        )
        .push_f64(3.0)
        .push_f64(2.0)
        .push_f64(1.0)
        .push_i32(3)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret());
    // Arguments pop first-declared-first: x gets the last value pushed
    assert_eq!(result, Value::Number(1.0));
}

#[test]
fn oversized_argument_counts_clamp_to_the_stack() {
    // Only one value was pushed; the declared count does not invent more
    let result = run(Actions::new()
        .define_function(
            "f",
            &[],
            Actions::new()
                .push_str("arguments")
                .op(Opcode::GetVariable)
                .push_str("length")
                .op(Opcode::GetMember)
                .ret(),
        )
        .push_f64(7.0)
        .push_i32(1_000_000)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(1.0));
}

#[test]
fn legacy_closures_capture_enclosing_variables() {
    let result = run(Actions::new()
        .define_function(
            "mk",
            &[],
            Actions::new()
                .push_str("n")
                .push_f64(5.0)
                .op(Opcode::DefineLocal)
                .define_function("", &[], Actions::new().push_str("n").op(Opcode::GetVariable).ret())
                .ret(),
        )
        .push_str("g")
        .push_i32(0)
        .push_str("mk")
        .op(Opcode::CallFunction)
        .op(Opcode::SetVariable)
        .push_i32(0)
        .push_str("g")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(5.0));
}

#[test]
fn parameters_shadow_captured_variables() {
    let result = run(Actions::new()
        .define_function(
            "mk",
            &[],
            Actions::new()
                .push_str("x")
                .push_f64(1.0)
                .op(Opcode::DefineLocal)
                .define_function("", &["x"], Actions::new().push_str("x").op(Opcode::GetVariable).ret())
                .ret(),
        )
        .push_str("g")
        .push_i32(0)
        .push_str("mk")
        .op(Opcode::CallFunction)
        .op(Opcode::SetVariable)
        .push_f64(2.0)
        .push_i32(1)
        .push_str("g")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(2.0));
}

#[test]
fn register_parameters_bind_into_registers() {
    let result = run(Actions::new()
        .define_function2(
            "f",
            3,
            0,
            &[(1, "a")],
            Actions::new().push_register(1).ret(),
        )
        .push_f64(42.0)
        .push_i32(1)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(42.0));
}

#[test]
fn registers_are_per_activation() {
    // A register written in one call is not visible in the next
    let result = run(Actions::new()
        .define_function(
            "w",
            &[],
            Actions::new().push_f64(5.0).store_register(1).op(Opcode::Pop),
        )
        .define_function("r", &[], Actions::new().push_register(1).ret())
        .push_i32(0)
        .push_str("w")
        .op(Opcode::CallFunction)
        .op(Opcode::Pop)
        .push_i32(0)
        .push_str("r")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Undefined);
}

#[test]
fn preload_this_lands_in_register_one() {
    let mut ctx = Context::new();
    let script = Actions::new()
        .define_function2(
            "f",
            2,
            FunctionFlags::PRELOAD_THIS,
            &[],
            Actions::new().push_register(1).ret(),
        )
        .push_i32(0)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret();
    // Top-level `this` is the global object, preloaded into r1
    assert_eq!(run_in(&mut ctx, script), Value::Object(ctx.globals()));
}

#[test]
fn arguments_object_carries_indices_and_length() {
    let result = run(Actions::new()
        .define_function(
            "f",
            &[],
            Actions::new()
                .push_str("arguments")
                .op(Opcode::GetVariable)
                .push_str("length")
                .op(Opcode::GetMember)
                .ret(),
        )
        .push_f64(7.0)
        .push_f64(8.0)
        .push_i32(2)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(2.0));

    let result = run(Actions::new()
        .define_function(
            "f",
            &[],
            Actions::new()
                .push_str("arguments")
                .op(Opcode::GetVariable)
                .push_str("0")
                .op(Opcode::GetMember)
                .ret(),
        )
        .push_f64(9.0)
        .push_i32(1)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret());
    assert_eq!(result, Value::Number(9.0));
}

#[test]
fn empty_method_name_calls_the_receiver_itself() {
    let result = run(Actions::new()
        .push_str("g")
        .define_function("", &[], Actions::new().push_f64(7.0).ret())
        .op(Opcode::SetVariable)
        .push_i32(0)
        .push_str("g")
        .op(Opcode::GetVariable)
        .push_str("")
        .op(Opcode::CallMethod)
        .ret());
    assert_eq!(result, Value::Number(7.0));
}

#[test]
fn new_method_constructs_through_a_member() {
    let mut ctx = Context::new();
    let script = Actions::new()
        // ns = { F: function() { this.v = 1 } }
        .push_str("ns")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable)
        .push_str("ns")
        .op(Opcode::GetVariable)
        .push_str("F")
        .define_function(
            "",
            &[],
            Actions::new()
                .push_str("this")
                .op(Opcode::GetVariable)
                .push_str("v")
                .push_f64(1.0)
                .op(Opcode::SetMember),
        )
        .op(Opcode::SetMember)
        // return (new ns.F()).v
        .push_i32(0)
        .push_str("ns")
        .op(Opcode::GetVariable)
        .push_str("F")
        .op(Opcode::NewMethod)
        .push_str("v")
        .op(Opcode::GetMember)
        .ret();
    assert_eq!(run_in(&mut ctx, script), Value::Number(1.0));
}

#[test]
fn super_dispatches_one_level_above_the_instance() {
    let mut ctx = Context::new();
    let script = Actions::new()
        // mproto/mown return which level they live on
        .push_str("mproto")
        .define_function("", &[], Actions::new().push_str("proto").ret())
        .op(Opcode::SetVariable)
        .push_str("mown")
        .define_function("", &[], Actions::new().push_str("own").ret())
        .op(Opcode::SetVariable)
        // o = {}; o.m = mown
        .push_str("o")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable)
        .push_str("o")
        .op(Opcode::GetVariable)
        .push_str("m")
        .push_str("mown")
        .op(Opcode::GetVariable)
        .op(Opcode::SetMember)
        // p = {}; p.m = mproto; o.__proto__ = p
        .push_str("p")
        .push_i32(0)
        .op(Opcode::InitObject)
        .op(Opcode::SetVariable)
        .push_str("p")
        .op(Opcode::GetVariable)
        .push_str("m")
        .push_str("mproto")
        .op(Opcode::GetVariable)
        .op(Opcode::SetMember)
        .push_str("o")
        .op(Opcode::GetVariable)
        .push_str("__proto__")
        .push_str("p")
        .op(Opcode::GetVariable)
        .op(Opcode::SetMember)
        // o.s = function() { return super.m() }   (register-based form)
        .push_str("o")
        .op(Opcode::GetVariable)
        .push_str("s")
        .define_function2(
            "",
            0,
            0,
            &[],
            Actions::new()
                .push_i32(0)
                .push_str("super")
                .op(Opcode::GetVariable)
                .push_str("m")
                .op(Opcode::CallMethod)
                .ret(),
        )
        .op(Opcode::SetMember);
    run_in(&mut ctx, script);

    // The instance's own m wins for a plain call
    let script = Actions::new()
        .push_i32(0)
        .push_str("o")
        .op(Opcode::GetVariable)
        .push_str("m")
        .op(Opcode::CallMethod)
        .ret();
    assert_eq!(run_in(&mut ctx, script), Value::from("own"));

    // Through super the prototype's m is dispatched instead
    let script = Actions::new()
        .push_i32(0)
        .push_str("o")
        .op(Opcode::GetVariable)
        .push_str("s")
        .op(Opcode::CallMethod)
        .ret();
    assert_eq!(run_in(&mut ctx, script), Value::from("proto"));
}

#[test]
fn runaway_recursion_is_clamped() {
    let mut ctx = Context::new();
    ctx.set_max_call_depth(16);
    let script = Actions::new()
        .define_function(
            "f",
            &[],
            Actions::new()
                .push_i32(0)
                .push_str("f")
                .op(Opcode::CallFunction)
                .ret(),
        )
        .push_i32(0)
        .push_str("f")
        .op(Opcode::CallFunction)
        .ret();
    // Terminates instead of overflowing; the abandoned call is undefined
    assert_eq!(run_in(&mut ctx, script), Value::Undefined);
}
