use std::collections::BTreeMap;

use ql_core::{codes, Collection, SandboxLimits, StateLimits, Value};
use ql_state::NarrativeState;

use super::*;

fn state() -> NarrativeState {
    NarrativeState::with_seed("sandbox", StateLimits::default(), 7)
}

fn ctx() -> ScriptContext {
    ScriptContext::new().with_source("test")
}

#[test]
fn expressions_see_story_variables() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("gold", Value::from(10i64)).expect("var");
    state.set_variable("name", Value::from("Ada")).expect("var");

    let value = interpreter
        .evaluate_expression("gold * 2", &mut state, &ctx())
        .expect("eval");
    assert_eq!(value, Value::from(20i64));

    let value = interpreter
        .evaluate_expression(r#"name + " has " + gold"#, &mut state, &ctx())
        .expect("eval");
    assert_eq!(value, Value::from("Ada has 10"));
}

#[test]
fn conditions_follow_truthiness() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("empty", Value::from("")).expect("var");
    state.set_variable("count", Value::from(0i64)).expect("var");

    assert!(interpreter.evaluate_condition("", &mut state, &ctx()).expect("blank"));
    assert!(interpreter.evaluate_condition("  ", &mut state, &ctx()).expect("blank"));
    assert!(!interpreter.evaluate_condition("empty", &mut state, &ctx()).expect("string"));
    assert!(!interpreter.evaluate_condition("count", &mut state, &ctx()).expect("zero"));
    assert!(interpreter.evaluate_condition("count + 1", &mut state, &ctx()).expect("one"));
    assert!(interpreter.evaluate_condition("[0]", &mut state, &ctx()).expect("array"));
}

#[test]
fn statements_write_changed_variables_back() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("gold", Value::from(10i64)).expect("var");
    state.set_variable("untouched", Value::from(1.5)).expect("var");

    let value = interpreter
        .execute_code("let bonus = 5; gold += bonus; gold", &mut state, &ctx())
        .expect("exec");
    assert_eq!(value, Value::from(15i64));
    assert_eq!(state.get_variable("gold"), Some(&Value::from(15i64)));
    assert_eq!(state.get_variable("untouched"), Some(&Value::from(1.5)));
    assert!(!state.has_variable("bonus"));
}

#[test]
fn set_var_creates_new_variables() {
    let interpreter = Interpreter::default();
    let mut state = state();
    interpreter
        .execute_code(r#"set_var("met_guard", true);"#, &mut state, &ctx())
        .expect("exec");
    assert_eq!(state.get_variable("met_guard"), Some(&Value::Bool(true)));
    assert!(interpreter
        .evaluate_condition("has_var(\"met_guard\")", &mut state, &ctx())
        .expect("has"));
}

#[test]
fn helpers_see_assignments_made_earlier_in_the_script() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("gold", Value::from(0i64)).expect("var");
    state.set_temp("turn", Value::from(1i64)).expect("temp");

    let value = interpreter
        .execute_code(
            r#"gold = 1; _turn = 4; [get_var("gold"), get_var("turn")]"#,
            &mut state,
            &ctx(),
        )
        .expect("read after write");
    assert_eq!(value, Value::Array(vec![Value::from(1i64), Value::from(4i64)]));

    let value = interpreter
        .execute_code(r#"gold = 3; set_var("gold", 50); gold"#, &mut state, &ctx())
        .expect("helper write after script write");
    assert_eq!(value, Value::from(50i64));
    assert_eq!(state.get_variable("gold"), Some(&Value::from(50i64)));

    let value = interpreter
        .execute_code(r#"set_var("gold", 7); gold += 1; gold"#, &mut state, &ctx())
        .expect("script write after helper write");
    assert_eq!(value, Value::from(8i64));
    assert_eq!(state.get_variable("gold"), Some(&Value::from(8i64)));
}

#[test]
fn transients_are_bound_with_underscore_prefix() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_temp("turn", Value::from(1i64)).expect("temp");

    interpreter
        .execute_code("_turn += 1;", &mut state, &ctx())
        .expect("exec");
    assert_eq!(state.get_temp("turn"), Some(&Value::from(2i64)));
    assert!(!state.has_variable("turn"));
}

#[test]
fn locals_shadow_variables_and_are_not_written_back() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("x", Value::from(1i64)).expect("var");
    let ctx = ctx().with_locals(vec![("x".to_string(), Value::from(40i64))]);

    let value = interpreter
        .execute_code("x += 2; x", &mut state, &ctx)
        .expect("exec");
    assert_eq!(value, Value::from(42i64));
    assert_eq!(state.get_variable("x"), Some(&Value::from(1i64)));
}

#[test]
fn denied_functions_are_refused() {
    let interpreter = Interpreter::default();
    let mut state = state();
    for script in [r#"read_file("/etc/passwd")"#, r#"exec("ls", "-la")"#, "getenv()"] {
        let error = interpreter
            .evaluate_expression(script, &mut state, &ctx())
            .expect_err("denied");
        assert_eq!(error.code, codes::SANDBOX_NOT_PERMITTED, "{}", script);
    }
}

#[test]
fn denied_functions_raise_catchable_errors() {
    let interpreter = Interpreter::default();
    let mut state = state();
    let value = interpreter
        .execute_code(
            r#"let r = "ok"; try { read_file("x"); } catch (e) { r = "caught"; } r"#,
            &mut state,
            &ctx(),
        )
        .expect("try");
    assert_eq!(value, Value::from("caught"));
}

#[test]
fn disabled_symbols_fail_to_compile() {
    let interpreter = Interpreter::default();
    let mut state = state();
    let error = interpreter
        .evaluate_expression(r#"eval("1 + 1")"#, &mut state, &ctx())
        .expect_err("eval");
    assert_eq!(error.code, codes::SCRIPT_COMPILE);

    let error = interpreter
        .execute_code(r#"import "fs" as fs;"#, &mut state, &ctx())
        .expect_err("import");
    assert_eq!(error.code, codes::SCRIPT_COMPILE);
}

#[test]
fn runaway_loops_hit_the_instruction_budget() {
    let limits = SandboxLimits {
        max_instructions: 5_000,
        checkpoint_interval: 100,
        ..SandboxLimits::default()
    };
    let interpreter = Interpreter::new(limits);
    let mut state = state();
    let error = interpreter
        .execute_code("let i = 0; loop { i += 1; }", &mut state, &ctx())
        .expect_err("limit");
    assert_eq!(error.code, codes::SCRIPT_RESOURCE_LIMIT);
    assert!(error.is_abort());
}

#[test]
fn budget_breach_is_not_catchable() {
    let limits = SandboxLimits {
        max_instructions: 2_000,
        checkpoint_interval: 50,
        ..SandboxLimits::default()
    };
    let interpreter = Interpreter::new(limits);
    let mut state = state();
    let error = interpreter
        .execute_code(
            "try { loop { } } catch (e) { 1 }",
            &mut state,
            &ctx(),
        )
        .expect_err("limit");
    assert_eq!(error.code, codes::SCRIPT_RESOURCE_LIMIT);
}

#[test]
fn oversized_strings_are_rejected() {
    let limits = SandboxLimits {
        max_string_size: 64,
        ..SandboxLimits::default()
    };
    let interpreter = Interpreter::new(limits);
    let mut state = state();
    let error = interpreter
        .evaluate_expression(r#"repeat("ab", 100)"#, &mut state, &ctx())
        .expect_err("too large");
    assert_eq!(error.code, codes::SCRIPT_RESOURCE_LIMIT);

    let value = interpreter
        .evaluate_expression(r#"repeat("ab", 3)"#, &mut state, &ctx())
        .expect("small");
    assert_eq!(value, Value::from("ababab"));
}

#[test]
fn failed_evaluation_rolls_back_when_transactional() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("gold", Value::from(10i64)).expect("var");
    state
        .declare_collection("keys", Collection::list(["brass", "iron"]))
        .expect("list");

    let error = interpreter
        .execute_code(
            r#"set_var("gold", 99); list_add("keys", "iron"); throw "boom";"#,
            &mut state,
            &ctx(),
        )
        .expect_err("throw");
    assert_eq!(error.code, codes::SCRIPT_RUNTIME);
    assert_eq!(state.get_variable("gold"), Some(&Value::from(10i64)));
    assert!(!state.list_contains("keys", "iron").expect("list"));
}

#[test]
fn best_effort_mode_keeps_partial_writes() {
    let limits = SandboxLimits {
        transactional: false,
        ..SandboxLimits::default()
    };
    let interpreter = Interpreter::new(limits);
    let mut state = state();
    state.set_variable("gold", Value::from(10i64)).expect("var");

    interpreter
        .execute_code("gold = 11; throw \"boom\";", &mut state, &ctx())
        .expect_err("throw");
    assert_eq!(state.get_variable("gold"), Some(&Value::from(11i64)));
}

#[test]
fn seeded_randomness_is_reproducible() {
    let interpreter = Interpreter::default();
    let script = "[random(100), random(100), dice(2, 6), random_range(5, 9)]";

    let mut first = state();
    interpreter.set_seed(&mut first, 42);
    let a = interpreter
        .evaluate_expression(script, &mut first, &ctx())
        .expect("first");

    let mut second = state();
    interpreter.set_seed(&mut second, 42);
    let b = interpreter
        .evaluate_expression(script, &mut second, &ctx())
        .expect("second");
    assert_eq!(a, b);

    let error = interpreter
        .evaluate_expression("random(0)", &mut second, &ctx())
        .expect_err("bad bound");
    assert_eq!(error.code, codes::STATE_RANDOM_ARGUMENT);
}

#[test]
fn collection_helpers_reach_state() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state
        .declare_collection("log", Collection::array(vec![Value::from("a")]))
        .expect("array");
    state
        .declare_collection("stats", Collection::map(BTreeMap::new()))
        .expect("map");

    let value = interpreter
        .execute_code(
            r#"
            array_push("log", "b");
            map_set("stats", "hp", 12);
            [array_len("log"), array_index_of("log", "b"), array_index_of("log", "z"), map_get("stats", "hp")]
            "#,
            &mut state,
            &ctx(),
        )
        .expect("exec");
    assert_eq!(
        value,
        Value::Array(vec![
            Value::from(2i64),
            Value::from(1i64),
            Value::from(-1i64),
            Value::from(12i64),
        ])
    );

    let error = interpreter
        .evaluate_expression(r#"map_get("log", "x")"#, &mut state, &ctx())
        .expect_err("kind");
    assert_eq!(error.code, codes::STATE_COLLECTION_KIND);
}

#[test]
fn module_calls_without_host_are_reported() {
    let interpreter = Interpreter::default();
    let mut state = state();
    let error = interpreter
        .evaluate_expression(r#"invoke("combat.damage", 1)"#, &mut state, &ctx())
        .expect_err("no host");
    assert_eq!(error.code, codes::MODULE_FUNCTION_NOT_FOUND);
}

struct Doubler;

impl FunctionHost for Doubler {
    fn resolve_function(&self, name: &str) -> Option<String> {
        (name == "math.double" || name == "double").then(|| "math.double".to_string())
    }

    fn call_function(
        &self,
        _name: &str,
        args: Vec<Value>,
        state: &mut NarrativeState,
        interpreter: &Interpreter,
    ) -> Result<Value, QuillError> {
        let ctx = ScriptContext::new().with_locals(vec![("n".to_string(), args[0].clone())]);
        interpreter.execute_code("calls += 1; n * 2", state, &ctx)
    }
}

#[test]
fn host_functions_reenter_the_interpreter() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("calls", Value::from(0i64)).expect("var");
    let ctx = ctx().with_host(Rc::new(Doubler));

    let value = interpreter
        .evaluate_expression("double(4) + math.double(1)", &mut state, &ctx)
        .expect("call");
    assert_eq!(value, Value::from(10i64));
    assert_eq!(state.get_variable("calls"), Some(&Value::from(2i64)));
}

#[test]
fn host_writes_are_visible_after_the_call() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("calls", Value::from(0i64)).expect("var");
    let ctx = ctx().with_host(Rc::new(Doubler));

    let value = interpreter
        .execute_code("calls = 10; double(1); calls", &mut state, &ctx)
        .expect("call");
    assert_eq!(value, Value::from(11i64));
    assert_eq!(state.get_variable("calls"), Some(&Value::from(11i64)));
}

#[test]
fn environment_binds_in_shadowing_order() {
    let interpreter = Interpreter::default();
    let mut state = state();
    state.set_variable("gold", Value::from(1i64)).expect("var");
    state.set_temp("turn", Value::from(1i64)).expect("temp");
    let ctx = ctx().with_locals(vec![("arg".to_string(), Value::Nil)]);

    let environment = interpreter.build_environment(state, &ctx);
    assert_eq!(environment.bound_names(), vec!["gold", "_turn", "arg"]);
    let state = environment.into_state();
    assert_eq!(state.get_variable("gold"), Some(&Value::from(1i64)));
}
