use std::cell::RefCell;
use std::rc::Rc;

use ql_core::{codes, QuillError, Value};
use ql_state::NarrativeState;
use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Position, FLOAT, INT};

use super::bridge::{dynamic_to_value, number_arg, value_to_dynamic};
use super::budget::Budget;
use super::capabilities::{BULK_WEIGHT, CALL_WEIGHT, DENIED_FUNCTIONS};
use super::environment::LiveBindings;
use super::{FunctionHost, Interpreter};

type HelperResult<T> = Result<T, Box<EvalAltResult>>;

/// Typed error raised inside a native helper. rhai only carries a display
/// string across the script boundary, so the original error is parked here
/// and picked up again once evaluation returns.
#[derive(Debug, Clone, Default)]
pub(crate) struct HostErrors(Rc<RefCell<Option<QuillError>>>);

impl HostErrors {
    pub(crate) fn raise(&self, error: QuillError) -> Box<EvalAltResult> {
        let abort = error.is_abort();
        let marker = Dynamic::from(error.to_string());
        *self.0.borrow_mut() = Some(error);
        if abort {
            // Terminations cannot be caught by `try`, so aborts always unwind.
            Box::new(EvalAltResult::ErrorTerminated(marker, Position::NONE))
        } else {
            Box::new(EvalAltResult::ErrorRuntime(marker, Position::NONE))
        }
    }

    pub(crate) fn take(&self) -> Option<QuillError> {
        self.0.borrow_mut().take()
    }
}

/// Everything the native helpers close over.
#[derive(Clone)]
pub(crate) struct HelperContext {
    pub(crate) state: Rc<RefCell<NarrativeState>>,
    pub(crate) bindings: LiveBindings,
    pub(crate) errors: HostErrors,
    pub(crate) budget: Option<Rc<Budget>>,
    pub(crate) max_string_size: usize,
    pub(crate) host: Option<Rc<dyn FunctionHost>>,
    pub(crate) interpreter: Interpreter,
}

impl HelperContext {
    fn lift<T>(&self, result: Result<T, QuillError>) -> HelperResult<T> {
        result.map_err(|error| self.errors.raise(error))
    }

    fn charge(&self, weight: u64) -> HelperResult<()> {
        match &self.budget {
            Some(budget) => budget
                .charge(weight)
                .map_err(|breach| self.errors.raise(breach.into_error())),
            None => Ok(()),
        }
    }

    /// Runs `f` against the state with the script's assignments flushed
    /// in, then refreshes the scope from whatever `f` changed.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut NarrativeState) -> Result<T, QuillError>,
    ) -> HelperResult<T> {
        let result = {
            let mut state = self.state.borrow_mut();
            let result = self
                .bindings
                .flush(&mut state)
                .and_then(|()| f(&mut *state));
            self.bindings.refresh(&*state);
            result
        };
        self.lift(result)
    }

    fn value(&self, value: Dynamic) -> HelperResult<Value> {
        self.lift(dynamic_to_value(value))
    }

    fn index(&self, index: INT) -> HelperResult<usize> {
        self.lift(usize::try_from(index).map_err(|_| {
            QuillError::new(
                codes::STATE_INDEX_OUT_OF_RANGE,
                format!("Index {} is negative.", index),
            )
        }))
    }

    fn check_string_size(&self, len: usize) -> HelperResult<()> {
        if len > self.max_string_size {
            return Err(self.errors.raise(QuillError::new(
                codes::SCRIPT_RESOURCE_LIMIT,
                format!(
                    "Result of {} bytes exceeds the {} byte string limit.",
                    len, self.max_string_size
                ),
            )));
        }
        Ok(())
    }

    fn invoke(&self, name: &str, args: Array) -> HelperResult<Dynamic> {
        self.charge(CALL_WEIGHT)?;
        let Some(host) = &self.host else {
            return Err(self.errors.raise(QuillError::new(
                codes::MODULE_FUNCTION_NOT_FOUND,
                format!("No module runtime is attached; cannot call \"{}\".", name),
            )));
        };
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.value(arg)?);
        }
        // The shared state stays borrowed for the whole nested call; nested
        // evaluations take it out of this borrow and put it back.
        let result = self
            .with_state(|state| host.call_function(name, values, state, &self.interpreter))?;
        Ok(value_to_dynamic(&result))
    }
}

/// Persistent variables win over transients of the same name.
fn lookup(state: &NarrativeState, name: &str) -> Option<Dynamic> {
    state
        .get_variable(name)
        .or_else(|| state.get_temp(name))
        .map(value_to_dynamic)
}

fn optional(value: Option<Value>) -> Dynamic {
    value.as_ref().map_or(Dynamic::UNIT, value_to_dynamic)
}

fn strings(values: Vec<String>) -> Array {
    values.into_iter().map(Dynamic::from).collect()
}

pub(crate) fn register_helpers(engine: &mut Engine, ctx: &HelperContext) {
    register_passage_helpers(engine, ctx);
    register_variable_helpers(engine, ctx);
    register_list_helpers(engine, ctx);
    register_array_helpers(engine, ctx);
    register_map_helpers(engine, ctx);
    register_random_helpers(engine, ctx);
    register_guarded_helpers(engine, ctx);
    register_module_calls(engine, ctx);
    register_denied(engine, ctx);
}

fn register_passage_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn("visited", move |passage: ImmutableString| -> INT {
        INT::from(c.state.borrow().visit_count(passage.as_str()))
    });
    let c = ctx.clone();
    engine.register_fn("visited", move || -> INT {
        let state = c.state.borrow();
        state
            .current_passage()
            .map_or(0, |passage| INT::from(state.visit_count(passage)))
    });
    let c = ctx.clone();
    engine.register_fn("current_passage", move || -> Dynamic {
        c.state
            .borrow()
            .current_passage()
            .map_or(Dynamic::UNIT, |passage| Dynamic::from(passage.to_string()))
    });
    let c = ctx.clone();
    engine.register_fn("choice_selected", move |choice: ImmutableString| -> bool {
        c.state.borrow().is_choice_selected(choice.as_str())
    });
}

fn register_variable_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn(
        "set_var",
        move |name: ImmutableString, value: Dynamic| -> HelperResult<()> {
            let value = c.value(value)?;
            c.with_state(|state| state.set_variable(name.as_str(), value))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "set_temp",
        move |name: ImmutableString, value: Dynamic| -> HelperResult<()> {
            let value = c.value(value)?;
            c.with_state(|state| state.set_temp(name.as_str(), value))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "get_var",
        move |name: ImmutableString, default: Dynamic| -> HelperResult<Dynamic> {
            c.with_state(|state| Ok(lookup(state, name.as_str()).unwrap_or(default)))
        },
    );
    let c = ctx.clone();
    engine.register_fn("get_var", move |name: ImmutableString| -> HelperResult<Dynamic> {
        c.with_state(|state| Ok(lookup(state, name.as_str()).unwrap_or(Dynamic::UNIT)))
    });
    let c = ctx.clone();
    engine.register_fn("has_var", move |name: ImmutableString| -> HelperResult<bool> {
        c.with_state(|state| {
            Ok(state.has_variable(name.as_str()) || state.has_temp(name.as_str()))
        })
    });
}

fn register_list_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn(
        "list_add",
        move |name: ImmutableString, value: ImmutableString| -> HelperResult<bool> {
            c.with_state(|state| state.list_add(name.as_str(), value.as_str()))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "list_remove",
        move |name: ImmutableString, value: ImmutableString| -> HelperResult<bool> {
            c.with_state(|state| state.list_remove(name.as_str(), value.as_str()))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "list_toggle",
        move |name: ImmutableString, value: ImmutableString| -> HelperResult<bool> {
            c.with_state(|state| state.list_toggle(name.as_str(), value.as_str()))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "list_has",
        move |name: ImmutableString, value: ImmutableString| -> HelperResult<bool> {
            c.with_state(|state| state.list_contains(name.as_str(), value.as_str()))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "list_count",
        move |name: ImmutableString| -> HelperResult<INT> {
            c.with_state(|state| state.list_count(name.as_str()).map(|count| count as INT))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "list_active",
        move |name: ImmutableString| -> HelperResult<Array> {
            c.with_state(|state| state.list_active(name.as_str()).map(strings))
        },
    );
}

fn register_array_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn(
        "array_get",
        move |name: ImmutableString, index: INT| -> HelperResult<Dynamic> {
            let index = c.index(index)?;
            c.with_state(|state| state.array_get(name.as_str(), index).map(optional))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_set",
        move |name: ImmutableString, index: INT, value: Dynamic| -> HelperResult<()> {
            let index = c.index(index)?;
            let value = c.value(value)?;
            c.with_state(|state| state.array_set(name.as_str(), index, value))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_push",
        move |name: ImmutableString, value: Dynamic| -> HelperResult<INT> {
            let value = c.value(value)?;
            c.with_state(|state| state.array_push(name.as_str(), value).map(|len| len as INT))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_pop",
        move |name: ImmutableString| -> HelperResult<Dynamic> {
            c.with_state(|state| state.array_pop(name.as_str()).map(optional))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_insert",
        move |name: ImmutableString, index: INT, value: Dynamic| -> HelperResult<()> {
            let index = c.index(index)?;
            let value = c.value(value)?;
            c.with_state(|state| state.array_insert(name.as_str(), index, value))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_remove",
        move |name: ImmutableString, index: INT| -> HelperResult<Dynamic> {
            let index = c.index(index)?;
            c.with_state(|state| {
                state
                    .array_remove(name.as_str(), index)
                    .map(|value| value_to_dynamic(&value))
            })
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_contains",
        move |name: ImmutableString, value: Dynamic| -> HelperResult<bool> {
            let value = c.value(value)?;
            c.with_state(|state| state.array_contains(name.as_str(), &value))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_index_of",
        move |name: ImmutableString, value: Dynamic| -> HelperResult<INT> {
            let value = c.value(value)?;
            c.with_state(|state| {
                state
                    .array_index_of(name.as_str(), &value)
                    .map(|found| found.map_or(-1, |index| index as INT))
            })
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "array_len",
        move |name: ImmutableString| -> HelperResult<INT> {
            c.with_state(|state| state.array_len(name.as_str()).map(|len| len as INT))
        },
    );
}

fn register_map_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn(
        "map_get",
        move |name: ImmutableString, key: ImmutableString| -> HelperResult<Dynamic> {
            c.with_state(|state| state.map_get(name.as_str(), key.as_str()).map(optional))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_set",
        move |name: ImmutableString, key: ImmutableString, value: Dynamic| -> HelperResult<Dynamic> {
            let value = c.value(value)?;
            c.with_state(|state| state.map_set(name.as_str(), key.as_str(), value).map(optional))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_has",
        move |name: ImmutableString, key: ImmutableString| -> HelperResult<bool> {
            c.with_state(|state| state.map_has(name.as_str(), key.as_str()))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_delete",
        move |name: ImmutableString, key: ImmutableString| -> HelperResult<Dynamic> {
            c.with_state(|state| state.map_delete(name.as_str(), key.as_str()).map(optional))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_keys",
        move |name: ImmutableString| -> HelperResult<Array> {
            c.with_state(|state| state.map_keys(name.as_str()).map(strings))
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_values",
        move |name: ImmutableString| -> HelperResult<Array> {
            c.with_state(|state| {
                state
                    .map_values(name.as_str())
                    .map(|values| values.iter().map(value_to_dynamic).collect())
            })
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "map_size",
        move |name: ImmutableString| -> HelperResult<INT> {
            c.with_state(|state| state.map_size(name.as_str()).map(|size| size as INT))
        },
    );
}

fn register_random_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn("random", move |bound: INT| -> HelperResult<INT> {
        if bound <= 0 || bound > INT::from(u32::MAX) {
            return Err(c.errors.raise(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                "random(n) expects a positive integer n.",
            )));
        }
        let draw = c.state.borrow_mut().rng_mut().next_bounded(bound as u32);
        Ok(INT::from(draw))
    });
    let c = ctx.clone();
    engine.register_fn("random", move || -> FLOAT {
        c.state.borrow_mut().rng_mut().next_f64()
    });
    let c = ctx.clone();
    engine.register_fn(
        "random_range",
        move |min: INT, max: INT| -> HelperResult<INT> {
            c.with_state(|state| state.random_range(min, max))
        },
    );
    let c = ctx.clone();
    engine.register_fn("pick", move |items: Array| -> Dynamic {
        c.state
            .borrow_mut()
            .random_pick(&items)
            .cloned()
            .unwrap_or(Dynamic::UNIT)
    });
    let c = ctx.clone();
    engine.register_fn("shuffle", move |items: Array| -> HelperResult<Array> {
        c.charge(BULK_WEIGHT + items.len() as u64)?;
        let mut items = items;
        c.state.borrow_mut().shuffle(&mut items);
        Ok(items)
    });
    let c = ctx.clone();
    engine.register_fn("dice", move |count: INT, sides: INT| -> HelperResult<INT> {
        let (Ok(count), Ok(sides)) = (u32::try_from(count), u32::try_from(sides)) else {
            return Err(c.errors.raise(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                "dice(count, sides) expects non-negative integers.",
            )));
        };
        c.with_state(|state| state.roll_dice(count, sides))
    });
    let c = ctx.clone();
    engine.register_fn("chance", move |probability: Dynamic| -> HelperResult<bool> {
        let Some(probability) = number_arg(&probability) else {
            return Err(c.errors.raise(QuillError::new(
                codes::STATE_RANDOM_ARGUMENT,
                "chance(p) expects a number between 0 and 1.",
            )));
        };
        Ok(c.state.borrow_mut().chance(probability))
    });
}

fn register_guarded_helpers(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn(
        "repeat",
        move |text: ImmutableString, times: INT| -> HelperResult<String> {
            let times = usize::try_from(times).unwrap_or(0);
            c.check_string_size(text.len().saturating_mul(times))?;
            c.charge(BULK_WEIGHT + times as u64)?;
            Ok(text.as_str().repeat(times))
        },
    );
    let c = ctx.clone();
    engine.register_fn("concat", move |items: Array| -> HelperResult<String> {
        join_bounded(&c, items, "")
    });
    let c = ctx.clone();
    engine.register_fn(
        "concat",
        move |items: Array, separator: ImmutableString| -> HelperResult<String> {
            join_bounded(&c, items, separator.as_str())
        },
    );
}

fn join_bounded(ctx: &HelperContext, items: Array, separator: &str) -> HelperResult<String> {
    ctx.charge(BULK_WEIGHT + items.len() as u64)?;
    let mut out = String::new();
    for (index, item) in items.into_iter().enumerate() {
        if index > 0 {
            out.push_str(separator);
        }
        let text = ctx.value(item)?.to_text();
        ctx.check_string_size(out.len() + text.len())?;
        out.push_str(&text);
    }
    Ok(out)
}

fn register_module_calls(engine: &mut Engine, ctx: &HelperContext) {
    let c = ctx.clone();
    engine.register_fn("invoke", move |name: ImmutableString| {
        c.invoke(name.as_str(), Array::new())
    });
    let c = ctx.clone();
    engine.register_fn("invoke", move |name: ImmutableString, a: Dynamic| {
        c.invoke(name.as_str(), vec![a])
    });
    let c = ctx.clone();
    engine.register_fn(
        "invoke",
        move |name: ImmutableString, a: Dynamic, b: Dynamic| c.invoke(name.as_str(), vec![a, b]),
    );
    let c = ctx.clone();
    engine.register_fn(
        "invoke",
        move |name: ImmutableString, a: Dynamic, b: Dynamic, d: Dynamic| {
            c.invoke(name.as_str(), vec![a, b, d])
        },
    );
    let c = ctx.clone();
    engine.register_fn(
        "invoke",
        move |name: ImmutableString, a: Dynamic, b: Dynamic, d: Dynamic, e: Dynamic| {
            c.invoke(name.as_str(), vec![a, b, d, e])
        },
    );
    let c = ctx.clone();
    engine.register_fn("invoke_with", move |name: ImmutableString, args: Array| {
        c.invoke(name.as_str(), args)
    });
}

fn register_denied(engine: &mut Engine, ctx: &HelperContext) {
    for name in DENIED_FUNCTIONS {
        let refuse = {
            let errors = ctx.errors.clone();
            move || -> Box<EvalAltResult> {
                errors.raise(QuillError::new(
                    codes::SANDBOX_NOT_PERMITTED,
                    format!("\"{}\" is not available inside scripts.", name),
                ))
            }
        };
        let deny = refuse.clone();
        engine.register_fn(*name, move || -> HelperResult<()> { Err(deny()) });
        let deny = refuse.clone();
        engine.register_fn(*name, move |_: Dynamic| -> HelperResult<()> { Err(deny()) });
        let deny = refuse.clone();
        engine.register_fn(*name, move |_: Dynamic, _: Dynamic| -> HelperResult<()> {
            Err(deny())
        });
        let deny = refuse;
        engine.register_fn(
            *name,
            move |_: Dynamic, _: Dynamic, _: Dynamic| -> HelperResult<()> { Err(deny()) },
        );
    }
}
