//! Built-in helpers.
//!
//! These resolve before anything registered on an owner, and an owner may
//! not register a helper under one of these names.

use crate::error::{RenderError, Result};
use crate::manager::helper::BuiltinHelperFn;
use crate::reactive::{Reference, TrackedObject, Value};
use crate::vm::CapturedArgs;

pub const BUILTIN_HELPERS: &[(&str, BuiltinHelperFn)] = &[
    ("array", array),
    ("concat", concat),
    ("eq", eq),
    ("get", get),
    ("hash", hash),
    ("if", inline_if),
    ("mut", mut_),
    ("not", not),
    ("readonly", readonly),
    ("unbound", unbound),
    ("unless", inline_unless),
];

pub fn builtin_helper(name: &str) -> Option<BuiltinHelperFn> {
    BUILTIN_HELPERS
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, helper)| *helper)
}

pub fn is_builtin_helper(name: &str) -> bool {
    builtin_helper(name).is_some()
}

fn required(args: &CapturedArgs, index: usize, helper: &str) -> Result<Reference> {
    args.positional(index).cloned().ok_or_else(|| {
        RenderError::assertion(format!(
            "the `{helper}` helper expects at least {} positional argument(s)",
            index + 1
        ))
    })
}

fn concat(args: CapturedArgs) -> Result<Reference> {
    Ok(Reference::formula(move |rt| {
        let mut out = String::new();
        for value in args.positional_values(rt)? {
            out.push_str(&value.to_display_string());
        }
        Ok(Value::string(out))
    })
    .labeled("concat"))
}

fn conditional(args: CapturedArgs, helper: &'static str, when: bool) -> Result<Reference> {
    let condition = required(&args, 0, helper)?;
    let consequent = required(&args, 1, helper)?;
    let alternate = args.positional(2).cloned();
    Ok(Reference::formula(move |rt| {
        if condition.value(rt)?.is_truthy() == when {
            consequent.value(rt)
        } else {
            match &alternate {
                Some(alternate) => alternate.value(rt),
                None => Ok(Value::Undefined),
            }
        }
    })
    .labeled(helper))
}

fn inline_if(args: CapturedArgs) -> Result<Reference> {
    conditional(args, "if", true)
}

fn inline_unless(args: CapturedArgs) -> Result<Reference> {
    conditional(args, "unless", false)
}

fn readonly(args: CapturedArgs) -> Result<Reference> {
    Ok(Reference::readonly(&required(&args, 0, "readonly")?))
}

/// Passes the reference through after checking it can be written.
fn mut_(args: CapturedArgs) -> Result<Reference> {
    let reference = required(&args, 0, "mut")?;
    if !reference.is_updatable() {
        return Err(RenderError::assertion(format!(
            "you can only pass a path to `mut`, `{}` is not updatable",
            reference.label()
        )));
    }
    Ok(reference)
}

/// Reads once and never again: nothing is consumed, so the formula's tag
/// is constant.
fn unbound(args: CapturedArgs) -> Result<Reference> {
    let reference = required(&args, 0, "unbound")?;
    Ok(Reference::formula(move |rt| reference.value_untracked(rt)).labeled("unbound"))
}

fn get(args: CapturedArgs) -> Result<Reference> {
    let source = required(&args, 0, "get")?;
    let key = required(&args, 1, "get")?;
    let (read_source, read_key) = (source.clone(), key.clone());
    Ok(Reference::formula_with_update(
        move |rt| {
            let key = read_key.value(rt)?.to_display_string();
            Ok(match read_source.value(rt)? {
                Value::Object(object) => object.get(rt, &key),
                _ => Value::Undefined,
            })
        },
        move |rt, value| {
            let key = key.value(rt)?.to_display_string();
            match source.value(rt)? {
                Value::Object(object) => {
                    object.set(rt, &key, value);
                    Ok(())
                }
                _ => Err(RenderError::NotUpdatable(format!("get on {key}"))),
            }
        },
    )
    .labeled("get"))
}

fn hash(args: CapturedArgs) -> Result<Reference> {
    Ok(Reference::formula(move |rt| {
        let named = args.named_values(rt)?;
        Ok(Value::Object(TrackedObject::with_props(named)))
    })
    .labeled("hash"))
}

fn array(args: CapturedArgs) -> Result<Reference> {
    Ok(Reference::formula(move |rt| Ok(Value::array(args.positional_values(rt)?))).labeled("array"))
}

fn eq(args: CapturedArgs) -> Result<Reference> {
    let left = required(&args, 0, "eq")?;
    let right = required(&args, 1, "eq")?;
    Ok(Reference::formula(move |rt| Ok(Value::Bool(left.value(rt)? == right.value(rt)?))).labeled("eq"))
}

fn not(args: CapturedArgs) -> Result<Reference> {
    Ok(Reference::formula(move |rt| {
        for value in args.positional_values(rt)? {
            if value.is_truthy() {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    })
    .labeled("not"))
}
