//! The `{{action}}` element modifier.
//!
//! `{{action "save" model on="submit"}}` attaches a listener to the element.
//! The action is resolved every time the event fires: the first positional
//! argument is re-read, and a string is looked up in the `actions` hash of
//! the `target` argument (or the caller's `this`). Remaining positional
//! arguments are passed to the action.
//!
//! Named arguments:
//!
//! - `on`: event name, `click` by default.
//! - `preventDefault`: `false` leaves the default action alone.
//! - `bubbles`: `false` stops propagation.
//! - `allowedKeys`: modifier keys allowed while the event fires, or `any`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, trace};

use super::{downcast, Bucket, DefinitionState, ModifierContext, ModifierDefinition, ModifierManager};
use crate::dom::{Event, Listener, ListenerId, NodeId};
use crate::environment::Environment;
use crate::error::{RenderError, Result};
use crate::reactive::{Destructor, Function, Reference, Runtime, Value};
use crate::vm::CapturedArgs;

const MANAGER: &str = "action";
const DEFAULT_EVENT: &str = "click";
const MODIFIER_KEYS: [&str; 4] = ["alt", "ctrl", "meta", "shift"];

pub struct ActionBucket {
    element: NodeId,
    args: CapturedArgs,
    caller: Reference,
    event_name: RefCell<String>,
    listener: Cell<Option<ListenerId>>,
    destroyed: Rc<Cell<bool>>,
}

impl ActionBucket {
    pub fn event_name(&self) -> String {
        self.event_name.borrow().clone()
    }
}

#[derive(Debug, Default)]
pub struct ActionModifierManager;

impl ActionModifierManager {
    pub fn definition() -> ModifierDefinition {
        ModifierDefinition {
            name: MANAGER.to_string(),
            manager: Rc::new(Self),
            state: Rc::new(()),
        }
    }

    fn bucket(bucket: &Bucket) -> Result<Rc<ActionBucket>> {
        downcast::<ActionBucket>(bucket, MANAGER, "ActionBucket")
    }

    fn attach(env: &Environment, bucket: &ActionBucket, event_name: &str) {
        let args = bucket.args.clone();
        let caller = bucket.caller.clone();
        let destroyed = bucket.destroyed.clone();
        let listener: Listener = Rc::new(move |rt, event| {
            if destroyed.get() {
                return Ok(());
            }
            handle_event(rt, &args, &caller, event)
        });
        let id = env.document_mut().add_listener(bucket.element, event_name, listener);
        bucket.listener.set(Some(id));
    }
}

fn event_name_of(rt: &Runtime, args: &CapturedArgs) -> Result<String> {
    match args.named("on") {
        Some(on) => match on.value(rt)? {
            Value::String(name) => Ok(name.to_string()),
            _ => Ok(DEFAULT_EVENT.to_string()),
        },
        None => Ok(DEFAULT_EVENT.to_string()),
    }
}

fn flag(rt: &Runtime, args: &CapturedArgs, name: &str) -> Result<bool> {
    match args.named(name) {
        Some(reference) => Ok(!matches!(reference.value(rt)?, Value::Bool(false))),
        None => Ok(true),
    }
}

fn is_allowed_event(rt: &Runtime, args: &CapturedArgs, event: &Event) -> Result<bool> {
    let allowed = match args.named("allowedKeys") {
        Some(reference) => reference.value(rt)?.to_display_string(),
        None => String::new(),
    };
    if allowed == "any" {
        return Ok(true);
    }
    let pressed = [event.alt_key, event.ctrl_key, event.meta_key, event.shift_key];
    Ok(MODIFIER_KEYS
        .iter()
        .zip(pressed)
        .all(|(key, down)| !down || allowed.split_whitespace().any(|k| k == *key)))
}

/// Resolve the action right now.
fn resolve_action(rt: &Runtime, args: &CapturedArgs, caller: &Reference) -> Result<Function> {
    let action = match args.positional(0) {
        Some(reference) => reference.value(rt)?,
        None => return Err(RenderError::assertion("the `action` modifier needs an action")),
    };
    match action {
        Value::Function(f) => Ok(f),
        Value::String(name) => {
            let target = match args.named("target") {
                Some(target) => target.value(rt)?,
                None => caller.value(rt)?,
            };
            target
                .as_object()
                .map(|target| target.get_untracked("actions"))
                .and_then(|actions| actions.as_object().map(|actions| actions.get_untracked(&name)))
                .and_then(|action| action.as_function().cloned())
                .ok_or_else(|| {
                    RenderError::assertion(format!("an action named `{name}` was not found in the target's actions"))
                })
        }
        other => Err(RenderError::assertion(format!(
            "the `action` modifier expects a function or an action name, got {other:?}"
        ))),
    }
}

fn handle_event(rt: &Runtime, args: &CapturedArgs, caller: &Reference, event: &mut Event) -> Result<()> {
    rt.untrack(|| {
        if !is_allowed_event(rt, args, event)? {
            return Ok(());
        }
        if flag(rt, args, "preventDefault")? {
            event.prevent_default();
        }
        if !flag(rt, args, "bubbles")? {
            event.stop_propagation();
        }

        let action = resolve_action(rt, args, caller)?;
        let curried = args
            .positional
            .iter()
            .skip(1)
            .map(|r| r.value(rt))
            .collect::<Result<Vec<_>>>()?;
        trace!(event = %event.kind, "action fired");
        action.call(rt, &curried).map(|_| ())
    })
}

impl ModifierManager for ActionModifierManager {
    fn name(&self) -> &'static str {
        MANAGER
    }

    fn create(&self, cx: ModifierContext<'_>, _state: &DefinitionState) -> Result<Bucket> {
        let event_name = event_name_of(cx.env.runtime(), &cx.args)?;
        Ok(Rc::new(ActionBucket {
            element: cx.element,
            args: cx.args,
            caller: cx.caller.clone(),
            event_name: RefCell::new(event_name),
            listener: Cell::new(None),
            destroyed: Rc::new(Cell::new(false)),
        }))
    }

    fn install(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        let event_name = bucket.event_name();
        Self::attach(env, &bucket, &event_name);
        Ok(())
    }

    fn update(&self, env: &Environment, bucket: &Bucket) -> Result<()> {
        let bucket = Self::bucket(bucket)?;
        let event_name = event_name_of(env.runtime(), &bucket.args)?;
        if event_name == *bucket.event_name.borrow() {
            return Ok(());
        }
        debug!(from = %bucket.event_name.borrow(), to = %event_name, "action event changed");
        if let Some(old) = bucket.listener.take() {
            env.document_mut().remove_listener(bucket.element, old);
        }
        Self::attach(env, &bucket, &event_name);
        *bucket.event_name.borrow_mut() = event_name;
        Ok(())
    }

    fn get_destroyable(&self, env: &Environment, bucket: &Bucket) -> Option<Destructor> {
        let bucket = Self::bucket(bucket).ok()?;
        let document = env.shared_document();
        Some(Box::new(move |_rt| {
            bucket.destroyed.set(true);
            let Some(id) = bucket.listener.take() else {
                return Ok(());
            };
            // A dispatch in progress holds no borrow; a builder might.
            match document.try_borrow_mut() {
                Ok(mut doc) => doc.remove_listener(bucket.element, id),
                Err(_) => {
                    debug!(element = ?bucket.element, "document busy, listener left disabled");
                    bucket.listener.set(Some(id));
                }
            }
            Ok(())
        }))
    }
}
