//! Environment Options
//!
//! Knobs that change how a render environment behaves. Options are plain
//! data so hosts can load them from JSON alongside the rest of their
//! application configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Ember's historical default for `_RERENDER_LOOP_LIMIT`.
pub const DEFAULT_RERENDER_LOOP_LIMIT: u32 = 10;

/// Which element builder the renderer uses for initial renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Build fresh DOM.
    #[default]
    Client,
    /// Build DOM annotated with block markers so it can be rehydrated later.
    Serialize,
    /// Claim DOM previously produced by a serialize render.
    Rehydrate,
}

/// Options for an [`Environment`](crate::Environment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    pub render_mode: RenderMode,

    /// How many extra run loop turns a renderer may request before it is
    /// torn down as runaway.
    pub rerender_loop_limit: u32,

    /// Interactive environments fire DOM lifecycle events and install
    /// modifiers. Server-side environments do neither.
    pub is_interactive: bool,

    /// When a root fails to render, replace its render step with a logging
    /// no-op instead of retrying it on every revalidation.
    pub squelch_render_errors: bool,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::Client,
            rerender_loop_limit: DEFAULT_RERENDER_LOOP_LIMIT,
            is_interactive: true,
            squelch_render_errors: cfg!(debug_assertions),
        }
    }
}

impl EnvironmentOptions {
    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn with_loop_limit(mut self, limit: u32) -> Self {
        self.rerender_loop_limit = limit;
        self
    }

    pub fn non_interactive(mut self) -> Self {
        self.is_interactive = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let opts = EnvironmentOptions::from_json(r#"{ "render_mode": "serialize" }"#).unwrap();
        assert_eq!(opts.render_mode, RenderMode::Serialize);
        assert_eq!(opts.rerender_loop_limit, DEFAULT_RERENDER_LOOP_LIMIT);
        assert!(opts.is_interactive);
    }

    #[test]
    fn rejects_unknown_render_mode() {
        assert!(EnvironmentOptions::from_json(r#"{ "render_mode": "canvas" }"#).is_err());
    }
}
