//! Tracking of user interaction with watched input fields.
//!
//! The tracker answers a single question for the scheduler: is the user in
//! the middle of editing something right now? It is a UX heuristic. A wrong
//! answer delays or hurries a merge but never affects what the merge
//! produces.

use crate::Millis;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How long a select-type field stays in use after an interaction.
pub const SELECT_WINDOW_MS: Millis = 5_000;
/// Select window on touch devices.
pub const TOUCH_SELECT_WINDOW_MS: Millis = 3_000;
/// How long any field stays in use after a touch on touch devices.
pub const TOUCH_WINDOW_MS: Millis = 3_000;
/// Global protection after any tracked interaction.
pub const PROTECTION_WINDOW_MS: Millis = 1_000;

/// Kind of input a watched field is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Select,
}

/// Something the user did to a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldEvent {
    Focus,
    Blur,
    PointerEnter,
    PointerLeave,
    /// Click, keypress, change or touch.
    Interact,
}

#[derive(Debug, Clone, Default)]
struct FieldState {
    kind: FieldKind,
    focused: bool,
    hovered: bool,
    last_interaction: Option<Millis>,
}

/// Per-field interaction state.
#[derive(Debug, Clone, Default)]
pub struct ActivityTracker {
    fields: HashMap<String, FieldState>,
    touch_device: bool,
    protected_until: Millis,
}

impl ActivityTracker {
    pub fn new(touch_device: bool) -> Self {
        Self {
            touch_device,
            ..Self::default()
        }
    }

    pub fn is_touch_device(&self) -> bool {
        self.touch_device
    }

    /// Start watching a field. Events for unwatched fields are ignored.
    pub fn watch(&mut self, field: impl Into<String>, kind: FieldKind) {
        self.fields.entry(field.into()).or_default().kind = kind;
    }

    pub fn unwatch(&mut self, field: &str) {
        self.fields.remove(field);
    }

    /// Record an event on a watched field at time `now`.
    pub fn record(&mut self, field: &str, event: FieldEvent, now: Millis) {
        let Some(state) = self.fields.get_mut(field) else {
            return;
        };
        match event {
            FieldEvent::Focus => state.focused = true,
            FieldEvent::Blur => state.focused = false,
            FieldEvent::PointerEnter => state.hovered = true,
            FieldEvent::PointerLeave => state.hovered = false,
            FieldEvent::Interact => {}
        }
        if matches!(
            event,
            FieldEvent::Focus | FieldEvent::PointerEnter | FieldEvent::Interact
        ) {
            state.last_interaction = Some(now);
            self.protected_until = now.saturating_add(PROTECTION_WINDOW_MS);
        }
    }

    /// Whether one field is in use at `now`.
    pub fn field_in_use(&self, field: &str, now: Millis) -> bool {
        self.fields
            .get(field)
            .is_some_and(|state| self.state_in_use(state, now))
            || self.in_protection_window(now)
    }

    /// Whether any watched field is in use at `now`.
    pub fn is_in_use(&self, now: Millis) -> bool {
        self.in_protection_window(now)
            || self
                .fields
                .values()
                .any(|state| self.state_in_use(state, now))
    }

    /// Names of the fields currently in use, sorted.
    pub fn fields_in_use(&self, now: Millis) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .fields
            .iter()
            .filter(|(_, state)| self.state_in_use(state, now))
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    fn in_protection_window(&self, now: Millis) -> bool {
        now < self.protected_until
    }

    fn state_in_use(&self, state: &FieldState, now: Millis) -> bool {
        if state.focused || state.hovered {
            return true;
        }
        let Some(last) = state.last_interaction else {
            return false;
        };
        let elapsed = now.saturating_sub(last);
        if state.kind == FieldKind::Select {
            let window = if self.touch_device {
                TOUCH_SELECT_WINDOW_MS
            } else {
                SELECT_WINDOW_MS
            };
            if elapsed < window {
                return true;
            }
        }
        self.touch_device && elapsed < TOUCH_WINDOW_MS
    }
}
