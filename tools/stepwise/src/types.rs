use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub type StepMetadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Middle => "middle",
        }
    }
}

/// One captured action. Built-in input actions carry typed payloads; anything
/// else is a `Custom` action whose label is free-form (`read`, `submit`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    MouseMove {
        x: i32,
        y: i32,
    },
    MouseClick {
        x: i32,
        y: i32,
        #[serde(default)]
        button: MouseButton,
    },
    MouseScroll {
        x: i32,
        y: i32,
        dy: i32,
    },
    KeyPress {
        key: String,
        #[serde(default)]
        sensitive: bool,
    },
    KeyRelease {
        key: String,
    },
    TypeText {
        text: String,
    },
    AppSwitch {
        app: String,
    },
    Custom {
        label: String,
        #[serde(default)]
        data: Value,
    },
}

impl Action {
    pub fn custom(label: impl Into<String>, data: Value) -> Self {
        Self::Custom {
            label: label.into(),
            data,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::MouseMove { .. } => "mouse_move",
            Self::MouseClick { .. } => "mouse_click",
            Self::MouseScroll { .. } => "mouse_scroll",
            Self::KeyPress { .. } => "key_press",
            Self::KeyRelease { .. } => "key_release",
            Self::TypeText { .. } => "type_text",
            Self::AppSwitch { .. } => "app_switch",
            Self::Custom { label, .. } => label,
        }
    }

    pub fn is_sensitive(&self) -> bool {
        match self {
            Self::KeyPress { key, sensitive } => *sensitive || key == "***",
            _ => false,
        }
    }

    /// Human-readable one-liner used by previews and the dry-run executor.
    pub fn summary(&self) -> String {
        match self {
            Self::MouseMove { x, y } => format!("Move to ({x}, {y})"),
            Self::MouseClick { x, y, button } => {
                format!("Click {} at ({x}, {y})", button.as_str())
            }
            Self::MouseScroll { dy, .. } => format!("Scroll by {dy}"),
            Self::KeyPress { key, .. } => {
                if self.is_sensitive() {
                    "Key press: ***".to_string()
                } else {
                    format!("Key press: {key}")
                }
            }
            Self::KeyRelease { key } => format!("Key release: {key}"),
            Self::TypeText { text } => format!("Type {} chars", text.chars().count()),
            Self::AppSwitch { app } => format!("Switch to {app}"),
            Self::Custom { label, .. } => label.clone(),
        }
    }
}

impl AsRef<Action> for Action {
    fn as_ref(&self) -> &Action {
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub step_number: u32,
    pub timestamp_ms: u64,
    pub action: Action,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: StepMetadata,
}

impl Step {
    pub fn label(&self) -> &str {
        self.action.label()
    }
}

impl AsRef<Action> for Step {
    fn as_ref(&self) -> &Action {
        &self.action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Completed,
}

impl RecordingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Completed => "completed",
        }
    }

    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "recording" => Some(Self::Recording),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl PlaybackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub fn is_active(self) -> bool {
        matches!(self, Self::Playing | Self::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, MouseButton, Step};
    use serde_json::json;

    #[test]
    fn labels_follow_variant_or_custom_label() {
        assert_eq!(Action::MouseMove { x: 1, y: 2 }.label(), "mouse_move");
        assert_eq!(
            Action::custom("read", json!({"file": "a.txt"})).label(),
            "read"
        );
    }

    #[test]
    fn action_json_is_tagged_by_type() {
        let action = Action::MouseClick {
            x: 10,
            y: 20,
            button: MouseButton::Right,
        };
        let value = serde_json::to_value(&action).expect("serialize");
        assert_eq!(value["type"], json!("mouse_click"));
        assert_eq!(value["button"], json!("right"));

        let parsed: Action =
            serde_json::from_value(json!({"type": "custom", "label": "submit"})).expect("parse");
        assert_eq!(parsed, Action::custom("submit", serde_json::Value::Null));
    }

    #[test]
    fn sensitive_keys_are_masked_in_summaries() {
        let secret = Action::KeyPress {
            key: "p".to_string(),
            sensitive: true,
        };
        assert!(secret.is_sensitive());
        assert_eq!(secret.summary(), "Key press: ***");
        assert_eq!(
            Action::MouseClick {
                x: 3,
                y: 4,
                button: MouseButton::Left
            }
            .summary(),
            "Click left at (3, 4)"
        );
    }

    #[test]
    fn step_metadata_is_omitted_when_empty() {
        let step = Step {
            step_number: 1,
            timestamp_ms: 5,
            action: Action::custom("noop", serde_json::Value::Null),
            metadata: Default::default(),
        };
        let value = serde_json::to_value(&step).expect("serialize");
        assert!(value.get("metadata").is_none());
        assert_eq!(step.label(), "noop");
    }
}
