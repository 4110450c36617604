//! Slide configuration
//!
//! Declarative slide descriptions, typically loaded from a JSON file mapping
//! slide names to configurations. Several fields accept more than one JSON
//! shape; the deserializers here normalize them once so the rest of the
//! runtime never re-inspects raw values.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::de::{MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::bubbles::BubbleStyle;
use crate::error::Result;
use crate::timer::display::CountdownStyle;

/// What a slide shows as its main media.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MediaDirective {
    /// No media on this slide.
    #[default]
    None,
    /// Adopt the previous slide's media element untouched.
    Keep,
    /// Create media from this source.
    Source(String),
}

impl<'de> Deserialize<'de> for MediaDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(match value.as_deref() {
            None => Self::None,
            Some("keep") => Self::Keep,
            Some(source) => Self::Source(source.to_string()),
        })
    }
}

/// Metronome behavior on slide entry.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum MetronomeDirective {
    /// Stop any running metronome.
    #[default]
    Off,
    /// Carry the previous slide's metronome over at its current rate.
    Keep,
    /// Run at this rate, carrying the instrument over when one exists.
    Bpm(f64),
}

impl<'de> Deserialize<'de> for MetronomeDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::Off),
            Value::String(s) if s == "keep" => Ok(Self::Keep),
            Value::Number(n) => n
                .as_f64()
                .filter(|bpm| *bpm > 0.0)
                .map(Self::Bpm)
                .ok_or_else(|| serde::de::Error::custom("metronome rate must be positive")),
            other => Err(serde::de::Error::custom(format!(
                "metronome must be false, \"keep\" or a rate, got {other}"
            ))),
        }
    }
}

/// Background music behavior on slide entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MusicDirective {
    /// Leave whatever is playing alone.
    #[default]
    Unchanged,
    /// Silence the music layer.
    Stop,
    /// Switch the layer to this track.
    Track(String),
}

impl<'de> Deserialize<'de> for MusicDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Null | Value::Bool(false) => Ok(Self::Stop),
            Value::String(s) if s == "stop" => Ok(Self::Stop),
            Value::String(track) => Ok(Self::Track(track)),
            other => Err(serde::de::Error::custom(format!(
                "music must be false, \"stop\" or a track, got {other}"
            ))),
        }
    }
}

/// What pressing a button does.
#[derive(Clone)]
pub enum ButtonAction {
    /// Navigate to a named slide.
    Goto(String),
    /// Run a programmatic handler.
    Handler(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto(slide) => f.debug_tuple("Goto").field(slide).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// One prompt button.
#[derive(Debug, Clone)]
pub struct ButtonSpec {
    pub label: String,
    pub color: String,
    pub size: String,
    pub action: ButtonAction,
}

impl ButtonSpec {
    pub fn goto(label: &str, slide: &str) -> Self {
        Self {
            label: label.to_string(),
            color: "orange".to_string(),
            size: "medium".to_string(),
            action: ButtonAction::Goto(slide.to_string()),
        }
    }

    pub fn handler(label: &str, f: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.to_string(),
            color: "orange".to_string(),
            size: "medium".to_string(),
            action: ButtonAction::Handler(Arc::new(f)),
        }
    }
}

/// Button list in declaration order.
///
/// Accepts two JSON shapes: a map of label to target (where the target is a
/// slide name or an object with `click`, `color` and `size`), or a sequence
/// of explicit button objects.
#[derive(Debug, Clone, Default)]
pub struct Buttons(pub Vec<ButtonSpec>);

impl<'de> Deserialize<'de> for Buttons {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ButtonsVisitor;

        fn detail<E: serde::de::Error>(
            label: String,
            value: Value,
        ) -> std::result::Result<ButtonSpec, E> {
            match value {
                Value::String(slide) => Ok(ButtonSpec::goto(&label, &slide)),
                Value::Object(map) => {
                    let slide = map
                        .get("click")
                        .and_then(Value::as_str)
                        .ok_or_else(|| E::custom(format!("button {label:?} needs a click target")))?;
                    let mut spec = ButtonSpec::goto(&label, slide);
                    if let Some(color) = map.get("color").and_then(Value::as_str) {
                        spec.color = color.to_string();
                    }
                    if let Some(size) = map.get("size").and_then(Value::as_str) {
                        spec.size = size.to_string();
                    }
                    Ok(spec)
                }
                other => Err(E::custom(format!(
                    "button {label:?} must map to a slide name or an object, got {other}"
                ))),
            }
        }

        impl<'de> Visitor<'de> for ButtonsVisitor {
            type Value = Buttons;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a label-to-target map or a sequence of buttons")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut buttons = Vec::new();
                while let Some((label, value)) = map.next_entry::<String, Value>()? {
                    buttons.push(detail(label, value)?);
                }
                Ok(Buttons(buttons))
            }

            fn visit_seq<A: SeqAccess<'de>>(
                self,
                mut seq: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut buttons = Vec::new();
                while let Some(value) = seq.next_element::<Value>()? {
                    let label = value
                        .get("label")
                        .and_then(Value::as_str)
                        .ok_or_else(|| serde::de::Error::custom("button entry needs a label"))?
                        .to_string();
                    let target = value
                        .get("click")
                        .cloned()
                        .map(|click| {
                            let mut object = serde_json::Map::new();
                            object.insert("click".to_string(), click);
                            for key in ["color", "size"] {
                                if let Some(v) = value.get(key) {
                                    object.insert(key.to_string(), v.clone());
                                }
                            }
                            Value::Object(object)
                        })
                        .ok_or_else(|| serde::de::Error::custom("button entry needs a click target"))?;
                    buttons.push(detail(label, target)?);
                }
                Ok(Buttons(buttons))
            }
        }

        deserializer.deserialize_any(ButtonsVisitor)
    }
}

/// One declarative bubble on a slide.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BubbleSpec {
    Text {
        text: String,
        #[serde(flatten)]
        style: BubbleStyle,
    },
    Buttons {
        buttons: Buttons,
        #[serde(flatten)]
        style: BubbleStyle,
    },
}

/// What happens when a slide's delay expires.
#[derive(Clone)]
pub enum CompleteDirective {
    Goto(String),
    Handler(Arc<dyn Fn() + Send + Sync>),
}

impl fmt::Debug for CompleteDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Goto(slide) => f.debug_tuple("Goto").field(slide).finish(),
            Self::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

impl<'de> Deserialize<'de> for CompleteDirective {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self::Goto(String::deserialize(deserializer)?))
    }
}

/// How a delay presents itself while it counts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DelayStyle {
    /// Visible countdown face.
    #[default]
    Countdown,
    /// Face with no remaining-time readout.
    Unknown,
    /// No face at all.
    Hidden,
}

impl DelayStyle {
    pub fn countdown_style(self) -> Option<CountdownStyle> {
        match self {
            Self::Countdown => Some(CountdownStyle::Live),
            Self::Unknown => Some(CountdownStyle::Unknown),
            Self::Hidden => None,
        }
    }
}

impl<'de> Deserialize<'de> for DelayStyle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        // Unrecognized styles fall back to the visible countdown.
        Ok(match value.as_str() {
            "hidden" => Self::Hidden,
            "unknown" => Self::Unknown,
            _ => Self::Countdown,
        })
    }
}

/// Timed advance for a slide.
#[derive(Debug, Clone, Deserialize)]
pub struct DelayConfig {
    /// Milliseconds until the delay expires.
    pub duration: u64,
    #[serde(default)]
    pub complete: Option<CompleteDirective>,
    #[serde(default)]
    pub style: DelayStyle,
}

/// Full declarative description of one slide.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlideConfig {
    pub media: MediaDirective,
    pub text: Option<String>,
    pub buttons: Buttons,
    pub bubbles: Vec<BubbleSpec>,
    pub metronome: MetronomeDirective,
    pub sound: Option<String>,
    pub music: MusicDirective,
    pub delay: Option<DelayConfig>,
    /// Programmatic hook run after the slide's resources are in place.
    #[serde(skip)]
    pub on_start: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl fmt::Debug for SlideConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlideConfig")
            .field("media", &self.media)
            .field("text", &self.text)
            .field("buttons", &self.buttons)
            .field("bubbles", &self.bubbles)
            .field("metronome", &self.metronome)
            .field("sound", &self.sound)
            .field("music", &self.music)
            .field("delay", &self.delay)
            .field("on_start", &self.on_start.as_ref().map(|_| "..."))
            .finish()
    }
}

impl SlideConfig {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Load a slide deck from a JSON file mapping slide names to configurations.
pub fn load_slide_file(path: &Path) -> Result<HashMap<String, SlideConfig>> {
    let raw = fs::read_to_string(path)?;
    let deck: HashMap<String, SlideConfig> = serde_json::from_str(&raw)?;
    debug!(path = %path.display(), slides = deck.len(), "slide deck loaded");
    Ok(deck)
}
