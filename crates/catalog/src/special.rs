//! Runtime-driven uniform classification. The `source` annotation decides
//! whether a uniform is fed by the orchestrator instead of the user; all of
//! its parameters are resolved here, once, at publication time, so the
//! per-frame update path performs no annotation lookups.

use crate::annotations::Annotations;

/// How a key- or button-driven uniform reacts to input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerMode {
    /// Invert the stored value on each rising edge.
    Toggle,
    /// True only on the frame with the rising edge.
    Press,
    /// Follow the held state.
    Level,
}

/// A runtime-driven uniform with its parameters baked in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Special {
    FrameTime,
    FrameCount,
    Random { min: i32, max: i32 },
    PingPong { min: f32, max: f32, step: [f32; 2], smoothing: f32 },
    Date,
    Timer,
    Key { keycode: u32, mode: TriggerMode },
    MousePoint,
    MouseDelta,
    MouseButton { button: u32, mode: TriggerMode },
}

impl Special {
    /// Classifies a uniform from its annotations. Returns `None` for plain
    /// user uniforms, unknown sources, and key/button sources whose keycode
    /// is outside the accepted range (those never update).
    pub fn from_annotations(annotations: &Annotations) -> Option<Self> {
        match annotations.string("source") {
            "frametime" => Some(Self::FrameTime),
            "framecount" => Some(Self::FrameCount),
            "random" => Some(Self::Random {
                min: annotations.int("min"),
                max: annotations.int("max"),
            }),
            "pingpong" => Some(Self::PingPong {
                min: annotations.float("min"),
                max: annotations.float("max"),
                step: [
                    annotations.float_at("step", 0),
                    annotations.float_at("step", 1),
                ],
                smoothing: annotations.float("smoothing"),
            }),
            "date" => Some(Self::Date),
            "timer" => Some(Self::Timer),
            "key" => {
                let keycode = annotations.int("keycode");
                if (8..256).contains(&keycode) {
                    Some(Self::Key {
                        keycode: keycode as u32,
                        mode: trigger_mode(annotations),
                    })
                } else {
                    None
                }
            }
            "mousepoint" => Some(Self::MousePoint),
            "mousedelta" => Some(Self::MouseDelta),
            "mousebutton" => {
                let button = annotations.int("keycode");
                if (0..5).contains(&button) {
                    Some(Self::MouseButton {
                        button: button as u32,
                        mode: trigger_mode(annotations),
                    })
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

fn trigger_mode(annotations: &Annotations) -> TriggerMode {
    let mode = annotations.string("mode");
    if mode == "toggle" || annotations.flag("toggle") {
        TriggerMode::Toggle
    } else if mode == "press" {
        TriggerMode::Press
    } else {
        TriggerMode::Level
    }
}
