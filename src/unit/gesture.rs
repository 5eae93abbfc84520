//! Gesture units driving an embodied agent.

use serde::{Deserialize, Serialize};

use super::Payload;

/// One named animation or emotion cue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Animation {
    pub name: String,
    pub duration: f64,
    pub delay: f64,
}

/// One gaze or limb movement toward a 2D target.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Movement {
    pub x: f64,
    pub y: f64,
    pub duration: f64,
    pub delay: f64,
}

/// Payload of a gesture unit: timed cue tracks for an embodied agent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GesturePayload {
    pub animations: Vec<Animation>,
    pub emotions: Vec<Animation>,
    pub eye_gazes: Vec<Movement>,
    pub left_hand_movements: Vec<Movement>,
    pub right_hand_movements: Vec<Movement>,
    pub head_movements: Vec<Movement>,
}

impl Payload for GesturePayload {
    const KIND: &'static str = "gesture";
    const FIELDS: &'static [&'static str] = &[
        "animations",
        "emotions",
        "eye_gazes",
        "left_hand_movements",
        "right_hand_movements",
        "head_movements",
    ];
}
