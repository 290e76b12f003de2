//! Authored workout schedules.
//!
//! A [`Schedule`] is an ordered list of [`ScheduleStep`]s. Schedules are
//! created by an authoring flow and are read-only to the playback engine,
//! which tolerates malformed values (non-positive durations, duplicate ids)
//! rather than rejecting them.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Opaque step key, unique within a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

/// Media played while a step is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub url: String,
    /// Short caption shown next to the media.
    #[serde(default)]
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleStep {
    pub id: StepId,
    pub name: String,
    /// Duration in seconds. Values <= 0 are played as zero-length steps.
    pub duration_secs: i64,
    /// Authored per-step rest. Playback uses the session rest setting instead.
    #[serde(default)]
    pub rest_duration_secs: i64,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
    /// Suggested repeat count. Only applied on request.
    #[serde(default)]
    pub sprint_count: Option<u32>,
    /// Announce the last N seconds of the step.
    #[serde(default)]
    pub countdown_voice_secs: Option<u32>,
    #[serde(default)]
    pub mute_background: bool,
}

impl ScheduleStep {
    pub fn new(id: impl Into<StepId>, name: impl Into<String>, duration_secs: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration_secs,
            rest_duration_secs: 0,
            media: None,
            sprint_count: None,
            countdown_voice_secs: None,
            mute_background: false,
        }
    }

    pub fn with_media(mut self, media: MediaAttachment) -> Self {
        self.media = Some(media);
        self
    }

    /// Duration actually played, clamping non-positive values to zero.
    pub fn effective_duration_secs(&self) -> u64 {
        self.duration_secs.max(0) as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub steps: Vec<ScheduleStep>,
}

impl Schedule {
    /// Create a schedule with a freshly generated id.
    pub fn new(title: impl Into<String>, steps: Vec<ScheduleStep>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            owner_id: None,
            steps,
        }
    }

    /// A short demo circuit used by the CLI when no schedule is given.
    pub fn sample() -> Self {
        Self {
            id: "sample".into(),
            title: "Sample Circuit".into(),
            owner_id: None,
            steps: vec![
                ScheduleStep {
                    countdown_voice_secs: Some(3),
                    ..ScheduleStep::new("warmup", "Warm Up", 30)
                },
                ScheduleStep {
                    media: Some(MediaAttachment {
                        kind: MediaKind::Video,
                        url: "https://media.example.com/squats.mp4".into(),
                        hint: Some("Keep your heels down".into()),
                    }),
                    sprint_count: Some(3),
                    countdown_voice_secs: Some(3),
                    mute_background: true,
                    ..ScheduleStep::new("squats", "Squats", 40)
                },
                ScheduleStep {
                    media: Some(MediaAttachment {
                        kind: MediaKind::Image,
                        url: "https://media.example.com/plank.png".into(),
                        hint: None,
                    }),
                    countdown_voice_secs: Some(5),
                    ..ScheduleStep::new("plank", "Plank", 45)
                },
            ],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &StepId) -> Option<&ScheduleStep> {
        self.steps.iter().find(|s| &s.id == id)
    }

    /// Index of the first step carrying `id`.
    pub fn position(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    /// Sum of effective step durations, ignoring repeats and rests.
    pub fn total_duration_secs(&self) -> u64 {
        self.steps.iter().map(|s| s.effective_duration_secs()).sum()
    }

    /// Checks authoring invariants. The engine never calls this.
    ///
    /// # Errors
    /// Returns an error for an empty schedule id or step id, or a duplicate step id.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyId("schedule".into()));
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.as_str().trim().is_empty() {
                return Err(ValidationError::EmptyId(format!("step '{}'", step.name)));
            }
            if !seen.insert(&step.id) {
                return Err(ValidationError::DuplicateStepId(step.id.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_duration_clamps_to_zero() {
        assert_eq!(ScheduleStep::new("a", "A", -5).effective_duration_secs(), 0);
        assert_eq!(ScheduleStep::new("a", "A", 0).effective_duration_secs(), 0);
        assert_eq!(ScheduleStep::new("a", "A", 12).effective_duration_secs(), 12);
    }

    #[test]
    fn sample_schedule_is_valid() {
        let s = Schedule::sample();
        assert!(s.validate().is_ok());
        assert_eq!(s.steps.len(), 3);
        assert_eq!(s.total_duration_secs(), 30 + 40 + 45);
    }

    #[test]
    fn duplicate_step_ids_rejected() {
        let s = Schedule::new(
            "dup",
            vec![ScheduleStep::new("a", "A", 5), ScheduleStep::new("a", "B", 5)],
        );
        assert!(matches!(
            s.validate(),
            Err(ValidationError::DuplicateStepId(id)) if id == "a"
        ));
    }

    #[test]
    fn deserializes_with_defaults() {
        let json = r#"{
            "id": "s1",
            "title": "Legs",
            "steps": [
                {"id": "lunge", "name": "Lunges", "duration_secs": 20,
                 "media": {"kind": "audio", "url": "file:///beat.mp3"}}
            ]
        }"#;
        let s: Schedule = serde_json::from_str(json).unwrap();
        let step = &s.steps[0];
        assert_eq!(step.rest_duration_secs, 0);
        assert!(!step.mute_background);
        assert_eq!(step.media.as_ref().map(|m| m.kind), Some(MediaKind::Audio));
        assert_eq!(s.position(&StepId::from("lunge")), Some(0));
    }
}
