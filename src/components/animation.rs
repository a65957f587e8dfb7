use serde::{Deserialize, Serialize};

/// Named frame animation, supplied by a shape description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationTemplate {
    /// Number of frames in the sequence.
    pub frames: usize,
    /// Frames per second before `speed` is applied.
    pub fps: f64,
    #[serde(default)]
    pub looped: bool,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Audio cue played once when a run of this animation starts.
    #[serde(default)]
    pub cue: Option<String>,
}

fn default_speed() -> f64 {
    1.0
}

impl AnimationTemplate {
    pub fn new(frames: usize, fps: f64) -> Self {
        Self {
            frames,
            fps,
            looped: false,
            speed: 1.0,
            cue: None,
        }
    }

    pub fn looped(mut self) -> Self {
        self.looped = true;
        self
    }

    pub fn with_cue(mut self, cue: impl Into<String>) -> Self {
        self.cue = Some(cue.into());
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Seconds one pass over every frame takes. Zero when it can't advance.
    pub fn pass_duration(&self) -> f64 {
        let rate = self.fps * self.speed;
        if self.frames == 0 || rate <= 0.0 {
            0.0
        } else {
            self.frames as f64 / rate
        }
    }

    /// Frame shown after `elapsed` seconds of playback.
    pub fn frame_at(&self, elapsed: f64) -> usize {
        if self.frames == 0 {
            return 0;
        }
        let raw = (elapsed.max(0.0) * self.fps * self.speed).floor() as usize;
        if self.looped {
            raw % self.frames
        } else {
            raw.min(self.frames - 1)
        }
    }
}
