//! Cross-thread notices.
//!
//! Script threads and host callbacks append [`Notice`] values to the
//! [`NoticeBuffer`](crate::resources::notices::NoticeBuffer) from whatever
//! thread they run on; the per-tick logic system is the only drainer.

use crate::components::shape::ShapeId;
use crate::components::tween::TweenChannel;
use crate::events::audio::AudioCmd;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A tween or frame animation ran to completion (not cancelled).
    AnimationDone {
        shape: ShapeId,
        channel: TweenChannel,
        animation: Option<String>,
    },
    Audio(AudioCmd),
}
