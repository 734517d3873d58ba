//! Screenshot context policy.

pub mod policy;

pub use policy::{is_affirmative, ContextPolicy, ModelProbe, ScreenshotMode, ScreenshotProbe};
