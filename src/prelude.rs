//! Convenience re-exports for common use.

pub use crate::config::{EngineSettings, GlimpseConfig};
pub use crate::context::ScreenshotMode;
pub use crate::error::{GlimpseError, Result};
pub use crate::models::{ModelConfig, ModelSelector, ProviderKey};
pub use crate::provider::{create_adapter, ProviderAdapter};
pub use crate::session::{Session, SessionManager, TurnEvent, TurnInput, TurnSummary};
pub use crate::tools::{FnTool, ParameterBuilder, Tool, ToolArguments, ToolParameters, ToolRegistry};
pub use crate::types::{ImageAttachment, Message, MessageStatus, Role, Usage};
