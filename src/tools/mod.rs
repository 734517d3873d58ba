//! Tool definitions, registry, validation and dispatch.

pub mod arguments;
pub mod dispatcher;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use dispatcher::ToolDispatcher;
pub use registry::ToolRegistry;
pub use tool::{FnTool, Tool, ToolContext};
pub use types::{ParameterBuilder, ToolParameters};
pub use validation::validate_arguments;
