//! Glimpse: screen-aware streaming chat engine.
//!
//! A [`Session`](session::Session) turns user text (plus an optional
//! screenshot, selection and search results) into a streamed assistant reply
//! from OpenAI, Anthropic, Gemini or Groq. Tool calls requested by the model
//! are executed against a [`ToolRegistry`](tools::ToolRegistry) and answered
//! in one automatic continuation.
//!
//! # Quick Start
//!
//! ```no_run
//! use futures::StreamExt;
//! use glimpse::prelude::*;
//!
//! # async fn example() -> glimpse::error::Result<()> {
//! let config = GlimpseConfig::from_env();
//! let model = config.model_config(ProviderKey::OpenAi, "gpt-4o")?;
//! let mut session = Session::new("demo", &model, config.engine(), ToolRegistry::new())?;
//!
//! let mut events = session.submit_turn("hello");
//! while let Some(event) = events.next().await {
//!     match event {
//!         TurnEvent::Text(text) => print!("{text}"),
//!         TurnEvent::Done(summary) => println!("\n[{}]", summary.status),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod models;
pub mod prelude;
pub mod provider;
pub mod session;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
