//! Terminal chat client for aiwrap.
//!
//! Renders a scrolling transcript with an input line using `ratatui` and
//! streams assistant replies token by token through an
//! [`AiService`](aiwrap_ai::AiService).
//!
//! - [`app`] -- Session state, key handling and the streaming task.
//! - [`ui`] -- Layout and rendering.
//! - [`run`] -- Terminal setup and the draw-and-poll loop.

pub mod app;
pub mod error;
pub mod run;
pub mod ui;

pub use app::{ChatSettings, TuiApp};
pub use error::{Result, TuiError};
pub use run::run_tui;
