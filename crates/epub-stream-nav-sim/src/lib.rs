//! Simulated content and scripted sessions for `epub-stream-nav`.
//!
//! [`content`] provides an [`ItemRenderer`](epub_stream_nav::ItemRenderer)
//! over indexed XHTML documents, fixed pages and images. [`scenario`] reads a
//! JSON book plus a script of reader actions and replays it against a
//! [`Navigator`](epub_stream_nav::Navigator).

#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod content;
pub mod scenario;

pub use content::{
    Block, ContentError, Flow, SharedRenderer, SimItem, SimRenderer, Typography, XhtmlDocument,
};
pub use scenario::{
    ContentSpec, Scenario, ScenarioError, ScenarioItem, ScenarioRunner, Step, StepReport,
};
