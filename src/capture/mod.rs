//! Capture widgets
//!
//! A `CaptureController` is one consumer of the shared device stream. It
//! toggles recording sessions and reports what its widget should render.

mod controller;

pub use controller::{CaptureController, PreviewState, Toggle, WidgetView};
