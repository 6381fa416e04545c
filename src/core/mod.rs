//! Core types and utilities

pub mod types;
pub mod error;
pub mod logging;
pub mod view;

pub use types::*;
pub use error::Error;
pub use view::{Eye, StereoMode, View, Viewport};
