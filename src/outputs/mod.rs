//! Output generation for the rendered newsletter.
//!
//! # Submodules
//!
//! - [`newsletter`]: Markdown-to-HTML conversion, template rendering and the
//!   optional on-disk copy of the result

pub mod newsletter;
