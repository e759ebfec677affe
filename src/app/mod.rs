//! Binary-side helpers: input assembly and progress display.

pub(crate) mod input_processor;
pub(crate) mod progress_manager;
