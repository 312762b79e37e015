//! Thin file-system loaders around the persona engine.

pub mod loader;
