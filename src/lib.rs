//! Maskpad: an image annotation window.
//!
//! Load an image, draw pen and eraser strokes over it while a hidden
//! black-and-white mask records everything the pen touched, then send the
//! merged, drawing, and mask layers to an annotation server or export them
//! locally.

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod io;
pub mod logger;
pub mod net;
pub mod settings;
pub mod view;
