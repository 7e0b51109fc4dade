//! Pipeline stages for rendering changed files.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the browser backend can be swapped without touching the rest.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ language ──▶ request ──▶ render ──▶ export ──▶ persist
//! (git2)     (extension)  (URL)       (driver)   (format)   (atomic write)
//! ```
//!
//! 1. [`source`]   list changed paths and read file content at a revision
//! 2. [`language`] map a path's extension to a highlighter language id
//! 3. [`request`]  build the render request and the parameterised page URL
//! 4. [`render`]   navigate and wait for the render surface; runs inside
//!    `spawn_blocking` because the browser client is blocking
//! 5. [`export`]   drive the format-specific controls and capture bytes
//! 6. [`persist`]  name the artifact and write it atomically
//!
//! [`driver`] is the seam between the protocol and the browser.

pub mod driver;
pub mod export;
pub mod language;
pub mod persist;
pub mod render;
pub mod request;
pub mod source;
