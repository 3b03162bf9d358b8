//! Reverse-proxy config generator and safe reloader (spec.md §4.7).
//! Rendering is pure and deterministic ([`render`]); reload is the only
//! stateful, serialized part ([`Reloader`]), grounded on the teacher's
//! `command::run_komodo_command` shell-out idiom (here driving
//! `nginx -t` / `nginx -s reload` instead of `docker ...`).

mod certstore;
mod reloader;
mod render;
mod types;

pub use certstore::{cert_paths, write_cert_files};
pub use reloader::{ReloadError, ReloadStatus, Reloader};
pub use render::{RenderOutput, render};
pub use types::{CertInput, RouteInput};
