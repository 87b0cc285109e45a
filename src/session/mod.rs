//! Directional transfer state machines.
//!
//! [`UploadSession`] sends a frame and waits for the ack; [`DownloadSession`]
//! receives a frame. Both run over the same [`crate::connection::Connection`],
//! strictly half-duplex.

pub mod download;
pub mod upload;

pub use download::{DownloadSession, DownloadState, DownloadedArtifact, Inbound};
pub use upload::{UploadSession, UploadState};
