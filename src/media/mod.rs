//! Captured-media collaborator contract and local track handles

pub mod capture;

pub use capture::{LocalTracks, MediaCapture, TrackKind};
