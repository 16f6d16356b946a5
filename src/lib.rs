//! Transform gizmo sessions for digital-twin scenes.
//!
//! Instances live in a local East-North-Up frame anchored at the scene's
//! geographic origin. Moving a parent instance with the gizmo carries its
//! renderable descendants along and persists everything in one batch.

pub mod backend;
pub mod config;
pub mod editor;
pub mod geo;
pub mod gizmo;
pub mod hierarchy;
pub mod reconcile;
pub mod render;
pub mod replay;
pub mod scene;
