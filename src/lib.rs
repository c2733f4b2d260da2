//! Cardlab is a deck artwork pipeline.
//!
//! A deck is a grid of card designs keyed by (color, number). For each slot
//! the pipeline deterministically renders a source layer and an inpainting
//! mask on a CPU raster surface, asks an external inpainting service to
//! generate the artwork, and caches the result in a durable per-slot store:
//!
//! - Render one card's layers with a [`CardRenderer`]
//! - Generate one card with a [`SingleCardOrchestrator`]
//! - Fill every missing slot in one round trip with a [`BatchOrchestrator`]
#![forbid(unsafe_code)]

pub mod blur;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrate;
pub mod persist;
pub mod render;
pub mod service;
pub mod store;
pub mod surface;
pub mod text;

pub use config::{AppConfig, CardStyle, InpaintTuning, MaskPolarity, Model, Transform};
pub use error::{CardLabError, CardLabResult};
pub use model::{Card, CardPhase, Color, Slot};
pub use orchestrate::{BatchOrchestrator, BatchReport, SingleCardOrchestrator, SingleOutcome};
pub use persist::{EphemeralState, JsonFileState, StatePersistence};
pub use render::{CardRenderer, LayerKind};
pub use service::{HttpInpaintClient, InpaintClient, InpaintRequest, InpaintResponse};
pub use store::ResultStore;
pub use surface::CardSurface;
