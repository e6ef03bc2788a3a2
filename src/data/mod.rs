//! Client data plumbing: loaders, normalization and candidate initialization

mod extension;
mod loader;
mod normalization;

pub use extension::{used_tokens, CandidateBatch, DataExtension, ImageExtension, TextExtension};
pub use loader::{Batch, DataLoader};
pub use normalization::Normalization;
