//! Request orchestration for pest image classification.
//!
//! [`ClassificationService`] owns the embedding backbone, the reference
//! index and the optional secondary classifier, runs inference on blocking
//! workers and fuses both score sources into one ranking.

mod service;

pub use service::ClassificationService;
