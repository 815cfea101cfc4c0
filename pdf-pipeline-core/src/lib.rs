#![doc = "pdf-pipeline-core: job pipeline library for the PDF conversion worker."]

//! This crate holds the job model, the conversion fallback state machine, artifact
//! upload, completion fan-out and the long-running service loop.
//! Concrete network transports live in the `pdf-pipeline` binary crate; everything
//! here talks to the outside world through the traits in [`contract`].
//!
//! # Usage
//! Build a [`processor::JobProcessor`] from the collaborators you have, hand it to a
//! [`service::ServiceLoop`] together with a [`contract::MessageQueue`], and call `run`.

pub mod config;
pub mod contract;
pub mod convert;
pub mod download;
pub mod error;
pub mod export;
pub mod job;
pub mod notify;
pub mod processor;
pub mod service;
pub mod upload;

pub use error::{ConversionError, EngineError, JobError};
pub use job::{Job, ReceivedMessage};
