//! Word-level Markov chain chat generator.
//!
//! This crate provides:
//! - A first-order word Markov chain with JSON persistence
//! - A corpus builder reading paginated chat history into per-author models
//! - A file store laid out per community and per author
//! - Runtime message generation, with an alternate line-file generator
//! - A responder deciding when the bot speaks

/// Line-file alternate generator and the author ownership seam.
pub mod alternate;

/// Corpus pass: history pagination, message filtering and model building.
pub mod corpus;

/// Error types for every component.
pub mod error;

/// Message history sources (trait and JSON dump implementation).
pub mod history;

/// Identifier newtypes (community, author, channel, message).
pub mod ids;

/// Markov chain, nodes and the runtime message generator.
pub mod model;

/// When to chime in, and which generator speaks.
pub mod responder;

/// Model and raw message persistence.
pub mod store;

/// I/O utilities (file listing, line files).
///
/// Not exposed
pub(crate) mod io;
