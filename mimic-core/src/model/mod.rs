//! Word-level Markov chain and message generation.
//!
//! - Chain nodes with weighted successors (`Node`)
//! - The chain itself, with training and generation (`MarkovModel`)
//! - Runtime selection of an author's model (`MessageGenerator`)

/// Picks a random author's saved model and generates a message from it.
pub mod generator;

/// First-order word chain with Start/End sentinels.
///
/// Handles transition counting, weighted random generation,
/// merging and the JSON file format.
pub mod markov_model;

/// A single word and its weighted outgoing edges.
pub mod node;
