//! KeyRouter - bring-your-own-key model router
//!
//! Scores the models a user has configured credentials for against each
//! request, advises on retries after provider errors, and keeps a small
//! persisted ledger of usage, quota and cooldowns.
//!
//! The routing core ([`normalizer`], [`router`], [`retry`]) is pure and never
//! fails. [`state`] persists usage, [`shared::Workflow`] wires everything
//! together for the CLI and the hook server in [`handlers`].

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hard_apply;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod normalizer;
pub mod retry;
pub mod router;
pub mod shared;
pub mod state;
pub mod telemetry;
