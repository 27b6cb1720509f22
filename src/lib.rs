//! Lombardy Energy Leads
//!
//! Backend for an energy-consultant dashboard: generates and extracts
//! leads (companies in Lombardy with their estimated electricity
//! consumption) through a switchable hosted model, accumulates them per
//! dashboard session, and offers analytics, CSV export, a search-grounded
//! chat and a live voice relay.
//!
//! # Modules
//!
//! - `models`: Core data models (companies, filters, provider config, chat).
//! - `prompts`: Prompt templates.
//! - `normalize`: Turning model output into company records.
//! - `gemini_client`, `cerebras_client`: Provider adapters.
//! - `services`: Request orchestration across providers.
//! - `accumulator`: Per-session lead list, in-flight guards and chat.
//! - `analytics`: Consumption summary.
//! - `export`: CSV export.
//! - `provider_store`: Persisted provider selection.
//! - `pcm`, `playback`, `live`, `live_handler`: Live voice relay.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`, `routes`: HTTP surface.

pub mod accumulator;
pub mod analytics;
pub mod cerebras_client;
pub mod config;
pub mod errors;
pub mod export;
pub mod gemini_client;
pub mod handlers;
pub mod live;
pub mod live_handler;
pub mod models;
pub mod normalize;
pub mod pcm;
pub mod playback;
pub mod prompts;
pub mod provider_store;
pub mod routes;
pub mod services;
