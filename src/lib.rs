//! Naja - rescue dispatch and escalation engine for snakebite emergencies.
//!
//! # Overview
//!
//! Given a reported bite location, Naja finds and engages a rescuer within a
//! bounded time. It solicits nearby rescuers in sessions - one round of
//! pings at a fixed search radius - and escalates the radius when a session
//! fails: two tries per radius tier (5, 10, 20 km by default), six sessions
//! total. The first rescuer to accept wins; everyone else's pending request
//! is marked taken. Alongside dispatch, the engine re-scores the victim's
//! symptom severity as time elapses since the bite.
//!
//! # Modules
//!
//! - [`model`]: Incidents, sessions, rescuer requests, reference data
//! - [`storage`]: SQLite layer with conditional state transitions
//! - [`config`]: Radius tiers, deadlines, and ceilings (env-tunable)
//! - [`error`]: Typed failure taxonomy returned to callers
//! - [`matcher`]: Candidate ranking inside the search radius
//! - [`severity`]: Pure time-decayed symptom scoring
//! - [`session`]: Session state machine and the escalation policy
//! - [`lifecycle`]: Per-request responses and first-accept arbitration
//! - [`sweeper`]: Background deadline expiry
//! - [`coordinator`]: Top-level incident operations
//! - [`notify`]: Outbound dispatch events (log or webhook)
//! - [`api`]: HTTP handlers

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod model;
pub mod notify;
pub mod session;
pub mod severity;
pub mod storage;
pub mod sweeper;
