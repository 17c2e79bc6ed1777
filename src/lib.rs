//! # Scene Router
//!
//! > **The routing core of a distributed actor runtime.**
//!
//! Entities live in *scenes*: single-logical-thread execution contexts, many per process,
//! reachable from anywhere in the cluster by a 64-bit [`Address`](address::Address). This
//! crate moves frames between them: it classifies each frame by its opcode, delivers it to
//! the right scene and entity, serializes per-entity work, correlates responses with pending
//! calls, and keeps routing intact while entities migrate.
//!
//! ## Architecture Notes
//!
//! ### 1. One tag decides the route
//! Every [`OpCode`](opcode::OpCode) carries a protocol type that maps to exactly one
//! classification: endpoint (inner/outer) × kind (message/request/response) × scope (direct,
//! address, addressable, custom route, roaming). The dispatcher branches on that tag before
//! touching the payload.
//!
//! ### 2. Scenes are the unit of concurrency
//! Each scene drains its own job queue on one driver task. Jobs of a scene never overlap; jobs
//! of different scenes run in parallel. Work that suspends (lock grant, RPC response, timer)
//! re-validates what it read once it resumes.
//!
//! ### 3. Hot reload through snapshots
//! The type registry, the handler table, entity tables and the network's route table are
//! immutable snapshots behind `ArcSwap`. Readers never block; writers publish a new snapshot.
//!
//! ### 4. Errors stay typed until the wire
//! Every module has its own `thiserror` enum. Errors become an in-band
//! [`ErrorCode`](protocol::ErrorCode) only where a failure response is written.
//!
//! ## Module Tour
//!
//! - [`address`], [`opcode`], [`protocol`]: identities, classification, the frame envelope
//!   and built-in messages.
//! - [`registry`]: opcode → message type, reloadable per assembly.
//! - [`dispatch`]: handler traits, handler sets and the [`MessageDispatcher`](dispatch::MessageDispatcher).
//! - [`lock`]: [`CoroutineLock`](lock::CoroutineLock) and [`FlowLock`](lock::FlowLock).
//! - [`rpc`]: the [`RpcCorrelator`](rpc::RpcCorrelator).
//! - [`scene`]: scenes, sessions and the process [`Network`](scene::Network).
//! - [`addressable`]: stable keys for entities that move.
//! - [`roaming`]: per-client termini and their transfer protocol.
//! - [`gate`]: client connections and how their frames enter the cluster.
//! - [`runtime`]: [`Process`](runtime::Process) and tracing setup.
//! - [`config`]: TOML runtime configuration.
//! - [`mock`]: recording sessions for tests.
//!
//! ## Running Tests
//!
//! ```bash
//! RUST_LOG=debug cargo test
//! ```

pub mod address;
pub mod addressable;
pub mod config;
pub mod dispatch;
pub mod gate;
pub mod lock;
pub mod mock;
pub mod opcode;
pub mod protocol;
pub mod registry;
pub mod roaming;
pub mod rpc;
pub mod runtime;
pub mod scene;
