//! Client-side session lifecycle for the hospital management front-ends: bearer token decoding,
//! expiry tracking with forced logout, a durable profile cache, and the coordinator that ties
//! them together for the UI.

//--------------------------------------------------------------------------------------------------

pub mod api;
pub mod cache;
pub mod clock;
pub mod codec;
pub mod config;
pub mod guard;
pub mod internal;
pub mod monitor;
pub mod role;
pub mod session;
pub mod storage;
#[cfg(test)]
mod testing;
mod token;
mod types;

#[cfg(feature = "http")]
pub use api::HttpProfileApi;
pub use api::{ApiError, Credentials, ProfileApi};
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::TokenClaims;
pub use config::SessionConfig;
pub use guard::{GuardRejection, RouteDecision};
pub use role::{Permission, Role};
pub use session::{LoginError, Navigator, Session, SessionBuilder, SessionState};
pub use storage::{FileStorage, MemoryStorage, Storage, StorageError, StorageEvent};
pub use token::BearerToken;
pub use types::*;

//--------------------------------------------------------------------------------------------------
