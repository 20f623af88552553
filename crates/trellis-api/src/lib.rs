pub mod auth;
pub mod channels;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod router;
pub mod users;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use router::create_router;
