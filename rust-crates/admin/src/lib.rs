//! Client-side core of the Nova admin console.
//!
//! Everything that talks to the game-operations API or holds operator state lives
//! here; the terminal front end in `rust-crates/tui` only draws it.

pub mod api;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod grid;
pub mod model;
pub mod refresh;
pub mod selection;
pub mod session;

pub use api::{
    AdminApi,
    Authenticator,
    HttpAdminApi,
};
pub use dashboard::DashboardView;
pub use error::ConsoleError;
pub use model::{
    PlayerRecord,
    RecordSnapshot,
    RowHandle,
    TelegramId,
};
pub use session::{
    AuthToken,
    Session,
    TokenStore,
};
