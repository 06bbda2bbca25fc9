mod app;
pub mod lifecycle;
pub mod middleware;
mod state;

pub use app::create_app;
pub use lifecycle::{on_shutdown, on_startup};
pub use state::AppState;
