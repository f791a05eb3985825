pub mod logging;
pub mod state;

pub use state::AppState;
