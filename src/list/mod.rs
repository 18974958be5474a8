//! Paginated list views
//!
//! - `state`: search term, page and accumulated records of one view
//! - `loader`: sentinel-driven incremental loading
//! - `projector`: client-side sorting and filtering
//! - `session`: async driver wiring the above to the query client

pub mod loader;
pub mod projector;
pub mod session;
pub mod state;

pub use loader::{LoaderIndicator, Rect};
pub use projector::{SortKey, project_local};
pub use session::{ListSession, ViewStatus};
