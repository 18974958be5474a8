//! Tuning constants and display placeholders
//!
//! Values that users may want to change are mirrored by config defaults.

/// Number of records requested per page for every list view.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// How long the "loading more" indicator stays up after a page resolves.
pub const SETTLE_DELAY_MS: u64 = 2000;

/// Distance before the sentinel reaches the viewport at which loading starts.
pub const SENTINEL_MARGIN_PX: f64 = 100.0;

/// Fraction of the sentinel that must intersect the (expanded) viewport.
pub const SENTINEL_THRESHOLD: f64 = 0.1;

/// Height of one rendered list row, used to map terminal rows onto the
/// pixel-based sentinel geometry.
pub const ROW_HEIGHT_PX: f64 = 24.0;

/// Terminal rows assumed visible when the size cannot be detected.
pub const DEFAULT_VIEWPORT_ROWS: u32 = 24;

/// Maximum number of cached pages kept by the query client.
pub const QUERY_CACHE_MAX_ENTRIES: u64 = 256;

/// Time-to-live of a cached page in seconds.
pub const QUERY_CACHE_TTL_SECS: u64 = 300;

/// HTTP request timeout in seconds.
pub const HTTP_TIMEOUT_SECS: u64 = 15;

/// Capacity of the channel carrying fetch results back to a list session.
pub const SESSION_EVENT_CAPACITY: usize = 32;

// === Rendering ===

/// Placeholder shown when a record has no image.
pub const DEFAULT_IMAGE: &str = "/images/placeholder.png";

/// Placeholder for a missing name or author.
pub const UNKNOWN: &str = "Unknown";

/// Placeholder for a missing location, date or other detail.
pub const NOT_AVAILABLE: &str = "N/A";

/// Width of the name column in list output.
pub const NAME_COLUMN_WIDTH: usize = 32;

/// Width of the detail column in list output.
pub const DETAIL_COLUMN_WIDTH: usize = 24;

/// Characters kept when a body is reduced to an excerpt.
pub const EXCERPT_LENGTH: usize = 140;

// === QR ===

/// Default edge length of a generated QR image in pixels.
pub const QR_DEFAULT_SIZE: u32 = 256;

/// Default quiet-zone margin in modules.
pub const QR_DEFAULT_MARGIN: u32 = 4;

/// Largest accepted quiet-zone margin in modules.
pub const QR_MAX_MARGIN: u32 = 64;

/// Largest accepted QR image edge in pixels.
pub const QR_MAX_SIZE: u32 = 8192;
