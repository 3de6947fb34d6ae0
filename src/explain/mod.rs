//! Grad-CAM explanation pipeline
//!
//! - [`locator`]: picks the deepest rank-4 layer of a classifier, once per model
//! - [`saliency`]: gradient-weighted class activation map for one input
//! - [`compositor`]: colorizes the map and blends it over the original image
//!
//! ```rust,ignore
//! let layer = find_last_spatial_layer(&classifier)?;
//! let heatmap = compute_heatmap(&classifier, input, &layer, None)?;
//! let composite = overlay(&heatmap, &original, DEFAULT_BLEND_STRENGTH)?;
//! ```

pub mod compositor;
pub mod heatmap;
pub mod locator;
pub mod saliency;

pub use compositor::{encode_png, overlay, DEFAULT_BLEND_STRENGTH};
pub use heatmap::RawHeatmap;
pub use locator::find_last_spatial_layer;
pub use saliency::compute_heatmap;
