pub mod aggregate;
pub mod colors;
pub mod compositor;
pub mod map;
pub mod overlay;
pub mod timeline;
pub mod trip;
pub mod visits;

pub use aggregate::*;
pub use compositor::{OverlayItem, composite};
pub use map::{MapFill, MapOptions, TimelineView, compose_map};
pub use overlay::*;
pub use timeline::*;
pub use trip::*;
pub use visits::*;
