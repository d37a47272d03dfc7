//! Cheki print layout
//!
//! - `geometry`: pure layout math for the print template
//! - `roles`: which selected image plays which part
//! - `draw`: raster primitives (rotation, stamping, rotated text)
//! - `compositor`: renders the two print variants

pub mod compositor;
pub mod draw;
pub mod geometry;
pub mod roles;

pub use compositor::{
    compose, prepare_source, CompositeResult, Compositor, EncodedComposite, PreparedSource,
    RenderOptions,
};
pub use geometry::{
    is_landscape, layout_for_source, logo_rotation, source_rotation, ChekiGeometry, Rotation,
    Stamp, Variant,
};
pub use roles::{Role, RoleAssignment, REQUIRED_SOURCES};
