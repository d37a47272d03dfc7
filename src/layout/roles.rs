//! Role assignment for the selected source images
//!
//! Three images are selected per print: the captured photo, its AI rendition
//! and the QR code pointing at the customer's folder. They arrive in no
//! particular order, so roles are assigned by width: widest first.

use serde::{Deserialize, Serialize};

use crate::assets::SourceImage;
use crate::error::{ChekiError, Result};
use crate::layout::geometry::Variant;

/// Number of source images a print needs.
pub const REQUIRED_SOURCES: usize = 3;

/// Layout role of a selected image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Real photo
    Primary,
    /// AI photo
    Secondary,
    /// QR / reference code
    Marker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Marker => "marker",
        }
    }

    /// The printed variant this role is rendered as, if any
    pub fn variant(&self) -> Option<Variant> {
        match self {
            Self::Primary => Some(Variant::Primary),
            Self::Secondary => Some(Variant::Secondary),
            Self::Marker => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one image per role
#[derive(Debug, Clone)]
pub struct RoleAssignment {
    pub primary: SourceImage,
    pub secondary: SourceImage,
    pub marker: SourceImage,
}

impl RoleAssignment {
    /// Assign roles by width, descending.
    ///
    /// Ties keep their input order. Images beyond the third widest are
    /// ignored.
    pub fn assign(images: Vec<SourceImage>) -> Result<Self> {
        if images.len() < REQUIRED_SOURCES {
            return Err(ChekiError::InsufficientInput {
                required: REQUIRED_SOURCES,
                supplied: images.len(),
            });
        }
        if images.len() > REQUIRED_SOURCES {
            tracing::warn!(
                "{} images supplied, ignoring all but the {} widest",
                images.len(),
                REQUIRED_SOURCES
            );
        }

        let mut sorted = images;
        sorted.sort_by(|a, b| b.width().cmp(&a.width()));
        let mut ranked = sorted.into_iter();

        let primary = ranked.next().ok_or_else(|| unresolved(Role::Primary))?;
        let secondary = ranked.next().ok_or_else(|| unresolved(Role::Secondary))?;
        let marker = ranked.next().ok_or_else(|| unresolved(Role::Marker))?;

        if primary.width() == secondary.width() || secondary.width() == marker.width() {
            tracing::warn!("Selected images share a width; role assignment follows input order");
        }

        tracing::debug!(
            primary = %primary.origin(),
            secondary = %secondary.origin(),
            marker = %marker.origin(),
            "Assigned image roles"
        );

        Ok(Self {
            primary,
            secondary,
            marker,
        })
    }

    /// Image playing `role`
    pub fn get(&self, role: Role) -> &SourceImage {
        match role {
            Role::Primary => &self.primary,
            Role::Secondary => &self.secondary,
            Role::Marker => &self.marker,
        }
    }

    /// Image rendered as `variant`
    pub fn for_variant(&self, variant: Variant) -> &SourceImage {
        match variant {
            Variant::Primary => &self.primary,
            Variant::Secondary => &self.secondary,
        }
    }
}

fn unresolved(role: Role) -> ChekiError {
    ChekiError::RoleResolution {
        role: role.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbaImage};

    fn blank(origin: &str, w: u32, h: u32) -> SourceImage {
        SourceImage::from_dynamic(origin, DynamicImage::ImageRgba8(RgbaImage::new(w, h)))
    }

    #[test]
    fn test_widest_is_primary() {
        let roles = RoleAssignment::assign(vec![
            blank("qr", 10, 10),
            blank("real", 30, 20),
            blank("ai", 20, 40),
        ])
        .unwrap();
        assert_eq!(roles.primary.origin(), "real");
        assert_eq!(roles.secondary.origin(), "ai");
        assert_eq!(roles.marker.origin(), "qr");
        assert_eq!(roles.get(Role::Marker).origin(), "qr");
    }

    #[test]
    fn test_too_few_images() {
        let err = RoleAssignment::assign(vec![blank("a", 1, 1), blank("b", 2, 2)]).unwrap_err();
        assert!(matches!(
            err,
            ChekiError::InsufficientInput {
                required: 3,
                supplied: 2
            }
        ));
    }

    #[test]
    fn test_ties_keep_input_order() {
        let roles = RoleAssignment::assign(vec![
            blank("first", 20, 20),
            blank("second", 20, 30),
            blank("small", 5, 5),
        ])
        .unwrap();
        assert_eq!(roles.primary.origin(), "first");
        assert_eq!(roles.secondary.origin(), "second");
    }

    #[test]
    fn test_role_variants() {
        assert_eq!(Role::Primary.variant(), Some(Variant::Primary));
        assert_eq!(Role::Marker.variant(), None);
    }
}
