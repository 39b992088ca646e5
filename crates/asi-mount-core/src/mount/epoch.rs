//! Coordinate epoch conversion
//!
//! The mount works in the coordinates of its configured epoch. Precession
//! math is supplied by the host through [`EpochTransform`].

/// Converts equatorial coordinates between the mount's epoch and the
/// reference epoch used by callers. RA in hours, Dec in degrees.
pub trait EpochTransform: Send + Sync {
    /// Mount epoch to reference epoch
    fn to_reference(&self, ra: f64, dec: f64) -> (f64, f64);

    /// Reference epoch to mount epoch
    fn from_reference(&self, ra: f64, dec: f64) -> (f64, f64);
}

/// Passes coordinates through unchanged (mount already at the reference epoch)
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityEpoch;

impl EpochTransform for IdentityEpoch {
    fn to_reference(&self, ra: f64, dec: f64) -> (f64, f64) {
        (ra, dec)
    }

    fn from_reference(&self, ra: f64, dec: f64) -> (f64, f64) {
        (ra, dec)
    }
}
