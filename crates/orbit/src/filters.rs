/// Selects which cartesian derivative orders participate in interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartesianDerivativesFilter {
    /// Positions only.
    UseP,
    /// Positions and velocities.
    UsePv,
    /// Positions, velocities and accelerations.
    UsePva,
}

impl CartesianDerivativesFilter {
    pub fn uses_velocity(&self) -> bool {
        !matches!(self, CartesianDerivativesFilter::UseP)
    }

    pub fn uses_acceleration(&self) -> bool {
        matches!(self, CartesianDerivativesFilter::UsePva)
    }
}

/// Selects which angular derivative orders participate in interpolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AngularDerivativesFilter {
    /// Rotations only.
    UseR,
    /// Rotations and rotation rates.
    UseRr,
    /// Rotations, rotation rates and their derivatives.
    UseRrr,
}

impl AngularDerivativesFilter {
    pub fn uses_rate(&self) -> bool {
        !matches!(self, AngularDerivativesFilter::UseR)
    }

    pub fn uses_rate_derivative(&self) -> bool {
        matches!(self, AngularDerivativesFilter::UseRrr)
    }
}
