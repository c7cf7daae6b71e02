//! Susceptible closure.
//!
//! The unvaccinated susceptible proportion is never advanced incrementally: it is whatever is left
//! of the age group once every other compartment and the fatalities are accounted for.

use crate::error::ModelError;
use crate::numeric::NEGATIVE_TOLERANCE;
use crate::state::{AgeGroupState, Track};

/// Sanitizes every compartment, sets the unvaccinated susceptible proportion from the
/// conservation identity and checks the result.
///
/// # Errors
///
/// Returns `ModelError::InvariantViolation` when a compartment is out of range beyond the
/// tolerance, or when the other compartments leave less than `-NEGATIVE_TOLERANCE` for the
/// susceptibles.
pub(crate) fn close(
    mut age: AgeGroupState,
    step: u64,
    age_group: usize,
) -> Result<AgeGroupState, ModelError> {
    age.track_mut(Track::Unvaccinated).susceptible[0] = 0.0;
    age.sanitize(step, age_group)?;

    let susceptible = 1.0 - age.total();
    let susceptible = if susceptible >= 0.0 {
        susceptible
    } else if susceptible > -NEGATIVE_TOLERANCE {
        0.0
    } else {
        return Err(ModelError::invariant(step, age_group, "susceptible", susceptible));
    };
    age.track_mut(Track::Unvaccinated).susceptible[0] = susceptible;

    age.check_invariants(step, age_group)?;
    Ok(age)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_almost_eq;
    use crate::state::tests::simple_state;

    #[test]
    fn susceptible_is_the_remainder() {
        let mut age = simple_state().age_groups[0].clone();
        age.track_mut(Track::Unvaccinated).susceptible[0] = 0.5;
        age.track_mut(Track::Unvaccinated).recovered[2] = 0.2;
        age.fatalities = 0.03;
        let closed = close(age, 1, 0).unwrap();
        assert_almost_eq!(closed.susceptible(), 0.76, 1e-12);
        assert_almost_eq!(closed.total(), 1.0, 1e-12);
    }

    #[test]
    fn rounding_deficit_is_clamped() {
        let mut age = simple_state().age_groups[0].clone();
        age.track_mut(Track::Unvaccinated).recovered[0] = 0.990_000_5;
        let closed = close(age, 1, 0).unwrap();
        assert_eq!(closed.susceptible(), 0.0);
    }

    #[test]
    fn large_deficit_is_a_violation() {
        let mut age = simple_state().age_groups[0].clone();
        age.track_mut(Track::Unvaccinated).recovered[0] = 0.995;
        let err = close(age, 7, 0).unwrap_err();
        assert!(matches!(
            err,
            ModelError::InvariantViolation { step: 7, age_group: 0, ref quantity, .. }
                if quantity == "susceptible"
        ));
    }
}
