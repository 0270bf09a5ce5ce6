//! Contains the [`Transform`] abstraction, the business rule an update
//! applies to the latest payload of a record.

/// Error returned by a [`Transform`] when the computed payload would violate
/// a domain constraint.
///
/// A rejected payload is never committed, nor silently clamped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("business rule rejected the update: {message}")]
pub struct BusinessRuleError {
    message: String,
}

impl BusinessRuleError {
    /// Creates a new error carrying the specified explanation.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The explanation of the rejection.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Transformation from the current payload of a record to its next one.
///
/// A `Transform` may be evaluated more than once during a single update,
/// always against the freshest payload read from the store, so it must
/// be a pure function of its input.
pub trait Transform<P>: Send + Sync {
    /// Computes the new payload, or rejects the update.
    fn apply(&self, current: &P) -> Result<P, BusinessRuleError>;
}

impl<P, F> Transform<P> for F
where
    F: Fn(&P) -> Result<P, BusinessRuleError> + Send + Sync,
{
    fn apply(&self, current: &P) -> Result<P, BusinessRuleError> {
        self(current)
    }
}

/// Adds a signed delta to a quantity, rejecting any result below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjust(pub i64);

impl Transform<i64> for Adjust {
    fn apply(&self, current: &i64) -> Result<i64, BusinessRuleError> {
        let Adjust(change) = *self;

        let updated = current.checked_add(change).ok_or_else(|| {
            BusinessRuleError::new(format!(
                "quantity overflow: requested a change of {} units to {}",
                change, current
            ))
        })?;

        if updated < 0 {
            return Err(BusinessRuleError::new(format!(
                "insufficient quantity: requested a change of {} units, but available: {}",
                change, current
            )));
        }

        Ok(updated)
    }
}
