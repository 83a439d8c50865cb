//! Default resolution for values the provider did not supply.

/// Text stored when a descriptive field is unknown.
pub const NOT_AVAILABLE: &str = "No disponible";

/// A column type with a documented stand-in for "absent".
pub trait Documented: Sized {
    fn documented_default() -> Self;

    /// Whether a present value should still count as absent.
    fn is_absent(&self) -> bool {
        false
    }
}

impl Documented for f64 {
    fn documented_default() -> Self {
        0.0
    }

    fn is_absent(&self) -> bool {
        !self.is_finite()
    }
}

impl Documented for i64 {
    fn documented_default() -> Self {
        0
    }
}

impl Documented for String {
    fn documented_default() -> Self {
        NOT_AVAILABLE.to_string()
    }

    fn is_absent(&self) -> bool {
        self.trim().is_empty()
    }
}

/// The one place absent values become defaults: numbers resolve to `0`,
/// text to [`NOT_AVAILABLE`]. NaN, infinities and blank strings count as
/// absent.
pub fn resolve<T: Documented>(value: Option<T>) -> T {
    value
        .filter(|value| !value.is_absent())
        .unwrap_or_else(T::documented_default)
}

/// Text field, cloned out of a borrowed profile.
pub fn resolve_text(value: &Option<String>) -> String {
    resolve(value.clone())
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Truncate toward zero; absent and non-finite values become `0`.
pub fn truncate(value: Option<f64>) -> i64 {
    let value = resolve(value);
    // `as` saturates out-of-range floats.
    value.trunc() as i64
}
