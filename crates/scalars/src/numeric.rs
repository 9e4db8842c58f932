//! Numeric behavior required by Sum and Average.

/// The arithmetic an aggregate maintainer needs: an additive identity,
/// elementwise add/subtract for delta maintenance, and a float projection
/// for Average.
pub trait Numeric: Clone + PartialEq + Default + Send + Sync + 'static {
    fn zero() -> Self;
    fn add(&self, other: &Self) -> Self;
    fn sub(&self, other: &Self) -> Self;
    fn to_f64(&self) -> f64;
}

impl Numeric for i32 {
    fn zero() -> Self {
        0
    }
    fn add(&self, other: &Self) -> Self {
        self + other
    }
    fn sub(&self, other: &Self) -> Self {
        self - other
    }
    fn to_f64(&self) -> f64 {
        *self as f64
    }
}

impl Numeric for i64 {
    fn zero() -> Self {
        0
    }
    fn add(&self, other: &Self) -> Self {
        self + other
    }
    fn sub(&self, other: &Self) -> Self {
        self - other
    }
    fn to_f64(&self) -> f64 {
        *self as f64
    }
}

impl Numeric for f64 {
    fn zero() -> Self {
        0.0
    }
    fn add(&self, other: &Self) -> Self {
        self + other
    }
    fn sub(&self, other: &Self) -> Self {
        self - other
    }
    fn to_f64(&self) -> f64 {
        *self
    }
}
