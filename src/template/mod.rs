pub mod interpolate;

pub use interpolate::{InterpolationContext, Interpolator};
