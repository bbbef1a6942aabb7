#[cfg(feature = "camera-nokhwa")]
pub mod camera;
pub mod rgba_converter;
pub mod snapshot;

#[cfg(feature = "camera-nokhwa")]
pub use camera::NokhwaPlatform;
