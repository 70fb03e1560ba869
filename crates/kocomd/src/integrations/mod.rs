#[cfg(feature = "integration_kocom")]
pub mod kocom;
