pub mod generator;
pub mod window;

pub use generator::TelemetryGenerator;
pub use window::TelemetryWindow;
