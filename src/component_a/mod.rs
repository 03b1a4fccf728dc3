// Component A: flight side
// Reads the payload sensors, advances the flight/recovery phase and
// produces the outbound telemetry and image frames.

pub mod sensor;
pub mod phase;
pub mod transmitter;
pub mod imaging;
