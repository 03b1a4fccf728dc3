// Component B: ground link and actuation
// Reassembles command lines from the radio, executes them on the drive
// motors and mechanisms, and answers with ACK/ERR.

pub mod radio;
pub mod command;
pub mod feedback;
pub mod receiver;
pub mod actuator;
