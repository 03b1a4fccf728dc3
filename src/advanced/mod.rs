// Loop supervision, watchdog, concrete radio links and simulated hardware.

pub mod supervisor;
pub mod watchdog;
pub mod links;
pub mod sim;
