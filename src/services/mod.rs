pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod single_run;
pub mod vision;
pub mod workers_ai;
