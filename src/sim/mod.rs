/// Parallel execution of independent sessions.
pub mod batch;
/// Step clock for timestep management.
pub mod clock;
pub mod engine;
pub mod keys;
pub mod kpi;
pub mod loopback;
pub mod record;
/// Step loop for one building session.
pub mod session;
