//! Simulation dynamics: integration, the sequential-impulse solver, joint rows, and convergence tracking.

pub mod convergence;
pub mod integrator;
pub mod joints;
pub mod solver;

pub use convergence::{ConvergenceMonitor, Retention};
pub use integrator::Integrator;
pub use joints::JointEndpoint;
pub use solver::{ConstraintRow, SequentialImpulseSolver, SolveStats, SolverBody, SolverScratch};
