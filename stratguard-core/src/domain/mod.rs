//! Domain types shared by every engine component.

pub mod bar;
pub mod objective;
pub mod parameter;
pub mod portfolio;

pub use bar::Bar;
pub use objective::{EvaluationError, Objective, ObjectiveResult, WindowObjective, Windowed};
pub use parameter::{ParamValue, ParameterKind, ParameterSet, ParameterSpace, ParameterSpec, SpaceError};
pub use portfolio::{PortfolioSnapshot, Position};

/// Symbol type alias
pub type Symbol = String;
