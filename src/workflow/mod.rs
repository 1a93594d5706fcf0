//! 工作流：依赖图、参数模板、依赖执行器

pub mod executor;
pub mod graph;
pub mod template;

pub use executor::{DependencyExecutor, PlanExecution, StepDispatcher};
pub use graph::DependencyGraph;
pub use template::resolve_parameters;
