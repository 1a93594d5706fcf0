pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use registry::{think_tool, ToolRegistry, ToolSpec, THINK_TOOL};
pub use schema::{plan_schema, plan_schema_json};
