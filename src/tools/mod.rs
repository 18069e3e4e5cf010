pub mod builtins;
pub mod context;
pub mod invocation;
pub mod registry;

pub use context::{Tool, ToolDescriptor, ToolError, ToolExecutionContext, ToolSource};
pub use invocation::{merge_headers, ToolChunk, ToolInvocationService};
pub use registry::ToolRegistry;
