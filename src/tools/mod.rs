pub mod error;
mod execute;
mod fs;
pub mod registry;
pub mod shape;

use std::path::Path;

pub use error::ToolError;
pub use execute::ExecuteBashTool;
pub use fs::{ListDirTool, ReadFileTool};
pub use registry::{FnTool, Tool, ToolRegistry};
pub use shape::{ArgShape, ArgValue, FieldIssue, FieldKind, ToolArgs};

/// Registry holding the built-in file and shell tools, confined to `root`.
pub fn builtin_registry(root: &Path) -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.register(ReadFileTool::new(root))
        .register(ListDirTool::new(root))
        .register(ExecuteBashTool::new(root));
    reg
}
