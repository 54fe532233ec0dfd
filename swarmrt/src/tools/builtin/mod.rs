//! Built-in tool implementations.

mod calculate;
mod http_request;
mod read_file;
mod run_command;
mod web_search;
mod write_file;

pub use calculate::CalculateTool;
pub use http_request::HttpRequestTool;
pub use read_file::ReadFileTool;
pub use run_command::RunCommandTool;
pub use web_search::WebSearchTool;
pub use write_file::WriteFileTool;
