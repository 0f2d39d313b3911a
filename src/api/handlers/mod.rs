//! Handlers 模块
//!
//! HTTP 请求处理程序。

pub mod analysis_handler;
pub mod analyze_handler;
pub mod health_handler;
pub mod prompt_handler;

pub use analysis_handler::*;
pub use analyze_handler::*;
pub use health_handler::*;
pub use prompt_handler::*;
