//! 核心数据模型模块
//!
//! 定义 Scan Invoice 的核心数据结构：票据抽取结果、场所档案、分析记录。

pub mod analysis;
pub mod receipt;
pub mod venue;

pub use analysis::*;
pub use receipt::ExtractedData;
pub use venue::VenueProfile;
