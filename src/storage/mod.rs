//! 存储层模块
//!
//! 保存分析记录与失败记录，支持内存与 JSONL 文件两种后端。

pub mod factory;
pub mod jsonl;
pub mod memory;
pub mod repository;

pub use factory::StorageFactory;
pub use repository::AnalysisRepository;
