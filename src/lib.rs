//! Scan Invoice - 票据识别与校验服务
//!
//! 接收票据图片，调用多模态模型抽取商户、日期与金额字段，结合场所档案
//! 和电子发票二维码进行一致性校验，输出欺诈分与置信分。

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;
