//! DLT/645 master (client) implementation
//!
//! This crate provides the request/response engine used to talk to meters over TCP or
//! a serial line, and a [`MeterClient`] exposing the meter operations on top of it.
//!
//! # TODO
//!
//! ## 请求引擎
//! - [x] 连接建立和自动重连
//! - [x] 请求重试和退避
//! - [x] 分片响应重组
//! - [x] 请求状态管理
//! - [x] 链路统计信息
//!
//! ## 客户端功能
//! - [x] 读数据（电能、需量、变量）
//! - [x] 读通讯地址
//! - [x] 写通讯地址
//! - [x] 广播校时
//! - [ ] 写数据（需要密码和操作者代码）
//! - [ ] 冻结、清零等控制命令

pub mod builder;
pub mod engine;
pub mod service;

pub use builder::ClientBuilder;
pub use engine::{ClientConfig, RequestEngine, RequestState};
pub use service::MeterClient;

pub use dlt645_core::{Dlt645Error, Dlt645Result};
