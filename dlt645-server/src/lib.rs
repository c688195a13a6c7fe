//! DLT/645 slave (meter side) implementation
//!
//! This crate provides the dispatch loop that turns a byte stream into frames for a
//! [`RequestHandler`], a TCP listener and an RS-485 server built on it, and
//! [`MeterService`], a handler that behaves like a simple meter.
//!
//! # TODO
//!
//! ## 服务器基础
//! - [x] TCP 监听和连接接受
//! - [x] 连接数限制
//! - [x] RS-485 串口服务
//! - [x] 优雅停止
//!
//! ## 请求处理
//! - [x] 分片帧重组和噪声丢弃
//! - [x] 处理器错误和 panic 隔离
//! - [x] 读数据、读通讯地址、写通讯地址
//! - [x] 广播校时
//! - [ ] 写数据（密码校验）
//! - [ ] 后续帧（数据超过一帧）

pub mod dispatch;
pub mod handler;
pub mod listener;
pub mod rtu;
pub mod service;

pub use dispatch::{serve_connection, LinkMode};
pub use handler::RequestHandler;
pub use listener::{ServerConfig, ShutdownHandle, TcpServer};
pub use rtu::RtuServer;
pub use service::MeterService;

pub use dlt645_core::{Dlt645Error, Dlt645Result};
