//! Session Memory：按会话保存对话历史与抽取的实体
//!
//! - [`Session`] / [`Message`]：单个会话与消息
//! - [`EntityExtractor`]：订单号、产品、故障短语抽取
//! - [`SessionMemory`]：进程内存储，惰性过期 + 可选后台清理
//! - [`ContextPayload`]：交给 Planner 与专家的只读快照

pub mod context;
pub mod entities;
pub mod session;
pub mod store;

pub use context::ContextPayload;
pub use entities::{EntityExtractor, EntityKind, EntityMap};
pub use session::{Message, Role, Session, SessionId};
pub use store::SessionMemory;
