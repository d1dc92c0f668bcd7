//! 全局错误类型定义
//! 配置类错误在 build 阶段同步抛出，调用方应中止整个部署/配置步骤

use std::io::Error as IoError;

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AclError {
    // ===================== 配置错误（build 阶段） =====================
    /// 未注册任何规则
    #[error("Web ACL {acl} 未定义任何规则")]
    EmptyRuleSet { acl: String },

    /// 多条规则同名
    #[error("Web ACL {acl} 存在重名规则：{names:?}")]
    DuplicateRuleName { acl: String, names: Vec<String> },

    /// 速率限制必须为正整数
    #[error("规则 {rule} 的速率限制无效：{limit}（必须大于 0）")]
    InvalidRateLimit { rule: String, limit: u64 },

    /// 规则引用了未注册的自定义响应体
    #[error("规则 {rule} 引用了未注册的自定义响应体：{key}")]
    MissingResponseBody { rule: String, key: String },

    // ===================== 资源物化错误 =====================
    #[error("IP 集合创建失败：{0}")]
    ProvisionError(String),

    /// 占位引用找不到对应的待创建 IP 集合
    #[error("无法解析的 IP 集合引用：{0}")]
    UnresolvedIpSet(String),

    // ===================== 序列化 / IO =====================
    #[error("JSON解析失败：{0}")]
    JsonError(#[from] SerdeJsonError),
    #[error("MessagePack序列化失败：{0}")]
    MsgPackError(#[from] rmp_serde::encode::Error),
    #[error("IO操作失败：{0}")]
    IoError(#[from] IoError),
}

impl AclError {
    /// 是否属于配置错误（调用方传入的规则组合本身有问题）
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AclError::EmptyRuleSet { .. }
                | AclError::DuplicateRuleName { .. }
                | AclError::InvalidRateLimit { .. }
                | AclError::MissingResponseBody { .. }
        )
    }
}

// 全局Result类型
pub type AclResult<T> = Result<T, AclError>;
