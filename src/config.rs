//! Web ACL 全局配置,存储所有可配置项

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::rule::model::VisibilityConfig;

/// 默认 ACL 名称
pub const DEFAULT_ACL_NAME: &str = "WebACL";
/// 区分已识别用户与匿名用户的请求头
pub const DEFAULT_USER_HEADER: &str = "digitraffic-user";
/// ACL 级别指标名
pub const DEFAULT_ACL_METRIC_NAME: &str = "WAF-Blocked";

/// ACL 作用范围（决定 IP 集合与 ACL 的部署区域）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AclScope {
    #[default]
    Cloudfront,
    Regional,
}

impl fmt::Display for AclScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclScope::Cloudfront => write!(f, "CLOUDFRONT"),
            AclScope::Regional => write!(f, "REGIONAL"),
        }
    }
}

/// IP 集合地址版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IpAddressVersion {
    #[default]
    #[serde(rename = "IPV4")]
    Ipv4,
    #[serde(rename = "IPV6")]
    Ipv6,
}

/// Web ACL 配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AclConfig {
    // ACL 名称（同时用于日志）
    pub name: String,
    pub scope: AclScope,
    // 黑名单 IP 集合的地址版本
    pub ip_address_version: IpAddressVersion,
    // 限流规则探测的请求头
    pub user_header: String,
    // ACL 自身的可观测性配置
    pub visibility: VisibilityConfig,
}

impl Default for AclConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_ACL_NAME.to_string(),
            scope: AclScope::default(),
            ip_address_version: IpAddressVersion::default(),
            user_header: DEFAULT_USER_HEADER.to_string(),
            visibility: VisibilityConfig {
                sampled_requests_enabled: false,
                cloud_watch_metrics_enabled: true,
                metric_name: DEFAULT_ACL_METRIC_NAME.to_string(),
            },
        }
    }
}

impl AclConfig {
    /// 仅指定名称，其余取默认值
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// 自定义配置
    pub fn custom() -> AclConfigBuilder {
        AclConfigBuilder::new()
    }
}

/// 配置构建器（链式 API）
#[derive(Debug, Clone, Default)]
pub struct AclConfigBuilder {
    config: AclConfig,
}

impl AclConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn scope(mut self, scope: AclScope) -> Self {
        self.config.scope = scope;
        self
    }

    pub fn ip_address_version(mut self, version: IpAddressVersion) -> Self {
        self.config.ip_address_version = version;
        self
    }

    pub fn user_header(mut self, header: impl Into<String>) -> Self {
        self.config.user_header = header.into();
        self
    }

    pub fn metric_name(mut self, metric_name: impl Into<String>) -> Self {
        self.config.visibility.metric_name = metric_name.into();
        self
    }

    pub fn build(self) -> AclConfig {
        self.config
    }
}
