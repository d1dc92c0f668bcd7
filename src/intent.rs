//! 意图文档
//! 以 JSON 声明整个 ACL 的意图，解析后按固定顺序应用到构建器

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::builder::AclBuilder;
use crate::config::AclConfig;
use crate::error::AclResult;
use crate::rule::{CustomResponseBody, ExcludedRules, ManagedRuleSelection};

/// 托管规则组意图
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ManagedRulesIntent {
    #[serde(default)]
    pub rules: ManagedRuleSelection,
    #[serde(default)]
    pub excluded_rules: ExcludedRules,
}

/// 八个限流便捷规则的限额，缺省即不启用
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ThrottleLimits {
    pub digitraffic_user_ip: Option<u64>,
    pub digitraffic_user_ip_and_uri_path: Option<u64>,
    pub anonymous_user_ip: Option<u64>,
    pub anonymous_user_ip_and_uri_path: Option<u64>,
    pub count_digitraffic_user_ip: Option<u64>,
    pub count_digitraffic_user_ip_and_uri_path: Option<u64>,
    pub count_anonymous_user_ip: Option<u64>,
    pub count_anonymous_user_ip_and_uri_path: Option<u64>,
}

/// 完整意图文档
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AclIntents {
    #[serde(default)]
    pub config: AclConfig,
    pub managed_rules: Option<ManagedRulesIntent>,
    pub ip_blocklist: Option<Vec<String>>,
    #[serde(default)]
    pub throttle: ThrottleLimits,
    #[serde(default)]
    pub custom_response_bodies: BTreeMap<String, CustomResponseBody>,
}

impl AclIntents {
    pub fn from_json_str(json: &str) -> AclResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> AclResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let intents = Self::from_json_str(&data)?;
        debug!(path = %path.display(), acl = %intents.config.name, "意图文档加载完成");
        Ok(intents)
    }

    /// 应用到新构建器：响应体 → 托管规则组 → IP 黑名单 → 限流
    pub fn into_builder(self) -> AclBuilder {
        let mut builder = AclBuilder::new(self.config);

        for (key, body) in self.custom_response_bodies {
            builder = builder.with_custom_response_body(key, body);
        }
        if let Some(managed) = self.managed_rules {
            builder = builder.with_managed_rules(managed.rules, &managed.excluded_rules);
        }
        if let Some(addresses) = self.ip_blocklist {
            builder = builder.with_ip_restriction_rule(addresses);
        }

        let limits = self.throttle;
        builder
            .with_throttle_digitraffic_user_ip(limits.digitraffic_user_ip)
            .with_throttle_digitraffic_user_ip_and_uri_path(limits.digitraffic_user_ip_and_uri_path)
            .with_throttle_anonymous_user_ip(limits.anonymous_user_ip)
            .with_throttle_anonymous_user_ip_and_uri_path(limits.anonymous_user_ip_and_uri_path)
            .with_count_digitraffic_user_ip(limits.count_digitraffic_user_ip)
            .with_count_digitraffic_user_ip_and_uri_path(limits.count_digitraffic_user_ip_and_uri_path)
            .with_count_anonymous_user_ip(limits.count_anonymous_user_ip)
            .with_count_anonymous_user_ip_and_uri_path(limits.count_anonymous_user_ip_and_uri_path)
    }
}
