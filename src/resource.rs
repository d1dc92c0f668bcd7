//! 外部资源（IP 集合）的创建接口
//! 规则注册阶段只记录意图，build 阶段按最终优先级顺序调用 provisioner

use serde::Serialize;
use tracing::debug;

use crate::config::{AclScope, IpAddressVersion};
use crate::error::{AclError, AclResult};
use crate::rule::AclDescription;

/// 待创建 IP 集合的描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpSetSpec {
    pub logical_id: String,
    pub scope: AclScope,
    pub ip_address_version: IpAddressVersion,
    pub addresses: Vec<String>,
}

/// IP 集合创建者（由 IaC 平台实现），返回资源标识（ARN 或模板引用）
pub trait IpSetProvisioner {
    fn create_ip_set(&mut self, spec: &IpSetSpec) -> AclResult<String>;
}

/// 模板式 provisioner：只记录 IP 集合，返回 `${LogicalId.Arn}` 引用
#[derive(Debug, Clone, Default)]
pub struct TemplateIpSets {
    ip_sets: Vec<IpSetSpec>,
}

impl TemplateIpSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ip_sets(&self) -> &[IpSetSpec] {
        &self.ip_sets
    }

    pub fn arn_reference(logical_id: &str) -> String {
        format!("${{{}.Arn}}", logical_id)
    }

    /// 与 ACL 合并为可输出的模板
    pub fn into_template(self, web_acl: AclDescription) -> AclTemplate {
        AclTemplate {
            ip_sets: self.ip_sets,
            web_acl,
        }
    }
}

impl IpSetProvisioner for TemplateIpSets {
    fn create_ip_set(&mut self, spec: &IpSetSpec) -> AclResult<String> {
        if self.ip_sets.iter().any(|s| s.logical_id == spec.logical_id) {
            return Err(AclError::ProvisionError(format!(
                "模板中已存在 IP 集合 {}",
                spec.logical_id
            )));
        }
        debug!(
            logical_id = %spec.logical_id,
            addresses = spec.addresses.len(),
            "登记 IP 集合"
        );
        self.ip_sets.push(spec.clone());
        Ok(Self::arn_reference(&spec.logical_id))
    }
}

/// 渲染结果：IP 集合 + Web ACL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AclTemplate {
    pub ip_sets: Vec<IpSetSpec>,
    pub web_acl: AclDescription,
}

impl AclTemplate {
    pub fn to_json(&self, pretty: bool) -> AclResult<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }

    /// MessagePack（字段名保留，便于与 JSON 互转）
    pub fn to_msgpack(&self) -> AclResult<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }
}
