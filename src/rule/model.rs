//! 规则数据模型定义
//! 仅存储规则数据，序列化结构与 WAF 资源 schema 保持一致（camelCase）

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::AclScope;

/// 匹配语句
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Statement {
    #[serde(rename = "managedRuleGroupStatement")]
    ManagedRuleGroup(ManagedRuleGroupStatement),
    #[serde(rename = "ipSetReferenceStatement")]
    IpSetReference(IpSetReferenceStatement),
    #[serde(rename = "sizeConstraintStatement")]
    SizeConstraint(SizeConstraintStatement),
    #[serde(rename = "notStatement")]
    Not(NotStatement),
    #[serde(rename = "rateBasedStatement")]
    RateBased(RateBasedStatement),
}

impl Statement {
    /// 逻辑取反
    pub fn negate(self) -> Statement {
        Statement::Not(NotStatement {
            statement: Box::new(self),
        })
    }

    /// 深度优先访问所有 IP 集合引用（含 NOT / scope-down 内部）
    pub fn visit_ip_set_refs_mut<E>(
        &mut self,
        f: &mut impl FnMut(&mut IpSetReferenceStatement) -> Result<(), E>,
    ) -> Result<(), E> {
        match self {
            Statement::IpSetReference(reference) => f(reference),
            Statement::Not(not) => not.statement.visit_ip_set_refs_mut(f),
            Statement::RateBased(rate) => rate.scope_down_statement.visit_ip_set_refs_mut(f),
            Statement::ManagedRuleGroup(_) | Statement::SizeConstraint(_) => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedRuleGroupStatement {
    pub vendor_name: String,
    pub name: String,
    pub excluded_rules: Vec<ExcludedRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ExcludedRule {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpSetReferenceStatement {
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeConstraintStatement {
    pub comparison_operator: ComparisonOperator,
    pub field_to_match: FieldToMatch,
    pub text_transformations: Vec<TextTransformation>,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComparisonOperator {
    #[serde(rename = "GT")]
    Gt,
    #[serde(rename = "GE")]
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldToMatch {
    #[serde(rename = "singleHeader")]
    SingleHeader(SingleHeader),
}

/// singleHeader 是原样透传的 JSON 字段，键名必须为大写 `Name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SingleHeader {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextTransformation {
    pub priority: u32,
    #[serde(rename = "type")]
    pub kind: TextTransformationType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TextTransformationType {
    None,
    Lowercase,
    NormalizePath,
    Md5,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotStatement {
    pub statement: Box<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateBasedStatement {
    pub aggregate_key_type: AggregateKeyType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_keys: Option<Vec<RateBasedCustomKey>>,
    pub limit: u64,
    pub evaluation_window_sec: u32,
    pub scope_down_statement: Box<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregateKeyType {
    Ip,
    CustomKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RateBasedCustomKey {
    UriPath {
        #[serde(rename = "textTransformations")]
        text_transformations: Vec<TextTransformation>,
    },
    Ip {},
}

/// 规则动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleAction {
    Allow {},
    Block {
        #[serde(rename = "customResponse", skip_serializing_if = "Option::is_none")]
        custom_response: Option<CustomResponse>,
    },
    Count {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResponse {
    pub response_code: u16,
    pub custom_response_body_key: String,
}

/// 托管规则组的覆盖动作，`None` 表示沿用规则组自身判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OverrideAction {
    None {},
}

/// 规则裁决：普通规则用 action，规则组用 overrideAction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RuleVerdict {
    #[serde(rename = "action")]
    Action(RuleAction),
    #[serde(rename = "overrideAction")]
    Override(OverrideAction),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityConfig {
    pub sampled_requests_enabled: bool,
    pub cloud_watch_metrics_enabled: bool,
    pub metric_name: String,
}

impl VisibilityConfig {
    /// 采样 + 指标
    pub fn sampled(metric_name: impl Into<String>) -> Self {
        Self {
            sampled_requests_enabled: true,
            cloud_watch_metrics_enabled: true,
            metric_name: metric_name.into(),
        }
    }

    /// 仅指标，不采样
    pub fn metrics_only(metric_name: impl Into<String>) -> Self {
        Self {
            sampled_requests_enabled: false,
            ..Self::sampled(metric_name)
        }
    }
}

/// 待定规则（尚未分配优先级）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,
    #[serde(flatten)]
    pub verdict: RuleVerdict,
    pub statement: Statement,
    pub visibility_config: VisibilityConfig,
}

impl Rule {
    /// 阻断动作引用的自定义响应体 key
    pub fn custom_response_key(&self) -> Option<&str> {
        match &self.verdict {
            RuleVerdict::Action(RuleAction::Block {
                custom_response: Some(response),
            }) => Some(response.custom_response_body_key.as_str()),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self.verdict, RuleVerdict::Action(RuleAction::Block { .. }))
    }

    pub fn is_count(&self) -> bool {
        matches!(self.verdict, RuleVerdict::Action(RuleAction::Count {}))
    }
}

/// 已分配优先级的规则
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrioritizedRule {
    pub priority: u32,
    #[serde(flatten)]
    pub rule: Rule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    TextPlain,
    TextHtml,
    ApplicationJson,
}

/// 自定义响应体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomResponseBody {
    pub content: String,
    pub content_type: ContentType,
}

impl CustomResponseBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: ContentType::TextPlain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DefaultAction {
    #[serde(rename = "allow")]
    Allow {},
}

/// 最终产物：完整的 Web ACL 描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AclDescription {
    pub name: String,
    pub scope: AclScope,
    pub default_action: DefaultAction,
    pub visibility_config: VisibilityConfig,
    pub rules: Vec<PrioritizedRule>,
    pub custom_response_bodies: BTreeMap<String, CustomResponseBody>,
}

impl AclDescription {
    pub fn rule(&self, name: &str) -> Option<&PrioritizedRule> {
        self.rules.iter().find(|r| r.rule.name == name)
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule.name.as_str()).collect()
    }
}

// ======== 为 PrioritizedRule 实现 Display trait（用于 CLI 输出） ========
impl fmt::Display for PrioritizedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match &self.rule.verdict {
            RuleVerdict::Action(RuleAction::Allow {}) => "allow",
            RuleVerdict::Action(RuleAction::Block { .. }) => "block",
            RuleVerdict::Action(RuleAction::Count {}) => "count",
            RuleVerdict::Override(OverrideAction::None {}) => "group",
        };
        write!(f, "{:>3}  {:<12} {}", self.priority, action, self.rule.name)
    }
}
