//! 规则目录
//! 纯函数工厂：托管规则组、IP 黑名单引用、限流/计数语句，不持有任何状态

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::{
    AggregateKeyType, ComparisonOperator, CustomResponse, ExcludedRule, FieldToMatch,
    IpSetReferenceStatement, ManagedRuleGroupStatement, OverrideAction, RateBasedCustomKey,
    RateBasedStatement, Rule, RuleAction, RuleVerdict, SingleHeader, SizeConstraintStatement,
    Statement, TextTransformation, TextTransformationType, VisibilityConfig,
};

pub const MANAGED_RULE_VENDOR: &str = "AWS";
pub const IP_BLOCKLIST_RULE_NAME: &str = "IpBlocklist";
pub const IP_BLOCKLIST_LOGICAL_ID: &str = "BlocklistIpSet";
/// 限流窗口（秒），固定 5 分钟
pub const RATE_WINDOW_SECS: u32 = 300;
pub const THROTTLE_RESPONSE_CODE: u16 = 429;

/// 内置的四个托管规则组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ManagedRuleGroup {
    CommonRuleSet,
    AmazonIpReputationList,
    KnownBadInputsRuleSet,
    #[serde(rename = "SQLiRuleSet")]
    SqliRuleSet,
}

impl ManagedRuleGroup {
    /// 规范顺序，`All` 按此顺序追加
    pub const ALL: [ManagedRuleGroup; 4] = [
        ManagedRuleGroup::CommonRuleSet,
        ManagedRuleGroup::AmazonIpReputationList,
        ManagedRuleGroup::KnownBadInputsRuleSet,
        ManagedRuleGroup::SqliRuleSet,
    ];

    /// 供应商侧规则组名
    pub fn vendor_group_name(self) -> &'static str {
        match self {
            ManagedRuleGroup::CommonRuleSet => "AWSManagedRulesCommonRuleSet",
            ManagedRuleGroup::AmazonIpReputationList => "AWSManagedRulesAmazonIpReputationList",
            ManagedRuleGroup::KnownBadInputsRuleSet => "AWSManagedRulesKnownBadInputsRuleSet",
            ManagedRuleGroup::SqliRuleSet => "AWSManagedRulesSQLiRuleSet",
        }
    }

    /// ACL 内的规则名
    pub fn rule_name(self) -> String {
        format!("{}-{}", MANAGED_RULE_VENDOR, self.vendor_group_name())
    }

    /// 始终排除的子规则（误报较多的检查）
    pub fn baseline_exclusions(self) -> &'static [&'static str] {
        match self {
            ManagedRuleGroup::CommonRuleSet => {
                &["NoUserAgent_HEADER", "SizeRestrictions_BODY", "GenericRFI_BODY"]
            }
            _ => &[],
        }
    }
}

impl fmt::Display for ManagedRuleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedRuleGroup::CommonRuleSet => write!(f, "CommonRuleSet"),
            ManagedRuleGroup::AmazonIpReputationList => write!(f, "AmazonIpReputationList"),
            ManagedRuleGroup::KnownBadInputsRuleSet => write!(f, "KnownBadInputsRuleSet"),
            ManagedRuleGroup::SqliRuleSet => write!(f, "SQLiRuleSet"),
        }
    }
}

/// 调用方追加的子规则排除（规则组 → 子规则名）
pub type ExcludedRules = BTreeMap<ManagedRuleGroup, Vec<String>>;

/// 托管规则组选择：全部或显式子集
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawSelection")]
pub enum ManagedRuleSelection {
    #[default]
    All,
    Only(Vec<ManagedRuleGroup>),
}

impl ManagedRuleSelection {
    pub fn includes(&self, group: ManagedRuleGroup) -> bool {
        match self {
            ManagedRuleSelection::All => true,
            ManagedRuleSelection::Only(groups) => groups.contains(&group),
        }
    }

    /// 选中的规则组（规范顺序）
    pub fn groups(&self) -> impl Iterator<Item = ManagedRuleGroup> + '_ {
        ManagedRuleGroup::ALL.into_iter().filter(move |g| self.includes(*g))
    }
}

impl From<Vec<ManagedRuleGroup>> for ManagedRuleSelection {
    fn from(groups: Vec<ManagedRuleGroup>) -> Self {
        ManagedRuleSelection::Only(groups)
    }
}

// JSON 中允许写 "all" 或规则组数组
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSelection {
    Keyword(SelectionKeyword),
    Groups(Vec<ManagedRuleGroup>),
}

#[derive(Deserialize)]
enum SelectionKeyword {
    #[serde(rename = "all")]
    All,
}

impl From<RawSelection> for ManagedRuleSelection {
    fn from(raw: RawSelection) -> Self {
        match raw {
            RawSelection::Keyword(SelectionKeyword::All) => ManagedRuleSelection::All,
            RawSelection::Groups(groups) => ManagedRuleSelection::Only(groups),
        }
    }
}

/// 限流规则对用户请求头的要求
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderCondition {
    /// 仅统计携带该请求头的请求（已识别用户）
    Required,
    /// 仅统计完全不带该请求头的请求（匿名用户）
    Absent,
}

/// 限流聚合键
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateKey {
    Ip,
    IpAndUriPath,
}

/// 规则所在队列
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Count,
    Block,
}

/// 限流规则动作：计数（演练）或带 429 响应体的阻断
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleAction {
    Count,
    Block { custom_response_key: String },
}

impl ThrottleAction {
    pub fn block(custom_response_key: impl Into<String>) -> Self {
        ThrottleAction::Block {
            custom_response_key: custom_response_key.into(),
        }
    }

    pub fn category(&self) -> RuleCategory {
        match self {
            ThrottleAction::Count => RuleCategory::Count,
            ThrottleAction::Block { .. } => RuleCategory::Block,
        }
    }

    fn into_rule_action(self) -> RuleAction {
        match self {
            ThrottleAction::Count => RuleAction::Count {},
            ThrottleAction::Block { custom_response_key } => RuleAction::Block {
                custom_response: Some(CustomResponse {
                    response_code: THROTTLE_RESPONSE_CODE,
                    custom_response_body_key: custom_response_key,
                }),
            },
        }
    }
}

/// 托管规则组规则：基线排除 ∪ 调用方排除（保序去重），沿用规则组自身判定
pub fn managed_rule_group(group: ManagedRuleGroup, excluded: &[String]) -> Rule {
    let mut excluded_rules: Vec<ExcludedRule> = Vec::new();
    let names = group
        .baseline_exclusions()
        .iter()
        .copied()
        .chain(excluded.iter().map(String::as_str));
    for name in names {
        if !excluded_rules.iter().any(|r| r.name == name) {
            excluded_rules.push(ExcludedRule {
                name: name.to_string(),
            });
        }
    }

    let name = group.rule_name();
    Rule {
        visibility_config: VisibilityConfig::sampled(name.clone()),
        name,
        verdict: RuleVerdict::Override(OverrideAction::None {}),
        statement: Statement::ManagedRuleGroup(ManagedRuleGroupStatement {
            vendor_name: MANAGED_RULE_VENDOR.to_string(),
            name: group.vendor_group_name().to_string(),
            excluded_rules,
        }),
    }
}

/// IP 黑名单规则，`arn` 在 build 之前为占位符
pub fn ip_blocklist_rule(arn: impl Into<String>) -> Rule {
    Rule {
        name: IP_BLOCKLIST_RULE_NAME.to_string(),
        verdict: RuleVerdict::Action(RuleAction::Block {
            custom_response: None,
        }),
        statement: Statement::IpSetReference(IpSetReferenceStatement { arn: arn.into() }),
        visibility_config: VisibilityConfig::metrics_only(IP_BLOCKLIST_RULE_NAME),
    }
}

/// 请求头探测语句
///
/// - 携带请求头：`size > 0`
/// - 未携带请求头：`NOT(size >= 0)`
///
/// 显式传空值的请求头视为“已携带”，只有完全缺失才算匿名。
pub fn header_probe(header_name: &str, condition: HeaderCondition) -> Statement {
    let comparison_operator = match condition {
        HeaderCondition::Required => ComparisonOperator::Gt,
        HeaderCondition::Absent => ComparisonOperator::Ge,
    };
    let probe = Statement::SizeConstraint(SizeConstraintStatement {
        comparison_operator,
        field_to_match: FieldToMatch::SingleHeader(SingleHeader {
            name: header_name.to_string(),
        }),
        text_transformations: vec![TextTransformation {
            priority: 0,
            kind: TextTransformationType::None,
        }],
        size: 0,
    });

    match condition {
        HeaderCondition::Required => probe,
        HeaderCondition::Absent => probe.negate(),
    }
}

/// URI 路径（小写 → 规范化 → MD5）+ IP 组合键
fn ip_and_uri_path_keys() -> Vec<RateBasedCustomKey> {
    let transformations = [
        TextTransformationType::Lowercase,
        TextTransformationType::NormalizePath,
        TextTransformationType::Md5,
    ];
    vec![
        RateBasedCustomKey::UriPath {
            text_transformations: transformations
                .into_iter()
                .zip(1..)
                .map(|(kind, priority)| TextTransformation { priority, kind })
                .collect(),
        },
        RateBasedCustomKey::Ip {},
    ]
}

/// 限流语句
pub fn throttle_statement(
    limit: u64,
    header: HeaderCondition,
    key: RateKey,
    header_name: &str,
) -> Statement {
    let (aggregate_key_type, custom_keys) = match key {
        RateKey::Ip => (AggregateKeyType::Ip, None),
        RateKey::IpAndUriPath => (AggregateKeyType::CustomKeys, Some(ip_and_uri_path_keys())),
    };

    Statement::RateBased(RateBasedStatement {
        aggregate_key_type,
        custom_keys,
        limit,
        evaluation_window_sec: RATE_WINDOW_SECS,
        scope_down_statement: Box::new(header_probe(header_name, header)),
    })
}

/// 限流/计数规则
pub fn throttle_rule(
    name: impl Into<String>,
    limit: u64,
    header: HeaderCondition,
    key: RateKey,
    action: ThrottleAction,
    header_name: &str,
) -> Rule {
    let name = name.into();
    Rule {
        visibility_config: VisibilityConfig::sampled(name.clone()),
        name,
        verdict: RuleVerdict::Action(action.into_rule_action()),
        statement: throttle_statement(limit, header, key, header_name),
    }
}

/// 限流响应体文案
pub fn throttle_response_content(limit: u64) -> String {
    format!(
        "Request rate is limited to {} requests in a {} minute window.",
        limit,
        RATE_WINDOW_SECS / 60
    )
}
