//! wafacl 命令行：读取意图文档，渲染 IP 集合 + Web ACL 模板

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wafacl::{AclIntents, AclTemplate, TemplateIpSets};

/// 声明式 WAF Web ACL 规则组装器
#[derive(Parser)]
#[command(name = "wafacl")]
#[command(version, about, long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "WAFACL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 渲染模板（IP 集合 + Web ACL）
    Render {
        /// 意图文档（JSON）
        intents: PathBuf,

        /// 输出文件，缺省写到标准输出（msgpack 必须指定）
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// 格式化 JSON
        #[arg(long)]
        pretty: bool,
    },
    /// 校验意图文档并打印规则表
    Check {
        /// 意图文档（JSON）
        intents: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Msgpack,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render {
            intents,
            output,
            format,
            pretty,
        } => {
            let template = render(&intents)?;
            let bytes = match format {
                OutputFormat::Json => template.to_json(pretty)?.into_bytes(),
                OutputFormat::Msgpack => template.to_msgpack()?,
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, bytes)
                        .with_context(|| format!("写入文件失败：{}", path.display()))?;
                    info!(path = %path.display(), rules = template.web_acl.rules.len(), "模板已写出");
                }
                None if matches!(format, OutputFormat::Msgpack) => {
                    anyhow::bail!("msgpack 格式必须通过 --output 指定输出文件");
                }
                None => println!("{}", String::from_utf8_lossy(&bytes)),
            }
        }
        Commands::Check { intents } => {
            let template = render(&intents)?;
            println!("{} ({})", template.web_acl.name, template.web_acl.scope);
            for rule in &template.web_acl.rules {
                println!("{}", rule);
            }
            println!(
                "{} rules, {} custom response bodies, {} IP sets",
                template.web_acl.rules.len(),
                template.web_acl.custom_response_bodies.len(),
                template.ip_sets.len()
            );
        }
    }

    Ok(())
}

fn render(path: &Path) -> Result<AclTemplate> {
    let intents = AclIntents::from_path(path)
        .with_context(|| format!("加载意图文档失败：{}", path.display()))?;
    let mut ip_sets = TemplateIpSets::new();
    let web_acl = intents
        .into_builder()
        .build(&mut ip_sets)
        .context("Web ACL 构建失败")?;
    Ok(ip_sets.into_template(web_acl))
}
