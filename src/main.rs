//! skillflow - run skills, the instructions pipeline, or a skills-aware chat
//!
//! Usage:
//!   skillflow skill --prompt "semiconductor"        → run the default skill step by step
//!   skillflow skill --prompt X --skill other-skill  → run a named skill
//!   skillflow pipeline --prompt X                   → convert-to-instructions → execute-instructions
//!   skillflow chat [--prompt X]                     → chat agent with skills and scripts
//!   skillflow skills | scripts | config             → inspect what is installed

use anyhow::Context;
use clap::{Parser, Subcommand};
use skillflow_agent::{InMemoryConversationStore, ReactAgent, SessionKey, TracingHook};
use skillflow_core::SkillflowConfig;
use skillflow_graph::{CompileConfig, InvocationId, MemorySaver};
use skillflow_llm::{LlmProvider, OpenAiCompatProvider};
use skillflow_skills::{
    build_instructions_pipeline, pipeline_seed, register_step_tools, AgentFactory, SkillExecutor, SkillRegistry,
    SkillsPromptHook, StepCatalog, SKILLS_SYSTEM_PROMPT,
};
use skillflow_tools::{create_script_registry, ScriptRunner, ToolRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "skillflow",
    about = "Skill-driven LLM task execution",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file (TOML)
    #[arg(long, global = true, env = "SKILLFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to a file (in addition to stderr)
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every step of a skill, then write the final report
    Skill {
        #[arg(short, long)]
        prompt: String,
        /// Skill name (default: skills.default_skill)
        #[arg(short, long)]
        skill: Option<String>,
    },
    /// Rewrite the prompt as instructions, then carry them out
    Pipeline {
        #[arg(short, long)]
        prompt: String,
    },
    /// Talk to an agent that can apply skills and run scripts
    Chat {
        /// One-shot prompt; reads lines from stdin when omitted
        #[arg(short, long)]
        prompt: Option<String>,
        /// Skill whose scripts are available (default: skills.default_skill)
        #[arg(short, long)]
        skill: Option<String>,
    },
    /// List installed skills
    Skills,
    /// List a skill's scripts
    Scripts {
        #[arg(short, long)]
        skill: Option<String>,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_file.as_ref())?;

    let config = match cli.config.clone().or_else(SkillflowConfig::default_path) {
        Some(path) => SkillflowConfig::load(&path),
        None => SkillflowConfig::default(),
    };

    match cli.command {
        Commands::Skill { prompt, skill } => {
            let skill = skill.unwrap_or_else(|| config.skills.default_skill.clone());
            let agents = step_agents(&config, &skill)?;
            let executor = SkillExecutor::new(agents, SkillRegistry::from_config(&config.skills));
            let report = executor
                .execute_skill(&prompt, &skill)
                .await
                .with_context(|| format!("skill '{}' failed", skill))?;
            println!("{}", report.render());
        }

        Commands::Pipeline { prompt } => {
            let agents = host_agents(&config, &config.skills.default_skill)?;
            let graph = build_instructions_pipeline(&agents, CompileConfig::with_saver(Arc::new(MemorySaver::new())))
                .context("failed to build the instructions pipeline")?;
            let id = InvocationId::generate();
            let state = graph
                .invoke_with_id(id.clone(), pipeline_seed(&prompt))
                .await
                .with_context(|| format!("pipeline invocation {} failed", id))?;
            println!("{}", serde_json::to_string_pretty(state.values())?);
        }

        Commands::Chat { prompt, skill } => {
            let skill = skill.unwrap_or_else(|| config.skills.default_skill.clone());
            run_chat(&config, &skill, prompt).await?;
        }

        Commands::Skills => {
            let skills = SkillRegistry::from_config(&config.skills).list().await;
            if skills.is_empty() {
                println!("No skills under {}", config.skills.root.display());
            }
            for skill in skills {
                println!("{:<24} {}", skill.name, skill.description);
            }
        }

        Commands::Scripts { skill } => {
            let skill = skill.unwrap_or_else(|| config.skills.default_skill.clone());
            let runner = ScriptRunner::from_config(config.scripts_dir(&skill), &config.scripts);
            let scripts = runner.list();
            if scripts.is_empty() {
                println!("No scripts in {}", runner.scripts_dir().display());
            }
            for script in scripts {
                println!("{}", script);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml());
        }
    }

    Ok(())
}

fn init_tracing(log_file: Option<&PathBuf>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "skillflow=info".into());
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    let Some(path) = log_file else {
        registry.init();
        return Ok(None);
    };

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    registry
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

fn provider(config: &SkillflowConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_key = config.api_key().context("no API key for the model endpoint")?;
    Ok(Arc::new(OpenAiCompatProvider::new(api_key).with_base_url(&config.llm.base_url)))
}

/// Agents with the skill's script tools bound.
fn step_agents(config: &SkillflowConfig, skill: &str) -> anyhow::Result<AgentFactory> {
    let scripts = create_script_registry(config.scripts_dir(skill), &config.scripts);
    Ok(AgentFactory::from_config(provider(config)?, config).with_tools(Arc::new(scripts)))
}

/// Agents with the script tools plus every analysis step as a tool.
fn host_agents(config: &SkillflowConfig, skill: &str) -> anyhow::Result<AgentFactory> {
    let steps = step_agents(config, skill)?;
    let mut tools: ToolRegistry = create_script_registry(config.scripts_dir(skill), &config.scripts);
    register_step_tools(&StepCatalog::industry_analysis(), &steps, &mut tools);
    Ok(steps.clone().with_tools(Arc::new(tools)))
}

async fn run_chat(config: &SkillflowConfig, skill: &str, prompt: Option<String>) -> anyhow::Result<()> {
    let agents = host_agents(config, skill)?;
    let hook = SkillsPromptHook::from_registry(&SkillRegistry::from_config(&config.skills)).await;
    let tools = agents.tools().cloned().unwrap_or_default();

    let agent = ReactAgent::builder("chat", provider(config)?)
        .model(&config.llm.model)
        .system_prompt(SKILLS_SYSTEM_PROMPT)
        .tools(tools)
        .hook(Arc::new(hook))
        .hook(Arc::new(TracingHook::new("chat")))
        .memory(Arc::new(InMemoryConversationStore::new()), SessionKey::generate("chat"))
        .max_tool_rounds(config.agent.max_tool_rounds)
        .max_tokens(config.llm.max_tokens)
        .temperature(config.llm.temperature)
        .build();

    if let Some(prompt) = prompt {
        println!("{}", agent.call(&prompt).await?.text);
        return Ok(());
    }

    eprintln!("skillflow chat (Ctrl-D to exit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match agent.call(line).await {
            Ok(message) => println!("{}\n", message.text),
            Err(e) => eprintln!("error: {}\n", e),
        }
    }
    Ok(())
}
