use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::TraceLog;
use crate::config::{Config, CONFIG_FILE};
use crate::entity::{validate_slug, FieldOverrides, PromptPatch, PromptVersion};
use crate::error::{PromptError, Result};
use crate::exec::{CommandExecutor, DryRunExecutor, DualExecutor, Executor, TracedExecutor};
use crate::report;
use crate::storage::{LocalStore, LoroStore, PromptStore, STATE_DIR};
use crate::template::codegen::typescript_client;
use crate::workflow::{
    field_diffs, AbRequest, Coordinator, ForcedOperator, InteractiveOperator, Operator, WorkflowOutcome,
    WorkflowState,
};

use super::commands::{InputArgs, RevisionArgs};

/// Flags that apply to every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub project: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Find the project root by looking for .promptctl/ or .git/
fn find_project_root() -> PathBuf {
    let cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let mut current = cwd.as_path();
    loop {
        if current.join(STATE_DIR).exists() || current.join(".git").exists() {
            return current.to_path_buf();
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return cwd,
        }
    }
}

/// An opened project: its store and effective configuration.
struct Workspace {
    store: Arc<LocalStore>,
    config: Config,
    state_dir: PathBuf,
}

impl Workspace {
    fn open(opts: &GlobalOptions) -> Result<Self> {
        let root = find_project_root();
        let store = LoroStore::open(&root)?;
        let state_dir = store.state_dir().to_path_buf();
        let config = Config::load(&state_dir)?
            .with_project(opts.project.clone())
            .with_timeout_ms(opts.timeout_ms);
        debug!(project = %config.project, root = %root.display(), "opened workspace");

        Ok(Self {
            store: Arc::new(LocalStore::new(store)),
            config,
            state_dir,
        })
    }

    fn executor(&self) -> Result<Arc<dyn Executor>> {
        let base: Arc<dyn Executor> = match &self.config.executor.command {
            Some(argv) => Arc::new(CommandExecutor::new(argv)?),
            None => {
                debug!("no executor command configured, rendering prompts locally");
                Arc::new(DryRunExecutor)
            }
        };
        if !self.config.traces {
            return Ok(base);
        }
        let log = Arc::new(TraceLog::open(&self.state_dir)?);
        Ok(Arc::new(TracedExecutor::new(base, log)))
    }

    fn coordinator(&self, operator: Arc<dyn Operator>) -> Result<Coordinator> {
        let executor = DualExecutor::new(self.executor()?).with_timeout(self.config.invoke_timeout());
        Ok(Coordinator::new(
            self.store.clone(),
            executor,
            operator,
            self.config.project.clone(),
        ))
    }
}

fn overrides(revision: RevisionArgs) -> FieldOverrides {
    FieldOverrides {
        system_message: revision.system,
        user_template: revision.user,
        model: revision.model,
    }
}

fn parse_input(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(PromptError::Validation(
            "Input must be a JSON object of template variables".to_string(),
        ));
    }
    Ok(value)
}

fn read_input(args: &InputArgs) -> Result<Value> {
    if let Some(ref text) = args.input {
        return parse_input(text);
    }
    if let Some(ref path) = args.input_file {
        return parse_input(&fs::read_to_string(path)?);
    }
    Ok(Value::Object(Default::default()))
}

fn format_output(output: &Value) -> Result<String> {
    Ok(match output {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other)?,
    })
}

fn operator_for(force: bool, json: bool) -> Arc<dyn Operator> {
    match (force, json) {
        (true, true) => Arc::new(ForcedOperator::new(true).silent()),
        (true, false) => Arc::new(ForcedOperator::new(true)),
        (false, true) => Arc::new(InteractiveOperator::new().report_to_stderr()),
        (false, false) => Arc::new(InteractiveOperator::new()),
    }
}

fn print_prompt(prompt: &PromptVersion) {
    println!("{} - {}", prompt.slug, prompt.name);
    if !prompt.description.is_empty() {
        println!("  {}", prompt.description);
    }
    println!("model: {}", prompt.model);
    if let Some(ref origin) = prompt.origin {
        println!(
            "candidate of: {} (staged {})",
            origin.source_slug,
            origin.staged_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!("updated: {}", prompt.updated_at.format("%Y-%m-%d %H:%M"));
    println!();
    println!("--- system ---");
    println!("{}", prompt.system_message);
    println!("--- user ---");
    println!("{}", prompt.user_template);
}

fn print_outcome(outcome: &WorkflowOutcome, retained_hint: &str) {
    if outcome.promoted() {
        println!("Promoted {} onto {}", outcome.candidate, outcome.original);
    } else {
        println!("Kept {} unchanged", outcome.original);
    }
    if outcome.state == WorkflowState::Retained {
        println!("{} {} retained", retained_hint, outcome.candidate);
    } else {
        println!("Removed {} {}", retained_hint.to_lowercase(), outcome.candidate);
    }
    if outcome.partial {
        eprintln!("Warning: one side of the comparison failed, see the report above");
    }
}

pub fn handle_init() -> Result<()> {
    let root = env::current_dir()?;

    let store = LoroStore::init(&root)?;
    let config_path = store.state_dir().join(CONFIG_FILE);
    if !config_path.exists() {
        fs::write(&config_path, Config::default().to_yaml()?)?;
    }

    println!("Initialized promptctl project in {}", root.display());
    println!("  config: {}", config_path.display());

    Ok(())
}

pub async fn handle_list(opts: &GlobalOptions, json: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let prompts = ws.store.list(&ws.config.project).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prompts)?);
        return Ok(());
    }

    if prompts.is_empty() {
        println!("No prompts found in project '{}'.", ws.config.project);
        return Ok(());
    }

    for prompt in &prompts {
        let suffix = match prompt.candidate_of {
            Some(ref source) => format!(" (candidate of {source})"),
            None => String::new(),
        };
        println!("{:<30} {:<30} {}{}", prompt.slug, prompt.model, prompt.name, suffix);
    }

    Ok(())
}

pub async fn handle_get(opts: &GlobalOptions, slug: String, json: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let prompt = ws.store.get(&ws.config.project, &slug).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prompt)?);
    } else {
        print_prompt(&prompt);
    }

    Ok(())
}

pub async fn handle_create(
    opts: &GlobalOptions,
    slug: String,
    name: Option<String>,
    description: Option<String>,
    revision: RevisionArgs,
    json: bool,
) -> Result<()> {
    validate_slug(&slug)?;
    let ws = Workspace::open(opts)?;

    let model = revision
        .model
        .unwrap_or_else(|| ws.config.default_model.clone());
    let mut prompt = PromptVersion::new(slug, model);
    if let Some(name) = name {
        prompt.name = name;
    }
    prompt.description = description.unwrap_or_default();
    prompt.system_message = revision.system.unwrap_or_default();
    prompt.user_template = revision.user.unwrap_or_default();

    let prompt = ws.store.create(&ws.config.project, &prompt).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prompt)?);
    } else {
        println!("Created prompt {} ({})", prompt.slug, prompt.model);
    }

    Ok(())
}

pub async fn handle_update(
    opts: &GlobalOptions,
    slug: String,
    name: Option<String>,
    description: Option<String>,
    revision: RevisionArgs,
    json: bool,
) -> Result<()> {
    let patch = PromptPatch {
        name,
        description,
        system_message: revision.system,
        user_template: revision.user,
        model: revision.model,
    };
    if patch.is_empty() {
        return Err(PromptError::Validation(
            "Nothing to update: pass at least one field".to_string(),
        ));
    }

    let ws = Workspace::open(opts)?;
    let prompt = ws.store.update(&ws.config.project, &slug, &patch).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&prompt)?);
    } else {
        println!("Updated prompt {}", prompt.slug);
    }

    Ok(())
}

pub async fn handle_delete(opts: &GlobalOptions, slug: String, force: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let prompt = ws.store.get(&ws.config.project, &slug).await?;

    // Confirm deletion unless --force is used
    if !force {
        let question = format!("Delete prompt {} - {}?", prompt.slug, prompt.name);
        if !InteractiveOperator::new().confirm(&question).await? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ws.store.delete(&ws.config.project, &prompt.slug).await?;
    println!("Deleted prompt {}", prompt.slug);

    Ok(())
}

pub async fn handle_diff(opts: &GlobalOptions, slug: String, revision: RevisionArgs, json: bool) -> Result<()> {
    let overrides = overrides(revision);
    if overrides.is_empty() {
        return Err(PromptError::Validation(
            "Nothing to compare: pass --system, --user or --model".to_string(),
        ));
    }

    let ws = Workspace::open(opts)?;
    let original = ws.store.get(&ws.config.project, &slug).await?;
    let mut proposed = original.clone();
    proposed.apply(&overrides.merge_onto(&original));
    let diffs = field_diffs(&original, &proposed);

    if json {
        println!("{}", serde_json::to_string_pretty(&diffs)?);
    } else {
        print!("{}", report::render(&diffs, None));
    }

    Ok(())
}

pub async fn handle_invoke(opts: &GlobalOptions, slug: String, input: InputArgs, json: bool) -> Result<()> {
    let input = read_input(&input)?;
    let ws = Workspace::open(opts)?;
    let prompt = ws.store.get(&ws.config.project, &slug).await?;
    let executor = ws.executor()?;

    let timeout = ws.config.invoke_timeout();
    let invocation = tokio::time::timeout(timeout, executor.invoke(&ws.config.project, &prompt, &input))
        .await
        .map_err(|_| PromptError::Invocation {
            slug: slug.clone(),
            message: format!("timed out after {}ms", timeout.as_millis()),
        })??;

    if json {
        println!("{}", serde_json::to_string_pretty(&invocation)?);
        return Ok(());
    }

    println!("{}", format_output(&invocation.output)?);
    if let Some(ms) = invocation.duration_ms {
        eprintln!("({ms}ms)");
    }
    if let Some(ref url) = invocation.trace_url {
        eprintln!("trace: {url}");
    }

    Ok(())
}

/// Run an A/B comparison when revision flags are given, otherwise invoke
/// the prompt once. Returns the process exit code.
pub async fn handle_test(
    opts: &GlobalOptions,
    slug: String,
    input: Option<String>,
    revision: RevisionArgs,
    keep: bool,
    force: bool,
    json: bool,
) -> Result<i32> {
    let overrides = overrides(revision);
    if overrides.is_empty() {
        let input = InputArgs {
            input,
            input_file: None,
        };
        handle_invoke(opts, slug, input, json).await?;
        return Ok(0);
    }

    let input = input.as_deref().map(parse_input).transpose()?;
    let ws = Workspace::open(opts)?;
    let coordinator = ws.coordinator(operator_for(force, json))?;

    let outcome = coordinator
        .run_ab(AbRequest {
            slug,
            overrides,
            input,
            retain: keep,
        })
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, "Candidate");
    }

    Ok(outcome.exit_code())
}

pub async fn handle_promote(
    opts: &GlobalOptions,
    from: String,
    to: String,
    keep: bool,
    force: bool,
) -> Result<i32> {
    let ws = Workspace::open(opts)?;
    let coordinator = ws.coordinator(operator_for(force, false))?;

    let outcome = coordinator.promote_existing(&from, &to, keep).await?;
    print_outcome(&outcome, "Source");

    Ok(outcome.exit_code())
}

pub async fn handle_generate(opts: &GlobalOptions, slug: String, output: Option<PathBuf>) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let prompt = ws.store.get(&ws.config.project, &slug).await?;
    let code = typescript_client(&prompt, &ws.config.project);

    match output {
        Some(path) => {
            write_file(&path, &code)?;
            println!("Wrote {}", path.display());
        }
        None => print!("{code}"),
    }

    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, contents)?;
    Ok(())
}

pub async fn handle_variables(opts: &GlobalOptions, slug: String, json: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let prompt = ws.store.get(&ws.config.project, &slug).await?;
    let variables = prompt.variables();

    if json {
        println!("{}", serde_json::to_string_pretty(&variables)?);
        return Ok(());
    }

    if variables.is_empty() {
        println!("No variables.");
        return Ok(());
    }
    for variable in &variables {
        println!("{}: {}", variable.name, variable.kind);
    }

    Ok(())
}

pub async fn handle_sweep(opts: &GlobalOptions, source: Option<String>, force: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;

    let pending: Vec<String> = ws
        .store
        .list(&ws.config.project)
        .await?
        .into_iter()
        .filter(|p| match (&p.candidate_of, &source) {
            (Some(of), Some(source)) => of == source,
            (Some(_), None) => true,
            (None, _) => false,
        })
        .map(|p| p.slug)
        .collect();

    if pending.is_empty() {
        println!("No staged candidates.");
        return Ok(());
    }

    if !force {
        let question = format!("Delete {} staged candidate(s): {}?", pending.len(), pending.join(", "));
        if !InteractiveOperator::new().confirm(&question).await? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let coordinator = ws.coordinator(Arc::new(ForcedOperator::new(false).silent()))?;
    for slug in coordinator.sweep(source.as_deref()).await? {
        println!("Deleted {slug}");
    }

    Ok(())
}

pub async fn handle_traces(opts: &GlobalOptions, slug: Option<String>, limit: usize, json: bool) -> Result<()> {
    let ws = Workspace::open(opts)?;
    let log = TraceLog::open(&ws.state_dir)?;
    let traces = log.recent(ws.config.project.as_str(), slug.as_deref(), limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&traces)?);
        return Ok(());
    }

    if traces.is_empty() {
        println!("No traces recorded.");
        return Ok(());
    }
    for trace in &traces {
        let status = match trace.error {
            Some(ref error) => format!("error: {error}"),
            None => "ok".to_string(),
        };
        println!(
            "{}  {:<30} {:>7}ms  {}  {}",
            trace.created_at.format("%Y-%m-%d %H:%M:%S"),
            trace.slug,
            trace.duration_ms,
            trace.url(),
            status
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_must_be_object() {
        assert!(parse_input(r#"{"q": "hi"}"#).is_ok());
        assert!(matches!(parse_input("[1, 2]"), Err(PromptError::Validation(_))));
        assert!(matches!(parse_input("not json"), Err(PromptError::Json(_))));
    }

    #[test]
    fn test_read_input_defaults_to_empty_object() {
        let value = read_input(&InputArgs::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }

    #[test]
    fn test_read_input_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("input.json");
        fs::write(&path, r#"{"name": "Ada"}"#).unwrap();
        let value = read_input(&InputArgs {
            input: None,
            input_file: Some(path),
        })
        .unwrap();
        assert_eq!(value["name"], "Ada");
    }

    #[test]
    fn test_format_output() {
        assert_eq!(format_output(&serde_json::json!("plain")).unwrap(), "plain");
        assert_eq!(
            format_output(&serde_json::json!({"a": 1})).unwrap(),
            "{\n  \"a\": 1\n}"
        );
    }
}
