//! TypeScript client generation from a prompt's variable schema.

use crate::config::Project;
use crate::entity::PromptVersion;

use super::{VariableKind, VariableSchema};

fn ts_type(kind: VariableKind) -> &'static str {
    match kind {
        VariableKind::String => "string",
        VariableKind::Boolean => "boolean",
        VariableKind::Array => "unknown[]",
        VariableKind::Object => "Record<string, unknown>",
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Top-level input fields: dotted paths collapse to their root (an object),
/// and `this.`-scoped references belong to a block, not to the caller.
pub fn input_fields(schema: &VariableSchema) -> Vec<(String, VariableKind)> {
    let mut fields: Vec<(String, VariableKind)> = Vec::new();
    for var in schema {
        if var.name.starts_with("this.") {
            continue;
        }
        let (root, kind) = match var.name.split_once('.') {
            Some((root, _)) => (root, VariableKind::Object),
            None => (var.name.as_str(), var.kind),
        };
        match fields.iter_mut().find(|(name, _)| name == root) {
            Some(existing) => {
                if existing.1 == VariableKind::String {
                    existing.1 = kind;
                }
            }
            None => fields.push((root.to_string(), kind)),
        }
    }
    fields
}

/// `support-reply` → `supportReply`
pub fn function_name(slug: &str) -> String {
    let mut name = String::new();
    for (i, word) in slug
        .split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            if i == 0 {
                name.extend(first.to_lowercase());
            } else {
                name.extend(first.to_uppercase());
            }
            name.push_str(chars.as_str());
        }
    }
    if name.is_empty() {
        return "invokePrompt".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert_str(0, "prompt");
    }
    name
}

fn type_name(function_name: &str) -> String {
    let mut chars = function_name.chars();
    match chars.next() {
        Some(first) => format!("{}{}Input", first.to_uppercase(), chars.as_str()),
        None => "PromptInput".to_string(),
    }
}

fn property(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("{:?}", name)
    }
}

/// Generate a typed TypeScript client for `prompt`.
pub fn typescript_client(prompt: &PromptVersion, project: &Project) -> String {
    let fields = input_fields(&prompt.variables());
    let func = function_name(&prompt.slug);
    let input_type = type_name(&func);

    let mut code = String::new();
    code.push_str(&format!(
        "// Generated by promptctl for prompt: {}\n\n",
        prompt.name
    ));
    code.push_str("export type PromptInvoker = (request: {\n");
    code.push_str("  project: string;\n  slug: string;\n  input: Record<string, unknown>;\n");
    code.push_str("}) => Promise<unknown>;\n\n");

    code.push_str(&format!("export interface {input_type} {{\n"));
    if fields.is_empty() {
        code.push_str("  input: string;\n");
    }
    for (name, kind) in &fields {
        code.push_str(&format!("  {}: {};\n", property(name), ts_type(*kind)));
    }
    code.push_str("}\n\n");

    code.push_str(&format!(
        "export async function {func}(\n  invoke: PromptInvoker,\n  input: {input_type}\n): Promise<unknown> {{\n"
    ));
    code.push_str("  const startTime = Date.now();\n");
    code.push_str(&format!(
        "  const result = await invoke({{\n    project: {:?},\n    slug: {:?},\n    input: {{ ...input }},\n  }});\n",
        project.as_str(),
        prompt.slug
    ));
    code.push_str(&format!(
        "  console.log(`{func} completed in ${{Date.now() - startTime}}ms`);\n"
    ));
    code.push_str("  return result;\n}\n\n");

    let example: Vec<String> = if fields.is_empty() {
        vec!["input: \"...\"".to_string()]
    } else {
        fields
            .iter()
            .map(|(name, kind)| {
                let value = match kind {
                    VariableKind::String => "\"...\"",
                    VariableKind::Boolean => "true",
                    VariableKind::Array => "[]",
                    VariableKind::Object => "{}",
                };
                format!("{}: {}", property(name), value)
            })
            .collect()
    };
    code.push_str(&format!(
        "// Example usage:\n// const result = await {func}(invoke, {{ {} }});\n",
        example.join(", ")
    ));

    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::extract_variables;

    #[test]
    fn test_function_name() {
        assert_eq!(function_name("support-reply"), "supportReply");
        assert_eq!(function_name("code_review v2"), "codeReviewV2");
        assert_eq!(function_name("3-step"), "prompt3Step");
        assert_eq!(function_name("--"), "invokePrompt");
    }

    #[test]
    fn test_input_fields_collapse_paths() {
        let schema = extract_variables("{{user.name}} {{user.email}} {{#each items}}{{this.id}}{{/each}} {{q}}");
        let fields = input_fields(&schema);
        assert_eq!(
            fields,
            vec![
                ("user".to_string(), VariableKind::Object),
                ("items".to_string(), VariableKind::Array),
                ("q".to_string(), VariableKind::String),
            ]
        );
    }

    #[test]
    fn test_typescript_client_types_variables() {
        let prompt = PromptVersion::new("support-reply", "m")
            .with_user("{{question}} {{#if urgent}}now{{/if}} {{ticket-id}}");
        let code = typescript_client(&prompt, &Project::new("helpdesk"));

        assert!(code.contains("export interface SupportReplyInput {"));
        assert!(code.contains("  question: string;"));
        assert!(code.contains("  urgent: boolean;"));
        assert!(code.contains("  \"ticket-id\": string;"));
        assert!(code.contains("export async function supportReply("));
        assert!(code.contains("project: \"helpdesk\""));
        assert!(code.contains("slug: \"support-reply\""));
    }

    #[test]
    fn test_typescript_client_without_variables() {
        let prompt = PromptVersion::new("haiku", "m").with_user("Write a haiku.");
        let code = typescript_client(&prompt, &Project::new("p"));
        assert!(code.contains("  input: string;"));
        assert!(code.contains("haiku(invoke, { input: \"...\" })"));
    }

    #[test]
    fn test_typescript_client_is_deterministic() {
        let prompt = PromptVersion::new("a", "m").with_user("{{x}}");
        let project = Project::new("p");
        assert_eq!(typescript_client(&prompt, &project), typescript_client(&prompt, &project));
    }
}
