use serde_yaml::Value;
use std::collections::HashMap;

/// A parsed `run` template: literal text interleaved with `{{.Field}}`
/// placeholders. Parsing and rendering are split so the planner can cache
/// parsed templates per (composition, step) and report parse and execution
/// failures separately.
#[derive(Debug, Clone)]
pub struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Field(String),
}

impl Template {
    /// Parse a template source. Placeholders are `{{.name}}`, optionally
    /// padded with spaces; anything else between braces is a parse error,
    /// as is an unterminated `{{`.
    pub fn parse(source: &str) -> Result<Template, String> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open
                .find("}}")
                .ok_or_else(|| format!("unterminated '{{{{' in template '{source}'"))?;

            let expr = after_open[..close].trim();
            let field = expr
                .strip_prefix('.')
                .filter(|f| !f.is_empty() && f.chars().all(is_field_char))
                .ok_or_else(|| format!("unsupported template expression '{{{{{expr}}}}}'"))?;
            segments.push(Segment::Field(field.to_string()));

            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Template { segments })
    }

    /// Execute against a flat context. Every referenced field must exist
    /// and hold a scalar; a shell line cannot embed a structured value.
    pub fn render(&self, context: &HashMap<String, Value>) -> Result<String, String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => {
                    let value = context
                        .get(name)
                        .ok_or_else(|| format!("undefined template variable '.{name}'"))?;
                    out.push_str(&scalar_to_string(value).ok_or_else(|| {
                        format!("template variable '.{name}' is not a scalar")
                    })?);
                }
            }
        }
        Ok(out)
    }
}

fn is_field_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
