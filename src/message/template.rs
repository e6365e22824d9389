use chrono::{DateTime, Utc};
use handlebars::{Handlebars, TemplateError, handlebars_helper, no_escape};
use serde::Serialize;
use serde_json::Value;

pub const DEFAULT_SUCCESS_TEMPLATE: &str = "\
{{repo.owner}}/{{repo.name}} build #{{build.number}} on `{{commit.branch}}` succeeded\
{{#if slack.first_name}}, nice work {{slack.first_name}}{{/if}}.
<{{build.link}}|{{short_sha commit.sha}}> {{truncate commit.message 72}}";

pub const DEFAULT_FAILURE_TEMPLATE: &str = "\
{{repo.owner}}/{{repo.name}} build #{{build.number}} on `{{commit.branch}}` failed\
{{#if stage.name}} in stage `{{stage.name}}`{{/if}}\
{{#if slack.display_name}}, {{slack.display_name}} please take a look{{/if}}.
<{{build.link}}|{{short_sha commit.sha}}> {{truncate commit.message 72}}";

const TEMPLATE_NAME: &str = "message";

/// A compiled message template with the plugin's helpers registered.
///
/// Output is plain Slack markup, so HTML escaping is off, and missing fields
/// render as empty strings.
#[derive(Clone)]
pub struct MessageTemplate {
    handlebars: Handlebars<'static>,
}

impl std::fmt::Debug for MessageTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageTemplate").finish_non_exhaustive()
    }
}

impl MessageTemplate {
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);
        register_helpers(&mut handlebars);
        handlebars.register_template_string(TEMPLATE_NAME, source)?;
        Ok(Self { handlebars })
    }

    pub fn render<T: Serialize>(&self, data: &T) -> Result<String, handlebars::RenderError> {
        self.handlebars.render(TEMPLATE_NAME, data)
    }
}

fn register_helpers(hb: &mut Handlebars<'static>) {
    handlebars_helper!(uppercase: |s: Value| value_str(&s).to_uppercase());
    handlebars_helper!(lowercase: |s: Value| value_str(&s).to_lowercase());

    handlebars_helper!(truncate: |s: Value, len: u64| {
        let s = value_str(&s);
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if s.chars().count() > len {
            let mut cut: String = s.chars().take(len.saturating_sub(1)).collect();
            cut.push('…');
            cut
        } else {
            s.to_string()
        }
    });

    handlebars_helper!(short_sha: |s: Value| value_str(&s).chars().take(8).collect::<String>());

    handlebars_helper!(since: |start: Value| {
        parse_time(&start)
            .map(|start| format_duration(Utc::now().signed_duration_since(start)))
            .unwrap_or_default()
    });

    handlebars_helper!(duration: |start: Value, end: Value| {
        match (parse_time(&start), parse_time(&end)) {
            (Some(start), Some(end)) => format_duration(end.signed_duration_since(start)),
            _ => String::new(),
        }
    });

    hb.register_helper("uppercase", Box::new(uppercase));
    hb.register_helper("lowercase", Box::new(lowercase));
    hb.register_helper("truncate", Box::new(truncate));
    hb.register_helper("short_sha", Box::new(short_sha));
    hb.register_helper("since", Box::new(since));
    hb.register_helper("duration", Box::new(duration));
}

fn value_str(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        _ => None,
    }
}

fn format_duration(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds().max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        let (mins, rem) = (secs / 60, secs % 60);
        if rem == 0 {
            format!("{mins}m")
        } else {
            format!("{mins}m {rem}s")
        }
    } else {
        let (hours, mins) = (secs / 3600, (secs % 3600) / 60);
        if mins == 0 {
            format!("{hours}h")
        } else {
            format!("{hours}h {mins}m")
        }
    }
}
