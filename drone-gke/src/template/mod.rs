//! Manifest templating
//!
//! Templates use `{{ .key }}` placeholders. The leading dot is Go-template
//! field syntax; it is stripped before the text is handed to tera, so
//! `{{ .color }}` and `{{ color }}` are equivalent. Blocks use tera's
//! `{% %}` syntax, where the dot is accepted as well. Resolution is strict: an unknown key fails the render,
//! wherever it appears.

mod references;

use crate::config::DeploymentConfig;
use crate::error::{
    MissingTemplateSnafu, Result, TemplateReadSnafu, TemplateRenderSnafu, VariableShadowSnafu,
};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};
use tera::{Context, Tera};

/// Keys set by the plugin itself. User vars may not reuse them.
pub const BUILTIN_KEYS: [&str; 8] = [
    "BUILD_NUMBER",
    "COMMIT",
    "BRANCH",
    "TAG",
    "project",
    "zone",
    "cluster-name",
    "namespace",
];

lazy_static! {
    static ref ACTION: Regex = Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").unwrap();
    // String literals come first so their contents are matched, and kept, whole.
    static ref FIELD_DOT: Regex =
        Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`|(^|[\s(|,{\[~])\.([A-Za-z_])"#).unwrap();
}

/// Values available to the manifest template. Never holds secrets, so it is
/// always safe to print.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateData(BTreeMap<String, Value>);

impl TemplateData {
    /// Built-in keys followed by the configured vars.
    ///
    /// `lookup` resolves environment references when `expand_env_vars` is on.
    pub fn new(
        config: &DeploymentConfig,
        project: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut data = Self::builtin(config, project);
        data.merge_vars(&config.vars, config.expand_env_vars, lookup)?;
        Ok(data)
    }

    pub fn builtin(config: &DeploymentConfig, project: &str) -> Self {
        let values = [
            config.drone.build_number.as_str(),
            config.drone.commit.as_str(),
            config.drone.branch.as_str(),
            config.drone.tag.as_str(),
            project,
            config.zone(),
            config.cluster_name.as_str(),
            config.namespace.as_deref().unwrap_or(""),
        ];

        Self(
            BUILTIN_KEYS
                .iter()
                .zip(values)
                .map(|(key, value)| ((*key).to_string(), Value::from(value)))
                .collect(),
        )
    }

    /// Add `vars`, refusing any name that is already present.
    pub fn merge_vars(
        &mut self,
        vars: &Map<String, Value>,
        expand_env_vars: bool,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<()> {
        for (name, value) in vars {
            if self.0.contains_key(name) {
                return VariableShadowSnafu { name }.fail();
            }

            let value = match value {
                Value::String(raw) if expand_env_vars => Value::String(
                    shellexpand::env_with_context_no_errors(raw, |var| {
                        Some(lookup(var).unwrap_or_default())
                    })
                    .into_owned(),
                ),
                other => other.clone(),
            };

            self.0.insert(name.clone(), value);
        }

        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Print every key and value under a heading.
    pub fn dump(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "---- BEGIN VARIABLES AVAILABLE FOR ALL TEMPLATES ----")?;
        let pretty = serde_json::to_string_pretty(&self.0).map_err(std::io::Error::other)?;
        writeln!(out, "{pretty}")?;
        writeln!(out, "---- END VARIABLES AVAILABLE FOR ALL TEMPLATES ----")
    }

    fn context(&self) -> Context {
        let mut context = Context::new();
        for (key, value) in &self.0 {
            context.insert(key.as_str(), value);
        }
        context
    }
}

/// Final manifest text, passed to kubectl as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedManifest(String);

impl RenderedManifest {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderedManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the whole template. Blank input is a usage error, not an empty
/// manifest.
pub fn read_template(mut reader: impl Read) -> Result<String> {
    let mut text = String::new();
    reader.read_to_string(&mut text).context(TemplateReadSnafu)?;

    if text.trim().is_empty() {
        return MissingTemplateSnafu.fail();
    }
    Ok(text)
}

/// Render `template` (labelled `name` in errors) against `data`.
pub fn render(name: &str, template: &str, data: &TemplateData) -> Result<RenderedManifest> {
    let source = strip_field_dots(template);

    let mut tera = Tera::default();
    tera.autoescape_on(Vec::new());
    let rendered = tera
        .add_raw_template(name, &source)
        .map_err(|err| error_chain(&err))
        .and_then(|()| {
            let parsed = tera.get_template(name).map_err(|err| error_chain(&err))?;
            references::check(&parsed.ast, data)
        })
        .and_then(|()| {
            tera.render(name, &data.context())
                .map_err(|err| error_chain(&err))
        });

    match rendered {
        Ok(text) => Ok(RenderedManifest(text)),
        Err(reason) => TemplateRenderSnafu {
            template: name,
            reason,
        }
        .fail(),
    }
}

/// `{{ .a.b | upper }}` -> `{{ a.b | upper }}`, inside `{{ }}` and `{% %}`
/// and outside string literals only.
fn strip_field_dots(template: &str) -> String {
    ACTION
        .replace_all(template, |action: &Captures<'_>| {
            FIELD_DOT
                .replace_all(&action[0], |found: &Captures<'_>| match found.get(2) {
                    Some(first) => format!("{}{}", &found[1], first.as_str()),
                    None => found[0].to_string(),
                })
                .into_owned()
        })
        .into_owned()
}

/// tera keeps the useful part of a message in the source chain.
fn error_chain(err: &tera::Error) -> String {
    let mut messages = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        messages.push(cause.to_string());
        source = cause.source();
    }
    messages.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawConfig;
    use crate::error::{Error, ErrorKind};

    fn config(vars: &str) -> DeploymentConfig {
        DeploymentConfig::resolve(RawConfig {
            zone: "us-central1-a".to_string(),
            cluster_name: "demo".to_string(),
            namespace: "Team_A".to_string(),
            vars: vars.to_string(),
            drone: crate::config::DroneMetadata {
                build_number: "42".to_string(),
                commit: "abc123".to_string(),
                branch: "main".to_string(),
                tag: String::new(),
            },
            ..RawConfig::default()
        })
        .unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_builtin_keys() {
        let data = TemplateData::new(&config("{}"), "my-project", &no_env).unwrap();

        assert_eq!(data.len(), BUILTIN_KEYS.len());
        assert_eq!(data.get("project"), Some(&Value::from("my-project")));
        assert_eq!(data.get("zone"), Some(&Value::from("us-central1-a")));
        assert_eq!(data.get("cluster-name"), Some(&Value::from("demo")));
        assert_eq!(data.get("namespace"), Some(&Value::from("Team_A")));
        assert_eq!(data.get("BUILD_NUMBER"), Some(&Value::from("42")));
        assert_eq!(data.get("TAG"), Some(&Value::from("")));
    }

    #[test]
    fn test_render_replaces_placeholders() {
        let config = config(r#"{"color": "blue", "replicas": 3, "debug": false}"#);
        let data = TemplateData::new(&config, "my-project", &no_env).unwrap();

        let manifest = render(
            ".kube.yml",
            "color: {{ .color }}\nreplicas: {{.replicas}}\ndebug: {{ debug }}\nproject: {{ .project }}\nbuild: {{ .BUILD_NUMBER }}",
            &data,
        )
        .unwrap();

        assert_eq!(
            manifest.as_str(),
            "color: blue\nreplicas: 3\ndebug: false\nproject: my-project\nbuild: 42"
        );
    }

    #[test]
    fn test_every_builtin_is_shadow_protected() {
        for key in BUILTIN_KEYS {
            let vars = format!(r#"{{"{key}": "override"}}"#);
            let err = TemplateData::new(&config(&vars), "my-project", &no_env).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TemplateRender, "key {key}");
            assert!(matches!(err, Error::VariableShadow { ref name } if name == key));
        }
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let data = TemplateData::new(&config("{}"), "my-project", &no_env).unwrap();
        let err = render(".kube.yml", "image: {{ .image }}", &data).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TemplateRender);
        assert!(err.to_string().contains("image"), "{err}");
    }

    #[test]
    fn test_missing_key_in_condition_is_an_error() {
        let data = TemplateData::new(&config("{}"), "my-project", &no_env).unwrap();

        let err = render(".kube.yml", "a: {% if missing %}x{% endif %}b", &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateRender);
        assert!(err.to_string().contains("missing"), "{err}");

        let err = render(".kube.yml", "{% for p in ports %}{{ p }}{% endfor %}", &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateRender);
    }

    #[test]
    fn test_constructs_tolerating_missing_keys_are_rejected() {
        let data = TemplateData::new(&config("{}"), "my-project", &no_env).unwrap();

        for template in [
            r#"a: {{ missing | default(value="") }}"#,
            r#"a: {{ project | default(value="x") }}"#,
            "{% if missing is defined %}x{% endif %}",
            "{% if project is undefined %}x{% endif %}",
        ] {
            let err = render(".kube.yml", template, &data).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::TemplateRender, "{template}");
        }
    }

    #[test]
    fn test_control_flow_over_known_keys() {
        let config = config(r#"{"debug": true, "ports": [80, 443], "color": "blue"}"#);
        let data = TemplateData::new(&config, "my-project", &no_env).unwrap();

        let manifest = render(
            ".kube.yml",
            "{% if .debug and project == \"my-project\" %}on{% else %}off{% endif %}\n\
             {% for port in ports %}- {{ port }}/{{ loop.index }}\n{% endfor %}\
             {% set shade = color | upper %}{{ shade }}",
            &data,
        )
        .unwrap();

        assert_eq!(manifest.as_str(), "on\n- 80/1\n- 443/2\nBLUE");
    }

    #[test]
    fn test_string_literals_keep_their_dots() {
        let data = TemplateData::new(&config(r#"{"host": "api"}"#), "my-project", &no_env).unwrap();

        let manifest = render(".kube.yml", r#"url: {{ .host ~ " .example.com" }}"#, &data).unwrap();
        assert_eq!(manifest.as_str(), "url: api .example.com");

        assert_eq!(
            strip_field_dots(r#"{{ .a ~ ' .b' ~ " .c" ~ .d }}"#),
            r#"{{ a ~ ' .b' ~ " .c" ~ d }}"#
        );
    }

    #[test]
    fn test_multi_line_action() {
        let data = TemplateData::new(&config(r#"{"color": "blue"}"#), "my-project", &no_env).unwrap();

        let manifest = render(".kube.yml", "color: {{\n  .color\n}}", &data).unwrap();
        assert_eq!(manifest.as_str(), "color: blue");
    }

    #[test]
    fn test_parse_error_is_a_render_error() {
        let data = TemplateData::new(&config("{}"), "my-project", &no_env).unwrap();
        let err = render(".kube.yml", "broken: {{ .project ", &data).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TemplateRender);
    }

    #[test]
    fn test_expand_env_vars_only_touches_strings() {
        let mut config = config(r#"{"image": "gcr.io/${PROJECT}/app:$TAG_NAME", "port": 8080, "missing": "x$UNSET"}"#);
        config.expand_env_vars = true;
        let lookup = |name: &str| match name {
            "PROJECT" => Some("acme".to_string()),
            "TAG_NAME" => Some("v1".to_string()),
            _ => None,
        };

        let data = TemplateData::new(&config, "my-project", &lookup).unwrap();
        assert_eq!(data.get("image"), Some(&Value::from("gcr.io/acme/app:v1")));
        assert_eq!(data.get("port"), Some(&Value::from(8080)));
        assert_eq!(data.get("missing"), Some(&Value::from("x")));
    }

    #[test]
    fn test_env_vars_left_alone_without_expansion() {
        let config = config(r#"{"image": "gcr.io/$PROJECT/app"}"#);
        let lookup = |_: &str| Some("acme".to_string());

        let data = TemplateData::new(&config, "my-project", &lookup).unwrap();
        assert_eq!(data.get("image"), Some(&Value::from("gcr.io/$PROJECT/app")));
    }

    #[test]
    fn test_dots_outside_actions_are_kept() {
        assert_eq!(
            strip_field_dots("host: .example.com\nvalue: {{ .a.b }} {{.c}}"),
            "host: .example.com\nvalue: {{ a.b }} {{c}}"
        );
        assert_eq!(strip_field_dots("{{ .name | upper }}"), "{{ name | upper }}");
    }

    #[test]
    fn test_read_template() {
        let text = read_template("kind: Deployment\n".as_bytes()).unwrap();
        assert_eq!(text, "kind: Deployment\n");

        let err = read_template(" \n".as_bytes()).unwrap_err();
        assert!(matches!(err, Error::MissingTemplate));
    }

    #[test]
    fn test_dump_lists_every_key() {
        let data = TemplateData::new(&config(r#"{"color": "blue"}"#), "my-project", &no_env).unwrap();
        let mut out = Vec::new();
        data.dump(&mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("VARIABLES AVAILABLE FOR ALL TEMPLATES"));
        assert!(text.contains("\"color\": \"blue\""));
        assert!(text.contains("\"cluster-name\": \"demo\""));
    }
}
